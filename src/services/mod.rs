pub mod ai;
pub mod availability;
pub mod cache;
pub mod delivery;
pub mod entities;
pub mod integrity;
pub mod pipeline;
pub mod prompt;
pub mod reconciler;
pub mod sessions;
pub mod worker;
