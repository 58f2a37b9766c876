pub mod config;
pub mod error;
pub mod event;
pub mod funnel;
pub mod types;

pub use types::ActorId;
