//! Configuration types for the pipeline stages.
//!
//! These types represent the validated runtime configuration handed to each
//! processor. Loading and parsing is handled by the server crate.

mod retry;
mod timeouts;
mod watcher;

pub use retry::RetryPolicy;
pub use timeouts::Timeouts;
pub use watcher::WatcherSettings;
