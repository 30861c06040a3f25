//! Daemon plumbing: configuration, the subscription list, and the
//! scheduler that drives periodic report runs.

pub mod config;
pub mod scheduler;
pub mod subscriptions;

pub use config::{ConfigError, DaemonConfig};
pub use scheduler::{run_loop, run_window, Scheduler};
pub use subscriptions::{FileSubscriptionStore, SubscriptionError};
