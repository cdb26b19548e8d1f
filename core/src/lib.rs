pub mod auth;
pub mod automation;
pub mod config;
pub mod error;
pub mod file_queue;
pub mod monitor;
pub mod protocol;
pub mod response;
pub mod watcher;

// Re-exports for convenience
pub use auth::Authenticator;
pub use config::Config;
pub use error::{BridgeError, Result};
