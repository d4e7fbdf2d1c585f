// Service modules (daemon functionality)
pub mod codec;
pub mod config;
pub mod process;
pub mod server;
pub mod state;

// Re-exports for consumers
pub use config::{Config, ConfigError};
pub use process::{spawn_service, start_service, ServiceError, ShutdownHandle};
pub use server::{Server, ServerError};
pub use state::{ServiceState, StateError};
