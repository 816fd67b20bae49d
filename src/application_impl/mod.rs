mod authentication_session;
mod event_publisher;
mod lease_manager;
mod lease_registry;
mod renewal_config;
mod renewal_scheduler;
mod retry_policy;
mod tracing_listener;
mod vault_backend_fake;

pub use authentication_session::*;
pub use event_publisher::*;
pub use lease_manager::*;
pub use lease_registry::*;
pub use renewal_config::*;
pub use renewal_scheduler::*;
pub use retry_policy::*;
pub use tracing_listener::*;
pub use vault_backend_fake::*;
