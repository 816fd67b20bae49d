mod event_listener;
mod lease_container;
mod session_manager;

pub use event_listener::*;
pub use lease_container::*;
pub use session_manager::*;
