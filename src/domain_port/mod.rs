mod client_authentication;
mod lease_operations;
mod task_scheduler;
mod token_operations;

pub use client_authentication::*;
pub use lease_operations::*;
pub use task_scheduler::*;
pub use token_operations::*;
