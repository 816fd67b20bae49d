mod runtime;
pub use runtime::*;

mod tokio_scheduler;
pub use tokio_scheduler::*;
