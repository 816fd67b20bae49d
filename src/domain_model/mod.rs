mod credential;
mod event;
mod lease;
mod ratio;
mod token;

pub use credential::*;
pub use event::*;
pub use lease::*;
pub use ratio::*;
pub use token::*;
