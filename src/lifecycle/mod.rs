//! Process lifecycle: the main-thread control loop and shutdown signals

mod runloop;
mod shutdown;

pub use runloop::{Command, ControlLoop};
pub use shutdown::ShutdownSignal;
