//! Host lifecycle helpers: exit polling and shutdown signals

mod exit_monitor;
mod shutdown;

pub use exit_monitor::wait_for_exit;
pub use shutdown::ShutdownSignal;
