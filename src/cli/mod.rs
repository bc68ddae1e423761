pub mod config;
pub mod event;
pub mod shutdown;

pub use event::{EventArgs, RunError, EXIT_AUTH_FAILURE};
