pub mod config;
pub mod error;
pub mod exit_code;
pub mod observability;

pub use error::{BridgeError, Result};
pub use exit_code::BridgeExitCode;
