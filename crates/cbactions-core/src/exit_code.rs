//! Agent exit-code convention.
//!
//! The agent signals completion of a job by exiting with a code >= 100.
//! Anything below that (including 0) is a protocol violation, not a
//! business outcome. Inside the bridge the value travels as a typed
//! [`BridgeExitCode`]; it becomes a bare integer only at the external
//! boundaries (agent process status, exit-code file, exported job variable,
//! and the outside process's own exit status).

use std::fmt;
use std::process::ExitStatus;

use crate::error::{BridgeError, Result};

/// A validated agent exit code in `100..=255`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BridgeExitCode(u8);

impl BridgeExitCode {
    /// Lowest code the agent may legitimately exit with.
    pub const MIN: u8 = 100;

    pub fn new(code: i32) -> Result<Self> {
        match u8::try_from(code) {
            Ok(c) if c >= Self::MIN => Ok(Self(c)),
            Ok(0) => Err(BridgeError::Protocol(
                "unexpected zero exit code (should be >=100)".to_string(),
            )),
            _ => Err(BridgeError::Protocol(format!(
                "exit code {} outside the agent contract (expected {}..=255)",
                code,
                Self::MIN
            ))),
        }
    }

    /// Interpret a finished agent process status.
    ///
    /// A process killed by a signal has no exit code and is rejected.
    pub fn from_status(status: ExitStatus) -> Result<Self> {
        match status.code() {
            Some(code) => Self::new(code),
            None => Err(BridgeError::Protocol(describe_signal(status))),
        }
    }

    /// Parse the decimal text form used by the exit-code file and the
    /// exported job variable.
    pub fn parse(text: &str) -> Result<Self> {
        let trimmed = text.trim();
        let code: i32 = trimmed.parse().map_err(|_| {
            BridgeError::Protocol(format!("exit code is not a number: {:?}", trimmed))
        })?;
        Self::new(code)
    }

    pub fn get(self) -> u8 {
        self.0
    }

    pub fn as_i32(self) -> i32 {
        i32::from(self.0)
    }
}

impl fmt::Display for BridgeExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(unix)]
fn describe_signal(status: ExitStatus) -> String {
    use std::os::unix::process::ExitStatusExt;
    match status.signal() {
        Some(sig) => format!("agent terminated by signal {}", sig),
        None => "agent exited without an exit code".to_string(),
    }
}

#[cfg(not(unix))]
fn describe_signal(_status: ExitStatus) -> String {
    "agent exited without an exit code".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_is_rejected() {
        let err = BridgeExitCode::new(0).unwrap_err();
        assert!(matches!(err, BridgeError::Protocol(_)));
        assert!(err.to_string().contains(">=100"));
    }

    #[test]
    fn test_reserved_range_is_rejected() {
        for code in [1, 2, 3, 42, 99, 256, -1] {
            assert!(BridgeExitCode::new(code).is_err(), "code {} accepted", code);
        }
    }

    #[test]
    fn test_contract_range_passes_through() {
        for code in 100..=255 {
            let c = BridgeExitCode::new(code).unwrap();
            assert_eq!(c.as_i32(), code);
            assert_eq!(BridgeExitCode::parse(&c.to_string()).unwrap(), c);
        }
    }

    #[test]
    fn test_parse_trims_whitespace() {
        assert_eq!(BridgeExitCode::parse("102\n").unwrap().get(), 102);
        assert!(BridgeExitCode::parse("").is_err());
        assert!(BridgeExitCode::parse("abc").is_err());
        assert!(BridgeExitCode::parse("0").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_from_status() {
        use std::os::unix::process::ExitStatusExt;
        // Raw wait status: exit code lives in the high byte.
        let ok = ExitStatus::from_raw(101 << 8);
        assert_eq!(BridgeExitCode::from_status(ok).unwrap().get(), 101);
        let zero = ExitStatus::from_raw(0);
        assert!(BridgeExitCode::from_status(zero).is_err());
        let killed = ExitStatus::from_raw(9);
        let err = BridgeExitCode::from_status(killed).unwrap_err();
        assert!(err.to_string().contains("signal 9"));
    }
}
