//! Remote job service seam and status polling.

use std::thread;
use std::time::{Duration, Instant};

use cbactions_core::config::{PollPolicy, SecretString};
use cbactions_core::config::env_keys::crossing::RUNNER_EXITCODE;
use cbactions_core::{BridgeError, BridgeExitCode, Result};

/// One environment variable override passed as a job parameter.
pub struct EnvOverride {
    pub name: String,
    pub value: SecretString,
}

impl std::fmt::Debug for EnvOverride {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}=<{} bytes>", self.name, self.value.len())
    }
}

/// A job submission: project plus opaque parameters.
#[derive(Debug)]
pub struct JobRequest {
    pub project: String,
    pub env: Vec<EnvOverride>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHandle {
    pub id: String,
}

/// Coarse job lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobPhase {
    InProgress,
    /// Terminal, with the service's own status label.
    Finished(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobStatus {
    pub phase: JobPhase,
    /// Variables the job exported, in service order.
    pub exported: Vec<(String, String)>,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self.phase, JobPhase::Finished(_))
    }

    pub fn label(&self) -> &str {
        match &self.phase {
            JobPhase::InProgress => "IN_PROGRESS",
            JobPhase::Finished(s) => s,
        }
    }
}

/// A remote job runner.
pub trait JobService: Send + Sync {
    /// Service name for logs and errors.
    fn name(&self) -> &str;

    fn submit(&self, request: &JobRequest) -> Result<JobHandle>;

    fn status(&self, handle: &JobHandle) -> Result<JobStatus>;
}

/// Poll until the job is terminal or `policy.ceiling` elapses.
pub fn wait_for_completion(
    service: &dyn JobService,
    handle: &JobHandle,
    policy: &PollPolicy,
) -> Result<JobStatus> {
    let start = Instant::now();
    let mut polls: u64 = 0;
    loop {
        let status = service.status(handle)?;
        polls += 1;
        if status.is_terminal() {
            tracing::info!(job = %handle.id, status = status.label(), polls, "job finished");
            return Ok(status);
        }

        let elapsed = start.elapsed();
        if elapsed >= policy.ceiling {
            return Err(BridgeError::Timeout {
                elapsed,
                message: format!("job {} still in progress after {} polls", handle.id, polls),
            });
        }
        tracing::debug!(job = %handle.id, polls, "job in progress");
        thread::sleep(policy.interval.min(policy.ceiling - elapsed).max(Duration::from_millis(1)));
    }
}

/// Extract the agent exit code the job exported.
///
/// No exported variables, a missing `RUNNER_EXITCODE`, and a value outside
/// the agent contract (including zero) are all `Protocol` errors.
pub fn exported_exit_code(status: &JobStatus) -> Result<BridgeExitCode> {
    if status.exported.is_empty() {
        return Err(BridgeError::Protocol(format!(
            "job ended {} without exporting {}",
            status.label(),
            RUNNER_EXITCODE
        )));
    }
    let value = status
        .exported
        .iter()
        .find(|(name, _)| name == RUNNER_EXITCODE)
        .map(|(_, value)| value)
        .ok_or_else(|| {
            let names: Vec<&str> = status.exported.iter().map(|(n, _)| n.as_str()).collect();
            BridgeError::Protocol(format!(
                "unexpected exported variables {:?}, expected {}",
                names, RUNNER_EXITCODE
            ))
        })?;
    BridgeExitCode::parse(value)
}
