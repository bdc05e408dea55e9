//! Config structs grouped by concern.
//!
//! Each is loaded from the environment once at process start and then passed
//! explicitly to the component that needs it.

use std::path::PathBuf;
use std::time::Duration;

use super::env_keys::{agent, aws, crossing, job, observability as obv_keys};
use super::loader::{env_bool, env_optional, env_or, env_u64, take_secret, SecretString};
use crate::error::{BridgeError, Result};

/// Directory the agent software hardcodes for its state files.
pub const DEFAULT_RUNNER_ROOT: &str = "/runner";
pub const DEFAULT_AGENT_PROGRAM: &str = "/runner/bin/Runner.Worker";
pub const DEFAULT_LISTENER_PROGRAM: &str = "/runner/bin/Runner.Listener";
pub const DEFAULT_AGENT_WORKDIR: &str = "/runner/bin";
pub const DEFAULT_PRELOAD_LIBRARY: &str = "/runner/preload.so";
pub const DEFAULT_EXIT_CODE_FILE: &str = "/tmp/cbactions_exitcode.txt";
pub const DEFAULT_INSIDE_REDIRECT_ROOT: &str = "/tmp/cbactions/runner";

/// Default job status polling interval.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;
/// Default ceiling for a single crossing's job polling.
pub const DEFAULT_POLL_TIMEOUT_SECS: u64 = 3600;

/// The three opaque strings handed across the bridge.
///
/// Loading clears them from the process environment; the values are zeroed
/// when this struct is dropped.
pub struct CrossingSecrets {
    pub wrapped_key: SecretString,
    pub payload: SecretString,
    pub files: SecretString,
}

impl CrossingSecrets {
    pub fn from_env() -> Result<Self> {
        // Take all three before checking so none lingers in the environment.
        let wrapped_key = take_secret(crossing::CBA_KEY);
        let payload = take_secret(crossing::CBA_PAYLOAD);
        let files = take_secret(crossing::CBA_FILES);
        Ok(Self {
            wrapped_key: wrapped_key.ok_or_else(|| missing(crossing::CBA_KEY))?,
            payload: payload.ok_or_else(|| missing(crossing::CBA_PAYLOAD))?,
            files: files.ok_or_else(|| missing(crossing::CBA_FILES))?,
        })
    }
}

impl std::fmt::Debug for CrossingSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrossingSecrets")
            .field("wrapped_key", &format_args!("<{} bytes>", self.wrapped_key.len()))
            .field("payload", &format_args!("<{} bytes>", self.payload.len()))
            .field("files", &format_args!("<{} bytes>", self.files.len()))
            .finish()
    }
}

/// Inside (job host) configuration.
#[derive(Debug, Clone)]
pub struct InsideConfig {
    /// Root the agent hardcodes; bundle filenames are placed under it.
    pub runner_root: PathBuf,
    pub agent_program: PathBuf,
    pub agent_args: Vec<String>,
    pub agent_workdir: PathBuf,
    /// Instance-private directory the allowlisted paths are redirected to.
    pub redirect_root: String,
    pub preload_library: PathBuf,
    /// Sole persisted artifact of the inside flow.
    pub exit_code_file: PathBuf,
}

impl InsideConfig {
    pub fn from_env() -> Self {
        Self {
            runner_root: PathBuf::from(env_or(agent::CBA_RUNNER_ROOT, &[], || {
                DEFAULT_RUNNER_ROOT.to_string()
            })),
            agent_program: PathBuf::from(env_or(agent::CBA_AGENT_PROGRAM, &[], || {
                DEFAULT_AGENT_PROGRAM.to_string()
            })),
            agent_args: vec!["spawnclient".to_string(), "3".to_string(), "4".to_string()],
            agent_workdir: PathBuf::from(DEFAULT_AGENT_WORKDIR),
            redirect_root: env_or(agent::CBA_PATH_SUBSTITUTION, &[], || {
                DEFAULT_INSIDE_REDIRECT_ROOT.to_string()
            }),
            preload_library: PathBuf::from(env_or(agent::CBA_PRELOAD_LIBRARY, &[], || {
                DEFAULT_PRELOAD_LIBRARY.to_string()
            })),
            exit_code_file: PathBuf::from(env_or(agent::CBA_EXIT_CODE_FILE, &[], || {
                DEFAULT_EXIT_CODE_FILE.to_string()
            })),
        }
    }
}

/// Job status polling cadence and ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub ceiling: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            ceiling: Duration::from_secs(DEFAULT_POLL_TIMEOUT_SECS),
        }
    }
}

impl PollPolicy {
    pub fn from_env() -> Self {
        Self {
            interval: Duration::from_secs(env_u64(
                job::CBA_POLL_INTERVAL_SECS,
                DEFAULT_POLL_INTERVAL_SECS,
            )),
            ceiling: Duration::from_secs(env_u64(
                job::CBA_POLL_TIMEOUT_SECS,
                DEFAULT_POLL_TIMEOUT_SECS,
            )),
        }
    }
}

/// Outside (job submitter) configuration.
#[derive(Debug, Clone)]
pub struct OutsideConfig {
    pub project_name: String,
    /// Custodian key reference the one-time identity is wrapped under.
    pub custodian_key_ref: String,
    pub poll: PollPolicy,
    /// Files directly under this root are bundled by filename.
    pub runner_root: PathBuf,
    /// Agent state files shipped to the inside, read through the resolver.
    pub bundle_paths: Vec<PathBuf>,
}

impl OutsideConfig {
    pub fn from_env() -> Result<Self> {
        let project_name = env_optional(job::CODEBUILD_PROJECT_NAME, &[])
            .ok_or_else(|| missing(job::CODEBUILD_PROJECT_NAME))?;
        let custodian_key_ref =
            env_optional(job::KMS_KEY_ARN, &[]).ok_or_else(|| missing(job::KMS_KEY_ARN))?;
        let root = env_or(agent::CBA_RUNNER_ROOT, &[], || DEFAULT_RUNNER_ROOT.to_string());
        Ok(Self {
            project_name,
            custodian_key_ref,
            poll: PollPolicy::from_env(),
            bundle_paths: default_bundle_paths(&root),
            runner_root: PathBuf::from(root),
        })
    }
}

/// Credential files a registered agent needs to run a job.
pub fn default_bundle_paths(runner_root: &str) -> Vec<PathBuf> {
    [".credentials", ".credentials_rsaparams", ".runner"]
        .iter()
        .map(|name| PathBuf::from(runner_root).join(name))
        .collect()
}

/// Configuration for launching one listener instance.
#[derive(Debug, Clone)]
pub struct LaunchConfig {
    pub name: String,
    /// Directory holding this instance's credential files.
    pub files_dir: PathBuf,
    /// Instance-private redirect root; defaults to `/tmp/<name>`.
    pub redirect_root: String,
    pub listener_program: PathBuf,
    pub listener_args: Vec<String>,
    pub workdir: PathBuf,
    pub preload_library: PathBuf,
}

impl LaunchConfig {
    pub fn from_env(name: &str, files_dir: PathBuf, listener_args: Vec<String>) -> Self {
        Self {
            name: name.to_string(),
            files_dir,
            redirect_root: format!("/tmp/{}", name),
            listener_program: PathBuf::from(env_or(agent::CBA_LISTENER_PROGRAM, &[], || {
                DEFAULT_LISTENER_PROGRAM.to_string()
            })),
            listener_args,
            workdir: PathBuf::from(DEFAULT_AGENT_WORKDIR),
            preload_library: PathBuf::from(env_or(agent::CBA_PRELOAD_LIBRARY, &[], || {
                DEFAULT_PRELOAD_LIBRARY.to_string()
            })),
        }
    }
}

/// Which key custodian wraps and unwraps the one-time identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CustodianConfig {
    Kms,
    /// Local custodian keyed by the master key in this file.
    Local(PathBuf),
}

impl CustodianConfig {
    pub fn from_env() -> Self {
        match env_optional(job::CBA_LOCAL_CUSTODIAN_KEY_FILE, &[]) {
            Some(path) => Self::Local(PathBuf::from(path)),
            None => Self::Kms,
        }
    }
}

/// Region and endpoint overrides for the AWS adapters.
#[derive(Debug, Clone)]
pub struct AwsConfig {
    pub region: String,
    pub kms_endpoint: Option<String>,
    pub codebuild_endpoint: Option<String>,
}

impl AwsConfig {
    pub fn from_env() -> Result<Self> {
        let region = env_optional(aws::AWS_REGION, aws::REGION_ALIASES)
            .ok_or_else(|| missing(aws::AWS_REGION))?;
        Ok(Self {
            region,
            kms_endpoint: env_optional(aws::CBA_KMS_ENDPOINT, &[]),
            codebuild_endpoint: env_optional(aws::CBA_CODEBUILD_ENDPOINT, &[]),
        })
    }
}

/// Observability: quiet, log_level, log_json, audit_log.
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    pub quiet: bool,
    pub log_level: String,
    pub log_json: bool,
    pub audit_log: Option<String>,
}

impl ObservabilityConfig {
    pub fn from_env() -> &'static Self {
        use std::sync::OnceLock;
        static CACHE: OnceLock<ObservabilityConfig> = OnceLock::new();
        CACHE.get_or_init(|| Self {
            quiet: env_bool(obv_keys::CBA_QUIET, &[], false),
            log_level: env_or(obv_keys::CBA_LOG_LEVEL, &[], || "cbactions=info".to_string()),
            log_json: env_bool(obv_keys::CBA_LOG_JSON, &[], false),
            audit_log: env_optional(obv_keys::CBA_AUDIT_LOG, &[]),
        })
    }
}

fn missing(key: &str) -> BridgeError {
    BridgeError::Config(format!("{} is not set", key))
}
