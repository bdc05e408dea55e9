//! Environment variable key constants.

/// Values handed across the bridge as job parameters. Read once, then cleared.
pub mod crossing {
    /// Custodian-wrapped one-time identity.
    pub const CBA_KEY: &str = "CBA_KEY";
    /// Job payload envelope.
    pub const CBA_PAYLOAD: &str = "CBA_PAYLOAD";
    /// Credential file bundle envelope.
    pub const CBA_FILES: &str = "CBA_FILES";
    /// Variable the job environment exports with the agent's exit code.
    pub const RUNNER_EXITCODE: &str = "RUNNER_EXITCODE";
}

/// Path virtualization and agent launch
pub mod agent {
    /// Redirect root consumed by the preload hook.
    pub const CBA_PATH_SUBSTITUTION: &str = "CBA_PATH_SUBSTITUTION";
    /// Dynamic loader activation variable for the hook library.
    pub const LD_PRELOAD: &str = "LD_PRELOAD";
    /// Override for the hook library location.
    pub const CBA_PRELOAD_LIBRARY: &str = "CBA_PRELOAD_LIBRARY";
    pub const CBA_RUNNER_ROOT: &str = "CBA_RUNNER_ROOT";
    pub const CBA_AGENT_PROGRAM: &str = "CBA_AGENT_PROGRAM";
    pub const CBA_LISTENER_PROGRAM: &str = "CBA_LISTENER_PROGRAM";
    pub const CBA_EXIT_CODE_FILE: &str = "CBA_EXIT_CODE_FILE";
}

/// Outside (job submission) side
pub mod job {
    pub const CODEBUILD_PROJECT_NAME: &str = "CODEBUILD_PROJECT_NAME";
    /// Custodian key reference used to wrap the one-time identity.
    pub const KMS_KEY_ARN: &str = "KMS_KEY_ARN";
    pub const CBA_POLL_INTERVAL_SECS: &str = "CBA_POLL_INTERVAL_SECS";
    pub const CBA_POLL_TIMEOUT_SECS: &str = "CBA_POLL_TIMEOUT_SECS";
    /// Master key file for the local custodian; unset selects KMS.
    pub const CBA_LOCAL_CUSTODIAN_KEY_FILE: &str = "CBA_LOCAL_CUSTODIAN_KEY_FILE";
}

/// AWS endpoint and credential discovery
pub mod aws {
    pub const AWS_REGION: &str = "AWS_REGION";
    pub const REGION_ALIASES: &[&str] = &["AWS_DEFAULT_REGION"];
    pub const AWS_ACCESS_KEY_ID: &str = "AWS_ACCESS_KEY_ID";
    pub const AWS_SECRET_ACCESS_KEY: &str = "AWS_SECRET_ACCESS_KEY";
    pub const AWS_SESSION_TOKEN: &str = "AWS_SESSION_TOKEN";
    pub const AWS_CONTAINER_CREDENTIALS_RELATIVE_URI: &str =
        "AWS_CONTAINER_CREDENTIALS_RELATIVE_URI";
    pub const AWS_CONTAINER_CREDENTIALS_FULL_URI: &str = "AWS_CONTAINER_CREDENTIALS_FULL_URI";
    pub const AWS_CONTAINER_AUTHORIZATION_TOKEN: &str = "AWS_CONTAINER_AUTHORIZATION_TOKEN";
    pub const AWS_PROFILE: &str = "AWS_PROFILE";
    pub const AWS_SHARED_CREDENTIALS_FILE: &str = "AWS_SHARED_CREDENTIALS_FILE";
    pub const AWS_EC2_METADATA_DISABLED: &str = "AWS_EC2_METADATA_DISABLED";
    pub const AWS_EC2_METADATA_SERVICE_ENDPOINT: &str = "AWS_EC2_METADATA_SERVICE_ENDPOINT";
    pub const CBA_KMS_ENDPOINT: &str = "CBA_KMS_ENDPOINT";
    pub const CBA_CODEBUILD_ENDPOINT: &str = "CBA_CODEBUILD_ENDPOINT";
}

/// Observability and logging
pub mod observability {
    pub const CBA_QUIET: &str = "CBA_QUIET";
    pub const CBA_LOG_LEVEL: &str = "CBA_LOG_LEVEL";
    pub const CBA_LOG_JSON: &str = "CBA_LOG_JSON";
    pub const CBA_AUDIT_LOG: &str = "CBA_AUDIT_LOG";
}
