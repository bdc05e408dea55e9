//! CodeBuild as the remote job service.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use cbactions_bridge::{JobHandle, JobPhase, JobRequest, JobService, JobStatus};
use cbactions_core::config::AwsConfig;
use cbactions_core::{BridgeError, Result};

use crate::client::JsonClient;
use crate::credentials::CredentialProvider;

const SERVICE: &str = "codebuild";
const IN_PROGRESS: &str = "IN_PROGRESS";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StartBuildRequest<'a> {
    project_name: &'a str,
    environment_variables_override: Vec<EnvironmentVariable<'a>>,
}

#[derive(Serialize)]
struct EnvironmentVariable<'a> {
    name: &'a str,
    value: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct StartBuildResponse {
    build: Build,
}

#[derive(Serialize)]
struct BatchGetBuildsRequest<'a> {
    ids: [&'a str; 1],
}

#[derive(Deserialize)]
struct BatchGetBuildsResponse {
    #[serde(default)]
    builds: Vec<Build>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Build {
    id: String,
    #[serde(default)]
    build_status: Option<String>,
    #[serde(default)]
    exported_environment_variables: Vec<ExportedVariable>,
}

#[derive(Deserialize)]
struct ExportedVariable {
    name: String,
    #[serde(default)]
    value: String,
}

impl Build {
    fn into_status(self) -> JobStatus {
        let phase = match self.build_status.as_deref() {
            None | Some(IN_PROGRESS) => JobPhase::InProgress,
            Some(other) => JobPhase::Finished(other.to_string()),
        };
        JobStatus {
            phase,
            exported: self
                .exported_environment_variables
                .into_iter()
                .map(|v| (v.name, v.value))
                .collect(),
        }
    }
}

pub struct CodeBuildJobs {
    client: JsonClient,
}

impl CodeBuildJobs {
    pub fn new(config: &AwsConfig, credentials: Arc<CredentialProvider>) -> Result<Self> {
        Ok(Self {
            client: JsonClient::new(
                SERVICE,
                "CodeBuild_20161006",
                &config.region,
                config.codebuild_endpoint.as_deref(),
                credentials,
            )?,
        })
    }
}

impl JobService for CodeBuildJobs {
    fn name(&self) -> &str {
        SERVICE
    }

    fn submit(&self, request: &JobRequest) -> Result<JobHandle> {
        let body = StartBuildRequest {
            project_name: &request.project,
            environment_variables_override: request
                .env
                .iter()
                .map(|e| EnvironmentVariable {
                    name: &e.name,
                    value: e.value.as_str(),
                    kind: "PLAINTEXT",
                })
                .collect(),
        };
        let response: StartBuildResponse = self.client.call("StartBuild", &body)?;
        Ok(JobHandle { id: response.build.id })
    }

    fn status(&self, handle: &JobHandle) -> Result<JobStatus> {
        let response: BatchGetBuildsResponse = self.client.call(
            "BatchGetBuilds",
            &BatchGetBuildsRequest { ids: [&handle.id] },
        )?;
        response
            .builds
            .into_iter()
            .find(|b| b.id == handle.id)
            .map(Build::into_status)
            .ok_or_else(|| BridgeError::remote(SERVICE, format!("build {} not found", handle.id)))
    }
}
