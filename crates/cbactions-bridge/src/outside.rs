//! Outside orchestrator: runs next to the agent listener, in place of the
//! agent's own worker.
//!
//! Seals the job payload and the credential bundle to a fresh one-time
//! identity, wraps that identity under the custodian key, submits a remote
//! job carrying the three opaque strings and waits for the job's exported
//! exit code.

use cbactions_core::config::env_keys::crossing::{CBA_FILES, CBA_KEY, CBA_PAYLOAD};
use cbactions_core::config::{OutsideConfig, SecretString};
use cbactions_core::{observability, BridgeExitCode, Result};
use cbactions_crypto::{seal, wrap_key, KeyCustodian, OneTimeIdentity};
use cbactions_vfs::PathResolver;

use crate::bundle::FileBundle;
use crate::crossing::{Crossing, OutsideStage, Side};
use crate::job::{exported_exit_code, wait_for_completion, EnvOverride, JobRequest, JobService};

pub struct OutsideBridge<'a> {
    config: &'a OutsideConfig,
    custodian: &'a dyn KeyCustodian,
    jobs: &'a dyn JobService,
    resolver: &'a dyn PathResolver,
    crossing: Crossing<OutsideStage>,
}

impl<'a> OutsideBridge<'a> {
    pub fn new(
        config: &'a OutsideConfig,
        custodian: &'a dyn KeyCustodian,
        jobs: &'a dyn JobService,
        resolver: &'a dyn PathResolver,
    ) -> Self {
        Self {
            config,
            custodian,
            jobs,
            resolver,
            crossing: Crossing::new(Side::Outside, OutsideStage::Idle),
        }
    }

    pub fn crossing_id(&self) -> &str {
        self.crossing.id()
    }

    pub fn stage(&self) -> OutsideStage {
        self.crossing.stage()
    }

    /// Ship `payload` across and return the agent's exit code.
    pub fn run(&mut self, payload: &str) -> Result<BridgeExitCode> {
        let span = tracing::info_span!("crossing", side = "outside", crossing_id = %self.crossing.id());
        let _guard = span.enter();
        self.drive(payload).map_err(|e| self.crossing.fail(e))
    }

    fn drive(&mut self, payload: &str) -> Result<BridgeExitCode> {
        let request = self.prepare(payload)?;
        self.crossing.advance(OutsideStage::EnvelopesPrepared);

        let handle = self.jobs.submit(&request)?;
        drop(request);
        tracing::info!(service = self.jobs.name(), job = %handle.id, project = %self.config.project_name, "job submitted");
        self.crossing.advance(OutsideStage::JobSubmitted);

        self.crossing.advance(OutsideStage::Polling);
        let status = wait_for_completion(self.jobs, &handle, &self.config.poll)?;

        let code = exported_exit_code(&status);
        observability::audit_job_completed(
            self.crossing.id(),
            &handle.id,
            status.label(),
            code.as_ref().ok().map(|c| c.as_i32()),
        );
        self.crossing.advance(OutsideStage::JobCompleted);
        code
    }

    /// Build the three job parameters. The identity never outlives this call.
    fn prepare(&self, payload: &str) -> Result<JobRequest> {
        let identity = OneTimeIdentity::generate();
        let recipient = identity.recipient();

        let sealed_payload = seal(&recipient, payload.as_bytes())?;
        let bundle = FileBundle::collect(
            self.resolver,
            &self.config.runner_root,
            &self.config.bundle_paths,
        )?;
        let sealed_files = seal(&recipient, bundle.to_json()?.as_bytes())?;
        drop(bundle);

        let wrapped = wrap_key(
            self.custodian,
            &self.config.custodian_key_ref,
            &identity.to_secret_text(),
        )?;
        drop(identity);
        tracing::debug!(recipient = %recipient, "envelopes sealed");

        Ok(JobRequest {
            project: self.config.project_name.clone(),
            env: vec![
                EnvOverride {
                    name: CBA_KEY.to_string(),
                    value: SecretString::new(wrapped),
                },
                EnvOverride {
                    name: CBA_PAYLOAD.to_string(),
                    value: SecretString::new(sealed_payload),
                },
                EnvOverride {
                    name: CBA_FILES.to_string(),
                    value: SecretString::new(sealed_files),
                },
            ],
        })
    }
}
