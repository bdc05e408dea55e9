//! Inside orchestrator: runs on the ephemeral job host.
//!
//! Recovers the one-time identity through the custodian, opens the payload
//! and file bundle, places the files where the agent expects them (rewritten
//! into the redirect root), hands the payload to the agent over the framed
//! IPC channel and records the agent's exit code.

use std::io::Write;
use std::path::Path;

use cbactions_core::config::env_keys::agent::{CBA_PATH_SUBSTITUTION, LD_PRELOAD};
use cbactions_core::config::{CrossingSecrets, InsideConfig};
use cbactions_core::{observability, BridgeError, BridgeExitCode, Result};
use cbactions_crypto::{open, unwrap_key, KeyCustodian};
use cbactions_ipc::{spawn_agent, AgentCommand};
use cbactions_vfs::{PathResolver, RedirectRoot};

use crate::bundle::FileBundle;
use crate::crossing::{Crossing, InsideStage, Side};

pub struct InsideBridge<'a> {
    config: &'a InsideConfig,
    custodian: &'a dyn KeyCustodian,
    resolver: &'a dyn PathResolver,
    crossing: Crossing<InsideStage>,
}

impl<'a> InsideBridge<'a> {
    pub fn new(
        config: &'a InsideConfig,
        custodian: &'a dyn KeyCustodian,
        resolver: &'a dyn PathResolver,
    ) -> Self {
        Self {
            config,
            custodian,
            resolver,
            crossing: Crossing::new(Side::Inside, InsideStage::Idle),
        }
    }

    pub fn crossing_id(&self) -> &str {
        self.crossing.id()
    }

    pub fn stage(&self) -> InsideStage {
        self.crossing.stage()
    }

    /// Run the crossing to completion. Agent output on fd 4 is copied to
    /// `relay_to`.
    pub fn run(
        &mut self,
        secrets: CrossingSecrets,
        relay_to: Box<dyn Write + Send>,
    ) -> Result<BridgeExitCode> {
        let span = tracing::info_span!("crossing", side = "inside", crossing_id = %self.crossing.id());
        let _guard = span.enter();
        self.drive(secrets, relay_to)
            .map_err(|e| self.crossing.fail(e))
    }

    fn drive(
        &mut self,
        secrets: CrossingSecrets,
        relay_to: Box<dyn Write + Send>,
    ) -> Result<BridgeExitCode> {
        let root = RedirectRoot::new(self.config.redirect_root.as_str()).ok_or_else(|| {
            BridgeError::Config(format!(
                "{} must name a redirect root before the agent starts",
                CBA_PATH_SUBSTITUTION
            ))
        })?;
        if !self.config.preload_library.is_file() {
            return Err(BridgeError::Config(format!(
                "preload library {} not found; the agent cannot run without path redirection",
                self.config.preload_library.display()
            )));
        }

        let identities = unwrap_key(self.custodian, None, &secrets.wrapped_key)?;
        self.crossing.advance(InsideStage::SecretsUnwrapped);

        let payload = open(&identities, &secrets.payload)?;
        let files = open(&identities, &secrets.files)?;
        drop(identities);
        drop(secrets);

        let bundle = FileBundle::from_json(&files[..])?;
        drop(files);
        let written = bundle.write_all(self.resolver, &self.config.runner_root)?;
        drop(bundle);
        tracing::info!(files = written.len(), root = root.as_str(), "credential files placed");
        self.crossing.advance(InsideStage::FilesWritten);

        let payload = std::str::from_utf8(&payload[..])
            .map_err(|e| BridgeError::Encoding(format!("job payload is not UTF-8: {}", e)))?;

        let command = self.agent_command(&root);
        let mut agent = spawn_agent(&command, relay_to)?;
        observability::audit_agent_started(
            self.crossing.id(),
            &command.program.to_string_lossy(),
            agent.pid(),
        );
        if let Err(e) = agent.send_payload(payload) {
            if let Err(kill_err) = agent.abort() {
                tracing::warn!(error = %kill_err, "failed to reap agent after payload error");
            }
            return Err(e);
        }
        self.crossing.advance(InsideStage::PayloadForwarded);

        let exit = agent.wait()?;
        observability::audit_agent_exited(
            self.crossing.id(),
            exit.status.code(),
            exit.duration.as_millis() as u64,
        );
        self.crossing.advance(InsideStage::AgentExited);
        let code = BridgeExitCode::from_status(exit.status)?;

        self.write_exit_code(code)?;
        self.crossing.advance(InsideStage::ExitCodeRelayed);
        Ok(code)
    }

    fn agent_command(&self, root: &RedirectRoot) -> AgentCommand {
        AgentCommand::new(&self.config.agent_program)
            .args(&self.config.agent_args)
            .current_dir(&self.config.agent_workdir)
            .env(CBA_PATH_SUBSTITUTION, root.as_str())
            .env(LD_PRELOAD, &self.config.preload_library)
    }

    fn write_exit_code(&self, code: BridgeExitCode) -> Result<()> {
        let path: &Path = &self.config.exit_code_file;
        self.resolver
            .write(path, code.to_string().as_bytes())
            .map_err(|e| BridgeError::io(format!("writing {}", path.display()), e))?;
        tracing::info!(path = %path.display(), exit_code = code.get(), "exit code recorded");
        Ok(())
    }
}
