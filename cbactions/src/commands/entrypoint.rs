//! `cbactions entrypoint`: the inside half of a crossing.

use std::io;

use anyhow::{Context, Result};

use cbactions_bridge::InsideBridge;
use cbactions_core::config::{CrossingSecrets, CustodianConfig, InsideConfig};
use cbactions_core::BridgeError;
use cbactions_vfs::{OsResolver, RedirectRoot};

use super::build_custodian;

/// Runs the agent and records its exit code in the exit-code file. The
/// process itself exits 0 once that file is written.
pub fn run() -> Result<i32> {
    // First, so the secrets leave the environment before anything else runs.
    let secrets = CrossingSecrets::from_env().context("loading crossing secrets")?;
    let config = InsideConfig::from_env();
    let root = RedirectRoot::new(config.redirect_root.clone())
        .ok_or_else(|| BridgeError::Config("redirect root is empty".to_string()))?;
    let resolver = OsResolver::new(root);
    let custodian = build_custodian(&CustodianConfig::from_env())?;

    let mut bridge = InsideBridge::new(&config, custodian.as_ref(), &resolver);
    let code = bridge.run(secrets, Box::new(io::stdout()))?;
    tracing::debug!(crossing_id = bridge.crossing_id(), exit_code = code.get(), "inside crossing complete");
    Ok(0)
}
