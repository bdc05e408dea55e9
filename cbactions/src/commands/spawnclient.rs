//! `cbactions spawnclient <in> <out>`: the outside half of a crossing.
//!
//! The listener starts this in place of its worker binary and writes the
//! job request to the inherited input fd.

use std::os::unix::io::RawFd;
use std::sync::Arc;

use anyhow::{Context, Result};

use cbactions_aws::{CodeBuildJobs, CredentialProvider};
use cbactions_bridge::OutsideBridge;
use cbactions_core::config::{AwsConfig, CustodianConfig, OutsideConfig};
use cbactions_core::BridgeError;
use cbactions_ipc::{inherited_fd, read_frame};
use cbactions_vfs::{OsResolver, RedirectRoot, PATH_SUBSTITUTION_ENV};

use super::build_custodian;

pub fn run(in_fd: RawFd, out_fd: RawFd) -> Result<i32> {
    let config = OutsideConfig::from_env()?;
    let root = RedirectRoot::from_env().ok_or_else(|| {
        BridgeError::Config(format!("{} is not set", PATH_SUBSTITUTION_ENV))
    })?;
    let resolver = OsResolver::new(root);
    let custodian = build_custodian(&CustodianConfig::from_env())?;
    let aws = AwsConfig::from_env()?;
    let jobs = CodeBuildJobs::new(&aws, Arc::new(CredentialProvider::from_env()?))?;

    let mut input = inherited_fd(in_fd).context("opening job request fd")?;
    // Held until the job ends.
    let _output = inherited_fd(out_fd).context("opening agent output fd")?;
    let request = read_frame(&mut input).context("reading job request")?;
    drop(input);
    tracing::info!(kind = ?request.kind, chars = request.body.chars().count(), "job request received");

    let code = OutsideBridge::new(&config, custodian.as_ref(), &jobs, &resolver).run(&request.body)?;
    Ok(code.as_i32())
}
