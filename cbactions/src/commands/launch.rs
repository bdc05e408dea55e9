//! `cbactions launch <name> <files-dir>`: one virtualized listener instance.
//!
//! Each instance gets `/tmp/<name>` as its redirect root, so several
//! listeners registered as different agents can share one host and one
//! `/runner` install.

use std::fs;
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};

use anyhow::{bail, Context, Result};
use zeroize::Zeroizing;

use cbactions_core::config::env_keys::agent::{CBA_PATH_SUBSTITUTION, LD_PRELOAD};
use cbactions_core::config::{default_bundle_paths, LaunchConfig};
use cbactions_core::BridgeError;
use cbactions_vfs::{OsResolver, PathResolver, RedirectRoot, RUNNER_ROOT};

const DEFAULT_LISTENER_ARGS: &[&str] = &["run"];

pub fn run(name: &str, files_dir: PathBuf, listener_args: Vec<String>) -> Result<i32> {
    validate_name(name)?;
    let listener_args = if listener_args.is_empty() {
        DEFAULT_LISTENER_ARGS.iter().map(|s| s.to_string()).collect()
    } else {
        listener_args
    };
    let config = LaunchConfig::from_env(name, files_dir, listener_args);
    if !config.preload_library.is_file() {
        return Err(BridgeError::Config(format!(
            "preload library {} not found",
            config.preload_library.display()
        ))
        .into());
    }

    let root = RedirectRoot::new(config.redirect_root.clone())
        .ok_or_else(|| BridgeError::Config("redirect root is empty".to_string()))?;
    let resolver = OsResolver::new(root);
    let placed = place_credentials(&resolver, &config.files_dir)?;
    tracing::info!(instance = %config.name, files = placed.len(), root = %config.redirect_root, "credential files placed");

    let status = Command::new(&config.listener_program)
        .args(&config.listener_args)
        .current_dir(&config.workdir)
        .env(CBA_PATH_SUBSTITUTION, &config.redirect_root)
        .env(LD_PRELOAD, &config.preload_library)
        .status()
        .with_context(|| format!("starting {}", config.listener_program.display()))?;

    let code = exit_code(status);
    tracing::info!(instance = %config.name, exit_code = code, "listener exited");
    Ok(code)
}

/// The name becomes a single path component under `/tmp`.
fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains('/') || name.contains('\0') {
        bail!(BridgeError::Config(format!("invalid instance name {:?}", name)));
    }
    Ok(())
}

/// Copy the instance's credential files to where the rewrite sends the
/// listener's `/runner` reads.
fn place_credentials(resolver: &dyn PathResolver, files_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut placed = Vec::new();
    for target in default_bundle_paths(RUNNER_ROOT) {
        let Some(file_name) = target.file_name() else {
            continue;
        };
        let source = files_dir.join(file_name);
        let contents = Zeroizing::new(
            fs::read(&source).with_context(|| format!("reading {}", source.display()))?,
        );
        resolver
            .write(&target, &contents)
            .map_err(|e| BridgeError::io(format!("writing {}", resolver.resolve(&target).display()), e))?;
        placed.push(resolver.resolve(&target));
    }
    Ok(placed)
}

fn exit_code(status: ExitStatus) -> i32 {
    match (status.code(), status.signal()) {
        (Some(code), _) => code,
        (None, Some(signal)) => 128 + signal,
        (None, None) => 1,
    }
}
