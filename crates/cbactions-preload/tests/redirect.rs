//! Runs real binaries under `LD_PRELOAD` with the built hook library.

#![cfg(target_os = "linux")]

use std::path::{Path, PathBuf};
use std::process::Command;

/// The cdylib sits next to the test binary's `deps/` directory.
fn hook_library() -> Option<PathBuf> {
    let exe = std::env::current_exe().ok()?;
    let deps = exe.parent()?;
    [deps, deps.parent()?]
        .iter()
        .map(|dir| dir.join("libcbactions_preload.so"))
        .find(|p| p.is_file())
}

fn run_hooked(lib: &Path, root: &Path, program: &str, args: &[&str]) -> std::process::Output {
    Command::new(program)
        .args(args)
        .env("LD_PRELOAD", lib)
        .env("CBA_PATH_SUBSTITUTION", root)
        .output()
        .unwrap()
}

fn setup() -> Option<(PathBuf, tempfile::TempDir)> {
    let Some(lib) = hook_library() else {
        eprintln!("libcbactions_preload.so not built; skipping");
        return None;
    };
    let root = tempfile::tempdir().unwrap();
    std::fs::write(root.path().join(".runner"), "tok").unwrap();
    Some((lib, root))
}

#[test]
fn test_open_is_redirected() {
    let Some((lib, root)) = setup() else { return };
    let out = run_hooked(&lib, root.path(), "cat", &["/runner/.runner"]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    assert_eq!(out.stdout, b"tok");
}

#[test]
fn test_stat_is_redirected() {
    let Some((lib, root)) = setup() else { return };
    let out = run_hooked(&lib, root.path(), "stat", &["-c", "%s", "/runner/.runner"]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    assert_eq!(String::from_utf8_lossy(&out.stdout).trim(), "3");
}

#[test]
fn test_unlisted_paths_untouched() {
    let Some((lib, root)) = setup() else { return };
    std::fs::write(root.path().join("other"), "x").unwrap();
    let out = run_hooked(&lib, root.path(), "cat", &["/runner/other"]);
    assert!(!out.status.success());

    let plain = root.path().join("other");
    let out = run_hooked(&lib, root.path(), "cat", &[plain.to_str().unwrap()]);
    assert_eq!(out.stdout, b"x");
}

#[test]
fn test_without_root_nothing_is_redirected() {
    let Some((lib, _root)) = setup() else { return };
    let out = Command::new("cat")
        .arg("/runner/.runner")
        .env("LD_PRELOAD", &lib)
        .env_remove("CBA_PATH_SUBSTITUTION")
        .output()
        .unwrap();
    assert_ne!(out.stdout, b"tok");
}
