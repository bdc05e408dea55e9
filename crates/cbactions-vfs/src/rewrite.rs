//! The allowlist rewrite.
//!
//! Pure and total: never fails, never touches the filesystem. Paths outside
//! the allowlist come back byte-for-byte unchanged.

use std::borrow::Cow;

/// Directory prefix the agent hardcodes.
pub const RUNNER_ROOT: &str = "/runner";

/// Environment variable naming the redirect root. Read on every call so one
/// loaded copy of the hook serves whichever instance owns the process.
pub const PATH_SUBSTITUTION_ENV: &str = "CBA_PATH_SUBSTITUTION";

/// Absolute paths subject to virtualization.
pub const REDIRECT_ALLOWLIST: &[&str] = &[
    "/runner/.credentials",
    "/runner/.credentials_rsaparams",
    "/runner/.env",
    "/runner/.path",
    "/runner/.runner",
];

pub fn is_virtualized(path: &str) -> bool {
    REDIRECT_ALLOWLIST.contains(&path)
}

/// Rewrite `path` against an explicit redirect root.
///
/// `None` means no redirect root is configured and every path passes through.
/// `Some("")` is honoured literally (`/runner/.runner` becomes `/.runner`);
/// callers that launch agents must reject an empty root up front.
pub fn rewrite_path_with<'a>(path: &'a str, root: Option<&str>) -> Cow<'a, str> {
    match root {
        Some(root) if is_virtualized(path) => {
            let suffix = &path[RUNNER_ROOT.len()..];
            let mut out = String::with_capacity(root.len() + suffix.len());
            out.push_str(root);
            out.push_str(suffix);
            Cow::Owned(out)
        }
        _ => Cow::Borrowed(path),
    }
}

/// Rewrite `path` against the redirect root in [`PATH_SUBSTITUTION_ENV`].
pub fn rewrite_path(path: &str) -> Cow<'_, str> {
    if !is_virtualized(path) {
        return Cow::Borrowed(path);
    }
    match std::env::var(PATH_SUBSTITUTION_ENV) {
        Ok(root) => Cow::Owned(rewrite_path_with(path, Some(&root)).into_owned()),
        Err(_) => Cow::Borrowed(path),
    }
}
