//! Path virtualization for path-hardcoded agent software.
//!
//! Many agent instances on one host all expect to read and write the same
//! files under `/runner`. [`rewrite`] maps a small allowlist of those paths
//! onto an instance-private redirect root; [`resolver`] wraps that rewrite
//! behind the [`PathResolver`] seam so bridge code never touches the agent's
//! hardcoded paths directly. Unmodified agent binaries get the same rewrite
//! through the preload hook library.

pub mod resolver;
pub mod rewrite;

pub use resolver::{MemoryResolver, OsResolver, PathResolver, RedirectRoot};
pub use rewrite::{is_virtualized, rewrite_path, rewrite_path_with, PATH_SUBSTITUTION_ENV, REDIRECT_ALLOWLIST, RUNNER_ROOT};
