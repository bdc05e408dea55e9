//! PathResolver: the I/O seam for virtualized paths.
//!
//! Bridge code that reads or writes agent state files goes through a
//! resolver instead of `std::fs`. [`OsResolver`] performs real OS calls after
//! the allowlist rewrite; [`MemoryResolver`] keeps everything in a map.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::rewrite::{rewrite_path_with, PATH_SUBSTITUTION_ENV};

/// A configured, non-empty redirect root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectRoot(String);

impl RedirectRoot {
    /// Returns `None` for an empty (or whitespace-only) root.
    pub fn new(root: impl Into<String>) -> Option<Self> {
        let root = root.into();
        if root.trim().is_empty() {
            None
        } else {
            Some(Self(root))
        }
    }

    /// Read the root from [`PATH_SUBSTITUTION_ENV`]. Unset or empty yields `None`.
    pub fn from_env() -> Option<Self> {
        std::env::var(PATH_SUBSTITUTION_ENV).ok().and_then(Self::new)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_path(&self) -> &Path {
        Path::new(&self.0)
    }
}

/// Filesystem access with allowlist rewriting applied.
pub trait PathResolver: Send + Sync {
    /// Where `path` actually lives for this instance.
    fn resolve(&self, path: &Path) -> PathBuf;

    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Write (create or truncate) `path`, creating parent directories.
    fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()>;

    fn exists(&self, path: &Path) -> bool;
}

fn rewrite(path: &Path, root: Option<&str>) -> PathBuf {
    match path.to_str() {
        Some(s) => PathBuf::from(rewrite_path_with(s, root).as_ref()),
        // Allowlist entries are ASCII, so a non-UTF-8 path is never one of them.
        None => path.to_path_buf(),
    }
}

/// Real filesystem, redirected to one instance's root.
#[derive(Debug, Clone)]
pub struct OsResolver {
    root: RedirectRoot,
}

impl OsResolver {
    pub fn new(root: RedirectRoot) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &RedirectRoot {
        &self.root
    }
}

impl PathResolver for OsResolver {
    fn resolve(&self, path: &Path) -> PathBuf {
        rewrite(path, Some(self.root.as_str()))
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(self.resolve(path))
    }

    fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        let target = self.resolve(path);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut opts = OpenOptions::new();
        opts.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            opts.mode(0o600);
        }
        let mut f = opts.open(&target)?;
        f.write_all(contents)?;
        f.sync_all()?;
        tracing::debug!(path = %path.display(), target = %target.display(), bytes = contents.len(), "wrote virtualized file");
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        self.resolve(path).exists()
    }
}

/// In-memory resolver backed by a path → contents map.
#[derive(Debug, Default)]
pub struct MemoryResolver {
    root: Option<String>,
    files: Mutex<HashMap<PathBuf, Vec<u8>>>,
}

impl MemoryResolver {
    pub fn new(root: Option<&str>) -> Self {
        Self {
            root: root.map(str::to_string),
            files: Mutex::new(HashMap::new()),
        }
    }

    /// Look up a stored file by its resolved (post-rewrite) path.
    pub fn get_resolved(&self, resolved: &Path) -> Option<Vec<u8>> {
        self.files.lock().ok()?.get(resolved).cloned()
    }

    /// All resolved paths currently stored, sorted.
    pub fn resolved_paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = match self.files.lock() {
            Ok(files) => files.keys().cloned().collect(),
            Err(_) => Vec::new(),
        };
        paths.sort();
        paths
    }

    fn poisoned() -> io::Error {
        io::Error::new(io::ErrorKind::Other, "memory resolver lock poisoned")
    }
}

impl PathResolver for MemoryResolver {
    fn resolve(&self, path: &Path) -> PathBuf {
        rewrite(path, self.root.as_deref())
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        let resolved = self.resolve(path);
        let files = self.files.lock().map_err(|_| Self::poisoned())?;
        files.get(&resolved).cloned().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} not found", resolved.display()),
            )
        })
    }

    fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        let resolved = self.resolve(path);
        let mut files = self.files.lock().map_err(|_| Self::poisoned())?;
        files.insert(resolved, contents.to_vec());
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        let resolved = self.resolve(path);
        self.files
            .lock()
            .map(|files| files.contains_key(&resolved))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redirect_root_rejects_empty() {
        assert!(RedirectRoot::new("").is_none());
        assert!(RedirectRoot::new("   ").is_none());
        assert_eq!(RedirectRoot::new("/tmp/a").unwrap().as_str(), "/tmp/a");
    }

    #[test]
    fn test_os_resolver_writes_under_redirect_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("instance");
        let resolver = OsResolver::new(RedirectRoot::new(root.to_str().unwrap()).unwrap());

        resolver
            .write(Path::new("/runner/.runner"), b"token-data")
            .unwrap();

        assert_eq!(fs::read(root.join(".runner")).unwrap(), b"token-data");
        assert_eq!(resolver.read(Path::new("/runner/.runner")).unwrap(), b"token-data");
        assert!(resolver.exists(Path::new("/runner/.runner")));
        assert_eq!(
            resolver.resolve(Path::new("/runner/.runner")),
            root.join(".runner")
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_os_resolver_file_mode() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let resolver = OsResolver::new(RedirectRoot::new(dir.path().to_str().unwrap()).unwrap());
        resolver.write(Path::new("/runner/.credentials"), b"{}").unwrap();
        let mode = fs::metadata(dir.path().join(".credentials"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_os_resolver_leaves_unlisted_paths() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = OsResolver::new(RedirectRoot::new("/tmp/elsewhere").unwrap());
        let plain = dir.path().join("plain.txt");
        resolver.write(&plain, b"x").unwrap();
        assert_eq!(fs::read(&plain).unwrap(), b"x");
    }

    #[test]
    fn test_memory_resolver_isolates_instances() {
        let a = MemoryResolver::new(Some("/tmp/a"));
        let b = MemoryResolver::new(Some("/tmp/b"));
        a.write(Path::new("/runner/.runner"), b"a").unwrap();
        b.write(Path::new("/runner/.runner"), b"b").unwrap();

        assert_eq!(a.read(Path::new("/runner/.runner")).unwrap(), b"a");
        assert_eq!(b.read(Path::new("/runner/.runner")).unwrap(), b"b");
        assert_eq!(a.resolved_paths(), vec![PathBuf::from("/tmp/a/.runner")]);
        assert!(a.get_resolved(Path::new("/runner/.runner")).is_none());
    }

    #[test]
    fn test_memory_resolver_missing_file() {
        let r = MemoryResolver::new(None);
        let err = r.read(Path::new("/runner/.runner")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        assert!(!r.exists(Path::new("/runner/.runner")));
    }
}
