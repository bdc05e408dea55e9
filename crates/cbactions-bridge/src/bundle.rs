//! FileBundle: the agent state files shipped across the bridge.
//!
//! Serialized as a JSON object mapping a key to base64 file contents. A key
//! is either a bare filename, placed under the agent's runner root, or an
//! absolute path used as-is. Both go through the [`PathResolver`], so
//! allowlisted paths land in the instance's redirect root.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use cbactions_core::{BridgeError, Result};
use cbactions_vfs::PathResolver;
use zeroize::Zeroizing;

/// Filename/path → file contents.
#[derive(Default)]
pub struct FileBundle {
    files: BTreeMap<String, Zeroizing<Vec<u8>>>,
}

impl std::fmt::Debug for FileBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.files.iter().map(|(k, v)| (k, v.len())))
            .finish()
    }
}

impl FileBundle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, contents: impl Into<Vec<u8>>) {
        self.files.insert(key.into(), Zeroizing::new(contents.into()));
    }

    pub fn get(&self, key: &str) -> Option<&[u8]> {
        self.files.get(key).map(|v| v.as_slice())
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    /// Read `paths` through `resolver`. Files directly under `runner_root`
    /// are keyed by filename, anything else by its full path.
    pub fn collect(
        resolver: &dyn PathResolver,
        runner_root: &Path,
        paths: &[PathBuf],
    ) -> Result<Self> {
        let mut bundle = Self::new();
        for path in paths {
            let contents = resolver.read(path).map_err(|e| {
                BridgeError::io(format!("reading {}", resolver.resolve(path).display()), e)
            })?;
            let key = match (path.parent(), path.file_name().and_then(|n| n.to_str())) {
                (Some(parent), Some(name)) if parent == runner_root => name.to_string(),
                _ => path.to_string_lossy().into_owned(),
            };
            tracing::debug!(key = %key, bytes = contents.len(), "bundled file");
            bundle.insert(key, contents);
        }
        Ok(bundle)
    }

    /// Where `key` belongs before path rewriting.
    pub fn target_path(key: &str, runner_root: &Path) -> Result<PathBuf> {
        let path = Path::new(key);
        if path.is_absolute() {
            if path.components().any(|c| matches!(c, Component::ParentDir)) {
                return Err(BridgeError::Protocol(format!(
                    "bundle path {:?} contains '..'",
                    key
                )));
            }
            return Ok(path.to_path_buf());
        }
        let mut components = path.components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => Ok(runner_root.join(path)),
            _ => Err(BridgeError::Protocol(format!(
                "bundle key {:?} must be a bare filename or an absolute path",
                key
            ))),
        }
    }

    /// Write every file through `resolver`; returns the resolved targets.
    ///
    /// Stops at the first failure. Files already written stay in place.
    pub fn write_all(&self, resolver: &dyn PathResolver, runner_root: &Path) -> Result<Vec<PathBuf>> {
        let mut written = Vec::with_capacity(self.files.len());
        for (key, contents) in &self.files {
            let target = Self::target_path(key, runner_root)?;
            let resolved = resolver.resolve(&target);
            resolver
                .write(&target, contents)
                .map_err(|e| BridgeError::io(format!("writing {}", resolved.display()), e))?;
            written.push(resolved);
        }
        Ok(written)
    }

    pub fn to_json(&self) -> Result<Zeroizing<String>> {
        let map: serde_json::Map<String, serde_json::Value> = self
            .files
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::Value::String(STANDARD.encode(v.as_slice()))))
            .collect();
        serde_json::to_string(&map)
            .map(Zeroizing::new)
            .map_err(|e| BridgeError::Encoding(format!("serializing file bundle: {}", e)))
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let map: BTreeMap<String, String> = serde_json::from_slice(bytes)
            .map_err(|e| BridgeError::Encoding(format!("file bundle is not a JSON object of strings: {}", e)))?;
        let mut bundle = Self::new();
        for (key, encoded) in map {
            let contents = STANDARD.decode(encoded.as_bytes()).map_err(|e| {
                BridgeError::Encoding(format!("file bundle entry {:?}: {}", key, e))
            })?;
            bundle.insert(key, contents);
        }
        Ok(bundle)
    }
}
