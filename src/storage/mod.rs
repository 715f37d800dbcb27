//! Object storage: the bucket that holds staged fact files, master data,
//! schema definitions and run logs.

use crate::error::EtlError;
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

pub const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";
pub const JSON_CONTENT_TYPE: &str = "application/json";

// ── Object paths ──────────────────────────────────────────────────────────────

pub fn fact_object_path(date: &str) -> String {
    format!("fact/stock_prices_{}.ndjson", date)
}

pub fn master_object_path(name: &str) -> String {
    format!("master/{}.ndjson", name)
}

/// e.g. `logs/2025-08-06_101530_success.json`
pub fn log_object_path(at: DateTime<Utc>, status: &str) -> String {
    format!("logs/{}_{}.json", at.format("%Y-%m-%d_%H%M%S"), status)
}

/// Relative, `/`-separated, no empty or `..` segments.
fn validate_path(path: &str) -> Result<(), EtlError> {
    let bad = path.is_empty()
        || path.starts_with('/')
        || path.contains('\\')
        || path.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..");
    if bad {
        Err(EtlError::InvalidObjectPath(path.to_string()))
    } else {
        Ok(())
    }
}

// ── Store trait ───────────────────────────────────────────────────────────────

pub trait ObjectStore: Send + Sync {
    fn put(&self, path: &str, bytes: &[u8], content_type: &str) -> Result<()>;
    fn get(&self, path: &str) -> Result<Vec<u8>>;
    fn exists(&self, path: &str) -> Result<bool>;
    /// Human-readable location of `path`, for logs.
    fn uri(&self, path: &str) -> String;
}

// ── Local directory bucket ────────────────────────────────────────────────────

pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: &Path) -> Result<Self> {
        std::fs::create_dir_all(root)
            .with_context(|| format!("Could not create bucket dir {:?}", root))?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    fn resolve(&self, path: &str) -> Result<PathBuf> {
        validate_path(path)?;
        Ok(self.root.join(path))
    }
}

impl ObjectStore for LocalObjectStore {
    fn put(&self, path: &str, bytes: &[u8], content_type: &str) -> Result<()> {
        let full = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Could not create dir {:?}", parent))?;
        }
        std::fs::write(&full, bytes).with_context(|| format!("write {:?}", full))?;
        debug!("PUT {} ({} bytes, {})", self.uri(path), bytes.len(), content_type);
        Ok(())
    }

    fn get(&self, path: &str) -> Result<Vec<u8>> {
        let full = self.resolve(path)?;
        if !full.is_file() {
            return Err(EtlError::ObjectNotFound(self.uri(path)).into());
        }
        std::fs::read(&full).with_context(|| format!("read {:?}", full))
    }

    fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.resolve(path)?.is_file())
    }

    fn uri(&self, path: &str) -> String {
        format!("file://{}/{}", self.root.display(), path)
    }
}

// ── In-memory bucket ──────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct StoredObject {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// Process-local store, handy for dry runs and tests.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<BTreeMap<String, StoredObject>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn object(&self, path: &str) -> Option<StoredObject> {
        self.objects.lock().ok()?.get(path).cloned()
    }

    /// All stored paths, sorted.
    pub fn paths(&self) -> Vec<String> {
        self.objects
            .lock()
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default()
    }
}

impl ObjectStore for MemoryObjectStore {
    fn put(&self, path: &str, bytes: &[u8], content_type: &str) -> Result<()> {
        validate_path(path)?;
        self.objects
            .lock()
            .map_err(|_| anyhow!("object store mutex poisoned"))?
            .insert(
                path.to_string(),
                StoredObject {
                    bytes: bytes.to_vec(),
                    content_type: content_type.to_string(),
                },
            );
        Ok(())
    }

    fn get(&self, path: &str) -> Result<Vec<u8>> {
        validate_path(path)?;
        self.object(path)
            .map(|o| o.bytes)
            .ok_or_else(|| EtlError::ObjectNotFound(self.uri(path)).into())
    }

    fn exists(&self, path: &str) -> Result<bool> {
        validate_path(path)?;
        Ok(self.object(path).is_some())
    }

    fn uri(&self, path: &str) -> String {
        format!("mem://{}", path)
    }
}
