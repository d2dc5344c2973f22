//! Object Store Writer.
//!
//! ## Keys
//!
//! Keys are deterministic and namespace-prefixed so repeated runs overwrite
//! instead of duplicating:
//!
//! - `employee-photos/<employee_id>.<ext>`
//! - `employee-documents/<employee_id>/<kind>.<ext>`
//! - `employee-certificates/<employee_id>/<type>_<name>.<ext>`
//!
//! The reference written back to the directory is `<reference_prefix>/<key>`.
//!
//! ## `FsObjectStore::put` protocol
//!
//! 1. SHA-256 the bytes.
//! 2. Write to `<path>.tmp` in the target directory.
//! 3. Rename to the final path (atomic on POSIX; overwrites).
//! 4. Read back and compare digests; a mismatch is a write failure.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use sha2::{Digest, Sha256};

use hrsync_core::{CertificateType, DocumentKind, EmployeeId};

use crate::error::{storage_io_err, StorageError};

pub const PHOTO_NAMESPACE: &str = "employee-photos";
pub const DOCUMENT_NAMESPACE: &str = "employee-documents";
pub const CERTIFICATE_NAMESPACE: &str = "employee-certificates";

/// Result of a successful upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub key: String,
    pub reference: String,
    /// Hex SHA-256 of the stored bytes.
    pub digest: String,
    pub size: usize,
}

/// Durable storage for synced artifacts.
pub trait ObjectStore: Send + Sync {
    /// Upload `bytes` under `key`, overwriting any existing object.
    fn put(&self, key: &str, bytes: &[u8], mime_type: &str) -> Result<StoredObject, StorageError>;

    fn exists(&self, key: &str) -> bool;

    /// Prefix every reference starts with, e.g. `/api/files`.
    fn reference_prefix(&self) -> &str;

    fn reference(&self, key: &str) -> String {
        format!("{}/{}", self.reference_prefix().trim_end_matches('/'), key)
    }
}

// ---------------------------------------------------------------------------
// Key builders
// ---------------------------------------------------------------------------

/// Fixed mime → extension table. Unknown types map to `bin` with a warning.
pub fn extension_for(mime_type: &str) -> &'static str {
    match mime_type.trim().to_ascii_lowercase().as_str() {
        "image/jpeg" | "image/jpg" | "image/pjpeg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/bmp" => "bmp",
        "image/tiff" => "tiff",
        "application/pdf" => "pdf",
        "application/msword" => "doc",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => "docx",
        "text/plain" => "txt",
        other => {
            tracing::warn!("unrecognized mime type '{other}', storing as .bin");
            "bin"
        }
    }
}

pub fn photo_key(employee: &EmployeeId, mime_type: &str) -> String {
    format!(
        "{PHOTO_NAMESPACE}/{}.{}",
        segment(&employee.0),
        extension_for(mime_type)
    )
}

pub fn document_key(employee: &EmployeeId, kind: DocumentKind, mime_type: &str) -> String {
    format!(
        "{DOCUMENT_NAMESPACE}/{}/{}.{}",
        segment(&employee.0),
        kind.as_str(),
        extension_for(mime_type)
    )
}

pub fn certificate_key(
    employee: &EmployeeId,
    cert_type: CertificateType,
    name: &str,
    mime_type: &str,
) -> String {
    format!(
        "{CERTIFICATE_NAMESPACE}/{}/{}_{}.{}",
        segment(&employee.0),
        cert_type.as_str(),
        slug(name),
        extension_for(mime_type)
    )
}

/// Lowercase, `[a-z0-9]` runs joined by `_`. Never empty.
pub fn slug(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.is_empty() && !out.ends_with('_') {
            out.push('_');
        }
    }
    let trimmed = out.trim_end_matches('_');
    if trimmed.is_empty() {
        "unnamed".to_string()
    } else {
        trimmed.to_string()
    }
}

// Employee ids become path segments; keep them to one.
fn segment(id: &str) -> String {
    id.trim().replace(['/', '\\'], "_")
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut h = Sha256::new();
    h.update(bytes);
    hex::encode(h.finalize())
}

// ---------------------------------------------------------------------------
// Filesystem store
// ---------------------------------------------------------------------------

/// [`ObjectStore`] rooted at a local directory.
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
    reference_prefix: String,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>, reference_prefix: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            reference_prefix: reference_prefix.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a key to a path under the root, rejecting anything that could
    /// escape it.
    pub fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(key);
        let safe = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !safe {
            return Err(StorageError::InvalidKey {
                key: key.to_string(),
            });
        }
        Ok(self.root.join(relative))
    }
}

impl ObjectStore for FsObjectStore {
    fn put(&self, key: &str, bytes: &[u8], mime_type: &str) -> Result<StoredObject, StorageError> {
        let path = self.path_for(key)?;
        let digest = sha256_hex(bytes);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| storage_io_err(parent, e))?;
        }
        let tmp = PathBuf::from(format!("{}.tmp", path.display()));
        std::fs::write(&tmp, bytes).map_err(|e| storage_io_err(&tmp, e))?;
        if let Err(e) = std::fs::rename(&tmp, &path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(storage_io_err(&path, e));
        }

        let written = std::fs::read(&path).map_err(|e| storage_io_err(&path, e))?;
        let actual = sha256_hex(&written);
        if actual != digest {
            return Err(StorageError::DigestMismatch {
                key: key.to_string(),
                expected: digest,
                actual,
            });
        }

        tracing::debug!("stored {key} ({mime_type}, {} bytes)", bytes.len());
        Ok(StoredObject {
            key: key.to_string(),
            reference: self.reference(key),
            digest,
            size: bytes.len(),
        })
    }

    fn exists(&self, key: &str) -> bool {
        self.path_for(key).map(|p| p.is_file()).unwrap_or(false)
    }

    fn reference_prefix(&self) -> &str {
        &self.reference_prefix
    }
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

/// In-memory [`ObjectStore`] for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    reference_prefix: String,
    objects: Mutex<BTreeMap<String, (Vec<u8>, String)>>,
    failing: AtomicBool,
}

impl MemoryObjectStore {
    pub fn new(reference_prefix: impl Into<String>) -> Self {
        Self {
            reference_prefix: reference_prefix.into(),
            ..Self::default()
        }
    }

    /// Make every subsequent `put` fail.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// `(bytes, mime_type)` stored under `key`.
    pub fn get(&self, key: &str) -> Option<(Vec<u8>, String)> {
        self.lock().get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, (Vec<u8>, String)>> {
        self.objects.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl ObjectStore for MemoryObjectStore {
    fn put(&self, key: &str, bytes: &[u8], mime_type: &str) -> Result<StoredObject, StorageError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("injected failure".to_string()));
        }
        self.lock()
            .insert(key.to_string(), (bytes.to_vec(), mime_type.to_string()));
        Ok(StoredObject {
            key: key.to_string(),
            reference: self.reference(key),
            digest: sha256_hex(bytes),
            size: bytes.len(),
        })
    }

    fn exists(&self, key: &str) -> bool {
        self.lock().contains_key(key)
    }

    fn reference_prefix(&self) -> &str {
        &self.reference_prefix
    }
}
