#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Plan, object, and invalidation types shared across the s3pub toolchain.
//!
//! Everything here is request-scoped: values are built at the start of one
//! sync or invalidation run and dropped at its end. The bucket itself is the
//! only state that outlives a run.

pub mod progress;

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Status string the CDN reports once an invalidation has finished.
pub const INVALIDATION_COMPLETED: &str = "Completed";

/// Strips surrounding quote characters from a content hash.
///
/// Some stores quote their `ETag` values and some don't, so both sides of
/// every comparison go through this first.
#[must_use]
pub fn unquote(hash: &str) -> &str {
    hash.trim_matches('"')
}

/// An object observed in the bucket listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteObject {
    /// Full object key (always under the listed prefix).
    pub key: String,
    /// Opaque content hash as reported by the store (possibly quoted).
    pub etag: String,
}

impl RemoteObject {
    /// Creates a remote object from a key and its `ETag`.
    #[must_use]
    pub fn new(key: impl Into<String>, etag: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            etag: etag.into(),
        }
    }

    /// Returns `true` if the remote content matches `hash`, ignoring quotes
    /// on either side.
    #[must_use]
    pub fn matches(&self, hash: &ContentHash) -> bool {
        unquote(&self.etag) == unquote(&hash.hex)
    }
}

/// Digest of a local file's contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentHash {
    /// Lowercase hex MD5, compared against remote `ETag`s.
    pub hex: String,
    /// Base64 MD5, sent as `Content-MD5` so the store can verify the body.
    pub base64: String,
    /// File size in bytes.
    pub size: u64,
}

/// A local file scheduled for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingUpload {
    /// Path of the file on disk.
    pub local_path: PathBuf,
    /// Destination key in the bucket.
    pub remote_key: String,
    /// Hash computed while planning; reused for the upload itself.
    pub hash: ContentHash,
}

impl PendingUpload {
    /// Size of the file in bytes.
    #[must_use]
    pub const fn size(&self) -> u64 {
        self.hash.size
    }
}

/// The outcome of comparing a local tree against one bucket listing.
///
/// Uploads and deletions never share a key: a key with a local counterpart
/// is never a deletion candidate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncPlan {
    /// Files that are new or whose contents changed, keyed by local path.
    pub uploads: BTreeMap<PathBuf, PendingUpload>,
    /// Remote keys with no local counterpart.
    pub deletions: Vec<String>,
}

impl SyncPlan {
    /// Returns `true` when there is nothing to upload or delete.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.uploads.is_empty() && self.deletions.is_empty()
    }

    /// Total bytes across all planned uploads.
    #[must_use]
    pub fn upload_bytes(&self) -> u64 {
        self.uploads.values().map(PendingUpload::size).sum()
    }
}

impl fmt::Display for SyncPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} upload(s), {} deletion(s)",
            self.uploads.len(),
            self.deletions.len()
        )
    }
}

/// A single key the store refused to delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteFailure {
    /// Object key.
    pub key: String,
    /// Store-specific error code (e.g. `AccessDenied`).
    pub code: String,
    /// Human-readable message from the store.
    pub message: String,
}

impl fmt::Display for DeleteFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {} - {}", self.key, self.code, self.message)
    }
}

/// A submitted CDN invalidation. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidationRequest {
    /// Distribution the invalidation was sent to.
    pub distribution_id: String,
    /// Identifier assigned by the CDN.
    pub request_id: String,
    /// Paths included in the request.
    pub paths: Vec<String>,
}

/// Progress of an invalidation as reported by the CDN.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidationStatus {
    /// Still propagating; carries the raw status string.
    InProgress(String),
    /// Finished.
    Completed,
}

impl InvalidationStatus {
    /// Returns `true` once the invalidation has finished.
    #[must_use]
    pub const fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

impl From<&str> for InvalidationStatus {
    fn from(status: &str) -> Self {
        if status == INVALIDATION_COMPLETED {
            Self::Completed
        } else {
            Self::InProgress(status.to_string())
        }
    }
}

/// An access key pair, passed through unchanged to the storage and CDN
/// clients.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Access key ID.
    pub access_key: String,
    /// Secret access key.
    pub secret_key: String,
}

impl Credentials {
    /// Creates a new key pair.
    #[must_use]
    pub fn new(access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}
