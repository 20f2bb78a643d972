#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Object store and CDN client contracts.
//!
//! The sync planner and invalidation poller only ever talk to an
//! [`ObjectStore`] and a [`CdnClient`]. Production runs use [`S3Store`] and
//! [`CloudFrontCdn`], both built from an explicit [`Credentials`] pair; tests
//! swap in the in-memory doubles from [`memory`] (enabled with the `memory`
//! feature).
//!
//! [`Credentials`]: s3pub_models::Credentials

mod body;
pub mod cloudfront;
pub mod hash;
#[cfg(any(test, feature = "memory"))]
pub mod memory;
pub mod s3;

use std::path::Path;

use async_trait::async_trait;
use s3pub_models::{ContentHash, DeleteFailure, InvalidationStatus, RemoteObject};

pub use cloudfront::CloudFrontCdn;
pub use s3::S3Store;

/// Boxed error from an underlying SDK call.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors reported by store and CDN clients.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// `ListObjectsV2` failed.
    #[error("Failed to list s3://{bucket}/{prefix}: {source}")]
    List {
        /// Bucket name.
        bucket: String,
        /// Key prefix.
        prefix: String,
        /// Underlying SDK error.
        source: BoxError,
    },

    /// `PutObject` failed.
    #[error("Failed to upload s3://{bucket}/{key}: {source}")]
    Upload {
        /// Bucket name.
        bucket: String,
        /// Object key.
        key: String,
        /// Underlying SDK error.
        source: BoxError,
    },

    /// The `DeleteObjects` request itself failed (as opposed to individual
    /// keys being rejected).
    #[error("Failed to delete objects from s3://{bucket}: {source}")]
    Delete {
        /// Bucket name.
        bucket: String,
        /// Underlying SDK error.
        source: BoxError,
    },

    /// The bucket has no website configuration. Callers treat this as
    /// "no index document", not as a failure.
    #[error("Bucket {bucket} has no website configuration")]
    WebsiteNotConfigured {
        /// Bucket name.
        bucket: String,
    },

    /// Fetching the website configuration failed for a reason other than it
    /// being absent.
    #[error("Failed to read website configuration of {bucket}: {source}")]
    Website {
        /// Bucket name.
        bucket: String,
        /// Underlying SDK error.
        source: BoxError,
    },

    /// A CDN API call failed.
    #[error("CDN {operation} failed: {source}")]
    Cdn {
        /// Name of the API operation.
        operation: &'static str,
        /// Underlying SDK error.
        source: BoxError,
    },

    /// I/O error reading a local file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Object storage operations needed to mirror a directory into a bucket.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Name of the bucket this store writes to.
    fn bucket(&self) -> &str;

    /// Lists every object under `prefix`, following pagination to the end.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::List`] if the listing fails.
    async fn list(&self, prefix: &str) -> Result<Vec<RemoteObject>, StoreError>;

    /// Uploads `local_path` to `key` with a public-read policy.
    ///
    /// `hash` was computed during planning; its base64 digest is sent along
    /// so the store can reject a corrupted body. The file is streamed, and
    /// `on_progress` receives the cumulative number of bytes of this file
    /// handed to the transport so far. It never moves backwards.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Upload`] on transport or storage failures and
    /// [`StoreError::Io`] if the file cannot be read.
    async fn put_object(
        &self,
        key: &str,
        local_path: &Path,
        hash: &ContentHash,
        on_progress: &(dyn Fn(u64) + Send + Sync),
    ) -> Result<(), StoreError>;

    /// Deletes `keys` in bulk, returning the keys the store refused.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Delete`] if the request as a whole fails.
    async fn delete_objects(&self, keys: &[String]) -> Result<Vec<DeleteFailure>, StoreError>;

    /// Returns the index document suffix from the bucket's website
    /// configuration.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::WebsiteNotConfigured`] if the bucket is not set
    /// up for website hosting and [`StoreError::Website`] for any other
    /// failure.
    async fn website_index_document(&self) -> Result<String, StoreError>;
}

/// CDN operations needed to purge cached copies of changed objects.
#[async_trait]
pub trait CdnClient: Send + Sync {
    /// Returns the IDs of every distribution in the account.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Cdn`] if the listing fails.
    async fn list_distributions(&self) -> Result<Vec<String>, StoreError>;

    /// Submits an invalidation for `paths` and returns its request ID.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Cdn`] if the request is rejected.
    async fn create_invalidation(
        &self,
        distribution_id: &str,
        paths: &[String],
    ) -> Result<String, StoreError>;

    /// Reports the current status of an invalidation.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Cdn`] if the status cannot be fetched.
    async fn invalidation_status(
        &self,
        distribution_id: &str,
        request_id: &str,
    ) -> Result<InvalidationStatus, StoreError>;
}

/// Connection settings shared by the S3 and CloudFront clients.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Region used for request signing.
    pub region: String,
    /// Custom endpoint for S3-compatible stores. Enables path-style
    /// addressing when set.
    pub endpoint_url: Option<String>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            region: DEFAULT_REGION.to_string(),
            endpoint_url: None,
        }
    }
}

/// Region used when none is configured.
pub const DEFAULT_REGION: &str = "us-east-1";
