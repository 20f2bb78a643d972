#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! One-way mirror of a local directory into an object-storage bucket.
//!
//! A run walks the source tree, lists the bucket once, and diffs the two by
//! MD5 content hash (see [`plan::compute_changes`]). Changed and new files
//! are uploaded one at a time with public-read access; keys that no longer
//! exist locally are removed in one bulk request. The return value is every
//! key that changed, plus directory forms of uploaded website index
//! documents, ready to hand to a CDN invalidation.
//!
//! Failures are terminal. Nothing is retried and completed uploads are not
//! rolled back, so a failed run can leave the bucket partially updated.

pub mod delete;
pub mod index;
pub mod path;
pub mod plan;
pub mod upload;
pub mod walk;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use s3pub_models::progress::ProgressCallback;
use s3pub_models::{Credentials, DeleteFailure};
use s3pub_store::{ClientOptions, ObjectStore, S3Store, StoreError};

use crate::upload::BatchProgress;

/// Errors that abort a sync run.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The destination string was blank.
    #[error("Invalid destination: {destination:?}")]
    InvalidDestination {
        /// Destination as given (after trimming).
        destination: String,
    },

    /// A file failed to upload. Files uploaded before it remain in place.
    #[error("Failed to upload {key}: {source}")]
    Upload {
        /// Destination key of the failed file.
        key: String,
        /// Underlying store error.
        source: StoreError,
    },

    /// The store refused to delete one or more keys.
    #[error("Errors reported by the store while removing objects:\n{}", list_failures(.failures))]
    Deletion {
        /// Every rejected key with its code and message.
        failures: Vec<DeleteFailure>,
    },

    /// A local file could not be hashed.
    #[error("Failed to hash {}: {source}", path.display())]
    Hash {
        /// File that could not be read.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The source directory could not be walked.
    #[error("Failed to read source directory {}: {source}", root.display())]
    Walk {
        /// Source directory.
        root: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Listing, website lookup, or bulk delete request failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// I/O error outside of hashing and walking.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn list_failures(failures: &[DeleteFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("  {f}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Mirrors `source_dir` into `destination` (`bucket` or `bucket/prefix`)
/// using a static key pair.
///
/// When `delete_stale` is set, objects under the prefix with no local
/// counterpart are removed. Returns the keys to invalidate.
///
/// # Errors
///
/// Returns [`SyncError::InvalidDestination`] before touching the network if
/// `destination` is blank; otherwise see [`sync_with_store`].
pub async fn sync(
    source_dir: &Path,
    destination: &str,
    delete_stale: bool,
    creds: &Credentials,
    options: &ClientOptions,
    progress: Arc<dyn ProgressCallback>,
) -> Result<Vec<String>, SyncError> {
    let (bucket, prefix) = path::split_destination(destination)?;
    let store = S3Store::connect(&bucket, creds, options);
    sync_with_store(&store, source_dir, &prefix, delete_stale, progress).await
}

/// Mirrors `source_dir` into `store` under `key_prefix`.
///
/// # Errors
///
/// Returns [`SyncError::Walk`] or [`SyncError::Hash`] for local read
/// failures, [`SyncError::Upload`] for the first failed upload,
/// [`SyncError::Deletion`] if stale keys could not all be removed, and
/// [`SyncError::Store`] for listing or website lookup failures.
pub async fn sync_with_store(
    store: &dyn ObjectStore,
    source_dir: &Path,
    key_prefix: &str,
    delete_stale: bool,
    progress: Arc<dyn ProgressCallback>,
) -> Result<Vec<String>, SyncError> {
    let prefix = key_prefix.trim_end_matches('/');

    let root = source_dir.to_path_buf();
    let files = tokio::task::spawn_blocking(move || walk::local_files(&root))
        .await
        .map_err(std::io::Error::other)?
        .map_err(|source| SyncError::Walk {
            root: source_dir.to_path_buf(),
            source,
        })?;
    log::info!("Found {} local file(s) in {}", files.len(), source_dir.display());

    let root = source_dir.to_string_lossy();
    let pairs: Vec<(PathBuf, String)> = files
        .into_iter()
        .map(|file| {
            let key = path::remote_path(prefix, &file.to_string_lossy(), &root);
            (file, key)
        })
        .collect();

    let list_prefix = if prefix.is_empty() {
        String::new()
    } else {
        format!("{prefix}/")
    };
    let listing = store.list(&list_prefix).await?;

    let plan = plan::compute_changes(&listing, &pairs, delete_stale).await?;
    log::info!("Plan for s3://{}/{list_prefix}: {plan}", store.bucket());

    if plan.is_empty() {
        return Ok(Vec::new());
    }

    let mut invalidate = Vec::new();

    if !plan.uploads.is_empty() {
        let batch = BatchProgress::new(progress, &plan);
        for pending in plan.uploads.values() {
            upload::upload(store, pending, &batch).await?;
            invalidate.push(pending.remote_key.clone());
        }
        batch.finish();
    }

    let index_document = index::index_document(store).await?;
    invalidate.extend(index::expand_index_paths(
        plan.uploads.values().map(|u| u.remote_key.as_str()),
        index_document.as_deref(),
    ));

    if delete_stale && !plan.deletions.is_empty() {
        delete::delete_all(store, &plan.deletions).await?;
        invalidate.extend(plan.deletions);
    }

    Ok(invalidate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    use s3pub_models::progress::null_progress;
    use s3pub_store::hash::compute_md5_sync;
    use s3pub_store::memory::{MemoryStore, Website};

    fn write(root: &Path, rel: &str, contents: &str) -> String {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, contents).unwrap();
        compute_md5_sync(&path).unwrap().hex
    }

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(ToString::to_string).collect()
    }

    #[tokio::test]
    async fn first_sync_uploads_everything_under_prefix() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "index.html", "home");
        write(dir.path(), "css/site.css", "body{}");
        let store = MemoryStore::new("bucket");

        let keys = sync_with_store(&store, dir.path(), "www", true, null_progress())
            .await
            .unwrap();

        assert_eq!(
            keys.into_iter().collect::<BTreeSet<_>>(),
            set(&["www/index.html", "www/css/site.css"])
        );
        assert_eq!(
            store.keys().into_iter().collect::<BTreeSet<_>>(),
            set(&["www/index.html", "www/css/site.css"])
        );
    }

    #[tokio::test]
    async fn unchanged_tree_returns_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let hash = write(dir.path(), "a.txt", "a");
        let store = MemoryStore::new("bucket").with_object("a.txt", &hash);

        let keys = sync_with_store(&store, dir.path(), "", true, null_progress())
            .await
            .unwrap();

        assert!(keys.is_empty());
        assert!(store.uploaded().is_empty());
        assert!(store.delete_requests().is_empty());
        assert_eq!(store.list_calls(), 1);
    }

    #[tokio::test]
    async fn changed_new_and_stale_keys_are_all_reported() {
        let dir = tempfile::tempdir().unwrap();
        let same = write(dir.path(), "same.txt", "same");
        write(dir.path(), "changed.txt", "new contents");
        write(dir.path(), "added.txt", "added");
        let store = MemoryStore::new("bucket")
            .with_object("p/same.txt", &same)
            .with_object("p/changed.txt", "0000")
            .with_object("p/stale.txt", "1111");

        let keys = sync_with_store(&store, dir.path(), "p", true, null_progress())
            .await
            .unwrap();

        assert_eq!(
            keys.into_iter().collect::<BTreeSet<_>>(),
            set(&["p/changed.txt", "p/added.txt", "p/stale.txt"])
        );
        assert_eq!(
            store.keys().into_iter().collect::<BTreeSet<_>>(),
            set(&["p/same.txt", "p/changed.txt", "p/added.txt"])
        );
    }

    #[tokio::test]
    async fn stale_keys_survive_without_delete() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.txt", "a");
        let store = MemoryStore::new("bucket").with_object("stale.txt", "1111");

        let keys = sync_with_store(&store, dir.path(), "", false, null_progress())
            .await
            .unwrap();

        assert_eq!(keys, vec!["a.txt".to_string()]);
        assert!(store.delete_requests().is_empty());
        assert!(store.keys().contains(&"stale.txt".to_string()));
    }

    #[tokio::test]
    async fn sibling_prefixes_are_never_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let hash = write(dir.path(), "a.txt", "a");
        let store = MemoryStore::new("bucket")
            .with_object("site/a.txt", &hash)
            .with_object("site-old/a.txt", "1111");

        let keys = sync_with_store(&store, dir.path(), "site/", true, null_progress())
            .await
            .unwrap();

        assert!(keys.is_empty());
        assert!(store.keys().contains(&"site-old/a.txt".to_string()));
    }

    #[tokio::test]
    async fn website_index_adds_directory_paths() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "hello/index.html", "hi");
        write(dir.path(), "path1", "p");
        let store = MemoryStore::new("bucket").with_website(Website::Index("index.html".into()));

        let keys = sync_with_store(&store, dir.path(), "", false, null_progress())
            .await
            .unwrap();

        assert_eq!(
            keys.into_iter().collect::<BTreeSet<_>>(),
            set(&["hello/index.html", "hello", "hello/", "path1"])
        );
    }

    #[tokio::test]
    async fn broken_website_lookup_aborts() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.txt", "a");
        let store = MemoryStore::new("bucket").with_website(Website::Broken);

        let err = sync_with_store(&store, dir.path(), "", false, null_progress())
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::Store(StoreError::Website { .. })));
    }

    #[tokio::test]
    async fn failed_upload_stops_the_run() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.txt", "a");
        write(dir.path(), "b.txt", "b");
        write(dir.path(), "c.txt", "c");
        let store = MemoryStore::new("bucket")
            .with_object("stale", "1111")
            .fail_upload("b.txt");

        let err = sync_with_store(&store, dir.path(), "", true, null_progress())
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::Upload { ref key, .. } if key == "b.txt"));
        // Uploads are ordered by local path, so a.txt went first and stays.
        assert_eq!(store.uploaded(), vec!["a.txt".to_string()]);
        assert!(store.delete_requests().is_empty());
    }

    #[tokio::test]
    async fn deletion_failures_abort_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let hash = write(dir.path(), "a.txt", "a");
        let store = MemoryStore::new("bucket")
            .with_object("a.txt", &hash)
            .with_object("gone.txt", "1111")
            .reject_delete("gone.txt", "AccessDenied", "Access Denied");

        let err = sync_with_store(&store, dir.path(), "", true, null_progress())
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::Deletion { ref failures } if failures.len() == 1));
    }

    #[tokio::test]
    async fn blank_destination_fails_before_connecting() {
        let dir = tempfile::tempdir().unwrap();
        let err = sync(
            dir.path(),
            "  ",
            true,
            &Credentials::new("a", "b"),
            &ClientOptions::default(),
            null_progress(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, SyncError::InvalidDestination { .. }));
    }
}
