//! Diffing a local tree against a single bucket listing.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

use s3pub_models::{PendingUpload, RemoteObject, SyncPlan};
use s3pub_store::hash::compute_md5;

use crate::SyncError;

/// Compares `local` `(local_path, remote_key)` pairs against `listing` and
/// decides what to upload and what to delete.
///
/// * A listed key with a local counterpart is uploaded only if its content
///   hash differs (quotes ignored on both sides).
/// * A listed key without a local counterpart is a deletion when
///   `check_removed` is set and is otherwise left alone.
/// * A local file whose key never appeared in the listing is new and always
///   uploaded.
///
/// The listing is walked exactly once, so the plan reflects one consistent
/// snapshot of the bucket. Remote keys must be unique across `local`.
///
/// # Errors
///
/// Returns [`SyncError::Hash`] if a local file cannot be hashed.
pub async fn compute_changes(
    listing: &[RemoteObject],
    local: &[(PathBuf, String)],
    check_removed: bool,
) -> Result<SyncPlan, SyncError> {
    let by_key: HashMap<&str, &Path> = local
        .iter()
        .map(|(path, key)| (key.as_str(), path.as_path()))
        .collect();

    let mut uploads = BTreeMap::new();
    let mut deletions = Vec::new();
    let mut seen: HashSet<&str> = HashSet::new();

    for object in listing {
        seen.insert(object.key.as_str());

        let Some(local_path) = by_key.get(object.key.as_str()) else {
            if check_removed {
                deletions.push(object.key.clone());
            }
            continue;
        };

        let hash = hash_file(local_path).await?;
        if object.matches(&hash) {
            log::trace!("unchanged: {}", object.key);
        } else {
            log::debug!("changed: {}", object.key);
            uploads.insert(
                local_path.to_path_buf(),
                PendingUpload {
                    local_path: local_path.to_path_buf(),
                    remote_key: object.key.clone(),
                    hash,
                },
            );
        }
    }

    for (local_path, key) in local {
        if seen.contains(key.as_str()) {
            continue;
        }
        log::debug!("new: {key}");
        let hash = hash_file(local_path).await?;
        uploads.insert(
            local_path.clone(),
            PendingUpload {
                local_path: local_path.clone(),
                remote_key: key.clone(),
                hash,
            },
        );
    }

    Ok(SyncPlan { uploads, deletions })
}

async fn hash_file(path: &Path) -> Result<s3pub_models::ContentHash, SyncError> {
    compute_md5(path).await.map_err(|source| SyncError::Hash {
        path: path.to_path_buf(),
        source,
    })
}
