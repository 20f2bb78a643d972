//! Bulk removal of keys that no longer exist locally.

use s3pub_store::ObjectStore;

use crate::SyncError;

/// Deletes `keys` with a single bulk request.
///
/// Per-key failures are collected into one [`SyncError::Deletion`] so the
/// operator sees every rejected key at once. An empty `keys` is a no-op.
///
/// # Errors
///
/// Returns [`SyncError::Deletion`] if any key was rejected and
/// [`SyncError::Store`] if the request itself failed.
pub async fn delete_all(store: &dyn ObjectStore, keys: &[String]) -> Result<(), SyncError> {
    if keys.is_empty() {
        return Ok(());
    }

    let failures = store.delete_objects(keys).await?;
    if failures.is_empty() {
        log::info!("Removed {} stale object(s)", keys.len());
        return Ok(());
    }

    log::error!("Problems were encountered trying to remove the following objects:");
    for failure in &failures {
        log::error!("  {failure}");
    }
    Err(SyncError::Deletion { failures })
}
