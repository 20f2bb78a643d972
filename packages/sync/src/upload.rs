//! Uploading planned files with batch-wide byte progress.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use s3pub_models::{PendingUpload, SyncPlan};
use s3pub_models::progress::ProgressCallback;
use s3pub_store::ObjectStore;

use crate::SyncError;

/// Receives per-file progress during an upload batch.
pub trait ProgressSink: Send + Sync {
    /// Called once before each file's transfer starts.
    fn change_file(&self, local_path: &Path);

    /// Bytes of the current file transferred so far.
    fn increment(&self, bytes_so_far: u64);
}

#[derive(Default)]
struct BatchState {
    /// Bytes of every file finished before the current one.
    completed: u64,
    current: Option<PathBuf>,
    file_num: usize,
}

/// Translates per-file progress into a single position across the whole
/// batch and forwards it to a [`ProgressCallback`].
pub struct BatchProgress {
    callback: Arc<dyn ProgressCallback>,
    sizes: BTreeMap<PathBuf, u64>,
    state: Mutex<BatchState>,
}

impl BatchProgress {
    /// Creates a tracker for the uploads in `plan`, sizing the callback's
    /// total to the plan's upload bytes.
    #[must_use]
    pub fn new(callback: Arc<dyn ProgressCallback>, plan: &SyncPlan) -> Self {
        let sizes: BTreeMap<PathBuf, u64> = plan
            .uploads
            .values()
            .map(|u| (u.local_path.clone(), u.size()))
            .collect();
        callback.set_total(plan.upload_bytes());
        Self {
            callback,
            sizes,
            state: Mutex::new(BatchState::default()),
        }
    }

    /// Marks the batch finished.
    pub fn finish(&self) {
        let state = self.lock();
        self.callback
            .finish(format!("Uploaded {} file(s)", state.file_num));
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BatchState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn size_of(&self, path: &Path) -> u64 {
        self.sizes.get(path).copied().unwrap_or(0)
    }
}

impl ProgressSink for BatchProgress {
    fn change_file(&self, local_path: &Path) {
        let mut state = self.lock();
        if let Some(previous) = state.current.take() {
            state.completed += self.size_of(&previous);
        }
        state.current = Some(local_path.to_path_buf());
        state.file_num += 1;

        self.callback.set_message(format!(
            "{} ({}/{})",
            local_path.display(),
            state.file_num,
            self.sizes.len()
        ));
        self.callback.set_position(state.completed);
    }

    fn increment(&self, bytes_so_far: u64) {
        let state = self.lock();
        let cap = state.current.as_deref().map_or(0, |p| self.size_of(p));
        self.callback
            .set_position(state.completed + bytes_so_far.min(cap));
    }
}

/// Uploads one planned file, reporting progress through `progress`.
///
/// There is no retry: a failed transfer is returned to the caller, and files
/// uploaded earlier in the batch stay uploaded.
///
/// # Errors
///
/// Returns [`SyncError::Upload`] if the store rejects the transfer or the
/// file cannot be read.
pub async fn upload(
    store: &dyn ObjectStore,
    pending: &PendingUpload,
    progress: &dyn ProgressSink,
) -> Result<(), SyncError> {
    progress.change_file(&pending.local_path);

    store
        .put_object(
            &pending.remote_key,
            &pending.local_path,
            &pending.hash,
            &|done| progress.increment(done),
        )
        .await
        .map_err(|source| SyncError::Upload {
            key: pending.remote_key.clone(),
            source,
        })
}
