//! In-memory [`ObjectStore`] and [`CdnClient`] doubles.
//!
//! Both record every call so tests can assert on what a sync or
//! invalidation actually did.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use s3pub_models::{ContentHash, DeleteFailure, InvalidationStatus, RemoteObject};

use crate::{CdnClient, ObjectStore, StoreError};

/// How [`MemoryStore::website_index_document`] responds.
#[derive(Debug, Clone)]
pub enum Website {
    /// Website hosting is configured with this index document.
    Index(String),
    /// Website hosting is not configured.
    NotConfigured,
    /// The lookup fails outright.
    Broken,
}

/// A bucket held in a `BTreeMap` of key to quoted `ETag`.
pub struct MemoryStore {
    bucket: String,
    objects: Mutex<BTreeMap<String, String>>,
    website: Website,
    rejected_deletes: BTreeMap<String, (String, String)>,
    failing_uploads: BTreeSet<String>,
    list_calls: AtomicUsize,
    uploads: Mutex<Vec<String>>,
    delete_requests: Mutex<Vec<Vec<String>>>,
}

impl MemoryStore {
    /// Creates an empty bucket without website hosting.
    #[must_use]
    pub fn new(bucket: &str) -> Self {
        Self {
            bucket: bucket.to_string(),
            objects: Mutex::new(BTreeMap::new()),
            website: Website::NotConfigured,
            rejected_deletes: BTreeMap::new(),
            failing_uploads: BTreeSet::new(),
            list_calls: AtomicUsize::new(0),
            uploads: Mutex::new(Vec::new()),
            delete_requests: Mutex::new(Vec::new()),
        }
    }

    /// Seeds an object. `etag` is stored quoted, the way S3 reports it.
    #[must_use]
    pub fn with_object(self, key: &str, etag: &str) -> Self {
        self.lock_objects()
            .insert(key.to_string(), format!("\"{etag}\""));
        self
    }

    /// Sets the website behaviour.
    #[must_use]
    pub fn with_website(mut self, website: Website) -> Self {
        self.website = website;
        self
    }

    /// Makes bulk deletes report `key` as failed.
    #[must_use]
    pub fn reject_delete(mut self, key: &str, code: &str, message: &str) -> Self {
        self.rejected_deletes
            .insert(key.to_string(), (code.to_string(), message.to_string()));
        self
    }

    /// Makes uploads to `key` fail.
    #[must_use]
    pub fn fail_upload(mut self, key: &str) -> Self {
        self.failing_uploads.insert(key.to_string());
        self
    }

    /// Current keys in the bucket.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.lock_objects().keys().cloned().collect()
    }

    /// Current `ETag` of `key`, if present.
    #[must_use]
    pub fn etag(&self, key: &str) -> Option<String> {
        self.lock_objects().get(key).cloned()
    }

    /// Keys uploaded so far, in upload order.
    #[must_use]
    pub fn uploaded(&self) -> Vec<String> {
        self.uploads
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Every bulk-delete request received.
    #[must_use]
    pub fn delete_requests(&self) -> Vec<Vec<String>> {
        self.delete_requests
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Number of listings performed.
    #[must_use]
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    fn lock_objects(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, String>> {
        self.objects
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn list(&self, prefix: &str) -> Result<Vec<RemoteObject>, StoreError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .lock_objects()
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, etag)| RemoteObject::new(key.as_str(), etag.as_str()))
            .collect())
    }

    async fn put_object(
        &self,
        key: &str,
        local_path: &Path,
        hash: &ContentHash,
        on_progress: &(dyn Fn(u64) + Send + Sync),
    ) -> Result<(), StoreError> {
        let data = tokio::fs::read(local_path).await?;

        if self.failing_uploads.contains(key) {
            return Err(StoreError::Upload {
                bucket: self.bucket.clone(),
                key: key.to_string(),
                source: "simulated transfer failure".into(),
            });
        }

        let half = data.len() as u64 / 2;
        if half > 0 {
            on_progress(half);
        }
        on_progress(data.len() as u64);

        self.lock_objects()
            .insert(key.to_string(), format!("\"{}\"", hash.hex));
        self.uploads
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(key.to_string());
        Ok(())
    }

    async fn delete_objects(&self, keys: &[String]) -> Result<Vec<DeleteFailure>, StoreError> {
        self.delete_requests
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(keys.to_vec());

        let mut failures = Vec::new();
        let mut objects = self.lock_objects();
        for key in keys {
            if let Some((code, message)) = self.rejected_deletes.get(key) {
                failures.push(DeleteFailure {
                    key: key.clone(),
                    code: code.clone(),
                    message: message.clone(),
                });
            } else {
                objects.remove(key);
            }
        }
        Ok(failures)
    }

    async fn website_index_document(&self) -> Result<String, StoreError> {
        match &self.website {
            Website::Index(name) => Ok(name.clone()),
            Website::NotConfigured => Err(StoreError::WebsiteNotConfigured {
                bucket: self.bucket.clone(),
            }),
            Website::Broken => Err(StoreError::Website {
                bucket: self.bucket.clone(),
                source: "simulated website lookup failure".into(),
            }),
        }
    }
}

/// A CDN that reports scripted statuses for every invalidation.
///
/// Each status query pops the next scripted value; once the script runs out
/// the invalidation reports as completed.
pub struct ScriptedCdn {
    distributions: Vec<String>,
    statuses: Mutex<VecDeque<String>>,
    status_calls: AtomicUsize,
    created: Mutex<Vec<(String, Vec<String>)>>,
}

impl ScriptedCdn {
    /// Creates a CDN account holding `distributions`.
    #[must_use]
    pub fn new(distributions: &[&str]) -> Self {
        Self {
            distributions: distributions.iter().map(ToString::to_string).collect(),
            statuses: Mutex::new(VecDeque::new()),
            status_calls: AtomicUsize::new(0),
            created: Mutex::new(Vec::new()),
        }
    }

    /// Scripts the sequence of statuses returned by status queries.
    #[must_use]
    pub fn with_statuses(self, statuses: &[&str]) -> Self {
        self.statuses
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .extend(statuses.iter().map(ToString::to_string));
        self
    }

    /// Number of status queries received.
    #[must_use]
    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    /// Every invalidation created, as `(distribution_id, paths)`.
    #[must_use]
    pub fn created(&self) -> Vec<(String, Vec<String>)> {
        self.created
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl CdnClient for ScriptedCdn {
    async fn list_distributions(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.distributions.clone())
    }

    async fn create_invalidation(
        &self,
        distribution_id: &str,
        paths: &[String],
    ) -> Result<String, StoreError> {
        let mut created = self
            .created
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        created.push((distribution_id.to_string(), paths.to_vec()));
        Ok(format!("I{}", created.len()))
    }

    async fn invalidation_status(
        &self,
        _distribution_id: &str,
        _request_id: &str,
    ) -> Result<InvalidationStatus, StoreError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let next = self
            .statuses
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .pop_front();
        Ok(next.map_or(InvalidationStatus::Completed, |s| {
            InvalidationStatus::from(s.as_str())
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn list_filters_by_prefix() {
        let store = MemoryStore::new("b")
            .with_object("site/a", "1")
            .with_object("site-old/b", "2")
            .with_object("other", "3");

        let keys: Vec<String> = store
            .list("site/")
            .await
            .unwrap()
            .into_iter()
            .map(|o| o.key)
            .collect();

        assert_eq!(keys, vec!["site/a".to_string()]);
        assert_eq!(store.list_calls(), 1);
    }

    #[tokio::test]
    async fn rejected_deletes_are_reported_and_kept() {
        let store = MemoryStore::new("b")
            .with_object("a", "1")
            .with_object("b", "2")
            .reject_delete("b", "AccessDenied", "Access Denied");

        let failures = store
            .delete_objects(&["a".to_string(), "b".to_string()])
            .await
            .unwrap();

        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].key, "b");
        assert_eq!(store.keys(), vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn scripted_cdn_completes_after_script() {
        let cdn = ScriptedCdn::new(&["D1"]).with_statuses(&["InProgress"]);
        assert!(!cdn.invalidation_status("D1", "I1").await.unwrap().is_completed());
        assert!(cdn.invalidation_status("D1", "I1").await.unwrap().is_completed());
        assert_eq!(cdn.status_calls(), 2);
    }
}
