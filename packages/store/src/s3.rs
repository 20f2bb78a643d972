//! [`ObjectStore`] backed by `aws-sdk-s3`.

use std::path::Path;

use async_trait::async_trait;
use aws_config::Region;
use aws_sdk_s3::config::Credentials as SdkCredentials;
use aws_sdk_s3::types::{Delete, ObjectCannedAcl, ObjectIdentifier};
use s3pub_models::{ContentHash, Credentials, DeleteFailure, RemoteObject};

use crate::body::progress_stream;
use crate::{ClientOptions, ObjectStore, StoreError};

/// Maximum number of keys S3 accepts in one `DeleteObjects` call.
const MAX_DELETE_BATCH: usize = 1000;

/// Client for one S3 bucket.
pub struct S3Store {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3Store {
    /// Creates a client for `bucket` using a static key pair.
    #[must_use]
    pub fn connect(bucket: &str, creds: &Credentials, options: &ClientOptions) -> Self {
        let sdk_creds = SdkCredentials::new(
            &creds.access_key,
            &creds.secret_key,
            None,
            None,
            "s3pub-static",
        );

        let mut builder = aws_sdk_s3::Config::builder()
            .region(Region::new(options.region.clone()))
            .credentials_provider(sdk_creds);

        if let Some(endpoint) = &options.endpoint_url {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Self {
            client: aws_sdk_s3::Client::from_conf(builder.build()),
            bucket: bucket.to_string(),
        }
    }

    fn delete_error(&self, source: impl Into<crate::BoxError>) -> StoreError {
        StoreError::Delete {
            bucket: self.bucket.clone(),
            source: source.into(),
        }
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn list(&self, prefix: &str) -> Result<Vec<RemoteObject>, StoreError> {
        log::info!("Listing s3://{}/{prefix}*", self.bucket);

        let mut objects = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix);

            if let Some(token) = &continuation_token {
                request = request.continuation_token(token);
            }

            let output = request.send().await.map_err(|e| StoreError::List {
                bucket: self.bucket.clone(),
                prefix: prefix.to_string(),
                source: Box::new(e),
            })?;

            for obj in output.contents() {
                if let Some(key) = obj.key() {
                    objects.push(RemoteObject::new(key, obj.e_tag().unwrap_or_default()));
                }
            }

            if output.is_truncated() == Some(true) {
                continuation_token = output.next_continuation_token().map(String::from);
            } else {
                break;
            }
        }

        log::info!("  found {} objects", objects.len());
        Ok(objects)
    }

    async fn put_object(
        &self,
        key: &str,
        local_path: &Path,
        hash: &ContentHash,
        on_progress: &(dyn Fn(u64) + Send + Sync),
    ) -> Result<(), StoreError> {
        #[allow(clippy::cast_precision_loss)] // display-only MB value
        let mb = hash.size as f64 / 1_048_576.0;
        log::info!(
            "Pushing {} -> s3://{}/{key} ({mb:.1} MB)",
            local_path.display(),
            self.bucket,
        );

        let content_length = i64::try_from(hash.size).map_err(|e| StoreError::Upload {
            bucket: self.bucket.clone(),
            key: key.to_string(),
            source: Box::new(e),
        })?;
        let (sent_tx, mut sent_rx) = tokio::sync::mpsc::unbounded_channel();

        let request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(progress_stream(local_path.to_path_buf(), hash.size, sent_tx))
            .content_length(content_length)
            .acl(ObjectCannedAcl::PublicRead)
            .content_md5(&hash.base64)
            .content_type(content_type_for(key))
            .send();
        let mut request = std::pin::pin!(request);

        // A retried attempt restarts from zero; only forward new highs.
        let mut reported = 0;
        let result = loop {
            tokio::select! {
                result = &mut request => break result,
                Some(sent) = sent_rx.recv() => {
                    if sent > reported {
                        reported = sent;
                        on_progress(sent);
                    }
                }
            }
        };

        result.map_err(|e| StoreError::Upload {
            bucket: self.bucket.clone(),
            key: key.to_string(),
            source: Box::new(e),
        })?;

        on_progress(hash.size);
        log::debug!("  uploaded {key}");
        Ok(())
    }

    async fn delete_objects(&self, keys: &[String]) -> Result<Vec<DeleteFailure>, StoreError> {
        log::info!("Deleting {} object(s) from s3://{}", keys.len(), self.bucket);

        let mut failures = Vec::new();

        for chunk in keys.chunks(MAX_DELETE_BATCH) {
            let objects = chunk
                .iter()
                .map(|key| ObjectIdentifier::builder().key(key).build())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| self.delete_error(e))?;

            let delete = Delete::builder()
                .set_objects(Some(objects))
                .quiet(true)
                .build()
                .map_err(|e| self.delete_error(e))?;

            let output = self
                .client
                .delete_objects()
                .bucket(&self.bucket)
                .delete(delete)
                .send()
                .await
                .map_err(|e| self.delete_error(e))?;

            failures.extend(output.errors().iter().map(|e| DeleteFailure {
                key: e.key().unwrap_or_default().to_string(),
                code: e.code().unwrap_or_default().to_string(),
                message: e.message().unwrap_or_default().to_string(),
            }));
        }

        Ok(failures)
    }

    async fn website_index_document(&self) -> Result<String, StoreError> {
        let result = self
            .client
            .get_bucket_website()
            .bucket(&self.bucket)
            .send()
            .await;

        match result {
            Ok(output) => output
                .index_document()
                .map(|doc| doc.suffix().to_string())
                .ok_or_else(|| StoreError::WebsiteNotConfigured {
                    bucket: self.bucket.clone(),
                }),
            // Any response from S3 itself (typically NoSuchWebsiteConfiguration)
            // means there is no usable configuration.
            Err(err) if err.as_service_error().is_some() => {
                log::debug!("get_bucket_website on {}: {err}", self.bucket);
                Err(StoreError::WebsiteNotConfigured {
                    bucket: self.bucket.clone(),
                })
            }
            Err(err) => Err(StoreError::Website {
                bucket: self.bucket.clone(),
                source: Box::new(err),
            }),
        }
    }
}

/// Guesses a `Content-Type` from the key's extension.
#[must_use]
pub fn content_type_for(key: &str) -> &'static str {
    let ext = key
        .rsplit_once('.')
        .filter(|(_, ext)| !ext.contains('/'))
        .map(|(_, ext)| ext.to_ascii_lowercase());

    match ext.as_deref() {
        Some("html" | "htm") => "text/html",
        Some("css") => "text/css",
        Some("js" | "mjs") => "application/javascript",
        Some("json") => "application/json",
        Some("xml") => "application/xml",
        Some("txt") => "text/plain",
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("ico") => "image/x-icon",
        Some("woff") => "font/woff",
        Some("woff2") => "font/woff2",
        Some("pdf") => "application/pdf",
        Some("wasm") => "application/wasm",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_type_by_extension() {
        assert_eq!(content_type_for("site/index.html"), "text/html");
        assert_eq!(content_type_for("a/b/STYLE.CSS"), "text/css");
        assert_eq!(content_type_for("logo.png"), "image/png");
        assert_eq!(content_type_for("no_extension"), "application/octet-stream");
        assert_eq!(content_type_for("dir.d/file"), "application/octet-stream");
    }

    #[tokio::test]
    async fn failed_transfer_never_reports_the_full_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.bin");
        std::fs::write(&path, vec![7u8; 600_000]).unwrap();
        let hash = crate::hash::compute_md5(&path).await.unwrap();
        let store = S3Store::connect(
            "bucket",
            &Credentials::new("access", "secret"),
            &ClientOptions {
                endpoint_url: Some("http://127.0.0.1:1".to_string()),
                ..ClientOptions::default()
            },
        );

        let seen = std::sync::Mutex::new(Vec::new());
        let result = store
            .put_object("big.bin", &path, &hash, &|n| seen.lock().unwrap().push(n))
            .await;

        assert!(matches!(result, Err(StoreError::Upload { ref key, .. }) if key == "big.bin"));
        assert!(seen.into_inner().unwrap().iter().all(|&n| n < hash.size));
    }
}
