//! [`CdnClient`] backed by `aws-sdk-cloudfront`.

use async_trait::async_trait;
use aws_config::Region;
use aws_sdk_cloudfront::config::Credentials as SdkCredentials;
use aws_sdk_cloudfront::types::{InvalidationBatch, Paths};
use s3pub_models::{Credentials, InvalidationStatus};

use crate::{CdnClient, DEFAULT_REGION, StoreError};

/// CloudFront client.
pub struct CloudFrontCdn {
    client: aws_sdk_cloudfront::Client,
}

impl CloudFrontCdn {
    /// Creates a client using a static key pair. CloudFront is a global
    /// service, so requests are always signed for `us-east-1`.
    #[must_use]
    pub fn connect(creds: &Credentials) -> Self {
        let sdk_creds = SdkCredentials::new(
            &creds.access_key,
            &creds.secret_key,
            None,
            None,
            "s3pub-static",
        );

        let config = aws_sdk_cloudfront::Config::builder()
            .region(Region::new(DEFAULT_REGION))
            .credentials_provider(sdk_creds)
            .build();

        Self {
            client: aws_sdk_cloudfront::Client::from_conf(config),
        }
    }
}

fn cdn_error(operation: &'static str, source: impl Into<crate::BoxError>) -> StoreError {
    StoreError::Cdn {
        operation,
        source: source.into(),
    }
}

#[async_trait]
impl CdnClient for CloudFrontCdn {
    async fn list_distributions(&self) -> Result<Vec<String>, StoreError> {
        let mut ids = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let output = self
                .client
                .list_distributions()
                .set_marker(marker.take())
                .send()
                .await
                .map_err(|e| cdn_error("ListDistributions", e))?;

            let Some(list) = output.distribution_list() else {
                break;
            };

            ids.extend(list.items().iter().map(|d| d.id().to_string()));

            match list.next_marker() {
                Some(next) if list.is_truncated() => marker = Some(next.to_string()),
                _ => break,
            }
        }

        log::debug!("found {} distribution(s)", ids.len());
        Ok(ids)
    }

    async fn create_invalidation(
        &self,
        distribution_id: &str,
        paths: &[String],
    ) -> Result<String, StoreError> {
        // "" and "/" both encode to "/"
        let mut items: Vec<String> = Vec::with_capacity(paths.len());
        for path in paths.iter().map(|p| encode_path(p)) {
            if !items.contains(&path) {
                items.push(path);
            }
        }
        let quantity = i32::try_from(items.len())
            .map_err(|e| cdn_error("CreateInvalidation", e))?;

        let paths = Paths::builder()
            .quantity(quantity)
            .set_items(Some(items))
            .build()
            .map_err(|e| cdn_error("CreateInvalidation", e))?;

        let batch = InvalidationBatch::builder()
            .paths(paths)
            .caller_reference(uuid::Uuid::new_v4().to_string())
            .build()
            .map_err(|e| cdn_error("CreateInvalidation", e))?;

        let output = self
            .client
            .create_invalidation()
            .distribution_id(distribution_id)
            .invalidation_batch(batch)
            .send()
            .await
            .map_err(|e| cdn_error("CreateInvalidation", e))?;

        output
            .invalidation()
            .map(|inv| inv.id().to_string())
            .ok_or_else(|| cdn_error("CreateInvalidation", "response carried no invalidation"))
    }

    async fn invalidation_status(
        &self,
        distribution_id: &str,
        request_id: &str,
    ) -> Result<InvalidationStatus, StoreError> {
        let output = self
            .client
            .get_invalidation()
            .distribution_id(distribution_id)
            .id(request_id)
            .send()
            .await
            .map_err(|e| cdn_error("GetInvalidation", e))?;

        output
            .invalidation()
            .map(|inv| InvalidationStatus::from(inv.status()))
            .ok_or_else(|| cdn_error("GetInvalidation", "response carried no invalidation"))
    }
}

/// Turns an object key into a CloudFront invalidation path: absolute, with
/// everything except unreserved characters, `/` and `*` percent-encoded.
#[must_use]
pub fn encode_path(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 1);
    if !key.starts_with('/') {
        out.push('/');
    }
    for byte in key.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' | b'/' | b'*' => {
                out.push(char::from(byte));
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}
