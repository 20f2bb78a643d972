#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CDN cache invalidation for keys changed by a sync.
//!
//! [`invalidate`] checks that the distribution exists, submits one
//! invalidation for every key, and optionally blocks until the CDN reports
//! it complete while animating a progress spinner.

pub mod monitor;

use std::collections::HashSet;
use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;

use futures::TryStreamExt;
use s3pub_models::progress::ProgressCallback;
use s3pub_models::{Credentials, InvalidationRequest};
use s3pub_store::{CdnClient, CloudFrontCdn, StoreError};

pub use monitor::{InvalidationMonitor, MonitorState, WaitOptions, Waiting};

/// Most paths CloudFront accepts in a single invalidation.
pub const MAX_INVALIDATION_PATHS: usize = 3000;

/// Errors that abort an invalidation.
#[derive(Debug, thiserror::Error)]
pub enum InvalidateError {
    /// The distribution ID is not among the account's distributions.
    #[error("Invalid distribution id: {distribution_id}")]
    UnknownDistribution {
        /// The ID that was not found.
        distribution_id: String,
    },

    /// There was nothing to invalidate.
    #[error("No paths to invalidate")]
    NoPaths,

    /// The optional deadline passed before the CDN reported completion.
    #[error("Invalidation request {request_id} did not complete within {waited:?}")]
    Timeout {
        /// Request being waited on.
        request_id: String,
        /// Configured deadline.
        waited: Duration,
    },

    /// A CDN call failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Invalidates `keys` on `distribution_id` using a static key pair.
///
/// When `progress` is given, waits for completion with default timing.
///
/// # Errors
///
/// See [`invalidate_with_client`].
pub async fn invalidate(
    distribution_id: &str,
    keys: &[String],
    creds: &Credentials,
    progress: Option<Arc<dyn ProgressCallback>>,
) -> Result<InvalidationRequest, InvalidateError> {
    let cdn = CloudFrontCdn::connect(creds);
    invalidate_with_client(&cdn, distribution_id, keys, progress, WaitOptions::default()).await
}

/// Invalidates `keys` on `distribution_id` through `cdn`.
///
/// # Errors
///
/// Returns [`InvalidateError::UnknownDistribution`] if the distribution does
/// not exist, [`InvalidateError::NoPaths`] for an empty key list,
/// [`InvalidateError::Timeout`] if a deadline was set and passed, and
/// [`InvalidateError::Store`] for CDN failures.
pub async fn invalidate_with_client(
    cdn: &dyn CdnClient,
    distribution_id: &str,
    keys: &[String],
    progress: Option<Arc<dyn ProgressCallback>>,
    options: WaitOptions,
) -> Result<InvalidationRequest, InvalidateError> {
    let request = create(cdn, distribution_id, keys).await?;
    if let Some(progress) = progress {
        wait(cdn, &request, progress.as_ref(), options).await?;
    }
    Ok(request)
}

/// Submits an invalidation for `keys`, dropping duplicate paths.
///
/// More than [`MAX_INVALIDATION_PATHS`] distinct paths are replaced by one
/// wildcard over the keys' common directory (see [`collapse_paths`]).
///
/// # Errors
///
/// Returns [`InvalidateError::UnknownDistribution`] if the distribution does
/// not exist and [`InvalidateError::NoPaths`] for an empty key list.
pub async fn create(
    cdn: &dyn CdnClient,
    distribution_id: &str,
    keys: &[String],
) -> Result<InvalidationRequest, InvalidateError> {
    if keys.is_empty() {
        return Err(InvalidateError::NoPaths);
    }

    let distributions = cdn.list_distributions().await?;
    if !distributions.iter().any(|id| id == distribution_id) {
        return Err(InvalidateError::UnknownDistribution {
            distribution_id: distribution_id.to_string(),
        });
    }

    let mut seen = HashSet::new();
    let paths: Vec<String> = keys
        .iter()
        .filter(|key| seen.insert(key.as_str()))
        .cloned()
        .collect();
    let paths = collapse_paths(paths);

    let request_id = cdn.create_invalidation(distribution_id, &paths).await?;
    log::info!(
        "Invalidation request {request_id} submitted to {distribution_id} for {} path(s)",
        paths.len()
    );

    Ok(InvalidationRequest {
        distribution_id: distribution_id.to_string(),
        request_id,
        paths,
    })
}

/// Returns `paths` unchanged when there are at most
/// [`MAX_INVALIDATION_PATHS`] of them. Otherwise returns a single wildcard
/// covering the longest directory prefix shared by every path, e.g.
/// `site/*`, or `*` when they share none.
#[must_use]
pub fn collapse_paths(paths: Vec<String>) -> Vec<String> {
    if paths.len() <= MAX_INVALIDATION_PATHS {
        return paths;
    }

    let mut common = paths.first().map_or("", String::as_str);
    for path in &paths[1..] {
        let shared = common
            .char_indices()
            .zip(path.chars())
            .find(|((_, a), b)| a != b)
            .map_or_else(|| common.len().min(path.len()), |((i, _), _)| i);
        common = &common[..shared];
    }
    let dir = common.rfind('/').map_or("", |i| &common[..=i]);

    log::warn!(
        "{} paths exceed the limit of {MAX_INVALIDATION_PATHS}; invalidating {dir}* instead",
        paths.len()
    );
    vec![format!("{dir}*")]
}

/// Blocks until `request` completes, ticking `progress` while waiting.
///
/// # Errors
///
/// Returns [`InvalidateError::Timeout`] if a deadline was set and passed and
/// [`InvalidateError::Store`] if a status query fails.
pub async fn wait(
    cdn: &dyn CdnClient,
    request: &InvalidationRequest,
    progress: &dyn ProgressCallback,
    options: WaitOptions,
) -> Result<(), InvalidateError> {
    progress.set_message(format!("Invalidation request {}", request.request_id));

    let mut signals = pin!(InvalidationMonitor::new(cdn, request, options).into_stream());
    while signals.try_next().await?.is_some() {
        progress.tick();
    }

    progress.finish("Done.".to_string());
    Ok(())
}
