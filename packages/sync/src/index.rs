//! Website index document handling for invalidation paths.
//!
//! A CDN in front of a website bucket can serve `hello/index.html` for
//! requests to `hello` and `hello/`, so both directory forms have to be
//! invalidated alongside the object itself.

use s3pub_store::{ObjectStore, StoreError};

/// Looks up the bucket's index document.
///
/// A bucket without website hosting yields `Ok(None)`.
///
/// # Errors
///
/// Propagates every [`StoreError`] other than
/// [`StoreError::WebsiteNotConfigured`].
pub async fn index_document(store: &dyn ObjectStore) -> Result<Option<String>, StoreError> {
    match store.website_index_document().await {
        Ok(name) if name.is_empty() => Ok(None),
        Ok(name) => Ok(Some(name)),
        Err(StoreError::WebsiteNotConfigured { bucket }) => {
            log::debug!("{bucket} has no website configuration; skipping index paths");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Returns the directory paths to invalidate for every uploaded key whose
/// file name equals `index_document`: the parent directory both with and
/// without a trailing `/`.
///
/// Each key is expanded independently, so nested index documents each
/// contribute their own pair.
#[must_use]
pub fn expand_index_paths<'a>(
    uploaded_keys: impl IntoIterator<Item = &'a str>,
    index_document: Option<&str>,
) -> Vec<String> {
    let Some(index_document) = index_document else {
        return Vec::new();
    };

    uploaded_keys
        .into_iter()
        .filter_map(|key| {
            let (parent, name) = key.rsplit_once('/').unwrap_or(("", key));
            (name == index_document).then(|| [parent.to_string(), format!("{parent}/")])
        })
        .flatten()
        .collect()
}
