//! MD5 content hashing for change detection.

use std::path::Path;

use s3pub_models::ContentHash;

/// Read buffer size for hashing and upload staging.
pub(crate) const CHUNK_SIZE: usize = 256 * 1024;

/// Computes the MD5 digest of a local file on a blocking thread.
///
/// # Errors
///
/// Returns an I/O error if the file cannot be opened or read.
pub async fn compute_md5(path: &Path) -> Result<ContentHash, std::io::Error> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || compute_md5_sync(&path))
        .await
        .map_err(std::io::Error::other)?
}

/// Synchronous MD5 computation, reading the file once in fixed-size chunks.
///
/// # Errors
///
/// Returns an I/O error if the file cannot be opened or read.
pub fn compute_md5_sync(path: &Path) -> Result<ContentHash, std::io::Error> {
    use std::io::Read;

    let mut file = std::fs::File::open(path)?;
    let mut context = md5::Context::new();
    let mut buffer = vec![0u8; CHUNK_SIZE];
    let mut size = 0u64;
    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        context.consume(&buffer[..n]);
        size += n as u64;
    }
    let digest = context.finalize();
    Ok(ContentHash {
        hex: format!("{digest:x}"),
        base64: aws_smithy_types::base64::encode(digest.0),
        size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hashes_file_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hello.txt");
        std::fs::write(&path, b"hello world").unwrap();

        let hash = compute_md5(&path).await.unwrap();

        assert_eq!(hash.hex, "5eb63bbbe01eeed093cb22bb8f5acdc3");
        assert_eq!(hash.base64, "XrY7u+Ae7tCTyyK7j1rNww==");
        assert_eq!(hash.size, 11);
    }

    #[test]
    fn hashes_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty");
        std::fs::write(&path, b"").unwrap();

        let hash = compute_md5_sync(&path).unwrap();

        assert_eq!(hash.hex, "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(hash.size, 0);
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(compute_md5_sync(&dir.path().join("nope")).is_err());
    }
}
