//! Streaming upload body that reports bytes as the HTTP client pulls them.

use std::path::PathBuf;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use aws_smithy_types::body::SdkBody;
use aws_smithy_types::byte_stream::ByteStream;
use bytes::Bytes;
use http_body::{Body, Frame, SizeHint};
use tokio::io::{AsyncRead, ReadBuf};
use tokio::sync::mpsc::UnboundedSender;

use crate::hash::CHUNK_SIZE;

/// Reads a file in [`CHUNK_SIZE`] frames, sending the running total of bytes
/// handed to the client after each frame.
///
/// The file is opened on the first poll so a retried request can build a
/// fresh body that starts again from byte zero.
pub(crate) struct ProgressBody {
    path: PathBuf,
    file: Option<tokio::fs::File>,
    remaining: u64,
    sent: u64,
    buffer: Vec<u8>,
    progress: UnboundedSender<u64>,
}

impl ProgressBody {
    pub(crate) fn new(path: PathBuf, size: u64, progress: UnboundedSender<u64>) -> Self {
        Self {
            path,
            file: None,
            remaining: size,
            sent: 0,
            buffer: vec![0u8; CHUNK_SIZE],
            progress,
        }
    }
}

impl Body for ProgressBody {
    type Data = Bytes;
    type Error = std::io::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        if this.remaining == 0 {
            return Poll::Ready(None);
        }

        if this.file.is_none() {
            match std::fs::File::open(&this.path) {
                Ok(file) => this.file = Some(tokio::fs::File::from_std(file)),
                Err(e) => return Poll::Ready(Some(Err(e))),
            }
        }
        let Some(file) = this.file.as_mut() else {
            return Poll::Ready(None);
        };

        let limit = usize::try_from(this.remaining).map_or(CHUNK_SIZE, |r| r.min(CHUNK_SIZE));
        let mut buf = ReadBuf::new(&mut this.buffer[..limit]);
        if let Err(e) = ready!(Pin::new(file).poll_read(cx, &mut buf)) {
            return Poll::Ready(Some(Err(e)));
        }

        let chunk = buf.filled();
        if chunk.is_empty() {
            return Poll::Ready(Some(Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("{} shrank during upload", this.path.display()),
            ))));
        }

        let data = Bytes::copy_from_slice(chunk);
        let n = data.len() as u64;
        this.remaining -= n;
        this.sent += n;
        // the receiver is gone once the request has finished
        let _ = this.progress.send(this.sent);

        Poll::Ready(Some(Ok(Frame::data(data))))
    }

    fn is_end_stream(&self) -> bool {
        self.remaining == 0
    }

    fn size_hint(&self) -> SizeHint {
        SizeHint::with_exact(self.remaining)
    }
}

/// Builds a retryable [`ByteStream`] over `path`. Every attempt streams the
/// file from the start and reports through `progress`.
pub(crate) fn progress_stream(
    path: PathBuf,
    size: u64,
    progress: UnboundedSender<u64>,
) -> ByteStream {
    ByteStream::new(SdkBody::retryable(move || {
        SdkBody::from_body_1_x(ProgressBody::new(path.clone(), size, progress.clone()))
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[tokio::test]
    async fn streams_file_and_reports_running_total() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.bin");
        let contents: Vec<u8> = (0..CHUNK_SIZE * 2 + 10)
            .map(|i| u8::try_from(i % 251).unwrap())
            .collect();
        std::fs::write(&path, &contents).unwrap();

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let body = ProgressBody::new(path, contents.len() as u64, tx);
        assert_eq!(body.size_hint().exact(), Some(contents.len() as u64));

        let collected = body.collect().await.unwrap().to_bytes();

        assert_eq!(collected.as_ref(), contents.as_slice());
        let mut seen = Vec::new();
        while let Ok(sent) = rx.try_recv() {
            seen.push(sent);
        }
        assert!(seen.len() >= 3);
        assert_eq!(seen.last().copied(), Some(contents.len() as u64));
        assert!(
            seen.windows(2)
                .all(|w| w[0] < w[1] && w[1] - w[0] <= CHUNK_SIZE as u64)
        );
    }

    #[tokio::test]
    async fn missing_file_is_a_body_error() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let body = ProgressBody::new(dir.path().join("gone"), 3, tx);

        assert!(body.collect().await.is_err());
    }
}
