use std::pin::Pin;
use std::task::{Context, Poll, ready};

use bytes::Bytes;
use futures::Stream;
use sha2::{Digest, Sha256};
use sluice_storage::{ByteStream, Error};

/// Passes an archive stream through while hashing it.
///
/// When the inner stream ends, the SHA-256 digest is compared against the
/// expected hex digest. On mismatch the stream yields a final
/// `InvalidData` error instead of ending, so a storage backend writing it
/// out never commits the archive.
pub struct VerifyingStream {
  inner: ByteStream,
  hasher: Option<Sha256>,
  expected: String,
}

impl VerifyingStream {
  pub fn new(inner: ByteStream, expected: impl Into<String>) -> Self {
    Self {
      inner,
      hasher: Some(Sha256::new()),
      expected: expected.into().trim().to_ascii_lowercase(),
    }
  }
}

impl Stream for VerifyingStream {
  type Item = Result<Bytes, Error>;

  fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
    let this = self.get_mut();
    let Some(hasher) = this.hasher.as_mut() else {
      return Poll::Ready(None);
    };

    match ready!(this.inner.as_mut().poll_next(cx)) {
      Some(Ok(chunk)) => {
        hasher.update(&chunk);
        Poll::Ready(Some(Ok(chunk)))
      }
      Some(Err(e)) => {
        this.hasher = None;
        Poll::Ready(Some(Err(e)))
      }
      None => {
        let actual = this.hasher.take().map(|h| hex::encode(h.finalize()));
        match actual {
          Some(actual) if actual != this.expected => {
            Poll::Ready(Some(Err(Error::Io(std::io::Error::new(
              std::io::ErrorKind::InvalidData,
              format!(
                "checksum mismatch: expected {}, got {}",
                this.expected, actual
              ),
            )))))
          }
          _ => Poll::Ready(None),
        }
      }
    }
  }
}
