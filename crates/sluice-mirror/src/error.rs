//! Error types for mirror services.

use sluice_storage::ProviderFilter;
use thiserror::Error;

/// Errors that can occur while answering a mirror request.
#[derive(Debug, Error)]
pub enum MirrorError {
  /// A required identifier is missing or unusable.
  #[error("invalid argument: {message}")]
  InvalidArgument { message: String },

  /// Nothing is cached locally for the request.
  #[error("provider {filter} is not mirrored: {source}")]
  NotMirrored {
    filter: ProviderFilter,
    #[source]
    source: std::io::Error,
  },

  /// A provider name could not be derived or decoded.
  #[error(transparent)]
  Provider(#[from] sluice_provider::Error),

  /// The upstream registry could not be reached.
  #[error("couldn't reach upstream registry at {url}: {source}")]
  Transport {
    url: String,
    #[source]
    source: reqwest::Error,
  },

  /// A request to the upstream registry failed for a reason other than
  /// reachability, such as a redirect loop.
  #[error("request to upstream registry at {url} failed: {source}")]
  Request {
    url: String,
    #[source]
    source: reqwest::Error,
  },

  /// The upstream registry answered with a non-success status.
  #[error("upstream registry at {url} responded with status {status}")]
  UpstreamStatus { url: String, status: u16 },

  /// The upstream registry answered with a body we could not read.
  #[error("invalid response from upstream registry at {url}: {source}")]
  Decode {
    url: String,
    #[source]
    source: reqwest::Error,
  },

  /// An upstream URL could not be built.
  #[error("invalid upstream url: {0}")]
  Url(#[from] url::ParseError),

  /// The HTTP client could not be created.
  #[error("failed to create http client: {0}")]
  Client(#[source] reqwest::Error),

  /// Any other storage failure.
  #[error("storage error: {0}")]
  Storage(#[source] sluice_storage::Error),

  /// A spawned lookup panicked or was aborted.
  #[error("lookup task failed: {message}")]
  Task { message: String },

  /// The request was cancelled.
  #[error("request cancelled")]
  Cancelled,
}

/// Discriminant used to decide whether a failure degrades or aborts a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
  InvalidArgument,
  NotMirrored,
  Parse,
  Transport,
  Other,
}

impl MirrorError {
  pub fn invalid_argument(message: impl Into<String>) -> Self {
    Self::InvalidArgument {
      message: message.into(),
    }
  }

  pub fn kind(&self) -> ErrorKind {
    match self {
      Self::InvalidArgument { .. } => ErrorKind::InvalidArgument,
      Self::NotMirrored { .. } => ErrorKind::NotMirrored,
      Self::Provider(e) if e.is_parse() => ErrorKind::Parse,
      Self::Provider(_) => ErrorKind::InvalidArgument,
      Self::Transport { .. } => ErrorKind::Transport,
      Self::Request { .. }
      | Self::UpstreamStatus { .. }
      | Self::Decode { .. }
      | Self::Url(_)
      | Self::Client(_)
      | Self::Storage(_)
      | Self::Task { .. }
      | Self::Cancelled => ErrorKind::Other,
    }
  }
}

impl From<sluice_storage::Error> for MirrorError {
  fn from(e: sluice_storage::Error) -> Self {
    match e {
      sluice_storage::Error::NotMirrored { filter, source } => Self::NotMirrored { filter, source },
      sluice_storage::Error::Provider(e) => Self::Provider(e),
      sluice_storage::Error::InvalidSegment { value } => Self::InvalidArgument {
        message: format!("invalid path segment: {:?}", value),
      },
      other => Self::Storage(other),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_storage_errors_keep_their_kind() {
    let filter = ProviderFilter::new("h", "ns", "n");
    let not_mirrored: MirrorError = sluice_storage::Error::NotMirrored {
      filter,
      source: std::io::Error::from(std::io::ErrorKind::NotFound),
    }
    .into();
    assert_eq!(not_mirrored.kind(), ErrorKind::NotMirrored);

    let segment: MirrorError = sluice_storage::Error::InvalidSegment {
      value: "..".to_string(),
    }
    .into();
    assert_eq!(segment.kind(), ErrorKind::InvalidArgument);

    let io: MirrorError = sluice_storage::Error::Io(std::io::Error::other("disk on fire")).into();
    assert_eq!(io.kind(), ErrorKind::Other);
  }

  #[test]
  fn test_provider_errors() {
    let parse: MirrorError = sluice_provider::Error::ArchiveName {
      filename: "x.zip".to_string(),
    }
    .into();
    assert_eq!(parse.kind(), ErrorKind::Parse);

    let empty: MirrorError = sluice_provider::Error::Empty { field: "os" }.into();
    assert_eq!(empty.kind(), ErrorKind::InvalidArgument);
  }
}
