//! Sluice Storage
//!
//! This crate provides the storage trait and implementations for provider
//! archives. The [`Storage`] trait is the only thing the mirror services know
//! about the backing store; [`FsStorage`] implements it on a local directory.
//!
//! Storage keeps no index. Providers are discovered by walking the directory
//! tree and decoding the filenames or labelled path segments found there, so
//! the functions in [`layout`] and the discovery walk must stay exact inverses
//! of each other.
//!
//! The trait uses async streaming for archive bodies, which can be large.

mod filter;
mod fs;
pub mod layout;

pub use filter::ProviderFilter;
pub use fs::FsStorage;

use std::collections::HashMap;
use std::path::PathBuf;
use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use sluice_provider::{Provider, SigningKeys};

/// A boxed stream of bytes for archive data.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, Error>> + Send>>;

/// Error type for storage operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
  /// Nothing is cached for the filter; the scan or open could not complete.
  #[error("provider {filter} is not mirrored: {source}")]
  NotMirrored {
    filter: ProviderFilter,
    #[source]
    source: std::io::Error,
  },

  /// A provider name could not be derived or decoded.
  #[error(transparent)]
  Provider(#[from] sluice_provider::Error),

  /// An identifier cannot be used as a path segment.
  #[error("invalid path segment: {value:?}")]
  InvalidSegment { value: String },

  /// A signing keys document is malformed.
  #[error("invalid signing keys at {}: {source}", path.display())]
  SigningKeys {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  /// An I/O error occurred.
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}

impl Error {
  pub(crate) fn not_mirrored(filter: &ProviderFilter, source: std::io::Error) -> Self {
    Self::NotMirrored {
      filter: filter.clone(),
      source,
    }
  }
}

/// Storage trait for provider archives.
///
/// Implementations provide the actual backend (filesystem, object storage, etc.).
#[async_trait]
pub trait Storage: Send + Sync {
  /// Providers cached from upstream registries, matching the filter.
  ///
  /// Returns [`Error::NotMirrored`] when nothing could be scanned for the filter.
  async fn mirrored_providers(&self, filter: &ProviderFilter) -> Result<Vec<Provider>, Error>;

  /// Providers uploaded by an operator, matching the filter.
  async fn custom_providers(&self, filter: &ProviderFilter) -> Result<Vec<Provider>, Error>;

  /// Open a mirrored archive for reading.
  async fn open_archive(&self, hostname: &str, provider: &Provider) -> Result<ByteStream, Error>;

  /// Checksums recorded for the provider's version, keyed by archive filename.
  ///
  /// An empty map means no checksum list is cached.
  async fn archive_checksums(
    &self,
    hostname: &str,
    provider: &Provider,
  ) -> Result<HashMap<String, String>, Error>;

  /// Store a mirrored archive.
  ///
  /// Readers must never observe a partially written archive.
  async fn store_mirrored(
    &self,
    hostname: &str,
    provider: &Provider,
    data: ByteStream,
  ) -> Result<(), Error>;

  /// Store the checksum list for the provider's version.
  async fn store_mirrored_checksums(
    &self,
    hostname: &str,
    provider: &Provider,
    data: Bytes,
  ) -> Result<(), Error>;

  /// Signing keys published for a namespace of custom providers.
  async fn signing_keys(&self, namespace: &str) -> Result<Option<SigningKeys>, Error>;
}
