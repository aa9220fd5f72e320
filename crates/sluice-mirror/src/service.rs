use std::sync::Arc;

use async_trait::async_trait;
use sluice_provider::Provider;
use sluice_storage::ByteStream;

use crate::error::MirrorError;
use crate::types::{Archives, ProviderVersions};

/// The provider network mirror protocol.
#[async_trait]
pub trait MirrorService: Send + Sync {
  /// Determine which versions are available for a provider.
  async fn list_versions(
    &self,
    hostname: &str,
    namespace: &str,
    name: &str,
  ) -> Result<ProviderVersions, MirrorError>;

  /// List the installation packages available for one version of a provider.
  async fn list_installation(
    &self,
    hostname: &str,
    namespace: &str,
    name: &str,
    version: &str,
  ) -> Result<Archives, MirrorError>;

  /// Stream the archive of a single provider build.
  async fn retrieve_archive(
    &self,
    hostname: &str,
    provider: &Provider,
  ) -> Result<ByteStream, MirrorError>;
}

#[async_trait]
impl<T: MirrorService + ?Sized> MirrorService for Arc<T> {
  async fn list_versions(
    &self,
    hostname: &str,
    namespace: &str,
    name: &str,
  ) -> Result<ProviderVersions, MirrorError> {
    (**self).list_versions(hostname, namespace, name).await
  }

  async fn list_installation(
    &self,
    hostname: &str,
    namespace: &str,
    name: &str,
    version: &str,
  ) -> Result<Archives, MirrorError> {
    (**self)
      .list_installation(hostname, namespace, name, version)
      .await
  }

  async fn retrieve_archive(
    &self,
    hostname: &str,
    provider: &Provider,
  ) -> Result<ByteStream, MirrorError> {
    (**self).retrieve_archive(hostname, provider).await
  }
}

/// Fail with [`MirrorError::InvalidArgument`] naming the first empty identifier.
pub(crate) fn require_identifiers(fields: &[(&str, &str)]) -> Result<(), MirrorError> {
  match fields.iter().find(|(_, value)| value.is_empty()) {
    Some((field, _)) => Err(MirrorError::invalid_argument(format!("{} is required", field))),
    None => Ok(()),
  }
}
