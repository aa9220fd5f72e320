use std::sync::Arc;

use async_trait::async_trait;
use sluice_provider::Provider;
use sluice_storage::{ByteStream, ProviderFilter, Storage};

use crate::error::MirrorError;
use crate::service::{MirrorService, require_identifiers};
use crate::types::{Archive, Archives, ProviderVersions};

/// Mirror service backed only by storage.
///
/// This is the view of what is already cached; it performs no network I/O.
/// Archives are laid out as:
/// ```text
/// {root}/mirror/
/// └── registry.terraform.io/
///     └── hashicorp/
///         └── random/
///             ├── terraform-provider-random_2.0.0_linux_amd64.zip
///             └── terraform-provider-random_2.0.0_SHA256SUMS (optional)
/// ```
pub struct LocalRegistry {
  storage: Arc<dyn Storage>,
}

impl LocalRegistry {
  pub fn new(storage: Arc<dyn Storage>) -> Self {
    Self { storage }
  }

  /// Get the storage backend.
  pub fn storage(&self) -> &Arc<dyn Storage> {
    &self.storage
  }
}

#[async_trait]
impl MirrorService for LocalRegistry {
  async fn list_versions(
    &self,
    hostname: &str,
    namespace: &str,
    name: &str,
  ) -> Result<ProviderVersions, MirrorError> {
    require_identifiers(&[("hostname", hostname), ("namespace", namespace), ("name", name)])?;

    let filter = ProviderFilter::new(hostname, namespace, name);
    let providers = self.storage.mirrored_providers(&filter).await?;

    Ok(providers.into_iter().map(|p| p.version).collect())
  }

  async fn list_installation(
    &self,
    hostname: &str,
    namespace: &str,
    name: &str,
    version: &str,
  ) -> Result<Archives, MirrorError> {
    require_identifiers(&[
      ("hostname", hostname),
      ("namespace", namespace),
      ("name", name),
      ("version", version),
    ])?;

    let filter = ProviderFilter::new(hostname, namespace, name).with_version(version);
    let providers = self.storage.mirrored_providers(&filter).await?;

    let checksums = match providers.first() {
      Some(first) => self.storage.archive_checksums(hostname, first).await?,
      None => Default::default(),
    };

    let mut archives = Archives::new();
    for provider in providers {
      let filename = provider.archive_filename()?;
      let hashes = checksums
        .get(&filename)
        .map(|digest| vec![format!("zh:{}", digest)]);

      archives.insert(
        provider.platform().key(),
        Archive {
          url: filename,
          hashes,
        },
      );
    }

    Ok(archives)
  }

  async fn retrieve_archive(
    &self,
    hostname: &str,
    provider: &Provider,
  ) -> Result<ByteStream, MirrorError> {
    require_identifiers(&[("hostname", hostname), ("namespace", &provider.namespace)])?;
    Ok(self.storage.open_archive(hostname, provider).await?)
  }
}
