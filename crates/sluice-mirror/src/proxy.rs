//! Pull-through proxy in front of another mirror service.
//!
//! Listing requests are answered by querying the wrapped service and the
//! upstream registry at the same time and merging both answers. Either side
//! may degrade: an unreachable upstream leaves the cached answer, and a
//! provider that was never mirrored leaves the upstream answer. Any other
//! failure aborts the request and cancels the sibling lookup.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use sluice_provider::Provider;
use sluice_storage::{ByteStream, Storage};
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::endpoint::{EndpointCache, EndpointKey};
use crate::error::{ErrorKind, MirrorError};
use crate::service::{MirrorService, require_identifiers};
use crate::types::{Archive, Archives, ProviderVersions};
use crate::upstream::{UpstreamClient, UpstreamVersions, VersionsEndpoint};
use crate::verify::VerifyingStream;

/// Which side of a fan-out a result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Branch {
  Local,
  Upstream,
}

/// Mirror service that merges a wrapped service with the upstream registry.
pub struct ProxyRegistry<S> {
  next: Arc<S>,
  upstream: UpstreamClient,
  endpoints: EndpointCache,
  pull_through: Option<Arc<dyn Storage>>,
  shutdown: CancellationToken,
}

impl<S: MirrorService + 'static> ProxyRegistry<S> {
  pub fn new(next: S, upstream: UpstreamClient) -> Self {
    Self {
      next: Arc::new(next),
      upstream,
      endpoints: EndpointCache::new(),
      pull_through: None,
      shutdown: CancellationToken::new(),
    }
  }

  /// Store archives fetched from upstream when the wrapped service misses.
  pub fn with_pull_through(mut self, storage: Arc<dyn Storage>) -> Self {
    self.pull_through = Some(storage);
    self
  }

  /// Cancel in-flight lookups when `shutdown` is cancelled.
  pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
    self.shutdown = shutdown;
    self
  }

  pub fn endpoints(&self) -> &EndpointCache {
    &self.endpoints
  }

  fn versions_endpoint(
    &self,
    hostname: &str,
    namespace: &str,
    name: &str,
  ) -> Result<Arc<VersionsEndpoint>, MirrorError> {
    let key = EndpointKey::new(hostname, namespace, name);
    self
      .endpoints
      .get_or_build(&key, || self.upstream.versions_endpoint(hostname, namespace, name))
  }

  /// Run the local and upstream lookups concurrently.
  ///
  /// Both lookups share one cancellation token, a child of the shutdown
  /// token. It is cancelled as soon as either side fails fatally, and when
  /// the returned future is dropped.
  async fn fan_out<A, B>(
    &self,
    local: impl Future<Output = Result<A, MirrorError>> + Send + 'static,
    upstream: impl Future<Output = Result<B, MirrorError>> + Send + 'static,
  ) -> Result<(Option<A>, Option<B>), MirrorError>
  where
    A: Send + 'static,
    B: Send + 'static,
  {
    let cancel = self.shutdown.child_token();
    let _guard = cancel.clone().drop_guard();

    let local = spawn_branch(cancel.clone(), local);
    let upstream = spawn_branch(cancel.clone(), upstream);

    let local = async {
      settle(Branch::Local, local.await).inspect_err(|_| cancel.cancel())
    };
    let upstream = async {
      settle(Branch::Upstream, upstream.await).inspect_err(|_| cancel.cancel())
    };

    futures::future::try_join(local, upstream).await
  }

  async fn pull(
    &self,
    storage: &dyn Storage,
    hostname: &str,
    provider: &Provider,
  ) -> Result<(), MirrorError> {
    let (document_url, metadata) = self.upstream.download(hostname, provider).await?;

    let download_url = document_url.join(&metadata.download_url)?;
    let body = self.upstream.stream(&download_url).await?;
    let body: ByteStream = match &metadata.shasum {
      Some(shasum) => Box::pin(VerifyingStream::new(body, shasum.as_str())),
      None => {
        warn!(url = %download_url, "upstream_archive_has_no_checksum");
        body
      }
    };
    storage.store_mirrored(hostname, provider, body).await?;
    info!(provider = %provider, url = %download_url, "archive_pulled");

    let Some(shasums_url) = &metadata.shasums_url else {
      return Ok(());
    };
    let shasums_url = document_url.join(shasums_url)?;
    let stored = match self.upstream.fetch_bytes(&shasums_url).await {
      Ok(data) => storage
        .store_mirrored_checksums(hostname, provider, data)
        .await
        .map_err(MirrorError::from),
      Err(e) => Err(e),
    };
    if let Err(e) = stored {
      warn!(url = %shasums_url, error = %e, "checksums_not_stored");
    }
    Ok(())
  }
}

#[async_trait]
impl<S: MirrorService + 'static> MirrorService for ProxyRegistry<S> {
  #[instrument(skip(self), level = "debug")]
  async fn list_versions(
    &self,
    hostname: &str,
    namespace: &str,
    name: &str,
  ) -> Result<ProviderVersions, MirrorError> {
    require_identifiers(&[("hostname", hostname), ("namespace", namespace), ("name", name)])?;
    let endpoint = self.versions_endpoint(hostname, namespace, name)?;

    let next = self.next.clone();
    let (h, ns, n) = (hostname.to_string(), namespace.to_string(), name.to_string());
    let local = async move { next.list_versions(&h, &ns, &n).await };
    let upstream = async move { endpoint.call().await.map(|v| upstream_versions(&v)) };

    let (cached, upstream) = self.fan_out(local, upstream).await?;

    let mut versions = cached.unwrap_or_default();
    versions.merge(upstream.unwrap_or_default());
    Ok(versions)
  }

  #[instrument(skip(self), level = "debug")]
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
    let endpoint = self.versions_endpoint(hostname, namespace, name)?;

    let next = self.next.clone();
    let (h, ns, n, v) = (
      hostname.to_string(),
      namespace.to_string(),
      name.to_string(),
      version.to_string(),
    );
    let local = {
      let (ns, n, v) = (ns.clone(), n.clone(), v.clone());
      async move { next.list_installation(&h, &ns, &n, &v).await }
    };
    let upstream = async move {
      let versions = endpoint.call().await?;
      upstream_archives(&versions, &ns, &n, &v)
    };

    let (cached, upstream) = self.fan_out(local, upstream).await?;

    let mut archives = cached.unwrap_or_default();
    archives.overlay(upstream.unwrap_or_default());
    Ok(archives)
  }

  #[instrument(skip(self, provider), fields(provider = %provider), level = "debug")]
  async fn retrieve_archive(
    &self,
    hostname: &str,
    provider: &Provider,
  ) -> Result<ByteStream, MirrorError> {
    let err = match self.next.retrieve_archive(hostname, provider).await {
      Err(e) if e.kind() == ErrorKind::NotMirrored => e,
      other => return other,
    };
    let Some(storage) = &self.pull_through else {
      return Err(err);
    };

    info!(provider = %provider, "archive_not_mirrored_pulling");
    self.pull(storage.as_ref(), hostname, provider).await?;
    self.next.retrieve_archive(hostname, provider).await
  }
}

fn spawn_branch<T, F>(
  cancel: CancellationToken,
  lookup: F,
) -> tokio::task::JoinHandle<Result<T, MirrorError>>
where
  T: Send + 'static,
  F: Future<Output = Result<T, MirrorError>> + Send + 'static,
{
  tokio::spawn(async move {
    tokio::select! {
        result = lookup => result,
        _ = cancel.cancelled() => Err(MirrorError::Cancelled),
    }
  })
}

/// Decide whether a finished lookup degrades to nothing or fails the request.
fn settle<T>(
  branch: Branch,
  joined: Result<Result<T, MirrorError>, JoinError>,
) -> Result<Option<T>, MirrorError> {
  let result = joined.map_err(|e| MirrorError::Task {
    message: e.to_string(),
  })?;

  match result {
    Ok(value) => Ok(Some(value)),
    Err(e) if branch == Branch::Local && e.kind() == ErrorKind::NotMirrored => {
      info!(error = %e, "provider_not_mirrored");
      Ok(None)
    }
    Err(e) if branch == Branch::Upstream && e.kind() == ErrorKind::Transport => {
      warn!(error = %e, "upstream_unreachable");
      Ok(None)
    }
    Err(e) => Err(e),
  }
}

/// Versions reported by upstream.
pub fn upstream_versions(versions: &UpstreamVersions) -> ProviderVersions {
  versions.versions.iter().map(|v| v.version.as_str()).collect()
}

/// Archives of one version, built from the platforms upstream reports for it.
///
/// Urls point at the flat archive filename, which this mirror serves; hashes
/// are unknown until the archive has been pulled.
pub fn upstream_archives(
  versions: &UpstreamVersions,
  namespace: &str,
  name: &str,
  version: &str,
) -> Result<Archives, MirrorError> {
  let mut archives = Archives::new();
  let Some(entry) = versions.versions.iter().find(|v| v.version == version) else {
    return Ok(archives);
  };

  for platform in &entry.platforms {
    if platform.os.is_empty() || platform.arch.is_empty() {
      continue;
    }
    let provider = Provider::new("", namespace, name, version, platform.clone());
    archives.insert(
      platform.key(),
      Archive {
        url: provider.archive_filename()?,
        hashes: None,
      },
    );
  }
  Ok(archives)
}

#[cfg(test)]
mod tests {
  use sluice_provider::Platform;

  use super::*;
  use crate::upstream::UpstreamVersion;

  fn upstream() -> UpstreamVersions {
    UpstreamVersions {
      versions: vec![
        UpstreamVersion {
          version: "2.0.0".to_string(),
          protocols: vec!["5.0".to_string()],
          platforms: vec![
            Platform::new("linux", "amd64"),
            Platform::new("darwin", "arm64"),
            Platform::new("", "amd64"),
          ],
        },
        UpstreamVersion {
          version: "2.1.0".to_string(),
          ..Default::default()
        },
      ],
    }
  }

  #[test]
  fn test_upstream_versions() {
    let versions = upstream_versions(&upstream());
    assert_eq!(versions.iter().collect::<Vec<_>>(), vec!["2.0.0", "2.1.0"]);
  }

  #[test]
  fn test_upstream_archives_skips_incomplete_platforms() {
    let archives = upstream_archives(&upstream(), "hashicorp", "random", "2.0.0").unwrap();
    assert_eq!(archives.len(), 2);
    assert_eq!(
      archives.get("darwin_arm64").unwrap(),
      &Archive {
        url: "terraform-provider-random_2.0.0_darwin_arm64.zip".to_string(),
        hashes: None,
      }
    );
  }

  #[test]
  fn test_upstream_archives_unknown_version() {
    let archives = upstream_archives(&upstream(), "hashicorp", "random", "9.0.0").unwrap();
    assert!(archives.is_empty());
  }

  #[test]
  fn test_settle_degrades_by_branch() {
    let not_mirrored = || MirrorError::NotMirrored {
      filter: sluice_storage::ProviderFilter::new("h", "ns", "n"),
      source: std::io::Error::from(std::io::ErrorKind::NotFound),
    };

    let local: Result<Option<()>, _> = settle(Branch::Local, Ok(Err(not_mirrored())));
    assert!(matches!(local, Ok(None)));

    let upstream: Result<Option<()>, _> = settle(Branch::Upstream, Ok(Err(not_mirrored())));
    assert_eq!(upstream.unwrap_err().kind(), ErrorKind::NotMirrored);

    let invalid: Result<Option<()>, _> =
      settle(Branch::Local, Ok(Err(MirrorError::invalid_argument("x"))));
    assert_eq!(invalid.unwrap_err().kind(), ErrorKind::InvalidArgument);

    let ok = settle(Branch::Upstream, Ok(Ok(7)));
    assert_eq!(ok.unwrap(), Some(7));
  }
}
