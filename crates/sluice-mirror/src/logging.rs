use std::time::Instant;

use async_trait::async_trait;
use sluice_provider::Provider;
use sluice_storage::ByteStream;
use tracing::{error, info};

use crate::error::MirrorError;
use crate::service::MirrorService;
use crate::types::{Archives, ProviderVersions};

/// Records one event per call to the wrapped service.
pub struct LoggingService<S> {
  next: S,
}

impl<S: MirrorService> LoggingService<S> {
  pub fn new(next: S) -> Self {
    Self { next }
  }
}

/// Emit the completion event for one call.
fn record<T>(op: &'static str, started: Instant, result: &Result<T, MirrorError>, ids: &[&str]) {
  let took_ms = started.elapsed().as_millis() as u64;
  let ids = ids.join("/");
  match result {
    Ok(_) => info!(op, provider = %ids, took_ms, "mirror_request"),
    Err(e) => error!(op, provider = %ids, took_ms, error = %e, "mirror_request_failed"),
  }
}

#[async_trait]
impl<S: MirrorService> MirrorService for LoggingService<S> {
  async fn list_versions(
    &self,
    hostname: &str,
    namespace: &str,
    name: &str,
  ) -> Result<ProviderVersions, MirrorError> {
    let started = Instant::now();
    let result = self.next.list_versions(hostname, namespace, name).await;
    record("list_versions", started, &result, &[hostname, namespace, name]);
    result
  }

  async fn list_installation(
    &self,
    hostname: &str,
    namespace: &str,
    name: &str,
    version: &str,
  ) -> Result<Archives, MirrorError> {
    let started = Instant::now();
    let result = self
      .next
      .list_installation(hostname, namespace, name, version)
      .await;
    record(
      "list_installation",
      started,
      &result,
      &[hostname, namespace, name, version],
    );
    result
  }

  async fn retrieve_archive(
    &self,
    hostname: &str,
    provider: &Provider,
  ) -> Result<ByteStream, MirrorError> {
    let started = Instant::now();
    let result = self.next.retrieve_archive(hostname, provider).await;
    let filename = provider.archive_filename().unwrap_or_default();
    record(
      "retrieve_archive",
      started,
      &result,
      &[hostname, provider.namespace.as_str(), filename.as_str()],
    );
    result
  }
}
