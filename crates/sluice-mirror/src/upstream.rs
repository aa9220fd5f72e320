//! Client for the upstream provider registry protocol.

use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sluice_provider::{Platform, Provider, SigningKeys};
use sluice_storage::ByteStream;
use url::Url;

use crate::error::MirrorError;

/// Where and how to reach upstream registries.
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
  /// URL scheme used to reach `{hostname}`.
  pub scheme: String,
  /// Path of the providers API below the host root.
  pub base_path: String,
  /// Deadline for each upstream request.
  pub timeout: Duration,
}

impl Default for UpstreamConfig {
  fn default() -> Self {
    Self {
      scheme: "https".to_string(),
      base_path: "v1/providers".to_string(),
      timeout: Duration::from_secs(10),
    }
  }
}

/// `GET .../{namespace}/{name}/versions` response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpstreamVersions {
  #[serde(default)]
  pub versions: Vec<UpstreamVersion>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpstreamVersion {
  pub version: String,
  #[serde(default)]
  pub protocols: Vec<String>,
  #[serde(default)]
  pub platforms: Vec<Platform>,
}

/// `GET .../{namespace}/{name}/{version}/download/{os}/{arch}` response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadMetadata {
  #[serde(default)]
  pub protocols: Vec<String>,
  #[serde(default)]
  pub os: String,
  #[serde(default)]
  pub arch: String,
  #[serde(default)]
  pub filename: String,
  pub download_url: String,
  #[serde(default)]
  pub shasums_url: Option<String>,
  #[serde(default)]
  pub shasums_signature_url: Option<String>,
  #[serde(default)]
  pub shasum: Option<String>,
  #[serde(default)]
  pub signing_keys: SigningKeys,
}

/// HTTP client for upstream registries.
#[derive(Debug, Clone)]
pub struct UpstreamClient {
  http: Client,
  config: UpstreamConfig,
}

impl UpstreamClient {
  pub fn new(config: UpstreamConfig) -> Result<Self, MirrorError> {
    let http = Client::builder()
      .timeout(config.timeout)
      .user_agent(concat!("sluice/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(MirrorError::Client)?;
    Ok(Self { http, config })
  }

  pub fn config(&self) -> &UpstreamConfig {
    &self.config
  }

  /// Build the versions endpoint for a provider.
  pub fn versions_endpoint(
    &self,
    hostname: &str,
    namespace: &str,
    name: &str,
  ) -> Result<VersionsEndpoint, MirrorError> {
    let url = self.provider_url(hostname, &[namespace, name, "versions"])?;
    Ok(VersionsEndpoint {
      http: self.http.clone(),
      url,
    })
  }

  /// Fetch the download document of a single provider build.
  pub async fn download(
    &self,
    hostname: &str,
    provider: &Provider,
  ) -> Result<(Url, DownloadMetadata), MirrorError> {
    let url = self.provider_url(
      hostname,
      &[
        &provider.namespace,
        &provider.name,
        &provider.version,
        "download",
        &provider.os,
        &provider.arch,
      ],
    )?;
    let metadata = get_json(&self.http, &url).await?;
    Ok((url, metadata))
  }

  /// Stream a response body.
  pub async fn stream(&self, url: &Url) -> Result<ByteStream, MirrorError> {
    let response = send(&self.http, url).await?;
    let body = response
      .bytes_stream()
      .map(|chunk| chunk.map_err(|e| sluice_storage::Error::Io(std::io::Error::other(e))));
    Ok(Box::pin(body))
  }

  /// Read a whole response body.
  pub async fn fetch_bytes(&self, url: &Url) -> Result<Bytes, MirrorError> {
    let response = send(&self.http, url).await?;
    response.bytes().await.map_err(|e| body_error(url, e))
  }

  fn provider_url(&self, hostname: &str, segments: &[&str]) -> Result<Url, MirrorError> {
    if hostname.is_empty() || hostname.contains(['/', '\\', '?', '#', '@']) {
      return Err(MirrorError::invalid_argument(format!(
        "invalid upstream hostname: {:?}",
        hostname
      )));
    }
    if segments.iter().any(|s| s.is_empty()) {
      return Err(MirrorError::invalid_argument(
        "upstream request is missing a path segment",
      ));
    }

    let mut url = Url::parse(&format!("{}://{}/", self.config.scheme, hostname))?;
    url
      .path_segments_mut()
      .map_err(|_| MirrorError::invalid_argument(format!("{} cannot be a base url", hostname)))?
      .pop_if_empty()
      .extend(self.config.base_path.split('/').filter(|s| !s.is_empty()))
      .extend(segments);
    Ok(url)
  }
}

/// A prepared call to one provider's versions listing.
#[derive(Debug)]
pub struct VersionsEndpoint {
  http: Client,
  url: Url,
}

impl VersionsEndpoint {
  pub fn url(&self) -> &Url {
    &self.url
  }

  pub async fn call(&self) -> Result<UpstreamVersions, MirrorError> {
    get_json(&self.http, &self.url).await
  }
}

async fn send(http: &Client, url: &Url) -> Result<reqwest::Response, MirrorError> {
  let response = http
    .get(url.clone())
    .send()
    .await
    .map_err(|source| send_error(url, source))?;

  let status = response.status();
  if !status.is_success() {
    return Err(MirrorError::UpstreamStatus {
      url: url.to_string(),
      status: status.as_u16(),
    });
  }
  Ok(response)
}

async fn get_json<T: DeserializeOwned>(http: &Client, url: &Url) -> Result<T, MirrorError> {
  let response = send(http, url).await?;
  response.json::<T>().await.map_err(|e| body_error(url, e))
}

/// Classify a failure while sending a request.
///
/// Only connect failures and timeouts mean the registry is unreachable.
fn send_error(url: &Url, source: reqwest::Error) -> MirrorError {
  if source.is_connect() || source.is_timeout() {
    MirrorError::Transport {
      url: url.to_string(),
      source,
    }
  } else {
    MirrorError::Request {
      url: url.to_string(),
      source,
    }
  }
}

/// Classify a failure while reading a response body.
fn body_error(url: &Url, source: reqwest::Error) -> MirrorError {
  if source.is_timeout() || source.is_connect() {
    MirrorError::Transport {
      url: url.to_string(),
      source,
    }
  } else {
    MirrorError::Decode {
      url: url.to_string(),
      source,
    }
  }
}
