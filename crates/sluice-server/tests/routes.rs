//! Route tests against a server bound to a local port.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::StatusCode;
use serde_json::{Value, json};
use sluice_mirror::{Archives, LocalRegistry, MirrorError, MirrorService, ProviderVersions};
use sluice_provider::{Platform, Provider};
use sluice_server::{ApiKeys, router, serve};
use sluice_storage::{ByteStream, FsStorage, Storage, layout};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const HOST: &str = "registry.terraform.io";
const KEY: &str = "secret";

struct Server {
  base: String,
  http: reqwest::Client,
  shutdown: CancellationToken,
  _dir: Option<TempDir>,
}

impl Server {
  async fn start(service: Arc<dyn MirrorService>, dir: Option<TempDir>) -> Self {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = CancellationToken::new();
    let app = router(service, Arc::new(ApiKeys::new([KEY])));
    tokio::spawn(serve(listener, app, shutdown.clone()));

    Self {
      base: format!("http://{}", addr),
      http: reqwest::Client::new(),
      shutdown,
      _dir: dir,
    }
  }

  async fn get(&self, path: &str, token: Option<&str>) -> reqwest::Response {
    let mut request = self.http.get(format!("{}{}", self.base, path));
    if let Some(token) = token {
      request = request.header("Authorization", token);
    }
    request.send().await.unwrap()
  }
}

impl Drop for Server {
  fn drop(&mut self) {
    self.shutdown.cancel();
  }
}

fn provider(version: &str, os: &str, arch: &str) -> Provider {
  Provider::new(HOST, "hashicorp", "random", version, Platform::new(os, arch))
}

/// A server backed by a storage directory holding two builds of 2.0.0.
async fn local_server() -> Server {
  let dir = TempDir::new().unwrap();
  let storage = Arc::new(FsStorage::new(dir.path()).unwrap());

  let linux = provider("2.0.0", "linux", "amd64");
  for p in [&linux, &provider("2.0.0", "darwin", "arm64")] {
    let path = layout::mirror_archive_path(storage.root(), HOST, p).unwrap();
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, format!("zip for {}", p.platform())).unwrap();
  }
  let sums = format!("{}  {}\n", "cd".repeat(32), linux.archive_filename().unwrap());
  storage
    .store_mirrored_checksums(HOST, &linux, Bytes::from(sums))
    .await
    .unwrap();

  Server::start(Arc::new(LocalRegistry::new(storage)), Some(dir)).await
}

struct Broken;

#[async_trait]
impl MirrorService for Broken {
  async fn list_versions(&self, _: &str, _: &str, _: &str) -> Result<ProviderVersions, MirrorError> {
    Err(MirrorError::UpstreamStatus {
      url: "https://registry.terraform.io/v1/providers/hashicorp/random/versions".to_string(),
      status: 502,
    })
  }

  async fn list_installation(
    &self,
    _: &str,
    _: &str,
    _: &str,
    _: &str,
  ) -> Result<Archives, MirrorError> {
    Err(MirrorError::Cancelled)
  }

  async fn retrieve_archive(&self, _: &str, _: &Provider) -> Result<ByteStream, MirrorError> {
    Err(MirrorError::Cancelled)
  }
}

#[tokio::test]
async fn test_health_needs_no_credentials() {
  let server = local_server().await;
  let response = server.get("/health", None).await;
  assert_eq!(response.status(), StatusCode::OK);
  assert_eq!(response.text().await.unwrap(), "ok");
}

#[tokio::test]
async fn test_requires_valid_api_key() {
  let server = local_server().await;
  let path = "/registry.terraform.io/hashicorp/random/index.json";

  let response = server.get(path, None).await;
  assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
  let body: Value = response.json().await.unwrap();
  assert!(body["error"].is_string());

  let response = server.get(path, Some("Bearer wrong")).await;
  assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

  // Credentials are checked before the path is decoded.
  let response = server.get("/registry.terraform.io/hashicorp/random/x.txt", None).await;
  assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_list_versions() {
  let server = local_server().await;
  let response = server
    .get("/registry.terraform.io/hashicorp/random/index.json", Some("Bearer secret"))
    .await;

  assert_eq!(response.status(), StatusCode::OK);
  let body: Value = response.json().await.unwrap();
  assert_eq!(body, json!({"versions": {"2.0.0": {}}}));
}

#[tokio::test]
async fn test_list_installation() {
  let server = local_server().await;
  let response = server
    .get("/registry.terraform.io/hashicorp/random/2.0.0.json", Some(KEY))
    .await;

  assert_eq!(response.status(), StatusCode::OK);
  let body: Value = response.json().await.unwrap();
  assert_eq!(
    body,
    json!({
      "archives": {
        "darwin_arm64": {"url": "terraform-provider-random_2.0.0_darwin_arm64.zip"},
        "linux_amd64": {
          "url": "terraform-provider-random_2.0.0_linux_amd64.zip",
          "hashes": [format!("zh:{}", "cd".repeat(32))]
        }
      }
    })
  );
}

#[tokio::test]
async fn test_retrieve_archive() {
  let server = local_server().await;
  let response = server
    .get(
      "/registry.terraform.io/hashicorp/random/terraform-provider-random_2.0.0_linux_amd64.zip",
      Some(KEY),
    )
    .await;

  assert_eq!(response.status(), StatusCode::OK);
  assert_eq!(
    response.headers()["content-type"].to_str().unwrap(),
    "application/zip"
  );
  assert_eq!(response.text().await.unwrap(), "zip for linux_amd64");
}

#[tokio::test]
async fn test_malformed_paths_are_bad_requests() {
  let server = local_server().await;

  for path in [
    "/registry.terraform.io/hashicorp/random/random.txt",
    "/registry.terraform.io/hashicorp/random/.json",
    "/registry.terraform.io/hashicorp/random/terraform-provider-random.zip",
    "/registry.terraform.io/hashicorp/random/terraform-provider-null_2.0.0_linux_amd64.zip",
  ] {
    let response = server.get(path, Some(KEY)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST, "path {}", path);
    let body: Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("path segment"));
  }
}

#[tokio::test]
async fn test_service_failures_are_server_errors() {
  let server = Server::start(Arc::new(Broken), None).await;

  let response = server
    .get("/registry.terraform.io/hashicorp/random/index.json", Some(KEY))
    .await;
  assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
  let body: Value = response.json().await.unwrap();
  assert!(body["error"].as_str().unwrap().contains("502"));

  let response = server
    .get(
      "/registry.terraform.io/hashicorp/random/terraform-provider-random_2.0.0_linux_amd64.zip",
      Some(KEY),
    )
    .await;
  assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_missing_archive_is_server_error() {
  let server = local_server().await;
  let response = server
    .get(
      "/registry.terraform.io/hashicorp/random/terraform-provider-random_9.9.9_linux_amd64.zip",
      Some(KEY),
    )
    .await;
  assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}
