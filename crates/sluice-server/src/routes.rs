use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use sluice_mirror::MirrorService;
use sluice_provider::{ARCHIVE_EXTENSION, Provider};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::auth::{Authorizer, bearer_token};
use crate::error::ApiError;

const VERSIONS_FILE: &str = "index.json";

#[derive(Clone)]
struct AppState {
  service: Arc<dyn MirrorService>,
  auth: Arc<dyn Authorizer>,
}

/// A mirror request decoded from the last path segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MirrorRequest {
  /// `index.json`
  Versions,
  /// `{version}.json`
  Installation { version: String },
  /// `terraform-provider-{name}_{version}_{os}_{arch}.zip`
  Archive { provider: Provider },
}

impl MirrorRequest {
  /// Decode `file`, the segment after `/{hostname}/{namespace}/{name}/`.
  pub fn parse(name: &str, file: &str) -> Result<Self, ApiError> {
    if file == VERSIONS_FILE {
      return Ok(Self::Versions);
    }

    if file
      .rsplit_once('.')
      .is_some_and(|(_, ext)| ext == ARCHIVE_EXTENSION)
    {
      let provider = Provider::from_archive_filename(file)
        .map_err(|e| ApiError::missing_segment(e.to_string()))?;
      if provider.name != name {
        return Err(ApiError::missing_segment(format!(
          "archive {} does not belong to provider {}",
          file, name
        )));
      }
      return Ok(Self::Archive { provider });
    }

    match file.strip_suffix(".json") {
      Some("") => Err(ApiError::missing_segment("version")),
      Some(version) => Ok(Self::Installation {
        version: version.to_string(),
      }),
      None => Err(ApiError::missing_segment(format!("unknown file {}", file))),
    }
  }
}

/// Build the mirror router.
pub fn router(service: Arc<dyn MirrorService>, auth: Arc<dyn Authorizer>) -> Router {
  Router::new()
    .route("/health", get(health))
    .route("/:hostname/:namespace/:name/:file", get(mirror))
    .with_state(AppState { service, auth })
}

/// Serve `router` until `shutdown` is cancelled.
pub async fn serve(
  listener: TcpListener,
  router: Router,
  shutdown: CancellationToken,
) -> std::io::Result<()> {
  if let Ok(addr) = listener.local_addr() {
    info!(addr = %addr, "server_listening");
  }
  axum::serve(listener, router)
    .with_graceful_shutdown(async move { shutdown.cancelled().await })
    .await?;
  info!("server_stopped");
  Ok(())
}

async fn health() -> impl IntoResponse {
  "ok"
}

async fn mirror(
  State(state): State<AppState>,
  Path((hostname, namespace, name, file)): Path<(String, String, String, String)>,
  headers: HeaderMap,
) -> Result<Response, ApiError> {
  state.auth.validate(bearer_token(&headers)).await?;

  let request = MirrorRequest::parse(&name, &file)?;
  debug!(hostname = %hostname, namespace = %namespace, name = %name, request = ?request, "mirror_request");

  let response = match request {
    MirrorRequest::Versions => {
      let versions = state
        .service
        .list_versions(&hostname, &namespace, &name)
        .await?;
      Json(versions).into_response()
    }
    MirrorRequest::Installation { version } => {
      let archives = state
        .service
        .list_installation(&hostname, &namespace, &name, &version)
        .await?;
      Json(archives).into_response()
    }
    MirrorRequest::Archive { mut provider } => {
      provider.hostname = hostname.clone();
      provider.namespace = namespace;
      let stream = state.service.retrieve_archive(&hostname, &provider).await?;
      ([(CONTENT_TYPE, "application/zip")], Body::from_stream(stream)).into_response()
    }
  };
  Ok(response)
}

#[cfg(test)]
mod tests {
  use sluice_provider::Platform;

  use super::*;

  #[test]
  fn test_parse_requests() {
    assert_eq!(
      MirrorRequest::parse("random", "index.json").unwrap(),
      MirrorRequest::Versions
    );
    assert_eq!(
      MirrorRequest::parse("random", "2.0.0.json").unwrap(),
      MirrorRequest::Installation {
        version: "2.0.0".to_string()
      }
    );
    assert_eq!(
      MirrorRequest::parse("random", "terraform-provider-random_2.0.0_linux_amd64.zip").unwrap(),
      MirrorRequest::Archive {
        provider: Provider::new("", "", "random", "2.0.0", Platform::new("linux", "amd64"))
      }
    );
  }

  #[test]
  fn test_parse_rejects_malformed_files() {
    for file in [
      ".json",
      "random.txt",
      "terraform-provider-random.zip",
      "terraform-provider-null_2.0.0_linux_amd64.zip",
    ] {
      let err = MirrorRequest::parse("random", file).unwrap_err();
      assert!(
        matches!(err, ApiError::MissingSegment { .. }),
        "file {:?} gave {:?}",
        file,
        err
      );
    }
  }
}
