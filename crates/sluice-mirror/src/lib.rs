//! Sluice Mirror
//!
//! Services implementing the provider network mirror protocol:
//!
//! - [`LocalRegistry`] answers from storage only.
//! - [`ProxyRegistry`] wraps another service and merges its answers with the
//!   upstream registry, queried concurrently, and can pull missing archives
//!   through into storage.
//! - [`LoggingService`] records every call.
//!
//! All of them implement [`MirrorService`] and stack in any order.

mod endpoint;
mod error;
mod local;
mod logging;
mod proxy;
mod service;
mod types;
mod upstream;
mod verify;

pub use endpoint::{EndpointCache, EndpointKey};
pub use error::{ErrorKind, MirrorError};
pub use local::LocalRegistry;
pub use logging::LoggingService;
pub use proxy::{ProxyRegistry, upstream_archives, upstream_versions};
pub use service::MirrorService;
pub use types::{Archive, Archives, EmptyObject, ProviderVersions};
pub use upstream::{
  DownloadMetadata, UpstreamClient, UpstreamConfig, UpstreamVersion, UpstreamVersions,
  VersionsEndpoint,
};
pub use verify::VerifyingStream;
