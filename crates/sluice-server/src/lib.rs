//! Sluice Server
//!
//! HTTP transport for the provider network mirror protocol. Requests are
//! authorized, decoded from the path and dispatched to a [`MirrorService`]:
//!
//! ```text
//! GET /{hostname}/{namespace}/{name}/index.json         -> list_versions
//! GET /{hostname}/{namespace}/{name}/{version}.json     -> list_installation
//! GET /{hostname}/{namespace}/{name}/{archive}.zip      -> retrieve_archive
//! GET /health
//! ```
//!
//! [`MirrorService`]: sluice_mirror::MirrorService

mod auth;
mod error;
mod routes;

pub use auth::{ApiKeys, AuthError, Authorizer};
pub use error::ApiError;
pub use routes::{MirrorRequest, router, serve};
