//! Sluice Provider
//!
//! This crate contains the identity model for provider artifacts served by
//! the mirror. A provider archive is identified by hostname, namespace, name,
//! version, OS and architecture.
//!
//! Two naming conventions map between an identity and the storage backend:
//! - flat archive filenames in the mirror cache
//!   (`terraform-provider-{name}_{version}_{os}_{arch}.zip`)
//! - labelled path segments for operator-uploaded providers
//!   (`namespace=ns/name=n/version=v/os=o/arch=a/...`)
//!
//! Both decode into the same [`Provider`], so downstream code never depends on
//! which convention produced it.

mod error;
mod platform;
mod provider;
mod signing;

pub use error::Error;
pub use platform::Platform;
pub use provider::{ARCHIVE_EXTENSION, ARCHIVE_PREFIX, Provider};
pub use signing::{GpgPublicKey, SigningKeys};
