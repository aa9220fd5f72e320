//! Storage paths.
//!
//! ```text
//! {root}/mirror/{hostname}/{namespace}/{name}/terraform-provider-{name}_{version}_{os}_{arch}.zip
//! {root}/mirror/{hostname}/{namespace}/{name}/terraform-provider-{name}_{version}_SHA256SUMS
//! {root}/providers/namespace={ns}/name={n}/version={v}/os={os}/arch={arch}/terraform-provider-....zip
//! {root}/providers/namespace={ns}/name={n}/version={v}/terraform-provider-{n}_{v}_SHA256SUMS[.sig]
//! {root}/providers/namespace={ns}/signing-keys.json
//! ```
//!
//! Every path is a pure function of its inputs. Discovery walks these trees
//! and decodes what it finds, so nothing else may write elsewhere.

use std::path::{Path, PathBuf};

use sluice_provider::Provider;

use crate::Error;

/// Area holding archives pulled from upstream registries.
pub const MIRROR_PREFIX: &str = "mirror";

/// Area holding operator-uploaded providers.
pub const CUSTOM_PREFIX: &str = "providers";

pub const SIGNING_KEYS_FILE: &str = "signing-keys.json";

/// `{root}/mirror/{hostname}/{namespace}/{name}`
pub fn mirror_dir(root: &Path, hostname: &str, namespace: &str, name: &str) -> Result<PathBuf, Error> {
  Ok(
    root
      .join(MIRROR_PREFIX)
      .join(segment(hostname)?)
      .join(segment(namespace)?)
      .join(segment(name)?),
  )
}

pub fn mirror_archive_path(root: &Path, hostname: &str, provider: &Provider) -> Result<PathBuf, Error> {
  Ok(
    mirror_dir(root, hostname, &provider.namespace, &provider.name)?
      .join(provider.archive_filename()?),
  )
}

pub fn mirror_shasums_path(root: &Path, hostname: &str, provider: &Provider) -> Result<PathBuf, Error> {
  Ok(
    mirror_dir(root, hostname, &provider.namespace, &provider.name)?
      .join(provider.shasums_filename()?),
  )
}

/// `{root}/providers/namespace={ns}/name={n}`
pub fn custom_dir(root: &Path, namespace: &str, name: &str) -> Result<PathBuf, Error> {
  Ok(
    root
      .join(CUSTOM_PREFIX)
      .join(label("namespace", namespace)?)
      .join(label("name", name)?),
  )
}

fn custom_version_dir(root: &Path, provider: &Provider) -> Result<PathBuf, Error> {
  Ok(custom_dir(root, &provider.namespace, &provider.name)?.join(label("version", &provider.version)?))
}

pub fn custom_archive_path(root: &Path, provider: &Provider) -> Result<PathBuf, Error> {
  Ok(
    custom_version_dir(root, provider)?
      .join(label("os", &provider.os)?)
      .join(label("arch", &provider.arch)?)
      .join(provider.archive_filename()?),
  )
}

pub fn custom_shasums_path(root: &Path, provider: &Provider) -> Result<PathBuf, Error> {
  Ok(custom_version_dir(root, provider)?.join(provider.shasums_filename()?))
}

pub fn custom_shasums_signature_path(root: &Path, provider: &Provider) -> Result<PathBuf, Error> {
  Ok(custom_version_dir(root, provider)?.join(provider.shasums_signature_filename()?))
}

pub fn signing_keys_path(root: &Path, namespace: &str) -> Result<PathBuf, Error> {
  Ok(
    root
      .join(CUSTOM_PREFIX)
      .join(label("namespace", namespace)?)
      .join(SIGNING_KEYS_FILE),
  )
}

/// Reject identifiers that would escape or restructure the tree.
fn segment(value: &str) -> Result<&str, Error> {
  if value.is_empty()
    || value == "."
    || value == ".."
    || value.contains(['/', '\\'])
    || value.contains('\0')
  {
    return Err(Error::InvalidSegment {
      value: value.to_string(),
    });
  }
  Ok(value)
}

fn label(key: &str, value: &str) -> Result<String, Error> {
  Ok(format!("{}={}", key, segment(value)?))
}
