use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Serializes as `{}`; the protocol uses it for presence-only map values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmptyObject {}

/// The set of versions available for one provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderVersions {
  pub versions: BTreeMap<String, EmptyObject>,
}

impl ProviderVersions {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn insert(&mut self, version: impl Into<String>) {
    self.versions.insert(version.into(), EmptyObject {});
  }

  pub fn contains(&self, version: &str) -> bool {
    self.versions.contains_key(version)
  }

  pub fn len(&self) -> usize {
    self.versions.len()
  }

  pub fn is_empty(&self) -> bool {
    self.versions.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = &str> {
    self.versions.keys().map(String::as_str)
  }

  /// Union with another set.
  pub fn merge(&mut self, other: ProviderVersions) {
    self.versions.extend(other.versions);
  }
}

impl<S: Into<String>> FromIterator<S> for ProviderVersions {
  fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
    let mut versions = Self::new();
    for version in iter {
      versions.insert(version);
    }
    versions
  }
}

/// Where to download one platform's archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Archive {
  /// Download location, relative to the version document.
  pub url: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub hashes: Option<Vec<String>>,
}

/// Installation packages of one provider version, keyed by `{os}_{arch}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Archives {
  pub archives: BTreeMap<String, Archive>,
}

impl Archives {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn insert(&mut self, key: impl Into<String>, archive: Archive) {
    self.archives.insert(key.into(), archive);
  }

  pub fn get(&self, key: &str) -> Option<&Archive> {
    self.archives.get(key)
  }

  pub fn len(&self) -> usize {
    self.archives.len()
  }

  pub fn is_empty(&self) -> bool {
    self.archives.is_empty()
  }

  /// Overlay another map onto this one; entries from `other` win on collision.
  pub fn overlay(&mut self, other: Archives) {
    self.archives.extend(other.archives);
  }
}
