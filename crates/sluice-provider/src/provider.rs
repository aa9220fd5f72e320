use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::platform::Platform;

/// Prefix shared by every provider archive and checksum file.
pub const ARCHIVE_PREFIX: &str = "terraform-provider-";

/// Extension of provider archives, without the leading dot.
pub const ARCHIVE_EXTENSION: &str = "zip";

const SHASUMS_SUFFIX: &str = "SHA256SUMS";

/// Identity of a single provider archive.
///
/// Values are built per request from a filename, a labelled storage path or
/// an upstream response and are never persisted themselves.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Provider {
  #[serde(default, skip_serializing_if = "String::is_empty")]
  pub hostname: String,
  #[serde(default, skip_serializing_if = "String::is_empty")]
  pub namespace: String,
  pub name: String,
  pub version: String,
  pub os: String,
  pub arch: String,
}

impl Provider {
  pub fn new(
    hostname: impl Into<String>,
    namespace: impl Into<String>,
    name: impl Into<String>,
    version: impl Into<String>,
    platform: Platform,
  ) -> Self {
    Self {
      hostname: hostname.into(),
      namespace: namespace.into(),
      name: name.into(),
      version: version.into(),
      os: platform.os,
      arch: platform.arch,
    }
  }

  pub fn platform(&self) -> Platform {
    Platform::new(&self.os, &self.arch)
  }

  /// The archive filename, e.g. `terraform-provider-random_2.0.0_linux_amd64.zip`.
  pub fn archive_filename(&self) -> Result<String, Error> {
    require("name", &self.name)?;
    require("version", &self.version)?;
    require("os", &self.os)?;
    require("arch", &self.arch)?;

    Ok(format!(
      "{}{}_{}_{}_{}.{}",
      ARCHIVE_PREFIX, self.name, self.version, self.os, self.arch, ARCHIVE_EXTENSION
    ))
  }

  /// The checksum list filename for this provider's version.
  pub fn shasums_filename(&self) -> Result<String, Error> {
    require("name", &self.name)?;
    require("version", &self.version)?;

    Ok(format!(
      "{}{}_{}_{}",
      ARCHIVE_PREFIX, self.name, self.version, SHASUMS_SUFFIX
    ))
  }

  /// The detached signature filename of the checksum list.
  pub fn shasums_signature_filename(&self) -> Result<String, Error> {
    Ok(format!("{}.sig", self.shasums_filename()?))
  }

  /// Decode an archive filename (or a path ending in one).
  ///
  /// Only name, version, OS and architecture are recovered; hostname and
  /// namespace are left empty for the caller to fill in.
  pub fn from_archive_filename(filename: &str) -> Result<Self, Error> {
    let base = Path::new(filename)
      .file_name()
      .and_then(|f| f.to_str())
      .unwrap_or(filename);

    let trimmed = base.strip_prefix(ARCHIVE_PREFIX).unwrap_or(base);
    let trimmed = trimmed
      .strip_suffix(ARCHIVE_EXTENSION)
      .and_then(|t| t.strip_suffix('.'))
      .unwrap_or(trimmed);

    let tokens: Vec<&str> = trimmed.split('_').collect();
    let [name, version, os, arch] = tokens.as_slice() else {
      return Err(Error::ArchiveName {
        filename: filename.to_string(),
      });
    };

    if tokens.iter().any(|t| t.is_empty()) {
      return Err(Error::ArchiveName {
        filename: filename.to_string(),
      });
    }

    Ok(Self {
      name: name.to_string(),
      version: version.to_string(),
      os: os.to_string(),
      arch: arch.to_string(),
      ..Self::default()
    })
  }

  /// Decode a labelled storage path such as
  /// `namespace=hashicorp/name=random/version=2.0.0/os=linux/arch=amd64/...`.
  ///
  /// Segments without a `=` are ignored. Hostname is left empty.
  pub fn from_labelled_path(path: &str) -> Result<Self, Error> {
    let labels: HashMap<&str, &str> = path
      .split('/')
      .filter_map(|segment| segment.split_once('='))
      .collect();

    let label = |key: &str| -> Result<String, Error> {
      match labels.get(key) {
        Some(value) if !value.is_empty() => Ok(value.to_string()),
        _ => Err(Error::LabelledPath {
          path: path.to_string(),
        }),
      }
    };

    Ok(Self {
      hostname: String::new(),
      namespace: label("namespace")?,
      name: label("name")?,
      version: label("version")?,
      os: label("os")?,
      arch: label("arch")?,
    })
  }
}

impl fmt::Display for Provider {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "{}/{}/{} {} ({}_{})",
      self.hostname, self.namespace, self.name, self.version, self.os, self.arch
    )
  }
}

fn require(field: &'static str, value: &str) -> Result<(), Error> {
  if value.is_empty() {
    return Err(Error::Empty { field });
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  fn random(version: &str, os: &str, arch: &str) -> Provider {
    Provider::new(
      "registry.terraform.io",
      "hashicorp",
      "random",
      version,
      Platform::new(os, arch),
    )
  }

  #[test]
  fn test_archive_filename() {
    let provider = random("2.0.0", "darwin", "amd64");
    assert_eq!(
      provider.archive_filename().unwrap(),
      "terraform-provider-random_2.0.0_darwin_amd64.zip"
    );
  }

  #[test]
  fn test_archive_filename_round_trip() {
    let cases = [
      ("random", "2.0.0", "linux", "amd64"),
      ("aws", "5.31.0-beta1", "windows", "386"),
      ("null", "0.1", "freebsd", "arm"),
    ];

    for (name, version, os, arch) in cases {
      let provider = Provider {
        name: name.to_string(),
        version: version.to_string(),
        os: os.to_string(),
        arch: arch.to_string(),
        ..Provider::default()
      };
      let filename = provider.archive_filename().unwrap();
      let decoded = Provider::from_archive_filename(&filename).unwrap();
      assert_eq!(decoded, provider, "round trip of {}", filename);
    }
  }

  #[test]
  fn test_archive_filename_requires_all_fields() {
    let full = random("2.0.0", "linux", "amd64");

    let mut p = full.clone();
    p.name.clear();
    assert_eq!(p.archive_filename(), Err(Error::Empty { field: "name" }));

    let mut p = full.clone();
    p.version.clear();
    assert_eq!(p.archive_filename(), Err(Error::Empty { field: "version" }));

    let mut p = full.clone();
    p.os.clear();
    assert_eq!(p.archive_filename(), Err(Error::Empty { field: "os" }));

    let mut p = full;
    p.arch.clear();
    assert_eq!(p.archive_filename(), Err(Error::Empty { field: "arch" }));
  }

  #[test]
  fn test_archive_filename_does_not_need_hostname_or_namespace() {
    let provider = Provider {
      name: "random".to_string(),
      version: "1.0.0".to_string(),
      os: "linux".to_string(),
      arch: "arm64".to_string(),
      ..Provider::default()
    };
    assert!(provider.archive_filename().is_ok());
  }

  #[test]
  fn test_decode_strips_directories() {
    let decoded = Provider::from_archive_filename(
      "/srv/mirror/registry.terraform.io/hashicorp/random/terraform-provider-random_2.0.0_linux_amd64.zip",
    )
    .unwrap();
    assert_eq!(decoded.name, "random");
    assert_eq!(decoded.version, "2.0.0");
    assert_eq!(decoded.os, "linux");
    assert_eq!(decoded.arch, "amd64");
    assert!(decoded.hostname.is_empty());
    assert!(decoded.namespace.is_empty());
  }

  #[test]
  fn test_decode_rejects_wrong_token_count() {
    let err = Provider::from_archive_filename("terraform-provider-foo_1.0.0.zip").unwrap_err();
    assert!(err.is_parse());
    assert!(matches!(err, Error::ArchiveName { .. }));

    assert!(Provider::from_archive_filename("terraform-provider-a_b_c_d_e.zip").is_err());
    assert!(Provider::from_archive_filename("terraform-provider-a__linux_amd64.zip").is_err());
  }

  #[test]
  fn test_shasums_filenames() {
    let provider = random("2.0.0", "", "");
    assert_eq!(
      provider.shasums_filename().unwrap(),
      "terraform-provider-random_2.0.0_SHA256SUMS"
    );
    assert_eq!(
      provider.shasums_signature_filename().unwrap(),
      "terraform-provider-random_2.0.0_SHA256SUMS.sig"
    );

    let mut unversioned = provider;
    unversioned.version.clear();
    assert_eq!(
      unversioned.shasums_filename(),
      Err(Error::Empty { field: "version" })
    );
    assert!(unversioned.shasums_signature_filename().is_err());
  }

  #[test]
  fn test_from_labelled_path() {
    let provider = Provider::from_labelled_path(
      "namespace=acme/name=widget/version=1.2.3/os=linux/arch=amd64/terraform-provider-widget_1.2.3_linux_amd64.zip",
    )
    .unwrap();

    assert_eq!(provider.namespace, "acme");
    assert_eq!(provider.name, "widget");
    assert_eq!(provider.version, "1.2.3");
    assert_eq!(provider.os, "linux");
    assert_eq!(provider.arch, "amd64");
    assert!(provider.hostname.is_empty());
  }

  #[test]
  fn test_from_labelled_path_keeps_equals_in_value() {
    let provider =
      Provider::from_labelled_path("namespace=acme/name=widget/version=1.0+build=7/os=linux/arch=amd64")
        .unwrap();
    assert_eq!(provider.version, "1.0+build=7");
  }

  #[test]
  fn test_from_labelled_path_missing_label() {
    let err = Provider::from_labelled_path("namespace=acme/name=widget/version=1.2.3/os=linux")
      .unwrap_err();
    assert!(err.is_parse());

    assert!(Provider::from_labelled_path("namespace=acme/name=/version=1/os=linux/arch=amd64").is_err());
  }

  #[test]
  fn test_labelled_and_flat_decode_agree() {
    let flat = Provider::from_archive_filename("terraform-provider-widget_1.2.3_linux_amd64.zip").unwrap();
    let mut labelled =
      Provider::from_labelled_path("namespace=acme/name=widget/version=1.2.3/os=linux/arch=amd64").unwrap();
    labelled.namespace.clear();

    assert_eq!(flat, labelled);
  }

  #[test]
  fn test_platform_key() {
    let provider = random("2.0.0", "darwin", "arm64");
    assert_eq!(provider.platform().key(), "darwin_arm64");
  }
}
