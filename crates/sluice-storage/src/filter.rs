use std::fmt;

/// Scope of a storage scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderFilter {
  pub hostname: String,
  pub namespace: String,
  pub name: String,
  pub version: Option<String>,
}

impl ProviderFilter {
  pub fn new(
    hostname: impl Into<String>,
    namespace: impl Into<String>,
    name: impl Into<String>,
  ) -> Self {
    Self {
      hostname: hostname.into(),
      namespace: namespace.into(),
      name: name.into(),
      version: None,
    }
  }

  pub fn with_version(mut self, version: impl Into<String>) -> Self {
    self.version = Some(version.into());
    self
  }

  /// Whether a decoded version passes the filter.
  pub fn matches_version(&self, version: &str) -> bool {
    self.version.as_deref().is_none_or(|v| v == version)
  }
}

impl fmt::Display for ProviderFilter {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}/{}/{}", self.hostname, self.namespace, self.name)?;
    if let Some(version) = &self.version {
      write!(f, "@{}", version)?;
    }
    Ok(())
  }
}
