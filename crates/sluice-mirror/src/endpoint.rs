//! Memoized upstream endpoints.
//!
//! Building an endpoint is cheap but not free, and every listing request for
//! the same provider hits the same URL, so endpoints are built once per
//! provider and shared.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::error::MirrorError;
use crate::upstream::VersionsEndpoint;

/// Cache key for upstream endpoints.
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct EndpointKey {
  pub hostname: String,
  pub namespace: String,
  pub name: String,
}

impl EndpointKey {
  pub fn new(
    hostname: impl Into<String>,
    namespace: impl Into<String>,
    name: impl Into<String>,
  ) -> Self {
    Self {
      hostname: hostname.into(),
      namespace: namespace.into(),
      name: name.into(),
    }
  }
}

/// Caches versions endpoints per provider. Entries are never evicted.
#[derive(Clone, Default)]
pub struct EndpointCache {
  cache: Arc<RwLock<HashMap<EndpointKey, Arc<VersionsEndpoint>>>>,
}

impl EndpointCache {
  pub fn new() -> Self {
    Self::default()
  }

  /// Get an endpoint from cache, or build and cache it.
  ///
  /// When two callers race on a missing key, only one built endpoint is kept
  /// and both receive it.
  pub fn get_or_build<F>(&self, key: &EndpointKey, build: F) -> Result<Arc<VersionsEndpoint>, MirrorError>
  where
    F: FnOnce() -> Result<VersionsEndpoint, MirrorError>,
  {
    {
      let cache = self.cache.read().unwrap_or_else(PoisonError::into_inner);
      if let Some(endpoint) = cache.get(key) {
        return Ok(endpoint.clone());
      }
    }

    let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
    if let Some(endpoint) = cache.get(key) {
      return Ok(endpoint.clone());
    }
    let endpoint = Arc::new(build()?);
    cache.insert(key.clone(), endpoint.clone());
    Ok(endpoint)
  }

  pub fn len(&self) -> usize {
    self.cache.read().unwrap_or_else(PoisonError::into_inner).len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}
