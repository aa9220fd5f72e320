use std::collections::HashSet;

use async_trait::async_trait;
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
  #[error("missing authorization header")]
  Missing,

  #[error("invalid api key")]
  InvalidKey,
}

/// Decides whether a request token may use the mirror.
#[async_trait]
pub trait Authorizer: Send + Sync {
  async fn validate(&self, token: &str) -> Result<(), AuthError>;
}

/// Static set of accepted API keys.
#[derive(Debug, Clone, Default)]
pub struct ApiKeys {
  keys: HashSet<String>,
}

impl ApiKeys {
  /// Blank keys are ignored.
  pub fn new<I, K>(keys: I) -> Self
  where
    I: IntoIterator<Item = K>,
    K: Into<String>,
  {
    let keys = keys
      .into_iter()
      .map(Into::into)
      .map(|k: String| k.trim().to_string())
      .filter(|k| !k.is_empty())
      .collect();
    Self { keys }
  }

  pub fn len(&self) -> usize {
    self.keys.len()
  }

  pub fn is_empty(&self) -> bool {
    self.keys.is_empty()
  }
}

#[async_trait]
impl Authorizer for ApiKeys {
  async fn validate(&self, token: &str) -> Result<(), AuthError> {
    if token.is_empty() {
      return Err(AuthError::Missing);
    }
    if self.keys.contains(token) {
      Ok(())
    } else {
      Err(AuthError::InvalidKey)
    }
  }
}

/// Token from the `Authorization` header, with an optional `Bearer ` prefix.
///
/// Returns an empty string when the header is absent or not valid UTF-8.
pub(crate) fn bearer_token(headers: &HeaderMap) -> &str {
  let value = headers
    .get(AUTHORIZATION)
    .and_then(|v| v.to_str().ok())
    .unwrap_or_default()
    .trim();
  value.strip_prefix("Bearer ").unwrap_or(value).trim()
}

#[cfg(test)]
mod tests {
  use axum::http::HeaderValue;

  use super::*;

  #[tokio::test]
  async fn test_api_keys() {
    let keys = ApiKeys::new(["secret", " other ", ""]);
    assert_eq!(keys.len(), 2);

    assert_eq!(keys.validate("secret").await, Ok(()));
    assert_eq!(keys.validate("other").await, Ok(()));
    assert_eq!(keys.validate("nope").await, Err(AuthError::InvalidKey));
    assert_eq!(keys.validate("").await, Err(AuthError::Missing));
  }

  #[test]
  fn test_bearer_token() {
    let mut headers = HeaderMap::new();
    assert_eq!(bearer_token(&headers), "");

    headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer secret"));
    assert_eq!(bearer_token(&headers), "secret");

    headers.insert(AUTHORIZATION, HeaderValue::from_static("secret"));
    assert_eq!(bearer_token(&headers), "secret");
  }
}
