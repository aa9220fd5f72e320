use serde::{Deserialize, Serialize};

/// Signing keys published alongside a provider.
///
/// Carried through untouched; nothing in the mirror interprets the key material.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningKeys {
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub gpg_public_keys: Vec<GpgPublicKey>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GpgPublicKey {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub key_id: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub ascii_armor: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub source: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub source_url: Option<String>,
}
