use thiserror::Error;

/// Errors produced while deriving or parsing provider names.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
  /// A field required to build a filename is empty.
  #[error("provider {field} is empty")]
  Empty { field: &'static str },

  /// An archive filename does not follow the flat naming convention.
  #[error("couldn't parse provider file name: {filename}")]
  ArchiveName { filename: String },

  /// A labelled storage path is missing one of the required labels.
  #[error("{path:?} is not a valid provider path")]
  LabelledPath { path: String },
}

impl Error {
  /// Whether this error came from decoding a name rather than validating one.
  pub fn is_parse(&self) -> bool {
    matches!(self, Self::ArchiveName { .. } | Self::LabelledPath { .. })
  }
}
