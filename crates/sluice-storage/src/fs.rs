use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use sluice_provider::{ARCHIVE_EXTENSION, Provider, SigningKeys};
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};

use crate::layout::{self, CUSTOM_PREFIX};
use crate::{ByteStream, Error, ProviderFilter, Storage};

/// Filesystem-based provider storage.
///
/// Archives live under `{root}/mirror` (pulled from upstream) and
/// `{root}/providers` (operator uploads); see [`layout`] for the exact paths.
/// Writes go to a hidden temporary file which is renamed into place, so a
/// concurrent reader sees either no archive or the complete one.
#[derive(Debug, Clone)]
pub struct FsStorage {
  root: PathBuf,
}

impl FsStorage {
  /// Create a filesystem store rooted at an existing directory.
  pub fn new(root: impl AsRef<Path>) -> Result<Self, Error> {
    let root = std::fs::canonicalize(root.as_ref())?;
    if !root.is_dir() {
      return Err(Error::Io(std::io::Error::new(
        ErrorKind::NotADirectory,
        format!("{} is not a directory", root.display()),
      )));
    }
    Ok(Self { root })
  }

  /// Get the root directory of the store.
  pub fn root(&self) -> &Path {
    &self.root
  }

  /// Walk `dir` and return every archive below it.
  ///
  /// Any failure to scan, or a directory holding no archives at all, is
  /// reported as [`Error::NotMirrored`].
  async fn find_archives(&self, dir: &Path, filter: &ProviderFilter) -> Result<Vec<PathBuf>, Error> {
    let mut archives = Vec::new();
    collect_archives(dir, &mut archives)
      .await
      .map_err(|e| Error::not_mirrored(filter, e))?;
    if archives.is_empty() {
      return Err(Error::not_mirrored(
        filter,
        std::io::Error::new(ErrorKind::NotFound, format!("no archives under {}", dir.display())),
      ));
    }
    archives.sort();
    Ok(archives)
  }
}

#[async_trait]
impl Storage for FsStorage {
  async fn mirrored_providers(&self, filter: &ProviderFilter) -> Result<Vec<Provider>, Error> {
    let dir = layout::mirror_dir(&self.root, &filter.hostname, &filter.namespace, &filter.name)?;
    let archives = self.find_archives(&dir, filter).await?;

    let mut providers = Vec::with_capacity(archives.len());
    for archive in archives {
      let mut provider = match Provider::from_archive_filename(&archive.to_string_lossy()) {
        Ok(p) => p,
        Err(e) => {
          warn!(path = %archive.display(), error = %e, "skipping undecodable archive");
          continue;
        }
      };

      if provider.name != filter.name {
        warn!(
          path = %archive.display(),
          expected = %filter.name,
          found = %provider.name,
          "skipping archive for a different provider"
        );
        continue;
      }

      if !filter.matches_version(&provider.version) {
        continue;
      }

      provider.hostname = filter.hostname.clone();
      provider.namespace = filter.namespace.clone();
      providers.push(provider);
    }

    debug!(filter = %filter, count = providers.len(), "discovered mirrored providers");
    Ok(providers)
  }

  async fn custom_providers(&self, filter: &ProviderFilter) -> Result<Vec<Provider>, Error> {
    let dir = layout::custom_dir(&self.root, &filter.namespace, &filter.name)?;
    let archives = self.find_archives(&dir, filter).await?;
    let base = self.root.join(CUSTOM_PREFIX);

    let mut providers = Vec::with_capacity(archives.len());
    for archive in archives {
      let relative = archive.strip_prefix(&base).unwrap_or(&archive);
      let labelled = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");

      let mut provider = match Provider::from_labelled_path(&labelled) {
        Ok(p) => p,
        Err(e) => {
          warn!(path = %archive.display(), error = %e, "skipping undecodable custom provider");
          continue;
        }
      };

      if !filter.matches_version(&provider.version) {
        continue;
      }

      provider.hostname = filter.hostname.clone();
      providers.push(provider);
    }

    debug!(filter = %filter, count = providers.len(), "discovered custom providers");
    Ok(providers)
  }

  async fn open_archive(&self, hostname: &str, provider: &Provider) -> Result<ByteStream, Error> {
    let path = layout::mirror_archive_path(&self.root, hostname, provider)?;
    let file = File::open(&path).await.map_err(|e| {
      let filter = ProviderFilter::new(hostname, &provider.namespace, &provider.name)
        .with_version(&provider.version);
      Error::not_mirrored(&filter, e)
    })?;

    let stream = ReaderStream::new(file).map(|r| r.map_err(Error::Io));
    Ok(Box::pin(stream))
  }

  async fn archive_checksums(
    &self,
    hostname: &str,
    provider: &Provider,
  ) -> Result<HashMap<String, String>, Error> {
    let path = layout::mirror_shasums_path(&self.root, hostname, provider)?;
    match fs::read_to_string(&path).await {
      Ok(content) => Ok(parse_shasums(&content)),
      Err(e) if e.kind() == ErrorKind::NotFound => Ok(HashMap::new()),
      Err(e) => Err(Error::Io(e)),
    }
  }

  async fn store_mirrored(
    &self,
    hostname: &str,
    provider: &Provider,
    data: ByteStream,
  ) -> Result<(), Error> {
    let path = layout::mirror_archive_path(&self.root, hostname, provider)?;
    write_atomic(&path, data).await?;
    debug!(path = %path.display(), "stored mirrored archive");
    Ok(())
  }

  async fn store_mirrored_checksums(
    &self,
    hostname: &str,
    provider: &Provider,
    data: Bytes,
  ) -> Result<(), Error> {
    let path = layout::mirror_shasums_path(&self.root, hostname, provider)?;
    let stream = futures::stream::once(async move { Ok::<_, Error>(data) });
    write_atomic(&path, Box::pin(stream)).await
  }

  async fn signing_keys(&self, namespace: &str) -> Result<Option<SigningKeys>, Error> {
    let path = layout::signing_keys_path(&self.root, namespace)?;
    let content = match fs::read_to_string(&path).await {
      Ok(content) => content,
      Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
      Err(e) => return Err(Error::Io(e)),
    };

    let keys = serde_json::from_str(&content).map_err(|source| Error::SigningKeys {
      path: path.clone(),
      source,
    })?;
    Ok(Some(keys))
  }
}

/// Recursively collect files with the archive extension.
async fn collect_archives(dir: &Path, archives: &mut Vec<PathBuf>) -> Result<(), std::io::Error> {
  let mut entries = fs::read_dir(dir).await?;
  while let Some(entry) = entries.next_entry().await? {
    let path = entry.path();
    let file_type = entry.file_type().await?;

    if file_type.is_dir() {
      Box::pin(collect_archives(&path, archives)).await?;
    } else if path.extension().is_some_and(|ext| ext == ARCHIVE_EXTENSION) {
      archives.push(path);
    }
  }
  Ok(())
}

/// A temporary file that is removed on drop unless it was renamed into place.
///
/// Dropping a store future mid-stream drops this guard too, so abandoned
/// writes never leave a `.partial` file behind.
struct PartialFile {
  path: PathBuf,
  committed: bool,
}

impl PartialFile {
  fn new(path: PathBuf) -> Self {
    Self {
      path,
      committed: false,
    }
  }

  /// Rename the file over `target` and disarm the guard.
  async fn commit(mut self, target: &Path) -> Result<(), std::io::Error> {
    fs::rename(&self.path, target).await?;
    self.committed = true;
    Ok(())
  }
}

impl Drop for PartialFile {
  fn drop(&mut self) {
    if self.committed {
      return;
    }
    match std::fs::remove_file(&self.path) {
      Ok(()) => debug!(path = %self.path.display(), "removed partial file"),
      Err(e) if e.kind() == ErrorKind::NotFound => {}
      Err(e) => warn!(path = %self.path.display(), error = %e, "failed to remove partial file"),
    }
  }
}

/// Write `data` to a temporary sibling of `target`, then rename it over `target`.
async fn write_atomic(target: &Path, data: ByteStream) -> Result<(), Error> {
  let parent = target.parent().ok_or_else(|| Error::InvalidSegment {
    value: target.display().to_string(),
  })?;
  fs::create_dir_all(parent).await?;

  let file_name = target
    .file_name()
    .map(|n| n.to_string_lossy().into_owned())
    .unwrap_or_default();
  let partial = PartialFile::new(parent.join(format!(
    ".{}.{}.partial",
    file_name,
    uuid::Uuid::new_v4()
  )));

  let mut file = File::create(&partial.path).await?;
  let mut stream = std::pin::pin!(data);

  while let Some(chunk) = stream.next().await {
    let bytes = chunk?;
    file.write_all(&bytes).await?;
  }

  file.flush().await?;
  file.sync_all().await?;
  drop(file);

  partial.commit(target).await?;
  Ok(())
}

/// Parse a `SHA256SUMS` document into filename -> hex digest.
fn parse_shasums(content: &str) -> HashMap<String, String> {
  content
    .lines()
    .filter_map(|line| {
      let mut parts = line.split_whitespace();
      let digest = parts.next()?;
      let filename = parts.next()?;
      Some((
        filename.trim_start_matches('*').to_string(),
        digest.to_lowercase(),
      ))
    })
    .collect()
}
