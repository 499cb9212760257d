use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};
use wharf_types::StorageParams;

use crate::cache::{CacheOptions, ContentCache};
use crate::transport::{SchemeRouter, StorageTransport};
use crate::{ResolveError, SchemeTag, Uri, expand_tilde};

/// Localization entry point shared by every component of one invocation.
///
/// Constructed once by the caller and passed by reference; there is no
/// process-wide resolver.
#[derive(Debug)]
pub struct UriResolver {
    cache: ContentCache,
}

impl UriResolver {
    /// Resolver backed by the real HTTP and bucket transports.
    pub fn new(params: &StorageParams) -> Result<Self, ResolveError> {
        let transport: Arc<dyn StorageTransport> = Arc::new(SchemeRouter::from_params(params)?);
        let cache_dir = expand_tilde(&params.cache_dir.to_string_lossy());
        Ok(Self::with_transport(cache_dir, transport))
    }

    /// Resolver over an arbitrary transport, e.g. [`crate::MemoryTransport`].
    pub fn with_transport(cache_dir: impl Into<PathBuf>, transport: Arc<dyn StorageTransport>) -> Self {
        let cache_dir = cache_dir.into();
        // Cache entries are handed out as absolute paths so they classify as
        // local file references when read back.
        let cache_dir = std::path::absolute(&cache_dir).unwrap_or(cache_dir);
        Self {
            cache: ContentCache::new(cache_dir, transport),
        }
    }

    pub fn with_cache_options(mut self, options: CacheOptions) -> Self {
        self.cache = self.cache.with_options(options);
        self
    }

    pub fn cache(&self) -> &ContentCache {
        &self.cache
    }

    /// Local path for `uri`, downloading remote references into the cache.
    pub fn localize(&self, uri: &str) -> Result<PathBuf, ResolveError> {
        self.localize_uri(&Uri::parse(uri))
    }

    pub fn localize_uri(&self, uri: &Uri) -> Result<PathBuf, ResolveError> {
        match uri.local_path() {
            Some(path) if path.exists() => Ok(path.to_path_buf()),
            Some(path) => Err(ResolveError::NotFound {
                path: path.to_path_buf(),
            }),
            None => self.cache.get_or_fetch(uri),
        }
    }

    /// Copy or upload `path` below `target_prefix` and return the new URI.
    ///
    /// # Arguments
    /// - `path`: An existing local file.
    /// - `target_prefix`: A local directory or a `gs://` / `s3://` prefix.
    ///
    /// # Returns
    /// The destination URI. Files inside the cache keep their cache-relative
    /// key; other files use their absolute path, so distinct sources never
    /// share a destination.
    ///
    /// # Errors
    /// - [`ResolveError::NotFound`] when `path` is not a file.
    /// - [`ResolveError::Transfer`] for HTTP prefixes and failed copies or uploads.
    pub fn externalize(&self, path: &Path, target_prefix: &str) -> Result<String, ResolveError> {
        if !path.is_file() {
            return Err(ResolveError::NotFound {
                path: path.to_path_buf(),
            });
        }
        let target = self.staged_uri(path, target_prefix);

        match target.scheme() {
            SchemeTag::Local => {
                let destination = PathBuf::from(target.as_str());
                if destination != path {
                    copy_atomic(path, &destination)
                        .map_err(|error| ResolveError::transfer(target.as_str(), error.to_string()))?;
                }
            }
            SchemeTag::Gcs | SchemeTag::S3 => {
                debug!(source = %path.display(), %target, "uploading");
                self.cache.transport().upload(path, &target)?;
            }
            SchemeTag::Http => {
                return Err(ResolveError::transfer(
                    target.as_str(),
                    "HTTP(S) locations cannot be written to",
                ));
            }
        }
        info!(source = %path.display(), target = %target, "staged file");
        Ok(target.as_str().to_string())
    }

    /// Where [`externalize`](Self::externalize) would place `path` below
    /// `target_prefix`, without transferring anything.
    pub fn staged_location(&self, path: &Path, target_prefix: &str) -> String {
        self.staged_uri(path, target_prefix).as_str().to_string()
    }

    fn staged_uri(&self, path: &Path, target_prefix: &str) -> Uri {
        Uri::parse(target_prefix).join(&self.staging_key(path))
    }

    /// Localize `uri` and read it as UTF-8 text.
    pub fn read_to_string(&self, uri: &str) -> Result<String, ResolveError> {
        let path = self.localize(uri)?;
        fs::read_to_string(&path).map_err(|error| ResolveError::io(path, error))
    }

    fn staging_key(&self, path: &Path) -> String {
        let relative = self.cache.relative_key(path).unwrap_or_else(|| {
            let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
            absolute
                .components()
                .filter(|component| matches!(component, Component::Normal(_)))
                .collect()
        });
        relative
            .components()
            .map(|component| component.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }
}

/// Write `contents` to `path` through a temporary sibling and a rename.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), ResolveError> {
    let parent = parent_dir(path);
    fs::create_dir_all(&parent).map_err(|error| ResolveError::io(&parent, error))?;
    let mut staging = tempfile::NamedTempFile::new_in(&parent).map_err(|error| ResolveError::io(&parent, error))?;
    let staging_path = staging.path().to_path_buf();
    staging
        .write_all(contents)
        .and_then(|_| staging.flush())
        .map_err(|error| ResolveError::io(staging_path, error))?;
    staging
        .persist(path)
        .map_err(|error| ResolveError::io(path, error.error))?;
    Ok(())
}

fn copy_atomic(source: &Path, destination: &Path) -> std::io::Result<()> {
    let parent = parent_dir(destination);
    fs::create_dir_all(&parent)?;
    let staging = tempfile::NamedTempFile::new_in(&parent)?;
    fs::copy(source, staging.path())?;
    staging.persist(destination).map_err(|error| error.error)?;
    Ok(())
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;
    use crate::MemoryTransport;

    fn resolver(root: &Path) -> (UriResolver, Arc<MemoryTransport>) {
        let transport = Arc::new(MemoryTransport::new());
        (UriResolver::with_transport(root.join("cache"), transport.clone()), transport)
    }

    #[test]
    fn existing_local_paths_are_returned_unchanged() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("x.json");
        fs::write(&file, "{}").unwrap();
        let (resolver, transport) = resolver(dir.path());

        assert_eq!(resolver.localize(&file.to_string_lossy()).unwrap(), file);
        assert_eq!(transport.download_count(), 0);
    }

    #[test]
    fn missing_local_paths_are_not_found() {
        let dir = tempdir().unwrap();
        let (resolver, _) = resolver(dir.path());
        let error = resolver.localize("/definitely/not/here.json").unwrap_err();
        assert!(matches!(error, ResolveError::NotFound { .. }));
    }

    #[test]
    fn externalize_uploads_with_absolute_path_key() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("in.json");
        fs::write(&file, "{}").unwrap();
        let (resolver, transport) = resolver(dir.path());

        let uri = resolver.externalize(&file, "gs://tmp-bucket/stage").unwrap();
        let expected_key = file.to_string_lossy().trim_start_matches('/').to_string();
        assert_eq!(uri, format!("gs://tmp-bucket/stage/{expected_key}"));
        assert_eq!(transport.get(&uri).as_deref(), Some(&b"{}"[..]));
    }

    #[test]
    fn externalize_keeps_cache_relative_keys() {
        let dir = tempdir().unwrap();
        let (resolver, transport) = resolver(dir.path());
        transport.insert("gs://bucket/x.json", "{}");
        let cached = resolver.localize("gs://bucket/x.json").unwrap();

        let uri = resolver.externalize(&cached, "s3://tmp/stage/").unwrap();
        assert_eq!(uri, "s3://tmp/stage/gcs/bucket/x.json");
    }

    #[test]
    fn externalize_copies_to_local_prefix() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("src").join("a.txt");
        fs::create_dir_all(file.parent().unwrap()).unwrap();
        fs::write(&file, "hello").unwrap();
        let (resolver, _) = resolver(dir.path());

        let target = dir.path().join("out");
        let uri = resolver.externalize(&file, &target.to_string_lossy()).unwrap();
        assert!(uri.starts_with(&*target.to_string_lossy()));
        assert_eq!(fs::read_to_string(&uri).unwrap(), "hello");
    }

    #[test]
    fn externalize_rejects_http_targets_and_missing_sources() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("a.txt");
        fs::write(&file, "hello").unwrap();
        let (resolver, _) = resolver(dir.path());

        assert!(matches!(
            resolver.externalize(&file, "https://example.org/upload").unwrap_err(),
            ResolveError::Transfer { .. }
        ));
        assert!(matches!(
            resolver.externalize(&dir.path().join("missing"), "gs://b/").unwrap_err(),
            ResolveError::NotFound { .. }
        ));
    }

    #[test]
    fn write_atomic_creates_parents() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a/b/c.conf");
        write_atomic(&path, b"x = 1\n").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "x = 1\n");
    }
}
