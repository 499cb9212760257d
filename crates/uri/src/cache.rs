//! Origin-keyed download cache.
//!
//! Every remote URI maps to one deterministic path under the cache root.
//! Entries are committed by renaming a fully written temporary file into
//! place, so a reader never observes a partial download. Concurrent fetches
//! of the same URI, whether from threads or from separate processes, are
//! serialized by a `<entry>.lock` reservation file.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, SystemTime};

use percent_encoding::{AsciiSet, CONTROLS, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use tracing::{debug, info, warn};
use url::Url;

use crate::transport::StorageTransport;
use crate::{ResolveError, SchemeTag, Uri};

const LOCK_SUFFIX: &str = ".lock";

/// Bytes escaped inside a key segment. `%` itself is escaped so encoded
/// segments never collide with literal ones.
const SEGMENT: &AsciiSet = &CONTROLS.add(b'%').add(b'/').add(b'\\');

/// Stands in for an empty segment (`a//b`, a trailing `/`).
const EMPTY_SEGMENT: &str = "%";

/// Timing knobs for waiting on another fetcher's reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheOptions {
    /// How often a waiter re-checks for the committed entry.
    pub poll_interval: Duration,
    /// A reservation older than this is assumed abandoned and broken.
    pub stale_after: Duration,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(250),
            stale_after: Duration::from_secs(30 * 60),
        }
    }
}

pub struct ContentCache {
    root: PathBuf,
    transport: Arc<dyn StorageTransport>,
    options: CacheOptions,
}

impl std::fmt::Debug for ContentCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentCache")
            .field("root", &self.root)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl ContentCache {
    pub fn new(root: impl Into<PathBuf>, transport: Arc<dyn StorageTransport>) -> Self {
        Self {
            root: root.into(),
            transport,
            options: CacheOptions::default(),
        }
    }

    pub fn with_options(mut self, options: CacheOptions) -> Self {
        self.options = options;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub(crate) fn transport(&self) -> &dyn StorageTransport {
        self.transport.as_ref()
    }

    /// Canonical cache location for a remote URI.
    pub fn entry_path(&self, uri: &Uri) -> Result<PathBuf, ResolveError> {
        Ok(self.root.join(cache_key(uri)?))
    }

    /// Whether a committed entry exists for `uri`.
    pub fn contains(&self, uri: &Uri) -> bool {
        self.entry_path(uri).is_ok_and(|path| path.is_file())
    }

    /// Path of `path` relative to the cache root, when it lives inside the cache.
    pub fn relative_key(&self, path: &Path) -> Option<PathBuf> {
        path.strip_prefix(&self.root).ok().map(Path::to_path_buf)
    }

    /// Return the local copy of `uri`, downloading it on first use.
    ///
    /// # Returns
    /// The entry path under the cache root.
    ///
    /// # Errors
    /// - [`ResolveError::NotRemote`] for local URIs.
    /// - [`ResolveError::CacheWrite`] when the entry directory or reservation cannot be created.
    /// - [`ResolveError::Transfer`] when the download fails.
    ///
    /// # Notes
    /// - A hit returns without touching the transport.
    /// - On a miss the caller either takes the reservation and downloads, or
    ///   waits for whoever holds it to commit the entry.
    pub fn get_or_fetch(&self, uri: &Uri) -> Result<PathBuf, ResolveError> {
        let entry = self.entry_path(uri)?;
        let parent = entry
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());

        loop {
            if entry.is_file() {
                debug!(%uri, path = %entry.display(), "cache hit");
                return Ok(entry);
            }

            fs::create_dir_all(&parent).map_err(|error| ResolveError::cache_write(&parent, error))?;

            match Reservation::acquire(&entry)? {
                Some(reservation) => {
                    // Someone may have committed between the check and the reservation.
                    if entry.is_file() {
                        return Ok(entry);
                    }
                    self.fetch_into(uri, &entry, &parent)?;
                    drop(reservation);
                    info!(%uri, path = %entry.display(), "cached remote file");
                    return Ok(entry);
                }
                None => self.wait_for(uri, &entry)?,
            }
        }
    }

    fn fetch_into(&self, uri: &Uri, entry: &Path, parent: &Path) -> Result<(), ResolveError> {
        let name = entry
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let staging = tempfile::Builder::new()
            .prefix(&format!(".{name}."))
            .suffix(".part")
            .tempfile_in(parent)
            .map_err(|error| ResolveError::cache_write(parent, error))?;

        // The staging file is removed on drop if the transfer fails.
        self.transport.download(uri, staging.path())?;
        staging
            .persist(entry)
            .map_err(|error| ResolveError::cache_write(entry, error.error))?;
        Ok(())
    }

    /// Block until the reservation on `entry` is released, committed or stale.
    fn wait_for(&self, uri: &Uri, entry: &Path) -> Result<(), ResolveError> {
        let lock = lock_path(entry);
        debug!(%uri, lock = %lock.display(), "waiting for concurrent fetch");
        loop {
            if entry.is_file() {
                return Ok(());
            }
            let modified = match fs::metadata(&lock).and_then(|meta| meta.modified()) {
                Ok(modified) => modified,
                Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(()),
                Err(error) => return Err(ResolveError::cache_write(&lock, error)),
            };
            let age = SystemTime::now().duration_since(modified).unwrap_or_default();
            if age > self.options.stale_after {
                warn!(%uri, lock = %lock.display(), age_secs = age.as_secs(), "breaking stale cache reservation");
                match fs::remove_file(&lock) {
                    Ok(()) => return Ok(()),
                    Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(()),
                    Err(error) => return Err(ResolveError::cache_write(&lock, error)),
                }
            }
            thread::sleep(self.options.poll_interval);
        }
    }
}

/// Exclusive claim on fetching one entry. Released on drop.
#[derive(Debug)]
struct Reservation {
    path: PathBuf,
}

impl Reservation {
    /// `Ok(None)` when another fetcher already holds the reservation.
    fn acquire(entry: &Path) -> Result<Option<Self>, ResolveError> {
        let path = lock_path(entry);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                let reservation = Self { path };
                writeln!(file, "{}", std::process::id())
                    .map_err(|error| ResolveError::cache_write(&reservation.path, error))?;
                Ok(Some(reservation))
            }
            Err(error) if error.kind() == io::ErrorKind::AlreadyExists => Ok(None),
            Err(error) => Err(ResolveError::cache_write(&path, error)),
        }
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if let Err(error) = fs::remove_file(&self.path)
            && error.kind() != io::ErrorKind::NotFound
        {
            warn!(lock = %self.path.display(), error = %error, "failed to release cache reservation");
        }
    }
}

fn lock_path(entry: &Path) -> PathBuf {
    let mut name = entry.file_name().map(|name| name.to_os_string()).unwrap_or_default();
    name.push(LOCK_SUFFIX);
    entry.with_file_name(name)
}

/// Cache-relative path for a remote URI.
///
/// `gs://b/k` → `gcs/b/k`, `s3://b/k` → `s3/b/k`, `https://h:8443/p?q` →
/// `https/h_8443/p%3Fq`. Distinct URIs get distinct keys: `.` and `..` become
/// `%2E` and `%2E%2E`, and an empty segment becomes `%`.
pub(crate) fn cache_key(uri: &Uri) -> Result<PathBuf, ResolveError> {
    let mut key = PathBuf::new();
    match uri.scheme() {
        SchemeTag::Local => {
            return Err(ResolveError::NotRemote {
                uri: uri.as_str().to_string(),
            });
        }
        SchemeTag::Gcs | SchemeTag::S3 => {
            key.push(uri.scheme().as_str());
            let rest = uri.remote_path().unwrap_or_default();
            key.extend(rest.split('/').map(encode_segment));
        }
        SchemeTag::Http => {
            let url = Url::parse(uri.as_str())
                .map_err(|error| ResolveError::transfer(uri.as_str(), format!("invalid URL: {error}")))?;
            key.push(url.scheme());
            let host = url.host_str().unwrap_or("localhost");
            match url.port() {
                Some(port) => key.push(format!("{host}_{port}")),
                None => key.push(host),
            }

            let mut segments: Vec<String> = match url.path() {
                "" | "/" => vec!["index".to_string()],
                _ => url
                    .path_segments()
                    .into_iter()
                    .flatten()
                    .map(|segment| encode_segment(&percent_decode_str(segment).decode_utf8_lossy()))
                    .collect(),
            };
            if let (Some(query), Some(last)) = (url.query(), segments.last_mut()) {
                last.push_str("%3F");
                last.extend(utf8_percent_encode(query, NON_ALPHANUMERIC));
            }
            key.extend(segments);
        }
    }
    Ok(key)
}

fn encode_segment(segment: &str) -> String {
    match segment {
        "" => EMPTY_SEGMENT.to_string(),
        "." => "%2E".to_string(),
        ".." => "%2E%2E".to_string(),
        other => utf8_percent_encode(other, SEGMENT).to_string(),
    }
}
