use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced while resolving, caching or deep-copying references.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// Remote fetch or upload failed (network, auth, missing object, quota).
    #[error("transfer failed for {uri}: {reason}")]
    Transfer { uri: String, reason: String },

    /// The cache directory (or an entry inside it) could not be written.
    #[error("cache location {path} is not writable: {source}")]
    CacheWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A referenced local path does not exist.
    #[error("local path does not exist: {path}")]
    NotFound { path: PathBuf },

    /// Only remote URIs are cached.
    #[error("{uri} is a local path; only remote URIs can be fetched into the cache")]
    NotRemote { uri: String },

    /// A structured document could not be parsed in its declared format.
    #[error("{uri} is not a valid {format} document: {reason}")]
    MalformedDocument { uri: String, format: String, reason: String },

    /// Resolution of one reference inside a document failed.
    #[error("failed to deep-copy '{reference}': {source}")]
    Leaf {
        reference: String,
        #[source]
        source: Box<ResolveError>,
    },

    /// Local I/O failure outside the cache.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ResolveError {
    pub(crate) fn transfer(uri: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Transfer {
            uri: uri.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn cache_write(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::CacheWrite { path: path.into(), source }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }

    /// The innermost reference that failed when this error came out of a deep copy.
    pub fn failing_reference(&self) -> Option<&str> {
        match self {
            Self::Leaf { reference, source } => source.failing_reference().or(Some(reference.as_str())),
            _ => None,
        }
    }
}
