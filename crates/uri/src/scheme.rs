//! Scheme classification and URI normalization.
//!
//! Classification is purely lexical: the storage class of a reference is
//! decided by its prefix and never by touching the filesystem or network.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::expand_tilde;

const GCS_PREFIX: &str = "gs://";
const S3_PREFIX: &str = "s3://";
const HTTP_PREFIX: &str = "http://";
const HTTPS_PREFIX: &str = "https://";
const FILE_PREFIX: &str = "file://";

/// Storage class implied by a URI prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemeTag {
    Local,
    Gcs,
    S3,
    Http,
}

impl SchemeTag {
    pub fn is_remote(&self) -> bool {
        !matches!(self, SchemeTag::Local)
    }

    /// Short name used in cache layouts and derived file names.
    pub fn as_str(&self) -> &'static str {
        match self {
            SchemeTag::Local => "local",
            SchemeTag::Gcs => "gcs",
            SchemeTag::S3 => "s3",
            SchemeTag::Http => "http",
        }
    }
}

impl fmt::Display for SchemeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a URI string by prefix. Total: anything unrecognised is a local path.
///
/// Matching is case-sensitive on the scheme token, so `GS://bucket` is a
/// (strange) local path rather than a bucket object.
pub fn classify(uri: &str) -> SchemeTag {
    let trimmed = uri.trim_start();
    if trimmed.starts_with(GCS_PREFIX) {
        SchemeTag::Gcs
    } else if trimmed.starts_with(S3_PREFIX) {
        SchemeTag::S3
    } else if trimmed.starts_with(HTTP_PREFIX) || trimmed.starts_with(HTTPS_PREFIX) {
        SchemeTag::Http
    } else {
        SchemeTag::Local
    }
}

/// A normalized URI together with its storage class.
///
/// Two `Uri`s are equal iff their normalized string forms are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Uri {
    value: String,
    scheme: SchemeTag,
}

impl Uri {
    /// Normalize a raw reference. Never fails.
    ///
    /// Whitespace is trimmed. Local references additionally lose a `file://`
    /// prefix and have a leading `~` expanded to the home directory.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        let scheme = classify(trimmed);
        let value = match scheme {
            SchemeTag::Local => normalize_local(trimmed),
            _ => trimmed.to_string(),
        };
        Self { value, scheme }
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn scheme(&self) -> SchemeTag {
        self.scheme
    }

    pub fn is_local(&self) -> bool {
        self.scheme == SchemeTag::Local
    }

    pub fn is_remote(&self) -> bool {
        self.scheme.is_remote()
    }

    /// Local filesystem path for local URIs.
    pub fn local_path(&self) -> Option<&Path> {
        self.is_local().then(|| Path::new(&self.value))
    }

    /// Portion after `scheme://` for remote URIs.
    pub fn remote_path(&self) -> Option<&str> {
        if !self.is_remote() {
            return None;
        }
        self.value.split_once("://").map(|(_, rest)| rest)
    }

    /// Whether this string plausibly names a file: a remote URI with an
    /// object path, or an absolute local path.
    pub fn is_file_reference(&self) -> bool {
        match self.scheme {
            SchemeTag::Local => Path::new(&self.value).is_absolute(),
            _ => self
                .remote_path()
                .and_then(|rest| rest.split_once('/'))
                .is_some_and(|(authority, key)| !authority.is_empty() && !key.is_empty() && !key.ends_with('/')),
        }
    }

    /// Final path segment, ignoring query strings and fragments.
    pub fn file_name(&self) -> Option<&str> {
        let path = match self.scheme {
            SchemeTag::Http => self.value.split(['?', '#']).next().unwrap_or(&self.value),
            _ => &self.value,
        };
        path.rsplit('/').next().filter(|name| !name.is_empty())
    }

    /// Lowercased extension of the final path segment, without the dot.
    pub fn extension(&self) -> Option<String> {
        let name = self.file_name()?;
        let (stem, extension) = name.rsplit_once('.')?;
        if stem.is_empty() || extension.is_empty() {
            return None;
        }
        Some(extension.to_ascii_lowercase())
    }

    /// Join a relative key below this URI, collapsing duplicate slashes at the seam.
    pub fn join(&self, key: &str) -> Uri {
        let base = self.value.trim_end_matches('/');
        let key = key.trim_start_matches('/');
        Uri::parse(&format!("{base}/{key}"))
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

impl From<&Path> for Uri {
    fn from(path: &Path) -> Self {
        Uri::parse(&path.to_string_lossy())
    }
}

impl From<PathBuf> for Uri {
    fn from(path: PathBuf) -> Self {
        Uri::from(path.as_path())
    }
}

fn normalize_local(raw: &str) -> String {
    let without_prefix = raw.strip_prefix(FILE_PREFIX).unwrap_or(raw);
    if without_prefix == "~" || without_prefix.starts_with("~/") {
        return expand_tilde(without_prefix).to_string_lossy().into_owned();
    }
    without_prefix.to_string()
}
