//! # Wharf URI resolution
//!
//! Localization of file references that may live on the local filesystem,
//! in Google Cloud Storage (`gs://`), in Amazon S3 (`s3://`) or behind HTTP(S):
//!
//! - [`classify`] and [`Uri`]: lexical scheme detection and normalization
//! - [`ContentCache`]: origin-keyed download cache, safe across processes
//! - [`UriResolver`]: `localize` / `externalize`, the entry point passed to
//!   every component that needs files
//! - [`deep_copy`] / [`deep_copy_file`]: rewriting every reference inside
//!   JSON/TSV/CSV documents and the manifests they point at
//! - [`transport`]: the byte movers (HTTP, bucket CLIs, in-memory)

pub mod async_runtime;
pub mod cache;
pub mod deepcopy;
pub mod document;
mod error;
pub mod netrc;
mod resolver;
mod scheme;
pub mod transport;

use std::path::PathBuf;

use dirs_next::home_dir;

pub use cache::{CacheOptions, ContentCache};
pub use deepcopy::{CopyTarget, DeepCopyOutcome, ExtensionSet, FileCopyOutcome, deep_copy, deep_copy_file};
pub use document::{Document, DocumentError, DocumentFormat};
pub use error::ResolveError;
pub use resolver::{UriResolver, write_atomic};
pub use scheme::{SchemeTag, Uri, classify};
pub use transport::{MemoryTransport, StorageTransport};

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    let p = path.trim();
    if p == "~" {
        return home_dir().unwrap_or_else(|| PathBuf::from("~"));
    }
    if let Some(rest) = p.strip_prefix("~/") {
        return home_dir().unwrap_or_else(|| PathBuf::from("~")).join(rest);
    }
    if let Some(rest) = p.strip_prefix("~\\") {
        // Windows-style
        return home_dir().unwrap_or_else(|| PathBuf::from("~")).join(rest);
    }
    PathBuf::from(p)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_tilde_against_home() {
        temp_env::with_var("HOME", Some("/home/tester"), || {
            assert_eq!(expand_tilde("~/cache"), PathBuf::from("/home/tester/cache"));
            assert_eq!(expand_tilde("  ~ "), PathBuf::from("/home/tester"));
        });
        assert_eq!(expand_tilde("/abs/path"), PathBuf::from("/abs/path"));
    }
}
