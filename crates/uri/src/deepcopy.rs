//! Recursive rewriting of file references inside structured documents.
//!
//! Every string leaf that names a file is resolved for a [`CopyTarget`] and
//! replaced. Referenced JSON/TSV/CSV files are themselves rewritten first, so
//! manifests that point at further manifests are followed to any depth. A
//! rewritten manifest is saved next to its cache entry as
//! `<stem>.<target>.<ext>` and that derived file is what the leaf points at.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Component, Path, PathBuf};

use indexmap::IndexSet;
use serde_json::Value;
use tracing::{debug, warn};
use wharf_types::params::DEFAULT_DEEPCOPY_EXTENSIONS;

use crate::document::{Document, DocumentFormat};
use crate::resolver::write_atomic;
use crate::{ResolveError, Uri, UriResolver};

/// Where deep-copied references must end up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CopyTarget {
    /// Local paths, for local and HPC backends.
    Local,
    /// Below a bucket prefix, for cloud backends.
    Remote(Uri),
}

impl CopyTarget {
    pub fn remote(prefix: &str) -> Self {
        CopyTarget::Remote(Uri::parse(prefix))
    }

    fn tag(&self) -> &'static str {
        match self {
            CopyTarget::Local => "local",
            CopyTarget::Remote(prefix) => prefix.scheme().as_str(),
        }
    }
}

/// Extensions whose files are parsed and rewritten recursively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionSet(IndexSet<String>);

impl ExtensionSet {
    /// Normalizes entries: leading dots are dropped and case is folded.
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(
            extensions
                .into_iter()
                .map(|extension| extension.as_ref().trim().trim_start_matches('.').to_ascii_lowercase())
                .filter(|extension| !extension.is_empty())
                .collect(),
        )
    }

    pub fn contains(&self, extension: &str) -> bool {
        self.0.contains(extension)
    }

    fn format_for(&self, uri: &Uri) -> Option<DocumentFormat> {
        uri.extension()
            .filter(|extension| self.contains(extension))
            .and_then(|extension| DocumentFormat::from_extension(&extension))
    }
}

impl Default for ExtensionSet {
    fn default() -> Self {
        Self::new(DEFAULT_DEEPCOPY_EXTENSIONS)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeepCopyOutcome {
    pub document: Document,
    /// New values of every leaf that was replaced, in discovery order.
    pub localized: IndexSet<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileCopyOutcome {
    /// Where the (possibly rewritten) root file now lives.
    pub location: String,
    pub localized: IndexSet<String>,
}

/// Rewrite every file reference in `document` for `target`.
///
/// # Arguments
/// - `resolver`: Localizes and stages the referenced files.
/// - `document`: The JSON tree or table to walk; it is not modified.
/// - `extensions`: File types whose contents are rewritten recursively.
/// - `target`: `Local` to localize, or a bucket prefix to re-stage onto.
///
/// # Returns
/// The rewritten document, same shape as the input, plus every location
/// that replaced a leaf.
///
/// # Errors
/// All-or-nothing: a resolver failure on any leaf aborts with
/// [`ResolveError::Leaf`] naming that reference.
pub fn deep_copy(
    resolver: &UriResolver,
    document: &Document,
    extensions: &ExtensionSet,
    target: &CopyTarget,
) -> Result<DeepCopyOutcome, ResolveError> {
    let mut copier = DeepCopier::new(resolver, extensions, target);
    let document = copier.rewrite_document(document)?;
    Ok(DeepCopyOutcome {
        document,
        localized: copier.localized,
    })
}

/// Deep-copy the file at `uri` and resolve it for `target`.
///
/// # Returns
/// Where the file (or its rewritten copy) now lives, plus the locations
/// that replaced references inside it.
///
/// # Errors
/// Unlike nested references, a root file that cannot be parsed is
/// [`ResolveError::MalformedDocument`].
pub fn deep_copy_file(
    resolver: &UriResolver,
    uri: &str,
    extensions: &ExtensionSet,
    target: &CopyTarget,
) -> Result<FileCopyOutcome, ResolveError> {
    let mut copier = DeepCopier::new(resolver, extensions, target);
    let location = copier.copy_reference(&Uri::parse(uri), true)?;
    Ok(FileCopyOutcome {
        location,
        localized: copier.localized,
    })
}

struct DeepCopier<'a> {
    resolver: &'a UriResolver,
    extensions: &'a ExtensionSet,
    target: &'a CopyTarget,
    /// Origin URI → placed location, for this call only.
    memo: HashMap<String, String>,
    in_progress: HashSet<String>,
    localized: IndexSet<String>,
}

impl<'a> DeepCopier<'a> {
    fn new(resolver: &'a UriResolver, extensions: &'a ExtensionSet, target: &'a CopyTarget) -> Self {
        Self {
            resolver,
            extensions,
            target,
            memo: HashMap::new(),
            in_progress: HashSet::new(),
            localized: IndexSet::new(),
        }
    }

    fn rewrite_document(&mut self, document: &Document) -> Result<Document, ResolveError> {
        match document {
            Document::Json(value) => self.rewrite_value(value).map(Document::Json),
            Document::Table { format, rows } => {
                let rows = rows
                    .iter()
                    .map(|row| row.iter().map(|cell| self.rewrite_leaf(cell)).collect::<Result<Vec<_>, _>>())
                    .collect::<Result<_, _>>()?;
                Ok(Document::Table { format: *format, rows })
            }
        }
    }

    fn rewrite_value(&mut self, value: &Value) -> Result<Value, ResolveError> {
        Ok(match value {
            Value::String(leaf) => Value::String(self.rewrite_leaf(leaf)?),
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|item| self.rewrite_value(item))
                    .collect::<Result<_, _>>()?,
            ),
            Value::Object(map) => {
                let mut rewritten = serde_json::Map::with_capacity(map.len());
                for (key, item) in map {
                    rewritten.insert(key.clone(), self.rewrite_value(item)?);
                }
                Value::Object(rewritten)
            }
            other => other.clone(),
        })
    }

    fn rewrite_leaf(&mut self, leaf: &str) -> Result<String, ResolveError> {
        let uri = Uri::parse(leaf);
        if !self.is_candidate(&uri) {
            return Ok(leaf.to_string());
        }
        let placed = self
            .copy_reference(&uri, false)
            .map_err(|source| ResolveError::Leaf {
                reference: leaf.to_string(),
                source: Box::new(source),
            })?;
        if placed != leaf {
            self.localized.insert(placed.clone());
        }
        Ok(placed)
    }

    fn is_candidate(&self, uri: &Uri) -> bool {
        if !uri.is_file_reference() {
            return false;
        }
        if uri.is_remote() || self.extensions.format_for(uri).is_some() {
            return true;
        }
        matches!(self.target, CopyTarget::Remote(_)) && uri.local_path().is_some_and(Path::is_file)
    }

    fn copy_reference(&mut self, uri: &Uri, root: bool) -> Result<String, ResolveError> {
        let origin = uri.as_str().to_string();
        if let Some(placed) = self.memo.get(&origin) {
            return Ok(placed.clone());
        }
        if self.in_progress.contains(&origin) {
            warn!(reference = %origin, "cyclic file reference; resolving without recursing");
            return self.back_reference(uri);
        }

        let rewritten = match self.extensions.format_for(uri) {
            Some(format) => {
                self.in_progress.insert(origin.clone());
                let result = self.rewrite_file(uri, format);
                self.in_progress.remove(&origin);
                match result {
                    Ok(rewritten) => rewritten,
                    Err(error @ ResolveError::MalformedDocument { .. }) if !root => {
                        warn!(reference = %origin, error = %error, "leaving unparsable document untouched");
                        self.memo.insert(origin.clone(), origin.clone());
                        return Ok(origin);
                    }
                    Err(error) => return Err(error),
                }
            }
            None => None,
        };

        let placed = self.place(uri, rewritten.as_deref())?;
        debug!(reference = %origin, placed = %placed, "deep-copied reference");
        self.memo.insert(origin, placed.clone());
        Ok(placed)
    }

    /// Rewrite the contents of a manifest; `Some` holds the derived file when
    /// anything inside it changed.
    fn rewrite_file(&mut self, uri: &Uri, format: DocumentFormat) -> Result<Option<PathBuf>, ResolveError> {
        let local = self.resolver.localize_uri(uri)?;
        let malformed = |reason: String| ResolveError::MalformedDocument {
            uri: uri.as_str().to_string(),
            format: format.to_string(),
            reason,
        };
        let text = fs::read_to_string(&local).map_err(|error| match error.kind() {
            std::io::ErrorKind::InvalidData => malformed(error.to_string()),
            _ => ResolveError::io(&local, error),
        })?;
        let document = Document::parse(&text, format).map_err(|error| malformed(error.to_string()))?;

        let rewritten = self.rewrite_document(&document)?;
        if rewritten == document {
            return Ok(None);
        }
        let derived = self.derived_path(uri, &local, format)?;
        let rendered = rewritten.render().map_err(|error| malformed(error.to_string()))?;
        write_atomic(&derived, rendered.as_bytes())?;
        Ok(Some(derived))
    }

    /// `<entry stem>.<target tag>.<ext>` inside the cache.
    fn derived_path(&self, uri: &Uri, local: &Path, format: DocumentFormat) -> Result<PathBuf, ResolveError> {
        let cache = self.resolver.cache();
        let entry = if uri.is_remote() {
            cache.entry_path(uri)?
        } else if cache.relative_key(local).is_some() {
            local.to_path_buf()
        } else {
            let absolute = std::path::absolute(local).map_err(|error| ResolveError::io(local, error))?;
            let mut entry = cache.root().join("local");
            entry.extend(
                absolute
                    .components()
                    .filter(|component| matches!(component, Component::Normal(_))),
            );
            entry
        };

        let name = entry
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let stem = strip_extension(&name, format.extension());
        let stem = strip_extension(stem, self.target.tag());
        Ok(entry.with_file_name(format!("{stem}.{}.{}", self.target.tag(), format.extension())))
    }

    /// Location a document still being rewritten will end up at: its derived
    /// file, which the outer call writes (and stages) once it unwinds.
    fn back_reference(&self, uri: &Uri) -> Result<String, ResolveError> {
        let Some(format) = self.extensions.format_for(uri) else {
            return self.place(uri, None);
        };
        let local = self.resolver.localize_uri(uri)?;
        let derived = self.derived_path(uri, &local, format)?;
        Ok(match self.target {
            CopyTarget::Local => derived.to_string_lossy().into_owned(),
            CopyTarget::Remote(prefix) => self.resolver.staged_location(&derived, prefix.as_str()),
        })
    }

    fn place(&self, uri: &Uri, rewritten: Option<&Path>) -> Result<String, ResolveError> {
        match self.target {
            CopyTarget::Local => {
                let path = match rewritten {
                    Some(path) => path.to_path_buf(),
                    None => self.resolver.localize_uri(uri)?,
                };
                Ok(path.to_string_lossy().into_owned())
            }
            CopyTarget::Remote(prefix) => {
                if rewritten.is_none() && uri.scheme() == prefix.scheme() {
                    return Ok(uri.as_str().to_string());
                }
                let source = match rewritten {
                    Some(path) => path.to_path_buf(),
                    None => self.resolver.localize_uri(uri)?,
                };
                self.resolver.externalize(&source, prefix.as_str())
            }
        }
    }
}

/// Drop a trailing `.<extension>` (case-insensitive) from `name`.
fn strip_extension<'n>(name: &'n str, extension: &str) -> &'n str {
    let suffix_len = extension.len() + 1;
    if name.len() > suffix_len {
        let split = name.len() - suffix_len;
        if name.is_char_boundary(split) {
            let (stem, suffix) = name.split_at(split);
            if suffix.starts_with('.') && suffix[1..].eq_ignore_ascii_case(extension) {
                return stem;
            }
        }
    }
    name
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_sets_normalize_entries() {
        let set = ExtensionSet::new([".JSON", "tsv ", ""]);
        assert!(set.contains("json"));
        assert!(set.contains("tsv"));
        assert!(!set.contains(""));
        assert_eq!(ExtensionSet::default(), ExtensionSet::new(["json", "tsv"]));
    }

    #[test]
    fn strips_known_extensions_only() {
        assert_eq!(strip_extension("x.JSON", "json"), "x");
        assert_eq!(strip_extension("x.local", "local"), "x");
        assert_eq!(strip_extension("x.tsv", "json"), "x.tsv");
        assert_eq!(strip_extension("json", "json"), "json");
    }

    #[test]
    fn target_tags_follow_scheme() {
        assert_eq!(CopyTarget::Local.tag(), "local");
        assert_eq!(CopyTarget::remote("gs://tmp/x").tag(), "gcs");
        assert_eq!(CopyTarget::remote("s3://tmp/x").tag(), "s3");
    }
}
