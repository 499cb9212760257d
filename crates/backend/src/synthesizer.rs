//! Backend configuration synthesis.
//!
//! Stanzas are merged in a fixed order (common, local, cloud, schedulers,
//! database) and the user override goes last so it wins every disagreement.

use std::io;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};
use wharf_types::{BackendKind, BackendParameters, ConfigFragment};
use wharf_uri::{ResolveError, UriResolver, write_atomic};

use crate::hocon;
use crate::merge::{get_path, merge_tracked, set_path};
use crate::stanza::{CommonStanza, DatabaseStanza, StanzaGenerator, generator_for};

/// Header every generated configuration starts with.
pub const BUILTIN_HEADER: &str = "include required(classpath(\"application\"))";

static INCLUDE_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*include\s").expect("include regex should compile"));

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse backend override {source_name} at line {line}, column {column}: {message}")]
    OverrideParse {
        source_name: String,
        line: usize,
        column: usize,
        message: String,
    },

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("failed to write backend configuration {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// A synthesized engine configuration, ready to render.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendConfig {
    /// `include` lines carried over from the override, in their original order.
    pub headers: Vec<String>,
    pub body: ConfigFragment,
    /// Provider name written to `backend.default`.
    pub default_backend: String,
}

impl BackendConfig {
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(BUILTIN_HEADER);
        out.push('\n');
        for header in &self.headers {
            out.push_str(header);
            out.push('\n');
        }
        out.push('\n');
        out.push_str(&hocon::serialize(&self.body));
        out
    }
}

/// Split `include` lines out of an override document.
///
/// Returns the include lines (trimmed, deduplicated, built-in header removed)
/// and the remaining text with those lines blanked so parse positions still
/// match the original.
pub fn split_override_headers(text: &str) -> (Vec<String>, String) {
    let mut headers: Vec<String> = Vec::new();
    let mut body = String::with_capacity(text.len());
    for line in text.lines() {
        if INCLUDE_LINE.is_match(line) {
            let header = line.trim().to_string();
            if header != BUILTIN_HEADER && !headers.contains(&header) {
                headers.push(header);
            }
        } else {
            body.push_str(line);
        }
        body.push('\n');
    }
    (headers, body)
}

/// Merge every enabled stanza and the optional override into one configuration.
///
/// # Arguments
/// - `params`: Resolved backend parameters.
/// - `override_source`: `(name, text)` of a user HOCON file; the name only appears in errors.
///
/// # Returns
/// The merged body, the override's `include` headers and the default backend.
///
/// # Errors
/// [`ConfigError::OverrideParse`] with the line and column of the first syntax error.
pub fn build_backend_config(
    params: &BackendParameters,
    override_source: Option<(&str, &str)>,
) -> Result<BackendConfig, ConfigError> {
    let mut generators: Vec<Box<dyn StanzaGenerator + '_>> = vec![Box::new(CommonStanza::new(&params.common))];
    generators.extend(BackendKind::ALL.map(|kind| generator_for(kind, params)));
    generators.push(Box::new(DatabaseStanza::new(&params.database)));

    let mut body = ConfigFragment::new();
    for generator in &generators {
        if !generator.is_enabled() {
            debug!(stanza = %generator.kind(), "skipping stanza without required parameters");
            continue;
        }
        body = merge_logged(body, &generator.generate(), &generator.kind().to_string());
    }

    let mut headers = Vec::new();
    let mut override_default = None;
    if let Some((source_name, text)) = override_source {
        let (override_headers, override_body) = split_override_headers(text);
        let fragment = hocon::parse(&override_body).map_err(|error| ConfigError::OverrideParse {
            source_name: source_name.to_string(),
            line: error.line,
            column: error.column,
            message: error.message,
        })?;
        override_default = get_path(&fragment, "backend.default")
            .and_then(Value::as_str)
            .map(str::to_string);
        headers = override_headers;
        body = merge_logged(body, &fragment, source_name);
    }

    let default_backend = match (params.default_backend, override_default) {
        (Some(kind), _) => kind.provider_name().to_string(),
        (None, Some(name)) => name,
        (None, None) => BackendKind::Local.provider_name().to_string(),
    };
    set_path(&mut body, "backend.default", Value::String(default_backend.clone()));

    Ok(BackendConfig {
        headers,
        body,
        default_backend,
    })
}

fn merge_logged(base: ConfigFragment, incoming: &ConfigFragment, source: &str) -> ConfigFragment {
    let (merged, conflicts) = merge_tracked(base, incoming);
    for conflict in &conflicts {
        debug!(source, path = %conflict.path, previous = %conflict.previous, incoming = %conflict.incoming, "configuration value overridden");
    }
    merged
}

/// Synthesize the configuration, localizing the override named in
/// `params.override_config` through `resolver`. Nothing is written.
pub fn load_backend_config(resolver: &UriResolver, params: &BackendParameters) -> Result<BackendConfig, ConfigError> {
    let override_text = match params.override_config.as_deref() {
        Some(source) => Some((source, resolver.read_to_string(source)?)),
        None => None,
    };
    build_backend_config(params, override_text.as_ref().map(|(name, text)| (*name, text.as_str())))
}

/// Synthesize the configuration and write it to `path` in one atomic step.
pub fn write_backend_config(
    resolver: &UriResolver,
    params: &BackendParameters,
    path: &Path,
) -> Result<BackendConfig, ConfigError> {
    let config = load_backend_config(resolver, params)?;
    config.write(path)?;
    Ok(config)
}

impl BackendConfig {
    /// Write the rendered document to `path` through a temporary sibling.
    pub fn write(&self, path: &Path) -> Result<(), ConfigError> {
        write_atomic(path, self.render().as_bytes()).map_err(|error| match error {
            ResolveError::Io { path, source } => ConfigError::Io { path, source },
            other => ConfigError::Resolve(other),
        })?;
        info!(path = %path.display(), default_backend = %self.default_backend, "wrote backend configuration");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers_are_split_and_deduplicated() {
        let text = "include required(classpath(\"application\"))\ninclude \"extra.conf\"\n  include \"extra.conf\"\nbackend.default = slurm\n";
        let (headers, body) = split_override_headers(text);
        assert_eq!(headers, vec!["include \"extra.conf\"".to_string()]);
        assert_eq!(body.lines().count(), 4);
        assert_eq!(body.lines().nth(3), Some("backend.default = slurm"));
    }

    #[test]
    fn render_puts_builtin_header_first() {
        let config = build_backend_config(&BackendParameters::default(), Some(("user.conf", "include \"a.conf\"\n"))).unwrap();
        let rendered = config.render();
        let mut lines = rendered.lines();
        assert_eq!(lines.next(), Some(BUILTIN_HEADER));
        assert_eq!(lines.next(), Some("include \"a.conf\""));
        assert_eq!(rendered.matches("include").count(), 2);
    }
}
