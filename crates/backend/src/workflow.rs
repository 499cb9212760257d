//! Directive and import scanning over workflow sources.

use std::fs;
use std::io;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

static DOCKER_DIRECTIVE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*#\s*WHARF\s+docker\s(.+)").expect("docker directive regex should compile"));
static SINGULARITY_DIRECTIVE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*#\s*WHARF\s+singularity\s(.+)").expect("singularity directive regex should compile")
});
static IMPORT_STATEMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^\s*import\s+["'](.+)["']\s+as\s+"#).expect("import regex should compile"));

fn first_directive(text: &str, pattern: &Regex) -> Option<String> {
    text.lines().find_map(|line| {
        let value = pattern.captures(line)?.get(1)?.as_str().trim();
        (!value.is_empty()).then(|| value.to_string())
    })
}

/// The first `#WHARF docker <image>` value in `text`.
pub fn docker_directive(text: &str) -> Option<String> {
    first_directive(text, &DOCKER_DIRECTIVE)
}

/// The first `#WHARF singularity <image>` value in `text`.
pub fn singularity_directive(text: &str) -> Option<String> {
    first_directive(text, &SINGULARITY_DIRECTIVE)
}

pub fn detect_docker_from_workflow(path: &Path) -> io::Result<Option<String>> {
    Ok(docker_directive(&fs::read_to_string(path)?))
}

pub fn detect_singularity_from_workflow(path: &Path) -> io::Result<Option<String>> {
    Ok(singularity_directive(&fs::read_to_string(path)?))
}

/// Targets of `import "x" as y` statements, in source order.
pub fn find_workflow_imports(text: &str) -> Vec<String> {
    text.lines()
        .filter_map(|line| IMPORT_STATEMENT.captures(line))
        .filter_map(|captures| captures.get(1).map(|target| target.as_str().to_string()))
        .collect()
}
