//! Turning resolved parameters into files on disk and an engine command line.
//!
//! Nothing here launches the engine. [`prepare_submission`] localizes what
//! the engine reads, writes the per-submission documents into a fresh work
//! directory and returns the argv a launcher should execute.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::Local;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};
use wharf_types::params::DEFAULT_TMP_DIR_NAME;
use wharf_types::{BackendKind, ConfigFragment, WharfParameters};
use wharf_uri::{CopyTarget, Document, ExtensionSet, ResolveError, UriResolver, deep_copy, write_atomic};

use crate::options::{ContainerChoice, labels, workflow_options};
use crate::synthesizer::{ConfigError, load_backend_config};
use crate::workflow::find_workflow_imports;

pub const BACKEND_CONF_FILE: &str = "backend.conf";
pub const INPUTS_FILE: &str = "inputs.json";
pub const WORKFLOW_OPTIONS_FILE: &str = "workflow_opts.json";
pub const LABELS_FILE: &str = "labels.json";
pub const METADATA_FILE: &str = "metadata.json";

#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error("no workflow source given")]
    MissingWorkflow,

    #[error("backend {backend} needs a {container} image: pass one explicitly or add a '#WHARF {container} <image>' line to the workflow")]
    MissingContainer { backend: String, container: &'static str },

    #[error("backend {backend} is selected but not configured (missing {missing})")]
    BackendNotConfigured { backend: String, missing: String },

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{path} is not a valid JSON object: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Which engine entry point the argv starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineMode {
    /// Run one workflow to completion.
    Run,
    /// Start a long-lived server.
    Server,
}

/// Everything a launcher needs to start the engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreparedSubmission {
    pub mode: EngineMode,
    pub work_dir: PathBuf,
    /// Provider name the engine dispatches to by default.
    pub backend: String,
    pub backend_conf: PathBuf,
    pub engine_jar: PathBuf,
    pub workflow: Option<PathBuf>,
    pub inputs: Option<PathBuf>,
    pub workflow_options: Option<PathBuf>,
    pub labels: Option<PathBuf>,
    pub metadata: Option<PathBuf>,
    pub imports: Option<PathBuf>,
    /// `import` targets found in the workflow source.
    pub workflow_imports: Vec<String>,
    /// Every reference deep copy replaced in the inputs.
    pub localized: Vec<String>,
    pub argv: Vec<String>,
}

/// Prepare a submission for `mode`.
///
/// # Arguments
/// - `params`: The resolved parameter set.
/// - `resolver`: Localizes the workflow, inputs, imports and engine JAR.
/// - `mode`: `Run` for one workflow, `Server` for a long-lived engine.
///
/// # Returns
/// Every path the engine needs plus its argv. Nothing is executed.
///
/// # Notes
/// - `run` writes `backend.conf`, `inputs.json`, `workflow_opts.json` and
///   `labels.json` into `<tmp_dir>/<workflow stem>/<timestamp>`.
/// - `server` only writes `backend.conf` into `tmp_dir`.
/// - Backend checks run before anything is written.
pub fn prepare_submission(
    params: &WharfParameters,
    resolver: &UriResolver,
    mode: EngineMode,
) -> Result<PreparedSubmission, SubmissionError> {
    let submission = &params.submission;
    let workflow_source = match mode {
        EngineMode::Run => Some(submission.workflow.as_deref().ok_or(SubmissionError::MissingWorkflow)?),
        EngineMode::Server => None,
    };

    let config = load_backend_config(resolver, &params.backend)?;
    if let Ok(kind) = config.default_backend.parse::<BackendKind>() {
        check_configured(kind, params)?;
    }

    let work_dir = match workflow_source {
        Some(source) => submission.tmp_dir.join(workflow_stem(source)).join(timestamp()),
        None => submission.tmp_dir.clone(),
    };
    fs::create_dir_all(&work_dir).map_err(|source| SubmissionError::Io {
        path: work_dir.clone(),
        source,
    })?;
    info!(work_dir = %work_dir.display(), mode = ?mode, "preparing submission");

    let backend_conf = work_dir.join(BACKEND_CONF_FILE);
    config.write(&backend_conf)?;

    let engine_jar = resolver.localize(&submission.engine_jar)?;
    let mut prepared = PreparedSubmission {
        mode,
        work_dir: work_dir.clone(),
        backend: config.default_backend.clone(),
        backend_conf,
        engine_jar,
        workflow: None,
        inputs: None,
        workflow_options: None,
        labels: None,
        metadata: None,
        imports: None,
        workflow_imports: Vec::new(),
        localized: Vec::new(),
        argv: Vec::new(),
    };

    let Some(workflow_source) = workflow_source else {
        prepared.argv = engine_argv(params, &prepared);
        return Ok(prepared);
    };

    let workflow = resolver.localize(workflow_source)?;
    let workflow_text = fs::read_to_string(&workflow).map_err(|source| SubmissionError::Io {
        path: workflow.clone(),
        source,
    })?;
    let containers = ContainerChoice::select(&config.default_backend, params, &workflow_text)?;

    let inputs = match submission.inputs.as_deref() {
        Some(uri) => {
            let text = resolver.read_to_string(uri)?;
            serde_json::from_str::<Value>(&text).map_err(|source| SubmissionError::Json {
                path: uri.to_string(),
                source,
            })?
        }
        None => Value::Object(ConfigFragment::new()),
    };
    let inputs = if submission.no_deepcopy {
        inputs
    } else {
        let target = copy_target(backend_kind, params);
        let extensions = ExtensionSet::new(&submission.deepcopy_extensions);
        let outcome = deep_copy(resolver, &Document::Json(inputs), &extensions, &target)?;
        prepared.localized = outcome.localized.into_iter().collect();
        match outcome.document {
            Document::Json(value) => value,
            Document::Table { .. } => Value::Object(ConfigFragment::new()),
        }
    };
    prepared.inputs = Some(write_json(&work_dir.join(INPUTS_FILE), &inputs)?);

    let user_options = read_object(resolver, submission.options.as_deref())?;
    let options = workflow_options(
        &config.default_backend,
        params,
        &containers,
        Some(&inputs),
        user_options.as_ref(),
    );
    prepared.workflow_options = Some(write_json(&work_dir.join(WORKFLOW_OPTIONS_FILE), &Value::Object(options))?);

    let user_labels = read_object(resolver, submission.labels.as_deref())?;
    let labels = labels(&config.default_backend, submission.str_label.as_deref(), user_labels.as_ref());
    prepared.labels = Some(write_json(&work_dir.join(LABELS_FILE), &Value::Object(labels))?);

    prepared.workflow_imports = find_workflow_imports(&workflow_text);
    prepared.imports = match submission.imports.as_deref() {
        Some(bundle) => Some(resolver.localize(bundle)?),
        None => {
            if !prepared.workflow_imports.is_empty() {
                warn!(
                    workflow = %workflow.display(),
                    imports = ?prepared.workflow_imports,
                    "workflow imports other files but no imports bundle was given"
                );
            }
            None
        }
    };

    prepared.workflow = Some(workflow);
    prepared.metadata = Some(work_dir.join(METADATA_FILE));
    prepared.argv = engine_argv(params, &prepared);
    debug!(argv = ?prepared.argv, "engine command line");
    Ok(prepared)
}

fn check_configured(kind: BackendKind, params: &WharfParameters) -> Result<(), SubmissionError> {
    let missing: Vec<&str> = match kind {
        BackendKind::Gcp => {
            let gcp = &params.backend.gcp;
            [("gcp project", gcp.project.is_none()), ("output gcs bucket", gcp.out_gcs_bucket.is_none())]
                .into_iter()
                .filter_map(|(name, absent)| absent.then_some(name))
                .collect()
        }
        BackendKind::Aws => {
            let aws = &params.backend.aws;
            [
                ("aws batch arn", aws.batch_arn.is_none()),
                ("aws region", aws.region.is_none()),
                ("output s3 bucket", aws.out_s3_bucket.is_none()),
            ]
            .into_iter()
            .filter_map(|(name, absent)| absent.then_some(name))
            .collect()
        }
        _ => Vec::new(),
    };
    if missing.is_empty() {
        return Ok(());
    }
    Err(SubmissionError::BackendNotConfigured {
        backend: kind.to_string(),
        missing: missing.join(", "),
    })
}

/// Cloud backends stage inputs under their temporary bucket prefix.
fn copy_target(backend: Option<BackendKind>, params: &WharfParameters) -> CopyTarget {
    let prefix = match backend {
        Some(BackendKind::Gcp) => params
            .storage
            .tmp_gcs_bucket
            .clone()
            .or_else(|| bucket_tmp_dir(params.backend.gcp.out_gcs_bucket.as_deref())),
        Some(BackendKind::Aws) => params
            .storage
            .tmp_s3_bucket
            .clone()
            .or_else(|| bucket_tmp_dir(params.backend.aws.out_s3_bucket.as_deref())),
        _ => None,
    };
    prefix.map_or(CopyTarget::Local, |prefix| CopyTarget::remote(&prefix))
}

fn bucket_tmp_dir(out_bucket: Option<&str>) -> Option<String> {
    out_bucket.map(|bucket| format!("{}/{DEFAULT_TMP_DIR_NAME}", bucket.trim_end_matches('/')))
}

fn engine_argv(params: &WharfParameters, prepared: &PreparedSubmission) -> Vec<String> {
    let submission = &params.submission;
    let heap = match prepared.mode {
        EngineMode::Run => &submission.java_heap_run,
        EngineMode::Server => &submission.java_heap_server,
    };
    let mut argv = vec![
        "java".to_string(),
        format!("-Xmx{heap}"),
        "-XX:ParallelGCThreads=1".to_string(),
        "-DLOG_LEVEL=INFO".to_string(),
        format!("-Dconfig.file={}", prepared.backend_conf.display()),
        "-jar".to_string(),
        prepared.engine_jar.display().to_string(),
    ];
    match prepared.mode {
        EngineMode::Server => argv.push("server".to_string()),
        EngineMode::Run => {
            argv.push("run".to_string());
            let paths = [
                (None, &prepared.workflow),
                (Some("-i"), &prepared.inputs),
                (Some("-o"), &prepared.workflow_options),
                (Some("-l"), &prepared.labels),
                (Some("-m"), &prepared.metadata),
                (Some("-p"), &prepared.imports),
            ];
            for (flag, path) in paths {
                let Some(path) = path else {
                    continue;
                };
                if let Some(flag) = flag {
                    argv.push(flag.to_string());
                }
                argv.push(path.display().to_string());
            }
        }
    }
    argv
}

fn read_object(resolver: &UriResolver, uri: Option<&str>) -> Result<Option<ConfigFragment>, SubmissionError> {
    let Some(uri) = uri else {
        return Ok(None);
    };
    let text = resolver.read_to_string(uri)?;
    serde_json::from_str(&text)
        .map(Some)
        .map_err(|source| SubmissionError::Json {
            path: uri.to_string(),
            source,
        })
}

fn write_json(path: &Path, value: &Value) -> Result<PathBuf, SubmissionError> {
    let mut rendered = serde_json::to_string_pretty(value).map_err(|source| SubmissionError::Json {
        path: path.display().to_string(),
        source,
    })?;
    rendered.push('\n');
    write_atomic(path, rendered.as_bytes())?;
    Ok(path.to_path_buf())
}

/// File name of the workflow without its extension.
fn workflow_stem(source: &str) -> String {
    let name = source.rsplit(['/', '\\']).next().unwrap_or(source);
    let stem = name.split('?').next().unwrap_or(name);
    match stem.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem.to_string(),
        _ => stem.to_string(),
    }
}

fn timestamp() -> String {
    Local::now().format("%Y%m%d_%H%M%S_%6f").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stem_drops_directories_and_extension() {
        assert_eq!(workflow_stem("/pipelines/atac.wdl"), "atac");
        assert_eq!(workflow_stem("gs://bucket/wf/chip.seq.wdl"), "chip.seq");
        assert_eq!(workflow_stem("https://host/x/main.wdl?ref=v1"), "main");
        assert_eq!(workflow_stem("plain"), "plain");
    }

    #[test]
    fn cloud_target_defaults_below_output_bucket() {
        let mut params = WharfParameters::default();
        params.backend.gcp.out_gcs_bucket = Some("gs://out/runs/".into());
        assert_eq!(
            copy_target(Some(BackendKind::Gcp), &params),
            CopyTarget::remote("gs://out/runs/wharf_tmp_dir")
        );
        params.storage.tmp_gcs_bucket = Some("gs://scratch".into());
        assert_eq!(copy_target(Some(BackendKind::Gcp), &params), CopyTarget::remote("gs://scratch"));
        assert_eq!(copy_target(Some(BackendKind::Slurm), &params), CopyTarget::Local);
        assert_eq!(copy_target(None, &params), CopyTarget::Local);
    }

    #[test]
    fn unconfigured_cloud_backend_lists_missing_fields() {
        let mut params = WharfParameters::default();
        params.backend.aws.region = Some("us-east-1".into());
        let error = check_configured(BackendKind::Aws, &params).unwrap_err();
        let SubmissionError::BackendNotConfigured { missing, .. } = error else {
            panic!("unexpected error {error}");
        };
        assert_eq!(missing, "aws batch arn, output s3 bucket");
        assert!(check_configured(BackendKind::Local, &params).is_ok());
    }
}
