//! Workflow options and labels documents handed to the engine.

use std::collections::BTreeSet;
use std::env;
use std::path::{Component, Path, PathBuf};

use serde_json::{Value, json};
use wharf_types::{BackendKind, ConfigFragment, WharfParameters};
use wharf_uri::Uri;

use crate::merge::merge;
use crate::stanza::normalize_zones;
use crate::submission::SubmissionError;
use crate::workflow::{docker_directive, singularity_directive};

pub const LABEL_BACKEND: &str = "wharf-backend";
pub const LABEL_STR: &str = "wharf-str-label";
pub const LABEL_USER: &str = "wharf-user";

/// Bind roots are cut to this many named components below `/`.
const BINDPATH_MAX_DEPTH: usize = 4;

/// Container images a submission runs its tasks in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerChoice {
    pub docker: Option<String>,
    pub singularity: Option<String>,
}

impl ContainerChoice {
    /// Pick images from explicit parameters, falling back to workflow directives.
    ///
    /// Docker is required on cloud backends and whenever `use_docker` is set;
    /// Singularity only when `use_singularity` is set.
    pub fn select(backend: &str, params: &WharfParameters, workflow_source: &str) -> Result<Self, SubmissionError> {
        let submission = &params.submission;
        let mut choice = ContainerChoice::default();
        let is_cloud = backend.parse::<BackendKind>().is_ok_and(|kind| kind.is_cloud());

        if submission.use_docker || is_cloud {
            let docker = submission.docker.clone().or_else(|| docker_directive(workflow_source));
            choice.docker = Some(docker.ok_or(SubmissionError::MissingContainer {
                backend: backend.to_string(),
                container: "docker",
            })?);
        }
        if submission.use_singularity {
            let singularity = submission
                .singularity
                .clone()
                .or_else(|| singularity_directive(workflow_source));
            choice.singularity = Some(singularity.ok_or(SubmissionError::MissingContainer {
                backend: backend.to_string(),
                container: "singularity",
            })?);
        }
        Ok(choice)
    }
}

/// Build the workflow options document.
///
/// `inputs` is the localized inputs document; it is only consulted for the
/// Singularity bind path. `user_options` is merged last.
pub fn workflow_options(
    backend: &str,
    params: &WharfParameters,
    containers: &ContainerChoice,
    inputs: Option<&Value>,
    user_options: Option<&ConfigFragment>,
) -> ConfigFragment {
    let mut attributes = ConfigFragment::new();
    if let Some(docker) = &containers.docker {
        attributes.insert("docker".into(), json!(docker));
    }
    if let Some(singularity) = &containers.singularity {
        attributes.insert("singularity".into(), json!(singularity));
        if let Some(cachedir) = &params.submission.singularity_cachedir {
            attributes.insert("singularity_cachedir".into(), json!(cachedir.to_string_lossy()));
        }
        let bindpath = inputs.map(singularity_bindpath).unwrap_or_default();
        attributes.insert("singularity_bindpath".into(), json!(bindpath));
    }
    if let Some(zones) = params.backend.gcp.zones.as_deref() {
        attributes.insert("zones".into(), json!(normalize_zones(zones)));
    }

    let backend_params = &params.backend;
    let scheduler_attributes = [
        ("slurm_partition", backend_params.slurm.partition.as_deref()),
        ("slurm_account", backend_params.slurm.account.as_deref()),
        ("sge_pe", backend_params.sge.pe.as_deref()),
        ("sge_queue", backend_params.sge.queue.as_deref()),
        ("pbs_queue", backend_params.pbs.queue.as_deref()),
    ];
    for (name, value) in scheduler_attributes {
        if let Some(value) = value {
            attributes.insert(name.into(), json!(value));
        }
    }
    attributes.insert("maxRetries".into(), json!(params.submission.max_retries));

    let mut options = ConfigFragment::new();
    options.insert("backend".into(), json!(backend));
    options.insert("default_runtime_attributes".into(), Value::Object(attributes));
    match user_options {
        Some(user) => merge(options, user),
        None => options,
    }
}

/// Comma-joined directories to bind into Singularity containers.
///
/// Collects the parent directory of every absolute local path in `inputs`,
/// cuts each to at most four components and drops directories nested in
/// another one.
pub fn singularity_bindpath(inputs: &Value) -> String {
    let mut roots = BTreeSet::new();
    collect_local_dirs(inputs, &mut roots);

    let roots: Vec<PathBuf> = roots.into_iter().collect();
    roots
        .iter()
        .filter(|dir| !roots.iter().any(|other| other != *dir && dir.starts_with(other)))
        .map(|dir| dir.to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(",")
}

fn collect_local_dirs(value: &Value, roots: &mut BTreeSet<PathBuf>) {
    match value {
        Value::Object(map) => map.values().for_each(|value| collect_local_dirs(value, roots)),
        Value::Array(items) => items.iter().for_each(|value| collect_local_dirs(value, roots)),
        Value::String(text) => {
            let uri = Uri::parse(text);
            let Some(path) = uri.local_path().filter(|path| path.is_absolute()) else {
                return;
            };
            if let Some(parent) = path.parent() {
                roots.insert(truncate_dir(parent));
            }
        }
        _ => {}
    }
}

fn truncate_dir(dir: &Path) -> PathBuf {
    let mut truncated = PathBuf::new();
    let mut depth = 0;
    for component in dir.components() {
        if let Component::Normal(_) = component {
            if depth == BINDPATH_MAX_DEPTH {
                break;
            }
            depth += 1;
        }
        truncated.push(component);
    }
    truncated
}

/// Build the labels document: user labels first, then the wharf labels on top.
pub fn labels(backend: &str, str_label: Option<&str>, user_labels: Option<&ConfigFragment>) -> ConfigFragment {
    let mut labels = user_labels.cloned().unwrap_or_default();
    labels.insert(LABEL_BACKEND.into(), json!(backend));
    if let Some(str_label) = str_label {
        labels.insert(LABEL_STR.into(), json!(str_label));
    }
    let user = env::var("USER").unwrap_or_default();
    labels.insert(LABEL_USER.into(), json!(user));
    labels
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn bindpath_uses_common_roots() {
        let inputs = json!({
            "a": "/data/project/run1/sample/deep/x.bam",
            "b": ["/data/project/run1/sample/y.bam", "/ref/hg38.fa"],
            "c": "gs://bucket/z.bam",
            "d": "relative/path.txt",
            "n": 3
        });
        assert_eq!(singularity_bindpath(&inputs), "/data/project/run1/sample,/ref");
    }

    #[test]
    fn nested_short_roots_collapse() {
        let inputs = json!(["/a/b/x.txt", "/a/b/c/y.txt", "/a/bc/z.txt"]);
        assert_eq!(singularity_bindpath(&inputs), "/a/b,/a/bc");
    }

    #[test]
    fn cloud_backend_requires_docker() {
        let params = WharfParameters::default();
        let error = ContainerChoice::select("gcp", &params, "version 1.0\n").unwrap_err();
        assert!(matches!(error, SubmissionError::MissingContainer { container: "docker", .. }));

        let choice = ContainerChoice::select("gcp", &params, "#WHARF docker ubuntu:22.04\n").unwrap();
        assert_eq!(choice.docker.as_deref(), Some("ubuntu:22.04"));
        assert_eq!(choice.singularity, None);
    }

    #[test]
    fn explicit_docker_beats_directive() {
        let mut params = WharfParameters::default();
        params.submission.use_docker = true;
        params.submission.docker = Some("explicit/img".into());
        let choice = ContainerChoice::select("Local", &params, "#WHARF docker directive/img\n").unwrap();
        assert_eq!(choice.docker.as_deref(), Some("explicit/img"));
    }

    #[test]
    fn options_carry_runtime_defaults_and_user_overrides() {
        let mut params = WharfParameters::default();
        params.backend.slurm.partition = Some("normal".into());
        params.backend.slurm.extra_param = Some("--qos=high".into());
        params.submission.singularity_cachedir = Some(PathBuf::from("/scratch/sif"));
        params.submission.max_retries = 3;
        let containers = ContainerChoice {
            docker: None,
            singularity: Some("docker://ubuntu".into()),
        };
        let user = json!({"default_runtime_attributes": {"maxRetries": 0}, "final_workflow_outputs_dir": "/out"});

        let options = workflow_options(
            "slurm",
            &params,
            &containers,
            Some(&json!({"x": "/data/a/b.txt"})),
            user.as_object(),
        );
        let attributes = &options["default_runtime_attributes"];
        assert_eq!(options["backend"], "slurm");
        assert_eq!(attributes["slurm_partition"], "normal");
        assert!(attributes.get("slurm_extra_param").is_none());
        assert_eq!(attributes["singularity_cachedir"], "/scratch/sif");
        assert_eq!(attributes["singularity_bindpath"], "/data/a");
        assert_eq!(attributes["maxRetries"], 0);
        assert_eq!(options["final_workflow_outputs_dir"], "/out");
    }

    #[test]
    fn wharf_labels_override_user_labels() {
        let user = json!({"wharf-backend": "spoofed", "team": "genomics"});
        let document = temp_env::with_var("USER", Some("alice"), || {
            labels("aws", Some("batch-7"), user.as_object())
        });
        assert_eq!(document["wharf-backend"], "aws");
        assert_eq!(document["wharf-str-label"], "batch-7");
        assert_eq!(document["wharf-user"], "alice");
        assert_eq!(document["team"], "genomics");
    }
}
