//! Persistent defaults for the wharf CLI.
//!
//! Settings live in a JSON file (`~/.config/wharf/config.json` on most
//! platforms, or the path in `WHARF_CONFIG_PATH`). Every field is optional;
//! command-line flags take precedence over the file, and built-in defaults
//! fill whatever neither provides.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use dirs_next::config_dir;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use wharf_types::params::{
    DEFAULT_DB_TIMEOUT_MS, DEFAULT_DEEPCOPY_EXTENSIONS, DEFAULT_ENGINE_JAR, DEFAULT_JAVA_HEAP_RUN, DEFAULT_JAVA_HEAP_SERVER,
    DEFAULT_MAX_CONCURRENT_TASKS, DEFAULT_MAX_CONCURRENT_WORKFLOWS, DEFAULT_MAX_RETRIES, DEFAULT_MYSQL_HOST, DEFAULT_MYSQL_PORT,
    DEFAULT_PORT, DEFAULT_TMP_DIR_NAME,
};
use wharf_types::{
    AwsParams, BackendKind, BackendParameters, CommonParams, DatabaseParams, GcpParams, LocalParams, PbsParams, SgeParams,
    SlurmParams, StorageParams, SubmissionParams, WharfParameters,
};
use wharf_uri::expand_tilde;

/// Environment variable overriding the settings file location.
pub const SETTINGS_PATH_ENV: &str = "WHARF_CONFIG_PATH";

const SETTINGS_FILE_NAME: &str = "config.json";

/// Everything that can be configured from the settings file or flags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct WharfSettings {
    pub backend: Option<BackendKind>,
    pub backend_file: Option<String>,

    pub out_dir: Option<String>,
    pub tmp_dir: Option<String>,
    pub tmp_gcs_bucket: Option<String>,
    pub tmp_s3_bucket: Option<String>,

    pub port: Option<u16>,
    pub max_concurrent_workflows: Option<u32>,
    pub max_concurrent_tasks: Option<u32>,
    pub max_retries: Option<u32>,
    pub disable_call_caching: Option<bool>,

    pub gcp_prj: Option<String>,
    pub gcp_zones: Option<String>,
    pub out_gcs_bucket: Option<String>,

    pub aws_batch_arn: Option<String>,
    pub aws_region: Option<String>,
    pub out_s3_bucket: Option<String>,

    pub slurm_partition: Option<String>,
    pub slurm_account: Option<String>,
    pub slurm_extra_param: Option<String>,
    pub sge_pe: Option<String>,
    pub sge_queue: Option<String>,
    pub sge_extra_param: Option<String>,
    pub pbs_queue: Option<String>,
    pub pbs_extra_param: Option<String>,

    pub mysql_db_ip: Option<String>,
    pub mysql_db_port: Option<u16>,
    pub mysql_db_user: Option<String>,
    pub mysql_db_password: Option<String>,
    pub file_db: Option<String>,
    pub db_timeout: Option<u64>,

    pub http_user: Option<String>,
    pub http_password: Option<String>,
    pub use_netrc: Option<bool>,
    pub use_gsutil_over_aws_s3: Option<bool>,

    pub cromwell: Option<String>,
    pub java_heap_server: Option<String>,
    pub java_heap_run: Option<String>,

    pub docker: Option<String>,
    pub singularity: Option<String>,
    pub singularity_cachedir: Option<String>,
    pub use_docker: Option<bool>,
    pub use_singularity: Option<bool>,
    pub no_deepcopy: Option<bool>,
    /// Comma separated, e.g. `json,tsv`.
    pub deepcopy_ext: Option<String>,
}

/// Resolve the settings file path: `explicit`, then `WHARF_CONFIG_PATH`, then the config dir.
pub fn settings_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return expand_tilde(&path.to_string_lossy());
    }
    if let Ok(path) = env::var(SETTINGS_PATH_ENV)
        && !path.trim().is_empty()
    {
        return expand_tilde(&path);
    }
    config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("wharf")
        .join(SETTINGS_FILE_NAME)
}

/// Load settings from `path`. A missing file yields defaults; a malformed one
/// is reported and ignored.
pub fn load_settings(path: &Path) -> WharfSettings {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(error) => {
            debug!(path = %path.display(), %error, "no settings file; using defaults");
            return WharfSettings::default();
        }
    };
    match serde_json::from_str(&content) {
        Ok(settings) => settings,
        Err(error) => {
            warn!(path = %path.display(), %error, "ignoring malformed settings file");
            WharfSettings::default()
        }
    }
}

macro_rules! overlay {
    ($target:ident, $source:ident; $($field:ident),+ $(,)?) => {
        $(
            if $source.$field.is_some() {
                $target.$field = $source.$field.clone();
            }
        )+
    };
}

impl WharfSettings {
    /// Layer `overrides` on top of `self`; set fields in `overrides` win.
    pub fn overlay(mut self, overrides: &WharfSettings) -> Self {
        overlay!(self, overrides;
            backend, backend_file, out_dir, tmp_dir, tmp_gcs_bucket, tmp_s3_bucket,
            port, max_concurrent_workflows, max_concurrent_tasks, max_retries, disable_call_caching,
            gcp_prj, gcp_zones, out_gcs_bucket, aws_batch_arn, aws_region, out_s3_bucket,
            slurm_partition, slurm_account, slurm_extra_param, sge_pe, sge_queue, sge_extra_param,
            pbs_queue, pbs_extra_param,
            mysql_db_ip, mysql_db_port, mysql_db_user, mysql_db_password, file_db, db_timeout,
            http_user, http_password, use_netrc, use_gsutil_over_aws_s3,
            cromwell, java_heap_server, java_heap_run,
            docker, singularity, singularity_cachedir, use_docker, use_singularity, no_deepcopy, deepcopy_ext,
        );
        self
    }

    /// Freeze the settings into the parameter set the core consumes.
    ///
    /// `submission` carries the per-run document locations, which only come from flags.
    pub fn into_parameters(self, submission: SubmissionDocuments) -> WharfParameters {
        let out_dir = self.out_dir.as_deref().map(expand_tilde).unwrap_or_else(|| PathBuf::from("."));
        let tmp_dir = self
            .tmp_dir
            .as_deref()
            .map(expand_tilde)
            .unwrap_or_else(|| out_dir.join(DEFAULT_TMP_DIR_NAME));
        let concurrent_job_limit = self.max_concurrent_tasks.unwrap_or(DEFAULT_MAX_CONCURRENT_TASKS);
        let has_mysql = self.mysql_db_user.is_some() || self.mysql_db_password.is_some();

        let backend = BackendParameters {
            default_backend: self.backend,
            common: CommonParams {
                port: self.port.unwrap_or(DEFAULT_PORT),
                max_concurrent_workflows: self.max_concurrent_workflows.unwrap_or(DEFAULT_MAX_CONCURRENT_WORKFLOWS),
                disable_call_caching: self.disable_call_caching.unwrap_or(false),
            },
            local: LocalParams {
                out_dir: out_dir.clone(),
                concurrent_job_limit,
            },
            gcp: GcpParams {
                project: self.gcp_prj,
                out_gcs_bucket: self.out_gcs_bucket,
                zones: self.gcp_zones,
                concurrent_job_limit,
            },
            aws: AwsParams {
                batch_arn: self.aws_batch_arn,
                region: self.aws_region,
                out_s3_bucket: self.out_s3_bucket,
                concurrent_job_limit,
            },
            slurm: SlurmParams {
                out_dir: out_dir.clone(),
                partition: self.slurm_partition,
                account: self.slurm_account,
                extra_param: self.slurm_extra_param,
                concurrent_job_limit,
            },
            sge: SgeParams {
                out_dir: out_dir.clone(),
                pe: self.sge_pe,
                queue: self.sge_queue,
                extra_param: self.sge_extra_param,
                concurrent_job_limit,
            },
            pbs: PbsParams {
                out_dir,
                queue: self.pbs_queue,
                extra_param: self.pbs_extra_param,
                concurrent_job_limit,
            },
            database: DatabaseParams {
                // Host and port fall back to defaults only once credentials are given.
                mysql_host: self
                    .mysql_db_ip
                    .or_else(|| has_mysql.then(|| DEFAULT_MYSQL_HOST.to_string())),
                mysql_port: self.mysql_db_port.or(has_mysql.then_some(DEFAULT_MYSQL_PORT)),
                mysql_user: self.mysql_db_user,
                mysql_password: self.mysql_db_password,
                file_db: self.file_db.as_deref().map(expand_tilde),
                timeout_ms: self.db_timeout.unwrap_or(DEFAULT_DB_TIMEOUT_MS),
            },
            override_config: self.backend_file,
        };

        let storage = StorageParams {
            cache_dir: tmp_dir.join("cache"),
            tmp_gcs_bucket: self.tmp_gcs_bucket,
            tmp_s3_bucket: self.tmp_s3_bucket,
            http_user: self.http_user,
            http_password: self.http_password,
            use_netrc: self.use_netrc.unwrap_or(false),
            use_gsutil_over_aws_s3: self.use_gsutil_over_aws_s3.unwrap_or(false),
        };

        let deepcopy_extensions = match self.deepcopy_ext.as_deref() {
            Some(list) => list
                .split(',')
                .map(str::trim)
                .filter(|ext| !ext.is_empty())
                .map(str::to_string)
                .collect(),
            None => DEFAULT_DEEPCOPY_EXTENSIONS.iter().map(|ext| ext.to_string()).collect(),
        };
        let submission = SubmissionParams {
            workflow: submission.workflow,
            inputs: submission.inputs,
            options: submission.options,
            labels: submission.labels,
            imports: submission.imports,
            str_label: submission.str_label,
            docker: self.docker,
            singularity: self.singularity,
            singularity_cachedir: self.singularity_cachedir.as_deref().map(expand_tilde),
            use_docker: self.use_docker.unwrap_or(false),
            use_singularity: self.use_singularity.unwrap_or(false),
            no_deepcopy: self.no_deepcopy.unwrap_or(false),
            deepcopy_extensions,
            max_retries: self.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
            engine_jar: self.cromwell.unwrap_or_else(|| DEFAULT_ENGINE_JAR.to_string()),
            java_heap_run: self.java_heap_run.unwrap_or_else(|| DEFAULT_JAVA_HEAP_RUN.to_string()),
            java_heap_server: self.java_heap_server.unwrap_or_else(|| DEFAULT_JAVA_HEAP_SERVER.to_string()),
            tmp_dir,
        };

        WharfParameters {
            backend,
            storage,
            submission,
        }
    }
}

/// Per-run document locations given on the command line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubmissionDocuments {
    pub workflow: Option<String>,
    pub inputs: Option<String>,
    pub options: Option<String>,
    pub labels: Option<String>,
    pub imports: Option<String>,
    pub str_label: Option<String>,
}
