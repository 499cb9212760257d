//! Backend parameter sets.
//!
//! Each struct holds only the options relevant to one backend kind. The CLI
//! layer builds a [`WharfParameters`] once from resolved flags and settings;
//! nothing downstream mutates it.

use std::fmt;
use std::path::PathBuf;

use crate::BackendKind;

pub const DEFAULT_MAX_CONCURRENT_TASKS: u32 = 1000;
pub const DEFAULT_MAX_CONCURRENT_WORKFLOWS: u32 = 40;
pub const DEFAULT_MAX_RETRIES: u32 = 1;
pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_MYSQL_HOST: &str = "localhost";
pub const DEFAULT_MYSQL_PORT: u16 = 3306;
pub const DEFAULT_DB_TIMEOUT_MS: u64 = 30000;
pub const DEFAULT_DEEPCOPY_EXTENSIONS: &[&str] = &["json", "tsv"];
pub const DEFAULT_ENGINE_JAR: &str = "https://github.com/broadinstitute/cromwell/releases/download/42/cromwell-42.jar";
pub const DEFAULT_JAVA_HEAP_SERVER: &str = "7G";
pub const DEFAULT_JAVA_HEAP_RUN: &str = "1G";
/// Directory name appended to output locations when no temporary location is given.
pub const DEFAULT_TMP_DIR_NAME: &str = "wharf_tmp_dir";

/// Engine-wide settings that do not belong to a single backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommonParams {
    pub port: u16,
    pub max_concurrent_workflows: u32,
    pub disable_call_caching: bool,
}

impl Default for CommonParams {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            max_concurrent_workflows: DEFAULT_MAX_CONCURRENT_WORKFLOWS,
            disable_call_caching: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalParams {
    pub out_dir: PathBuf,
    pub concurrent_job_limit: u32,
}

impl Default for LocalParams {
    fn default() -> Self {
        Self {
            out_dir: PathBuf::from("."),
            concurrent_job_limit: DEFAULT_MAX_CONCURRENT_TASKS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GcpParams {
    pub project: Option<String>,
    pub out_gcs_bucket: Option<String>,
    /// Comma or whitespace separated zone list.
    pub zones: Option<String>,
    pub concurrent_job_limit: u32,
}

impl Default for GcpParams {
    fn default() -> Self {
        Self {
            project: None,
            out_gcs_bucket: None,
            zones: None,
            concurrent_job_limit: DEFAULT_MAX_CONCURRENT_TASKS,
        }
    }
}

impl GcpParams {
    /// The stanza needs both a project and an output bucket.
    pub fn is_configured(&self) -> bool {
        self.project.is_some() && self.out_gcs_bucket.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AwsParams {
    pub batch_arn: Option<String>,
    pub region: Option<String>,
    pub out_s3_bucket: Option<String>,
    pub concurrent_job_limit: u32,
}

impl Default for AwsParams {
    fn default() -> Self {
        Self {
            batch_arn: None,
            region: None,
            out_s3_bucket: None,
            concurrent_job_limit: DEFAULT_MAX_CONCURRENT_TASKS,
        }
    }
}

impl AwsParams {
    /// The stanza needs a batch queue ARN, a region and an output bucket.
    pub fn is_configured(&self) -> bool {
        self.batch_arn.is_some() && self.region.is_some() && self.out_s3_bucket.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlurmParams {
    pub out_dir: PathBuf,
    pub partition: Option<String>,
    pub account: Option<String>,
    /// Appended verbatim to `sbatch`; callers are responsible for quoting.
    pub extra_param: Option<String>,
    pub concurrent_job_limit: u32,
}

impl Default for SlurmParams {
    fn default() -> Self {
        Self {
            out_dir: PathBuf::from("."),
            partition: None,
            account: None,
            extra_param: None,
            concurrent_job_limit: DEFAULT_MAX_CONCURRENT_TASKS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SgeParams {
    pub out_dir: PathBuf,
    /// Parallel environment (`qconf -spl`).
    pub pe: Option<String>,
    pub queue: Option<String>,
    /// Appended verbatim to `qsub`; callers are responsible for quoting.
    pub extra_param: Option<String>,
    pub concurrent_job_limit: u32,
}

impl Default for SgeParams {
    fn default() -> Self {
        Self {
            out_dir: PathBuf::from("."),
            pe: None,
            queue: None,
            extra_param: None,
            concurrent_job_limit: DEFAULT_MAX_CONCURRENT_TASKS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PbsParams {
    pub out_dir: PathBuf,
    pub queue: Option<String>,
    /// Appended verbatim to `qsub`; callers are responsible for quoting.
    pub extra_param: Option<String>,
    pub concurrent_job_limit: u32,
}

impl Default for PbsParams {
    fn default() -> Self {
        Self {
            out_dir: PathBuf::from("."),
            queue: None,
            extra_param: None,
            concurrent_job_limit: DEFAULT_MAX_CONCURRENT_TASKS,
        }
    }
}

/// Metadata store connection settings.
#[derive(Clone, PartialEq, Eq)]
pub struct DatabaseParams {
    pub mysql_host: Option<String>,
    pub mysql_port: Option<u16>,
    pub mysql_user: Option<String>,
    pub mysql_password: Option<String>,
    /// HyperSQL file database used when no MySQL credentials are present.
    pub file_db: Option<PathBuf>,
    pub timeout_ms: u64,
}

impl Default for DatabaseParams {
    fn default() -> Self {
        Self {
            mysql_host: None,
            mysql_port: None,
            mysql_user: None,
            mysql_password: None,
            file_db: None,
            timeout_ms: DEFAULT_DB_TIMEOUT_MS,
        }
    }
}

impl DatabaseParams {
    /// All four MySQL connection fields are present.
    pub fn has_mysql_credentials(&self) -> bool {
        self.mysql_host.is_some() && self.mysql_port.is_some() && self.mysql_user.is_some() && self.mysql_password.is_some()
    }
}

impl fmt::Debug for DatabaseParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseParams")
            .field("mysql_host", &self.mysql_host)
            .field("mysql_port", &self.mysql_port)
            .field("mysql_user", &self.mysql_user)
            .field("mysql_password", &self.mysql_password.as_ref().map(|_| "<redacted>"))
            .field("file_db", &self.file_db)
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}

/// Everything the configuration synthesizer needs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackendParameters {
    /// Explicitly selected backend. `None` defers to the override document, then `Local`.
    pub default_backend: Option<BackendKind>,
    pub common: CommonParams,
    pub local: LocalParams,
    pub gcp: GcpParams,
    pub aws: AwsParams,
    pub slurm: SlurmParams,
    pub sge: SgeParams,
    pub pbs: PbsParams,
    pub database: DatabaseParams,
    /// Path or URI of a user backend configuration (HOCON) merged last.
    pub override_config: Option<String>,
}

/// Settings for the URI resolver and its transports.
#[derive(Clone, PartialEq, Eq)]
pub struct StorageParams {
    pub cache_dir: PathBuf,
    pub tmp_gcs_bucket: Option<String>,
    pub tmp_s3_bucket: Option<String>,
    pub http_user: Option<String>,
    pub http_password: Option<String>,
    pub use_netrc: bool,
    pub use_gsutil_over_aws_s3: bool,
}

impl Default for StorageParams {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from(DEFAULT_TMP_DIR_NAME).join("cache"),
            tmp_gcs_bucket: None,
            tmp_s3_bucket: None,
            http_user: None,
            http_password: None,
            use_netrc: false,
            use_gsutil_over_aws_s3: false,
        }
    }
}

impl fmt::Debug for StorageParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageParams")
            .field("cache_dir", &self.cache_dir)
            .field("tmp_gcs_bucket", &self.tmp_gcs_bucket)
            .field("tmp_s3_bucket", &self.tmp_s3_bucket)
            .field("http_user", &self.http_user)
            .field("http_password", &self.http_password.as_ref().map(|_| "<redacted>"))
            .field("use_netrc", &self.use_netrc)
            .field("use_gsutil_over_aws_s3", &self.use_gsutil_over_aws_s3)
            .finish()
    }
}

/// Per-submission inputs: the workflow, its documents and container choices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionParams {
    pub workflow: Option<String>,
    pub inputs: Option<String>,
    pub options: Option<String>,
    pub labels: Option<String>,
    pub imports: Option<String>,
    pub str_label: Option<String>,
    pub docker: Option<String>,
    pub singularity: Option<String>,
    pub singularity_cachedir: Option<PathBuf>,
    pub use_docker: bool,
    pub use_singularity: bool,
    pub no_deepcopy: bool,
    /// Extensions (without the leading dot) whose files are recursed into.
    pub deepcopy_extensions: Vec<String>,
    pub max_retries: u32,
    pub engine_jar: String,
    pub java_heap_run: String,
    pub java_heap_server: String,
    /// Root of the per-submission scratch directories.
    pub tmp_dir: PathBuf,
}

impl Default for SubmissionParams {
    fn default() -> Self {
        Self {
            workflow: None,
            inputs: None,
            options: None,
            labels: None,
            imports: None,
            str_label: None,
            docker: None,
            singularity: None,
            singularity_cachedir: None,
            use_docker: false,
            use_singularity: false,
            no_deepcopy: false,
            deepcopy_extensions: DEFAULT_DEEPCOPY_EXTENSIONS.iter().map(|ext| ext.to_string()).collect(),
            max_retries: DEFAULT_MAX_RETRIES,
            engine_jar: DEFAULT_ENGINE_JAR.to_string(),
            java_heap_run: DEFAULT_JAVA_HEAP_RUN.to_string(),
            java_heap_server: DEFAULT_JAVA_HEAP_SERVER.to_string(),
            tmp_dir: PathBuf::from(DEFAULT_TMP_DIR_NAME),
        }
    }
}

/// The fully resolved parameter set handed to the core by the CLI layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WharfParameters {
    pub backend: BackendParameters,
    pub storage: StorageParams,
    pub submission: SubmissionParams,
}

impl WharfParameters {
    /// Backend the submission targets (explicit selection or `Local`).
    pub fn selected_backend(&self) -> BackendKind {
        self.backend.default_backend.unwrap_or(BackendKind::Local)
    }
}
