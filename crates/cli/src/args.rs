use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use wharf_types::BackendKind;

use crate::settings::{SubmissionDocuments, WharfSettings};

#[derive(Parser, Debug)]
#[command(name = "wharf", version)]
#[command(about = "Prepare workflow-engine submissions: localize inputs and synthesize backend configuration", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Settings file (defaults to ~/.config/wharf/config.json).
    #[arg(long, global = true, env = "WHARF_CONFIG_PATH")]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Prepare a single workflow run.
    Run(RunArgs),
    /// Prepare an engine server.
    Server(ServerArgs),
}

/// Flags shared by every subcommand. Unset flags defer to the settings file.
#[derive(Args, Debug, Default)]
pub struct CommonArgs {
    /// Default backend (local, gcp, aws, slurm, sge, pbs).
    #[arg(short, long, global = true)]
    pub backend: Option<BackendKind>,
    /// Backend configuration (HOCON) merged over the generated one.
    #[arg(long, global = true)]
    pub backend_file: Option<String>,

    #[arg(long, global = true)]
    pub out_dir: Option<String>,
    #[arg(long, global = true)]
    pub tmp_dir: Option<String>,
    #[arg(long, global = true)]
    pub tmp_gcs_bucket: Option<String>,
    #[arg(long, global = true)]
    pub tmp_s3_bucket: Option<String>,

    #[arg(long, global = true)]
    pub port: Option<u16>,
    #[arg(long, global = true)]
    pub max_concurrent_workflows: Option<u32>,
    #[arg(long, global = true)]
    pub max_concurrent_tasks: Option<u32>,
    #[arg(long, global = true)]
    pub disable_call_caching: bool,

    #[arg(long, global = true)]
    pub gcp_prj: Option<String>,
    /// Comma or space separated zones.
    #[arg(long, global = true)]
    pub gcp_zones: Option<String>,
    #[arg(long, global = true)]
    pub out_gcs_bucket: Option<String>,

    #[arg(long, global = true)]
    pub aws_batch_arn: Option<String>,
    #[arg(long, global = true)]
    pub aws_region: Option<String>,
    #[arg(long, global = true)]
    pub out_s3_bucket: Option<String>,

    #[arg(long, global = true)]
    pub slurm_partition: Option<String>,
    #[arg(long, global = true)]
    pub slurm_account: Option<String>,
    /// Appended verbatim to sbatch.
    #[arg(long, global = true, allow_hyphen_values = true)]
    pub slurm_extra_param: Option<String>,
    #[arg(long, global = true)]
    pub sge_pe: Option<String>,
    #[arg(long, global = true)]
    pub sge_queue: Option<String>,
    #[arg(long, global = true, allow_hyphen_values = true)]
    pub sge_extra_param: Option<String>,
    #[arg(long, global = true)]
    pub pbs_queue: Option<String>,
    #[arg(long, global = true, allow_hyphen_values = true)]
    pub pbs_extra_param: Option<String>,

    #[arg(long, global = true)]
    pub mysql_db_ip: Option<String>,
    #[arg(long, global = true)]
    pub mysql_db_port: Option<u16>,
    #[arg(long, global = true)]
    pub mysql_db_user: Option<String>,
    #[arg(long, global = true, env = "WHARF_MYSQL_DB_PASSWORD", hide_env_values = true)]
    pub mysql_db_password: Option<String>,
    /// File-backed metadata database used when MySQL is not configured.
    #[arg(long, global = true)]
    pub file_db: Option<String>,
    /// Database connection timeout in milliseconds.
    #[arg(long, global = true)]
    pub db_timeout: Option<u64>,

    #[arg(long, global = true)]
    pub http_user: Option<String>,
    #[arg(long, global = true, env = "WHARF_HTTP_PASSWORD", hide_env_values = true)]
    pub http_password: Option<String>,
    /// Read HTTP credentials from ~/.netrc.
    #[arg(long, global = true)]
    pub use_netrc: bool,
    /// Use gsutil for s3:// transfers as well.
    #[arg(long, global = true)]
    pub use_gsutil_over_aws_s3: bool,

    /// Engine JAR path or URL.
    #[arg(long, global = true)]
    pub cromwell: Option<String>,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Workflow source (path or URI).
    pub workflow: String,
    #[arg(short, long)]
    pub inputs: Option<String>,
    /// Workflow options JSON merged over the generated options.
    #[arg(short, long)]
    pub options: Option<String>,
    #[arg(short, long)]
    pub labels: Option<String>,
    /// Zipped bundle of imported workflow files.
    #[arg(short = 'p', long)]
    pub imports: Option<String>,
    /// Free-form label attached to the workflow.
    #[arg(short, long)]
    pub str_label: Option<String>,

    #[arg(long)]
    pub docker: Option<String>,
    #[arg(long)]
    pub singularity: Option<String>,
    #[arg(long)]
    pub singularity_cachedir: Option<String>,
    #[arg(long, conflicts_with = "use_singularity")]
    pub use_docker: bool,
    #[arg(long)]
    pub use_singularity: bool,

    #[arg(long)]
    pub no_deepcopy: bool,
    /// Comma separated extensions deep copy recurses into.
    #[arg(long)]
    pub deepcopy_ext: Option<String>,
    #[arg(long)]
    pub max_retries: Option<u32>,
    #[arg(long)]
    pub java_heap_run: Option<String>,
}

#[derive(Args, Debug)]
pub struct ServerArgs {
    #[arg(long)]
    pub java_heap_server: Option<String>,
}

fn flag(set: bool) -> Option<bool> {
    set.then_some(true)
}

impl Cli {
    /// Settings given on the command line; `None` fields defer to the file.
    pub fn settings_overrides(&self) -> WharfSettings {
        let common = &self.common;
        let mut settings = WharfSettings {
            backend: common.backend,
            backend_file: common.backend_file.clone(),
            out_dir: common.out_dir.clone(),
            tmp_dir: common.tmp_dir.clone(),
            tmp_gcs_bucket: common.tmp_gcs_bucket.clone(),
            tmp_s3_bucket: common.tmp_s3_bucket.clone(),
            port: common.port,
            max_concurrent_workflows: common.max_concurrent_workflows,
            max_concurrent_tasks: common.max_concurrent_tasks,
            disable_call_caching: flag(common.disable_call_caching),
            gcp_prj: common.gcp_prj.clone(),
            gcp_zones: common.gcp_zones.clone(),
            out_gcs_bucket: common.out_gcs_bucket.clone(),
            aws_batch_arn: common.aws_batch_arn.clone(),
            aws_region: common.aws_region.clone(),
            out_s3_bucket: common.out_s3_bucket.clone(),
            slurm_partition: common.slurm_partition.clone(),
            slurm_account: common.slurm_account.clone(),
            slurm_extra_param: common.slurm_extra_param.clone(),
            sge_pe: common.sge_pe.clone(),
            sge_queue: common.sge_queue.clone(),
            sge_extra_param: common.sge_extra_param.clone(),
            pbs_queue: common.pbs_queue.clone(),
            pbs_extra_param: common.pbs_extra_param.clone(),
            mysql_db_ip: common.mysql_db_ip.clone(),
            mysql_db_port: common.mysql_db_port,
            mysql_db_user: common.mysql_db_user.clone(),
            mysql_db_password: common.mysql_db_password.clone(),
            file_db: common.file_db.clone(),
            db_timeout: common.db_timeout,
            http_user: common.http_user.clone(),
            http_password: common.http_password.clone(),
            use_netrc: flag(common.use_netrc),
            use_gsutil_over_aws_s3: flag(common.use_gsutil_over_aws_s3),
            cromwell: common.cromwell.clone(),
            ..WharfSettings::default()
        };
        match &self.command {
            Commands::Run(run) => {
                settings.docker = run.docker.clone();
                settings.singularity = run.singularity.clone();
                settings.singularity_cachedir = run.singularity_cachedir.clone();
                settings.use_docker = flag(run.use_docker);
                settings.use_singularity = flag(run.use_singularity);
                settings.no_deepcopy = flag(run.no_deepcopy);
                settings.deepcopy_ext = run.deepcopy_ext.clone();
                settings.max_retries = run.max_retries;
                settings.java_heap_run = run.java_heap_run.clone();
            }
            Commands::Server(server) => {
                settings.java_heap_server = server.java_heap_server.clone();
            }
        }
        settings
    }

    pub fn submission_documents(&self) -> SubmissionDocuments {
        match &self.command {
            Commands::Run(run) => SubmissionDocuments {
                workflow: Some(run.workflow.clone()),
                inputs: run.inputs.clone(),
                options: run.options.clone(),
                labels: run.labels.clone(),
                imports: run.imports.clone(),
                str_label: run.str_label.clone(),
            },
            Commands::Server(_) => SubmissionDocuments::default(),
        }
    }
}
