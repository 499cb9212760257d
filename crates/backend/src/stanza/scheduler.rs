use std::path::Path;

use serde_json::json;
use wharf_types::{BackendKind, ConfigFragment, PbsParams, SgeParams, SlurmParams};

use super::{CONFIG_ACTOR_FACTORY, RUN_SCRIPT, SHELL_RUNTIME_ATTRIBUTES, StanzaGenerator, StanzaKind, provider_fragment};

/// Seconds the engine waits for a missing return-code file before asking `check-alive`.
const EXIT_CODE_TIMEOUT_SECONDS: u32 = 180;

/// Scheduler command lines for one provider.
struct SchedulerCommands {
    submit: String,
    kill: &'static str,
    check_alive: &'static str,
    job_id_regex: &'static str,
}

/// Declare an optional string attribute, defaulting it when a value is configured.
fn attribute_declaration(name: &str, default: Option<&str>) -> String {
    match default {
        Some(value) => format!("String {name} = \"{}\"\n", value.replace('"', "\\\"")),
        None => format!("String? {name}\n"),
    }
}

/// The run script with double quotes swapped out so it can sit inside a quoted shell argument.
fn quoted_run_script() -> String {
    RUN_SCRIPT.replace('"', "'")
}

fn extra(extra_param: Option<&str>) -> &str {
    extra_param.map(str::trim).unwrap_or_default()
}

fn scheduler_provider(
    kind: BackendKind,
    out_dir: &Path,
    concurrent_job_limit: u32,
    attributes: &[(&str, Option<&str>)],
    commands: SchedulerCommands,
) -> ConfigFragment {
    let mut runtime_attributes = SHELL_RUNTIME_ATTRIBUTES.to_string();
    for (name, default) in attributes {
        runtime_attributes.push_str(&attribute_declaration(name, *default));
    }

    provider_fragment(
        kind,
        json!({
            "actor-factory": CONFIG_ACTOR_FACTORY,
            "config": {
                "root": out_dir.to_string_lossy(),
                "concurrent-job-limit": concurrent_job_limit,
                "script-epilogue": "sleep 10 && sync",
                "exit-code-timeout-seconds": EXIT_CODE_TIMEOUT_SECONDS,
                "runtime-attributes": runtime_attributes,
                "submit": commands.submit,
                "kill": commands.kill,
                "check-alive": commands.check_alive,
                "job-id-regex": commands.job_id_regex,
                "filesystems": {
                    "local": {
                        "localization": ["soft-link", "hard-link", "copy"],
                        "caching": {
                            "duplication-strategy": ["soft-link", "hard-link", "copy"]
                        }
                    }
                }
            }
        }),
    )
}

/// SLURM provider submitting through `sbatch`.
#[derive(Debug, Clone, Copy)]
pub struct SlurmStanza<'a> {
    params: &'a SlurmParams,
}

impl<'a> SlurmStanza<'a> {
    pub fn new(params: &'a SlurmParams) -> Self {
        Self { params }
    }
}

impl StanzaGenerator for SlurmStanza<'_> {
    fn kind(&self) -> StanzaKind {
        StanzaKind::Backend(BackendKind::Slurm)
    }

    fn generate(&self) -> ConfigFragment {
        let submit = format!(
            "sbatch --export=ALL -J ${{job_name}} -D ${{cwd}} -o ${{out}} -e ${{err}} \
             ${{\"-t \" + time*60}} -n 1 --ntasks-per-node=1 ${{true=\"--cpus-per-task=\" false=\"\" defined(cpu)}}${{cpu}} \
             ${{true=\"--mem=\" false=\"\" defined(memory_mb)}}${{memory_mb}} \
             ${{\"-p \" + slurm_partition}} ${{\"--account \" + slurm_account}} \
             ${{true=\"--gres gpu:\" false=\"\" defined(gpu)}}${{gpu}} {extra} \
             --wrap \"{script}\"",
            extra = extra(self.params.extra_param.as_deref()),
            script = quoted_run_script(),
        );
        scheduler_provider(
            BackendKind::Slurm,
            &self.params.out_dir,
            self.params.concurrent_job_limit,
            &[
                ("slurm_partition", self.params.partition.as_deref()),
                ("slurm_account", self.params.account.as_deref()),
            ],
            SchedulerCommands {
                submit,
                kill: "scancel ${job_id}",
                // squeue exits zero for unknown jobs.
                check_alive: "CHK_ALIVE=$(squeue --noheader -j ${job_id} --format=%i | grep ${job_id}); \
                              if [ -z \"$CHK_ALIVE\" ]; then /bin/bash -c 'exit 1'; else echo $CHK_ALIVE; fi",
                job_id_regex: "Submitted batch job (\\d+).*",
            },
        )
    }
}

/// Grid Engine provider submitting through `qsub`.
#[derive(Debug, Clone, Copy)]
pub struct SgeStanza<'a> {
    params: &'a SgeParams,
}

impl<'a> SgeStanza<'a> {
    pub fn new(params: &'a SgeParams) -> Self {
        Self { params }
    }
}

impl StanzaGenerator for SgeStanza<'_> {
    fn kind(&self) -> StanzaKind {
        StanzaKind::Backend(BackendKind::Sge)
    }

    fn generate(&self) -> ConfigFragment {
        let submit = format!(
            "echo \"{script}\" | qsub -V -terse -S /bin/sh -N ${{job_name}} -wd ${{cwd}} -o ${{out}} -e ${{err}} \
             ${{if cpu>1 then \"-pe \" + sge_pe + \" \" else \"\"}}${{if cpu>1 then cpu else \"\"}} \
             ${{true=\"-l h_vmem=$(expr \" false=\"\" defined(memory_mb)}}${{memory_mb}}${{true=\" / \" false=\"\" defined(memory_mb)}}${{if defined(memory_mb) then cpu else \"\"}}${{true=\")m\" false=\"\" defined(memory_mb)}} \
             ${{true=\"-l h_rt=\" false=\"\" defined(time)}}${{time}}${{true=\":00:00\" false=\"\" defined(time)}} \
             ${{true=\"-l gpu=\" false=\"\" defined(gpu)}}${{gpu}} \
             ${{\"-q \" + sge_queue}} {extra}",
            script = quoted_run_script(),
            extra = extra(self.params.extra_param.as_deref()),
        );
        scheduler_provider(
            BackendKind::Sge,
            &self.params.out_dir,
            self.params.concurrent_job_limit,
            &[
                ("sge_pe", self.params.pe.as_deref()),
                ("sge_queue", self.params.queue.as_deref()),
            ],
            SchedulerCommands {
                submit,
                kill: "qdel ${job_id}",
                check_alive: "qstat -j ${job_id}",
                job_id_regex: "(\\d+)",
            },
        )
    }
}

/// PBS/Torque provider submitting through `qsub`.
#[derive(Debug, Clone, Copy)]
pub struct PbsStanza<'a> {
    params: &'a PbsParams,
}

impl<'a> PbsStanza<'a> {
    pub fn new(params: &'a PbsParams) -> Self {
        Self { params }
    }
}

impl StanzaGenerator for PbsStanza<'_> {
    fn kind(&self) -> StanzaKind {
        StanzaKind::Backend(BackendKind::Pbs)
    }

    fn generate(&self) -> ConfigFragment {
        let submit = format!(
            "echo \"{script}\" | qsub -V -N ${{job_name}} -o ${{out}} -e ${{err}} \
             ${{true=\"-lnodes=1:ppn=\" false=\"\" defined(cpu)}}${{cpu}}${{true=\":mem=\" false=\"\" defined(memory_mb)}}${{memory_mb}}${{true=\"mb\" false=\"\" defined(memory_mb)}} \
             ${{true=\"-lwalltime=\" false=\"\" defined(time)}}${{time}}${{true=\":0:0\" false=\"\" defined(time)}} \
             ${{true=\"-lngpus=\" false=\"\" gpu>1}}${{if gpu>1 then gpu else \"\"}} \
             ${{\"-q \" + pbs_queue}} {extra}",
            script = quoted_run_script(),
            extra = extra(self.params.extra_param.as_deref()),
        );
        scheduler_provider(
            BackendKind::Pbs,
            &self.params.out_dir,
            self.params.concurrent_job_limit,
            &[("pbs_queue", self.params.queue.as_deref())],
            SchedulerCommands {
                submit,
                kill: "qdel ${job_id}",
                check_alive: "qstat ${job_id}",
                job_id_regex: "(\\d+)",
            },
        )
    }
}
