use serde_json::json;
use wharf_types::{BackendKind, ConfigFragment, LocalParams};

use super::{
    CONFIG_ACTOR_FACTORY, RUN_SCRIPT, SHELL_RUNTIME_ATTRIBUTES, StanzaGenerator, StanzaKind, provider_fragment,
};

const SUBMIT_DOCKER: &str = "\
docker run --rm -i ${\"--user \" + docker_user} --entrypoint ${job_shell} \
-v ${cwd}:${docker_cwd} ${docker} ${docker_script}";

/// Process-pool provider running tasks on this machine.
#[derive(Debug, Clone, Copy)]
pub struct LocalStanza<'a> {
    params: &'a LocalParams,
}

impl<'a> LocalStanza<'a> {
    pub fn new(params: &'a LocalParams) -> Self {
        Self { params }
    }
}

impl StanzaGenerator for LocalStanza<'_> {
    fn kind(&self) -> StanzaKind {
        StanzaKind::Backend(BackendKind::Local)
    }

    fn generate(&self) -> ConfigFragment {
        let duplication = json!(["soft-link", "hard-link", "copy"]);
        provider_fragment(
            BackendKind::Local,
            json!({
                "actor-factory": CONFIG_ACTOR_FACTORY,
                "config": {
                    "root": self.params.out_dir.to_string_lossy(),
                    "concurrent-job-limit": self.params.concurrent_job_limit,
                    "run-in-background": true,
                    "script-epilogue": "sleep 10 && sync",
                    "runtime-attributes": SHELL_RUNTIME_ATTRIBUTES,
                    "submit": RUN_SCRIPT,
                    "submit-docker": SUBMIT_DOCKER,
                    "filesystems": {
                        "local": {
                            "localization": duplication.clone(),
                            "caching": {
                                "duplication-strategy": duplication
                            }
                        }
                    }
                }
            }),
        )
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use serde_json::json;

    use super::*;
    use crate::merge::get_path;

    #[test]
    fn carries_root_and_limit() {
        let params = LocalParams {
            out_dir: PathBuf::from("/data/out"),
            concurrent_job_limit: 10,
        };
        let stanza = LocalStanza::new(&params).generate();
        assert_eq!(
            get_path(&stanza, "backend.providers.Local.config.concurrent-job-limit"),
            Some(&json!(10))
        );
        assert_eq!(get_path(&stanza, "backend.providers.Local.config.root"), Some(&json!("/data/out")));
        let submit = get_path(&stanza, "backend.providers.Local.config.submit").unwrap();
        assert!(submit.as_str().unwrap().contains("singularity exec"));
    }
}
