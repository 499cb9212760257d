//! Per-backend configuration stanzas.
//!
//! Each generator is a pure function of its parameter set. Every fragment
//! has the same top-level shape (`backend.providers.<name>` plus engine-wide
//! sections), so the synthesizer merges them without knowing which kind
//! produced what.

mod cloud;
mod common;
mod database;
mod local;
mod scheduler;

use std::fmt;

pub use cloud::{AwsStanza, GcpStanza, normalize_zones};
pub use common::CommonStanza;
pub use database::DatabaseStanza;
pub use local::LocalStanza;
pub use scheduler::{PbsStanza, SgeStanza, SlurmStanza};
use serde_json::{Value, json};
use wharf_types::{BackendKind, BackendParameters, ConfigFragment};

/// Actor factory for shell-based providers (local and HPC schedulers).
pub(crate) const CONFIG_ACTOR_FACTORY: &str = "cromwell.backend.impl.sfs.config.ConfigBackendLifecycleActorFactory";

/// What a stanza configures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StanzaKind {
    Common,
    Backend(BackendKind),
    Database,
}

impl fmt::Display for StanzaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StanzaKind::Common => f.write_str("common"),
            StanzaKind::Backend(kind) => write!(f, "{kind}"),
            StanzaKind::Database => f.write_str("database"),
        }
    }
}

/// Produces one configuration fragment.
pub trait StanzaGenerator {
    fn kind(&self) -> StanzaKind;

    /// Whether the parameters carry what this stanza needs. Generators that
    /// report `false` are skipped by the synthesizer.
    fn is_enabled(&self) -> bool {
        true
    }

    fn generate(&self) -> ConfigFragment;
}

/// The generator for one backend kind.
pub fn generator_for(kind: BackendKind, params: &BackendParameters) -> Box<dyn StanzaGenerator + '_> {
    match kind {
        BackendKind::Local => Box::new(LocalStanza::new(&params.local)),
        BackendKind::Gcp => Box::new(GcpStanza::new(&params.gcp)),
        BackendKind::Aws => Box::new(AwsStanza::new(&params.aws)),
        BackendKind::Slurm => Box::new(SlurmStanza::new(&params.slurm)),
        BackendKind::Sge => Box::new(SgeStanza::new(&params.sge)),
        BackendKind::Pbs => Box::new(PbsStanza::new(&params.pbs)),
    }
}

/// Unwrap a `json!` object literal.
pub(crate) fn fragment(value: Value) -> ConfigFragment {
    match value {
        Value::Object(map) => map,
        _ => ConfigFragment::new(),
    }
}

/// `backend.providers.<kind> = provider`.
pub(crate) fn provider_fragment(kind: BackendKind, provider: Value) -> ConfigFragment {
    fragment(json!({
        "backend": {
            "providers": {
                kind.provider_name(): provider
            }
        }
    }))
}

/// Shell snippet running `${script}` directly, or inside a Singularity
/// image when the task sets one.
pub(crate) const RUN_SCRIPT: &str = concat!(
    "if [ -z \"${singularity}\" ]; then /bin/bash ${script}; ",
    "else mkdir -p ${singularity_cachedir} && SINGULARITY_CACHEDIR=${singularity_cachedir} ",
    "singularity exec --cleanenv --home ${cwd} --bind ${cwd}${\",\" + singularity_bindpath} ",
    "${singularity} /bin/bash ${script}; fi"
);

/// Runtime attributes understood by every shell-based provider.
pub(crate) const SHELL_RUNTIME_ATTRIBUTES: &str = "\
Int cpu = 1
Int? memory_mb
Int? time
Int? gpu
String? docker
String? docker_user
String? singularity
String? singularity_bindpath
String? singularity_cachedir
";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::get_path;

    #[test]
    fn every_backend_lands_under_providers() {
        let params = BackendParameters::default();
        for kind in BackendKind::ALL {
            let generator = generator_for(kind, &params);
            assert_eq!(generator.kind(), StanzaKind::Backend(kind));
            let stanza = generator.generate();
            let path = format!("backend.providers.{}.actor-factory", kind.provider_name());
            assert!(get_path(&stanza, &path).is_some(), "{kind}: missing {path}");
        }
    }

    #[test]
    fn cloud_generators_report_missing_requirements() {
        let params = BackendParameters::default();
        assert!(!generator_for(BackendKind::Gcp, &params).is_enabled());
        assert!(!generator_for(BackendKind::Aws, &params).is_enabled());
        assert!(generator_for(BackendKind::Slurm, &params).is_enabled());
    }
}
