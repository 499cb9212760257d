//! # Wharf shared types
//!
//! Types shared by the storage (`wharf-uri`), configuration
//! (`wharf-backend`) and command-line (`wharf`) crates:
//!
//! - [`BackendKind`]: the execution backends the engine can dispatch to
//! - [`ConfigFragment`]: a nested configuration mapping produced by stanza generators
//! - parameter sets in [`params`], built once per invocation by the CLI layer

use std::{error::Error, fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub mod params;

pub use params::{
    AwsParams, BackendParameters, CommonParams, DatabaseParams, GcpParams, LocalParams, PbsParams, SgeParams, SlurmParams,
    StorageParams, SubmissionParams, WharfParameters,
};

/// Nested configuration mapping. Key insertion order is preserved so that
/// serialized documents follow the order stanzas were generated in.
pub type ConfigFragment = Map<String, Value>;

/// Execution backend kinds understood by the engine configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackendKind {
    /// Local process pool (provider `Local`).
    #[serde(rename = "local", alias = "Local")]
    Local,
    /// Google Cloud Life Sciences / Pipelines API.
    #[serde(rename = "gcp", alias = "google")]
    Gcp,
    /// AWS Batch.
    #[serde(rename = "aws", alias = "amazon")]
    Aws,
    /// SLURM scheduler.
    #[serde(rename = "slurm", alias = "sherlock", alias = "scg")]
    Slurm,
    /// Sun/Son of Grid Engine scheduler.
    #[serde(rename = "sge")]
    Sge,
    /// PBS/Torque scheduler.
    #[serde(rename = "pbs")]
    Pbs,
}

impl BackendKind {
    pub const ALL: [BackendKind; 6] = [
        BackendKind::Local,
        BackendKind::Gcp,
        BackendKind::Aws,
        BackendKind::Slurm,
        BackendKind::Sge,
        BackendKind::Pbs,
    ];

    /// Provider name used under `backend.providers` and as `backend.default`.
    pub fn provider_name(&self) -> &'static str {
        match self {
            BackendKind::Local => "Local",
            BackendKind::Gcp => "gcp",
            BackendKind::Aws => "aws",
            BackendKind::Slurm => "slurm",
            BackendKind::Sge => "sge",
            BackendKind::Pbs => "pbs",
        }
    }

    /// Cloud backends read their inputs from object storage rather than a shared filesystem.
    pub fn is_cloud(&self) -> bool {
        matches!(self, BackendKind::Gcp | BackendKind::Aws)
    }

    /// HPC schedulers share the local filesystem but submit through a queueing system.
    pub fn is_scheduler(&self) -> bool {
        matches!(self, BackendKind::Slurm | BackendKind::Sge | BackendKind::Pbs)
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.provider_name())
    }
}

impl FromStr for BackendKind {
    type Err = ParseBackendKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "gcp" | "google" => Ok(Self::Gcp),
            "aws" | "amazon" => Ok(Self::Aws),
            "slurm" | "sherlock" | "scg" => Ok(Self::Slurm),
            "sge" => Ok(Self::Sge),
            "pbs" => Ok(Self::Pbs),
            _ => Err(ParseBackendKindError(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseBackendKindError(pub String);

impl fmt::Display for ParseBackendKindError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown backend '{}'; expected one of local, gcp, aws, slurm, sge, pbs (aliases: google, amazon, sherlock, scg)",
            self.0
        )
    }
}

impl Error for ParseBackendKindError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_backend_aliases() {
        assert_eq!("local".parse::<BackendKind>().unwrap(), BackendKind::Local);
        assert_eq!("Local".parse::<BackendKind>().unwrap(), BackendKind::Local);
        assert_eq!("google".parse::<BackendKind>().unwrap(), BackendKind::Gcp);
        assert_eq!("amazon".parse::<BackendKind>().unwrap(), BackendKind::Aws);
        assert_eq!("sherlock".parse::<BackendKind>().unwrap(), BackendKind::Slurm);
        assert_eq!("scg".parse::<BackendKind>().unwrap(), BackendKind::Slurm);
        assert!("lsf".parse::<BackendKind>().is_err());
    }

    #[test]
    fn provider_names_round_trip_through_from_str() {
        for kind in BackendKind::ALL {
            assert_eq!(kind.provider_name().parse::<BackendKind>().unwrap(), kind);
        }
    }

    #[test]
    fn deserializes_aliases_from_json() {
        let kinds: Vec<BackendKind> = serde_json::from_str(r#"["local", "google", "aws", "scg", "sge", "pbs"]"#).unwrap();
        assert_eq!(
            kinds,
            vec![
                BackendKind::Local,
                BackendKind::Gcp,
                BackendKind::Aws,
                BackendKind::Slurm,
                BackendKind::Sge,
                BackendKind::Pbs
            ]
        );
    }
}
