//! # Wharf backend configuration
//!
//! Builds everything the workflow engine reads at submission time.
//!
//! ## Key Features
//!
//! - **Stanzas**: one [`StanzaGenerator`] per backend kind, plus engine-wide and database stanzas
//! - **Merging**: deep-merge of configuration fragments with override reporting
//! - **HOCON**: serializer for the generated file and parser for user overrides
//! - **Synthesis**: [`build_backend_config`] / [`write_backend_config`]
//! - **Submission**: [`prepare_submission`] writes inputs, options and labels and returns the engine argv
//!
//! ## Usage
//!
//! ```rust
//! use wharf_backend::build_backend_config;
//! use wharf_types::{BackendKind, BackendParameters};
//!
//! let mut params = BackendParameters::default();
//! params.default_backend = Some(BackendKind::Slurm);
//! params.slurm.partition = Some("normal".into());
//!
//! let config = build_backend_config(&params, None)?;
//! assert_eq!(config.default_backend, "slurm");
//! println!("{}", config.render());
//! # Ok::<(), wharf_backend::ConfigError>(())
//! ```

pub mod hocon;
pub mod merge;
pub mod options;
pub mod stanza;
pub mod submission;
pub mod synthesizer;
pub mod workflow;

pub use merge::{MergeConflict, merge, merge_tracked};
pub use options::{ContainerChoice, labels, singularity_bindpath, workflow_options};
pub use stanza::{StanzaGenerator, StanzaKind, generator_for};
pub use submission::{EngineMode, PreparedSubmission, SubmissionError, prepare_submission};
pub use synthesizer::{
    BackendConfig, ConfigError, build_backend_config, load_backend_config, split_override_headers, write_backend_config,
};
pub use workflow::{
    detect_docker_from_workflow, detect_singularity_from_workflow, docker_directive, find_workflow_imports,
    singularity_directive,
};
