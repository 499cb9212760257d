use serde_json::json;
use wharf_types::{AwsParams, BackendKind, ConfigFragment, GcpParams};

use super::{StanzaGenerator, StanzaKind, fragment, provider_fragment};
use crate::merge::merge;

const GCP_ACTOR_FACTORY: &str = "cromwell.backend.google.pipelines.v2alpha1.PipelinesApiLifecycleActorFactory";
const AWS_ACTOR_FACTORY: &str = "cromwell.backend.impl.aws.AwsBatchBackendLifecycleActorFactory";

/// Split a zone list on commas and whitespace and rejoin with single spaces.
pub fn normalize_zones(zones: &str) -> String {
    zones
        .split(|ch: char| ch == ',' || ch.is_whitespace())
        .filter(|zone| !zone.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Google Cloud Pipelines API provider.
#[derive(Debug, Clone, Copy)]
pub struct GcpStanza<'a> {
    params: &'a GcpParams,
}

impl<'a> GcpStanza<'a> {
    pub fn new(params: &'a GcpParams) -> Self {
        Self { params }
    }
}

impl StanzaGenerator for GcpStanza<'_> {
    fn kind(&self) -> StanzaKind {
        StanzaKind::Backend(BackendKind::Gcp)
    }

    fn is_enabled(&self) -> bool {
        self.params.is_configured()
    }

    fn generate(&self) -> ConfigFragment {
        let project = self.params.project.as_deref().unwrap_or_default();
        let root = self.params.out_gcs_bucket.as_deref().unwrap_or_default();

        let mut config = json!({
            "project": project,
            "root": root,
            "concurrent-job-limit": self.params.concurrent_job_limit,
            "genomics-api-queries-per-100-seconds": 10000,
            "maximum-polling-interval": 600,
            "genomics": {
                "auth": "application-default",
                "compute-service-account": "default",
                "endpoint-url": "https://genomics.googleapis.com/",
                "restrict-metadata-access": false
            },
            "filesystems": {
                "gcs": {
                    "auth": "application-default",
                    "caching": {
                        "duplication-strategy": "copy"
                    }
                }
            }
        });
        if let Some(zones) = self.params.zones.as_deref().map(normalize_zones).filter(|zones| !zones.is_empty()) {
            config["default-runtime-attributes"] = json!({ "zones": zones });
        }

        let provider = provider_fragment(
            BackendKind::Gcp,
            json!({
                "actor-factory": GCP_ACTOR_FACTORY,
                "config": config
            }),
        );
        let engine = fragment(json!({
            "google": {
                "application-name": "cromwell",
                "auths": [
                    { "name": "application-default", "scheme": "application_default" }
                ]
            },
            "engine": {
                "filesystems": {
                    "gcs": {
                        "auth": "application-default",
                        "project": project
                    }
                }
            }
        }));
        merge(provider, &engine)
    }
}

/// AWS Batch provider.
#[derive(Debug, Clone, Copy)]
pub struct AwsStanza<'a> {
    params: &'a AwsParams,
}

impl<'a> AwsStanza<'a> {
    pub fn new(params: &'a AwsParams) -> Self {
        Self { params }
    }
}

impl StanzaGenerator for AwsStanza<'_> {
    fn kind(&self) -> StanzaKind {
        StanzaKind::Backend(BackendKind::Aws)
    }

    fn is_enabled(&self) -> bool {
        self.params.is_configured()
    }

    fn generate(&self) -> ConfigFragment {
        let root = self.params.out_s3_bucket.as_deref().unwrap_or_default();
        let bucket_name = root
            .trim_start_matches("s3://")
            .split('/')
            .next()
            .unwrap_or_default();

        let provider = provider_fragment(
            BackendKind::Aws,
            json!({
                "actor-factory": AWS_ACTOR_FACTORY,
                "config": {
                    "numSubmitAttempts": 6,
                    "numCreateDefinitionAttempts": 6,
                    "root": root,
                    "concurrent-job-limit": self.params.concurrent_job_limit,
                    "auth": "default",
                    "default-runtime-attributes": {
                        "queueArn": self.params.batch_arn.as_deref().unwrap_or_default(),
                        "scriptBucketName": bucket_name
                    },
                    "filesystems": {
                        "s3": {
                            "auth": "default",
                            "duplication-strategy": "reference"
                        }
                    }
                }
            }),
        );
        let engine = fragment(json!({
            "aws": {
                "application-name": "cromwell",
                "auths": [
                    { "name": "default", "scheme": "default" }
                ],
                "region": self.params.region.as_deref().unwrap_or_default()
            },
            "engine": {
                "filesystems": {
                    "s3": {
                        "auth": "default"
                    }
                }
            }
        }));
        merge(provider, &engine)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::merge::get_path;

    #[test]
    fn zones_accept_commas_and_spaces() {
        assert_eq!(normalize_zones("us-west1-a,us-west1-b  us-west1-c"), "us-west1-a us-west1-b us-west1-c");
        assert_eq!(normalize_zones(" , "), "");
    }

    #[test]
    fn gcp_stanza_includes_auth_sections() {
        let params = GcpParams {
            project: Some("my-project".into()),
            out_gcs_bucket: Some("gs://out/bucket".into()),
            zones: Some("us-west1-a,us-west1-b".into()),
            ..GcpParams::default()
        };
        let stanza = GcpStanza::new(&params).generate();
        assert_eq!(get_path(&stanza, "backend.providers.gcp.config.project"), Some(&json!("my-project")));
        assert_eq!(
            get_path(&stanza, "backend.providers.gcp.config.default-runtime-attributes.zones"),
            Some(&json!("us-west1-a us-west1-b"))
        );
        assert_eq!(get_path(&stanza, "engine.filesystems.gcs.project"), Some(&json!("my-project")));
        assert!(get_path(&stanza, "google.auths").is_some());
    }

    #[test]
    fn aws_stanza_derives_script_bucket() {
        let params = AwsParams {
            batch_arn: Some("arn:aws:batch:us-east-1:123:job-queue/q".into()),
            region: Some("us-east-1".into()),
            out_s3_bucket: Some("s3://out-bucket/runs".into()),
            ..AwsParams::default()
        };
        let stanza = AwsStanza::new(&params).generate();
        assert_eq!(
            get_path(&stanza, "backend.providers.aws.config.default-runtime-attributes.scriptBucketName"),
            Some(&json!("out-bucket"))
        );
        assert_eq!(get_path(&stanza, "aws.region"), Some(&json!("us-east-1")));
    }
}
