use std::fs;
use std::sync::Arc;

use serde_json::json;
use tempfile::tempdir;
use wharf_backend::merge::get_path;
use wharf_backend::synthesizer::BUILTIN_HEADER;
use wharf_backend::{ConfigError, build_backend_config, hocon, write_backend_config};
use wharf_types::{BackendKind, BackendParameters};
use wharf_uri::{MemoryTransport, UriResolver};

fn configured_params() -> BackendParameters {
    let mut params = BackendParameters::default();
    params.local.concurrent_job_limit = 10;
    params.gcp.project = Some("my-project".into());
    params.gcp.out_gcs_bucket = Some("gs://out".into());
    params.aws.batch_arn = Some("arn:aws:batch:us-east-1:1:job-queue/q".into());
    params.aws.region = Some("us-east-1".into());
    params.aws.out_s3_bucket = Some("s3://out".into());
    params.slurm.partition = Some("normal".into());
    params
}

#[test]
fn override_wins_over_generated_values() {
    let params = configured_params();
    let config = build_backend_config(
        &params,
        Some(("user.conf", "backend.providers.Local.config.concurrent-job-limit = 5\n")),
    )
    .expect("synthesize");
    assert_eq!(
        get_path(&config.body, "backend.providers.Local.config.concurrent-job-limit"),
        Some(&json!(5))
    );
}

#[test]
fn providers_follow_local_cloud_scheduler_order() {
    let config = build_backend_config(&configured_params(), None).expect("synthesize");
    let providers = get_path(&config.body, "backend.providers")
        .and_then(|value| value.as_object())
        .expect("providers present");
    let names: Vec<_> = providers.keys().map(String::as_str).collect();
    assert_eq!(names, ["Local", "gcp", "aws", "slurm", "sge", "pbs"]);

    let rendered = config.render();
    let local = rendered.find("Local {").expect("Local block");
    let pbs = rendered.find("pbs {").expect("pbs block");
    assert!(local < pbs, "{rendered}");
}

#[test]
fn unconfigured_cloud_and_partial_database_are_omitted() {
    let mut params = BackendParameters::default();
    params.database.mysql_host = Some("db.internal".into());
    let config = build_backend_config(&params, None).expect("synthesize");
    assert!(get_path(&config.body, "backend.providers.gcp").is_none());
    assert!(get_path(&config.body, "backend.providers.aws").is_none());
    assert!(config.body.get("database").is_none());
    assert!(get_path(&config.body, "backend.providers.Local").is_some());
}

#[test]
fn default_backend_precedence() {
    let override_text = "backend {\n  default = \"sge\"\n}\n";

    let mut params = BackendParameters::default();
    params.default_backend = Some(BackendKind::Slurm);
    let config = build_backend_config(&params, Some(("user.conf", override_text))).unwrap();
    assert_eq!(config.default_backend, "slurm");
    assert_eq!(get_path(&config.body, "backend.default"), Some(&json!("slurm")));

    params.default_backend = None;
    let config = build_backend_config(&params, Some(("user.conf", override_text))).unwrap();
    assert_eq!(config.default_backend, "sge");

    let config = build_backend_config(&params, None).unwrap();
    assert_eq!(config.default_backend, "Local");
}

#[test]
fn override_parse_errors_carry_position() {
    let error = build_backend_config(
        &BackendParameters::default(),
        Some(("broken.conf", "backend {\n  default = = Local\n}\n")),
    )
    .unwrap_err();
    let ConfigError::OverrideParse { source_name, line, .. } = &error else {
        panic!("unexpected error: {error}");
    };
    assert_eq!(source_name, "broken.conf");
    assert_eq!(*line, 2);
    assert!(error.to_string().contains("broken.conf"));
}

#[test]
fn rendered_config_parses_back() {
    let config = build_backend_config(&configured_params(), None).unwrap();
    let rendered = config.render();
    let reparsed = hocon::parse(&rendered).expect("generated HOCON parses");
    assert_eq!(reparsed, config.body);
}

#[test]
fn writes_once_with_remote_override() {
    let dir = tempdir().unwrap();
    let transport = Arc::new(MemoryTransport::new());
    transport.insert(
        "gs://configs/site.conf",
        "include required(classpath(\"application\"))\ninclude \"site-extra.conf\"\nsystem.max-concurrent-workflows = 7\n",
    );
    let resolver = UriResolver::with_transport(dir.path().join("cache"), transport);

    let mut params = BackendParameters::default();
    params.override_config = Some("gs://configs/site.conf".into());
    let path = dir.path().join("out/backend.conf");
    let config = write_backend_config(&resolver, &params, &path).expect("write config");

    let written = fs::read_to_string(&path).unwrap();
    assert_eq!(written, config.render());
    let mut lines = written.lines();
    assert_eq!(lines.next(), Some(BUILTIN_HEADER));
    assert_eq!(lines.next(), Some("include \"site-extra.conf\""));
    assert_eq!(written.matches(BUILTIN_HEADER).count(), 1);
    assert_eq!(get_path(&config.body, "system.max-concurrent-workflows"), Some(&json!(7)));
}
