use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde_json::Value;
use tempfile::{TempDir, tempdir};
use wharf_backend::{EngineMode, SubmissionError, prepare_submission};
use wharf_types::{BackendKind, WharfParameters};
use wharf_uri::{MemoryTransport, UriResolver};

struct Fixture {
    dir: TempDir,
    transport: Arc<MemoryTransport>,
    resolver: UriResolver,
    params: WharfParameters,
}

fn fixture(workflow_source: &str) -> Fixture {
    let dir = tempdir().unwrap();
    let transport = Arc::new(MemoryTransport::new());
    let resolver = UriResolver::with_transport(dir.path().join("cache"), transport.clone());

    let workflow = dir.path().join("atac.wdl");
    fs::write(&workflow, workflow_source).unwrap();
    let jar = dir.path().join("cromwell-42.jar");
    fs::write(&jar, "jar").unwrap();

    let mut params = WharfParameters::default();
    params.submission.workflow = Some(workflow.to_string_lossy().into_owned());
    params.submission.engine_jar = jar.to_string_lossy().into_owned();
    params.submission.tmp_dir = dir.path().join("tmp");
    params.backend.local.out_dir = dir.path().join("out");

    Fixture {
        dir,
        transport,
        resolver,
        params,
    }
}

fn read_json(path: &Path) -> Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

#[test]
fn local_run_uses_workflow_docker_directive() {
    let mut fx = fixture("version 1.0\n#WHARF docker myrepo/img:latest\nworkflow atac {}\n");
    fx.transport
        .insert("gs://bucket/inputs.json", r#"{"atac.fastq": "gs://bucket/r1.fq.gz", "atac.n": 2}"#);
    fx.transport.insert("gs://bucket/r1.fq.gz", "@read");
    fx.params.submission.inputs = Some("gs://bucket/inputs.json".into());
    fx.params.submission.use_docker = true;
    fx.params.submission.str_label = Some("run-1".into());

    let prepared = prepare_submission(&fx.params, &fx.resolver, EngineMode::Run).expect("prepare");

    assert!(prepared.work_dir.starts_with(fx.dir.path().join("tmp/atac")));
    assert_eq!(prepared.backend, "Local");
    assert!(prepared.backend_conf.exists());

    let options = read_json(prepared.workflow_options.as_deref().unwrap());
    assert_eq!(options["backend"], "Local");
    assert_eq!(options["default_runtime_attributes"]["docker"], "myrepo/img:latest");
    assert_eq!(options["default_runtime_attributes"]["maxRetries"], 1);

    let inputs = read_json(prepared.inputs.as_deref().unwrap());
    let cached = fx.dir.path().join("cache/gcs/bucket/r1.fq.gz");
    assert_eq!(inputs["atac.fastq"], &*cached.to_string_lossy());
    assert_eq!(inputs["atac.n"], 2);
    assert_eq!(prepared.localized, vec![cached.to_string_lossy().into_owned()]);

    let labels = read_json(prepared.labels.as_deref().unwrap());
    assert_eq!(labels["wharf-backend"], "Local");
    assert_eq!(labels["wharf-str-label"], "run-1");
}

#[test]
fn run_argv_places_system_properties_before_jar() {
    let fx = fixture("workflow w {}\n");
    let prepared = prepare_submission(&fx.params, &fx.resolver, EngineMode::Run).expect("prepare");
    let argv = &prepared.argv;

    assert_eq!(argv[0], "java");
    assert_eq!(argv[1], "-Xmx1G");
    let config_flag = argv.iter().position(|arg| arg.starts_with("-Dconfig.file=")).unwrap();
    let jar_flag = argv.iter().position(|arg| arg == "-jar").unwrap();
    assert!(config_flag < jar_flag);
    assert_eq!(argv[jar_flag + 2], "run");
    for flag in ["-i", "-o", "-l", "-m"] {
        assert!(argv.iter().any(|arg| arg == flag), "missing {flag} in {argv:?}");
    }
    assert!(!argv.iter().any(|arg| arg == "-p"));
    assert_eq!(read_json(prepared.inputs.as_deref().unwrap()), serde_json::json!({}));
}

#[test]
fn server_mode_writes_only_backend_conf() {
    let mut fx = fixture("workflow w {}\n");
    fx.params.submission.workflow = None;

    let prepared = prepare_submission(&fx.params, &fx.resolver, EngineMode::Server).expect("prepare");
    assert_eq!(prepared.work_dir, fx.dir.path().join("tmp"));
    assert!(prepared.backend_conf.exists());
    assert!(prepared.inputs.is_none() && prepared.workflow_options.is_none() && prepared.labels.is_none());
    assert_eq!(prepared.argv[1], "-Xmx7G");
    assert_eq!(prepared.argv.last().map(String::as_str), Some("server"));

    let entries: Vec<_> = fs::read_dir(&prepared.work_dir).unwrap().collect();
    assert_eq!(entries.len(), 1);
}

#[test]
fn run_without_workflow_is_rejected() {
    let mut fx = fixture("workflow w {}\n");
    fx.params.submission.workflow = None;
    let error = prepare_submission(&fx.params, &fx.resolver, EngineMode::Run).unwrap_err();
    assert!(matches!(error, SubmissionError::MissingWorkflow));
}

#[test]
fn cloud_backend_without_image_fails() {
    let mut fx = fixture("workflow w {}\n");
    fx.params.backend.default_backend = Some(BackendKind::Gcp);
    fx.params.backend.gcp.project = Some("my-project".into());
    fx.params.backend.gcp.out_gcs_bucket = Some("gs://out".into());

    let error = prepare_submission(&fx.params, &fx.resolver, EngineMode::Run).unwrap_err();
    assert!(matches!(error, SubmissionError::MissingContainer { container: "docker", .. }), "{error}");
}

#[test]
fn cloud_backend_must_be_configured() {
    let mut fx = fixture("#WHARF docker ubuntu\n");
    fx.params.backend.default_backend = Some(BackendKind::Aws);
    let error = prepare_submission(&fx.params, &fx.resolver, EngineMode::Run).unwrap_err();
    assert!(matches!(error, SubmissionError::BackendNotConfigured { .. }), "{error}");
    assert!(!fx.dir.path().join("tmp").exists(), "rejected submission left files behind");
}

#[test]
fn gcp_run_stages_local_inputs_to_bucket() {
    let mut fx = fixture("#WHARF docker ubuntu:22.04\nworkflow w {}\n");
    let reads = fx.dir.path().join("reads.bam");
    fs::write(&reads, "BAM").unwrap();
    let inputs = fx.dir.path().join("inputs.json");
    fs::write(
        &inputs,
        serde_json::json!({"w.reads": reads.to_string_lossy(), "w.ref": "gs://refs/hg38.fa"}).to_string(),
    )
    .unwrap();

    fx.params.backend.default_backend = Some(BackendKind::Gcp);
    fx.params.backend.gcp.project = Some("my-project".into());
    fx.params.backend.gcp.out_gcs_bucket = Some("gs://out".into());
    fx.params.submission.inputs = Some(inputs.to_string_lossy().into_owned());

    let prepared = prepare_submission(&fx.params, &fx.resolver, EngineMode::Run).expect("prepare");
    assert_eq!(prepared.backend, "gcp");

    let staged = read_json(prepared.inputs.as_deref().unwrap());
    let reads_uri = staged["w.reads"].as_str().unwrap();
    assert!(reads_uri.starts_with("gs://out/wharf_tmp_dir/"), "{reads_uri}");
    assert_eq!(fx.transport.get(reads_uri).as_deref(), Some(b"BAM".as_slice()));
    assert_eq!(staged["w.ref"], "gs://refs/hg38.fa");
    assert_eq!(fx.transport.upload_count(), 1);

    let options = read_json(prepared.workflow_options.as_deref().unwrap());
    assert_eq!(options["default_runtime_attributes"]["docker"], "ubuntu:22.04");
    let conf = fs::read_to_string(&prepared.backend_conf).unwrap();
    assert!(conf.contains("PipelinesApiLifecycleActorFactory"));
}
