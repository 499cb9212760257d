use std::fs;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tempfile::tempdir;
use wharf_uri::{CacheOptions, ContentCache, MemoryTransport, ResolveError, StorageTransport, Uri};

fn cache_with(transport: Arc<MemoryTransport>, root: &std::path::Path) -> ContentCache {
    ContentCache::new(root.to_path_buf(), transport as Arc<dyn StorageTransport>)
}

#[test]
fn second_fetch_is_a_cache_hit() {
    let dir = tempdir().unwrap();
    let transport = Arc::new(MemoryTransport::new());
    transport.insert("gs://bucket/x.json", r#"{"k": 1}"#);
    let cache = cache_with(transport.clone(), dir.path());
    let uri = Uri::parse("gs://bucket/x.json");

    let first = cache.get_or_fetch(&uri).unwrap();
    let second = cache.get_or_fetch(&uri).unwrap();

    assert_eq!(first, second);
    assert_eq!(first, dir.path().join("gcs/bucket/x.json"));
    assert_eq!(fs::read_to_string(&first).unwrap(), r#"{"k": 1}"#);
    assert_eq!(transport.download_count(), 1);
    assert!(cache.contains(&uri));
}

#[test]
fn concurrent_fetches_converge_on_one_download() {
    let dir = tempdir().unwrap();
    let transport = Arc::new(MemoryTransport::new().with_latency(Duration::from_millis(200)));
    transport.insert("s3://bucket/big.tsv", "a\tb\n");
    let cache = Arc::new(cache_with(transport.clone(), dir.path()).with_options(CacheOptions {
        poll_interval: Duration::from_millis(10),
        stale_after: Duration::from_secs(60),
    }));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let cache = cache.clone();
            thread::spawn(move || cache.get_or_fetch(&Uri::parse("s3://bucket/big.tsv")).unwrap())
        })
        .collect();
    let paths: Vec<_> = handles.into_iter().map(|handle| handle.join().unwrap()).collect();

    assert!(paths.windows(2).all(|pair| pair[0] == pair[1]));
    assert_eq!(transport.download_count(), 1);
    assert!(!dir.path().join("s3/bucket/big.tsv.lock").exists());
}

#[test]
fn stale_reservation_is_broken() {
    let dir = tempdir().unwrap();
    let transport = Arc::new(MemoryTransport::new());
    transport.insert("gs://bucket/x.json", "{}");
    let cache = cache_with(transport.clone(), dir.path()).with_options(CacheOptions {
        poll_interval: Duration::from_millis(5),
        stale_after: Duration::ZERO,
    });

    let lock = dir.path().join("gcs/bucket/x.json.lock");
    fs::create_dir_all(lock.parent().unwrap()).unwrap();
    fs::write(&lock, "99999\n").unwrap();
    thread::sleep(Duration::from_millis(20));

    let path = cache.get_or_fetch(&Uri::parse("gs://bucket/x.json")).unwrap();
    assert!(path.is_file());
    assert_eq!(transport.download_count(), 1);
}

#[test]
fn failed_transfer_leaves_no_entry_behind() {
    let dir = tempdir().unwrap();
    let transport = Arc::new(MemoryTransport::new());
    let cache = cache_with(transport, dir.path());
    let uri = Uri::parse("gs://bucket/missing.json");

    let error = cache.get_or_fetch(&uri).unwrap_err();
    assert!(matches!(error, ResolveError::Transfer { .. }), "{error}");

    let parent = dir.path().join("gcs/bucket");
    let leftovers: Vec<_> = fs::read_dir(&parent).unwrap().collect();
    assert!(leftovers.is_empty(), "unexpected files: {leftovers:?}");
    assert!(!cache.contains(&uri));
}

#[test]
fn local_uris_are_rejected() {
    let dir = tempdir().unwrap();
    let cache = cache_with(Arc::new(MemoryTransport::new()), dir.path());
    let error = cache.get_or_fetch(&Uri::parse("/data/x.json")).unwrap_err();
    assert!(matches!(error, ResolveError::NotRemote { .. }));
}

#[cfg(unix)]
#[test]
fn unwritable_cache_root_is_a_cache_write_error() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempdir().unwrap();
    let root = dir.path().join("locked");
    fs::create_dir(&root).unwrap();
    fs::set_permissions(&root, fs::Permissions::from_mode(0o500)).unwrap();
    // Privileged users ignore directory permissions.
    if fs::write(root.join("probe"), "").is_ok() {
        return;
    }

    let transport = Arc::new(MemoryTransport::new());
    transport.insert("gs://bucket/x.json", "{}");
    let cache = cache_with(transport, &root);
    let error = cache.get_or_fetch(&Uri::parse("gs://bucket/x.json")).unwrap_err();
    assert!(matches!(error, ResolveError::CacheWrite { .. }), "{error}");
}
