use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use super::StorageTransport;
use crate::{ResolveError, Uri};

/// Object store held in memory, for tests and dry runs.
///
/// Counts every transfer so callers can assert cache hits did not touch
/// "the network".
#[derive(Debug, Default)]
pub struct MemoryTransport {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    downloads: AtomicUsize,
    uploads: AtomicUsize,
    latency: Option<Duration>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long inside every download, widening race windows in tests.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn insert(&self, uri: &str, contents: impl Into<Vec<u8>>) {
        let mut objects = self.objects.lock().expect("memory transport lock poisoned");
        objects.insert(Uri::parse(uri).as_str().to_string(), contents.into());
    }

    pub fn get(&self, uri: &str) -> Option<Vec<u8>> {
        let objects = self.objects.lock().expect("memory transport lock poisoned");
        objects.get(Uri::parse(uri).as_str()).cloned()
    }

    pub fn download_count(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }

    pub fn upload_count(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }
}

impl StorageTransport for MemoryTransport {
    fn download(&self, uri: &Uri, destination: &Path) -> Result<(), ResolveError> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            thread::sleep(latency);
        }
        let contents = self
            .get(uri.as_str())
            .ok_or_else(|| ResolveError::transfer(uri.as_str(), "object not found"))?;
        fs::write(destination, contents).map_err(|error| ResolveError::cache_write(destination, error))
    }

    fn upload(&self, source: &Path, uri: &Uri) -> Result<(), ResolveError> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        let contents = fs::read(source).map_err(|error| ResolveError::io(source, error))?;
        self.insert(uri.as_str(), contents);
        Ok(())
    }
}
