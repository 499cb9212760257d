//! Storage transports: the code that actually moves bytes.
//!
//! The cache and resolver only talk to [`StorageTransport`]; the default
//! [`SchemeRouter`] dispatches HTTP(S) to [`HttpTransport`] and bucket URIs
//! to [`BucketTransport`]. Tests substitute a [`MemoryTransport`].

mod bucket;
mod http;
mod memory;

use std::path::Path;

pub use bucket::BucketTransport;
pub use http::{HttpCredentials, HttpTransport, redact_sensitive};
pub use memory::MemoryTransport;
use wharf_types::StorageParams;

use crate::{ResolveError, SchemeTag, Uri};

/// Moves a single object between remote storage and the local filesystem.
///
/// Implementations must be safe to share across threads; the cache may be
/// used from several threads of one process as well as from several processes.
pub trait StorageTransport: Send + Sync {
    /// Write the object named by `uri` to `destination`, replacing any content.
    fn download(&self, uri: &Uri, destination: &Path) -> Result<(), ResolveError>;

    /// Store the local file `source` as the object named by `uri`.
    fn upload(&self, source: &Path, uri: &Uri) -> Result<(), ResolveError>;
}

/// Default transport selecting an implementation by scheme.
#[derive(Debug)]
pub struct SchemeRouter {
    http: HttpTransport,
    bucket: BucketTransport,
}

impl SchemeRouter {
    pub fn new(http: HttpTransport, bucket: BucketTransport) -> Self {
        Self { http, bucket }
    }

    /// Build the router from resolved storage settings.
    pub fn from_params(params: &StorageParams) -> Result<Self, ResolveError> {
        let credentials = match (&params.http_user, &params.http_password) {
            (Some(user), Some(password)) => HttpCredentials::Basic {
                user: user.clone(),
                password: password.clone(),
            },
            _ if params.use_netrc => HttpCredentials::Netrc,
            _ => HttpCredentials::None,
        };
        Ok(Self {
            http: HttpTransport::new(credentials)?,
            bucket: BucketTransport::new(params.use_gsutil_over_aws_s3),
        })
    }
}

impl StorageTransport for SchemeRouter {
    fn download(&self, uri: &Uri, destination: &Path) -> Result<(), ResolveError> {
        match uri.scheme() {
            SchemeTag::Http => self.http.download(uri, destination),
            SchemeTag::Gcs | SchemeTag::S3 => self.bucket.download(uri, destination),
            SchemeTag::Local => Err(ResolveError::NotRemote {
                uri: uri.as_str().to_string(),
            }),
        }
    }

    fn upload(&self, source: &Path, uri: &Uri) -> Result<(), ResolveError> {
        match uri.scheme() {
            SchemeTag::Http => self.http.upload(source, uri),
            SchemeTag::Gcs | SchemeTag::S3 => self.bucket.upload(source, uri),
            SchemeTag::Local => Err(ResolveError::NotRemote {
                uri: uri.as_str().to_string(),
            }),
        }
    }
}
