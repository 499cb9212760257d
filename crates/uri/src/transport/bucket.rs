//! Cloud bucket transfers through the vendor command-line tools.
//!
//! `gsutil` handles `gs://` objects and `aws s3` handles `s3://` objects. With
//! `use_gsutil_over_aws_s3` set, `gsutil` (which reads boto credentials for
//! S3) is used for both.

use std::path::Path;
use std::process::Command;

use tracing::debug;

use super::StorageTransport;
use crate::{ResolveError, SchemeTag, Uri};

#[derive(Debug, Clone, Default)]
pub struct BucketTransport {
    use_gsutil_over_aws_s3: bool,
}

impl BucketTransport {
    pub fn new(use_gsutil_over_aws_s3: bool) -> Self {
        Self { use_gsutil_over_aws_s3 }
    }

    fn copy_command(&self, scheme: SchemeTag, source: &str, destination: &str) -> Command {
        let mut command = if scheme == SchemeTag::S3 && !self.use_gsutil_over_aws_s3 {
            let mut command = Command::new("aws");
            command.args(["s3", "cp", "--only-show-errors"]);
            command
        } else {
            let mut command = Command::new("gsutil");
            command.args(["-q", "cp"]);
            command
        };
        command.arg(source).arg(destination);
        command
    }

    fn run(&self, uri: &Uri, mut command: Command) -> Result<(), ResolveError> {
        let program = command.get_program().to_string_lossy().into_owned();
        debug!(%uri, program = %program, "running bucket copy");
        let output = command
            .output()
            .map_err(|error| ResolveError::transfer(uri.as_str(), format!("failed to launch {program}: {error}")))?;
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let reason = if stderr.is_empty() {
            format!("{program} exited with {}", output.status)
        } else {
            stderr
        };
        Err(ResolveError::transfer(uri.as_str(), reason))
    }
}

impl StorageTransport for BucketTransport {
    fn download(&self, uri: &Uri, destination: &Path) -> Result<(), ResolveError> {
        let command = self.copy_command(uri.scheme(), uri.as_str(), &destination.to_string_lossy());
        self.run(uri, command)
    }

    fn upload(&self, source: &Path, uri: &Uri) -> Result<(), ResolveError> {
        let command = self.copy_command(uri.scheme(), &source.to_string_lossy(), uri.as_str());
        self.run(uri, command)
    }
}
