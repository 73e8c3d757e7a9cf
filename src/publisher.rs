//! The Publisher adapter contract (§4.3): uploads a downloaded file to the
//! destination platform and reports back whatever id it assigns.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::instrument;

use crate::error::{Result, SyncError};

#[async_trait]
pub trait Publisher: Send + Sync {
    /// Uploads the file at `path` and returns the destination platform's id
    /// for it, if the platform assigns one synchronously.
    async fn upload(&self, video_id: &str, path: &Path) -> Result<Option<String>>;
}

/// Shells out to a configured upload command, passing the file path as its
/// final argument and reading the platform id from stdout.
pub struct ExternalUploader {
    command_path: PathBuf,
    extra_args: Vec<String>,
}

impl ExternalUploader {
    pub fn new(command_path: PathBuf) -> Self {
        Self {
            command_path,
            extra_args: Vec::new(),
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.extra_args = args;
        self
    }
}

#[async_trait]
impl Publisher for ExternalUploader {
    #[instrument(skip(self))]
    async fn upload(&self, video_id: &str, path: &Path) -> Result<Option<String>> {
        let mut command = Command::new(&self.command_path);
        command
            .args(&self.extra_args)
            .arg(path)
            .stdout(Stdio::piped())
            .stderr(Stdio::null());

        let output = command
            .output()
            .await
            .map_err(|err| SyncError::adapter(anyhow::anyhow!("spawning uploader: {err}")))?;
        if !output.status.success() {
            return Err(SyncError::adapter(anyhow::anyhow!(
                "upload failed for {video_id} (status {})",
                output.status
            )));
        }
        let raw = String::from_utf8_lossy(&output.stdout);
        let platform_id = raw.trim();
        Ok(if platform_id.is_empty() {
            None
        } else {
            Some(platform_id.to_string())
        })
    }
}

/// A literal, in-memory `Publisher` for tests, no process spawned.
#[cfg(any(test, feature = "test-support"))]
pub struct FakePublisher {
    pub responses: HashMap<String, Option<String>>,
    pub fail_for: Vec<String>,
}

#[cfg(any(test, feature = "test-support"))]
#[async_trait]
impl Publisher for FakePublisher {
    async fn upload(&self, video_id: &str, _path: &Path) -> Result<Option<String>> {
        if self.fail_for.contains(&video_id.to_string()) {
            return Err(SyncError::adapter(anyhow::anyhow!("publish failed for {video_id}")));
        }
        Ok(self
            .responses
            .get(video_id)
            .cloned()
            .unwrap_or_else(|| Some(format!("platform-{video_id}"))))
    }
}
