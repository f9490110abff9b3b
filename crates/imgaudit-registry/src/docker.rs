//! Manifest probe backed by the docker CLI.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use imgaudit_core::{ManifestProbe, ManifestStatus};
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

use crate::error::{RegistryError, Result};

/// Runs `<binary> manifest inspect <reference>`.
///
/// Exit status 0 means the manifest exists. Authentication comes from the
/// operator's docker configuration.
#[derive(Debug, Clone)]
pub struct DockerCliProbe {
    binary: String,
    timeout: Option<Duration>,
}

impl DockerCliProbe {
    /// Create a probe using the given docker binary.
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            timeout: None,
        }
    }

    /// Limit how long a single query may run.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Inspect the manifest of `reference`.
    pub async fn inspect(&self, reference: &str) -> Result<()> {
        let mut command = Command::new(&self.binary);
        command
            .args(["manifest", "inspect", reference])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(binary = %self.binary, %reference, "running manifest inspect");

        let output = match self.timeout {
            Some(limit) => timeout(limit, command.output())
                .await
                .map_err(|_| RegistryError::Timeout(limit))?,
            None => command.output().await,
        }
        .map_err(|source| RegistryError::Spawn {
            binary: self.binary.clone(),
            source,
        })?;

        if output.status.success() {
            Ok(())
        } else {
            Err(RegistryError::CommandFailed {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

#[async_trait]
impl ManifestProbe for DockerCliProbe {
    fn name(&self) -> &str {
        "docker"
    }

    async fn manifest_status(&self, reference: &str) -> ManifestStatus {
        match self.inspect(reference).await {
            Ok(()) => ManifestStatus::Published,
            Err(e) => ManifestStatus::Unconfirmed {
                reason: e.to_string(),
            },
        }
    }
}
