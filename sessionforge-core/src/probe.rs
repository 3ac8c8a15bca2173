//! Credential extraction probe.
//!
//! The probe is the external collaborator that pulls a fresh session token
//! and cookie out of a logged-in browser. Sessionforge only knows its
//! contract: run it, and it either prints a credential pair as JSON or fails.
//!
//! - [`CredentialProbe`] - Capability trait
//! - [`CommandProbe`] - Runs a configured command with a hard timeout
//! - [`UnavailableProbe`] - Selected on platforms where extraction is impossible
//! - [`create_probe`] - Picks one of the above at startup

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::Secret;

/// Default hard timeout for one extraction run.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(60);

/// Error type for extraction runs.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// Extraction is not possible on this platform or is not configured.
    #[error("credential extraction unavailable: {reason}")]
    Unavailable { reason: String },

    /// The probe process could not be started.
    #[error("failed to start probe: {0}")]
    Spawn(#[from] std::io::Error),

    /// The probe did not finish within its timeout.
    #[error("probe timed out after {0:?}")]
    Timeout(Duration),

    /// The probe exited unsuccessfully.
    #[error("probe exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },

    /// The probe output was not a credential object.
    #[error("unparsable probe output: {0}")]
    Output(#[from] serde_json::Error),
}

/// Raw credentials as printed by the probe, before validation.
#[derive(Clone, Serialize, Deserialize)]
pub struct ExtractedCredentials {
    pub token: Secret,
    #[serde(alias = "secret")]
    pub cookie: Secret,
}

impl std::fmt::Debug for ExtractedCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractedCredentials").finish_non_exhaustive()
    }
}

/// Capability interface for credential extraction.
#[async_trait]
pub trait CredentialProbe: Send + Sync {
    /// Whether extraction can be attempted at all on this host.
    fn is_available(&self) -> bool;

    /// Run one extraction.
    ///
    /// Implementations must enforce their own timeout.
    async fn extract(&self) -> Result<ExtractedCredentials, ProbeError>;
}

/// Probe configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Program to run. Extraction is unavailable when unset.
    pub command: Option<PathBuf>,

    /// Arguments passed to the program.
    pub args: Vec<String>,

    /// Hard timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            command: None,
            args: Vec::new(),
            timeout_secs: DEFAULT_PROBE_TIMEOUT.as_secs(),
        }
    }
}

/// Runs an external command and parses its stdout as credentials.
#[derive(Debug, Clone)]
pub struct CommandProbe {
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandProbe {
    /// Create a probe for `program` with the default timeout.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }

    /// Set the arguments passed to the program.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Set the hard timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl CredentialProbe for CommandProbe {
    fn is_available(&self) -> bool {
        true
    }

    async fn extract(&self) -> Result<ExtractedCredentials, ProbeError> {
        tracing::info!(program = %self.program.display(), "running credential probe");

        let mut command = tokio::process::Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Dropping the output future on timeout kills the child.
        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| ProbeError::Timeout(self.timeout))??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ProbeError::Failed {
                status: output.status.to_string(),
                stderr: stderr.trim().chars().take(200).collect(),
            });
        }

        Ok(serde_json::from_slice(&output.stdout)?)
    }
}

/// Probe that never extracts anything.
#[derive(Debug, Clone)]
pub struct UnavailableProbe {
    reason: String,
}

impl UnavailableProbe {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl CredentialProbe for UnavailableProbe {
    fn is_available(&self) -> bool {
        false
    }

    async fn extract(&self) -> Result<ExtractedCredentials, ProbeError> {
        Err(ProbeError::Unavailable {
            reason: self.reason.clone(),
        })
    }
}

/// Select the probe for this process.
///
/// Browser extraction only works on macOS; on any other platform, or when
/// no command is configured, an [`UnavailableProbe`] is returned.
pub fn create_probe(config: &ProbeConfig) -> Arc<dyn CredentialProbe> {
    let Some(program) = config.command.as_ref() else {
        tracing::debug!("No credential probe configured, renewal disabled");
        return Arc::new(UnavailableProbe::new("no probe command configured"));
    };

    if !cfg!(target_os = "macos") {
        tracing::info!(
            program = %program.display(),
            "Credential extraction is only supported on macOS, renewal disabled"
        );
        return Arc::new(UnavailableProbe::new("extraction requires macOS"));
    }

    Arc::new(
        CommandProbe::new(program)
            .with_args(config.args.iter().cloned())
            .with_timeout(Duration::from_secs(config.timeout_secs)),
    )
}
