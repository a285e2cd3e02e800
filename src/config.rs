//! Configuration surface for the update client.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::trust::TrustPolicy;

/// Settings controlling polling, download placement, and trust policy.
///
/// The presence of a pinned key fingerprint selects the
/// [`TrustPolicy::PinnedKey`] policy; its absence falls back to
/// [`TrustPolicy::MatchRunningApplication`].
///
/// # Serialization
///
/// Serde-derived for embedding in a host's configuration file.
///
/// ```toml
/// [updater]
/// endpoint = "https://releases.example.com/manifest.xml"
/// poll_interval_secs = 3600
/// pinned_key_fingerprint = "3b1f…"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdaterConfig {
    /// URL of the release manifest endpoint.
    pub endpoint: String,

    /// Seconds between update checks.
    ///
    /// # Default: `3600` (one hour)
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Directory installer packages are downloaded into.
    ///
    /// Defaults to the system temporary directory. The in-flight download
    /// owns its destination path exclusively; files are retained after
    /// failure or cancellation for diagnostics.
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,

    /// Expected public key fingerprint of the installer's signer.
    ///
    /// When set, updates are accepted only from this exact key, independent
    /// of the running binary's own signature. This is the stronger policy:
    /// it holds even if the running binary was shipped unsigned or its
    /// signing identity has been compromised.
    #[serde(default)]
    pub pinned_key_fingerprint: Option<String>,

    /// Bounded timeout in seconds applied to manifest fetches and the
    /// installer download.
    ///
    /// # Default: `None`
    ///
    /// Without a timeout a hung connection blocks its iteration
    /// indefinitely; production deployments should set one.
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

fn default_poll_interval_secs() -> u64 {
    60 * 60
}

fn default_download_dir() -> PathBuf {
    std::env::temp_dir()
}

impl UpdaterConfig {
    /// Create a configuration for `endpoint` with defaults for everything
    /// else.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            poll_interval_secs: default_poll_interval_secs(),
            download_dir: default_download_dir(),
            pinned_key_fingerprint: None,
            request_timeout_secs: None,
        }
    }

    /// Time between update checks.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Request timeout, if one is configured.
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    /// The trust policy implied by this configuration.
    pub fn trust_policy(&self) -> TrustPolicy {
        match &self.pinned_key_fingerprint {
            Some(fingerprint) => TrustPolicy::PinnedKey(fingerprint.clone()),
            None => TrustPolicy::MatchRunningApplication,
        }
    }

    /// Build the HTTP client used for both polling and downloads, applying
    /// the configured timeout when present.
    pub fn http_client(&self) -> reqwest::Result<reqwest::Client> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = self.request_timeout() {
            builder = builder.timeout(timeout);
        }
        builder.build()
    }
}
