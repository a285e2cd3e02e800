//! Update cycle state and observer notifications.
//!
//! The controller is the single writer of [`UpdateState`]; observers receive
//! typed [`UpdateEvent`] messages over a broadcast channel and can read a
//! consistent [`StatusSnapshot`] at any time. State and its associated
//! payload (manifest, installer path, failure reason) always change together
//! under one lock, so a snapshot is never torn.

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::UpdateError;
use crate::manifest::ReleaseManifest;

/// Where an update cycle currently stands.
///
/// `Idle` is the initial state. `Complete`, `Cancelled`, and `Failed` are
/// terminal for a cycle; a fresh controller is required to run another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateState {
    /// No cycle has started.
    Idle,
    /// Background polling is running.
    Checking,
    /// A newer release was found; awaiting the caller's decision.
    Available,
    /// The installer package is downloading.
    Downloading,
    /// The downloaded installer is undergoing trust verification.
    Verifying,
    /// The verified installer is being started.
    Launching,
    /// The installer was launched; the host should shut down.
    Complete,
    /// The cycle was cancelled by the caller.
    Cancelled,
    /// The cycle failed; see the snapshot's error for the reason.
    Failed,
}

impl UpdateState {
    /// Whether this state ends the cycle.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Cancelled | Self::Failed)
    }
}

/// Notification published to subscribed observers.
///
/// This generalizes per-signal callback fields into one typed channel: any
/// number of observers subscribe without the controller holding
/// presentation-specific references.
#[derive(Debug, Clone)]
pub enum UpdateEvent {
    /// The cycle moved to a new state.
    StateChanged(UpdateState),
    /// A newer release was found; carries the parsed manifest.
    UpdateAvailable(ReleaseManifest),
    /// Download progress in whole percent, non-decreasing per download.
    DownloadProgress(u8),
    /// The cycle failed with the attached reason.
    Failed(Arc<UpdateError>),
    /// The installer is running; the host application should now exit.
    ShutdownRequested,
}

/// Consistent point-in-time view of the controller's state and payload.
#[derive(Debug, Clone, Default)]
pub struct StatusSnapshot {
    /// Current cycle state.
    pub state: UpdateState,
    /// Manifest of the available release, once one has been found.
    pub manifest: Option<ReleaseManifest>,
    /// Path of the downloaded installer, once the download has started.
    pub installer_path: Option<PathBuf>,
    /// Failure reason, set exactly when `state` is [`UpdateState::Failed`].
    pub error: Option<Arc<UpdateError>>,
}

impl Default for UpdateState {
    fn default() -> Self {
        Self::Idle
    }
}
