//! Update cycle orchestration.
//!
//! [`UpdateController`] drives one complete cycle: background polling, the
//! caller's decision point, installer download, trust verification, and
//! launch. It owns the current [`StatusSnapshot`] exclusively and is the only
//! writer of [`UpdateState`]; observers follow along through the broadcast
//! event channel.
//!
//! Commands are state-gated. Callers are expected to consult
//! [`can_proceed`](UpdateController::can_proceed) and
//! [`can_cancel`](UpdateController::can_cancel) before invoking commands, but
//! the controller also defends itself: a command invoked outside its valid
//! state is logged and ignored rather than corrupting the cycle.
//!
//! A controller runs at most one cycle. Once a terminal state is reached
//! (`Complete`, `Cancelled`, `Failed`), checking again requires a fresh
//! controller.

use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::Context as _;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::UpdaterConfig;
use crate::download::{DownloadOutcome, Downloader, ProgressCallback};
use crate::error::UpdateError;
use crate::events::{StatusSnapshot, UpdateEvent, UpdateState};
use crate::manifest::ReleaseManifest;
use crate::poller::UpdatePoller;
use crate::trust::{SignatureProvider, TrustVerifier};
use crate::version::ReleaseVersion;

/// Starts a verified installer as an independent process.
///
/// Behind a trait so hosts can interpose (elevation wrappers, dry runs) and
/// tests never execute anything.
pub trait InstallerLauncher: Send + Sync {
    /// Start the installer at `installer` detached from the current process.
    fn launch(&self, installer: &Path) -> anyhow::Result<()>;
}

/// Default launcher: spawns the installer directly.
pub struct ProcessLauncher;

impl InstallerLauncher for ProcessLauncher {
    fn launch(&self, installer: &Path) -> anyhow::Result<()> {
        std::process::Command::new(installer)
            .spawn()
            .with_context(|| format!("failed to start installer {}", installer.display()))?;
        Ok(())
    }
}

/// Orchestrates poller, downloader, verifier, and launcher for one update
/// cycle.
pub struct UpdateController {
    config: UpdaterConfig,
    client: reqwest::Client,
    verifier: TrustVerifier,
    launcher: Arc<dyn InstallerLauncher>,
    status: Mutex<StatusSnapshot>,
    events: broadcast::Sender<UpdateEvent>,
    poller: tokio::sync::Mutex<UpdatePoller>,
    download_cancel: CancellationToken,
}

impl UpdateController {
    /// Create a controller that launches installers as real processes.
    ///
    /// The trust policy is derived from the configuration: a configured pin
    /// selects key pinning, otherwise the installer must match the running
    /// application's signer.
    ///
    /// # Errors
    ///
    /// Fails if the HTTP client cannot be built or the running executable's
    /// path cannot be determined.
    pub fn new(
        config: UpdaterConfig,
        running_version: ReleaseVersion,
        provider: Arc<dyn SignatureProvider>,
    ) -> anyhow::Result<Arc<Self>> {
        Self::with_launcher(config, running_version, provider, Arc::new(ProcessLauncher))
    }

    /// Create a controller with a custom installer launcher.
    pub fn with_launcher(
        config: UpdaterConfig,
        running_version: ReleaseVersion,
        provider: Arc<dyn SignatureProvider>,
        launcher: Arc<dyn InstallerLauncher>,
    ) -> anyhow::Result<Arc<Self>> {
        let client = config.http_client().context("failed to build HTTP client")?;
        let verifier = TrustVerifier::new(config.trust_policy(), provider)
            .context("failed to locate the running executable")?;
        let poller = UpdatePoller::new(client.clone(), config.endpoint.clone(), running_version);
        let (events, _) = broadcast::channel(64);

        Ok(Arc::new(Self {
            config,
            client,
            verifier,
            launcher,
            status: Mutex::new(StatusSnapshot::default()),
            events,
            poller: tokio::sync::Mutex::new(poller),
            download_cancel: CancellationToken::new(),
        }))
    }

    /// Subscribe to state-change and progress notifications.
    ///
    /// Any number of observers may subscribe; slow observers that fall more
    /// than the channel capacity behind see a lag error rather than stalling
    /// the controller.
    pub fn subscribe(&self) -> broadcast::Receiver<UpdateEvent> {
        self.events.subscribe()
    }

    /// Consistent snapshot of the current state and its payload.
    pub fn status(&self) -> StatusSnapshot {
        self.status.lock().unwrap().clone()
    }

    /// Current cycle state.
    pub fn state(&self) -> UpdateState {
        self.status.lock().unwrap().state
    }

    /// Whether [`proceed_with_update`](Self::proceed_with_update) would act.
    pub fn can_proceed(&self) -> bool {
        self.state() == UpdateState::Available
    }

    /// Whether [`cancel`](Self::cancel) would act.
    pub fn can_cancel(&self) -> bool {
        matches!(
            self.state(),
            UpdateState::Checking | UpdateState::Available | UpdateState::Downloading
        )
    }

    /// Start background polling: `Idle → Checking`.
    ///
    /// Ignored outside `Idle`. When the poller finds a newer release the
    /// controller transitions to `Available`, stores the manifest, emits
    /// [`UpdateEvent::UpdateAvailable`], and stops polling; once the decision
    /// point is reached no further checks run.
    pub async fn begin_polling(self: &Arc<Self>) {
        if !self.transition(&[UpdateState::Idle], UpdateState::Checking, |_| {}) {
            warn!(state = ?self.state(), "begin_polling ignored outside Idle");
            return;
        }

        let (tx, mut rx) = mpsc::channel(1);
        self.poller.lock().await.start(self.config.poll_interval(), tx);

        let controller = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(manifest) = rx.recv().await {
                if controller.on_update_available(manifest).await {
                    break;
                }
            }
        });
    }

    /// Accept the available update: `Available → Downloading` and onward.
    ///
    /// Ignored outside `Available`. The download, verification, and launch
    /// run on a background task; completion is observable through events and
    /// [`status`](Self::status). State gating makes the cycle single-flight:
    /// a second call finds the state already past `Available` and does
    /// nothing.
    pub async fn proceed_with_update(self: &Arc<Self>) {
        let mut accepted_manifest = None;
        let moved = self.transition(&[UpdateState::Available], UpdateState::Downloading, |snap| {
            accepted_manifest = snap.manifest.clone();
        });
        if !moved {
            warn!(state = ?self.state(), "proceed_with_update ignored outside Available");
            return;
        }
        let Some(manifest) = accepted_manifest else {
            warn!("no manifest recorded for available update");
            return;
        };

        info!(version = %manifest.version, "proceeding with update");
        let controller = Arc::clone(self);
        tokio::spawn(async move {
            controller.run_cycle(manifest).await;
        });
    }

    /// Cancel the cycle. Valid in `Checking`, `Available`, and `Downloading`;
    /// ignored elsewhere.
    ///
    /// In `Downloading` the cancellation token is signalled and the download
    /// worker records the terminal `Cancelled` state when it observes it, at
    /// chunk granularity.
    pub async fn cancel(&self) {
        match self.state() {
            UpdateState::Checking => {
                self.poller.lock().await.stop().await;
                self.transition(&[UpdateState::Checking], UpdateState::Cancelled, |_| {});
                info!("update check cancelled");
            }
            UpdateState::Available => {
                // Polling already stopped at the decision point.
                self.transition(&[UpdateState::Available], UpdateState::Cancelled, |_| {});
                info!("update declined");
            }
            UpdateState::Downloading => {
                info!("cancelling in-flight download");
                self.download_cancel.cancel();
            }
            other => debug!(state = ?other, "cancel ignored"),
        }
    }

    /// Poller delivery: `Checking → Available`. Returns whether the manifest
    /// was accepted (false when the cycle moved on, e.g. was cancelled).
    async fn on_update_available(self: &Arc<Self>, manifest: ReleaseManifest) -> bool {
        let stored = manifest.clone();
        let accepted = self.transition(&[UpdateState::Checking], UpdateState::Available, |snap| {
            snap.manifest = Some(stored);
        });

        if accepted {
            info!(version = %manifest.version, "update available: {}", manifest.update_label());
            let _ = self.events.send(UpdateEvent::UpdateAvailable(manifest));
            // Decision point reached: no further checks until re-armed with a
            // fresh controller.
            self.poller.lock().await.stop().await;
        } else {
            debug!(state = ?self.state(), "ignoring update notification");
        }
        accepted
    }

    /// Download → verify → launch continuation, run on its own task.
    ///
    /// Verification and launch run synchronously on this task once the
    /// download completes; they are fast serial steps with no progress of
    /// their own.
    async fn run_cycle(self: Arc<Self>, manifest: ReleaseManifest) {
        let downloader = Downloader::with_client(self.client.clone());
        let events = self.events.clone();
        let progress: ProgressCallback = Arc::new(move |percent| {
            let _ = events.send(UpdateEvent::DownloadProgress(percent));
        });

        let outcome = downloader
            .download(
                &manifest.package_url,
                &self.config.download_dir,
                &self.download_cancel,
                Some(progress),
            )
            .await;

        match outcome {
            Ok(DownloadOutcome::Cancelled(path)) => {
                warn!("update cancelled during download");
                self.transition(&[UpdateState::Downloading], UpdateState::Cancelled, |snap| {
                    snap.installer_path = Some(path);
                });
            }
            Err(err) => self.fail(UpdateError::Download(err)),
            Ok(DownloadOutcome::Completed(path)) => {
                self.transition(&[UpdateState::Downloading], UpdateState::Verifying, |snap| {
                    snap.installer_path = Some(path.clone());
                });

                match self.verifier.verify(&path) {
                    Err(reason) => {
                        // File retained for diagnostics, never executed.
                        self.fail(UpdateError::Untrusted(reason));
                    }
                    Ok(()) => {
                        self.transition(&[UpdateState::Verifying], UpdateState::Launching, |_| {});
                        match self.launcher.launch(&path) {
                            Err(err) => self.fail(UpdateError::Launch(err)),
                            Ok(()) => {
                                info!(path = %path.display(), "installer launched");
                                let _ = self.events.send(UpdateEvent::ShutdownRequested);
                                self.transition(
                                    &[UpdateState::Launching],
                                    UpdateState::Complete,
                                    |_| {},
                                );
                            }
                        }
                    }
                }
            }
        }
    }

    /// Atomically move to `to` if the current state is in `from`, applying
    /// the payload change under the same lock, then notify observers.
    fn transition(
        &self,
        from: &[UpdateState],
        to: UpdateState,
        apply: impl FnOnce(&mut StatusSnapshot),
    ) -> bool {
        {
            let mut status = self.status.lock().unwrap();
            if !from.contains(&status.state) {
                return false;
            }
            status.state = to;
            apply(&mut status);
        }
        let _ = self.events.send(UpdateEvent::StateChanged(to));
        true
    }

    /// Record a terminal failure with its reason and notify observers.
    fn fail(&self, err: UpdateError) {
        let reason = Arc::new(err);
        {
            let mut status = self.status.lock().unwrap();
            status.state = UpdateState::Failed;
            status.error = Some(Arc::clone(&reason));
        }
        warn!(error = %reason, "update cycle failed");
        let _ = self.events.send(UpdateEvent::StateChanged(UpdateState::Failed));
        let _ = self.events.send(UpdateEvent::Failed(reason));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trust::SignerIdentity;

    struct NoopProvider;

    impl SignatureProvider for NoopProvider {
        fn extract_signer_identity(&self, _path: &Path) -> Option<SignerIdentity> {
            None
        }

        fn verify_embedded_signature(&self, _path: &Path) -> bool {
            false
        }
    }

    struct PanicLauncher;

    impl InstallerLauncher for PanicLauncher {
        fn launch(&self, _installer: &Path) -> anyhow::Result<()> {
            panic!("launcher must not run in these tests");
        }
    }

    fn controller() -> Arc<UpdateController> {
        let config = UpdaterConfig::new("http://127.0.0.1:9/manifest.xml");
        UpdateController::with_launcher(
            config,
            "1.0.0".parse().unwrap(),
            Arc::new(NoopProvider),
            Arc::new(PanicLauncher),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn starts_idle_with_commands_disabled() {
        let controller = controller();
        assert_eq!(controller.state(), UpdateState::Idle);
        assert!(!controller.can_proceed());
        assert!(!controller.can_cancel());
    }

    #[tokio::test]
    async fn proceed_outside_available_is_a_no_op() {
        let controller = controller();
        controller.proceed_with_update().await;
        assert_eq!(controller.state(), UpdateState::Idle);
    }

    #[tokio::test]
    async fn cancel_outside_valid_states_is_a_no_op() {
        let controller = controller();
        controller.cancel().await;
        assert_eq!(controller.state(), UpdateState::Idle);
    }

    #[tokio::test]
    async fn begin_polling_twice_keeps_checking_state() {
        let controller = controller();
        controller.begin_polling().await;
        assert_eq!(controller.state(), UpdateState::Checking);

        // Second call is ignored rather than restarting anything.
        controller.begin_polling().await;
        assert_eq!(controller.state(), UpdateState::Checking);

        controller.cancel().await;
        assert_eq!(controller.state(), UpdateState::Cancelled);
    }

    #[tokio::test]
    async fn cancel_while_checking_is_terminal() {
        let controller = controller();
        controller.begin_polling().await;
        controller.cancel().await;
        assert_eq!(controller.state(), UpdateState::Cancelled);
        assert!(!controller.can_cancel());

        // Terminal: cancelling again or proceeding changes nothing.
        controller.cancel().await;
        controller.proceed_with_update().await;
        assert_eq!(controller.state(), UpdateState::Cancelled);
    }
}
