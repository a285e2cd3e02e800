//! Self-update client for deployed applications.
//!
//! This crate periodically checks a remote endpoint for a newer release,
//! downloads the installer package, cryptographically verifies that the
//! package is trustworthy, and only then launches it, reporting progress and
//! failures to any number of observers along the way. It contains no
//! presentation layer: hosts subscribe to events and render prompts and
//! progress however they like.
//!
//! # Architecture Overview
//!
//! Five components cooperate, leaves first:
//!
//! - [`manifest::ReleaseManifest`]: immutable metadata describing an
//!   available release, parsed from a small XML document.
//! - [`trust::TrustVerifier`]: decides whether a downloaded installer is safe
//!   to execute under the active [`trust::TrustPolicy`], using platform
//!   signature primitives supplied through [`trust::SignatureProvider`].
//! - [`download::Downloader`]: streams the package to disk in fixed chunks
//!   with live progress and cooperative cancellation.
//! - [`poller::UpdatePoller`]: background loop that fetches and parses the
//!   manifest on an interval and raises "update available" on a version
//!   increase.
//! - [`controller::UpdateController`]: orchestrates the whole cycle and owns
//!   its state machine.
//!
//! # Update Cycle
//!
//! ```text
//! Idle -- begin_polling --> Checking -- newer version --> Available
//!                              |                             |
//!                           cancel                 proceed_with_update
//!                              |                             v
//!                              v                        Downloading -- cancel --> Cancelled
//! Failed <-- download / verification error ---------------- |
//!                                                           v
//!                                            Verifying --> Launching --> Complete
//! ```
//!
//! `Complete`, `Cancelled`, and `Failed` are terminal for a cycle; running
//! another requires a fresh controller.
//!
//! # Trust
//!
//! Two policies are supported. Pinning
//! ([`trust::TrustPolicy::PinnedKey`]) binds updates to a specific public key
//! fingerprint and is independent of the running binary's own signature,
//! which is the stronger guarantee. Same-signer matching
//! ([`trust::TrustPolicy::MatchRunningApplication`]) accepts an installer
//! signed by the same identity as the running binary and exists for
//! deployments without a pre-distributed pin. Under either policy an
//! unsigned installer is rejected outright and the embedded signature must
//! validate cryptographically; a rejected installer is never executed and
//! there is no override path.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use app_updater::{UpdateController, UpdateEvent, UpdaterConfig};
//! # use std::path::Path;
//! # use app_updater::trust::{SignatureProvider, SignerIdentity};
//! # struct OsProvider;
//! # impl SignatureProvider for OsProvider {
//! #     fn extract_signer_identity(&self, _: &Path) -> Option<SignerIdentity> { None }
//! #     fn verify_embedded_signature(&self, _: &Path) -> bool { false }
//! # }
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = UpdaterConfig::new("https://releases.example.com/manifest.xml");
//! let running_version = env!("CARGO_PKG_VERSION").parse()?;
//! let controller = UpdateController::new(config, running_version, Arc::new(OsProvider))?;
//!
//! let mut events = controller.subscribe();
//! controller.begin_polling().await;
//!
//! while let Ok(event) = events.recv().await {
//!     match event {
//!         UpdateEvent::UpdateAvailable(manifest) => {
//!             println!("{}", manifest.update_label());
//!             controller.proceed_with_update().await;
//!         }
//!         UpdateEvent::DownloadProgress(percent) => println!("{percent}%"),
//!         UpdateEvent::ShutdownRequested => break, // exit so the installer can replace us
//!         _ => {}
//!     }
//! }
//! # Ok(())
//! # }
//! ```

/// Configuration surface: endpoint, poll interval, download directory, and
/// the optional pinned key that selects the trust policy.
pub mod config;
/// The update cycle orchestrator and its state machine.
pub mod controller;
/// Chunked streaming download with progress and cancellation.
pub mod download;
/// Error taxonomy for every stage of the cycle.
pub mod error;
/// Cycle states, observer events, and status snapshots.
pub mod events;
/// Release manifest model and XML wire-format parsing.
pub mod manifest;
/// Background release polling loop.
pub mod poller;
/// Trust policies and installer verification.
pub mod trust;
/// Ordered numeric release versions.
pub mod version;

pub use config::UpdaterConfig;
pub use controller::{InstallerLauncher, ProcessLauncher, UpdateController};
pub use download::{DownloadOutcome, Downloader, ProgressCallback};
pub use error::{DownloadError, FetchError, ManifestError, Untrusted, UpdateError, VersionError};
pub use events::{StatusSnapshot, UpdateEvent, UpdateState};
pub use manifest::ReleaseManifest;
pub use poller::UpdatePoller;
pub use trust::{SignatureProvider, SignerIdentity, TrustPolicy, TrustVerifier};
pub use version::ReleaseVersion;
