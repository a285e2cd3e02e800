//! Error taxonomy for the update cycle.
//!
//! Errors fall into three tiers with different propagation rules:
//!
//! - [`FetchError`]: transient manifest-check failures. Fully absorbed inside
//!   the poller loop (logged, next interval proceeds); they never reach the
//!   controller.
//! - [`DownloadError`] and [`Untrusted`]: fatal to the current cycle. They
//!   surface to the controller as a terminal `Failed` state with the specific
//!   reason attached, and are never retried automatically.
//! - [`UpdateError`]: the controller-level wrapper stored in the status
//!   snapshot and broadcast to observers when a cycle fails.
//!
//! Cancellation is deliberately absent from this module: it is a distinct
//! terminal outcome, not an error (see
//! [`DownloadOutcome`](crate::download::DownloadOutcome)).

use thiserror::Error;

/// Failure to parse a release version string.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VersionError {
    /// The version string was empty.
    #[error("version string is empty")]
    Empty,
    /// A dot-separated component was not an unsigned integer.
    #[error("invalid version component {component:?} in {input:?}")]
    InvalidComponent {
        /// The offending component text.
        component: String,
        /// The full input string.
        input: String,
    },
}

/// Failure to parse a release manifest document.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// The manifest bytes were not valid UTF-8.
    #[error("manifest is not valid UTF-8")]
    Utf8(#[from] std::str::Utf8Error),

    /// The XML document was malformed or had an unexpected shape.
    #[error("malformed manifest XML: {0}")]
    Xml(#[from] quick_xml::DeError),

    /// A required element was missing or empty.
    #[error("manifest is missing required element <{0}>")]
    MissingField(&'static str),

    /// The `Version` element did not parse as a release version.
    #[error("invalid manifest version: {0}")]
    Version(#[from] VersionError),
}

/// Transient failure of a single poll iteration.
///
/// These are logged inside the poller and never propagate; the loop simply
/// waits for the next interval.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The HTTP request failed or returned an error status.
    #[error("manifest fetch failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The response body did not parse as a release manifest.
    #[error(transparent)]
    Manifest(#[from] ManifestError),
}

/// Failure of an installer download.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// The package URL could not be parsed.
    #[error("invalid package URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The package URL has no usable final path segment to name the file.
    #[error("package URL {url:?} has no file name")]
    NoFileName {
        /// The offending URL.
        url: String,
    },

    /// The HTTP request could not be sent or returned an error status.
    #[error("download request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Reading or writing the destination file failed.
    #[error("download I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// The remote side stopped sending before the declared length was reached.
    #[error("download truncated: received {received} of {expected} bytes")]
    Truncated {
        /// Bytes received before the stream ended.
        received: u64,
        /// Bytes declared by the `Content-Length` header.
        expected: u64,
    },
}

/// Reasons a downloaded installer is rejected by trust verification.
///
/// Every variant is fatal to the cycle and unconditionally prevents launch;
/// there is no override path.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Untrusted {
    /// No signer identity could be extracted from the downloaded file.
    #[error("installer is unsigned or its signature container is unreadable")]
    Unsigned,

    /// The installer's public key fingerprint does not match the pinned key.
    #[error("installer key fingerprint {actual:?} does not match pinned fingerprint {expected:?}")]
    PinMismatch {
        /// The configured pinned fingerprint.
        expected: String,
        /// The fingerprint found on the installer (empty if absent).
        actual: String,
    },

    /// The running application itself is unsigned, so same-signer comparison
    /// is meaningless.
    #[error("running application is unsigned; cannot compare signer identities")]
    SelfUnsigned,

    /// Neither subject name nor key fingerprint matched the running
    /// application's signer.
    #[error("installer signer {installer:?} does not match running application signer {running:?}")]
    IdentityMismatch {
        /// Summary of the installer's signer identity.
        installer: String,
        /// Summary of the running application's signer identity.
        running: String,
    },

    /// The embedded signature failed cryptographic validation.
    #[error("installer embedded signature is cryptographically invalid")]
    InvalidSignature,
}

/// Terminal failure of an update cycle, attached to the `Failed` state.
#[derive(Debug, Error)]
pub enum UpdateError {
    /// The installer download failed.
    #[error(transparent)]
    Download(#[from] DownloadError),

    /// The downloaded installer failed trust verification.
    #[error(transparent)]
    Untrusted(#[from] Untrusted),

    /// The verified installer could not be started.
    #[error("failed to launch installer: {0}")]
    Launch(#[source] anyhow::Error),
}
