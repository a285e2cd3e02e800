//! Trust verification for downloaded installers.
//!
//! Before an installer is ever executed it must pass a fixed four-step check:
//!
//! 1. The download must carry an extractable signer identity; an unsigned or
//!    unreadable signature container is rejected outright, regardless of
//!    policy.
//! 2. Under [`TrustPolicy::PinnedKey`], the download's public key fingerprint
//!    must equal the pinned fingerprint (case-insensitive). The running
//!    application's own identity is irrelevant under this policy.
//! 3. Under [`TrustPolicy::MatchRunningApplication`], the running binary must
//!    itself be signed, and the download is accepted only if the subject
//!    names match or the key fingerprints match (case-insensitive; either
//!    alone suffices).
//! 4. Whichever policy accepted the identity, the embedded signature must
//!    still validate cryptographically.
//!
//! Pinning is the stronger policy: it binds updates to a specific key even if
//! the running binary was shipped unsigned or already compromised. Same-signer
//! matching is the fallback for deployments without a pre-distributed pin.
//!
//! The cryptographic primitives themselves live behind
//! [`SignatureProvider`]; this module never parses certificate formats.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::Untrusted;

/// Signer identity extracted from a signed file.
///
/// Either field may be absent depending on what the platform's signature
/// container exposes. A file that yields no identity at all is treated as
/// unsigned.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignerIdentity {
    /// Certificate subject name, e.g. `CN=Example Corp, O=Example Corp`.
    pub subject_name: Option<String>,
    /// Hex fingerprint of the signer's public key.
    pub public_key_fingerprint: Option<String>,
}

impl SignerIdentity {
    /// Short human-readable summary for log lines and error messages.
    pub fn describe(&self) -> String {
        match (&self.subject_name, &self.public_key_fingerprint) {
            (Some(subject), Some(fp)) => format!("{subject} ({fp})"),
            (Some(subject), None) => subject.clone(),
            (None, Some(fp)) => format!("key {fp}"),
            (None, None) => "<unknown signer>".to_string(),
        }
    }
}

/// The rule by which a downloaded installer's signer is judged acceptable.
///
/// Exactly one policy is active per controller instance and it never changes
/// mid-cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrustPolicy {
    /// Require the installer's public key fingerprint to equal this value
    /// (case-insensitive).
    PinnedKey(String),
    /// Require the installer to be signed by the same signer as the currently
    /// running binary (subject name or key fingerprint match).
    MatchRunningApplication,
}

/// Platform signature primitives, supplied by the host.
///
/// Implementations encapsulate all OS trust-store and cryptographic chain
/// logic (Authenticode, codesign, and so on). Extraction failures are
/// reported as `None` rather than errors: a file whose signature container
/// cannot be read is simply unsigned as far as the updater is concerned.
pub trait SignatureProvider: Send + Sync {
    /// Extract the signer identity from the signed file at `path`, or `None`
    /// if the file is unsigned or its signature container is unreadable.
    fn extract_signer_identity(&self, path: &Path) -> Option<SignerIdentity>;

    /// Cryptographically validate the embedded signature of the file at
    /// `path`.
    fn verify_embedded_signature(&self, path: &Path) -> bool;
}

/// Decides whether a downloaded installer is safe to execute.
///
/// Stateless per invocation: [`verify`](TrustVerifier::verify) takes the
/// installer path and returns a result without retaining any reference to it.
pub struct TrustVerifier {
    policy: TrustPolicy,
    provider: Arc<dyn SignatureProvider>,
    running_binary: PathBuf,
}

impl TrustVerifier {
    /// Create a verifier for the currently executing binary.
    ///
    /// # Errors
    ///
    /// Returns an error if the path of the running executable cannot be
    /// determined.
    pub fn new(policy: TrustPolicy, provider: Arc<dyn SignatureProvider>) -> std::io::Result<Self> {
        let running_binary = std::env::current_exe()?;
        Ok(Self {
            policy,
            provider,
            running_binary,
        })
    }

    /// Override the path treated as the running binary.
    ///
    /// Used by tests and by hosts that relaunch through a stub executable.
    #[must_use]
    pub fn with_running_binary(mut self, path: impl Into<PathBuf>) -> Self {
        self.running_binary = path.into();
        self
    }

    /// The active trust policy.
    pub fn policy(&self) -> &TrustPolicy {
        &self.policy
    }

    /// Run the full verification algorithm against a downloaded installer.
    ///
    /// # Errors
    ///
    /// Returns the specific [`Untrusted`] reason on any failed step. Callers
    /// must treat every error as fatal: a rejected installer is never
    /// executed.
    pub fn verify(&self, installer: &Path) -> Result<(), Untrusted> {
        debug!(path = %installer.display(), "extracting signer identity from installer");
        let Some(identity) = self.provider.extract_signer_identity(installer) else {
            warn!(path = %installer.display(), "installer is unsigned");
            return Err(Untrusted::Unsigned);
        };

        match &self.policy {
            TrustPolicy::PinnedKey(expected) => {
                let actual = identity.public_key_fingerprint.clone().unwrap_or_default();
                if !actual.eq_ignore_ascii_case(expected) {
                    warn!(
                        expected = %expected,
                        actual = %actual,
                        "installer key fingerprint does not match pinned key"
                    );
                    return Err(Untrusted::PinMismatch {
                        expected: expected.clone(),
                        actual,
                    });
                }
                info!("installer key fingerprint matches pinned key");
            }
            TrustPolicy::MatchRunningApplication => {
                debug!(
                    path = %self.running_binary.display(),
                    "extracting signer identity from running application"
                );
                let Some(running) = self.provider.extract_signer_identity(&self.running_binary)
                else {
                    warn!("running application is unsigned; rejecting same-signer check");
                    return Err(Untrusted::SelfUnsigned);
                };

                if identities_match(&identity, &running) {
                    info!("installer signer matches running application signer");
                } else {
                    warn!(
                        installer = %identity.describe(),
                        running = %running.describe(),
                        "installer signer does not match running application"
                    );
                    return Err(Untrusted::IdentityMismatch {
                        installer: identity.describe(),
                        running: running.describe(),
                    });
                }
            }
        }

        // Identity acceptance is not enough: the signature itself must be
        // cryptographically valid for this exact file.
        debug!(path = %installer.display(), "validating embedded signature");
        if !self.provider.verify_embedded_signature(installer) {
            warn!(path = %installer.display(), "embedded signature failed validation");
            return Err(Untrusted::InvalidSignature);
        }

        info!(path = %installer.display(), "installer passed trust verification");
        Ok(())
    }
}

/// Same-signer acceptance: subject names match or key fingerprints match,
/// each compared case-insensitively. Either condition alone suffices.
fn identities_match(installer: &SignerIdentity, running: &SignerIdentity) -> bool {
    let subject_match = match (&installer.subject_name, &running.subject_name) {
        (Some(a), Some(b)) => !a.is_empty() && a.eq_ignore_ascii_case(b),
        _ => false,
    };
    let key_match = match (&installer.public_key_fingerprint, &running.public_key_fingerprint) {
        (Some(a), Some(b)) => !a.is_empty() && a.eq_ignore_ascii_case(b),
        _ => false,
    };
    subject_match || key_match
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    /// Scripted provider: identities keyed by file name, plus a switch for
    /// the cryptographic check.
    struct ScriptedProvider {
        identities: HashMap<String, SignerIdentity>,
        signature_valid: bool,
    }

    impl ScriptedProvider {
        fn new(signature_valid: bool) -> Self {
            Self {
                identities: HashMap::new(),
                signature_valid,
            }
        }

        fn with_identity(
            mut self,
            file_name: &str,
            subject: Option<&str>,
            fingerprint: Option<&str>,
        ) -> Self {
            self.identities.insert(
                file_name.to_string(),
                SignerIdentity {
                    subject_name: subject.map(str::to_string),
                    public_key_fingerprint: fingerprint.map(str::to_string),
                },
            );
            self
        }
    }

    impl SignatureProvider for ScriptedProvider {
        fn extract_signer_identity(&self, path: &Path) -> Option<SignerIdentity> {
            let name = path.file_name()?.to_str()?;
            self.identities.get(name).cloned()
        }

        fn verify_embedded_signature(&self, _path: &Path) -> bool {
            self.signature_valid
        }
    }

    fn verifier(policy: TrustPolicy, provider: ScriptedProvider) -> TrustVerifier {
        TrustVerifier {
            policy,
            provider: Arc::new(provider),
            running_binary: PathBuf::from("/app/running.exe"),
        }
    }

    const INSTALLER: &str = "/tmp/installer.msi";

    #[test]
    fn unsigned_installer_rejected_under_pinned_key() {
        let v = verifier(
            TrustPolicy::PinnedKey("ABCD".into()),
            ScriptedProvider::new(true),
        );
        assert_eq!(v.verify(Path::new(INSTALLER)), Err(Untrusted::Unsigned));
    }

    #[test]
    fn unsigned_installer_rejected_under_same_signer() {
        let provider = ScriptedProvider::new(true).with_identity(
            "running.exe",
            Some("Contoso"),
            Some("X"),
        );
        let v = verifier(TrustPolicy::MatchRunningApplication, provider);
        assert_eq!(v.verify(Path::new(INSTALLER)), Err(Untrusted::Unsigned));
    }

    #[test]
    fn pin_match_is_case_insensitive() {
        let provider =
            ScriptedProvider::new(true).with_identity("installer.msi", None, Some("abcd"));
        let v = verifier(TrustPolicy::PinnedKey("ABCD".into()), provider);
        assert_eq!(v.verify(Path::new(INSTALLER)), Ok(()));
    }

    #[test]
    fn pin_match_with_invalid_signature_still_fails() {
        let provider =
            ScriptedProvider::new(false).with_identity("installer.msi", None, Some("abcd"));
        let v = verifier(TrustPolicy::PinnedKey("ABCD".into()), provider);
        assert_eq!(v.verify(Path::new(INSTALLER)), Err(Untrusted::InvalidSignature));
    }

    #[test]
    fn pin_mismatch_rejected() {
        let provider =
            ScriptedProvider::new(true).with_identity("installer.msi", None, Some("beef"));
        let v = verifier(TrustPolicy::PinnedKey("ABCD".into()), provider);
        assert!(matches!(
            v.verify(Path::new(INSTALLER)),
            Err(Untrusted::PinMismatch { .. })
        ));
    }

    #[test]
    fn pin_policy_with_missing_fingerprint_is_a_mismatch() {
        let provider =
            ScriptedProvider::new(true).with_identity("installer.msi", Some("Contoso"), None);
        let v = verifier(TrustPolicy::PinnedKey("ABCD".into()), provider);
        assert!(matches!(
            v.verify(Path::new(INSTALLER)),
            Err(Untrusted::PinMismatch { .. })
        ));
    }

    #[test]
    fn subject_match_alone_suffices() {
        // Subjects agree modulo case, fingerprints differ.
        let provider = ScriptedProvider::new(true)
            .with_identity("installer.msi", Some("Contoso"), Some("X"))
            .with_identity("running.exe", Some("contoso"), Some("Y"));
        let v = verifier(TrustPolicy::MatchRunningApplication, provider);
        assert_eq!(v.verify(Path::new(INSTALLER)), Ok(()));
    }

    #[test]
    fn fingerprint_match_alone_suffices() {
        let provider = ScriptedProvider::new(true)
            .with_identity("installer.msi", Some("New Corp"), Some("aa:bb"))
            .with_identity("running.exe", Some("Old Corp"), Some("AA:BB"));
        let v = verifier(TrustPolicy::MatchRunningApplication, provider);
        assert_eq!(v.verify(Path::new(INSTALLER)), Ok(()));
    }

    #[test]
    fn neither_matching_is_rejected() {
        let provider = ScriptedProvider::new(true)
            .with_identity("installer.msi", Some("Mallory"), Some("X"))
            .with_identity("running.exe", Some("Contoso"), Some("Y"));
        let v = verifier(TrustPolicy::MatchRunningApplication, provider);
        assert!(matches!(
            v.verify(Path::new(INSTALLER)),
            Err(Untrusted::IdentityMismatch { .. })
        ));
    }

    #[test]
    fn unsigned_running_application_rejected() {
        let provider = ScriptedProvider::new(true).with_identity(
            "installer.msi",
            Some("Contoso"),
            Some("X"),
        );
        let v = verifier(TrustPolicy::MatchRunningApplication, provider);
        assert_eq!(v.verify(Path::new(INSTALLER)), Err(Untrusted::SelfUnsigned));
    }

    #[test]
    fn same_signer_with_invalid_signature_still_fails() {
        let provider = ScriptedProvider::new(false)
            .with_identity("installer.msi", Some("Contoso"), Some("X"))
            .with_identity("running.exe", Some("Contoso"), Some("X"));
        let v = verifier(TrustPolicy::MatchRunningApplication, provider);
        assert_eq!(v.verify(Path::new(INSTALLER)), Err(Untrusted::InvalidSignature));
    }

    #[test]
    fn empty_subjects_never_match() {
        let provider = ScriptedProvider::new(true)
            .with_identity("installer.msi", Some(""), Some("X"))
            .with_identity("running.exe", Some(""), Some("Y"));
        let v = verifier(TrustPolicy::MatchRunningApplication, provider);
        assert!(matches!(
            v.verify(Path::new(INSTALLER)),
            Err(Untrusted::IdentityMismatch { .. })
        ));
    }
}
