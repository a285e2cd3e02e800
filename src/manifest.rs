//! Release manifest model and wire-format parsing.
//!
//! The update endpoint serves a small XML document describing the latest
//! available release:
//!
//! ```xml
//! <ReleaseManifest>
//!   <Name>Example App</Name>
//!   <Version>2.1.0</Version>
//!   <PackageUrl>https://releases.example.com/example-2.1.0.msi</PackageUrl>
//!   <ReleaseNotesUrl>https://releases.example.com/notes/2.1.0</ReleaseNotesUrl>
//! </ReleaseManifest>
//! ```
//!
//! All four elements are required; unknown elements are ignored. A parsed
//! [`ReleaseManifest`] is immutable and is replaced wholesale on each
//! successful poll, so readers never observe a partially updated value.

use serde::{Deserialize, Serialize};

use crate::error::ManifestError;
use crate::version::ReleaseVersion;

/// Immutable metadata describing an available release.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ReleaseManifest {
    /// Human-readable product name.
    pub name: String,
    /// Version of the available release.
    pub version: ReleaseVersion,
    /// URL of the installer package.
    pub package_url: String,
    /// URL of the release notes for display to the user.
    pub release_notes_url: String,
}

/// Raw deserialization target; field presence is validated separately so a
/// missing element reports which one, not a generic serde error.
#[derive(Debug, Deserialize)]
#[serde(rename = "ReleaseManifest")]
struct RawManifest {
    #[serde(rename = "Name", default)]
    name: Option<String>,
    #[serde(rename = "Version", default)]
    version: Option<String>,
    #[serde(rename = "PackageUrl", default)]
    package_url: Option<String>,
    #[serde(rename = "ReleaseNotesUrl", default)]
    release_notes_url: Option<String>,
}

impl ReleaseManifest {
    /// Parse a manifest from raw response bytes.
    ///
    /// Missing and empty required elements are rejected; a blank
    /// `PackageUrl` is useless downstream so it is treated the same as an
    /// absent one.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError`] for invalid UTF-8, malformed XML, a missing
    /// or empty required element, or an unparseable version.
    pub fn parse(bytes: &[u8]) -> Result<Self, ManifestError> {
        let text = std::str::from_utf8(bytes)?;
        let raw: RawManifest = quick_xml::de::from_str(text)?;

        let name = required(raw.name, "Name")?;
        let version_text = required(raw.version, "Version")?;
        let package_url = required(raw.package_url, "PackageUrl")?;
        let release_notes_url = required(raw.release_notes_url, "ReleaseNotesUrl")?;

        Ok(Self {
            name,
            version: ReleaseVersion::parse(&version_text)?,
            package_url,
            release_notes_url,
        })
    }

    /// Prompt text a host can show when this release becomes available.
    pub fn update_label(&self) -> String {
        format!(
            "A new version of {}, {}, is now available. Would you like to download it?",
            self.name, self.version
        )
    }
}

fn required(value: Option<String>, element: &'static str) -> Result<String, ManifestError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ManifestError::MissingField(element)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"<ReleaseManifest>
        <Name>Example App</Name>
        <Version>2.1.0</Version>
        <PackageUrl>https://releases.example.com/example-2.1.0.msi</PackageUrl>
        <ReleaseNotesUrl>https://releases.example.com/notes/2.1.0</ReleaseNotesUrl>
    </ReleaseManifest>"#;

    #[test]
    fn parses_complete_manifest() {
        let manifest = ReleaseManifest::parse(FULL.as_bytes()).unwrap();
        assert_eq!(manifest.name, "Example App");
        assert_eq!(manifest.version, "2.1.0".parse().unwrap());
        assert_eq!(manifest.package_url, "https://releases.example.com/example-2.1.0.msi");
        assert_eq!(manifest.release_notes_url, "https://releases.example.com/notes/2.1.0");
    }

    #[test]
    fn ignores_unknown_elements() {
        let xml = r#"<ReleaseManifest>
            <Name>Example App</Name>
            <Version>2.1.0</Version>
            <Checksum>abc123</Checksum>
            <PackageUrl>https://releases.example.com/pkg.msi</PackageUrl>
            <ReleaseNotesUrl>https://releases.example.com/notes</ReleaseNotesUrl>
            <Mirror>https://mirror.example.com/pkg.msi</Mirror>
        </ReleaseManifest>"#;

        let manifest = ReleaseManifest::parse(xml.as_bytes()).unwrap();
        assert_eq!(manifest.name, "Example App");
    }

    #[test]
    fn missing_version_is_an_error() {
        let xml = r#"<ReleaseManifest>
            <Name>Example App</Name>
            <PackageUrl>https://releases.example.com/pkg.msi</PackageUrl>
            <ReleaseNotesUrl>https://releases.example.com/notes</ReleaseNotesUrl>
        </ReleaseManifest>"#;

        assert!(matches!(
            ReleaseManifest::parse(xml.as_bytes()),
            Err(ManifestError::MissingField("Version"))
        ));
    }

    #[test]
    fn empty_package_url_is_an_error() {
        let xml = r#"<ReleaseManifest>
            <Name>Example App</Name>
            <Version>2.1.0</Version>
            <PackageUrl></PackageUrl>
            <ReleaseNotesUrl>https://releases.example.com/notes</ReleaseNotesUrl>
        </ReleaseManifest>"#;

        assert!(matches!(
            ReleaseManifest::parse(xml.as_bytes()),
            Err(ManifestError::MissingField("PackageUrl"))
        ));
    }

    #[test]
    fn malformed_xml_is_an_error() {
        assert!(matches!(
            ReleaseManifest::parse(b"not xml at all"),
            Err(ManifestError::Xml(_))
        ));
    }

    #[test]
    fn invalid_version_is_an_error() {
        let xml = r#"<ReleaseManifest>
            <Name>Example App</Name>
            <Version>latest</Version>
            <PackageUrl>https://releases.example.com/pkg.msi</PackageUrl>
            <ReleaseNotesUrl>https://releases.example.com/notes</ReleaseNotesUrl>
        </ReleaseManifest>"#;

        assert!(matches!(
            ReleaseManifest::parse(xml.as_bytes()),
            Err(ManifestError::Version(_))
        ));
    }

    #[test]
    fn update_label_names_product_and_version() {
        let manifest = ReleaseManifest::parse(FULL.as_bytes()).unwrap();
        let label = manifest.update_label();
        assert!(label.contains("Example App"));
        assert!(label.contains("2.1.0"));
    }
}
