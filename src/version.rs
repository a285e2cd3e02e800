//! Release version identifiers.
//!
//! Release versions are dot-separated unsigned numeric components compared
//! field-by-field, numerically, left to right. This is deliberately not
//! semver: update feeds publish plain numeric tuples such as `2.1.0.417`,
//! and a missing trailing component compares as zero (`1.2` equals `1.2.0`).

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::VersionError;

/// An ordered release version such as `1.2.10` or `2.1.0.417`.
///
/// Ordering is element-wise numeric comparison with missing trailing
/// components treated as zero, so `"1.2.10" > "1.2.9"` and
/// `"1.2" == "1.2.0"`.
///
/// # Examples
///
/// ```
/// use app_updater::version::ReleaseVersion;
///
/// let old: ReleaseVersion = "1.2.3".parse().unwrap();
/// let new: ReleaseVersion = "1.2.10".parse().unwrap();
/// assert!(new > old);
///
/// let a: ReleaseVersion = "1.2".parse().unwrap();
/// let b: ReleaseVersion = "1.2.0".parse().unwrap();
/// assert_eq!(a, b);
/// ```
#[derive(Debug, Clone)]
pub struct ReleaseVersion {
    components: Vec<u64>,
}

impl ReleaseVersion {
    /// Parse a dot-separated numeric version string.
    ///
    /// # Errors
    ///
    /// Returns [`VersionError`] if the string is empty or any component is
    /// not an unsigned integer.
    pub fn parse(input: &str) -> Result<Self, VersionError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(VersionError::Empty);
        }

        let components = trimmed
            .split('.')
            .map(|part| {
                part.parse::<u64>().map_err(|_| VersionError::InvalidComponent {
                    component: part.to_string(),
                    input: trimmed.to_string(),
                })
            })
            .collect::<Result<Vec<u64>, VersionError>>()?;

        Ok(Self { components })
    }

    /// The numeric components, left to right.
    pub fn components(&self) -> &[u64] {
        &self.components
    }
}

impl PartialEq for ReleaseVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ReleaseVersion {}

impl PartialOrd for ReleaseVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ReleaseVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.components.len().max(other.components.len());
        for i in 0..len {
            // Missing trailing components compare as zero.
            let a = self.components.get(i).copied().unwrap_or(0);
            let b = other.components.get(i).copied().unwrap_or(0);
            match a.cmp(&b) {
                Ordering::Equal => {}
                ord => return ord,
            }
        }
        Ordering::Equal
    }
}

impl fmt::Display for ReleaseVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for component in &self.components {
            if !first {
                write!(f, ".")?;
            }
            write!(f, "{component}")?;
            first = false;
        }
        Ok(())
    }
}

impl FromStr for ReleaseVersion {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for ReleaseVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ReleaseVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(D::Error::custom)
    }
}
