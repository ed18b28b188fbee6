//! Module versions and version ranges.
//!
//! Text grammar: `MAJOR.MINOR.PATCH` optionally followed by `-SNAPSHOT` or
//! `-<alphanumeric suffix>`. A release orders above every pre-release of the
//! same numeric triple, and `SNAPSHOT` orders below every other suffix.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

const SNAPSHOT: &str = "SNAPSHOT";

/// Pre-release tag of a [`Version`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PreRelease {
    /// The distinguished development tag.
    Snapshot,
    /// Any other alphanumeric tag.
    Tag(String),
}

impl Ord for PreRelease {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Snapshot, Self::Snapshot) => Ordering::Equal,
            (Self::Snapshot, Self::Tag(_)) => Ordering::Less,
            (Self::Tag(_), Self::Snapshot) => Ordering::Greater,
            (Self::Tag(a), Self::Tag(b)) => a.cmp(b),
        }
    }
}

impl PartialOrd for PreRelease {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for PreRelease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Snapshot => f.write_str(SNAPSHOT),
            Self::Tag(tag) => f.write_str(tag),
        }
    }
}

/// A module version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version {
    major: u32,
    minor: u32,
    patch: u32,
    pre_release: Option<PreRelease>,
}

impl Version {
    /// Create a release version.
    pub fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
            pre_release: None,
        }
    }

    /// Create the `-SNAPSHOT` pre-release of a numeric triple.
    pub fn snapshot(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            pre_release: Some(PreRelease::Snapshot),
            ..Self::new(major, minor, patch)
        }
    }

    /// Parse a version string.
    pub fn parse(text: &str) -> Result<Self> {
        let invalid = || Error::parse(format!("invalid version '{}'", text));

        let (numbers, suffix) = match text.split_once('-') {
            Some((numbers, suffix)) => (numbers, Some(suffix)),
            None => (text, None),
        };

        let mut parts = numbers.split('.');
        let mut component = || -> Result<u32> {
            let part = parts.next().ok_or_else(invalid)?;
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid());
            }
            part.parse::<u32>().map_err(|_| invalid())
        };
        let major = component()?;
        let minor = component()?;
        let patch = component()?;
        if parts.next().is_some() {
            return Err(invalid());
        }

        let pre_release = match suffix {
            None => None,
            Some(tag) if tag.eq_ignore_ascii_case(SNAPSHOT) => Some(PreRelease::Snapshot),
            Some(tag) if !tag.is_empty() && tag.bytes().all(|b| b.is_ascii_alphanumeric()) => {
                Some(PreRelease::Tag(tag.to_string()))
            }
            Some(_) => return Err(invalid()),
        };

        Ok(Self {
            major,
            minor,
            patch,
            pre_release,
        })
    }

    pub fn major(&self) -> u32 {
        self.major
    }

    pub fn minor(&self) -> u32 {
        self.minor
    }

    pub fn patch(&self) -> u32 {
        self.patch
    }

    pub fn pre_release(&self) -> Option<&PreRelease> {
        self.pre_release.as_ref()
    }

    pub fn is_snapshot(&self) -> bool {
        matches!(self.pre_release, Some(PreRelease::Snapshot))
    }

    /// The release with the same numeric triple.
    pub fn release(&self) -> Self {
        Self::new(self.major, self.minor, self.patch)
    }

    /// `None` once a component is already `u32::MAX`; likewise for
    /// [`next_minor`](Self::next_minor) and [`next_major`](Self::next_major).
    pub fn next_patch(&self) -> Option<Self> {
        let patch = self.patch.checked_add(1)?;
        Some(Self::new(self.major, self.minor, patch))
    }

    pub fn next_minor(&self) -> Option<Self> {
        let minor = self.minor.checked_add(1)?;
        Some(Self::new(self.major, minor, 0))
    }

    pub fn next_major(&self) -> Option<Self> {
        let major = self.major.checked_add(1)?;
        Some(Self::new(major, 0, 0))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.major
            .cmp(&other.major)
            .then(self.minor.cmp(&other.minor))
            .then(self.patch.cmp(&other.patch))
            .then_with(|| match (&self.pre_release, &other.pre_release) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Greater,
                (Some(_), None) => Ordering::Less,
                (Some(a), Some(b)) => a.cmp(b),
            })
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(pre) = &self.pre_release {
            write!(f, "-{}", pre)?;
        }
        Ok(())
    }
}

impl FromStr for Version {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Version {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Version> for String {
    fn from(version: Version) -> Self {
        version.to_string()
    }
}

/// A half-open range of versions, `[min, max)`. Either bound may be absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VersionRange {
    pub min: Option<Version>,
    pub max: Option<Version>,
}

impl VersionRange {
    /// The range that accepts every version.
    pub fn any() -> Self {
        Self::default()
    }

    pub fn new(min: Option<Version>, max: Option<Version>) -> Self {
        Self { min, max }
    }

    /// Versions from `min` up to (not including) the next major release.
    /// Unbounded above when `min` is already on the last major.
    pub fn compatible_with(min: Version) -> Self {
        let max = min.next_major();
        Self::new(Some(min), max)
    }

    pub fn contains(&self, version: &Version) -> bool {
        if let Some(min) = &self.min {
            if version < min {
                return false;
            }
        }
        if let Some(max) = &self.max {
            if version >= max {
                return false;
            }
        }
        true
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.min, &self.max) {
            (None, None) => f.write_str("*"),
            (Some(min), None) => write!(f, ">={}", min),
            (None, Some(max)) => write!(f, "<{}", max),
            (Some(min), Some(max)) => write!(f, ">={}, <{}", min, max),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn v(text: &str) -> Version {
        Version::parse(text).unwrap()
    }

    #[test]
    fn test_total_order() {
        assert!(v("1.2.3") < v("1.2.4"));
        assert!(v("1.2.4") < v("1.3.0"));
        assert!(v("1.3.0") < v("2.0.0"));
        assert!(v("1.2.3-SNAPSHOT") < v("1.2.3"));
        assert!(v("1.2.2") < v("1.2.3-SNAPSHOT"));
        assert!(v("1.2.3-SNAPSHOT") < v("1.2.3-alpha"));
        assert!(v("1.2.3-alpha") < v("1.2.3-beta"));
        assert!(v("1.2.3-beta") < v("1.2.3"));
        assert!(v("1.10.0") > v("1.9.0"));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for bad in [
            "", "1", "1.2", "1.2.3.4", "a.b.c", "1.2.x", "-1.2.3", "+1.2.3", "1.2.3-",
            "1.2.3-al pha", "1.2.3-rc.1", "1..3", "99999999999.0.0",
        ] {
            assert!(Version::parse(bad).is_err(), "'{}' should not parse", bad);
        }
    }

    #[test]
    fn test_parse_normalizes() {
        assert_eq!(v("01.002.3").to_string(), "1.2.3");
        assert_eq!(v("1.0.0-snapshot").to_string(), "1.0.0-SNAPSHOT");
        assert!(v("1.0.0-Snapshot").is_snapshot());
        assert_eq!(v("2.1.0-rc1").pre_release(), Some(&PreRelease::Tag("rc1".into())));
    }

    #[test]
    fn test_next_versions() {
        let base = v("1.2.3-SNAPSHOT");
        assert_eq!(base.next_patch(), Some(v("1.2.4")));
        assert_eq!(base.next_minor(), Some(v("1.3.0")));
        assert_eq!(base.next_major(), Some(v("2.0.0")));
        assert_eq!(base.release(), v("1.2.3"));
    }

    #[test]
    fn test_next_versions_at_component_limit() {
        let top = v("4294967295.4294967295.4294967295");
        assert_eq!(top.next_patch(), None);
        assert_eq!(top.next_minor(), None);
        assert_eq!(top.next_major(), None);

        assert_eq!(v("4294967295.0.0").next_minor(), Some(v("4294967295.1.0")));
        assert_eq!(v("1.4294967295.7").next_major(), Some(v("2.0.0")));

        let last = VersionRange::compatible_with(v("4294967295.0.0"));
        assert_eq!(last.max, None);
        assert!(last.contains(&v("4294967295.9.9")));
        assert!(!last.contains(&v("4294967294.9.9")));
    }

    #[test]
    fn test_range_bounds() {
        let range = VersionRange::new(Some(v("1.0.0")), Some(v("2.0.0")));
        assert!(range.contains(&v("1.0.0")));
        assert!(range.contains(&v("1.9.9")));
        assert!(!range.contains(&v("2.0.0")));
        assert!(!range.contains(&v("1.0.0-SNAPSHOT")));
        assert!(range.contains(&v("2.0.0-SNAPSHOT")));
        assert!(VersionRange::any().contains(&v("0.0.1")));
        assert_eq!(range.to_string(), ">=1.0.0, <2.0.0");
        assert_eq!(VersionRange::compatible_with(v("1.4.0")), range_of("1.4.0", "2.0.0"));
    }

    fn range_of(min: &str, max: &str) -> VersionRange {
        VersionRange::new(Some(v(min)), Some(v(max)))
    }

    fn version_text() -> impl Strategy<Value = String> {
        (
            0u32..1000,
            0u32..1000,
            0u32..1000,
            prop_oneof![
                Just(String::new()),
                Just("-SNAPSHOT".to_string()),
                "[a-zA-Z0-9]{1,8}".prop_map(|s| format!("-{}", s)),
            ],
        )
            .prop_map(|(major, minor, patch, suffix)| format!("{}.{}.{}{}", major, minor, patch, suffix))
    }

    proptest! {
        #[test]
        fn prop_round_trip(text in version_text()) {
            let parsed = Version::parse(&text).unwrap();
            let rendered = parsed.to_string();
            let reparsed = Version::parse(&rendered).unwrap();
            prop_assert_eq!(&parsed, &reparsed);
            prop_assert_eq!(rendered, reparsed.to_string());
        }

        #[test]
        fn prop_order_is_total(a in version_text(), b in version_text()) {
            let a = Version::parse(&a).unwrap();
            let b = Version::parse(&b).unwrap();
            let forward = a.cmp(&b);
            prop_assert_eq!(forward, b.cmp(&a).reverse());
            prop_assert_eq!(forward == Ordering::Equal, a == b);
        }
    }
}
