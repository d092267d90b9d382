//! Release version parsing and ordering.
//!
//! Tags look like `v1.4`, `v1.4.2` or `v2.0.0-beta.3`. A missing patch
//! component counts as zero, and a pre-release sorts below the release it
//! leads up to.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::{Result, UpdateError};

/// Pre-release stage. Variants are declared in release order, so the
/// derived ordering compares the stage first and the number second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PreRelease {
    /// `alpha[.N]`
    Alpha(u32),
    /// `beta[.N]`
    Beta(u32),
    /// `rc[.N]`
    ReleaseCandidate(u32),
}

impl PreRelease {
    /// Parse the text after the `-` of a tag. Unknown labels yield `None`.
    fn parse(label: &str) -> Option<Self> {
        let label = label.to_lowercase();
        let (stage, number) = match label.split_once('.') {
            Some((stage, number)) => (stage, number.parse().ok()?),
            None => (label.as_str(), 0),
        };

        match stage {
            "alpha" => Some(Self::Alpha(number)),
            "beta" => Some(Self::Beta(number)),
            "rc" => Some(Self::ReleaseCandidate(number)),
            _ => None,
        }
    }
}

impl fmt::Display for PreRelease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Alpha(n) => write!(f, "alpha.{n}"),
            Self::Beta(n) => write!(f, "beta.{n}"),
            Self::ReleaseCandidate(n) => write!(f, "rc.{n}"),
        }
    }
}

/// A release version.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Version {
    /// Major component.
    pub major: u32,
    /// Minor component.
    pub minor: u32,
    /// Patch component, zero when the tag has only two components.
    pub patch: u32,
    /// Pre-release stage, if any.
    pub pre_release: Option<PreRelease>,
}

impl Version {
    /// A stable version.
    #[must_use]
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
            pre_release: None,
        }
    }

    /// A pre-release version.
    #[must_use]
    pub const fn with_pre_release(
        major: u32,
        minor: u32,
        patch: u32,
        pre_release: PreRelease,
    ) -> Self {
        Self {
            major,
            minor,
            patch,
            pre_release: Some(pre_release),
        }
    }

    /// Version this crate was built as.
    #[must_use]
    pub fn current() -> Self {
        env!("CARGO_PKG_VERSION").parse().unwrap_or_default()
    }

    /// Parse a release tag such as `v1.4.2`.
    pub fn from_tag(tag: &str) -> Result<Self> {
        tag.parse()
    }

    /// Whether this is an alpha, beta or rc.
    #[must_use]
    pub fn is_pre_release(&self) -> bool {
        self.pre_release.is_some()
    }

    /// Whether this is a final release.
    #[must_use]
    pub fn is_stable(&self) -> bool {
        self.pre_release.is_none()
    }

    /// Strictly newer than `other`.
    #[must_use]
    pub fn is_newer_than(&self, other: &Self) -> bool {
        self > other
    }

    fn numbers(&self) -> (u32, u32, u32) {
        (self.major, self.minor, self.patch)
    }
}

impl FromStr for Version {
    type Err = UpdateError;

    fn from_str(s: &str) -> Result<Self> {
        let text = s.trim();
        let text = text.strip_prefix('v').unwrap_or(text);
        let invalid = || UpdateError::InvalidVersion(s.trim().to_string());

        let (numbers, pre_release) = match text.split_once('-') {
            Some((numbers, label)) => (numbers, PreRelease::parse(label)),
            None => (text, None),
        };

        let mut parts = numbers.split('.').map(str::parse::<u32>);
        let (Some(Ok(major)), Some(Ok(minor))) = (parts.next(), parts.next()) else {
            return Err(invalid());
        };
        let patch = match parts.next() {
            None => 0,
            Some(Ok(patch)) => patch,
            Some(Err(_)) => return Err(invalid()),
        };
        if parts.next().is_some() {
            return Err(invalid());
        }

        Ok(Self {
            major,
            minor,
            patch,
            pre_release,
        })
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        match &self.pre_release {
            Some(pre) => write!(f, "-{pre}"),
            None => Ok(()),
        }
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.numbers()
            .cmp(&other.numbers())
            .then_with(|| match (&self.pre_release, &other.pre_release) {
                (None, None) => Ordering::Equal,
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (Some(a), Some(b)) => a.cmp(b),
            })
    }
}
