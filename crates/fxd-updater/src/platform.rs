//! Platform detection.
//!
//! Two separate questions are answered here:
//!
//! - which release assets fit this machine ([`TargetPlatform`]), and
//! - which replacement script dialect the host understands ([`PlatformFamily`]).
//!
//! [`BuildKind`] decides whether the running executable is a packaged build
//! that may replace itself at all.

use std::fmt;
use std::path::{Component, Path};
use std::str::FromStr;

use crate::error::{Result, UpdateError};

/// Operating system flavour used to filter release assets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetPlatform {
    /// Microsoft Windows.
    Windows,
    /// Linux desktop.
    Linux,
    /// macOS / Darwin.
    MacOs,
    /// Termux on Android.
    Termux,
    /// Anything else.
    Unknown,
}

impl TargetPlatform {
    /// Detect the current platform.
    #[must_use]
    pub fn current() -> Self {
        let prefix = std::env::var("PREFIX").ok();
        Self::detect(prefix.as_deref(), std::env::consts::OS)
    }

    /// Classify from a `PREFIX` value and an OS name as reported by
    /// `std::env::consts::OS`.
    #[must_use]
    pub fn detect(prefix: Option<&str>, os: &str) -> Self {
        if prefix.is_some_and(|p| p.contains("com.termux")) {
            return Self::Termux;
        }
        match os {
            "windows" => Self::Windows,
            "macos" => Self::MacOs,
            "linux" => Self::Linux,
            _ => Self::Unknown,
        }
    }

    /// Script family able to run on this platform, if any.
    #[must_use]
    pub const fn family(&self) -> Option<PlatformFamily> {
        match self {
            Self::Windows => Some(PlatformFamily::Windows),
            Self::Linux | Self::MacOs | Self::Termux => Some(PlatformFamily::Posix),
            Self::Unknown => None,
        }
    }

    /// Short lowercase identifier.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Windows => "windows",
            Self::Linux => "linux",
            Self::MacOs => "macos",
            Self::Termux => "termux",
            Self::Unknown => "unknown",
        }
    }

    /// Get a human-readable name.
    #[must_use]
    pub const fn display_name(&self) -> &'static str {
        match self {
            Self::Windows => "Windows",
            Self::Linux => "Linux",
            Self::MacOs => "macOS",
            Self::Termux => "Termux",
            Self::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for TargetPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetPlatform {
    type Err = UpdateError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "windows" | "win32" => Ok(Self::Windows),
            "linux" => Ok(Self::Linux),
            "macos" | "darwin" => Ok(Self::MacOs),
            "termux" => Ok(Self::Termux),
            other => Err(UpdateError::NotSupportedEnvironment(format!(
                "unknown platform '{other}'"
            ))),
        }
    }
}

/// Host operating system family, which selects the script dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformFamily {
    /// Windows: batch script run by `cmd.exe`.
    Windows,
    /// Linux and macOS: POSIX shell script.
    Posix,
}

impl PlatformFamily {
    /// Family of the host this binary was compiled for.
    pub fn current() -> Result<Self> {
        if cfg!(windows) {
            Ok(Self::Windows)
        } else if cfg!(any(target_os = "linux", target_os = "macos", target_os = "android")) {
            Ok(Self::Posix)
        } else {
            Err(UpdateError::NotSupportedEnvironment(format!(
                "unsupported operating system '{}'",
                std::env::consts::OS
            )))
        }
    }
}

/// How the running executable was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildKind {
    /// A shipped, self-contained executable.
    Packaged,
    /// A binary running out of a Cargo target directory.
    Development,
}

impl BuildKind {
    /// Classify the currently running executable.
    #[must_use]
    pub fn current() -> Self {
        match std::env::current_exe() {
            Ok(exe) => Self::detect(&exe),
            Err(e) => {
                tracing::warn!("Cannot resolve current executable: {}", e);
                Self::Development
            }
        }
    }

    /// Classify an executable path.
    ///
    /// Anything below `target/debug` or `target/release` (including
    /// `deps/` test harnesses and cross-compiled `target/<triple>/...`
    /// layouts) is a development build.
    #[must_use]
    pub fn detect(exe: &Path) -> Self {
        let parts: Vec<String> = exe
            .components()
            .filter_map(|c| match c {
                Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();

        let in_target = parts.iter().enumerate().any(|(i, part)| {
            part == "target"
                && parts
                    .iter()
                    .skip(i + 1)
                    .take(2)
                    .any(|p| p == "debug" || p == "release")
        });

        if in_target {
            Self::Development
        } else {
            Self::Packaged
        }
    }

    /// Whether self-replacement is allowed for this build.
    #[must_use]
    pub const fn is_packaged(&self) -> bool {
        matches!(self, Self::Packaged)
    }
}

/// Check whether the current environment supports automatic updates.
#[must_use]
pub fn can_auto_update() -> bool {
    PlatformFamily::current().is_ok() && BuildKind::current().is_packaged()
}
