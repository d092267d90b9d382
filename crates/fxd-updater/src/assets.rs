//! Release asset classification.
//!
//! Each release ships several executables per platform (standalone,
//! standard and debug builds on Windows; release and debug builds on
//! Linux and macOS). This module filters them for a platform, labels
//! them and ranks the recommended build first.

use std::fmt;

use tracing::debug;

use crate::error::{Result, UpdateError};
use crate::platform::TargetPlatform;
use crate::release::{Asset, Release};

/// Build variant of a release asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    /// Windows build with every dependency bundled.
    Standalone,
    /// Regular Windows build.
    Standard,
    /// Build with extra diagnostics.
    Debug,
    /// Regular Linux or macOS build.
    Release,
}

impl AssetKind {
    /// Lowercase identifier, also used as the secondary sort key.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Standalone => "standalone",
            Self::Standard => "standard",
            Self::Debug => "debug",
            Self::Release => "release",
        }
    }

    /// Human-readable description of this variant on `platform`.
    #[must_use]
    pub const fn description(&self, platform: TargetPlatform) -> &'static str {
        match (platform, self) {
            (TargetPlatform::Windows, Self::Standalone) => {
                "Standalone build with all dependencies bundled (recommended)"
            }
            (TargetPlatform::Windows, Self::Debug) => {
                "Debug build that opens a console window for troubleshooting"
            }
            (TargetPlatform::Windows, _) => "Standard build",
            (TargetPlatform::MacOs, Self::Debug) => "macOS debug build with verbose logging",
            (TargetPlatform::MacOs, _) => "macOS release build (recommended)",
            (_, Self::Debug) => "Linux debug build with verbose logging",
            (_, _) => "Linux release build (recommended)",
        }
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A release asset labelled for one platform.
#[derive(Debug, Clone)]
pub struct ClassifiedAsset {
    /// The underlying GitHub asset.
    pub asset: Asset,
    /// Build variant.
    pub kind: AssetKind,
    /// Human-readable description.
    pub description: &'static str,
    /// Whether this is the build users should pick.
    pub recommended: bool,
}

impl ClassifiedAsset {
    /// Download URL of the asset.
    #[must_use]
    pub fn download_url(&self) -> &str {
        &self.asset.browser_download_url
    }

    /// File name of the asset.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.asset.name
    }
}

/// Classify a single asset name for `platform`, or `None` if it does not
/// belong to that platform.
#[must_use]
pub fn classify_name(name: &str, platform: TargetPlatform) -> Option<AssetKind> {
    let lower = name.to_lowercase();
    let is_exe = lower.ends_with(".exe");

    match platform {
        TargetPlatform::Windows => {
            if !is_exe {
                return None;
            }
            if name.contains("Standalone") {
                Some(AssetKind::Standalone)
            } else if lower.contains("debug") {
                Some(AssetKind::Debug)
            } else {
                Some(AssetKind::Standard)
            }
        }
        TargetPlatform::Linux | TargetPlatform::MacOs => {
            let marker = if platform == TargetPlatform::Linux {
                "linux"
            } else {
                "macos"
            };
            if !lower.contains(marker) || is_exe {
                return None;
            }
            if lower.contains("debug") {
                Some(AssetKind::Debug)
            } else {
                Some(AssetKind::Release)
            }
        }
        TargetPlatform::Termux | TargetPlatform::Unknown => None,
    }
}

/// Classify the assets of `release` for `platform`, recommended first.
#[must_use]
pub fn classify_assets(release: &Release, platform: TargetPlatform) -> Vec<ClassifiedAsset> {
    debug!(
        "Classifying {} assets for {}",
        release.assets.len(),
        platform
    );

    let mut classified: Vec<ClassifiedAsset> = release
        .assets
        .iter()
        .filter(|asset| {
            if asset.name.ends_with(".sha256") {
                return false;
            }
            if !asset.is_uploaded() {
                debug!("Skipping {} (upload incomplete)", asset.name);
                return false;
            }
            true
        })
        .filter_map(|asset| {
            let kind = classify_name(&asset.name, platform)?;
            debug!("Matched {} as {}", asset.name, kind);
            let recommended = matches!(kind, AssetKind::Standalone | AssetKind::Release);
            Some(ClassifiedAsset {
                asset: asset.clone(),
                kind,
                description: kind.description(platform),
                recommended,
            })
        })
        .collect();

    classified.sort_by_key(|a| (!a.recommended, a.kind.as_str()));

    debug!("{} assets match {}", classified.len(), platform);
    classified
}

/// Pick the asset to download for `platform`.
pub fn recommended_asset(release: &Release, platform: TargetPlatform) -> Result<ClassifiedAsset> {
    classify_assets(release, platform)
        .into_iter()
        .next()
        .ok_or_else(|| UpdateError::NoAssetFound(platform.display_name().to_string()))
}
