//! GitHub release and asset types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::version::Version;

/// Number of release-note characters kept in the update message.
const NOTES_PREVIEW_CHARS: usize = 300;

/// A GitHub release.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Release {
    /// The release tag name (e.g., "v1.0.0").
    pub tag_name: String,

    /// The release title/name.
    #[serde(default)]
    pub name: Option<String>,

    /// The release body (changelog/release notes in markdown).
    #[serde(default)]
    pub body: Option<String>,

    /// Whether this is a draft release.
    #[serde(default)]
    pub draft: bool,

    /// Whether this is a pre-release.
    #[serde(default)]
    pub prerelease: bool,

    /// When the release was published.
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,

    /// The release assets (downloadable files).
    #[serde(default)]
    pub assets: Vec<Asset>,

    /// URL to the release page on GitHub.
    #[serde(default)]
    pub html_url: String,
}

impl Release {
    /// Get the parsed version from the tag name.
    pub fn version(&self) -> Result<Version> {
        Version::from_tag(&self.tag_name)
    }

    /// Get the release notes/changelog.
    #[must_use]
    pub fn changelog(&self) -> &str {
        self.body.as_deref().unwrap_or("")
    }

    /// Get the display name for this release.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or(&self.tag_name)
    }

    /// Find an asset by exact file name.
    #[must_use]
    pub fn find_asset(&self, name: &str) -> Option<&Asset> {
        self.assets.iter().find(|a| a.name == name)
    }
}

/// A downloadable asset attached to a release.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Asset {
    /// The asset file name.
    pub name: String,

    /// The file size in bytes.
    #[serde(default)]
    pub size: u64,

    /// Direct download URL for this asset.
    pub browser_download_url: String,

    /// The content type (e.g., "application/octet-stream").
    #[serde(default)]
    pub content_type: String,

    /// SHA256 digest (format: "sha256:..."), when GitHub has computed it.
    #[serde(default)]
    pub digest: Option<String>,

    /// Upload state: "uploaded" (complete) or "open" (still uploading).
    #[serde(default = "uploaded_state")]
    pub state: String,
}

fn uploaded_state() -> String {
    "uploaded".to_string()
}

impl Asset {
    /// Whether the asset has finished uploading.
    #[must_use]
    pub fn is_uploaded(&self) -> bool {
        self.state == "uploaded"
    }

    /// Check if this is a Windows executable.
    #[must_use]
    pub fn is_exe(&self) -> bool {
        self.name.to_lowercase().ends_with(".exe")
    }

    /// Size in megabytes with one decimal, as shown in the asset list.
    #[must_use]
    pub fn size_mb(&self) -> String {
        format!("{:.1}", self.size as f64 / 1024.0 / 1024.0)
    }
}

/// Result of comparing the running version with the latest release.
#[derive(Debug, Clone)]
pub struct UpdateCheck {
    /// Whether the latest release is newer than the running version.
    pub has_update: bool,

    /// The running version.
    pub current_version: Version,

    /// Version parsed from the latest release tag.
    pub latest_version: Version,

    /// The latest release.
    pub release: Release,
}

impl UpdateCheck {
    /// Compare `current_version` against `release`.
    pub fn new(current_version: Version, release: Release) -> Result<Self> {
        let latest_version = release.version()?;
        Ok(Self {
            has_update: latest_version.is_newer_than(&current_version),
            current_version,
            latest_version,
            release,
        })
    }

    /// Update announcement, or `None` when already up to date.
    #[must_use]
    pub fn message(&self) -> Option<String> {
        self.has_update
            .then(|| format_update_message(&self.release))
    }

    /// Release page URL when an update is available, empty otherwise.
    #[must_use]
    pub fn url(&self) -> &str {
        if self.has_update {
            &self.release.html_url
        } else {
            ""
        }
    }
}

/// Format the update announcement for a release.
///
/// Markdown markers are dropped and the notes are cut to a short preview.
#[must_use]
pub fn format_update_message(release: &Release) -> String {
    let notes: String = release
        .changelog()
        .chars()
        .filter(|c| !matches!(c, '#' | '*' | '`'))
        .collect();
    let notes = notes.trim();

    let mut preview: String = notes.chars().take(NOTES_PREVIEW_CHARS).collect();
    if release.changelog().chars().count() > NOTES_PREVIEW_CHARS {
        preview.push_str("...");
    }
    if preview.is_empty() {
        preview = "(no release notes)".to_string();
    }

    format!(
        "New version available: {}\n{}\n\n{}\n\nDownload: {}",
        release.tag_name,
        release.name.as_deref().unwrap_or(""),
        preview,
        release.html_url
    )
}
