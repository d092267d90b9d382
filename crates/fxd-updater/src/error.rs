//! Error types for the self-update system.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while checking for, downloading, or applying an update.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum UpdateError {
    /// The running process cannot replace itself (development build or
    /// unsupported operating system).
    #[error("self-update is not supported here: {0}")]
    NotSupportedEnvironment(String),

    /// The replacement binary does not exist.
    #[error("update file not found: {}", .0.display())]
    MissingArtifact(PathBuf),

    /// The replacement script could not be written or started.
    #[error("failed to start update script: {0}")]
    LaunchFailed(String),

    /// Failed to parse a version string.
    #[error("invalid version format: {0}")]
    InvalidVersion(String),

    /// Network request failed.
    #[error("network error: {0}")]
    Network(String),

    /// GitHub answered with a non-success status.
    #[error("GitHub API error ({status}): {message}")]
    GitHubApi {
        /// HTTP status code.
        status: u16,
        /// Response body or reason.
        message: String,
    },

    /// GitHub API rate limit exceeded.
    #[error("GitHub API rate limit exceeded, retry after {retry_after_secs} seconds")]
    RateLimited {
        /// Seconds until the rate limit resets.
        retry_after_secs: u64,
    },

    /// No suitable release asset for the requested platform.
    #[error("no release asset found for platform: {0}")]
    NoAssetFound(String),

    /// SHA256 digest of a downloaded file did not match.
    #[error("checksum verification failed: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// Expected SHA256 hash from GitHub.
        expected: String,
        /// Actual SHA256 hash of the downloaded file.
        actual: String,
    },

    /// I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(String),

    /// Failed to parse JSON response.
    #[error("JSON parse error: {0}")]
    JsonParse(String),
}

impl UpdateError {
    /// Returns a user-friendly error message suitable for display.
    #[must_use]
    pub fn user_message(&self) -> &str {
        match self {
            Self::NotSupportedEnvironment(_) => {
                "Automatic update is only available in the packaged application. \
                 Please download the new version manually."
            }
            Self::MissingArtifact(_) => "The downloaded update file could not be found.",
            Self::LaunchFailed(_) => "Could not start the update process. Please try again.",
            Self::Network(_) | Self::GitHubApi { .. } => {
                "Could not connect to GitHub. Please check your internet connection."
            }
            Self::RateLimited { .. } => "GitHub API rate limit reached. Please try again later.",
            Self::NoAssetFound(_) => "No update available for your platform.",
            Self::ChecksumMismatch { .. } => {
                "The downloaded file is damaged. Please download the update again."
            }
            Self::InvalidVersion(_) | Self::Io(_) | Self::JsonParse(_) => {
                "An unexpected error occurred."
            }
        }
    }

    /// Returns whether this error is potentially recoverable with a retry.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::RateLimited { .. } | Self::Io(_) | Self::LaunchFailed(_)
        )
    }
}

impl From<reqwest::Error> for UpdateError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.to_string())
    }
}

impl From<std::io::Error> for UpdateError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for UpdateError {
    fn from(err: serde_json::Error) -> Self {
        Self::JsonParse(err.to_string())
    }
}

/// Result type alias for update operations.
pub type Result<T> = std::result::Result<T, UpdateError>;
