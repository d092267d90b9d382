//! Self-update system for FXdownloader.
//!
//! This crate finds newer releases on GitHub, picks and downloads the right
//! executable for the host, and replaces the running executable with it.
//!
//! # Overview
//!
//! - [`GitHubClient`] fetches release metadata and compares versions
//!   ([`UpdateCheck`]).
//! - [`assets`] classifies release files per platform and ranks the
//!   recommended build first; [`download`] fetches it and checks its digest.
//! - [`Updater`] writes a platform script (batch on Windows, `sh` on Linux
//!   and macOS) and starts it detached. Once the application exits, the
//!   script backs up the old executable, installs the new one, rolls back on
//!   failure, relaunches the application and deletes itself.
//!
//! # Example
//!
//! ```no_run
//! use fxd_updater::{GitHubClient, TargetPlatform, UpdateSettings, Version};
//! use fxd_updater::{apply_update, assets, download};
//!
//! fn update() -> fxd_updater::Result<()> {
//!     let client = GitHubClient::new(fxd_updater::DEFAULT_REPO)?;
//!     let settings = UpdateSettings::default();
//!
//!     if let Some(check) = client.check_for_update(&Version::current(), &settings)? {
//!         if check.has_update {
//!             let asset = assets::recommended_asset(&check.release, TargetPlatform::current())?;
//!             let path = download::download_asset(&asset.asset, &std::env::temp_dir(), |_| {})?;
//!             if apply_update(&path, None) {
//!                 std::process::exit(0);
//!             }
//!         }
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

// Core modules
pub mod config;
pub mod error;
pub mod platform;
pub mod release;
pub mod version;

// Release lookup and artifacts
pub mod assets;
pub mod download;
pub mod github;

// Replacement
pub mod apply;
pub mod launch;
pub mod script;

pub use apply::{ReplacementOutcome, ReplacementPlan, UpdateTarget, Updater, apply_update};
pub use assets::{AssetKind, ClassifiedAsset};
pub use config::{ReplacementPolicy, UpdateChannel, UpdateSettings};
pub use download::{DownloadProgress, format_bytes};
pub use error::{Result, UpdateError};
pub use github::GitHubClient;
pub use launch::{DetachedLauncher, Launcher};
pub use platform::{BuildKind, PlatformFamily, TargetPlatform, can_auto_update};
pub use release::{Asset, Release, UpdateCheck};
pub use script::{ReplacementState, ScriptDialect, ScriptExit};
pub use version::{PreRelease, Version};

/// Version of this crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Repository FXdownloader releases are published to.
pub const DEFAULT_REPO: &str = "FXdownloader/FXdownloader";
