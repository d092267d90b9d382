//! Asset download and digest verification.
//!
//! Downloads land in `<dest>.part` first and are renamed into place only once
//! complete, so the replacement step never sees a truncated binary.

use std::fs::{self, File};
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::blocking::Client;
use sha2::{Digest, Sha256};

use crate::error::{Result, UpdateError};
use crate::release::Asset;

/// User agent string for download requests.
const USER_AGENT_VALUE: &str = concat!("fxdownloader-updater/", env!("CARGO_PKG_VERSION"));

/// Connect timeout for downloads. The body itself may take much longer.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Read buffer size.
const CHUNK_SIZE: usize = 64 * 1024;

/// Progress information during a download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadProgress {
    /// Bytes downloaded so far.
    pub downloaded: u64,
    /// Total bytes, if the server announced them.
    pub total: Option<u64>,
}

impl DownloadProgress {
    /// Returns the progress as a percentage (0 to 100), or `None` if the size is unknown.
    #[must_use]
    pub fn percentage(&self) -> Option<u8> {
        match self.total {
            Some(0) | None => None,
            Some(total) => Some(((self.downloaded as f64 / total as f64) * 100.0).min(100.0) as u8),
        }
    }
}

/// Full path the update file is stored at.
#[must_use]
pub fn update_file_path(save_dir: &Path, file_name: &str) -> PathBuf {
    save_dir.join(file_name)
}

/// Download `url` to `dest`, reporting progress after every chunk.
///
/// Returns `dest` on success. A partially written file is removed on failure.
pub fn download_to_file(
    url: &str,
    dest: &Path,
    mut on_progress: impl FnMut(DownloadProgress),
) -> Result<PathBuf> {
    tracing::info!("Downloading {} to {}", url, dest.display());

    let client = Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(None)
        .user_agent(USER_AGENT_VALUE)
        .build()?;

    let mut response = client.get(url).send()?;
    if !response.status().is_success() {
        return Err(UpdateError::GitHubApi {
            status: response.status().as_u16(),
            message: format!("download of {url} failed"),
        });
    }
    let total = response.content_length();

    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    let part_path = part_path(dest);

    let written = write_body(&mut response, &part_path, total, &mut on_progress);
    let downloaded = match written {
        Ok(n) => n,
        Err(e) => {
            let _ = fs::remove_file(&part_path);
            return Err(e);
        }
    };

    if let Some(total) = total {
        if downloaded != total {
            let _ = fs::remove_file(&part_path);
            return Err(UpdateError::Network(format!(
                "download truncated: {downloaded} of {total} bytes"
            )));
        }
    }

    fs::rename(&part_path, dest)?;
    tracing::info!("Downloaded {} ({})", dest.display(), format_bytes(downloaded));
    Ok(dest.to_path_buf())
}

/// Download a release asset into `save_dir`, verifying its digest when
/// GitHub provides one.
pub fn download_asset(
    asset: &Asset,
    save_dir: &Path,
    on_progress: impl FnMut(DownloadProgress),
) -> Result<PathBuf> {
    let dest = update_file_path(save_dir, &asset.name);
    download_to_file(&asset.browser_download_url, &dest, on_progress)?;

    match asset.digest.as_deref() {
        Some(digest) => {
            if let Err(e) = verify_file_sha256(&dest, digest) {
                let _ = fs::remove_file(&dest);
                return Err(e);
            }
        }
        None => tracing::warn!("No digest published for {}, skipping verification", asset.name),
    }

    Ok(dest)
}

fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

fn write_body(
    body: &mut impl Read,
    path: &Path,
    total: Option<u64>,
    on_progress: &mut impl FnMut(DownloadProgress),
) -> Result<u64> {
    let mut file = File::create(path)?;
    let mut buffer = vec![0_u8; CHUNK_SIZE];
    let mut downloaded = 0_u64;

    loop {
        let read = body.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        file.write_all(&buffer[..read])?;
        downloaded += read as u64;
        on_progress(DownloadProgress { downloaded, total });
    }

    file.sync_all()?;
    Ok(downloaded)
}

/// Verify a file against an expected SHA256 digest.
///
/// Accepts both `sha256:abc123…` and bare hex. Returns the verified hash.
pub fn verify_file_sha256(path: &Path, expected_digest: &str) -> Result<String> {
    let expected = expected_digest
        .strip_prefix("sha256:")
        .unwrap_or(expected_digest)
        .trim()
        .to_lowercase();

    let actual = compute_file_sha256(path)?;
    if actual != expected {
        return Err(UpdateError::ChecksumMismatch { expected, actual });
    }

    tracing::info!("SHA256 verification passed: {}", actual);
    Ok(actual)
}

/// Computes the SHA256 hash of a file.
pub fn compute_file_sha256(path: &Path) -> Result<String> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut hasher = Sha256::new();
    let mut buffer = vec![0_u8; CHUNK_SIZE];

    loop {
        let read = reader.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Format a byte count as a human-readable string.
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}
