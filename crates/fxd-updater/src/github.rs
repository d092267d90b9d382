//! GitHub API client for fetching releases.

use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::{Client, Response};
use reqwest::header::ACCEPT;
use tracing::{debug, info};

use crate::config::{UpdateChannel, UpdateSettings};
use crate::error::{Result, UpdateError};
use crate::release::{Release, UpdateCheck};
use crate::version::Version;

/// GitHub API base URL.
const GITHUB_API_URL: &str = "https://api.github.com";

/// HTTP request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Fallback wait when GitHub rate-limits without saying for how long.
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// User agent string for API requests.
const USER_AGENT_VALUE: &str = concat!("fxdownloader-updater/", env!("CARGO_PKG_VERSION"));

/// Client for the GitHub Releases API of one repository.
#[derive(Debug, Clone)]
pub struct GitHubClient {
    client: Client,
    repo: String,
    api_url: String,
}

impl GitHubClient {
    /// Create a client for `repo` in `owner/name` form.
    pub fn new(repo: impl Into<String>) -> Result<Self> {
        let repo = repo.into();
        let valid = repo
            .split_once('/')
            .is_some_and(|(owner, name)| !owner.is_empty() && !name.is_empty() && !name.contains('/'));
        if !valid {
            return Err(UpdateError::GitHubApi {
                status: 0,
                message: format!("repository must be 'owner/name', got '{repo}'"),
            });
        }

        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT_VALUE)
            .build()?;

        Ok(Self {
            client,
            repo,
            api_url: GITHUB_API_URL.to_string(),
        })
    }

    /// Point the client at a different API root (GitHub Enterprise, mirrors).
    #[must_use]
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into().trim_end_matches('/').to_string();
        self
    }

    /// The repository this client reads from.
    #[must_use]
    pub fn repo(&self) -> &str {
        &self.repo
    }

    fn releases_url(&self) -> String {
        format!("{}/repos/{}/releases", self.api_url, self.repo)
    }

    fn latest_release_url(&self) -> String {
        format!("{}/latest", self.releases_url())
    }

    fn get(&self, url: &str) -> Result<Response> {
        debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            .header(ACCEPT, "application/vnd.github.v3+json")
            .send()?;
        check_status(response)
    }

    /// Fetch the latest published, non-prerelease release.
    pub fn latest_release(&self) -> Result<Release> {
        let release: Release = self.get(&self.latest_release_url())?.json()?;
        Ok(release)
    }

    /// Fetch the most recent releases (first page).
    pub fn releases(&self) -> Result<Vec<Release>> {
        let releases: Vec<Release> = self.get(&self.releases_url())?.json()?;
        Ok(releases)
    }

    /// Latest release visible on `channel`.
    ///
    /// Stable uses the `releases/latest` endpoint; beta scans the release list
    /// for the highest parseable version, drafts excluded.
    pub fn latest_for_channel(&self, channel: UpdateChannel) -> Result<Option<Release>> {
        match channel {
            UpdateChannel::Stable => match self.latest_release() {
                Ok(release) => Ok(Some(release)),
                Err(UpdateError::GitHubApi { status: 404, .. }) => Ok(None),
                Err(e) => Err(e),
            },
            UpdateChannel::Beta => Ok(pick_latest(self.releases()?, channel)),
        }
    }

    /// Compare `current_version` with the latest release on the configured channel.
    ///
    /// Returns `None` when the repository has no usable release. A version the
    /// user chose to skip is reported with `has_update == false`.
    pub fn check_for_update(
        &self,
        current_version: &Version,
        settings: &UpdateSettings,
    ) -> Result<Option<UpdateCheck>> {
        info!(
            "Checking {} for updates (current: {}, channel: {})",
            self.repo, current_version, settings.channel
        );

        let Some(release) = self.latest_for_channel(settings.channel)? else {
            debug!("No releases found");
            return Ok(None);
        };

        let mut check = UpdateCheck::new(current_version.clone(), release)?;

        if check.has_update && settings.should_skip_version(&check.release.tag_name) {
            info!("Skipping version {} (user preference)", check.release.tag_name);
            check.has_update = false;
        }

        if check.has_update {
            info!("Update available: {} -> {}", current_version, check.latest_version);
        } else {
            debug!("Already up to date (latest: {})", check.latest_version);
        }

        Ok(Some(check))
    }
}

/// Map error statuses to [`UpdateError`], passing successful responses through.
fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let rate_limited = status == StatusCode::TOO_MANY_REQUESTS
        || (status == StatusCode::FORBIDDEN
            && response
                .headers()
                .get("x-ratelimit-remaining")
                .and_then(|v| v.to_str().ok())
                == Some("0"));

    if rate_limited {
        let retry_after_secs = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
        return Err(UpdateError::RateLimited { retry_after_secs });
    }

    let message = response
        .text()
        .unwrap_or_else(|_| "Unknown error".to_string());
    Err(UpdateError::GitHubApi {
        status: status.as_u16(),
        message,
    })
}

/// Highest-versioned release allowed on `channel`, drafts and unparseable tags excluded.
fn pick_latest(releases: Vec<Release>, channel: UpdateChannel) -> Option<Release> {
    releases
        .into_iter()
        .filter(|r| !r.draft)
        .filter(|r| channel == UpdateChannel::Beta || !r.prerelease)
        .filter_map(|r| r.version().ok().map(|v| (v, r)))
        .filter(|(v, _)| channel.includes(v))
        .max_by(|(a, _), (b, _)| a.cmp(b))
        .map(|(_, r)| r)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn release(tag: &str, draft: bool, prerelease: bool) -> Release {
        Release {
            tag_name: tag.to_string(),
            name: None,
            body: None,
            draft,
            prerelease,
            published_at: None,
            assets: Vec::new(),
            html_url: String::new(),
        }
    }

    #[test]
    fn test_urls() {
        let client = GitHubClient::new("owner/FXdownloader").unwrap();
        assert_eq!(
            client.latest_release_url(),
            "https://api.github.com/repos/owner/FXdownloader/releases/latest"
        );

        let client = client.with_api_url("https://ghe.example.com/api/v3/");
        assert_eq!(
            client.releases_url(),
            "https://ghe.example.com/api/v3/repos/owner/FXdownloader/releases"
        );
    }

    #[test]
    fn test_rejects_malformed_repo() {
        assert!(GitHubClient::new("FXdownloader").is_err());
        assert!(GitHubClient::new("/FXdownloader").is_err());
        assert!(GitHubClient::new("a/b/c").is_err());
    }

    #[test]
    fn test_pick_latest_beta_includes_prereleases() {
        let releases = vec![
            release("v1.0.0", false, false),
            release("v1.1.0-beta.1", false, true),
            release("v2.0.0", true, false),
            release("nightly", false, true),
        ];
        let latest = pick_latest(releases, UpdateChannel::Beta).unwrap();
        assert_eq!(latest.tag_name, "v1.1.0-beta.1");
    }

    #[test]
    fn test_pick_latest_stable_skips_prereleases() {
        let releases = vec![
            release("v1.0.0", false, false),
            release("v1.1.0-beta.1", false, true),
            release("v0.9.0", false, false),
        ];
        let latest = pick_latest(releases, UpdateChannel::Stable).unwrap();
        assert_eq!(latest.tag_name, "v1.0.0");
    }

    #[test]
    fn test_pick_latest_empty() {
        assert!(pick_latest(Vec::new(), UpdateChannel::Stable).is_none());
    }
}
