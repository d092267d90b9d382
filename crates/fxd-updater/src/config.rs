//! Configuration types for the update system.
//!
//! [`UpdateSettings`] holds the user's update-check preferences, while
//! [`ReplacementPolicy`] carries the timing and retry bounds that are baked
//! into the generated replacement script.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::version::Version;

/// Update channel selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateChannel {
    /// Only receive stable releases.
    #[default]
    Stable,
    /// Receive beta and stable releases.
    Beta,
}

impl UpdateChannel {
    /// Check if a version should be shown for this channel.
    #[must_use]
    pub fn includes(&self, version: &Version) -> bool {
        match self {
            Self::Stable => version.is_stable(),
            Self::Beta => true,
        }
    }

    /// Get a human-readable label.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Stable => "Stable",
            Self::Beta => "Beta",
        }
    }
}

impl fmt::Display for UpdateChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// User settings for the update system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateSettings {
    /// Whether update checking is enabled.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Which release channel to follow.
    #[serde(default)]
    pub channel: UpdateChannel,

    /// Version to skip (user clicked "Skip This Version").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skipped_version: Option<String>,

    /// Last time we checked for updates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_check: Option<DateTime<Utc>>,
}

/// Hours between automatic update checks.
pub const CHECK_INTERVAL_HOURS: i64 = 24;

fn default_enabled() -> bool {
    true
}

impl Default for UpdateSettings {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            channel: UpdateChannel::default(),
            skipped_version: None,
            last_check: None,
        }
    }
}

impl UpdateSettings {
    /// Default settings with checking switched on or off.
    #[must_use]
    pub fn with_enabled(enabled: bool) -> Self {
        Self {
            enabled,
            ..Default::default()
        }
    }

    /// Whether a background check is due: checking is enabled and the last
    /// check is at least [`CHECK_INTERVAL_HOURS`] old.
    #[must_use]
    pub fn should_check_on_startup(&self) -> bool {
        self.enabled
            && self.last_check.is_none_or(|last| {
                Utc::now().signed_duration_since(last).num_hours() >= CHECK_INTERVAL_HOURS
            })
    }

    /// Whether the user declined `tag`. A leading `v` is ignored on both sides.
    #[must_use]
    pub fn should_skip_version(&self, tag: &str) -> bool {
        let strip = |t: &str| t.strip_prefix('v').unwrap_or(t).to_string();
        self.skipped_version
            .as_deref()
            .is_some_and(|skipped| strip(skipped) == strip(tag))
    }

    /// Stamp the current time as the last check.
    pub fn record_check(&mut self) {
        self.last_check = Some(Utc::now());
    }

    /// Set a version to skip.
    pub fn skip_version(&mut self, version: impl Into<String>) {
        self.skipped_version = Some(version.into());
    }

    /// Clear the skipped version.
    pub fn clear_skipped_version(&mut self) {
        self.skipped_version = None;
    }
}

/// Seconds between liveness checks of the exiting process.
pub const DEFAULT_POLL_INTERVAL_SECS: u32 = 1;

/// Maximum seconds to wait for the exiting process before force-killing it.
pub const DEFAULT_MAX_WAIT_SECS: u32 = 30;

/// Seconds to wait after exit so the OS releases file handles.
pub const DEFAULT_SETTLE_SECS: u32 = 3;

/// Attempts at moving the current binary aside before giving up.
pub const DEFAULT_MAX_BACKUP_ATTEMPTS: u32 = 5;

/// Seconds to wait between backup attempts.
pub const DEFAULT_RETRY_DELAY_SECS: u32 = 2;

/// Seconds between a completed install and the relaunch.
pub const DEFAULT_RESTART_DELAY_SECS: u32 = 3;

/// Seconds to wait before checking that the relaunched process is running.
pub const DEFAULT_RESTART_VERIFY_SECS: u32 = 3;

/// Seconds a lock file may outlive the computed script runtime before it
/// counts as stale.
pub const LOCK_GRACE_SECS: u64 = 30;

/// File stem shared by the update script, its log and its lock.
pub const DEFAULT_SCRIPT_STEM: &str = "fxdownloader_update";

/// Bounds and locations used when building a replacement plan.
///
/// Every value ends up as a literal inside the generated script, because the
/// process that renders the script has exited by the time the script runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplacementPolicy {
    /// Seconds between PID liveness checks.
    pub poll_interval_secs: u32,
    /// Upper bound on the wait for the origin process to exit.
    pub max_wait_secs: u32,
    /// Delay after the process exited, before touching files.
    pub settle_secs: u32,
    /// Number of backup (move-aside) attempts.
    pub max_backup_attempts: u32,
    /// Delay between backup attempts.
    pub retry_delay_secs: u32,
    /// Delay between install and relaunch.
    pub restart_delay_secs: u32,
    /// Delay before verifying the relaunched process.
    pub restart_verify_secs: u32,
    /// Keep the script window open on a fatal error until the user reacts.
    pub pause_on_error: bool,
    /// File stem for the script and log (extension added per dialect).
    pub script_stem: String,
    /// Directory for the script and log. `None` means the system temp dir.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub script_dir: Option<PathBuf>,
}

impl Default for ReplacementPolicy {
    fn default() -> Self {
        Self {
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            max_wait_secs: DEFAULT_MAX_WAIT_SECS,
            settle_secs: DEFAULT_SETTLE_SECS,
            max_backup_attempts: DEFAULT_MAX_BACKUP_ATTEMPTS,
            retry_delay_secs: DEFAULT_RETRY_DELAY_SECS,
            restart_delay_secs: DEFAULT_RESTART_DELAY_SECS,
            restart_verify_secs: DEFAULT_RESTART_VERIFY_SECS,
            pause_on_error: true,
            script_stem: DEFAULT_SCRIPT_STEM.to_string(),
            script_dir: None,
        }
    }
}

impl ReplacementPolicy {
    /// Directory that will hold the script and its log.
    #[must_use]
    pub fn resolved_script_dir(&self) -> PathBuf {
        self.script_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    /// Longest a script following this policy can run without user input.
    ///
    /// A lock file older than this belongs to a script that was killed.
    #[must_use]
    pub fn max_script_secs(&self) -> u64 {
        let attempts = u64::from(self.max_backup_attempts.max(1));
        u64::from(self.max_wait_secs)
            + u64::from(self.poll_interval_secs.max(1))
            + 1
            + u64::from(self.settle_secs)
            + attempts * (u64::from(self.retry_delay_secs) + 1)
            + u64::from(self.restart_delay_secs)
            + 2 * u64::from(self.restart_verify_secs)
            + LOCK_GRACE_SECS
    }

    /// Set the maximum wait for the origin process.
    #[must_use]
    pub fn with_max_wait_secs(mut self, secs: u32) -> Self {
        self.max_wait_secs = secs;
        self
    }

    /// Set the post-exit settle delay.
    #[must_use]
    pub fn with_settle_secs(mut self, secs: u32) -> Self {
        self.settle_secs = secs;
        self
    }

    /// Set the number of backup attempts (at least one is always made).
    #[must_use]
    pub fn with_max_backup_attempts(mut self, attempts: u32) -> Self {
        self.max_backup_attempts = attempts.max(1);
        self
    }

    /// Set the delay between backup attempts.
    #[must_use]
    pub fn with_retry_delay_secs(mut self, secs: u32) -> Self {
        self.retry_delay_secs = secs;
        self
    }

    /// Set the relaunch delay and verification window.
    #[must_use]
    pub fn with_restart_timing(mut self, delay_secs: u32, verify_secs: u32) -> Self {
        self.restart_delay_secs = delay_secs;
        self.restart_verify_secs = verify_secs;
        self
    }

    /// Enable or disable waiting for the user after a fatal error.
    #[must_use]
    pub fn with_pause_on_error(mut self, pause: bool) -> Self {
        self.pause_on_error = pause;
        self
    }

    /// Place the script and log in `dir` instead of the temp dir.
    #[must_use]
    pub fn with_script_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.script_dir = Some(dir.into());
        self
    }

    /// Timings small enough for tests driving a real script.
    #[must_use]
    pub fn fast() -> Self {
        Self {
            poll_interval_secs: 1,
            max_wait_secs: 5,
            settle_secs: 0,
            max_backup_attempts: 2,
            retry_delay_secs: 0,
            restart_delay_secs: 0,
            restart_verify_secs: 1,
            pause_on_error: false,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = UpdateSettings::default();
        assert!(settings.enabled);
        assert_eq!(settings.channel, UpdateChannel::Stable);
        assert!(settings.skipped_version.is_none());
        assert!(settings.last_check.is_none());
    }

    #[test]
    fn test_should_check_on_startup_disabled() {
        let settings = UpdateSettings::with_enabled(false);
        assert!(!settings.should_check_on_startup());
    }

    #[test]
    fn test_settings_deserialize_missing_fields() {
        let settings: UpdateSettings = serde_json::from_str("{}").unwrap();
        assert!(settings.enabled);
        assert_eq!(settings.channel, UpdateChannel::Stable);
    }

    #[test]
    fn test_should_check_on_startup_enabled() {
        let settings = UpdateSettings::with_enabled(true);
        assert!(settings.should_check_on_startup());
    }

    #[test]
    fn test_channel_includes() {
        let stable = Version::new(1, 0, 0);
        let beta = "1.0.0-beta.1".parse::<Version>().unwrap();

        assert!(UpdateChannel::Stable.includes(&stable));
        assert!(!UpdateChannel::Stable.includes(&beta));

        assert!(UpdateChannel::Beta.includes(&stable));
        assert!(UpdateChannel::Beta.includes(&beta));
    }

    #[test]
    fn test_skip_version() {
        let mut settings = UpdateSettings::default();

        assert!(!settings.should_skip_version("1.2.3"));

        settings.skip_version("1.2.3");
        assert!(settings.should_skip_version("1.2.3"));
        assert!(settings.should_skip_version("v1.2.3"));

        settings.skip_version("v2.0.0");
        assert!(settings.should_skip_version("2.0.0"));

        settings.clear_skipped_version();
        assert!(!settings.should_skip_version("1.2.3"));
    }

    #[test]
    fn test_policy_defaults() {
        let policy = ReplacementPolicy::default();
        assert_eq!(policy.poll_interval_secs, 1);
        assert_eq!(policy.max_wait_secs, 30);
        assert_eq!(policy.max_backup_attempts, 5);
        assert_eq!(policy.script_stem, "fxdownloader_update");
        assert_eq!(policy.resolved_script_dir(), std::env::temp_dir());
    }

    #[test]
    fn test_policy_builders() {
        let policy = ReplacementPolicy::default()
            .with_max_wait_secs(2)
            .with_max_backup_attempts(0)
            .with_script_dir("/var/tmp/x");
        assert_eq!(policy.max_wait_secs, 2);
        assert_eq!(policy.max_backup_attempts, 1);
        assert_eq!(policy.resolved_script_dir(), PathBuf::from("/var/tmp/x"));
    }

    #[test]
    fn test_max_script_secs_covers_every_delay() {
        let policy = ReplacementPolicy::default();
        // 30 wait + 1 poll + 1 kill + 3 settle + 5 * (2 + 1) + 3 restart + 2 * 3 verify + grace
        assert_eq!(policy.max_script_secs(), 59 + LOCK_GRACE_SECS);
        assert!(
            policy.clone().with_max_wait_secs(300).max_script_secs() > policy.max_script_secs()
        );
    }

    #[test]
    fn test_policy_partial_json() {
        let policy: ReplacementPolicy = serde_json::from_str(r#"{"max_wait_secs": 10}"#).unwrap();
        assert_eq!(policy.max_wait_secs, 10);
        assert_eq!(policy.settle_secs, DEFAULT_SETTLE_SECS);
        assert!(policy.pause_on_error);
    }

    #[test]
    fn test_recorded_check_defers_next_startup_check() {
        let mut settings = UpdateSettings::default();
        settings.record_check();
        assert!(!settings.should_check_on_startup());

        settings.last_check = Some(Utc::now() - chrono::Duration::hours(CHECK_INTERVAL_HOURS));
        assert!(settings.should_check_on_startup());
    }
}
