//! Hands a downloaded binary over to the replacement script.
//!
//! [`Updater::apply`] only checks its inputs, writes the script and starts
//! it. The swap itself happens after the caller exits, so a
//! [`ReplacementOutcome::Launched`] says the script started and nothing
//! more. Progress is recorded in the script's log file.

mod target;

pub use target::{ReplacementPlan, UpdateTarget};

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tracing::{debug, error, info, warn};

use crate::config::ReplacementPolicy;
use crate::error::{Result, UpdateError};
use crate::launch::{DetachedLauncher, Launcher};
use crate::platform::{BuildKind, PlatformFamily};
use crate::script::ScriptDialect;

/// What happened to the replacement script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplacementOutcome {
    /// The script was written and started.
    Launched {
        /// Where the script was written.
        script_path: PathBuf,
    },
    /// The script could not be written or started. Nothing was executed.
    LaunchFailed(String),
}

impl ReplacementOutcome {
    /// Whether the script was started.
    #[must_use]
    pub const fn is_launched(&self) -> bool {
        matches!(self, Self::Launched { .. })
    }
}

impl fmt::Display for ReplacementOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Launched { script_path } => {
                write!(f, "update script started: {}", script_path.display())
            }
            Self::LaunchFailed(reason) => write!(f, "update script not started: {reason}"),
        }
    }
}

/// Replaces the running executable with a downloaded one.
///
/// Every setting defaults to the running process and host; the `with_*`
/// methods override them.
pub struct Updater {
    policy: Option<ReplacementPolicy>,
    build_kind: Option<BuildKind>,
    family: Option<PlatformFamily>,
    process_id: u32,
    launcher: Box<dyn Launcher>,
}

impl Default for Updater {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Updater {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Updater")
            .field("policy", &self.policy)
            .field("build_kind", &self.build_kind)
            .field("family", &self.family)
            .field("process_id", &self.process_id)
            .finish_non_exhaustive()
    }
}

impl Updater {
    /// Updater for the running process.
    #[must_use]
    pub fn new() -> Self {
        Self {
            policy: None,
            build_kind: None,
            family: None,
            process_id: std::process::id(),
            launcher: Box::new(DetachedLauncher),
        }
    }

    /// Use `policy` instead of the dialect's default.
    #[must_use]
    pub fn with_policy(mut self, policy: ReplacementPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Treat the running executable as `kind` instead of detecting it.
    #[must_use]
    pub fn with_build_kind(mut self, kind: BuildKind) -> Self {
        self.build_kind = Some(kind);
        self
    }

    /// Render for `family` instead of the host family.
    #[must_use]
    pub fn with_family(mut self, family: PlatformFamily) -> Self {
        self.family = Some(family);
        self
    }

    /// Wait for `pid` instead of the calling process.
    ///
    /// Used when a separate tool applies an update on behalf of the
    /// application.
    #[must_use]
    pub fn with_process_id(mut self, pid: u32) -> Self {
        self.process_id = pid;
        self
    }

    /// Start scripts through `launcher`.
    #[must_use]
    pub fn with_launcher(mut self, launcher: impl Launcher + 'static) -> Self {
        self.launcher = Box::new(launcher);
        self
    }

    /// Replace `current_binary_path` (default: the running executable) with
    /// `new_binary_path` once the target process exits.
    ///
    /// # Errors
    ///
    /// - [`UpdateError::NotSupportedEnvironment`] for development builds and
    ///   unsupported hosts.
    /// - [`UpdateError::MissingArtifact`] when `new_binary_path` does not exist.
    ///
    /// Both are raised before anything is written. Failing to write or
    /// start the script is reported as [`ReplacementOutcome::LaunchFailed`].
    pub fn apply(
        &self,
        new_binary_path: &Path,
        current_binary_path: Option<&Path>,
    ) -> Result<ReplacementOutcome> {
        let build_kind = self.build_kind.unwrap_or_else(BuildKind::current);
        if !build_kind.is_packaged() {
            return Err(UpdateError::NotSupportedEnvironment(
                "self-update is only available in packaged builds".to_string(),
            ));
        }

        let family = match self.family {
            Some(family) => family,
            None => PlatformFamily::current()?,
        };

        let current = match current_binary_path {
            Some(path) => std::path::absolute(path)?,
            None => std::env::current_exe()?,
        };

        if !new_binary_path.exists() {
            return Err(UpdateError::MissingArtifact(new_binary_path.to_path_buf()));
        }
        let new = std::path::absolute(new_binary_path)?;

        let dialect = ScriptDialect::for_family(family);
        let mut policy = self
            .policy
            .clone()
            .unwrap_or_else(|| dialect.default_policy());
        policy.script_dir = Some(std::path::absolute(policy.resolved_script_dir())?);

        let target = UpdateTarget::new(current, new, self.process_id, family);
        let plan = ReplacementPlan::new(target, &policy);
        info!(
            "Preparing replacement of {} (PID {}) with {}",
            plan.current_binary_path.display(),
            plan.process_id,
            plan.new_binary_path.display()
        );

        if let Some(reason) = live_script(&plan) {
            warn!("Not starting a second update script: {}", reason);
            return Ok(ReplacementOutcome::LaunchFailed(reason));
        }

        if let Err(e) = write_script(&plan) {
            error!("Failed to write update script: {}", e);
            let _ = fs::remove_file(&plan.lock_path);
            return Ok(ReplacementOutcome::LaunchFailed(e.to_string()));
        }

        match self.launcher.launch(&plan.script_path, family) {
            Ok(()) => {
                info!(
                    "Update script started, log at {}",
                    plan.log_path.display()
                );
                Ok(ReplacementOutcome::Launched {
                    script_path: plan.script_path,
                })
            }
            Err(e) => {
                warn!(
                    "Update script left at {} but not started: {}",
                    plan.script_path.display(),
                    e
                );
                let _ = fs::remove_file(&plan.lock_path);
                Ok(ReplacementOutcome::LaunchFailed(e.to_string()))
            }
        }
    }
}

/// Describe the script holding the lock, or `None` when no script is live.
///
/// A lock older than the policy's longest possible run is left over from a
/// script that was killed and is ignored.
fn live_script(plan: &ReplacementPlan) -> Option<String> {
    let modified = fs::metadata(&plan.lock_path).ok()?.modified().ok()?;
    let age = SystemTime::now()
        .duration_since(modified)
        .unwrap_or(Duration::ZERO);

    if age.as_secs() > plan.policy.max_script_secs() {
        debug!(
            "Ignoring stale lock {} ({}s old)",
            plan.lock_path.display(),
            age.as_secs()
        );
        return None;
    }

    Some(format!(
        "an update script is already running (lock {}, {}s old)",
        plan.lock_path.display(),
        age.as_secs()
    ))
}

/// Take the lock and write the script for `plan`.
///
/// The script is written to a sibling file and renamed over the fixed path,
/// so an interpreter still reading an earlier script keeps its own copy.
fn write_script(plan: &ReplacementPlan) -> Result<()> {
    if let Some(dir) = plan.script_path.parent() {
        fs::create_dir_all(dir)?;
    }
    fs::write(&plan.lock_path, format!("pid={}\n", plan.process_id))?;

    let mut staging = plan.script_path.clone().into_os_string();
    staging.push(format!(".{}.tmp", std::process::id()));
    let staging = PathBuf::from(staging);

    fs::write(&staging, plan.render())?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&staging, fs::Permissions::from_mode(0o755))?;
    }

    if let Err(e) = fs::rename(&staging, &plan.script_path) {
        let _ = fs::remove_file(&staging);
        return Err(e.into());
    }
    Ok(())
}

/// Apply an update for the running process with default settings.
///
/// Returns `true` only if the replacement script was started. Errors are
/// logged.
pub fn apply_update(new_binary_path: &Path, current_binary_path: Option<&Path>) -> bool {
    match Updater::new().apply(new_binary_path, current_binary_path) {
        Ok(outcome) => outcome.is_launched(),
        Err(e) => {
            error!("Update not applied: {}", e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn plan_in(dir: &Path) -> ReplacementPlan {
        let target = UpdateTarget::new(
            dir.join("FXdownloader-linux"),
            dir.join("FXdownloader-linux.new"),
            77,
            PlatformFamily::Posix,
        );
        let policy = ReplacementPolicy::default().with_script_dir(dir.join("nested"));
        ReplacementPlan::new(target, &policy)
    }

    #[test]
    fn test_write_script_replaces_file_instead_of_rewriting_it() {
        let dir = TempDir::new().unwrap();
        let plan = plan_in(dir.path());

        write_script(&plan).unwrap();
        // An interpreter still reading the first script keeps this handle.
        let mut first = fs::File::open(&plan.script_path).unwrap();

        let mut second_plan = plan.clone();
        second_plan.process_id = 78;
        write_script(&second_plan).unwrap();

        let mut old_text = String::new();
        std::io::Read::read_to_string(&mut first, &mut old_text).unwrap();
        assert!(old_text.contains("PID=77\n"));
        assert!(fs::read_to_string(&plan.script_path).unwrap().contains("PID=78\n"));
        assert_eq!(fs::read_to_string(&plan.lock_path).unwrap(), "pid=78\n");

        let leftovers: Vec<_> = fs::read_dir(plan.script_path.parent().unwrap())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty(), "{leftovers:?}");

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&plan.script_path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o755);
        }
    }

    #[test]
    fn test_live_script_detects_fresh_lock_only() {
        let dir = TempDir::new().unwrap();
        let plan = plan_in(dir.path());
        assert!(live_script(&plan).is_none());

        write_script(&plan).unwrap();
        let reason = live_script(&plan).unwrap();
        assert!(reason.contains("already running"));

        let stale = SystemTime::now()
            - Duration::from_secs(plan.policy.max_script_secs() + 60);
        fs::File::options()
            .write(true)
            .open(&plan.lock_path)
            .unwrap()
            .set_modified(stale)
            .unwrap();
        assert!(live_script(&plan).is_none());
    }

    #[test]
    fn test_outcome_display() {
        let launched = ReplacementOutcome::Launched {
            script_path: PathBuf::from("/tmp/fxdownloader_update.sh"),
        };
        assert!(launched.is_launched());
        assert!(launched.to_string().contains("/tmp/fxdownloader_update.sh"));

        let failed = ReplacementOutcome::LaunchFailed("no shell".to_string());
        assert!(!failed.is_launched());
        assert!(failed.to_string().contains("no shell"));
    }

    #[test]
    fn test_apply_update_in_test_harness_is_refused() {
        // The test binary runs from a Cargo target dir unless CARGO_TARGET_DIR moved it.
        let exe = std::env::current_exe().unwrap();
        if exe.components().any(|c| c.as_os_str() == "target") {
            let dir = TempDir::new().unwrap();
            let new = dir.path().join("new");
            fs::write(&new, "x").unwrap();
            assert!(!apply_update(&new, Some(&dir.path().join("current"))));
        }
    }
}
