//! Inputs of a single replacement run.

use std::path::{Path, PathBuf};

use crate::config::ReplacementPolicy;
use crate::platform::PlatformFamily;
use crate::script::ScriptDialect;

/// What to replace, with what, and which process to wait for.
///
/// Built once the new binary is on disk and consumed by
/// [`ReplacementPlan::new`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateTarget {
    /// Executable being replaced.
    pub current_binary_path: PathBuf,
    /// Fully downloaded replacement.
    pub new_binary_path: PathBuf,
    /// Process that must exit before the swap.
    pub process_id: u32,
    /// Host family, which selects the script dialect.
    pub platform_family: PlatformFamily,
}

impl UpdateTarget {
    /// Create a target for `process_id`.
    #[must_use]
    pub fn new(
        current_binary_path: impl Into<PathBuf>,
        new_binary_path: impl Into<PathBuf>,
        process_id: u32,
        platform_family: PlatformFamily,
    ) -> Self {
        Self {
            current_binary_path: current_binary_path.into(),
            new_binary_path: new_binary_path.into(),
            process_id,
            platform_family,
        }
    }
}

/// Everything the generated script needs, resolved to literals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplacementPlan {
    /// Dialect the script is rendered in.
    pub dialect: ScriptDialect,
    /// Executable being replaced.
    pub current_binary_path: PathBuf,
    /// Fully downloaded replacement, deleted after a successful install.
    pub new_binary_path: PathBuf,
    /// Where the old binary is moved before the install.
    pub backup_path: PathBuf,
    /// Where the script is written.
    pub script_path: PathBuf,
    /// Transition log written by the script.
    pub log_path: PathBuf,
    /// Present while a script is live. Written before launch, removed by
    /// the script on every terminal path.
    pub lock_path: PathBuf,
    /// Directory the application is relaunched from.
    pub exe_dir: PathBuf,
    /// File name of the executable, used for name-based process lookups.
    pub image_name: String,
    /// Process that must exit before the swap.
    pub process_id: u32,
    /// Timing and retry bounds.
    pub policy: ReplacementPolicy,
}

impl ReplacementPlan {
    /// Derive the plan for `target` under `policy`.
    #[must_use]
    pub fn new(target: UpdateTarget, policy: &ReplacementPolicy) -> Self {
        let dialect = ScriptDialect::for_family(target.platform_family);
        let script_dir = policy.resolved_script_dir();

        let backup_path = with_suffix(&target.current_binary_path, dialect.backup_suffix());
        let (exe_dir, image_name) =
            split_executable(&target.current_binary_path, target.platform_family);

        Self {
            dialect,
            script_path: script_dir.join(format!(
                "{}.{}",
                policy.script_stem,
                dialect.extension()
            )),
            log_path: script_dir.join(format!("{}.log", policy.script_stem)),
            lock_path: script_dir.join(format!("{}.lock", policy.script_stem)),
            backup_path,
            exe_dir,
            image_name,
            process_id: target.process_id,
            current_binary_path: target.current_binary_path,
            new_binary_path: target.new_binary_path,
            policy: policy.clone(),
        }
    }

    /// Render the script for this plan.
    #[must_use]
    pub fn render(&self) -> String {
        self.dialect.render(self)
    }
}

/// Split an executable path into its directory and file name.
///
/// Windows paths are split on both separators so plans for Windows can be
/// built and inspected on any host.
fn split_executable(path: &Path, family: PlatformFamily) -> (PathBuf, String) {
    let (dir, name) = match family {
        PlatformFamily::Windows => {
            let text = path.to_string_lossy();
            match text.rfind(['\\', '/']) {
                Some(i) => (PathBuf::from(&text[..i]), text[i + 1..].to_string()),
                None => (PathBuf::new(), text.into_owned()),
            }
        }
        PlatformFamily::Posix => (
            path.parent().map(Path::to_path_buf).unwrap_or_default(),
            path.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        ),
    };

    if dir.as_os_str().is_empty() {
        (PathBuf::from("."), name)
    } else {
        (dir, name)
    }
}

/// Append `suffix` to the full file name (`app.exe` becomes `app.exe.old`).
fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_windows_plan_paths() {
        let target = UpdateTarget::new(
            r"C:\Apps\FXdownloader\FXdownloader.exe",
            r"C:\Users\me\Downloads\FXdownloader-Standalone.exe",
            4242,
            PlatformFamily::Windows,
        );
        let policy = ReplacementPolicy::default().with_script_dir("/tmp/scripts");
        let plan = ReplacementPlan::new(target, &policy);

        assert_eq!(plan.dialect, ScriptDialect::Batch);
        assert_eq!(
            plan.backup_path,
            PathBuf::from(r"C:\Apps\FXdownloader\FXdownloader.exe.old")
        );
        assert_eq!(
            plan.script_path,
            Path::new("/tmp/scripts").join("fxdownloader_update.bat")
        );
        assert_eq!(
            plan.log_path,
            Path::new("/tmp/scripts").join("fxdownloader_update.log")
        );
        assert_eq!(
            plan.lock_path,
            Path::new("/tmp/scripts").join("fxdownloader_update.lock")
        );
        assert_eq!(plan.process_id, 4242);
        assert_eq!(plan.image_name, "FXdownloader.exe");
        assert_eq!(plan.exe_dir, PathBuf::from(r"C:\Apps\FXdownloader"));
    }

    #[test]
    fn test_posix_plan_paths() {
        let target = UpdateTarget::new(
            "/opt/fx/FXdownloader-linux",
            "/tmp/FXdownloader-linux.new",
            7,
            PlatformFamily::Posix,
        );
        let plan = ReplacementPlan::new(target, &ReplacementPolicy::default());

        assert_eq!(plan.dialect, ScriptDialect::Shell);
        assert_eq!(
            plan.backup_path,
            PathBuf::from("/opt/fx/FXdownloader-linux.backup")
        );
        assert_eq!(plan.exe_dir, PathBuf::from("/opt/fx"));
        assert_eq!(plan.image_name, "FXdownloader-linux");
        assert_eq!(
            plan.script_path,
            std::env::temp_dir().join("fxdownloader_update.sh")
        );
    }

    #[test]
    fn test_bare_file_name_relaunches_from_cwd() {
        let target = UpdateTarget::new("fxd", "fxd.new", 1, PlatformFamily::Posix);
        let plan = ReplacementPlan::new(target, &ReplacementPolicy::default());
        assert_eq!(plan.exe_dir, PathBuf::from("."));
    }
}
