//! Replacement script generation.
//!
//! The process being replaced cannot overwrite its own executable, so the
//! swap is carried out by a script that outlives it. Rendering is pure: a
//! [`ReplacementPlan`] goes in, script text comes out, and every path, PID
//! and timing bound is embedded as a literal.
//!
//! Both dialects run the same state machine:
//!
//! ```text
//! WaitForExit -> [ForceKill] -> ProcessExited -> Backup -> Install -> Cleanup -> Restart -> SelfDelete
//!                                                  |          |
//!                                                  |          +-> Rollback -> Restart (old binary)
//!                                                  +-> Fatal (LockRetryExhausted)
//! ```
//!
//! Each transition is appended to the log as `state=<name>`.

mod batch;
mod shell;

pub(crate) use shell::quote as shell_quote;

use std::fmt;

use crate::apply::ReplacementPlan;
use crate::config::{DEFAULT_RESTART_DELAY_SECS, ReplacementPolicy};
use crate::platform::PlatformFamily;

/// Script language used to carry out the replacement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptDialect {
    /// Windows batch file run by `cmd.exe`.
    Batch,
    /// POSIX `sh` script.
    Shell,
}

impl ScriptDialect {
    /// Dialect understood by `family`.
    #[must_use]
    pub const fn for_family(family: PlatformFamily) -> Self {
        match family {
            PlatformFamily::Windows => Self::Batch,
            PlatformFamily::Posix => Self::Shell,
        }
    }

    /// Render the script for `plan`.
    #[must_use]
    pub fn render(&self, plan: &ReplacementPlan) -> String {
        match self {
            Self::Batch => batch::render(plan),
            Self::Shell => shell::render(plan),
        }
    }

    /// Script file extension, without the dot.
    #[must_use]
    pub const fn extension(&self) -> &'static str {
        match self {
            Self::Batch => "bat",
            Self::Shell => "sh",
        }
    }

    /// Suffix appended to the full executable name to form the backup path.
    #[must_use]
    pub const fn backup_suffix(&self) -> &'static str {
        match self {
            Self::Batch => ".old",
            Self::Shell => ".backup",
        }
    }

    /// Policy used when the caller does not supply one.
    ///
    /// The shell dialect relaunches one second sooner.
    #[must_use]
    pub fn default_policy(&self) -> ReplacementPolicy {
        match self {
            Self::Batch => ReplacementPolicy::default(),
            Self::Shell => ReplacementPolicy {
                restart_delay_secs: DEFAULT_RESTART_DELAY_SECS - 1,
                ..ReplacementPolicy::default()
            },
        }
    }
}

/// States of the replacement state machine, as written to the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplacementState {
    /// Polling the origin process.
    WaitForExit,
    /// Origin process overran the wait bound and is being killed.
    ForceKill,
    /// Origin process is gone; settling before touching files.
    ProcessExited,
    /// Moving the current binary aside.
    Backup,
    /// Copying the new binary into place.
    Install,
    /// Restoring the backup after a failed install.
    Rollback,
    /// Removing the downloaded file and the backup.
    Cleanup,
    /// Relaunching the application.
    Restart,
    /// Terminal failure, old binary intact.
    Fatal,
    /// Replacement finished.
    Completed,
    /// Script is deleting itself.
    SelfDelete,
}

impl ReplacementState {
    /// Name used in the log.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::WaitForExit => "WaitForExit",
            Self::ForceKill => "ForceKill",
            Self::ProcessExited => "ProcessExited",
            Self::Backup => "Backup",
            Self::Install => "Install",
            Self::Rollback => "Rollback",
            Self::Cleanup => "Cleanup",
            Self::Restart => "Restart",
            Self::Fatal => "Fatal",
            Self::Completed => "Completed",
            Self::SelfDelete => "SelfDelete",
        }
    }

    /// Log marker for this state (`state=<name>`).
    #[must_use]
    pub fn marker(&self) -> String {
        format!("state={}", self.as_str())
    }
}

impl fmt::Display for ReplacementState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log marker written when the relaunched application could not be found.
///
/// Not fatal: the installed binary stays in place.
pub const RESTART_VERIFICATION_FAILED: &str = "RestartVerificationFailed";

/// Exit status of the replacement script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptExit {
    /// New binary installed.
    Completed,
    /// The current binary stayed locked through every backup attempt.
    LockRetryExhausted,
    /// Install failed and the old binary was restored.
    InstallFailed,
    /// Install failed and the backup could not be moved back.
    RollbackFailed,
}

impl ScriptExit {
    /// Process exit code.
    #[must_use]
    pub const fn code(&self) -> i32 {
        match self {
            Self::Completed => 0,
            Self::LockRetryExhausted => 2,
            Self::InstallFailed => 3,
            Self::RollbackFailed => 4,
        }
    }

    /// Name used in the log.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "Completed",
            Self::LockRetryExhausted => "LockRetryExhausted",
            Self::InstallFailed => "InstallFailed",
            Self::RollbackFailed => "RollbackFailed",
        }
    }
}

impl fmt::Display for ScriptExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dialect_for_family() {
        assert_eq!(
            ScriptDialect::for_family(PlatformFamily::Windows),
            ScriptDialect::Batch
        );
        assert_eq!(
            ScriptDialect::for_family(PlatformFamily::Posix),
            ScriptDialect::Shell
        );
        assert_eq!(ScriptDialect::Batch.extension(), "bat");
        assert_eq!(ScriptDialect::Shell.backup_suffix(), ".backup");
    }

    #[test]
    fn test_default_policies() {
        assert_eq!(ScriptDialect::Batch.default_policy().restart_delay_secs, 3);
        assert_eq!(ScriptDialect::Shell.default_policy().restart_delay_secs, 2);
        assert_eq!(ScriptDialect::Shell.default_policy().max_wait_secs, 30);
    }

    #[test]
    fn test_exit_codes_are_stable() {
        assert_eq!(ScriptExit::Completed.code(), 0);
        assert_eq!(ScriptExit::LockRetryExhausted.code(), 2);
        assert_eq!(ScriptExit::InstallFailed.code(), 3);
        assert_eq!(ScriptExit::RollbackFailed.code(), 4);
    }

    #[test]
    fn test_state_marker() {
        assert_eq!(ReplacementState::ForceKill.marker(), "state=ForceKill");
    }
}
