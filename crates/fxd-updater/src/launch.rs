//! Detached launch of the replacement script.
//!
//! The script must outlive the process that starts it, so it is started in
//! its own console on Windows and in a new session elsewhere.

use std::io;
use std::path::Path;
use std::process::{Command, Stdio};

use tracing::{debug, info, warn};

use crate::error::{Result, UpdateError};
use crate::platform::PlatformFamily;

/// Starts a written script without waiting for it.
pub trait Launcher {
    /// Start `script_path` detached. Returns once the process is spawned.
    fn launch(&self, script_path: &Path, family: PlatformFamily) -> Result<()>;
}

/// Launcher used outside tests: a new console on Windows, a terminal
/// window or background process group elsewhere.
#[derive(Debug, Default, Clone, Copy)]
pub struct DetachedLauncher;

impl Launcher for DetachedLauncher {
    fn launch(&self, script_path: &Path, family: PlatformFamily) -> Result<()> {
        info!("Launching update script {}", script_path.display());
        match family {
            PlatformFamily::Windows => launch_batch(script_path),
            PlatformFamily::Posix if cfg!(target_os = "macos") => launch_macos(script_path),
            PlatformFamily::Posix => launch_linux(script_path),
        }
    }
}

#[cfg(windows)]
fn launch_batch(script_path: &Path) -> Result<()> {
    use std::os::windows::process::CommandExt;

    const CREATE_NEW_CONSOLE: u32 = 0x0000_0010;
    const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;

    let work_dir = script_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(std::env::temp_dir);

    let child = Command::new("cmd.exe")
        .arg("/c")
        .arg(script_path)
        .current_dir(work_dir)
        .creation_flags(CREATE_NEW_CONSOLE | CREATE_NEW_PROCESS_GROUP)
        .spawn()
        .map_err(|e| UpdateError::LaunchFailed(format!("Failed to start cmd.exe: {e}")))?;

    debug!("Update script started with PID {}", child.id());
    Ok(())
}

#[cfg(not(windows))]
fn launch_batch(_script_path: &Path) -> Result<()> {
    Err(UpdateError::LaunchFailed(
        "batch scripts can only be started on Windows".to_string(),
    ))
}

/// Ask Terminal.app to run the script, falling back to a background run.
fn launch_macos(script_path: &Path) -> Result<()> {
    let command = format!(
        r#"tell application "Terminal" to do script "sh " & quoted form of "{}""#,
        applescript_escape(&script_path.to_string_lossy())
    );

    match Command::new("osascript").arg("-e").arg(command).spawn() {
        Ok(child) => {
            debug!("osascript started with PID {}", child.id());
            Ok(())
        }
        Err(e) => {
            warn!("osascript unavailable ({}), running update in background", e);
            launch_background(script_path)
        }
    }
}

/// Try the known terminal emulators in order, then fall back to a background run.
///
/// Only a missing program moves on to the next candidate. Any other spawn
/// error is reported.
fn launch_linux(script_path: &Path) -> Result<()> {
    for (program, args) in terminal_commands(script_path) {
        let mut command = Command::new(program);
        command.args(&args);
        detach(&mut command);

        match command.spawn() {
            Ok(child) => {
                debug!("Update script started in {} (PID {})", program, child.id());
                return Ok(());
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("{} not found", program);
            }
            Err(e) => {
                return Err(UpdateError::LaunchFailed(format!(
                    "Failed to start {program}: {e}"
                )));
            }
        }
    }

    info!("No terminal emulator found, running update in background");
    launch_background(script_path)
}

/// Terminal emulators tried on Linux, with the arguments that make each run
/// the script.
fn terminal_commands(script_path: &Path) -> Vec<(&'static str, Vec<String>)> {
    let script = script_path.to_string_lossy().into_owned();
    vec![
        (
            "gnome-terminal",
            vec!["--".into(), "sh".into(), script.clone()],
        ),
        ("konsole", vec!["-e".into(), "sh".into(), script.clone()]),
        (
            "xfce4-terminal",
            vec![
                "-e".into(),
                format!("sh {}", crate::script::shell_quote(&script)),
            ],
        ),
        ("xterm", vec!["-e".into(), "sh".into(), script.clone()]),
        ("termux-open", vec![script]),
    ]
}

/// Run the script with `sh` in its own session, without a terminal.
fn launch_background(script_path: &Path) -> Result<()> {
    let mut command = Command::new("sh");
    command.arg(script_path);
    detach(&mut command);

    let child = command
        .spawn()
        .map_err(|e| UpdateError::LaunchFailed(format!("Failed to start sh: {e}")))?;
    debug!("Update script started in background (PID {})", child.id());
    Ok(())
}

/// Null stdio and a new session, so the script has no controlling terminal
/// and survives the caller's terminal closing.
fn detach(command: &mut Command) {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;

        // SAFETY: setsid is async-signal-safe and the closure touches no
        // memory shared with the parent.
        #[allow(unsafe_code)]
        unsafe {
            command.pre_exec(|| {
                if libc::setsid() == -1 {
                    return Err(io::Error::last_os_error());
                }
                Ok(())
            });
        }
    }
}

fn applescript_escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_order() {
        let commands = terminal_commands(Path::new("/tmp/fxdownloader_update.sh"));
        let programs: Vec<&str> = commands.iter().map(|(p, _)| *p).collect();
        assert_eq!(
            programs,
            vec![
                "gnome-terminal",
                "konsole",
                "xfce4-terminal",
                "xterm",
                "termux-open"
            ]
        );
    }

    #[test]
    fn test_xfce_gets_single_command_string() {
        let commands = terminal_commands(Path::new("/tmp/my dir/fxdownloader_update.sh"));
        let (_, args) = &commands[2];
        assert_eq!(
            args,
            &vec![
                "-e".to_string(),
                "sh '/tmp/my dir/fxdownloader_update.sh'".to_string()
            ]
        );
    }

    #[test]
    fn test_applescript_escape() {
        assert_eq!(applescript_escape(r#"/tmp/a "b"\c"#), r#"/tmp/a \"b\"\\c"#);
    }

    #[cfg(not(windows))]
    #[test]
    fn test_batch_launch_rejected_off_windows() {
        let result = DetachedLauncher.launch(Path::new("/tmp/x.bat"), PlatformFamily::Windows);
        assert!(matches!(result, Err(UpdateError::LaunchFailed(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_background_launch_runs_script() {
        let dir = tempfile::TempDir::new().unwrap();
        let marker = dir.path().join("ran");
        let script = dir.path().join("touch.sh");
        std::fs::write(&script, format!("touch '{}'\n", marker.display())).unwrap();

        launch_background(&script).unwrap();

        for _ in 0..50 {
            if marker.exists() {
                return;
            }
            std::thread::sleep(std::time::Duration::from_millis(100));
        }
        panic!("background script did not run");
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_background_launch_starts_new_session() {
        let dir = tempfile::TempDir::new().unwrap();
        let report = dir.path().join("session");
        let script = dir.path().join("session.sh");
        std::fs::write(
            &script,
            format!(
                "echo \"$$ $(ps -o sid= -p $$)\" > '{0}.part' && mv '{0}.part' '{0}'\n",
                report.display()
            ),
        )
        .unwrap();

        launch_background(&script).unwrap();

        let mut contents = String::new();
        for _ in 0..50 {
            if let Ok(text) = std::fs::read_to_string(&report) {
                contents = text;
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(100));
        }
        let fields: Vec<&str> = contents.split_whitespace().collect();
        assert_eq!(fields.len(), 2, "no session report: {contents:?}");
        assert_eq!(fields[0], fields[1], "script is not a session leader");

        let own = Command::new("ps")
            .args(["-o", "sid=", "-p", &std::process::id().to_string()])
            .output()
            .unwrap();
        let own_sid = String::from_utf8_lossy(&own.stdout).trim().to_string();
        assert_ne!(own_sid, fields[1]);
    }
}
