//! Windows batch rendering.
//!
//! The script avoids delayed expansion and parenthesised blocks, so `!`,
//! `(` and `)` in paths need no escaping. Only `%` and `"` are special
//! inside the quoted literals.

use std::path::Path;

use crate::apply::ReplacementPlan;

use super::{RESTART_VERIFICATION_FAILED, ScriptExit};

/// Escape `value` for use inside a double-quoted batch literal.
fn escape(value: &str) -> String {
    value.replace('%', "%%").replace('"', "\"\"")
}

fn quote(value: &str) -> String {
    format!("\"{}\"", escape(value))
}

fn quote_path(path: &Path) -> String {
    quote(&path.to_string_lossy())
}

/// `ping` sends one echo per second after the first, so waiting `secs`
/// seconds takes `secs + 1` echoes.
fn ping_count(secs: u32) -> u32 {
    secs.saturating_add(1)
}

pub(super) fn render(plan: &ReplacementPlan) -> String {
    let policy = &plan.policy;
    let log = quote_path(&plan.log_path);
    let lock = quote_path(&plan.lock_path);
    let current = quote_path(&plan.current_binary_path);
    let new = quote_path(&plan.new_binary_path);
    let backup = quote_path(&plan.backup_path);
    let exe_dir = quote_path(&plan.exe_dir);
    let image = quote(&plan.image_name);
    let image_filter = quote(&format!("IMAGENAME eq {}", plan.image_name));
    let pause = if policy.pause_on_error { "pause" } else { "rem" };
    let w = format!(">>{log} echo [%date% %time%]");
    let attempts = policy.max_backup_attempts.max(1);
    let poll = policy.poll_interval_secs.max(1);

    let script = format!(
        r#"@echo off
chcp 65001 >nul
setlocal
title FXdownloader update
rem FXdownloader replacement script for PID {pid}. Deletes itself when done.

type nul > {log}
echo ====================================
echo FXdownloader - Auto Update
echo ====================================
echo.

{w} state=WaitForExit pid={pid}
echo Waiting for the application to exit, PID {pid}...
set /a waited=0
:wait_for_exit
tasklist /FI "PID eq {pid}" /NH 2>nul | find " {pid} " >nul
if errorlevel 1 goto process_exited
if %waited% geq {max_wait} goto force_kill
ping -n {poll_ping} 127.0.0.1 >nul
set /a waited+={poll}
goto wait_for_exit

:force_kill
{w} state=ForceKill pid={pid} waited=%waited%
echo Application did not exit, forcing termination...
taskkill /F /PID {pid} >nul 2>&1
ping -n 2 127.0.0.1 >nul

:process_exited
{w} state=ProcessExited
echo Application exited.
taskkill /F /IM {image} >nul 2>&1
echo Waiting for file locks to release...
ping -n {settle_ping} 127.0.0.1 >nul

set /a attempt=0
:backup
set /a attempt+=1
{w} state=Backup attempt=%attempt%
if exist {current} goto backup_move
{w} nothing to back up
goto install
:backup_move
if exist {backup} del /F /Q {backup} >nul 2>&1
move /Y {current} {backup} >nul 2>>{log}
if not errorlevel 1 goto install
if %attempt% geq {attempts} goto lock_retry_exhausted
{w} backup failed, retrying in {retry}s
echo Retry %attempt%/{attempts} - file still locked, waiting...
taskkill /F /IM {image} >nul 2>&1
ping -n {retry_ping} 127.0.0.1 >nul
goto backup

:lock_retry_exhausted
{w} state=Fatal exit={lock_exhausted} reason=LockRetryExhausted
echo ERROR: Cannot move the old version aside after {attempts} attempts.
echo Please close all instances and try again.
{pause}
set "exit_code={lock_exhausted}"
goto finish

:install
{w} state=Install
echo Installing new version...
copy /Y {new} {current} >nul 2>>{log}
if errorlevel 1 goto rollback

{w} state=Cleanup
del /F /Q {new} >nul 2>&1
if exist {new} {w} warning: could not remove the downloaded file
del /F /Q {backup} >nul 2>&1
if exist {backup} {w} warning: could not remove the backup
set "exit_code={completed}"
echo Update completed successfully!
goto restart

:rollback
{w} state=Rollback
echo ERROR: Copy failed! Restoring old version...
if exist {current} del /F /Q {current} >nul 2>&1
if not exist {backup} goto install_failed
move /Y {backup} {current} >nul 2>>{log}
if errorlevel 1 goto rollback_failed
:install_failed
{w} state=Fatal exit={install_failed} reason=InstallFailed
{pause}
set "exit_code={install_failed}"
goto restart

:rollback_failed
{w} state=Fatal exit={rollback_failed} reason=RollbackFailed
echo ERROR: The old version could not be restored. It is kept at {backup}
{pause}
set "exit_code={rollback_failed}"
goto finish

:restart
{w} state=Restart
echo Starting application in {restart_delay} seconds...
ping -n {restart_ping} 127.0.0.1 >nul
if not exist {current} goto finish
cd /d {exe_dir}
explorer.exe {current}
ping -n {verify_ping} 127.0.0.1 >nul
tasklist /FI {image_filter} /NH 2>nul | find /I {image} >nul
if not errorlevel 1 goto finish
{w} state=Restart method=alternate
start "" /D {exe_dir} {current}
ping -n {verify_ping} 127.0.0.1 >nul
tasklist /FI {image_filter} /NH 2>nul | find /I {image} >nul
if not errorlevel 1 goto finish
{w} {restart_failed} image={image}

:finish
if "%exit_code%"=="{completed}" {w} state=Completed
{w} state=SelfDelete exit=%exit_code%
del /F /Q {lock} >nul 2>&1
(goto) 2>nul & del /F /Q "%~f0" & exit /b %exit_code%
"#,
        pid = plan.process_id,
        poll_ping = ping_count(poll),
        settle_ping = ping_count(policy.settle_secs),
        retry_ping = ping_count(policy.retry_delay_secs),
        restart_ping = ping_count(policy.restart_delay_secs),
        verify_ping = ping_count(policy.restart_verify_secs),
        max_wait = policy.max_wait_secs,
        retry = policy.retry_delay_secs,
        restart_delay = policy.restart_delay_secs,
        completed = ScriptExit::Completed.code(),
        lock_exhausted = ScriptExit::LockRetryExhausted.code(),
        install_failed = ScriptExit::InstallFailed.code(),
        rollback_failed = ScriptExit::RollbackFailed.code(),
        restart_failed = RESTART_VERIFICATION_FAILED,
    );

    // cmd.exe mis-parses labels in LF-only files.
    script.replace('\n', "\r\n")
}
