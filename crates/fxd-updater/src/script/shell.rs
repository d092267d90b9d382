//! POSIX `sh` rendering for Linux and macOS.

use std::path::Path;

use crate::apply::ReplacementPlan;

use super::{RESTART_VERIFICATION_FAILED, ScriptExit};

/// Longest process name Linux keeps for `pgrep -x` / `pkill -x`.
const LINUX_COMM_MAX_BYTES: usize = 15;

/// Longest process name Darwin keeps (`MAXCOMLEN`).
const DARWIN_COMM_MAX_BYTES: usize = 16;

/// Single-quote `value` for `sh`.
pub(crate) fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

fn quote_path(path: &Path) -> String {
    quote(&path.to_string_lossy())
}

/// Process name as matched by `pgrep -x`, which sees names cut to `max_bytes`.
fn process_name(image_name: &str, max_bytes: usize) -> &str {
    if image_name.len() <= max_bytes {
        return image_name;
    }
    let mut end = max_bytes;
    while !image_name.is_char_boundary(end) {
        end -= 1;
    }
    &image_name[..end]
}

pub(super) fn render(plan: &ReplacementPlan) -> String {
    let policy = &plan.policy;
    let pause = if policy.pause_on_error {
        "    if [ -t 0 ]; then\n        printf 'Press Enter to close...'\n        read _ || true\n    fi\n"
    } else {
        ""
    };

    format!(
        r#"#!/bin/sh
# FXdownloader replacement script for PID {pid}. Deletes itself when done.

trap '' HUP

SCRIPT={script}
LOG={log}
CURRENT={current}
NEW={new}
BACKUP={backup}
EXE_DIR={exe_dir}
LOCK={lock}
PID={pid}

IMAGE_FULL={image_full}
case "$(uname -s)" in
    Linux) IMAGE={image_linux} ;;
    Darwin) IMAGE={image_darwin} ;;
    *) IMAGE="$IMAGE_FULL" ;;
esac

: > "$LOG"

log() {{
    printf '%s %s\n' "$(date '+%Y-%m-%d %H:%M:%S')" "$*" >> "$LOG"
    printf '%s\n' "$*"
}}

finish() {{
    if [ "$1" -eq {completed} ]; then
        log "state=Completed"
    fi
    log "state=SelfDelete exit=$1"
    rm -f "$LOCK"
    rm -f "$SCRIPT"
    exit "$1"
}}

fatal() {{
    log "state=Fatal exit=$1 reason=$2"
    echo "ERROR: $3"
{pause}}}

sweep() {{
    if command -v pkill >/dev/null 2>&1; then
        pkill -9 -x -- "$IMAGE" >/dev/null 2>&1 || true
    fi
}}

app_running() {{
    if command -v pgrep >/dev/null 2>&1; then
        pgrep -x -- "$IMAGE" >/dev/null 2>&1
    else
        ps -A -o comm= 2>/dev/null | sed 's#.*/##' | grep -Fxq -e "$IMAGE" -e "$IMAGE_FULL"
    fi
}}

launch_alternate() {{
    if [ "$(uname -s)" = Darwin ] && command -v open >/dev/null 2>&1; then
        open "$CURRENT" >/dev/null 2>&1
    elif command -v setsid >/dev/null 2>&1; then
        setsid "$CURRENT" </dev/null >/dev/null 2>&1 &
    else
        "$CURRENT" </dev/null >/dev/null 2>&1 &
    fi
}}

echo "===================================="
echo "FXdownloader - Auto Update"
echo "===================================="
echo ""

log "state=WaitForExit pid=$PID"
waited=0
while kill -0 "$PID" 2>/dev/null; do
    if [ "$waited" -ge {max_wait} ]; then
        log "state=ForceKill pid=$PID waited=$waited"
        kill -9 "$PID" 2>/dev/null || true
        sleep 1
        break
    fi
    sleep {poll}
    waited=$((waited + {poll}))
done

log "state=ProcessExited"
sweep
sleep {settle}

attempt=0
while :; do
    attempt=$((attempt + 1))
    log "state=Backup attempt=$attempt"
    if [ ! -e "$CURRENT" ]; then
        log "nothing to back up at $CURRENT"
        break
    fi
    rm -f "$BACKUP" 2>/dev/null
    if mv -f "$CURRENT" "$BACKUP" 2>>"$LOG"; then
        break
    fi
    if [ "$attempt" -ge {attempts} ]; then
        fatal {lock_exhausted} LockRetryExhausted "Cannot move the old version aside after {attempts} attempts."
        finish {lock_exhausted}
    fi
    log "backup failed, retrying in {retry}s"
    sweep
    sleep {retry}
done

log "state=Install"
if cp -f "$NEW" "$CURRENT" 2>>"$LOG"; then
    chmod +x "$CURRENT" 2>>"$LOG" || log "warning: could not mark $CURRENT executable"
    if [ "$(uname -s)" = Darwin ]; then
        xattr -d com.apple.quarantine "$CURRENT" >/dev/null 2>&1 || true
    fi
    log "state=Cleanup"
    rm -f "$NEW" 2>>"$LOG" || log "warning: could not remove $NEW"
    rm -f "$BACKUP" 2>>"$LOG" || log "warning: could not remove $BACKUP"
    status={completed}
else
    log "state=Rollback"
    rm -f "$CURRENT" 2>/dev/null
    if [ -e "$BACKUP" ] && ! mv -f "$BACKUP" "$CURRENT" 2>>"$LOG"; then
        fatal {rollback_failed} RollbackFailed "Install failed and the old version could not be restored from $BACKUP."
        finish {rollback_failed}
    fi
    fatal {install_failed} InstallFailed "Install failed, the old version was restored."
    status={install_failed}
fi

log "state=Restart"
sleep {restart_delay}
cd "$EXE_DIR" 2>/dev/null || log "warning: cannot enter $EXE_DIR"
if [ ! -e "$CURRENT" ]; then
    log "nothing to relaunch at $CURRENT"
    finish "$status"
fi
nohup "$CURRENT" </dev/null >/dev/null 2>&1 &
sleep {verify}
if ! app_running; then
    log "state=Restart method=alternate"
    launch_alternate
    sleep {verify}
    if ! app_running; then
        log "{restart_failed} image=$IMAGE"
    fi
fi

finish "$status"
"#,
        pid = plan.process_id,
        script = quote_path(&plan.script_path),
        log = quote_path(&plan.log_path),
        current = quote_path(&plan.current_binary_path),
        new = quote_path(&plan.new_binary_path),
        backup = quote_path(&plan.backup_path),
        exe_dir = quote_path(&plan.exe_dir),
        lock = quote_path(&plan.lock_path),
        image_full = quote(&plan.image_name),
        image_linux = quote(process_name(&plan.image_name, LINUX_COMM_MAX_BYTES)),
        image_darwin = quote(process_name(&plan.image_name, DARWIN_COMM_MAX_BYTES)),
        pause = pause,
        poll = policy.poll_interval_secs.max(1),
        max_wait = policy.max_wait_secs,
        settle = policy.settle_secs,
        attempts = policy.max_backup_attempts.max(1),
        retry = policy.retry_delay_secs,
        restart_delay = policy.restart_delay_secs,
        verify = policy.restart_verify_secs,
        completed = ScriptExit::Completed.code(),
        lock_exhausted = ScriptExit::LockRetryExhausted.code(),
        install_failed = ScriptExit::InstallFailed.code(),
        rollback_failed = ScriptExit::RollbackFailed.code(),
        restart_failed = RESTART_VERIFICATION_FAILED,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apply::UpdateTarget;
    use crate::config::ReplacementPolicy;
    use crate::platform::PlatformFamily;

    fn plan(current: &str, new: &str) -> ReplacementPlan {
        let target = UpdateTarget::new(current, new, 31337, PlatformFamily::Posix);
        let policy = ReplacementPolicy::default().with_script_dir("/tmp/fx scripts");
        ReplacementPlan::new(target, &policy)
    }

    #[test]
    fn test_quote() {
        assert_eq!(quote("plain"), "'plain'");
        assert_eq!(quote("it's"), r"'it'\''s'");
        assert_eq!(quote("$HOME `x`"), "'$HOME `x`'");
    }

    #[test]
    fn test_process_name_truncates() {
        assert_eq!(process_name("fxd", LINUX_COMM_MAX_BYTES), "fxd");
        assert_eq!(
            process_name("FXdownloader-linux", LINUX_COMM_MAX_BYTES),
            "FXdownloader-li"
        );
        assert_eq!(
            process_name("FXdownloader-macos", DARWIN_COMM_MAX_BYTES),
            "FXdownloader-mac"
        );
        assert_eq!(process_name("ééééééééé", LINUX_COMM_MAX_BYTES), "ééééééé");
    }

    #[test]
    fn test_render_selects_image_name_per_kernel() {
        let script = plan("/Applications/FX/FXdownloader-macos", "/tmp/new").render();

        assert!(script.contains("IMAGE_FULL='FXdownloader-macos'\n"));
        assert!(script.contains("    Linux) IMAGE='FXdownloader-ma' ;;\n"));
        assert!(script.contains("    Darwin) IMAGE='FXdownloader-mac' ;;\n"));
        assert!(script.contains("    *) IMAGE=\"$IMAGE_FULL\" ;;\n"));
        // Darwin's ps prints full paths, so the fallback also accepts the untruncated name.
        assert!(script.contains(r#"grep -Fxq -e "$IMAGE" -e "$IMAGE_FULL""#));
    }

    #[test]
    fn test_render_embeds_literals() {
        let script = plan("/opt/My Apps/FXdownloader-linux", "/tmp/new bin").render();

        assert!(script.starts_with("#!/bin/sh\n"));
        assert!(script.contains("PID=31337\n"));
        assert!(script.contains("CURRENT='/opt/My Apps/FXdownloader-linux'\n"));
        assert!(script.contains("BACKUP='/opt/My Apps/FXdownloader-linux.backup'\n"));
        assert!(script.contains("NEW='/tmp/new bin'\n"));
        assert!(script.contains("LOG='/tmp/fx scripts/fxdownloader_update.log'\n"));
        assert!(script.contains("IMAGE='FXdownloader-li' ;;\n"));
        assert!(script.contains("LOCK='/tmp/fx scripts/fxdownloader_update.lock'\n"));
        assert!(script.contains("if [ \"$waited\" -ge 30 ]; then"));
        assert!(script.contains("if [ \"$attempt\" -ge 5 ]; then"));
    }

    #[test]
    fn test_render_quotes_hostile_paths() {
        let script = plan("/opt/it's $(rm -rf ~)/fxd", "/tmp/new").render();
        assert!(script.contains(r"CURRENT='/opt/it'\''s $(rm -rf ~)/fxd'"));
    }

    #[test]
    fn test_render_exit_codes_and_darwin_handling() {
        let script = plan("/opt/fxd", "/tmp/new").render();
        assert!(script.contains("finish 2\n"));
        assert!(script.contains("status=3\n"));
        assert!(script.contains("finish 4\n"));
        assert!(script.contains("xattr -d com.apple.quarantine"));
        assert!(script.contains("chmod +x \"$CURRENT\""));
        assert!(script.contains(RESTART_VERIFICATION_FAILED));
    }

    #[test]
    fn test_render_pause_on_error() {
        let mut p = plan("/opt/fxd", "/tmp/new");
        assert!(p.render().contains("read _ || true"));

        p.policy.pause_on_error = false;
        assert!(!p.render().contains("read _"));
    }
}
