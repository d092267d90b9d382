//! Argument parsing and offline command behaviour.

use clap::Parser;
use fxd_updater::release::Asset;
use fxd_updater::{
    AssetKind, ClassifiedAsset, TargetPlatform, UpdateChannel, UpdateError, UpdateSettings,
};
use fxd_updater_cli::cli::{CheckArgs, Cli, Command};
use fxd_updater_cli::commands::{
    apply_policy, asset_line, error_hint, load_settings, run_apply, run_check, save_settings,
};
use tempfile::TempDir;

fn parse(args: &[&str]) -> Cli {
    Cli::try_parse_from(std::iter::once("fxd-update").chain(args.iter().copied())).unwrap()
}

#[test]
fn test_check_defaults() {
    let cli = parse(&["check"]);
    let Command::Check(args) = cli.command else {
        panic!("expected check");
    };
    assert_eq!(args.repo.repo, fxd_updater::DEFAULT_REPO);
    assert!(args.repo.channel.is_none());
    assert!(args.current_version.is_none());
    assert!(args.settings.is_none());
    assert!(!args.if_due);
}

#[test]
fn test_check_with_options() {
    let cli = parse(&[
        "check",
        "--repo",
        "someone/FXdownloader",
        "--channel",
        "beta",
        "--current-version",
        "1.2",
        "--log-level",
        "debug",
    ]);
    let Command::Check(args) = cli.command else {
        panic!("expected check");
    };
    assert_eq!(args.repo.repo, "someone/FXdownloader");
    assert_eq!(
        args.repo.channel.map(UpdateChannel::from),
        Some(UpdateChannel::Beta)
    );
    assert_eq!(args.current_version.as_deref(), Some("1.2"));
    assert!(cli.log_level.is_some());
}

#[test]
fn test_platform_argument() {
    let cli = parse(&["assets", "--platform", "darwin"]);
    let Command::Assets(args) = cli.command else {
        panic!("expected assets");
    };
    assert_eq!(args.platform, Some(TargetPlatform::MacOs));

    let bad = Cli::try_parse_from(["fxd-update", "assets", "--platform", "plan9"]);
    assert!(bad.is_err());
}

#[test]
fn test_apply_arguments_and_policy() {
    let cli = parse(&[
        "apply",
        "/tmp/FXdownloader-linux",
        "--current",
        "/opt/fx/FXdownloader-linux",
        "--pid",
        "99",
        "--max-wait",
        "10",
        "--script-dir",
        "/tmp/fx",
        "--no-pause",
    ]);
    let Command::Apply(args) = cli.command else {
        panic!("expected apply");
    };
    assert_eq!(args.pid, Some(99));
    assert!(!args.allow_dev_build);

    let policy = apply_policy(&args).unwrap();
    assert_eq!(policy.max_wait_secs, 10);
    assert!(!policy.pause_on_error);
    assert_eq!(policy.resolved_script_dir(), std::path::PathBuf::from("/tmp/fx"));
}

#[test]
fn test_apply_missing_artifact_fails_before_launch() {
    let dir = TempDir::new().unwrap();
    let new = dir.path().join("missing");
    let scripts = dir.path().join("scripts");
    let new_arg = new.to_string_lossy().into_owned();
    let scripts_arg = scripts.to_string_lossy().into_owned();

    let cli = parse(&[
        "apply",
        &new_arg,
        "--allow-dev-build",
        "--script-dir",
        &scripts_arg,
    ]);
    let Command::Apply(args) = cli.command else {
        panic!("expected apply");
    };

    let error = run_apply(&args).unwrap_err();
    assert!(matches!(
        error.downcast_ref::<UpdateError>(),
        Some(UpdateError::MissingArtifact(_))
    ));
    assert!(!scripts.exists());
    assert_eq!(
        error_hint(&error).as_deref(),
        Some("The downloaded update file could not be found.")
    );
}

#[test]
fn test_asset_line_marks_recommended() {
    let asset = ClassifiedAsset {
        asset: Asset {
            name: "FXdownloader-Standalone.exe".to_string(),
            size: 3 * 1024 * 1024,
            browser_download_url: "https://example.com/a".to_string(),
            content_type: "application/octet-stream".to_string(),
            digest: None,
            state: "uploaded".to_string(),
        },
        kind: AssetKind::Standalone,
        description: AssetKind::Standalone.description(TargetPlatform::Windows),
        recommended: true,
    };

    let line = asset_line(&asset);
    assert!(line.starts_with("* FXdownloader-Standalone.exe"));
    assert!(line.contains("3.0 MB"));
    assert!(line.contains("standalone"));
}

#[test]
fn test_global_log_flags() {
    let cli = parse(&["--log-format", "json", "--log-file", "/tmp/fxd.log", "check", "-v"]);
    assert!(cli.verbosity.is_present());
    assert_eq!(
        cli.log_file.as_deref(),
        Some(std::path::Path::new("/tmp/fxd.log"))
    );
}

fn check_args(args: &[&str]) -> CheckArgs {
    let cli = parse(&[&["check"], args].concat());
    let Command::Check(args) = cli.command else {
        panic!("expected check");
    };
    args
}

#[test]
fn test_if_due_requires_settings() {
    assert!(Cli::try_parse_from(["fxd-update", "check", "--if-due"]).is_err());
}

#[test]
fn test_check_not_due_leaves_settings_alone() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("settings.json");
    let mut settings = UpdateSettings::default();
    settings.record_check();
    save_settings(&path, &settings).unwrap();
    let saved = std::fs::read_to_string(&path).unwrap();
    let path_arg = path.to_string_lossy().into_owned();

    // The API root is unreachable, so a network call would fail the command.
    let args = check_args(&[
        "--api-url",
        "http://127.0.0.1:9",
        "--settings",
        &path_arg,
        "--if-due",
    ]);
    assert!(run_check(&args).unwrap().is_none());
    assert_eq!(std::fs::read_to_string(&path).unwrap(), saved);
}

#[test]
fn test_check_disabled_in_settings_is_not_due() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("settings.json");
    save_settings(&path, &UpdateSettings::with_enabled(false)).unwrap();
    let path_arg = path.to_string_lossy().into_owned();

    let args = check_args(&[
        "--api-url",
        "http://127.0.0.1:9",
        "--settings",
        &path_arg,
        "--if-due",
    ]);
    assert!(run_check(&args).unwrap().is_none());
}

#[test]
fn test_due_check_reaches_the_network() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("settings.json");
    let path_arg = path.to_string_lossy().into_owned();

    let args = check_args(&[
        "--api-url",
        "http://127.0.0.1:9",
        "--settings",
        &path_arg,
        "--if-due",
    ]);
    let error = run_check(&args).unwrap_err();
    assert!(error.downcast_ref::<UpdateError>().is_some(), "{error:#}");
    assert!(!path.exists(), "a failed check must not be recorded");
}

#[test]
fn test_load_settings() {
    let dir = TempDir::new().unwrap();
    let missing = load_settings(&dir.path().join("none.json")).unwrap();
    assert!(missing.enabled);
    assert!(missing.last_check.is_none());

    let bad = dir.path().join("bad.json");
    std::fs::write(&bad, "{ not json").unwrap();
    assert!(load_settings(&bad).is_err());

    let good = dir.path().join("sub").join("good.json");
    let mut settings = UpdateSettings::default();
    settings.channel = UpdateChannel::Beta;
    settings.skip_version("v2.0.0");
    save_settings(&good, &settings).unwrap();
    let loaded = load_settings(&good).unwrap();
    assert_eq!(loaded.channel, UpdateChannel::Beta);
    assert!(loaded.should_skip_version("2.0.0"));
}

#[test]
fn test_error_hint() {
    let network = anyhow::Error::new(UpdateError::Network("refused".to_string()))
        .context("failed to check");
    let hint = error_hint(&network).unwrap();
    assert!(hint.contains("internet connection"));
    assert!(hint.ends_with("Trying again later may help."));

    let launch = anyhow::Error::new(UpdateError::LaunchFailed("spawn".to_string()));
    assert_eq!(
        error_hint(&launch).as_deref(),
        Some("Could not start the update process. Please try again.")
    );

    let missing = anyhow::Error::new(UpdateError::MissingArtifact("x".into()));
    assert!(!error_hint(&missing).unwrap().contains("Trying again"));

    assert!(error_hint(&anyhow::anyhow!("plain failure")).is_none());
}
