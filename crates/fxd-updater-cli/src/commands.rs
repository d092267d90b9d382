//! Command implementations.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result, bail};
use fxd_updater::{
    BuildKind, ClassifiedAsset, GitHubClient, ReplacementOutcome, ReplacementPolicy, ScriptDialect,
    TargetPlatform, UpdateCheck, UpdateError, UpdateSettings, Updater, Version, assets, download,
    format_bytes,
};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};

use crate::cli::{ApplyArgs, AssetsArgs, CheckArgs, DownloadArgs, RepoArgs};

fn client(args: &RepoArgs) -> Result<GitHubClient> {
    let client = GitHubClient::new(args.repo.clone())?;
    Ok(match &args.api_url {
        Some(url) => client.with_api_url(url.clone()),
        None => client,
    })
}

fn settings(args: &RepoArgs) -> UpdateSettings {
    let mut settings = UpdateSettings::default();
    if let Some(channel) = args.channel {
        settings.channel = channel.into();
    }
    settings
}

/// Read saved settings. A missing file yields the defaults.
pub fn load_settings(path: &Path) -> Result<UpdateSettings> {
    match fs::read_to_string(path) {
        Ok(text) => serde_json::from_str(&text)
            .with_context(|| format!("invalid settings file {}", path.display())),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            debug!("No settings at {}, using defaults", path.display());
            Ok(UpdateSettings::default())
        }
        Err(err) => Err(err).with_context(|| format!("failed to read {}", path.display())),
    }
}

/// Write settings as pretty JSON, creating the parent directory.
pub fn save_settings(path: &Path, settings: &UpdateSettings) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(settings)?;
    fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))
}

/// User-facing advice for an error raised by the updater library.
#[must_use]
pub fn error_hint(error: &anyhow::Error) -> Option<String> {
    let cause = error
        .chain()
        .find_map(|cause| cause.downcast_ref::<UpdateError>())?;
    let mut hint = cause.user_message().to_string();
    if cause.is_retryable() && !hint.contains("try again") {
        hint.push_str(" Trying again later may help.");
    }
    Some(hint)
}

/// Latest release on the configured channel, newer or not.
fn latest(args: &RepoArgs) -> Result<UpdateCheck> {
    let client = client(args)?;
    client
        .check_for_update(&Version::current(), &settings(args))?
        .with_context(|| format!("{} has no published releases", client.repo()))
}

/// Compare a version with the latest release and print the result.
///
/// Returns `None` when `--if-due` finds that no check is due yet.
pub fn run_check(args: &CheckArgs) -> Result<Option<UpdateCheck>> {
    let current = match &args.current_version {
        Some(v) => Version::from_str(v).with_context(|| format!("invalid --current-version '{v}'"))?,
        None => Version::current(),
    };

    let mut settings = match &args.settings {
        Some(path) => load_settings(path)?,
        None => UpdateSettings::default(),
    };
    if let Some(channel) = args.repo.channel {
        settings.channel = channel.into();
    }
    if let Some(skip) = &args.skip_version {
        settings.skip_version(skip.clone());
    }

    if args.if_due && !settings.should_check_on_startup() {
        if settings.enabled {
            println!("Update check skipped: the last check was less than a day ago.");
        } else {
            println!("Update check skipped: checking is disabled in the settings.");
        }
        return Ok(None);
    }

    let client = client(&args.repo)?;
    let Some(check) = client.check_for_update(&current, &settings)? else {
        bail!("{} has no published releases", client.repo());
    };

    if let Some(path) = &args.settings {
        settings.record_check();
        save_settings(path, &settings)?;
    }

    match check.message() {
        Some(message) => println!("{message}"),
        None => println!(
            "FXdownloader {} is up to date (latest: {}).",
            check.current_version, check.latest_version
        ),
    }
    Ok(Some(check))
}

/// Format one asset line of the `assets` listing.
#[must_use]
pub fn asset_line(asset: &ClassifiedAsset) -> String {
    format!(
        "{} {:<40} {:>8} MB  {:<10} {}",
        if asset.recommended { "*" } else { " " },
        asset.name(),
        asset.asset.size_mb(),
        asset.kind.as_str(),
        asset.description
    )
}

/// List the assets of the latest release that fit a platform.
pub fn run_assets(args: &AssetsArgs) -> Result<Vec<ClassifiedAsset>> {
    let platform = args.platform.unwrap_or_else(TargetPlatform::current);
    let check = latest(&args.repo)?;
    let classified = assets::classify_assets(&check.release, platform);

    println!(
        "{} assets for {}:",
        check.release.display_name(),
        platform.display_name()
    );
    if classified.is_empty() {
        println!("  (none)");
    }
    for asset in &classified {
        println!("{}", asset_line(asset));
    }
    Ok(classified)
}

/// Download the recommended asset of the latest release.
pub fn run_download(args: &DownloadArgs) -> Result<PathBuf> {
    let platform = args.platform.unwrap_or_else(TargetPlatform::current);
    let check = latest(&args.repo)?;
    let asset = assets::recommended_asset(&check.release, platform)?;
    let dir = args.dir.clone().unwrap_or_else(std::env::temp_dir);

    info!(
        "Downloading {} ({}) from {}",
        asset.name(),
        format_bytes(asset.asset.size),
        check.release.tag_name
    );

    let bar = if args.no_progress {
        ProgressBar::hidden()
    } else {
        let bar = ProgressBar::new(asset.asset.size);
        if let Ok(style) = ProgressStyle::with_template(
            "  {msg} [{bar:30}] {bytes}/{total_bytes} {bytes_per_sec} ETA {eta}",
        ) {
            bar.set_style(style);
        }
        bar
    };
    bar.set_message(asset.name().to_string());

    let result = download::download_asset(&asset.asset, &dir, |progress| {
        if let Some(total) = progress.total {
            bar.set_length(total);
        }
        bar.set_position(progress.downloaded);
    });
    bar.finish_and_clear();

    let path = result.with_context(|| format!("failed to download {}", asset.name()))?;
    println!("Downloaded {}", path.display());
    Ok(path)
}

/// Hand a downloaded executable over to the replacement script.
pub fn run_apply(args: &ApplyArgs) -> Result<ReplacementOutcome> {
    let mut updater = Updater::new().with_policy(apply_policy(args)?);
    if let Some(pid) = args.pid {
        updater = updater.with_process_id(pid);
    }
    if args.allow_dev_build {
        updater = updater.with_build_kind(BuildKind::Packaged);
    }

    let outcome = updater.apply(&args.new, args.current.as_deref())?;
    println!("{outcome}");
    Ok(outcome)
}

/// Replacement policy for the host dialect with the command-line overrides applied.
pub fn apply_policy(args: &ApplyArgs) -> Result<ReplacementPolicy> {
    let family = fxd_updater::PlatformFamily::current()?;
    let mut policy = ScriptDialect::for_family(family).default_policy();
    if let Some(secs) = args.max_wait {
        policy = policy.with_max_wait_secs(secs);
    }
    if let Some(dir) = &args.script_dir {
        policy = policy.with_script_dir(dir);
    }
    if args.no_pause {
        policy = policy.with_pause_on_error(false);
    }
    Ok(policy)
}
