//! CLI argument definitions for the FXdownloader updater.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use colorchoice_clap::Color;
use fxd_updater::{DEFAULT_REPO, TargetPlatform, UpdateChannel};

#[derive(Parser)]
#[command(
    name = "fxd-update",
    version,
    about = "FXdownloader updater - check, download and apply new releases",
    long_about = "Check GitHub for new FXdownloader releases, download the build that fits \
                  this machine, and replace an installed executable with it.\n\n\
                  The replacement runs in a detached script after the target process exits; \
                  its progress is written to fxdownloader_update.log in the temp directory."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Adjust log verbosity (-v for info, -vv for debug, -q for errors only).
    #[command(flatten)]
    pub verbosity: Verbosity<WarnLevel>,

    /// Control ANSI color output (auto, always, never).
    #[command(flatten)]
    pub color: Color,

    /// Explicit log level (overrides -v/-q flags).
    #[arg(long = "log-level", value_enum, global = true)]
    pub log_level: Option<LogLevelArg>,

    /// Log output format (pretty for human, json for machine parsing).
    #[arg(
        long = "log-format",
        value_enum,
        default_value = "pretty",
        global = true
    )]
    pub log_format: LogFormatArg,

    /// Write logs to a file instead of stderr.
    #[arg(long = "log-file", value_name = "PATH", global = true)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Check whether a newer release is available.
    Check(CheckArgs),

    /// List the release assets that fit a platform.
    Assets(AssetsArgs),

    /// Download the recommended asset for a platform.
    Download(DownloadArgs),

    /// Replace an executable with a downloaded one after its process exits.
    Apply(ApplyArgs),
}

/// Where releases are read from.
#[derive(Args, Clone)]
pub struct RepoArgs {
    /// GitHub repository in OWNER/NAME form.
    #[arg(long = "repo", value_name = "OWNER/NAME", default_value = DEFAULT_REPO)]
    pub repo: String,

    /// GitHub API root, for GitHub Enterprise or mirrors.
    #[arg(long = "api-url", value_name = "URL")]
    pub api_url: Option<String>,

    /// Release channel to follow (default: stable, or the saved setting).
    #[arg(long = "channel", value_enum)]
    pub channel: Option<ChannelArg>,
}

#[derive(Args)]
pub struct CheckArgs {
    #[command(flatten)]
    pub repo: RepoArgs,

    /// Version to compare against (default: this tool's version).
    #[arg(long = "current-version", value_name = "VERSION")]
    pub current_version: Option<String>,

    /// Treat this release as already declined (saved when --settings is given).
    #[arg(long = "skip-version", value_name = "VERSION")]
    pub skip_version: Option<String>,

    /// JSON settings file to read, and to stamp with the check time.
    #[arg(long = "settings", value_name = "PATH")]
    pub settings: Option<PathBuf>,

    /// Only contact GitHub when checking is enabled and the last check is a day old.
    #[arg(long = "if-due", requires = "settings")]
    pub if_due: bool,
}

#[derive(Args)]
pub struct AssetsArgs {
    #[command(flatten)]
    pub repo: RepoArgs,

    /// Platform to list assets for (windows, linux, macos; default: this machine).
    #[arg(long = "platform", value_name = "PLATFORM")]
    pub platform: Option<TargetPlatform>,
}

#[derive(Args)]
pub struct DownloadArgs {
    #[command(flatten)]
    pub repo: RepoArgs,

    /// Platform to download for (default: this machine).
    #[arg(long = "platform", value_name = "PLATFORM")]
    pub platform: Option<TargetPlatform>,

    /// Directory to save the asset in (default: the temp directory).
    #[arg(long = "dir", value_name = "DIR")]
    pub dir: Option<PathBuf>,

    /// Do not show a progress bar.
    #[arg(long = "no-progress")]
    pub no_progress: bool,
}

#[derive(Args)]
pub struct ApplyArgs {
    /// Downloaded executable to install.
    #[arg(value_name = "NEW")]
    pub new: PathBuf,

    /// Executable to replace (default: this tool).
    #[arg(long = "current", value_name = "PATH")]
    pub current: Option<PathBuf>,

    /// Process to wait for before replacing (default: this tool's own PID).
    #[arg(long = "pid", value_name = "PID")]
    pub pid: Option<u32>,

    /// Directory for the script and its log (default: the temp directory).
    #[arg(long = "script-dir", value_name = "DIR")]
    pub script_dir: Option<PathBuf>,

    /// Seconds to wait for the process before killing it.
    #[arg(long = "max-wait", value_name = "SECS")]
    pub max_wait: Option<u32>,

    /// Close the script window on errors instead of waiting for a key press.
    #[arg(long = "no-pause")]
    pub no_pause: bool,

    /// Allow replacing from a development build.
    #[arg(long = "allow-dev-build")]
    pub allow_dev_build: bool,
}

/// CLI release channel choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum ChannelArg {
    Stable,
    Beta,
}

impl From<ChannelArg> for UpdateChannel {
    fn from(value: ChannelArg) -> Self {
        match value {
            ChannelArg::Stable => Self::Stable,
            ChannelArg::Beta => Self::Beta,
        }
    }
}

/// CLI log level choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogLevelArg {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// CLI log format choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogFormatArg {
    Pretty,
    Compact,
    Json,
}
