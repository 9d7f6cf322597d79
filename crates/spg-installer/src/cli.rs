//! Command-line switches for the installer.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use spg_core::{ReleaseType, VerificationPolicy};

use crate::orchestrator::InstallMode;

#[derive(Debug, Parser)]
#[command(
    name = "spg-installer",
    version,
    about = "Install Secure Pass Generator for the current user"
)]
pub struct Cli {
    /// Where the application files come from.
    #[arg(long, value_enum, ignore_case = true, default_value = "online")]
    pub mode: InstallMode,

    /// Release channel to install in online and direct-api modes.
    #[arg(long = "release-type", value_enum, ignore_case = true, default_value = "latest")]
    pub release_type: ReleaseChannel,

    /// Skip SHA-256 verification of the downloaded package.
    #[arg(long = "disable-verification")]
    pub disable_verification: bool,

    /// Fail when no expected hash is available instead of skipping the check.
    #[arg(long = "strict-verification")]
    pub strict_verification: bool,

    /// GitHub token for authenticated API access.
    #[arg(long, env = "SPG_GITHUB_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Folder holding offline install files (default: the installer's folder).
    #[arg(long, value_name = "DIR")]
    pub source: Option<PathBuf>,

    /// Release archive to install in offline mode.
    #[arg(long, value_name = "FILE")]
    pub zip: Option<PathBuf>,

    /// Override the per-user install directory.
    #[arg(long = "install-dir", value_name = "DIR")]
    pub install_dir: Option<PathBuf>,

    /// JSON file with installer settings.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Answer yes to every prompt.
    #[arg(short = 'y', long)]
    pub yes: bool,

    /// Show debug output on the console.
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReleaseChannel {
    Latest,
    #[value(alias = "prerelease")]
    PreRelease,
}

impl From<ReleaseChannel> for ReleaseType {
    fn from(channel: ReleaseChannel) -> Self {
        match channel {
            ReleaseChannel::Latest => Self::Latest,
            ReleaseChannel::PreRelease => Self::PreRelease,
        }
    }
}

impl Cli {
    #[must_use]
    pub fn verification(&self) -> VerificationPolicy {
        VerificationPolicy::from_switches(self.disable_verification, self.strict_verification)
    }
}
