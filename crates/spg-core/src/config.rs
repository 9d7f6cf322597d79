use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::InstallError;
use crate::policy::FileManagementPolicy;

pub const DEFAULT_API_BASE: &str = "https://api.github.com";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ReleaseType {
    #[default]
    Latest,
    PreRelease,
}

impl std::fmt::Display for ReleaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Latest => write!(f, "Latest"),
            Self::PreRelease => write!(f, "PreRelease"),
        }
    }
}

/// How the downloaded package is checked before it is installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerificationPolicy {
    pub enabled: bool,
    pub strict: bool,
}

impl VerificationPolicy {
    /// Combine the two CLI switches; disabling wins over strict.
    #[must_use]
    pub fn from_switches(disable: bool, strict: bool) -> Self {
        Self {
            enabled: !disable,
            strict: strict && !disable,
        }
    }
}

impl Default for VerificationPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            strict: false,
        }
    }
}

/// Installer configuration. Built once at startup and passed by reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallerConfig {
    #[serde(default = "default_app_name")]
    pub app_name: String,

    #[serde(default = "default_app_slug")]
    pub app_slug: String,

    #[serde(default = "default_owner")]
    pub owner: String,

    #[serde(default = "default_repo")]
    pub repo: String,

    #[serde(default = "default_api_base")]
    pub api_base: String,

    #[serde(default, skip_serializing)]
    pub token: Option<String>,

    #[serde(default = "default_asset_pattern")]
    pub asset_pattern: String,

    #[serde(default = "default_hash_pattern")]
    pub hash_pattern: String,

    #[serde(default = "default_main_script")]
    pub main_script: String,

    #[serde(default = "default_icon_file")]
    pub icon_file: String,

    #[serde(default)]
    pub file_policy: FileManagementPolicy,

    #[serde(default = "default_direct_api_files")]
    pub direct_api_files: Vec<String>,

    #[serde(default = "default_main_branch")]
    pub main_branch: String,

    #[serde(default = "default_prerelease_branch")]
    pub prerelease_branch: String,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_backoff_unit_ms")]
    pub backoff_unit_ms: u64,

    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_probe_timeout")]
    pub connectivity_timeout_secs: u64,
}

fn default_app_name() -> String {
    "Secure Pass Generator".to_string()
}

fn default_app_slug() -> String {
    "SecurePassGenerator-PS".to_string()
}

fn default_owner() -> String {
    "SecurePassGenerator".to_string()
}

fn default_repo() -> String {
    "SecurePassGenerator-PS".to_string()
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

fn default_asset_pattern() -> String {
    "SecurePassGenerator-PS-*.zip".to_string()
}

fn default_hash_pattern() -> String {
    "SecurePassGenerator-PS-*.zip.sha256".to_string()
}

fn default_main_script() -> String {
    "SecurePassGenerator.ps1".to_string()
}

fn default_icon_file() -> String {
    "SecurePassGenerator.ico".to_string()
}

fn default_direct_api_files() -> Vec<String> {
    vec![
        "SecurePassGenerator.ps1".to_string(),
        "SecurePassGenerator.ico".to_string(),
        "LICENSE".to_string(),
        "README.md".to_string(),
        "CHANGELOG.md".to_string(),
    ]
}

fn default_main_branch() -> String {
    "main".to_string()
}

fn default_prerelease_branch() -> String {
    "prerelease".to_string()
}

fn default_max_retries() -> u32 {
    3
}

fn default_backoff_unit_ms() -> u64 {
    1000
}

fn default_http_timeout() -> u64 {
    60
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_probe_timeout() -> u64 {
    10
}

impl Default for InstallerConfig {
    fn default() -> Self {
        Self {
            app_name: default_app_name(),
            app_slug: default_app_slug(),
            owner: default_owner(),
            repo: default_repo(),
            api_base: default_api_base(),
            token: None,
            asset_pattern: default_asset_pattern(),
            hash_pattern: default_hash_pattern(),
            main_script: default_main_script(),
            icon_file: default_icon_file(),
            file_policy: FileManagementPolicy::default(),
            direct_api_files: default_direct_api_files(),
            main_branch: default_main_branch(),
            prerelease_branch: default_prerelease_branch(),
            max_retries: default_max_retries(),
            backoff_unit_ms: default_backoff_unit_ms(),
            http_timeout_secs: default_http_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            connectivity_timeout_secs: default_probe_timeout(),
        }
    }
}

impl InstallerConfig {
    /// Load a JSON config file; missing fields fall back to defaults.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, InstallError> {
        let content = std::fs::read_to_string(path).map_err(|error| {
            InstallError::io_with_path("failed to read installer config", path, &error)
        })?;
        serde_json::from_str(&content).map_err(|error| {
            InstallError::Invalid(format!(
                "invalid installer config {}: {error}",
                path.display()
            ))
        })
    }

    /// The configured token, if it is non-empty.
    #[must_use]
    pub fn auth_token(&self) -> Option<&str> {
        self.token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
    }

    #[must_use]
    pub fn branch_for(&self, release_type: ReleaseType) -> &str {
        match release_type {
            ReleaseType::Latest => &self.main_branch,
            ReleaseType::PreRelease => &self.prerelease_branch,
        }
    }

    #[must_use]
    pub fn backoff_unit(&self) -> Duration {
        Duration::from_millis(self.backoff_unit_ms)
    }

    #[must_use]
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    #[must_use]
    pub fn connectivity_timeout(&self) -> Duration {
        Duration::from_secs(self.connectivity_timeout_secs)
    }

    #[must_use]
    pub fn user_agent(&self) -> String {
        format!(
            "{}-installer/{}",
            self.app_slug,
            env!("CARGO_PKG_VERSION")
        )
    }
}
