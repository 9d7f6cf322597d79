use std::path::{Path, PathBuf};

use log::{debug, error, info, warn};
use spg_core::{
    ArchiveOptions, DownloadRequest, Downloader, ExpectedHash, GitHubClient, HashStatus,
    InstallError, InstallerConfig, ReleaseType, VerificationPolicy, copy_with_policy,
    extract_and_normalize, resolve_asset, verify_file,
};
use spg_platform::{DesktopIntegration, InstallPaths, ShortcutSpec};

use crate::prompt::Prompt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum InstallMode {
    /// Install from files next to the installer.
    Offline,
    /// Download the packaged release from GitHub.
    Online,
    /// Fetch individual files through the GitHub contents API.
    #[value(alias = "directapi")]
    DirectApi,
}

impl InstallMode {
    fn needs_network(self) -> bool {
        !matches!(self, Self::Offline)
    }
}

impl std::fmt::Display for InstallMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Offline => "Offline",
            Self::Online => "Online",
            Self::DirectApi => "DirectAPI",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallState {
    Start,
    PrerequisiteCheck,
    SourceResolution,
    Verification,
    Placement,
    ShortcutCreation,
    Done,
    Failed,
}

const STEP_COUNT: usize = 5;

impl InstallState {
    fn step(self) -> Option<(usize, &'static str)> {
        match self {
            Self::PrerequisiteCheck => Some((1, "Checking prerequisites")),
            Self::SourceResolution => Some((2, "Resolving installation source")),
            Self::Verification => Some((3, "Verifying package")),
            Self::Placement => Some((4, "Installing files")),
            Self::ShortcutCreation => Some((5, "Creating desktop shortcut")),
            Self::Start | Self::Done | Self::Failed => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct InstallOptions {
    pub mode: InstallMode,
    pub release_type: ReleaseType,
    pub verification: VerificationPolicy,
    pub source_dir: PathBuf,
    pub zip: Option<PathBuf>,
}

/// Summary of one install run.
#[derive(Debug)]
pub struct InstallReport {
    pub requested_mode: InstallMode,
    pub mode: InstallMode,
    pub state: InstallState,
    pub install_dir: PathBuf,
    pub release_tag: Option<String>,
    pub hash_status: Option<HashStatus>,
    pub placed: Vec<String>,
    pub warnings: Vec<String>,
    pub error: Option<InstallError>,
}

impl InstallReport {
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.state == InstallState::Done
    }

    #[must_use]
    pub fn exit_code(&self) -> u8 {
        u8::from(!self.succeeded())
    }
}

enum ResolvedSource {
    Script { dir: PathBuf },
    Archive { zip: PathBuf, hash_file: Option<PathBuf> },
}

/// Drives one install run from prerequisite checks to the shortcut.
pub struct Orchestrator<'a> {
    config: &'a InstallerConfig,
    paths: &'a InstallPaths,
    desktop: &'a dyn DesktopIntegration,
    prompt: &'a dyn Prompt,
    state: InstallState,
    mode: InstallMode,
    release_tag: Option<String>,
    hash_status: Option<HashStatus>,
    placed: Vec<String>,
    warnings: Vec<String>,
}

impl<'a> Orchestrator<'a> {
    #[must_use]
    pub fn new(
        config: &'a InstallerConfig,
        paths: &'a InstallPaths,
        desktop: &'a dyn DesktopIntegration,
        prompt: &'a dyn Prompt,
    ) -> Self {
        Self {
            config,
            paths,
            desktop,
            prompt,
            state: InstallState::Start,
            mode: InstallMode::Offline,
            release_tag: None,
            hash_status: None,
            placed: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub async fn run(mut self, options: &InstallOptions) -> InstallReport {
        self.mode = options.mode;
        info!(
            "Installing {} ({} mode, {} release) into {}",
            self.config.app_name,
            options.mode,
            options.release_type,
            self.paths.install_dir.display()
        );

        let outcome = self.execute(options).await;
        let error = match outcome {
            Ok(()) => {
                self.transition(InstallState::Done);
                info!(
                    "{} installed successfully ({} warnings)",
                    self.config.app_name,
                    self.warnings.len()
                );
                None
            }
            Err(failure) => {
                self.transition(InstallState::Failed);
                error!("Installation failed ({}): {failure}", failure.kind());
                error!("See {} for details", self.paths.log_file().display());
                Some(failure)
            }
        };

        InstallReport {
            requested_mode: options.mode,
            mode: self.mode,
            state: self.state,
            install_dir: self.paths.install_dir.clone(),
            release_tag: self.release_tag,
            hash_status: self.hash_status,
            placed: self.placed,
            warnings: self.warnings,
            error,
        }
    }

    async fn execute(&mut self, options: &InstallOptions) -> Result<(), InstallError> {
        self.transition(InstallState::PrerequisiteCheck);
        let client = GitHubClient::from_config(self.config)?;
        self.mode = self.check_prerequisites(&client, options.mode).await?;

        self.transition(InstallState::SourceResolution);
        let staging = tempfile::Builder::new()
            .prefix("spg-install-")
            .tempdir()
            .map_err(|error| InstallError::io("failed to create staging directory", error))?;
        let source = match self.mode {
            InstallMode::Offline => self.resolve_offline(options)?,
            InstallMode::Online => {
                self.resolve_online(&client, options, staging.path())
                    .await?
            }
            InstallMode::DirectApi => {
                self.resolve_direct_api(&client, options.release_type, staging.path())
                    .await?
            }
        };

        self.transition(InstallState::Verification);
        if let ResolvedSource::Archive { zip, hash_file } = &source {
            self.verify_archive(zip, hash_file.as_deref(), options.verification)?;
        } else {
            debug!("No package to verify in {} mode", self.mode);
        }

        self.transition(InstallState::Placement);
        self.place(&source)?;

        self.transition(InstallState::ShortcutCreation);
        self.create_shortcut()
    }

    fn transition(&mut self, next: InstallState) {
        debug!("State {:?} -> {next:?}", self.state);
        self.state = next;
        if let Some((index, label)) = next.step() {
            info!("[{index}/{STEP_COUNT}] {label}");
        }
    }

    fn warn(&mut self, message: String) {
        warn!("{message}");
        self.warnings.push(message);
    }

    async fn check_prerequisites(
        &mut self,
        client: &GitHubClient,
        mode: InstallMode,
    ) -> Result<InstallMode, InstallError> {
        self.desktop.check_supported().map_err(|error| {
            InstallError::unavailable("desktop integration", error.to_string())
        })?;

        let mut mode = mode;
        if mode.needs_network()
            && let Err(failure) = client
                .probe_connectivity(self.config.connectivity_timeout())
                .await
        {
            warn!("Connectivity check failed: {failure}");
            mode = match mode {
                InstallMode::Online
                    if self
                        .prompt
                        .confirm("GitHub is unreachable. Continue with an offline install?") =>
                {
                    self.warn("network unavailable, switched to offline install".to_string());
                    InstallMode::Offline
                }
                InstallMode::DirectApi
                    if self
                        .prompt
                        .confirm("GitHub is unreachable. Continue the direct download anyway?") =>
                {
                    self.warn("continuing without a successful connectivity check".to_string());
                    InstallMode::DirectApi
                }
                _ => return Err(failure),
            };
        }

        self.check_write_access()?;
        Ok(mode)
    }

    fn check_write_access(&self) -> Result<(), InstallError> {
        let install_dir = self.paths.ensure_install_dir().map_err(|error| {
            InstallError::io_with_path(
                "failed to create install directory",
                &self.paths.install_dir,
                &error,
            )
        })?;
        tempfile::NamedTempFile::new_in(install_dir).map_err(|error| {
            InstallError::io_with_path("install directory is not writable", install_dir, &error)
        })?;
        debug!("Write access confirmed for {}", install_dir.display());
        Ok(())
    }

    fn resolve_offline(&self, options: &InstallOptions) -> Result<ResolvedSource, InstallError> {
        let zip = match &options.zip {
            Some(zip) if zip.is_file() => Some(zip.clone()),
            Some(zip) => {
                return Err(InstallError::not_found(format!(
                    "archive {}",
                    zip.display()
                )));
            }
            None => find_local_archive(&options.source_dir, &self.config.asset_pattern)?,
        };

        if let Some(zip) = zip {
            info!("Installing from local archive {}", zip.display());
            let hash_file = sibling_hash_file(&zip);
            return Ok(ResolvedSource::Archive {
                zip,
                hash_file: Some(hash_file),
            });
        }

        let script = options.source_dir.join(&self.config.main_script);
        if !script.is_file() {
            return Err(InstallError::not_found(format!(
                "{} next to the installer ({})",
                self.config.main_script,
                options.source_dir.display()
            )));
        }
        info!("Installing script files from {}", options.source_dir.display());
        Ok(ResolvedSource::Script {
            dir: options.source_dir.clone(),
        })
    }

    async fn resolve_online(
        &mut self,
        client: &GitHubClient,
        options: &InstallOptions,
        staging: &Path,
    ) -> Result<ResolvedSource, InstallError> {
        let fetched = client.fetch_release(options.release_type).await?;
        if fetched.fell_back {
            info!(
                "No pre-release published; installing latest release {}",
                fetched.release.tag_name
            );
        }
        info!(
            "Using release {} ({})",
            fetched.release.display_name(),
            fetched.release.tag_name
        );
        self.release_tag = Some(fetched.release.tag_name.clone());

        let resolved = resolve_asset(
            &fetched.release,
            &self.config.asset_pattern,
            &self.config.hash_pattern,
        )?;

        let verification = options.verification;
        if verification.enabled && verification.strict && resolved.hash_asset.is_none() {
            return Err(InstallError::not_found(format!(
                "hash file asset for {} (strict verification)",
                resolved.asset.name
            )));
        }

        let downloader = Downloader::from_github(client, self.config);
        let zip = staging.join(&resolved.asset.name);
        downloader
            .download(DownloadRequest::for_asset(&resolved.asset, &zip))
            .await?;

        let mut hash_file = None;
        if let Some(hash_asset) = resolved.hash_asset.as_ref().filter(|_| verification.enabled) {
            let dest = staging.join(&hash_asset.name);
            match downloader
                .download(DownloadRequest::for_asset(hash_asset, &dest))
                .await
            {
                Ok(_) => hash_file = Some(dest),
                Err(failure) if verification.strict => return Err(failure),
                Err(failure) => {
                    self.warn(format!("hash file {} unavailable: {failure}", hash_asset.name));
                }
            }
        }

        Ok(ResolvedSource::Archive { zip, hash_file })
    }

    async fn resolve_direct_api(
        &mut self,
        client: &GitHubClient,
        release_type: ReleaseType,
        staging: &Path,
    ) -> Result<ResolvedSource, InstallError> {
        let config = self.config;
        let policy = config.file_policy.compile()?;
        let branch = config.branch_for(release_type);
        let fallback = config.main_branch.as_str();

        for path in &config.direct_api_files {
            let name = Path::new(path)
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .ok_or_else(|| InstallError::Invalid(format!("invalid repository path '{path}'")))?;

            match client
                .write_repo_file(path, branch, fallback, &staging.join(&name))
                .await
            {
                Ok(file) => info!("Fetched {path} from '{}'", file.git_ref),
                Err(failure @ InstallError::Io { .. }) => return Err(failure),
                Err(failure) if policy.is_required(&name) => return Err(failure),
                Err(failure) => self.warn(format!("optional file {path} skipped: {failure}")),
            }
        }

        Ok(ResolvedSource::Script {
            dir: staging.to_path_buf(),
        })
    }

    fn verify_archive(
        &mut self,
        zip: &Path,
        hash_file: Option<&Path>,
        policy: VerificationPolicy,
    ) -> Result<(), InstallError> {
        let result = verify_file(
            zip,
            ExpectedHash {
                hash_file,
                literal: None,
            },
            policy,
        );
        self.hash_status = Some(result.status);
        info!("Hash verification status: {}", result.status);
        if result.status == HashStatus::Skipped {
            self.warn(format!("{} was not verified (no hash available)", display_name(zip)));
        }
        result.into_result(zip).map(|_| ())
    }

    fn place(&mut self, source: &ResolvedSource) -> Result<(), InstallError> {
        let paths = self.paths;
        let install_dir = &paths.install_dir;
        let report = match source {
            ResolvedSource::Script { dir } => {
                copy_with_policy(dir, install_dir, &self.config.file_policy)?
            }
            ResolvedSource::Archive { zip, .. } => {
                let preserve = InstallPaths::preserved_names();
                extract_and_normalize(
                    zip,
                    install_dir,
                    &ArchiveOptions {
                        clean: true,
                        preserve: &preserve,
                        policy: &self.config.file_policy,
                    },
                )?
            }
        };

        for warning in report.warnings {
            self.warn(warning);
        }
        self.placed = report.placed;
        if paths.presets_file().is_file() {
            info!("Kept existing presets in {}", paths.presets_file().display());
        }

        let script = paths.installed_file(&self.config.main_script);
        if !script.is_file() {
            return Err(InstallError::not_found(format!(
                "{} in {}",
                self.config.main_script,
                install_dir.display()
            )));
        }
        Ok(())
    }

    fn create_shortcut(&mut self) -> Result<(), InstallError> {
        let spec = self.shortcut_spec();
        if spec.icon.is_none() {
            self.warn(format!(
                "icon {} not installed; shortcut uses the default icon",
                self.config.icon_file
            ));
        }
        self.desktop.create_shortcut(&spec).map_err(|failure| {
            InstallError::io("failed to create desktop shortcut", std::io::Error::other(failure))
        })
    }

    fn shortcut_spec(&self) -> ShortcutSpec {
        let script = self.paths.installed_file(&self.config.main_script);
        let icon = self.paths.installed_file(&self.config.icon_file);
        ShortcutSpec {
            shortcut_path: self.paths.shortcut_file(&self.config.app_name),
            target: PathBuf::from("powershell.exe"),
            arguments: launch_arguments(&script),
            working_dir: self.paths.install_dir.clone(),
            icon: icon.is_file().then_some(icon),
            description: self.config.app_name.clone(),
        }
    }
}

#[must_use]
pub fn launch_arguments(script: &Path) -> String {
    format!(
        "-NoProfile -ExecutionPolicy Bypass -File \"{}\"",
        script.display()
    )
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map_or_else(|| path.display().to_string(), |name| name.to_string_lossy().into_owned())
}

fn sibling_hash_file(zip: &Path) -> PathBuf {
    let mut name = zip.file_name().unwrap_or_default().to_os_string();
    name.push(".sha256");
    zip.with_file_name(name)
}

/// Newest local archive matching the release asset pattern, if any.
fn find_local_archive(dir: &Path, pattern: &str) -> Result<Option<PathBuf>, InstallError> {
    let pattern = glob::Pattern::new(pattern)
        .map_err(|error| InstallError::Invalid(format!("invalid asset pattern: {error}")))?;
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Ok(None);
    };
    Ok(entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| {
                        pattern.matches(name) && !name.to_ascii_lowercase().ends_with(".sha256")
                    })
        })
        .max())
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::{InstallMode, InstallState, find_local_archive, launch_arguments, sibling_hash_file};

    #[test]
    fn launch_arguments_quote_the_script_path() {
        let args = launch_arguments(Path::new(r"C:\Users\me\AppData\Roaming\SPG\SecurePassGenerator.ps1"));
        assert_eq!(
            args,
            r#"-NoProfile -ExecutionPolicy Bypass -File "C:\Users\me\AppData\Roaming\SPG\SecurePassGenerator.ps1""#
        );
    }

    #[test]
    fn hash_file_sits_next_to_archive() {
        let hash = sibling_hash_file(Path::new("dist/App-1.2.0.zip"));
        assert_eq!(hash, Path::new("dist/App-1.2.0.zip.sha256"));
    }

    #[test]
    fn local_archive_lookup_prefers_greatest_name() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        for name in [
            "SecurePassGenerator-PS-3.0.0.zip",
            "SecurePassGenerator-PS-3.1.0.zip",
            "SecurePassGenerator-PS-3.1.0.zip.sha256",
        ] {
            std::fs::write(temp.path().join(name), b"x").expect("file should be written");
        }

        let found = find_local_archive(temp.path(), "SecurePassGenerator-PS-*.zip*")
            .expect("pattern should compile");

        assert_eq!(
            found.as_deref(),
            Some(temp.path().join("SecurePassGenerator-PS-3.1.0.zip").as_path())
        );
    }

    #[test]
    fn missing_source_dir_means_no_archive() {
        let found = find_local_archive(Path::new("no/such/dir"), "*.zip")
            .expect("pattern should compile");
        assert!(found.is_none());
    }

    #[test]
    fn only_working_states_are_numbered_steps() {
        assert_eq!(InstallState::PrerequisiteCheck.step().map(|s| s.0), Some(1));
        assert_eq!(InstallState::ShortcutCreation.step().map(|s| s.0), Some(5));
        assert!(InstallState::Done.step().is_none());
        assert!(InstallMode::DirectApi.needs_network());
        assert!(!InstallMode::Offline.needs_network());
    }
}
