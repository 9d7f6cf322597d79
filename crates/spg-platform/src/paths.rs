use std::path::{Path, PathBuf};
use thiserror::Error;

pub const LOG_FILE_NAME: &str = "install_log.txt";
pub const PRESETS_FILE_NAME: &str = "presets.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PathsError {
    #[error("Could not determine the AppData directory")]
    DataDirUnavailable,
    #[error("Could not determine the desktop directory")]
    DesktopDirUnavailable,
}

/// Filesystem locations owned by one installation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallPaths {
    pub install_dir: PathBuf,
    pub desktop_dir: PathBuf,
}

impl InstallPaths {
    /// Resolve `%AppData%/<app_slug>` and the current user's desktop.
    ///
    /// # Errors
    /// Returns an error when either base directory cannot be determined.
    pub fn new(app_slug: &str) -> Result<Self, PathsError> {
        let install_dir = dirs::data_dir()
            .ok_or(PathsError::DataDirUnavailable)?
            .join(app_slug);
        let desktop_dir = dirs::desktop_dir()
            .or_else(|| dirs::home_dir().map(|home| home.join("Desktop")))
            .ok_or(PathsError::DesktopDirUnavailable)?;

        Ok(Self {
            install_dir,
            desktop_dir,
        })
    }

    #[must_use]
    pub fn with_dirs(install_dir: PathBuf, desktop_dir: PathBuf) -> Self {
        Self {
            install_dir,
            desktop_dir,
        }
    }

    #[must_use]
    pub fn log_file(&self) -> PathBuf {
        self.install_dir.join(LOG_FILE_NAME)
    }

    #[must_use]
    pub fn presets_file(&self) -> PathBuf {
        self.install_dir.join(PRESETS_FILE_NAME)
    }

    #[must_use]
    pub fn installed_file(&self, name: &str) -> PathBuf {
        self.install_dir.join(name)
    }

    #[must_use]
    pub fn shortcut_file(&self, app_name: &str) -> PathBuf {
        self.desktop_dir.join(format!("{app_name}.lnk"))
    }

    /// File names that survive a clean reinstall.
    #[must_use]
    pub fn preserved_names() -> Vec<String> {
        vec![LOG_FILE_NAME.to_string(), PRESETS_FILE_NAME.to_string()]
    }

    /// Create the install directory if it does not exist yet.
    ///
    /// # Errors
    /// Returns an error if the directory cannot be created.
    pub fn ensure_install_dir(&self) -> std::io::Result<&Path> {
        std::fs::create_dir_all(&self.install_dir)?;
        Ok(&self.install_dir)
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::{InstallPaths, LOG_FILE_NAME, PRESETS_FILE_NAME};

    fn test_paths(root: &Path) -> InstallPaths {
        InstallPaths::with_dirs(root.join("appdata/spg"), root.join("desktop"))
    }

    #[test]
    fn file_paths_use_expected_filenames() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let paths = test_paths(temp.path());

        assert!(paths.log_file().ends_with(Path::new("spg").join(LOG_FILE_NAME)));
        assert!(
            paths
                .presets_file()
                .ends_with(Path::new("spg").join(PRESETS_FILE_NAME))
        );
        assert!(
            paths
                .shortcut_file("Secure Pass Generator")
                .ends_with(Path::new("desktop").join("Secure Pass Generator.lnk"))
        );
    }

    #[test]
    fn preserved_names_cover_log_and_presets() {
        let names = InstallPaths::preserved_names();
        assert!(names.iter().any(|name| name == LOG_FILE_NAME));
        assert!(names.iter().any(|name| name == PRESETS_FILE_NAME));
    }

    #[test]
    fn ensure_install_dir_creates_nested_directory() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let paths = test_paths(temp.path());

        let created = paths
            .ensure_install_dir()
            .expect("install dir should be created");

        assert!(created.is_dir());
        paths
            .ensure_install_dir()
            .expect("creating an existing install dir should succeed");
    }
}
