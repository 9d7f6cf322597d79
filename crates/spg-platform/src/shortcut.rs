use std::fmt::Write as _;
use std::path::PathBuf;

use log::{debug, info};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ShortcutError {
    #[error("Desktop shortcuts are not supported on {os}")]
    Unsupported { os: &'static str },
    #[error("PowerShell is not available: {0}")]
    PowerShellMissing(#[source] which::Error),
    #[error("failed to run PowerShell: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("shortcut creation failed with {status}: {stderr}")]
    Failed { status: String, stderr: String },
    #[error("shortcut was not created at {}", path.display())]
    NotCreated { path: PathBuf },
}

/// Everything needed to write a desktop `.lnk` file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShortcutSpec {
    pub shortcut_path: PathBuf,
    pub target: PathBuf,
    pub arguments: String,
    pub working_dir: PathBuf,
    pub icon: Option<PathBuf>,
    pub description: String,
}

impl ShortcutSpec {
    /// PowerShell snippet that writes the shortcut through `WScript.Shell`.
    #[must_use]
    pub fn powershell_script(&self) -> String {
        let mut script = format!(
            "$shell = New-Object -ComObject WScript.Shell; \
             $lnk = $shell.CreateShortcut({}); \
             $lnk.TargetPath = {}; \
             $lnk.Arguments = {}; \
             $lnk.WorkingDirectory = {}; \
             $lnk.Description = {}; ",
            ps_quote(&self.shortcut_path.to_string_lossy()),
            ps_quote(&self.target.to_string_lossy()),
            ps_quote(&self.arguments),
            ps_quote(&self.working_dir.to_string_lossy()),
            ps_quote(&self.description),
        );
        if let Some(icon) = &self.icon {
            let _ = write!(
                script,
                "$lnk.IconLocation = {}; ",
                ps_quote(&icon.to_string_lossy())
            );
        }
        script.push_str("$lnk.Save()");
        script
    }
}

fn ps_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Host capability the installer needs to finish: creating the launcher.
pub trait DesktopIntegration {
    /// Report whether this host can create shortcuts at all.
    ///
    /// # Errors
    /// Returns an error describing the missing capability.
    fn check_supported(&self) -> Result<(), ShortcutError>;

    /// Create or overwrite the shortcut described by `spec`.
    ///
    /// # Errors
    /// Returns an error if the shortcut could not be written.
    fn create_shortcut(&self, spec: &ShortcutSpec) -> Result<(), ShortcutError>;
}

/// The real desktop, driven through PowerShell on Windows.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemDesktop;

#[cfg(target_os = "windows")]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

#[cfg(target_os = "windows")]
impl DesktopIntegration for SystemDesktop {
    fn check_supported(&self) -> Result<(), ShortcutError> {
        let powershell = which::which("powershell.exe").map_err(ShortcutError::PowerShellMissing)?;
        debug!("Using PowerShell at {}", powershell.display());
        Ok(())
    }

    fn create_shortcut(&self, spec: &ShortcutSpec) -> Result<(), ShortcutError> {
        use std::os::windows::process::CommandExt;

        let powershell = which::which("powershell.exe").map_err(ShortcutError::PowerShellMissing)?;
        let output = std::process::Command::new(powershell)
            .args([
                "-NoProfile",
                "-NonInteractive",
                "-ExecutionPolicy",
                "Bypass",
                "-Command",
                &spec.powershell_script(),
            ])
            .creation_flags(CREATE_NO_WINDOW)
            .output()
            .map_err(ShortcutError::Spawn)?;

        if !output.status.success() {
            return Err(ShortcutError::Failed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        if !spec.shortcut_path.exists() {
            return Err(ShortcutError::NotCreated {
                path: spec.shortcut_path.clone(),
            });
        }

        info!("Shortcut created at {}", spec.shortcut_path.display());
        Ok(())
    }
}

#[cfg(not(target_os = "windows"))]
impl DesktopIntegration for SystemDesktop {
    fn check_supported(&self) -> Result<(), ShortcutError> {
        debug!("Shortcut support probe on {}", std::env::consts::OS);
        Err(ShortcutError::Unsupported {
            os: std::env::consts::OS,
        })
    }

    fn create_shortcut(&self, spec: &ShortcutSpec) -> Result<(), ShortcutError> {
        info!(
            "Cannot create {} on this platform",
            spec.shortcut_path.display()
        );
        Err(ShortcutError::Unsupported {
            os: std::env::consts::OS,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::ShortcutSpec;

    fn spec(icon: Option<PathBuf>) -> ShortcutSpec {
        ShortcutSpec {
            shortcut_path: PathBuf::from(r"C:\Users\me\Desktop\Secure Pass Generator.lnk"),
            target: PathBuf::from("powershell.exe"),
            arguments: r#"-NoProfile -ExecutionPolicy Bypass -File "C:\App\gen.ps1""#.to_string(),
            working_dir: PathBuf::from(r"C:\App"),
            icon,
            description: "Pat's generator".to_string(),
        }
    }

    #[test]
    fn script_escapes_single_quotes() {
        let script = spec(None).powershell_script();
        assert!(script.contains("$lnk.Description = 'Pat''s generator';"));
        assert!(script.ends_with("$lnk.Save()"));
    }

    #[test]
    fn script_sets_icon_only_when_present() {
        assert!(!spec(None).powershell_script().contains("IconLocation"));

        let with_icon = spec(Some(PathBuf::from(r"C:\App\app.ico"))).powershell_script();
        assert!(with_icon.contains(r"$lnk.IconLocation = 'C:\App\app.ico';"));
    }

    #[test]
    fn script_keeps_launch_arguments_intact() {
        let script = spec(None).powershell_script();
        assert!(script.contains(r#"$lnk.Arguments = '-NoProfile -ExecutionPolicy Bypass -File "C:\App\gen.ps1"';"#));
    }

    #[cfg(not(target_os = "windows"))]
    #[test]
    fn system_desktop_reports_unsupported_off_windows() {
        use super::{DesktopIntegration, ShortcutError, SystemDesktop};

        assert!(matches!(
            SystemDesktop.check_supported(),
            Err(ShortcutError::Unsupported { .. })
        ));
    }
}
