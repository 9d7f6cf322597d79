//! Platform glue for the SecurePassGenerator installer.
//!
//! Resolves per-user install locations and wraps the desktop shortcut
//! capability so the install pipeline can treat it as an opaque operation.

mod paths;
mod shortcut;

pub use paths::{InstallPaths, LOG_FILE_NAME, PRESETS_FILE_NAME, PathsError};
pub use shortcut::{DesktopIntegration, ShortcutError, ShortcutSpec, SystemDesktop};
