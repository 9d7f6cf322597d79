use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};

use log::{debug, info, warn};

use crate::error::InstallError;
use crate::policy::FileManagementPolicy;

#[derive(Debug, Clone, Copy)]
pub struct ArchiveOptions<'a> {
    /// Empty the install directory (minus `preserve`) before extracting.
    pub clean: bool,
    pub preserve: &'a [String],
    pub policy: &'a FileManagementPolicy,
}

/// What a placement step did to the install directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlacementReport {
    pub extracted_entries: usize,
    pub placed: Vec<String>,
    pub flattened_from: Option<String>,
    pub warnings: Vec<String>,
}

/// Extract `archive` into `install_dir` and flatten a wrapping folder.
///
/// # Errors
/// Returns an error if the policy is malformed, the directory cannot be
/// created, or the archive cannot be read or written out. Cleanup and
/// staging-removal failures are reported as warnings instead.
pub fn extract_and_normalize(
    archive: &Path,
    install_dir: &Path,
    options: &ArchiveOptions<'_>,
) -> Result<PlacementReport, InstallError> {
    let policy = options.policy.compile()?;
    std::fs::create_dir_all(install_dir).map_err(|error| {
        InstallError::io_with_path("failed to create install directory", install_dir, &error)
    })?;

    let mut report = PlacementReport::default();
    if options.clean {
        report
            .warnings
            .extend(clean_install_dir(install_dir, options.preserve, archive));
    }

    let layout = extract_zip(archive, install_dir)?;
    report.extracted_entries = layout.entries;
    info!(
        "Extracted {} entries from {} into {}",
        layout.entries,
        archive.display(),
        install_dir.display()
    );

    let Some(staging_name) = layout.staging_dir() else {
        debug!("Archive layout is already flat");
        return Ok(report);
    };

    let staging = install_dir.join(&staging_name);
    let mut files = Vec::new();
    collect_files(&staging, &mut files)?;
    let selection = policy.select(&files);

    for pattern in &selection.unmatched_required {
        let message = format!("required file '{pattern}' missing from {staging_name}");
        warn!("{message}");
        report.warnings.push(message);
    }

    for source in &selection.files {
        report.placed.push(copy_into(source, install_dir)?);
    }

    if report.placed.is_empty() {
        let message = format!("no files selected from staging folder {staging_name}");
        warn!("{message}");
        report.warnings.push(message);
    } else {
        if let Err(error) = std::fs::remove_dir_all(&staging) {
            let message = format!("failed to remove staging folder {staging_name}: {error}");
            warn!("{message}");
            report.warnings.push(message);
        }
        info!(
            "Flattened {} files out of {staging_name}",
            report.placed.len()
        );
        report.flattened_from = Some(staging_name);
    }

    Ok(report)
}

/// Copy policy-selected files from the top level of `source_dir`.
///
/// # Errors
/// Returns `NotFound` when a required pattern matches nothing, or an I/O
/// error if reading or copying fails.
pub fn copy_with_policy(
    source_dir: &Path,
    install_dir: &Path,
    policy: &FileManagementPolicy,
) -> Result<PlacementReport, InstallError> {
    let policy = policy.compile()?;
    std::fs::create_dir_all(install_dir).map_err(|error| {
        InstallError::io_with_path("failed to create install directory", install_dir, &error)
    })?;

    let files = top_level_files(source_dir)?;
    let selection = policy.select(&files);
    if let Some(pattern) = selection.unmatched_required.first() {
        return Err(InstallError::not_found(format!(
            "required file '{pattern}' in {}",
            source_dir.display()
        )));
    }

    let mut report = PlacementReport::default();
    for source in &selection.files {
        if source.parent() == Some(install_dir) {
            debug!("{} is already in place", source.display());
            continue;
        }
        report.placed.push(copy_into(source, install_dir)?);
    }
    info!(
        "Copied {} files from {} into {}",
        report.placed.len(),
        source_dir.display(),
        install_dir.display()
    );
    Ok(report)
}

fn clean_install_dir(install_dir: &Path, preserve: &[String], keep: &Path) -> Vec<String> {
    clean_with(install_dir, preserve, keep, remove_entry)
}

fn remove_entry(path: &Path) -> std::io::Result<()> {
    if path.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    }
}

/// Remove everything but `preserve` and `keep`; failures become warnings.
fn clean_with(
    install_dir: &Path,
    preserve: &[String],
    keep: &Path,
    mut remove: impl FnMut(&Path) -> std::io::Result<()>,
) -> Vec<String> {
    let mut warnings = Vec::new();
    let entries = match std::fs::read_dir(install_dir) {
        Ok(entries) => entries,
        Err(error) => {
            let message = format!("failed to list {}: {error}", install_dir.display());
            warn!("{message}");
            warnings.push(message);
            return warnings;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();
        if preserve.iter().any(|kept| kept.eq_ignore_ascii_case(&name)) || path == keep {
            debug!("Preserving {name}");
            continue;
        }

        if let Err(error) = remove(&path) {
            let message = format!("failed to remove {}: {error}", path.display());
            warn!("{message}");
            warnings.push(message);
        }
    }

    warnings
}

struct ExtractedLayout {
    entries: usize,
    top_level: BTreeSet<String>,
    root_files: bool,
}

impl ExtractedLayout {
    /// Note an entry's top-level name; `false` for entries with no normal path part.
    fn record(&mut self, relative: &Path, is_dir: bool) -> bool {
        let mut parts = relative.components().filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        });
        let Some(first) = parts.next() else {
            return false;
        };
        if !is_dir && parts.next().is_none() {
            self.root_files = true;
        }
        self.top_level.insert(first);
        self.entries += 1;
        true
    }

    fn staging_dir(&self) -> Option<String> {
        if self.root_files || self.top_level.len() != 1 {
            return None;
        }
        self.top_level.iter().next().cloned()
    }
}

fn extract_zip(zip_path: &Path, dest: &Path) -> Result<ExtractedLayout, InstallError> {
    let file = std::fs::File::open(zip_path)
        .map_err(|error| InstallError::io_with_path("cannot open archive", zip_path, &error))?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|error| InstallError::zip("archive is not a valid zip", error))?;

    let mut layout = ExtractedLayout {
        entries: 0,
        top_level: BTreeSet::new(),
        root_files: false,
    };

    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|error| InstallError::zip("cannot read archive entry", error))?;
        let Some(relative) = entry.enclosed_name() else {
            warn!("Ignoring archive entry '{}' outside the target folder", entry.name());
            continue;
        };
        let is_dir = entry.is_dir();
        if !layout.record(&relative, is_dir) {
            continue;
        }

        let target = dest.join(&relative);
        let dir = if is_dir { Some(target.as_path()) } else { target.parent() };
        if let Some(dir) = dir {
            std::fs::create_dir_all(dir).map_err(|error| {
                InstallError::io_with_path("cannot create extraction folder", dir, &error)
            })?;
        }
        if !is_dir {
            std::fs::File::create(&target)
                .and_then(|mut out| std::io::copy(&mut entry, &mut out))
                .map_err(|error| {
                    InstallError::io_with_path("cannot write extracted file", &target, &error)
                })?;
        }
    }

    Ok(layout)
}

fn collect_files(dir: &Path, files: &mut Vec<PathBuf>) -> Result<(), InstallError> {
    let entries = std::fs::read_dir(dir)
        .map_err(|error| InstallError::io_with_path("failed to read directory", dir, &error))?;
    for entry in entries {
        let entry =
            entry.map_err(|error| InstallError::io("failed to read directory entry", error))?;
        let path = entry.path();
        if path.is_dir() {
            collect_files(&path, files)?;
        } else {
            files.push(path);
        }
    }
    Ok(())
}

fn top_level_files(dir: &Path) -> Result<Vec<PathBuf>, InstallError> {
    let entries = std::fs::read_dir(dir)
        .map_err(|error| InstallError::io_with_path("failed to read source directory", dir, &error))?;
    let mut files = Vec::new();
    for entry in entries {
        let entry =
            entry.map_err(|error| InstallError::io("failed to read directory entry", error))?;
        let path = entry.path();
        if path.is_file() {
            files.push(path);
        }
    }
    Ok(files)
}

fn copy_into(source: &Path, dir: &Path) -> Result<String, InstallError> {
    let name = source
        .file_name()
        .ok_or_else(|| InstallError::Invalid(format!("{} has no file name", source.display())))?;
    let dest = dir.join(name);
    std::fs::copy(source, &dest).map_err(|error| {
        InstallError::io(
            "failed to copy file into install directory",
            std::io::Error::new(
                error.kind(),
                format!("{} -> {}: {error}", source.display(), dest.display()),
            ),
        )
    })?;
    debug!("Placed {}", dest.display());
    Ok(name.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;
    use std::path::Path;

    use super::{ArchiveOptions, clean_with, copy_with_policy, extract_and_normalize, remove_entry};
    use crate::error::InstallError;
    use crate::policy::FileManagementPolicy;

    fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let zip_file = std::fs::File::create(path).expect("zip file should be created");
        let mut writer = zip::ZipWriter::new(zip_file);
        let options = zip::write::SimpleFileOptions::default();
        for (name, content) in entries {
            if name.ends_with('/') {
                writer
                    .add_directory(*name, options)
                    .expect("directory entry should be written");
            } else {
                writer
                    .start_file(*name, options)
                    .expect("file entry should be started");
                writer
                    .write_all(content)
                    .expect("file entry should be written");
            }
        }
        writer.finish().expect("zip archive should be finalized");
    }

    fn preserve() -> Vec<String> {
        vec!["install_log.txt".to_string(), "presets.json".to_string()]
    }

    #[test]
    fn staging_folder_is_flattened_by_policy() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let zip_path = temp.path().join("SecurePassGenerator-PS-3.1.0.zip");
        let install_dir = temp.path().join("install");
        write_zip(
            &zip_path,
            &[
                ("SecurePassGenerator-PS-3.1.0/", b""),
                ("SecurePassGenerator-PS-3.1.0/SecurePassGenerator.ps1", b"script"),
                ("SecurePassGenerator-PS-3.1.0/SecurePassGenerator.ico", b"icon"),
                ("SecurePassGenerator-PS-3.1.0/docs/README.md", b"readme"),
                ("SecurePassGenerator-PS-3.1.0/Install.bat", b"bat"),
            ],
        );
        let policy = FileManagementPolicy::default();

        let report = extract_and_normalize(
            &zip_path,
            &install_dir,
            &ArchiveOptions {
                clean: true,
                preserve: &preserve(),
                policy: &policy,
            },
        )
        .expect("archive should install");

        assert_eq!(
            report.flattened_from.as_deref(),
            Some("SecurePassGenerator-PS-3.1.0")
        );
        assert_eq!(
            std::fs::read(install_dir.join("SecurePassGenerator.ps1"))
                .expect("script should be placed"),
            b"script"
        );
        assert!(install_dir.join("SecurePassGenerator.ico").is_file());
        assert!(install_dir.join("README.md").is_file());
        assert!(!install_dir.join("Install.bat").exists());
        assert!(!install_dir.join("SecurePassGenerator-PS-3.1.0").exists());
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn flat_archive_is_left_as_is() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let zip_path = temp.path().join("flat.zip");
        let install_dir = temp.path().join("install");
        write_zip(
            &zip_path,
            &[
                ("SecurePassGenerator.ps1", b"script"),
                ("assets/icon.ico", b"icon"),
            ],
        );
        let policy = FileManagementPolicy::default();

        let report = extract_and_normalize(
            &zip_path,
            &install_dir,
            &ArchiveOptions {
                clean: false,
                preserve: &[],
                policy: &policy,
            },
        )
        .expect("archive should install");

        assert!(report.flattened_from.is_none());
        assert_eq!(report.extracted_entries, 2);
        assert!(install_dir.join("assets/icon.ico").is_file());
    }

    #[test]
    fn clean_keeps_preserved_files_only() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let zip_path = temp.path().join("app.zip");
        let install_dir = temp.path().join("install");
        std::fs::create_dir_all(install_dir.join("old-version")).expect("old dir");
        std::fs::write(install_dir.join("stale.ps1"), b"old").expect("stale file");
        std::fs::write(install_dir.join("presets.json"), b"{}").expect("presets");
        std::fs::write(install_dir.join("install_log.txt"), b"log").expect("log");
        write_zip(&zip_path, &[("SecurePassGenerator.ps1", b"new")]);
        let policy = FileManagementPolicy::default();

        extract_and_normalize(
            &zip_path,
            &install_dir,
            &ArchiveOptions {
                clean: true,
                preserve: &preserve(),
                policy: &policy,
            },
        )
        .expect("archive should install");

        assert!(!install_dir.join("old-version").exists());
        assert!(!install_dir.join("stale.ps1").exists());
        assert_eq!(
            std::fs::read(install_dir.join("presets.json")).expect("presets kept"),
            b"{}"
        );
        assert!(install_dir.join("install_log.txt").is_file());
        assert!(install_dir.join("SecurePassGenerator.ps1").is_file());
    }

    #[test]
    fn clean_continues_past_removal_failures() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let install = temp.path().join("install");
        std::fs::create_dir_all(install.join("old-folder")).expect("folder should be created");
        for name in ["locked.ps1", "stale.ico", "presets.json"] {
            std::fs::write(install.join(name), "x").expect("file should be written");
        }
        let archive = temp.path().join("App-1.2.0.zip");

        let warnings = clean_with(&install, &preserve(), &archive, |path| {
            if path.ends_with("locked.ps1") {
                Err(std::io::Error::new(
                    std::io::ErrorKind::PermissionDenied,
                    "file in use",
                ))
            } else {
                remove_entry(path)
            }
        });

        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("locked.ps1"));
        assert!(install.join("locked.ps1").exists());
        assert!(install.join("presets.json").exists());
        assert!(!install.join("stale.ico").exists());
        assert!(!install.join("old-folder").exists());
    }

    #[test]
    fn unsafe_entries_are_skipped() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let zip_path = temp.path().join("unsafe.zip");
        let install_dir = temp.path().join("install");
        write_zip(
            &zip_path,
            &[("../outside.txt", b"nope"), ("SecurePassGenerator.ps1", b"ok")],
        );
        let policy = FileManagementPolicy::default();

        extract_and_normalize(
            &zip_path,
            &install_dir,
            &ArchiveOptions {
                clean: false,
                preserve: &[],
                policy: &policy,
            },
        )
        .expect("extraction should not fail");

        assert!(!temp.path().join("outside.txt").exists());
    }

    #[test]
    fn corrupt_archive_is_an_io_error() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let zip_path = temp.path().join("broken.zip");
        std::fs::write(&zip_path, b"definitely not a zip").expect("file should be written");
        let policy = FileManagementPolicy::default();

        let error = extract_and_normalize(
            &zip_path,
            &temp.path().join("install"),
            &ArchiveOptions {
                clean: false,
                preserve: &[],
                policy: &policy,
            },
        )
        .expect_err("broken archive should fail");

        assert!(matches!(error, InstallError::Io { .. }));
    }

    #[test]
    fn copy_with_policy_requires_main_script() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let source = temp.path().join("source");
        std::fs::create_dir_all(&source).expect("source dir");
        std::fs::write(source.join("README.md"), b"readme").expect("readme");

        let error = copy_with_policy(
            &source,
            &temp.path().join("install"),
            &FileManagementPolicy::default(),
        )
        .expect_err("missing script should fail");

        assert!(error.is_not_found());
    }

    #[test]
    fn copy_with_policy_places_selected_files() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let source = temp.path().join("source");
        let install_dir = temp.path().join("install");
        std::fs::create_dir_all(&source).expect("source dir");
        std::fs::write(source.join("SecurePassGenerator.ps1"), b"script").expect("script");
        std::fs::write(source.join("Install.bat"), b"bat").expect("bat");

        let report = copy_with_policy(&source, &install_dir, &FileManagementPolicy::default())
            .expect("copy should succeed");

        assert_eq!(report.placed, vec!["SecurePassGenerator.ps1".to_string()]);
        assert!(!install_dir.join("Install.bat").exists());
    }
}
