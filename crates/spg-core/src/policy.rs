use std::collections::HashSet;
use std::path::{Path, PathBuf};

use glob::Pattern;
use serde::{Deserialize, Serialize};

use crate::error::InstallError;

/// Which files of a source tree belong in the install directory.
///
/// Selection is `(required ∪ optional) − exclude`, matched on file names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileManagementPolicy {
    #[serde(default = "default_required")]
    pub required: Vec<String>,
    #[serde(default = "default_optional")]
    pub optional: Vec<String>,
    #[serde(default = "default_exclude")]
    pub exclude: Vec<String>,
}

fn default_required() -> Vec<String> {
    vec!["SecurePassGenerator.ps1".to_string()]
}

fn default_optional() -> Vec<String> {
    vec![
        "*.ico".to_string(),
        "LICENSE*".to_string(),
        "README*".to_string(),
        "CHANGELOG*".to_string(),
        "*.md".to_string(),
    ]
}

fn default_exclude() -> Vec<String> {
    vec![
        "*.sha256".to_string(),
        "*.zip".to_string(),
        "*.bat".to_string(),
        "install_log.txt".to_string(),
        "presets.json".to_string(),
    ]
}

impl Default for FileManagementPolicy {
    fn default() -> Self {
        Self {
            required: default_required(),
            optional: default_optional(),
            exclude: default_exclude(),
        }
    }
}

impl FileManagementPolicy {
    /// Compile every pattern list.
    ///
    /// # Errors
    /// Returns [`InstallError::Invalid`] for a malformed glob.
    pub fn compile(&self) -> Result<CompiledPolicy, InstallError> {
        Ok(CompiledPolicy {
            required: compile_patterns(&self.required)?,
            optional: compile_patterns(&self.optional)?,
            exclude: compile_patterns(&self.exclude)?,
        })
    }
}

fn compile_patterns(patterns: &[String]) -> Result<Vec<Pattern>, InstallError> {
    patterns
        .iter()
        .map(|pattern| {
            Pattern::new(pattern).map_err(|error| {
                InstallError::Invalid(format!("invalid file pattern '{pattern}': {error}"))
            })
        })
        .collect()
}

pub struct CompiledPolicy {
    required: Vec<Pattern>,
    optional: Vec<Pattern>,
    exclude: Vec<Pattern>,
}

#[derive(Debug, Default)]
pub struct PolicySelection {
    pub files: Vec<PathBuf>,
    pub unmatched_required: Vec<String>,
}

impl CompiledPolicy {
    #[must_use]
    pub fn is_excluded(&self, name: &str) -> bool {
        self.exclude.iter().any(|pattern| pattern.matches(name))
    }

    #[must_use]
    pub fn is_required(&self, name: &str) -> bool {
        self.required.iter().any(|pattern| pattern.matches(name)) && !self.is_excluded(name)
    }

    /// Pick files from `candidates`, required matches first, one per file name.
    #[must_use]
    pub fn select(&self, candidates: &[PathBuf]) -> PolicySelection {
        let mut sorted: Vec<&PathBuf> = candidates.iter().collect();
        sorted.sort();

        let mut seen = HashSet::new();
        let mut selection = PolicySelection::default();

        for (pattern, required) in self
            .required
            .iter()
            .map(|p| (p, true))
            .chain(self.optional.iter().map(|p| (p, false)))
        {
            let mut matched_any = false;
            for path in &sorted {
                let Some(name) = file_name(path) else {
                    continue;
                };
                if !pattern.matches(name) || self.is_excluded(name) {
                    continue;
                }
                matched_any = true;
                if seen.insert(name.to_string()) {
                    selection.files.push((*path).clone());
                }
            }
            if required && !matched_any {
                selection
                    .unmatched_required
                    .push(pattern.as_str().to_string());
            }
        }

        selection
    }
}

fn file_name(path: &Path) -> Option<&str> {
    path.file_name().and_then(|name| name.to_str())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::FileManagementPolicy;

    fn paths(names: &[&str]) -> Vec<PathBuf> {
        names.iter().map(PathBuf::from).collect()
    }

    #[test]
    fn selects_required_and_optional_minus_excluded() {
        let policy = FileManagementPolicy::default()
            .compile()
            .expect("default policy should compile");
        let candidates = paths(&[
            "stage/SecurePassGenerator.ps1",
            "stage/SecurePassGenerator.ico",
            "stage/LICENSE",
            "stage/Install.bat",
            "stage/SecurePassGenerator-PS-3.1.0.zip.sha256",
            "stage/notes.txt",
        ]);

        let selection = policy.select(&candidates);
        let names: Vec<_> = selection
            .files
            .iter()
            .filter_map(|p| p.file_name().and_then(|n| n.to_str()))
            .collect();

        assert_eq!(
            names,
            vec!["SecurePassGenerator.ps1", "SecurePassGenerator.ico", "LICENSE"]
        );
        assert!(selection.unmatched_required.is_empty());
        assert!(policy.is_required("SecurePassGenerator.ps1"));
        assert!(!policy.is_required("LICENSE"));
    }

    #[test]
    fn duplicate_names_are_selected_once() {
        let policy = FileManagementPolicy {
            required: vec!["*.ps1".to_string()],
            optional: vec!["app.*".to_string()],
            exclude: vec![],
        }
        .compile()
        .expect("policy should compile");

        let selection = policy.select(&paths(&["a/app.ps1", "b/app.ps1", "a/app.txt"]));

        assert_eq!(selection.files, paths(&["a/app.ps1", "a/app.txt"]));
    }

    #[test]
    fn exclude_overrides_required() {
        let policy = FileManagementPolicy {
            required: vec!["*.ps1".to_string()],
            optional: vec![],
            exclude: vec!["*.Tests.ps1".to_string()],
        }
        .compile()
        .expect("policy should compile");

        let selection = policy.select(&paths(&["Gen.Tests.ps1"]));

        assert!(selection.files.is_empty());
        assert_eq!(selection.unmatched_required, vec!["*.ps1".to_string()]);
    }

    #[test]
    fn malformed_pattern_is_rejected() {
        let policy = FileManagementPolicy {
            required: vec!["[".to_string()],
            optional: vec![],
            exclude: vec![],
        };
        assert!(policy.compile().is_err());
    }
}
