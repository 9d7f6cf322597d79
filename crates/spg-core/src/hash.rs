use std::io::BufReader;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::config::VerificationPolicy;
use crate::error::InstallError;
use crate::repo_file::decode_text;

const SHA256_HEX_LEN: usize = 64;
const CHUNK_SIZE: usize = 8 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashStatus {
    Ok,
    Error,
    Skipped,
    Disabled,
}

impl std::fmt::Display for HashStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Ok => "OK",
            Self::Error => "ERROR",
            Self::Skipped => "SKIPPED",
            Self::Disabled => "DISABLED",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HashFailure {
    #[error("file to verify not found: {}", .0.display())]
    FileMissing(PathBuf),
    #[error("no expected SHA-256 hash available and strict verification is enabled")]
    NoExpectedHash,
    #[error("failed to read hash file {}: {message}", path.display())]
    UnreadableHashFile { path: PathBuf, message: String },
    #[error("failed to read file for hashing: {0}")]
    Unreadable(String),
    #[error("SHA-256 mismatch: expected {expected}, actual {actual}")]
    Mismatch { expected: String, actual: String },
}

/// Outcome of one verification attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashResult {
    pub status: HashStatus,
    pub actual_hash: Option<String>,
    pub expected_hash: Option<String>,
    pub failure: Option<HashFailure>,
}

impl HashResult {
    fn status_only(status: HashStatus) -> Self {
        Self {
            status,
            actual_hash: None,
            expected_hash: None,
            failure: None,
        }
    }

    fn failed(failure: HashFailure) -> Self {
        Self {
            status: HashStatus::Error,
            actual_hash: None,
            expected_hash: None,
            failure: Some(failure),
        }
    }

    #[must_use]
    pub fn success(&self) -> bool {
        self.status != HashStatus::Error
    }

    #[must_use]
    pub fn error_message(&self) -> Option<String> {
        self.failure.as_ref().map(ToString::to_string)
    }

    /// Convert a failed result into the shared error taxonomy.
    ///
    /// # Errors
    /// Returns the matching [`InstallError`] when the status is `Error`.
    pub fn into_result(self, file: &Path) -> Result<Self, InstallError> {
        let Some(failure) = self.failure.clone() else {
            return Ok(self);
        };
        Err(match failure {
            HashFailure::FileMissing(path) => {
                InstallError::not_found(format!("file to verify {}", path.display()))
            }
            HashFailure::NoExpectedHash => {
                InstallError::not_found(format!("SHA-256 hash for {}", file.display()))
            }
            HashFailure::UnreadableHashFile { path, message } => InstallError::io(
                "failed to read hash file",
                std::io::Error::other(format!("{}: {message}", path.display())),
            ),
            HashFailure::Unreadable(message) => InstallError::io(
                "failed to read file for checksum",
                std::io::Error::other(message),
            ),
            HashFailure::Mismatch { expected, actual } => InstallError::Corruption {
                file: file.display().to_string(),
                expected,
                actual,
            },
        })
    }
}

/// Where the expected digest comes from. A readable hash file wins.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExpectedHash<'a> {
    pub hash_file: Option<&'a Path>,
    pub literal: Option<&'a str>,
}

/// Verify `file` against the expected SHA-256 under `policy`.
#[must_use]
pub fn verify_file(file: &Path, expected: ExpectedHash<'_>, policy: VerificationPolicy) -> HashResult {
    if !policy.enabled {
        info!("Hash verification disabled, skipping {}", file.display());
        return HashResult::status_only(HashStatus::Disabled);
    }

    if !file.is_file() {
        return HashResult::failed(HashFailure::FileMissing(file.to_path_buf()));
    }

    let mut expected_hash = None;
    if let Some(hash_file) = expected.hash_file.filter(|path| path.exists()) {
        match std::fs::read(hash_file) {
            Ok(raw) => {
                expected_hash = parse_hash_file(&decode_text(&raw));
                if expected_hash.is_none() {
                    warn!("No SHA-256 hash found in {}", hash_file.display());
                }
            }
            Err(error) if policy.strict => {
                return HashResult::failed(HashFailure::UnreadableHashFile {
                    path: hash_file.to_path_buf(),
                    message: error.to_string(),
                });
            }
            Err(error) => {
                warn!(
                    "Ignoring unreadable hash file {}: {error}",
                    hash_file.display()
                );
            }
        }
    }

    let expected_hash = expected_hash.or_else(|| {
        expected
            .literal
            .map(str::trim)
            .filter(|hash| is_sha256_hex(hash))
            .map(str::to_ascii_lowercase)
    });

    let Some(expected_hash) = expected_hash else {
        if policy.strict {
            return HashResult::failed(HashFailure::NoExpectedHash);
        }
        warn!(
            "No expected hash for {}, skipping verification",
            file.display()
        );
        return HashResult::status_only(HashStatus::Skipped);
    };

    let actual_hash = match sha256_file(file) {
        Ok(hash) => hash,
        Err(error) => return HashResult::failed(HashFailure::Unreadable(error.to_string())),
    };

    debug!("SHA-256 of {}: {actual_hash}", file.display());

    if actual_hash.eq_ignore_ascii_case(&expected_hash) {
        info!("Hash verified for {}", file.display());
        HashResult {
            status: HashStatus::Ok,
            actual_hash: Some(actual_hash),
            expected_hash: Some(expected_hash),
            failure: None,
        }
    } else {
        let expected = expected_hash.to_ascii_uppercase();
        let actual = actual_hash.to_ascii_uppercase();
        HashResult {
            status: HashStatus::Error,
            actual_hash: Some(actual.clone()),
            expected_hash: Some(expected.clone()),
            failure: Some(HashFailure::Mismatch { expected, actual }),
        }
    }
}

/// Extract the digest from `sha256sum`-style content, ignoring any file name.
#[must_use]
pub fn parse_hash_file(content: &str) -> Option<String> {
    let first_line = content
        .trim_start_matches('\u{feff}')
        .trim_start()
        .lines()
        .next()?;
    let candidate = first_line.get(..SHA256_HEX_LEN)?;
    if is_sha256_hex(candidate) {
        Some(candidate.to_ascii_lowercase())
    } else {
        None
    }
}

fn is_sha256_hex(value: &str) -> bool {
    value.len() == SHA256_HEX_LEN && value.chars().all(|ch| ch.is_ascii_hexdigit())
}

/// Stream a file through SHA-256 and return the lowercase hex digest.
///
/// # Errors
/// Returns an error if the file cannot be opened or read.
pub fn sha256_file(path: &Path) -> Result<String, InstallError> {
    let file = std::fs::File::open(path).map_err(|error| {
        InstallError::io_with_path("failed to open file for checksum", path, &error)
    })?;
    let mut reader = BufReader::with_capacity(CHUNK_SIZE, file);
    let mut hasher = Sha256::new();
    std::io::copy(&mut reader, &mut hasher).map_err(|error| {
        InstallError::io_with_path("failed to read file for checksum", path, &error)
    })?;
    Ok(format!("{:x}", hasher.finalize()))
}
