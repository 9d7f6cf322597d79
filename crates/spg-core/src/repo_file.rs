use std::path::Path;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use log::{debug, info};
use serde::Deserialize;

use crate::error::InstallError;
use crate::release::GitHubClient;

const BINARY_EXTENSIONS: [&str; 10] = [
    "ico", "png", "jpg", "jpeg", "gif", "bmp", "zip", "exe", "dll", "pdf",
];

#[derive(Deserialize)]
struct ContentsResponse {
    #[serde(default)]
    content: String,
    #[serde(default)]
    encoding: Option<String>,
}

/// A repository file and the branch that actually served it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoFile {
    pub path: String,
    pub git_ref: String,
    pub bytes: Vec<u8>,
}

impl GitHubClient {
    /// Fetch one file through the contents API and normalize it for disk.
    ///
    /// # Errors
    /// Returns `NotFound` on 404 (the caller may retry on another branch),
    /// or an error for failed requests and undecodable payloads.
    pub async fn download_repo_file(
        &self,
        path: &str,
        git_ref: &str,
    ) -> Result<Vec<u8>, InstallError> {
        let url = format!("{}?ref={git_ref}", self.repo_url(&format!("contents/{path}")));
        let response: ContentsResponse = self
            .get_json(&url, "repository file")
            .await
            .map_err(|error| {
                if error.is_not_found() {
                    InstallError::not_found(format!("{path} on branch {git_ref}"))
                } else {
                    error
                }
            })?;

        if let Some(encoding) = response.encoding.as_deref()
            && encoding != "base64"
        {
            return Err(InstallError::Invalid(format!(
                "unsupported content encoding '{encoding}' for {path}"
            )));
        }

        let raw = decode_content(&response.content).map_err(|error| {
            InstallError::Invalid(format!("failed to decode {path}: {error}"))
        })?;

        Ok(normalize_payload(path, raw))
    }

    /// Fetch `path` from `branch`, retrying on `fallback_branch` after a 404.
    ///
    /// # Errors
    /// Returns the first non-`NotFound` error, or `NotFound` when neither
    /// branch has the file.
    pub async fn fetch_repo_file_with_fallback(
        &self,
        path: &str,
        branch: &str,
        fallback_branch: &str,
    ) -> Result<RepoFile, InstallError> {
        match self.download_repo_file(path, branch).await {
            Ok(bytes) => Ok(RepoFile {
                path: path.to_string(),
                git_ref: branch.to_string(),
                bytes,
            }),
            Err(error) if error.is_not_found() && branch != fallback_branch => {
                info!("{path} not found on '{branch}', using '{fallback_branch}'");
                let bytes = self.download_repo_file(path, fallback_branch).await?;
                Ok(RepoFile {
                    path: path.to_string(),
                    git_ref: fallback_branch.to_string(),
                    bytes,
                })
            }
            Err(error) => Err(error),
        }
    }

    /// Fetch `path` with branch fallback and write it to `dest`.
    ///
    /// # Errors
    /// Returns the fetch error, or an I/O error if `dest` cannot be written.
    pub async fn write_repo_file(
        &self,
        path: &str,
        branch: &str,
        fallback_branch: &str,
        dest: &Path,
    ) -> Result<RepoFile, InstallError> {
        let file = self
            .fetch_repo_file_with_fallback(path, branch, fallback_branch)
            .await?;
        tokio::fs::write(dest, &file.bytes).await.map_err(|error| {
            InstallError::io_with_path("failed to write repository file", dest, &error)
        })?;
        debug!(
            "Wrote {} from '{}' ({} bytes)",
            dest.display(),
            file.git_ref,
            file.bytes.len()
        );
        Ok(file)
    }
}

fn decode_content(content: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let compact: String = content.chars().filter(|ch| !ch.is_whitespace()).collect();
    STANDARD.decode(compact)
}

#[must_use]
pub fn is_binary_path(path: &str) -> bool {
    Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            BINARY_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}

/// Binary files pass through; text becomes BOM-less UTF-8.
#[must_use]
pub fn normalize_payload(path: &str, raw: Vec<u8>) -> Vec<u8> {
    if is_binary_path(path) {
        return raw;
    }
    decode_text(&raw).into_bytes()
}

/// Text in UTF-8 or BOM-marked UTF-16, returned without any BOM.
pub(crate) fn decode_text(raw: &[u8]) -> String {
    let text = match raw {
        [0xEF, 0xBB, 0xBF, rest @ ..] => String::from_utf8_lossy(rest).into_owned(),
        [0xFF, 0xFE, rest @ ..] => decode_utf16(rest, u16::from_le_bytes),
        [0xFE, 0xFF, rest @ ..] => decode_utf16(rest, u16::from_be_bytes),
        _ => String::from_utf8_lossy(raw).into_owned(),
    };
    text.trim_start_matches('\u{feff}').to_string()
}

fn decode_utf16(bytes: &[u8], to_unit: fn([u8; 2]) -> u16) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| to_unit([pair[0], pair[1]]))
        .collect();
    String::from_utf16_lossy(&units)
}
