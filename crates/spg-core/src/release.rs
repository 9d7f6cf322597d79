use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderValue};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::config::{InstallerConfig, ReleaseType};
use crate::error::InstallError;

pub(crate) const GITHUB_JSON: &str = "application/vnd.github+json";
const API_VERSION_HEADER: &str = "X-GitHub-Api-Version";
const API_VERSION: &str = "2022-11-28";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AssetDescriptor {
    pub name: String,
    pub id: u64,
    #[serde(default)]
    pub size: u64,
    /// API endpoint for the asset (`/releases/assets/{id}`).
    pub url: String,
    /// Public download URL that bypasses the API.
    #[serde(default)]
    pub browser_download_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseMetadata {
    pub tag_name: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub prerelease: bool,
    #[serde(default)]
    pub draft: bool,
    #[serde(default)]
    pub assets: Vec<AssetDescriptor>,
}

impl ReleaseMetadata {
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(&self.tag_name)
    }
}

/// A release plus what was asked for versus what was served.
#[derive(Debug, Clone)]
pub struct FetchedRelease {
    pub release: ReleaseMetadata,
    pub requested: ReleaseType,
    pub actual: ReleaseType,
    pub fell_back: bool,
}

/// Thin GitHub REST v3 client scoped to one repository.
#[derive(Debug, Clone)]
pub struct GitHubClient {
    http: reqwest::Client,
    api_base: String,
    owner: String,
    repo: String,
    token: Option<String>,
}

impl GitHubClient {
    /// Build a client from the installer configuration.
    ///
    /// # Errors
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn from_config(config: &InstallerConfig) -> Result<Self, InstallError> {
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout())
            .connect_timeout(config.connect_timeout())
            .user_agent(config.user_agent())
            .build()
            .map_err(|error| {
                InstallError::unavailable("HTTP client", format!("failed to build client: {error}"))
            })?;

        Ok(Self::new(
            http,
            &config.api_base,
            &config.owner,
            &config.repo,
            config.auth_token(),
        ))
    }

    #[must_use]
    pub fn new(
        http: reqwest::Client,
        api_base: &str,
        owner: &str,
        repo: &str,
        token: Option<&str>,
    ) -> Self {
        Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            owner: owner.to_string(),
            repo: repo.to_string(),
            token: token
                .map(str::trim)
                .filter(|token| !token.is_empty())
                .map(str::to_string),
        }
    }

    #[must_use]
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    #[must_use]
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    #[must_use]
    pub fn repo_url(&self, path: &str) -> String {
        format!(
            "{}/repos/{}/{}/{}",
            self.api_base,
            self.owner,
            self.repo,
            path.trim_start_matches('/')
        )
    }

    pub(crate) fn get(&self, url: &str, accept: &'static str) -> reqwest::RequestBuilder {
        authorize(
            self.http
                .get(url)
                .header(ACCEPT, HeaderValue::from_static(accept))
                .header(API_VERSION_HEADER, API_VERSION),
            self.token.as_deref(),
        )
    }

    pub(crate) async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        operation: &'static str,
    ) -> Result<T, InstallError> {
        debug!("GET {url}");
        let response = self
            .get(url, GITHUB_JSON)
            .send()
            .await
            .map_err(|error| InstallError::unavailable(operation, error.to_string()))?;
        let response = check_status(response, operation, self.token.is_some()).await?;
        response.json().await.map_err(|error| {
            InstallError::unavailable(operation, format!("failed to parse response: {error}"))
        })
    }

    /// Check that the API host answers at all within `timeout`.
    ///
    /// # Errors
    /// Returns [`InstallError::Unavailable`] when no response arrives.
    pub async fn probe_connectivity(
        &self,
        timeout: std::time::Duration,
    ) -> Result<(), InstallError> {
        let response = self
            .http
            .get(&self.api_base)
            .timeout(timeout)
            .send()
            .await
            .map_err(|error| InstallError::unavailable("connectivity check", error.to_string()))?;
        debug!("Connectivity probe answered with {}", response.status());
        Ok(())
    }

    /// Fetch release metadata for `release_type`.
    ///
    /// A pre-release request with no pre-releases falls back to the newest
    /// stable release and reports that through [`FetchedRelease::fell_back`].
    ///
    /// # Errors
    /// Returns `NotFound` when the repository has no releases, and the usual
    /// auth/availability errors for failed requests.
    pub async fn fetch_release(
        &self,
        release_type: ReleaseType,
    ) -> Result<FetchedRelease, InstallError> {
        match release_type {
            ReleaseType::Latest => {
                let release = self
                    .get_json::<ReleaseMetadata>(&self.repo_url("releases/latest"), "latest release")
                    .await
                    .map_err(|error| {
                        if error.is_not_found() {
                            self.no_releases()
                        } else {
                            error
                        }
                    })?;
                info!(
                    "Latest release: {} ({} assets)",
                    release.display_name(),
                    release.assets.len()
                );
                Ok(FetchedRelease {
                    release,
                    requested: ReleaseType::Latest,
                    actual: ReleaseType::Latest,
                    fell_back: false,
                })
            }
            ReleaseType::PreRelease => {
                let releases = self
                    .get_json::<Vec<ReleaseMetadata>>(&self.repo_url("releases"), "release list")
                    .await?;
                select_prerelease(releases).ok_or_else(|| self.no_releases())
            }
        }
    }

    fn no_releases(&self) -> InstallError {
        warn!("No releases found for {}/{}", self.owner, self.repo);
        InstallError::not_found(format!("release for {}/{}", self.owner, self.repo))
    }
}

/// Newest pre-release, else the newest stable release. `None` when empty.
fn select_prerelease(releases: Vec<ReleaseMetadata>) -> Option<FetchedRelease> {
    let published: Vec<ReleaseMetadata> = releases.into_iter().filter(|r| !r.draft).collect();

    if let Some(release) = published.iter().find(|r| r.prerelease) {
        info!("Pre-release selected: {}", release.display_name());
        return Some(FetchedRelease {
            release: release.clone(),
            requested: ReleaseType::PreRelease,
            actual: ReleaseType::PreRelease,
            fell_back: false,
        });
    }

    let release = published.into_iter().next()?;
    warn!(
        "No pre-release available, falling back to latest release {}",
        release.display_name()
    );
    Some(FetchedRelease {
        release,
        requested: ReleaseType::PreRelease,
        actual: ReleaseType::Latest,
        fell_back: true,
    })
}

pub(crate) fn authorize(
    request: reqwest::RequestBuilder,
    token: Option<&str>,
) -> reqwest::RequestBuilder {
    match token {
        Some(token) => request.header(AUTHORIZATION, format!("token {token}")),
        None => request,
    }
}

/// Map a non-success status onto the error taxonomy.
pub(crate) async fn check_status(
    response: reqwest::Response,
    operation: &'static str,
    token_supplied: bool,
) -> Result<reqwest::Response, InstallError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Err(InstallError::auth(status.as_u16(), token_supplied))
        }
        StatusCode::NOT_FOUND => Err(InstallError::not_found(operation)),
        _ => {
            let body_snippet = response
                .text()
                .await
                .ok()
                .map(|body| response_snippet(&body, 160))
                .unwrap_or_default();
            Err(InstallError::unavailable(
                operation,
                format!("HTTP {status}{body_snippet}"),
            ))
        }
    }
}

fn response_snippet(body: &str, max_chars: usize) -> String {
    let snippet: String = body.chars().take(max_chars).collect();
    if snippet.is_empty() {
        String::new()
    } else {
        format!(": {snippet}")
    }
}
