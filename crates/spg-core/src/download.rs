use std::path::{Path, PathBuf};
use std::time::Duration;

use futures_util::StreamExt;
use log::{debug, info, warn};
use reqwest::header::{ACCEPT, HeaderValue};
use tokio::io::{AsyncWriteExt, BufWriter};

use crate::config::InstallerConfig;
use crate::error::InstallError;
use crate::release::{AssetDescriptor, GitHubClient, authorize, check_status};

pub const OCTET_STREAM: &str = "application/octet-stream";
const ANY_CONTENT: &str = "*/*";
const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_BACKOFF_UNIT: Duration = Duration::from_secs(1);

/// Transport tried within one retry round, in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Streamed GET through a buffered writer.
    Streaming,
    /// Whole-body request written in one go.
    Buffered,
    /// Unauthenticated GET of the pre-resolved public URL.
    PublicUrl,
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Streaming => "streaming",
            Self::Buffered => "buffered",
            Self::PublicUrl => "public url",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DownloadRequest<'a> {
    pub url: &'a str,
    pub public_url: Option<&'a str>,
    pub dest: &'a Path,
    pub accept: &'static str,
}

impl<'a> DownloadRequest<'a> {
    #[must_use]
    pub fn new(url: &'a str, dest: &'a Path) -> Self {
        Self {
            url,
            public_url: None,
            dest,
            accept: ANY_CONTENT,
        }
    }

    /// Request for a release asset: API endpoint first, public URL last.
    #[must_use]
    pub fn for_asset(asset: &'a AssetDescriptor, dest: &'a Path) -> Self {
        Self {
            url: &asset.url,
            public_url: asset.browser_download_url.as_deref(),
            dest,
            accept: OCTET_STREAM,
        }
    }

    fn strategies(&self) -> Vec<Strategy> {
        let mut strategies = vec![Strategy::Streaming, Strategy::Buffered];
        if self.public_url.is_some_and(|public| public != self.url) {
            strategies.push(Strategy::PublicUrl);
        }
        strategies
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadOutcome {
    pub path: PathBuf,
    pub size: u64,
    pub strategy: Strategy,
    pub round: u32,
}

/// Fetches remote files with strategy fallback and exponential backoff.
#[derive(Debug, Clone)]
pub struct Downloader {
    http: reqwest::Client,
    token: Option<String>,
    max_retries: u32,
    backoff_unit: Duration,
}

impl Downloader {
    #[must_use]
    pub fn new(http: reqwest::Client, token: Option<&str>) -> Self {
        Self {
            http,
            token: token.map(str::to_string),
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_unit: DEFAULT_BACKOFF_UNIT,
        }
    }

    #[must_use]
    pub fn from_github(client: &GitHubClient, config: &InstallerConfig) -> Self {
        Self::new(client.http().clone(), client.token())
            .with_retry_policy(config.max_retries, config.backoff_unit())
    }

    #[must_use]
    pub fn with_retry_policy(mut self, max_retries: u32, backoff_unit: Duration) -> Self {
        self.max_retries = max_retries.max(1);
        self.backoff_unit = backoff_unit;
        self
    }

    /// Delay before `round` (1-based): none for the first, then `2^(round-1)` units.
    #[must_use]
    pub fn backoff_before(&self, round: u32) -> Duration {
        if round <= 1 {
            Duration::ZERO
        } else {
            self.backoff_unit
                .checked_mul(2_u32.saturating_pow(round - 1))
                .unwrap_or(Duration::MAX)
        }
    }

    /// Download `request.url` into `request.dest`.
    ///
    /// # Errors
    /// Returns [`InstallError::Unavailable`] listing every failed strategy
    /// once all rounds are exhausted.
    pub async fn download(
        &self,
        request: DownloadRequest<'_>,
    ) -> Result<DownloadOutcome, InstallError> {
        if let Some(parent) = request.dest.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|error| {
                InstallError::io_with_path("failed to create download directory", parent, &error)
            })?;
        }

        let mut failures = Vec::new();

        for round in 1..=self.max_retries {
            let delay = self.backoff_before(round);
            if !delay.is_zero() {
                info!(
                    "Retrying download in {}s (round {round}/{})",
                    delay.as_secs_f32(),
                    self.max_retries
                );
                tokio::time::sleep(delay).await;
            }

            for strategy in request.strategies() {
                debug!("Downloading {} via {strategy}", request.url);
                match self.try_strategy(strategy, &request).await {
                    Ok(size) if size > 0 => {
                        info!(
                            "Downloaded {} ({size} bytes) via {strategy}",
                            request.dest.display()
                        );
                        return Ok(DownloadOutcome {
                            path: request.dest.to_path_buf(),
                            size,
                            strategy,
                            round,
                        });
                    }
                    Ok(_) => {
                        warn!("Download via {strategy} produced an empty file");
                        failures.push(format!("round {round} {strategy}: empty response"));
                    }
                    Err(error) => {
                        warn!("Download via {strategy} failed: {error}");
                        failures.push(format!("round {round} {strategy}: {error}"));
                    }
                }
                remove_partial(request.dest).await;
            }
        }

        Err(InstallError::unavailable("download", failures.join("; ")))
    }

    async fn try_strategy(
        &self,
        strategy: Strategy,
        request: &DownloadRequest<'_>,
    ) -> Result<u64, InstallError> {
        match strategy {
            Strategy::Streaming => {
                let response = self.send(request.url, request.accept, true).await?;
                stream_to_file(response, request.dest).await
            }
            Strategy::Buffered => {
                let response = self.send(request.url, request.accept, true).await?;
                let bytes = response.bytes().await.map_err(|error| {
                    InstallError::unavailable("download", format!("failed to read body: {error}"))
                })?;
                tokio::fs::write(request.dest, &bytes).await.map_err(|error| {
                    InstallError::io_with_path("failed to write download", request.dest, &error)
                })?;
                Ok(bytes.len() as u64)
            }
            Strategy::PublicUrl => {
                let url = request.public_url.unwrap_or(request.url);
                let response = self.send(url, ANY_CONTENT, false).await?;
                stream_to_file(response, request.dest).await
            }
        }
    }

    async fn send(
        &self,
        url: &str,
        accept: &'static str,
        authenticated: bool,
    ) -> Result<reqwest::Response, InstallError> {
        let token = if authenticated {
            self.token.as_deref()
        } else {
            None
        };
        let response = authorize(
            self.http
                .get(url)
                .header(ACCEPT, HeaderValue::from_static(accept)),
            token,
        )
        .send()
        .await
        .map_err(|error| InstallError::unavailable("download", error.to_string()))?;
        check_status(response, "download", token.is_some()).await
    }
}

async fn stream_to_file(response: reqwest::Response, dest: &Path) -> Result<u64, InstallError> {
    let file = tokio::fs::File::create(dest).await.map_err(|error| {
        InstallError::io_with_path("failed to create download file", dest, &error)
    })?;
    let mut writer = BufWriter::new(file);
    let mut written: u64 = 0;

    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|error| {
            InstallError::unavailable("download", format!("stream error: {error}"))
        })?;
        writer.write_all(&chunk).await.map_err(|error| {
            InstallError::io_with_path("failed to write download data", dest, &error)
        })?;
        written += chunk.len() as u64;
    }

    writer.flush().await.map_err(|error| {
        InstallError::io_with_path("failed to flush download file", dest, &error)
    })?;

    Ok(written)
}

async fn remove_partial(dest: &Path) {
    if tokio::fs::try_exists(dest).await.unwrap_or(false) {
        if let Err(error) = tokio::fs::remove_file(dest).await {
            warn!("Failed to remove partial download {}: {error}", dest.display());
        } else {
            debug!("Removed partial download {}", dest.display());
        }
    }
}
