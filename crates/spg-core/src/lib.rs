//! Install pipeline for SecurePassGenerator.
//!
//! This crate holds everything between "which package?" and "files are on
//! disk", independent of the console front end:
//! - GitHub release lookup, asset resolution and repository file fetches.
//! - Downloads with strategy fallback and exponential backoff.
//! - SHA-256 verification under disabled/lenient/strict policies.
//! - Zip extraction with selective cleanup and staging-folder flattening.

mod archive;
mod asset;
mod config;
mod download;
mod error;
mod hash;
mod policy;
mod release;
mod repo_file;

/// Archive extraction and policy-driven file placement.
pub use archive::{ArchiveOptions, PlacementReport, copy_with_policy, extract_and_normalize};
/// Release asset selection.
pub use asset::{ResolvedAsset, resolve_asset};
/// Immutable installer configuration.
pub use config::{DEFAULT_API_BASE, InstallerConfig, ReleaseType, VerificationPolicy};
/// Multi-strategy downloader.
pub use download::{DownloadOutcome, DownloadRequest, Downloader, OCTET_STREAM, Strategy};
/// Shared error taxonomy.
pub use error::InstallError;
/// SHA-256 verification.
pub use hash::{
    ExpectedHash, HashFailure, HashResult, HashStatus, parse_hash_file, sha256_file, verify_file,
};
/// File selection rules.
pub use policy::{CompiledPolicy, FileManagementPolicy, PolicySelection};
/// GitHub release API client and models.
pub use release::{AssetDescriptor, FetchedRelease, GitHubClient, ReleaseMetadata};
/// Contents API helpers.
pub use repo_file::{RepoFile, is_binary_path, normalize_payload};
