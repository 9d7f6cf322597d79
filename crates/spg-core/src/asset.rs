use glob::Pattern;
use log::{debug, info};

use crate::error::InstallError;
use crate::release::{AssetDescriptor, ReleaseMetadata};

const HASH_SUFFIX: &str = ".sha256";

/// The package to install plus its companion hash file, when published.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAsset {
    pub asset: AssetDescriptor,
    pub hash_asset: Option<AssetDescriptor>,
}

fn compile(pattern: &str) -> Result<Pattern, InstallError> {
    Pattern::new(pattern).map_err(|error| {
        InstallError::Invalid(format!("invalid asset pattern '{pattern}': {error}"))
    })
}

/// Pick the package asset and its hash asset from `release`.
///
/// Several matches resolve to the lexicographically greatest name, which
/// is the newest when file names embed a sortable version.
///
/// # Errors
/// Returns `NotFound` when no asset matches `asset_glob`, or `Invalid` for a
/// malformed pattern.
pub fn resolve_asset(
    release: &ReleaseMetadata,
    asset_glob: &str,
    hash_glob: &str,
) -> Result<ResolvedAsset, InstallError> {
    let asset_pattern = compile(asset_glob)?;
    let hash_pattern = compile(hash_glob)?;

    let asset = release
        .assets
        .iter()
        .filter(|candidate| {
            asset_pattern.matches(&candidate.name) && !is_hash_file(&candidate.name)
        })
        .max_by(|a, b| a.name.cmp(&b.name))
        .cloned()
        .ok_or_else(|| {
            InstallError::not_found(format!(
                "asset matching '{asset_glob}' in release {}",
                release.tag_name
            ))
        })?;

    let exact_hash_name = format!("{}{HASH_SUFFIX}", asset.name);
    let hash_asset = release
        .assets
        .iter()
        .find(|candidate| candidate.name == exact_hash_name)
        .or_else(|| {
            release
                .assets
                .iter()
                .find(|candidate| hash_pattern.matches(&candidate.name))
        })
        .filter(|candidate| candidate.id != asset.id)
        .cloned();

    info!("Selected asset {} ({} bytes)", asset.name, asset.size);
    match &hash_asset {
        Some(hash) => info!("Hash file asset: {}", hash.name),
        None => debug!("No hash file asset published for {}", asset.name),
    }

    Ok(ResolvedAsset { asset, hash_asset })
}

fn is_hash_file(name: &str) -> bool {
    name.to_ascii_lowercase().ends_with(HASH_SUFFIX)
}
