//! Version selection helpers.

use ha2ha_core::constants::SUPPORTED_VERSIONS;
use semver::Version;

/// Protocol major from an extension URI path suffix (`…/v<N>`).
pub fn major_from_uri(uri: &str) -> Option<u64> {
    let last = uri.trim_end_matches('/').rsplit('/').next()?;
    last.strip_prefix('v')?.parse().ok()
}

/// Every spec version the peer claims: the primary version plus the
/// optional comma-separated `supportedVersions` list. Unparseable entries
/// are dropped.
fn peer_versions(primary: Version, supported: Option<&str>) -> Vec<Version> {
    let mut versions = vec![primary];
    if let Some(list) = supported {
        versions.extend(
            list.split(',')
                .filter_map(|v| Version::parse(v.trim()).ok()),
        );
    }
    versions
}

fn our_versions() -> Vec<Version> {
    SUPPORTED_VERSIONS
        .iter()
        .filter_map(|v| Version::parse(v).ok())
        .collect()
}

/// The highest mutually supported version.
///
/// Both sides' versions are restricted to the highest semver major they
/// share; within that major each side contributes its best, and the lower
/// of the two wins (lower minor, then lower patch).
pub fn select_effective_version(
    peer_primary: Version,
    peer_supported: Option<&str>,
) -> Option<Version> {
    let ours = our_versions();
    let theirs = peer_versions(peer_primary, peer_supported);

    let shared_major = ours
        .iter()
        .map(|v| v.major)
        .filter(|major| theirs.iter().any(|v| v.major == *major))
        .max()?;

    let our_best = ours
        .into_iter()
        .filter(|v| v.major == shared_major)
        .max()?;
    let their_best = theirs
        .into_iter()
        .filter(|v| v.major == shared_major)
        .max()?;
    Some(our_best.min(their_best))
}
