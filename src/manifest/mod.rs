/*!
Fragment discovery.

Sources, in merge order:
  1. command line   (--entrypoint, --files a,b, --install)
  2. `.diem.json`   whole document is a fragment
  3. `package.json` the `diem` field is a fragment

Remote failures of any kind (transport, HTTP status, JSON shape) make that
fragment absent. They are logged at debug level and never abort the run.
*/

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::args::ParsedArguments;
use crate::config::{EffectiveConfig, PartialConfig, merge_present};
use crate::remote::{RepositoryName, RepositorySource};

pub const MANIFEST_FILE: &str = ".diem.json";
pub const PACKAGE_FILE: &str = "package.json";

#[derive(Deserialize)]
struct PackageManifest {
    #[serde(default)]
    diem: Option<PartialConfig>,
}

/// Parse a `.diem.json` document.
pub fn parse_manifest(bytes: &[u8]) -> Result<PartialConfig> {
    serde_json::from_slice(bytes).context("Invalid .diem.json")
}

/// Parse a `package.json` document and take its `diem` field.
pub fn parse_package_field(bytes: &[u8]) -> Result<Option<PartialConfig>> {
    let pkg: PackageManifest = serde_json::from_slice(bytes).context("Invalid package.json")?;
    Ok(pkg.diem)
}

/// Fragment contributed by command-line options. `None` when no relevant
/// option was given.
pub fn fragment_from_options(parsed: &ParsedArguments) -> Option<PartialConfig> {
    let fragment = PartialConfig {
        files: parsed.text("files").map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        }),
        entrypoint: parsed.text("entrypoint").map(str::to_string),
        install_dependencies: parsed.option("install").map(|_| parsed.enabled("install")),
    };
    (!fragment.is_empty()).then_some(fragment)
}

async fn fetch_fragment<S, F>(
    source: &S,
    repo: &RepositoryName,
    branch: &str,
    path: &str,
    parse: F,
) -> Option<PartialConfig>
where
    S: RepositorySource,
    F: FnOnce(&[u8]) -> Result<Option<PartialConfig>>,
{
    let outcome = match source.fetch(repo, branch, path).await {
        Ok(bytes) => parse(bytes.as_slice()),
        Err(e) => Err(e),
    };
    match outcome {
        Ok(Some(fragment)) => {
            crate::log_trace!("{path}: {fragment:?}");
            Some(fragment)
        }
        Ok(None) => {
            crate::log_debug!("{path}: no diem configuration");
            None
        }
        Err(e) => {
            crate::log_debug!("{path}: skipped ({e:#})");
            None
        }
    }
}

/// Fetch both remote fragments concurrently. The result keeps source order.
pub async fn fetch_remote_fragments<S: RepositorySource>(
    source: &S,
    repo: &RepositoryName,
    branch: &str,
) -> [Option<PartialConfig>; 2] {
    let (manifest, package) = tokio::join!(
        fetch_fragment(source, repo, branch, MANIFEST_FILE, |b| parse_manifest(b).map(Some)),
        fetch_fragment(source, repo, branch, PACKAGE_FILE, parse_package_field),
    );
    [manifest, package]
}

/// Resolve the effective configuration for `repo` at `branch`.
pub async fn resolve_config<S: RepositorySource>(
    source: &S,
    repo: &RepositoryName,
    branch: &str,
    parsed: &ParsedArguments,
) -> EffectiveConfig {
    let [manifest, package] = fetch_remote_fragments(source, repo, branch).await;
    merge_present([fragment_from_options(parsed), manifest, package])
}
