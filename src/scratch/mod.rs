//! Scratch directory handling.
//!
//! Downloaded files live under `<workdir>/<sanitized repo>`; every character
//! that is not an ASCII letter becomes `_` (acme/my-tool -> acme_my_tool).

use anyhow::{Context, Result, bail};
use std::path::{Component, Path, PathBuf};

pub const DEFAULT_WORKDIR: &str = "tmp";

/// Directory name derived from a repository seed.
pub fn dir_name(seed: &str) -> String {
    seed.chars()
        .map(|c| if c.is_ascii_alphabetic() { c } else { '_' })
        .collect()
}

/// Create (if needed) and return the scratch directory for `seed`.
pub async fn prepare_dir(workdir: &Path, seed: &str) -> Result<PathBuf> {
    let dir = workdir.join(dir_name(seed));
    tokio::fs::create_dir_all(&dir)
        .await
        .with_context(|| format!("Failed to create scratch directory {}", dir.display()))?;
    Ok(dir)
}

/// Resolve a manifest-relative path inside `root`, refusing anything that
/// would land outside of it.
pub fn contained_path(root: &Path, relative: &str) -> Result<PathBuf> {
    let rel = Path::new(relative);
    let mut out = root.to_path_buf();
    let mut depth = 0usize;
    for comp in rel.components() {
        match comp {
            Component::Normal(part) => {
                out.push(part);
                depth += 1;
            }
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                bail!("Refusing to write outside the scratch directory: {relative}")
            }
        }
    }
    if depth == 0 {
        bail!("Empty file path in manifest");
    }
    Ok(out)
}

/// Write `bytes` to `relative` under `root`, creating parent directories.
pub async fn place(root: &Path, relative: &str, bytes: &[u8]) -> Result<PathBuf> {
    let target = contained_path(root, relative)?;
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    tokio::fs::write(&target, bytes)
        .await
        .with_context(|| format!("Failed to write {}", target.display()))?;
    Ok(target)
}
