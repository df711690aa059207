//! Package list input.
//!
//! Reads the dependency set to scan from an npm `package-lock.json`
//! (lockfileVersion 2 or 3), one entry per installed package instance.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

use crate::model::Package;

#[derive(Deserialize)]
struct PackageLock {
    #[serde(default)]
    packages: BTreeMap<String, LockEntry>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct LockEntry {
    version: Option<String>,
    link: bool,
}

/// Loads packages from a lockfile on disk.
pub fn read_lockfile(path: &Path) -> Result<Vec<Package>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading lockfile {}", path.display()))?;
    parse_lockfile(&content).with_context(|| format!("parsing lockfile {}", path.display()))
}

/// Parses `package-lock.json` content into the package list.
///
/// The root project entry (empty key) and workspace links are skipped, as
/// are entries without a resolved version.
pub fn parse_lockfile(content: &str) -> Result<Vec<Package>> {
    let lock: PackageLock = serde_json::from_str(content)?;

    let mut packages = Vec::new();
    for (path, entry) in lock.packages {
        if entry.link {
            continue;
        }
        let Some(name) = package_name(&path) else {
            continue;
        };
        let Some(version) = entry.version else {
            continue;
        };
        packages.push(Package::new(name, version));
    }

    Ok(packages)
}

/// Extracts the package name from a lockfile path key, e.g.
/// `node_modules/a/node_modules/@scope/b` gives `@scope/b`.
fn package_name(path: &str) -> Option<&str> {
    let (_, name) = path.rsplit_once("node_modules/")?;
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}
