//! API key resolution.
//!
//! The key is taken from the `SOCKET_API_KEY` environment variable when
//! set, otherwise from the Socket settings file under the platform data
//! directory:
//!
//! - Linux: `~/.local/share/socket/settings`
//! - macOS: `~/Library/Application Support/socket/settings`
//! - Windows: `%APPDATA%\socket\settings`
//!
//! The settings file is base64-encoded JSON carrying an `apiToken` field.
//! Resolution happens once, up front; the resolved key (or its absence) is
//! injected into [`crate::Scanner::from_credentials`], and nothing below
//! that reads the environment or filesystem.

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;
use std::path::{Path, PathBuf};

const API_KEY_VAR: &str = "SOCKET_API_KEY";

#[derive(Deserialize)]
struct SocketSettings {
    #[serde(rename = "apiToken")]
    api_token: Option<String>,
}

/// Resolves the API key from the environment or the settings file.
///
/// Returns `Ok(None)` when no key is configured anywhere, which selects
/// the unauthenticated strategy. A settings file that exists but cannot be
/// decoded is an error rather than a silent downgrade.
pub fn resolve_api_key() -> Result<Option<String>> {
    if let Ok(key) = std::env::var(API_KEY_VAR) {
        if !key.is_empty() {
            return Ok(Some(key));
        }
    }

    match settings_path() {
        Some(path) if path.exists() => read_settings_key(&path),
        _ => Ok(None),
    }
}

/// Location of the Socket settings file, if a data directory exists.
pub fn settings_path() -> Option<PathBuf> {
    Some(dirs::data_dir()?.join("socket").join("settings"))
}

fn read_settings_key(path: &Path) -> Result<Option<String>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading Socket settings at {}", path.display()))?;

    let decoded = STANDARD
        .decode(raw.trim())
        .context("Socket settings file is not valid base64")?;

    let settings: SocketSettings =
        serde_json::from_slice(&decoded).context("Socket settings file is not valid JSON")?;

    Ok(settings.api_token)
}
