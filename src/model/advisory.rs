use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One per-package result record returned by the advisory service.
///
/// The service answers with newline-delimited JSON, one artifact per line.
/// Ordering relative to the request batch is not guaranteed.
#[derive(Debug, Clone, Deserialize)]
pub struct RawArtifact {
    #[serde(rename = "inputPurl")]
    pub input_purl: String,
    #[serde(default)]
    pub alerts: Vec<Alert>,
}

/// A single finding attached to an artifact.
#[derive(Debug, Clone, Deserialize)]
pub struct Alert {
    pub action: AlertAction,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub props: AlertProps,
    #[serde(default)]
    pub fix: Option<AlertFix>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertAction {
    Error,
    Warn,
}

/// Loosely-typed alert properties; fields the translator does not know
/// about are kept in `extra`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AlertProps {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(rename = "alternatePackage", default)]
    pub alternate_package: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlertFix {
    pub description: String,
}

/// The final, user-facing warning derived from one alert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Advisory {
    pub level: AdvisoryLevel,
    pub package: String,
    pub url: Option<String>,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AdvisoryLevel {
    Fatal,
    Warn,
}

impl AdvisoryLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdvisoryLevel::Fatal => "fatal",
            AdvisoryLevel::Warn => "warn",
        }
    }
}

impl std::fmt::Display for AdvisoryLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
