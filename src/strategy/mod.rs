//! Remote advisory fetch strategies.
//!
//! A strategy performs the actual request(s) for one batch of package
//! identifiers. Two implementations exist:
//!
//! | Strategy | Auth | Requests per batch |
//! |----------|------|--------------------|
//! | [`BulkStrategy`] | API key | one POST carrying the whole batch |
//! | [`FanoutStrategy`] | none | one GET per identifier, joined |
//!
//! The dispatcher is written against [`FetchStrategy`] and does not know
//! which variant it holds; the choice falls out of credential presence.

mod bulk;
mod fanout;

pub use bulk::BulkStrategy;
pub use fanout::FanoutStrategy;

use crate::error::ScanError;
use crate::model::RawArtifact;
use async_trait::async_trait;

/// Default authenticated API endpoint.
pub const DEFAULT_API_BASE: &str = "https://api.socket.dev/v0";

/// Default unauthenticated firewall endpoint.
pub const DEFAULT_FIREWALL_BASE: &str = "https://firewall-api.socket.dev";

#[async_trait]
pub trait FetchStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Fetches advisory artifacts for one batch of package identifiers.
    ///
    /// # Errors
    ///
    /// Fails with [`ScanError::Status`] on a non-success response and
    /// [`ScanError::Parse`] on a malformed response body; either failure
    /// covers the whole batch.
    async fn fetch(&self, purls: &[String]) -> Result<Vec<RawArtifact>, ScanError>;
}

/// `User-Agent` sent with every advisory request.
pub(crate) fn user_agent() -> String {
    format!(
        "SocketScanner/{} ({} {})",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH
    )
}

/// Parses a newline-delimited JSON response body into artifacts.
///
/// Blank lines are skipped; one malformed line fails the whole batch.
pub(crate) fn parse_artifact_lines(body: &str) -> Result<Vec<RawArtifact>, ScanError> {
    body.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).map_err(ScanError::from))
        .collect()
}
