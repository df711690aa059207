use async_trait::async_trait;
use futures::future::try_join_all;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::header::USER_AGENT;

use crate::error::ScanError;
use crate::model::RawArtifact;

use super::{parse_artifact_lines, user_agent, FetchStrategy, DEFAULT_FIREWALL_BASE};

/// Everything except ASCII alphanumerics and `-_.!~*'()` is escaped, the
/// same set JavaScript's `encodeURIComponent` leaves alone.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Unauthenticated strategy: one GET per identifier in the batch, all
/// launched concurrently and awaited together.
///
/// The identifier rides in the URL path, fully percent-encoded. One failing
/// sub-request fails the whole invocation. Dispatched with larger batches
/// and a lower in-flight cap than [`super::BulkStrategy`], trading per-batch
/// parallelism against the global budget.
pub struct FanoutStrategy {
    client: reqwest::Client,
    base_url: String,
}

impl FanoutStrategy {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_FIREWALL_BASE)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn purl_url(&self, purl: &str) -> String {
        format!(
            "{}/purl/{}",
            self.base_url,
            utf8_percent_encode(purl, COMPONENT)
        )
    }
}

impl Default for FanoutStrategy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FetchStrategy for FanoutStrategy {
    fn name(&self) -> &'static str {
        "fan-out"
    }

    async fn fetch(&self, purls: &[String]) -> Result<Vec<RawArtifact>, ScanError> {
        let requests = purls.iter().map(|purl| {
            let url = self.purl_url(purl);
            async move {
                let response = self
                    .client
                    .get(&url)
                    .header(USER_AGENT, user_agent())
                    .send()
                    .await?;

                let status = response.status();
                if !status.is_success() {
                    return Err(ScanError::Status { status });
                }

                parse_artifact_lines(&response.text().await?)
            }
        });

        let batches = try_join_all(requests).await?;
        Ok(batches.into_iter().flatten().collect())
    }
}
