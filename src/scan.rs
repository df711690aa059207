//! The scan entry point tying dispatcher, strategy, and translator
//! together.

use std::sync::Arc;

use tracing::{debug, info, instrument};

use crate::dispatch::{dispatch, DispatchConfig};
use crate::error::ScanError;
use crate::model::{Advisory, Package};
use crate::strategy::{BulkStrategy, FanoutStrategy, FetchStrategy};
use crate::translate::advisories_for;

/// Bulk dispatch limits: one identifier per request, many requests in the
/// air.
const BULK_MAX_SENDING: usize = 30;
const BULK_MAX_BATCH_LENGTH: usize = 1;

/// Fan-out dispatch limits: bigger batches, fewer identifiers in the air.
/// The batch length must stay under the cap or launches fault on the
/// in-flight check.
const FANOUT_MAX_SENDING: usize = 20;
const FANOUT_MAX_BATCH_LENGTH: usize = 10;

fn bulk_limits() -> DispatchConfig {
    DispatchConfig {
        max_sending: BULK_MAX_SENDING,
        max_batch_length: BULK_MAX_BATCH_LENGTH,
    }
}

fn fanout_limits() -> DispatchConfig {
    DispatchConfig {
        max_sending: FANOUT_MAX_SENDING,
        max_batch_length: FANOUT_MAX_BATCH_LENGTH,
    }
}

/// Checks packages against the advisory service and produces advisories.
pub struct Scanner {
    strategy: Arc<dyn FetchStrategy>,
    config: DispatchConfig,
}

impl Scanner {
    /// Picks the strategy from the resolved credentials: bulk when an API
    /// key is present, fan-out otherwise.
    pub fn from_credentials(api_key: Option<String>) -> Self {
        match api_key {
            Some(key) => Self::authenticated(key),
            None => {
                info!("no API key configured, using free configuration");
                Self::unauthenticated()
            }
        }
    }

    pub fn authenticated(api_key: impl Into<String>) -> Self {
        Self::custom(Arc::new(BulkStrategy::new(api_key)), bulk_limits())
    }

    /// Authenticated scanner against a non-default endpoint.
    pub fn authenticated_at(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self::custom(
            Arc::new(BulkStrategy::with_base_url(api_key, base_url)),
            bulk_limits(),
        )
    }

    pub fn unauthenticated() -> Self {
        Self::custom(Arc::new(FanoutStrategy::new()), fanout_limits())
    }

    /// Unauthenticated scanner against a non-default endpoint.
    pub fn unauthenticated_at(base_url: impl Into<String>) -> Self {
        Self::custom(
            Arc::new(FanoutStrategy::with_base_url(base_url)),
            fanout_limits(),
        )
    }

    /// Builds a scanner over an explicit strategy and limits.
    pub fn custom(strategy: Arc<dyn FetchStrategy>, config: DispatchConfig) -> Self {
        Self { strategy, config }
    }

    /// Checks every package and returns the advisories for all of them.
    ///
    /// Returns only when the whole list has been processed or a request
    /// fails; the first failure aborts the scan.
    #[instrument(skip_all, fields(strategy = self.strategy.name(), packages = packages.len()))]
    pub async fn scan(&self, packages: Vec<Package>) -> Result<Vec<Advisory>, ScanError> {
        let mut advisories = Vec::new();

        let mut groups = dispatch(packages, Arc::clone(&self.strategy), self.config.clone());
        while let Some(group) = groups.recv().await {
            for artifact in group? {
                advisories.extend(advisories_for(&artifact));
            }
        }

        debug!(advisories = advisories.len(), "scan complete");
        Ok(advisories)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RawArtifact;
    use async_trait::async_trait;

    /// Answers every identifier with one warn alert.
    struct AlertingStrategy;

    #[async_trait]
    impl FetchStrategy for AlertingStrategy {
        fn name(&self) -> &'static str {
            "alerting"
        }

        async fn fetch(&self, purls: &[String]) -> Result<Vec<RawArtifact>, ScanError> {
            purls
                .iter()
                .map(|purl| {
                    serde_json::from_str(&format!(
                        r#"{{"inputPurl":"{purl}","alerts":[{{"action":"warn","type":"deprecated","props":{{"note":"old"}}}}]}}"#
                    ))
                    .map_err(ScanError::from)
                })
                .collect()
        }
    }

    #[tokio::test]
    async fn test_scan_translates_every_artifact() {
        let scanner = Scanner::custom(
            Arc::new(AlertingStrategy),
            DispatchConfig {
                max_sending: 4,
                max_batch_length: 2,
            },
        );
        let packages = vec![
            Package::new("a", "1.0.0"),
            Package::new("b", "2.0.0"),
            Package::new("c", "3.0.0"),
        ];

        let mut advisories = scanner.scan(packages).await.unwrap();
        advisories.sort_by(|x, y| x.package.cmp(&y.package));

        assert_eq!(advisories.len(), 3);
        assert_eq!(advisories[0].package, "pkg:npm/a@1.0.0");
        assert_eq!(advisories[0].description, "old");
    }

    #[tokio::test]
    async fn test_scan_of_nothing_is_empty() {
        let scanner = Scanner::custom(
            Arc::new(AlertingStrategy),
            DispatchConfig {
                max_sending: 4,
                max_batch_length: 2,
            },
        );
        assert!(scanner.scan(Vec::new()).await.unwrap().is_empty());
    }
}
