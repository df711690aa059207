use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, USER_AGENT};
use serde::Serialize;

use crate::error::ScanError;
use crate::model::RawArtifact;

use super::{parse_artifact_lines, user_agent, FetchStrategy, DEFAULT_API_BASE};

/// Authenticated batch strategy: one POST carrying every identifier in the
/// batch as a single structured payload.
///
/// Each request is cheap, so this strategy is dispatched with small batches
/// and a high in-flight cap.
pub struct BulkStrategy {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Serialize)]
struct BatchRequest {
    components: Vec<BatchComponent>,
}

#[derive(Serialize)]
struct BatchComponent {
    purl: String,
}

impl BulkStrategy {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(api_key, DEFAULT_API_BASE)
    }

    /// Points the strategy at a non-default endpoint (config override,
    /// tests).
    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl FetchStrategy for BulkStrategy {
    fn name(&self) -> &'static str {
        "bulk"
    }

    async fn fetch(&self, purls: &[String]) -> Result<Vec<RawArtifact>, ScanError> {
        let body = BatchRequest {
            components: purls
                .iter()
                .map(|purl| BatchComponent { purl: purl.clone() })
                .collect(),
        };

        let response = self
            .client
            .post(format!("{}/purl?actions=error,warn", self.base_url))
            .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
            .header(USER_AGENT, user_agent())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ScanError::Status { status });
        }

        parse_artifact_lines(&response.text().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn purls(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|p| p.to_string()).collect()
    }

    #[tokio::test]
    async fn test_posts_batch_with_auth_header() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/purl"))
            .and(query_param("actions", "error,warn"))
            .and(header("Authorization", "Bearer test-key"))
            .and(body_string_contains("pkg:npm/lodash@4.17.21"))
            .respond_with(ResponseTemplate::new(200).set_body_string(""))
            .expect(1)
            .mount(&server)
            .await;

        let strategy = BulkStrategy::with_base_url("test-key", server.uri());
        let artifacts = strategy
            .fetch(&purls(&["pkg:npm/lodash@4.17.21"]))
            .await
            .unwrap();

        assert!(artifacts.is_empty());
    }

    #[tokio::test]
    async fn test_parses_newline_delimited_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/purl"))
            .respond_with(ResponseTemplate::new(200).set_body_string(concat!(
                r#"{"inputPurl":"pkg:npm/a@1.0.0","alerts":[]}"#,
                "\n",
                r#"{"inputPurl":"pkg:npm/b@2.0.0","alerts":[]}"#,
            )))
            .mount(&server)
            .await;

        let strategy = BulkStrategy::with_base_url("test-key", server.uri());
        let artifacts = strategy
            .fetch(&purls(&["pkg:npm/a@1.0.0", "pkg:npm/b@2.0.0"]))
            .await
            .unwrap();

        assert_eq!(artifacts.len(), 2);
        assert_eq!(artifacts[1].input_purl, "pkg:npm/b@2.0.0");
    }

    #[tokio::test]
    async fn test_non_success_status_fails_batch() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let strategy = BulkStrategy::with_base_url("test-key", server.uri());
        let error = strategy
            .fetch(&purls(&["pkg:npm/a@1.0.0"]))
            .await
            .unwrap_err();

        match error {
            ScanError::Status { status } => assert_eq!(status.as_u16(), 500),
            other => panic!("expected status error, got {other}"),
        }
    }
}
