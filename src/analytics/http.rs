//! HTTP adapter for the analytics-ingestion endpoint.

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::Serialize;

use crate::config::EndpointConfig;
use crate::error::ServiceError;

use super::{AnalyticsSink, EventRecord, SessionMetrics};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AnalyticsBatch<'a> {
    session_metrics: &'a SessionMetrics,
    completion_score: u32,
    events: &'a [EventRecord],
}

/// Production analytics sink; one batch POST per session.
pub struct HttpAnalyticsSink {
    client: reqwest::Client,
    config: EndpointConfig,
}

impl HttpAnalyticsSink {
    pub fn new(config: EndpointConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl AnalyticsSink for HttpAnalyticsSink {
    async fn submit(
        &self,
        metrics: &SessionMetrics,
        completion_score: u32,
        events: &[EventRecord],
    ) -> Result<(), ServiceError> {
        let url = format!("{}/analytics", self.config.base_url);
        let mut request = self.client.post(&url).json(&AnalyticsBatch {
            session_metrics: metrics,
            completion_score,
            events,
        });
        if let Some(token) = &self.config.api_token {
            request = request.bearer_auth(token.expose_secret());
        }
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ServiceError::Status {
                endpoint: "analytics".to_string(),
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}
