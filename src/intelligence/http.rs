//! HTTP adapter for the intelligence endpoints.

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};

use crate::config::EndpointConfig;
use crate::error::ServiceError;
use crate::session::{Clarify, Plan, PrivacyMode};

use super::{ConversationTurn, IntelligenceService};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ClarifyRequest<'a> {
    user_message: &'a str,
    privacy_mode: PrivacyMode,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PlanRequest<'a> {
    conversation: &'a [ConversationTurn],
    privacy_mode: PrivacyMode,
}

#[derive(Debug, Deserialize)]
struct TranscribeResponse {
    text: Option<String>,
}

/// Production client for the clarify/plan/transcribe endpoints.
pub struct HttpIntelligence {
    client: reqwest::Client,
    config: EndpointConfig,
}

impl HttpIntelligence {
    pub fn new(config: EndpointConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.config.base_url, endpoint)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.api_token {
            Some(token) => request.bearer_auth(token.expose_secret()),
            None => request,
        }
    }

    async fn check_status(
        endpoint: &str,
        response: reqwest::Response,
    ) -> Result<reqwest::Response, ServiceError> {
        let status = response.status();
        if !status.is_success() {
            return Err(ServiceError::Status {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl IntelligenceService for HttpIntelligence {
    async fn clarify(
        &self,
        user_message: &str,
        privacy_mode: PrivacyMode,
    ) -> Result<Clarify, ServiceError> {
        let request = self.authorize(self.client.post(self.url("clarify"))).json(
            &ClarifyRequest {
                user_message,
                privacy_mode,
            },
        );
        let response = Self::check_status("clarify", request.send().await?).await?;
        let clarify: Clarify = response.json().await?;
        if clarify.questions.is_empty() {
            return Err(ServiceError::InvalidResponse {
                endpoint: "clarify".to_string(),
                reason: "no questions returned".to_string(),
            });
        }
        Ok(clarify)
    }

    async fn plan(
        &self,
        conversation: &[ConversationTurn],
        privacy_mode: PrivacyMode,
    ) -> Result<Plan, ServiceError> {
        let request = self.authorize(self.client.post(self.url("plan"))).json(
            &PlanRequest {
                conversation,
                privacy_mode,
            },
        );
        let response = Self::check_status("plan", request.send().await?).await?;
        Ok(response.json().await?)
    }

    async fn transcribe(
        &self,
        audio: Vec<u8>,
        language: Option<&str>,
    ) -> Result<Option<String>, ServiceError> {
        let mut request = self
            .authorize(self.client.post(self.url("transcribe")))
            .header(reqwest::header::CONTENT_TYPE, "audio/wav")
            .body(audio);
        if let Some(language) = language {
            request = request.query(&[("language", language)]);
        }
        let response = Self::check_status("transcribe", request.send().await?).await?;
        let body: TranscribeResponse = response.json().await?;
        Ok(body.text.filter(|t| !t.trim().is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clarify_request_wire_shape() {
        let request = ClarifyRequest {
            user_message: "I want a new website",
            privacy_mode: PrivacyMode::OnTheRecord,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["userMessage"], "I want a new website");
        assert_eq!(json["privacyMode"], "on_the_record");
    }

    #[test]
    fn plan_request_wire_shape() {
        use crate::session::Role;
        let conversation = vec![ConversationTurn {
            role: Role::User,
            content: "hello".to_string(),
        }];
        let request = PlanRequest {
            conversation: &conversation,
            privacy_mode: PrivacyMode::Confidential,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["conversation"][0]["role"], "user");
        assert_eq!(json["privacyMode"], "confidential");
    }

    #[test]
    fn transcribe_response_allows_missing_text() {
        let body: TranscribeResponse = serde_json::from_str("{}").unwrap();
        assert!(body.text.is_none());
    }

    #[test]
    fn url_joins_without_double_slash() {
        let client = HttpIntelligence::new(EndpointConfig {
            base_url: "https://example.com/api".to_string(),
            api_token: None,
        });
        assert_eq!(client.url("clarify"), "https://example.com/api/clarify");
    }
}
