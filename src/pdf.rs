//! PDF rendering port — turns a finished plan into a downloadable document.

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::Serialize;

use crate::config::EndpointConfig;
use crate::error::ServiceError;
use crate::session::{Plan, PrivacyMode};

/// A rendered plan document ready for a client-side download trigger.
#[derive(Debug, Clone)]
pub struct RenderedPdf {
    pub bytes: Vec<u8>,
    pub filename: String,
}

/// Seam over the PDF-rendering utility.
#[async_trait]
pub trait PdfRenderer: Send + Sync {
    async fn render(
        &self,
        plan: &Plan,
        privacy_mode: PrivacyMode,
    ) -> Result<RenderedPdf, ServiceError>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RenderRequest<'a> {
    plan: &'a Plan,
    privacy_mode: PrivacyMode,
}

/// Production renderer backed by the render endpoint.
pub struct HttpPdfRenderer {
    client: reqwest::Client,
    config: EndpointConfig,
}

impl HttpPdfRenderer {
    pub fn new(config: EndpointConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl PdfRenderer for HttpPdfRenderer {
    async fn render(
        &self,
        plan: &Plan,
        privacy_mode: PrivacyMode,
    ) -> Result<RenderedPdf, ServiceError> {
        let url = format!("{}/render-pdf", self.config.base_url);
        let mut request = self
            .client
            .post(&url)
            .json(&RenderRequest { plan, privacy_mode });
        if let Some(token) = &self.config.api_token {
            request = request.bearer_auth(token.expose_secret());
        }
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ServiceError::Status {
                endpoint: "render-pdf".to_string(),
                status: status.as_u16(),
            });
        }
        let bytes = response.bytes().await?.to_vec();
        if bytes.is_empty() {
            return Err(ServiceError::InvalidResponse {
                endpoint: "render-pdf".to_string(),
                reason: "empty document".to_string(),
            });
        }
        Ok(RenderedPdf {
            bytes,
            filename: "your-plan.pdf".to_string(),
        })
    }
}
