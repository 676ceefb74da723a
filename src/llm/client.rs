use crate::config::{GenerationSettings, PipelineConfig};
use crate::error::{Result, SalesAnalysisError};
use crate::llm::types::*;
use crate::llm::TextGenerator;
use async_trait::async_trait;
use log::{debug, warn};
use reqwest::Client;

/// Header carrying the API key.
const API_KEY_HEADER: &str = "x-goog-api-key";

#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl GeminiClient {
    pub fn new(api_key: String, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: crate::config::GEMINI_BASE_URL.to_string(),
            model: model.into(),
        }
    }

    /// Builds a client from pipeline configuration. A missing credential is a
    /// model invocation failure: nothing can be sent without it.
    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            SalesAnalysisError::ModelInvocation(
                "No Gemini API key configured; set GEMINI_API_KEY".to_string(),
            )
        })?;

        Ok(Self::new(api_key, config.model.clone()).with_base_url(config.base_url.clone()))
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub(crate) async fn generate_content(
        &self,
        prompt: &str,
        settings: &GenerationSettings,
    ) -> Result<String> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);

        let payload = GenerateContentRequest::single_prompt(prompt, settings);

        debug!(
            "Calling {} with a {}-character prompt",
            self.model,
            prompt.chars().count()
        );

        let res = self
            .client
            .post(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(&payload)
            .send()
            .await?;
        let status = res.status();

        if !status.is_success() {
            let err_text = res.text().await?;
            return Err(SalesAnalysisError::ModelInvocation(format!(
                "Gemini API Error (status {}): {}",
                status, err_text
            )));
        }

        let body: GenerateContentResponse = res.json().await?;
        response_text(body)
    }
}

/// Pulls the text out of a response, turning blocked or empty replies into errors.
fn response_text(body: GenerateContentResponse) -> Result<String> {
    let block_reason = body
        .prompt_feedback
        .as_ref()
        .and_then(|feedback| feedback.block_reason.clone());

    let candidate = body
        .candidates
        .and_then(|candidates| candidates.into_iter().next())
        .ok_or_else(|| {
            let reason = block_reason.unwrap_or_else(|| "no candidates returned".to_string());
            warn!("Gemini returned no candidates: {}", reason);
            SalesAnalysisError::ModelInvocation(format!("Prompt was rejected: {}", reason))
        })?;

    let finish_reason = candidate
        .finish_reason
        .clone()
        .unwrap_or_else(|| "UNKNOWN".to_string());

    candidate
        .content
        .as_ref()
        .and_then(Content::text)
        .ok_or_else(|| {
            warn!("Gemini candidate had no text (finish reason {})", finish_reason);
            SalesAnalysisError::ModelInvocation(format!(
                "Model returned no text content (finish reason {})",
                finish_reason
            ))
        })
}

#[async_trait]
impl TextGenerator for GeminiClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str, settings: &GenerationSettings) -> Result<String> {
        self.generate_content(prompt, settings).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: serde_json::Value) -> GenerateContentResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_missing_api_key_is_invocation_error() {
        let result = GeminiClient::from_config(&PipelineConfig::default());
        assert!(matches!(result, Err(SalesAnalysisError::ModelInvocation(_))));
    }

    #[test]
    fn test_from_config_keeps_model() {
        let config = PipelineConfig::default()
            .with_api_key("test-key")
            .with_model("gemini-test");
        let client = GeminiClient::from_config(&config).unwrap();
        assert_eq!(TextGenerator::model(&client), "gemini-test");
    }

    #[test]
    fn test_blocked_prompt_reports_reason() {
        let body = parse(json!({ "promptFeedback": { "blockReason": "SAFETY" } }));
        match response_text(body) {
            Err(SalesAnalysisError::ModelInvocation(msg)) => assert!(msg.contains("SAFETY")),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_safety_filtered_candidate_is_error() {
        let body = parse(json!({
            "candidates": [{ "finishReason": "SAFETY" }]
        }));
        match response_text(body) {
            Err(SalesAnalysisError::ModelInvocation(msg)) => assert!(msg.contains("SAFETY")),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_transport_error_does_not_expose_api_key() {
        let client = GeminiClient::new("SUPERSECRETKEY".to_string(), "gemini-test")
            .with_base_url("http://127.0.0.1:1");
        let err = client
            .generate("{}", &GenerationSettings::default())
            .await
            .unwrap_err();

        assert!(matches!(err, SalesAnalysisError::ModelInvocation(_)));
        assert!(!err.to_string().contains("SUPERSECRETKEY"));
        assert!(!format!("{:?}", err).contains("SUPERSECRETKEY"));
    }

    #[test]
    fn test_text_is_returned() {
        let body = parse(json!({
            "candidates": [{ "content": { "parts": [{ "text": "{}" }] }, "finishReason": "STOP" }]
        }));
        assert_eq!(response_text(body).unwrap(), "{}");
    }
}
