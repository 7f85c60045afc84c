/// Google Gemini provider
///
/// Talks to the `generateContent` REST endpoint. The first candidate's parts
/// become the reply's content blocks, which keeps the structured shape
/// visible to the text extraction step.
use crate::{
    config::Config,
    error::{AppError, AppResult},
    models::{ContentBlock, ModelReply, ReplyContent},
    services::providers::{ChatModel, DETERMINISTIC_TEMPERATURE},
};
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const API_KEY_HEADER: &str = "x-goog-api-key";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<RequestContent<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct RequestContent<'a> {
    role: &'static str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ContentBlock>,
}

#[derive(Clone)]
pub struct GeminiProvider {
    http_client: HttpClient,
    api_key: String,
    api_url: String,
    model: String,
}

impl GeminiProvider {
    /// Creates a provider whose HTTP client gives up after `timeout`
    pub fn new(
        api_key: String,
        api_url: String,
        model: String,
        timeout: Duration,
    ) -> AppResult<Self> {
        let http_client = HttpClient::builder().timeout(timeout).build()?;

        Ok(Self {
            http_client,
            api_key,
            api_url,
            model,
        })
    }

    /// Builds a provider from configuration, or `None` when no key is set
    pub fn from_config(config: &Config) -> AppResult<Option<Self>> {
        let Some(api_key) = config.api_key() else {
            return Ok(None);
        };

        Self::new(
            api_key.to_string(),
            config.gemini_api_url.clone(),
            config.gemini_model.clone(),
            Duration::from_secs(config.model_timeout_secs),
        )
        .map(Some)
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.api_url.trim_end_matches('/'),
            self.model
        )
    }

    fn into_reply(raw: serde_json::Value) -> AppResult<ModelReply> {
        let response: GenerateContentResponse = serde_json::from_value(raw.clone())
            .map_err(|e| AppError::ExternalApi(format!("Invalid Gemini response format: {}", e)))?;

        let parts = response
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .map(|content| content.parts);

        Ok(match parts {
            Some(parts) => join_text_parts(parts),
            None => {
                tracing::warn!("Gemini response carried no candidate content");
                ModelReply {
                    content: ReplyContent::Other(raw),
                }
            }
        })
    }
}

/// Gemini may split one answer across several text parts; they are
/// concatenated so the answer is not truncated to its first fragment.
fn join_text_parts(parts: Vec<ContentBlock>) -> ModelReply {
    let has_text = parts
        .iter()
        .any(|part| matches!(part, ContentBlock::Text { .. }));
    if !has_text {
        return ModelReply::blocks(parts);
    }

    let joined: String = parts
        .into_iter()
        .filter_map(|part| match part {
            ContentBlock::Text { text, .. } => Some(text),
            ContentBlock::Other(_) => None,
        })
        .collect();

    ModelReply::text(joined)
}

#[async_trait::async_trait]
impl ChatModel for GeminiProvider {
    async fn invoke(&self, prompt: &str) -> AppResult<ModelReply> {
        let request = GenerateContentRequest {
            contents: vec![RequestContent {
                role: "user",
                parts: vec![RequestPart { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: DETERMINISTIC_TEMPERATURE,
            },
        };

        tracing::debug!(
            model = %self.model,
            prompt_len = prompt.len(),
            "Sending prompt to Gemini"
        );

        let response = self
            .http_client
            .post(self.endpoint())
            .header(API_KEY_HEADER, &self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalApi(format!(
                "Gemini API returned status {}: {}",
                status, body
            )));
        }

        let raw: serde_json::Value = response.json().await?;
        Self::into_reply(raw)
    }

    fn name(&self) -> &'static str {
        "gemini"
    }
}
