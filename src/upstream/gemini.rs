use serde::{Deserialize, Serialize};
use std::time::Instant;

use super::{UpstreamError, ensure_success, observe};

const PROVIDER: &str = "gemini";

/// Sampling settings for one generateContent call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationSettings {
    pub temperature: f32,
    pub max_output_tokens: u32,
}

/// Gemini generateContent client.
#[derive(Clone)]
pub struct GeminiClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(
        client: reqwest::Client,
        api_key: impl Into<String>,
        model: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            model: model.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Sends one user message under `system_prompt` and returns the reply text.
    pub async fn generate(
        &self,
        system_prompt: &str,
        message: &str,
        settings: GenerationSettings,
    ) -> Result<String, UpstreamError> {
        let started = Instant::now();
        let result = self.call(system_prompt, message, settings).await;
        observe(PROVIDER, started, &result);
        result
    }

    async fn call(
        &self,
        system_prompt: &str,
        message: &str,
        settings: GenerationSettings,
    ) -> Result<String, UpstreamError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let body = GenerateContentRequest {
            system_instruction: Content {
                role: None,
                parts: vec![Part {
                    text: system_prompt.to_string(),
                }],
            },
            contents: vec![Content {
                role: Some("user"),
                parts: vec![Part {
                    text: message.to_string(),
                }],
            }],
            generation_config: settings,
        };

        tracing::debug!(model = %self.model, "sending request to Gemini");

        let res = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| UpstreamError::from_reqwest(PROVIDER, e))?;
        let res = ensure_success(PROVIDER, res).await?;

        let parsed: GenerateContentResponse = res
            .json()
            .await
            .map_err(|e| UpstreamError::from_reqwest(PROVIDER, e))?;

        let text = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| {
                c.parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(UpstreamError::Decode {
                provider: PROVIDER,
                detail: "response had no candidate text".to_string(),
            });
        }
        Ok(text)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    system_instruction: Content,
    contents: Vec<Content>,
    generation_config: GenerationSettings,
}

#[derive(Serialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Part>,
}

#[derive(Serialize)]
struct Part {
    text: String,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}
