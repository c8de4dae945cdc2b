use reqwest::Url;
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use super::{UpstreamError, ensure_success, observe};

const PROVIDER: &str = "elevenlabs";
const TTS_MODEL: &str = "eleven_turbo_v2_5";

/// Synthesized audio and its content type.
#[derive(Debug, Clone)]
pub struct Speech {
    pub content_type: String,
    pub audio: Vec<u8>,
}

/// ElevenLabs REST client: text-to-speech and conversational-agent signed URLs.
#[derive(Clone)]
pub struct ElevenLabsClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl ElevenLabsClient {
    pub fn new(
        client: reqwest::Client,
        api_key: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Fetches a short-lived URL the browser uses to open an agent conversation.
    pub async fn signed_url(&self, agent_id: &str) -> Result<String, UpstreamError> {
        let started = Instant::now();
        let result = self.fetch_signed_url(agent_id).await;
        observe(PROVIDER, started, &result);
        result
    }

    async fn fetch_signed_url(&self, agent_id: &str) -> Result<String, UpstreamError> {
        let url = Url::parse_with_params(
            &format!("{}/v1/convai/conversation/get-signed-url", self.base_url),
            &[("agent_id", agent_id)],
        )
        .map_err(|e| UpstreamError::Decode {
            provider: PROVIDER,
            detail: format!("bad base url: {e}"),
        })?;

        let res = self
            .client
            .get(url)
            .header("xi-api-key", &self.api_key)
            .send()
            .await
            .map_err(|e| UpstreamError::from_reqwest(PROVIDER, e))?;
        let res = ensure_success(PROVIDER, res).await?;

        let body: SignedUrlResponse = res
            .json()
            .await
            .map_err(|e| UpstreamError::from_reqwest(PROVIDER, e))?;
        Ok(body.signed_url)
    }

    pub async fn text_to_speech(&self, voice_id: &str, text: &str) -> Result<Speech, UpstreamError> {
        let started = Instant::now();
        let result = self.synthesize(voice_id, text).await;
        observe(PROVIDER, started, &result);
        result
    }

    async fn synthesize(&self, voice_id: &str, text: &str) -> Result<Speech, UpstreamError> {
        let url = format!("{}/v1/text-to-speech/{}", self.base_url, voice_id);
        let res = self
            .client
            .post(&url)
            .header("xi-api-key", &self.api_key)
            .header("accept", "audio/mpeg")
            .json(&TextToSpeechRequest {
                text,
                model_id: TTS_MODEL,
            })
            .send()
            .await
            .map_err(|e| UpstreamError::from_reqwest(PROVIDER, e))?;
        let res = ensure_success(PROVIDER, res).await?;

        let content_type = res
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("audio/mpeg")
            .to_string();
        let audio = res
            .bytes()
            .await
            .map_err(|e| UpstreamError::from_reqwest(PROVIDER, e))?;

        Ok(Speech {
            content_type,
            audio: audio.to_vec(),
        })
    }
}

#[derive(Serialize)]
struct TextToSpeechRequest<'a> {
    text: &'a str,
    model_id: &'static str,
}

#[derive(Deserialize)]
struct SignedUrlResponse {
    signed_url: String,
}
