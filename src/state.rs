use std::sync::Arc;

use crate::config::Args;
use crate::rate_limit::RateLimiter;
use crate::store::RecordStore;
use crate::upstream::{ElevenLabsClient, GeminiClient};

// app's shared state
pub struct AppState {
    pub gemini: Option<GeminiClient>,         // None without GEMINI_API_KEY
    pub elevenlabs: Option<ElevenLabsClient>, // None without ELEVENLABS_API_KEY
    pub store: RecordStore,
    pub limiter: Arc<RateLimiter>,
    pub webhook_secret: Option<String>,
    pub tool_secret: Option<String>,
    pub default_agent_id: Option<String>,
    pub default_voice_id: String,
}

impl AppState {
    /// Builds state from parsed arguments. Blank secrets count as unset.
    pub fn from_args(args: &Args, client: reqwest::Client, store: RecordStore) -> Self {
        let gemini = present(&args.gemini_api_key).map(|key| {
            GeminiClient::new(
                client.clone(),
                key,
                args.gemini_model.clone(),
                args.gemini_base_url.clone(),
            )
        });
        let elevenlabs = present(&args.elevenlabs_api_key).map(|key| {
            ElevenLabsClient::new(client.clone(), key, args.elevenlabs_base_url.clone())
        });

        Self {
            gemini,
            elevenlabs,
            store,
            limiter: Arc::new(RateLimiter::new(args.rate_limit, args.rate_window())),
            webhook_secret: present(&args.webhook_secret),
            tool_secret: present(&args.tool_secret),
            default_agent_id: present(&args.elevenlabs_agent_id),
            default_voice_id: args.elevenlabs_voice_id.clone(),
        }
    }
}

fn present(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
