use clap::Parser;
use std::time::Duration;

// CLI argument structure, every option can also come from the environment
#[derive(Parser, Debug, Clone)]
#[command(name = "koby-gateway")]
#[command(about = "Demo API gateway for Koby AI: Gemini chat, ElevenLabs voice and webhooks")]
pub struct Args {
    // Port to run the server on
    #[arg(short, long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    // Allowed CORS origins (comma-separated)
    // Example: "https://koby.ai,https://www.koby.ai"
    #[arg(long, env = "ALLOWED_ORIGINS", default_value = "")]
    pub allowed_origins: String,

    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    pub gemini_api_key: Option<String>,

    #[arg(long, env = "GEMINI_MODEL", default_value = "gemini-2.0-flash")]
    pub gemini_model: String,

    #[arg(
        long,
        env = "GEMINI_BASE_URL",
        default_value = "https://generativelanguage.googleapis.com/v1beta"
    )]
    pub gemini_base_url: String,

    #[arg(long, env = "ELEVENLABS_API_KEY", hide_env_values = true)]
    pub elevenlabs_api_key: Option<String>,

    #[arg(long, env = "ELEVENLABS_BASE_URL", default_value = "https://api.elevenlabs.io")]
    pub elevenlabs_base_url: String,

    // Agent used by /api/signed-url when the caller sends none
    #[arg(long, env = "ELEVENLABS_AGENT_ID")]
    pub elevenlabs_agent_id: Option<String>,

    #[arg(long, env = "ELEVENLABS_VOICE_ID", default_value = "21m00Tcm4TlvDq8ikWAM")]
    pub elevenlabs_voice_id: String,

    // Shared secret for ElevenLabs-Signature verification
    #[arg(long, env = "ELEVENLABS_WEBHOOK_SECRET", hide_env_values = true)]
    pub webhook_secret: Option<String>,

    // Bearer token the voice agent's server tools must present
    #[arg(long, env = "TOOL_SECRET", hide_env_values = true)]
    pub tool_secret: Option<String>,

    #[arg(long, env = "DATABASE_URL", default_value = "sqlite://koby.db?mode=rwc")]
    pub database_url: String,

    // Rate limit max requests per window, at least 1
    #[arg(
        long,
        env = "RATE_LIMIT",
        default_value_t = 20,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub rate_limit: u32,

    // Rate limit window in seconds
    #[arg(long, env = "RATE_WINDOW", default_value_t = 60)]
    pub rate_window: u64,

    // How often expired rate limit entries are swept, in seconds
    #[arg(long, env = "SWEEP_INTERVAL", default_value_t = 300)]
    pub sweep_interval: u64,

    // Timeout for every upstream call, in seconds
    #[arg(long, env = "UPSTREAM_TIMEOUT", default_value_t = 30)]
    pub upstream_timeout: u64,

    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    // Emit logs as JSON lines
    #[arg(long, env = "LOG_JSON", default_value_t = false)]
    pub log_json: bool,
}

impl Args {
    pub fn rate_window(&self) -> Duration {
        Duration::from_secs(self.rate_window)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval.max(1))
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout)
    }

    pub fn origins(&self) -> Vec<String> {
        split_origins(&self.allowed_origins)
    }
}

// "https://a.com, https://b.com/" -> ["https://a.com", "https://b.com"]
pub fn split_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim()) // remove spaces
        .filter(|s| !s.is_empty()) // remove empty strings
        .map(|s| s.trim_end_matches('/').to_string())
        .collect()
}
