use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::prompts;
use crate::upstream::GenerationSettings;

pub const MAX_MESSAGE_CHARS: usize = 2000;
pub const MAX_TTS_CHARS: usize = 1000;

// Demo persona, unknown values are rejected at deserialization
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Chat,
    Voice,
    Pannudental,
    Invoice,
}

impl Mode {
    pub fn system_prompt(self) -> &'static str {
        match self {
            Mode::Chat => prompts::CHAT,
            Mode::Voice => prompts::VOICE,
            Mode::Pannudental => prompts::PANNU_DENTAL,
            Mode::Invoice => prompts::INVOICE,
        }
    }

    pub fn settings(self) -> GenerationSettings {
        match self {
            // spoken replies stay short
            Mode::Voice => GenerationSettings {
                temperature: 0.7,
                max_output_tokens: 150,
            },
            Mode::Invoice => GenerationSettings {
                temperature: 0.2,
                max_output_tokens: 600,
            },
            Mode::Chat | Mode::Pannudental => GenerationSettings {
                temperature: 0.7,
                max_output_tokens: 400,
            },
        }
    }
}

// POST /api/demo-chat
#[derive(Debug, Clone, Deserialize)]
pub struct DemoChatRequest {
    pub message: String,
    #[serde(default)]
    pub mode: Mode,
}

impl DemoChatRequest {
    /// Trimmed message, or why it is unusable.
    pub fn validated_message(&self) -> Result<&str, String> {
        let message = self.message.trim();
        if message.is_empty() {
            return Err("Message is required".to_string());
        }
        if message.chars().count() > MAX_MESSAGE_CHARS {
            return Err(format!("Message must be at most {MAX_MESSAGE_CHARS} characters"));
        }
        Ok(message)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DemoChatResponse {
    pub response: String,
}

// POST /api/tts
#[derive(Debug, Clone, Deserialize)]
pub struct TtsRequest {
    pub text: String,
    pub voice_id: Option<String>,
}

// GET /api/signed-url
#[derive(Debug, Clone, Deserialize)]
pub struct SignedUrlQuery {
    pub agent_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SignedUrlResponse {
    pub signed_url: String,
}

/// Provider ids go into URL paths, so only a conservative charset passes.
pub fn is_valid_provider_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 128
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Webhook envelope. `data` stays untyped until `kind` says what it holds.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub event_timestamp: Option<i64>,
    #[serde(default)]
    pub data: serde_json::Value,
}

pub const POST_CALL_TRANSCRIPTION: &str = "post_call_transcription";

#[derive(Debug, Clone, Deserialize)]
pub struct PostCallData {
    pub conversation_id: String,
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub transcript: serde_json::Value,
    #[serde(default)]
    pub metadata: Option<PostCallMetadata>,
    #[serde(default)]
    pub analysis: Option<PostCallAnalysis>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PostCallMetadata {
    pub call_duration_secs: Option<i64>,
    pub phone_call: Option<PhoneCall>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PhoneCall {
    pub external_number: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PostCallAnalysis {
    pub transcript_summary: Option<String>,
    pub call_successful: Option<String>,
}

/// Stored outcome of one agent conversation, keyed by the provider's id.
#[derive(Debug, Clone, PartialEq)]
pub struct CallRecord {
    pub conversation_id: String,
    pub agent_id: Option<String>,
    pub status: Option<String>,
    pub caller_number: Option<String>,
    pub summary: Option<String>,
    pub call_successful: Option<String>,
    pub transcript: String,
    pub duration_secs: Option<i64>,
    pub received_at: DateTime<Utc>,
}

impl CallRecord {
    pub fn from_post_call(data: PostCallData, received_at: DateTime<Utc>) -> Self {
        let metadata = data.metadata.unwrap_or_default();
        let analysis = data.analysis.unwrap_or_default();
        let transcript = if data.transcript.is_null() {
            "[]".to_string()
        } else {
            data.transcript.to_string()
        };

        Self {
            conversation_id: data.conversation_id,
            agent_id: data.agent_id,
            status: data.status,
            caller_number: metadata
                .phone_call
                .and_then(|p| p.external_number)
                .map(|n| normalize_phone(&n)),
            summary: analysis.transcript_summary,
            call_successful: analysis.call_successful,
            transcript,
            duration_secs: metadata.call_duration_secs,
            received_at,
        }
    }
}

// POST /api/tools/service-request, sent by the voice agent's server tool
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceRequest {
    pub customer_name: String,
    pub phone: String,
    pub service_type: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub preferred_time: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub conversation_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceRequestResponse {
    pub success: bool,
    pub ticket_id: String,
    pub message: String,
}

/// A service request captured during a demo call.
#[derive(Debug, Clone, PartialEq)]
pub struct DemoSession {
    pub ticket_id: String,
    pub conversation_id: Option<String>,
    pub customer_name: String,
    pub phone: String,
    pub email: Option<String>,
    pub service_type: String,
    pub address: Option<String>,
    pub preferred_time: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl DemoSession {
    /// Normalizes the tool-call fields. Errors name the first bad field.
    pub fn from_request(
        req: ServiceRequest,
        ticket_id: String,
        created_at: DateTime<Utc>,
    ) -> Result<Self, String> {
        let customer_name = collapse_whitespace(&req.customer_name);
        if customer_name.is_empty() {
            return Err("customer_name is required".to_string());
        }

        let phone = normalize_phone(&req.phone);
        if phone.chars().filter(|c| c.is_ascii_digit()).count() < 7 {
            return Err("phone must contain at least 7 digits".to_string());
        }

        let service_type = normalize_service_type(&req.service_type);
        if service_type.is_empty() {
            return Err("service_type is required".to_string());
        }

        let email = match non_empty(req.email) {
            Some(e) => {
                let e = e.to_lowercase();
                if !e.contains('@') {
                    return Err("email is invalid".to_string());
                }
                Some(e)
            }
            None => None,
        };

        Ok(Self {
            ticket_id,
            conversation_id: non_empty(req.conversation_id),
            customer_name,
            phone,
            email,
            service_type,
            address: non_empty(req.address),
            preferred_time: non_empty(req.preferred_time),
            notes: non_empty(req.notes),
            created_at,
        })
    }
}

/// `MV-` followed by twelve uppercase hex characters from a v4 uuid.
pub fn new_ticket_id() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("MV-{}", id[..TICKET_HEX_LEN].to_uppercase())
}

const TICKET_HEX_LEN: usize = 12;

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| collapse_whitespace(&v))
        .filter(|v| !v.is_empty())
}

/// Keeps digits and a leading `+`.
pub fn normalize_phone(raw: &str) -> String {
    let trimmed = raw.trim();
    let digits: String = trimmed.chars().filter(|c| c.is_ascii_digit()).collect();
    if trimmed.starts_with('+') {
        format!("+{digits}")
    } else {
        digits
    }
}

fn normalize_service_type(raw: &str) -> String {
    collapse_whitespace(raw).to_lowercase().replace(' ', "_")
}
