use serde::{Deserialize, Serialize};

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_PRO_MODEL: &str = "gemini-2.5-pro";
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_SESSION_TTL_SECS: u64 = 3600;
pub const DEFAULT_RPM_LIMIT: u32 = 10;
pub const DEFAULT_TPM_LIMIT: u64 = 250_000;
pub const DEFAULT_STREAMING_UPDATE_INTERVAL: f64 = 0.5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub telegram_token: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub gemini_api_key: Option<String>,

    pub model: String,

    pub pro_model: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<String>,

    /// Idle time after which a conversation is forgotten, 0 keeps it forever
    pub session_ttl_secs: u64,

    /// Requests per minute, 0 disables the check
    pub rpm_limit: u32,

    /// Tokens per minute, 0 disables the check
    pub tpm_limit: u64,

    /// Seconds between two streamed edits of the same message
    pub streaming_update_interval: f64,

    #[serde(default)]
    pub authorized_user_ids: Vec<i64>,

    /// Attach the Google Search grounding tool to new sessions
    pub enable_search: bool,

    pub gemini_base_url: String,

    #[serde(default)]
    pub messages: BotMessages,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            telegram_token: None,
            gemini_api_key: None,
            model: DEFAULT_MODEL.to_string(),
            pro_model: DEFAULT_PRO_MODEL.to_string(),
            system_instruction: None,
            session_ttl_secs: DEFAULT_SESSION_TTL_SECS,
            rpm_limit: DEFAULT_RPM_LIMIT,
            tpm_limit: DEFAULT_TPM_LIMIT,
            streaming_update_interval: DEFAULT_STREAMING_UPDATE_INTERVAL,
            authorized_user_ids: Vec::new(),
            enable_search: true,
            gemini_base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            messages: BotMessages::default(),
        }
    }
}

/// Summary of the configuration that is safe to log (no secrets).
#[derive(Debug, Clone, PartialEq)]
pub struct SafeSummary {
    pub telegram_configured: bool,
    pub gemini_configured: bool,
    pub model: String,
    pub allow_from_count: usize,
    pub session_ttl_secs: u64,
    pub rpm_limit: u32,
    pub tpm_limit: u64,
}

impl Config {
    pub fn get_safe_summary(&self) -> SafeSummary {
        SafeSummary {
            telegram_configured: self.telegram_token.is_some(),
            gemini_configured: self.gemini_api_key.is_some(),
            model: self.model.clone(),
            allow_from_count: self.authorized_user_ids.len(),
            session_ttl_secs: self.session_ttl_secs,
            rpm_limit: self.rpm_limit,
            tpm_limit: self.tpm_limit,
        }
    }
}

/// User-facing texts sent by the bot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BotMessages {
    pub error_info: String,
    pub before_generate_info: String,
    pub access_denied_info: String,
    pub prompt_too_long_info: String,
    pub rate_limit_info: String,
    pub empty_response_info: String,
}

impl Default for BotMessages {
    fn default() -> Self {
        Self {
            error_info: "⚠️⚠️⚠️\nSomething went wrong !\nPlease try to change your prompt or contact the admin !".to_string(),
            before_generate_info: "🤖Generating🤖".to_string(),
            access_denied_info: "You are not allowed to use this bot.".to_string(),
            prompt_too_long_info: "Your prompt is too long for this model. Use /clear to start a new conversation.".to_string(),
            rate_limit_info: "Rate limit reached, please wait a minute and try again.".to_string(),
            empty_response_info: "The model returned an empty response.".to_string(),
        }
    }
}
