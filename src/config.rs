use std::path::PathBuf;

/// Application-level constants
pub const APP_NAME: &str = "MediVision";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Oldest records beyond this count are evicted from the prescription store.
pub const MAX_STORED_PRESCRIPTIONS: usize = 50;

/// First hour (0-23) that counts as evening for dose scheduling.
pub const EVENING_START_HOUR: u32 = 17;

const OPENROUTER_API_KEY_VAR: &str = "MEDIVISION_OPENROUTER_API_KEY";
const MOONDREAM_API_KEY_VAR: &str = "MEDIVISION_MOONDREAM_API_KEY";

/// Get the application data directory
/// Platform data dir + "MediVision", falling back to the working directory.
pub fn app_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Get the SQLite file holding saved prescriptions
pub fn database_path() -> PathBuf {
    app_data_dir().join("prescriptions.db")
}

/// Filter used when `RUST_LOG` is not set.
pub fn default_log_filter() -> &'static str {
    "info,medivision_lib=debug"
}

/// OpenRouter chat-completions settings (prescription parsing + JSON point queries).
#[derive(Debug, Clone)]
pub struct OpenRouterConfig {
    pub api_key: String,
    pub base_url: String,
    /// Vision-capable model, e.g. "openai/gpt-4o".
    pub model: String,
    /// Sent as `HTTP-Referer` when present.
    pub site_url: Option<String>,
    /// Sent as `X-Title` when present.
    pub site_name: Option<String>,
    pub timeout_secs: u64,
}

impl Default for OpenRouterConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://openrouter.ai/api/v1".to_string(),
            model: "openai/gpt-4o".to_string(),
            site_url: None,
            site_name: None,
            timeout_secs: 60,
        }
    }
}

impl OpenRouterConfig {
    /// Defaults with the API key taken from `MEDIVISION_OPENROUTER_API_KEY`.
    pub fn from_env() -> Self {
        Self {
            api_key: std::env::var(OPENROUTER_API_KEY_VAR).unwrap_or_default(),
            ..Self::default()
        }
    }
}

/// Moondream point/query API settings.
#[derive(Debug, Clone)]
pub struct MoondreamConfig {
    pub api_key: String,
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for MoondreamConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.moondream.ai/v1".to_string(),
            timeout_secs: 60,
        }
    }
}

impl MoondreamConfig {
    /// Defaults with the API key taken from `MEDIVISION_MOONDREAM_API_KEY`.
    pub fn from_env() -> Self {
        Self {
            api_key: std::env::var(MOONDREAM_API_KEY_VAR).unwrap_or_default(),
            ..Self::default()
        }
    }
}
