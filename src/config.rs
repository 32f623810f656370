use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub matching: MatchingConfig,
    #[serde(default)]
    pub maps: MapsConfig,
    #[serde(default)]
    pub notifier: NotifierConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
    /// Allowed CORS origins. Empty means any origin.
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    #[serde(default = "default_disabled")]
    pub provider: String,
    #[serde(default = "default_firebase_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            provider: default_disabled(),
            api_key_env: default_firebase_key_env(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_firebase_key_env() -> String {
    "FIREBASE_API_KEY".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_disabled")]
    pub provider: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    /// Temperature for classification and extraction calls.
    #[serde(default)]
    pub temperature: f32,
    /// Temperature for free-text email drafting.
    #[serde(default = "default_email_temperature")]
    pub email_temperature: f32,
    #[serde(default = "default_google_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_disabled(),
            model: default_llm_model(),
            temperature: 0.0,
            email_temperature: default_email_temperature(),
            api_key_env: default_google_key_env(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_llm_model() -> String {
    "gemini-2.0-flash".to_string()
}
fn default_email_temperature() -> f32 {
    0.5
}
fn default_google_key_env() -> String {
    "GOOGLE_API_KEY".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_disabled")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Environment variable holding the API key. Defaults per provider.
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_disabled(),
            model: None,
            dims: None,
            api_key_env: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_disabled() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct MatchingConfig {
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,
    #[serde(default = "default_max_matches_per_query")]
    pub max_matches_per_query: usize,
    #[serde(default = "default_max_providers")]
    pub max_providers: usize,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity_threshold(),
            max_matches_per_query: default_max_matches_per_query(),
            max_providers: default_max_providers(),
        }
    }
}

fn default_similarity_threshold() -> f32 {
    0.75
}
fn default_max_matches_per_query() -> usize {
    7
}
fn default_max_providers() -> usize {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct MapsConfig {
    #[serde(default = "default_disabled")]
    pub provider: String,
    #[serde(default = "default_maps_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_maps_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for MapsConfig {
    fn default() -> Self {
        Self {
            provider: default_disabled(),
            api_key_env: default_maps_key_env(),
            max_retries: default_maps_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_maps_key_env() -> String {
    "GOOGLE_MAPS_KEY".to_string()
}
fn default_maps_retries() -> u32 {
    2
}

#[derive(Debug, Deserialize, Clone)]
pub struct NotifierConfig {
    #[serde(default = "default_lookahead_days")]
    pub lookahead_days: i64,
    #[serde(default = "default_smtp_host")]
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default = "default_sender_env")]
    pub sender_env: String,
    #[serde(default = "default_password_env")]
    pub password_env: String,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            lookahead_days: default_lookahead_days(),
            smtp_host: default_smtp_host(),
            smtp_port: default_smtp_port(),
            sender_env: default_sender_env(),
            password_env: default_password_env(),
        }
    }
}

fn default_lookahead_days() -> i64 {
    3
}
fn default_smtp_host() -> String {
    "smtp.gmail.com".to_string()
}
fn default_smtp_port() -> u16 {
    465
}
fn default_sender_env() -> String {
    "EMAIL_ADDRESS".to_string()
}
fn default_password_env() -> String {
    "EMAIL_PASSWORD".to_string()
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }

    /// The configured key variable, or the provider's conventional one.
    pub fn key_env(&self) -> &str {
        match (&self.api_key_env, self.provider.as_str()) {
            (Some(env), _) => env.as_str(),
            (None, "openai") => "OPENAI_API_KEY",
            (None, _) => "GOOGLE_API_KEY",
        }
    }
}

impl Config {
    /// A config with every external provider disabled and an in-tree
    /// database path. Used by tests and as a base for programmatic setups.
    pub fn minimal() -> Self {
        Self {
            db: DbConfig {
                path: PathBuf::from("./data/grocer.sqlite"),
            },
            server: ServerConfig {
                bind: "127.0.0.1:8000".to_string(),
                cors_origins: Vec::new(),
            },
            auth: AuthConfig::default(),
            llm: LlmConfig::default(),
            embedding: EmbeddingConfig::default(),
            matching: MatchingConfig::default(),
            maps: MapsConfig::default(),
            notifier: NotifierConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    // Validate matching
    if !(0.0..=1.0).contains(&config.matching.similarity_threshold) {
        anyhow::bail!("matching.similarity_threshold must be in [0.0, 1.0]");
    }
    if config.matching.max_matches_per_query == 0 {
        anyhow::bail!("matching.max_matches_per_query must be > 0");
    }
    if config.matching.max_providers == 0 {
        anyhow::bail!("matching.max_providers must be > 0");
    }

    if config.notifier.lookahead_days < 0 {
        anyhow::bail!("notifier.lookahead_days must be >= 0");
    }

    // Validate embedding
    if config.embedding.is_enabled() {
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.batch_size == 0 {
            anyhow::bail!("embedding.batch_size must be > 0");
        }
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "gemini" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, or gemini.",
            other
        ),
    }

    match config.llm.provider.as_str() {
        "disabled" | "gemini" => {}
        other => anyhow::bail!(
            "Unknown llm provider: '{}'. Must be disabled or gemini.",
            other
        ),
    }

    match config.auth.provider.as_str() {
        "disabled" | "firebase" => {}
        other => anyhow::bail!(
            "Unknown auth provider: '{}'. Must be disabled or firebase.",
            other
        ),
    }

    match config.maps.provider.as_str() {
        "disabled" | "google" => {}
        other => anyhow::bail!(
            "Unknown maps provider: '{}'. Must be disabled or google.",
            other
        ),
    }

    Ok(config)
}
