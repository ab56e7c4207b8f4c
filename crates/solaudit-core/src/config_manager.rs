use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Failed to read config: {0}")]
    ReadError(String),

    #[error("Failed to parse config: {0}")]
    ParseError(String),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Main configuration for the audit service. Built once at start-up and never mutated.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuditConfig {
    /// HTTP listener settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Static-analysis tool invocation
    #[serde(default)]
    pub analyzer: AnalyzerConfig,

    /// Narrative summary provider
    #[serde(default)]
    pub llm: LlmConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Origins allowed to call the API from a browser (empty = any)
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            allowed_origins: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    /// Executable to run; receives the scratch file path as its first argument
    #[serde(default = "default_analyzer_command")]
    pub command: String,

    /// Analysis-mode flags appended after the target path
    #[serde(default = "default_analyzer_args")]
    pub args: Vec<String>,

    /// Hard limit before the tool is killed
    #[serde(default = "default_analyzer_timeout_secs")]
    pub timeout_secs: u64,

    /// Directory for scratch files (system temp dir when unset)
    #[serde(default)]
    pub scratch_dir: Option<PathBuf>,

    #[serde(default = "default_file_suffix")]
    pub file_suffix: String,

    /// Tool name used in diagnostic and failure text
    #[serde(default = "default_analyzer_label")]
    pub label: String,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            command: default_analyzer_command(),
            args: default_analyzer_args(),
            timeout_secs: default_analyzer_timeout_secs(),
            scratch_dir: None,
            file_suffix: default_file_suffix(),
            label: default_analyzer_label(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// LLM provider: "openai", "anthropic" or "baseline"
    #[serde(default = "default_llm_provider")]
    pub provider: String,

    /// Model identifier (provider default when unset)
    #[serde(default)]
    pub model: Option<String>,

    #[serde(default)]
    pub openai_api_key: Option<String>,

    #[serde(default)]
    pub anthropic_api_key: Option<String>,

    /// Override for the provider's API base URL
    #[serde(default)]
    pub base_url: Option<String>,

    /// Upper bound for one summary call
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Answer with a fixed baseline narrative instead of calling the provider
    #[serde(default)]
    pub use_baseline: bool,

    /// Replace the built-in prompt template with the contents of this file
    #[serde(default)]
    pub prompt_template_path: Option<PathBuf>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            model: None,
            openai_api_key: None,
            anthropic_api_key: None,
            base_url: None,
            timeout_secs: default_llm_timeout_secs(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            use_baseline: false,
            prompt_template_path: None,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "pretty", "compact"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    5000
}
fn default_analyzer_command() -> String {
    "slither".to_string()
}
fn default_analyzer_args() -> Vec<String> {
    vec![
        "--print".to_string(),
        "human-summary,contract-summary,entry-points".to_string(),
    ]
}
fn default_analyzer_timeout_secs() -> u64 {
    10
}
fn default_file_suffix() -> String {
    ".sol".to_string()
}
fn default_analyzer_label() -> String {
    "Slither".to_string()
}
fn default_llm_provider() -> String {
    "openai".to_string()
}
fn default_llm_timeout_secs() -> u64 {
    60
}
fn default_max_tokens() -> usize {
    1024
}
fn default_temperature() -> f32 {
    0.2
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "pretty".to_string()
}

fn parse_flag(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "true" | "1" | "yes")
}

/// Configuration manager with layered sources
pub struct ConfigManager {
    config: AuditConfig,
    config_path: Option<PathBuf>,
}

impl ConfigManager {
    /// Load configuration with the following precedence:
    /// 1. Environment variables (.env file)
    /// 2. Config file (explicit path, ./.solaudit.toml, ~/.solaudit/config.toml)
    /// 3. Sensible defaults
    pub fn load(explicit_path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_overrides(explicit_path, |_| {})
    }

    /// Same as `load`, with a final override layer (command-line flags) applied before validation.
    pub fn load_with_overrides<F>(explicit_path: Option<&Path>, overrides: F) -> Result<Self, ConfigError>
    where
        F: FnOnce(&mut AuditConfig),
    {
        info!("Loading SolAudit configuration");

        Self::load_dotenv();

        let (config, config_path) = match explicit_path {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigError::NotFound(path.display().to_string()));
                }
                (Self::read_toml_file(path)?, Some(path.to_path_buf()))
            }
            None => Self::load_config_file()?,
        };

        let mut config = Self::apply_env_overrides(config, |key| std::env::var(key).ok());
        overrides(&mut config);
        Self::validate_config(&config)?;

        match config_path {
            Some(ref path) => info!(path = %path.display(), "Config file loaded"),
            None => info!("No config file found, using defaults"),
        }
        info!(
            analyzer = %config.analyzer.command,
            timeout_secs = config.analyzer.timeout_secs,
            llm_provider = %config.llm.provider,
            baseline = config.llm.use_baseline,
            "Configuration loaded"
        );

        Ok(Self {
            config,
            config_path,
        })
    }

    /// Load .env file if it exists
    fn load_dotenv() {
        if Path::new(".env").exists() {
            if let Err(e) = dotenv::from_filename(".env") {
                warn!("Failed to load .env file: {}", e);
            } else {
                info!("Loaded .env file from current directory");
            }
        }
    }

    fn load_config_file() -> Result<(AuditConfig, Option<PathBuf>), ConfigError> {
        let local_config = Path::new(".solaudit.toml");
        if local_config.exists() {
            let config = Self::read_toml_file(local_config)?;
            return Ok((config, Some(local_config.to_path_buf())));
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".solaudit").join("config.toml");
            if user_config.exists() {
                let config = Self::read_toml_file(&user_config)?;
                return Ok((config, Some(user_config)));
            }
        }

        Ok((AuditConfig::default(), None))
    }

    /// Read TOML config file
    pub fn read_toml_file(path: &Path) -> Result<AuditConfig, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError(e.to_string()))?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Apply environment variable overrides
    fn apply_env_overrides<F>(mut config: AuditConfig, var: F) -> AuditConfig
    where
        F: Fn(&str) -> Option<String>,
    {
        // Server
        if let Some(host) = var("SOLAUDIT_HOST") {
            config.server.host = host;
        }
        if let Some(port) = var("SOLAUDIT_PORT").and_then(|p| p.parse().ok()) {
            config.server.port = port;
        }

        // Analyzer
        if let Some(command) = var("SOLAUDIT_ANALYZER_COMMAND") {
            config.analyzer.command = command;
        }
        if let Some(secs) = var("SOLAUDIT_ANALYZER_TIMEOUT_SECS").and_then(|s| s.parse().ok()) {
            config.analyzer.timeout_secs = secs;
        }
        if let Some(dir) = var("SOLAUDIT_SCRATCH_DIR") {
            config.analyzer.scratch_dir = Some(PathBuf::from(dir));
        }

        // LLM
        if let Some(provider) = var("SOLAUDIT_LLM_PROVIDER") {
            config.llm.provider = provider;
        }
        if let Some(model) = var("SOLAUDIT_LLM_MODEL") {
            config.llm.model = Some(model);
        }
        if let Some(secs) = var("SOLAUDIT_LLM_TIMEOUT_SECS").and_then(|s| s.parse().ok()) {
            config.llm.timeout_secs = secs;
        }
        if let Some(flag) = var("SOLAUDIT_USE_BASELINE") {
            config.llm.use_baseline = parse_flag(&flag);
        }
        if let Some(key) = var("OPENAI_API_KEY") {
            config.llm.openai_api_key = Some(key);
        }
        if let Some(key) = var("ANTHROPIC_API_KEY") {
            config.llm.anthropic_api_key = Some(key);
        }

        // Logging
        if let Some(level) = var("RUST_LOG") {
            // Only plain levels map onto the config; directive strings go straight to EnvFilter.
            if matches!(
                level.as_str(),
                "trace" | "debug" | "info" | "warn" | "error"
            ) {
                config.logging.level = level;
            }
        }

        config
    }

    /// Validate configuration
    pub fn validate_config(config: &AuditConfig) -> Result<(), ConfigError> {
        if config.analyzer.command.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "Analyzer command must not be empty".to_string(),
            ));
        }
        if config.analyzer.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "Analyzer timeout must be greater than zero".to_string(),
            ));
        }
        if config.llm.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "LLM timeout must be greater than zero".to_string(),
            ));
        }

        match config.llm.provider.to_lowercase().as_str() {
            "baseline" => {}
            _ if config.llm.use_baseline => {}
            "openai" => {
                if config.llm.openai_api_key.as_deref().unwrap_or("").is_empty() {
                    return Err(ConfigError::ValidationError(
                        "OpenAI API key not found. Set 'llm.openai_api_key' in config \
                         or OPENAI_API_KEY environment variable"
                            .to_string(),
                    ));
                }
            }
            "anthropic" => {
                if config
                    .llm
                    .anthropic_api_key
                    .as_deref()
                    .unwrap_or("")
                    .is_empty()
                {
                    return Err(ConfigError::ValidationError(
                        "Anthropic API key not found. Set 'llm.anthropic_api_key' in config \
                         or ANTHROPIC_API_KEY environment variable"
                            .to_string(),
                    ));
                }
            }
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid LLM provider: {}. Must be one of: openai, anthropic, baseline",
                    other
                )))
            }
        }

        match config.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                    other
                )))
            }
        }

        match config.logging.format.as_str() {
            "pretty" | "compact" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid log format: {}. Must be one of: pretty, compact",
                    other
                )))
            }
        }

        Ok(())
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &AuditConfig {
        &self.config
    }

    /// Consume the manager, keeping only the configuration
    pub fn into_config(self) -> AuditConfig {
        self.config
    }

    /// Get the path to the config file that was loaded, if any
    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }
}
