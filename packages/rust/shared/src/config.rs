//! Application configuration for Presswork.
//!
//! User config lives at `~/.presswork/presswork.toml` unless `--config` or
//! `PRESSWORK_CONFIG` points elsewhere. CLI flags override config file values,
//! which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PressworkError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "presswork.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".presswork";

// ---------------------------------------------------------------------------
// Config structs (matching presswork.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Filesystem locations.
    #[serde(default)]
    pub paths: PathsConfig,

    /// Generation gateway settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Per-stage timeouts and retry policy.
    #[serde(default)]
    pub stages: StagesConfig,

    /// Backlog selection.
    #[serde(default)]
    pub selector: SelectorConfig,

    /// Validation gate thresholds.
    #[serde(default)]
    pub validation: ValidationConfig,

    /// Search API used for demand enrichment and grounding.
    #[serde(default)]
    pub search: SearchConfig,

    /// Freshness detection.
    #[serde(default)]
    pub freshness: FreshnessConfig,
}

/// `[paths]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Root of the published-content tree.
    #[serde(default = "default_content_dir")]
    pub content_dir: PathBuf,

    /// Work-item store database file.
    #[serde(default = "default_database")]
    pub database: PathBuf,

    /// Where run reports are written.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Directory for temporary prompt files (system temp dir when unset).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp_dir: Option<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            content_dir: default_content_dir(),
            database: default_database(),
            output_dir: default_output_dir(),
            temp_dir: None,
        }
    }
}

impl PathsConfig {
    /// Resolved temp directory.
    pub fn temp_dir(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

fn default_content_dir() -> PathBuf {
    PathBuf::from("content")
}
fn default_database() -> PathBuf {
    PathBuf::from("data/presswork.db")
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

/// How a generator is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GatewayMode {
    /// One-shot child process reading the prompt on stdin.
    Subprocess,
    /// Chat-completions call over HTTP.
    SyncHttp,
}

impl std::fmt::Display for GatewayMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Subprocess => f.write_str("subprocess"),
            Self::SyncHttp => f.write_str("sync-http"),
        }
    }
}

/// `[gateway]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Mode used when a stage does not override it.
    #[serde(default = "default_gateway_mode")]
    pub default_mode: GatewayMode,

    #[serde(default)]
    pub subprocess: SubprocessConfig,

    #[serde(default)]
    pub http: HttpGatewayConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            default_mode: default_gateway_mode(),
            subprocess: SubprocessConfig::default(),
            http: HttpGatewayConfig::default(),
        }
    }
}

fn default_gateway_mode() -> GatewayMode {
    GatewayMode::Subprocess
}

/// `[gateway.subprocess]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubprocessConfig {
    /// Program to run.
    #[serde(default = "default_program")]
    pub program: String,

    /// Arguments passed before the prompt is piped on stdin.
    #[serde(default = "default_program_args")]
    pub args: Vec<String>,

    /// Working directory for the child process.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,
}

impl Default for SubprocessConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: default_program_args(),
            working_dir: None,
        }
    }
}

fn default_program() -> String {
    "claude".into()
}
fn default_program_args() -> Vec<String> {
    vec!["-p".into(), "--allowedTools".into(), String::new()]
}

/// `[gateway.http]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpGatewayConfig {
    /// Base URL of an OpenAI-compatible API.
    #[serde(default = "default_http_base_url")]
    pub base_url: String,

    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Model to request.
    #[serde(default = "default_model")]
    pub model: String,
}

impl Default for HttpGatewayConfig {
    fn default() -> Self {
        Self {
            base_url: default_http_base_url(),
            api_key_env: default_api_key_env(),
            model: default_model(),
        }
    }
}

fn default_http_base_url() -> String {
    "https://openrouter.ai/api/v1".into()
}
fn default_api_key_env() -> String {
    "OPENROUTER_API_KEY".into()
}
fn default_model() -> String {
    "moonshotai/kimi-k2.5".into()
}

/// Timeout and optional gateway override for one stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageConfig {
    pub timeout_secs: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<GatewayMode>,
}

impl StageConfig {
    fn with_timeout(timeout_secs: u64) -> Self {
        Self {
            timeout_secs,
            mode: None,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// `[stages]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagesConfig {
    #[serde(default = "default_research_stage")]
    pub research: StageConfig,

    #[serde(default = "default_narrative_stage")]
    pub narrative: StageConfig,

    #[serde(default = "default_write_stage")]
    pub write: StageConfig,

    #[serde(default = "default_extract_stage")]
    pub extract: StageConfig,

    #[serde(default = "default_update_stage")]
    pub update: StageConfig,

    /// Extra attempts for transient failures in topic stages.
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// Fixed delay before each retry.
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_secs: u64,
}

impl Default for StagesConfig {
    fn default() -> Self {
        Self {
            research: default_research_stage(),
            narrative: default_narrative_stage(),
            write: default_write_stage(),
            extract: default_extract_stage(),
            update: default_update_stage(),
            retry_attempts: default_retry_attempts(),
            retry_backoff_secs: default_retry_backoff(),
        }
    }
}

fn default_research_stage() -> StageConfig {
    StageConfig::with_timeout(1200)
}
fn default_narrative_stage() -> StageConfig {
    StageConfig::with_timeout(600)
}
fn default_write_stage() -> StageConfig {
    StageConfig::with_timeout(600)
}
fn default_extract_stage() -> StageConfig {
    StageConfig::with_timeout(300)
}
fn default_update_stage() -> StageConfig {
    StageConfig::with_timeout(300)
}
fn default_retry_attempts() -> u32 {
    1
}
fn default_retry_backoff() -> u64 {
    10
}

/// `[selector]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectorConfig {
    /// Batch size when `--limit` is not given.
    #[serde(default = "default_limit")]
    pub default_limit: usize,

    /// Largest share of one batch a single category may take.
    #[serde(default = "default_diversity_fraction")]
    pub diversity_fraction: f64,

    /// Candidates fetched per batch slot before the diversity cap applies.
    #[serde(default = "default_candidate_window")]
    pub candidate_window: usize,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            diversity_fraction: default_diversity_fraction(),
            candidate_window: default_candidate_window(),
        }
    }
}

fn default_limit() -> usize {
    10
}
fn default_diversity_fraction() -> f64 {
    0.34
}
fn default_candidate_window() -> usize {
    5
}

/// `[validation]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Absolute body-length floor for every artifact.
    #[serde(default = "default_min_body_chars")]
    pub min_body_chars: usize,

    /// English output must stay at or below this share of CJK letters.
    #[serde(default = "default_en_max_ratio")]
    pub en_max_secondary_ratio: f64,

    /// Chinese output must reach at least this share of CJK letters.
    #[serde(default = "default_zh_min_ratio")]
    pub zh_min_secondary_ratio: f64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            min_body_chars: default_min_body_chars(),
            en_max_secondary_ratio: default_en_max_ratio(),
            zh_min_secondary_ratio: default_zh_min_ratio(),
        }
    }
}

fn default_min_body_chars() -> usize {
    50
}
fn default_en_max_ratio() -> f64 {
    0.10
}
fn default_zh_min_ratio() -> f64 {
    0.10
}

/// `[search]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Web search endpoint.
    #[serde(default = "default_search_url")]
    pub base_url: String,

    /// Name of the env var holding the search API key.
    #[serde(default = "default_search_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_search_timeout")]
    pub timeout_secs: u64,

    /// Delay between consecutive lookup dispatches.
    #[serde(default = "default_dispatch_delay")]
    pub dispatch_delay_ms: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            base_url: default_search_url(),
            api_key_env: default_search_key_env(),
            timeout_secs: default_search_timeout(),
            dispatch_delay_ms: default_dispatch_delay(),
        }
    }
}

fn default_search_url() -> String {
    "https://api.search.brave.com/res/v1/web/search".into()
}
fn default_search_key_env() -> String {
    "BRAVE_API_KEY".into()
}
fn default_search_timeout() -> u64 {
    10
}
fn default_dispatch_delay() -> u64 {
    1000
}

/// `[freshness]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FreshnessConfig {
    /// How far back to look for matching news.
    #[serde(default = "default_lookback_hours")]
    pub lookback_hours: i64,

    /// Minimum keyword overlap for a match.
    #[serde(default = "default_match_threshold")]
    pub match_threshold: i64,
}

impl Default for FreshnessConfig {
    fn default() -> Self {
        Self {
            lookback_hours: default_lookback_hours(),
            match_threshold: default_match_threshold(),
        }
    }
}

fn default_lookback_hours() -> i64 {
    48
}
fn default_match_threshold() -> i64 {
    2
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.presswork/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| PressworkError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.presswork/presswork.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| PressworkError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        PressworkError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| PressworkError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| PressworkError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| PressworkError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read a secret from the env var named in config.
pub fn read_api_key(var_name: &str) -> Result<String> {
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(PressworkError::config(format!(
            "API key not found. Set the {var_name} environment variable."
        ))),
    }
}
