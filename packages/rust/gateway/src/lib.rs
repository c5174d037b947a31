//! External Generation Gateway.
//!
//! One [`Generator`] trait over two transports:
//! - [`SubprocessGenerator`]: one-shot child process fed the prompt on stdin
//! - [`HttpGenerator`]: OpenAI-compatible chat-completions endpoint
//!
//! The gateway never retries. Each call either returns text or a classified
//! [`GatewayError`]; retry policy belongs to the caller.

mod http;
mod search;
mod subprocess;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use presswork_shared::{AppConfig, GatewayError, GatewayMode, PressworkError, Result, StageConfig};

pub use http::HttpGenerator;
pub use search::{SearchClient, SearchResponse, SearchResult};
pub use subprocess::SubprocessGenerator;

/// Per-call options.
#[derive(Debug, Clone, Copy)]
pub struct GenerateOptions {
    /// Hard wall-clock limit for the call.
    pub timeout: Duration,
}

impl GenerateOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }
}

/// A text-generation capability.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Produce text for `prompt` within `opts.timeout`.
    async fn generate(&self, prompt: &str, opts: &GenerateOptions)
    -> std::result::Result<String, GatewayError>;

    /// Which transport this generator uses.
    fn mode(&self) -> GatewayMode;
}

/// The configured generators, resolved per stage.
#[derive(Clone)]
pub struct GatewaySet {
    default_mode: GatewayMode,
    subprocess: Option<Arc<dyn Generator>>,
    http: Option<Arc<dyn Generator>>,
    /// Why the HTTP generator is unavailable, surfaced when a stage asks for it.
    http_missing: Option<String>,
}

impl GatewaySet {
    /// Build from config. The HTTP generator is only available when its API
    /// key env var is set. A `sync-http` default without one is an error here;
    /// a single stage overriding to `sync-http` fails at resolution time.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let subprocess: Arc<dyn Generator> = Arc::new(SubprocessGenerator::from_config(
            &config.gateway.subprocess,
            config.paths.temp_dir(),
        ));

        let (http, http_missing) = match HttpGenerator::from_config(&config.gateway.http) {
            Ok(generator) => (Some(Arc::new(generator) as Arc<dyn Generator>), None),
            Err(e) => {
                debug!(error = %e, "sync-http generator unavailable");
                (None, Some(e.to_string()))
            }
        };

        if config.gateway.default_mode == GatewayMode::SyncHttp && http.is_none() {
            return Err(PressworkError::config(format!(
                "default mode is sync-http but its generator is unavailable: {}",
                http_missing.unwrap_or_default()
            )));
        }

        Ok(Self {
            default_mode: config.gateway.default_mode,
            subprocess: Some(subprocess),
            http,
            http_missing,
        })
    }

    /// A set that answers every stage with the same generator.
    pub fn single(generator: Arc<dyn Generator>) -> Self {
        Self {
            default_mode: generator.mode(),
            subprocess: Some(Arc::clone(&generator)),
            http: Some(generator),
            http_missing: None,
        }
    }

    /// Generator and options for a stage: the stage's mode override, else
    /// the default mode.
    pub fn for_stage(&self, stage: &StageConfig) -> Result<(Arc<dyn Generator>, GenerateOptions)> {
        let mode = stage.mode.unwrap_or(self.default_mode);
        let generator = match mode {
            GatewayMode::Subprocess => self.subprocess.clone(),
            GatewayMode::SyncHttp => self.http.clone(),
        };

        let generator = generator.ok_or_else(|| {
            PressworkError::config(format!(
                "no {mode} generator configured{}",
                self.http_missing
                    .as_deref()
                    .map(|m| format!(": {m}"))
                    .unwrap_or_default()
            ))
        })?;

        Ok((generator, GenerateOptions::with_timeout(stage.timeout())))
    }
}

/// Keep the tail of captured diagnostics bounded.
pub(crate) fn truncate_tail(text: &str, max_chars: usize) -> String {
    let count = text.chars().count();
    if count <= max_chars {
        return text.trim().to_string();
    }
    let tail: String = text.chars().skip(count - max_chars).collect();
    format!("...{}", tail.trim())
}
