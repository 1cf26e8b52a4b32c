//! Gateway and session configuration, and the gateway factory.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use proctor_core::autosave::AutosaveConfig;
use proctor_core::session::SessionConfig;
use proctor_core::traits::Gateway;

use crate::http::HttpGateway;
use crate::mock::{sample_questions, MockGateway};

/// Which gateway to talk to.
///
/// Debug output masks the API token.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum GatewayConfig {
    Http {
        base_url: String,
        #[serde(default)]
        api_token: Option<String>,
        #[serde(default)]
        timeout_secs: Option<u64>,
    },
    Mock {
        /// Exam the in-memory gateway serves its sample questions under.
        #[serde(default = "default_mock_exam")]
        exam_id: String,
    },
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GatewayConfig::Http {
                base_url,
                api_token,
                timeout_secs,
            } => f
                .debug_struct("Http")
                .field("base_url", base_url)
                .field("api_token", &api_token.as_ref().map(|_| "***"))
                .field("timeout_secs", timeout_secs)
                .finish(),
            GatewayConfig::Mock { exam_id } => {
                f.debug_struct("Mock").field("exam_id", exam_id).finish()
            }
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        GatewayConfig::Mock {
            exam_id: default_mock_exam(),
        }
    }
}

fn default_mock_exam() -> String {
    "demo".to_string()
}

/// Autosave timing, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutosaveSettings {
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default = "default_max_interval_ms")]
    pub max_interval_ms: u64,
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
}

fn default_debounce_ms() -> u64 {
    3_000
}
fn default_max_interval_ms() -> u64 {
    30_000
}
fn default_tick_ms() -> u64 {
    250
}

impl Default for AutosaveSettings {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            max_interval_ms: default_max_interval_ms(),
            tick_ms: default_tick_ms(),
        }
    }
}

impl AutosaveSettings {
    pub fn to_config(&self) -> AutosaveConfig {
        AutosaveConfig {
            debounce: Duration::from_millis(self.debounce_ms),
            max_interval: Duration::from_millis(self.max_interval_ms),
            // A zero period would make the tick loop panic.
            tick: Duration::from_millis(self.tick_ms.max(1)),
        }
    }
}

/// Top-level proctor configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProctorConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub autosave: AutosaveSettings,
    /// Overrides the attempt's own time limit.
    #[serde(default)]
    pub time_limit_secs: Option<u64>,
}

impl ProctorConfig {
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            autosave: self.autosave.to_config(),
            time_limit: self.time_limit_secs.map(Duration::from_secs),
        }
    }
}

/// Resolve environment variable references like `${VAR_NAME}` in a string.
/// Unset variables resolve to the empty string.
fn resolve_env_vars(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(start) = rest.find("${") {
        let Some(len) = rest[start..].find('}') else {
            break;
        };
        result.push_str(&rest[..start]);
        let name = &rest[start + 2..start + len];
        result.push_str(&std::env::var(name).unwrap_or_default());
        rest = &rest[start + len + 1..];
    }
    result.push_str(rest);
    result
}

fn resolve_gateway_config(config: &GatewayConfig) -> GatewayConfig {
    match config {
        GatewayConfig::Http {
            base_url,
            api_token,
            timeout_secs,
        } => GatewayConfig::Http {
            base_url: resolve_env_vars(base_url),
            api_token: api_token
                .as_deref()
                .map(resolve_env_vars)
                .filter(|t| !t.is_empty()),
            timeout_secs: *timeout_secs,
        },
        GatewayConfig::Mock { exam_id } => GatewayConfig::Mock {
            exam_id: resolve_env_vars(exam_id),
        },
    }
}

/// Apply `PROCTOR_BASE_URL` / `PROCTOR_API_TOKEN` style overrides.
///
/// A base URL override switches a mock config to HTTP.
fn apply_overrides(config: &mut ProctorConfig, var: impl Fn(&str) -> Option<String>) {
    if let Some(url) = var("PROCTOR_BASE_URL") {
        match &mut config.gateway {
            GatewayConfig::Http { base_url, .. } => *base_url = url,
            GatewayConfig::Mock { .. } => {
                config.gateway = GatewayConfig::Http {
                    base_url: url,
                    api_token: None,
                    timeout_secs: None,
                }
            }
        }
    }
    if let Some(token) = var("PROCTOR_API_TOKEN") {
        if let GatewayConfig::Http { api_token, .. } = &mut config.gateway {
            *api_token = Some(token);
        }
    }
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `proctor.toml` in the current directory
/// 2. `~/.config/proctor/config.toml`
///
/// Environment variable overrides: `PROCTOR_BASE_URL`, `PROCTOR_API_TOKEN`.
pub fn load_config() -> Result<ProctorConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<ProctorConfig> {
    let config_path = match path {
        Some(p) if p.exists() => Some(p.to_path_buf()),
        Some(p) => anyhow::bail!("config file not found: {}", p.display()),
        None => {
            let local = PathBuf::from("proctor.toml");
            if local.exists() {
                Some(local)
            } else {
                dirs_path()
                    .map(|dir| dir.join("config.toml"))
                    .filter(|global| global.exists())
            }
        }
    };

    let mut config = match config_path {
        Some(path) => {
            tracing::debug!(path = %path.display(), "loading config");
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            toml::from_str::<ProctorConfig>(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?
        }
        None => ProctorConfig::default(),
    };

    apply_overrides(&mut config, |name| {
        std::env::var(name).ok().filter(|v| !v.is_empty())
    });
    config.gateway = resolve_gateway_config(&config.gateway);

    Ok(config)
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("proctor"))
}

/// Create a gateway instance from its configuration.
pub fn create_gateway(config: &GatewayConfig) -> Result<Box<dyn Gateway>> {
    match config {
        GatewayConfig::Http {
            base_url,
            api_token,
            timeout_secs,
        } => Ok(Box::new(HttpGateway::new(
            base_url,
            api_token.clone(),
            *timeout_secs,
        )?)),
        GatewayConfig::Mock { exam_id } => {
            Ok(Box::new(MockGateway::new().with_exam(exam_id, sample_questions())))
        }
    }
}
