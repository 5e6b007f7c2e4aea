use qa_client::BackendConfig;
use qa_error::{QaError, Result};
use qa_render::DEFAULT_KEYWORDS;
use qa_session::SessionConfig;
use serde::Deserialize;
use std::path::Path;
use tracing::info;

pub const DEFAULT_CONFIG_PATH: &str = "configs/default.yaml";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub render: RenderCfg,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RenderCfg {
    #[serde(default = "default_keywords")]
    pub keywords: Vec<String>,
}

fn default_keywords() -> Vec<String> {
    DEFAULT_KEYWORDS.iter().map(|k| k.to_string()).collect()
}

impl Default for RenderCfg {
    fn default() -> Self {
        Self {
            keywords: default_keywords(),
        }
    }
}

/// Reads `DOCQA_CONFIG` (or the default path) and applies env overrides.
pub fn load_config() -> Result<AppConfig> {
    let path = std::env::var("DOCQA_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    load_from(Path::new(&path), |key| std::env::var(key).ok())
}

fn load_from(path: &Path, env: impl Fn(&str) -> Option<String>) -> Result<AppConfig> {
    let mut cfg = match std::fs::read_to_string(path) {
        Ok(s) => parse(&s)?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!(path = %path.display(), "no config file, using defaults");
            AppConfig::default()
        }
        Err(e) => {
            return Err(QaError::Io {
                path: path.display().to_string(),
                message: e.to_string(),
            })
        }
    };
    cfg.apply_env(env)?;
    cfg.backend.validate()?;
    info!(
        base_url = %cfg.backend.base_url,
        timeout_secs = cfg.backend.timeout_secs,
        require_document = cfg.session.require_document,
        keywords = cfg.render.keywords.len(),
        "load_config"
    );
    Ok(cfg)
}

fn parse(s: &str) -> Result<AppConfig> {
    if s.trim().is_empty() {
        return Ok(AppConfig::default());
    }
    serde_yaml::from_str(s).map_err(|e| QaError::Serialization {
        format: "yaml".to_string(),
        message: e.to_string(),
    })
}

impl AppConfig {
    fn apply_env(&mut self, env: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(url) = env("DOCQA_BACKEND_URL").filter(|v| !v.trim().is_empty()) {
            self.backend.base_url = url.trim().to_string();
        }
        if let Some(flag) = env("DOCQA_REQUIRE_DOCUMENT") {
            self.session.require_document = parse_flag(&flag).ok_or_else(|| QaError::Configuration {
                key: "DOCQA_REQUIRE_DOCUMENT".to_string(),
                reason: format!("'{}' is not a boolean", flag),
            })?;
        }
        Ok(())
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
