//! Service configuration. The compiled-in defaults below can be overridden by
//! an optional TOML file and by `IMGDESC_`-prefixed environment variables.

use anyhow::{anyhow, bail, Result};
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;

/// Base URL of the OpenAI-compatible chat-completion API
pub const API_BASE: &str = "https://router.huggingface.co/v1";

/// The hosted multimodal model every request is sent to
pub const MODEL: &str = "Qwen/Qwen3-VL-8B-Instruct:novita";

/// Instruction sent alongside every image
pub const PROMPT: &str = "Décris l'image en UNE phrase courte.";

/// Longest side, in pixels, of the image forwarded to the model
pub const MAX_SIDE: u32 = 768;

pub const JPEG_QUALITY: u8 = 80;

/// Output token budget of a single description
pub const MAX_TOKENS: u32 = 60;

pub const PORT: u16 = 8040;

/// Largest accepted request body
pub const MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

/// Environment variable holding the API bearer token
pub const TOKEN_VAR: &str = "HF_TOKEN";

/// Environment variable pointing at the optional TOML config file
pub const CONFIG_PATH_VAR: &str = "IMGDESC_CONFIG";

pub const CONFIG_FILE: &str = "imgdesc.toml";

pub const ENV_PREFIX: &str = "IMGDESC";

/// Runtime settings of the service
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    pub api_base: String,
    pub model: String,
    pub prompt: String,
    pub max_side: u32,
    pub jpeg_quality: u8,
    pub max_tokens: u32,
    pub temperature: f32,
    pub max_body_bytes: usize,

    /// Report raw inference API failures to callers. When false, callers
    /// get a generic message and the details only go to the log.
    pub expose_upstream_errors: bool,

    /// Tracing filter used when `RUST_LOG` is not set
    pub log: String,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            host: "0.0.0.0".into(),
            port: PORT,
            api_base: API_BASE.into(),
            model: MODEL.into(),
            prompt: PROMPT.into(),
            max_side: MAX_SIDE,
            jpeg_quality: JPEG_QUALITY,
            max_tokens: MAX_TOKENS,
            temperature: 0.0,
            max_body_bytes: MAX_BODY_BYTES,
            expose_upstream_errors: true,
            log: "info".into(),
        }
    }
}

impl Settings {
    /// Load settings from the defaults, the config file and the environment,
    /// in increasing order of precedence
    pub fn load() -> Result<Self> {
        let path = env::var(CONFIG_PATH_VAR).unwrap_or_else(|_| CONFIG_FILE.into());
        let config = Self::defaults()?
            .add_source(File::with_name(&path).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX))
            .build()?;
        Self::from_config(config)
    }

    /// A config builder seeded with the compiled-in defaults
    pub fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        let d = Settings::default();
        Config::builder()
            .set_default("host", d.host)?
            .set_default("port", i64::from(d.port))?
            .set_default("api_base", d.api_base)?
            .set_default("model", d.model)?
            .set_default("prompt", d.prompt)?
            .set_default("max_side", i64::from(d.max_side))?
            .set_default("jpeg_quality", i64::from(d.jpeg_quality))?
            .set_default("max_tokens", i64::from(d.max_tokens))?
            .set_default("temperature", f64::from(d.temperature))?
            .set_default("max_body_bytes", d.max_body_bytes as i64)?
            .set_default("expose_upstream_errors", d.expose_upstream_errors)?
            .set_default("log", d.log)
    }

    pub fn from_config(config: Config) -> Result<Self> {
        let settings: Settings = config.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_side == 0 || self.max_side > u32::from(u16::MAX) {
            bail!("max_side must be within 1..=65535, got {}", self.max_side);
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            bail!("jpeg_quality must be within 1..=100, got {}", self.jpeg_quality);
        }
        if self.max_tokens == 0 {
            bail!("max_tokens must be at least 1");
        }
        if self.api_base.trim().is_empty() {
            bail!("api_base must not be empty");
        }
        Ok(())
    }
}

/// Read the inference API token. The service refuses to start without one.
pub fn token_from_env() -> Result<String> {
    token_from(env::var(TOKEN_VAR).ok())
}

/// Accept a token value only if it holds something besides whitespace
pub fn token_from(value: Option<String>) -> Result<String> {
    match value {
        Some(token) if !token.trim().is_empty() => Ok(token),
        _ => Err(anyhow!("{TOKEN_VAR} must be set to the inference API token")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    #[test]
    fn test_defaults() {
        let config = Settings::defaults().unwrap().build().unwrap();
        let settings = Settings::from_config(config).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.port, 8040);
        assert_eq!(settings.max_side, 768);
        assert_eq!(settings.jpeg_quality, 80);
        assert_eq!(settings.max_tokens, 60);
        assert_eq!(settings.temperature, 0.0);
    }

    #[test]
    fn test_toml_overrides() {
        let toml = r#"
            port = 9000
            max_side = 512
            expose_upstream_errors = false
        "#;
        let config = Settings::defaults()
            .unwrap()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()
            .unwrap();
        let settings = Settings::from_config(config).unwrap();
        assert_eq!(settings.port, 9000);
        assert_eq!(settings.max_side, 512);
        assert!(!settings.expose_upstream_errors);
        assert_eq!(settings.model, MODEL);
    }

    #[test]
    fn test_rejects_bad_quality() {
        for quality in [0, 101] {
            let config = Settings::defaults()
                .unwrap()
                .set_override("jpeg_quality", quality)
                .unwrap()
                .build()
                .unwrap();
            assert!(Settings::from_config(config).is_err());
        }
    }

    #[test]
    fn test_rejects_bad_side() {
        for max_side in [0, 65536] {
            let settings = Settings {
                max_side,
                ..Settings::default()
            };
            assert!(settings.validate().is_err());
        }
    }

    #[test]
    fn test_token_required() {
        for value in [None, Some(String::new()), Some("  \t\n".to_string())] {
            let err = token_from(value).unwrap_err();
            assert!(err.to_string().contains(TOKEN_VAR));
        }
        assert_eq!(token_from(Some("hf_abc".into())).unwrap(), "hf_abc");
    }
}
