//! LLM integration for jobmail.
//!
//! Supports:
//! - **Groq**: OpenAI-compatible endpoint (default)
//! - **OpenAI**: direct API access
//!
//! Both go through `OpenAiCompatProvider`; `create_provider` picks the base
//! URL and provider name.

pub mod openai_compat;
pub mod provider;
pub(crate) mod retry;

pub use openai_compat::OpenAiCompatProvider;
pub use provider::*;

use std::sync::Arc;

use crate::config::parse_or;
use crate::error::{ConfigError, LlmError};

const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";
const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "openai/gpt-oss-20b";

/// Supported LLM backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmBackend {
    Groq,
    OpenAi,
}

impl LlmBackend {
    /// Provider name used in logs and errors.
    pub fn name(self) -> &'static str {
        match self {
            Self::Groq => "groq",
            Self::OpenAi => "openai",
        }
    }

    fn default_base_url(self) -> &'static str {
        match self {
            Self::Groq => GROQ_BASE_URL,
            Self::OpenAi => OPENAI_BASE_URL,
        }
    }
}

impl std::str::FromStr for LlmBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "groq" => Ok(Self::Groq),
            "openai" => Ok(Self::OpenAi),
            other => Err(ConfigError::InvalidValue {
                key: "JOBMAIL_LLM_BACKEND".into(),
                message: format!("unknown backend '{other}' (expected groq or openai)"),
            }),
        }
    }
}

/// Configuration for creating an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub backend: LlmBackend,
    pub api_key: secrecy::SecretString,
    pub model: String,
    /// Overrides the backend's default API root.
    pub base_url: Option<String>,
}

impl LlmConfig {
    /// Build from `JOBMAIL_LLM_BACKEND`, `GROQ_API_KEY` / `JOBMAIL_LLM_API_KEY`,
    /// `GROQ_MODEL` / `JOBMAIL_MODEL` and `JOBMAIL_LLM_BASE_URL`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let backend: LlmBackend = parse_or(&lookup, "JOBMAIL_LLM_BACKEND", LlmBackend::Groq)?;

        let api_key = lookup("JOBMAIL_LLM_API_KEY")
            .or_else(|| match backend {
                LlmBackend::Groq => lookup("GROQ_API_KEY"),
                LlmBackend::OpenAi => lookup("OPENAI_API_KEY"),
            })
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingRequired {
                key: "GROQ_API_KEY".into(),
                hint: "export GROQ_API_KEY=gsk_... (or JOBMAIL_LLM_API_KEY)".into(),
            })?;

        let model = lookup("JOBMAIL_MODEL")
            .or_else(|| lookup("GROQ_MODEL"))
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        Ok(Self {
            backend,
            api_key: secrecy::SecretString::from(api_key),
            model,
            base_url: lookup("JOBMAIL_LLM_BASE_URL").filter(|u| !u.trim().is_empty()),
        })
    }
}

/// Create an LLM provider from configuration.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    let base_url = config
        .base_url
        .clone()
        .unwrap_or_else(|| config.backend.default_base_url().to_string());

    let provider = OpenAiCompatProvider::new(
        config.backend.name(),
        base_url,
        config.api_key.clone(),
        &config.model,
    )?;
    tracing::info!(
        "Using {} (model: {})",
        config.backend.name(),
        config.model
    );
    Ok(Arc::new(provider))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use secrecy::ExposeSecret;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn groq_provider_constructs() {
        let config = LlmConfig {
            backend: LlmBackend::Groq,
            api_key: secrecy::SecretString::from("test-key"),
            model: "openai/gpt-oss-20b".to_string(),
            base_url: None,
        };
        let provider = create_provider(&config);
        assert!(provider.is_ok());
        assert_eq!(provider.unwrap().model_name(), "openai/gpt-oss-20b");
    }

    #[test]
    fn test_create_openai_provider() {
        let config = LlmConfig {
            backend: LlmBackend::OpenAi,
            api_key: secrecy::SecretString::from("sk-test"),
            model: "gpt-4o-mini".to_string(),
            base_url: Some("http://localhost:9999/v1".into()),
        };
        let provider = create_provider(&config).unwrap();
        assert_eq!(provider.model_name(), "gpt-4o-mini");
    }

    #[test]
    fn backend_names_and_base_urls() {
        assert_eq!(LlmBackend::Groq.name(), "groq");
        assert_eq!(LlmBackend::OpenAi.name(), "openai");
        assert_eq!(LlmBackend::Groq.default_base_url(), GROQ_BASE_URL);
        assert_eq!(LlmBackend::OpenAi.default_base_url(), OPENAI_BASE_URL);
    }

    #[test]
    fn config_defaults_to_groq() {
        let config = LlmConfig::from_lookup(lookup_from(&[("GROQ_API_KEY", "gsk_abc")])).unwrap();
        assert_eq!(config.backend, LlmBackend::Groq);
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.api_key.expose_secret(), "gsk_abc");
        assert!(config.base_url.is_none());
    }

    #[test]
    fn config_requires_api_key() {
        let err = LlmConfig::from_lookup(lookup_from(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingRequired { .. }));
    }

    #[test]
    fn config_openai_backend_uses_openai_key() {
        let config = LlmConfig::from_lookup(lookup_from(&[
            ("JOBMAIL_LLM_BACKEND", "OpenAI"),
            ("OPENAI_API_KEY", "sk-1"),
            ("JOBMAIL_MODEL", "gpt-4o-mini"),
        ]))
        .unwrap();
        assert_eq!(config.backend, LlmBackend::OpenAi);
        assert_eq!(config.model, "gpt-4o-mini");
    }

    #[test]
    fn unknown_backend_rejected() {
        let err = LlmConfig::from_lookup(lookup_from(&[
            ("JOBMAIL_LLM_BACKEND", "ollama"),
            ("GROQ_API_KEY", "x"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }
}
