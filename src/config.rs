use std::env;
use std::time::Duration;

use chatgpt::config::ChatGPTEngine;

use crate::error::ConfigError;

pub const DEFAULT_TEXT_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_IMAGE_MODEL: &str = "dall-e-3";
pub const DEFAULT_LANGUAGE: &str = "English";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: String,
    pub text_model: String,
    pub image_model: String,
    pub language: String,
    pub request_timeout: Duration,
    pub images_enabled: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup("CHATGPT_API_KEY")
            .filter(|key| !key.trim().is_empty())
            .ok_or(ConfigError::Missing("CHATGPT_API_KEY"))?;

        let timeout_secs = match lookup("QUIZ_REQUEST_TIMEOUT_SECS") {
            Some(raw) => parse_timeout(&raw)?,
            None => DEFAULT_TIMEOUT_SECS,
        };

        let images_enabled = match lookup("QUIZ_IMAGES") {
            Some(raw) => parse_switch("QUIZ_IMAGES", &raw)?,
            None => true,
        };

        Ok(Self {
            api_key,
            text_model: lookup("QUIZ_TEXT_MODEL").unwrap_or_else(|| DEFAULT_TEXT_MODEL.to_string()),
            image_model: lookup("QUIZ_IMAGE_MODEL")
                .unwrap_or_else(|| DEFAULT_IMAGE_MODEL.to_string()),
            language: lookup("QUIZ_LANGUAGE").unwrap_or_else(|| DEFAULT_LANGUAGE.to_string()),
            request_timeout: Duration::from_secs(timeout_secs),
            images_enabled,
        })
    }

    pub fn text_engine(&self) -> ChatGPTEngine {
        match self.text_model.as_str() {
            "gpt-3.5-turbo" => ChatGPTEngine::Gpt35Turbo,
            "gpt-4" => ChatGPTEngine::Gpt4,
            // Custom engines need a 'static name; the config lives as long as the process.
            other => ChatGPTEngine::Custom(Box::leak(other.to_string().into_boxed_str())),
        }
    }
}

fn parse_timeout(raw: &str) -> Result<u64, ConfigError> {
    let secs: u64 = raw.trim().parse().map_err(|e| ConfigError::Invalid {
        name: "QUIZ_REQUEST_TIMEOUT_SECS",
        reason: format!("{}", e),
    })?;
    if secs == 0 {
        return Err(ConfigError::Invalid {
            name: "QUIZ_REQUEST_TIMEOUT_SECS",
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(secs)
}

fn parse_switch(name: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Ok(true),
        "0" | "false" | "off" | "no" => Ok(false),
        other => Err(ConfigError::Invalid {
            name,
            reason: format!("expected a boolean, got {:?}", other),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| vars.get(name).cloned()
    }

    #[test]
    fn defaults_apply_when_only_the_key_is_set() {
        let config = Config::from_lookup(lookup_from(&[("CHATGPT_API_KEY", "sk-test")])).unwrap();
        assert_eq!(config.api_key, "sk-test");
        assert_eq!(config.text_model, DEFAULT_TEXT_MODEL);
        assert_eq!(config.image_model, DEFAULT_IMAGE_MODEL);
        assert_eq!(config.language, DEFAULT_LANGUAGE);
        assert_eq!(config.request_timeout, Duration::from_secs(DEFAULT_TIMEOUT_SECS));
        assert!(config.images_enabled);
        assert!(matches!(config.text_engine(), ChatGPTEngine::Gpt35Turbo));
    }

    #[test]
    fn missing_key_is_reported_by_name() {
        let err = Config::from_lookup(lookup_from(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("CHATGPT_API_KEY")));

        let err = Config::from_lookup(lookup_from(&[("CHATGPT_API_KEY", "  ")])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing(_)));
    }

    #[test]
    fn overrides_are_parsed() {
        let config = Config::from_lookup(lookup_from(&[
            ("CHATGPT_API_KEY", "sk-test"),
            ("QUIZ_TEXT_MODEL", "gpt-4"),
            ("QUIZ_LANGUAGE", "Japanese"),
            ("QUIZ_REQUEST_TIMEOUT_SECS", "15"),
            ("QUIZ_IMAGES", "off"),
        ]))
        .unwrap();
        assert_eq!(config.language, "Japanese");
        assert_eq!(config.request_timeout, Duration::from_secs(15));
        assert!(!config.images_enabled);
        assert!(matches!(config.text_engine(), ChatGPTEngine::Gpt4));
    }

    #[test]
    fn bad_values_are_rejected() {
        let err = Config::from_lookup(lookup_from(&[
            ("CHATGPT_API_KEY", "sk-test"),
            ("QUIZ_REQUEST_TIMEOUT_SECS", "0"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "QUIZ_REQUEST_TIMEOUT_SECS", .. }));

        let err = Config::from_lookup(lookup_from(&[
            ("CHATGPT_API_KEY", "sk-test"),
            ("QUIZ_IMAGES", "maybe"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "QUIZ_IMAGES", .. }));
    }
}
