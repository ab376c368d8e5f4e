use anyhow::{Context, Result};
use std::collections::HashMap;

/// Environment-driven configuration for LLM analyzer adapters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalyzerSettings {
    pub provider: String,
    pub api_key: String,
    pub endpoint: Option<String>,
    pub model: Option<String>,
    pub timeout_secs: Option<u64>,
    pub max_retries: u32,
}

impl AnalyzerSettings {
    const PROVIDER_ENV: &'static str = "ADCOMPLY_PROVIDER";
    const API_KEY_ENV: &'static str = "ADCOMPLY_API_KEY";
    const ENDPOINT_ENV: &'static str = "ADCOMPLY_ENDPOINT";
    const MODEL_ENV: &'static str = "ADCOMPLY_MODEL";
    const TIMEOUT_ENV: &'static str = "ADCOMPLY_TIMEOUT_SECS";
    const RETRIES_ENV: &'static str = "ADCOMPLY_MAX_RETRIES";

    /// Load settings from environment variables.
    ///
    /// * `ADCOMPLY_PROVIDER` — Provider identifier (default: `gemini`).
    /// * `ADCOMPLY_API_KEY`  — API key/token (required except for `noop`).
    /// * `ADCOMPLY_ENDPOINT` — Optional custom endpoint/base URL.
    pub fn from_env() -> Result<Self> {
        Self::from_map(std::env::vars().collect())
    }

    fn from_map(vars: HashMap<String, String>) -> Result<Self> {
        let provider = vars
            .get(Self::PROVIDER_ENV)
            .cloned()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| "gemini".to_string())
            .trim()
            .to_string();
        let api_key = match provider.to_lowercase().as_str() {
            "noop" => vars.get(Self::API_KEY_ENV).cloned().unwrap_or_default(),
            _ => vars
                .get(Self::API_KEY_ENV)
                .cloned()
                .filter(|v| !v.trim().is_empty())
                .with_context(|| {
                    format!(
                        "environment variable {} must be set when the LLM analyzer is enabled",
                        Self::API_KEY_ENV
                    )
                })?,
        };
        let endpoint = vars
            .get(Self::ENDPOINT_ENV)
            .cloned()
            .filter(|v| !v.trim().is_empty());
        let model = vars
            .get(Self::MODEL_ENV)
            .cloned()
            .filter(|v| !v.trim().is_empty());
        let timeout_secs = vars
            .get(Self::TIMEOUT_ENV)
            .and_then(|v| v.trim().parse::<u64>().ok());
        let max_retries = vars
            .get(Self::RETRIES_ENV)
            .and_then(|v| v.trim().parse::<u32>().ok())
            .unwrap_or(2);

        Ok(Self {
            provider,
            api_key,
            endpoint,
            model,
            timeout_secs,
            max_retries,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults_to_gemini_provider() {
        let settings =
            AnalyzerSettings::from_map(vars(&[("ADCOMPLY_API_KEY", "secret")])).unwrap();
        assert_eq!(settings.provider, "gemini");
        assert_eq!(settings.api_key, "secret");
        assert!(settings.endpoint.is_none());
        assert_eq!(settings.max_retries, 2);
    }

    #[test]
    fn errors_when_api_key_missing() {
        let err = AnalyzerSettings::from_map(vars(&[("ADCOMPLY_PROVIDER", "gemini")]))
            .expect_err("missing API key should error");
        assert!(err.to_string().contains("ADCOMPLY_API_KEY"));
    }

    #[test]
    fn noop_provider_allows_missing_key() {
        let settings =
            AnalyzerSettings::from_map(vars(&[("ADCOMPLY_PROVIDER", "noop")])).unwrap();
        assert_eq!(settings.provider, "noop");
        assert!(settings.api_key.is_empty());
    }

    #[test]
    fn parses_timeout_and_retries() {
        let settings = AnalyzerSettings::from_map(vars(&[
            ("ADCOMPLY_API_KEY", "secret"),
            ("ADCOMPLY_TIMEOUT_SECS", "45"),
            ("ADCOMPLY_MAX_RETRIES", "5"),
            ("ADCOMPLY_MODEL", "gemini-2.0-flash"),
        ]))
        .unwrap();
        assert_eq!(settings.timeout_secs, Some(45));
        assert_eq!(settings.max_retries, 5);
        assert_eq!(settings.model.as_deref(), Some("gemini-2.0-flash"));
    }
}
