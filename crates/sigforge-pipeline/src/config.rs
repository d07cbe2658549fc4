//! Pipeline configuration: model selection, timeframe enumeration, and which
//! optional stages and result members are active.

use std::path::Path;

use serde::{Deserialize, Serialize};

use sigforge_types::{Result, SignalError};

/// Timeframes a generated signal may use unless configured otherwise.
pub const DEFAULT_TIMEFRAMES: [&str; 9] = ["1m", "5m", "15m", "30m", "1H", "2H", "4H", "1D", "1W"];

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Which optional parts of the pipeline run and which artifacts the result exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineOptions {
    /// Run the summarization stage after validation.
    pub summarize: bool,
    /// Include the validation outcome in the result, not just `isValid`.
    pub expose_validation: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            summarize: true,
            expose_validation: true,
        }
    }
}

impl PipelineOptions {
    /// The bare internal-gate variant: only the signal and `isValid`.
    pub fn gate_only() -> Self {
        Self {
            summarize: false,
            expose_validation: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub model: String,
    pub provider: Option<String>,
    pub timeframes: Vec<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub options: PipelineOptions,
    pub webhook_url: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            provider: None,
            timeframes: DEFAULT_TIMEFRAMES.iter().map(|t| t.to_string()).collect(),
            temperature: None,
            max_tokens: None,
            options: PipelineOptions::default(),
            webhook_url: None,
        }
    }
}

impl PipelineConfig {
    /// Defaults overlaid with `SIGFORGE_*` and `DISCORD_WEBHOOK_URL` from the environment.
    pub fn from_env() -> Result<Self> {
        Self::default().merge_env(|key| std::env::var(key).ok())
    }

    /// Load a JSON config file, then overlay the environment.
    pub fn from_file(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&data)?;
        config.merge_env(|key| std::env::var(key).ok())
    }

    /// Overlay values produced by `lookup`; unset or blank keys leave the
    /// current value alone.
    pub fn merge_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(model) = get("SIGFORGE_MODEL") {
            self.model = model.trim().to_string();
        }
        if let Some(provider) = get("SIGFORGE_PROVIDER") {
            self.provider = Some(provider.trim().to_string());
        }
        if let Some(list) = get("SIGFORGE_TIMEFRAMES") {
            self.timeframes = list
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(raw) = get("SIGFORGE_TEMPERATURE") {
            let temp = raw.trim().parse::<f32>().map_err(|_| {
                SignalError::Config(format!("SIGFORGE_TEMPERATURE: '{raw}' is not a number"))
            })?;
            self.temperature = Some(temp);
        }
        if let Some(raw) = get("SIGFORGE_SUMMARIZE") {
            self.options.summarize = parse_flag("SIGFORGE_SUMMARIZE", &raw)?;
        }
        if let Some(raw) = get("SIGFORGE_EXPOSE_VALIDATION") {
            self.options.expose_validation = parse_flag("SIGFORGE_EXPOSE_VALIDATION", &raw)?;
        }
        if let Some(url) = get("DISCORD_WEBHOOK_URL") {
            self.webhook_url = Some(url.trim().to_string());
        }

        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.timeframes.is_empty() {
            return Err(SignalError::Config(
                "at least one timeframe must be configured".into(),
            ));
        }
        if let Some(blank) = self.timeframes.iter().find(|t| t.trim().is_empty()) {
            return Err(SignalError::Config(format!("blank timeframe '{blank}'")));
        }
        if let Some(temp) = self.temperature {
            if !(0.0..=2.0).contains(&temp) {
                return Err(SignalError::Config(format!(
                    "temperature {temp} is outside 0.0..=2.0"
                )));
            }
        }
        Ok(())
    }
}

fn parse_flag(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(SignalError::Config(format!(
            "{key}: '{other}' is not a boolean"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.timeframes.len(), 9);
        assert!(config.options.summarize);
        assert!(config.options.expose_validation);
        assert!(config.webhook_url.is_none());
        config.validate().unwrap();
    }

    #[test]
    fn merge_env_overrides_values() {
        let config = PipelineConfig::default()
            .merge_env(lookup(&[
                ("SIGFORGE_MODEL", "gpt-4o"),
                ("SIGFORGE_TIMEFRAMES", "1H, 4H ,,1D"),
                ("SIGFORGE_SUMMARIZE", "off"),
                ("SIGFORGE_TEMPERATURE", "0.3"),
                ("DISCORD_WEBHOOK_URL", "https://discord.test/hook"),
            ]))
            .unwrap();

        assert_eq!(config.model, "gpt-4o");
        assert_eq!(config.timeframes, vec!["1H", "4H", "1D"]);
        assert!(!config.options.summarize);
        assert!(config.options.expose_validation);
        assert_eq!(config.temperature, Some(0.3));
        assert_eq!(config.webhook_url.as_deref(), Some("https://discord.test/hook"));
    }

    #[test]
    fn blank_env_values_are_ignored() {
        let config = PipelineConfig::default()
            .merge_env(lookup(&[("DISCORD_WEBHOOK_URL", "  "), ("SIGFORGE_MODEL", "")]))
            .unwrap();
        assert!(config.webhook_url.is_none());
        assert_eq!(config.model, DEFAULT_MODEL);
    }

    #[test]
    fn bad_flag_is_config_error() {
        let err = PipelineConfig::default()
            .merge_env(lookup(&[("SIGFORGE_EXPOSE_VALIDATION", "maybe")]))
            .unwrap_err();
        assert!(matches!(err, SignalError::Config(_)));
        assert!(err.to_string().contains("not a boolean"));
    }

    #[test]
    fn validate_rejects_empty_timeframes() {
        let config = PipelineConfig {
            timeframes: vec![],
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_out_of_range_temperature() {
        let config = PipelineConfig {
            temperature: Some(3.5),
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn deserializes_partial_json() {
        let config: PipelineConfig = serde_json::from_str(
            r#"{ "model": "gemini-2.5-pro", "options": { "summarize": false } }"#,
        )
        .unwrap();
        assert_eq!(config.model, "gemini-2.5-pro");
        assert!(!config.options.summarize);
        assert!(config.options.expose_validation);
        assert_eq!(config.timeframes.len(), 9);
    }

    #[test]
    fn gate_only_variant() {
        let options = PipelineOptions::gate_only();
        assert!(!options.summarize);
        assert!(!options.expose_validation);
    }
}
