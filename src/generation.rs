//! Generation configuration and per-call overrides.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_MAX_NEW_TOKENS: usize = 5000;
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Decoding parameters used for a generation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Maximum number of tokens to generate
    #[serde(default = "default_max_new_tokens")]
    pub max_new_tokens: usize,

    /// Sampling temperature (0.0 = greedy)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Padding token id; unset until resolved from the tokenizer
    #[serde(default)]
    pub pad_token_id: Option<u32>,

    /// Nucleus sampling threshold (None = engine default)
    #[serde(default)]
    pub top_p: Option<f32>,

    /// Sampling seed (None = engine default)
    #[serde(default)]
    pub seed: Option<u32>,
}

fn default_max_new_tokens() -> usize {
    DEFAULT_MAX_NEW_TOKENS
}

fn default_temperature() -> f32 {
    DEFAULT_TEMPERATURE
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_new_tokens: default_max_new_tokens(),
            temperature: default_temperature(),
            pad_token_id: None,
            top_p: None,
            seed: None,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum InvalidConfig {
    #[error("max_new_tokens must be positive")]
    ZeroMaxNewTokens,
    #[error("temperature must be a finite, non-negative number (got {0})")]
    Temperature(f32),
    #[error("top_p must be in (0, 1] (got {0})")]
    TopP(f32),
}

impl GenerationConfig {
    /// Effective configuration for one call: `overrides` win key by key,
    /// unset keys keep the value from `self`. `self` is left untouched.
    pub fn merged(&self, overrides: &GenerationOverrides) -> GenerationConfig {
        GenerationConfig {
            max_new_tokens: overrides.max_new_tokens.unwrap_or(self.max_new_tokens),
            temperature: overrides.temperature.unwrap_or(self.temperature),
            pad_token_id: overrides.pad_token_id.or(self.pad_token_id),
            top_p: overrides.top_p.or(self.top_p),
            seed: overrides.seed.or(self.seed),
        }
    }

    pub fn validate(&self) -> Result<(), InvalidConfig> {
        if self.max_new_tokens == 0 {
            return Err(InvalidConfig::ZeroMaxNewTokens);
        }
        if !self.temperature.is_finite() || self.temperature < 0.0 {
            return Err(InvalidConfig::Temperature(self.temperature));
        }
        if let Some(p) = self.top_p {
            if !(p > 0.0 && p <= 1.0) {
                return Err(InvalidConfig::TopP(p));
            }
        }
        Ok(())
    }

    /// Greedy decoding is used when temperature is zero.
    pub fn is_greedy(&self) -> bool {
        self.temperature == 0.0
    }
}

/// Caller-supplied partial configuration merged over the defaults.
///
/// Deserializing rejects unknown option names.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GenerationOverrides {
    pub max_new_tokens: Option<usize>,
    pub temperature: Option<f32>,
    pub pad_token_id: Option<u32>,
    pub top_p: Option<f32>,
    pub seed: Option<u32>,
}

impl GenerationOverrides {
    pub fn temperature(mut self, t: f32) -> Self {
        self.temperature = Some(t);
        self
    }

    pub fn max_new_tokens(mut self, n: usize) -> Self {
        self.max_new_tokens = Some(n);
        self
    }

    pub fn top_p(mut self, p: f32) -> Self {
        self.top_p = Some(p);
        self
    }

    pub fn seed(mut self, seed: u32) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.max_new_tokens.is_none()
            && self.temperature.is_none()
            && self.pad_token_id.is_none()
            && self.top_p.is_none()
            && self.seed.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_backend_defaults() {
        let cfg = GenerationConfig::default();
        assert_eq!(cfg.max_new_tokens, 5000);
        assert_eq!(cfg.temperature, 0.7);
        assert_eq!(cfg.pad_token_id, None);
    }

    #[test]
    fn merge_replaces_only_supplied_keys() {
        let defaults = GenerationConfig {
            pad_token_id: Some(2),
            ..Default::default()
        };
        let merged = defaults.merged(&GenerationOverrides::default().temperature(0.2));
        assert_eq!(merged.max_new_tokens, 5000);
        assert_eq!(merged.temperature, 0.2);
        assert_eq!(merged.pad_token_id, Some(2));
        // defaults untouched
        assert_eq!(defaults.temperature, 0.7);
    }

    #[test]
    fn empty_overrides_are_identity() {
        let defaults = GenerationConfig::default();
        assert!(GenerationOverrides::default().is_empty());
        assert_eq!(defaults.merged(&GenerationOverrides::default()), defaults);
    }

    #[test]
    fn overrides_from_json_mapping() {
        let o: GenerationOverrides =
            serde_json::from_str(r#"{"temperature": 0.1, "max_new_tokens": 64}"#).unwrap();
        assert_eq!(o.temperature, Some(0.1));
        assert_eq!(o.max_new_tokens, Some(64));
        assert!(o.pad_token_id.is_none());
    }

    #[test]
    fn overrides_reject_unknown_option() {
        let res = serde_json::from_str::<GenerationOverrides>(r#"{"do_sample": true}"#);
        assert!(res.is_err());
    }

    #[test]
    fn config_from_partial_json_fills_defaults() {
        let cfg: GenerationConfig = serde_json::from_str(r#"{"temperature": 0.0}"#).unwrap();
        assert_eq!(cfg.max_new_tokens, 5000);
        assert!(cfg.is_greedy());
    }

    #[test]
    fn validate_rejects_bad_values() {
        let base = GenerationConfig::default();
        assert_eq!(
            base.merged(&GenerationOverrides::default().max_new_tokens(0)).validate(),
            Err(InvalidConfig::ZeroMaxNewTokens)
        );
        assert!(base
            .merged(&GenerationOverrides::default().temperature(-1.0))
            .validate()
            .is_err());
        assert!(base
            .merged(&GenerationOverrides::default().temperature(f32::NAN))
            .validate()
            .is_err());
        assert!(base
            .merged(&GenerationOverrides::default().top_p(1.5))
            .validate()
            .is_err());
        assert!(base.validate().is_ok());
    }
}
