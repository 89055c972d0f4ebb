//! Capability set of the external inference engine.
//!
//! The backend never touches weights, tensors or vocabularies directly. It
//! talks to an [`InferenceEngine`] that can hand out a [`ChatTokenizer`] and a
//! [`CausalModel`] for a model identifier, which keeps the framework swappable
//! (llama.cpp in production, [`mock::MockEngine`] in tests).

use std::{fmt, path::Path, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::generation::GenerationConfig;

pub mod mock;

#[cfg(feature = "llama")]
pub mod llama;

/// Failure kinds reported by the inference engine.
///
/// The backend forwards these unchanged, so callers can match on the kind
/// (e.g. retry elsewhere on [`EngineError::OutOfMemory`]).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("failed to load `{target}`: {reason}")]
    Load { target: String, reason: String },
    #[error("out of memory: {0}")]
    OutOfMemory(String),
    #[error("invalid model input: {0}")]
    InvalidInput(String),
    #[error("chat template error: {0}")]
    Template(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("io error: {0}")]
    Io(String),
    #[error("{0}")]
    Other(String),
}

impl EngineError {
    pub fn load(target: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::Load {
            target: target.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<std::io::Error> for EngineError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One role-tagged message handed to the engine's chat formatting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// A special token as the tokenizer knows it: surface text plus id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecialToken {
    pub id: u32,
    pub text: String,
}

impl SpecialToken {
    pub fn new(id: u32, text: impl Into<String>) -> Self {
        Self {
            id,
            text: text.into(),
        }
    }
}

/// Where the model weights should be placed.
///
/// Text syntax: `auto`, `cpu`, `gpu`, or `gpu:<layers>` for partial offload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceMap {
    #[default]
    Auto,
    Cpu,
    Gpu { layers: Option<u32> },
}

impl DeviceMap {
    /// Number of transformer layers to offload; `None` means "all of them".
    pub fn gpu_layers(&self) -> Option<u32> {
        match self {
            DeviceMap::Auto | DeviceMap::Gpu { layers: None } => None,
            DeviceMap::Cpu => Some(0),
            DeviceMap::Gpu { layers: Some(n) } => Some(*n),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid device map `{0}` (expected auto, cpu, gpu or gpu:<layers>)")]
pub struct ParseDeviceMapError(String);

impl FromStr for DeviceMap {
    type Err = ParseDeviceMapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        match lower.as_str() {
            "auto" => Ok(DeviceMap::Auto),
            "cpu" => Ok(DeviceMap::Cpu),
            "gpu" | "cuda" => Ok(DeviceMap::Gpu { layers: None }),
            other => {
                let layers = other
                    .strip_prefix("gpu:")
                    .or_else(|| other.strip_prefix("cuda:"))
                    .and_then(|n| n.parse::<u32>().ok())
                    .ok_or_else(|| ParseDeviceMapError(s.to_string()))?;
                Ok(DeviceMap::Gpu {
                    layers: Some(layers),
                })
            }
        }
    }
}

impl fmt::Display for DeviceMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceMap::Auto => f.write_str("auto"),
            DeviceMap::Cpu => f.write_str("cpu"),
            DeviceMap::Gpu { layers: None } => f.write_str("gpu"),
            DeviceMap::Gpu { layers: Some(n) } => write!(f, "gpu:{n}"),
        }
    }
}

/// Tokenizer side of the engine: special tokens, chat formatting and decoding.
pub trait ChatTokenizer {
    /// Model-ready input produced by chat formatting (opaque to the backend).
    type Input;

    fn pad_token(&self) -> Option<&SpecialToken>;

    fn eos_token(&self) -> Option<&SpecialToken>;

    fn set_pad_token(&mut self, token: SpecialToken);

    /// Arrange role-tagged messages into the layout the model expects.
    fn apply_chat_template(
        &self,
        messages: &[ChatMessage],
        add_generation_prompt: bool,
    ) -> Result<Self::Input, EngineError>;

    /// Decode a token sequence back to text, keeping special tokens.
    fn decode(&self, tokens: &[u32]) -> Result<String, EngineError>;
}

/// Generation side of the engine.
pub trait CausalModel {
    type Input;

    /// Run generation. Returns the full sequence: prompt tokens followed by
    /// the newly generated ones.
    fn generate(&self, input: &Self::Input, config: &GenerationConfig)
        -> Result<Vec<u32>, EngineError>;
}

/// Acquires tokenizers and models by identifier.
pub trait InferenceEngine {
    type Tokenizer: ChatTokenizer;
    type Model: CausalModel<Input = <Self::Tokenizer as ChatTokenizer>::Input>;

    fn load_tokenizer(&self, model_name: &str, cache_dir: &Path)
        -> Result<Self::Tokenizer, EngineError>;

    fn load_model(
        &self,
        model_name: &str,
        device_map: DeviceMap,
        cache_dir: &Path,
    ) -> Result<Self::Model, EngineError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_map_parses_known_forms() {
        assert_eq!("auto".parse::<DeviceMap>().unwrap(), DeviceMap::Auto);
        assert_eq!("CPU".parse::<DeviceMap>().unwrap(), DeviceMap::Cpu);
        assert_eq!(
            "cuda".parse::<DeviceMap>().unwrap(),
            DeviceMap::Gpu { layers: None }
        );
        assert_eq!(
            "gpu:20".parse::<DeviceMap>().unwrap(),
            DeviceMap::Gpu { layers: Some(20) }
        );
    }

    #[test]
    fn device_map_rejects_garbage() {
        assert!("tpu".parse::<DeviceMap>().is_err());
        assert!("gpu:".parse::<DeviceMap>().is_err());
        assert!("gpu:-1".parse::<DeviceMap>().is_err());
    }

    #[test]
    fn device_map_display_round_trips() {
        for s in ["auto", "cpu", "gpu", "gpu:12"] {
            assert_eq!(s.parse::<DeviceMap>().unwrap().to_string(), s);
        }
    }

    #[test]
    fn gpu_layers_mapping() {
        assert_eq!(DeviceMap::Auto.gpu_layers(), None);
        assert_eq!(DeviceMap::Cpu.gpu_layers(), Some(0));
        assert_eq!(DeviceMap::Gpu { layers: Some(8) }.gpu_layers(), Some(8));
    }
}
