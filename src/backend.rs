//! Text-generation backend: owns one tokenizer/model pair and the default
//! generation configuration.

use std::{path::PathBuf, time::Instant};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    cache,
    generation::{GenerationConfig, GenerationOverrides, InvalidConfig},
    model::{CausalModel, ChatMessage, ChatTokenizer, DeviceMap, EngineError, InferenceEngine},
};

pub const DEFAULT_MODEL: &str = "openai/gpt-oss-120b";

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("failed to load model `{model}`")]
    ModelLoad {
        model: String,
        #[source]
        source: EngineError,
    },
    #[error("generation failed")]
    Generation(#[source] EngineError),
    #[error("prompt must not be empty")]
    EmptyPrompt,
    #[error("invalid generation config")]
    InvalidConfig(#[source] InvalidConfig),
}

impl BackendError {
    /// The engine failure behind this error, if any.
    pub fn engine_error(&self) -> Option<&EngineError> {
        match self {
            BackendError::ModelLoad { source, .. } => Some(source),
            BackendError::Generation(e) => Some(e),
            _ => None,
        }
    }
}

/// Constructor input for [`GenerationBackend`].
#[derive(Debug, Clone)]
pub struct BackendOptions {
    pub model_name: String,
    pub device_map: DeviceMap,
    /// `None` resolves to [`cache::safe_cache_dir`].
    pub cache_dir: Option<PathBuf>,
    /// Pad token id to use when the tokenizer already has a pad token.
    /// When set, it replaces `generation.pad_token_id`.
    pub pad_token_id: Option<u32>,
    /// Defaults for every generation call.
    pub generation: GenerationConfig,
}

impl Default for BackendOptions {
    fn default() -> Self {
        Self {
            model_name: DEFAULT_MODEL.to_string(),
            device_map: DeviceMap::Auto,
            cache_dir: None,
            pad_token_id: None,
            generation: GenerationConfig::default(),
        }
    }
}

impl BackendOptions {
    pub fn new(model_name: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
            ..Default::default()
        }
    }

    pub fn device_map(mut self, device_map: DeviceMap) -> Self {
        self.device_map = device_map;
        self
    }

    pub fn cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    pub fn pad_token_id(mut self, id: u32) -> Self {
        self.pad_token_id = Some(id);
        self
    }

    pub fn generation(mut self, generation: GenerationConfig) -> Self {
        self.generation = generation;
        self
    }
}

/// When the tokenizer has no pad token, reuse its EOS token as pad and
/// record the id in `config`. Calling this again is a no-op.
pub fn resolve_pad_token<T: ChatTokenizer>(tokenizer: &mut T, config: &mut GenerationConfig) {
    if tokenizer.pad_token().is_some() {
        return;
    }
    info!("pad token is not present");
    match tokenizer.eos_token().cloned() {
        Some(eos) => {
            config.pad_token_id = Some(eos.id);
            tokenizer.set_pad_token(eos);
        }
        None => warn!("tokenizer has no eos token either; pad_token_id left unset"),
    }
}

/// Combined text sent as the single user message.
pub fn compose_prompt(prompt: &str, system_prompt: Option<&str>) -> String {
    match system_prompt {
        Some(system) if !system.is_empty() => format!("{system}\n\n{prompt}"),
        _ => prompt.to_string(),
    }
}

/// A loaded model ready to generate. There is no way back to an unloaded
/// state; drop the backend to release the model.
///
/// Not internally synchronized: callers sharing one across threads must
/// serialize access themselves.
pub struct GenerationBackend<E: InferenceEngine> {
    model_name: String,
    device_map: DeviceMap,
    cache_dir: PathBuf,
    generation_config: GenerationConfig,
    tokenizer: E::Tokenizer,
    model: E::Model,
}

impl<E: InferenceEngine> GenerationBackend<E> {
    pub fn new(engine: &E, options: BackendOptions) -> Result<Self, BackendError> {
        let cache_dir = options.cache_dir.unwrap_or_else(cache::safe_cache_dir);
        let generation_config = GenerationConfig {
            pad_token_id: options.pad_token_id.or(options.generation.pad_token_id),
            ..options.generation
        };
        let (tokenizer, model, generation_config) = Self::load_model(
            engine,
            &options.model_name,
            options.device_map,
            &cache_dir,
            generation_config,
        )?;
        Ok(Self {
            model_name: options.model_name,
            device_map: options.device_map,
            cache_dir,
            generation_config,
            tokenizer,
            model,
        })
    }

    fn load_model(
        engine: &E,
        model_name: &str,
        device_map: DeviceMap,
        cache_dir: &std::path::Path,
        mut config: GenerationConfig,
    ) -> Result<(E::Tokenizer, E::Model, GenerationConfig), BackendError> {
        info!(model = model_name, %device_map, cache_dir = %cache_dir.display(), "loading model");
        let start = Instant::now();
        let load_err = |source| BackendError::ModelLoad {
            model: model_name.to_string(),
            source,
        };

        let mut tokenizer = engine.load_tokenizer(model_name, cache_dir).map_err(load_err)?;
        let model = engine
            .load_model(model_name, device_map, cache_dir)
            .map_err(load_err)?;
        resolve_pad_token(&mut tokenizer, &mut config);

        info!(model = model_name, elapsed = ?start.elapsed(), "model loaded");
        Ok((tokenizer, model, config))
    }

    /// Generate a completion for `prompt`, optionally prefixed by
    /// `system_prompt` and a blank line. The decoded output is returned as the
    /// engine produced it, special tokens included.
    pub fn generate_text(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        overrides: &GenerationOverrides,
    ) -> Result<String, BackendError> {
        if prompt.is_empty() {
            return Err(BackendError::EmptyPrompt);
        }
        let config = self.generation_config.merged(overrides);
        config.validate().map_err(BackendError::InvalidConfig)?;

        let messages = [ChatMessage::user(compose_prompt(prompt, system_prompt))];
        debug!(?config, prompt_chars = messages[0].content.len(), "generating");

        metrics::counter!("langpert_generations_total").increment(1);
        let start = Instant::now();
        let result = self.run(&messages, &config);
        metrics::histogram!("langpert_generation_seconds").record(start.elapsed().as_secs_f64());

        result.map_err(|e| {
            metrics::counter!("langpert_generation_errors_total").increment(1);
            warn!(error = %e, "generation failed");
            BackendError::Generation(e)
        })
    }

    fn run(&self, messages: &[ChatMessage], config: &GenerationConfig) -> Result<String, EngineError> {
        let inputs = self.tokenizer.apply_chat_template(messages, true)?;
        let outputs = self.model.generate(&inputs, config)?;
        self.tokenizer.decode(&outputs)
    }

    pub fn generation_config(&self) -> &GenerationConfig {
        &self.generation_config
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn device_map(&self) -> DeviceMap {
        self.device_map
    }

    pub fn cache_dir(&self) -> &std::path::Path {
        &self.cache_dir
    }

    pub fn tokenizer(&self) -> &E::Tokenizer {
        &self.tokenizer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{mock::MockEngine, SpecialToken};

    #[test]
    fn compose_prompt_inserts_one_blank_line() {
        assert_eq!(
            compose_prompt("Explain TP53", Some("You are a genomics expert")),
            "You are a genomics expert\n\nExplain TP53"
        );
        assert_eq!(compose_prompt("Explain TP53", None), "Explain TP53");
        assert_eq!(compose_prompt("Explain TP53", Some("")), "Explain TP53");
    }

    #[test]
    fn resolve_pad_token_is_idempotent() {
        let engine = MockEngine::new();
        let mut tok = engine
            .load_tokenizer("m", std::path::Path::new("/tmp"))
            .unwrap();
        let mut cfg = GenerationConfig::default();
        resolve_pad_token(&mut tok, &mut cfg);
        let first = cfg.pad_token_id;
        resolve_pad_token(&mut tok, &mut cfg);
        assert_eq!(first, Some(crate::model::mock::EOS_ID));
        assert_eq!(cfg.pad_token_id, first);
        assert_eq!(tok.pad_token().map(|t| t.id), first);
    }

    #[test]
    fn existing_pad_token_keeps_configured_id() {
        let engine = MockEngine::new().with_pad_token(SpecialToken::new(0, "<pad>"));
        let mut tok = engine
            .load_tokenizer("m", std::path::Path::new("/tmp"))
            .unwrap();
        let mut cfg = GenerationConfig::default();
        resolve_pad_token(&mut tok, &mut cfg);
        assert_eq!(cfg.pad_token_id, None);
    }

    #[test]
    fn missing_eos_leaves_pad_unset() {
        let engine = MockEngine::new().without_eos_token();
        let mut tok = engine
            .load_tokenizer("m", std::path::Path::new("/tmp"))
            .unwrap();
        let mut cfg = GenerationConfig::default();
        resolve_pad_token(&mut tok, &mut cfg);
        assert_eq!(cfg.pad_token_id, None);
        assert!(tok.pad_token().is_none());
    }
}
