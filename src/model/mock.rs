//! In-process scripted engine.
//!
//! Tokens are Unicode scalar values, special tokens live above `char::MAX`.
//! Every chat-formatting call, effective generation config and load request is
//! recorded so callers can assert on exactly what reached the engine.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use parking_lot::Mutex;

use super::{
    CausalModel, ChatMessage, ChatTokenizer, DeviceMap, EngineError, InferenceEngine,
    SpecialToken,
};
use crate::generation::GenerationConfig;

pub const EOS_ID: u32 = 0x11_0000;
pub const EOS_TEXT: &str = "<|return|>";
const START_ID: u32 = EOS_ID + 1;
const MESSAGE_ID: u32 = EOS_ID + 2;
const END_ID: u32 = EOS_ID + 3;

#[derive(Debug, Clone, PartialEq)]
pub struct LoadRequest {
    pub model_name: String,
    pub device_map: Option<DeviceMap>,
    pub cache_dir: PathBuf,
}

#[derive(Debug, Default)]
struct Recorder {
    loads: Vec<LoadRequest>,
    chats: Vec<Vec<ChatMessage>>,
    configs: Vec<GenerationConfig>,
}

#[derive(Debug, Clone)]
struct Script {
    completion: String,
    pad_token: Option<SpecialToken>,
    eos_token: Option<SpecialToken>,
    tokenizer_error: Option<EngineError>,
    model_error: Option<EngineError>,
    generate_error: Option<EngineError>,
    template_error: Option<EngineError>,
    decode_error: Option<EngineError>,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            completion: String::new(),
            pad_token: None,
            eos_token: Some(SpecialToken::new(EOS_ID, EOS_TEXT)),
            tokenizer_error: None,
            model_error: None,
            generate_error: None,
            template_error: None,
            decode_error: None,
        }
    }
}

/// Scripted engine. Clones share the same call log.
#[derive(Debug, Clone, Default)]
pub struct MockEngine {
    script: Script,
    recorder: Arc<Mutex<Recorder>>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Text the model "generates" after the prompt (EOS is appended).
    pub fn with_completion(mut self, text: impl Into<String>) -> Self {
        self.script.completion = text.into();
        self
    }

    pub fn with_pad_token(mut self, token: SpecialToken) -> Self {
        self.script.pad_token = Some(token);
        self
    }

    pub fn without_eos_token(mut self) -> Self {
        self.script.eos_token = None;
        self
    }

    pub fn failing_tokenizer_load(mut self, err: EngineError) -> Self {
        self.script.tokenizer_error = Some(err);
        self
    }

    pub fn failing_model_load(mut self, err: EngineError) -> Self {
        self.script.model_error = Some(err);
        self
    }

    pub fn failing_generation(mut self, err: EngineError) -> Self {
        self.script.generate_error = Some(err);
        self
    }

    pub fn failing_chat_template(mut self, err: EngineError) -> Self {
        self.script.template_error = Some(err);
        self
    }

    pub fn failing_decode(mut self, err: EngineError) -> Self {
        self.script.decode_error = Some(err);
        self
    }

    pub fn loads(&self) -> Vec<LoadRequest> {
        self.recorder.lock().loads.clone()
    }

    /// Message lists passed to chat formatting, one entry per call.
    pub fn chats(&self) -> Vec<Vec<ChatMessage>> {
        self.recorder.lock().chats.clone()
    }

    /// Effective generation configs passed to the model, one entry per call.
    pub fn configs(&self) -> Vec<GenerationConfig> {
        self.recorder.lock().configs.clone()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockInput {
    pub tokens: Vec<u32>,
}

#[derive(Debug)]
pub struct MockTokenizer {
    pad: Option<SpecialToken>,
    eos: Option<SpecialToken>,
    template_error: Option<EngineError>,
    decode_error: Option<EngineError>,
    recorder: Arc<Mutex<Recorder>>,
}

impl MockTokenizer {
    fn special_text(&self, id: u32) -> Option<&str> {
        match id {
            START_ID => Some("<|start|>"),
            MESSAGE_ID => Some("<|message|>"),
            END_ID => Some("<|end|>"),
            _ => [self.eos.as_ref(), self.pad.as_ref()]
                .into_iter()
                .flatten()
                .find(|t| t.id == id)
                .map(|t| t.text.as_str()),
        }
    }
}

fn encode_text(out: &mut Vec<u32>, text: &str) {
    out.extend(text.chars().map(|c| c as u32));
}

impl ChatTokenizer for MockTokenizer {
    type Input = MockInput;

    fn pad_token(&self) -> Option<&SpecialToken> {
        self.pad.as_ref()
    }

    fn eos_token(&self) -> Option<&SpecialToken> {
        self.eos.as_ref()
    }

    fn set_pad_token(&mut self, token: SpecialToken) {
        self.pad = Some(token);
    }

    fn apply_chat_template(
        &self,
        messages: &[ChatMessage],
        add_generation_prompt: bool,
    ) -> Result<MockInput, EngineError> {
        if messages.is_empty() {
            return Err(EngineError::Template("no messages".into()));
        }
        self.recorder.lock().chats.push(messages.to_vec());
        if let Some(err) = &self.template_error {
            return Err(err.clone());
        }

        let mut tokens = Vec::new();
        for m in messages {
            tokens.push(START_ID);
            encode_text(&mut tokens, m.role.as_str());
            tokens.push(MESSAGE_ID);
            encode_text(&mut tokens, &m.content);
            tokens.push(END_ID);
        }
        if add_generation_prompt {
            tokens.push(START_ID);
            encode_text(&mut tokens, "assistant");
            tokens.push(MESSAGE_ID);
        }
        Ok(MockInput { tokens })
    }

    fn decode(&self, tokens: &[u32]) -> Result<String, EngineError> {
        if let Some(err) = &self.decode_error {
            return Err(err.clone());
        }
        let mut out = String::with_capacity(tokens.len());
        for &id in tokens {
            if let Some(special) = self.special_text(id) {
                out.push_str(special);
            } else {
                let c = char::from_u32(id)
                    .ok_or_else(|| EngineError::Decode(format!("unknown token id {id}")))?;
                out.push(c);
            }
        }
        Ok(out)
    }
}

#[derive(Debug)]
pub struct MockModel {
    completion: String,
    eos_id: u32,
    generate_error: Option<EngineError>,
    recorder: Arc<Mutex<Recorder>>,
}

impl CausalModel for MockModel {
    type Input = MockInput;

    fn generate(
        &self,
        input: &MockInput,
        config: &GenerationConfig,
    ) -> Result<Vec<u32>, EngineError> {
        self.recorder.lock().configs.push(config.clone());
        if let Some(err) = &self.generate_error {
            return Err(err.clone());
        }
        let mut out = input.tokens.clone();
        let generated: Vec<u32> = self
            .completion
            .chars()
            .map(|c| c as u32)
            .take(config.max_new_tokens)
            .collect();
        let truncated = generated.len() == config.max_new_tokens;
        out.extend(generated);
        if !truncated {
            out.push(self.eos_id);
        }
        Ok(out)
    }
}

impl InferenceEngine for MockEngine {
    type Tokenizer = MockTokenizer;
    type Model = MockModel;

    fn load_tokenizer(
        &self,
        model_name: &str,
        cache_dir: &Path,
    ) -> Result<MockTokenizer, EngineError> {
        self.recorder.lock().loads.push(LoadRequest {
            model_name: model_name.to_string(),
            device_map: None,
            cache_dir: cache_dir.to_path_buf(),
        });
        if let Some(err) = &self.script.tokenizer_error {
            return Err(err.clone());
        }
        Ok(MockTokenizer {
            pad: self.script.pad_token.clone(),
            eos: self.script.eos_token.clone(),
            template_error: self.script.template_error.clone(),
            decode_error: self.script.decode_error.clone(),
            recorder: self.recorder.clone(),
        })
    }

    fn load_model(
        &self,
        model_name: &str,
        device_map: DeviceMap,
        cache_dir: &Path,
    ) -> Result<MockModel, EngineError> {
        self.recorder.lock().loads.push(LoadRequest {
            model_name: model_name.to_string(),
            device_map: Some(device_map),
            cache_dir: cache_dir.to_path_buf(),
        });
        if let Some(err) = &self.script.model_error {
            return Err(err.clone());
        }
        Ok(MockModel {
            completion: self.script.completion.clone(),
            eos_id: self.script.eos_token.as_ref().map_or(EOS_ID, |t| t.id),
            generate_error: self.script.generate_error.clone(),
            recorder: self.recorder.clone(),
        })
    }
}
