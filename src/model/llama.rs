//! llama.cpp engine (`llama-cpp-2`) for GGUF models.
//!
//! Model identifiers are either a local `.gguf` path or `owner/repo:file.gguf`,
//! downloaded through `hf-hub` into the cache directory. The tokenizer and chat
//! template are the ones embedded in the GGUF.

use std::{
    num::NonZeroU32,
    path::{Path, PathBuf},
};

use hf_hub::api::sync::ApiBuilder;
use llama_cpp_2::context::params::LlamaContextParams;
use llama_cpp_2::llama_backend::LlamaBackend;
use llama_cpp_2::llama_batch::LlamaBatch;
use llama_cpp_2::model::params::LlamaModelParams;
use llama_cpp_2::model::{AddBos, LlamaChatMessage, LlamaChatTemplate, LlamaModel, Special};
use llama_cpp_2::sampling::LlamaSampler;
use llama_cpp_2::token::LlamaToken;
use llama_cpp_2::{send_logs_to_tracing, DecodeError, LogOptions};
use once_cell::sync::OnceCell;
use tracing::{debug, info};

use super::{
    CausalModel, ChatMessage, ChatTokenizer, DeviceMap, EngineError, InferenceEngine,
    SpecialToken,
};
use crate::generation::GenerationConfig;

/// llama.cpp picks a random seed for this value.
const RANDOM_SEED: u32 = u32::MAX;
const FALLBACK_TEMPLATE: &str = "chatml";
/// More layers than any supported model has; llama.cpp clamps it.
const ALL_LAYERS: u32 = 999;

/// llama_backend_init() is process-global; it is initialized once and never freed.
static LLAMA_BACKEND: OnceCell<LlamaBackend> = OnceCell::new();

fn backend() -> Result<&'static LlamaBackend, EngineError> {
    LLAMA_BACKEND.get_or_try_init(|| {
        // route llama.cpp logs to tracing so they show up under RUST_LOG
        send_logs_to_tracing(LogOptions::default());
        LlamaBackend::init().map_err(|e| EngineError::load("llama.cpp backend", e))
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelRef {
    Local(PathBuf),
    Hub { repo: String, file: String },
}

impl ModelRef {
    pub fn parse(name: &str) -> Result<Self, EngineError> {
        let path = Path::new(name);
        if path.is_file() {
            return Ok(ModelRef::Local(path.to_path_buf()));
        }
        match name.split_once(':') {
            Some((repo, file)) if repo.contains('/') && file.ends_with(".gguf") => {
                Ok(ModelRef::Hub {
                    repo: repo.to_string(),
                    file: file.to_string(),
                })
            }
            _ => Err(EngineError::load(
                name,
                "expected a local .gguf path or `owner/repo:file.gguf`",
            )),
        }
    }

    fn fetch(&self, cache_dir: &Path) -> Result<PathBuf, EngineError> {
        match self {
            ModelRef::Local(path) => Ok(path.clone()),
            ModelRef::Hub { repo, file } => {
                let api = ApiBuilder::new()
                    .with_progress(false)
                    .with_token(std::env::var("HF_TOKEN").ok())
                    .with_cache_dir(cache_dir.to_path_buf())
                    .build()
                    .map_err(|e| EngineError::load(repo.as_str(), e))?;
                info!(%repo, %file, "fetching model file");
                api.model(repo.clone())
                    .get(file)
                    .map_err(|e| EngineError::load(format!("{repo}:{file}"), e))
            }
        }
    }
}

fn load_gguf(name: &str, cache_dir: &Path, gpu_layers: u32) -> Result<LlamaModel, EngineError> {
    let path = ModelRef::parse(name)?.fetch(cache_dir)?;
    let params = LlamaModelParams::default().with_n_gpu_layers(gpu_layers);
    LlamaModel::load_from_file(backend()?, &path, &params)
        .map_err(|e| EngineError::load(path.display().to_string(), e))
}

fn token_text(model: &LlamaModel, token: LlamaToken) -> Result<String, EngineError> {
    let bytes = model
        .token_to_bytes(token, Special::Tokenize)
        .map_err(|e| EngineError::Decode(e.to_string()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn saturating_u32(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

/// Context size for a prompt plus its generation budget, capped by the
/// model's training context.
fn context_size(prompt_len: usize, max_new_tokens: usize, n_ctx_train: u32) -> u32 {
    saturating_u32(prompt_len.saturating_add(max_new_tokens)).min(n_ctx_train)
}

fn decode_error(e: DecodeError) -> EngineError {
    match e {
        DecodeError::NoKvCacheSlot => EngineError::OutOfMemory(e.to_string()),
        other => EngineError::InvalidInput(other.to_string()),
    }
}

/// Tokenized chat prompt.
#[derive(Debug, Clone)]
pub struct LlamaInput {
    tokens: Vec<LlamaToken>,
}

impl LlamaInput {
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

/// Vocabulary view of a GGUF, loaded CPU-only.
pub struct LlamaTokenizer {
    model: LlamaModel,
    template: LlamaChatTemplate,
    eos: SpecialToken,
    pad: Option<SpecialToken>,
}

impl ChatTokenizer for LlamaTokenizer {
    type Input = LlamaInput;

    fn pad_token(&self) -> Option<&SpecialToken> {
        self.pad.as_ref()
    }

    fn eos_token(&self) -> Option<&SpecialToken> {
        Some(&self.eos)
    }

    fn set_pad_token(&mut self, token: SpecialToken) {
        self.pad = Some(token);
    }

    fn apply_chat_template(
        &self,
        messages: &[ChatMessage],
        add_generation_prompt: bool,
    ) -> Result<LlamaInput, EngineError> {
        let chat = messages
            .iter()
            .map(|m| LlamaChatMessage::new(m.role.as_str().to_string(), m.content.clone()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| EngineError::InvalidInput(e.to_string()))?;
        let text = self
            .model
            .apply_chat_template(&self.template, &chat, add_generation_prompt)
            .map_err(|e| EngineError::Template(e.to_string()))?;
        let tokens = self
            .model
            .str_to_token(&text, AddBos::Never)
            .map_err(|e| EngineError::InvalidInput(format!("tokenize prompt: {e}")))?;
        Ok(LlamaInput { tokens })
    }

    fn decode(&self, tokens: &[u32]) -> Result<String, EngineError> {
        let mut decoder = encoding_rs::UTF_8.new_decoder();
        let mut out = String::new();
        for &id in tokens {
            let token = LlamaToken::new(id as i32);
            let bytes = self
                .model
                .token_to_bytes(token, Special::Tokenize)
                .map_err(|e| EngineError::Decode(format!("token {id}: {e}")))?;
            out.reserve(
                decoder
                    .max_utf8_buffer_length(bytes.len())
                    .unwrap_or(bytes.len() * 3),
            );
            let _ = decoder.decode_to_string(&bytes, &mut out, false);
        }
        out.reserve(decoder.max_utf8_buffer_length(0).unwrap_or(4));
        let _ = decoder.decode_to_string(&[], &mut out, true);
        Ok(out)
    }
}

pub struct LlamaCausalModel {
    model: LlamaModel,
    n_ctx: Option<u32>,
}

impl CausalModel for LlamaCausalModel {
    type Input = LlamaInput;

    /// Padding is meaningless for a single llama.cpp sequence, so
    /// `pad_token_id` is not used here.
    fn generate(
        &self,
        input: &LlamaInput,
        config: &GenerationConfig,
    ) -> Result<Vec<u32>, EngineError> {
        if input.is_empty() {
            return Err(EngineError::InvalidInput("empty prompt".into()));
        }
        let backend = backend()?;
        let prompt_len = input.len();
        let n_ctx = self.n_ctx.unwrap_or_else(|| {
            context_size(prompt_len, config.max_new_tokens, self.model.n_ctx_train())
        });
        if saturating_u32(prompt_len) >= n_ctx {
            return Err(EngineError::InvalidInput(format!(
                "prompt of {prompt_len} tokens does not fit a {n_ctx}-token context"
            )));
        }

        let threads = num_cpus::get() as i32;
        let ctx_params = LlamaContextParams::default()
            .with_n_ctx(NonZeroU32::new(n_ctx))
            .with_n_batch(n_ctx)
            .with_n_threads(threads)
            .with_n_threads_batch(threads);
        let mut ctx = self
            .model
            .new_context(backend, ctx_params)
            .map_err(|e| EngineError::OutOfMemory(format!("create llama context: {e}")))?;

        let mut batch = LlamaBatch::new(prompt_len.max(512), 1);
        let last_index = prompt_len as i32 - 1;
        for (i, token) in (0_i32..).zip(input.tokens.iter().copied()) {
            batch
                .add(token, i, &[0], i == last_index)
                .map_err(|e| EngineError::InvalidInput(e.to_string()))?;
        }
        ctx.decode(&mut batch).map_err(decode_error)?;

        let mut sampler = if config.is_greedy() {
            LlamaSampler::greedy()
        } else {
            let mut chain = vec![LlamaSampler::temp(config.temperature)];
            if let Some(p) = config.top_p {
                chain.push(LlamaSampler::top_p(p, 1));
            }
            chain.push(LlamaSampler::dist(config.seed.unwrap_or(RANDOM_SEED)));
            LlamaSampler::chain_simple(chain)
        };

        let max_new = config
            .max_new_tokens
            .min((n_ctx as usize).saturating_sub(prompt_len));
        let mut out: Vec<u32> = input.tokens.iter().map(|t| t.0 as u32).collect();
        let mut n_cur = batch.n_tokens();

        for _ in 0..max_new {
            let token = sampler.sample(&ctx, batch.n_tokens() - 1);
            sampler.accept(token);
            out.push(token.0 as u32);
            if self.model.is_eog_token(token) {
                break;
            }

            batch.clear();
            batch
                .add(token, n_cur, &[0], true)
                .map_err(|e| EngineError::InvalidInput(e.to_string()))?;
            n_cur += 1;
            ctx.decode(&mut batch).map_err(decode_error)?;
        }

        debug!(
            prompt_tokens = prompt_len,
            new_tokens = out.len() - prompt_len,
            "llama generation done"
        );
        Ok(out)
    }
}

/// Engine handle. `n_ctx` pins the context size; by default it is sized to
/// prompt + `max_new_tokens`, capped by the model's training context.
#[derive(Debug, Clone, Default)]
pub struct LlamaEngine {
    pub n_ctx: Option<u32>,
}

impl LlamaEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_n_ctx(n_ctx: u32) -> Self {
        Self { n_ctx: Some(n_ctx) }
    }
}

impl InferenceEngine for LlamaEngine {
    type Tokenizer = LlamaTokenizer;
    type Model = LlamaCausalModel;

    fn load_tokenizer(
        &self,
        model_name: &str,
        cache_dir: &Path,
    ) -> Result<LlamaTokenizer, EngineError> {
        let model = load_gguf(model_name, cache_dir, 0)?;
        let template = match model.chat_template(None) {
            Ok(t) => t,
            Err(e) => {
                debug!(error = %e, "no embedded chat template, using {FALLBACK_TEMPLATE}");
                LlamaChatTemplate::new(FALLBACK_TEMPLATE)
                    .map_err(|e| EngineError::Template(e.to_string()))?
            }
        };
        let eos_token = model.token_eos();
        let eos = SpecialToken::new(eos_token.0 as u32, token_text(&model, eos_token)?);
        Ok(LlamaTokenizer {
            model,
            template,
            eos,
            pad: None,
        })
    }

    fn load_model(
        &self,
        model_name: &str,
        device_map: DeviceMap,
        cache_dir: &Path,
    ) -> Result<LlamaCausalModel, EngineError> {
        let gpu_layers = device_map.gpu_layers().unwrap_or(ALL_LAYERS);
        let model = load_gguf(model_name, cache_dir, gpu_layers)?;
        Ok(LlamaCausalModel {
            model,
            n_ctx: self.n_ctx,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hub_reference_parses() {
        assert_eq!(
            ModelRef::parse("unsloth/gpt-oss-20b-GGUF:gpt-oss-20b-Q4_K_M.gguf").unwrap(),
            ModelRef::Hub {
                repo: "unsloth/gpt-oss-20b-GGUF".into(),
                file: "gpt-oss-20b-Q4_K_M.gguf".into(),
            }
        );
    }

    #[test]
    fn context_size_saturates_instead_of_wrapping() {
        assert_eq!(context_size(100, 412, 4096), 512);
        assert_eq!(context_size(100, 5000, 4096), 4096);
        // 2^32 + 10 must not wrap around to a 110-token context
        assert_eq!(context_size(100, (1usize << 32) + 10, u32::MAX), u32::MAX);
        assert_eq!(context_size(100, usize::MAX, 8192), 8192);
        assert_eq!(saturating_u32(usize::MAX), u32::MAX);
    }

    #[test]
    fn bare_repo_id_is_rejected() {
        assert!(matches!(
            ModelRef::parse("openai/gpt-oss-120b"),
            Err(EngineError::Load { .. })
        ));
    }
}
