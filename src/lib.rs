//! LangPert generation backend and prompt templates.
//!
//! - [`templates`]: named prompt blueprints for gene/drug kNN ranking.
//! - [`backend`]: loads a model through an [`model::InferenceEngine`] and
//!   turns a prompt (plus optional system prompt) into generated text.
//! - [`validate`]: pulls the ranked answer back out of the generated text.

pub mod backend;
pub mod cache;
pub mod config;
pub mod generation;
pub mod model;
pub mod templates;
pub mod util;
pub mod validate;

pub use backend::{BackendError, BackendOptions, GenerationBackend};
pub use generation::{GenerationConfig, GenerationOverrides};
pub use templates::{get_template, TemplateError, TemplateRegistry, TemplateVars};
