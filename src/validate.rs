//! Parsing of the model's kNN answer out of raw decoded output.

use jsonschema::{Draft, JSONSchema};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use thiserror::Error;

const KNN_SCHEMA: &str = include_str!("../schema/knn_response.schema.json");

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResponseError {
    #[error("invalid schema: {0}")]
    Compile(String),
    #[error("no JSON object found in model output")]
    NoJson,
    #[error("prompt is not echoed in model output")]
    PromptNotEchoed,
    #[error("schema error at {path}: {message}")]
    Schema { path: String, message: String },
}

/// The ranked answer the prompt templates ask for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnnResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(rename = "kNN")]
    pub knn: Vec<String>,
}

impl KnnResponse {
    /// Trim names and drop blanks and repeats, keeping rank order.
    fn normalize(mut self) -> Self {
        let mut seen = HashSet::new();
        self.knn = self
            .knn
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty() && seen.insert(s.clone()))
            .collect();
        self
    }
}

pub struct Validator {
    compiled: JSONSchema,
}

impl Validator {
    pub fn new(schema: &Value) -> Result<Self, ResponseError> {
        let compiled = JSONSchema::options()
            .with_draft(Draft::Draft202012)
            .compile(schema)
            .map_err(|e| ResponseError::Compile(e.to_string()))?;
        Ok(Self { compiled })
    }

    /// Validator for the `{"reasoning", "kNN"}` answer.
    pub fn knn_response() -> Result<Self, ResponseError> {
        let schema: Value =
            serde_json::from_str(KNN_SCHEMA).map_err(|e| ResponseError::Compile(e.to_string()))?;
        Self::new(&schema)
    }

    pub fn validate(&self, v: &Value) -> Result<(), ResponseError> {
        if let Err(mut errors) = self.compiled.validate(v) {
            if let Some(first) = errors.next() {
                return Err(ResponseError::Schema {
                    path: first.instance_path.to_string(),
                    message: first.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Find the answer object in `raw`, the decoded output of `prompt`.
    ///
    /// Only the text after the last echo of `prompt` is searched, so example
    /// objects inside the prompt are never mistaken for the answer. Within
    /// the completion, candidates are tried last to first and the first one
    /// that validates wins.
    pub fn parse_knn(&self, raw: &str, prompt: &str) -> Result<KnnResponse, ResponseError> {
        let completion = raw
            .rfind(prompt)
            .map(|at| &raw[at + prompt.len()..])
            .ok_or(ResponseError::PromptNotEchoed)?;
        self.parse_completion(completion)
    }

    /// Like [`Validator::parse_knn`], for text that holds only the model's
    /// completion.
    pub fn parse_completion(&self, completion: &str) -> Result<KnnResponse, ResponseError> {
        let mut last_err = ResponseError::NoJson;
        for candidate in json_objects(completion).into_iter().rev() {
            let Ok(v) = serde_json::from_str::<Value>(candidate) else {
                continue;
            };
            if let Err(e) = self.validate(&v) {
                last_err = e;
                continue;
            }
            match serde_json::from_value::<KnnResponse>(v) {
                Ok(resp) => return Ok(resp.normalize()),
                Err(e) => {
                    last_err = ResponseError::Schema {
                        path: String::new(),
                        message: e.to_string(),
                    }
                }
            }
        }
        Err(last_err)
    }
}

/// Balanced top-level `{...}` spans in `s`, in order of appearance. Braces
/// inside JSON strings are ignored.
pub fn json_objects(s: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut depth = 0usize;
    let mut start = None;
    let mut in_string = false;
    let mut escaped = false;

    for (i, ch) in s.char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' if depth > 0 => in_string = true,
            '{' => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    if let Some(st) = start.take() {
                        out.push(&s[st..=i]);
                    }
                }
            }
            _ => {}
        }
    }
    out
}
