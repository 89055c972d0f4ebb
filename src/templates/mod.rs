//! Prompt templates for gene/drug similarity ranking.
//!
//! Templates use `{name}` placeholders; `{{` and `}}` stand for literal
//! braces (the JSON examples inside the prompts rely on this).

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use thiserror::Error;

pub mod builtin;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("template `{0}` not found")]
    NotFound(String),
    #[error("template `{0}` is already registered")]
    Duplicate(String),
    #[error("no value supplied for placeholder `{0}`")]
    MissingPlaceholder(String),
    #[error("malformed template at byte {offset}: {reason}")]
    Malformed { offset: usize, reason: &'static str },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Placeholder(String),
}

/// An immutable template, parsed once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    text: String,
    segments: Vec<Segment>,
}

fn is_ident(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn parse(text: &str) -> Result<Vec<Segment>, TemplateError> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut iter = text.char_indices().peekable();

    while let Some((i, c)) = iter.next() {
        match c {
            '{' if matches!(iter.peek(), Some((_, '{'))) => {
                iter.next();
                literal.push('{');
            }
            '}' if matches!(iter.peek(), Some((_, '}'))) => {
                iter.next();
                literal.push('}');
            }
            '}' => {
                return Err(TemplateError::Malformed {
                    offset: i,
                    reason: "single '}' encountered",
                })
            }
            '{' => {
                let rest = &text[i + 1..];
                let end = rest.find('}').ok_or(TemplateError::Malformed {
                    offset: i,
                    reason: "unterminated placeholder",
                })?;
                let name = &rest[..end];
                if !is_ident(name) {
                    return Err(TemplateError::Malformed {
                        offset: i,
                        reason: "placeholder name must be an identifier",
                    });
                }
                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(Segment::Placeholder(name.to_string()));
                // skip name and closing brace
                for _ in 0..name.chars().count() + 1 {
                    iter.next();
                }
            }
            _ => literal.push(c),
        }
    }
    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    Ok(segments)
}

impl PromptTemplate {
    pub fn parse(text: impl Into<String>) -> Result<Self, TemplateError> {
        let text = text.into();
        let segments = parse(&text)?;
        Ok(Self { text, segments })
    }

    /// Raw template text, placeholders and escapes untouched.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Distinct placeholder names in order of first appearance.
    pub fn placeholders(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for seg in &self.segments {
            if let Segment::Placeholder(name) = seg {
                if !names.contains(&name.as_str()) {
                    names.push(name);
                }
            }
        }
        names
    }

    /// Substitute every placeholder. Extra variables are ignored; a missing
    /// one is an error.
    pub fn format(&self, vars: &TemplateVars) -> Result<String, TemplateError> {
        let mut out = String::with_capacity(self.text.len());
        for seg in &self.segments {
            match seg {
                Segment::Literal(s) => out.push_str(s),
                Segment::Placeholder(name) => {
                    let value = vars
                        .get(name)
                        .ok_or_else(|| TemplateError::MissingPlaceholder(name.clone()))?;
                    out.push_str(value);
                }
            }
        }
        Ok(out)
    }
}

/// Values for template placeholders.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateVars(BTreeMap<String, String>);

impl TemplateVars {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.insert(key, value);
        self
    }

    /// Join `items` with `", "`, the way gene and drug lists are rendered.
    pub fn with_list<I, S>(self, key: impl Into<String>, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let joined = items
            .into_iter()
            .map(|s| s.as_ref().to_string())
            .collect::<Vec<_>>()
            .join(", ");
        self.with(key, joined)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl ToString) {
        self.0.insert(key.into(), value.to_string());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }
}

impl<K: Into<String>, V: ToString> FromIterator<(K, V)> for TemplateVars {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut vars = Self::new();
        for (k, v) in iter {
            vars.insert(k, v);
        }
        vars
    }
}

/// Name → template lookup table. Built once, then only read.
#[derive(Debug, Clone, Default)]
pub struct TemplateRegistry {
    templates: BTreeMap<String, PromptTemplate>,
}

impl TemplateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in LangPert templates.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for (name, text) in builtin::BUILTIN {
            registry
                .register(*name, *text)
                .unwrap_or_else(|e| unreachable!("built-in template `{name}`: {e}"));
        }
        registry
    }

    /// Add a template under a new name. Existing names are never replaced.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        text: impl Into<String>,
    ) -> Result<(), TemplateError> {
        let name = name.into();
        if self.templates.contains_key(&name) {
            return Err(TemplateError::Duplicate(name));
        }
        let template = PromptTemplate::parse(text)?;
        self.templates.insert(name, template);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<&PromptTemplate, TemplateError> {
        self.templates
            .get(name)
            .ok_or_else(|| TemplateError::NotFound(name.to_string()))
    }

    /// Look up and format in one step.
    pub fn render(&self, name: &str, vars: &TemplateVars) -> Result<String, TemplateError> {
        self.get(name)?.format(vars)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.templates.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

static BUILTIN_REGISTRY: Lazy<TemplateRegistry> = Lazy::new(TemplateRegistry::builtin);

/// Built-in registry shared by the whole process.
pub fn builtin_registry() -> &'static TemplateRegistry {
    &BUILTIN_REGISTRY
}

/// Raw text of a built-in template.
pub fn get_template(name: &str) -> Result<&'static str, TemplateError> {
    builtin_registry().get(name).map(PromptTemplate::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXPECTED: &[(&str, &[&str])] = &[
        ("default", &["gene", "k_range", "list_of_genes"]),
        ("minimal", &["k_range", "gene", "list_of_genes"]),
        ("no_reasoning", &["k_range", "gene", "list_of_genes"]),
        ("k562", &["gene", "k_range", "list_of_genes"]),
        (
            "cell_line_specific",
            &["gene", "k_range", "cell_line", "related_pathways", "list_of_genes"],
        ),
        (
            "cell_line_refine",
            &["cell_line", "single_pass_gene_list", "gene", "list_of_genes"],
        ),
        (
            "cell_line_drug_specific",
            &["drug", "k_range", "cell_line", "list_of_drugs"],
        ),
        (
            "cell_line_drug_refine",
            &["cell_line", "single_pass_drug_list", "drug", "list_of_drugs"],
        ),
    ];

    #[test]
    fn builtin_templates_carry_documented_placeholders() {
        let registry = TemplateRegistry::builtin();
        assert_eq!(registry.len(), EXPECTED.len());
        for (name, placeholders) in EXPECTED {
            let text = get_template(name).unwrap();
            assert!(!text.trim().is_empty(), "{name} is empty");
            let template = registry.get(name).unwrap();
            assert_eq!(template.placeholders(), placeholders.to_vec(), "{name}");
            for p in *placeholders {
                assert!(text.contains(&format!("{{{p}}}")), "{name} lacks {p}");
            }
        }
    }

    #[test]
    fn unknown_template_is_not_found() {
        assert_eq!(
            get_template("nonexistent"),
            Err(TemplateError::NotFound("nonexistent".into()))
        );
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut registry = TemplateRegistry::builtin();
        assert_eq!(
            registry.register("default", "Rank {gene}"),
            Err(TemplateError::Duplicate("default".into()))
        );
        registry.register("custom", "Rank {gene}").unwrap();
        assert_eq!(registry.get("custom").unwrap().placeholders(), vec!["gene"]);
        // shared built-in registry stays untouched
        assert!(builtin_registry().get("custom").is_err());
    }

    #[test]
    fn escaped_braces_become_literals() {
        let t = PromptTemplate::parse("{{\"kNN\": [{gene}]}}").unwrap();
        let out = t.format(&TemplateVars::new().with("gene", "TP53")).unwrap();
        assert_eq!(out, "{\"kNN\": [TP53]}");
    }

    #[test]
    fn missing_placeholder_fails() {
        let t = builtin_registry().get("minimal").unwrap();
        let vars = TemplateVars::new().with("gene", "TP53").with("k_range", 5);
        assert_eq!(
            t.format(&vars),
            Err(TemplateError::MissingPlaceholder("list_of_genes".into()))
        );
    }

    #[test]
    fn malformed_templates_are_rejected() {
        assert!(matches!(
            PromptTemplate::parse("oops }"),
            Err(TemplateError::Malformed { offset: 5, .. })
        ));
        assert!(matches!(
            PromptTemplate::parse("{gene"),
            Err(TemplateError::Malformed { .. })
        ));
        assert!(matches!(
            PromptTemplate::parse("{gene name}"),
            Err(TemplateError::Malformed { .. })
        ));
    }

    #[test]
    fn render_cell_line_template() {
        let vars = TemplateVars::new()
            .with("gene", "TP53")
            .with("k_range", "5")
            .with("cell_line", "K562")
            .with("related_pathways", "apoptosis")
            .with_list("list_of_genes", ["MDM2", "CDKN1A", "ATM"]);
        let out = builtin_registry()
            .render("cell_line_specific", &vars)
            .unwrap();
        assert!(out.contains("Analyze the gene TP53 and identify 5 most similar genes"));
        assert!(out.contains("focus on the K562 cell line"));
        assert!(out.contains("Available genes: MDM2, CDKN1A, ATM"));
        assert!(out.contains("{\n  \"reasoning\""));
        assert!(!out.contains("{{"));
    }

    #[test]
    fn names_are_sorted() {
        let names: Vec<_> = builtin_registry().names().collect();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
    }
}
