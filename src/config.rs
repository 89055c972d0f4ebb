use std::path::PathBuf;

use anyhow::{anyhow, Context};
use clap::Parser;

use crate::{
    backend::BackendOptions,
    generation::{GenerationConfig, DEFAULT_MAX_NEW_TOKENS, DEFAULT_TEMPERATURE},
    model::DeviceMap,
    templates::TemplateVars,
    util,
};

/// Run one LangPert prompt through a local model.
#[derive(Parser, Debug, Clone)]
#[command(name = "langpert", version)]
pub struct Config {
    /// Local .gguf path or `owner/repo:file.gguf`
    #[arg(long, env = "LANGPERT_MODEL", required_unless_present = "list_templates")]
    pub model_name: Option<String>,
    /// auto, cpu, gpu or gpu:<layers>
    #[arg(long, env = "LANGPERT_DEVICE_MAP", default_value = "auto")]
    pub device_map: DeviceMap,
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,
    /// Context size; sized to the request when unset
    #[arg(long, env)]
    pub n_ctx: Option<u32>,
    #[arg(long, env, default_value_t = DEFAULT_MAX_NEW_TOKENS)]
    pub max_new_tokens: usize,
    #[arg(long, env, default_value_t = DEFAULT_TEMPERATURE)]
    pub temperature: f32,
    #[arg(long, env)]
    pub top_p: Option<f32>,
    #[arg(long, env)]
    pub seed: Option<u32>,
    #[arg(long, env)]
    pub pad_token_id: Option<u32>,

    #[arg(long, default_value = "default")]
    pub template: String,
    /// Placeholder value, `name=value` (repeatable)
    #[arg(long = "var", value_parser = parse_key_val)]
    pub vars: Vec<(String, String)>,
    /// Placeholder filled from a list file, `name=path` (repeatable)
    #[arg(long = "var-file", value_parser = parse_key_val)]
    pub var_files: Vec<(String, String)>,
    #[arg(long)]
    pub system_prompt: Option<String>,

    /// Print the parsed kNN answer as JSON instead of the raw output
    #[arg(long)]
    pub parse_knn: bool,
    /// Print Prometheus metrics to stderr when done
    #[arg(long)]
    pub metrics: bool,
    /// List built-in templates with their placeholders and exit
    #[arg(long)]
    pub list_templates: bool,
}

pub fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (k, v) = s
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got `{s}`"))?;
    let k = k.trim();
    if k.is_empty() {
        return Err(format!("empty name in `{s}`"));
    }
    Ok((k.to_string(), v.to_string()))
}

impl Config {
    pub fn backend_options(&self) -> anyhow::Result<BackendOptions> {
        let model_name = self
            .model_name
            .as_deref()
            .ok_or_else(|| anyhow!("--model-name is required"))?;
        let mut options = BackendOptions::new(model_name)
            .device_map(self.device_map)
            .generation(GenerationConfig {
                max_new_tokens: self.max_new_tokens,
                temperature: self.temperature,
                pad_token_id: None,
                top_p: self.top_p,
                seed: self.seed,
            });
        options.cache_dir = self.cache_dir.clone();
        options.pad_token_id = self.pad_token_id;
        Ok(options)
    }

    /// Placeholder values from `--var` and `--var-file`.
    pub fn template_vars(&self) -> anyhow::Result<TemplateVars> {
        let mut vars: TemplateVars = self.vars.iter().cloned().collect();
        for (name, path) in &self.var_files {
            let items = util::read_list(path).with_context(|| format!("--var-file {name}"))?;
            if items.is_empty() {
                return Err(anyhow!("list file {path} for `{name}` is empty"));
            }
            vars = vars.with_list(name.as_str(), items);
        }
        Ok(vars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_val_parsing() {
        assert_eq!(
            parse_key_val("gene=TP53").unwrap(),
            ("gene".to_string(), "TP53".to_string())
        );
        assert_eq!(parse_key_val("k=a=b").unwrap().1, "a=b");
        assert!(parse_key_val("gene").is_err());
        assert!(parse_key_val("=x").is_err());
    }

    #[test]
    fn model_name_has_no_default() {
        use clap::CommandFactory;
        let cmd = Config::command();
        let arg = cmd
            .get_arguments()
            .find(|a| a.get_id() == "model_name")
            .unwrap();
        assert!(arg.get_default_values().is_empty());

        if std::env::var_os("LANGPERT_MODEL").is_none() {
            let err = Config::try_parse_from(["langpert"]).unwrap_err();
            assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
        }
    }

    #[test]
    fn listing_templates_needs_no_model() {
        let cfg = Config::try_parse_from(["langpert", "--list-templates"]).unwrap();
        assert!(cfg.list_templates);
        if cfg.model_name.is_none() {
            assert!(cfg.backend_options().is_err());
        }
    }

    #[test]
    fn flags_map_onto_backend_options() {
        let cfg = Config::try_parse_from([
            "langpert",
            "--model-name",
            "models/tiny.gguf",
            "--device-map",
            "gpu:10",
            "--temperature",
            "0.2",
            "--var",
            "gene=TP53",
        ])
        .unwrap();
        let opts = cfg.backend_options().unwrap();
        assert_eq!(opts.model_name, "models/tiny.gguf");
        assert_eq!(opts.device_map, DeviceMap::Gpu { layers: Some(10) });
        assert_eq!(opts.generation.temperature, 0.2);
        assert_eq!(opts.generation.max_new_tokens, DEFAULT_MAX_NEW_TOKENS);
        assert_eq!(cfg.template_vars().unwrap().get("gene"), Some("TP53"));
    }
}
