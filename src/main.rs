use anyhow::Context;
use dotenvy::dotenv;
use langpert::config::Config;
use langpert::model::llama::LlamaEngine;
use langpert::templates::builtin_registry;
use langpert::validate::Validator;
use langpert::{GenerationBackend, GenerationOverrides};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::{fmt, EnvFilter};

fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let cfg = <Config as clap::Parser>::parse();

    // logs go to stderr so stdout carries only the answer
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let registry = builtin_registry();
    if cfg.list_templates {
        for name in registry.names() {
            let template = registry.get(name)?;
            println!("{name}: {}", template.placeholders().join(", "));
        }
        return Ok(());
    }

    let metrics = if cfg.metrics {
        Some(
            PrometheusBuilder::new()
                .install_recorder()
                .context("install metrics recorder")?,
        )
    } else {
        None
    };

    let prompt = registry
        .render(&cfg.template, &cfg.template_vars()?)
        .with_context(|| format!("format template `{}`", cfg.template))?;
    let validator = if cfg.parse_knn {
        Some(Validator::knn_response()?)
    } else {
        None
    };

    let engine = match cfg.n_ctx {
        Some(n) => LlamaEngine::with_n_ctx(n),
        None => LlamaEngine::new(),
    };
    let backend = GenerationBackend::new(&engine, cfg.backend_options()?)?;
    let output = backend.generate_text(
        &prompt,
        cfg.system_prompt.as_deref(),
        &GenerationOverrides::default(),
    )?;

    match validator {
        Some(v) => {
            let answer = v.parse_knn(&output, &prompt)?;
            println!("{}", serde_json::to_string_pretty(&answer)?);
        }
        None => println!("{output}"),
    }

    if let Some(handle) = metrics {
        eprintln!("{}", handle.render());
    }
    Ok(())
}
