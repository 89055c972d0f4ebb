use std::time::Instant;
use rand::{seq::SliceRandom, thread_rng};
use hdrhistogram::Histogram;
use langpert::templates::{builtin_registry, TemplateVars};
use langpert::{BackendOptions, GenerationBackend, GenerationOverrides};

// usage: xtask [model] [iterations] [max_new_tokens]
fn main() -> anyhow::Result<()> {
    let mut args = std::env::args().skip(1);
    let model = args.next().unwrap_or_else(|| "models/bench.gguf".to_string());
    let total: usize = args.next().map(|s| s.parse()).transpose()?.unwrap_or(20);
    let max_new_tokens: usize = args.next().map(|s| s.parse()).transpose()?.unwrap_or(64);

    let genes = vec!["TP53", "MDM2", "CDKN1A", "ATM", "BRCA1", "MYC", "GAPDH", "RPL11", "RPS19", "GATA1"];

    #[cfg(feature = "llama")]
    let engine = langpert::model::llama::LlamaEngine::new();
    #[cfg(not(feature = "llama"))]
    let engine = langpert::model::mock::MockEngine::new()
        .with_completion(r#"{"reasoning": "bench", "kNN": ["MDM2", "CDKN1A", "ATM"]}"#);

    let t_load = Instant::now();
    let backend = GenerationBackend::new(&engine, BackendOptions::new(model))?;
    println!("loaded {} in {:?}", backend.model_name(), t_load.elapsed());

    let overrides = GenerationOverrides::default().max_new_tokens(max_new_tokens);
    let mut hist = Histogram::<u64>::new(3)?;
    let mut errors = 0usize;

    let start = Instant::now();
    for _ in 0..total {
        let gene = {
            let mut rng = thread_rng();
            genes.choose(&mut rng).copied().unwrap_or("TP53")
        };
        let candidates: Vec<&str> = genes.iter().copied().filter(|g| *g != gene).collect();
        let vars = TemplateVars::new()
            .with("gene", gene)
            .with("k_range", 3)
            .with_list("list_of_genes", candidates);
        let prompt = builtin_registry().render("minimal", &vars)?;

        let t0 = Instant::now();
        match backend.generate_text(&prompt, None, &overrides) {
            Ok(_) => { hist.record(t0.elapsed().as_micros() as u64).ok(); }
            Err(_) => errors += 1,
        }
    }

    println!("ran {} generations in {:?}", total, start.elapsed());
    println!("errors: {}", errors);
    println!("p50: {} us", hist.value_at_quantile(0.50));
    println!("p95: {} us", hist.value_at_quantile(0.95));
    println!("p99: {} us", hist.value_at_quantile(0.99));
    Ok(())
}
