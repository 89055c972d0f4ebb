//! Integration test for real llama.cpp inference.
//! Requires LANGPERT_MODEL pointing to a local GGUF, or a .gguf under ./models.

#[test]
fn real_inference_ranks_genes() -> anyhow::Result<()> {
    use langpert::model::{llama::LlamaEngine, DeviceMap};
    use langpert::templates::{builtin_registry, TemplateVars};
    use langpert::validate::Validator;
    use langpert::{BackendOptions, GenerationBackend, GenerationConfig, GenerationOverrides};
    use std::{env, fs, path::PathBuf};
    use walkdir::WalkDir;

    // Resolve model path: prefer $LANGPERT_MODEL, else search ./models for any .gguf
    let model_path: PathBuf = env::var("LANGPERT_MODEL")
        .ok()
        .map(PathBuf::from)
        .filter(|p| fs::metadata(p).is_ok())
        .or_else(|| {
            let root = PathBuf::from("./models");
            if fs::metadata(&root).is_ok() {
                for entry in WalkDir::new(&root).into_iter().filter_map(Result::ok) {
                    let p = entry.into_path();
                    if p.extension().and_then(|s| s.to_str()) == Some("gguf") {
                        return Some(p);
                    }
                }
            }
            None
        })
        .expect("No model found. Set LANGPERT_MODEL or place a .gguf under ./models");

    // Small budget and greedy decoding to keep the test reasonably fast and deterministic
    let options = BackendOptions::new(model_path.to_string_lossy())
        .device_map(DeviceMap::Cpu)
        .cache_dir(env::temp_dir().join("langpert-test-cache"))
        .generation(GenerationConfig {
            max_new_tokens: 512,
            temperature: 0.0,
            ..Default::default()
        });
    let backend = GenerationBackend::new(&LlamaEngine::new(), options)?;
    assert!(backend.generation_config().pad_token_id.is_some());

    let vars = TemplateVars::new()
        .with("gene", "TP53")
        .with("k_range", 3)
        .with_list("list_of_genes", ["MDM2", "CDKN1A", "ATM", "GAPDH", "ACTB"]);
    let prompt = builtin_registry().render("no_reasoning", &vars)?;
    let out = backend.generate_text(&prompt, None, &GenerationOverrides::default())?;

    // The decoded output echoes the prompt
    assert!(out.contains("TP53"), "missing prompt echo");

    // Minimal sanity check on the answer
    let knn = Validator::knn_response()?.parse_knn(&out, &prompt)?;
    assert!(!knn.knn.is_empty(), "empty kNN list");
    Ok(())
}
