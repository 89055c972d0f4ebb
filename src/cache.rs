//! Default cache location for downloaded model files.

use std::{
    env, fs,
    path::{Path, PathBuf},
};

/// Overrides every other cache location.
pub const CACHE_DIR_ENV: &str = "LANGPERT_CACHE_DIR";

const APP_DIR: &str = "langpert";

/// Candidate cache directories in priority order, computed from `lookup`
/// (an environment accessor).
pub fn cache_dir_candidates<F>(lookup: F) -> Vec<PathBuf>
where
    F: Fn(&str) -> Option<String>,
{
    let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
    let mut out = Vec::new();
    if let Some(dir) = non_empty(CACHE_DIR_ENV) {
        out.push(PathBuf::from(dir));
    }
    if let Some(dir) = non_empty("HF_HOME") {
        out.push(Path::new(&dir).join("hub"));
    }
    if let Some(dir) = non_empty("XDG_CACHE_HOME") {
        out.push(Path::new(&dir).join(APP_DIR));
    }
    if let Some(home) = non_empty("HOME") {
        out.push(Path::new(&home).join(".cache").join(APP_DIR));
    }
    out.push(env::temp_dir().join(format!("{APP_DIR}-cache")));
    out
}

/// First candidate that exists (or can be created) as a directory.
///
/// Falls back to the temp-dir candidate even if it could not be created, so
/// the caller always gets a path; the engine reports the I/O error on use.
pub fn safe_cache_dir() -> PathBuf {
    let candidates = cache_dir_candidates(|k| env::var(k).ok());
    for dir in &candidates {
        match fs::create_dir_all(dir) {
            Ok(()) if dir.is_dir() => return dir.clone(),
            Ok(()) => {}
            Err(e) => tracing::debug!(dir = %dir.display(), error = %e, "cache dir unusable"),
        }
    }
    candidates
        .last()
        .cloned()
        .unwrap_or_else(|| env::temp_dir().join(format!("{APP_DIR}-cache")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn explicit_env_wins() {
        let c = cache_dir_candidates(env_of(&[
            (CACHE_DIR_ENV, "/data/models"),
            ("HOME", "/home/u"),
        ]));
        assert_eq!(c[0], PathBuf::from("/data/models"));
        assert_eq!(c[1], PathBuf::from("/home/u/.cache/langpert"));
    }

    #[test]
    fn hf_home_uses_hub_subdir() {
        let c = cache_dir_candidates(env_of(&[("HF_HOME", "/hf")]));
        assert_eq!(c[0], PathBuf::from("/hf/hub"));
    }

    #[test]
    fn blank_values_are_skipped() {
        let c = cache_dir_candidates(env_of(&[(CACHE_DIR_ENV, "  "), ("XDG_CACHE_HOME", "/x")]));
        assert_eq!(c[0], PathBuf::from("/x/langpert"));
    }

    #[test]
    fn temp_dir_is_last_resort() {
        let c = cache_dir_candidates(env_of(&[]));
        assert_eq!(c.len(), 1);
        assert!(c[0].starts_with(env::temp_dir()));
    }

    #[test]
    fn safe_cache_dir_is_a_usable_candidate() {
        let dir = safe_cache_dir();
        assert!(dir.is_dir(), "{}", dir.display());
        assert!(cache_dir_candidates(|k| env::var(k).ok()).contains(&dir));
    }
}
