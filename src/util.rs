use std::{fs, path::Path};
use anyhow::Context;


pub fn read_to_string<P: AsRef<Path>>(p: P) -> anyhow::Result<String> {
    fs::read_to_string(&p).with_context(|| format!("read file {:?}", p.as_ref()))
}

/// Gene/drug names from a list file: one or more per line, comma separated.
/// Blank entries and `#` comment lines are skipped.
pub fn parse_list(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|l| !l.starts_with('#'))
        .flat_map(|l| l.split(','))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

pub fn read_list<P: AsRef<Path>>(p: P) -> anyhow::Result<Vec<String>> {
    Ok(parse_list(&read_to_string(p)?))
}
