use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub db_path: Option<String>,
    pub ebook_dir: Option<String>,
    pub audio_dir: Option<String>,
    pub cache_dir: Option<String>,
    pub ebook_types: Option<Vec<String>>,
    pub audiobook_types: Option<Vec<String>>,
    pub dest_file_template: Option<String>,
    pub single_book_per_dir: Option<bool>,
    pub notfound_status: Option<String>,
    pub add_authors: Option<bool>,

    // Feature configs
    pub provider: Option<ProviderConfig>,
    pub retry: Option<RetryConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct ProviderConfig {
    pub url: Option<String>,
    pub timeout_sec: Option<u64>,
    pub search_enabled: Option<bool>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: Option<u32>,
    pub initial_backoff_ms: Option<u64>,
    pub max_backoff_ms: Option<u64>,
    pub backoff_multiplier: Option<f64>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
