mod file_config;

pub use file_config::{FileConfig, ProviderConfig, RetryConfig};

use crate::library_store::BookStatus;
use crate::provider::RetryPolicy;
use anyhow::{bail, Result};
use std::path::PathBuf;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_path: Option<PathBuf>,
    pub ebook_dir: Option<PathBuf>,
    pub audio_dir: Option<PathBuf>,
    pub cache_dir: Option<PathBuf>,
    pub dest_file_template: String,
    pub single_book_per_dir: bool,
    pub notfound_status: String,
    pub add_authors: bool,
    pub provider_url: Option<String>,
    pub provider_timeout_sec: u64,
    pub provider_search: bool,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    // Core settings
    pub db_path: PathBuf,
    pub ebook_dir: PathBuf,
    pub audio_dir: PathBuf,
    pub cache_dir: Option<PathBuf>,
    pub ebook_types: Vec<String>,
    pub audiobook_types: Vec<String>,
    pub dest_file_template: String,
    pub single_book_per_dir: bool,
    pub notfound_status: BookStatus,
    pub add_authors: bool,

    // Provider settings (absent = catalog-only operation)
    pub provider: Option<ProviderSettings>,
    pub retry: RetryPolicy,
}

#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub url: String,
    pub timeout_sec: u64,
    pub search_enabled: bool,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_path = file
            .db_path
            .map(PathBuf::from)
            .or_else(|| cli.db_path.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_path must be specified via --db-path or in config file")
            })?;

        let ebook_dir = file
            .ebook_dir
            .map(PathBuf::from)
            .or_else(|| cli.ebook_dir.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("ebook_dir must be specified via --ebook-dir or in config file")
            })?;
        if !ebook_dir.exists() {
            bail!("eBook directory does not exist: {:?}", ebook_dir);
        }
        if !ebook_dir.is_dir() {
            bail!("ebook_dir is not a directory: {:?}", ebook_dir);
        }

        let audio_dir = file
            .audio_dir
            .map(PathBuf::from)
            .or_else(|| cli.audio_dir.clone())
            .unwrap_or_else(|| ebook_dir.clone());

        let cache_dir = file
            .cache_dir
            .map(PathBuf::from)
            .or_else(|| cli.cache_dir.clone());

        let ebook_types = file.ebook_types.unwrap_or_else(default_ebook_types);
        let audiobook_types = file.audiobook_types.unwrap_or_else(default_audiobook_types);

        let dest_file_template = file
            .dest_file_template
            .unwrap_or_else(|| cli.dest_file_template.clone());
        if dest_file_template.is_empty() {
            bail!("dest_file_template must not be empty");
        }

        let single_book_per_dir = file.single_book_per_dir.unwrap_or(cli.single_book_per_dir);
        let add_authors = file.add_authors.unwrap_or(cli.add_authors);

        let notfound_raw = file
            .notfound_status
            .unwrap_or_else(|| cli.notfound_status.clone());
        let notfound_status = BookStatus::parse(&notfound_raw)
            .ok_or_else(|| anyhow::anyhow!("Invalid notfound_status: {}", notfound_raw))?;

        // Provider settings - [provider] section takes precedence over CLI args
        let provider_file = file.provider.unwrap_or_default();
        let provider_url = provider_file.url.or_else(|| cli.provider_url.clone());
        let provider = provider_url.map(|url| ProviderSettings {
            url,
            timeout_sec: provider_file
                .timeout_sec
                .unwrap_or(cli.provider_timeout_sec),
            search_enabled: provider_file.search_enabled.unwrap_or(cli.provider_search),
        });

        let retry_file = file.retry.unwrap_or_default();
        let retry_defaults = RetryPolicy::default();
        let retry = RetryPolicy {
            max_retries: retry_file.max_retries.unwrap_or(retry_defaults.max_retries),
            initial_backoff_ms: retry_file
                .initial_backoff_ms
                .unwrap_or(retry_defaults.initial_backoff_ms),
            max_backoff_ms: retry_file
                .max_backoff_ms
                .unwrap_or(retry_defaults.max_backoff_ms),
            backoff_multiplier: retry_file
                .backoff_multiplier
                .unwrap_or(retry_defaults.backoff_multiplier),
        };

        Ok(Self {
            db_path,
            ebook_dir,
            audio_dir,
            cache_dir,
            ebook_types,
            audiobook_types,
            dest_file_template,
            single_book_per_dir,
            notfound_status,
            add_authors,
            provider,
            retry,
        })
    }
}

fn default_ebook_types() -> Vec<String> {
    vec!["epub".to_string(), "mobi".to_string(), "azw3".to_string()]
}

fn default_audiobook_types() -> Vec<String> {
    vec![
        "mp3".to_string(),
        "m4a".to_string(),
        "m4b".to_string(),
        "ogg".to_string(),
        "flac".to_string(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn make_cli(dir: &TempDir) -> CliConfig {
        CliConfig {
            db_path: Some(dir.path().join("library.db")),
            ebook_dir: Some(dir.path().to_path_buf()),
            dest_file_template: "$Author - $Title".to_string(),
            single_book_per_dir: true,
            notfound_status: "Skipped".to_string(),
            add_authors: true,
            provider_timeout_sec: 300,
            ..Default::default()
        }
    }

    #[test]
    fn test_resolve_cli_only() {
        let dir = TempDir::new().unwrap();
        let config = AppConfig::resolve(&make_cli(&dir), None).unwrap();

        assert_eq!(config.db_path, dir.path().join("library.db"));
        assert_eq!(config.ebook_dir, dir.path());
        // audio library defaults to the ebook library
        assert_eq!(config.audio_dir, dir.path());
        assert_eq!(config.ebook_types, vec!["epub", "mobi", "azw3"]);
        assert_eq!(config.notfound_status, BookStatus::Skipped);
        assert!(config.single_book_per_dir);
        assert!(config.add_authors);
        assert!(config.provider.is_none());
        assert_eq!(config.retry.max_retries, 3);
    }

    #[test]
    fn test_resolve_toml_overrides_cli() {
        let dir = TempDir::new().unwrap();
        let cli = make_cli(&dir);

        let file_config = FileConfig {
            dest_file_template: Some("$Title by $Author".to_string()),
            single_book_per_dir: Some(false),
            notfound_status: Some("Wanted".to_string()),
            ebook_types: Some(vec!["epub".to_string()]),
            ..Default::default()
        };

        let config = AppConfig::resolve(&cli, Some(file_config)).unwrap();
        assert_eq!(config.dest_file_template, "$Title by $Author");
        assert!(!config.single_book_per_dir);
        assert_eq!(config.notfound_status, BookStatus::Wanted);
        assert_eq!(config.ebook_types, vec!["epub"]);
    }

    #[test]
    fn test_resolve_missing_db_path_error() {
        let result = AppConfig::resolve(&CliConfig::default(), None);
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("db_path must be specified"));
    }

    #[test]
    fn test_resolve_nonexistent_ebook_dir_error() {
        let dir = TempDir::new().unwrap();
        let mut cli = make_cli(&dir);
        cli.ebook_dir = Some(PathBuf::from("/nonexistent/path/that/should/not/exist"));
        let result = AppConfig::resolve(&cli, None);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("does not exist"));
    }

    #[test]
    fn test_resolve_invalid_notfound_status_error() {
        let dir = TempDir::new().unwrap();
        let mut cli = make_cli(&dir);
        cli.notfound_status = "Gone".to_string();
        let result = AppConfig::resolve(&cli, None);
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Invalid notfound_status"));
    }

    #[test]
    fn test_resolve_provider_from_toml_section() {
        let dir = TempDir::new().unwrap();
        let file_config = FileConfig {
            provider: Some(ProviderConfig {
                url: Some("http://books.example:8080".to_string()),
                timeout_sec: Some(60),
                search_enabled: Some(true),
            }),
            ..Default::default()
        };

        let config = AppConfig::resolve(&make_cli(&dir), Some(file_config)).unwrap();
        let provider = config.provider.unwrap();
        assert_eq!(provider.url, "http://books.example:8080");
        assert_eq!(provider.timeout_sec, 60);
        assert!(provider.search_enabled);
    }

    #[test]
    fn test_resolve_provider_disabled_without_url() {
        let dir = TempDir::new().unwrap();
        let config = AppConfig::resolve(&make_cli(&dir), None).unwrap();
        assert!(config.provider.is_none());
    }

    #[test]
    fn test_retry_settings_merge() {
        let dir = TempDir::new().unwrap();
        let file_config = FileConfig {
            retry: Some(RetryConfig {
                max_retries: Some(5),
                ..Default::default()
            }),
            ..Default::default()
        };

        let config = AppConfig::resolve(&make_cli(&dir), Some(file_config)).unwrap();
        assert_eq!(config.retry.max_retries, 5);
        // untouched fields keep their defaults
        assert_eq!(config.retry.initial_backoff_ms, 500);
    }
}
