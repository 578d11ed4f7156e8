use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod config;
use config::{AppConfig, CliConfig, FileConfig};

mod library_store;
use library_store::{MediaKind, SqliteLibraryStore};

mod matching;
mod metadata;

mod provider;
use provider::{BookProvider, HttpBookProvider, RetryingProvider};

mod scanner;
use scanner::{LibraryScanner, ScannerConfig};

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(msg).with_context(|| format!("Error resolving path: {}", s));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to the SQLite library database file.
    #[clap(long, value_parser = parse_path)]
    pub db_path: Option<PathBuf>,

    /// Root directory of the ebook library.
    #[clap(long, value_parser = parse_path)]
    pub ebook_dir: Option<PathBuf>,

    /// Root directory of the audiobook library (defaults to the ebook dir).
    #[clap(long, value_parser = parse_path)]
    pub audio_dir: Option<PathBuf>,

    /// Directory for cached cover images.
    #[clap(long, value_parser = parse_path)]
    pub cache_dir: Option<PathBuf>,

    /// Path to a TOML config file; its values override the CLI.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Which library to scan.
    #[clap(long, default_value = "ebook")]
    pub library: String,

    /// Scan this subtree instead of the whole library root.
    #[clap(long, value_parser = parse_path)]
    pub start_dir: Option<PathBuf>,

    /// Attribute a partial scan to this author id.
    #[clap(long)]
    pub author_id: Option<String>,

    /// The destination-file naming template used as the pattern-match fallback.
    #[clap(long, default_value = "$Author - $Title")]
    pub dest_file_template: String,

    /// Treat each subdirectory as holding a single book.
    #[clap(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub single_book_per_dir: bool,

    /// Status assigned to books whose file has disappeared from disk.
    #[clap(long, default_value = "Skipped")]
    pub notfound_status: String,

    /// Whether unknown authors may be added to the catalog.
    #[clap(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub add_authors: bool,

    /// URL of the bibliographic provider service.
    #[clap(long)]
    pub provider_url: Option<String>,

    /// Timeout in seconds for provider requests.
    #[clap(long, default_value_t = 300)]
    pub provider_timeout_sec: u64,

    /// Whether the provider supports free-text search.
    #[clap(long)]
    pub provider_search: bool,
}

fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .unwrap();

    let file_config = match &cli_args.config {
        Some(path) => Some(FileConfig::load(path)?),
        None => None,
    };

    let cli_config = CliConfig {
        db_path: cli_args.db_path.clone(),
        ebook_dir: cli_args.ebook_dir.clone(),
        audio_dir: cli_args.audio_dir.clone(),
        cache_dir: cli_args.cache_dir.clone(),
        dest_file_template: cli_args.dest_file_template.clone(),
        single_book_per_dir: cli_args.single_book_per_dir,
        notfound_status: cli_args.notfound_status.clone(),
        add_authors: cli_args.add_authors,
        provider_url: cli_args.provider_url.clone(),
        provider_timeout_sec: cli_args.provider_timeout_sec,
        provider_search: cli_args.provider_search,
    };
    let app_config = AppConfig::resolve(&cli_config, file_config)?;

    let kind = match cli_args.library.to_lowercase().as_str() {
        "ebook" => MediaKind::EBook,
        "audio" => MediaKind::Audio,
        other => anyhow::bail!("Unknown library type: {} (use ebook or audio)", other),
    };

    info!("Opening library database at {:?}...", app_config.db_path);
    let store = Arc::new(SqliteLibraryStore::open(&app_config.db_path)?);

    // Create provider client if URL is configured
    let provider: Option<Arc<dyn BookProvider>> = app_config.provider.as_ref().map(|settings| {
        info!("Bibliographic provider configured at {}", settings.url);
        let client = HttpBookProvider::new(
            settings.url.clone(),
            settings.timeout_sec,
            settings.search_enabled,
        );
        Arc::new(RetryingProvider::new(client, app_config.retry.clone())) as Arc<dyn BookProvider>
    });

    let scanner = LibraryScanner::new(
        store,
        provider,
        ScannerConfig {
            ebook_dir: app_config.ebook_dir.clone(),
            audio_dir: app_config.audio_dir.clone(),
            cache_dir: app_config.cache_dir.clone(),
            ebook_types: app_config.ebook_types.clone(),
            audio_types: app_config.audiobook_types.clone(),
            dest_file_template: app_config.dest_file_template.clone(),
            single_book_per_dir: app_config.single_book_per_dir,
            notfound_status: app_config.notfound_status,
            add_authors: app_config.add_authors,
        },
    );

    let report = scanner.scan(
        cli_args.start_dir.as_deref(),
        kind,
        cli_args.author_id.as_deref(),
    )?;

    info!(
        "Scan finished: {} new, {} modified, {} file(s) seen",
        report.new_books, report.modified_books, report.files_processed
    );
    Ok(())
}
