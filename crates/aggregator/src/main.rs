//! Anime aggregator CLI application.

use anime_aggregator::{AnimeService, EpisodeSort, MetadataSource, ProviderKind, Scheme};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use shared::Config;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Clear cache before running
    #[arg(long)]
    clear_cache: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Metadata and reconciled episodes for a provider anime
    Info {
        id: String,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = ProviderKind::AnimePahe)]
        provider: ProviderKind,
    },
    /// Metadata and reconciled episodes for a MyAnimeList id
    Mal {
        id: u64,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = ProviderKind::AnimePahe)]
        provider: ProviderKind,
    },
    /// Provider id matched to a MyAnimeList id
    Match {
        mal_id: u64,
        #[arg(long, default_value_t = ProviderKind::AnimePahe)]
        provider: ProviderKind,
    },
    /// Metadata from one source
    Meta {
        id: u64,
        #[arg(long, default_value_t = MetadataSource::AniList)]
        source: MetadataSource,
    },
    /// External links on a provider anime page
    Page {
        id: String,
        #[arg(long, default_value_t = ProviderKind::AnimePahe)]
        provider: ProviderKind,
    },
    /// One raw page of a provider episode listing
    Episodes {
        id: String,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = EpisodeSort::Ascending)]
        sort: EpisodeSort,
        #[arg(long, default_value_t = ProviderKind::AnimePahe)]
        provider: ProviderKind,
    },
    /// Search a provider
    Search {
        query: String,
        #[arg(long, default_value_t = ProviderKind::AnimePahe)]
        provider: ProviderKind,
    },
    /// Stream links for one episode
    Streams {
        id: String,
        session: String,
        #[arg(long, default_value_t = ProviderKind::AnimePahe)]
        provider: ProviderKind,
    },
    /// Resolve an embed page to its stream URL
    Extract { embed_url: String },
    /// Look up an id in the crosswalk table
    Resolve { scheme: Scheme, id: String },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    // Load configuration
    let config = Config::from_file(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    // Initialize logging
    let log_level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        shared::logging::parse_level(&config.logging.default_level)
    };

    shared::logging::init(shared::LogConfig {
        log_dir: config.log_dir().to_string_lossy().to_string(),
        component: "anime-aggregator".to_string(),
        default_level: log_level,
        console: config.logging.console,
        file: config.logging.file,
        json_format: config.logging.json_format,
    })?;

    info!(config_file = %args.config.display(), "Loaded configuration");

    let service = AnimeService::new(&config).context("Failed to initialize service")?;

    if args.clear_cache {
        info!("Clearing cache");
        service.cache().clear().await.context("Failed to clear cache")?;
    }

    // Display cache statistics
    if service.cache().is_enabled() {
        let cache_stats = service
            .cache()
            .stats()
            .await
            .context("Failed to get cache stats")?;
        info!(
            cached_files = cache_stats.total_files,
            cache_size_mb = cache_stats.total_size_bytes / 1_000_000,
            "Cache statistics"
        );
    }

    match run(&service, args.command).await {
        Ok(output) => {
            println!("{output}");
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            error!(status = e.status_code(), error = %e, "Command failed");
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn run(service: &AnimeService, command: Command) -> anime_aggregator::Result<String> {
    match command {
        Command::Info { id, page, provider } => render(&service.info(provider, &id, page).await?),
        Command::Mal { id, page, provider } => {
            render(&service.info_by_mal(provider, id, page).await?)
        }
        Command::Match { mal_id, provider } => render(&service.match_mal(provider, mal_id).await?),
        Command::Meta { id, source } => render(&service.meta(source, id).await?),
        Command::Page { id, provider } => render(&service.anime_page(provider, &id).await?),
        Command::Episodes {
            id,
            page,
            sort,
            provider,
        } => render(&service.episodes(provider, &id, sort, page).await?),
        Command::Search { query, provider } => render(&service.search(provider, &query).await?),
        Command::Streams {
            id,
            session,
            provider,
        } => render(&service.streams(provider, &id, &session).await?),
        Command::Extract { embed_url } => render(&service.extract_stream(&embed_url).await?),
        Command::Resolve { scheme, id } => render(&service.resolve_identity(scheme, &id).await?),
    }
}

fn render<T: Serialize>(value: &T) -> anime_aggregator::Result<String> {
    serde_json::to_string_pretty(value)
        .map_err(|e| anime_aggregator::Error::Parse(format!("failed to render output: {e}")))
}
