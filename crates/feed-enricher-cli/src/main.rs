//! feed-enricher — entry point.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use feed_enricher::FileCache;
use feed_enricher_cli::commands::{annotate, cache, watch};
use feed_enricher_cli::{load_enricher_config, render_report, resolve_cache_dir};

#[derive(Parser)]
#[command(
    name = "feed-enricher",
    about = "Annotate rendered feed entries with details from the captured feed payload",
    version
)]
struct Cli {
    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Durable cache directory.
    /// Also reads from FEED_ENRICHER_CACHE_DIR.
    #[arg(long, global = true)]
    cache_dir: Option<String>,

    /// Print machine-readable JSON.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Annotate a saved page from a saved payload body (one run).
    Annotate {
        /// Saved page HTML.
        #[arg(long)]
        html: PathBuf,

        /// Saved feed response body.
        #[arg(long)]
        payload: PathBuf,

        /// Base URL for resolving relative links.
        #[arg(long)]
        base_url: Option<String>,

        /// Write the annotated page here instead of stdout.
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Start the enricher over a saved page and fetch live URLs through it.
    ///
    /// Responses from the feed endpoint are captured and cached; the page is
    /// annotated once the quiet window passes.
    Watch {
        /// Saved page HTML.
        #[arg(long)]
        html: PathBuf,

        /// Base URL for resolving relative links.
        #[arg(long)]
        base_url: Option<String>,

        /// Write the annotated page here.
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Per-request timeout in milliseconds.
        #[arg(long, default_value_t = 10_000)]
        timeout_ms: u64,

        /// URLs to fetch.
        #[arg(required = true)]
        urls: Vec<String>,
    },

    /// Inspect or clear the cached payload.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Generate shell completion scripts.
    ///
    /// Examples:
    ///   feed-enricher completions bash > ~/.local/share/bash-completion/completions/feed-enricher
    ///   feed-enricher completions zsh > ~/.zfunc/_feed-enricher
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Show the cached payload summary.
    Show,
    /// Delete the cached payload.
    Clear,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = load_enricher_config();

    match cli.command {
        Commands::Annotate {
            html,
            payload,
            base_url,
            out,
        } => {
            let (annotated, report) = annotate::annotate_files(
                &html,
                &payload,
                base_url.as_deref(),
                config.ancestor_limit,
            )?;
            let rendered = render_report(&report, cli.json)?;
            match out {
                Some(path) => {
                    std::fs::write(&path, annotated)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    println!("{rendered}");
                }
                None => {
                    println!("{annotated}");
                    eprintln!("{rendered}");
                }
            }
        }

        Commands::Watch {
            html,
            base_url,
            out,
            timeout_ms,
            urls,
        } => {
            let page = std::fs::read_to_string(&html)
                .with_context(|| format!("failed to read page {}", html.display()))?;
            let cache_dir = resolve_cache_dir(cli.cache_dir.as_deref());
            tracing::info!("Cache: {}", cache_dir.display());
            let store = FileCache::new(&cache_dir)
                .with_context(|| format!("failed to open cache {}", cache_dir.display()))?;

            let options = watch::WatchOptions {
                base_url,
                urls,
                timeout_ms,
            };
            let outcome = watch::watch(&page, &options, Arc::new(store), config).await?;

            if let Some(path) = out {
                std::fs::write(&path, &outcome.html)
                    .with_context(|| format!("failed to write {}", path.display()))?;
            }
            println!("{}", render_report(&outcome.report, cli.json)?);
            for url in &outcome.failed_urls {
                eprintln!("Fetch failed: {url}");
            }
        }

        Commands::Cache { action } => {
            let cache_dir = resolve_cache_dir(cli.cache_dir.as_deref());
            let store = FileCache::new(&cache_dir)
                .with_context(|| format!("failed to open cache {}", cache_dir.display()))?;
            match action {
                CacheAction::Show => match cache::show(&store, &config.cache_key)? {
                    Some(summary) => println!("{}", summary.render(cli.json)?),
                    None => {
                        eprintln!("No cached payload under {}", config.cache_key);
                        std::process::exit(1);
                    }
                },
                CacheAction::Clear => {
                    cache::clear(&store, &config.cache_key)?;
                    println!("Cleared {}", store.path_for(&config.cache_key).display());
                }
            }
        }

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "feed-enricher", &mut std::io::stdout());
        }
    }

    Ok(())
}
