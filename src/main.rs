use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tunegrab::classify::{classify, ContentKind, Platform};
use tunegrab::config::AppConfig;
use tunegrab::matcher::CandidateMatcher;
use tunegrab::pipeline::{AcquisitionPipeline, Collaborators, PipelineSettings, RunOutcome};
use tunegrab::resolver::{default_chain, MetadataResolver};
use tunegrab::session::SessionStore;

#[derive(Parser)]
#[command(name = "tunegrab", version, about = "Spotify and YouTube links to tagged MP3 files")]
struct Cli {
    /// Directory for finished MP3 files
    #[arg(long, global = true)]
    output_dir: Option<PathBuf>,

    /// Path to the session JSON document
    #[arg(long, global = true)]
    session_path: Option<PathBuf>,

    /// Verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download one or more tracks, albums, playlists or videos as MP3
    Get {
        /// Spotify or YouTube URLs (or spotify: URIs)
        #[arg(required = true)]
        urls: Vec<String>,
    },

    /// Resolve and print metadata for a Spotify track without downloading
    Resolve {
        url: String,
    },

    /// Show how a URL is recognized
    Classify {
        url: String,
    },

    /// Search the video provider and show the chosen candidate
    Search {
        title: String,
        artist: String,

        /// Platform id used when title/artist are placeholders
        #[arg(long)]
        fallback_id: Option<String>,
    },

    /// Print the current session document
    Session,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    // Load config file (optional, defaults if missing)
    let mut config = AppConfig::load();

    // CLI > config > XDG default
    if cli.output_dir.is_some() {
        config.output_dir = cli.output_dir;
    }
    if cli.session_path.is_some() {
        config.session_path = cli.session_path;
    }
    let session_path = config.resolve_session_path();
    log::info!("Session: {}", session_path.display());

    let session = Arc::new(SessionStore::new(session_path));

    match cli.command {
        Commands::Get { urls } => {
            let pipeline = AcquisitionPipeline::new(
                Collaborators::from_config(&config),
                session.clone(),
                PipelineSettings::from_config(&config),
                &config,
            );
            let mut failures = 0;
            for url in &urls {
                match pipeline.run(url) {
                    Ok(RunOutcome::Single(path)) => println!("Saved {}", path.display()),
                    Ok(RunOutcome::Batch(report)) => {
                        for path in &report.saved {
                            println!("Saved {}", path.display());
                        }
                        println!(
                            "Batch complete: {} saved, {} failed",
                            report.saved.len(),
                            report.failed
                        );
                    }
                    Err(e) => {
                        eprintln!("{url}: {e}");
                        failures += 1;
                    }
                }
            }
            if failures > 0 {
                anyhow::bail!("{failures} of {} URL(s) failed", urls.len());
            }
        }

        Commands::Resolve { url } => {
            let classified = classify(&url).context("Unrecognized URL")?;
            if classified.platform != Platform::Spotify || classified.kind != ContentKind::Track {
                anyhow::bail!(
                    "resolve only handles Spotify tracks, got a {} {}",
                    classified.platform,
                    classified.kind
                );
            }
            let parts = Collaborators::from_config(&config);
            let resolver = MetadataResolver::new(default_chain(parts.client, parts.fetcher, &config.timeouts));
            let track = resolver.resolve(&classified.id, &url);
            println!("{}", serde_json::to_string_pretty(&track)?);
        }

        Commands::Classify { url } => {
            let c = classify(&url).context("Unrecognized URL")?;
            println!("{} {} {}", c.platform, c.kind, c.id);
        }

        Commands::Search {
            title,
            artist,
            fallback_id,
        } => {
            let parts = Collaborators::from_config(&config);
            let matcher = CandidateMatcher::new(parts.provider).with_max_results(config.search_results);
            let best = matcher
                .find_best_audio_source(&title, &artist, fallback_id.as_deref())
                .context("Search failed")?;
            println!("{}", best.title);
            println!("  {}", best.url);
            if !best.uploader.is_empty() {
                println!("  by {}", best.uploader);
            }
            if let Some(d) = best.duration_seconds {
                println!("  {}:{:02}", d / 60, d % 60);
            }
        }

        Commands::Session => {
            session.load().context("Failed to read session document")?;
            let record = session.snapshot();
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
    }

    Ok(())
}
