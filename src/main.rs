//! CLI entry point for the history-context cache.
//!
//! Provides commands for asking history questions through the cache,
//! inspecting cache statistics, and displaying active settings.

use anyhow::Context;
use clap::{
    Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use codewhy::{ContextProvider, Settings, StaticBackend};
use std::path::PathBuf;
use std::sync::Arc;

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

#[derive(Parser)]
#[command(
    name = "codewhy",
    version,
    about = "Cached answers to 'why does this code look like this?'",
    styles = clap_cargo_style()
)]
struct Cli {
    /// Path to a TOML settings file (defaults to codewhy.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask a question about a file's history
    Ask {
        /// File the question is about
        file_path: String,
        /// The question, free text
        question: String,
        /// Emit the full answer as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show cache and provider statistics
    Stats {
        /// Emit statistics as JSON
        #[arg(long)]
        json: bool,
    },
    /// Display active settings
    Config,
}

fn load_settings(cli: &Cli) -> anyhow::Result<Settings> {
    let settings = match &cli.config {
        Some(path) => Settings::load_from(path)
            .with_context(|| format!("failed to load settings from {}", path.display()))?,
        None => Settings::load().context("failed to load settings")?,
    };
    Ok(settings)
}

fn build_provider(settings: Settings) -> ContextProvider {
    let provider = ContextProvider::new(settings, Arc::new(StaticBackend::new()));
    // Best effort: a corrupted snapshot is logged and discarded
    let _ = provider.load_state();
    provider
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut settings = load_settings(&cli)?;
    if cli.debug {
        settings.debug = true;
    }

    let level = if settings.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Ask {
            file_path,
            question,
            json,
        } => {
            let provider = build_provider(settings);
            let outcome = provider.query(&file_path, &question).await;

            if json {
                println!("{}", serde_json::to_string_pretty(&outcome.answer)?);
            } else {
                println!("{}", outcome.answer.answer_text);
                match (outcome.tier, outcome.similarity) {
                    (Some(tier), Some(similarity)) => {
                        eprintln!("(cached: {tier:?}, similarity {:.2})", similarity.get());
                    }
                    _ if outcome.degraded => eprintln!("(degraded answer, not cached)"),
                    _ => eprintln!("(fresh synthesis)"),
                }
                for citation in &outcome.answer.citations {
                    println!("  - [{}] {}", citation.source_id, citation.excerpt);
                }
            }

            if !outcome.degraded {
                if let Err(e) = provider.save_state() {
                    tracing::warn!(error = %e, "could not persist cache state");
                }
            }
        }
        Commands::Stats { json } => {
            let provider = build_provider(settings);
            let stats = provider.stats();
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!("state: {:?}", stats.state);
                println!(
                    "tier 1: {} entries, {} hits / {} misses ({} evictions)",
                    stats.cache.l1.entries,
                    stats.cache.l1.hits,
                    stats.cache.l1.misses,
                    stats.cache.l1.evictions
                );
                println!(
                    "tier 2: {} entries, {} hits / {} misses ({} evictions, {} expirations)",
                    stats.cache.l2.entries,
                    stats.cache.l2.hits,
                    stats.cache.l2.misses,
                    stats.cache.l2.evictions,
                    stats.cache.l2.expirations
                );
                println!("combined hit rate: {:.1}%", stats.cache.combined_hit_rate * 100.0);
                println!(
                    "memory: {:.2} MB",
                    stats.cache.l1.estimated_memory_mb + stats.cache.l2.estimated_memory_mb
                );
            }
        }
        Commands::Config => {
            println!("{}", toml::to_string_pretty(&settings)?);
        }
    }

    Ok(())
}
