use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::info;

use sieve::config::Config;
use sieve::fusion::config::FusionConfigUpdate;
use sieve::fusion::engine::{DecisionFusionEngine, Submission, MAX_BATCH_SIZE};
use sieve::output::{terminal, truncate_chars};

/// Sieve: signal-fusion content moderation.
///
/// Combines a keyword list, a remote profanity service and local
/// statistical models into one allow/block verdict per submission.
#[derive(Parser)]
#[command(name = "sieve", version, about)]
struct Cli {
    /// Override the text threshold for this run
    #[arg(long, global = true)]
    text_threshold: Option<f64>,

    /// Override the image threshold for this run
    #[arg(long, global = true)]
    image_threshold: Option<f64>,

    /// Report UNSAFE verdicts without blocking
    #[arg(long, global = true)]
    no_auto_block: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Moderate one piece of text and/or one image
    Check {
        /// Text to check
        #[arg(long)]
        text: Option<String>,

        /// Path to an image to check
        #[arg(long)]
        image: Option<PathBuf>,

        /// User the content belongs to
        #[arg(long)]
        user: Option<String>,

        /// Print the verdict as JSON
        #[arg(long)]
        json: bool,
    },

    /// Moderate a JSONL file of submissions ("-" reads stdin)
    Batch {
        input: String,

        /// Print verdicts as JSON, one per line
        #[arg(long)]
        json: bool,
    },

    /// Show violation statistics from the audit log
    Stats {
        #[arg(long)]
        json: bool,
    },

    /// List or add restricted words
    Words {
        #[command(subcommand)]
        action: WordsCommand,
    },

    /// Show the active fusion config
    Config {
        #[arg(long)]
        json: bool,
    },

    /// Show system status (sources, models, audit log)
    Status,

    /// Download the ONNX text model and tokenizer
    DownloadModel,
}

#[derive(Subcommand)]
enum WordsCommand {
    /// Print every restricted word
    List,

    /// Add restricted words (saved to SIEVE_RESTRICTED_WORDS when set)
    Add {
        #[arg(required = true)]
        terms: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if missing)
    let _ = dotenvy::dotenv();

    // Set up structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("sieve=info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load()?;

    if let Commands::DownloadModel = cli.command {
        let model_dir = &config.model_dir;
        println!("Downloading ONNX text model...");
        println!("  Destination: {}", model_dir.display());

        sieve::signals::download::download_text_model(model_dir).await?;

        println!("\n{}", "Model downloaded successfully.".bold());
        println!("The text scorer will be used on the next `sieve check`.");
        return Ok(());
    }

    let engine = sieve::bootstrap::build_engine(&config).await?;
    apply_overrides(&engine, &cli)?;

    match cli.command {
        Commands::Check {
            text,
            image,
            user,
            json,
        } => {
            let image = match image {
                Some(path) => Some(read_image(&path).await?),
                None => None,
            };
            let submission = Submission {
                text,
                image,
                user_id: user,
            };
            let verdict = engine.check_content(&submission).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&verdict)?);
            } else {
                terminal::display_verdict(&verdict);
            }
        }

        Commands::Batch { input, json } => {
            let entries = read_batch(&input).await?;
            let total = entries.len();

            // Unreadable entries keep their position in the output
            let mut submissions = Vec::with_capacity(total);
            let mut slots = Vec::with_capacity(total);
            for entry in entries {
                match entry {
                    Ok(submission) => {
                        slots.push(Ok(submissions.len()));
                        submissions.push(submission);
                    }
                    Err(e) => slots.push(Err(e)),
                }
            }
            info!(count = total, unreadable = total - submissions.len(), "Checking batch");

            let mut verdicts = engine.check_batch(&submissions).await?.into_iter();
            let mut unsafe_count = 0;
            for (i, slot) in slots.into_iter().enumerate() {
                let result = match slot {
                    Ok(index) => match verdicts.next() {
                        Some(result) => result.map(|v| (index, v)).map_err(anyhow::Error::from),
                        None => Err(anyhow::anyhow!("No verdict returned")),
                    },
                    Err(e) => Err(e),
                };
                match result {
                    Ok((index, verdict)) => {
                        if verdict.is_unsafe() {
                            unsafe_count += 1;
                        }
                        if json {
                            println!("{}", serde_json::to_string(&verdict)?);
                        } else {
                            let preview = submissions[index]
                                .text
                                .as_deref()
                                .map(|t| truncate_chars(t, 50))
                                .unwrap_or_else(|| "[image]".to_string());
                            println!(
                                "  {:>3}. {:<6} {:<5} {}",
                                i + 1,
                                verdict.decision.as_str().to_uppercase(),
                                verdict.action.as_str().to_uppercase(),
                                preview.dimmed()
                            );
                        }
                    }
                    Err(e) => {
                        if json {
                            println!("{}", serde_json::json!({ "error": format!("{e:#}") }));
                        } else {
                            println!("  {:>3}. {} {:#}", i + 1, "ERROR".red(), e);
                        }
                    }
                }
            }
            if !json {
                println!("\n{} of {} submissions unsafe", unsafe_count, total);
            }
        }

        Commands::Stats { json } => {
            let stats = engine.get_statistics().await;
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                terminal::display_statistics(&stats);
            }
        }

        Commands::Words { action } => match action {
            WordsCommand::List => terminal::display_words(&engine.get_restricted_words()),
            WordsCommand::Add { terms } => {
                let added = engine.add_restricted_words(&terms);
                println!("Added {added} new restricted word(s).");
                if let Some(path) = &config.restricted_words_path {
                    let mut contents = engine.get_restricted_words().join("\n");
                    contents.push('\n');
                    tokio::fs::write(path, contents)
                        .await
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    println!("Saved to {}", path.display());
                } else {
                    println!(
                        "{}",
                        "SIEVE_RESTRICTED_WORDS not set: additions last for this run only."
                            .dimmed()
                    );
                }
            }
        },

        Commands::Config { json } => {
            let active = engine.get_config();
            if json {
                println!("{}", serde_json::to_string_pretty(&active)?);
            } else {
                terminal::display_config(&active);
            }
        }

        Commands::Status => sieve::status::show(&engine, &config).await,

        Commands::DownloadModel => {}
    }

    Ok(())
}

/// Apply per-invocation threshold and auto-block flags.
fn apply_overrides(engine: &DecisionFusionEngine, cli: &Cli) -> Result<()> {
    let update = FusionConfigUpdate {
        text_threshold: cli.text_threshold,
        image_threshold: cli.image_threshold,
        auto_block: cli.no_auto_block.then_some(false),
        log_violations: None,
    };
    if !update.is_empty() {
        engine.update_config(&update)?;
    }
    Ok(())
}

async fn read_image(path: &Path) -> Result<Vec<u8>> {
    tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read image {}", path.display()))
}

/// Read a batch file (or stdin for `-`) into per-line entries.
async fn read_batch(input: &str) -> Result<Vec<Result<Submission>>> {
    let contents = if input == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read batch from stdin")?;
        buf
    } else {
        tokio::fs::read_to_string(input)
            .await
            .with_context(|| format!("Failed to read batch file {input}"))?
    };

    let entries = sieve::batch::parse_entries(&contents).await;
    if entries.len() > MAX_BATCH_SIZE {
        anyhow::bail!(
            "Batch has {} entries; split it into chunks of at most {MAX_BATCH_SIZE}",
            entries.len()
        );
    }
    Ok(entries)
}
