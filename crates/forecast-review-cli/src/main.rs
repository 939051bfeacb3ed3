mod display;
mod logging;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use forecast_review_core::config::{resolve_config, NarrativeConfig};
use forecast_review_core::{
    ForecastReview, Narrator, PipelineError, ReviewPipeline, ReviewRequest, ValidationReport,
};
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(
    name = "forecast-review",
    version,
    about = "Forecast Review - budget variance and purchase order analysis",
    long_about = "Review project forecasts against actuals and purchase orders.\n\nFlags variances, budget alerts and unusually large orders, proposes forecast scenarios and explains the findings."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Review one request file or every request in a directory
    Review {
        /// Path to a JSON/YAML request or a directory of requests
        path: PathBuf,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,

        /// Config file (defaults to .forecast-review/config.toml when present)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Use the template explanation instead of the narrative service
        #[arg(long)]
        offline: bool,
    },

    /// Check that the narrative service is reachable and has the model
    Health {
        /// Config file (defaults to .forecast-review/config.toml when present)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    logging::init();
    let cli = Cli::parse();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    match cli.command {
        Commands::Review {
            path,
            format,
            config,
            offline,
        } => {
            let rejected = runtime.block_on(cmd_review(&path, &format, config.as_deref(), offline))?;
            if rejected > 0 {
                std::process::exit(1);
            }
            Ok(())
        }
        Commands::Health { config } => {
            let healthy = runtime.block_on(cmd_health(config.as_deref()))?;
            if !healthy {
                std::process::exit(1);
            }
            Ok(())
        }
    }
}

fn discover_request_files(path: &Path) -> Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }

    if path.is_dir() {
        let mut files = Vec::new();
        for ext in ["json", "yaml", "yml"] {
            let pattern = format!("{}/**/*.{}", path.display(), ext);
            files.extend(
                glob::glob(&pattern)
                    .context("Failed to read glob pattern")?
                    .filter_map(|r| r.ok()),
            );
        }
        files.sort();
        return Ok(files);
    }

    anyhow::bail!("Path '{}' does not exist", path.display());
}

/// Decode a request file. Malformed content becomes a structured rejection
/// rather than an I/O error.
fn load_request(path: &Path) -> Result<Result<ReviewRequest, ValidationReport>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let is_json = path.extension().and_then(|e| e.to_str()) == Some("json");
    let decoded = if is_json {
        serde_json::from_str(&content).map_err(ValidationReport::decode)
    } else {
        serde_yaml::from_str(&content).map_err(ValidationReport::decode)
    };
    Ok(decoded)
}

/// One line of `--format json` output. Completed reviews already carry
/// `status: "completed"`.
#[derive(Serialize)]
#[serde(untagged)]
enum JsonOutcome<'a> {
    Completed {
        file: String,
        #[serde(flatten)]
        review: &'a ForecastReview,
    },
    Rejected {
        file: String,
        status: &'static str,
        #[serde(flatten)]
        report: &'a ValidationReport,
    },
}

async fn cmd_review(path: &Path, format: &str, config: Option<&Path>, offline: bool) -> Result<usize> {
    let files = discover_request_files(path)?;
    if files.is_empty() {
        anyhow::bail!(
            "No request files found at '{}'. \
            Make sure the path points to a JSON/YAML request or a directory of them.",
            path.display()
        );
    }

    let mut review_config = resolve_config(config)?;
    if offline {
        review_config.narrative = NarrativeConfig::template();
    }
    let pipeline = ReviewPipeline::new(review_config)?;

    let mut rejected = 0;
    for file in &files {
        let label = file.display().to_string();
        tracing::info!(file = %label, "reviewing request");

        let outcome = match load_request(file)? {
            Ok(request) => pipeline.run(request).await,
            Err(report) => Err(PipelineError::Rejected(report)),
        };

        match outcome {
            Ok(review) => match format {
                "json" => {
                    let json = serde_json::to_string_pretty(&JsonOutcome::Completed {
                        file: label,
                        review: &review,
                    })?;
                    println!("{}", json);
                }
                _ => display::print_review(&label, &review, pipeline.thresholds()),
            },
            Err(PipelineError::Rejected(report)) => {
                rejected += 1;
                match format {
                    "json" => {
                        let json = serde_json::to_string_pretty(&JsonOutcome::Rejected {
                            file: label,
                            status: "rejected",
                            report: &report,
                        })?;
                        println!("{}", json);
                    }
                    _ => display::print_rejection(&label, &report),
                }
            }
            Err(err) => {
                return Err(err).with_context(|| format!("Review of {} aborted", label));
            }
        }
    }

    if files.len() > 1 && format != "json" {
        display::print_batch_summary(files.len(), rejected);
    }
    Ok(rejected)
}

async fn cmd_health(config: Option<&Path>) -> Result<bool> {
    let review_config = resolve_config(config)?;
    let narrator = Narrator::new(review_config.narrative)?;
    let health = narrator.check_health().await;
    display::print_health(&health);
    Ok(health.reachable)
}
