mod db;
mod document;
mod error;
mod kb;
mod llm;
mod model;
mod pipeline;
mod publish;
mod settings;
mod slug;
#[cfg(test)]
mod testing;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use rusqlite::Connection;
use tracing::{error, info, warn};

use document::{Assembler, PandocConverter};
use error::PipelineError;
use kb::KnowledgeBase;
use llm::GeminiClient;
use model::{ElementType, GenerationOutcome, MappedComponent, PageDescription};
use pipeline::Pipeline;
use publish::DrivePublisher;
use settings::Settings;

#[derive(Parser)]
#[command(name = "blockdoc", about = "Turn UI screenshots into block documents")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the block catalog
    Blocks {
        /// Only blocks of this element type (global, page-building)
        #[arg(short, long)]
        element: Option<ElementType>,
    },
    /// Describe a screenshot as a list of detected components
    Analyze {
        image: PathBuf,
        /// Write the JSON here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Join an analysis result against the block catalog
    Map {
        /// JSON written by `analyze`
        page: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Render, convert and publish documents for an analyzed screenshot
    Generate {
        image: PathBuf,
        /// JSON written by `analyze`
        #[arg(long)]
        page: PathBuf,
        /// JSON written by `map` (mapped on the fly when absent)
        #[arg(long)]
        mapped: Option<PathBuf>,
    },
    /// Analyze + map + generate in one go
    Run { image: PathBuf },
    /// Show recent runs
    History {
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let settings = Settings::load()?;

    let result = dispatch(cli.command, &settings).await;

    if let Err(e) = &result {
        if let Some(pe) = e.downcast_ref::<PipelineError>() {
            error!(kind = pe.kind(), status = pe.status_code(), "{}", pe);
        }
    }

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

async fn dispatch(command: Commands, settings: &Settings) -> anyhow::Result<()> {
    match command {
        Commands::Blocks { element } => {
            let kb = KnowledgeBase::load(&settings.kb_path)?;
            if kb.is_empty() {
                println!("No blocks in {}.", settings.kb_path.display());
                return Ok(());
            }
            let listing = kb.describe(element);
            match element {
                Some(e) if listing.is_empty() => println!("No {} blocks.", e),
                _ => println!("{}", listing),
            }
            Ok(())
        }
        Commands::Analyze { image, output } => {
            let pipeline = build_pipeline(settings)?;
            let page = pipeline.analyze(&image).await?;
            emit_json(&page, output.as_deref())
        }
        Commands::Map { page, output } => {
            let kb = KnowledgeBase::load(&settings.kb_path)?;
            let page: PageDescription = read_json(&page)?;
            let report = pipeline::mapper::map_components(&page, &kb);
            if !report.skipped.is_empty() {
                warn!("no block definition for: {}", report.skipped.join(", "));
            }
            emit_json(&report.components, output.as_deref())
        }
        Commands::Generate {
            image,
            page,
            mapped,
        } => {
            let pipeline = build_pipeline(settings)?;
            let page: PageDescription = read_json(&page)?;
            let (mapped, skipped) = match mapped {
                Some(path) => (read_json::<Vec<MappedComponent>>(&path)?, 0),
                None => {
                    let report = pipeline.map(&page);
                    (report.components, report.skipped.len())
                }
            };
            let conn = db::connect(&settings.db_path)?;
            let run_id = db::new_run_id();
            db::start_run(&conn, &run_id, "generate", &image)?;
            let out_dir = settings.run_output_dir(&run_id);

            let result = pipeline.generate(&page, &mapped, &image, &out_dir).await;
            let outcome = record(
                &conn,
                &run_id,
                result.map(|outcome| RunReport {
                    page_title: page.page_title.clone(),
                    mapped: mapped.len(),
                    skipped,
                    outcome,
                }),
            )?;
            print_outcome(&outcome);
            Ok(())
        }
        Commands::Run { image } => {
            let pipeline = build_pipeline(settings)?;
            let conn = db::connect(&settings.db_path)?;
            let run_id = db::new_run_id();
            db::start_run(&conn, &run_id, "run", &image)?;
            let out_dir = settings.run_output_dir(&run_id);
            info!("run {} → {}", run_id, out_dir.display());

            let pb = ProgressBar::new_spinner();
            pb.set_style(
                ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")?,
            );
            pb.enable_steady_tick(std::time::Duration::from_millis(120));

            let result = run_stages(&pipeline, &image, &out_dir, &pb).await;
            pb.finish_and_clear();

            let outcome = record(&conn, &run_id, result)?;
            print_outcome(&outcome);
            Ok(())
        }
        Commands::History { limit } => {
            let conn = db::connect(&settings.db_path)?;
            let rows = db::fetch_history(&conn, limit)?;
            if rows.is_empty() {
                println!("No runs recorded yet.");
                return Ok(());
            }

            println!(
                "{:<32} | {:<19} | {:<8} | {:<20} | {:<20} | {:<7} | {:>4} | {}",
                "Run", "Started", "Command", "Image", "Title", "Status", "Docs", "Link"
            );
            println!("{}", "-".repeat(142));
            for r in &rows {
                let status = match &r.error_kind {
                    Some(kind) if r.status == "failed" => format!("{}:{}", r.status, kind),
                    _ => r.status.clone(),
                };
                println!(
                    "{:<32} | {:<19} | {:<8} | {:<20} | {:<20} | {:<7} | {:>4} | {}",
                    r.run_id,
                    r.started_at,
                    r.command,
                    truncate(&r.image, 20),
                    truncate(r.page_title.as_deref().unwrap_or("-"), 20),
                    status,
                    r.artifacts,
                    r.link.as_deref().unwrap_or("-"),
                );
            }
            println!("\n{} runs", rows.len());
            Ok(())
        }
    }
}

struct RunReport {
    page_title: Option<String>,
    mapped: usize,
    skipped: usize,
    outcome: GenerationOutcome,
}

async fn run_stages(
    pipeline: &Pipeline,
    image: &Path,
    out_dir: &Path,
    pb: &ProgressBar,
) -> Result<RunReport, PipelineError> {
    pb.set_message(format!("analyzing {}", image.display()));
    let page = pipeline.analyze(image).await?;

    pb.set_message("mapping components");
    let report = pipeline.map(&page);
    if !report.skipped.is_empty() {
        pb.suspend(|| warn!("no block definition for: {}", report.skipped.join(", ")));
    }

    pb.set_message(format!("generating {} components", report.components.len()));
    let outcome = pipeline
        .generate(&page, &report.components, image, out_dir)
        .await?;

    Ok(RunReport {
        page_title: page.page_title,
        mapped: report.components.len(),
        skipped: report.skipped.len(),
        outcome,
    })
}

/// Write the run's result to the ledger and pass it through.
fn record(
    conn: &Connection,
    run_id: &str,
    result: Result<RunReport, PipelineError>,
) -> anyhow::Result<GenerationOutcome> {
    match result {
        Ok(report) => {
            let outcome = report.outcome;
            db::save_artifacts(conn, run_id, ElementType::Global.as_str(), &outcome.globals)?;
            db::save_artifacts(conn, run_id, "page", &outcome.pages)?;
            db::finish_run(
                conn,
                run_id,
                &db::RunSummary {
                    page_title: report.page_title.as_deref(),
                    mapped: report.mapped,
                    skipped: report.skipped,
                    link: outcome.link.as_deref(),
                },
            )?;
            Ok(outcome)
        }
        Err(e) => {
            db::fail_run(conn, run_id, e.kind(), &e.to_string())?;
            Err(e.into())
        }
    }
}

fn build_pipeline(settings: &Settings) -> anyhow::Result<Pipeline> {
    let api_key = settings.require_api_key()?.to_string();
    let kb = KnowledgeBase::load(&settings.kb_path)?;
    let client = reqwest::Client::builder()
        .timeout(settings.request_timeout())
        .build()
        .context("building HTTP client")?;

    let model = GeminiClient::new(
        client.clone(),
        &settings.gemini_api_base,
        api_key,
        settings.gemini_model.clone(),
    );
    let assembler = Assembler::new(Arc::new(PandocConverter::new(settings.pandoc_bin.clone())));
    let pipeline = Pipeline::new(Arc::new(kb), Arc::new(model), assembler);

    match &settings.drive_key_file {
        Some(path) => {
            let publisher = DrivePublisher::from_key_file(client, path)?;
            Ok(pipeline.with_publisher(Arc::new(publisher), settings.drive_folder_id.clone()))
        }
        None => {
            warn!("no drive_key_file configured, documents will stay local");
            Ok(pipeline)
        }
    }
}

fn print_outcome(outcome: &GenerationOutcome) {
    for doc in &outcome.globals {
        println!(
            "Global block {:<16} {} ({} bytes html)",
            doc.title,
            doc.document_path.display(),
            doc.html_content.len()
        );
    }
    for doc in &outcome.pages {
        println!(
            "Page {:<24} {} ({} bytes html)",
            doc.title,
            doc.document_path.display(),
            doc.html_content.len()
        );
    }
    for name in &outcome.blank_renders {
        println!("Skipped blank render: {}", name);
    }
    match &outcome.link {
        Some(link) => println!("\nPublished: {}", link),
        None => println!("\nNothing published."),
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let text = std::fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
    let value = serde_json::from_str(&text).map_err(|e| {
        PipelineError::Validation(format!("{} is not valid input: {}", path.display(), e))
    })?;
    Ok(value)
}

fn emit_json<T: serde::Serialize>(value: &T, output: Option<&Path>) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    match output {
        Some(path) => {
            std::fs::write(path, json + "\n").map_err(|e| PipelineError::io(path, e))?;
            println!("Wrote {}", path.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

// ── Tests ──
