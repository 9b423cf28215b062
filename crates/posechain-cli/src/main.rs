//! posechain - pose animation pipeline CLI
//!
//! Usage:
//!   posechain run --image cat.png --breed tabby --color orange --species cat
//!   posechain status <task_id>
//!   posechain list [--status failed] [--page 2]
//!   posechain delete <task_id>

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use posechain_core::app::{PipelineBuilder, PipelineRequest};
use posechain_core::config::{Settings, StoreKind};
use posechain_core::domain::{PetProfile, TaskId, TaskStatus};
use posechain_core::impls::{
    FileTaskStore, InMemoryTaskStore, SimulatedGenerationClient, SimulatedMediaToolkit,
};
use posechain_core::observability::TaskCounts;
use posechain_core::ports::{TaskQuery, TaskStore};
use tracing_subscriber::EnvFilter;

const WATCH_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Parser)]
#[command(name = "posechain", version, about = "Generate pose animations from one image")]
struct Cli {
    /// TOML config file. Defaults apply when it is missing.
    #[arg(long, global = true, default_value = "posechain.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the whole pipeline for one source image
    Run {
        #[arg(long)]
        image: PathBuf,
        #[arg(long)]
        breed: String,
        #[arg(long)]
        color: String,
        #[arg(long)]
        species: String,
        /// Reuse (and reset) an existing task id
        #[arg(long)]
        task_id: Option<String>,
        /// The image already has a transparent background
        #[arg(long)]
        skip_background: bool,
    },
    /// Show one task record
    Status { task_id: String },
    /// List task records, newest first
    List {
        #[arg(long)]
        status: Option<TaskStatus>,
        #[arg(long, default_value_t = 1)]
        page: usize,
        #[arg(long, default_value_t = 20)]
        page_size: usize,
    },
    /// Delete a task record
    Delete { task_id: String },
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

async fn open_store(settings: &Settings) -> Result<Arc<dyn TaskStore>> {
    match settings.store.kind {
        StoreKind::Memory => {
            tracing::debug!("using in-memory task store");
            Ok(Arc::new(InMemoryTaskStore::new()))
        }
        StoreKind::File => {
            let path = &settings.store.path;
            let store = FileTaskStore::open(path)
                .await
                .with_context(|| format!("Failed to open task store {}", path.display()))?;
            Ok(Arc::new(store))
        }
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let settings = Settings::load(Some(cli.config.as_path()))
        .with_context(|| format!("Failed to load config {}", cli.config.display()))?;
    let store = open_store(&settings).await?;

    match cli.command {
        Commands::Run {
            image,
            breed,
            color,
            species,
            task_id,
            skip_background,
        } => {
            let request = PipelineRequest {
                source_image: image,
                profile: PetProfile::new(breed, color, species),
                skip_background_removal: skip_background,
            };
            cmd_run(&settings, store, task_id, request).await
        }
        Commands::Status { task_id } => {
            let id = TaskId::new(task_id);
            match store.get(&id).await? {
                Some(record) => print_json(&record),
                None => bail!("task {id} not found"),
            }
        }
        Commands::List {
            status,
            page,
            page_size,
        } => {
            if settings.store.kind == StoreKind::Memory {
                tracing::warn!("in-memory store starts empty; set [store] kind = \"file\"");
            }
            let mut query = TaskQuery::default().page(page, page_size);
            if let Some(status) = status {
                query = query.with_status(status);
            }
            let listing = store.list(&query).await?;
            let counts = TaskCounts::collect(store.as_ref()).await?;
            print_json(&serde_json::json!({
                "page": page,
                "total": listing.total,
                "counts": counts,
                "items": listing.items,
            }))
        }
        Commands::Delete { task_id } => {
            let id = TaskId::new(task_id);
            if !store.delete(&id).await? {
                bail!("task {id} not found");
            }
            println!("deleted {id}");
            Ok(())
        }
    }
}

async fn cmd_run(
    settings: &Settings,
    store: Arc<dyn TaskStore>,
    task_id: Option<String>,
    request: PipelineRequest,
) -> Result<()> {
    let pipeline = PipelineBuilder::new()
        .store(Arc::clone(&store))
        .generation(Arc::new(SimulatedGenerationClient::new(
            settings.simulation.clone(),
        )))
        .media(Arc::new(SimulatedMediaToolkit::new()))
        .config(settings.to_pipeline_config())
        .build()
        .context("Failed to build pipeline")?;
    let pipeline = Arc::new(pipeline);

    let id = match task_id {
        Some(raw) => TaskId::new(raw),
        None => pipeline.new_task_id(),
    };
    println!("task: {id}");

    let handle = pipeline.spawn(id.clone(), request);
    let mut last_seen = None;
    while !handle.is_finished() {
        tokio::time::sleep(WATCH_INTERVAL).await;
        if let Some(record) = store.get(&id).await? {
            let seen = (record.progress, record.message.clone());
            if last_seen.as_ref() != Some(&seen) {
                println!("[{:>3}%] {}", record.progress, record.message);
                last_seen = Some(seen);
            }
        }
    }

    let outcome = handle.await.context("Pipeline task panicked")?;
    let record = store
        .get(&id)
        .await?
        .with_context(|| format!("task {id} vanished from the store"))?;
    print_json(&record)?;
    outcome
        .map(|_| ())
        .with_context(|| format!("task {id} failed"))
}
