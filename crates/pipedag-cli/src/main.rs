use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use pipedag_core::{PipelineDocument, RunType, StepId, derive_connections};
use pipedag_editor::EditorSettings;
use pipedag_events::{EditorEvent, EventBus};
use pipedag_graph::{AutoLayouter, validate_pipeline};
use pipedag_sync::{
    HttpPipelineApi, PersistenceBridge, PipelineApi, PipelineRef, RunTarget, SaveScheduler,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

const POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Parser, Debug)]
#[command(author, version, about = "Inspect, lay out and run pipeline definitions")]
struct Args {
    /// Settings file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Backend base URL, overrides the settings file
    #[arg(long, global = true)]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check a pipeline file for cycles, dangling connections and missing kernels
    Validate { file: PathBuf },
    /// Arrange steps left to right by dependency depth
    Layout {
        file: PathBuf,
        /// Write the result back instead of printing it
        #[arg(long)]
        write: bool,
    },
    /// List the connections derived from the steps' inputs
    Connections { file: PathBuf },
    /// Download a pipeline definition
    Fetch {
        #[command(flatten)]
        target: Target,
    },
    /// Replace the stored pipeline definition with a local file
    Push {
        file: PathBuf,
        #[command(flatten)]
        target: Target,
    },
    /// Start an interactive run of the given steps
    Run {
        #[command(flatten)]
        target: Target,
        #[arg(long, required = true, num_args = 1..)]
        steps: Vec<StepId>,
        /// Also run everything upstream of the steps
        #[arg(long)]
        incoming: bool,
        /// Poll until the run finishes
        #[arg(long)]
        wait: bool,
    },
    /// Cancel an interactive run, or a job run with --job
    Cancel {
        #[arg(long)]
        run: String,
        #[arg(long)]
        job: Option<String>,
    },
}

#[derive(clap::Args, Debug)]
struct Target {
    #[arg(long)]
    project: String,
    #[arg(long)]
    pipeline: String,
    #[arg(long, requires = "run")]
    job: Option<String>,
    #[arg(long)]
    run: Option<String>,
}

impl Target {
    fn pipeline_ref(&self) -> PipelineRef {
        let pipeline = PipelineRef::new(&self.project, &self.pipeline);
        match (&self.job, &self.run) {
            (Some(job), Some(run)) => pipeline.with_job(job, run),
            _ => pipeline,
        }
    }
}

fn load_settings(args: &Args) -> Result<EditorSettings> {
    let mut settings = match &args.config {
        Some(path) => EditorSettings::load_from(path)
            .with_context(|| format!("reading settings {}", path.display()))?,
        None => EditorSettings::load(),
    };
    if let Some(base_url) = &args.base_url {
        settings.sync.base_url = base_url.clone();
    }
    Ok(settings)
}

fn read_document(path: &Path) -> Result<PipelineDocument> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    PipelineDocument::from_json(&raw).with_context(|| format!("parsing {}", path.display()))
}

fn http_api(settings: &EditorSettings) -> Result<Arc<HttpPipelineApi>> {
    let api = HttpPipelineApi::new(&settings.sync.base_url, settings.sync.request_timeout())?;
    Ok(Arc::new(api))
}

fn report_events(events: &EventBus) {
    for event in events.drain() {
        match event {
            EditorEvent::ShowError { title, message } => eprintln!("{title}: {message}"),
            EditorEvent::ShowWarning { message } => eprintln!("Warning: {message}"),
            EditorEvent::ShowInfo { title, message } => eprintln!("{title}: {message}"),
            EditorEvent::NavigateToJob { job_uuid, .. } => eprintln!("See job {job_uuid}"),
            EditorEvent::RunStatusChanged { run_uuid, status } => {
                eprintln!("Run {run_uuid}: {status}")
            }
            EditorEvent::RunFinished { run_uuid, status } => {
                eprintln!("Run {run_uuid} finished: {status}")
            }
            _ => {}
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();
    let settings = load_settings(&args)?;

    match &args.command {
        Command::Validate { file } => {
            let document = read_document(file)?;
            match validate_pipeline(&document).first_error() {
                Some(err) => bail!("{err}"),
                None => println!("valid"),
            }
        }
        Command::Layout { file, write } => {
            let mut document = read_document(file)?;
            let moved = AutoLayouter::new(settings.layout_config()).apply(&mut document.steps);
            info!(moved, "Layout applied");
            let output = document.to_json_pretty()?;
            if *write {
                std::fs::write(file, output)
                    .with_context(|| format!("writing {}", file.display()))?;
                println!("Moved {moved} steps");
            } else {
                println!("{output}");
            }
        }
        Command::Connections { file } => {
            let document = read_document(file)?;
            for connection in derive_connections(&document.steps) {
                if let Some(key) = connection.key() {
                    println!("{key}");
                }
            }
        }
        Command::Fetch { target } => {
            let events = EventBus::new();
            let bridge = PersistenceBridge::new(target.pipeline_ref(), http_api(&settings)?, events.clone());
            let result = bridge.load().await;
            report_events(&events);
            println!("{}", result?.to_json_pretty()?);
        }
        Command::Push { file, target } => {
            let document = read_document(file)?;
            let events = EventBus::new();
            let bridge = PersistenceBridge::new(target.pipeline_ref(), http_api(&settings)?, events.clone());
            let result = bridge.save(&document).await;
            report_events(&events);
            result?;
            println!("Saved {} steps", document.steps.len());
        }
        Command::Run {
            target,
            steps,
            incoming,
            wait,
        } => {
            let api = http_api(&settings)?;
            let events = EventBus::new();
            let bridge = PersistenceBridge::new(target.pipeline_ref(), api.clone(), events.clone());
            let document = bridge.load().await?;
            let run_type = if *incoming {
                RunType::Incoming
            } else {
                RunType::Selection
            };

            let mut scheduler = SaveScheduler::new(0);
            let result = bridge
                .run_steps(&*api, &mut scheduler, 0, steps.clone(), run_type, &document)
                .await;
            report_events(&events);
            let run_uuid = result?;
            println!("{run_uuid}");

            while *wait && bridge.is_running() {
                tokio::time::sleep(POLL_INTERVAL).await;
                bridge.refresh_run_status().await?;
                report_events(&events);
            }
        }
        Command::Cancel { run, job } => {
            let target = match job {
                Some(job_uuid) => RunTarget::Job {
                    job_uuid: job_uuid.clone(),
                    run_uuid: run.clone(),
                },
                None => RunTarget::Interactive {
                    run_uuid: run.clone(),
                },
            };
            http_api(&settings)?.cancel_run(&target).await?;
            println!("Cancelled {run}");
        }
    }

    Ok(())
}
