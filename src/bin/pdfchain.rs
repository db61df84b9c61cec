//! CLI binary for pdfchain.
//!
//! Maps flags and environment variables onto `PipelineConfig`, runs one job
//! and prints a summary.

use anyhow::{bail, Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use pdfchain::pipeline::catalog::choices;
use pdfchain::{
    Artifact, ArtifactType, Database, Job, JobProgressCallback, JobRequest, JobStatus,
    MemoryDatabase, OperationChoice, Orchestrator, PipelineConfig, PipelineState, PresetSelector,
    ProgressCallback, Provider, ReqwestTransport,
};
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Spinner whose prefix follows the job state, with one line per artifact.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Preparing");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl JobProgressCallback for CliProgressCallback {
    fn on_state_change(&self, _job_id: Uuid, _from: PipelineState, to: PipelineState) {
        let (prefix, msg) = match to {
            s if s.is_terminal() => ("Finishing", "saving results…"),
            PipelineState::Stage1Uploading => ("Stage 1", "uploading to pdf.co…"),
            PipelineState::Stage1Processing => ("Stage 1", "processing…"),
            PipelineState::Stage1Downloaded => ("Stage 1", "downloaded"),
            PipelineState::Stage2Uploading => ("Stage 2", "uploading to convertapi…"),
            PipelineState::Stage2Processing => ("Stage 2", "processing…"),
            PipelineState::Stage2Downloaded => ("Stage 2", "downloaded"),
            _ => ("Preparing", ""),
        };
        self.bar.set_prefix(prefix);
        self.bar.set_message(msg);
    }

    fn on_artifact_saved(&self, step: u8, artifact: &Artifact) {
        self.bar.println(format!(
            "  {} step {}  {}  {}",
            green("✓"),
            step,
            artifact.path.display(),
            dim(&format!("{} bytes", artifact.size_bytes)),
        ));
    }

    fn on_job_finished(&self, job: &Job) {
        self.bar.finish_and_clear();
        match job.status {
            JobStatus::Completed => eprintln!(
                "{} {} completed: {}",
                green("✔"),
                bold(&job.filename),
                job.operations_summary()
            ),
            _ => eprintln!(
                "{} {} failed: {}",
                red("✘"),
                bold(&job.filename),
                red(job.error.as_deref().unwrap_or("unknown error"))
            ),
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert every page to JPG
  pdfchain report.pdf --stage1 convert-to-image

  # JPG pages, then PNG through ConvertAPI
  pdfchain report.pdf --stage1 convert-to-image --stage2 convert-to-png

  # Optimize, then watermark
  pdfchain contract.pdf --stage1 optimize --stage2 watermark --watermark-text DRAFT

  # Show which operations each stage offers
  pdfchain --list-operations

OUTPUT:
  Files are written to <output-dir>/<name>_step<N>_<index>.<ext>
  (default output dir: output/<name>).

ENVIRONMENT VARIABLES:
  PDFCO_API_KEY       PDF.co API key (stage 1)
  CONVERTAPI_TOKEN    ConvertAPI bearer token (stage 2)
  DATABASE_URL        PostgreSQL URL (requires the `postgres` feature)
  EXTERNAL_API_URL    Completion webhook URL
  EXTERNAL_API_KEY    Completion webhook bearer token
"#;

#[derive(Parser, Debug)]
#[command(
    name = "pdfchain",
    version,
    about = "Run a PDF through PDF.co and ConvertAPI and record the results",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[arg(required_unless_present = "list_operations")]
    input: Option<PathBuf>,

    /// Stage 1 operation (PDF.co)
    #[arg(long, env = "PDFCHAIN_STAGE1")]
    stage1: Option<OperationChoice>,

    /// Stage 2 operation (ConvertAPI); runs the second stage when set
    #[arg(long, env = "PDFCHAIN_STAGE2")]
    stage2: Option<OperationChoice>,

    #[arg(short, long, env = "PDFCHAIN_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    #[arg(long, env = "PDFCHAIN_OUTPUT_ROOT", default_value = "output")]
    output_root: PathBuf,

    #[arg(long, env = "PDFCO_API_KEY", hide_env_values = true)]
    pdfco_key: Option<String>,

    #[arg(long, env = "PDFCO_BASE_URL", default_value = pdfchain::config::DEFAULT_PDFCO_URL)]
    pdfco_url: String,

    #[arg(long, env = "CONVERTAPI_TOKEN", hide_env_values = true)]
    convertapi_token: Option<String>,

    #[arg(long, env = "CONVERTAPI_BASE_URL", default_value = pdfchain::config::DEFAULT_CONVERTAPI_URL)]
    convertapi_url: String,

    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    database_url: Option<String>,

    #[arg(long, env = "EXTERNAL_API_URL")]
    webhook_url: Option<String>,

    #[arg(long, env = "EXTERNAL_API_KEY", hide_env_values = true)]
    webhook_token: Option<String>,

    #[arg(long, env = "PDFCHAIN_ATTEMPTS", default_value_t = 3)]
    attempts: u32,

    #[arg(long, env = "PDFCHAIN_RETRY_DELAY_MS", default_value_t = 2000)]
    retry_delay_ms: u64,

    #[arg(long, default_value = "CONFIDENTIAL")]
    watermark_text: String,

    #[arg(long, default_value_t = 90)]
    rotate_degrees: u16,

    #[arg(long, default_value_t = 75,
          value_parser = clap::value_parser!(u8).range(1..=100))]
    image_quality: u8,

    #[arg(long)]
    list_operations: bool,

    #[arg(long)]
    json: bool,

    #[arg(short, long)]
    verbose: bool,

    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let show_progress = !cli.quiet && !cli.json && !cli.verbose;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    if cli.list_operations {
        print_operations();
        return Ok(ExitCode::SUCCESS);
    }
    let Some(input) = cli.input.clone() else {
        bail!("an input PDF is required");
    };
    if cli.stage1.is_none() {
        bail!("--stage1 is required; see --list-operations");
    }

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn JobProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;

    let database = open_database(&cli)?;
    let orchestrator = Orchestrator::new(
        config,
        Arc::new(ReqwestTransport::new().context("Failed to create HTTP client")?),
        database,
        Arc::new(PresetSelector::new(cli.stage1, cli.stage2)),
    );
    if let Err(e) = orchestrator.init_store().await {
        warn!("Result store initialisation failed: {e}");
    }

    // ── Run ──────────────────────────────────────────────────────────────
    let mut request = JobRequest::new(input).second_stage(cli.stage2.is_some());
    if let Some(ref dir) = cli.output_dir {
        request = request.output_dir(dir);
    }
    let outcome = orchestrator.run(&request).await.context("Job rejected")?;

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&outcome).context("Failed to serialise outcome")?
        );
    } else if !cli.quiet {
        if !show_progress {
            eprintln!(
                "{} {}: {}",
                if outcome.is_completed() { green("✔") } else { red("✘") },
                outcome.job.filename,
                outcome.job.status.as_str()
            );
            if let Some(ref err) = outcome.job.error {
                eprintln!("   {}", red(err));
            }
        }
        eprintln!(
            "   {} artifacts  {} bytes  {:.1}s  →  {}",
            outcome.artifact_count(),
            outcome.total_size_bytes(),
            outcome.elapsed_ms as f64 / 1000.0,
            bold(&outcome.job.output_dir.display().to_string()),
        );
        match outcome.record_id {
            Some(id) => eprintln!("   {}", dim(&format!("recorded as job #{id}"))),
            None => eprintln!("   {}", cyan("⚠ job was not recorded in the database")),
        }
    }

    Ok(if outcome.is_completed() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn build_config(cli: &Cli, progress_cb: Option<ProgressCallback>) -> Result<PipelineConfig> {
    let mut builder = PipelineConfig::builder()
        .pdfco(&cli.pdfco_url, cli.pdfco_key.clone().unwrap_or_default())
        .convertapi(&cli.convertapi_url, cli.convertapi_token.clone().unwrap_or_default())
        .output_root(&cli.output_root)
        .max_attempts(cli.attempts)
        .retry_delay_ms(cli.retry_delay_ms)
        .watermark_text(&cli.watermark_text)
        .rotate_degrees(cli.rotate_degrees)
        .image_quality(cli.image_quality);

    if let Some(ref url) = cli.webhook_url {
        builder = builder.webhook(url, cli.webhook_token.clone());
    }
    if let Some(cb) = progress_cb {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

#[cfg(feature = "postgres")]
fn open_database(cli: &Cli) -> Result<Arc<dyn Database>> {
    match cli.database_url {
        Some(ref url) => Ok(Arc::new(pdfchain::PgDatabase::new(url))),
        None => {
            warn!("DATABASE_URL not set; results are kept in memory only");
            Ok(Arc::new(MemoryDatabase::new()))
        }
    }
}

#[cfg(not(feature = "postgres"))]
fn open_database(cli: &Cli) -> Result<Arc<dyn Database>> {
    if cli.database_url.is_some() {
        warn!("DATABASE_URL ignored: built without the `postgres` feature");
    }
    Ok(Arc::new(MemoryDatabase::new()))
}

fn print_operations() {
    for (step, provider) in [(1, Provider::PdfCo), (2, Provider::ConvertApi)] {
        println!("{}", bold(&format!("Stage {step} ({provider})")));
        for input in [ArtifactType::Pdf, ArtifactType::Image, ArtifactType::Docx] {
            let offered = choices(provider, input);
            if offered.is_empty() {
                continue;
            }
            println!("  {} input:", input);
            for choice in offered {
                println!("    {:<18} {}", choice.id(), dim(choice.label()));
            }
        }
    }
}
