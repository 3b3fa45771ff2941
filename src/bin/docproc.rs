//! CLI binary for workshop-docproc.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ClientConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use workshop_docproc::retrieve::{clean_filename, write_artifact};
use workshop_docproc::{
    fetch_result, health, poll_document, process_file_with_cancel, ClientConfig, DocProcError,
    DocumentId, FetchError, PollOutcome, ProcessingMode, ProcessingOptions, ProgressSnapshot,
    StatusCallback, StatusProgressCallback,
};

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

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

const TICKS: &[&str] = &[
    "⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿",
];

// ── CLI status callback using indicatif ──────────────────────────────────────

/// Terminal callback: a spinner while uploading, then a percentage bar with
/// the stage label and estimated time remaining.
struct CliStatusCallback {
    bar: ProgressBar,
    max_failures: u32,
    retries: AtomicU32,
}

impl CliStatusCallback {
    fn new(initial: &str, max_failures: u32) -> Arc<Self> {
        let bar = ProgressBar::new(100);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);
        bar.set_style(spinner_style);
        bar.set_prefix("Submitting");
        bar.set_message(initial.to_string());
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            max_failures,
            retries: AtomicU32::new(0),
        })
    }

    fn activate_bar(&self) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {pos:>3}%  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);
        self.bar.set_style(style);
        self.bar.set_prefix("Processing");
    }
}

impl StatusProgressCallback for CliStatusCallback {
    fn on_poll_start(&self, id: &str) {
        self.activate_bar();
        self.bar
            .println(format!("{} {}", cyan("◆"), bold(&format!("Document {id} accepted"))));
    }

    fn on_snapshot(&self, _id: &str, snapshot: &ProgressSnapshot) {
        self.bar.set_position(snapshot.percentage as u64);
        let eta = snapshot
            .estimated_remaining
            .map(|d| dim(&format!("  ~{}s left", d.as_secs())))
            .unwrap_or_default();
        self.bar.set_message(format!("{}{}", snapshot.stage.label(), eta));
    }

    fn on_retry(&self, _id: &str, failures: u32, delay: Duration, error: &FetchError) {
        self.retries.fetch_add(1, Ordering::SeqCst);
        self.bar.println(format!(
            "  {} status check failed ({}/{}): {}  {}",
            cyan("⚠"),
            failures,
            self.max_failures,
            error,
            dim(&format!("retrying in {:.0}s", delay.as_secs_f64())),
        ));
    }

    fn on_poll_end(&self, _id: &str, outcome: &str) {
        self.bar.finish_and_clear();
        match outcome {
            "complete" => eprintln!("{} Processing complete", green("✔")),
            "cancelled" => eprintln!("{} Cancelled", dim("■")),
            other => eprintln!("{} Processing stopped: {}", red("✘"), other),
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert a document, Markdown to stdout
  docproc report.pdf

  # Convert to a file (or into a directory, named after the upload)
  docproc slides.pptx -o slides.md
  docproc slides.pptx -o out/

  # Quality mode with OCR for scanned documents
  docproc --mode quality --ocr scan.pdf -o scan.md

  # Resume following a document that was already uploaded
  docproc --watch 3f2c9a7e-5b1d-4c1e-9a55-0d2e6f1b8c44 -o result.md

  # Check the processor is up
  docproc --health

LIMITS:
  Supported formats:  PDF, DOCX, PPTX, XLSX
  Maximum file size:  10 MB (override with --max-size-mb)

EXPECTED PROCESSING TIME:
  fast      ~30s       quality   ~90s       (OCR roughly doubles both)

ENVIRONMENT VARIABLES:
  DOCPROC_API_URL   Base URL of the processor API (e.g. http://localhost:8000)
  DOCPROC_API_KEY   Bearer token, if the deployment requires one
  RUST_LOG          Override log filtering (e.g. workshop_docproc=debug)

  A .env file in the working directory is loaded automatically.
"#;

/// Convert office documents to Markdown with the workshop document processor.
#[derive(Parser, Debug)]
#[command(
    name = "docproc",
    version,
    about = "Convert PDF, DOCX, PPTX and XLSX files to Markdown via the workshop document processor",
    long_about = "Upload a document to the workshop document processor, follow its conversion \
with a live progress bar, and save the resulting Markdown. Status polling backs off \
exponentially on network errors and gives up after a bounded number of consecutive failures.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local file to convert, or a document id with --watch.
    #[arg(required_unless_present = "health")]
    input: Option<String>,

    /// Write Markdown to this file (or into this directory) instead of stdout.
    #[arg(short, long, env = "DOCPROC_OUTPUT")]
    output: Option<PathBuf>,

    /// Run OCR on scanned pages.
    #[arg(long, env = "DOCPROC_OCR")]
    ocr: bool,

    /// Processing mode: fast or quality.
    #[arg(long, env = "DOCPROC_MODE", value_enum, default_value = "fast")]
    mode: ModeArg,

    /// Base URL of the processor API.
    #[arg(long, env = "DOCPROC_API_URL")]
    api_url: Option<String>,

    /// Bearer token for the processor API.
    #[arg(long, env = "DOCPROC_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Maximum upload size in megabytes.
    #[arg(long, env = "DOCPROC_MAX_SIZE_MB", default_value_t = 10)]
    max_size_mb: u64,

    /// Base status polling interval in milliseconds.
    #[arg(long, env = "DOCPROC_POLL_INTERVAL_MS", default_value_t = 2000,
          value_parser = clap::value_parser!(u64).range(100..))]
    poll_interval_ms: u64,

    /// Consecutive failed status checks before giving up.
    #[arg(long, env = "DOCPROC_MAX_POLL_FAILURES", default_value_t = 5,
          value_parser = clap::value_parser!(u32).range(1..))]
    max_poll_failures: u32,

    /// Per-request timeout in seconds.
    #[arg(long, env = "DOCPROC_REQUEST_TIMEOUT", default_value_t = 30)]
    request_timeout: u64,

    /// Upload/download timeout in seconds.
    #[arg(long, env = "DOCPROC_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Treat INPUT as a document id and follow it instead of uploading.
    #[arg(long)]
    watch: bool,

    /// Query the processor's health endpoint and exit.
    #[arg(long, conflicts_with = "watch")]
    health: bool,

    /// Output structured JSON instead of Markdown.
    #[arg(long, env = "DOCPROC_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "DOCPROC_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "DOCPROC_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "DOCPROC_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum ModeArg {
    Fast,
    Quality,
}

impl From<ModeArg> for ProcessingMode {
    fn from(v: ModeArg) -> Self {
        match v {
            ModeArg::Fast => ProcessingMode::Fast,
            ModeArg::Quality => ProcessingMode::Quality,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Missing .env is the normal case.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs while the progress bar is active;
    // the bar carries the same information.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.health;
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

    // ── Health mode ──────────────────────────────────────────────────────
    if cli.health {
        let config = build_config(&cli, None)?;
        let report = health(&config).await.context("Health check failed")?;
        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("Failed to serialise health report")?
            );
        } else {
            println!("Status:       {}", report.status);
            println!("Version:      {}", report.version);
            println!("Timestamp:    {}", report.timestamp);
            println!("Database:     {}", connected(report.database_connected));
            println!("Storage:      {}", connected(report.storage_connected));
        }
        if !report.is_healthy() {
            std::process::exit(1);
        }
        return Ok(());
    }

    let input = cli.input.clone().context("INPUT is required")?;

    // ── Build config ─────────────────────────────────────────────────────
    let status_cb: Option<StatusCallback> = if show_progress {
        let initial = if cli.watch {
            "Checking status…"
        } else {
            "Uploading file…"
        };
        Some(CliStatusCallback::new(initial, cli.max_poll_failures) as StatusCallback)
    } else {
        None
    };
    let config = build_config(&cli, status_cb)?;

    // Ctrl-C stops polling cleanly instead of killing the process mid-request.
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    if cli.watch {
        return run_watch(&cli, &input, &config, &cancel).await;
    }

    // ── Run conversion ───────────────────────────────────────────────────
    let options = ProcessingOptions::new(cli.ocr, cli.mode.into());
    let doc = process_file_with_cancel(&input, options, &config, &cancel)
        .await
        .map_err(explain)
        .context("Conversion failed")?;

    if let Some(ref output) = cli.output {
        let path = output_path(output, &doc.output_filename);
        write_artifact(&path, &doc.markdown)
            .await
            .context("Failed to write output")?;
        if !cli.quiet {
            eprintln!(
                "{}  {} status checks  {}ms  →  {}",
                green("✔"),
                doc.stats.status_fetches,
                doc.stats.total_duration_ms,
                bold(&path.display().to_string()),
            );
        }
    } else if cli.json {
        let json = serde_json::json!({
            "id": doc.id,
            "output_filename": doc.output_filename,
            "record": doc.record,
            "stats": doc.stats,
            "quality": doc.quality,
            "markdown": doc.markdown,
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&json).context("Failed to serialise output")?
        );
    } else {
        write_stdout(&doc.markdown)?;
        if !cli.quiet && !show_progress {
            eprintln!(
                "Converted {} in {}ms ({} status checks)",
                input, doc.stats.total_duration_ms, doc.stats.status_fetches
            );
        }
    }

    Ok(())
}

/// Follow an already-submitted document, downloading the result if asked.
async fn run_watch(
    cli: &Cli,
    id: &str,
    config: &ClientConfig,
    cancel: &CancellationToken,
) -> Result<()> {
    let id = DocumentId::new(id.trim());
    let outcome = poll_document(&id, config, cancel)
        .await
        .map_err(explain)
        .context("Status polling failed")?;

    if cli.json && cli.output.is_none() {
        let (json, complete) = watch_report(&outcome);
        println!(
            "{}",
            serde_json::to_string_pretty(&json).context("Failed to serialise status")?
        );
        if !complete {
            std::process::exit(1);
        }
        return Ok(());
    }

    let record = outcome.into_result().map_err(explain)?;
    if let Some(ref output) = cli.output {
        let markdown = fetch_result(&record, config)
            .await
            .context("Failed to download result")?;
        let path = output_path(output, &clean_filename(&record.filename));
        write_artifact(&path, &markdown)
            .await
            .context("Failed to write output")?;
        if !cli.quiet {
            eprintln!("{}  →  {}", green("✔"), bold(&path.display().to_string()));
        }
    } else if !cli.quiet {
        eprintln!(
            "Document {} is complete. Re-run with -o <file> to download it.",
            record.id
        );
    }
    Ok(())
}

/// JSON body for `--watch --json`, and whether the document completed.
fn watch_report(outcome: &PollOutcome) -> (serde_json::Value, bool) {
    let json = serde_json::json!({
        "record": outcome.record,
        "progress": outcome.snapshot,
        "fetches": outcome.fetches,
    });
    (json, outcome.is_complete())
}

/// Map CLI args to `ClientConfig`.
fn build_config(cli: &Cli, status_cb: Option<StatusCallback>) -> Result<ClientConfig> {
    let mut builder = ClientConfig::builder()
        .max_file_size(cli.max_size_mb.saturating_mul(1024 * 1024))
        .poll_interval(Duration::from_millis(cli.poll_interval_ms))
        .max_consecutive_failures(cli.max_poll_failures)
        .request_timeout_secs(cli.request_timeout)
        .download_timeout_secs(cli.download_timeout);

    if let Some(ref url) = cli.api_url {
        builder = builder.api_url(url.clone());
    }
    if let Some(ref key) = cli.api_key {
        builder = builder.api_key(key.clone());
    }
    if let Some(cb) = status_cb {
        builder = builder.status_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// `-o dir/` writes `dir/<cleaned upload name>.md`.
fn output_path(output: &Path, default_name: &str) -> PathBuf {
    if output.is_dir() || output.as_os_str().to_string_lossy().ends_with('/') {
        output.join(default_name)
    } else {
        output.to_path_buf()
    }
}

fn write_stdout(markdown: &str) -> Result<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    handle
        .write_all(markdown.as_bytes())
        .context("Failed to write to stdout")?;
    // Ensure a trailing newline on stdout.
    if !markdown.ends_with('\n') {
        handle.write_all(b"\n").ok();
    }
    Ok(())
}

/// Attach the recovery hint to an error before it is reported.
fn explain(e: DocProcError) -> anyhow::Error {
    use workshop_docproc::RetryHint;
    let hint = match e.retry_hint() {
        RetryHint::ResubmitCorrected => Some("Fix the file and submit it again."),
        RetryHint::RetryUpload => Some("Try uploading the file again."),
        RetryHint::PollAgain => {
            Some("The document may still be processing; follow it again with --watch <id>.")
        }
        RetryHint::None => None,
    };
    match hint {
        Some(h) => anyhow::Error::new(e).context(h),
        None => anyhow::Error::new(e),
    }
}

fn connected(ok: bool) -> String {
    if ok {
        green("connected")
    } else {
        red("unavailable")
    }
}
