//! CLI binary for paperlens.
//!
//! A thin shim over the library crate: `serve` runs the HTTP service,
//! `audit` runs one paper from the terminal, `inspect` prints metadata.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use paperlens::server::{self, AppState, ServerConfig, DEFAULT_MAX_UPLOAD_BYTES};
use paperlens::{
    audit, audit_to_file, inspect, resolve_backend, AuditConfig, AuditPhase, AuditProgressCallback,
    AuditReport, Auditor, ProgressCallback,
};
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::warn;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// One spinner that relabels itself per phase and logs a line when each
/// phase finishes.
struct CliProgressCallback {
    bar: ProgressBar,
    phase_started: Mutex<Instant>,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Preparing");
        bar.set_message("Opening PDF…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            phase_started: Mutex::new(Instant::now()),
        })
    }

    fn phase_elapsed(&self) -> f64 {
        self.phase_started
            .lock()
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl AuditProgressCallback for CliProgressCallback {
    fn on_audit_start(&self, total_pages: usize, images: usize) {
        self.bar.println(format!(
            "{} {}",
            bold("◆"),
            bold(&format!("Auditing {total_pages} pages, {images} figure(s)…"))
        ));
    }

    fn on_phase_start(&self, phase: AuditPhase) {
        if let Ok(mut t) = self.phase_started.lock() {
            *t = Instant::now();
        }
        self.bar.set_prefix(phase.label());
        self.bar.set_message("waiting for model…");
    }

    fn on_phase_complete(&self, phase: AuditPhase, items: usize) {
        let unit = match phase {
            AuditPhase::Ingestion => "pages",
            AuditPhase::ClaimExtraction => "claims",
            AuditPhase::Verification => "verdicts",
            AuditPhase::ContradictionDetection => "contradictions",
        };
        self.bar.println(format!(
            "  {} {:<24} {:>3} {:<15} {}",
            green("✓"),
            phase.label(),
            items,
            unit,
            dim(&format!("{:.1}s", self.phase_elapsed())),
        ));
    }

    fn on_retry(&self, phase: AuditPhase, attempt: u32, error: &str) {
        let msg: String = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar
            .println(format!("  {} {} retry {}: {}", yellow("↻"), phase.label(), attempt, dim(&msg)));
    }

    fn on_audit_complete(&self, _claims: usize, _contradictions: usize) {
        self.bar.finish_and_clear();
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Run the HTTP service on :8000
  paperlens serve

  # Audit a local paper and print a summary
  paperlens audit paper.pdf

  # Audit an arXiv paper and save the JSON report
  paperlens audit https://arxiv.org/pdf/1706.03762 -o attention-audit.json

  # Use another provider
  paperlens audit --provider openai --model gpt-4.1 paper.pdf

  # Inspect PDF metadata (no API key needed)
  paperlens inspect paper.pdf

  # Upload to a running server
  curl -F file=@paper.pdf http://localhost:8000/api/audit

ENVIRONMENT VARIABLES:
  GOOGLE_API_KEY          Google Gemini API key (copied to GEMINI_API_KEY)
  GEMINI_API_KEY          Google Gemini API key
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (gemini, openai, anthropic, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Path to libpdfium
  RUST_LOG                Log filter, e.g. paperlens=debug

A .env file in the working directory is loaded on startup.
"#;

/// Detect contradictions between claims and figures in research papers.
#[derive(Parser, Debug)]
#[command(
    name = "paperlens",
    version,
    about = "Detect contradictions between textual claims and figures in research-paper PDFs",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "PAPERLENS_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "PAPERLENS_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP service.
    Serve(ServeArgs),
    /// Audit one PDF file or URL.
    Audit(AuditArgs),
    /// Print PDF metadata without auditing.
    Inspect {
        /// Local PDF file path or HTTP/HTTPS URL.
        input: String,

        /// Print metadata as JSON.
        #[arg(long)]
        json: bool,
    },
}

/// Model and pipeline settings shared by `serve` and `audit`.
#[derive(Args, Debug)]
struct ModelArgs {
    /// LLM model ID. Default: gemini-2.0-flash.
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: gemini, openai, anthropic, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Retries per model call.
    #[arg(long, env = "PAPERLENS_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// Per-call model timeout in seconds.
    #[arg(long, env = "PAPERLENS_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "PAPERLENS_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Max output tokens per model call.
    #[arg(long, env = "PAPERLENS_MAX_TOKENS", default_value_t = 4096)]
    max_tokens: usize,

    /// Figures attached to the verification request (0 = text only).
    #[arg(long, env = "PAPERLENS_MAX_IMAGES", default_value_t = 4)]
    max_images: usize,

    /// Claims carried into verification and contradiction detection.
    #[arg(long, env = "PAPERLENS_MAX_CLAIMS", default_value_t = 5)]
    max_claims: usize,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "PAPERLENS_PASSWORD")]
    password: Option<String>,
}

#[derive(Args, Debug)]
struct ServeArgs {
    #[arg(long, env = "PAPERLENS_HOST", default_value = "0.0.0.0")]
    host: String,

    #[arg(short, long, env = "PAPERLENS_PORT", default_value_t = 8000)]
    port: u16,

    /// Largest accepted upload in bytes.
    #[arg(long, env = "PAPERLENS_MAX_UPLOAD_BYTES", default_value_t = DEFAULT_MAX_UPLOAD_BYTES)]
    max_upload_bytes: usize,

    /// Audits allowed to run at once.
    #[arg(long, env = "PAPERLENS_CONCURRENCY", default_value_t = 1)]
    concurrency: usize,

    #[command(flatten)]
    model: ModelArgs,
}

#[derive(Args, Debug)]
struct AuditArgs {
    /// Local PDF file path or HTTP/HTTPS URL.
    input: String,

    /// Write the JSON report to this file.
    #[arg(short, long, env = "PAPERLENS_OUTPUT")]
    output: Option<PathBuf>,

    /// Print the full JSON report instead of a summary.
    #[arg(long)]
    json: bool,

    /// Disable the progress spinner.
    #[arg(long, env = "PAPERLENS_NO_PROGRESS")]
    no_progress: bool,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "PAPERLENS_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    #[command(flatten)]
    model: ModelArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    if std::env::var_os("GEMINI_API_KEY").is_none() {
        if let Ok(key) = std::env::var("GOOGLE_API_KEY") {
            std::env::set_var("GEMINI_API_KEY", key);
        }
    }

    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner covers progress for `audit`; the server always logs.
    let spinner_active = matches!(&cli.command, Command::Audit(a) if !a.no_progress && !a.json);
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || spinner_active {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Command::Serve(args) => run_serve(args).await,
        Command::Audit(args) => run_audit(args, cli.quiet).await,
        Command::Inspect { input, json } => run_inspect(&input, json).await,
    }
}

async fn run_serve(args: ServeArgs) -> Result<()> {
    let config = build_config(&args.model, 120, None)?;

    // A missing API key still starts the server; /health reports it.
    let auditor = match resolve_backend(&config) {
        Ok(backend) => {
            eprintln!("{} Model backend ready: {}", green("✔"), backend.name());
            Some(Arc::new(Auditor::new(backend, config)))
        }
        Err(e) => {
            warn!("Model backend unavailable: {}", e);
            eprintln!("{} Model backend unavailable; audits will fail until configured", red("✘"));
            None
        }
    };

    let server_config = ServerConfig {
        host: args.host,
        port: args.port,
        max_upload_bytes: args.max_upload_bytes,
        max_concurrent_audits: args.concurrency,
    };
    let state = AppState::new(auditor, server_config.max_concurrent_audits);
    server::serve(&server_config, state)
        .await
        .with_context(|| format!("Server on {} failed", server_config.addr()))
}

async fn run_audit(args: AuditArgs, quiet: bool) -> Result<()> {
    let progress: Option<ProgressCallback> = if !quiet && !args.no_progress && !args.json {
        Some(CliProgressCallback::new() as Arc<dyn AuditProgressCallback>)
    } else {
        None
    };
    let config = build_config(&args.model, args.download_timeout, progress)?;

    let report = match args.output {
        Some(ref path) => {
            let report = audit_to_file(&args.input, path, &config)
                .await
                .context("Audit failed")?;
            if !quiet {
                eprintln!("{} Report written to {}", green("✔"), bold(&path.display().to_string()));
            }
            report
        }
        None => audit(&args.input, &config).await.context("Audit failed")?,
    };

    if args.json {
        let json = serde_json::to_string_pretty(&report).context("Failed to serialise report")?;
        println!("{json}");
    } else if !quiet {
        print_summary(&report);
    }
    Ok(())
}

async fn run_inspect(input: &str, json: bool) -> Result<()> {
    let meta = inspect(input).await.context("Failed to inspect PDF")?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&meta).context("Failed to serialize metadata")?
        );
        return Ok(());
    }

    println!("File:         {}", input);
    if let Some(ref t) = meta.title {
        println!("Title:        {}", t);
    }
    if let Some(ref a) = meta.author {
        println!("Author:       {}", a);
    }
    if let Some(ref s) = meta.subject {
        println!("Subject:      {}", s);
    }
    println!("Pages:        {}", meta.page_count);
    println!("PDF Version:  {}", meta.pdf_version);
    if let Some(ref p) = meta.producer {
        println!("Producer:     {}", p);
    }
    if let Some(ref c) = meta.creator {
        println!("Creator:      {}", c);
    }
    Ok(())
}

/// Map CLI args to `AuditConfig`.
fn build_config(
    args: &ModelArgs,
    download_timeout: u64,
    progress: Option<ProgressCallback>,
) -> Result<AuditConfig> {
    let mut builder = AuditConfig::builder()
        .max_retries(args.max_retries)
        .api_timeout_secs(args.api_timeout)
        .temperature(args.temperature)
        .max_tokens(args.max_tokens)
        .max_images(args.max_images)
        .max_claims_checked(args.max_claims)
        .download_timeout_secs(download_timeout);

    if let Some(ref model) = args.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = args.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(ref password) = args.password {
        builder = builder.password(password);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

fn print_summary(report: &AuditReport) {
    println!("{}", bold(&report.audit_summary));
    println!();

    if !report.claims.is_empty() {
        println!("{}", bold("Claims"));
        for (i, c) in report.claims.iter().enumerate() {
            println!(
                "  {:>2}. {} {}",
                i + 1,
                c.text,
                dim(&format!("(p.{}, {:.2})", c.page, c.confidence))
            );
        }
        println!();
    }

    if !report.contradictions.is_empty() {
        println!("{}", bold("Contradictions"));
        for c in &report.contradictions {
            let marker = if c.is_high_confidence() { red("!") } else { yellow("?") };
            println!("  {} {}", marker, c.claim);
            println!("      {} {}", dim(&format!("p.{} shows:", c.visual_evidence_page)), c.visual_shows);
            if let Some(ref reasoning) = c.reasoning {
                println!("      {}", dim(reasoning));
            }
        }
        println!();
    }

    let s = &report.stats;
    eprintln!(
        "   {} model calls  ·  {} tokens in  /  {} tokens out  ·  {} figure(s) sent  ·  {:.1}s",
        s.llm_calls,
        dim(&s.total_input_tokens.to_string()),
        dim(&s.total_output_tokens.to_string()),
        s.images_sent,
        report.processing_time_seconds,
    );
    if s.used_fallback {
        eprintln!("   {}", yellow("claims came from the sentence heuristic"));
    }
}
