//! CLI binary for edgequake-tiv.
//!
//! A thin shim over the library crate: maps CLI flags to `PipelineConfig`,
//! drives the `Workflow` stage by stage and saves every artifact.

use anyhow::{bail, Context, Result};
use clap::Parser;
use edgequake_tiv::{
    load_source, load_template, Advisory, PipelineConfig, ProgressCallback, Recognizer,
    RecognizerStatus, Stage, VehicleRecord, Workflow, WorkflowProgressCallback,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

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

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Spinner with one log line per finished stage and recogniser.
struct CliProgressCallback {
    bar: ProgressBar,
    started: Mutex<Option<Instant>>,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);
        bar.set_style(style);
        bar.set_prefix("Preparing");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self {
            bar,
            started: Mutex::new(None),
        })
    }

    fn elapsed(&self) -> String {
        let secs = self
            .started
            .lock()
            .ok()
            .and_then(|mut t| t.take())
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0);
        dim(&format!("{secs:.1}s"))
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl WorkflowProgressCallback for CliProgressCallback {
    fn on_stage_start(&self, stage: Stage) {
        if let Ok(mut started) = self.started.lock() {
            *started = Some(Instant::now());
        }
        self.bar.set_prefix(stage_label(stage));
        self.bar.set_message("");
    }

    fn on_status(&self, _stage: Stage, message: &str) {
        self.bar.set_message(message.to_string());
    }

    fn on_recognizer_status(&self, recognizer: Recognizer, status: RecognizerStatus) {
        let name = match recognizer {
            Recognizer::Extraction => "AI field extraction",
            Recognizer::Code => "QR code",
        };
        let line = match status {
            RecognizerStatus::Success => format!("  {} {name}", green("✓")),
            RecognizerStatus::Failed => format!("  {} {name}", red("✗")),
            RecognizerStatus::Pending => return,
        };
        self.bar.println(line);
    }

    fn on_stage_complete(&self, stage: Stage, artifact_len: usize) {
        let size = if artifact_len > 0 {
            dim(&format!("{:>8} bytes", artifact_len))
        } else {
            String::new()
        };
        self.bar.println(format!(
            "{} {:<20} {size}  {}",
            green("✔"),
            stage_label(stage),
            self.elapsed()
        ));
    }

    fn on_stage_error(&self, stage: Stage, error: &str) {
        let msg = match error.char_indices().nth(100) {
            Some((cut, _)) => format!("{}\u{2026}", &error[..cut]),
            None => error.to_string(),
        };
        self.bar.println(format!(
            "{} {:<20} {}",
            red("✘"),
            stage_label(stage),
            red(&msg)
        ));
    }
}

fn stage_label(stage: Stage) -> &'static str {
    match stage {
        Stage::Recognition => "1. Recognition",
        Stage::FillTemplate => "2. Fill template",
        Stage::RenderDocument => "3. Render PDF",
        Stage::EmbedCode => "4. Embed QR",
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Recognise a scan and print the fields
  tiv scan.pdf --until recognize

  # Full run: filled DOCX, rendered PDF and QR-stamped PDF into ./out
  tiv scan.pdf --template plantilla.docx -o out

  # Fix a misread field before filling
  tiv scan.pdf --template plantilla.docx --set placa=B7X-042 --set color=ROJO

  # Use a specific model
  tiv --provider openai --model gpt-4.1 scan.pdf --template plantilla.docx

  # JSON output for scripting
  tiv --json scan.pdf --until recognize > record.json

ARTIFACTS:
  1_ENMICADO_WORD_<placa>.docx      filled template
  2_ENMICADO_PDF_<placa>.pdf        image-only A4 rendering
  3_ENMICADO_FINAL_QR_<placa>.pdf   rendering with the QR stamped on page 1

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY          Google Gemini API key (preferred provider)
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (gemini, openai, anthropic, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Path to an existing libpdfium (skips auto-download)
  SOFFICE_PATH            Path to the LibreOffice `soffice` binary

SETUP:
  1. Install LibreOffice (used headless to render the DOCX).
  2. Set an API key:  export GEMINI_API_KEY=...
  3. Run:             tiv scan.pdf --template plantilla.docx -o out

  PDFium (~30 MB) is downloaded automatically on first run and cached.
"#;

/// Last stage to run.
#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Until {
    Recognize,
    Fill,
    Render,
    Final,
}

/// Read a TIV scan and produce the enmicado DOCX/PDF artifacts.
#[derive(Parser, Debug)]
#[command(
    name = "tiv",
    version,
    about = "Read a TIV scan with a Vision LLM and produce the enmicado DOCX/PDF artifacts",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Source TIV scan: local PDF path or HTTP/HTTPS URL.
    source: String,

    /// Word template with «Placeholder» fields.
    #[arg(short, long, env = "TIV_TEMPLATE")]
    template: Option<PathBuf>,

    /// Directory the artifacts are written to.
    #[arg(short, long, env = "TIV_OUTPUT_DIR", default_value = ".")]
    output: PathBuf,

    /// Stop after this stage.
    #[arg(long, env = "TIV_UNTIL", value_enum, default_value = "final")]
    until: Until,

    /// Override a recognised field (repeatable). `qr_data=` clears the QR payload.
    #[arg(long = "set", value_name = "FIELD=VALUE", value_parser = parse_assignment)]
    set: Vec<(String, String)>,

    /// Print the record and artifact paths as JSON.
    #[arg(long, env = "TIV_JSON")]
    json: bool,

    /// Vision model ID (e.g. gemini-2.5-flash, gpt-4.1-mini).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: gemini, openai, anthropic, ollama.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Path to the LibreOffice `soffice` binary.
    #[arg(long, env = "TIV_SOFFICE")]
    soffice: Option<PathBuf>,

    /// VLM call timeout in seconds.
    #[arg(long, env = "TIV_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "TIV_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "TIV_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors and the record.
    #[arg(short, long, env = "TIV_QUIET")]
    quiet: bool,

    /// Disable the progress spinner.
    #[arg(long, env = "TIV_NO_PROGRESS")]
    no_progress: bool,
}

fn parse_assignment(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((field, value)) if !field.trim().is_empty() => {
            Ok((field.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected FIELD=VALUE, got '{s}'")),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
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

    if cli.until > Until::Recognize && cli.template.is_none() {
        bail!("--template is required to go past recognition (use --until recognize)");
    }

    // ── Ensure PDFium engine is available ───────────────────────────────────
    if !pdfium_auto::is_pdfium_cached() && std::env::var_os("PDFIUM_LIB_PATH").is_none() {
        download_pdfium(cli.quiet)?;
    }

    // ── Build workflow ───────────────────────────────────────────────────
    let progress = show_progress.then(CliProgressCallback::new);
    let config = build_config(&cli, progress.clone().map(|cb| cb as ProgressCallback))?;
    let mut workflow = tokio::task::block_in_place(|| Workflow::detect(config))
        .context("Startup check failed")?;

    let source = load_source(&cli.source, cli.download_timeout)
        .await
        .context("Failed to load source")?;
    workflow.load_source(source);
    if let Some(ref path) = cli.template {
        let template = load_template(path)
            .await
            .context("Failed to load template")?;
        workflow.load_template(template);
    }

    let result = run(&cli, &mut workflow).await;
    if let Some(ref cb) = progress {
        cb.finish();
    }
    let (saved, advisory) = result?;

    // ── Report ───────────────────────────────────────────────────────────
    let state = workflow.state();
    if cli.json {
        let report = serde_json::json!({
            "record": state.record(),
            "statuses": state.statuses(),
            "artifacts": saved,
            "advisory": advisory,
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialise output")?
        );
        return Ok(());
    }

    print_record(state.record());
    if !cli.quiet {
        for path in &saved {
            eprintln!("{} {}", green("→"), bold(&path.display().to_string()));
        }
        if let Some(advisory) = advisory {
            eprintln!("{} {}", yellow("⚠"), advisory);
        }
    }
    Ok(())
}

/// Recognise, apply edits, then run the artifact stages up to `--until`.
async fn run(cli: &Cli, workflow: &mut Workflow) -> Result<(Vec<PathBuf>, Option<Advisory>)> {
    workflow.recognize().await.context("Recognition failed")?;

    for (field, value) in &cli.set {
        if field == "qr_data" {
            workflow.set_verification_code(Some(value.clone()));
        } else {
            workflow
                .set_field(field, value.as_str())
                .with_context(|| format!("Invalid --set {field}"))?;
        }
    }

    let missing = workflow.state().record().missing_required();
    if !missing.is_empty() && !cli.quiet {
        eprintln!(
            "{} required fields empty: {}",
            yellow("⚠"),
            missing.join(", ")
        );
    }

    let mut advisory = None;
    if cli.until >= Until::Fill {
        workflow.fill_template().await.context("Template filling failed")?;
    }
    if cli.until >= Until::Render {
        workflow
            .render_document()
            .await
            .context("Document rendering failed")?;
    }
    if cli.until >= Until::Final {
        advisory = workflow.embed_code().await.context("QR embedding failed")?;
    }

    let mut saved = Vec::new();
    if cli.until > Until::Recognize {
        tokio::fs::create_dir_all(&cli.output)
            .await
            .with_context(|| format!("Failed to create {}", cli.output.display()))?;
        for artifact in workflow.state().artifacts().iter() {
            saved.push(artifact.save_to(&cli.output)?);
        }
    }
    Ok((saved, advisory))
}

/// Map CLI args to `PipelineConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<PipelineConfig> {
    let mut builder = PipelineConfig::builder()
        .api_timeout_secs(cli.api_timeout)
        .download_timeout_secs(cli.download_timeout);
    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(ref soffice) = cli.soffice {
        builder = builder.soffice_path(soffice.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }
    builder.build().context("Invalid configuration")
}

fn download_pdfium(quiet: bool) -> Result<()> {
    if quiet {
        tokio::task::block_in_place(|| pdfium_auto::ensure_pdfium_library(None))
            .context("Failed to download PDFium engine")?;
        return Ok(());
    }

    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {bytes}/{total_bytes}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS),
    );
    bar.set_prefix("PDF engine");
    bar.enable_steady_tick(Duration::from_millis(80));

    let progress = bar.clone();
    tokio::task::block_in_place(|| {
        pdfium_auto::ensure_pdfium_library(Some(&|downloaded, total| {
            if let Some(t) = total {
                if progress.length().unwrap_or(0) != t {
                    progress.set_length(t);
                }
            }
            progress.set_position(downloaded);
        }))
    })
    .context("Failed to download PDFium engine")?;
    bar.finish_and_clear();
    Ok(())
}

fn print_record(record: &VehicleRecord) {
    let width = record.iter().map(|(name, _)| name.len()).max().unwrap_or(0);
    for (name, value) in record.iter() {
        let shown = if value.is_empty() {
            dim("-")
        } else {
            value.to_string()
        };
        println!("{name:<width$}  {shown}");
    }
    let qr = match record.qr_data.as_deref() {
        Some(data) => data.to_string(),
        None => dim("(none)"),
    };
    println!("{:<width$}  {qr}", "qr_data");
}
