//! CLI binary for fieldguide-layout.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ExtractionConfig` and prints results.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fieldguide_layout::{
    generate_overlays, pipeline::input::resolve_pages, templates::CATALOG, Extractor,
    ExtractionConfig, ExtractionProgressCallback, OverlayOptions, PageOutcome, PageStatus,
    ProgressCallback, RunSummary, VisionRecognizer,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
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

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one bar for the run, one log line per page.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:.bold}  \
                 [{bar:42.green/238}] {pos:>3}/{len} pages  \
                 ⏱ {elapsed_precise}  {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  ")
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
        );
        bar.set_prefix("Extracting");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl ExtractionProgressCallback for CliProgressCallback {
    fn on_run_start(&self, total_pages: usize) {
        self.bar.set_length(total_pages as u64);
        self.bar.reset_eta();
    }

    fn on_page_start(&self, _index: usize, _total: usize, page: &str) {
        self.bar.set_message(page.to_string());
    }

    fn on_page_complete(&self, index: usize, total: usize, outcome: &PageOutcome) {
        let (mark, detail) = match outcome.status {
            PageStatus::Succeeded => (
                green("✓"),
                format!(
                    "{} entries  {}",
                    outcome.entries,
                    outcome.template.as_deref().unwrap_or("no template")
                ),
            ),
            PageStatus::Skipped => (dim("↷"), dim("already extracted")),
            PageStatus::Failed => {
                let msg = outcome
                    .error
                    .as_ref()
                    .map(|e| e.to_string())
                    .unwrap_or_default();
                // Truncate very long error messages to keep output tidy.
                let msg = match msg.char_indices().nth(80) {
                    Some((cut, _)) => format!("{}\u{2026}", &msg[..cut]),
                    None => msg,
                };
                (red("✗"), red(&msg))
            }
        };
        self.bar.println(format!(
            "  {} {:>3}/{:<3} {:<24} {}  {}",
            mark,
            index + 1,
            total,
            outcome.page,
            detail,
            dim(&format!("{:.1}s", outcome.duration_ms as f64 / 1000.0)),
        ));
        self.bar.inc(1);
    }

    fn on_run_complete(&self, _summary: &RunSummary) {
        self.bar.finish_and_clear();
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Extract every page in a directory
  fieldguide extract scans/

  # Slower pacing and more retries for a strict quota
  fieldguide extract scans/ --interval 5000 --retry 5

  # Pick a provider explicitly
  fieldguide extract scans/p012.png --provider openai --model gpt-4.1-mini

  # Review images next to the scans
  fieldguide overlay scans/ --output-dir review/

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY          Google Gemini API key (preferred when set)
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (gemini, openai, anthropic, ollama)
  EDGEQUAKE_MODEL         Override model ID
  RUST_LOG                Log filter, overrides --verbose / --quiet
"#;

/// Split field-guide page scans into per-plant records.
#[derive(Parser, Debug)]
#[command(
    name = "fieldguide",
    version,
    about = "Split field-guide page scans into per-plant photo/caption records",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "FIELDGUIDE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "FIELDGUIDE_QUIET")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Match, split and read every page; write <base>_layout.json.
    Extract(ExtractArgs),
    /// Draw the saved layouts onto the pages as <base>_layout.png.
    Overlay(OverlayArgs),
    /// List the built-in page templates.
    Templates,
}

#[derive(clap::Args, Debug)]
struct ExtractArgs {
    /// A PNG page image or a directory of them.
    input: PathBuf,

    /// Attempts per page and per recognition call.
    #[arg(long, env = "FIELDGUIDE_RETRY", default_value_t = 3,
          value_parser = clap::value_parser!(u32).range(1..))]
    retry: u32,

    /// Minimum milliseconds between recognition calls.
    #[arg(long, env = "FIELDGUIDE_INTERVAL", default_value_t = 2000)]
    interval: u64,

    /// Vision provider: gemini, openai, anthropic, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Model ID (e.g. gemini-2.0-flash, gpt-4.1-nano).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// Path to a text file containing a custom recognition prompt.
    #[arg(long, env = "FIELDGUIDE_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Per-call timeout in seconds.
    #[arg(long, env = "FIELDGUIDE_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// Do not write photo/caption crop PNGs.
    #[arg(long)]
    no_crops: bool,

    /// Print the run summary as JSON on stdout.
    #[arg(long)]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "FIELDGUIDE_NO_PROGRESS")]
    no_progress: bool,
}

#[derive(clap::Args, Debug)]
struct OverlayArgs {
    /// A PNG page image or a directory of them.
    input: PathBuf,

    /// Directory holding the <base>_layout.json files. Default: input directory.
    #[arg(long)]
    layout_dir: Option<PathBuf>,

    /// Directory for the <base>_layout.png files. Default: input directory.
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// TrueType/OpenType font for labels. Default: first system font found.
    #[arg(long, env = "FIELDGUIDE_FONT")]
    font: Option<PathBuf>,

    /// Print the summary as JSON on stdout.
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active;
    // the bar already reports every page.
    let show_progress = match &cli.command {
        Command::Extract(args) => !cli.quiet && !args.no_progress && !args.json,
        _ => false,
    };
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

    match cli.command {
        Command::Extract(ref args) => run_extract(args, cli.quiet, show_progress).await,
        Command::Overlay(ref args) => run_overlay(args, cli.quiet).await,
        Command::Templates => {
            print_templates();
            Ok(())
        }
    }
}

async fn run_extract(args: &ExtractArgs, quiet: bool, show_progress: bool) -> Result<()> {
    let progress: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn ExtractionProgressCallback>)
    } else {
        None
    };
    let config = build_config(args, progress).await?;

    let pages = resolve_pages(&args.input)
        .with_context(|| format!("Cannot read input {}", args.input.display()))?;
    if pages.is_empty() {
        if !quiet {
            eprintln!("{} no page images found in {}", yellow("⚠"), args.input.display());
        }
        return Ok(());
    }

    let backend = VisionRecognizer::from_config(&config).context("Provider setup failed")?;
    let mut extractor = Extractor::new(backend, config);
    let summary = extractor.run(&pages).await;

    if args.json {
        let json = serde_json::to_string_pretty(&summary).context("Failed to serialise summary")?;
        println!("{json}");
    } else if !quiet {
        print_summary(&summary);
    }

    // Page failures are reported, not turned into a failing exit code.
    Ok(())
}

/// Map CLI args to `ExtractionConfig`.
async fn build_config(
    args: &ExtractArgs,
    progress: Option<ProgressCallback>,
) -> Result<ExtractionConfig> {
    let mut builder = ExtractionConfig::builder()
        .page_attempts(args.retry)
        .recognition_attempts(args.retry)
        .min_interval_ms(args.interval)
        .api_timeout_secs(args.api_timeout)
        .save_crops(!args.no_crops);

    if let Some(ref path) = args.system_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read system prompt from {:?}", path))?;
        builder = builder.system_prompt(prompt);
    }
    if let Some(ref provider) = args.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(ref model) = args.model {
        builder = builder.model(model.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

fn print_summary(summary: &RunSummary) {
    let mark = if summary.failed == 0 {
        green("✔")
    } else {
        yellow("⚠")
    };
    eprintln!(
        "{} {} pages: {} succeeded, {} skipped, {} failed  {}",
        mark,
        bold(&summary.total_pages.to_string()),
        green(&summary.succeeded.to_string()),
        dim(&summary.skipped.to_string()),
        red(&summary.failed.to_string()),
        dim(&format!("{:.1}s", summary.total_duration_ms as f64 / 1000.0)),
    );
    for failure in &summary.failures {
        eprintln!("  {} {}", red("✗"), failure);
    }
}

async fn run_overlay(args: &OverlayArgs, quiet: bool) -> Result<()> {
    let options = OverlayOptions {
        layout_dir: args.layout_dir.clone(),
        output_dir: args.output_dir.clone(),
        font_path: args.font.clone(),
    };
    let summary = generate_overlays(&args.input, &options)
        .await
        .context("Overlay generation failed")?;

    if args.json {
        let json = serde_json::to_string_pretty(&summary).context("Failed to serialise summary")?;
        println!("{json}");
    } else if !quiet {
        eprintln!(
            "{} {} pages: {} rendered, {} with issues",
            if summary.with_issues == 0 {
                green("✔")
            } else {
                yellow("⚠")
            },
            bold(&summary.total.to_string()),
            summary.rendered,
            summary.with_issues,
        );
        for (issue, count) in &summary.issues {
            eprintln!("  {:?}: {}", issue, count);
        }
    }
    Ok(())
}

fn print_templates() {
    println!("{:<12} {:>5}  {:>14}  {:>14}", "CODE", "SLOTS", "PHOTO off/w", "CAPTION off/w");
    for t in CATALOG {
        println!(
            "{:<12} {:>5}  {:>14}  {:>14}",
            t.code,
            t.slots.len(),
            format!("{}/{}", t.photo.offset, t.photo.width),
            format!("{}/{}", t.caption.offset, t.caption.width),
        );
    }
}
