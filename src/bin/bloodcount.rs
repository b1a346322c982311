//! CLI binary for bloodcount.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ExtractionConfig` / `FieldExtractionConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use bloodcount::{
    BatchReport, DocumentTextExtractor, ExtractionConfig, ExtractionProgressCallback,
    FallbackPolicy, FieldExtractionConfig, FieldExtractor, FieldMap, FileOutcome, ProgressCallback,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
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

/// Terminal progress callback: one bar for the batch plus a log line per file.
struct CliProgressCallback {
    bar: ProgressBar,
    skipped: AtomicUsize,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            skipped: AtomicUsize::new(0),
            errors: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} files  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Reading");
        self.bar.reset_eta();
    }
}

impl ExtractionProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_files: usize) {
        self.activate_bar(total_files);
    }

    fn on_file_start(&self, _index: usize, _total: usize, file_name: &str) {
        self.bar.set_message(file_name.to_string());
    }

    fn on_ocr_fallback(&self, file_name: &str, pages: usize) {
        self.bar.println(format!(
            "  {} {}  {}",
            cyan("◆"),
            file_name,
            dim(&format!("no text layer, OCR on {pages} page(s)"))
        ));
    }

    fn on_file_succeeded(&self, file_name: &str, text_len: usize) {
        self.bar.println(format!(
            "  {} {:<32}  {}",
            green("✓"),
            file_name,
            dim(&format!("{text_len:>6} chars")),
        ));
        self.bar.inc(1);
    }

    fn on_file_skipped(&self, file_name: &str, reason: &str) {
        self.skipped.fetch_add(1, Ordering::SeqCst);
        self.bar.println(format!(
            "  {} {:<32}  {}",
            dim("–"),
            file_name,
            dim(reason)
        ));
        self.bar.inc(1);
    }

    fn on_file_failed(&self, file_name: &str, error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);

        // Truncate very long error messages to keep output tidy.
        let msg: String = if error.chars().count() > 80 {
            let mut s: String = error.chars().take(79).collect();
            s.push('\u{2026}');
            s
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} {:<32}  {}",
            red("✗"),
            file_name,
            red(&msg)
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total_files: usize, succeeded: usize) {
        self.bar.finish_and_clear();
        let failed = self.errors.load(Ordering::SeqCst);
        let skipped = self.skipped.load(Ordering::SeqCst);

        if failed == 0 {
            eprintln!(
                "{} {}/{} files read  ({} skipped)",
                green("✔"),
                bold(&succeeded.to_string()),
                total_files,
                skipped,
            );
        } else {
            eprintln!(
                "{} {}/{} files read  ({} failed, {} skipped)",
                if succeeded == 0 { red("✘") } else { cyan("⚠") },
                bold(&succeeded.to_string()),
                total_files,
                red(&failed.to_string()),
                skipped,
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Print the text of a few scans and a PDF
  bloodcount scan_01.jpg scan_02.png report.pdf

  # Also ask a language model for the blood-count values
  bloodcount --fields report.pdf

  # Field extraction only, from text you already have
  bloodcount --text --fields report.txt

  # OCR each blank page of a mixed PDF and keep the enhanced bitmaps
  bloodcount --fallback page --keep-processed ./debug report.pdf

  # JSON output
  bloodcount --json --fields scan_01.jpg > result.json

OUTPUT:
  For every file that produced text:
    File: <name>
    Text:
    <recovered text>
  With --fields the mapping follows as `Label: value` lines.
  Skipped and failed files are reported on stderr.

ENVIRONMENT VARIABLES:
  TESSERACT_CMD           Path to the tesseract binary (default: PATH lookup)
  PDFIUM_LIB_PATH         Path to libpdfium or the directory holding it
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  RUST_LOG                Override the log filter

SETUP:
  1. Install tesseract with the `rus` and `eng` language data.
  2. Put libpdfium next to the binary, in a system path, or set PDFIUM_LIB_PATH.
  3. For --fields, set an API key:  export OPENAI_API_KEY=sk-...
"#;

/// Recover text from scanned blood-test reports and extract blood-count values.
#[derive(Parser, Debug)]
#[command(
    name = "bloodcount",
    version,
    about = "Recover text from blood-test reports and extract blood-count values",
    long_about = "Recover text from blood-test reports (PDF, PNG, JPEG; local files or URLs). \
PDFs with a text layer are read directly; scans are upscaled, contrast-equalised, denoised, \
binarised and passed to tesseract. Optionally a language model turns the text into \
`Label: value` fields.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local files or HTTP/HTTPS URLs (.pdf, .png, .jpg, .jpeg).
    #[arg(required = true)]
    inputs: Vec<String>,

    /// Treat every input as a UTF-8 text file and skip OCR (implies --fields).
    #[arg(long)]
    text: bool,

    /// Path to the tesseract binary.
    #[arg(long, env = "TESSERACT_CMD", default_value = "tesseract")]
    tesseract: PathBuf,

    /// Tesseract languages, joined with '+'.
    #[arg(long, env = "BLOODCOUNT_LANG", default_value = "rus+eng")]
    lang: String,

    /// Tesseract page segmentation mode.
    #[arg(long, default_value_t = 4)]
    psm: u8,

    /// Tesseract OCR engine mode.
    #[arg(long, default_value_t = 3)]
    oem: u8,

    /// Path to the pdfium shared library, or the directory holding it.
    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium_lib: Option<PathBuf>,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "BLOODCOUNT_PASSWORD")]
    password: Option<String>,

    /// When a PDF falls back to OCR: whole document or per blank page.
    #[arg(long, value_enum, default_value = "document")]
    fallback: FallbackArg,

    /// Also save each enhanced bitmap into this directory.
    #[arg(long)]
    keep_processed: Option<PathBuf>,

    /// Extract blood-count fields with a language model.
    #[arg(long)]
    fields: bool,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// LLM model ID (default: gpt-4.1-nano).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM temperature (0.0–2.0).
    #[arg(long, default_value_t = 0.2)]
    temperature: f32,

    /// Max LLM output tokens per report.
    #[arg(long, default_value_t = 100)]
    max_tokens: usize,

    /// Output structured JSON instead of text.
    #[arg(long)]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "BLOODCOUNT_NO_PROGRESS")]
    no_progress: bool,

    /// HTTP download timeout in seconds.
    #[arg(long, default_value_t = 120)]
    download_timeout: u64,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "BLOODCOUNT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "BLOODCOUNT_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum FallbackArg {
    Document,
    Page,
}

impl From<FallbackArg> for FallbackPolicy {
    fn from(v: FallbackArg) -> Self {
        match v {
            FallbackArg::Document => FallbackPolicy::DocumentWide,
            FallbackArg::Page => FallbackPolicy::PerPage,
        }
    }
}

/// One entry of `--json --fields` output.
#[derive(Serialize)]
struct FileFields {
    file_name: String,
    fields: Option<FieldMap>,
    error: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO-level library logs unless -v is given.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.text;
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

    let fields_wanted = cli.fields || cli.text;
    let field_extractor = if fields_wanted {
        Some(FieldExtractor::new(build_field_config(&cli)).context("No LLM provider available")?)
    } else {
        None
    };

    // ── Text-only mode ───────────────────────────────────────────────────
    if cli.text {
        let extractor = field_extractor.context("No LLM provider available")?;
        return run_text_mode(&cli, &extractor).await;
    }

    // ── Text recovery ────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn ExtractionProgressCallback>)
    } else {
        None
    };

    let config = build_config(&cli, progress_cb)?;
    let extractor = DocumentTextExtractor::new(config).context("Cannot start text extraction")?;
    let report = extractor.extract_files(&cli.inputs).await;

    let mut all_fields = Vec::new();
    if let Some(ref fx) = field_extractor {
        for result in report.results() {
            let entry = match fx.extract(&result.text).await {
                Ok(fields) => FileFields {
                    file_name: result.file_name.clone(),
                    fields: Some(fields),
                    error: None,
                },
                Err(e) => {
                    eprintln!("{} {}: {}", red("✗"), result.file_name, e);
                    FileFields {
                        file_name: result.file_name.clone(),
                        fields: None,
                        error: Some(e.to_string()),
                    }
                }
            };
            all_fields.push(entry);
        }
    }

    if cli.json {
        let json = if fields_wanted {
            serde_json::json!({ "report": &report, "fields": &all_fields })
        } else {
            serde_json::to_value(&report).context("Failed to serialise report")?
        };
        println!(
            "{}",
            serde_json::to_string_pretty(&json).context("Failed to serialise output")?
        );
    } else {
        print_report(&cli, &report, &all_fields)?;
    }

    if !cli.quiet && !show_progress && !cli.json {
        eprintln!(
            "Read {}/{} files ({} skipped, {} failed)",
            report.succeeded,
            report.total(),
            report.skipped,
            report.failed
        );
    }

    if report.total() > 0 && report.failed == report.total() {
        anyhow::bail!("All {} inputs failed", report.total());
    }
    Ok(())
}

/// Print `File:` / `Text:` blocks for successes, stderr lines for the rest.
fn print_report(cli: &Cli, report: &BatchReport, fields: &[FileFields]) -> Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let paired = fields_per_outcome(report, fields);

    for (outcome, outcome_fields) in report.outcomes.iter().zip(paired) {
        match outcome {
            FileOutcome::Succeeded(result) => {
                writeln!(out, "File: {}", result.file_name).context("Failed to write to stdout")?;
                writeln!(out, "Text:").context("Failed to write to stdout")?;
                out.write_all(result.text.as_bytes())
                    .context("Failed to write to stdout")?;
                if !result.text.ends_with('\n') {
                    out.write_all(b"\n").ok();
                }
                if let Some(map) = outcome_fields {
                    writeln!(out, "Fields:").context("Failed to write to stdout")?;
                    write_fields(&mut out, map)?;
                }
                writeln!(out).ok();
            }
            // With the progress bar active the callback already reported these.
            FileOutcome::Skipped { file_name, reason } if cli.no_progress || cli.quiet => {
                if !cli.quiet {
                    eprintln!("{} {}: {}", dim("skipped"), file_name, reason);
                }
            }
            FileOutcome::Failed { file_name, error } if cli.no_progress || cli.quiet => {
                eprintln!("{} {}: {}", red("failed"), file_name, error);
            }
            _ => {}
        }
    }
    Ok(())
}

/// Line up field results with outcomes. `fields` holds one entry per
/// succeeded outcome, in order, or is empty when fields were not requested.
/// Pairing is positional since different inputs can share a file name.
fn fields_per_outcome<'a>(
    report: &BatchReport,
    fields: &'a [FileFields],
) -> Vec<Option<&'a FieldMap>> {
    let mut entries = fields.iter();
    report
        .outcomes
        .iter()
        .map(|outcome| match outcome {
            FileOutcome::Succeeded(_) => entries.next().and_then(|e| e.fields.as_ref()),
            _ => None,
        })
        .collect()
}

fn write_fields(out: &mut impl Write, fields: &FieldMap) -> Result<()> {
    for (label, value) in fields {
        writeln!(out, "{label}: {value}").context("Failed to write to stdout")?;
    }
    Ok(())
}

/// `--text`: every input is a UTF-8 file of already-recovered report text.
async fn run_text_mode(cli: &Cli, extractor: &FieldExtractor) -> Result<()> {
    let mut entries = Vec::with_capacity(cli.inputs.len());

    for input in &cli.inputs {
        let entry = match tokio::fs::read_to_string(input).await {
            Ok(text) => match extractor.extract(&text).await {
                Ok(fields) => FileFields {
                    file_name: input.clone(),
                    fields: Some(fields),
                    error: None,
                },
                Err(e) => FileFields {
                    file_name: input.clone(),
                    fields: None,
                    error: Some(e.to_string()),
                },
            },
            Err(e) => FileFields {
                file_name: input.clone(),
                fields: None,
                error: Some(format!("cannot read text file: {e}")),
            },
        };
        entries.push(entry);
    }

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&entries).context("Failed to serialise output")?
        );
    } else {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        for entry in &entries {
            match (&entry.fields, &entry.error) {
                (Some(map), _) => {
                    writeln!(out, "File: {}", entry.file_name)
                        .context("Failed to write to stdout")?;
                    write_fields(&mut out, map)?;
                    writeln!(out).ok();
                }
                (None, Some(err)) => eprintln!("{} {}: {}", red("failed"), entry.file_name, err),
                (None, None) => {}
            }
        }
    }

    if !entries.is_empty() && entries.iter().all(|e| e.fields.is_none()) {
        anyhow::bail!("All {} inputs failed", entries.len());
    }
    Ok(())
}

/// Map CLI args to `ExtractionConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ExtractionConfig> {
    let languages: Vec<&str> = cli
        .lang
        .split('+')
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    let mut builder = ExtractionConfig::builder()
        .tesseract_cmd(&cli.tesseract)
        .languages(languages)
        .page_segmentation_mode(cli.psm)
        .engine_mode(cli.oem)
        .fallback(cli.fallback.into())
        .download_timeout_secs(cli.download_timeout);

    if let Some(ref lib) = cli.pdfium_lib {
        builder = builder.pdfium_library(lib);
    }
    if let Some(ref pwd) = cli.password {
        builder = builder.password(pwd.clone());
    }
    if let Some(ref dir) = cli.keep_processed {
        builder = builder.keep_processed_dir(dir);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Map CLI args to `FieldExtractionConfig`.
fn build_field_config(cli: &Cli) -> FieldExtractionConfig {
    let mut config = FieldExtractionConfig::default()
        .temperature(cli.temperature)
        .max_tokens(cli.max_tokens);
    if let Some(ref model) = cli.model {
        config = config.model(model.clone());
    }
    if let Some(ref provider) = cli.provider {
        config = config.provider_name(provider.clone());
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use bloodcount::{DocumentKind, ExtractionResult};

    fn succeeded(name: &str, text: &str) -> FileOutcome {
        FileOutcome::Succeeded(ExtractionResult {
            file_name: name.into(),
            kind: DocumentKind::Image,
            text: text.into(),
            pages: Vec::new(),
            duration_ms: 0,
        })
    }

    fn entry(name: &str, hemoglobin: Option<&str>) -> FileFields {
        FileFields {
            file_name: name.into(),
            fields: hemoglobin.map(|v| {
                FieldMap::from([("Гемоглобин".to_string(), v.to_string())])
            }),
            error: None,
        }
    }

    #[test]
    fn same_named_files_keep_their_own_fields() {
        let report = BatchReport::from_outcomes(vec![
            succeeded("scan.png", "a"),
            FileOutcome::Skipped {
                file_name: "notes.txt".into(),
                reason: "unsupported extension".into(),
            },
            succeeded("scan.png", "b"),
        ]);
        let fields = vec![entry("scan.png", Some("115")), entry("scan.png", Some("132"))];

        let paired = fields_per_outcome(&report, &fields);

        assert_eq!(paired.len(), 3);
        assert_eq!(paired[0].map(|m| m["Гемоглобин"].as_str()), Some("115"));
        assert!(paired[1].is_none());
        assert_eq!(paired[2].map(|m| m["Гемоглобин"].as_str()), Some("132"));
    }

    #[test]
    fn failed_field_extraction_leaves_a_gap() {
        let report =
            BatchReport::from_outcomes(vec![succeeded("a.png", "x"), succeeded("b.png", "y")]);
        let fields = vec![entry("a.png", None), entry("b.png", Some("120"))];

        let paired = fields_per_outcome(&report, &fields);

        assert!(paired[0].is_none());
        assert_eq!(paired[1].map(|m| m["Гемоглобин"].as_str()), Some("120"));
    }

    #[test]
    fn no_fields_requested() {
        let report = BatchReport::from_outcomes(vec![succeeded("a.png", "x")]);
        assert_eq!(fields_per_outcome(&report, &[]), vec![None]);
    }
}
