//! CLI binary for expensepal.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ExpenseConfig` and prints results as JSON.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use expensepal::{
    check_policy_compliance, extract_invoice_page, extract_policies, extract_policies_from_text,
    CatalogRule, ComplianceRequest, ExpenseConfig, ExtractionProgressCallback, FileKind,
    InvoiceRecord, PolicyRule, ProgressCallback,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

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

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress for policy documents: a live bar plus one log line per
/// page. Pages complete out of order.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    /// The bar starts as a spinner; `on_extraction_start` sets its length.
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(TICKS),
        );
        bar.set_prefix("Preparing");
        bar.set_message("Rendering pages…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Extracting");
        self.bar.reset_eta();
    }

    fn elapsed_secs(&self, page_num: usize) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut t| t.remove(&page_num))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl ExtractionProgressCallback for CliProgressCallback {
    fn on_extraction_start(&self, total_pages: usize) {
        self.activate_bar(total_pages);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Reading policies from {total_pages} pages…"))
        ));
    }

    fn on_page_start(&self, page_num: usize, _total: usize) {
        if let Ok(mut t) = self.start_times.lock() {
            t.insert(page_num, Instant::now());
        }
        self.bar.set_message(format!("page {page_num}"));
    }

    fn on_page_complete(&self, page_num: usize, total: usize, policies_found: usize) {
        let secs = self.elapsed_secs(page_num);
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {:<10}  {}",
            green("✓"),
            page_num,
            total,
            dim(&format!("{policies_found:>3} rules")),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_page_error(&self, page_num: usize, total: usize, error: &str) {
        let secs = self.elapsed_secs(page_num);
        self.errors.fetch_add(1, Ordering::SeqCst);

        let msg: String = if error.chars().count() > 80 {
            error.chars().take(79).chain(['\u{2026}']).collect()
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}  {}",
            red("✗"),
            page_num,
            total,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_extraction_complete(&self, total_pages: usize, success_count: usize, policies_found: usize) {
        let failed = self.errors.load(Ordering::SeqCst);
        self.bar.finish_and_clear();

        if failed == 0 {
            eprintln!(
                "{} {} pages read, {} rules before deduplication",
                green("✔"),
                bold(&success_count.to_string()),
                policies_found
            );
        } else {
            eprintln!(
                "{} {}/{} pages read  ({} failed)",
                if failed == total_pages { red("✘") } else { cyan("⚠") },
                bold(&success_count.to_string()),
                total_pages,
                red(&failed.to_string()),
            );
        }
    }
}

/// Spinner for single-call commands.
fn spinner(enabled: bool, message: &str) -> Option<ProgressBar> {
    if !enabled {
        return None;
    }
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS),
    );
    bar.set_message(message.to_string());
    bar.enable_steady_tick(Duration::from_millis(80));
    Some(bar)
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Extract invoice fields from a receipt photo
  expensepal invoice dinner.jpg

  # Second page of a PDF invoice
  expensepal invoice --page 2 hotel.pdf

  # Extract policy rules from a handbook, a web page, or plain text
  expensepal policies travel-policy.pdf -o policies.json
  expensepal policies https://example.com/expense-policy
  expensepal policies --text policy.txt

  # Check an invoice against extracted rules
  expensepal invoice dinner.jpg -o invoice.json
  expensepal check --invoice invoice.json --policies policies.json --seniority junior

  # Or send a single request document (invoice fields + policyRules)
  expensepal check --request request.json

  # Try a newer model first, fall back when it is unavailable
  expensepal --provider anthropic \
    --model claude-3-7-sonnet-20250219 --model claude-3-5-sonnet-20241022 \
    policies travel-policy.pdf

ENVIRONMENT VARIABLES:
  ANTHROPIC_API_KEY       Anthropic API key
  OPENAI_API_KEY          OpenAI API key
  EXPENSEPAL_PROVIDER     Provider (anthropic, openai, gemini, ollama, …)
  EXPENSEPAL_MODEL        Model id tried first (comma-separated list allowed)
  PDFIUM_LIB_PATH         Directory containing libpdfium
  RUST_LOG                Log filter, e.g. expensepal=debug
"#;

/// Extract expense data and policies from documents and check compliance.
#[derive(Parser, Debug)]
#[command(
    name = "expensepal",
    version,
    about = "Extract invoices and expense policies with an LLM, then check compliance",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// LLM provider: anthropic, openai, gemini, ollama, azure.
    #[arg(long, global = true, env = "EXPENSEPAL_PROVIDER")]
    provider: Option<String>,

    /// Candidate model id; repeat to add fallbacks, tried in order.
    #[arg(long = "model", global = true, env = "EXPENSEPAL_MODEL", value_delimiter = ',')]
    models: Vec<String>,

    /// Rendering DPI (72–400).
    #[arg(long, global = true, env = "EXPENSEPAL_DPI", default_value_t = 300,
          value_parser = clap::value_parser!(u32).range(72..=400))]
    dpi: u32,

    /// Number of pages sent to the model concurrently.
    #[arg(short, long, global = true, env = "EXPENSEPAL_CONCURRENCY", default_value_t = 12)]
    concurrency: usize,

    /// PDF user password for encrypted documents.
    #[arg(long, global = true, env = "EXPENSEPAL_PASSWORD")]
    password: Option<String>,

    /// LLM temperature (0.0–2.0).
    #[arg(long, global = true, env = "EXPENSEPAL_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// URL fetch timeout in seconds.
    #[arg(long, global = true, env = "EXPENSEPAL_FETCH_TIMEOUT", default_value_t = 60)]
    fetch_timeout: u64,

    /// Write JSON to this file instead of stdout.
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    /// Disable progress output.
    #[arg(long, global = true, env = "EXPENSEPAL_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "EXPENSEPAL_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "EXPENSEPAL_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract invoice fields from a PDF page or an image.
    Invoice {
        /// Invoice PDF, JPEG or PNG.
        file: PathBuf,

        /// pdf or image. Sniffed from the file when omitted.
        #[arg(long)]
        file_type: Option<String>,

        /// 1-based PDF page holding the invoice.
        #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
        page: u32,
    },

    /// Extract policy rules from a PDF, a URL, or a text file.
    Policies {
        /// Local PDF path or HTTP/HTTPS URL.
        #[arg(required_unless_present = "text", conflicts_with = "text")]
        input: Option<String>,

        /// Plain-text policy file ("-" for stdin).
        #[arg(long)]
        text: Option<PathBuf>,
    },

    /// Check an invoice against policy rules.
    Check {
        /// JSON request: invoice fields plus `seniority` and `policyRules`.
        #[arg(long, conflicts_with_all = ["invoice", "policies", "seniority"])]
        request: Option<PathBuf>,

        /// Invoice JSON as printed by `expensepal invoice`.
        #[arg(long, required_unless_present = "request", requires = "policies")]
        invoice: Option<PathBuf>,

        /// Rules JSON: output of `expensepal policies`, or an array of rules.
        #[arg(long)]
        policies: Option<PathBuf>,

        /// Employee seniority (junior, mid-level, senior, executive).
        #[arg(long)]
        seniority: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Library INFO logs are suppressed while progress output is active.
    let show_progress = !cli.quiet && !cli.no_progress;
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

    match &cli.command {
        Command::Invoice {
            file,
            file_type,
            page,
        } => {
            let kind = match file_type {
                Some(t) => t.parse::<FileKind>()?,
                None => sniff_kind(file)?,
            };
            let config = build_config(&cli, None)?;

            let bar = spinner(show_progress, &format!("Reading invoice {}", file.display()));
            let result = extract_invoice_page(file, kind, *page as usize - 1, &config).await;
            if let Some(bar) = bar {
                bar.finish_and_clear();
            }
            let invoice = result.context("Invoice extraction failed")?;
            emit(&cli, &invoice)
        }

        Command::Policies { input, text } => {
            let extraction = if let Some(path) = text {
                let config = build_config(&cli, None)?;
                let content = read_input(path)?;
                let bar = spinner(show_progress, "Reading policy text");
                let result = extract_policies_from_text(&content, &config).await;
                if let Some(bar) = bar {
                    bar.finish_and_clear();
                }
                result.context("Policy extraction failed")?
            } else {
                let input = input.as_deref().context("A PDF path or URL is required")?;
                let progress: Option<ProgressCallback> = if show_progress {
                    Some(CliProgressCallback::new_dynamic() as Arc<dyn ExtractionProgressCallback>)
                } else {
                    None
                };
                let config = build_config(&cli, progress)?;
                extract_policies(input, &config)
                    .await
                    .context("Policy extraction failed")?
            };

            if !cli.quiet {
                eprintln!(
                    "{} {} unique rules{}",
                    green("✔"),
                    bold(&extraction.policies.len().to_string()),
                    match extraction.page_count {
                        Some(n) => format!(" from {n} pages"),
                        None => String::new(),
                    }
                );
            }
            emit(&cli, &extraction)
        }

        Command::Check {
            request,
            invoice,
            policies,
            seniority,
        } => {
            let (seniority, invoice, rules) = match request {
                Some(path) => {
                    let req: ComplianceRequest = serde_json::from_str(&read_input(path)?)
                        .with_context(|| format!("Invalid compliance request in {}", path.display()))?;
                    (req.seniority, req.invoice, req.policy_rules)
                }
                None => {
                    let invoice_path = invoice.as_ref().context("--invoice is required")?;
                    let policies_path = policies.as_ref().context("--policies is required")?;
                    let invoice: InvoiceRecord = serde_json::from_str(&read_input(invoice_path)?)
                        .with_context(|| format!("Invalid invoice JSON in {}", invoice_path.display()))?;
                    let rules_json: Value = serde_json::from_str(&read_input(policies_path)?)
                        .with_context(|| format!("Invalid JSON in {}", policies_path.display()))?;
                    (seniority.clone(), invoice, parse_catalog(rules_json)?)
                }
            };

            let config = build_config(&cli, None)?;
            let bar = spinner(
                show_progress,
                &format!("Checking invoice against {} rules", rules.len()),
            );
            let verdict =
                check_policy_compliance(seniority.as_deref(), &invoice, &rules, &config).await;
            if let Some(bar) = bar {
                bar.finish_and_clear();
            }

            if !cli.quiet {
                if verdict.is_compliant {
                    eprintln!("{} compliant", green("✔"));
                } else {
                    eprintln!(
                        "{} not compliant  ({} violations)",
                        red("✘"),
                        verdict.violations.len()
                    );
                }
            }
            emit(&cli, &verdict)
        }
    }
}

/// Map CLI args to `ExpenseConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ExpenseConfig> {
    let mut builder = ExpenseConfig::builder()
        .dpi(cli.dpi)
        .concurrency(cli.concurrency)
        .temperature(cli.temperature)
        .fetch_timeout_secs(cli.fetch_timeout)
        .models(cli.models.iter().map(|m| m.trim()).filter(|m| !m.is_empty()));

    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(ref password) = cli.password {
        builder = builder.password(password.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Guess the invoice file kind from its first bytes.
fn sniff_kind(path: &Path) -> Result<FileKind> {
    let mut magic = [0u8; 4];
    let mut file =
        std::fs::File::open(path).with_context(|| format!("Cannot open {}", path.display()))?;
    let n = file.read(&mut magic).unwrap_or(0);
    Ok(if &magic[..n] == b"%PDF" {
        FileKind::Pdf
    } else {
        FileKind::Image
    })
}

/// Read a file, or stdin for "-".
fn read_input(path: &Path) -> Result<String> {
    if path.as_os_str() == "-" {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read stdin")?;
        return Ok(buf);
    }
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

/// Accept a rule array (catalog or extracted rules) or an object holding
/// one under `policies` / `policyRules`.
fn parse_catalog(value: Value) -> Result<Vec<CatalogRule>> {
    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("policies").or_else(|| map.remove("policyRules")) {
            Some(Value::Array(items)) => items,
            _ => bail!("Expected a \"policies\" or \"policyRules\" array"),
        },
        _ => bail!("Expected a JSON array of rules or an object holding one"),
    };

    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| {
            let rule = if item.get("rule").is_some() {
                serde_json::from_value::<CatalogRule>(item)
            } else {
                serde_json::from_value::<PolicyRule>(item).map(CatalogRule::from)
            };
            rule.with_context(|| format!("Invalid policy rule at index {i}"))
        })
        .collect()
}

/// Print pretty JSON to stdout or `--output`.
fn emit<T: Serialize>(cli: &Cli, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialise output")?;
    match cli.output {
        Some(ref path) => {
            std::fs::write(path, format!("{json}\n"))
                .with_context(|| format!("Failed to write {}", path.display()))?;
            if !cli.quiet {
                eprintln!("   → {}", bold(&path.display().to_string()));
            }
        }
        None => println!("{json}"),
    }
    Ok(())
}
