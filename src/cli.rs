//! Command-line interface

use clap::{Parser, Subcommand};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::auth::{self, Session};
use crate::config::Config;
use crate::error::{Result, TriageError};
use crate::model::GeminiModel;
use crate::models::{Category, MailItem, MutationReport};
use crate::pipeline::{self, RunRequest};

#[derive(Parser, Debug)]
#[command(name = "inbox-triage")]
#[command(version = "0.1.0")]
#[command(about = "Sort unread mail into review folders with a generative model", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Path to OAuth2 credentials file
    #[arg(long, default_value = "credentials.json")]
    pub credentials: PathBuf,

    /// Path to token cache file
    #[arg(long, default_value = ".inbox-triage/token.json")]
    pub token_cache: PathBuf,

    /// Verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Authenticate with Gmail API
    Auth {
        /// Force re-authentication even if token exists
        #[arg(long)]
        force: bool,
    },

    /// Classify matching mail and move it into category labels
    Run {
        /// Search query (overrides fetch.query)
        #[arg(short, long)]
        query: Option<String>,

        /// Maximum number of items to classify (overrides fetch.max_total)
        #[arg(short, long)]
        max: Option<usize>,

        /// Classify but don't create labels or modify mail
        #[arg(long)]
        dry_run: bool,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,

        /// Write a Markdown report to this path
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// List the items a run would classify
    Preview {
        /// Search query (overrides fetch.query)
        #[arg(short, long)]
        query: Option<String>,

        /// Maximum number of items to list (overrides fetch.max_total)
        #[arg(short, long)]
        max: Option<usize>,

        /// Also print the classification prompt
        #[arg(long)]
        show_prompt: bool,
    },

    /// Generate example configuration file
    InitConfig {
        /// Path to create config file
        #[arg(short, long, default_value = "config.toml")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },
}

/// Truncate a string to max_len characters, adding "..." if truncated
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        format!("{}...", s.chars().take(max_len.saturating_sub(3)).collect::<String>())
    }
}

/// Progress reporter using indicatif
pub struct ProgressReporter {
    multi: MultiProgress,
    spinner_style: ProgressStyle,
}

impl ProgressReporter {
    pub fn new() -> Self {
        Self::with_multi_progress(MultiProgress::new())
    }

    /// Share a MultiProgress with the tracing writer so log lines print above spinners
    pub fn with_multi_progress(multi: MultiProgress) -> Self {
        let spinner_style = ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed:>6}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ");

        Self {
            multi,
            spinner_style,
        }
    }

    pub fn multi_progress(&self) -> &MultiProgress {
        &self.multi
    }

    pub fn add_spinner(&self, msg: &str) -> ProgressBar {
        let pb = self.multi.add(ProgressBar::new_spinner());
        pb.set_style(self.spinner_style.clone());
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }

    /// Finish a spinner and clear it from the multi-progress display
    pub fn finish_spinner(&self, pb: &ProgressBar, msg: &str) {
        pb.finish_and_clear();
        let _ = self.multi.println(format!("  ✓ {}", msg));
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

/// Apply command-line overrides to the configured run parameters
pub fn build_request(
    config: &Config,
    query: Option<String>,
    max: Option<usize>,
    dry_run: bool,
) -> RunRequest {
    let mut request = RunRequest::from_config(config);
    if let Some(query) = query {
        request.query = query;
    }
    if let Some(max) = max {
        request.max_total = max.max(1);
    }
    request.dry_run |= dry_run;
    request
}

async fn load_session(cli: &Cli) -> Result<Session> {
    let session = auth::session_from_cache(&cli.credentials, &cli.token_cache).await?;
    if !session.is_authenticated() {
        return Err(TriageError::Unauthenticated);
    }
    Ok(session)
}

/// Execute the `run` command end to end
pub async fn run_triage(
    cli: &Cli,
    query: Option<String>,
    max: Option<usize>,
    dry_run: bool,
    skip_confirmation: bool,
    multi: MultiProgress,
) -> Result<Option<MutationReport>> {
    let reporter = ProgressReporter::with_multi_progress(multi);

    let config_spinner = reporter.add_spinner("Loading configuration...");
    let config = Config::load(&cli.config).await?;
    config.validate()?;
    let request = build_request(&config, query, max, dry_run);
    reporter.finish_spinner(&config_spinner, &format!("Configuration loaded from {:?}", cli.config));

    let auth_spinner = reporter.add_spinner("Loading cached credentials...");
    let session = load_session(cli).await?;
    let model = GeminiModel::from_config(&config.classification, &config.api_key()?)?;
    reporter.finish_spinner(&auth_spinner, "Gmail API authenticated");

    if !request.dry_run && !skip_confirmation {
        let message = format!(
            "Classify up to {} items matching '{}' and move them out of the inbox?",
            request.max_total, request.query
        );
        let confirmed = reporter.multi_progress().suspend(|| confirm_action(&message))?;
        if !confirmed {
            let _ = reporter.multi_progress().println("Aborted.");
            return Ok(None);
        }
    }

    let run_spinner = reporter.add_spinner("Fetching and classifying mail...");
    let report = pipeline::run_classification(&session, &model, &request).await?;
    reporter.finish_spinner(
        &run_spinner,
        &format!(
            "Processed {} items in {} seconds",
            report.items_fetched,
            report.duration_seconds()
        ),
    );

    Ok(Some(report))
}

/// Execute the `preview` command, returning the fetched items and optionally the prompt
pub async fn run_preview(
    cli: &Cli,
    query: Option<String>,
    max: Option<usize>,
    show_prompt: bool,
) -> Result<(Vec<MailItem>, Option<String>)> {
    let config = Config::load(&cli.config).await?;
    config.validate()?;
    let request = build_request(&config, query, max, true);

    let session = load_session(cli).await?;
    let items = pipeline::fetch_preview(&session, &request).await?;
    let prompt = show_prompt.then(|| pipeline::preview_prompt(&config, &items));

    Ok((items, prompt))
}

/// Print the run summary to stdout
pub fn print_summary(report: &MutationReport) {
    println!("\n========================================");
    if report.dry_run {
        println!("Triage Summary (DRY RUN)");
    } else {
        println!("Triage Summary");
    }
    println!("========================================");
    println!("Run ID: {}", report.run_id);
    println!("Duration: {} seconds", report.duration_seconds());
    println!("Items fetched: {}", report.items_fetched);
    if report.fetch_truncated {
        println!("  (search failed part-way; later pages were not fetched)");
    }
    for category in Category::ALL {
        let count = report.resolved.get(&category).map(Vec::len).unwrap_or(0);
        println!("  {}: {}", category, count);
    }
    if report.dropped_references > 0 {
        println!("Dropped references: {}", report.dropped_references);
    }
    if report.degraded {
        println!(
            "Classification unavailable after {} attempts; nothing was labeled",
            report.classification_attempts
        );
    }
    if report.dry_run {
        println!("Planned mutations: {}", report.planned_mutations());
    } else {
        println!("Labels created: {}", report.labels_created);
        println!("Items labeled: {}", report.applied_count);
        println!("Failed mutations: {}", report.failed_count);
        if report.label_setup_failed {
            println!("Category labels could not be prepared; no item was moved");
        }
    }
    println!("========================================");
}

/// Print fetched items, one line each
pub fn print_preview(items: &[MailItem]) {
    if items.is_empty() {
        println!("No matching items.");
        return;
    }
    for (i, item) in items.iter().enumerate() {
        println!("Email {:>3}  {}  {}", i + 1, item.id, truncate_string(&item.snippet, 80));
    }
}

/// Write the Markdown report
pub async fn write_report(report: &MutationReport, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    tokio::fs::write(path, report.to_markdown()).await?;
    Ok(())
}

/// Prompt user for confirmation
fn confirm_action(prompt: &str) -> Result<bool> {
    inquire::Confirm::new(prompt)
        .with_default(false)
        .prompt()
        .map_err(|e| match e {
            inquire::InquireError::OperationCanceled | inquire::InquireError::OperationInterrupted => {
                TriageError::OperationCancelled("confirmation prompt closed".to_string())
            }
            other => TriageError::IoError(std::io::Error::new(std::io::ErrorKind::Other, other.to_string())),
        })
}
