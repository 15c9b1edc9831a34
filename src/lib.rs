//! Inbox Triage
//!
//! Fetches a batch of unread mail, asks a generative model to sort it into a
//! fixed set of folders, and moves each item out of the inbox into the label
//! for its folder.
//!
//! # Overview
//!
//! - **Authentication**: OAuth2 with token caching, carried per run in a [`Session`]
//! - **Fetching**: paginated retrieval of item snippets, capped per run
//! - **Classification**: prompt rendering, bounded retry, strict response parsing
//! - **Resolution**: positional references ("Email 3") mapped back to item ids
//! - **Labeling**: idempotent label creation and per-item label mutation
//!
//! # Example Usage
//!
//! ```no_run
//! use inbox_triage::{auth, config::Config, model::GeminiModel, pipeline};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml".as_ref()).await?;
//!
//!     let session = auth::session_from_cache(
//!         "credentials.json".as_ref(),
//!         ".inbox-triage/token.json".as_ref(),
//!     )
//!     .await?;
//!     let model = GeminiModel::from_config(&config.classification, &config.api_key()?)?;
//!
//!     let request = pipeline::RunRequest::from_config(&config);
//!     let report = pipeline::run_classification(&session, &model, &request).await?;
//!     println!("{}", report.to_markdown());
//!
//!     Ok(())
//! }
//! ```
//!
//! # Module Organization
//!
//! - [`auth`] - OAuth2 authentication and the run session
//! - [`client`] - Mail provider trait and the Gmail implementation
//! - [`fetcher`] - Paginated item retrieval
//! - [`prompt`] - Classification prompt rendering
//! - [`model`] - Generative model trait and the Gemini adapter
//! - [`classifier`] - Retrying classification and response parsing
//! - [`resolver`] - Reference to item id resolution
//! - [`label_manager`] - Label catalog setup and mutation
//! - [`pipeline`] - The end-to-end run
//! - [`cli`] - Command-line interface
//! - [`config`] - Configuration management
//! - [`error`] - Error types and result aliases
//! - [`models`] - Core data structures

pub mod auth;
pub mod classifier;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod label_manager;
pub mod model;
pub mod models;
pub mod pipeline;
pub mod prompt;
pub mod resolver;

// Re-export commonly used types for convenience
pub use error::{Result, TriageError};

// Core data models
pub use models::{Category, ClassificationResult, MailItem, MutationReport};

// Session and provider seams
pub use auth::Session;
pub use client::{GmailMailService, LabelInfo, MailContent, MailService, SearchPage};
pub use model::{GeminiModel, GenerativeModel, ResponseFormat};

// Config types
pub use config::{
    ClassificationConfig, Config, ExecutionConfig, FetchConfig, LabelConfig, TaxonomyConfig,
};

// Pipeline stages
pub use classifier::{ClassificationClient, ClassificationOutcome};
pub use fetcher::{FetchedBatch, MailFetcher};
pub use label_manager::{ApplyOutcome, LabelApplier};
pub use pipeline::{run_classification, RunRequest};
pub use prompt::PromptBuilder;
pub use resolver::Resolution;

// CLI types (for binary usage)
pub use cli::{Cli, Commands, ProgressReporter};
