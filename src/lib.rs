//! Contact Extractor
//!
//! Scans IMAP mailboxes and extracts contact details (names, addresses, phone
//! numbers, companies, links) from messages using configurable regex rules.
//!
//! # Overview
//!
//! One run walks a fixed pipeline, one account at a time:
//! - **Configuration**: settings, accounts and rules loaded from TOML and validated up front
//! - **Connection**: an authenticated IMAP session per account over TLS
//! - **Scanning**: messages listed by UID and streamed in batches, parsed with `mail-parser`
//! - **Screening**: optional sender filtering before rules run
//! - **Evaluation**: every rule matched against each message; each match becomes a contact
//! - **Reporting**: contacts streamed to a [`Reporter`] as they are found, plus a [`RunReport`]
//!
//! An account that cannot be reached is reported and skipped; the others still run.
//!
//! # Example Usage
//!
//! ```no_run
//! use contact_extractor::{config, ImapConnector, MemoryReporter, ScanOptions};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let (accounts, rules) = config::load_inputs(
//!         Path::new("config/accounts.toml"),
//!         Path::new("config/rules.toml"),
//!     )
//!     .await?;
//!
//!     let mut reporter = MemoryReporter::new();
//!     let report = contact_extractor::pipeline::run_extraction(
//!         &accounts,
//!         &rules,
//!         ScanOptions::default(),
//!         &ImapConnector::default(),
//!         &mut reporter,
//!     )
//!     .await?;
//!
//!     println!("{} contacts", report.contacts_found);
//!     Ok(())
//! }
//! ```
//!
//! # Module Organization
//!
//! - [`cli`] - Command-line interface and console reporter
//! - [`client`] - IMAP connector and session traits
//! - [`config`] - Settings, accounts and rules loading
//! - [`error`] - Error types and result aliases
//! - [`evaluator`] - Rule evaluation and value normalization
//! - [`models`] - Core data structures
//! - [`pipeline`] - Run orchestration
//! - [`report`] - Reporter trait and run report
//! - [`scanner`] - Message listing, batching and parsing
//! - [`screening`] - Sender screening

pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod models;
pub mod pipeline;
pub mod report;
pub mod scanner;
pub mod screening;

pub use error::{ExtractorError, Result};

// Core data models
pub use models::{Account, Contact, ContactField, MatchSource, Message, MessageRef, Rule};

// Config types
pub use config::{Config, OutputFormat, RuleSet, ScanConfig, ScreeningConfig};

// Connector traits
pub use client::{ImapConnector, MailConnector, MailSession, RawMessage};

pub use evaluator::RuleEvaluator;
pub use pipeline::Pipeline;
pub use report::{AccountSummary, MemoryReporter, Reporter, RunReport};
pub use scanner::{MessageScanner, ScanOptions};
pub use screening::{ScreenVerdict, SenderScreen};

// CLI types (for binary usage)
pub use cli::{Cli, Commands, ConsoleReporter, ProgressReporter};
