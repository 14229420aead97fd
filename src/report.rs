//! Result reporting: per-event hooks and the end-of-run report

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt::Write as _;

use crate::error::ExtractorError;
use crate::models::{Account, Contact, Message};

/// Receives pipeline events as they happen.
///
/// Contacts are handed over one at a time the moment they are extracted, so an
/// implementation can stream them without waiting for the run to finish.
pub trait Reporter: Send {
    fn account_started(&mut self, _account: &Account) {}

    /// Session established; `messages` is the number of messages that will be scanned
    fn account_connected(&mut self, _account: &Account, _messages: usize) {}

    fn account_failed(&mut self, account: &Account, error: &ExtractorError);

    fn message_scanned(&mut self, _message: &Message) {}

    fn contact_extracted(&mut self, contact: &Contact);

    /// A message could not be parsed or a rule match could not become a contact
    fn extraction_failed(&mut self, _account: &Account, _error: &ExtractorError) {}

    fn account_finished(&mut self, _account: &Account, _summary: &AccountSummary) {}
}

/// Per-account counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AccountSummary {
    pub account_id: String,
    pub messages_scanned: usize,
    /// Screened out before rule evaluation
    pub messages_skipped: usize,
    /// Could not be parsed
    pub messages_failed: usize,
    pub contacts_found: usize,
    /// Dropped as duplicates of an earlier contact
    pub duplicates_dropped: usize,
    pub extraction_errors: usize,
}

impl AccountSummary {
    pub fn new(account_id: &str) -> Self {
        Self {
            account_id: account_id.to_string(),
            ..Default::default()
        }
    }
}

/// An account that could not be (fully) processed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountFailure {
    pub account_id: String,
    pub error: String,
}

/// Outcome of one extraction run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_seconds: i64,
    pub accounts_total: usize,
    /// Accounts that got a session, including ones interrupted mid-scan
    pub accounts: Vec<AccountSummary>,
    pub failures: Vec<AccountFailure>,
    pub messages_scanned: usize,
    pub messages_skipped: usize,
    pub messages_failed: usize,
    pub contacts_found: usize,
    pub extraction_errors: usize,
}

impl RunReport {
    pub fn new(accounts_total: usize) -> Self {
        let now = Utc::now();
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            started_at: now,
            completed_at: now,
            duration_seconds: 0,
            accounts_total,
            accounts: Vec::new(),
            failures: Vec::new(),
            messages_scanned: 0,
            messages_skipped: 0,
            messages_failed: 0,
            contacts_found: 0,
            extraction_errors: 0,
        }
    }

    pub fn record_account(&mut self, summary: AccountSummary) {
        self.messages_scanned += summary.messages_scanned;
        self.messages_skipped += summary.messages_skipped;
        self.messages_failed += summary.messages_failed;
        self.contacts_found += summary.contacts_found;
        self.extraction_errors += summary.extraction_errors;
        self.accounts.push(summary);
    }

    pub fn record_failure(&mut self, account_id: &str, error: &ExtractorError) {
        self.failures.push(AccountFailure {
            account_id: account_id.to_string(),
            error: error.to_string(),
        });
    }

    pub fn finish(&mut self) {
        self.completed_at = Utc::now();
        self.duration_seconds = (self.completed_at - self.started_at).num_seconds();
    }

    pub fn accounts_failed(&self) -> usize {
        self.failures.len()
    }

    /// Accounts scanned to completion
    pub fn accounts_processed(&self) -> usize {
        self.accounts_total.saturating_sub(self.failures.len())
    }

    pub fn account(&self, account_id: &str) -> Option<&AccountSummary> {
        self.accounts.iter().find(|a| a.account_id == account_id)
    }

    /// Human-readable summary block printed at the end of a run
    pub fn to_summary(&self) -> String {
        let mut out = String::new();
        let rule = "========================================";

        let _ = writeln!(out, "\n{}", rule);
        let _ = writeln!(out, "Contact Extraction Summary");
        let _ = writeln!(out, "{}", rule);
        let _ = writeln!(out, "Run ID: {}", self.run_id);
        let _ = writeln!(out, "Duration: {} seconds", self.duration_seconds);
        let _ = writeln!(
            out,
            "Accounts: {} processed, {} failed, {} total",
            self.accounts_processed(),
            self.accounts_failed(),
            self.accounts_total
        );
        let _ = writeln!(out, "Messages scanned: {}", self.messages_scanned);
        if self.messages_skipped > 0 {
            let _ = writeln!(out, "Messages skipped: {}", self.messages_skipped);
        }
        if self.messages_failed > 0 {
            let _ = writeln!(out, "Messages unreadable: {}", self.messages_failed);
        }
        let _ = writeln!(out, "Contacts found: {}", self.contacts_found);
        if self.extraction_errors > 0 {
            let _ = writeln!(out, "Extraction errors: {}", self.extraction_errors);
        }

        if !self.failures.is_empty() {
            let _ = writeln!(out, "\nFailed accounts:");
            for failure in &self.failures {
                let _ = writeln!(out, "  - {}: {}", failure.account_id, failure.error);
            }
        }
        let _ = write!(out, "{}", rule);
        out
    }
}

/// Collects every event in memory
#[derive(Debug, Default)]
pub struct MemoryReporter {
    pub contacts: Vec<Contact>,
    pub started: Vec<String>,
    pub connected: Vec<(String, usize)>,
    pub failed: Vec<(String, String)>,
    pub scanned: Vec<(String, u32)>,
    pub extraction_errors: Vec<String>,
    pub finished: Vec<AccountSummary>,
}

impl MemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Reporter for MemoryReporter {
    fn account_started(&mut self, account: &Account) {
        self.started.push(account.id.clone());
    }

    fn account_connected(&mut self, account: &Account, messages: usize) {
        self.connected.push((account.id.clone(), messages));
    }

    fn account_failed(&mut self, account: &Account, error: &ExtractorError) {
        self.failed.push((account.id.clone(), error.to_string()));
    }

    fn message_scanned(&mut self, message: &Message) {
        self.scanned.push((message.account_id.clone(), message.uid));
    }

    fn contact_extracted(&mut self, contact: &Contact) {
        self.contacts.push(contact.clone());
    }

    fn extraction_failed(&mut self, _account: &Account, error: &ExtractorError) {
        self.extraction_errors.push(error.to_string());
    }

    fn account_finished(&mut self, _account: &Account, summary: &AccountSummary) {
        self.finished.push(summary.clone());
    }
}
