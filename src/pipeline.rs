//! Orchestration: accounts → sessions → messages → contacts → reporter

use futures::StreamExt;
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::client::{MailConnector, MailSession};
use crate::config::{self, RuleSet};
use crate::error::{ExtractorError, Result};
use crate::evaluator::RuleEvaluator;
use crate::models::Account;
use crate::report::{AccountSummary, Reporter, RunReport};
use crate::scanner::{MessageScanner, ScanOptions};
use crate::screening::SenderScreen;

/// A validated extraction run, ready to be pointed at accounts
pub struct Pipeline {
    evaluator: RuleEvaluator,
    screen: SenderScreen,
    options: ScanOptions,
    dedupe: bool,
}

impl Pipeline {
    pub fn new(rule_set: &RuleSet, options: ScanOptions) -> Result<Self> {
        if rule_set.rules.is_empty() {
            return Err(ExtractorError::ConfigError(
                "at least one rule is required".to_string(),
            ));
        }

        Ok(Self {
            evaluator: RuleEvaluator::new(rule_set)?,
            screen: SenderScreen::from_config(&rule_set.screening)?,
            options,
            dedupe: rule_set.options.dedupe,
        })
    }

    /// Process `accounts` in order, one at a time.
    ///
    /// An account that fails to connect, or whose session breaks mid-scan, is
    /// reported and recorded; the remaining accounts are still processed.
    pub async fn run(
        &self,
        accounts: &[Account],
        connector: &dyn MailConnector,
        reporter: &mut dyn Reporter,
    ) -> RunReport {
        let mut report = RunReport::new(accounts.len());
        info!(
            "Starting run {} over {} account(s) with {} rule(s)",
            report.run_id,
            accounts.len(),
            self.evaluator.len()
        );

        for account in accounts {
            reporter.account_started(account);

            let mut session = match connector.connect(account).await {
                Ok(session) => session,
                Err(e) => {
                    warn!("Skipping account '{}': {}", account.id, e);
                    reporter.account_failed(account, &e);
                    report.record_failure(&account.id, &e);
                    continue;
                }
            };

            let mut summary = AccountSummary::new(&account.id);
            let outcome = self
                .scan_account(session.as_mut(), account, reporter, &mut summary)
                .await;

            if let Err(e) = session.logout().await {
                debug!("Logout from '{}' failed: {}", account.id, e);
            }

            if let Err(e) = &outcome {
                warn!("Account '{}' interrupted: {}", account.id, e);
                reporter.account_failed(account, e);
                report.record_failure(&account.id, e);
            }

            info!(
                "Account '{}' done: {} scanned, {} contacts",
                account.id, summary.messages_scanned, summary.contacts_found
            );
            reporter.account_finished(account, &summary);
            report.record_account(summary);
        }

        report.finish();
        info!(
            "Run {} finished: {} contacts from {} messages",
            report.run_id, report.contacts_found, report.messages_scanned
        );
        report
    }

    async fn scan_account(
        &self,
        session: &mut dyn MailSession,
        account: &Account,
        reporter: &mut dyn Reporter,
        summary: &mut AccountSummary,
    ) -> Result<()> {
        let mut scanner = MessageScanner::new(session, account, &self.options);
        let uids = scanner.select_uids().await?;
        reporter.account_connected(account, uids.len());

        let mut seen = HashSet::new();
        let mut messages = scanner.into_stream(uids);

        while let Some(item) = messages.next().await {
            let message = match item {
                Ok(message) => message,
                Err(e) if e.is_message_scoped() => {
                    warn!("Skipping unreadable message in '{}': {}", account.id, e);
                    summary.messages_failed += 1;
                    reporter.extraction_failed(account, &e);
                    continue;
                }
                Err(e) => return Err(e),
            };

            summary.messages_scanned += 1;
            reporter.message_scanned(&message);

            let verdict = self.screen.screen(&message);
            if !verdict.is_accept() {
                debug!("Message {} skipped: {}", message.reference(), verdict);
                summary.messages_skipped += 1;
                continue;
            }

            for result in self.evaluator.evaluate(&message) {
                match result {
                    Ok(contact) => {
                        if self.dedupe && !seen.insert(contact.dedupe_key()) {
                            summary.duplicates_dropped += 1;
                            continue;
                        }
                        summary.contacts_found += 1;
                        reporter.contact_extracted(&contact);
                    }
                    Err(e) => {
                        warn!("Account '{}': {}", account.id, e);
                        summary.extraction_errors += 1;
                        reporter.extraction_failed(account, &e);
                    }
                }
            }
        }

        Ok(())
    }
}

/// Run one extraction over already loaded accounts and rules
pub async fn run_extraction(
    accounts: &[Account],
    rule_set: &RuleSet,
    options: ScanOptions,
    connector: &dyn MailConnector,
    reporter: &mut dyn Reporter,
) -> Result<RunReport> {
    let pipeline = Pipeline::new(rule_set, options)?;
    Ok(pipeline.run(accounts, connector, reporter).await)
}

/// Load both input files, then run. No account is contacted unless both load
/// cleanly and at least one account is active.
pub async fn run_from_files(
    accounts_path: &Path,
    rules_path: &Path,
    options: ScanOptions,
    connector: &dyn MailConnector,
    reporter: &mut dyn Reporter,
) -> Result<RunReport> {
    let (accounts, rule_set) = config::load_inputs(accounts_path, rules_path).await?;
    let accounts = config::select_accounts(&accounts, &[])?;
    run_extraction(&accounts, &rule_set, options, connector, reporter).await
}
