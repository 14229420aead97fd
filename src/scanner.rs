//! Message scanner: lists an account's messages and streams them in batches

use crate::client::MailSession;
use crate::config::ScanConfig;
use crate::error::{ExtractorError, Result};
use crate::models::{Account, Message};
use async_stream::stream;
use chrono::{DateTime, Duration, Utc};
use futures::stream::Stream;
use mail_parser::MessageParser;
use std::pin::Pin;
use tracing::{debug, info, warn};

/// Per-run scan settings, resolved from `[scan]` and command-line overrides
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanOptions {
    pub mailbox: String,
    pub batch_size: usize,
    pub since_days: Option<u32>,
    pub newest_first: bool,
    pub max_messages: Option<usize>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self::from_config(&ScanConfig::default())
    }
}

impl ScanOptions {
    pub fn from_config(config: &ScanConfig) -> Self {
        Self {
            mailbox: config.mailbox.clone(),
            batch_size: config.batch_size.max(1),
            since_days: config.since_days,
            newest_first: config.newest_first,
            max_messages: config.max_messages,
        }
    }

    /// Mailbox to scan for `account`; an account-level mailbox wins
    pub fn mailbox_for<'a>(&'a self, account: &'a Account) -> &'a str {
        account.mailbox.as_deref().unwrap_or(&self.mailbox)
    }

    /// IMAP search expression for this scan
    pub fn search_criteria(&self, now: DateTime<Utc>) -> String {
        match self.since_days {
            Some(days) => since_criteria(now - Duration::days(i64::from(days))),
            None => "ALL".to_string(),
        }
    }

    /// Order UIDs for scanning and apply the message cap
    pub fn order_uids(&self, mut uids: Vec<u32>) -> Vec<u32> {
        uids.sort_unstable();
        uids.dedup();
        if self.newest_first {
            uids.reverse();
        }
        if let Some(max) = self.max_messages {
            uids.truncate(max);
        }
        uids
    }
}

/// `SINCE 05-Mar-2024`
pub fn since_criteria(date: DateTime<Utc>) -> String {
    format!("SINCE {}", date.format("%d-%b-%Y"))
}

/// Scans one account over an already authenticated session
pub struct MessageScanner<'a> {
    session: &'a mut dyn MailSession,
    account: &'a Account,
    options: &'a ScanOptions,
}

impl<'a> MessageScanner<'a> {
    pub fn new(
        session: &'a mut dyn MailSession,
        account: &'a Account,
        options: &'a ScanOptions,
    ) -> Self {
        Self {
            session,
            account,
            options,
        }
    }

    /// Select the mailbox and list the UIDs to scan, in scan order
    pub async fn select_uids(&mut self) -> Result<Vec<u32>> {
        let mailbox = self.options.mailbox_for(self.account);
        let exists = self.session.select(mailbox).await?;
        debug!("Selected {} for '{}' ({} messages)", mailbox, self.account.id, exists);

        if exists == 0 {
            return Ok(Vec::new());
        }

        let criteria = self.options.search_criteria(Utc::now());
        let found = self.session.search(&criteria).await?;
        let uids = self.options.order_uids(found);

        info!(
            "Account '{}': {} messages to scan ({})",
            self.account.id,
            uids.len(),
            criteria
        );
        Ok(uids)
    }

    /// Stream parsed messages for `uids`, fetching `batch_size` at a time.
    ///
    /// A message that fails to parse yields an error and the stream moves on;
    /// a session failure yields its error and ends the stream.
    pub fn into_stream(
        self,
        uids: Vec<u32>,
    ) -> Pin<Box<dyn Stream<Item = Result<Message>> + Send + 'a>> {
        let Self {
            session,
            account,
            options,
        } = self;

        Box::pin(stream! {
            'batches: for batch in uids.chunks(options.batch_size.max(1)) {
                let mut fetched = match session.fetch(batch).await {
                    Ok(fetched) => fetched,
                    Err(e) => {
                        warn!("Fetch failed for account '{}': {}", account.id, e);
                        yield Err(e);
                        break 'batches;
                    }
                };

                if fetched.len() < batch.len() {
                    debug!(
                        "Server returned {} of {} requested messages for '{}'",
                        fetched.len(),
                        batch.len(),
                        account.id
                    );
                }

                // Servers may answer a UID FETCH in any order.
                fetched.sort_by_key(|raw| batch.iter().position(|uid| *uid == raw.uid));

                for raw in fetched {
                    yield parse_message(&account.id, raw.uid, &raw.bytes);
                }
            }
        })
    }
}

/// Parse raw RFC 5322 bytes into a [`Message`]
pub fn parse_message(account_id: &str, uid: u32, bytes: &[u8]) -> Result<Message> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(ExtractorError::InvalidMessageFormat(format!(
            "message {} is empty",
            uid
        )));
    }

    let parsed = MessageParser::default().parse(bytes).ok_or_else(|| {
        ExtractorError::InvalidMessageFormat(format!("message {} could not be parsed", uid))
    })?;

    let sender = parsed
        .from()
        .and_then(|from| from.as_list())
        .and_then(|list| list.first());
    let sender_name = sender
        .and_then(|addr| addr.name())
        .unwrap_or_default()
        .trim()
        .to_string();
    let sender_email = sender
        .and_then(|addr| addr.address())
        .unwrap_or_default()
        .trim()
        .to_string();
    let subject = parsed.subject().map(|s| s.to_string());
    let message_id = parsed.message_id().map(|id| id.to_string());
    let date = parsed
        .date()
        .and_then(|d| DateTime::from_timestamp(d.to_timestamp(), 0));

    if sender_email.is_empty() && subject.is_none() && message_id.is_none() && date.is_none() {
        return Err(ExtractorError::InvalidMessageFormat(format!(
            "message {} has no recognizable headers",
            uid
        )));
    }

    let from_header = match (sender_name.is_empty(), sender_email.is_empty()) {
        (false, false) => format!("{} <{}>", sender_name, sender_email),
        (true, false) => sender_email.clone(),
        (false, true) => sender_name.clone(),
        (true, true) => String::new(),
    };

    Ok(Message {
        account_id: account_id.to_string(),
        uid,
        message_id,
        sender_name,
        sender_email,
        from_header,
        subject: subject.unwrap_or_default(),
        date,
        body: parsed
            .body_text(0)
            .map(|body| body.into_owned())
            .unwrap_or_default(),
    })
}
