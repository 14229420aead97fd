//! Common test utilities and fixtures
#![allow(dead_code)]

use async_trait::async_trait;
use contact_extractor::client::{MailConnector, MailSession, RawMessage};
use contact_extractor::config::RuleSet;
use contact_extractor::error::{ExtractorError, Result};
use contact_extractor::models::{Account, ContactField, MatchSource, Rule};
use mockall::mock;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Build a minimal RFC 5322 message
pub fn raw_email(uid: u32, from: &str, subject: &str, body: &str) -> Vec<u8> {
    format!(
        "From: {from}\r\n\
         To: me@example.com\r\n\
         Subject: {subject}\r\n\
         Message-ID: <{uid}@mail.example.com>\r\n\
         Date: Tue, 04 Mar 2025 09:15:00 +0000\r\n\
         MIME-Version: 1.0\r\n\
         Content-Type: text/plain; charset=utf-8\r\n\
         \r\n\
         {body}\r\n"
    )
    .into_bytes()
}

/// Account with a literal password
pub fn test_account(id: &str) -> Account {
    let mut account = Account::new(id, &format!("imap.{}.example.com", id), &format!("{}@example.com", id));
    account.password = Some("secret".to_string());
    account
}

/// Rule taking the sender address as the contact email
pub fn sender_rule() -> Rule {
    Rule::new("sender", MatchSource::From, "(.+@.+)", ContactField::Email)
}

pub fn phone_rule() -> Rule {
    Rule::new(
        "signature-phone",
        MatchSource::Body,
        r"(\+?\d[\d\s().-]{8,}\d)",
        ContactField::Phone,
    )
}

pub fn linkedin_rule() -> Rule {
    Rule::new(
        "linkedin-profile",
        MatchSource::Body,
        r"https?://(?:www\.)?linkedin\.com/in/[A-Za-z0-9_-]+/?",
        ContactField::Linkedin,
    )
}

pub fn rule_set(rules: Vec<Rule>) -> RuleSet {
    RuleSet {
        rules,
        ..Default::default()
    }
}

/// Write `content` to `dir/name`, creating parent directories
pub fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
    path
}

#[derive(Clone)]
enum Mailbox {
    Messages {
        messages: Vec<(u32, Vec<u8>)>,
        /// Fetch calls that succeed before the session breaks
        healthy_fetches: Option<usize>,
    },
    Unreachable,
    LoginRejected,
}

/// Shared record of what the fake connector was asked to do
#[derive(Debug, Default)]
pub struct Calls {
    pub connects: Vec<String>,
    pub searches: Vec<(String, String)>,
    pub fetches: Vec<(String, Vec<u32>)>,
    pub logouts: Vec<String>,
}

/// In-memory connector keyed by account id
#[derive(Clone, Default)]
pub struct FakeConnector {
    mailboxes: HashMap<String, Mailbox>,
    pub calls: Arc<Mutex<Calls>>,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_messages(mut self, account_id: &str, messages: Vec<(u32, Vec<u8>)>) -> Self {
        self.mailboxes.insert(
            account_id.to_string(),
            Mailbox::Messages {
                messages,
                healthy_fetches: None,
            },
        );
        self
    }

    /// Session breaks on fetch call number `healthy_fetches + 1`
    pub fn with_broken_session(
        mut self,
        account_id: &str,
        messages: Vec<(u32, Vec<u8>)>,
        healthy_fetches: usize,
    ) -> Self {
        self.mailboxes.insert(
            account_id.to_string(),
            Mailbox::Messages {
                messages,
                healthy_fetches: Some(healthy_fetches),
            },
        );
        self
    }

    pub fn with_unreachable(mut self, account_id: &str) -> Self {
        self.mailboxes
            .insert(account_id.to_string(), Mailbox::Unreachable);
        self
    }

    pub fn with_rejected_login(mut self, account_id: &str) -> Self {
        self.mailboxes
            .insert(account_id.to_string(), Mailbox::LoginRejected);
        self
    }

    pub fn connects(&self) -> Vec<String> {
        self.calls.lock().unwrap().connects.clone()
    }

    pub fn logouts(&self) -> Vec<String> {
        self.calls.lock().unwrap().logouts.clone()
    }
}

#[async_trait]
impl MailConnector for FakeConnector {
    async fn connect(&self, account: &Account) -> Result<Box<dyn MailSession>> {
        self.calls.lock().unwrap().connects.push(account.id.clone());

        match self.mailboxes.get(&account.id) {
            Some(Mailbox::Messages {
                messages,
                healthy_fetches,
            }) => Ok(Box::new(FakeSession {
                account: account.id.clone(),
                messages: messages.iter().cloned().collect(),
                healthy_fetches: *healthy_fetches,
                fetch_count: 0,
                calls: Arc::clone(&self.calls),
            })),
            Some(Mailbox::LoginRejected) => Err(ExtractorError::auth(
                &account.id,
                "LOGIN rejected: invalid credentials",
            )),
            Some(Mailbox::Unreachable) | None => Err(ExtractorError::connection(
                &account.id,
                format!("TCP connect to {} failed: Connection refused", account.endpoint()),
            )),
        }
    }
}

pub struct FakeSession {
    account: String,
    messages: BTreeMap<u32, Vec<u8>>,
    healthy_fetches: Option<usize>,
    fetch_count: usize,
    calls: Arc<Mutex<Calls>>,
}

#[async_trait]
impl MailSession for FakeSession {
    async fn select(&mut self, _mailbox: &str) -> Result<u32> {
        Ok(self.messages.len() as u32)
    }

    async fn search(&mut self, criteria: &str) -> Result<Vec<u32>> {
        self.calls
            .lock()
            .unwrap()
            .searches
            .push((self.account.clone(), criteria.to_string()));
        // Reverse so callers cannot rely on the server's order.
        Ok(self.messages.keys().rev().copied().collect())
    }

    async fn fetch(&mut self, uids: &[u32]) -> Result<Vec<RawMessage>> {
        self.calls
            .lock()
            .unwrap()
            .fetches
            .push((self.account.clone(), uids.to_vec()));

        self.fetch_count += 1;
        if let Some(healthy) = self.healthy_fetches {
            if self.fetch_count > healthy {
                return Err(ExtractorError::connection(&self.account, "connection reset by peer"));
            }
        }

        Ok(uids
            .iter()
            .filter_map(|uid| {
                self.messages.get(uid).map(|bytes| RawMessage {
                    uid: *uid,
                    bytes: bytes.clone(),
                })
            })
            .collect())
    }

    async fn logout(self: Box<Self>) -> Result<()> {
        self.calls.lock().unwrap().logouts.push(self.account.clone());
        Ok(())
    }
}

// Mock implementation of MailConnector for call-count assertions
mock! {
    pub Connector {}

    #[async_trait::async_trait]
    impl MailConnector for Connector {
        async fn connect(&self, account: &Account) -> Result<Box<dyn MailSession>>;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_email_has_headers_and_body() {
        let raw = String::from_utf8(raw_email(3, "Jane <jane@agency.com>", "Hi", "Hello")).unwrap();
        assert!(raw.starts_with("From: Jane <jane@agency.com>\r\n"));
        assert!(raw.contains("Message-ID: <3@mail.example.com>"));
        assert!(raw.ends_with("\r\n\r\nHello\r\n"));
    }

    #[test]
    fn test_account_has_credential() {
        let account = test_account("work");
        assert_eq!(account.id, "work");
        assert_eq!(account.host, "imap.work.example.com");
        assert!(account.password.is_some());
    }
}
