use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A configured mail account.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Account {
    /// Identifier used in logs and contact references; defaults to `username`
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub host: String,
    #[serde(default = "default_imap_port")]
    pub port: u16,
    #[serde(default = "default_true")]
    pub tls: bool,
    #[serde(default)]
    pub username: String,
    /// Literal password
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Name of an environment variable holding the password
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_env: Option<String>,
    /// Mailbox to scan instead of `scan.mailbox`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mailbox: Option<String>,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

fn default_imap_port() -> u16 {
    993
}

fn default_true() -> bool {
    true
}

impl Account {
    pub fn new(id: &str, host: &str, username: &str) -> Self {
        Self {
            id: id.to_string(),
            host: host.to_string(),
            port: default_imap_port(),
            tls: true,
            username: username.to_string(),
            password: None,
            password_env: None,
            mailbox: None,
            active: true,
            tags: Vec::new(),
        }
    }

    /// `host:port`
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }
}

// Hand-written so passwords never reach the logs.
impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("id", &self.id)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("tls", &self.tls)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("password_env", &self.password_env)
            .field("mailbox", &self.mailbox)
            .field("active", &self.active)
            .field("tags", &self.tags)
            .finish()
    }
}

/// Which part of a message a rule is matched against.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MatchSource {
    /// Sender address
    From,
    /// Sender display name
    FromName,
    Subject,
    Body,
    /// The full `From` header, the subject and the body, newline separated
    #[default]
    Any,
}

/// Contact field a rule fills in.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ContactField {
    Name,
    Email,
    Phone,
    Company,
    Website,
    Linkedin,
}

impl fmt::Display for ContactField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ContactField::Name => "name",
            ContactField::Email => "email",
            ContactField::Phone => "phone",
            ContactField::Company => "company",
            ContactField::Website => "website",
            ContactField::Linkedin => "linkedin",
        };
        f.write_str(name)
    }
}

/// A configured extraction rule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Rule {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub source: MatchSource,
    #[serde(default)]
    pub pattern: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<ContactField>,
    /// Capture group holding the value; group 1 if the pattern has one, else the whole match
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<usize>,
}

impl Rule {
    pub fn new(name: &str, source: MatchSource, pattern: &str, field: ContactField) -> Self {
        Self {
            name: name.to_string(),
            source,
            pattern: pattern.to_string(),
            field: Some(field),
            group: None,
        }
    }
}

/// One message as seen by the rule evaluator.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub account_id: String,
    pub uid: u32,
    pub message_id: Option<String>,
    pub sender_name: String,
    pub sender_email: String,
    /// Raw `From` header value as decoded by the parser
    pub from_header: String,
    pub subject: String,
    pub date: Option<DateTime<Utc>>,
    pub body: String,
}

impl Message {
    pub fn reference(&self) -> MessageRef {
        MessageRef {
            account_id: self.account_id.clone(),
            uid: self.uid,
            message_id: self.message_id.clone(),
        }
    }

    pub fn sender_domain(&self) -> Option<&str> {
        self.sender_email
            .rsplit_once('@')
            .map(|(_, domain)| domain)
            .filter(|domain| !domain.is_empty())
    }
}

/// Trace from a contact back to the message it came from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub account_id: String,
    pub uid: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
}

impl fmt::Display for MessageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.account_id, self.uid)
    }
}

/// An extracted contact record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Contact {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub website: Option<String>,
    pub linkedin_url: Option<String>,
    pub source: MessageRef,
    /// Name of the rule that produced this contact
    pub rule: String,
    pub extracted_at: DateTime<Utc>,
}

impl Contact {
    pub fn new(source: MessageRef, rule: &str) -> Self {
        Self {
            name: None,
            email: None,
            phone: None,
            company: None,
            website: None,
            linkedin_url: None,
            source,
            rule: rule.to_string(),
            extracted_at: Utc::now(),
        }
    }

    pub fn field(&self, field: ContactField) -> Option<&str> {
        match field {
            ContactField::Name => self.name.as_deref(),
            ContactField::Email => self.email.as_deref(),
            ContactField::Phone => self.phone.as_deref(),
            ContactField::Company => self.company.as_deref(),
            ContactField::Website => self.website.as_deref(),
            ContactField::Linkedin => self.linkedin_url.as_deref(),
        }
    }

    pub fn set_field(&mut self, field: ContactField, value: String) {
        let slot = match field {
            ContactField::Name => &mut self.name,
            ContactField::Email => &mut self.email,
            ContactField::Phone => &mut self.phone,
            ContactField::Company => &mut self.company,
            ContactField::Website => &mut self.website,
            ContactField::Linkedin => &mut self.linkedin_url,
        };
        *slot = Some(value);
    }

    /// Key used when deduplication is enabled: every extracted field, so two
    /// contacts only collide when neither carries anything the other lacks.
    /// Email and company compare case-insensitively.
    pub fn dedupe_key(&self) -> [Option<String>; 6] {
        [
            self.email.as_deref().map(str::to_lowercase),
            self.name.clone(),
            self.phone.clone(),
            self.company.as_deref().map(str::to_lowercase),
            self.website.clone(),
            self.linkedin_url.clone(),
        ]
    }
}
