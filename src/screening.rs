//! Sender screening
//!
//! Decides whether a message's sender is worth running the extraction rules
//! against. Screening is off unless `[screening] enabled = true` is set in the
//! rules file; a disabled screen accepts every message.

use crate::config::{DomainStrategy, ScreeningConfig};
use crate::error::{ExtractorError, Result};
use crate::models::Message;
use regex::Regex;
use std::fmt;

/// Outcome of screening one message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScreenVerdict {
    Accept,
    /// Sender address matched an `excluded_senders` pattern
    ExcludedSender(String),
    /// No keyword in subject or sender name
    NoKeyword,
    /// Sender domain failed the domain strategy
    DomainRejected(String),
    /// Sender address has no domain
    MissingDomain,
}

impl ScreenVerdict {
    pub fn is_accept(&self) -> bool {
        matches!(self, ScreenVerdict::Accept)
    }
}

impl fmt::Display for ScreenVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScreenVerdict::Accept => write!(f, "accepted"),
            ScreenVerdict::ExcludedSender(pattern) => {
                write!(f, "sender matches excluded pattern '{}'", pattern)
            }
            ScreenVerdict::NoKeyword => write!(f, "no screening keyword in subject or sender name"),
            ScreenVerdict::DomainRejected(domain) => write!(f, "domain '{}' rejected", domain),
            ScreenVerdict::MissingDomain => write!(f, "sender has no domain"),
        }
    }
}

/// Compiled screening configuration
#[derive(Debug, Clone)]
pub struct SenderScreen {
    enabled: bool,
    keywords: Vec<String>,
    strategy: DomainStrategy,
    whitelist: Vec<Regex>,
    blacklist: Vec<Regex>,
    always_whitelist: Vec<Regex>,
    always_blacklist: Vec<Regex>,
    excluded_senders: Vec<(String, Regex)>,
}

/// Anchor a pattern so it must match the whole input
fn compile_full_match(field: &str, pattern: &str) -> Result<Regex> {
    Regex::new(&format!("^(?:{})$", pattern)).map_err(|e| {
        ExtractorError::ConfigError(format!(
            "screening.{} pattern '{}' is invalid: {}",
            field, pattern, e
        ))
    })
}

fn compile_all(field: &str, patterns: &[String]) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|p| compile_full_match(field, p))
        .collect()
}

impl SenderScreen {
    pub fn from_config(config: &ScreeningConfig) -> Result<Self> {
        let excluded_senders = config
            .excluded_senders
            .iter()
            .map(|p| compile_full_match("excluded_senders", p).map(|re| (p.clone(), re)))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            enabled: config.enabled,
            keywords: config
                .keywords
                .iter()
                .map(|k| k.trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
            strategy: config.domain_strategy,
            whitelist: compile_all("whitelist_domains", &config.whitelist_domains)?,
            blacklist: compile_all("blacklist_patterns", &config.blacklist_patterns)?,
            always_whitelist: compile_all("always_whitelist", &config.always_whitelist)?,
            always_blacklist: compile_all("always_blacklist", &config.always_blacklist)?,
            excluded_senders,
        })
    }

    /// A screen that accepts everything
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            keywords: Vec::new(),
            strategy: DomainStrategy::Any,
            whitelist: Vec::new(),
            blacklist: Vec::new(),
            always_whitelist: Vec::new(),
            always_blacklist: Vec::new(),
            excluded_senders: Vec::new(),
        }
    }

    pub fn screen(&self, message: &Message) -> ScreenVerdict {
        if !self.enabled {
            return ScreenVerdict::Accept;
        }

        let sender = message.sender_email.to_lowercase();
        if let Some((pattern, _)) = self
            .excluded_senders
            .iter()
            .find(|(_, re)| re.is_match(&sender))
        {
            return ScreenVerdict::ExcludedSender(pattern.clone());
        }

        if !self.keywords.is_empty() {
            let subject = message.subject.to_lowercase();
            let name = message.sender_name.to_lowercase();
            let keyword_hit = self
                .keywords
                .iter()
                .any(|k| subject.contains(k.as_str()) || name.contains(k.as_str()));
            if !keyword_hit {
                return ScreenVerdict::NoKeyword;
            }
        }

        let domain = match message.sender_domain() {
            Some(domain) => domain.to_lowercase(),
            None => return ScreenVerdict::MissingDomain,
        };

        if self.domain_allowed(&domain) {
            ScreenVerdict::Accept
        } else {
            ScreenVerdict::DomainRejected(domain)
        }
    }

    /// Apply the domain strategy; `always_blacklist` wins over `always_whitelist`
    pub fn domain_allowed(&self, domain: &str) -> bool {
        if domain.is_empty() {
            return false;
        }

        if self.always_blacklist.iter().any(|re| re.is_match(domain)) {
            return false;
        }
        if self.always_whitelist.iter().any(|re| re.is_match(domain)) {
            return true;
        }

        let whitelisted = || self.whitelist.iter().any(|re| re.is_match(domain));
        let blacklisted = || self.blacklist.iter().any(|re| re.is_match(domain));

        match self.strategy {
            DomainStrategy::Any => true,
            DomainStrategy::Whitelist => whitelisted(),
            DomainStrategy::Blacklist => !blacklisted(),
            DomainStrategy::Hybrid => whitelisted() && !blacklisted(),
        }
    }
}

impl Default for SenderScreen {
    fn default() -> Self {
        Self::disabled()
    }
}
