use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::error::{ExtractorError, Result};
use crate::models::{Account, Rule};
use crate::screening::SenderScreen;

/// Application settings (`config.toml`).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    #[serde(default = "default_mailbox")]
    pub mailbox: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Only scan messages received in the last N days
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since_days: Option<u32>,
    #[serde(default)]
    pub newest_first: bool,
    /// Stop after this many messages per account
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_messages: Option<usize>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            mailbox: default_mailbox(),
            batch_size: default_batch_size(),
            since_days: None,
            newest_first: false,
            max_messages: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OutputConfig {
    #[serde(default)]
    pub format: OutputFormat,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// One human-readable line per contact
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

fn default_mailbox() -> String {
    "INBOX".to_string()
}

fn default_batch_size() -> usize {
    100
}

fn default_connect_timeout_secs() -> u64 {
    30
}

impl Config {
    pub async fn load(path: &Path) -> Result<Self> {
        // If file doesn't exist, return default config with warning
        if !path.exists() {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ExtractorError::ConfigError(format!("Failed to read config file: {}", e)))?;

        let config: Self = toml::from_str(&content).map_err(|e| {
            ExtractorError::ConfigError(format!("Failed to parse config file: {}", e))
        })?;

        config.validate()?;

        tracing::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| {
            ExtractorError::ConfigError(format!("Failed to serialize config: {}", e))
        })?;
        write_config_file(path, &content).await?;

        tracing::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.scan.mailbox.trim().is_empty() {
            return Err(ExtractorError::ConfigError(
                "scan.mailbox cannot be empty".to_string(),
            ));
        }

        if self.scan.batch_size == 0 {
            return Err(ExtractorError::ConfigError(
                "scan.batch_size must be at least 1".to_string(),
            ));
        }
        if self.scan.batch_size > 1000 {
            return Err(ExtractorError::ConfigError(
                "scan.batch_size cannot exceed 1000".to_string(),
            ));
        }

        if let Some(days) = self.scan.since_days {
            if days == 0 || days > 3650 {
                return Err(ExtractorError::ConfigError(
                    "scan.since_days must be between 1 and 3650".to_string(),
                ));
            }
        }

        if self.scan.max_messages == Some(0) {
            return Err(ExtractorError::ConfigError(
                "scan.max_messages must be greater than 0".to_string(),
            ));
        }

        if self.connection.connect_timeout_secs == 0 {
            return Err(ExtractorError::ConfigError(
                "connection.connect_timeout_secs must be greater than 0".to_string(),
            ));
        }

        tracing::debug!("Configuration validation passed");
        Ok(())
    }

    /// Write example settings, accounts and rules files under `dir`
    pub async fn create_example(dir: &Path) -> Result<()> {
        Self::default().save(&dir.join("config.toml")).await?;
        write_config_file(&dir.join("config").join("accounts.toml"), EXAMPLE_ACCOUNTS).await?;
        write_config_file(&dir.join("config").join("rules.toml"), EXAMPLE_RULES).await?;
        Ok(())
    }
}

async fn write_config_file(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(|e| {
            ExtractorError::ConfigError(format!("Failed to create config directory: {}", e))
        })?;
    }

    tokio::fs::write(path, content)
        .await
        .map_err(|e| ExtractorError::ConfigError(format!("Failed to write {:?}: {}", path, e)))
}

/// Sender screening applied before rule evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreeningConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Subject or sender-name keywords, at least one of which must occur
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub domain_strategy: DomainStrategy,
    #[serde(default)]
    pub whitelist_domains: Vec<String>,
    #[serde(default)]
    pub blacklist_patterns: Vec<String>,
    #[serde(default)]
    pub always_whitelist: Vec<String>,
    #[serde(default)]
    pub always_blacklist: Vec<String>,
    /// Full-match patterns for sender addresses that are never contacts
    #[serde(default = "default_excluded_senders")]
    pub excluded_senders: Vec<String>,
}

impl Default for ScreeningConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            keywords: Vec::new(),
            domain_strategy: DomainStrategy::default(),
            whitelist_domains: Vec::new(),
            blacklist_patterns: Vec::new(),
            always_whitelist: Vec::new(),
            always_blacklist: Vec::new(),
            excluded_senders: default_excluded_senders(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DomainStrategy {
    /// Every domain passes
    #[default]
    Any,
    /// Domain must match `whitelist_domains`
    Whitelist,
    /// Domain must not match `blacklist_patterns`
    Blacklist,
    /// Whitelisted and not blacklisted
    Hybrid,
}

fn default_excluded_senders() -> Vec<String> {
    [
        r"jobs-listings@linkedin\.com",
        r"newsletters-noreply@linkedin\.cc",
        r"noreply@.*",
        r".*no-reply.*",
        r"do-not-reply@.*",
        r"notifications@.*",
        r"jobs@.*",
        r"info@.*",
    ]
    .iter()
    .map(|p| p.to_string())
    .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RuleOptions {
    /// Drop contacts identical in every extracted field to an earlier one from the same account
    #[serde(default)]
    pub dedupe: bool,
    /// Fill a missing company from the contact's email domain (`jane@acme.io` -> `Acme`)
    #[serde(default)]
    pub company_from_domain: bool,
}

/// Everything loaded from the rules file.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RuleSet {
    #[serde(default)]
    pub rules: Vec<Rule>,
    #[serde(default)]
    pub screening: ScreeningConfig,
    #[serde(default)]
    pub options: RuleOptions,
}

#[derive(Debug, Deserialize)]
struct AccountsFile {
    accounts: Option<Vec<Account>>,
}

async fn read_required(path: &Path, what: &str) -> Result<String> {
    if !path.exists() {
        return Err(ExtractorError::ConfigError(format!(
            "{} file not found at {:?}",
            what, path
        )));
    }

    tokio::fs::read_to_string(path).await.map_err(|e| {
        ExtractorError::ConfigError(format!("Failed to read {} file {:?}: {}", what, path, e))
    })
}

/// Load and validate the accounts file, preserving declared order
pub async fn load_accounts(path: &Path) -> Result<Vec<Account>> {
    let content = read_required(path, "Accounts").await?;
    let file: AccountsFile = toml::from_str(&content).map_err(|e| {
        ExtractorError::ConfigError(format!("Failed to parse accounts file {:?}: {}", path, e))
    })?;

    let mut accounts = file.accounts.ok_or_else(|| {
        ExtractorError::ConfigError(format!("{:?} has no `accounts` list", path))
    })?;

    validate_accounts(&mut accounts)?;

    tracing::info!("Loaded {} accounts from {:?}", accounts.len(), path);
    Ok(accounts)
}

/// Fill default ids and check required fields
pub fn validate_accounts(accounts: &mut [Account]) -> Result<()> {
    if accounts.is_empty() {
        return Err(ExtractorError::ConfigError(
            "accounts list is empty".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for (index, account) in accounts.iter_mut().enumerate() {
        let position = index + 1;

        if account.username.trim().is_empty() {
            return Err(ExtractorError::ConfigError(format!(
                "account #{} is missing `username`",
                position
            )));
        }
        if account.id.trim().is_empty() {
            account.id = account.username.clone();
        }

        if account.host.trim().is_empty() || account.host.contains(char::is_whitespace) {
            return Err(ExtractorError::ConfigError(format!(
                "account '{}' needs a valid `host`",
                account.id
            )));
        }
        if account.port == 0 {
            return Err(ExtractorError::ConfigError(format!(
                "account '{}' has port 0",
                account.id
            )));
        }

        match (&account.password, &account.password_env) {
            (Some(_), Some(_)) => {
                return Err(ExtractorError::ConfigError(format!(
                    "account '{}' sets both `password` and `password_env`",
                    account.id
                )));
            }
            (None, None) => {
                return Err(ExtractorError::ConfigError(format!(
                    "account '{}' needs a credential (`password` or `password_env`)",
                    account.id
                )));
            }
            (None, Some(var)) if var.trim().is_empty() => {
                return Err(ExtractorError::ConfigError(format!(
                    "account '{}' has an empty `password_env`",
                    account.id
                )));
            }
            _ => {}
        }

        if !seen.insert(account.id.clone()) {
            return Err(ExtractorError::ConfigError(format!(
                "duplicate account id '{}'",
                account.id
            )));
        }
    }

    Ok(())
}

/// Load and validate the rules file, preserving declared order
pub async fn load_rules(path: &Path) -> Result<RuleSet> {
    let content = read_required(path, "Rules").await?;
    let rule_set: RuleSet = toml::from_str(&content).map_err(|e| {
        ExtractorError::ConfigError(format!("Failed to parse rules file {:?}: {}", path, e))
    })?;

    rule_set.validate()?;

    tracing::info!("Loaded {} rules from {:?}", rule_set.rules.len(), path);
    Ok(rule_set)
}

impl RuleSet {
    pub fn validate(&self) -> Result<()> {
        if self.rules.is_empty() {
            return Err(ExtractorError::ConfigError(
                "rules list is empty".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for (index, rule) in self.rules.iter().enumerate() {
            validate_rule(index + 1, rule)?;
            if !seen.insert(rule.name.as_str()) {
                return Err(ExtractorError::ConfigError(format!(
                    "duplicate rule name '{}'",
                    rule.name
                )));
            }
        }

        SenderScreen::from_config(&self.screening)?;
        Ok(())
    }
}

fn validate_rule(position: usize, rule: &Rule) -> Result<()> {
    if rule.name.trim().is_empty() {
        return Err(ExtractorError::ConfigError(format!(
            "rule #{} is missing `name`",
            position
        )));
    }
    if rule.pattern.is_empty() {
        return Err(ExtractorError::ConfigError(format!(
            "rule '{}' is missing `pattern`",
            rule.name
        )));
    }
    if rule.field.is_none() {
        return Err(ExtractorError::ConfigError(format!(
            "rule '{}' is missing a target `field`",
            rule.name
        )));
    }

    let regex = Regex::new(&rule.pattern).map_err(|e| {
        ExtractorError::ConfigError(format!("rule '{}' has an invalid pattern: {}", rule.name, e))
    })?;

    if let Some(group) = rule.group {
        if group >= regex.captures_len() {
            return Err(ExtractorError::ConfigError(format!(
                "rule '{}' selects group {} but the pattern has only {} groups",
                rule.name,
                group,
                regex.captures_len() - 1
            )));
        }
    }

    Ok(())
}

/// Load both input documents; nothing is returned unless both are valid
pub async fn load_inputs(accounts_path: &Path, rules_path: &Path) -> Result<(Vec<Account>, RuleSet)> {
    let accounts = load_accounts(accounts_path).await?;
    let rules = load_rules(rules_path).await?;
    Ok((accounts, rules))
}

/// Active accounts carrying any of `tags` (all active accounts when `tags` is empty).
/// Selecting nothing is a configuration error.
pub fn select_accounts(accounts: &[Account], tags: &[String]) -> Result<Vec<Account>> {
    let selected: Vec<Account> = accounts
        .iter()
        .filter(|account| account.active)
        .filter(|account| tags.is_empty() || tags.iter().any(|tag| account.has_tag(tag)))
        .cloned()
        .collect();

    if selected.is_empty() {
        return Err(ExtractorError::ConfigError(if tags.is_empty() {
            "no active accounts configured".to_string()
        } else {
            format!("no active accounts tagged {}", tags.join(", "))
        }));
    }

    Ok(selected)
}

const EXAMPLE_ACCOUNTS: &str = r#"# Mail accounts to scan, processed in the order listed.
#
# Each account needs a host, a username and exactly one credential:
#   password     = "literal password"
#   password_env = "NAME_OF_ENVIRONMENT_VARIABLE"

[[accounts]]
id = "personal"
host = "imap.example.com"
port = 993
username = "me@example.com"
password_env = "PERSONAL_IMAP_PASSWORD"
tags = ["job_search"]

[[accounts]]
id = "archive"
host = "imap.example.org"
username = "old@example.org"
password_env = "ARCHIVE_IMAP_PASSWORD"
active = false
"#;

const EXAMPLE_RULES: &str = r#"# Extraction rules, evaluated in order against every scanned message.
# Each matching rule produces one contact.
#
# source: from | from_name | subject | body | any
# field:  name | email | phone | company | website | linkedin

[[rules]]
name = "sender"
source = "from"
pattern = '(.+@.+)'
field = "email"

[[rules]]
name = "signature-phone"
source = "body"
pattern = '(\+?\d[\d\s().-]{8,}\d)'
field = "phone"

[[rules]]
name = "linkedin-profile"
source = "body"
pattern = 'https?://(?:www\.)?linkedin\.com/in/[A-Za-z0-9_-]+/?'
field = "linkedin"

[[rules]]
name = "signature-company"
source = "body"
pattern = '\bat[ \t]+([A-Z][a-zA-Z&]*(?:[ \t]+[A-Z&][a-zA-Z&]*)*)'
field = "company"

[[rules]]
name = "incorporated-company"
source = "body"
pattern = '([A-Z][a-zA-Z&]*(?:[ \t]+[A-Z&][a-zA-Z&]*)*),?[ \t]*(?:Inc|LLC)\b'
field = "company"

# First http(s) link in the body that is not on linkedin.com
[[rules]]
name = "website"
source = "body"
pattern = 'https?://[^\s/$.?#]\S*'
field = "website"

[options]
dedupe = false
company_from_domain = true

[screening]
enabled = false
keywords = ["recruiter", "talent", "hiring", "opportunity"]
domain_strategy = "any"
"#;
