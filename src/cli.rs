//! Command-line interface

use clap::{Parser, Subcommand};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use crate::client::ImapConnector;
use crate::config::{self, Config, OutputFormat};
use crate::error::{ExtractorError, Result};
use crate::models::{Account, Contact, Message};
use crate::pipeline;
use crate::report::{AccountSummary, Reporter, RunReport};
use crate::scanner::ScanOptions;

#[derive(Parser, Debug)]
#[command(name = "contact-extractor")]
#[command(version = "0.1.0")]
#[command(about = "Extract contact details from IMAP mailboxes using configurable rules", long_about = None)]
pub struct Cli {
    /// Path to settings file
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Path to accounts file
    #[arg(long, default_value = "config/accounts.toml")]
    pub accounts: PathBuf,

    /// Path to extraction rules file
    #[arg(long, default_value = "config/rules.toml")]
    pub rules: PathBuf,

    /// Verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Defaults to `run`
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Scan all active accounts and print extracted contacts
    Run {
        /// Only scan accounts carrying this tag (repeatable)
        #[arg(long = "tag")]
        tags: Vec<String>,

        /// Output format for contacts (overrides `output.format`)
        #[arg(long, value_enum)]
        format: Option<OutputFormat>,

        /// Only scan messages from the last N days
        #[arg(long)]
        since_days: Option<u32>,

        /// Scan at most N messages per account
        #[arg(long)]
        limit: Option<usize>,

        /// Scan newest messages first
        #[arg(long)]
        newest_first: bool,
    },

    /// Load and validate all configuration files without connecting
    CheckConfig,

    /// Write example configuration files
    InitConfig {
        /// Directory to write `config.toml` and `config/` into
        #[arg(short, long, default_value = ".")]
        dir: PathBuf,

        /// Overwrite existing files
        #[arg(long)]
        force: bool,
    },
}

impl Commands {
    /// `run` with every option left at its default
    pub fn default_run() -> Self {
        Commands::Run {
            tags: Vec::new(),
            format: None,
            since_days: None,
            limit: None,
            newest_first: false,
        }
    }
}

/// Truncate a string to max_len characters, adding "..." if truncated
fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        format!("{}...", s.chars().take(max_len.saturating_sub(3)).collect::<String>())
    }
}

/// Progress display using indicatif
pub struct ProgressReporter {
    multi: MultiProgress,
    spinner_style: ProgressStyle,
    bar_style: ProgressStyle,
}

impl ProgressReporter {
    pub fn new() -> Self {
        Self::with_multi_progress(MultiProgress::new())
    }

    /// Share a `MultiProgress` with the log writer so log lines print above bars
    pub fn with_multi_progress(multi: MultiProgress) -> Self {
        let spinner_style = ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed:>6}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ");

        let bar_style = ProgressStyle::default_bar()
            .template("[{elapsed:>6}] {bar:40.cyan/blue} {pos:>7}/{len:7} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-");

        Self {
            multi,
            spinner_style,
            bar_style,
        }
    }

    pub fn add_spinner(&self, msg: &str) -> ProgressBar {
        let pb = self.multi.add(ProgressBar::new_spinner());
        pb.set_style(self.spinner_style.clone());
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }

    pub fn add_progress_bar(&self, len: u64, msg: &str) -> ProgressBar {
        let pb = self.multi.add(ProgressBar::new(len));
        pb.set_style(self.bar_style.clone());
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }

    /// Clear a bar and print a completion line in its place
    pub fn finish_spinner(&self, pb: &ProgressBar, msg: &str) {
        pb.finish_and_clear();
        let _ = self.multi.println(format!("  ✓ {}", msg));
    }

    pub fn fail_spinner(&self, pb: &ProgressBar, msg: &str) {
        pb.finish_and_clear();
        let _ = self.multi.println(format!("  ✗ {}", msg));
    }

    /// Print to stdout with bars hidden for the duration
    pub fn print_line(&self, line: &str) {
        self.multi.suspend(|| println!("{}", line));
    }

    /// Print to stderr with bars hidden, keeping stdout for contacts
    pub fn print_error(&self, line: &str) {
        self.multi.suspend(|| eprintln!("{}", line));
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

/// One line per contact: `work#12 [sender] Jane Doe <jane@agency.com> | phone: ...`
pub fn format_contact(contact: &Contact) -> String {
    let mut line = format!("{} [{}]", contact.source, contact.rule);

    match (&contact.name, &contact.email) {
        (Some(name), Some(email)) => line.push_str(&format!(" {} <{}>", name, email)),
        (None, Some(email)) => line.push_str(&format!(" {}", email)),
        (Some(name), None) => line.push_str(&format!(" {}", name)),
        (None, None) => {}
    }

    let extras = [
        ("phone", &contact.phone),
        ("company", &contact.company),
        ("website", &contact.website),
        ("linkedin", &contact.linkedin_url),
    ];
    for (label, value) in extras {
        if let Some(value) = value {
            line.push_str(&format!(" | {}: {}", label, truncate_string(value, 80)));
        }
    }

    line
}

/// `  ✗ work: <error>`
pub fn format_failure(account: &Account, error: &ExtractorError) -> String {
    format!("  ✗ {}: {}", account.id, error)
}

/// Streams contacts to stdout and shows per-account progress on stderr
pub struct ConsoleReporter {
    progress: ProgressReporter,
    format: OutputFormat,
    current: Option<ProgressBar>,
}

impl ConsoleReporter {
    pub fn new(multi: MultiProgress, format: OutputFormat) -> Self {
        Self {
            progress: ProgressReporter::with_multi_progress(multi),
            format,
            current: None,
        }
    }

    fn render(&self, contact: &Contact) -> Option<String> {
        match self.format {
            OutputFormat::Text => Some(format_contact(contact)),
            OutputFormat::Json => match serde_json::to_string(contact) {
                Ok(json) => Some(json),
                Err(e) => {
                    warn!("Could not serialize contact from {}: {}", contact.source, e);
                    None
                }
            },
        }
    }
}

impl Reporter for ConsoleReporter {
    fn account_started(&mut self, account: &Account) {
        let spinner = self
            .progress
            .add_spinner(&format!("Connecting to {} ({})...", account.id, account.endpoint()));
        self.current = Some(spinner);
    }

    fn account_connected(&mut self, account: &Account, messages: usize) {
        if let Some(spinner) = self.current.take() {
            spinner.finish_and_clear();
        }
        let bar = self
            .progress
            .add_progress_bar(messages as u64, &format!("Scanning {}", account.id));
        self.current = Some(bar);
    }

    fn account_failed(&mut self, account: &Account, error: &ExtractorError) {
        match self.current.take() {
            Some(bar) => self
                .progress
                .fail_spinner(&bar, &format!("{}: {}", account.id, error)),
            None => self.progress.print_error(&format_failure(account, error)),
        }
    }

    fn message_scanned(&mut self, _message: &Message) {
        if let Some(bar) = &self.current {
            bar.inc(1);
        }
    }

    fn contact_extracted(&mut self, contact: &Contact) {
        if let Some(line) = self.render(contact) {
            self.progress.print_line(&line);
        }
    }

    fn extraction_failed(&mut self, account: &Account, error: &ExtractorError) {
        self.progress.print_error(&format_failure(account, error));
    }

    fn account_finished(&mut self, account: &Account, summary: &AccountSummary) {
        if let Some(bar) = self.current.take() {
            self.progress.finish_spinner(
                &bar,
                &format!(
                    "{}: {} messages scanned, {} contacts",
                    account.id, summary.messages_scanned, summary.contacts_found
                ),
            );
        }
    }
}

/// Scan settings after applying command-line overrides
pub fn scan_options(
    config: &Config,
    since_days: Option<u32>,
    limit: Option<usize>,
    newest_first: bool,
) -> Result<ScanOptions> {
    if since_days == Some(0) {
        return Err(ExtractorError::ConfigError(
            "--since-days must be at least 1".to_string(),
        ));
    }
    if limit == Some(0) {
        return Err(ExtractorError::ConfigError(
            "--limit must be at least 1".to_string(),
        ));
    }

    let mut options = ScanOptions::from_config(&config.scan);
    if since_days.is_some() {
        options.since_days = since_days;
    }
    if limit.is_some() {
        options.max_messages = limit;
    }
    options.newest_first |= newest_first;
    Ok(options)
}

/// `run`: load everything, scan the selected accounts, return the report and
/// the output format contacts were written in
pub async fn run_command(
    cli: &Cli,
    command: &Commands,
    multi: MultiProgress,
) -> Result<(RunReport, OutputFormat)> {
    let Commands::Run {
        tags,
        format,
        since_days,
        limit,
        newest_first,
    } = command
    else {
        return Err(ExtractorError::Unknown(format!(
            "run_command called with {:?}",
            command
        )));
    };

    let config = Config::load(&cli.config).await?;
    let options = scan_options(&config, *since_days, *limit, *newest_first)?;
    let (accounts, rule_set) = config::load_inputs(&cli.accounts, &cli.rules).await?;

    let selected = config::select_accounts(&accounts, tags)?;
    info!(
        "Selected {} of {} account(s)",
        selected.len(),
        accounts.len()
    );

    let format = format.unwrap_or(config.output.format);
    let connector = ImapConnector::from_config(&config.connection);
    let mut reporter = ConsoleReporter::new(multi, format);

    let report =
        pipeline::run_extraction(&selected, &rule_set, options, &connector, &mut reporter).await?;
    Ok((report, format))
}

/// `check-config`: validate all three files and describe what a run would do
pub async fn check_config(cli: &Cli) -> Result<()> {
    let config = Config::load(&cli.config).await?;
    let (accounts, rule_set) = config::load_inputs(&cli.accounts, &cli.rules).await?;

    println!("Settings: {:?}", cli.config);
    println!(
        "  mailbox={} batch_size={} since_days={} max_messages={} format={:?}",
        config.scan.mailbox,
        config.scan.batch_size,
        config
            .scan
            .since_days
            .map(|d| d.to_string())
            .unwrap_or_else(|| "all".to_string()),
        config
            .scan
            .max_messages
            .map(|m| m.to_string())
            .unwrap_or_else(|| "unlimited".to_string()),
        config.output.format
    );

    println!("\nAccounts ({}): {:?}", accounts.len(), cli.accounts);
    for account in &accounts {
        println!(
            "  {} {} {}{}{}",
            if account.active { "✓" } else { "-" },
            account.id,
            account.endpoint(),
            if account.tls { "" } else { " (plaintext)" },
            if account.tags.is_empty() {
                String::new()
            } else {
                format!(" [{}]", account.tags.join(", "))
            }
        );
    }

    println!("\nRules ({}): {:?}", rule_set.rules.len(), cli.rules);
    for rule in &rule_set.rules {
        let field = rule
            .field
            .map(|f| f.to_string())
            .unwrap_or_default();
        println!("  {} ({:?} -> {})", rule.name, rule.source, field);
    }
    let on_off = |flag: bool| if flag { "on" } else { "off" };
    println!(
        "\nScreening: {}, dedupe: {}, company from domain: {}",
        on_off(rule_set.screening.enabled),
        on_off(rule_set.options.dedupe),
        on_off(rule_set.options.company_from_domain)
    );
    println!("\nConfiguration OK");
    Ok(())
}

/// `init-config`: write example files into `dir`
pub async fn init_config(dir: &Path, force: bool) -> Result<()> {
    let targets = [
        dir.join("config.toml"),
        dir.join("config").join("accounts.toml"),
        dir.join("config").join("rules.toml"),
    ];

    if !force {
        if let Some(existing) = targets.iter().find(|path| path.exists()) {
            return Err(ExtractorError::ConfigError(format!(
                "{:?} already exists. Use --force to overwrite.",
                existing
            )));
        }
    }

    Config::create_example(dir).await?;

    println!("Created example configuration:");
    for path in &targets {
        println!("  {:?}", path);
    }
    println!("\nEdit config/accounts.toml with your IMAP accounts, then run `contact-extractor check-config`.");
    Ok(())
}
