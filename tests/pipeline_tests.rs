//! End-to-end pipeline tests against an in-memory mail server
//!
//! These exercise the full account → scan → evaluate → report flow, including
//! failure isolation between accounts.

mod common;

use common::{
    linkedin_rule, phone_rule, raw_email, rule_set, sender_rule, test_account, write_file,
    FakeConnector, MockConnector,
};
use contact_extractor::config::{RuleOptions, ScreeningConfig};
use contact_extractor::error::ExtractorError;
use contact_extractor::models::{ContactField, MatchSource, Rule};
use contact_extractor::pipeline::{run_extraction, run_from_files, Pipeline};
use contact_extractor::report::MemoryReporter;
use contact_extractor::scanner::ScanOptions;
use tempfile::TempDir;

#[tokio::test]
async fn test_unreachable_account_yields_no_contacts_and_one_failure() {
    let connector = FakeConnector::new().with_unreachable("work");
    let accounts = vec![test_account("work")];
    let mut reporter = MemoryReporter::new();

    let report = run_extraction(
        &accounts,
        &rule_set(vec![sender_rule()]),
        ScanOptions::default(),
        &connector,
        &mut reporter,
    )
    .await
    .unwrap();

    assert_eq!(report.contacts_found, 0);
    assert_eq!(report.accounts_failed(), 1);
    assert_eq!(report.accounts_processed(), 0);
    assert_eq!(report.failures[0].account_id, "work");
    assert!(report.failures[0].error.contains("Connection refused"));
    assert!(reporter.contacts.is_empty());
    assert_eq!(reporter.failed.len(), 1);
}

#[tokio::test]
async fn test_only_matching_message_produces_contact() {
    let connector = FakeConnector::new().with_messages(
        "work",
        vec![
            (
                1,
                raw_email(
                    1,
                    "Jane Doe <jane@agency.com>",
                    "Rust role",
                    "See https://www.linkedin.com/in/jane-doe for my profile",
                ),
            ),
            (2, raw_email(2, "Bob <bob@example.org>", "Lunch", "Noon works")),
        ],
    );
    let accounts = vec![test_account("work")];
    let mut reporter = MemoryReporter::new();

    let report = run_extraction(
        &accounts,
        &rule_set(vec![linkedin_rule()]),
        ScanOptions::default(),
        &connector,
        &mut reporter,
    )
    .await
    .unwrap();

    assert_eq!(report.messages_scanned, 2);
    assert_eq!(report.contacts_found, 1);
    assert_eq!(reporter.contacts.len(), 1);

    let contact = &reporter.contacts[0];
    assert_eq!(contact.source.account_id, "work");
    assert_eq!(contact.source.uid, 1);
    assert_eq!(contact.source.message_id.as_deref(), Some("1@mail.example.com"));
    assert_eq!(
        contact.linkedin_url.as_deref(),
        Some("https://www.linkedin.com/in/jane-doe")
    );
    assert_eq!(contact.email.as_deref(), Some("jane@agency.com"));
    assert_eq!(contact.name.as_deref(), Some("Jane Doe"));
}

#[tokio::test]
async fn test_message_matching_every_rule_yields_one_contact_per_rule() {
    let connector = FakeConnector::new().with_messages(
        "work",
        vec![(
            7,
            raw_email(
                7,
                "Jane Doe <jane@agency.com>",
                "Intro",
                "Call +1 415 555 0100\nhttps://linkedin.com/in/janedoe",
            ),
        )],
    );
    let rules = vec![sender_rule(), phone_rule(), linkedin_rule()];
    let mut reporter = MemoryReporter::new();

    let report = run_extraction(
        &[test_account("work")],
        &rule_set(rules),
        ScanOptions::default(),
        &connector,
        &mut reporter,
    )
    .await
    .unwrap();

    assert_eq!(report.contacts_found, 3);
    let produced_by: Vec<&str> = reporter.contacts.iter().map(|c| c.rule.as_str()).collect();
    assert_eq!(produced_by, vec!["sender", "signature-phone", "linkedin-profile"]);
    assert!(reporter.contacts.iter().all(|c| c.source.uid == 7));
    assert_eq!(reporter.contacts[1].phone.as_deref(), Some("+1 415 555 0100"));
}

#[tokio::test]
async fn test_failing_account_does_not_stop_the_others() {
    let connector = FakeConnector::new()
        .with_messages("first", vec![(1, raw_email(1, "a@alpha.com", "Hi", "x"))])
        .with_unreachable("second")
        .with_messages("third", vec![(5, raw_email(5, "c@gamma.com", "Hi", "y"))]);
    let accounts = vec![
        test_account("first"),
        test_account("second"),
        test_account("third"),
    ];
    let mut reporter = MemoryReporter::new();

    let report = run_extraction(
        &accounts,
        &rule_set(vec![sender_rule()]),
        ScanOptions::default(),
        &connector,
        &mut reporter,
    )
    .await
    .unwrap();

    assert_eq!(connector.connects(), vec!["first", "second", "third"]);
    assert_eq!(connector.logouts(), vec!["first", "third"]);
    assert_eq!(report.accounts_total, 3);
    assert_eq!(report.accounts_processed(), 2);
    assert_eq!(report.accounts_failed(), 1);

    let emails: Vec<&str> = reporter
        .contacts
        .iter()
        .filter_map(|c| c.email.as_deref())
        .collect();
    assert_eq!(emails, vec!["a@alpha.com", "c@gamma.com"]);
}

#[tokio::test]
async fn test_rejected_login_is_reported_per_account() {
    let connector = FakeConnector::new()
        .with_rejected_login("work")
        .with_messages("home", vec![(1, raw_email(1, "a@alpha.com", "Hi", "x"))]);
    let mut reporter = MemoryReporter::new();

    let report = run_extraction(
        &[test_account("work"), test_account("home")],
        &rule_set(vec![sender_rule()]),
        ScanOptions::default(),
        &connector,
        &mut reporter,
    )
    .await
    .unwrap();

    assert_eq!(report.accounts_failed(), 1);
    assert!(report.failures[0].error.contains("Authentication failed"));
    assert_eq!(report.contacts_found, 1);
}

#[tokio::test]
async fn test_session_failure_mid_scan_keeps_earlier_contacts() {
    let messages = (1..=4)
        .map(|uid| (uid, raw_email(uid, &format!("user{}@agency.com", uid), "Hi", "x")))
        .collect();
    let connector = FakeConnector::new()
        .with_broken_session("work", messages, 1)
        .with_messages("home", vec![(9, raw_email(9, "z@zeta.com", "Hi", "x"))]);
    let options = ScanOptions {
        batch_size: 2,
        ..Default::default()
    };
    let mut reporter = MemoryReporter::new();

    let report = run_extraction(
        &[test_account("work"), test_account("home")],
        &rule_set(vec![sender_rule()]),
        options,
        &connector,
        &mut reporter,
    )
    .await
    .unwrap();

    assert_eq!(report.account("work").unwrap().contacts_found, 2);
    assert_eq!(report.account("home").unwrap().contacts_found, 1);
    assert_eq!(report.accounts_failed(), 1);
    assert_eq!(report.failures[0].account_id, "work");
    // The broken session is still logged out.
    assert_eq!(connector.logouts(), vec!["work", "home"]);
}

#[tokio::test]
async fn test_unreadable_message_is_counted_and_skipped() {
    let connector = FakeConnector::new().with_messages(
        "work",
        vec![
            (1, raw_email(1, "a@alpha.com", "Hi", "x")),
            (2, Vec::new()),
            (3, raw_email(3, "c@gamma.com", "Hi", "y")),
        ],
    );
    let mut reporter = MemoryReporter::new();

    let report = run_extraction(
        &[test_account("work")],
        &rule_set(vec![sender_rule()]),
        ScanOptions::default(),
        &connector,
        &mut reporter,
    )
    .await
    .unwrap();

    assert_eq!(report.messages_scanned, 2);
    assert_eq!(report.messages_failed, 1);
    assert_eq!(report.contacts_found, 2);
    assert_eq!(report.accounts_failed(), 0);
    assert_eq!(reporter.extraction_errors.len(), 1);
}

#[tokio::test]
async fn test_contacts_are_streamed_in_uid_order() {
    let connector = FakeConnector::new().with_messages(
        "work",
        (1..=5)
            .map(|uid| (uid, raw_email(uid, &format!("user{}@agency.com", uid), "Hi", "x")))
            .collect(),
    );
    let options = ScanOptions {
        batch_size: 2,
        ..Default::default()
    };
    let mut reporter = MemoryReporter::new();

    run_extraction(
        &[test_account("work")],
        &rule_set(vec![sender_rule()]),
        options,
        &connector,
        &mut reporter,
    )
    .await
    .unwrap();

    let uids: Vec<u32> = reporter.contacts.iter().map(|c| c.source.uid).collect();
    assert_eq!(uids, vec![1, 2, 3, 4, 5]);
    assert_eq!(reporter.connected, vec![("work".to_string(), 5)]);
}

#[tokio::test]
async fn test_newest_first_with_limit() {
    let connector = FakeConnector::new().with_messages(
        "work",
        (1..=5)
            .map(|uid| (uid, raw_email(uid, &format!("user{}@agency.com", uid), "Hi", "x")))
            .collect(),
    );
    let options = ScanOptions {
        newest_first: true,
        max_messages: Some(2),
        since_days: Some(30),
        ..Default::default()
    };
    let mut reporter = MemoryReporter::new();

    run_extraction(
        &[test_account("work")],
        &rule_set(vec![sender_rule()]),
        options,
        &connector,
        &mut reporter,
    )
    .await
    .unwrap();

    let uids: Vec<u32> = reporter.contacts.iter().map(|c| c.source.uid).collect();
    assert_eq!(uids, vec![5, 4]);

    let calls = connector.calls.lock().unwrap();
    assert!(calls.searches[0].1.starts_with("SINCE "));
}

#[tokio::test]
async fn test_screening_skips_excluded_senders() {
    let connector = FakeConnector::new().with_messages(
        "work",
        vec![
            (1, raw_email(1, "noreply@github.com", "Build passed", "x")),
            (2, raw_email(2, "Jane Doe <jane@agency.com>", "Role", "x")),
        ],
    );
    let mut rules = rule_set(vec![sender_rule()]);
    rules.screening = ScreeningConfig {
        enabled: true,
        ..Default::default()
    };
    let mut reporter = MemoryReporter::new();

    let report = run_extraction(
        &[test_account("work")],
        &rules,
        ScanOptions::default(),
        &connector,
        &mut reporter,
    )
    .await
    .unwrap();

    assert_eq!(report.messages_scanned, 2);
    assert_eq!(report.messages_skipped, 1);
    assert_eq!(report.contacts_found, 1);
    assert_eq!(reporter.contacts[0].email.as_deref(), Some("jane@agency.com"));
}

#[tokio::test]
async fn test_dedupe_is_per_account() {
    let repeated = |uid| (uid, raw_email(uid, "Jane <jane@agency.com>", "Hi", "x"));
    let connector = FakeConnector::new()
        .with_messages("work", vec![repeated(1), repeated(2)])
        .with_messages("home", vec![repeated(3)]);
    let mut rules = rule_set(vec![sender_rule()]);
    rules.options = RuleOptions {
        dedupe: true,
        ..Default::default()
    };
    let mut reporter = MemoryReporter::new();

    let report = run_extraction(
        &[test_account("work"), test_account("home")],
        &rules,
        ScanOptions::default(),
        &connector,
        &mut reporter,
    )
    .await
    .unwrap();

    assert_eq!(report.contacts_found, 2);
    assert_eq!(report.account("work").unwrap().duplicates_dropped, 1);
    assert_eq!(report.account("home").unwrap().contacts_found, 1);
}

#[tokio::test]
async fn test_dedupe_keeps_contacts_from_different_rules() {
    let body = "Call +1 415 555 0100\nhttps://linkedin.com/in/janedoe";
    let connector = FakeConnector::new().with_messages(
        "work",
        vec![
            (1, raw_email(1, "Jane Doe <jane@agency.com>", "Intro", body)),
            (2, raw_email(2, "Jane Doe <jane@agency.com>", "Follow-up", body)),
        ],
    );
    let mut rules = rule_set(vec![sender_rule(), phone_rule(), linkedin_rule()]);
    rules.options = RuleOptions {
        dedupe: true,
        ..Default::default()
    };
    let mut reporter = MemoryReporter::new();

    let report = run_extraction(
        &[test_account("work")],
        &rules,
        ScanOptions::default(),
        &connector,
        &mut reporter,
    )
    .await
    .unwrap();

    // Message 1 contributes one contact per rule; message 2 repeats all three.
    assert_eq!(report.contacts_found, 3);
    assert_eq!(report.account("work").unwrap().duplicates_dropped, 3);

    let produced_by: Vec<&str> = reporter.contacts.iter().map(|c| c.rule.as_str()).collect();
    assert_eq!(produced_by, vec!["sender", "signature-phone", "linkedin-profile"]);
    assert!(reporter.contacts.iter().all(|c| c.source.uid == 1));
    assert_eq!(reporter.contacts[1].phone.as_deref(), Some("+1 415 555 0100"));
    assert_eq!(
        reporter.contacts[2].linkedin_url.as_deref(),
        Some("https://linkedin.com/in/janedoe")
    );
}

#[tokio::test]
async fn test_extraction_error_does_not_stop_message() {
    // A company rule on a message without a sender address cannot form a contact.
    let connector = FakeConnector::new().with_messages(
        "work",
        vec![(
            1,
            b"Subject: Opening at Acme Robotics\r\nMessage-ID: <1@x>\r\n\r\nCall 415-555-0100-22\r\n"
                .to_vec(),
        )],
    );
    let rules = rule_set(vec![
        Rule::new("company", MatchSource::Subject, r"at ([A-Z][A-Za-z ]+)", ContactField::Company),
        Rule::new("digits", MatchSource::Body, r"[\d-]{12,}", ContactField::Phone),
    ]);
    let mut reporter = MemoryReporter::new();

    let report = run_extraction(
        &[test_account("work")],
        &rules,
        ScanOptions::default(),
        &connector,
        &mut reporter,
    )
    .await
    .unwrap();

    assert_eq!(report.extraction_errors, 2);
    assert_eq!(report.contacts_found, 0);
    assert_eq!(reporter.extraction_errors.len(), 2);
}

#[tokio::test]
async fn test_invalid_rules_never_contact_any_account() {
    let mut connector = MockConnector::new();
    connector.expect_connect().times(0);

    let bad_rule = Rule::new("broken", MatchSource::Body, "([unclosed", ContactField::Name);
    let mut reporter = MemoryReporter::new();

    let result = run_extraction(
        &[test_account("work")],
        &rule_set(vec![bad_rule]),
        ScanOptions::default(),
        &connector,
        &mut reporter,
    )
    .await;

    assert!(matches!(result, Err(ExtractorError::ConfigError(_))));
    assert!(reporter.started.is_empty());
}

#[test]
fn test_empty_rules_rejected() {
    assert!(matches!(
        Pipeline::new(&rule_set(Vec::new()), ScanOptions::default()),
        Err(ExtractorError::ConfigError(_))
    ));
}

#[tokio::test]
async fn test_malformed_config_files_never_contact_any_account() {
    let dir = TempDir::new().unwrap();
    let accounts = write_file(
        dir.path(),
        "accounts.toml",
        r#"
[[accounts]]
id = "work"
host = "imap.example.com"
username = "me@example.com"
password = "secret"
"#,
    );
    let rules = write_file(dir.path(), "rules.toml", "[[rules]\nname = ");

    let mut connector = MockConnector::new();
    connector.expect_connect().times(0);
    let mut reporter = MemoryReporter::new();

    let result = run_from_files(
        &accounts,
        &rules,
        ScanOptions::default(),
        &connector,
        &mut reporter,
    )
    .await;

    assert!(matches!(result, Err(ExtractorError::ConfigError(_))));
}

#[tokio::test]
async fn test_run_from_files_skips_inactive_accounts() {
    let dir = TempDir::new().unwrap();
    let accounts = write_file(
        dir.path(),
        "accounts.toml",
        r#"
[[accounts]]
id = "work"
host = "imap.example.com"
username = "me@example.com"
password = "secret"

[[accounts]]
id = "old"
host = "imap.example.org"
username = "old@example.org"
password = "secret"
active = false
"#,
    );
    let rules = write_file(
        dir.path(),
        "rules.toml",
        r#"
[[rules]]
name = "sender"
source = "from"
pattern = '(.+@.+)'
field = "email"
"#,
    );

    let connector = FakeConnector::new()
        .with_messages("work", vec![(1, raw_email(1, "a@alpha.com", "Hi", "x"))]);
    let mut reporter = MemoryReporter::new();

    let report = run_from_files(
        &accounts,
        &rules,
        ScanOptions::default(),
        &connector,
        &mut reporter,
    )
    .await
    .unwrap();

    assert_eq!(connector.connects(), vec!["work"]);
    assert_eq!(report.accounts_total, 1);
    assert_eq!(report.contacts_found, 1);
}

#[tokio::test]
async fn test_run_from_files_without_active_accounts_is_config_error() {
    let dir = TempDir::new().unwrap();
    let accounts = write_file(
        dir.path(),
        "accounts.toml",
        r#"
[[accounts]]
id = "old"
host = "imap.example.org"
username = "old@example.org"
password = "secret"
active = false
"#,
    );
    let rules = write_file(
        dir.path(),
        "rules.toml",
        r#"
[[rules]]
name = "sender"
source = "from"
pattern = '(.+@.+)'
field = "email"
"#,
    );

    let mut connector = MockConnector::new();
    connector.expect_connect().times(0);
    let mut reporter = MemoryReporter::new();

    let result = run_from_files(
        &accounts,
        &rules,
        ScanOptions::default(),
        &connector,
        &mut reporter,
    )
    .await;

    match result {
        Err(ExtractorError::ConfigError(message)) => {
            assert!(message.contains("no active accounts"))
        }
        Err(other) => panic!("expected a config error, got {}", other),
        Ok(_) => panic!("expected a config error, got a report"),
    }
    assert!(reporter.started.is_empty());
}
