//! Rule evaluation: turns messages into contacts

use crate::config::RuleSet;
use crate::error::{ExtractorError, Result};
use crate::models::{Contact, ContactField, MatchSource, Message, Rule};
use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;

static NON_DIGIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\D").unwrap());

static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Accepted digit count for phone numbers
const PHONE_DIGITS: std::ops::RangeInclusive<usize> = 10..=15;

/// Characters stripped from the end of URLs found in running text
const URL_TRAILING: &[char] = &['.', ',', ';', ':', ')', '>', ']', '"', '\''];

#[derive(Debug, Clone)]
struct CompiledRule {
    name: String,
    source: MatchSource,
    regex: Regex,
    field: ContactField,
    group: usize,
}

impl CompiledRule {
    fn compile(rule: &Rule) -> Result<Self> {
        let field = rule.field.ok_or_else(|| {
            ExtractorError::ConfigError(format!("rule '{}' is missing a target `field`", rule.name))
        })?;
        let regex = Regex::new(&rule.pattern).map_err(|e| {
            ExtractorError::ConfigError(format!("rule '{}' has an invalid pattern: {}", rule.name, e))
        })?;

        let group = match rule.group {
            Some(group) if group >= regex.captures_len() => {
                return Err(ExtractorError::ConfigError(format!(
                    "rule '{}' selects group {} which the pattern does not have",
                    rule.name, group
                )));
            }
            Some(group) => group,
            None if regex.captures_len() > 1 => 1,
            None => 0,
        };

        Ok(Self {
            name: rule.name.clone(),
            source: rule.source,
            regex,
            field,
            group,
        })
    }

    /// First match in `text` whose selected group normalizes for this field
    fn find_value(&self, text: &str) -> Option<String> {
        self.regex
            .captures_iter(text)
            .filter_map(|caps| caps.get(self.group))
            .find_map(|m| normalize(self.field, m.as_str()))
    }
}

/// Evaluates configured rules, in order, against messages
#[derive(Debug, Clone)]
pub struct RuleEvaluator {
    rules: Vec<CompiledRule>,
    company_from_domain: bool,
}

impl RuleEvaluator {
    pub fn new(rule_set: &RuleSet) -> Result<Self> {
        let mut evaluator = Self::from_rules(&rule_set.rules)?;
        evaluator.company_from_domain = rule_set.options.company_from_domain;
        Ok(evaluator)
    }

    pub fn from_rules(rules: &[Rule]) -> Result<Self> {
        let rules = rules
            .iter()
            .map(CompiledRule::compile)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            rules,
            company_from_domain: false,
        })
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// One entry per matching rule, in rule order
    pub fn evaluate(&self, message: &Message) -> Vec<Result<Contact>> {
        self.rules
            .iter()
            .filter_map(|rule| {
                let text = source_text(rule.source, message);
                let value = rule.find_value(&text)?;
                tracing::debug!(
                    "Rule '{}' matched message {} ({}={})",
                    rule.name,
                    message.uid,
                    rule.field,
                    value
                );
                Some(build_contact(rule, message, value, self.company_from_domain))
            })
            .collect()
    }
}

fn build_contact(
    rule: &CompiledRule,
    message: &Message,
    value: String,
    company_from_domain: bool,
) -> Result<Contact> {
    let mut contact = Contact::new(message.reference(), &rule.name);
    contact.set_field(rule.field, value);

    let sender_email = normalize(ContactField::Email, &message.sender_email);
    if contact.email.is_none() {
        contact.email = sender_email.clone();
    }

    // The sender's name only describes the contact if the address is the sender's too.
    if contact.name.is_none() && contact.email.is_some() && contact.email == sender_email {
        contact.name = clean_name(&message.sender_name);
    }

    let email = match &contact.email {
        Some(email) => email,
        None => {
            return Err(ExtractorError::ExtractionError {
                rule: rule.name.clone(),
                uid: message.uid,
                message: "contact has no email address".to_string(),
            });
        }
    };

    if company_from_domain && contact.company.is_none() {
        contact.company = domain_company(email);
    }

    Ok(contact)
}

/// First label of the address's domain, capitalized: `jane@acme.io` -> `Acme`
pub fn domain_company(email: &str) -> Option<String> {
    let (_, domain) = email.split_once('@')?;
    let label = domain.split('.').next().filter(|label| !label.is_empty())?;

    let mut chars = label.chars();
    let first = chars.next()?;
    Some(
        first
            .to_uppercase()
            .chain(chars.flat_map(|c| c.to_lowercase()))
            .collect(),
    )
}

/// Text a rule with the given source is matched against
pub fn source_text(source: MatchSource, message: &Message) -> Cow<'_, str> {
    match source {
        MatchSource::From => Cow::Borrowed(message.sender_email.as_str()),
        MatchSource::FromName => Cow::Borrowed(message.sender_name.as_str()),
        MatchSource::Subject => Cow::Borrowed(message.subject.as_str()),
        MatchSource::Body => Cow::Borrowed(message.body.as_str()),
        MatchSource::Any => Cow::Owned(format!(
            "{}\n{}\n{}",
            message.from_header, message.subject, message.body
        )),
    }
}

/// Clean a raw match for the given field; `None` if it is not a usable value
pub fn normalize(field: ContactField, raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    match field {
        ContactField::Email => normalize_email(trimmed),
        ContactField::Name => clean_name(trimmed),
        ContactField::Phone => {
            let digits = NON_DIGIT.replace_all(trimmed, "").len();
            PHONE_DIGITS.contains(&digits).then(|| trimmed.to_string())
        }
        ContactField::Company => {
            let collapsed = WHITESPACE_RUN.replace_all(trimmed, " ");
            Some(collapsed.into_owned())
        }
        ContactField::Website => {
            let url = trimmed.trim_end_matches(URL_TRAILING);
            let host = url_host(url)?;
            (!host.contains("linkedin.com")).then(|| url.to_string())
        }
        ContactField::Linkedin => {
            let url = trimmed.trim_end_matches(URL_TRAILING);
            url.to_lowercase()
                .contains("linkedin.com")
                .then(|| url.to_string())
        }
    }
}

fn normalize_email(raw: &str) -> Option<String> {
    let email = raw
        .trim_matches(|c: char| c == '<' || c == '>' || c == '"' || c == '\'' || c.is_whitespace())
        .to_lowercase();

    if email.contains(char::is_whitespace) {
        return None;
    }

    let (local, domain) = email.split_once('@')?;
    if local.is_empty() || domain.is_empty() || domain.contains('@') || !domain.contains('.') {
        return None;
    }

    Some(email)
}

/// Lowercase host of an http(s) URL
fn url_host(url: &str) -> Option<String> {
    let lower = url.to_lowercase();
    let rest = lower
        .strip_prefix("https://")
        .or_else(|| lower.strip_prefix("http://"))?;
    let host = rest
        .split(|c| c == '/' || c == '?' || c == '#' || c == ':')
        .next()
        .unwrap_or_default();

    (!host.is_empty() && host.contains('.')).then(|| host.to_string())
}

/// Split on non-letters and capitalize each word: `"DOE, jane"` -> `"Doe Jane"`
pub fn clean_name(raw: &str) -> Option<String> {
    let words: Vec<String> = raw
        .split(|c: char| !c.is_alphabetic())
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(|c| c.to_lowercase()))
                    .collect(),
                None => String::new(),
            }
        })
        .collect();

    if words.is_empty() {
        None
    } else {
        Some(words.join(" "))
    }
}
