use regex::{Captures, Regex};
use lazy_static::lazy_static;
use sha2::{Sha256, Digest};
use base64::{Engine as _, engine::general_purpose};

use crate::config::LoggerConfig;

lazy_static! {
    static ref EMAIL_REGEX: Option<Regex> = Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").ok();
    // UPI virtual payment address, e.g. `ravi.k@okaxis`; runs after e-mail so dotted domains are already gone
    static ref VPA_REGEX: Option<Regex> = Regex::new(r"\b[A-Za-z0-9._-]{2,}@[A-Za-z]{2,}\b").ok();
    static ref CARD_REGEX: Option<Regex> = Regex::new(r"\b(?:\d{4}[-\s]?){3}\d{4}\b").ok();
    static ref PHONE_REGEX: Option<Regex> = Regex::new(r"(?:\+91[-\s]?)?\b[6-9]\d{9}\b").ok();
}

/// PII redaction configuration
#[derive(Debug, Clone)]
pub struct RedactionConfig {
    pub enabled: bool,
    pub redact_emails: bool,
    pub redact_vpas: bool,
    pub redact_card_numbers: bool,
    pub redact_phones: bool,
    pub hash_for_correlation: bool,
    pub custom_patterns: Vec<(Regex, String)>,
}

impl Default for RedactionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            redact_emails: true,
            redact_vpas: true,
            redact_card_numbers: true,
            redact_phones: true,
            hash_for_correlation: false,
            custom_patterns: Vec::new(),
        }
    }
}

impl From<&LoggerConfig> for RedactionConfig {
    fn from(config: &LoggerConfig) -> Self {
        Self {
            enabled: config.redaction_enabled,
            hash_for_correlation: config.hash_for_correlation,
            ..Default::default()
        }
    }
}

/// Redactor for free text and payment references headed for log output
#[derive(Debug, Clone, Default)]
pub struct PiiRedactor {
    config: RedactionConfig,
}

impl PiiRedactor {
    pub fn new(config: RedactionConfig) -> Self {
        Self { config }
    }

    pub fn from_logger_config(config: &LoggerConfig) -> Self {
        Self::new(RedactionConfig::from(config))
    }

    /// Masks e-mail addresses, UPI handles, card numbers and phone numbers in `text`.
    pub fn redact(&self, text: &str) -> String {
        if !self.config.enabled {
            return text.to_string();
        }

        let mut result = text.to_string();

        if self.config.redact_emails {
            result = self.redact_emails(&result);
        }

        if self.config.redact_vpas {
            result = self.redact_vpas(&result);
        }

        // Card numbers before phones: a 16 digit run contains 10 digit runs.
        if self.config.redact_card_numbers {
            result = self.redact_card_numbers(&result);
        }

        if self.config.redact_phones {
            result = self.redact_phones(&result);
        }

        for (pattern, replacement) in &self.config.custom_patterns {
            result = pattern.replace_all(&result, replacement.as_str()).to_string();
        }

        result
    }

    /// Masks an opaque payment reference, keeping only its last four characters.
    pub fn redact_reference(&self, reference: &str) -> String {
        if !self.config.enabled {
            return reference.to_string();
        }
        if self.config.hash_for_correlation {
            return format!("REF[{}]", self.hash_value(reference));
        }

        let chars: Vec<char> = reference.chars().collect();
        let keep = if chars.len() > 4 { 4 } else { 0 };
        let masked = chars.len() - keep;
        let tail: String = chars.iter().skip(masked).collect();
        format!("{}{}", "*".repeat(masked), tail)
    }

    fn redact_emails(&self, text: &str) -> String {
        replace(&EMAIL_REGEX, text, |caps| {
            let email = &caps[0];
            if self.config.hash_for_correlation {
                format!("EMAIL[{}]", self.hash_value(email))
            } else {
                match email.split_once('@') {
                    Some((user, domain)) => format!("{}***@{}***", first_char(user), first_char(domain)),
                    None => "***@***".to_string(),
                }
            }
        })
    }

    fn redact_vpas(&self, text: &str) -> String {
        replace(&VPA_REGEX, text, |caps| {
            let vpa = &caps[0];
            if self.config.hash_for_correlation {
                format!("VPA[{}]", self.hash_value(vpa))
            } else {
                match vpa.split_once('@') {
                    Some((_, handle)) => format!("***@{handle}"),
                    None => "***@***".to_string(),
                }
            }
        })
    }

    fn redact_card_numbers(&self, text: &str) -> String {
        replace(&CARD_REGEX, text, |caps| {
            let card = &caps[0];
            if self.config.hash_for_correlation {
                format!("CARD[{}]", self.hash_value(card))
            } else {
                let digits: String = card.chars().filter(char::is_ascii_digit).collect();
                let last4: String = digits.chars().skip(digits.len().saturating_sub(4)).collect();
                format!("****-****-****-{last4}")
            }
        })
    }

    fn redact_phones(&self, text: &str) -> String {
        replace(&PHONE_REGEX, text, |caps| {
            if self.config.hash_for_correlation {
                format!("PHONE[{}]", self.hash_value(&caps[0]))
            } else {
                "**********".to_string()
            }
        })
    }

    fn hash_value(&self, value: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(value.as_bytes());
        let result = hasher.finalize();
        general_purpose::STANDARD.encode(result.get(..8).unwrap_or_default()) // Use first 8 bytes for shorter hash
    }
}

fn replace<F>(pattern: &Option<Regex>, text: &str, rep: F) -> String
where
    F: FnMut(&Captures) -> String,
{
    match pattern {
        Some(re) => re.replace_all(text, rep).to_string(),
        None => text.to_string(),
    }
}

fn first_char(s: &str) -> String {
    s.chars().take(1).collect()
}
