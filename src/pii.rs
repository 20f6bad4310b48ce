//! PII detection and redaction
//!
//! Pattern-based detection over a configured category set. False positives
//! are acceptable; false negatives on the configured categories are not.
//! Redaction replaces each finding's span with a category-tagged placeholder
//! and preserves everything outside redacted spans byte-for-byte. The
//! placeholders themselves never match any built-in pattern, so redaction is
//! idempotent.

use crate::config::PiiConfig;
use crate::error::{GateError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Category of sensitive data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PiiCategory {
    /// Email address
    Email,
    /// Phone number
    Phone,
    /// National ID (SSN-style)
    Ssn,
    /// Payment-card-like digit sequence (Luhn-validated)
    CreditCard,
    /// API key or long opaque credential
    ApiKey,
    /// Caller-configured pattern
    Custom,
}

impl PiiCategory {
    /// The placeholder this category redacts to, e.g. `[EMAIL_REDACTED]`
    pub fn placeholder(&self) -> String {
        format!("[{self}_REDACTED]")
    }
}

impl std::fmt::Display for PiiCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PiiCategory::Email => write!(f, "EMAIL"),
            PiiCategory::Phone => write!(f, "PHONE"),
            PiiCategory::Ssn => write!(f, "SSN"),
            PiiCategory::CreditCard => write!(f, "CREDIT_CARD"),
            PiiCategory::ApiKey => write!(f, "API_KEY"),
            PiiCategory::Custom => write!(f, "CUSTOM"),
        }
    }
}

/// A detected sensitive span.
///
/// Findings from [`PiiScrubber::scan`] are sorted by start offset and never
/// overlap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PiiFinding {
    /// Start byte offset into the source text
    pub start: usize,
    /// End byte offset (exclusive)
    pub end: usize,
    /// Detected category
    pub category: PiiCategory,
    /// Placeholder the span is replaced with
    pub replacement: String,
}

struct PiiPatterns {
    email: Regex,
    phone: Regex,
    ssn: Regex,
    credit_card: Regex,
    api_key: Regex,
}

impl PiiPatterns {
    fn new() -> Self {
        Self {
            // Email addresses
            email: Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").unwrap(),
            // Phone numbers, common US-style formats
            phone: Regex::new(
                r"\b(?:\+?1[-.\s]?)?\(?[0-9]{3}\)?[-.\s]?[0-9]{3}[-.\s]?[0-9]{4}\b",
            )
            .unwrap(),
            // National IDs: 123-45-6789 or 123456789
            ssn: Regex::new(r"\b\d{3}[-\s]?\d{2}[-\s]?\d{4}\b").unwrap(),
            // Payment cards: 16 digits with optional separators, or 15-16 raw
            credit_card: Regex::new(r"\b(?:\d{4}[-\s]?){3}\d{4}\b|\b\d{15,16}\b").unwrap(),
            // Key-shaped credentials: provider prefixes and key=value assignments
            api_key: Regex::new(
                r#"\b(?:sk-[A-Za-z0-9]{20,}|ghp_[A-Za-z0-9]{30,}|AKIA[A-Z0-9]{16}|(?i:api[_-]?key)\s*[=:]\s*['"]?[A-Za-z0-9_\-]{16,}['"]?)"#,
            )
            .unwrap(),
        }
    }
}

/// PII detector and redactor, shared by the input and output paths
pub struct PiiScrubber {
    config: PiiConfig,
    patterns: PiiPatterns,
    custom: Vec<Regex>,
}

impl PiiScrubber {
    /// Create a scrubber for the configured categories
    pub fn new(config: PiiConfig) -> Result<Self> {
        let custom = config
            .custom_patterns
            .iter()
            .map(|p| {
                Regex::new(p).map_err(|e| GateError::Config(format!("bad PII pattern {p:?}: {e}")))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            config,
            patterns: PiiPatterns::new(),
            custom,
        })
    }

    /// Detect all PII in the text.
    ///
    /// Returned findings are sorted by start offset with overlaps removed;
    /// categories scanned earlier win ties.
    pub fn scan(&self, text: &str) -> Vec<PiiFinding> {
        let mut findings = vec![];

        // Scan order is detection priority: digit-heavy categories first so a
        // card number is not claimed piecemeal by the phone pattern.
        if self.enabled(PiiCategory::CreditCard) {
            for m in self.patterns.credit_card.find_iter(text) {
                let digits: String = m.as_str().chars().filter(|c| c.is_ascii_digit()).collect();
                if luhn_check(&digits) {
                    findings.push(finding(m.start(), m.end(), PiiCategory::CreditCard));
                }
            }
        }
        if self.enabled(PiiCategory::Ssn) {
            for m in self.patterns.ssn.find_iter(text) {
                findings.push(finding(m.start(), m.end(), PiiCategory::Ssn));
            }
        }
        if self.enabled(PiiCategory::Email) {
            for m in self.patterns.email.find_iter(text) {
                findings.push(finding(m.start(), m.end(), PiiCategory::Email));
            }
        }
        if self.enabled(PiiCategory::Phone) {
            for m in self.patterns.phone.find_iter(text) {
                findings.push(finding(m.start(), m.end(), PiiCategory::Phone));
            }
        }
        if self.enabled(PiiCategory::ApiKey) {
            for m in self.patterns.api_key.find_iter(text) {
                findings.push(finding(m.start(), m.end(), PiiCategory::ApiKey));
            }
        }
        for pattern in &self.custom {
            for m in pattern.find_iter(text) {
                findings.push(finding(m.start(), m.end(), PiiCategory::Custom));
            }
        }

        // Stable sort keeps scan-order priority for equal starts.
        findings.sort_by_key(|f| f.start);
        remove_overlaps(&mut findings);
        findings
    }

    /// Replace each finding's span with its placeholder.
    ///
    /// Text outside the spans is preserved verbatim. Findings must be sorted
    /// and disjoint, as produced by [`scan`](Self::scan).
    pub fn redact(&self, text: &str, findings: &[PiiFinding]) -> String {
        if findings.is_empty() {
            return text.to_string();
        }

        let mut result = String::with_capacity(text.len());
        let mut last_end = 0;
        for f in findings {
            if f.start > last_end {
                result.push_str(&text[last_end..f.start]);
            }
            result.push_str(&f.replacement);
            last_end = f.end;
        }
        if last_end < text.len() {
            result.push_str(&text[last_end..]);
        }
        result
    }

    /// Scan and redact in one pass
    pub fn scrub(&self, text: &str) -> (String, Vec<PiiFinding>) {
        let findings = self.scan(text);
        let redacted = self.redact(text, &findings);
        (redacted, findings)
    }

    fn enabled(&self, category: PiiCategory) -> bool {
        self.config.categories.contains(&category)
    }
}

fn finding(start: usize, end: usize, category: PiiCategory) -> PiiFinding {
    PiiFinding {
        start,
        end,
        category,
        replacement: category.placeholder(),
    }
}

/// Luhn checksum for payment-card candidates
fn luhn_check(number: &str) -> bool {
    let digits: Vec<u32> = number.chars().filter_map(|c| c.to_digit(10)).collect();
    if digits.len() < 13 {
        return false;
    }

    let mut sum = 0;
    let mut double = false;
    for &digit in digits.iter().rev() {
        let mut d = digit;
        if double {
            d *= 2;
            if d > 9 {
                d -= 9;
            }
        }
        sum += d;
        double = !double;
    }
    sum % 10 == 0
}

/// Drop findings that overlap an earlier one
fn remove_overlaps(findings: &mut Vec<PiiFinding>) {
    if findings.len() < 2 {
        return;
    }
    let mut i = 0;
    while i < findings.len() - 1 {
        if findings[i].end > findings[i + 1].start {
            findings.remove(i + 1);
        } else {
            i += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scrubber() -> PiiScrubber {
        PiiScrubber::new(PiiConfig::default()).unwrap()
    }

    #[test]
    fn test_email_detection() {
        let findings = scrubber().scan("Contact me at john.doe@example.com for details");
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].category, PiiCategory::Email);
    }

    #[test]
    fn test_ssn_detection() {
        let findings = scrubber().scan("My SSN is 123-45-6789, thanks");
        assert!(findings.iter().any(|f| f.category == PiiCategory::Ssn));
    }

    #[test]
    fn test_credit_card_span_and_placeholder() {
        let text = "My card is 4111-1111-1111-1111, please cancel my subscription";
        let findings = scrubber().scan(text);
        let card = findings
            .iter()
            .find(|f| f.category == PiiCategory::CreditCard)
            .expect("card finding");
        assert_eq!(&text[card.start..card.end], "4111-1111-1111-1111");

        let redacted = scrubber().redact(text, &findings);
        assert!(redacted.contains("[CREDIT_CARD_REDACTED]"));
        assert!(!redacted.contains("4111"));
        assert!(redacted.ends_with("please cancel my subscription"));
    }

    #[test]
    fn test_luhn_rejects_non_card_digits() {
        // Fails the Luhn checksum, so it is not a card.
        let findings = scrubber().scan("order number 1234-5678-9012-3456");
        assert!(!findings.iter().any(|f| f.category == PiiCategory::CreditCard));
    }

    #[test]
    fn test_api_key_detection() {
        let findings = scrubber().scan("use api_key=abcdef0123456789abcdef to auth");
        assert!(findings.iter().any(|f| f.category == PiiCategory::ApiKey));

        let findings = scrubber().scan("token sk-abcdefghijklmnopqrstuv123 leaked");
        assert!(findings.iter().any(|f| f.category == PiiCategory::ApiKey));
    }

    #[test]
    fn test_findings_sorted_and_disjoint() {
        let findings =
            scrubber().scan("mail a@b.com, phone 555-123-4567, ssn 123-45-6789, mail c@d.org");
        for pair in findings.windows(2) {
            assert!(pair[0].start <= pair[1].start);
            assert!(pair[0].end <= pair[1].start, "findings overlap");
        }
    }

    #[test]
    fn test_redaction_preserves_surrounding_text() {
        let text = "before test@test.com after";
        let (redacted, findings) = scrubber().scrub(text);
        assert_eq!(findings.len(), 1);
        assert_eq!(redacted, "before [EMAIL_REDACTED] after");
    }

    #[test]
    fn test_redaction_idempotent() {
        let text = "ssn 123-45-6789, card 4111 1111 1111 1111, mail x@y.io, call 555-867-5309";
        let (once, _) = scrubber().scrub(text);
        let (twice, findings) = scrubber().scrub(&once);
        assert_eq!(once, twice);
        assert!(findings.is_empty());
    }

    #[test]
    fn test_disabled_category_ignored() {
        let mut config = PiiConfig::default();
        config.categories.remove(&PiiCategory::Email);
        let scrubber = PiiScrubber::new(config).unwrap();
        assert!(scrubber.scan("mail me at a@b.com").is_empty());
    }

    #[test]
    fn test_custom_pattern() {
        let config = PiiConfig {
            custom_patterns: vec![r"\bEMP-\d{6}\b".to_string()],
            ..PiiConfig::default()
        };
        let scrubber = PiiScrubber::new(config).unwrap();
        let (redacted, findings) = scrubber.scrub("badge EMP-004211 checked in");
        assert_eq!(findings[0].category, PiiCategory::Custom);
        assert_eq!(redacted, "badge [CUSTOM_REDACTED] checked in");
    }

    #[test]
    fn test_bad_custom_pattern_is_config_error() {
        let config = PiiConfig {
            custom_patterns: vec!["(oops".to_string()],
            ..PiiConfig::default()
        };
        assert!(PiiScrubber::new(config).is_err());
    }
}
