//! Phone number normalization
//!
//! Produces an E.164-like form (`+` followed by digits) so that numbers
//! reported by the PBX can be compared with contact records regardless of
//! spacing, punctuation, or local/international prefixes.

use crate::config::LinkingConfig;

/// Normalizes phone numbers against a default country code
#[derive(Debug, Clone)]
pub struct PhoneNormalizer {
    /// Country code with leading `+`, e.g. `+966`
    country_code: String,
    /// Digits of the country code, e.g. `966`
    cc_digits: String,
    /// Shorter numbers are internal extensions
    min_external_digits: usize,
}

impl PhoneNormalizer {
    /// Create a normalizer for the given default country code
    pub fn new(default_country_code: &str, min_external_digits: usize) -> Self {
        let cc_digits: String = default_country_code
            .chars()
            .filter(char::is_ascii_digit)
            .collect();

        Self {
            country_code: format!("+{}", cc_digits),
            cc_digits,
            min_external_digits,
        }
    }

    /// Build from linking configuration
    pub fn from_config(config: &LinkingConfig) -> Self {
        Self::new(&config.default_country_code, config.min_external_digits)
    }

    /// Normalize a raw number
    ///
    /// ```
    /// use yeastar_core::PhoneNormalizer;
    ///
    /// let n = PhoneNormalizer::new("+966", 6);
    /// assert_eq!(n.normalize("0555123456"), "+966555123456");
    /// assert_eq!(n.normalize("+966 55 512 3456"), "+966555123456");
    /// assert_eq!(n.normalize("966555123456"), "+966555123456");
    /// assert_eq!(n.normalize("00966555123456"), "+966555123456");
    /// ```
    pub fn normalize(&self, raw: &str) -> String {
        let cleaned: String = raw
            .trim()
            .chars()
            .filter(|c| c.is_ascii_digit() || *c == '+')
            .collect();

        if cleaned.is_empty() {
            return String::new();
        }

        let cleaned = match cleaned.strip_prefix("00") {
            Some(rest) => format!("+{}", rest),
            None => cleaned,
        };

        if let Some(rest) = cleaned.strip_prefix('+') {
            let digits = only_digits(rest);
            if digits.is_empty() {
                return String::new();
            }
            return format!("+{}", digits);
        }

        // Stray '+' signs in the middle carry no meaning
        let digits = only_digits(&cleaned);

        if !self.cc_digits.is_empty() && digits.starts_with(&self.cc_digits) {
            return format!("+{}", digits);
        }

        let local = digits.strip_prefix('0').unwrap_or(&digits);
        format!("{}{}", self.country_code, local)
    }

    /// True if the number looks like a PBX extension rather than a phone number
    pub fn is_internal(&self, raw: &str) -> bool {
        let trimmed = raw.trim();
        if trimmed.starts_with('+') || trimmed.starts_with("00") {
            return false;
        }
        let digits = trimmed.chars().filter(char::is_ascii_digit).count();
        digits > 0 && digits < self.min_external_digits
    }

    /// Normalize a number that may be matched against contacts
    ///
    /// Returns `None` for empty input and for internal extensions.
    pub fn normalize_external(&self, raw: &str) -> Option<String> {
        if self.is_internal(raw) {
            return None;
        }
        let normalized = self.normalize(raw);
        (!normalized.is_empty()).then_some(normalized)
    }
}

fn only_digits(s: &str) -> String {
    s.chars().filter(char::is_ascii_digit).collect()
}

/// Last `n` digits of a normalized number, if it has at least that many
pub fn digit_suffix(normalized: &str, n: usize) -> Option<&str> {
    if n == 0 {
        return None;
    }
    let digits = normalized.trim_start_matches('+');
    if digits.len() < n {
        return None;
    }
    Some(&digits[digits.len() - n..])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalizer() -> PhoneNormalizer {
        PhoneNormalizer::new("+966", 6)
    }

    #[test]
    fn test_local_numbers_get_country_code() {
        let n = normalizer();
        assert_eq!(n.normalize("0555123456"), "+966555123456");
        assert_eq!(n.normalize("555123456"), "+966555123456");
        assert_eq!(n.normalize("055-512-3456"), "+966555123456");
    }

    #[test]
    fn test_international_forms() {
        let n = normalizer();
        assert_eq!(n.normalize("+1 (555) 010-9999"), "+15550109999");
        assert_eq!(n.normalize("0015550109999"), "+15550109999");
        assert_eq!(n.normalize("966555123456"), "+966555123456");
    }

    #[test]
    fn test_empty_input() {
        let n = normalizer();
        assert_eq!(n.normalize(""), "");
        assert_eq!(n.normalize("   "), "");
        assert_eq!(n.normalize("+"), "");
        assert_eq!(n.normalize_external(""), None);
    }

    #[test]
    fn test_country_code_without_plus() {
        let n = PhoneNormalizer::new("44", 6);
        assert_eq!(n.normalize("07700900123"), "+447700900123");
    }

    #[test]
    fn test_internal_extensions() {
        let n = normalizer();
        assert!(n.is_internal("101"));
        assert!(n.is_internal(" 2001 "));
        assert!(!n.is_internal("+1555"));
        assert!(!n.is_internal("0555123456"));
        assert_eq!(n.normalize_external("101"), None);
        assert_eq!(
            n.normalize_external("0555123456").as_deref(),
            Some("+966555123456")
        );
    }

    #[test]
    fn test_digit_suffix() {
        assert_eq!(digit_suffix("+966555123456", 8), Some("55123456"));
        assert_eq!(digit_suffix("+1555", 8), None);
        assert_eq!(digit_suffix("+966555123456", 0), None);
    }
}
