// Validation utilities for caller-supplied data
// Includes Australian phone number normalization and webhook field checks

use regex::Regex;
use std::sync::OnceLock;

/// Phone number validator for Australian numbers.
///
/// Callers arrive in local format (0478621276), E.164 (+61478621276), or
/// bare country-code form (61478621276), with arbitrary spacing. Everything
/// is normalized to E.164 before storage or comparison.
pub struct PhoneValidator;

impl PhoneValidator {
    /// Normalize an Australian phone number to E.164 (+61XXXXXXXXX)
    pub fn normalize(phone: &str) -> Option<String> {
        let cleaned: String = phone
            .chars()
            .filter(|c| c.is_ascii_digit() || *c == '+')
            .collect();

        let digits = if let Some(rest) = cleaned.strip_prefix("+61") {
            rest.to_string()
        } else if let Some(rest) = cleaned.strip_prefix("61") {
            // Only treat a leading 61 as a country code when the remainder
            // is a full nine-digit subscriber number
            if rest.len() == 9 {
                rest.to_string()
            } else {
                return None;
            }
        } else if let Some(rest) = cleaned.strip_prefix('0') {
            rest.to_string()
        } else {
            return None;
        };

        if digits.len() != 9 || !digits.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }

        Some(format!("+61{}", digits))
    }

    /// Check whether a phone number is a valid Australian mobile (04xx / +614xx)
    pub fn is_au_mobile(phone: &str) -> bool {
        static AU_MOBILE_REGEX: OnceLock<Regex> = OnceLock::new();
        let regex = AU_MOBILE_REGEX
            .get_or_init(|| Regex::new(r"^\+614\d{8}$").unwrap());

        match Self::normalize(phone) {
            Some(normalized) => regex.is_match(&normalized),
            None => false,
        }
    }

    /// Mask a phone number for logging: keep the last three digits
    pub fn mask(phone: &str) -> String {
        let len = phone.chars().count();
        if len <= 3 {
            return "***".to_string();
        }
        let visible: String = phone.chars().skip(len - 3).collect();
        format!("***{}", visible)
    }
}

/// Split a spoken full name into (first, last).
///
/// Everything after the first token becomes the surname, so multi-word
/// surnames survive intact.
pub fn split_patient_name(name: &str) -> Option<(String, String)> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return None;
    }

    match trimmed.split_once(char::is_whitespace) {
        Some((first, last)) => Some((first.to_string(), last.trim().to_string())),
        None => Some((trimmed.to_string(), String::new())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_local_format() {
        assert_eq!(
            PhoneValidator::normalize("0478621276"),
            Some("+61478621276".to_string())
        );
        assert_eq!(
            PhoneValidator::normalize("0478 621 276"),
            Some("+61478621276".to_string())
        );
    }

    #[test]
    fn test_normalize_e164_passthrough() {
        assert_eq!(
            PhoneValidator::normalize("+61 478 621 276"),
            Some("+61478621276".to_string())
        );
        assert_eq!(
            PhoneValidator::normalize("61478621276"),
            Some("+61478621276".to_string())
        );
    }

    #[test]
    fn test_normalize_rejects_garbage() {
        assert_eq!(PhoneValidator::normalize("12345"), None);
        assert_eq!(PhoneValidator::normalize("not a phone"), None);
        assert_eq!(PhoneValidator::normalize("+1 555 123 4567"), None);
    }

    #[test]
    fn test_au_mobile() {
        assert!(PhoneValidator::is_au_mobile("0478621276"));
        assert!(PhoneValidator::is_au_mobile("+61412345678"));
        // Landline, not mobile
        assert!(!PhoneValidator::is_au_mobile("0298765432"));
        assert!(!PhoneValidator::is_au_mobile("garbage"));
    }

    #[test]
    fn test_mask() {
        assert_eq!(PhoneValidator::mask("+61478621276"), "***276");
        assert_eq!(PhoneValidator::mask("12"), "***");
    }

    #[test]
    fn test_split_patient_name() {
        assert_eq!(
            split_patient_name("Test Patient"),
            Some(("Test".to_string(), "Patient".to_string()))
        );
        assert_eq!(
            split_patient_name("Maria van der Berg"),
            Some(("Maria".to_string(), "van der Berg".to_string()))
        );
        assert_eq!(
            split_patient_name("Cher"),
            Some(("Cher".to_string(), String::new()))
        );
        assert_eq!(split_patient_name("   "), None);
    }
}
