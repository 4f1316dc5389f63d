//! Small input-shape checks shared by the domain crates.

use crate::error::ValidationErrors;

/// Slugs: lowercase ASCII letters, digits, `-` and `_`.
pub fn is_slug(s: &str) -> bool {
    !s.is_empty()
        && s.bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-' || b == b'_')
}

/// Loose email shape check: one `@`, non-empty local part, dotted domain.
pub fn is_email(s: &str) -> bool {
    let Some((local, domain)) = s.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !s.chars().any(char::is_whitespace)
}

/// ISO 4217 shape: three uppercase ASCII letters.
pub fn is_currency(s: &str) -> bool {
    s.len() == 3 && s.bytes().all(|b| b.is_ascii_uppercase())
}

/// Required, trimmed, bounded text field.
pub fn required_text(errors: &mut ValidationErrors, field: &str, value: &str, max: usize) {
    if value.trim().is_empty() {
        errors.add(field, "This field may not be blank.");
    } else {
        max_len(errors, field, value, max);
    }
}

pub fn max_len(errors: &mut ValidationErrors, field: &str, value: &str, max: usize) {
    if value.chars().count() > max {
        errors.add(field, format!("Ensure this field has no more than {max} characters."));
    }
}

pub fn slug(errors: &mut ValidationErrors, field: &str, value: &str, max: usize) {
    if !is_slug(value) {
        errors.add(
            field,
            "Enter a valid slug consisting of lowercase letters, numbers, underscores or hyphens.",
        );
    } else {
        max_len(errors, field, value, max);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_rules() {
        assert!(is_slug("smart-phones_2"));
        assert!(!is_slug("Smart Phones"));
        assert!(!is_slug(""));
    }

    #[test]
    fn email_rules() {
        assert!(is_email("jane@example.com"));
        assert!(!is_email("jane.example.com"));
        assert!(!is_email("jane@localhost"));
        assert!(!is_email("ja ne@example.com"));
    }

    #[test]
    fn currency_rules() {
        assert!(is_currency("USD"));
        assert!(!is_currency("usd"));
        assert!(!is_currency("EURO"));
    }

    #[test]
    fn required_text_reports_blank_and_length() {
        let mut errors = ValidationErrors::new();
        required_text(&mut errors, "name", "   ", 10);
        required_text(&mut errors, "code", "ABCDEFGHIJKL", 10);
        assert!(errors.get("name").is_some());
        assert!(errors.get("code").is_some());
    }
}
