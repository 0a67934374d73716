//! Identifier quoting shared by every dialect.
//!
//! Quoting is driven by data rather than by per-vendor code: a dialect only
//! contributes its quote characters, its reserved words and its case
//! convention, and the connection contributes the quoting policy
//! (quote everything, force a case, keep reserved-word case). The rules are:
//!
//! 1. an identifier that already contains a quote character is returned as is
//! 2. a forced case convention is applied
//! 3. reserved words are quoted when the dialect quotes reserved words
//! 4. identifiers with whitespace, a dot or a special character are quoted,
//!    as is everything when the connection quotes all fields
//! 5. anything else is returned unchanged
//!
//! Because rule 1 runs first, quoting is idempotent.

use crate::error::{DbError, Result};

/// Characters that force an identifier to be quoted.
pub const SPECIAL_CHARACTERS: &[char] = &[
    '/', '-', '+', ',', '*', '(', ')', '{', '}', '[', ']', '%', '@', '?',
];

/// Maximum identifier length accepted by [`validate_identifier`].
const MAX_IDENTIFIER_LENGTH: usize = 128;

/// Quoting policy for one connection.
#[derive(Debug, Clone, Copy)]
pub struct QuoteRules<'a> {
    pub start_quote: &'a str,
    pub end_quote: &'a str,
    pub quote_all_fields: bool,
    pub force_lower_case: bool,
    pub force_upper_case: bool,
    pub quote_reserved_words: bool,
    pub preserve_reserved_case: bool,
    pub defaults_to_upper_case: bool,
}

/// Quote `field` according to `rules`.
///
/// `is_reserved` is the dialect's reserved-word test. An empty identifier
/// yields an empty string.
pub fn quote_field(field: &str, rules: &QuoteRules<'_>, is_reserved: impl Fn(&str) -> bool) -> String {
    if field.is_empty() {
        return String::new();
    }
    if is_quoted(field, rules) {
        return field.to_string();
    }

    let field = if rules.force_lower_case {
        field.to_lowercase()
    } else if rules.force_upper_case {
        field.to_uppercase()
    } else {
        field.to_string()
    };

    if rules.quote_reserved_words && is_reserved(&field) {
        let quoted = format!("{}{}{}", rules.start_quote, field, rules.end_quote);
        return if rules.preserve_reserved_case {
            quoted
        } else if rules.defaults_to_upper_case {
            quoted.to_uppercase()
        } else {
            quoted.to_lowercase()
        };
    }

    if rules.quote_all_fields || needs_protection(&field) {
        format!("{}{}{}", rules.start_quote, field, rules.end_quote)
    } else {
        field
    }
}

/// True when the identifier already carries one of the quote characters.
fn is_quoted(field: &str, rules: &QuoteRules<'_>) -> bool {
    (!rules.start_quote.is_empty() && field.contains(rules.start_quote))
        || (!rules.end_quote.is_empty() && field.contains(rules.end_quote))
}

/// Whitespace, dots and special characters need quoting.
pub fn needs_protection(field: &str) -> bool {
    field
        .chars()
        .any(|c| c.is_whitespace() || c == '.' || SPECIAL_CHARACTERS.contains(&c))
}

/// Validate a free-form identifier used as a registry or partition key.
///
/// Rejects empty identifiers, null bytes and identifiers over 128 bytes.
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(DbError::Config("Identifier cannot be empty".to_string()));
    }

    if name.contains('\0') {
        return Err(DbError::Config(format!(
            "Identifier contains null byte: {:?}",
            name
        )));
    }

    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(DbError::Config(format!(
            "Identifier exceeds maximum length of {} bytes (got {} bytes): {:?}",
            MAX_IDENTIFIER_LENGTH,
            name.len(),
            name
        )));
    }

    Ok(())
}

/// Quote a string literal: single quotes doubled, CR/LF escaped.
pub fn quote_sql_string(value: &str) -> String {
    let escaped = value
        .replace('\'', "''")
        .replace('\n', "\\n")
        .replace('\r', "\\r");
    format!("'{}'", escaped)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules() -> QuoteRules<'static> {
        QuoteRules {
            start_quote: "\"",
            end_quote: "\"",
            quote_all_fields: false,
            force_lower_case: false,
            force_upper_case: false,
            quote_reserved_words: true,
            preserve_reserved_case: true,
            defaults_to_upper_case: true,
        }
    }

    fn reserved(word: &str) -> bool {
        ["SELECT", "TABLE", "ORDER"]
            .iter()
            .any(|w| w.eq_ignore_ascii_case(word))
    }

    #[test]
    fn test_plain_identifier_unchanged() {
        assert_eq!(quote_field("customer_id", &rules(), reserved), "customer_id");
    }

    #[test]
    fn test_empty_identifier() {
        assert_eq!(quote_field("", &rules(), reserved), "");
    }

    #[test]
    fn test_special_characters_are_quoted() {
        assert_eq!(quote_field("first name", &rules(), reserved), "\"first name\"");
        assert_eq!(quote_field("a.b", &rules(), reserved), "\"a.b\"");
        assert_eq!(quote_field("cost%", &rules(), reserved), "\"cost%\"");
        assert_eq!(quote_field("x-y", &rules(), reserved), "\"x-y\"");
    }

    #[test]
    fn test_already_quoted_passes_through() {
        assert_eq!(quote_field("\"Mixed\"", &rules(), reserved), "\"Mixed\"");
        let lower = QuoteRules {
            force_lower_case: true,
            ..rules()
        };
        assert_eq!(quote_field("\"Mixed\"", &lower, reserved), "\"Mixed\"");
    }

    #[test]
    fn test_reserved_word_case_handling() {
        assert_eq!(quote_field("order", &rules(), reserved), "\"order\"");

        let upper = QuoteRules {
            preserve_reserved_case: false,
            ..rules()
        };
        assert_eq!(quote_field("order", &upper, reserved), "\"ORDER\"");

        let lower = QuoteRules {
            preserve_reserved_case: false,
            defaults_to_upper_case: false,
            ..rules()
        };
        assert_eq!(quote_field("ORDER", &lower, reserved), "\"order\"");

        let off = QuoteRules {
            quote_reserved_words: false,
            ..rules()
        };
        assert_eq!(quote_field("order", &off, reserved), "order");
    }

    #[test]
    fn test_forced_case_and_quote_all() {
        let r = QuoteRules {
            force_upper_case: true,
            ..rules()
        };
        assert_eq!(quote_field("name", &r, reserved), "NAME");

        let r = QuoteRules {
            quote_all_fields: true,
            ..rules()
        };
        assert_eq!(quote_field("name", &r, reserved), "\"name\"");
    }

    #[test]
    fn test_bracket_quotes() {
        let r = QuoteRules {
            start_quote: "[",
            end_quote: "]",
            ..rules()
        };
        assert_eq!(quote_field("my col", &r, reserved), "[my col]");
        assert_eq!(quote_field("[my col]", &r, reserved), "[my col]");
    }

    #[test]
    fn test_validate_identifier() {
        assert!(validate_identifier("group_a").is_ok());
        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("bad\0id").is_err());
        assert!(validate_identifier(&"x".repeat(200)).is_err());
    }

    #[test]
    fn test_quote_sql_string() {
        assert_eq!(quote_sql_string("O'Brien"), "'O''Brien'");
        assert_eq!(quote_sql_string("a\nb"), "'a\\nb'");
    }
}
