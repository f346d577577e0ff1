//! Per-column encoding rules.
//!
//! Each supported column type maps to a SQL expression that the engine
//! evaluates once per row, yielding either an empty string (null or zero
//! value, so the feature is left out) or a token followed by one space.
//!
//! Text values have every byte in [`DENYLIST`] removed. Those bytes include
//! the trainer's own separators (`|`, `:`, whitespace), so a cleaned value can
//! never open a namespace or assign a feature value by accident.

use crate::error::EncodeError;
use crate::types::{Column, ColumnType};
use std::fmt::Write;
use std::sync::LazyLock;

/// Inclusive byte ranges stripped from text values.
pub const DENYLIST: &[(u8, u8)] = &[
    (0x00, 0x2a),
    (0x2c, 0x2c),
    (0x2f, 0x2f),
    (0x3a, 0x40),
    (0x5b, 0x5e),
    (0x60, 0x60),
    (0x7b, 0x7f),
];

/// Character class for `REGEXP_REPLACE`, escaped for a single-quoted literal.
static DENYLIST_CLASS: LazyLock<String> = LazyLock::new(|| {
    let mut class = String::from("[");
    for &(lo, hi) in DENYLIST {
        if lo == hi {
            let _ = write!(class, "\\\\x{lo:02x}");
        } else {
            let _ = write!(class, "\\\\x{lo:02x}-\\\\x{hi:02x}");
        }
    }
    class.push(']');
    class
});

/// The escaped regex character class used in generated text expressions.
pub fn denylist_class() -> &'static str {
    &DENYLIST_CLASS
}

pub fn is_denied(c: char) -> bool {
    let code = c as u32;
    DENYLIST
        .iter()
        .any(|&(lo, hi)| (lo as u32..=hi as u32).contains(&code))
}

/// Remove every denylisted character from `value`.
///
/// Idempotent: cleaning an already clean string returns it unchanged.
pub fn sanitize_text(value: &str) -> String {
    value.chars().filter(|c| !is_denied(*c)).collect()
}

/// Build the per-row SQL expression for one column.
pub fn encode(name: &str, data_type: &ColumnType) -> Result<String, EncodeError> {
    let col = quote_ident(name);
    let key = sql_literal(&format!("{name}:"));
    let expr = match data_type {
        ColumnType::Double => format!(
            "CASE WHEN COALESCE(CAST({col} AS DOUBLE), 0.0) = 0.0 THEN '' \
             ELSE CONCAT({key}, PRINTF('%.2f', CAST({col} AS DOUBLE)), ' ') END"
        ),
        ColumnType::Integer => format!(
            "CASE WHEN COALESCE({col}, 0) = 0 THEN '' \
             ELSE CONCAT({key}, PRINTF('%d', {col}), ' ') END"
        ),
        ColumnType::Boolean => format!(
            "CASE WHEN COALESCE(CAST({col} AS INT), 0) = 0 THEN '' \
             ELSE CONCAT({key}, PRINTF('%d', CAST({col} AS INT)), ' ') END"
        ),
        ColumnType::Text => format!(
            "CASE WHEN COALESCE({col}, '') = '' THEN '' \
             ELSE CONCAT(REGEXP_REPLACE({col}, '{class}', ''), ' ') END",
            class = denylist_class()
        ),
        ColumnType::Other(raw) => {
            return Err(EncodeError::UnsupportedType {
                column: name.to_string(),
                data_type: raw.clone(),
            });
        }
    };
    Ok(expr)
}

pub fn encode_column(column: &Column) -> Result<String, EncodeError> {
    encode(&column.name, &column.data_type)
}

/// Reference a column by name, backtick-quoting anything that is not a plain identifier.
pub fn quote_ident(name: &str) -> String {
    let plain = !name.is_empty()
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !name.starts_with(|c: char| c.is_ascii_digit());
    if plain {
        name.to_string()
    } else {
        format!("`{}`", name.replace('`', "``"))
    }
}

/// Render `value` as a single-quoted SQL string literal.
pub fn sql_literal(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_double() {
        let expr = encode("amount", &ColumnType::Double).unwrap();
        assert_eq!(
            expr,
            "CASE WHEN COALESCE(CAST(amount AS DOUBLE), 0.0) = 0.0 THEN '' \
             ELSE CONCAT('amount:', PRINTF('%.2f', CAST(amount AS DOUBLE)), ' ') END"
        );
    }

    #[test]
    fn test_encode_integer() {
        let expr = encode("visits", &ColumnType::Integer).unwrap();
        assert_eq!(
            expr,
            "CASE WHEN COALESCE(visits, 0) = 0 THEN '' \
             ELSE CONCAT('visits:', PRINTF('%d', visits), ' ') END"
        );
    }

    #[test]
    fn test_encode_boolean() {
        let expr = encode("is_rush", &ColumnType::Boolean).unwrap();
        assert!(expr.starts_with("CASE WHEN COALESCE(CAST(is_rush AS INT), 0) = 0 THEN ''"));
        assert!(expr.contains("PRINTF('%d', CAST(is_rush AS INT))"));
    }

    #[test]
    fn test_encode_text() {
        let expr = encode("region", &ColumnType::Text).unwrap();
        assert_eq!(
            expr,
            "CASE WHEN COALESCE(region, '') = '' THEN '' ELSE CONCAT(REGEXP_REPLACE(region, \
             '[\\\\x00-\\\\x2a\\\\x2c\\\\x2f\\\\x3a-\\\\x40\\\\x5b-\\\\x5e\\\\x60\\\\x7b-\\\\x7f]', ''), ' ') END"
        );
    }

    #[test]
    fn test_encode_unsupported_names_column_and_type() {
        let err = encode("payload", &ColumnType::Other("struct<a:int>".into())).unwrap_err();
        match err {
            EncodeError::UnsupportedType { column, data_type } => {
                assert_eq!(column, "payload");
                assert_eq!(data_type, "struct<a:int>");
            }
        }
    }

    #[test]
    fn test_encode_is_deterministic() {
        for ty in [
            ColumnType::Double,
            ColumnType::Integer,
            ColumnType::Boolean,
            ColumnType::Text,
        ] {
            assert_eq!(encode("x", &ty).unwrap(), encode("x", &ty).unwrap());
        }
    }

    #[test]
    fn test_denylist_class() {
        assert_eq!(
            denylist_class(),
            "[\\\\x00-\\\\x2a\\\\x2c\\\\x2f\\\\x3a-\\\\x40\\\\x5b-\\\\x5e\\\\x60\\\\x7b-\\\\x7f]"
        );
    }

    #[test]
    fn test_sanitize_text() {
        assert_eq!(sanitize_text("EU;1"), "EU1");
        assert_eq!(sanitize_text("a|b:c,d/e"), "abcde");
        assert_eq!(sanitize_text("new york"), "newyork");
        assert_eq!(sanitize_text("[x]{y}"), "xy");
        assert_eq!(sanitize_text("tab\there\n"), "tabhere");
        assert_eq!(sanitize_text("v1.2-beta_3+"), "v1.2-beta_3+");
        assert_eq!(sanitize_text("caf\u{e9}"), "caf\u{e9}");
        assert_eq!(sanitize_text(""), "");
    }

    #[test]
    fn test_sanitize_text_idempotent() {
        let once = sanitize_text("Hello, World! |ns a:b");
        assert_eq!(sanitize_text(&once), once);
    }

    #[test]
    fn test_is_denied() {
        for c in [' ', '|', ':', ',', '/', '[', ']', '{', '}', '\n', '\0', '\x7f'] {
            assert!(is_denied(c), "{c:?} should be denied");
        }
        for c in ['a', 'Z', '0', '9', '.', '-', '_', '+'] {
            assert!(!is_denied(c), "{c:?} should be kept");
        }
    }

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("amount"), "amount");
        assert_eq!(quote_ident("region__geo__code"), "region__geo__code");
        assert_eq!(quote_ident("1st"), "`1st`");
        assert_eq!(quote_ident("odd name"), "`odd name`");
    }

    #[test]
    fn test_sql_literal() {
        assert_eq!(sql_literal("amount:"), "'amount:'");
        assert_eq!(sql_literal("it's"), "'it\\'s'");
    }
}
