use std::{cmp::Ordering, fmt};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::schema::ColumnType;

pub const DEFAULT_DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%Y/%m/%d", "%d-%m-%Y"];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Value {
    Integer(i64),
    Float(f64),
    String(String),
}

impl Value {
    /// Parses a raw field into the narrowest variant that prints back to the
    /// same text.
    pub fn infer(raw: &str) -> Option<Value> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        let integer = trimmed
            .parse::<i64>()
            .ok()
            .filter(|parsed| parsed.to_string() == trimmed)
            .map(Value::Integer);
        let value = integer.or_else(|| {
            trimmed
                .parse::<f64>()
                .ok()
                .filter(|parsed| parsed.is_finite())
                .map(Value::Float)
                .filter(|parsed| parsed.as_display() == trimmed)
        });
        Some(value.unwrap_or_else(|| Value::String(raw.to_string())))
    }

    pub fn empty() -> Value {
        Value::String(String::new())
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Value::String(s) if s.is_empty())
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Integer(_) | Value::Float(_))
    }

    pub fn as_display(&self) -> String {
        match self {
            Value::String(s) => s.clone(),
            Value::Integer(i) => i.to_string(),
            Value::Float(f) => {
                if f.fract() == 0.0 && (i64::MIN as f64..i64::MAX as f64).contains(f) {
                    (*f as i64).to_string()
                } else {
                    f.to_string()
                }
            }
        }
    }

    /// Equality that tolerates integer/float mixing and falls back to the
    /// displayed text when a string meets a number.
    pub fn loosely_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Integer(a), Value::Float(b)) | (Value::Float(b), Value::Integer(a)) => {
                (*a as f64) == *b
            }
            (Value::String(a), Value::String(b)) => a == b,
            _ => self.as_display() == other.as_display(),
        }
    }

    /// Numbers order before text; numbers compare numerically.
    pub fn display_order(&self, other: &Value) -> Ordering {
        match (self.as_f64(), other.as_f64()) {
            (Some(a), Some(b)) => a.total_cmp(&b),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => self.as_display().cmp(&other.as_display()),
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::String(_) => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_display())
    }
}

/// Renders an optional cell, treating null as the empty string.
pub fn display_cell(cell: Option<&Value>) -> String {
    cell.map(Value::as_display).unwrap_or_default()
}

/// Tolerant date parsing: anything that does not match one of `formats`
/// yields `None` instead of an error.
pub fn parse_naive_date<S: AsRef<str>>(value: &str, formats: &[S]) -> Option<NaiveDate> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    formats
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt.as_ref()).ok())
}

/// Replaces every character that is not ASCII alphanumeric with `_`.
pub fn sanitize_identifier(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// Converts a user-supplied choice into the value space of a column. Numeric
/// columns try integer then float; anything unparseable stays a string.
pub fn coerce_choice(raw: &str, column_type: &ColumnType) -> Value {
    match column_type {
        ColumnType::String => Value::String(raw.to_string()),
        ColumnType::Integer | ColumnType::Float => {
            let trimmed = raw.trim();
            if let Ok(parsed) = trimmed.parse::<i64>() {
                Value::Integer(parsed)
            } else if let Ok(parsed) = trimmed.parse::<f64>() {
                Value::Float(parsed)
            } else {
                Value::String(raw.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infer_prefers_integer_then_float_then_string() {
        assert_eq!(Value::infer("42"), Some(Value::Integer(42)));
        assert_eq!(Value::infer("3.5"), Some(Value::Float(3.5)));
        assert_eq!(Value::infer("Met"), Some(Value::String("Met".into())));
        assert_eq!(Value::infer("   "), None);
    }

    #[test]
    fn infer_keeps_text_that_would_not_print_back() {
        assert_eq!(Value::infer("00123"), Some(Value::String("00123".into())));
        assert_eq!(
            Value::infer("12345678901234567890"),
            Some(Value::String("12345678901234567890".into()))
        );
        assert_eq!(Value::infer("3.50"), Some(Value::String("3.50".into())));
        assert_eq!(Value::infer("+5"), Some(Value::String("+5".into())));
    }

    #[test]
    fn whole_floats_outside_i64_do_not_saturate() {
        assert_eq!(Value::Float(4.0).as_display(), "4");
        assert_eq!(Value::Float(1e20).as_display(), "100000000000000000000");
        assert_eq!(Value::Float(-1e20).as_display(), "-100000000000000000000");
        assert_ne!(Value::Float(1e20).as_display(), i64::MAX.to_string());
    }

    #[test]
    fn parse_naive_date_returns_none_for_garbage() {
        let expected = NaiveDate::from_ymd_opt(2023, 9, 14).unwrap();
        assert_eq!(parse_naive_date("2023-09-14", DEFAULT_DATE_FORMATS), Some(expected));
        assert_eq!(parse_naive_date("09/14/2023", DEFAULT_DATE_FORMATS), Some(expected));
        assert_eq!(parse_naive_date("Fall", DEFAULT_DATE_FORMATS), None);
        assert_eq!(parse_naive_date("", DEFAULT_DATE_FORMATS), None);
    }

    #[test]
    fn sanitize_identifier_replaces_non_alphanumeric() {
        assert_eq!(sanitize_identifier("IREADY Math 2022-2023"), "IREADY_Math_2022_2023");
        assert_eq!(sanitize_identifier("Oral Language"), "Oral_Language");
        assert_eq!(sanitize_identifier("é"), "_");
    }

    #[test]
    fn coerce_choice_follows_column_type() {
        assert_eq!(coerce_choice("3", &ColumnType::Integer), Value::Integer(3));
        assert_eq!(coerce_choice("3.5", &ColumnType::Float), Value::Float(3.5));
        assert_eq!(
            coerce_choice("A-", &ColumnType::Integer),
            Value::String("A-".into())
        );
        assert_eq!(coerce_choice("3", &ColumnType::String), Value::String("3".into()));
    }

    #[test]
    fn loosely_equals_mixes_numeric_variants() {
        assert!(Value::Integer(3).loosely_equals(&Value::Float(3.0)));
        assert!(Value::String("3".into()).loosely_equals(&Value::Integer(3)));
        assert!(!Value::String("B".into()).loosely_equals(&Value::Integer(3)));
    }

    #[test]
    fn display_order_puts_numbers_first() {
        let mut values = vec![
            Value::String("A".into()),
            Value::Integer(10),
            Value::Float(2.5),
        ];
        values.sort_by(|a, b| a.display_order(b));
        assert_eq!(
            values,
            vec![Value::Float(2.5), Value::Integer(10), Value::String("A".into())]
        );
    }
}
