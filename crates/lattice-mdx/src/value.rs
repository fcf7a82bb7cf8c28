use ordered_float::OrderedFloat;
use std::fmt;
use std::sync::Arc;

/// A dynamically typed scalar stored in tables and result cells.
///
/// `Number` wraps [`OrderedFloat`] so values are `Eq + Hash` and can serve as
/// grouping keys.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Value {
    Blank,
    Boolean(bool),
    Number(OrderedFloat<f64>),
    Text(Arc<str>),
}

impl Value {
    pub fn number(n: f64) -> Self {
        Value::Number(OrderedFloat(n))
    }

    pub fn text(s: impl AsRef<str>) -> Self {
        Value::Text(Arc::from(s.as_ref()))
    }

    pub fn is_blank(&self) -> bool {
        matches!(self, Value::Blank)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(n.0),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s.as_ref()),
            _ => None,
        }
    }

    /// Parse a raw field the way the CSV store does: numeric-looking fields
    /// become numbers, empty fields become blank, everything else is text.
    ///
    /// Member literals in queries go through the same inference so that
    /// `[2010]` matches a numeric `Year` column.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Value::Blank;
        }
        match trimmed.parse::<f64>() {
            Ok(n) if n.is_finite() => Value::number(n),
            _ => Value::Text(Arc::from(trimmed)),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Blank => Ok(()),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Number(n) => {
                let v = n.0;
                // Integral values print without a trailing `.0` so captions
                // like a numeric year read `2010`, not `2010.0`.
                if v.fract() == 0.0 && v.abs() < 1e15 {
                    write!(f, "{}", v as i64)
                } else {
                    write!(f, "{v}")
                }
            }
            Value::Text(s) => f.write_str(s),
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::number(n as f64)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::number(n as f64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(Arc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(Arc::from(s.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parse_infers_numbers_and_blanks() {
        assert_eq!(Value::parse("2010"), Value::number(2010.0));
        assert_eq!(Value::parse(" 3.5 "), Value::number(3.5));
        assert_eq!(Value::parse(""), Value::Blank);
        assert_eq!(Value::parse("  "), Value::Blank);
        assert_eq!(Value::parse("May 12,2010"), Value::text("May 12,2010"));
    }

    #[test]
    fn display_drops_trailing_zero_fraction() {
        assert_eq!(Value::number(2010.0).to_string(), "2010");
        assert_eq!(Value::number(2.5).to_string(), "2.5");
        assert_eq!(Value::text("Q2 2010").to_string(), "Q2 2010");
        assert_eq!(Value::Blank.to_string(), "");
    }
}
