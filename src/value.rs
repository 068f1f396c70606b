//! Dynamically typed values seen by expression filters.

use std::fmt;

/// A field value as resolved from a record, genotype, sample or variant.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// A string value.
    String(String),
    /// A numeric value (integer or float).
    Number(f64),
    /// A boolean value (INFO flags, `exists`, comparisons).
    Bool(bool),
    /// Multiple values, e.g. per-allele INFO fields or annotation lists.
    Array(Vec<Value>),
    /// A missing value (`.` or absent).
    Missing,
}

impl Value {
    /// Interpret a raw VCF token: `.` is missing, numbers become numbers.
    pub fn from_token(raw: &str) -> Self {
        if raw.is_empty() || raw == "." {
            return Value::Missing;
        }
        raw.parse::<f64>()
            .map(Value::Number)
            .unwrap_or_else(|_| Value::String(raw.to_string()))
    }

    /// Interpret a comma-separated raw value, collapsing single values.
    pub fn from_list(raw: &str) -> Self {
        if !raw.contains(',') {
            return Value::from_token(raw);
        }
        Value::Array(raw.split(',').map(Value::from_token).collect())
    }

    /// Returns true if this value is missing.
    pub fn is_missing(&self) -> bool {
        matches!(self, Value::Missing)
    }

    /// Attempts to convert to a boolean for filter evaluation.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Missing => Some(false),
            _ => None,
        }
    }

    /// Attempts to convert to a number.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Attempts to convert to a string.
    pub fn as_string(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the type name for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::String(_) => "string",
            Value::Number(_) => "number",
            Value::Bool(_) => "bool",
            Value::Array(_) => "array",
            Value::Missing => "missing",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "\"{}\"", s),
            Value::Number(n) => write!(f, "{}", n),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Array(arr) => {
                write!(f, "[")?;
                for (i, v) in arr.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, "]")
            }
            Value::Missing => write!(f, "."),
        }
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<u64> for Value {
    fn from(n: u64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Number(n as f64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::Array(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        match opt {
            Some(v) => v.into(),
            None => Value::Missing,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_token() {
        assert_eq!(Value::from_token("."), Value::Missing);
        assert_eq!(Value::from_token("12"), Value::Number(12.0));
        assert_eq!(Value::from_token("PASS"), Value::String("PASS".into()));
    }

    #[test]
    fn test_from_list() {
        assert_eq!(
            Value::from_list("1,.,3"),
            Value::Array(vec![Value::Number(1.0), Value::Missing, Value::Number(3.0)])
        );
        assert_eq!(Value::from_list("7"), Value::Number(7.0));
    }
}
