//! Expression evaluator.
//!
//! Evaluates parsed filter ASTs against anything that can resolve field
//! names to values: fixed columns, samples, genotypes, whole records and
//! variants each implement [`FieldSource`].

use crate::error::{Result, VcfFilterError};
use crate::expr::{AccessPart, BinaryOp, Expr, UnaryOp};
use crate::value::Value;

/// Field lookup used by the evaluator.
pub trait FieldSource {
    /// Resolve an unqualified field name (`QUAL`, `DP`, `NAME`, ...).
    fn field(&self, name: &str) -> Value;

    /// Resolve `INFO.<name>`.
    fn info(&self, _name: &str) -> Value {
        Value::Missing
    }

    /// Resolve `FORMAT.<name>`.
    fn format(&self, _name: &str) -> Value {
        Value::Missing
    }

    /// Subfield names of a structured INFO field such as ANN.
    fn subfields(&self, _name: &str) -> Option<&[String]> {
        None
    }
}

/// Evaluate a filter expression against a field source.
pub fn evaluate<S: FieldSource + ?Sized>(expr: &Expr, source: &S) -> Result<Value> {
    match expr {
        Expr::Number(n) => Ok(Value::Number(*n)),
        Expr::String(s) => Ok(Value::String(s.clone())),
        Expr::Bool(b) => Ok(Value::Bool(*b)),
        Expr::List(items) => Ok(Value::Array(
            items
                .iter()
                .map(|e| evaluate(e, source))
                .collect::<Result<Vec<_>>>()?,
        )),
        Expr::Var(parts) => resolve_variable(parts, source),
        Expr::Binary(left, op, right) => evaluate_binary(left, op, right, source),
        Expr::Unary(UnaryOp::Not, inner) => {
            let val = evaluate(inner, source)?;
            Ok(Value::Bool(!value_to_bool(&val)))
        }
        Expr::Exists(parts) => {
            let value = resolve_variable(parts, source)?;
            Ok(Value::Bool(!value.is_missing()))
        }
    }
}

/// Evaluate an expression and interpret the result as a predicate.
pub fn evaluate_predicate<S: FieldSource + ?Sized>(expr: &Expr, source: &S) -> Result<bool> {
    Ok(value_to_bool(&evaluate(expr, source)?))
}

/// Resolve a variable access path to a value.
fn resolve_variable<S: FieldSource + ?Sized>(parts: &[AccessPart], source: &S) -> Result<Value> {
    let Some(first) = parts.first() else {
        return Ok(Value::Missing);
    };
    let AccessPart::Field(field_name) = first else {
        return Err(VcfFilterError::EvaluationError(
            "Variable must start with a field name".to_string(),
        ));
    };

    match field_name.as_str() {
        "INFO" | "FORMAT" => {
            let Some(AccessPart::Field(name)) = parts.get(1) else {
                return Ok(Value::Missing);
            };
            if field_name == "INFO" {
                Ok(resolve_info_path(name, &parts[2..], source))
            } else if parts.len() > 2 {
                // FORMAT values carry no structured subfields.
                Ok(Value::Missing)
            } else {
                Ok(source.format(name))
            }
        }
        _ if parts.len() == 1 => Ok(source.field(field_name)),
        _ => Ok(resolve_info_path(field_name, &parts[1..], source)),
    }
}

/// Resolve indexed or annotation access on an INFO field.
fn resolve_info_path<S: FieldSource + ?Sized>(
    field_name: &str,
    access_parts: &[AccessPart],
    source: &S,
) -> Value {
    let base_value = source.info(field_name);
    if access_parts.is_empty() {
        return base_value;
    }

    let mut index: Option<usize> = None;
    let mut wildcard = false;
    let mut subfield: Option<&str> = None;
    for part in access_parts {
        match part {
            AccessPart::Index(i) => index = Some(*i),
            AccessPart::Wildcard => wildcard = true,
            AccessPart::Field(name) => subfield = Some(name.as_str()),
        }
    }

    let Value::Array(items) = base_value else {
        // A scalar behaves like a one-element list.
        return match (index, subfield) {
            (Some(0), None) => base_value,
            _ => Value::Missing,
        };
    };

    let Some(subfield) = subfield else {
        if wildcard {
            return Value::Array(items);
        }
        return index
            .and_then(|i| items.get(i).cloned())
            .unwrap_or(Value::Missing);
    };

    let Some(position) = source
        .subfields(field_name)
        .and_then(|names| names.iter().position(|s| s == subfield))
    else {
        return Value::Missing;
    };

    let pick = |annotation: &Value| match annotation {
        Value::Array(arr) => arr.get(position).cloned(),
        _ => None,
    };

    if wildcard {
        Value::Array(items.iter().filter_map(pick).collect())
    } else {
        index
            .and_then(|i| items.get(i))
            .and_then(pick)
            .unwrap_or(Value::Missing)
    }
}

fn evaluate_binary<S: FieldSource + ?Sized>(
    left: &Expr,
    op: &BinaryOp,
    right: &Expr,
    source: &S,
) -> Result<Value> {
    // Logical operators short-circuit before the right side is resolved.
    match op {
        BinaryOp::And => {
            if !value_to_bool(&evaluate(left, source)?) {
                return Ok(Value::Bool(false));
            }
            return Ok(Value::Bool(value_to_bool(&evaluate(right, source)?)));
        }
        BinaryOp::Or => {
            if value_to_bool(&evaluate(left, source)?) {
                return Ok(Value::Bool(true));
            }
            return Ok(Value::Bool(value_to_bool(&evaluate(right, source)?)));
        }
        _ => {}
    }

    let left_val = evaluate(left, source)?;
    let right_val = evaluate(right, source)?;

    if *op == BinaryOp::In {
        let Value::Array(candidates) = right_val else {
            return Err(VcfFilterError::TypeMismatch {
                left: left_val.type_name().to_string(),
                right: right_val.type_name().to_string(),
            });
        };
        let hit = match &left_val {
            Value::Array(arr) => arr
                .iter()
                .any(|v| candidates.iter().any(|c| values_equal(v, c))),
            v => candidates.iter().any(|c| values_equal(v, c)),
        };
        return Ok(Value::Bool(hit));
    }

    // Array on the left side: any element may satisfy the comparison.
    if let Value::Array(ref arr) = left_val {
        let result = match op {
            BinaryOp::Eq => arr.iter().any(|v| values_equal(v, &right_val)),
            BinaryOp::NotEq => arr.iter().all(|v| !values_equal(v, &right_val)),
            BinaryOp::Contains => arr.iter().any(|v| value_contains(v, &right_val)),
            _ => arr
                .iter()
                .any(|v| compare_values(v, op, &right_val).unwrap_or(false)),
        };
        return Ok(Value::Bool(result));
    }

    let result = match op {
        BinaryOp::Eq => values_equal(&left_val, &right_val),
        BinaryOp::NotEq => !values_equal(&left_val, &right_val),
        BinaryOp::Contains => value_contains(&left_val, &right_val),
        _ => compare_values(&left_val, op, &right_val)?,
    };
    Ok(Value::Bool(result))
}

fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::String(l), Value::String(r)) => l == r,
        (Value::Number(l), Value::Number(r)) => (l - r).abs() < f64::EPSILON,
        (Value::Bool(l), Value::Bool(r)) => l == r,
        (Value::Missing, Value::Missing) => true,
        (Value::String(s), Value::Number(n)) | (Value::Number(n), Value::String(s)) => s
            .parse::<f64>()
            .map(|sn| (sn - n).abs() < f64::EPSILON)
            .unwrap_or(false),
        _ => false,
    }
}

fn value_contains(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::String(l), Value::String(r)) => l.contains(r.as_str()),
        _ => false,
    }
}

/// Compare two values with an ordering operator. Missing never compares.
fn compare_values(left: &Value, op: &BinaryOp, right: &Value) -> Result<bool> {
    if left.is_missing() || right.is_missing() {
        return Ok(false);
    }

    let ordering = match (left.as_number(), right.as_number()) {
        (Some(l), Some(r)) => l.partial_cmp(&r),
        _ => match (left, right) {
            (Value::String(l), Value::String(r)) => Some(l.cmp(r)),
            _ => {
                return Err(VcfFilterError::TypeMismatch {
                    left: left.type_name().to_string(),
                    right: right.type_name().to_string(),
                });
            }
        },
    };
    let Some(ordering) = ordering else {
        return Ok(false);
    };

    match op {
        BinaryOp::Lt => Ok(ordering.is_lt()),
        BinaryOp::Gt => Ok(ordering.is_gt()),
        BinaryOp::LtEq => Ok(ordering.is_le()),
        BinaryOp::GtEq => Ok(ordering.is_ge()),
        other => Err(VcfFilterError::EvaluationError(format!(
            "Unexpected operator in compare_values: {:?}",
            other
        ))),
    }
}

fn value_to_bool(val: &Value) -> bool {
    match val {
        Value::Bool(b) => *b,
        Value::Missing => false,
        Value::String(s) => !s.is_empty(),
        Value::Number(n) => *n != 0.0,
        Value::Array(arr) => !arr.is_empty(),
    }
}
