use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use taskgraph_core::error::{Result, TaskgraphError};

/// Flat field → value view used for condition evaluation.
pub type Context = HashMap<String, Value>;

/// Comparison performed by a condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionKind {
    Equals,
    NotEquals,
    Contains,
    NotContains,
    GreaterThan,
    LessThan,
    Exists,
}

/// How a condition's result short-circuits the list it belongs to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogicalOperator {
    /// A false result ends evaluation with `false`.
    #[default]
    And,
    /// A true result ends evaluation with `true`.
    Or,
}

/// A single field/operator/value predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    #[serde(rename = "type", alias = "kind")]
    pub kind: ConditionKind,
    pub field: String,
    #[serde(default)]
    pub value: Value,
    #[serde(default)]
    pub operator: LogicalOperator,
}

impl Condition {
    pub fn new(kind: ConditionKind, field: impl Into<String>, value: Value) -> Self {
        Self {
            kind,
            field: field.into(),
            value,
            operator: LogicalOperator::And,
        }
    }

    pub fn equals(field: impl Into<String>, value: Value) -> Self {
        Self::new(ConditionKind::Equals, field, value)
    }

    pub fn not_equals(field: impl Into<String>, value: Value) -> Self {
        Self::new(ConditionKind::NotEquals, field, value)
    }

    pub fn contains(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(ConditionKind::Contains, field, Value::String(value.into()))
    }

    pub fn not_contains(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(ConditionKind::NotContains, field, Value::String(value.into()))
    }

    pub fn greater_than(field: impl Into<String>, value: Value) -> Self {
        Self::new(ConditionKind::GreaterThan, field, value)
    }

    pub fn less_than(field: impl Into<String>, value: Value) -> Self {
        Self::new(ConditionKind::LessThan, field, value)
    }

    pub fn exists(field: impl Into<String>) -> Self {
        Self::new(ConditionKind::Exists, field, Value::Null)
    }

    /// Switch this condition to `Or` short-circuiting.
    pub fn or(mut self) -> Self {
        self.operator = LogicalOperator::Or;
        self
    }

    /// Evaluate this condition alone. `None` means the field is absent.
    pub fn check(&self, context: &Context) -> Result<Option<bool>> {
        let Some(actual) = lookup(context, &self.field) else {
            return Ok(None);
        };

        let result = match self.kind {
            ConditionKind::Equals => values_equal(actual, &self.value),
            ConditionKind::NotEquals => !values_equal(actual, &self.value),
            ConditionKind::Contains => render(actual).contains(render(&self.value).as_str()),
            ConditionKind::NotContains => !render(actual).contains(render(&self.value).as_str()),
            ConditionKind::GreaterThan => {
                coerce(&self.field, actual)? > coerce(&self.field, &self.value)?
            }
            ConditionKind::LessThan => {
                coerce(&self.field, actual)? < coerce(&self.field, &self.value)?
            }
            ConditionKind::Exists => !actual.is_null(),
        };
        Ok(Some(result))
    }
}

/// Evaluate an ordered condition list against a context.
///
/// This is an asymmetric short-circuit, not a boolean expression:
/// - an empty list is `true`
/// - a field missing from the context makes the whole list `false`,
///   whatever its operator and whatever follows
/// - `And` returns `false` on the first false result
/// - `Or` returns `true` on the first true result
/// - anything that falls through is `true`
pub fn evaluate(conditions: &[Condition], context: &Context) -> Result<bool> {
    for condition in conditions {
        let Some(result) = condition.check(context)? else {
            return Ok(false);
        };

        match condition.operator {
            LogicalOperator::And if !result => return Ok(false),
            LogicalOperator::Or if result => return Ok(true),
            _ => {}
        }
    }
    Ok(true)
}

/// Resolve a field by exact key, then as a dotted path into nested objects.
fn lookup<'a>(context: &'a Context, field: &str) -> Option<&'a Value> {
    if let Some(value) = context.get(field) {
        return Some(value);
    }

    let mut parts = field.split('.');
    let mut current = context.get(parts.next()?)?;
    let mut walked = false;
    for part in parts {
        current = match current {
            Value::Object(map) => map.get(part)?,
            Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
        walked = true;
    }
    walked.then_some(current)
}

/// Deep equality where numbers compare by value, so `5 == 5.0`.
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(k, x)| ys.get(k).is_some_and(|y| values_equal(x, y)))
        }
        _ => a == b,
    }
}

/// String form used by `contains`: strings raw, everything else as JSON.
fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn coerce(field: &str, value: &Value) -> Result<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    number.ok_or_else(|| TaskgraphError::CoercionFailure {
        field: field.to_string(),
        message: format!("{} is not a number", value),
    })
}
