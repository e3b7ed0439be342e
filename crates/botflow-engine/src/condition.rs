//! Branch-condition evaluation for CONDITION nodes.

use std::collections::HashMap;

use serde_json::Value;

use botflow_graph::{Combinator, ConditionSpec};

use crate::vars::{lookup_path, resolve_templates, value_text};

/// One comparison semantic. Authors write any of several aliases
/// (`"eq"`, `"=="`, `"equals"`, …); they all collapse here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Equals,
    NotEquals,
    Contains,
    NotContains,
    GreaterThan,
    LessThan,
    GreaterOrEqual,
    LessOrEqual,
    IsEmpty,
    IsNotEmpty,
}

impl Operator {
    /// Parse an authored operator, case-insensitively. None for anything
    /// unrecognized — which the evaluator turns into `false`, not an error.
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        match normalized.as_str() {
            "equals" | "equal" | "eq" | "==" | "=" => Some(Self::Equals),
            "not_equals" | "not_equal" | "neq" | "ne" | "!=" => Some(Self::NotEquals),
            "contains" => Some(Self::Contains),
            "not_contains" | "does_not_contain" => Some(Self::NotContains),
            "greater_than" | "gt" | ">" => Some(Self::GreaterThan),
            "less_than" | "lt" | "<" => Some(Self::LessThan),
            "greater_or_equal" | "greater_than_or_equal" | "gte" | ">=" => {
                Some(Self::GreaterOrEqual)
            }
            "less_or_equal" | "less_than_or_equal" | "lte" | "<=" => Some(Self::LessOrEqual),
            "is_empty" | "empty" => Some(Self::IsEmpty),
            "is_not_empty" | "not_empty" => Some(Self::IsNotEmpty),
            _ => None,
        }
    }
}

/// Evaluate a single `(variable, operator, literal)` condition.
pub fn evaluate_single(spec: &ConditionSpec, vars: &HashMap<String, Value>) -> bool {
    let Some(op) = Operator::parse(&spec.operator) else {
        return false;
    };

    let value = lookup_path(vars, &spec.variable);
    let literal = spec
        .value
        .as_deref()
        .map(|raw| resolve_templates(raw, vars))
        .unwrap_or_default();

    match op {
        Operator::Equals => text_of(&value) == literal,
        Operator::NotEquals => text_of(&value) != literal,
        Operator::Contains => text_of(&value)
            .to_lowercase()
            .contains(&literal.to_lowercase()),
        Operator::NotContains => !text_of(&value)
            .to_lowercase()
            .contains(&literal.to_lowercase()),
        // Numeric operators coerce both operands; a non-numeric operand
        // makes the comparison false rather than a type error.
        Operator::GreaterThan => compare_numeric(&value, &literal, |a, b| a > b),
        Operator::LessThan => compare_numeric(&value, &literal, |a, b| a < b),
        Operator::GreaterOrEqual => compare_numeric(&value, &literal, |a, b| a >= b),
        Operator::LessOrEqual => compare_numeric(&value, &literal, |a, b| a <= b),
        Operator::IsEmpty => is_empty(&value),
        Operator::IsNotEmpty => !is_empty(&value),
    }
}

/// Evaluate a condition group. An empty list evaluates false for both
/// combinators.
pub fn evaluate_group(
    combinator: Combinator,
    conditions: &[ConditionSpec],
    vars: &HashMap<String, Value>,
) -> bool {
    if conditions.is_empty() {
        return false;
    }
    match combinator {
        Combinator::And => conditions.iter().all(|c| evaluate_single(c, vars)),
        Combinator::Or => conditions.iter().any(|c| evaluate_single(c, vars)),
    }
}

fn text_of(value: &Option<Value>) -> String {
    value.as_ref().map(value_text).unwrap_or_default()
}

fn compare_numeric(value: &Option<Value>, literal: &str, cmp: impl Fn(f64, f64) -> bool) -> bool {
    let left = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    };
    let right: Option<f64> = literal.trim().parse().ok();
    match (left, right) {
        (Some(a), Some(b)) => cmp(a, b),
        _ => false,
    }
}

fn is_empty(value: &Option<Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        Some(Value::Array(a)) => a.is_empty(),
        Some(Value::Object(o)) => o.is_empty(),
        Some(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spec(variable: &str, operator: &str, value: Option<&str>) -> ConditionSpec {
        ConditionSpec {
            variable: variable.into(),
            operator: operator.into(),
            value: value.map(str::to_string),
        }
    }

    fn vars() -> HashMap<String, Value> {
        let mut map = HashMap::new();
        map.insert("name".to_string(), json!("Ada"));
        map.insert("count".to_string(), json!(7));
        map.insert("note".to_string(), json!("Out of Stock"));
        map.insert("empty_list".to_string(), json!([]));
        map
    }

    #[test]
    fn test_equals_and_aliases() {
        let v = vars();
        assert!(evaluate_single(&spec("name", "equals", Some("Ada")), &v));
        assert!(evaluate_single(&spec("name", "EQ", Some("Ada")), &v));
        assert!(evaluate_single(&spec("name", "==", Some("Ada")), &v));
        assert!(!evaluate_single(&spec("name", "equals", Some("Bob")), &v));
        assert!(evaluate_single(&spec("name", "not_equals", Some("Bob")), &v));
    }

    #[test]
    fn test_contains_case_insensitive() {
        let v = vars();
        assert!(evaluate_single(&spec("note", "contains", Some("stock")), &v));
        assert!(evaluate_single(&spec("note", "not-contains", Some("available")), &v));
    }

    #[test]
    fn test_numeric_comparisons() {
        let v = vars();
        assert!(evaluate_single(&spec("count", "greater_than", Some("5")), &v));
        assert!(evaluate_single(&spec("count", "gte", Some("7")), &v));
        assert!(evaluate_single(&spec("count", "less_than", Some("10")), &v));
        assert!(!evaluate_single(&spec("count", "lt", Some("7")), &v));
    }

    #[test]
    fn test_numeric_on_non_numeric_is_false() {
        let v = vars();
        assert!(!evaluate_single(&spec("name", "greater_than", Some("5")), &v));
        assert!(!evaluate_single(&spec("count", "greater_than", Some("many")), &v));
        assert!(!evaluate_single(&spec("missing", "less_than", Some("5")), &v));
    }

    #[test]
    fn test_emptiness() {
        let v = vars();
        assert!(evaluate_single(&spec("missing", "is_empty", None), &v));
        assert!(evaluate_single(&spec("empty_list", "is_empty", None), &v));
        assert!(evaluate_single(&spec("name", "is_not_empty", None), &v));
        assert!(!evaluate_single(&spec("name", "is_empty", None), &v));
    }

    #[test]
    fn test_unrecognized_operator_is_false() {
        let v = vars();
        assert!(!evaluate_single(&spec("name", "resembles", Some("Ada")), &v));
    }

    #[test]
    fn test_group_and_or() {
        let v = vars();
        let t = spec("name", "equals", Some("Ada"));
        let f = spec("name", "equals", Some("Bob"));

        assert!(!evaluate_group(
            Combinator::And,
            &[t.clone(), t.clone(), f.clone()],
            &v
        ));
        assert!(evaluate_group(
            Combinator::Or,
            &[f.clone(), f.clone(), t.clone()],
            &v
        ));
        assert!(evaluate_group(Combinator::And, &[t.clone(), t.clone()], &v));
        assert!(!evaluate_group(Combinator::Or, &[f.clone(), f], &v));
    }

    #[test]
    fn test_empty_group_is_false() {
        let v = vars();
        assert!(!evaluate_group(Combinator::And, &[], &v));
        assert!(!evaluate_group(Combinator::Or, &[], &v));
    }

    #[test]
    fn test_literal_passes_through_substitution() {
        let mut v = vars();
        v.insert("expected".to_string(), json!("Ada"));
        assert!(evaluate_single(&spec("name", "equals", Some("{{expected}}")), &v));
    }
}
