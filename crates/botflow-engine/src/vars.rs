//! Template substitution over the context's variable map.
//!
//! Both execution modes resolve through this one module; the behavior must
//! stay identical no matter which sink the interpreter is wired to.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::Value;

static TOKEN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{\{\s*([^{}]+?)\s*\}\}").unwrap());

/// Replace every resolvable `{{path}}` token in `input`.
///
/// Missing keys and null values leave the original token untouched, so an
/// unanswered `Hello {{name}}` stays visibly unanswered instead of
/// rendering a blank.
pub fn resolve_templates(input: &str, vars: &HashMap<String, Value>) -> String {
    TOKEN_RE
        .replace_all(input, |caps: &Captures| {
            let path = caps[1].trim();
            match lookup_path(vars, path) {
                Some(value) if !value.is_null() => value_text(&value),
                _ => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// Look up a path against the variable map.
///
/// The path is tried as a single flat key first — step outputs produce
/// compound keys like `rest_api_1.data` is resolved against — then as a
/// dotted traversal where any segment may carry array indices
/// (`items[0].name`). An unparseable segment or out-of-range index yields
/// no value, never an error.
pub fn lookup_path(vars: &HashMap<String, Value>, path: &str) -> Option<Value> {
    if let Some(value) = vars.get(path) {
        return Some(value.clone());
    }

    let mut current: Option<&Value> = None;
    for segment in path.split('.') {
        let (name, indices) = parse_segment(segment)?;
        let mut value = match current {
            None => vars.get(name)?,
            Some(parent) => parent.get(name)?,
        };
        for idx in indices {
            value = value.get(idx)?;
        }
        current = Some(value);
    }
    current.cloned()
}

/// Traverse a dotted path (with optional array indices) inside one value.
pub fn get_path(root: &Value, path: &str) -> Option<Value> {
    let mut current = root;
    for segment in path.split('.') {
        let (name, indices) = parse_segment(segment)?;
        current = current.get(name)?;
        for idx in indices {
            current = current.get(idx)?;
        }
    }
    Some(current.clone())
}

/// Coerce a value to the text form used for substitution and comparison:
/// strings verbatim, null as empty, containers as compact JSON.
pub fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Split `items[0][1]` into `("items", [0, 1])`. None on malformed input.
fn parse_segment(segment: &str) -> Option<(&str, Vec<usize>)> {
    let Some(bracket) = segment.find('[') else {
        return Some((segment, Vec::new()));
    };
    let name = &segment[..bracket];
    let mut indices = Vec::new();
    let mut rest = &segment[bracket..];
    while let Some(inner) = rest.strip_prefix('[') {
        let close = inner.find(']')?;
        indices.push(inner[..close].parse().ok()?);
        rest = &inner[close + 1..];
    }
    if !rest.is_empty() {
        return None;
    }
    Some((name, indices))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vars() -> HashMap<String, Value> {
        let mut map = HashMap::new();
        map.insert("name".to_string(), json!("Ada"));
        map.insert("age".to_string(), json!(36));
        map.insert("nothing".to_string(), Value::Null);
        map.insert(
            "order".to_string(),
            json!({"items": [{"sku": "a-1", "qty": 2}, {"sku": "b-2", "qty": 1}], "total": 19.5}),
        );
        map.insert("rest_api_1.data".to_string(), json!({"ok": true}));
        map
    }

    #[test]
    fn test_simple_substitution() {
        let out = resolve_templates("Hello {{name}}, you are {{age}}.", &vars());
        assert_eq!(out, "Hello Ada, you are 36.");
    }

    #[test]
    fn test_missing_key_leaves_token() {
        let out = resolve_templates("Hello {{missing}}", &vars());
        assert_eq!(out, "Hello {{missing}}");
    }

    #[test]
    fn test_null_value_leaves_token() {
        let out = resolve_templates("Got {{nothing}}", &vars());
        assert_eq!(out, "Got {{nothing}}");
    }

    #[test]
    fn test_flat_key_wins_over_traversal() {
        let out = resolve_templates("{{rest_api_1.data}}", &vars());
        assert_eq!(out, r#"{"ok":true}"#);
    }

    #[test]
    fn test_dotted_and_indexed_traversal() {
        let v = vars();
        assert_eq!(lookup_path(&v, "order.total"), Some(json!(19.5)));
        assert_eq!(lookup_path(&v, "order.items[0].sku"), Some(json!("a-1")));
        assert_eq!(lookup_path(&v, "order.items[1].qty"), Some(json!(1)));
    }

    #[test]
    fn test_out_of_range_index_is_no_value() {
        let v = vars();
        assert_eq!(lookup_path(&v, "order.items[9]"), None);
        // The token survives substitution untouched.
        let out = resolve_templates("{{order.items[9].sku}}", &v);
        assert_eq!(out, "{{order.items[9].sku}}");
    }

    #[test]
    fn test_malformed_index_is_no_value() {
        let v = vars();
        assert_eq!(lookup_path(&v, "order.items[x]"), None);
        assert_eq!(lookup_path(&v, "order.items[0"), None);
    }

    #[test]
    fn test_container_serializes_compact() {
        let mut v = vars();
        v.insert("pair".to_string(), json!([1, "two"]));
        let out = resolve_templates("got: {{pair}}", &v);
        assert_eq!(out, r#"got: [1,"two"]"#);

        let out = resolve_templates("{{order.items[0].qty}}", &v);
        assert_eq!(out, "2");
    }

    #[test]
    fn test_get_path_on_value() {
        let root = json!({"data": {"items": [1, 2, 3]}});
        assert_eq!(get_path(&root, "data.items[2]"), Some(json!(3)));
        assert_eq!(get_path(&root, "data.missing"), None);
    }
}
