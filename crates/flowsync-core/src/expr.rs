//! Expression language shared by condition, transform, and webhook-response
//! nodes.
//!
//! Tokens resolve against the execution input and the map of recorded node
//! results:
//!
//! - `$input.a.b`  — dot-path into the execution input
//! - `$nodeId.a.b` — dot-path into that node's result
//! - `'text'` / `"text"` — string literal (templates inside are expanded)
//! - `42`, `-1.5` — numeric literal
//! - `true` / `false` — boolean literal
//! - `"{{$ref}}"` — template interpolation; unresolved refs and nulls
//!   stringify to the empty string
//!
//! Unknown tokens resolve to `None`, which is falsy everywhere.

use serde_json::{Map, Value};

/// Comparison operators in scan order. Longest operators come first so that
/// `>=` is found before its `>` prefix.
const OPERATORS: [&str; 6] = [">=", "<=", "!=", "==", ">", "<"];

// ---------------------------------------------------------------------------
// Token resolution
// ---------------------------------------------------------------------------

/// Walk a dot-separated path into a JSON value. Only object keys are
/// traversed; any miss resolves the whole path to `None`.
pub fn json_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;
    for segment in path.split('.') {
        match current {
            Value::Object(map) => current = map.get(segment)?,
            _ => return None,
        }
    }
    Some(current)
}

/// Resolve a single token against the execution input and node results.
pub fn resolve_token(token: &str, input: &Value, results: &Map<String, Value>) -> Option<Value> {
    let token = token.trim();
    if token.is_empty() {
        return None;
    }

    // $input[.path] — but "$inputX" is a node reference, not the input.
    if let Some(rest) = token.strip_prefix("$input") {
        if rest.is_empty() {
            return Some(input.clone());
        }
        if let Some(path) = rest.strip_prefix('.') {
            return json_path(input, path).cloned();
        }
    }

    // $nodeId[.path]
    if let Some(rest) = token.strip_prefix('$') {
        let (node_id, path) = match rest.split_once('.') {
            Some((node_id, path)) => (node_id, Some(path)),
            None => (rest, None),
        };
        let node_result = results.get(node_id)?;
        return match path {
            Some(path) => json_path(node_result, path).cloned(),
            None => Some(node_result.clone()),
        };
    }

    // Quoted string literal; templates inside are expanded.
    if token.len() >= 2 {
        let bytes = token.as_bytes();
        let quote = bytes[0];
        if (quote == b'\'' || quote == b'"') && bytes[token.len() - 1] == quote {
            let inner = &token[1..token.len() - 1];
            if inner.contains("{{") {
                return Some(Value::String(interpolate(inner, input, results)));
            }
            return Some(Value::String(inner.to_string()));
        }
    }

    // Numeric literal: integers keep integer representation.
    if let Ok(i) = token.parse::<i64>() {
        return Some(Value::from(i));
    }
    if let Ok(f) = token.parse::<f64>() {
        return serde_json::Number::from_f64(f).map(Value::Number);
    }

    match token {
        "true" => Some(Value::Bool(true)),
        "false" => Some(Value::Bool(false)),
        "null" => Some(Value::Null),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Condition evaluation
// ---------------------------------------------------------------------------

/// Evaluate a condition expression to a boolean.
///
/// A bare boolean literal (`true`/`1`/`false`/`0`) is returned directly.
/// Otherwise the first operator found (in [`OPERATORS`] scan order) splits
/// the expression once; equality compares stringified values, ordering
/// compares numerically and is false whenever either side is NaN. With no
/// operator the resolved token's truthiness decides.
pub fn evaluate_condition(expr: &str, input: &Value, results: &Map<String, Value>) -> bool {
    let expr = expr.trim();

    match expr {
        "true" | "1" => return true,
        "false" | "0" | "" => return false,
        _ => {}
    }

    for op in OPERATORS {
        if let Some(idx) = expr.find(op) {
            let lhs = resolve_token(&expr[..idx], input, results);
            let rhs = resolve_token(&expr[idx + op.len()..], input, results);
            return match op {
                "==" => compare_string(lhs.as_ref()) == compare_string(rhs.as_ref()),
                "!=" => compare_string(lhs.as_ref()) != compare_string(rhs.as_ref()),
                ">=" => ordered(lhs.as_ref(), rhs.as_ref(), |l, r| l >= r),
                "<=" => ordered(lhs.as_ref(), rhs.as_ref(), |l, r| l <= r),
                ">" => ordered(lhs.as_ref(), rhs.as_ref(), |l, r| l > r),
                "<" => ordered(lhs.as_ref(), rhs.as_ref(), |l, r| l < r),
                _ => unreachable!(),
            };
        }
    }

    truthy(resolve_token(expr, input, results).as_ref())
}

/// Numeric comparison; NaN on either side makes the comparison false.
fn ordered(lhs: Option<&Value>, rhs: Option<&Value>, cmp: fn(f64, f64) -> bool) -> bool {
    let l = to_number(lhs);
    let r = to_number(rhs);
    if l.is_nan() || r.is_nan() {
        return false;
    }
    cmp(l, r)
}

/// Truthiness of a resolved value. Unresolved tokens are falsy.
pub fn truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => {
            let f = n.as_f64().unwrap_or(f64::NAN);
            f != 0.0 && !f.is_nan()
        }
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}

// ---------------------------------------------------------------------------
// Stringification
// ---------------------------------------------------------------------------

/// String form used for equality comparison. Unresolved tokens compare as
/// `"undefined"` so two unknowns are equal to each other and nothing else.
fn compare_string(value: Option<&Value>) -> String {
    match value {
        None => "undefined".to_string(),
        Some(Value::Null) => "null".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => stringify_number(n),
        Some(Value::Bool(b)) => b.to_string(),
        Some(other) => other.to_string(),
    }
}

/// Numeric coercion for ordering comparisons.
fn to_number(value: Option<&Value>) -> f64 {
    match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(f64::NAN),
        Some(Value::String(s)) => s.trim().parse::<f64>().unwrap_or(f64::NAN),
        Some(Value::Bool(true)) => 1.0,
        Some(Value::Bool(false)) => 0.0,
        _ => f64::NAN,
    }
}

/// Integral floats print without a fractional part so that `5`, `5.0`, and
/// the string `"5"` all compare equal.
fn stringify_number(n: &serde_json::Number) -> String {
    if let Some(i) = n.as_i64() {
        return i.to_string();
    }
    match n.as_f64() {
        Some(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < 9e15 => {
            format!("{}", f as i64)
        }
        _ => n.to_string(),
    }
}

/// Display form used by template interpolation: null and unresolved refs
/// become the empty string.
pub fn display_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Number(n) => stringify_number(n),
        Value::Bool(b) => b.to_string(),
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}

// ---------------------------------------------------------------------------
// Templates
// ---------------------------------------------------------------------------

/// Expand every `{{token}}` span in `template`.
pub fn interpolate(template: &str, input: &Value, results: &Map<String, Value>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                if let Some(value) = resolve_token(&after[..end], input, results) {
                    out.push_str(&display_string(&value));
                }
                rest = &after[end + 2..];
            }
            None => {
                // Unterminated span is kept verbatim.
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }

    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn results() -> Map<String, Value> {
        let mut m = Map::new();
        m.insert("fetch".to_string(), json!({"status": 200, "body": {"ok": true}}));
        m.insert("score".to_string(), json!({"value": 7.5, "name": "alpha"}));
        m
    }

    // -- resolve_token ------------------------------------------------------

    #[test]
    fn resolves_input_path() {
        let input = json!({"user": {"name": "ada"}});
        let v = resolve_token("$input.user.name", &input, &results()).unwrap();
        assert_eq!(v, json!("ada"));
    }

    #[test]
    fn resolves_node_result_path() {
        let v = resolve_token("$fetch.body.ok", &json!({}), &results()).unwrap();
        assert_eq!(v, json!(true));
    }

    #[test]
    fn resolves_whole_node_result() {
        let v = resolve_token("$fetch", &json!({}), &results()).unwrap();
        assert_eq!(v["status"], 200);
    }

    #[test]
    fn unknown_token_resolves_to_none() {
        assert!(resolve_token("$missing.path", &json!({}), &results()).is_none());
        assert!(resolve_token("garbage", &json!({}), &results()).is_none());
    }

    #[test]
    fn literal_tokens() {
        let empty = Map::new();
        assert_eq!(resolve_token("42", &Value::Null, &empty), Some(json!(42)));
        assert_eq!(resolve_token("-1.5", &Value::Null, &empty), Some(json!(-1.5)));
        assert_eq!(resolve_token("'hi'", &Value::Null, &empty), Some(json!("hi")));
        assert_eq!(resolve_token("\"hi\"", &Value::Null, &empty), Some(json!("hi")));
        assert_eq!(resolve_token("true", &Value::Null, &empty), Some(json!(true)));
    }

    // -- evaluate_condition -------------------------------------------------

    #[test]
    fn bare_boolean_literals() {
        let empty = Map::new();
        assert!(evaluate_condition("true", &Value::Null, &empty));
        assert!(evaluate_condition("1", &Value::Null, &empty));
        assert!(!evaluate_condition("false", &Value::Null, &empty));
        assert!(!evaluate_condition("0", &Value::Null, &empty));
    }

    #[test]
    fn numeric_ordering() {
        let r = results();
        assert!(evaluate_condition("$fetch.status >= 200", &json!({}), &r));
        assert!(evaluate_condition("$score.value < 10", &json!({}), &r));
        assert!(!evaluate_condition("$score.value > 10", &json!({}), &r));
    }

    #[test]
    fn equality_compares_as_strings() {
        let r = results();
        assert!(evaluate_condition("$score.name == 'alpha'", &json!({}), &r));
        assert!(evaluate_condition("$fetch.status == 200", &json!({}), &r));
        assert!(evaluate_condition("$score.name != 'beta'", &json!({}), &r));
    }

    #[test]
    fn ordering_with_nan_side_is_false() {
        let r = results();
        // "alpha" coerces to NaN, so both directions are false.
        assert!(!evaluate_condition("$score.name > 1", &json!({}), &r));
        assert!(!evaluate_condition("$score.name < 1", &json!({}), &r));
    }

    #[test]
    fn longest_operator_matches_first() {
        let r = results();
        // ">=" must not be parsed as ">" followed by "= 200".
        assert!(evaluate_condition("$fetch.status >= 200", &json!({}), &r));
        assert!(!evaluate_condition("$fetch.status <= 100", &json!({}), &r));
    }

    #[test]
    fn unknown_token_is_falsy() {
        assert!(!evaluate_condition("$missing.flag", &json!({}), &results()));
    }

    #[test]
    fn input_truthiness_without_operator() {
        let input = json!({"enabled": true, "count": 0});
        let empty = Map::new();
        assert!(evaluate_condition("$input.enabled", &input, &empty));
        assert!(!evaluate_condition("$input.count", &input, &empty));
    }

    // -- interpolation ------------------------------------------------------

    #[test]
    fn interpolates_refs_into_template() {
        let input = json!({"name": "world"});
        let out = interpolate("hello {{$input.name}}!", &input, &results());
        assert_eq!(out, "hello world!");
    }

    #[test]
    fn null_and_unresolved_refs_become_empty() {
        let input = json!({"gone": null});
        let out = interpolate("[{{$input.gone}}][{{$nope.x}}]", &input, &results());
        assert_eq!(out, "[][]");
    }

    #[test]
    fn numbers_interpolate_without_trailing_zero() {
        let out = interpolate("status={{$fetch.status}}", &json!({}), &results());
        assert_eq!(out, "status=200");
    }

    #[test]
    fn unterminated_span_is_kept_verbatim() {
        let out = interpolate("oops {{$fetch.status", &json!({}), &results());
        assert_eq!(out, "oops {{$fetch.status");
    }

    #[test]
    fn quoted_template_token_resolves_to_interpolated_string() {
        let r = results();
        let v = resolve_token("\"{{$score.name}}-1\"", &json!({}), &r).unwrap();
        assert_eq!(v, json!("alpha-1"));
    }
}
