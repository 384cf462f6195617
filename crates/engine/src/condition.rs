//! Condition-node evaluation (spec §4.3): a structural node the engine
//! interprets itself rather than handing to the registry. Its config names
//! a dotted path into the merged input; the value found there (or the whole
//! input, if no path is given) is interpreted JS-truthy-style to choose
//! between the node's `true`/`false` outgoing handles.

use serde_json::Value;

pub const TRUE_HANDLE: &str = "true";
pub const FALSE_HANDLE: &str = "false";

#[must_use]
pub fn evaluate(config: &Value, input: &Value) -> bool {
    let scoped = match config.get("path").and_then(Value::as_str) {
        Some(path) => lookup_path(input, path),
        None => input.clone(),
    };
    truthy(&scoped)
}

#[must_use]
pub fn output_for(predicate: bool) -> Value {
    serde_json::json!({
        "result": predicate,
        "branch": if predicate { TRUE_HANDLE } else { FALSE_HANDLE },
    })
}

pub(crate) fn lookup_path(value: &Value, path: &str) -> Value {
    path.split('.').fold(value.clone(), |acc, segment| match acc {
        Value::Object(ref map) => map.get(segment).cloned().unwrap_or(Value::Null),
        _ => Value::Null,
    })
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_path_evaluates_whole_input() {
        assert!(evaluate(&serde_json::json!({}), &serde_json::json!(true)));
        assert!(!evaluate(&serde_json::json!({}), &serde_json::json!(false)));
    }

    #[test]
    fn path_navigates_nested_objects() {
        let config = serde_json::json!({"path": "status.ok"});
        let input = serde_json::json!({"status": {"ok": true}});
        assert!(evaluate(&config, &input));
    }

    #[test]
    fn missing_path_is_falsy() {
        let config = serde_json::json!({"path": "nope"});
        assert!(!evaluate(&config, &serde_json::json!({})));
    }

    #[test]
    fn empty_string_and_array_are_falsy() {
        assert!(!truthy(&serde_json::json!("")));
        assert!(!truthy(&serde_json::json!([])));
        assert!(truthy(&serde_json::json!("x")));
    }

    #[test]
    fn output_for_names_the_chosen_handle() {
        assert_eq!(output_for(true)["branch"], serde_json::json!(TRUE_HANDLE));
        assert_eq!(output_for(false)["branch"], serde_json::json!(FALSE_HANDLE));
    }
}
