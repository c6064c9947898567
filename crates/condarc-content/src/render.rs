//! Rendering values as block-style YAML lines
//!
//! Scalars are rendered on a single line: strings that serde_yaml would
//! emit as a multi-line block scalar fall back to a double-quoted form.
//! Sequences under a key are indented one step, as conda writes them.

use crate::value::Value;

/// Render a value that fits on one line.
///
/// Returns `None` for non-empty lists and maps.
pub fn scalar(value: &Value) -> Option<String> {
    let text = match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) => serde_yaml::to_string(f)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_else(|_| f.to_string()),
        Value::String(s) => string(s),
        Value::List(items) if items.is_empty() => "[]".to_string(),
        Value::Map(map) if map.is_empty() => "{}".to_string(),
        Value::List(_) | Value::Map(_) => return None,
    };
    Some(text)
}

/// Render a string scalar, quoting only when YAML would misread it.
pub fn string(s: &str) -> String {
    match serde_yaml::to_string(s) {
        Ok(rendered) => {
            let rendered = rendered.strip_suffix('\n').unwrap_or(&rendered);
            if rendered.contains('\n') {
                quoted(s)
            } else {
                rendered.to_string()
            }
        }
        Err(_) => quoted(s),
    }
}

/// Render a mapping key.
pub fn key(k: &str) -> String {
    string(k)
}

fn quoted(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| format!("\"{}\"", s.replace('"', "\\\"")))
}

/// Render one `key: value` entry at `indent`.
pub fn entry(k: &str, value: &Value, indent: usize, step: usize) -> Vec<String> {
    let pad = " ".repeat(indent);
    let key = key(k);
    match scalar(value) {
        Some(text) => vec![format!("{pad}{key}: {text}")],
        None => {
            let mut lines = vec![format!("{pad}{key}:")];
            lines.extend(children(value, indent + step, step));
            lines
        }
    }
}

/// Render the nested lines of a non-scalar value at `indent`.
///
/// Scalars produce no lines: callers place them inline.
pub fn children(value: &Value, indent: usize, step: usize) -> Vec<String> {
    let mut lines = Vec::new();
    match value {
        Value::Map(map) => {
            for (k, v) in map {
                lines.extend(entry(k, v, indent, step));
            }
        }
        Value::List(items) => {
            let pad = " ".repeat(indent);
            for item in items {
                match scalar(item) {
                    Some(text) => lines.push(format!("{pad}- {text}")),
                    None => {
                        // First nested line moves up onto the dash
                        let mut nested = children(item, indent + 2, step);
                        if let Some(first) = nested.first_mut() {
                            *first = format!("{pad}- {}", &first[indent + 2..]);
                        }
                        lines.extend(nested);
                    }
                }
            }
        }
        _ => {}
    }
    lines
}

/// Render a whole document root as block YAML text.
pub fn document(root: &Value, step: usize) -> String {
    match root {
        Value::Map(map) if map.is_empty() => String::new(),
        Value::Map(_) => {
            let mut out = children(root, 0, step).join("\n");
            out.push('\n');
            out
        }
        other => scalar(other).map(|s| s + "\n").unwrap_or_default(),
    }
}
