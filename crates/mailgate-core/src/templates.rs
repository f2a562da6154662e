//! Placeholder substitution for email templates
//!
//! Templates use `{{key}}` placeholders filled from a JSON object. This is a
//! deliberate plain substitution pass: no conditionals, no loops, no escaping.
//! Unknown placeholders are left in place so broken templates stay visible
//! instead of silently rendering blanks.

use serde_json::{Map, Value};

/// Render a template string by substituting `{{key}}` placeholders with
/// values from `data`. Keys may be padded with whitespace (`{{ key }}`).
pub fn render(template: &str, data: &Map<String, Value>) -> String {
    let mut output = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        output.push_str(&rest[..start]);
        let after = &rest[start + 2..];

        match after.find("}}") {
            Some(end) => {
                let key = after[..end].trim();
                match data.get(key) {
                    Some(value) => output.push_str(&format_value(value)),
                    None => {
                        // Unknown key: keep the placeholder verbatim
                        output.push_str(&rest[start..start + 2 + end + 2]);
                    }
                }
                rest = &after[end + 2..];
            }
            None => {
                // Unterminated placeholder, emit the remainder as-is
                output.push_str(&rest[start..]);
                return output;
            }
        }
    }

    output.push_str(rest);
    output
}

fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
