//! Heuristic parsing of inbound email headers
//!
//! Providers deliver headers either as one raw RFC-5322-style block or as a
//! structured array of `{name, value}` objects. Both paths produce the same
//! lowercased map. Malformed lines are skipped, never an error: callers treat
//! "header absent" as a normal outcome.

use std::collections::HashMap;

/// Parse a raw header block into a lowercased key -> value map.
///
/// Folded continuation lines (leading space or tab) are unfolded into the
/// previous header's value with a single space join. Lines before the first
/// `key:` line and lines without a recognizable key are ignored.
pub fn parse_header_block(raw: &str) -> HashMap<String, String> {
    let mut headers: HashMap<String, String> = HashMap::new();
    let mut current_key: Option<String> = None;

    for line in raw.lines() {
        if line.starts_with(' ') || line.starts_with('\t') {
            // Continuation of the previous header
            if let Some(key) = &current_key {
                if let Some(value) = headers.get_mut(key) {
                    if !value.is_empty() {
                        value.push(' ');
                    }
                    value.push_str(line.trim());
                }
            }
            continue;
        }

        match line.split_once(':') {
            Some((name, value)) if is_header_name(name.trim()) => {
                let key = name.trim().to_lowercase();
                headers.insert(key.clone(), value.trim().to_string());
                current_key = Some(key);
            }
            _ => {
                // Not a header line; skip without touching the current key
            }
        }
    }

    headers
}

/// Convert structured headers (an array of `{name, value}` objects) into the
/// same lowercased map shape as `parse_header_block`.
pub fn extract_structured_headers(value: &serde_json::Value) -> HashMap<String, String> {
    let mut headers = HashMap::new();

    let Some(entries) = value.as_array() else {
        return headers;
    };

    for entry in entries {
        let name = entry.get("name").and_then(|v| v.as_str());
        let header_value = entry.get("value").and_then(|v| v.as_str());

        if let (Some(name), Some(header_value)) = (name, header_value) {
            let name = name.trim();
            if is_header_name(name) {
                headers.insert(name.to_lowercase(), header_value.trim().to_string());
            }
        }
    }

    headers
}

fn is_header_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_graphic() && c != ':')
}
