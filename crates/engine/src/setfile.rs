//! MT5 `.set` preset file codec
//!
//! The format is one `key=value` line per parameter, LF-terminated, no BOM,
//! no header. Files written by the terminal itself may also contain
//! `;`-prefixed comments and `value||type||...` metadata suffixes; decode
//! tolerates both.

use crate::types::{ParamValue, Parameters};

/// Render a parameter vector as `.set` file text.
///
/// Insertion order is preserved and values render as plain decimal, so the
/// same input always produces byte-identical output.
pub fn encode(parameters: &Parameters) -> String {
    let mut out = String::new();
    for (key, value) in parameters {
        out.push_str(key);
        out.push('=');
        out.push_str(&value.to_string());
        out.push('\n');
    }
    out
}

/// Parse `.set` file text back into a parameter vector.
pub fn decode(text: &str) -> Parameters {
    let mut parameters = Parameters::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with(';') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        // Terminal-written files append "||type||limits" after the value
        let value = value.split("||").next().unwrap_or("");
        parameters.insert(key.trim().to_string(), ParamValue::parse(value));
    }
    parameters
}
