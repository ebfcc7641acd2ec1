// src/bindings/parse.rs

use super::BindingValues;

/// Parse dotenv-style `KEY=VALUE` lines.
///
/// - blank lines and `#` comments are skipped
/// - an optional leading `export ` is ignored
/// - the line is split at the first `=`; lines without one are ignored
/// - one pair of matching single or double quotes around the value is
///   stripped
///
/// Later duplicates win.
pub fn parse_env_lines(input: &str) -> BindingValues {
    let mut values = BindingValues::new();

    for line in input.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);

        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }

        values.insert(key.to_string(), unquote(value.trim()).to_string());
    }

    values
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}
