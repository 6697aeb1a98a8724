//! Variable substitution and env-file parsing.
//!
//! Supported forms: `$VAR`, `${VAR}`, `${VAR:-default}` (unset or empty),
//! `${VAR-default}` (unset), `${VAR:?message}` and `${VAR?message}`
//! (required), and `$$` for a literal dollar. Variables come only from the
//! stack's own environment; the reconciler's process environment is never
//! consulted.

use crate::error::{ComposeError, Result};
use serde_yaml::Value;
use std::collections::BTreeMap;
use tracing::warn;

/// Substitutes variables in every string value of a YAML tree. Mapping keys
/// are left alone.
///
/// # Errors
///
/// Returns [`ComposeError::Validation`] for malformed or failed required
/// references.
pub fn interpolate_value(value: &mut Value, env: &BTreeMap<String, String>) -> Result<()> {
    match value {
        Value::String(s) => {
            if s.contains('$') {
                *s = interpolate(s, env)?;
            }
        }
        Value::Sequence(items) => {
            for item in items {
                interpolate_value(item, env)?;
            }
        }
        Value::Mapping(map) => {
            for (_, item) in map.iter_mut() {
                interpolate_value(item, env)?;
            }
        }
        Value::Tagged(tagged) => interpolate_value(&mut tagged.value, env)?,
        Value::Null | Value::Bool(_) | Value::Number(_) => {}
    }
    Ok(())
}

/// Substitutes variables in one string.
///
/// # Errors
///
/// Returns [`ComposeError::Validation`] for an unterminated `${`, an invalid
/// name, or an unset required variable.
pub fn interpolate(input: &str, env: &BTreeMap<String, String>) -> Result<String> {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        if let Some(tail) = after.strip_prefix('$') {
            out.push('$');
            rest = tail;
        } else if let Some(braced) = after.strip_prefix('{') {
            let Some(end) = braced.find('}') else {
                return Err(ComposeError::validation(format!(
                    "unterminated variable reference in {input:?}"
                )));
            };
            out.push_str(&expand(&braced[..end], env)?);
            rest = &braced[end + 1..];
        } else {
            let len = name_len(after);
            if len == 0 {
                out.push('$');
            } else {
                out.push_str(&lookup(&after[..len], env));
            }
            rest = &after[len..];
        }
    }
    out.push_str(rest);
    Ok(out)
}

fn name_len(s: &str) -> usize {
    let mut chars = s.char_indices();
    match chars.next() {
        Some((_, c)) if c == '_' || c.is_ascii_alphabetic() => {}
        _ => return 0,
    }
    chars
        .find(|(_, c)| !(*c == '_' || c.is_ascii_alphanumeric()))
        .map_or(s.len(), |(i, _)| i)
}

fn lookup(name: &str, env: &BTreeMap<String, String>) -> String {
    env.get(name).cloned().unwrap_or_else(|| {
        warn!(variable = name, "variable is not set, substituting an empty string");
        String::new()
    })
}

fn expand(expr: &str, env: &BTreeMap<String, String>) -> Result<String> {
    let len = name_len(expr);
    if len == 0 {
        return Err(ComposeError::validation(format!(
            "invalid variable reference ${{{expr}}}"
        )));
    }
    let (name, modifier) = expr.split_at(len);
    let value = env.get(name);
    let set_and_non_empty = value.filter(|v| !v.is_empty());

    if modifier.is_empty() {
        return Ok(lookup(name, env));
    }
    let resolved = if let Some(default) = modifier.strip_prefix(":-") {
        set_and_non_empty.map_or_else(|| default.to_string(), Clone::clone)
    } else if let Some(default) = modifier.strip_prefix('-') {
        value.map_or_else(|| default.to_string(), Clone::clone)
    } else if let Some(message) = modifier.strip_prefix(":?") {
        set_and_non_empty
            .cloned()
            .ok_or_else(|| required(name, message))?
    } else if let Some(message) = modifier.strip_prefix('?') {
        value.cloned().ok_or_else(|| required(name, message))?
    } else {
        return Err(ComposeError::validation(format!(
            "unsupported modifier {modifier:?} in ${{{expr}}}"
        )));
    };
    Ok(resolved)
}

fn required(name: &str, message: &str) -> ComposeError {
    if message.is_empty() {
        ComposeError::validation(format!("required variable {name} is not set"))
    } else {
        ComposeError::validation(format!("required variable {name} is not set: {message}"))
    }
}

/// Parses `KEY=VALUE` lines. Blank lines and `#` comments are skipped, an
/// `export ` prefix is allowed, and one layer of matching quotes around the
/// value is removed. Lines without `=` are ignored.
#[must_use]
pub fn parse_env_file(contents: &str) -> BTreeMap<String, String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let line = line.strip_prefix("export ").unwrap_or(line);
            let (key, value) = line.split_once('=')?;
            Some((key.trim().to_string(), unquote(value.trim()).to_string()))
        })
        .collect()
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}
