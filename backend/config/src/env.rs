//! `${VAR}` substitution for string values in the config tree.
//!
//! Variable names are uppercase `[A-Z_][A-Z0-9_]*`. `$${VAR}` is kept as
//! the literal text `${VAR}`.

use anyhow::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;

/// `$${VAR}` or `${VAR}`; the leading `$` capture tells escapes apart.
static VAR_REF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\$?)\$\{([A-Z_][A-Z0-9_]*)\}").unwrap());

#[derive(Debug, thiserror::Error)]
#[error("Missing env var \"{var}\" referenced at config path: {path}")]
pub struct MissingEnvVarError {
    pub var: String,
    pub path: String,
}

/// Substitute against the process environment.
pub fn resolve_env_vars(value: &Value) -> Result<Value> {
    let env: HashMap<String, String> = std::env::vars().collect();
    resolve_env_vars_with(value, &env)
}

/// Substitute against an explicit variable map.
pub fn resolve_env_vars_with(value: &Value, env: &HashMap<String, String>) -> Result<Value> {
    Ok(walk(value, env, "")?)
}

fn walk(value: &Value, env: &HashMap<String, String>, path: &str) -> Result<Value, MissingEnvVarError> {
    Ok(match value {
        Value::String(s) => Value::String(substitute(s, env, path)?),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .enumerate()
                .map(|(i, v)| walk(v, env, &format!("{path}[{i}]")))
                .collect::<Result<_, _>>()?,
        ),
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (key, v) in map {
                let child = if path.is_empty() { key.clone() } else { format!("{path}.{key}") };
                out.insert(key.clone(), walk(v, env, &child)?);
            }
            Value::Object(out)
        }
        other => other.clone(),
    })
}

fn substitute(s: &str, env: &HashMap<String, String>, path: &str) -> Result<String, MissingEnvVarError> {
    if !s.contains("${") {
        return Ok(s.to_string());
    }
    let mut out = String::with_capacity(s.len());
    let mut last = 0;
    for caps in VAR_REF.captures_iter(s) {
        let whole = caps.get(0).map_or(0..0, |m| m.range());
        out.push_str(&s[last..whole.start]);
        last = whole.end;
        let name = &caps[2];
        if !caps[1].is_empty() {
            out.push_str("${");
            out.push_str(name);
            out.push('}');
            continue;
        }
        match env.get(name).filter(|v| !v.is_empty()) {
            Some(val) => out.push_str(val),
            None => {
                return Err(MissingEnvVarError { var: name.to_string(), path: path.to_string() });
            }
        }
    }
    out.push_str(&s[last..]);
    Ok(out)
}

/// Names of every unescaped `${VAR}` in the tree, deduplicated and sorted.
pub fn collect_referenced_vars(value: &Value) -> Vec<String> {
    fn collect(value: &Value, out: &mut Vec<String>) {
        match value {
            Value::String(s) => out.extend(
                VAR_REF
                    .captures_iter(s)
                    .filter(|c| c[1].is_empty())
                    .map(|c| c[2].to_string()),
            ),
            Value::Array(items) => items.iter().for_each(|v| collect(v, out)),
            Value::Object(map) => map.values().for_each(|v| collect(v, out)),
            _ => {}
        }
    }
    let mut vars = Vec::new();
    collect(value, &mut vars);
    vars.sort();
    vars.dedup();
    vars
}
