//! Rule evaluation against a case's content and call ledger.

use std::collections::HashSet;

use serde_json::Value;

use crate::{ledger::ToolCallRecord, suite::ValidationRule};

/// Largest numeric difference still counted as a match in `tool_args_match`.
pub const NUMERIC_TOLERANCE: f64 = 0.1;

impl ValidationRule {
    /// `Err` carries a human-readable reason.
    pub fn evaluate(&self, content: &str, calls: &[ToolCallRecord]) -> Result<(), String> {
        match self {
            Self::NoToolCalls => {
                if calls.is_empty() {
                    Ok(())
                } else {
                    Err(format!("expected no tool calls, got {}", call_names(calls)))
                }
            },
            Self::ToolMatch { name } => {
                if calls.iter().any(|c| &c.name == name) {
                    Ok(())
                } else {
                    Err(format!("expected a call to {name}, got {}", call_names(calls)))
                }
            },
            Self::ToolMatchAll { names } => {
                let called: HashSet<&str> = calls.iter().map(|c| c.name.as_str()).collect();
                let missing: Vec<&str> = names
                    .iter()
                    .map(String::as_str)
                    .filter(|n| !called.contains(n))
                    .collect();
                if missing.is_empty() {
                    Ok(())
                } else {
                    Err(format!("missing calls to {}", missing.join(", ")))
                }
            },
            Self::ToolArgsMatch { name, args } => {
                let matched = calls.iter().filter(|c| &c.name == name).any(|c| {
                    args.iter().all(|(key, expected)| {
                        c.arguments
                            .get(key)
                            .is_some_and(|actual| values_match(expected, actual))
                    })
                });
                if matched {
                    Ok(())
                } else {
                    Err(format!(
                        "no call to {name} with arguments {}",
                        Value::Object(args.clone())
                    ))
                }
            },
            Self::ToolCountMin { min, name } => {
                let count = calls
                    .iter()
                    .filter(|c| name.as_ref().is_none_or(|n| &c.name == n))
                    .count();
                if count >= *min {
                    Ok(())
                } else {
                    let which = name.as_deref().unwrap_or("any tool");
                    Err(format!("expected at least {min} calls to {which}, got {count}"))
                }
            },
            Self::ResponseLengthMin { min } => {
                let len = content.trim().chars().count();
                if len > 0 && len >= *min {
                    Ok(())
                } else {
                    Err(format!("response length {len} is below {min}"))
                }
            },
            Self::ChatValid => {
                if !calls.is_empty() {
                    Err(format!("chat turn made tool calls: {}", call_names(calls)))
                } else if content.trim().is_empty() {
                    Err("chat turn produced an empty response".into())
                } else {
                    Ok(())
                }
            },
        }
    }
}

/// Reasons for every failing rule; empty when all pass.
pub fn evaluate_all(
    rules: &[ValidationRule],
    content: &str,
    calls: &[ToolCallRecord],
) -> Vec<String> {
    rules
        .iter()
        .filter_map(|rule| rule.evaluate(content, calls).err())
        .collect()
}

/// Numbers (or numeric strings) within [`NUMERIC_TOLERANCE`]; otherwise
/// exact string comparison.
fn values_match(expected: &Value, actual: &Value) -> bool {
    if let (Some(e), Some(a)) = (as_number(expected), as_number(actual)) {
        return (e - a).abs() <= NUMERIC_TOLERANCE + 1e-9;
    }
    match (expected, actual) {
        (Value::String(e), Value::String(a)) => e == a,
        (Value::String(e), other) | (other, Value::String(e)) => *e == other.to_string(),
        (e, a) => e == a,
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn call_names(calls: &[ToolCallRecord]) -> String {
    if calls.is_empty() {
        return "none".into();
    }
    calls
        .iter()
        .map(|c| c.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
