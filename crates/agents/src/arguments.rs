//! One argument decoder shared by every dialect.
//!
//! Tag dialects hand over JSON; natural-language dialects hand over whatever
//! the model wrote after "with input". Both end up in [`decode_arguments`] or
//! [`coerce_arguments`], which map the result onto the tool's declared
//! parameter types. Nothing here fails: unusable input becomes `{}`.

use std::sync::LazyLock;

use {
    pocketcall_protocol::{ParamType, ToolDescriptor, markers},
    regex::Regex,
    serde_json::{Map, Number, Value},
    tracing::warn,
};

use crate::{compile_regex, json_repair};

/// `key: value` or `key = value`.
static PAIR_KEY_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_regex(r"(?:^|[\s,;{(])([A-Za-z_][A-Za-z0-9_]*)\s*[:=]\s*"));

/// `"value"` or `'value'`.
static QUOTED_RE: LazyLock<Regex> = LazyLock::new(|| compile_regex(r#""([^"]*)"|'([^']*)'"#));

/// Decode free-form argument text for `tool`.
///
/// Tried in order: "no parameters", a JSON object (repaired if needed),
/// explicit `key: value` pairs, quoted values mapped onto declared parameter
/// order, a bare value for a single-parameter tool.
pub fn decode_arguments(raw: &str, tool: &ToolDescriptor) -> Value {
    let text = raw.trim().trim_matches('`').trim();
    if is_empty_marker(text) {
        return empty();
    }

    if text.starts_with('{') {
        if let Some(map) = json_repair::parse_object(text) {
            return Value::Object(coerce_map(map, tool));
        }
    }
    let text = text.trim_start_matches('{').trim_end_matches('}').trim();

    if let Some(map) = decode_pairs(text, tool) {
        return Value::Object(coerce_map(map, tool));
    }

    let quoted: Vec<&str> = QUOTED_RE
        .captures_iter(text)
        .filter_map(|c| c.get(1).or_else(|| c.get(2)))
        .map(|m| m.as_str())
        .collect();
    if !quoted.is_empty() {
        return decode_positional(&quoted, tool);
    }

    if let [only] = tool.parameters.as_slice() {
        let mut map = Map::new();
        map.insert(only.name.clone(), Value::String(text.to_string()));
        return Value::Object(coerce_map(map, tool));
    }

    empty()
}

/// Coerce an already-parsed JSON value onto `tool`'s declared types.
///
/// A JSON string holding an object is unwrapped; any other non-object
/// becomes `{}`.
pub fn coerce_arguments(value: Value, tool: &ToolDescriptor) -> Value {
    match value {
        Value::Object(map) => Value::Object(coerce_map(map, tool)),
        Value::String(s) => match json_repair::parse_object(&s) {
            Some(map) => Value::Object(coerce_map(map, tool)),
            None => decode_arguments(&s, tool),
        },
        _ => empty(),
    }
}

fn empty() -> Value {
    Value::Object(Map::new())
}

fn is_empty_marker(text: &str) -> bool {
    text.is_empty()
        || text.eq_ignore_ascii_case(markers::NO_PARAMETERS)
        || text.eq_ignore_ascii_case("none")
        || text == "{}"
}

/// Explicit pairs. When the tool declares parameters only those keys count,
/// so values may contain `:` or `,` ("city: Paris, France").
fn decode_pairs(text: &str, tool: &ToolDescriptor) -> Option<Map<String, Value>> {
    let keys: Vec<(String, usize, usize)> = PAIR_KEY_RE
        .captures_iter(text)
        .filter_map(|c| {
            let whole = c.get(0)?;
            let key = c.get(1)?;
            let name = canonical_key(key.as_str(), tool)?;
            Some((name, key.start(), whole.end()))
        })
        .collect();
    if keys.is_empty() {
        return None;
    }

    let mut map = Map::new();
    for (idx, (name, _, value_start)) in keys.iter().enumerate() {
        let value_end = keys.get(idx + 1).map_or(text.len(), |next| next.1);
        let value = text[*value_start..value_end]
            .trim()
            .trim_end_matches([',', ';'])
            .trim();
        let value = strip_quotes(value);
        map.insert(name.clone(), Value::String(value.to_string()));
    }
    Some(map)
}

fn canonical_key(key: &str, tool: &ToolDescriptor) -> Option<String> {
    if tool.parameters.is_empty() {
        return Some(key.to_string());
    }
    tool.parameters
        .iter()
        .find(|p| p.name.eq_ignore_ascii_case(key))
        .map(|p| p.name.clone())
}

fn strip_quotes(value: &str) -> &str {
    for q in ['"', '\''] {
        if let Some(inner) = value.strip_prefix(q).and_then(|v| v.strip_suffix(q)) {
            return inner;
        }
    }
    value
}

/// Map quoted values onto declared parameter order.
///
/// A count mismatch is a known accuracy limit of this fallback: it yields
/// `{}` rather than guessing which value belongs where.
fn decode_positional(values: &[&str], tool: &ToolDescriptor) -> Value {
    if values.len() != tool.parameters.len() {
        warn!(
            tool = %tool.name,
            values = values.len(),
            params = tool.parameters.len(),
            "positional argument count mismatch, using empty arguments"
        );
        return empty();
    }
    let map = tool
        .parameters
        .iter()
        .zip(values)
        .map(|(p, v)| (p.name.clone(), Value::String((*v).to_string())))
        .collect();
    Value::Object(coerce_map(map, tool))
}

fn coerce_map(map: Map<String, Value>, tool: &ToolDescriptor) -> Map<String, Value> {
    map.into_iter()
        .map(|(key, value)| {
            let name = canonical_key(&key, tool).unwrap_or(key);
            let value = match tool.param(&name) {
                Some(p) => coerce_value(value, p.param_type),
                None => value,
            };
            (name, value)
        })
        .collect()
}

/// Convert `value` to `ty` when the conversion is lossless; otherwise keep it.
pub fn coerce_value(value: Value, ty: ParamType) -> Value {
    match (ty, value) {
        (ParamType::String, Value::Number(n)) => Value::String(n.to_string()),
        (ParamType::String, Value::Bool(b)) => Value::String(b.to_string()),
        (ParamType::Number, Value::String(s)) => match s.trim().parse::<f64>() {
            Ok(f) => Number::from_f64(f).map_or(Value::String(s), Value::Number),
            Err(_) => Value::String(s),
        },
        (ParamType::Integer, Value::String(s)) => match parse_integer(&s) {
            Some(i) => Value::Number(i.into()),
            None => Value::String(s),
        },
        (ParamType::Integer, Value::Number(n)) => match n.as_f64() {
            Some(f) if n.as_i64().is_none() && f.fract() == 0.0 => Value::Number((f as i64).into()),
            _ => Value::Number(n),
        },
        (ParamType::Boolean, Value::String(s)) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" | "1" => Value::Bool(true),
            "false" | "no" | "0" => Value::Bool(false),
            _ => Value::String(s),
        },
        (ParamType::Array, Value::String(s)) => match json_repair::parse_lenient(&s) {
            Some(v @ Value::Array(_)) => v,
            _ => Value::String(s),
        },
        (ParamType::Object, Value::String(s)) => match json_repair::parse_object(&s) {
            Some(map) => Value::Object(map),
            None => Value::String(s),
        },
        (_, value) => value,
    }
}

fn parse_integer(s: &str) -> Option<i64> {
    let s = s.trim();
    if let Ok(i) = s.parse::<i64>() {
        return Some(i);
    }
    let f = s.parse::<f64>().ok()?;
    (f.fract() == 0.0 && f.is_finite()).then_some(f as i64)
}
