//! Lenient JSON for small-model output.
//!
//! On-device models routinely emit almost-JSON: single-quoted strings,
//! trailing commas, `//` comments, or an object cut off before its closing
//! brace. [`parse_lenient`] tries a strict parse first and then a single
//! normalizing rewrite.

use serde_json::{Map, Value};

/// Parse `input` as JSON, repairing common small-model mistakes.
///
/// Returns `None` when the text is not recoverable.
pub fn parse_lenient(input: &str) -> Option<Value> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }
    if let Ok(v) = serde_json::from_str(input) {
        return Some(v);
    }
    serde_json::from_str(&normalize(input)).ok()
}

/// Like [`parse_lenient`] but only accepts a JSON object.
pub fn parse_object(input: &str) -> Option<Map<String, Value>> {
    match parse_lenient(input)? {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

/// Byte offset one past the `}` that closes the object opening at `start`.
///
/// `text[start..]` must begin with `{`. Strings and escapes are honored.
/// Returns `None` when the object never closes.
pub fn object_end(text: &str, start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (i, ch) in text.get(start..)?.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == q {
                quote = None;
            }
            continue;
        }
        match ch {
            '"' => quote = Some('"'),
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(start + i + 1);
                }
            },
            _ => {},
        }
    }
    None
}

/// Rewrite `input` into something strict JSON can accept.
///
/// One scan handles quoting, comments and trailing commas; unclosed strings
/// and containers are closed at the end.
fn normalize(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len() + 8);
    let mut closers: Vec<char> = Vec::new();
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut i = 0;

    while i < chars.len() {
        let ch = chars[i];

        if let Some(q) = quote {
            if escaped {
                escaped = false;
                out.push(ch);
            } else if ch == '\\' {
                escaped = true;
                out.push(ch);
            } else if ch == q {
                quote = None;
                out.push('"');
            } else if ch == '"' {
                // Bare double quote inside a single-quoted string.
                out.push_str("\\\"");
            } else {
                out.push(ch);
            }
            i += 1;
            continue;
        }

        match ch {
            '"' | '\'' => {
                quote = Some(ch);
                out.push('"');
            },
            '/' if chars.get(i + 1) == Some(&'/') => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
                continue;
            },
            ',' => {
                let next = chars[i + 1..].iter().find(|c| !c.is_whitespace());
                if !matches!(next, Some('}' | ']') | None) {
                    out.push(',');
                }
            },
            '{' => {
                closers.push('}');
                out.push(ch);
            },
            '[' => {
                closers.push(']');
                out.push(ch);
            },
            '}' | ']' => {
                if closers.last() == Some(&ch) {
                    closers.pop();
                }
                out.push(ch);
            },
            _ => out.push(ch),
        }
        i += 1;
    }

    if quote.is_some() {
        out.push('"');
    }
    while let Some(closer) = closers.pop() {
        out.push(closer);
    }
    out
}
