//! Strip incidental markup from a model's plain-text answer.
//!
//! When no tool marker is found the whole response becomes the answer, but
//! small models leave debris behind: reasoning blocks, chat-template control
//! tokens, and half-used dialect tags. [`clean_response`] removes it.

/// Blocks removed together with their content.
const REASONING_BLOCKS: &[&str] = &[
    "think",
    "thinking",
    "Thinking",
    "reasoning",
    "Reasoning",
    "reflection",
    "scratchpad",
    "inner_monologue",
];

/// Standalone tokens removed wherever they appear.
const CONTROL_TOKENS: &[&str] = &[
    "<|eot_id|>",
    "<|end|>",
    "<|im_end|>",
    "<|im_start|>",
    "<|end_of_text|>",
    "<|begin_of_text|>",
    "<|python_tag|>",
    "<end_of_turn>",
    "<start_of_turn>",
    "</s>",
];

/// Dialect tags that carry no meaning once parsing found no tool call.
/// The content between them is kept.
const STRAY_TAGS: &[&str] = &[
    "<tool_call>",
    "</tool_call>",
    "<tool_response>",
    "</tool_response>",
    "<parameters>",
    "</parameters>",
    "<function>none</function>",
    "<function>",
    "</function>",
];

/// Chain all stripping passes and trim the result.
pub fn clean_response(text: &str) -> String {
    let mut result = text.to_string();
    for tag in REASONING_BLOCKS {
        result = strip_block(&result, tag);
    }
    for token in CONTROL_TOKENS.iter().chain(STRAY_TAGS) {
        result = result.replace(token, "");
    }
    result.trim().to_string()
}

/// Remove `<tag>...</tag>` (attributes allowed on the opener).
///
/// An opener without a closer swallows the rest of the text.
fn strip_block(text: &str, tag: &str) -> String {
    let close = format!("</{tag}>");
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = find_opener(rest, tag) {
        out.push_str(&rest[..start]);
        let Some(gt) = rest[start..].find('>') else {
            rest = &rest[start..];
            break;
        };
        let body = &rest[start + gt + 1..];
        match body.find(&close) {
            Some(end) => rest = &body[end + close.len()..],
            None => {
                rest = "";
                break;
            },
        }
    }
    out.push_str(rest);
    // A dangling closer means the opener was lost upstream (e.g. consumed by
    // the stream classifier); everything before it is reasoning.
    if let Some(pos) = out.find(&close) {
        return out[pos + close.len()..].to_string();
    }
    out
}

/// Position of `<tag>` or `<tag ` in `text`.
fn find_opener(text: &str, tag: &str) -> Option<usize> {
    let exact = format!("<{tag}>");
    let spaced = format!("<{tag} ");
    match (text.find(&exact), text.find(&spaced)) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}
