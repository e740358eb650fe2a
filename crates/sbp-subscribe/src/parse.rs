//! Subscription format auto-detection and parsing.
//!
//! Subscription servers hand out one of four shapes: a sing-box config
//! (JSON with an `outbounds` array), a Clash document (YAML with a
//! `proxies` list), a base64 blob wrapping either of those or a link list
//! (v2rayN style), or plain link lines. Detection follows that order.

use crate::clash;
use crate::links;
use crate::model::{Format, OutboundMap, ParseOutcome, SubsError};
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use sbp_types::OutboundType;
use serde_json::Value;

/// Parse a subscription document, auto-detecting its format. Tags are
/// prefixed with the subscription name so rows from different feeds never
/// collide.
pub fn parse_subscription(content: &str, name: &str) -> Result<ParseOutcome, SubsError> {
    let content = content.trim();

    if looks_like_singbox(content) {
        return parse_singbox(content, name);
    }
    if looks_like_clash(content) {
        return clash::parse_clash(content, name);
    }

    if let Some(decoded) = decode_base64(content) {
        let decoded_trim = decoded.trim();
        if looks_like_singbox(decoded_trim) {
            return parse_singbox(decoded_trim, name);
        }
        if looks_like_clash(decoded_trim) {
            return clash::parse_clash(decoded_trim, name);
        }
        return parse_links(decoded_trim, name);
    }

    parse_links(content, name)
}

fn looks_like_singbox(content: &str) -> bool {
    content.starts_with('{') && content.contains("\"outbounds\"")
}

fn looks_like_clash(content: &str) -> bool {
    content.contains("proxies:") || content.starts_with("port:")
}

/// Try the usual base64 alphabets; subscription generators disagree on
/// padding and URL-safety, and some wrap lines.
fn decode_base64(content: &str) -> Option<String> {
    let compact: String = content.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() {
        return None;
    }
    for engine in [&STANDARD, &STANDARD_NO_PAD, &URL_SAFE, &URL_SAFE_NO_PAD] {
        if let Ok(raw) = engine.decode(&compact) {
            if let Ok(text) = String::from_utf8(raw) {
                return Some(text);
            }
        }
    }
    None
}

/// sing-box JSON: take the `outbounds` array, drop synthetic entries, and
/// prefix tags.
pub fn parse_singbox(content: &str, name: &str) -> Result<ParseOutcome, SubsError> {
    let doc: Value =
        serde_json::from_str(content).map_err(|e| SubsError::Parse(e.to_string()))?;
    let mut outcome = ParseOutcome {
        format: Some(Format::Singbox),
        ..Default::default()
    };

    let entries = doc
        .get("outbounds")
        .and_then(Value::as_array)
        .ok_or_else(|| SubsError::Parse("missing outbounds array".into()))?;

    for entry in entries {
        let Some(map) = entry.as_object() else {
            outcome.errors.push("outbound is not an object".into());
            continue;
        };
        let kind = map.get("type").and_then(Value::as_str).unwrap_or_default();
        // synthetic outbounds aggregate or terminate locally; never imported
        if kind
            .parse::<OutboundType>()
            .map_or(false, |t| t.is_synthetic())
        {
            continue;
        }
        let tag = map.get("tag").and_then(Value::as_str).unwrap_or_default();
        if tag.is_empty() {
            outcome.errors.push("outbound missing tag".into());
            continue;
        }
        let mut out: OutboundMap = map.clone();
        out.insert("tag".into(), Value::String(prefixed_tag(name, tag)));
        outcome.outbounds.push(out);
    }

    Ok(outcome)
}

/// One share link per line; `#` lines are comments.
pub fn parse_links(content: &str, name: &str) -> Result<ParseOutcome, SubsError> {
    let mut outcome = ParseOutcome {
        format: Some(Format::Links),
        ..Default::default()
    };
    for (idx, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match links::decode_link(line, idx) {
            Ok((mut out, tag)) => {
                out.insert(
                    "tag".into(),
                    Value::String(prefixed_tag(name, &tag)),
                );
                outcome.outbounds.push(out);
            }
            Err(e) => outcome.errors.push(format!("line {}: {}", idx + 1, e)),
        }
    }
    Ok(outcome)
}

pub(crate) fn prefixed_tag(name: &str, tag: &str) -> String {
    format!("[{name}] {tag}")
}
