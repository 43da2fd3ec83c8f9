/*!
 * Artifact Decoder
 * Header-first parsing with layered fallbacks
 */

use super::types::*;
use crate::catalog::{MetaInfo, ResourceContent};
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Position-tracking view over artifact text
struct Cursor<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(text: &'a str) -> Self {
        Self { text, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.text[self.pos..]
    }

    /// Move past the next occurrence of `needle`
    fn seek_past(&mut self, needle: &str) -> bool {
        match self.rest().find(needle) {
            Some(at) => {
                self.pos += at + needle.len();
                true
            }
            None => false,
        }
    }

    fn skip_whitespace(&mut self) {
        let rest = self.rest();
        self.pos += rest.len() - rest.trim_start().len();
    }

    /// Consume `token` if it is next
    fn eat(&mut self, token: &str) -> bool {
        if self.rest().starts_with(token) {
            self.pos += token.len();
            true
        } else {
            false
        }
    }

    /// Consume the first JSON value at the cursor
    fn json_value(&mut self) -> Option<Value> {
        let mut stream = serde_json::Deserializer::from_str(self.rest()).into_iter::<Value>();
        let value = stream.next()?.ok()?;
        self.pos += stream.byte_offset();
        Some(value)
    }
}

static RESOURCE_ID_RE: OnceLock<Option<Regex>> = OnceLock::new();
static NAME_RE: OnceLock<Option<Regex>> = OnceLock::new();
static BUNDLE_RE: OnceLock<Option<Regex>> = OnceLock::new();
static ANY_ANCHOR_RE: OnceLock<Option<Regex>> = OnceLock::new();

fn cached(cell: &'static OnceLock<Option<Regex>>, pattern: &str) -> Option<&'static Regex> {
    cell.get_or_init(|| Regex::new(pattern).ok()).as_ref()
}

fn capture(re: Option<&Regex>, literal: &str) -> Option<String> {
    re?.captures(literal)?.get(1).map(|m| m.as_str().to_string())
}

/// Header from an object literal with `key: 'value'` pairs
fn relaxed_header(literal: &str) -> Option<ArtifactHeader> {
    let resource_id = capture(
        cached(&RESOURCE_ID_RE, r#"resourceId\s*:\s*['"]([^'"]*)['"]"#),
        literal,
    )?;
    let name = capture(cached(&NAME_RE, r#"name\s*:\s*['"]([^'"]*)['"]"#), literal);
    let is_bundle = capture(cached(&BUNDLE_RE, r"isBundle\s*:\s*(true|false)"), literal)
        .map(|flag| flag == "true")
        .unwrap_or(false);
    Some(ArtifactHeader {
        resource_id,
        name,
        is_bundle,
        payload_bytes: None,
    })
}

fn read_header(cursor: &mut Cursor<'_>) -> DecodeResult<ArtifactHeader> {
    if !cursor.seek_past(HEADER_DECL) {
        return Err(DecodeError::MissingHeader("no configuration assignment".into()));
    }
    cursor.skip_whitespace();
    if !cursor.eat("=") {
        return Err(DecodeError::MissingHeader("malformed configuration assignment".into()));
    }
    cursor.skip_whitespace();

    let start = cursor.pos;
    let header = match cursor.json_value() {
        Some(value) => serde_json::from_value::<ArtifactHeader>(value).ok(),
        None => None,
    };
    let header = match header {
        Some(h) => h,
        None => {
            cursor.pos = start;
            let end = cursor.rest().find('}').map(|i| i + 1).unwrap_or(cursor.rest().len());
            let literal = &cursor.rest()[..end];
            let parsed = relaxed_header(literal)
                .ok_or_else(|| DecodeError::MissingHeader("no resourceId".into()))?;
            cursor.pos += end;
            parsed
        }
    };

    if header.resource_id.is_empty() {
        return Err(DecodeError::MissingHeader("empty resourceId".into()));
    }
    Ok(header)
}

/// Parse only the configuration header
pub fn decode_header(text: &str) -> DecodeResult<ArtifactHeader> {
    read_header(&mut Cursor::new(text))
}

fn read_meta(text: &str, from: usize) -> Option<MetaInfo> {
    let mut cursor = Cursor { text, pos: from };
    if !cursor.seek_past(META_DECL) {
        return None;
    }
    cursor.skip_whitespace();
    if !cursor.eat("=") {
        return None;
    }
    cursor.skip_whitespace();
    cursor
        .json_value()
        .and_then(|v| serde_json::from_value(v).ok())
}

/// Locate the payload literal; returns its span and the strategy used
fn locate_payload(
    text: &str,
    from: usize,
    header: &ArtifactHeader,
) -> (Option<(usize, usize)>, PayloadLocation) {
    let mut cursor = Cursor { text, pos: from };
    if !cursor.seek_past(PAYLOAD_DECL) {
        return (None, PayloadLocation::Missing);
    }
    cursor.skip_whitespace();
    if !cursor.eat("=") {
        return (None, PayloadLocation::Missing);
    }
    cursor.skip_whitespace();
    let start = cursor.pos;
    let anchor = header.anchor();

    // Declared length is untrusted; overflow falls back to the anchor scan
    if let Some(end) = header.payload_bytes.and_then(|len| start.checked_add(len)) {
        let lines_up = text.get(start..end).is_some()
            && text.get(end..).map(|r| r.starts_with(&anchor)).unwrap_or(false);
        if lines_up {
            return (Some((start, end)), PayloadLocation::Exact);
        }
    }

    if let Some(at) = text[start..].find(&anchor) {
        return (Some((start, start + at)), PayloadLocation::Anchored);
    }

    let any_anchor = cached(&ANY_ANCHOR_RE, r";//resourceId:[^;\r\n]*;");
    match any_anchor.and_then(|re| re.find(&text[start..])) {
        Some(m) => (Some((start, start + m.start())), PayloadLocation::BestEffort),
        None => (None, PayloadLocation::Missing),
    }
}

/// Unescape a single-quoted or backtick string literal
fn relaxed_string(literal: &str) -> Option<String> {
    let quote = literal.chars().next()?;
    if !matches!(quote, '\'' | '`' | '"') || literal.len() < 2 || !literal.ends_with(quote) {
        return None;
    }
    let inner = &literal[1..literal.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next()? {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            '0' => out.push('\0'),
            other => out.push(other),
        }
    }
    Some(out)
}

fn content_from_value(value: Value, raw: &str) -> ResourceContent {
    match value {
        Value::String(s) => ResourceContent::Single(s),
        Value::Object(map) => {
            let mut units = BTreeMap::new();
            for (name, unit) in map {
                match unit {
                    Value::String(src) => {
                        units.insert(name, src);
                    }
                    _ => return ResourceContent::Single(raw.to_string()),
                }
            }
            ResourceContent::Bundle(units)
        }
        _ => ResourceContent::Single(raw.to_string()),
    }
}

fn parse_payload(raw: &str, is_bundle: bool) -> ResourceContent {
    let raw = raw.trim();
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::String(inner)) if is_bundle => match serde_json::from_str::<Value>(&inner) {
            Ok(nested @ Value::Object(_)) => content_from_value(nested, &inner),
            _ => ResourceContent::Single(inner),
        },
        Ok(value) => content_from_value(value, raw),
        Err(_) => match relaxed_string(raw) {
            Some(s) => ResourceContent::Single(s),
            None => ResourceContent::Single(raw.to_string()),
        },
    }
}

fn read_logic(text: &str, from: usize) -> Option<String> {
    match text[from..].find(LOGIC_MARKER) {
        Some(at) => {
            let logic = text[from + at + LOGIC_MARKER.len()..].trim();
            if logic.is_empty() {
                None
            } else {
                Some(logic.to_string())
            }
        }
        None => Some(NOOP_LOGIC.to_string()),
    }
}

/// Recover resource fields from launcher artifact text
///
/// Only a missing or unparsable header fails; every later section degrades
/// to a fallback instead.
pub fn decode(text: &str) -> DecodeResult<DecodedArtifact> {
    let mut cursor = Cursor::new(text);
    let header = read_header(&mut cursor)?;
    let after_header = cursor.pos;

    let meta_info = read_meta(text, after_header);
    let (span, location) = locate_payload(text, after_header, &header);
    let (content, logic_from) = match span {
        Some((start, end)) => (
            Some(parse_payload(&text[start..end], header.is_bundle)),
            end,
        ),
        None => (None, after_header),
    };
    let logic = read_logic(text, logic_from);

    Ok(DecodedArtifact {
        header,
        meta_info,
        content,
        logic,
        location,
    })
}
