use chrono::{DateTime, Utc};
use log::{debug, warn};
use mail_parser::{Message, MessageParser, MessagePart, MimeHeaders, PartType};

use super::common::{NormalizedMessage, RawMessage};
use crate::html::strip_html;

/// Decoded body bytes kept before text processing
pub const MAX_RAW_BODY_BYTES: usize = 50_000;
/// Final plain-text body length, in characters
pub const MAX_BODY_CHARS: usize = 2_000;
pub const TRUNCATION_MARKER: &str = "\n\n[Content truncated for length]";

/// Turns raw mail into a `NormalizedMessage`. Never fails: anything that
/// cannot be decoded ends up as an empty field.
pub fn extract(raw: &RawMessage) -> NormalizedMessage {
    let Some(message) = MessageParser::default().parse(raw.content.as_slice()) else {
        warn!("UID {}: unparseable MIME structure, leaving message empty", raw.uid);
        return NormalizedMessage {
            uid: raw.uid,
            subject: String::new(),
            from_name: String::new(),
            from_addr: String::new(),
            date: String::new(),
            received_at: None,
            body: String::new(),
        };
    };

    // Raw text as sent, continuation lines folded back in
    let date = message
        .header_raw("Date")
        .map(|value| value.split_whitespace().collect::<Vec<_>>().join(" "))
        .unwrap_or_default();

    let subject = message.subject().unwrap_or_default().trim().to_string();
    let (from_name, from_addr) = sender(&message);

    let received_at = message
        .date()
        .and_then(|d| DateTime::from_timestamp(d.to_timestamp(), 0))
        .or_else(|| parse_header_date(&date));

    let body = limit_text_length(&select_body(&message), MAX_BODY_CHARS);
    debug!(
        "UID {}: extracted '{}' from {} <{}> ({} chars of body)",
        raw.uid,
        subject,
        from_name,
        from_addr,
        body.chars().count()
    );

    NormalizedMessage {
        uid: raw.uid,
        subject,
        from_name,
        from_addr,
        date,
        received_at,
        body,
    }
}

/// Display name and address of the first sender. Without a display name
/// the address stands in for it.
fn sender(message: &Message) -> (String, String) {
    let Some(addr) = message.from().and_then(|addrs| addrs.first()) else {
        return (String::new(), String::new());
    };

    let address = addr
        .address
        .as_deref()
        .map(str::trim)
        .unwrap_or_default()
        .to_string();
    let name = addr
        .name
        .as_deref()
        .map(|n| n.trim().trim_matches('"').trim())
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| address.clone());

    (name, address)
}

/// Body priority: first inline text/plain part with content, then first
/// inline text/html part (stripped), then whatever the top-level part holds.
fn select_body(message: &Message) -> String {
    let inline = |part: &&MessagePart| !is_attachment(part);

    if let Some(text) = message
        .parts
        .iter()
        .filter(inline)
        .filter_map(plain_text)
        .find(|text| !text.trim().is_empty())
    {
        return bound_raw(text).to_string();
    }

    if let Some(html) = message.parts.iter().filter(inline).find_map(html_text) {
        return strip_html(bound_raw(html));
    }

    match message.parts.first() {
        Some(part) => match (plain_text(part), html_text(part)) {
            (Some(text), _) => bound_raw(text).to_string(),
            (None, Some(html)) => strip_html(bound_raw(html)),
            (None, None) => String::new(),
        },
        None => String::new(),
    }
}

fn plain_text<'a>(part: &'a MessagePart) -> Option<&'a str> {
    match &part.body {
        PartType::Text(text) => Some(text.as_ref()),
        _ => None,
    }
}

fn html_text<'a>(part: &'a MessagePart) -> Option<&'a str> {
    match &part.body {
        PartType::Html(html) => Some(html.as_ref()),
        _ => None,
    }
}

fn is_attachment(part: &MessagePart) -> bool {
    part.content_disposition()
        .map(|disposition| disposition.ctype().eq_ignore_ascii_case("attachment"))
        .unwrap_or(false)
}

/// Hard cut at `MAX_RAW_BODY_BYTES`, backed off to a char boundary.
fn bound_raw(text: &str) -> &str {
    if text.len() <= MAX_RAW_BODY_BYTES {
        return text;
    }
    let mut cut = MAX_RAW_BODY_BYTES;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    &text[..cut]
}

/// Limits `text` to `max_chars` characters while trying to keep it readable.
///
/// When a sentence end ('.') or line break falls in the last 30% of the
/// allowed window the text is cut just after it, otherwise exactly at the
/// limit. Truncated text always carries `TRUNCATION_MARKER`.
pub fn limit_text_length(text: &str, max_chars: usize) -> String {
    let Some((byte_limit, _)) = text.char_indices().nth(max_chars) else {
        return text.to_string();
    };

    let window = &text[..byte_limit];
    let boundary = window
        .char_indices()
        .filter(|(_, c)| *c == '.' || *c == '\n')
        .map(|(i, _)| i)
        .last();

    let min_char_index = max_chars * 7 / 10;
    let cut = match boundary {
        Some(byte_idx) if window[..byte_idx].chars().count() >= min_char_index => byte_idx + 1,
        _ => byte_limit,
    };

    format!("{}{}", &text[..cut], TRUNCATION_MARKER)
}

fn parse_header_date(date: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(date.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
