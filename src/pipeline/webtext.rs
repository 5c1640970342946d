//! HTML → plain text reduction for policy pages fetched from a URL.
//!
//! This is not a scraper. It drops script/style/noscript blocks and comments,
//! turns block-closing tags into line breaks, strips the remaining tags,
//! decodes common entities and collapses whitespace. The model reads the
//! result, so layout fidelity does not matter; keeping rule sentences intact
//! does.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static RE_HIDDEN_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<\s*(script|style|noscript|template)\b[^>]*>.*?<\s*/\s*(script|style|noscript|template)\s*>")
        .unwrap()
});

static RE_COMMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<!--.*?-->").unwrap());

static RE_BLOCK_BREAK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)<\s*(br|hr|/p|/div|/li|/tr|/h[1-6]|/section|/article|/table)\b[^>]*>")
        .unwrap()
});

static RE_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").unwrap());

static RE_NUMERIC_ENTITY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"&#(?:x([0-9a-fA-F]{1,6})|([0-9]{1,7}));").unwrap());

static RE_HSPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t\r\f\v\u{a0}]+").unwrap());

static RE_LINE_BREAKS: Lazy<Regex> = Lazy::new(|| Regex::new(r" ?\n[ \n]*").unwrap());

/// Reduce an HTML document to readable text.
pub fn html_to_text(html: &str) -> String {
    let text = RE_HIDDEN_BLOCK.replace_all(html, " ");
    let text = RE_COMMENT.replace_all(&text, " ");
    let text = RE_BLOCK_BREAK.replace_all(&text, "\n");
    let text = RE_TAG.replace_all(&text, " ");
    let text = decode_entities(&text);
    let text = RE_HSPACE.replace_all(&text, " ");
    let text = RE_LINE_BREAKS.replace_all(&text, "\n");
    text.trim().to_string()
}

/// Whether `body` looks like HTML rather than plain text.
pub fn looks_like_html(body: &str, content_type: Option<&str>) -> bool {
    if let Some(ct) = content_type {
        let ct = ct.to_lowercase();
        if ct.contains("html") || ct.contains("xml") {
            return true;
        }
        if ct.starts_with("text/plain") {
            return false;
        }
    }
    let head: String = body.trim_start().chars().take(256).collect::<String>().to_lowercase();
    head.starts_with("<!doctype html") || head.starts_with("<html") || head.contains("<body")
}

fn decode_entities(text: &str) -> String {
    let numeric = RE_NUMERIC_ENTITY.replace_all(text, |caps: &Captures| {
        let code = match (caps.get(1), caps.get(2)) {
            (Some(hex), _) => u32::from_str_radix(hex.as_str(), 16).ok(),
            (None, Some(dec)) => dec.as_str().parse::<u32>().ok(),
            _ => None,
        };
        code.and_then(char::from_u32)
            .map(String::from)
            .unwrap_or_else(|| caps[0].to_string())
    });

    // `&amp;` last so "&amp;lt;" decodes to the literal "&lt;".
    numeric
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&euro;", "€")
        .replace("&pound;", "£")
        .replace("&amp;", "&")
}
