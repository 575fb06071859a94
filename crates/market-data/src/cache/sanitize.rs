//! Free-text sanitization applied before anything enters the cache.

use lazy_static::lazy_static;
use regex::Regex;

use crate::models::{Quote, SearchResult};

use super::schema::MAX_TEXT_LEN;
use super::CachePayload;

lazy_static! {
    /// Whole `<script>...</script>` blocks, including unterminated ones
    static ref SCRIPT_BLOCK: Regex =
        Regex::new(r"(?is)<\s*script\b[^>]*>.*?(<\s*/\s*script\s*>|$)")
            .expect("Invalid regex pattern");

    /// Any remaining markup tag, opening or closing
    static ref TAG: Regex = Regex::new(r"<[^<>]*>").expect("Invalid regex pattern");

    /// Script-capable URL schemes. The scheme colon is required so the bare
    /// words stay searchable.
    static ref SCRIPT_PROTOCOL: Regex =
        Regex::new(r"(?i)((javascript|vbscript)\s*:|data\s*:\s*text/html)")
            .expect("Invalid regex pattern");

    /// Inline event handlers such as `onerror=`
    static ref EVENT_HANDLER: Regex =
        Regex::new(r"(?i)\bon[a-z]+\s*=").expect("Invalid regex pattern");
}

/// Strip script-like content and control characters, then truncate to
/// `max_chars` characters.
pub fn sanitize_text(input: &str, max_chars: usize) -> String {
    let without_scripts = SCRIPT_BLOCK.replace_all(input, "");
    let without_tags = TAG.replace_all(&without_scripts, "");
    let without_protocols = SCRIPT_PROTOCOL.replace_all(&without_tags, "");
    let without_handlers = EVENT_HANDLER.replace_all(&without_protocols, "");

    without_handlers
        .chars()
        .filter(|c| !c.is_control() && *c != '<' && *c != '>')
        .collect::<String>()
        .trim()
        .chars()
        .take(max_chars)
        .collect()
}

fn sanitize_quote(quote: &mut Quote) {
    quote.provider = sanitize_text(&quote.provider, MAX_TEXT_LEN);
}

fn sanitize_search_result(result: &mut SearchResult) {
    result.name = sanitize_text(&result.name, MAX_TEXT_LEN);
    result.asset_type = sanitize_text(&result.asset_type, MAX_TEXT_LEN);
    result.exchange = sanitize_text(&result.exchange, MAX_TEXT_LEN);
    if let Some(currency) = result.currency.as_mut() {
        *currency = sanitize_text(currency, MAX_TEXT_LEN);
    }
}

pub(crate) fn sanitize_search_results(results: &mut [SearchResult]) {
    results.iter_mut().for_each(sanitize_search_result);
}

/// Sanitize every free-text field of a payload in place.
pub(crate) fn sanitize_payload(payload: &mut CachePayload) {
    match payload {
        CachePayload::Quote(quote) => sanitize_quote(quote),
        CachePayload::Search(results) => sanitize_search_results(results),
        CachePayload::Batch(quotes) => quotes.iter_mut().for_each(sanitize_quote),
    }
}
