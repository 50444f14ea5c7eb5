//! URL extraction from browser chrome text.
//!
//! `browser_url` on `FrameMetadata` comes straight from the window
//! title/accessibility layer upstream in `screensearch-capture`. This
//! scans the *chrome* text band (never page content, to avoid false
//! positives from URLs quoted inside the page itself) for something that
//! looks like an address-bar entry.

use regex::Regex;
use std::sync::OnceLock;
use url::Url;

/// Matches either an explicit scheme (`http://`, `https://`) or a bare
/// `www.`/`domain.tld` shape that a browser address bar would render
/// without a visible scheme.
fn url_candidate() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b((?:https?://)[^\s]+|(?:www\.)?[a-z0-9-]+(?:\.[a-z0-9-]+)+(?:/[^\s]*)?)")
            .expect("static regex is valid")
    })
}

const TRAILING_PUNCTUATION: &[char] = &['.', ',', ')', ']', '}', '"', '\'', ';', ':', '!', '?'];

/// Scans `chrome_text` for the first plausible URL and returns it
/// normalized (scheme added if missing, validated via `url::Url::parse`).
/// Returns `None` if nothing in the text parses as a URL with a host that
/// contains a dot - bare hostnames like `localhost` are intentionally not
/// treated as addresses here, since they're indistinguishable from stray
/// dotted words without one.
pub fn extract_url(chrome_text: &str) -> Option<String> {
    for candidate in url_candidate().find_iter(chrome_text) {
        let trimmed = candidate.as_str().trim_end_matches(TRAILING_PUNCTUATION);
        if let Some(url) = normalize(trimmed) {
            return Some(url);
        }
    }
    None
}

fn normalize(candidate: &str) -> Option<String> {
    let with_scheme = if candidate.contains("://") {
        candidate.to_string()
    } else {
        format!("https://{}", candidate)
    };

    let parsed = Url::parse(&with_scheme).ok()?;
    let host = parsed.host_str()?;
    if !host.contains('.') {
        return None;
    }
    Some(parsed.to_string())
}
