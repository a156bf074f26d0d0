//! Regex helpers for the Spotify web, embed and oembed pages.
//!
//! These pages are not an API; everything here is best-effort and returns
//! `None` rather than failing.

use regex::Regex;
use std::sync::LazyLock;

static TITLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<title[^>]*>([^<]+)</title>").unwrap());

static META_TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?is)<meta\s[^>]*>").unwrap());

static ATTR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?s)([A-Za-z][\w:-]*)\s*=\s*(?:"([^"]*)"|'([^']*)')"#).unwrap());

static SPOTIFY_SUFFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s*\|\s*Spotify.*$").unwrap());

static JSON_SCRIPT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<script[^>]*type\s*=\s*["']application/json["'][^>]*>(.*?)</script>"#).unwrap()
});

static NUMERIC_ENTITY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&#(x[0-9a-fA-F]+|[0-9]+);").unwrap());

/// Text of the `<title>` element, entity-decoded and trimmed.
pub fn page_title(html: &str) -> Option<String> {
    TITLE_RE
        .captures(html)
        .map(|c| decode_entities(c[1].trim()))
        .filter(|t| !t.is_empty())
}

/// `content` of the first `<meta>` whose `property` or `name` equals `key`.
/// Attribute order does not matter.
pub fn meta_content(html: &str, key: &str) -> Option<String> {
    for tag in META_TAG_RE.find_iter(html) {
        let mut matches_key = false;
        let mut content = None;
        for attr in ATTR_RE.captures_iter(tag.as_str()) {
            let name = attr[1].to_ascii_lowercase();
            let value = attr.get(2).or_else(|| attr.get(3)).map(|m| m.as_str()).unwrap_or("");
            match name.as_str() {
                "property" | "name" if value.eq_ignore_ascii_case(key) => matches_key = true,
                "content" => content = Some(value),
                _ => {}
            }
        }
        if matches_key {
            if let Some(c) = content.map(|c| decode_entities(c.trim())).filter(|c| !c.is_empty()) {
                return Some(c);
            }
        }
    }
    None
}

/// Drop the trailing `| Spotify` branding from a page or og title.
pub fn strip_spotify_suffix(title: &str) -> String {
    SPOTIFY_SUFFIX_RE.replace(title, "").trim().to_string()
}

/// Bodies of every `<script type="application/json">` element, in order.
pub fn json_scripts(html: &str) -> Vec<&str> {
    JSON_SCRIPT_RE
        .captures_iter(html)
        .filter_map(|c| c.get(1).map(|m| m.as_str().trim()))
        .filter(|s| !s.is_empty())
        .collect()
}

/// Decode the handful of entities that show up in Spotify titles.
pub fn decode_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    let numeric = NUMERIC_ENTITY_RE.replace_all(s, |c: &regex::Captures| {
        let code = &c[1];
        let parsed = match code.strip_prefix('x') {
            Some(hex) => u32::from_str_radix(hex, 16).ok(),
            None => code.parse().ok(),
        };
        parsed
            .and_then(char::from_u32)
            .map(String::from)
            .unwrap_or_else(|| c[0].to_string())
    });
    numeric
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}
