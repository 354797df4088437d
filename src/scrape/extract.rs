//! Text and link extraction from fetched content.
//!
//! HTML goes through a real parser; content served as XML takes a
//! tag-stripping path instead, since feed-style documents don't survive
//! HTML tree correction well. Both paths produce whitespace-normalized
//! text suitable for fingerprinting.

use regex::Regex;
use scraper::{Html, Selector};
use url::Url;

/// True when the content should be treated as XML rather than HTML.
fn is_xml(content_type: &str, content: &str) -> bool {
    content_type.to_ascii_lowercase().contains("xml") || content.trim_start().starts_with("<?xml")
}

/// Collapse runs of whitespace: trim every line, drop empties, join with
/// newlines. The result is the canonical form handed to the fingerprinter.
fn normalize_whitespace(raw: &str) -> String {
    raw.lines()
        .flat_map(|line| line.split("  "))
        .map(str::trim)
        .filter(|chunk| !chunk.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Extract readable text, with script and style content removed.
pub fn extract_text(content: &str, content_type: &str) -> String {
    if is_xml(content_type, content) {
        return extract_text_xml(content);
    }

    let document = Html::parse_document(content);
    let mut raw = String::new();
    for node in document.tree.nodes() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let skipped = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|el| matches!(el.name(), "script" | "style"))
        });
        if !skipped {
            raw.push_str(text);
            raw.push('\n');
        }
    }
    normalize_whitespace(&raw)
}

fn extract_text_xml(content: &str) -> String {
    let block_re = Regex::new(r"(?is)<(script|style)\b.*?</(script|style)>")
        .expect("valid block regex");
    let tag_re = Regex::new(r"<[^>]*>").expect("valid tag regex");

    let without_blocks = block_re.replace_all(content, "\n");
    let without_tags = tag_re.replace_all(&without_blocks, "\n");
    let decoded = without_tags
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ");
    normalize_whitespace(&decoded)
}

/// True when both URLs are on the same domain, tolerating a `www.` prefix
/// on either side.
pub fn same_domain(a: &Url, b: &Url) -> bool {
    match (a.host_str(), b.host_str()) {
        (Some(ha), Some(hb)) => strip_www(ha) == strip_www(hb),
        _ => false,
    }
}

fn strip_www(host: &str) -> &str {
    host.strip_prefix("www.").unwrap_or(host)
}

/// Canonical form of a URL for frontier and visited-set membership:
/// fragment stripped, scheme/host/path/query kept.
pub fn normalize_url(url: &Url) -> String {
    let mut url = url.clone();
    url.set_fragment(None);
    url.to_string()
}

fn link_candidate(href: &str, base_url: &Url, seen: &mut Vec<String>) {
    if href.is_empty()
        || href.starts_with('#')
        || href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
    {
        return;
    }
    let Ok(link) = base_url.join(href) else {
        return;
    };
    if !matches!(link.scheme(), "http" | "https") {
        return;
    }
    if !same_domain(&link, base_url) {
        return;
    }
    let normalized = normalize_url(&link);
    if !seen.contains(&normalized) {
        seen.push(normalized);
    }
}

/// Extract same-domain links as normalized absolute URLs, fragment stripped,
/// deduplicated, in document order.
pub fn extract_links(content: &str, content_type: &str, base_url: &Url) -> Vec<String> {
    let mut links = Vec::new();

    if is_xml(content_type, content) {
        let anchor_re =
            Regex::new(r#"(?is)<a\s[^>]*?href\s*=\s*["']([^"']+)["']"#).expect("valid anchor regex");
        for capture in anchor_re.captures_iter(content) {
            link_candidate(&capture[1], base_url, &mut links);
        }
        return links;
    }

    let document = Html::parse_document(content);
    let selector = Selector::parse("a[href]").expect("valid selector");
    for element in document.select(&selector) {
        if let Some(href) = element.value().attr("href") {
            link_candidate(href, base_url, &mut links);
        }
    }
    links
}
