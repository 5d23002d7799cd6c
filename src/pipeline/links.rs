//! Preferred-link extraction from mixed HTML / plain-text bodies.
//!
//! Three tiers, first hit wins:
//! 1. The first `<a>` whose visible text reads "View in Huly" and whose `href`
//!    is absolute http(s).
//! 2. The first `href` anywhere in the HTML, if it is absolute http(s).
//! 3. The first `http://` / `https://` run in the plain-text body.
//!
//! This is pattern matching, not HTML parsing. Callers depend only on the
//! `LinkExtractor` trait so a parser-backed implementation can replace it.

use std::sync::LazyLock;

use regex::Regex;

static LINE_BREAKS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\r\n]+").expect("line break regex"));

static NBSP: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)&nbsp;").expect("nbsp regex"));

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace regex"));

static ANCHOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<a\b([^>]*?)>(.*?)</a>").expect("anchor regex"));

static HREF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)\bhref=["']([^"']+)["']"#).expect("href regex"));

static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("tag regex"));

static VIEW_IN_HULY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bview\s+in\s+huly\b").expect("view-in-huly regex"));

static RAW_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)https?://[^\s)>\]}]+").expect("raw url regex"));

static HTTP_SCHEME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^https?://").expect("http scheme regex"));

/// Picks the single most relevant URL from a message body.
pub trait LinkExtractor: Send + Sync {
    fn extract(&self, html: &str, plain: &str) -> Option<String>;
}

/// Regex-based three-tier extractor.
#[derive(Debug, Clone, Copy, Default)]
pub struct PatternLinkExtractor;

impl PatternLinkExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl LinkExtractor for PatternLinkExtractor {
    fn extract(&self, html: &str, plain: &str) -> Option<String> {
        find_preferred_link(html, plain)
    }
}

/// Run the three tiers over `html` then `plain`.
pub fn find_preferred_link(html: &str, plain: &str) -> Option<String> {
    let normalized = normalize_html(html);

    anchor_link(&normalized)
        .or_else(|| first_href(&normalized))
        .or_else(|| first_raw_url(plain))
}

/// Collapse line breaks, `&nbsp;` entities, and whitespace runs to single spaces.
pub fn normalize_html(html: &str) -> String {
    let text = LINE_BREAKS.replace_all(html, " ");
    let text = NBSP.replace_all(&text, " ");
    WHITESPACE.replace_all(&text, " ").into_owned()
}

/// Remove tags and collapse whitespace.
pub fn strip_tags(fragment: &str) -> String {
    let text = TAG.replace_all(fragment, " ");
    WHITESPACE.replace_all(&text, " ").trim().to_string()
}

pub fn is_http(url: &str) -> bool {
    HTTP_SCHEME.is_match(url)
}

fn anchor_link(html: &str) -> Option<String> {
    ANCHOR.captures_iter(html).find_map(|caps| {
        let attrs = caps.get(1).map_or("", |m| m.as_str());
        let inner = strip_tags(caps.get(2).map_or("", |m| m.as_str()));
        if !VIEW_IN_HULY.is_match(&inner) {
            return None;
        }
        let href = HREF.captures(attrs)?.get(1)?.as_str().trim();
        is_http(href).then(|| href.to_string())
    })
}

/// Only the first `href` in the document is considered.
fn first_href(html: &str) -> Option<String> {
    HREF.captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .filter(|href| is_http(href))
        .map(str::to_string)
}

fn first_raw_url(plain: &str) -> Option<String> {
    RAW_URL.find(plain).map(|m| m.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(html: &str, plain: &str) -> Option<String> {
        PatternLinkExtractor::new().extract(html, plain)
    }

    #[test]
    fn view_in_huly_anchor_beats_earlier_links() {
        let html = r#"<p><a href="https://huly.app/settings">Settings</a></p>
            <a href="https://huly.app/issue/ALOIP-42">View in Huly</a>"#;
        assert_eq!(
            extract(html, "").as_deref(),
            Some("https://huly.app/issue/ALOIP-42")
        );
    }

    #[test]
    fn first_view_in_huly_anchor_wins() {
        let html = r#"<a href="https://a.example/1">View in Huly</a>
            <a href="https://a.example/2">View in Huly</a>"#;
        assert_eq!(extract(html, "").as_deref(), Some("https://a.example/1"));
    }

    #[test]
    fn anchor_text_with_markup_and_nbsp() {
        let html = "<a class=\"btn\" href='https://huly.app/x'>\r\n<span><b>View</b>&nbsp;in\n  <i>Huly</i></span></a>";
        assert_eq!(extract(html, "").as_deref(), Some("https://huly.app/x"));
    }

    #[test]
    fn anchor_text_is_case_insensitive() {
        let html = r#"<A HREF="https://huly.app/y">VIEW IN HULY</A>"#;
        assert_eq!(extract(html, "").as_deref(), Some("https://huly.app/y"));
    }

    #[test]
    fn anchor_text_must_be_whole_words() {
        let html = r#"<a href="https://b.example/other">Preview in Hulyverse</a>"#;
        // Not a preferred anchor, so tier 2 picks the same href anyway.
        assert_eq!(extract(html, "").as_deref(), Some("https://b.example/other"));
        assert!(anchor_link(&normalize_html(html)).is_none());
    }

    #[test]
    fn view_in_huly_with_non_http_href_is_skipped() {
        let html = r#"<a href="javascript:void(0)">View in Huly</a>
            <a href="https://huly.app/real">View in Huly</a>"#;
        assert_eq!(extract(html, "").as_deref(), Some("https://huly.app/real"));
    }

    #[test]
    fn falls_back_to_first_href() {
        let html = r#"<img src="x.png"><a href="https://first.example/a">Open</a>
            <a href="https://second.example/b">Other</a>"#;
        assert_eq!(extract(html, "").as_deref(), Some("https://first.example/a"));
    }

    #[test]
    fn first_href_includes_non_anchor_elements() {
        let html = r#"<link href="https://cdn.example/style.css"><a href="https://x.example">Go</a>"#;
        assert_eq!(
            extract(html, "").as_deref(),
            Some("https://cdn.example/style.css")
        );
    }

    #[test]
    fn non_http_schemes_are_never_returned() {
        let html = r#"<a href="mailto:team@huly.app">Mail us</a><a href="javascript:alert(1)">x</a>"#;
        assert_eq!(extract(html, ""), None);
    }

    #[test]
    fn non_http_first_href_falls_through_to_plain() {
        let html = r#"<a href="mailto:team@huly.app">Mail</a><a href="https://huly.app/z">Z</a>"#;
        assert_eq!(
            extract(html, "see https://plain.example/p here").as_deref(),
            Some("https://plain.example/p")
        );
        assert_eq!(extract(html, ""), None);
    }

    #[test]
    fn first_href_is_returned_untrimmed() {
        let html = r#"<link href="https://huly.app/a "><a href="https://huly.app/b">B</a>"#;
        assert_eq!(extract(html, "").as_deref(), Some("https://huly.app/a "));
    }

    #[test]
    fn falls_back_to_plain_text_url() {
        assert_eq!(
            extract("", "see https://example.com/x here").as_deref(),
            Some("https://example.com/x")
        );
    }

    #[test]
    fn plain_url_stops_at_closing_punctuation() {
        assert_eq!(
            extract("", "(link: https://example.com/a)").as_deref(),
            Some("https://example.com/a")
        );
        assert_eq!(
            extract("", "<https://example.com/b>").as_deref(),
            Some("https://example.com/b")
        );
        assert_eq!(
            extract("", "[https://example.com/c] {http://example.com/d}").as_deref(),
            Some("https://example.com/c")
        );
    }

    #[test]
    fn html_without_links_falls_through_to_plain() {
        assert_eq!(
            extract("<p>No links</p>", "HTTP://EXAMPLE.com/up").as_deref(),
            Some("HTTP://EXAMPLE.com/up")
        );
    }

    #[test]
    fn no_links_anywhere() {
        assert_eq!(extract("<p>hello</p>", "plain words only"), None);
        assert_eq!(extract("", ""), None);
    }

    #[test]
    fn mailto_in_plain_text_is_ignored() {
        assert_eq!(extract("", "write to mailto:a@b.c"), None);
    }

    #[test]
    fn normalize_collapses_breaks_and_entities() {
        assert_eq!(normalize_html("a\r\n\r\nb&NBSP;&nbsp;c\t d"), "a b c d");
    }

    #[test]
    fn strip_tags_collapses_whitespace() {
        assert_eq!(strip_tags("<b>View</b><i>in</i> <u>Huly</u>"), "View in Huly");
        assert_eq!(strip_tags(""), "");
    }

    #[test]
    fn is_http_checks_scheme_only() {
        assert!(is_http("https://x"));
        assert!(is_http("HTTP://x"));
        assert!(!is_http("ftp://x"));
        assert!(!is_http("/relative/path"));
    }
}
