//! Pulls reportable URLs and a content identifier out of free-text details.
//!
//! URLs are whitespace-delimited tokens that parse as absolute `http`/`https`
//! URLs, kept in order, duplicates included. The content id is the first run
//! of digits directly after `id=` or `/`.

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

static CONTENT_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:id=|/)(\d+)").expect("valid content id pattern"));

pub fn extract_urls(text: &str) -> Vec<String> {
    text.split_whitespace()
        .filter(|token| {
            Url::parse(token)
                .map(|url| matches!(url.scheme(), "http" | "https"))
                .unwrap_or(false)
        })
        .map(str::to_string)
        .collect()
}

pub fn extract_content_id(text: &str) -> Option<String> {
    CONTENT_ID_RE
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_and_id_from_details() {
        let text = "please report https://bad.example/post id=9981 abusive";
        assert_eq!(extract_urls(text), vec!["https://bad.example/post"]);
        assert_eq!(extract_content_id(text).as_deref(), Some("9981"));
    }

    #[test]
    fn urls_keep_order_and_duplicates() {
        let text = "http://a.example/x ftp://b.example https://c.example http://a.example/x";
        assert_eq!(
            extract_urls(text),
            vec!["http://a.example/x", "https://c.example", "http://a.example/x"]
        );
    }

    #[test]
    fn non_urls_are_ignored() {
        assert!(extract_urls("www.example.com mailto:x@y.z just words").is_empty());
    }

    #[test]
    fn first_id_match_wins() {
        assert_eq!(
            extract_content_id("https://t.example/status/123 and id=456").as_deref(),
            Some("123")
        );
        assert_eq!(extract_content_id("post number 77"), None);
        assert_eq!(extract_content_id("id=abc /x"), None);
    }
}
