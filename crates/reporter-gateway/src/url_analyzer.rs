use std::time::Duration;

use anyhow::{Result, bail};
use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;

use reporter_types::capabilities::UrlAnalyzer;
use reporter_types::models::UrlAnalysis;

/// Bytes read from a page before the rest of the body is abandoned.
const MAX_HTML_BYTES: usize = 512 * 1024;

/// Fetches a page and pulls out `<title>` and `<meta name="description">`.
pub struct HtmlUrlAnalyzer {
    client: Client,
    title_re: Regex,
    meta_re: Regex,
    content_re: Regex,
}

impl HtmlUrlAnalyzer {
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            title_re: Regex::new(r"(?is)<title[^>]*>(.*?)</title>")?,
            meta_re: Regex::new(r#"(?is)<meta\s[^>]*name\s*=\s*["']description["'][^>]*>"#)?,
            content_re: Regex::new(r#"(?is)content\s*=\s*(?:"([^"]*)"|'([^']*)')"#)?,
        })
    }

    /// Extract title and description from an HTML document.
    pub fn summarize(&self, html: &str) -> UrlAnalysis {
        let title = self
            .title_re
            .captures(html)
            .and_then(|c| c.get(1))
            .map(|m| collapse_whitespace(m.as_str()))
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| "No title".to_string());

        let description = self
            .meta_re
            .find(html)
            .and_then(|tag| self.content_re.captures(tag.as_str()))
            .and_then(|c| c.get(1).or_else(|| c.get(2)))
            .map(|m| collapse_whitespace(m.as_str()))
            .unwrap_or_else(|| "No description".to_string());

        UrlAnalysis { title, description }
    }
}

#[async_trait]
impl UrlAnalyzer for HtmlUrlAnalyzer {
    async fn analyze(&self, url: &str) -> Result<UrlAnalysis> {
        let mut resp = self.client.get(url).send().await?;
        if resp.status().as_u16() != 200 {
            bail!("HTTP {}", resp.status());
        }

        let mut body = Vec::new();
        while let Some(chunk) = resp.chunk().await? {
            let room = MAX_HTML_BYTES - body.len();
            if chunk.len() >= room {
                body.extend_from_slice(&chunk[..room]);
                break;
            }
            body.extend_from_slice(&chunk);
        }

        Ok(self.summarize(&String::from_utf8_lossy(&body)))
    }
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use httpmock::prelude::*;

    use super::*;

    fn analyzer() -> HtmlUrlAnalyzer {
        HtmlUrlAnalyzer::new(Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn summarize_reads_title_and_description() {
        let html = r#"<html><head>
            <TITLE>
              Bad   Post
            </TITLE>
            <meta content='Scam giveaway' name="description">
        </head></html>"#;

        let analysis = analyzer().summarize(html);
        assert_eq!(analysis.title, "Bad Post");
        assert_eq!(analysis.description, "Scam giveaway");
    }

    #[test]
    fn summarize_defaults_when_missing() {
        let analysis = analyzer().summarize("<html><body>nothing</body></html>");
        assert_eq!(analysis.title, "No title");
        assert_eq!(analysis.description, "No description");
    }

    #[tokio::test]
    async fn analyze_fetches_page() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/post");
            then.status(200).body(
                r#"<html><head><title>Post</title><meta name="description" content="d"></head></html>"#,
            );
        });

        let analysis = analyzer().analyze(&server.url("/post")).await.unwrap();
        assert_eq!(analysis.title, "Post");
        assert_eq!(analysis.description, "d");
    }

    #[tokio::test]
    async fn analyze_stops_reading_at_byte_cap() {
        let filler = "x".repeat(MAX_HTML_BYTES);
        let page = format!(
            "<html><head><title>Huge</title></head><body>{}<meta name=\"description\" content=\"late\"></body></html>",
            filler
        );

        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/huge");
            then.status(200).body(page.clone());
        });

        let analysis = analyzer().analyze(&server.url("/huge")).await.unwrap();
        assert_eq!(analysis.title, "Huge");
        assert_eq!(analysis.description, "No description");
    }

    #[tokio::test]
    async fn analyze_treats_non_200_as_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/gone");
            then.status(404);
        });

        let err = analyzer().analyze(&server.url("/gone")).await.unwrap_err();
        assert!(err.to_string().contains("404"));
    }
}
