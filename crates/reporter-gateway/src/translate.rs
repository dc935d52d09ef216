use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use reporter_types::capabilities::Translator;

#[derive(Serialize)]
struct TranslateRequest<'a> {
    q: &'a str,
    source: &'a str,
    target: &'a str,
    format: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    api_key: Option<&'a str>,
}

#[derive(Deserialize)]
struct TranslateResponse {
    #[serde(rename = "translatedText")]
    translated_text: String,
}

/// Client for a LibreTranslate-compatible `/translate` endpoint.
pub struct HttpTranslator {
    client: Client,
    url: String,
    api_key: Option<String>,
}

impl HttpTranslator {
    pub fn new(url: &str, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            url: url.to_string(),
            api_key,
        })
    }
}

#[async_trait]
impl Translator for HttpTranslator {
    async fn translate(&self, text: &str, target_lang: &str) -> Result<String> {
        let request = TranslateRequest {
            q: text,
            source: "auto",
            target: target_lang,
            format: "text",
            api_key: self.api_key.as_deref(),
        };

        let resp = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .context("translation request failed")?;

        if !resp.status().is_success() {
            return Err(anyhow!("translation service returned {}", resp.status()));
        }

        let body: TranslateResponse = resp.json().await.context("decode translation")?;
        Ok(body.translated_text)
    }
}
