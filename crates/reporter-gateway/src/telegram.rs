//! Telegram Bot API transport: long-polling for updates, sending replies
//! and downloading attached media.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use reporter_types::capabilities::{MediaFetcher, ReplySink};
use reporter_types::events::{Attachment, AttachmentKind, InboundMessage};

/// Telegram rejects messages longer than this.
const MAX_MESSAGE_CHARS: usize = 4096;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<TelegramMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramMessage {
    pub chat: TelegramChat,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub photo: Option<Vec<TelegramFile>>,
    #[serde(default)]
    pub video: Option<TelegramFile>,
    #[serde(default)]
    pub document: Option<TelegramFile>,
    #[serde(default)]
    pub audio: Option<TelegramFile>,
    #[serde(default)]
    pub voice: Option<TelegramFile>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramChat {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramFile {
    pub file_id: String,
    #[serde(default)]
    pub file_name: Option<String>,
}

impl Update {
    /// Convert to the transport-neutral message shape. Updates without a
    /// message (edits, callbacks, ...) yield `None`.
    pub fn into_inbound(self) -> Option<InboundMessage> {
        let message = self.message?;

        let text = message
            .text
            .or(message.caption)
            .unwrap_or_default()
            .trim()
            .to_string();

        let attachment = if let Some(photo) = message.photo.and_then(|sizes| sizes.into_iter().last()) {
            Some(attachment(photo, AttachmentKind::Photo))
        } else if let Some(video) = message.video {
            Some(attachment(video, AttachmentKind::Video))
        } else if let Some(document) = message.document {
            Some(attachment(document, AttachmentKind::Document))
        } else if let Some(audio) = message.audio {
            Some(attachment(audio, AttachmentKind::Audio))
        } else {
            message.voice.map(|voice| attachment(voice, AttachmentKind::Voice))
        };

        Some(InboundMessage {
            chat_id: message.chat.id,
            is_private: message.chat.kind == "private",
            text,
            attachment,
        })
    }
}

fn attachment(file: TelegramFile, kind: AttachmentKind) -> Attachment {
    Attachment {
        file_id: file.file_id,
        kind,
        file_name: file.file_name,
    }
}

#[derive(Clone)]
pub struct TelegramClient {
    client: Client,
    api_base: String,
    bot_token: String,
    media_dir: PathBuf,
}

impl TelegramClient {
    pub fn new(api_base: &str, bot_token: &str, media_dir: &Path) -> Result<Self> {
        let api_base = api_base.trim().trim_end_matches('/').to_string();
        if api_base.is_empty() {
            bail!("telegram api base cannot be empty");
        }
        if bot_token.trim().is_empty() {
            bail!("telegram bot token cannot be empty");
        }

        Ok(Self {
            client: Client::builder().build()?,
            api_base,
            bot_token: bot_token.trim().to_string(),
            media_dir: media_dir.to_path_buf(),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.bot_token, method)
    }

    /// Long-poll for updates after `offset`. The caller advances the offset
    /// past the highest `update_id` it has seen.
    pub async fn get_updates(&self, offset: i64, poll_timeout: Duration) -> Result<Vec<Update>> {
        let response: Value = self
            .client
            .get(self.method_url("getUpdates"))
            .query(&[
                ("offset", offset.to_string()),
                ("timeout", poll_timeout.as_secs().to_string()),
            ])
            .timeout(poll_timeout + REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| e.without_url())
            .context("telegram getUpdates request failed")?
            .json()
            .await
            .context("telegram getUpdates returned invalid json")?;

        let result = api_result(response, "getUpdates")?;
        let updates: Vec<Update> =
            serde_json::from_value(result).context("decode telegram updates")?;
        debug!("Received {} telegram updates", updates.len());
        Ok(updates)
    }

    pub async fn send_message(&self, chat_id: i64, text: &str) -> Result<()> {
        let text: String = text.chars().take(MAX_MESSAGE_CHARS).collect();
        let response: Value = self
            .client
            .post(self.method_url("sendMessage"))
            .json(&json!({ "chat_id": chat_id, "text": text }))
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| e.without_url())
            .context("telegram sendMessage request failed")?
            .json()
            .await
            .context("telegram sendMessage returned invalid json")?;

        api_result(response, "sendMessage")?;
        Ok(())
    }

    /// Resolve a file id and download it to `dest`.
    pub async fn download_file(&self, file_id: &str, dest: &Path) -> Result<PathBuf> {
        let response: Value = self
            .client
            .get(self.method_url("getFile"))
            .query(&[("file_id", file_id)])
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| e.without_url())
            .context("telegram getFile request failed")?
            .json()
            .await
            .context("telegram getFile returned invalid json")?;

        let result = api_result(response, "getFile")?;
        let file_path = result
            .get("file_path")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("telegram getFile response missing file_path"))?;

        let mut dest = dest.to_path_buf();
        if let Some(ext) = Path::new(file_path).extension() {
            dest.set_extension(ext);
        }

        let url = format!("{}/file/bot{}/{}", self.api_base, self.bot_token, file_path);
        let bytes = self
            .client
            .get(url)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| e.without_url())?
            .error_for_status()
            .map_err(|e| e.without_url())?
            .bytes()
            .await?;

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::File::create(&dest)
            .await
            .with_context(|| format!("create {}", dest.display()))?;
        file.write_all(&bytes).await?;
        file.flush().await?;

        info!("Downloaded media to {}", dest.display());
        Ok(dest)
    }
}

/// Unwrap the `{ "ok": true, "result": ... }` envelope.
fn api_result(mut response: Value, method: &str) -> Result<Value> {
    if response.get("ok").and_then(Value::as_bool) != Some(true) {
        let description = response
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or("no description");
        bail!("telegram {} failed: {}", method, description);
    }
    response
        .get_mut("result")
        .map(Value::take)
        .ok_or_else(|| anyhow!("telegram {} response missing result", method))
}

#[async_trait]
impl ReplySink for TelegramClient {
    async fn send(&self, chat_id: i64, text: &str) -> Result<()> {
        self.send_message(chat_id, text).await
    }
}

#[async_trait]
impl MediaFetcher for TelegramClient {
    async fn fetch(&self, chat_id: i64, attachment: &Attachment) -> Result<PathBuf> {
        let stamp = chrono::Utc::now().format("%Y%m%d_%H%M%S");
        let dest = self
            .media_dir
            .join(format!("media_{}_{}_{}", chat_id, attachment.kind.as_str(), stamp));
        self.download_file(&attachment.file_id, &dest).await
    }
}
