use serde::{Deserialize, Serialize};

/// A text message delivered by the chat transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub chat_id: i64,
    /// Group and channel messages are ignored.
    pub is_private: bool,
    pub text: String,
    pub attachment: Option<Attachment>,
}

impl InboundMessage {
    pub fn private(chat_id: i64, text: impl Into<String>) -> Self {
        Self {
            chat_id,
            is_private: true,
            text: text.into(),
            attachment: None,
        }
    }
}

/// Media attached to a message, referenced by the transport's file id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub file_id: String,
    pub kind: AttachmentKind,
    pub file_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    Photo,
    Video,
    Document,
    Audio,
    Voice,
}

impl AttachmentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Photo => "photo",
            Self::Video => "video",
            Self::Document => "document",
            Self::Audio => "audio",
            Self::Voice => "voice",
        }
    }
}
