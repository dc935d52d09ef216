use std::fmt;

use serde::{Deserialize, Serialize};

/// Platforms a report can target. `Other` takes a free-text platform name
/// and a free-text category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Telegram,
    Instagram,
    Whatsapp,
    Twitter,
    Facebook,
    Tiktok,
    Youtube,
    Reddit,
    Discord,
    Snapchat,
    Linkedin,
    Other,
}

impl Platform {
    /// Table order, used for prompts and for `/set_token` error replies.
    pub const ALL: [Platform; 12] = [
        Platform::Telegram,
        Platform::Instagram,
        Platform::Whatsapp,
        Platform::Twitter,
        Platform::Facebook,
        Platform::Tiktok,
        Platform::Youtube,
        Platform::Reddit,
        Platform::Discord,
        Platform::Snapchat,
        Platform::Linkedin,
        Platform::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Telegram => "telegram",
            Self::Instagram => "instagram",
            Self::Whatsapp => "whatsapp",
            Self::Twitter => "twitter",
            Self::Facebook => "facebook",
            Self::Tiktok => "tiktok",
            Self::Youtube => "youtube",
            Self::Reddit => "reddit",
            Self::Discord => "discord",
            Self::Snapchat => "snapchat",
            Self::Linkedin => "linkedin",
            Self::Other => "other",
        }
    }

    /// Case-insensitive lookup of a platform key.
    pub fn parse(input: &str) -> Option<Self> {
        let key = input.trim().to_lowercase();
        Self::ALL.into_iter().find(|p| p.as_str() == key)
    }

    /// Fixed category list. `None` for `Other`, which accepts free text.
    pub fn categories(&self) -> Option<&'static [&'static str]> {
        let list: &'static [&'static str] = match self {
            Self::Telegram => &["channel", "group", "account", "bot"],
            Self::Instagram => &["account", "post", "story", "comment"],
            Self::Whatsapp => &["account", "group", "message"],
            Self::Twitter => &["account", "tweet", "dm"],
            Self::Facebook => &["account", "post", "group", "comment"],
            Self::Tiktok => &["account", "video", "comment"],
            Self::Youtube => &["channel", "video", "comment"],
            Self::Reddit => &["subreddit", "post", "comment", "user"],
            Self::Discord => &["server", "user", "message"],
            Self::Snapchat => &["account", "snap", "story"],
            Self::Linkedin => &["profile", "post", "comment"],
            Self::Other => return None,
        };
        Some(list)
    }

    /// Matches user input against the category list, case-insensitively.
    /// Returns the canonical (lowercase) category.
    pub fn match_category(&self, input: &str) -> Option<&'static str> {
        let wanted = input.trim().to_lowercase();
        self.categories()?
            .iter()
            .copied()
            .find(|c| *c == wanted)
    }

    /// Reporting endpoint with `{token}` and `{id}` placeholders.
    pub fn endpoint_template(&self) -> Option<&'static str> {
        match self {
            Self::Telegram => Some("https://api.telegram.org/bot{token}/sendMessage"),
            Self::Instagram => {
                Some("https://graph.instagram.com/v12.0/{id}/report?access_token={token}")
            }
            Self::Twitter => Some("https://api.twitter.com/2/tweets/{id}/report_spam?api_key={token}"),
            Self::Facebook => {
                Some("https://graph.facebook.com/v12.0/{id}/report?access_token={token}")
            }
            Self::Tiktok => Some("https://open-api.tiktok.com/report/content?access_token={token}"),
            Self::Youtube => {
                Some("https://www.googleapis.com/youtube/v3/videos/reportAbuse?key={token}")
            }
            Self::Reddit => Some("https://oauth.reddit.com/api/report?access_token={token}"),
            Self::Discord => Some("https://discord.com/api/v9/report"),
            Self::Snapchat => Some("https://accounts.snapchat.com/report"),
            Self::Linkedin => Some(
                "https://api.linkedin.com/v2/ugcPosts/{id}/report?oauth2_access_token={token}",
            ),
            Self::Whatsapp | Self::Other => None,
        }
    }

    /// Whether choosing this platform without a stored credential should
    /// prompt the user for one. WhatsApp, Snapchat and Discord never do.
    pub fn requires_credential(&self) -> bool {
        !matches!(
            self,
            Self::Whatsapp | Self::Snapchat | Self::Discord | Self::Other
        )
    }

    /// Capitalised name for user-facing text ("Instagram").
    pub fn display_name(&self) -> String {
        capitalize(self.as_str())
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Comma-separated list of every platform key.
pub fn platform_list() -> String {
    Platform::ALL
        .iter()
        .map(|p| p.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
