use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::platforms::Platform;

/// Report lifecycle. The only transition is `Pending -> Verified`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Pending,
    Verified,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Verified => "verified",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "verified" => Some(Self::Verified),
            _ => None,
        }
    }
}

/// Title/description summary of a URL mentioned in a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlAnalysis {
    pub title: String,
    pub description: String,
}

impl UrlAnalysis {
    /// Placeholder stored when a URL could not be analyzed.
    pub fn error(cause: impl ToString) -> Self {
        Self {
            title: "Error".to_string(),
            description: cause.to_string(),
        }
    }
}

/// Everything the conversation gathered, before it is stamped and signed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportDraft {
    pub platform: Platform,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_platform: Option<String>,
    pub details: String,
    pub language: String,
    pub media: Option<String>,
    pub urls: Vec<String>,
    pub url_analyses: BTreeMap<String, UrlAnalysis>,
    /// Numeric content identifier pulled out of the details text.
    #[serde(rename = "id")]
    pub content_id: Option<String>,
}

/// A persisted report. Written to the report file and posted to platform
/// endpoints as-is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub chat_id: i64,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub draft: ReportDraft,
    pub status: ReportStatus,
    pub verification_token: String,
}

/// Canonical timestamp text: RFC 3339, microseconds, `Z` suffix. Used for
/// the token claim, the database column and the report file name.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserStats {
    pub report_count: i64,
    pub last_report_at: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlatformAnalytics {
    /// (platform key, report count), ordered by platform key.
    pub per_platform: Vec<(String, i64)>,
    pub verified: i64,
}

/// Outcome of a `pending -> verified` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusChange {
    Updated,
    AlreadyVerified,
    NotFound,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_serializes_flat() {
        let report = Report {
            chat_id: 42,
            timestamp: Utc::now(),
            draft: ReportDraft {
                platform: Platform::Twitter,
                category: "tweet".into(),
                custom_platform: None,
                details: "spam".into(),
                language: "en".into(),
                media: None,
                urls: vec![],
                url_analyses: BTreeMap::new(),
                content_id: Some("77".into()),
            },
            status: ReportStatus::Pending,
            verification_token: "tok".into(),
        };

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["platform"], "twitter");
        assert_eq!(json["id"], "77");
        assert_eq!(json["status"], "pending");
        assert!(json.get("custom_platform").is_none());
    }
}
