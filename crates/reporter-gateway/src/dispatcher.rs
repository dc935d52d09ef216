use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use reporter_db::Database;
use reporter_types::models::{Report, ReportDraft};
use reporter_types::platforms::Platform;

/// Result of one forwarding attempt. Never an error: forwarding is
/// best-effort and the report is already persisted when it runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Skipped(&'static str),
    Delivered(u16),
    Rejected(u16),
    Failed(String),
}

/// Body posted to platform endpoints: the report as gathered, plus who sent
/// it and when. The verification token stays private to the reporter.
#[derive(Debug, Serialize)]
pub struct DispatchPayload<'a> {
    pub chat_id: i64,
    pub timestamp: &'a DateTime<Utc>,
    #[serde(flatten)]
    pub draft: &'a ReportDraft,
}

impl<'a> From<&'a Report> for DispatchPayload<'a> {
    fn from(report: &'a Report) -> Self {
        Self {
            chat_id: report.chat_id,
            timestamp: &report.timestamp,
            draft: &report.draft,
        }
    }
}

/// Forwards saved reports to the target platform's reporting API using the
/// reporter's own stored credential.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    client: Client,
    db: Arc<Database>,
    /// platform -> endpoint template with `{token}` / `{id}` placeholders
    endpoints: HashMap<Platform, String>,
}

impl Dispatcher {
    /// Dispatcher using the built-in endpoint table.
    pub fn new(db: Arc<Database>, timeout: Duration) -> Result<Self> {
        let endpoints = Platform::ALL
            .iter()
            .filter_map(|p| p.endpoint_template().map(|t| (*p, t.to_string())))
            .collect();
        Self::with_endpoints(db, timeout, endpoints)
    }

    pub fn with_endpoints(
        db: Arc<Database>,
        timeout: Duration,
        endpoints: HashMap<Platform, String>,
    ) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            inner: Arc::new(DispatcherInner {
                client,
                db,
                endpoints,
            }),
        })
    }

    /// POST the report to its platform. Exactly one request, no retries.
    pub async fn forward(&self, report: &Report) -> DispatchOutcome {
        let platform = report.draft.platform;
        if platform == Platform::Other {
            return DispatchOutcome::Skipped("custom platform");
        }

        let Some(template) = self.inner.endpoints.get(&platform) else {
            debug!("No reporting endpoint for {}, skipping dispatch", platform);
            return DispatchOutcome::Skipped("no endpoint");
        };

        let db = self.inner.db.clone();
        let chat_id = report.chat_id;
        let credential =
            match tokio::task::spawn_blocking(move || db.get_credential(chat_id, platform)).await {
                Ok(Ok(Some(token))) => token,
                Ok(Ok(None)) => {
                    debug!("No {} credential for chat {}, skipping dispatch", platform, chat_id);
                    return DispatchOutcome::Skipped("no credential");
                }
                Ok(Err(e)) => {
                    warn!("Credential lookup failed for chat {}: {}", chat_id, e);
                    return DispatchOutcome::Failed(e.to_string());
                }
                Err(e) => {
                    error!("spawn_blocking join error: {}", e);
                    return DispatchOutcome::Failed(e.to_string());
                }
            };

        let url = render_endpoint(template, &credential, report.draft.content_id.as_deref());

        let payload = DispatchPayload::from(report);
        match self.inner.client.post(&url).json(&payload).send().await {
            Ok(resp) => {
                let status = resp.status().as_u16();
                if status == 200 || status == 201 {
                    info!("Report sent to {} API successfully", platform);
                    DispatchOutcome::Delivered(status)
                } else {
                    warn!("Failed to send report to {} API: {}", platform, status);
                    DispatchOutcome::Rejected(status)
                }
            }
            Err(e) => {
                // The URL carries the credential, keep it out of the logs
                let e = e.without_url();
                warn!("Error sending report to {} API: {}", platform, e);
                DispatchOutcome::Failed(e.to_string())
            }
        }
    }
}

/// Substitute the credential and content id into an endpoint template.
/// Reports without an extracted id use `unknown`.
pub fn render_endpoint(template: &str, token: &str, content_id: Option<&str>) -> String {
    template
        .replace("{token}", token)
        .replace("{id}", content_id.unwrap_or("unknown"))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::Utc;
    use httpmock::prelude::*;
    use serde_json::json;
    use reporter_types::models::{ReportDraft, ReportStatus};

    use super::*;

    fn report(chat_id: i64, platform: Platform, content_id: Option<&str>) -> Report {
        Report {
            chat_id,
            timestamp: Utc::now(),
            draft: ReportDraft {
                platform,
                category: "post".into(),
                custom_platform: None,
                details: "abusive".into(),
                language: "en".into(),
                media: None,
                urls: vec![],
                url_analyses: BTreeMap::new(),
                content_id: content_id.map(str::to_string),
            },
            status: ReportStatus::Pending,
            verification_token: "tok".into(),
        }
    }

    fn dispatcher(db: Arc<Database>, server: &MockServer) -> Dispatcher {
        let mut endpoints = HashMap::new();
        endpoints.insert(
            Platform::Instagram,
            format!("{}/v12.0/{{id}}/report?access_token={{token}}", server.base_url()),
        );
        Dispatcher::with_endpoints(db, Duration::from_secs(5), endpoints).unwrap()
    }

    fn temp_db() -> (tempfile::TempDir, Arc<Database>) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(&dir.path().join("reporter.db")).unwrap();
        (dir, Arc::new(db))
    }

    #[test]
    fn render_substitutes_token_and_id() {
        let url = render_endpoint("https://x/{id}/report?t={token}", "abc", Some("9981"));
        assert_eq!(url, "https://x/9981/report?t=abc");

        let url = render_endpoint("https://x/{id}?t={token}", "abc", None);
        assert_eq!(url, "https://x/unknown?t=abc");
    }

    #[tokio::test]
    async fn forwards_with_credential_and_id() {
        let (_dir, db) = temp_db();
        db.set_credential(5, Platform::Instagram, "secret").unwrap();

        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/v12.0/9981/report")
                .query_param("access_token", "secret")
                .json_body_includes(json!({"platform": "instagram", "chat_id": 5}).to_string());
            then.status(201);
        });

        let outcome = dispatcher(db, &server)
            .forward(&report(5, Platform::Instagram, Some("9981")))
            .await;

        assert_eq!(outcome, DispatchOutcome::Delivered(201));
        mock.assert();
    }

    #[test]
    fn payload_leaves_out_verification_token() {
        let report = report(5, Platform::Instagram, Some("9981"));
        let body = serde_json::to_value(DispatchPayload::from(&report)).unwrap();

        assert_eq!(body["chat_id"], 5);
        assert_eq!(body["platform"], "instagram");
        assert_eq!(body["id"], "9981");
        assert!(body.get("timestamp").is_some());
        assert!(body.get("verification_token").is_none());
        assert!(body.get("status").is_none());
    }

    #[tokio::test]
    async fn missing_credential_sends_nothing() {
        let (_dir, db) = temp_db();

        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST);
            then.status(200);
        });

        let outcome = dispatcher(db, &server)
            .forward(&report(5, Platform::Instagram, None))
            .await;

        assert_eq!(outcome, DispatchOutcome::Skipped("no credential"));
        mock.assert_calls(0);
    }

    #[tokio::test]
    async fn platform_without_endpoint_is_skipped() {
        let (_dir, db) = temp_db();
        db.set_credential(5, Platform::Reddit, "secret").unwrap();

        let server = MockServer::start();
        let outcome = dispatcher(db.clone(), &server)
            .forward(&report(5, Platform::Reddit, None))
            .await;
        assert_eq!(outcome, DispatchOutcome::Skipped("no endpoint"));

        let outcome = dispatcher(db, &server)
            .forward(&report(5, Platform::Other, None))
            .await;
        assert_eq!(outcome, DispatchOutcome::Skipped("custom platform"));
    }

    #[tokio::test]
    async fn non_success_status_is_not_an_error() {
        let (_dir, db) = temp_db();
        db.set_credential(5, Platform::Instagram, "secret").unwrap();

        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST);
            then.status(500);
        });

        let outcome = dispatcher(db, &server)
            .forward(&report(5, Platform::Instagram, Some("1")))
            .await;

        assert_eq!(outcome, DispatchOutcome::Rejected(500));
        mock.assert_calls(1);
    }
}
