use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::bail;
use chrono::{SubsecRound, Utc};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use reporter_db::Database;
use reporter_gateway::dispatcher::Dispatcher;
use reporter_gateway::rate_limit::RateLimiter;
use reporter_types::models::{
    PlatformAnalytics, Report, ReportDraft, ReportStatus, StatusChange, UserStats,
    format_timestamp,
};

use crate::blocking;
use crate::tokens::{TokenError, VerificationTokenService};

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("could not sign report: {0}")]
    Token(#[from] TokenError),
    #[error("could not write report file: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not store report: {0}")]
    Persistence(anyhow::Error),
}

/// Durable report storage: signs, writes the report file, records the report
/// and the author's counter atomically, then hands it to the dispatcher.
pub struct ReportService {
    db: Arc<Database>,
    limiter: Arc<RateLimiter>,
    tokens: VerificationTokenService,
    dispatcher: Dispatcher,
    report_dir: PathBuf,
}

impl ReportService {
    pub fn new(
        db: Arc<Database>,
        limiter: Arc<RateLimiter>,
        tokens: VerificationTokenService,
        dispatcher: Dispatcher,
        report_dir: &Path,
    ) -> Self {
        Self {
            db,
            limiter,
            tokens,
            dispatcher,
            report_dir: report_dir.to_path_buf(),
        }
    }

    /// Persist a report and return it with its verification token.
    ///
    /// Waits on the shared rate limiter first. Dispatch failures are logged
    /// and never reach the caller; storage failures always do.
    pub async fn save(&self, chat_id: i64, draft: ReportDraft) -> Result<Report, SubmitError> {
        self.limiter.acquire().await;

        let timestamp = Utc::now().trunc_subsecs(6);
        let stamp = format_timestamp(&timestamp);
        let verification_token = self.tokens.issue(chat_id, &stamp)?;

        let report = Report {
            chat_id,
            timestamp,
            draft,
            status: ReportStatus::Pending,
            verification_token,
        };

        let path = self.write_report_file(&report, &stamp).await?;

        let db = self.db.clone();
        let row = report.clone();
        let id = match blocking(move || db.insert_report(&row)).await {
            Ok(id) => id,
            Err(e) => {
                error!("Failed to store report from {}: {}", chat_id, e);
                if let Err(rm) = tokio::fs::remove_file(&path).await {
                    warn!("Failed to remove orphaned report file {}: {}", path.display(), rm);
                }
                return Err(SubmitError::Persistence(e));
            }
        };
        info!("Saved report {} from {} to {}", id, chat_id, path.display());

        let outcome = self.dispatcher.forward(&report).await;
        debug!("Dispatch outcome for report {}: {:?}", id, outcome);

        Ok(report)
    }

    async fn write_report_file(&self, report: &Report, stamp: &str) -> Result<PathBuf, std::io::Error> {
        tokio::fs::create_dir_all(&self.report_dir).await?;
        let path = self
            .report_dir
            .join(report_file_name(report.chat_id, stamp));
        let body = serde_json::to_vec_pretty(report)?;
        tokio::fs::write(&path, body).await?;
        Ok(path)
    }

    /// Apply a status change requested with a verification token. Only
    /// `pending -> verified` exists.
    pub async fn update_status(
        &self,
        verification_token: &str,
        chat_id: i64,
        new_status: ReportStatus,
    ) -> anyhow::Result<StatusChange> {
        if new_status != ReportStatus::Verified {
            bail!("reports cannot move to {}", new_status.as_str());
        }

        let db = self.db.clone();
        let token = verification_token.to_string();
        blocking(move || db.verify_report(&token, chat_id)).await
    }

    pub async fn user_stats(&self, chat_id: i64) -> anyhow::Result<Option<UserStats>> {
        let db = self.db.clone();
        blocking(move || db.get_user_stats(chat_id)).await
    }

    pub async fn analytics(&self) -> anyhow::Result<PlatformAnalytics> {
        let db = self.db.clone();
        blocking(move || db.get_platform_analytics()).await
    }
}

/// `report_<chat>_<timestamp>.json`, with `:` swapped for `_`.
pub fn report_file_name(chat_id: i64, stamp: &str) -> String {
    format!("report_{}_{}.json", chat_id, stamp.replace(':', "_"))
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, HashMap};
    use std::time::{Duration, Instant};

    use httpmock::prelude::*;
    use reporter_types::platforms::Platform;
    use serde_json::json;

    use super::*;

    fn draft(platform: Platform) -> ReportDraft {
        ReportDraft {
            platform,
            category: "account".into(),
            custom_platform: None,
            details: "spam account".into(),
            language: "en".into(),
            media: None,
            urls: vec![],
            url_analyses: BTreeMap::new(),
            content_id: None,
        }
    }

    fn service(dir: &Path, limiter: RateLimiter) -> (Arc<Database>, ReportService) {
        service_with_endpoints(dir, limiter, HashMap::new())
    }

    fn service_with_endpoints(
        dir: &Path,
        limiter: RateLimiter,
        endpoints: HashMap<Platform, String>,
    ) -> (Arc<Database>, ReportService) {
        let db = Arc::new(Database::open(&dir.join("reporter.db")).unwrap());
        let dispatcher =
            Dispatcher::with_endpoints(db.clone(), Duration::from_secs(1), endpoints).unwrap();
        let service = ReportService::new(
            db.clone(),
            Arc::new(limiter),
            VerificationTokenService::new("secret"),
            dispatcher,
            &dir.join("reports"),
        );
        (db, service)
    }

    #[test]
    fn file_name_replaces_colons() {
        assert_eq!(
            report_file_name(42, "2026-10-18T09:30:00.000001Z"),
            "report_42_2026-10-18T09_30_00.000001Z.json"
        );
    }

    #[tokio::test]
    async fn save_writes_file_row_and_counter() {
        let dir = tempfile::tempdir().unwrap();
        let (db, service) = service(dir.path(), RateLimiter::default());

        let report = service.save(42, draft(Platform::Telegram)).await.unwrap();

        let claims = VerificationTokenService::new("secret")
            .verify(&report.verification_token)
            .unwrap();
        assert_eq!(claims.chat_id, 42);
        assert_eq!(claims.timestamp, format_timestamp(&report.timestamp));

        let file = dir
            .path()
            .join("reports")
            .join(report_file_name(42, &claims.timestamp));
        let saved: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(file).unwrap()).unwrap();
        assert_eq!(saved["platform"], "telegram");
        assert_eq!(saved["verification_token"], report.verification_token.as_str());

        let row = db.get_report_by_token(&report.verification_token).unwrap().unwrap();
        assert_eq!(row.status, "pending");
        assert_eq!(service.user_stats(42).await.unwrap().unwrap().report_count, 1);
    }

    #[tokio::test]
    async fn failed_insert_removes_report_file() {
        let dir = tempfile::tempdir().unwrap();
        let (db, service) = service(dir.path(), RateLimiter::default());
        db.with_conn(|conn| {
            conn.execute_batch("DROP TABLE reports;")?;
            Ok(())
        })
        .unwrap();

        let err = service.save(42, draft(Platform::Telegram)).await.unwrap_err();

        assert!(matches!(err, SubmitError::Persistence(_)));
        let files = std::fs::read_dir(dir.path().join("reports")).unwrap().count();
        assert_eq!(files, 0);
        assert!(db.get_user(42).unwrap().is_none());
    }

    #[tokio::test]
    async fn save_forwards_to_platform_with_credential() {
        let dir = tempfile::tempdir().unwrap();
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/report")
                .query_param("access_token", "reddit-token")
                .json_body_includes(json!({"chat_id": 42, "platform": "reddit"}).to_string());
            then.status(200);
        });

        let mut endpoints = HashMap::new();
        endpoints.insert(Platform::Reddit, server.url("/report?access_token={token}"));
        let (db, service) = service_with_endpoints(dir.path(), RateLimiter::default(), endpoints);
        db.set_credential(42, Platform::Reddit, "reddit-token").unwrap();

        service.save(42, draft(Platform::Reddit)).await.unwrap();
        mock.assert();
    }

    #[tokio::test]
    async fn rejected_dispatch_still_saves() {
        let dir = tempfile::tempdir().unwrap();
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/report");
            then.status(500);
        });

        let mut endpoints = HashMap::new();
        endpoints.insert(Platform::Reddit, server.url("/report?access_token={token}"));
        let (db, service) = service_with_endpoints(dir.path(), RateLimiter::default(), endpoints);
        db.set_credential(42, Platform::Reddit, "reddit-token").unwrap();

        let report = service.save(42, draft(Platform::Reddit)).await.unwrap();
        mock.assert_calls(1);
        assert!(db.get_report_by_token(&report.verification_token).unwrap().is_some());
        assert_eq!(db.count_reports_for_chat(42).unwrap(), 1);
    }

    #[tokio::test]
    async fn update_status_only_verifies() {
        let dir = tempfile::tempdir().unwrap();
        let (_db, service) = service(dir.path(), RateLimiter::default());
        let report = service.save(7, draft(Platform::Reddit)).await.unwrap();

        assert!(
            service
                .update_status(&report.verification_token, 7, ReportStatus::Pending)
                .await
                .is_err()
        );
        assert_eq!(
            service
                .update_status(&report.verification_token, 7, ReportStatus::Verified)
                .await
                .unwrap(),
            StatusChange::Updated
        );
        assert_eq!(service.analytics().await.unwrap().verified, 1);
    }

    #[tokio::test]
    async fn saves_beyond_budget_are_delayed() {
        let dir = tempfile::tempdir().unwrap();
        let (db, service) = service(dir.path(), RateLimiter::new(2, Duration::from_millis(300)));

        let start = Instant::now();
        for _ in 0..3 {
            service.save(9, draft(Platform::Youtube)).await.unwrap();
        }

        assert!(start.elapsed() >= Duration::from_millis(300));
        assert_eq!(db.count_reports_for_chat(9).unwrap(), 3);
    }
}
