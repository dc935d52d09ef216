use crate::Database;
use crate::models::{ReportRow, UserRow};
use anyhow::{Result, bail};
use reporter_types::capabilities::AccountCredentials;
use reporter_types::models::{
    PlatformAnalytics, Report, ReportStatus, StatusChange, UserStats, format_timestamp,
};
use rusqlite::Connection;

impl Database {
    // -- Reports --

    /// Insert a report and bump its author's counter in one transaction.
    /// Returns the new report id.
    pub fn insert_report(&self, report: &Report) -> Result<i64> {
        let draft = &report.draft;
        let urls = serde_json::to_string(&draft.urls)?;
        let url_analyses = serde_json::to_string(&draft.url_analyses)?;
        let timestamp = format_timestamp(&report.timestamp);

        self.with_conn_mut(|conn| {
            // Rolled back on drop if anything below fails
            let tx = conn.transaction()?;

            tx.execute(
                "INSERT INTO reports (chat_id, platform, category, details, timestamp, media, urls,
                                      url_analyses, custom_platform, content_id, language, status,
                                      verification_token)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                rusqlite::params![
                    report.chat_id,
                    draft.platform.as_str(),
                    draft.category,
                    draft.details,
                    timestamp,
                    draft.media,
                    urls,
                    url_analyses,
                    draft.custom_platform,
                    draft.content_id,
                    draft.language,
                    report.status.as_str(),
                    report.verification_token,
                ],
            )?;
            let id = tx.last_insert_rowid();

            tx.execute(
                "INSERT INTO users (chat_id, language, report_count, last_report)
                 VALUES (?1, ?2, 1, ?3)
                 ON CONFLICT(chat_id) DO UPDATE SET
                     report_count = users.report_count + 1,
                     last_report  = excluded.last_report,
                     language     = excluded.language",
                rusqlite::params![report.chat_id, draft.language, timestamp],
            )?;

            tx.commit()?;
            Ok(id)
        })
    }

    /// Move a report from pending to verified. Only the report's own chat
    /// may do this; a repeat call is reported as `AlreadyVerified`.
    pub fn verify_report(&self, verification_token: &str, chat_id: i64) -> Result<StatusChange> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let status: Option<String> = tx
                .query_row(
                    "SELECT status FROM reports WHERE verification_token = ?1 AND chat_id = ?2",
                    rusqlite::params![verification_token, chat_id],
                    |row| row.get(0),
                )
                .optional()?;

            let change = match status {
                None => StatusChange::NotFound,
                Some(raw) => match ReportStatus::parse(&raw) {
                    Some(ReportStatus::Verified) => StatusChange::AlreadyVerified,
                    Some(ReportStatus::Pending) => {
                        tx.execute(
                            "UPDATE reports SET status = ?1
                             WHERE verification_token = ?2 AND chat_id = ?3 AND status = ?4",
                            rusqlite::params![
                                ReportStatus::Verified.as_str(),
                                verification_token,
                                chat_id,
                                ReportStatus::Pending.as_str(),
                            ],
                        )?;
                        StatusChange::Updated
                    }
                    None => bail!("Corrupt status '{}' on report {}", raw, verification_token),
                },
            };

            tx.commit()?;
            Ok(change)
        })
    }

    pub fn get_report_by_token(&self, verification_token: &str) -> Result<Option<ReportRow>> {
        self.with_conn(|conn| query_report_by_token(conn, verification_token))
    }

    pub fn count_reports_for_chat(&self, chat_id: i64) -> Result<i64> {
        self.with_conn(|conn| {
            let count = conn.query_row(
                "SELECT COUNT(*) FROM reports WHERE chat_id = ?1",
                [chat_id],
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }

    /// Per-platform report counts plus the global verified count, read under
    /// one lock so both figures describe the same snapshot.
    pub fn get_platform_analytics(&self) -> Result<PlatformAnalytics> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT platform, COUNT(*) FROM reports GROUP BY platform ORDER BY platform",
            )?;
            let per_platform = stmt
                .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let verified = conn.query_row(
                "SELECT COUNT(*) FROM reports WHERE status = ?1",
                [ReportStatus::Verified.as_str()],
                |row| row.get(0),
            )?;

            Ok(PlatformAnalytics {
                per_platform,
                verified,
            })
        })
    }

    // -- Users --

    /// Store onboarding details without touching the report counter.
    pub fn upsert_user_account(&self, chat_id: i64, account: &AccountCredentials) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (chat_id, phone_number, api_id, api_hash)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(chat_id) DO UPDATE SET
                     phone_number = excluded.phone_number,
                     api_id       = excluded.api_id,
                     api_hash     = excluded.api_hash",
                rusqlite::params![chat_id, account.phone_number, account.api_id, account.api_hash],
            )?;
            Ok(())
        })
    }

    pub fn get_user(&self, chat_id: i64) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, chat_id))
    }

    /// `None` until the user has saved at least one report.
    pub fn get_user_stats(&self, chat_id: i64) -> Result<Option<UserStats>> {
        self.with_conn(|conn| {
            let stats = conn
                .query_row(
                    "SELECT report_count, last_report FROM users
                     WHERE chat_id = ?1 AND report_count > 0",
                    [chat_id],
                    |row| {
                        Ok(UserStats {
                            report_count: row.get(0)?,
                            last_report_at: row
                                .get::<_, Option<String>>(1)?
                                .unwrap_or_default(),
                        })
                    },
                )
                .optional()?;
            Ok(stats)
        })
    }
}

fn query_report_by_token(conn: &Connection, verification_token: &str) -> Result<Option<ReportRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, chat_id, platform, category, details, timestamp, media, urls, status,
                verification_token
         FROM reports WHERE verification_token = ?1",
    )?;

    let row = stmt
        .query_row([verification_token], |row| {
            Ok(ReportRow {
                id: row.get(0)?,
                chat_id: row.get(1)?,
                platform: row.get(2)?,
                category: row.get(3)?,
                details: row.get(4)?,
                timestamp: row.get(5)?,
                media: row.get(6)?,
                urls: row.get(7)?,
                status: row.get(8)?,
                verification_token: row.get(9)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn query_user(conn: &Connection, chat_id: i64) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(
        "SELECT chat_id, language, report_count, last_report, phone_number, api_id, api_hash
         FROM users WHERE chat_id = ?1",
    )?;

    let row = stmt
        .query_row([chat_id], |row| {
            Ok(UserRow {
                chat_id: row.get(0)?,
                language: row.get(1)?,
                report_count: row.get(2)?,
                last_report: row.get(3)?,
                phone_number: row.get(4)?,
                api_id: row.get(5)?,
                api_hash: row.get(6)?,
            })
        })
        .optional()?;

    Ok(row)
}

/// Extension trait for optional query results
pub(crate) trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::{Duration, Utc};
    use reporter_types::models::{ReportDraft, UrlAnalysis};
    use reporter_types::platforms::Platform;

    use super::*;
    use crate::open_temp;

    fn report(chat_id: i64, platform: Platform, token: &str) -> Report {
        let mut url_analyses = BTreeMap::new();
        url_analyses.insert(
            "https://bad.example/post".to_string(),
            UrlAnalysis {
                title: "Bad".into(),
                description: "No description".into(),
            },
        );
        Report {
            chat_id,
            timestamp: Utc::now(),
            draft: ReportDraft {
                platform,
                category: "post".into(),
                custom_platform: None,
                details: "see https://bad.example/post".into(),
                language: "en".into(),
                media: None,
                urls: vec!["https://bad.example/post".into()],
                url_analyses,
                content_id: None,
            },
            status: ReportStatus::Pending,
            verification_token: token.to_string(),
        }
    }

    #[test]
    fn insert_report_counts_per_user() {
        let (_dir, db) = open_temp();

        assert!(db.get_user_stats(7).unwrap().is_none());

        db.insert_report(&report(7, Platform::Instagram, "t1")).unwrap();
        db.insert_report(&report(7, Platform::Reddit, "t2")).unwrap();
        db.insert_report(&report(8, Platform::Reddit, "t3")).unwrap();

        let stats = db.get_user_stats(7).unwrap().unwrap();
        assert_eq!(stats.report_count, 2);
        assert_eq!(db.count_reports_for_chat(7).unwrap(), 2);
        assert!(!stats.last_report_at.is_empty());

        let row = db.get_report_by_token("t1").unwrap().unwrap();
        assert_eq!(row.status, "pending");
        assert_eq!(row.platform, "instagram");
        assert_eq!(row.urls, r#"["https://bad.example/post"]"#);
    }

    #[test]
    fn duplicate_token_rolls_back_counter() {
        let (_dir, db) = open_temp();

        db.insert_report(&report(7, Platform::Twitter, "dup")).unwrap();
        assert!(db.insert_report(&report(7, Platform::Twitter, "dup")).is_err());

        // The failed insert must not have bumped the counter
        assert_eq!(db.get_user_stats(7).unwrap().unwrap().report_count, 1);
        assert_eq!(db.count_reports_for_chat(7).unwrap(), 1);
    }

    #[test]
    fn last_report_tracks_latest_save() {
        let (_dir, db) = open_temp();

        let mut first = report(5, Platform::Youtube, "a");
        first.timestamp = Utc::now() - Duration::hours(1);
        let second = report(5, Platform::Youtube, "b");

        db.insert_report(&first).unwrap();
        db.insert_report(&second).unwrap();

        let stats = db.get_user_stats(5).unwrap().unwrap();
        assert_eq!(stats.last_report_at, format_timestamp(&second.timestamp));
    }

    #[test]
    fn verify_report_is_one_way_and_scoped_to_chat() {
        let (_dir, db) = open_temp();
        db.insert_report(&report(111, Platform::Facebook, "tok")).unwrap();

        assert_eq!(db.verify_report("tok", 222).unwrap(), StatusChange::NotFound);
        assert_eq!(db.get_report_by_token("tok").unwrap().unwrap().status, "pending");

        assert_eq!(db.verify_report("tok", 111).unwrap(), StatusChange::Updated);
        assert_eq!(db.verify_report("tok", 111).unwrap(), StatusChange::AlreadyVerified);
        assert_eq!(db.get_report_by_token("tok").unwrap().unwrap().status, "verified");

        assert_eq!(db.verify_report("missing", 111).unwrap(), StatusChange::NotFound);
    }

    #[test]
    fn analytics_groups_by_platform() {
        let (_dir, db) = open_temp();
        db.insert_report(&report(1, Platform::Reddit, "r1")).unwrap();
        db.insert_report(&report(2, Platform::Reddit, "r2")).unwrap();
        db.insert_report(&report(3, Platform::Tiktok, "k1")).unwrap();
        db.verify_report("k1", 3).unwrap();

        let analytics = db.get_platform_analytics().unwrap();
        assert_eq!(
            analytics.per_platform,
            vec![("reddit".to_string(), 2), ("tiktok".to_string(), 1)]
        );
        assert_eq!(analytics.verified, 1);
    }

    #[test]
    fn onboarding_upsert_keeps_counter() {
        let (_dir, db) = open_temp();
        let account = AccountCredentials {
            phone_number: "+15550001111".into(),
            api_id: "12345".into(),
            api_hash: "0123456789abcdef0123456789abcdef".into(),
        };

        db.upsert_user_account(9, &account).unwrap();
        assert!(db.get_user_stats(9).unwrap().is_none());

        db.insert_report(&report(9, Platform::Linkedin, "l1")).unwrap();
        db.upsert_user_account(9, &account).unwrap();

        let user = db.get_user(9).unwrap().unwrap();
        assert_eq!(user.report_count, 1);
        assert_eq!(user.phone_number.as_deref(), Some("+15550001111"));
    }
}
