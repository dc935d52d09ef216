use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (reports, users, credentials)");
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS reports (
                id                  INTEGER PRIMARY KEY AUTOINCREMENT,
                chat_id             INTEGER NOT NULL,
                platform            TEXT NOT NULL,
                category            TEXT NOT NULL,
                details             TEXT NOT NULL,
                timestamp           TEXT NOT NULL,
                media               TEXT,
                urls                TEXT NOT NULL DEFAULT '[]',
                url_analyses        TEXT NOT NULL DEFAULT '{}',
                custom_platform     TEXT,
                content_id          TEXT,
                language            TEXT NOT NULL DEFAULT 'en',
                status              TEXT NOT NULL DEFAULT 'pending',
                verification_token  TEXT NOT NULL UNIQUE
            );

            CREATE INDEX IF NOT EXISTS idx_reports_chat
                ON reports(chat_id);

            CREATE TABLE IF NOT EXISTS users (
                chat_id         INTEGER PRIMARY KEY,
                language        TEXT NOT NULL DEFAULT 'en',
                report_count    INTEGER NOT NULL DEFAULT 0,
                last_report     TEXT,
                phone_number    TEXT,
                api_id          TEXT,
                api_hash        TEXT
            );

            CREATE TABLE IF NOT EXISTS credentials (
                chat_id     INTEGER NOT NULL,
                platform    TEXT NOT NULL,
                token       TEXT NOT NULL,
                PRIMARY KEY (chat_id, platform)
            );

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
