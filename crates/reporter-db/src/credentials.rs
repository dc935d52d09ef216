use anyhow::Result;
use reporter_types::platforms::Platform;

use crate::Database;
use crate::queries::OptionalExt;

impl Database {
    // -- Credentials --

    /// Store a platform API token for a user, replacing any previous one.
    pub fn set_credential(&self, chat_id: i64, platform: Platform, token: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO credentials (chat_id, platform, token) VALUES (?1, ?2, ?3)
                 ON CONFLICT(chat_id, platform) DO UPDATE SET token = excluded.token",
                rusqlite::params![chat_id, platform.as_str(), token],
            )?;
            Ok(())
        })
    }

    pub fn get_credential(&self, chat_id: i64, platform: Platform) -> Result<Option<String>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT token FROM credentials WHERE chat_id = ?1 AND platform = ?2",
                rusqlite::params![chat_id, platform.as_str()],
                |row| row.get(0),
            )
            .optional()
        })
    }
}
