//! Row types, one field per selected SQLite column.

pub struct ReportRow {
    pub id: i64,
    pub chat_id: i64,
    pub platform: String,
    pub category: String,
    pub details: String,
    pub timestamp: String,
    pub media: Option<String>,
    pub urls: String,
    pub status: String,
    pub verification_token: String,
}

pub struct UserRow {
    pub chat_id: i64,
    pub language: String,
    pub report_count: i64,
    pub last_report: Option<String>,
    pub phone_number: Option<String>,
    pub api_id: Option<String>,
    pub api_hash: Option<String>,
}
