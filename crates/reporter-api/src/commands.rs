use tracing::{error, info, warn};

use reporter_types::models::{ReportStatus, StatusChange};
use reporter_types::platforms::{Platform, capitalize, platform_list};

use crate::blocking;
use crate::conversation::{WELCOME, category_prompt};
use crate::session::Step;
use crate::state::AppStateInner;

/// A slash command. Text that does not name one of these, including
/// `/r/...` style paths, is conversation input instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Stats,
    Verify(String),
    Analytics,
    SetToken { platform: String, token: String },
    Usage(&'static str),
}

impl Command {
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let body = text.strip_prefix('/')?;

        let (head, rest) = match body.split_once(char::is_whitespace) {
            Some((head, rest)) => (head, rest.trim()),
            None => (body, ""),
        };
        // `/stats@SomeBot` in clients that address the bot explicitly.
        let name = head.split('@').next().unwrap_or(head).to_lowercase();

        let command = match name.as_str() {
            "start" => Self::Start,
            "stats" => Self::Stats,
            "analytics" => Self::Analytics,
            "verify" if rest.is_empty() => Self::Usage("Usage: /verify <token>"),
            "verify" => Self::Verify(rest.to_string()),
            "set_token" => match rest.split_once(char::is_whitespace) {
                Some((platform, token)) if !token.trim().is_empty() => Self::SetToken {
                    platform: platform.to_string(),
                    token: token.trim().to_string(),
                },
                _ => Self::Usage("Usage: /set_token <platform> <token>"),
            },
            _ => return None,
        };
        Some(command)
    }
}

pub async fn execute(state: &AppStateInner, chat_id: i64, command: Command) -> String {
    match command {
        Command::Start => {
            state.sessions.start(chat_id).await;
            info!("Chat {} started a new session", chat_id);
            WELCOME.to_string()
        }
        Command::Stats => stats(state, chat_id).await,
        Command::Verify(token) => verify(state, chat_id, &token).await,
        Command::Analytics => analytics(state).await,
        Command::SetToken { platform, token } => set_token(state, chat_id, &platform, &token).await,
        Command::Usage(usage) => usage.to_string(),
    }
}

async fn stats(state: &AppStateInner, chat_id: i64) -> String {
    match state.reports.user_stats(chat_id).await {
        Ok(Some(stats)) => format!(
            "You have submitted {} reports. Last report: {}",
            stats.report_count, stats.last_report_at
        ),
        Ok(None) => "You haven't submitted any reports yet.".to_string(),
        Err(e) => {
            error!("Failed to load stats for {}: {}", chat_id, e);
            "Sorry, your stats are unavailable right now.".to_string()
        }
    }
}

async fn verify(state: &AppStateInner, chat_id: i64, token: &str) -> String {
    let claims = match state.tokens.verify(token) {
        Ok(claims) => claims,
        Err(e) => {
            warn!("Rejected verification token from {}: {}", chat_id, e);
            return "Invalid verification token.".to_string();
        }
    };

    if claims.chat_id != chat_id {
        warn!(
            "Chat {} tried to verify a report belonging to {}",
            chat_id, claims.chat_id
        );
        return "Invalid token or unauthorized access.".to_string();
    }

    match state
        .reports
        .update_status(token, chat_id, ReportStatus::Verified)
        .await
    {
        Ok(StatusChange::Updated) => {
            info!("Chat {} verified report from {}", chat_id, claims.timestamp);
            "Report verified successfully!".to_string()
        }
        Ok(StatusChange::AlreadyVerified) => "Report was already verified.".to_string(),
        Ok(StatusChange::NotFound) => "Invalid token or unauthorized access.".to_string(),
        Err(e) => {
            error!("Failed to verify report for {}: {}", chat_id, e);
            "Sorry, the report could not be verified right now.".to_string()
        }
    }
}

async fn analytics(state: &AppStateInner) -> String {
    let analytics = match state.reports.analytics().await {
        Ok(analytics) => analytics,
        Err(e) => {
            error!("Failed to load analytics: {}", e);
            return "Sorry, analytics are unavailable right now.".to_string();
        }
    };

    let mut reply = String::from("Global Analytics:\n");
    for (platform, count) in &analytics.per_platform {
        reply.push_str(&format!("{}: {} reports\n", capitalize(platform), count));
    }
    reply.push_str(&format!("Total Verified Reports: {}", analytics.verified));
    reply
}

async fn set_token(state: &AppStateInner, chat_id: i64, platform: &str, token: &str) -> String {
    let Some(platform) = Platform::parse(platform) else {
        return format!("Invalid platform. Use one of: {}", platform_list());
    };

    let db = state.db.clone();
    let stored = token.to_string();
    if let Err(e) = blocking(move || db.set_credential(chat_id, platform, &stored)).await {
        error!("Failed to store {} token for {}: {}", platform, chat_id, e);
        return "Sorry, the token could not be saved. Please try again later.".to_string();
    }
    info!("Stored {} token for {}", platform, chat_id);

    let mut reply = format!("Token for {} set successfully!", platform);

    // A conversation parked on this platform's token prompt can move on.
    if let Some(slot) = state.sessions.get(chat_id).await {
        let mut session = slot.lock().await;
        if session.step == Step::SetPlatformToken && session.platform == Some(platform) {
            session.step = Step::ChooseCategory;
            reply.push('\n');
            reply.push_str(&category_prompt(state, &session, platform).await);
        }
    }
    reply
}
