//! Per-chat conversation state machine.
//!
//! Each step has one validator. Input that fails it produces a re-prompt and
//! leaves the session untouched; input that passes it updates the session
//! and moves to the next step.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use futures_util::future::join_all;
use regex::Regex;
use tracing::{error, info, warn};

use reporter_types::capabilities::{AccountCredentials, AuthState};
use reporter_types::events::InboundMessage;
use reporter_types::models::{ReportDraft, UrlAnalysis};
use reporter_types::platforms::{Platform, platform_list};

use crate::blocking;
use crate::extract::{extract_content_id, extract_urls};
use crate::session::{Session, Step};
use crate::state::AppStateInner;

pub const WELCOME: &str = "Welcome to World Reporter! Please provide your phone number (e.g., +1234567890) to authenticate with Telegram:";
const LANGUAGE_PROMPT: &str =
    "Please choose your language (e.g., 'en' for English, 'es' for Spanish):";

static PHONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+?[0-9]{7,15}$").expect("valid phone pattern"));
static API_HASH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9a-fA-F]{32}$").expect("valid api hash pattern"));
static AUTH_CODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]{3,10}$").expect("valid auth code pattern"));

const MAX_CUSTOM_PLATFORM_CHARS: usize = 100;

/// Interpret one message against the session's current step and return the
/// reply to send back.
pub async fn advance(state: &AppStateInner, session: &mut Session, message: &InboundMessage) -> String {
    let text = message.text.trim();

    match session.step {
        Step::PhoneNumber => phone_number(session, text),
        Step::ApiId => api_id(session, text),
        Step::ApiHash => api_hash(state, session, message.chat_id, text).await,
        Step::AuthCode => auth_code(state, session, message.chat_id, text).await,
        Step::ChooseLanguage => choose_language(state, session, text).await,
        Step::ChoosePlatform => choose_platform(state, session, message.chat_id, text).await,
        Step::CustomPlatform => custom_platform(state, session, text).await,
        Step::SetPlatformToken => set_platform_token(state, session, text).await,
        Step::ChooseCategory => choose_category(state, session, text).await,
        Step::ReportDetails => report_details(state, session, message).await,
        Step::Start => {
            state
                .localize(
                    &session.language,
                    "Use /start to file another report or /stats to see your stats.",
                )
                .await
        }
    }
}

fn phone_number(session: &mut Session, text: &str) -> String {
    let phone: String = text
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '(' | ')'))
        .collect();
    if !PHONE_RE.is_match(&phone) {
        return "That doesn't look like a phone number. Please send it in international format (e.g., +1234567890):".to_string();
    }

    session.phone_number = Some(phone);
    session.step = Step::ApiId;
    "Please provide your API ID from my.telegram.org:".to_string()
}

fn api_id(session: &mut Session, text: &str) -> String {
    match text.parse::<u64>() {
        Ok(id) if id > 0 => {
            session.api_id = Some(id.to_string());
            session.step = Step::ApiHash;
            "Please provide your API Hash from my.telegram.org:".to_string()
        }
        _ => "The API ID is a number. Please provide your API ID from my.telegram.org:".to_string(),
    }
}

async fn api_hash(state: &AppStateInner, session: &mut Session, chat_id: i64, text: &str) -> String {
    if !API_HASH_RE.is_match(text) {
        return "The API Hash is 32 hexadecimal characters. Please provide your API Hash from my.telegram.org:".to_string();
    }

    let (Some(phone_number), Some(api_id)) = (session.phone_number.clone(), session.api_id.clone())
    else {
        session.step = Step::PhoneNumber;
        return WELCOME.to_string();
    };
    let account = AccountCredentials {
        phone_number,
        api_id,
        api_hash: text.to_lowercase(),
    };

    let auth = match state.authenticator.begin(chat_id, &account).await {
        Ok(auth) => auth,
        Err(e) => {
            warn!("Authentication handshake failed for {}: {}", chat_id, e);
            return format!(
                "Authentication failed: {}. Please check your API ID and send your API Hash again:",
                e
            );
        }
    };

    let db = state.db.clone();
    let stored = account.clone();
    if let Err(e) = blocking(move || db.upsert_user_account(chat_id, &stored)).await {
        warn!("Failed to store account details for {}: {}", chat_id, e);
    }

    session.api_hash = Some(account.api_hash);
    match auth {
        AuthState::Authorized => {
            session.step = Step::ChooseLanguage;
            format!("Already authorized! {}", LANGUAGE_PROMPT)
        }
        AuthState::CodeRequired => {
            session.step = Step::AuthCode;
            "Please enter the code you received on Telegram:".to_string()
        }
    }
}

async fn auth_code(state: &AppStateInner, session: &mut Session, chat_id: i64, text: &str) -> String {
    let code: String = text.chars().filter(|c| !matches!(c, ' ' | '-')).collect();
    if !AUTH_CODE_RE.is_match(&code) {
        return "Please enter the numeric code you received on Telegram:".to_string();
    }

    let Some(account) = session.account() else {
        session.step = Step::PhoneNumber;
        return WELCOME.to_string();
    };

    match state.authenticator.sign_in(chat_id, &account, &code).await {
        Ok(()) => {
            info!("Chat {} signed in", chat_id);
            session.step = Step::ChooseLanguage;
            format!("Authentication successful! {}", LANGUAGE_PROMPT)
        }
        Err(e) => {
            warn!("Sign-in failed for {}: {}", chat_id, e);
            format!("Authentication failed: {}. Please try again with the correct code:", e)
        }
    }
}

async fn choose_language(state: &AppStateInner, session: &mut Session, text: &str) -> String {
    let code: String = text.to_lowercase().chars().take(2).collect();
    if code.chars().count() != 2 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
        return LANGUAGE_PROMPT.to_string();
    }

    session.language = code;
    session.step = Step::ChoosePlatform;
    with_options(
        state.localize(&session.language, "Which platform do you want to report?").await,
        &platform_list(),
    )
}

async fn choose_platform(
    state: &AppStateInner,
    session: &mut Session,
    chat_id: i64,
    text: &str,
) -> String {
    let Some(platform) = Platform::parse(text) else {
        let header = state
            .localize(&session.language, "Invalid platform. Please choose from:")
            .await;
        return format!("{} {}", header, platform_list());
    };

    if platform == Platform::Other {
        session.platform = Some(platform);
        session.step = Step::CustomPlatform;
        return state
            .localize(
                &session.language,
                "What platform or app do you want to report? (e.g., Snapchat, Discord)",
            )
            .await;
    }

    if platform.requires_credential() && !has_credential(state, chat_id, platform).await {
        session.platform = Some(platform);
        session.step = Step::SetPlatformToken;
        let prompt = state
            .localize(
                &session.language,
                &format!(
                    "Please provide your API token for {}, or type 'skip' to proceed without it. You can set it with:",
                    platform
                ),
            )
            .await;
        return format!("{}\n/set_token {} <token>", prompt, platform);
    }

    session.platform = Some(platform);
    session.step = Step::ChooseCategory;
    category_prompt(state, session, platform).await
}

async fn has_credential(state: &AppStateInner, chat_id: i64, platform: Platform) -> bool {
    let db = state.db.clone();
    match blocking(move || db.get_credential(chat_id, platform)).await {
        Ok(token) => token.is_some(),
        Err(e) => {
            warn!("Credential lookup failed for {}: {}", chat_id, e);
            false
        }
    }
}

async fn custom_platform(state: &AppStateInner, session: &mut Session, text: &str) -> String {
    if text.is_empty() || text.chars().count() > MAX_CUSTOM_PLATFORM_CHARS {
        return state
            .localize(
                &session.language,
                "What platform or app do you want to report? (e.g., Snapchat, Discord)",
            )
            .await;
    }

    session.custom_platform = Some(text.to_string());
    session.step = Step::ChooseCategory;
    state
        .localize(
            &session.language,
            &format!(
                "What issue do you want to report for {}? (e.g., account, content, bug)",
                text
            ),
        )
        .await
}

async fn set_platform_token(state: &AppStateInner, session: &mut Session, text: &str) -> String {
    if !text.eq_ignore_ascii_case("skip") {
        return state
            .localize(
                &session.language,
                "Please use /set_token <platform> <token> to set the token, or type 'skip' to proceed without it.",
            )
            .await;
    }

    let Some(platform) = session.platform else {
        return back_to_platforms(state, session).await;
    };
    session.step = Step::ChooseCategory;
    category_prompt(state, session, platform).await
}

/// Prompt listing the platform's categories. Also used when `/set_token`
/// resolves a pending token step.
pub(crate) async fn category_prompt(
    state: &AppStateInner,
    session: &Session,
    platform: Platform,
) -> String {
    let header = state
        .localize(
            &session.language,
            &format!("What do you want to report on {}?", platform.display_name()),
        )
        .await;
    with_options(header, &platform.categories().unwrap_or_default().join(", "))
}

async fn choose_category(state: &AppStateInner, session: &mut Session, text: &str) -> String {
    let Some(platform) = session.platform else {
        return back_to_platforms(state, session).await;
    };

    let (category, subject) = if platform == Platform::Other {
        if text.is_empty() {
            return state
                .localize(
                    &session.language,
                    "Please describe the issue (e.g., account, content, bug):",
                )
                .await;
        }
        let custom = session.custom_platform.clone().unwrap_or_default();
        (text.to_lowercase(), custom)
    } else {
        match platform.match_category(text) {
            Some(category) => (category.to_string(), platform.display_name()),
            None => {
                let header = state
                    .localize(&session.language, "Invalid category. Please choose from:")
                    .await;
                let options = platform.categories().unwrap_or_default().join(", ");
                return format!("{} {}", header, options);
            }
        }
    };

    let prompt = format!(
        "Please provide details for your {} {} report (include URLs or IDs if applicable):",
        subject, category
    );
    session.category = Some(category);
    session.step = Step::ReportDetails;
    state.localize(&session.language, &prompt).await
}

async fn report_details(
    state: &AppStateInner,
    session: &mut Session,
    message: &InboundMessage,
) -> String {
    let text = message.text.trim();
    if text.is_empty() && message.attachment.is_none() {
        return state
            .localize(
                &session.language,
                "Please describe the content you are reporting (include URLs or IDs if applicable):",
            )
            .await;
    }

    let (Some(platform), Some(category)) = (session.platform, session.category.clone()) else {
        return back_to_platforms(state, session).await;
    };

    let chat_id = message.chat_id;
    let media = match &message.attachment {
        Some(attachment) => match state.media.fetch(chat_id, attachment).await {
            Ok(path) => Some(path.display().to_string()),
            Err(e) => {
                warn!("Error downloading media for {}: {}", chat_id, e);
                None
            }
        },
        None => None,
    };

    let urls = extract_urls(text);
    let url_analyses = analyze_urls(state, &urls).await;

    let draft = ReportDraft {
        platform,
        category,
        custom_platform: if platform == Platform::Other {
            session.custom_platform.clone()
        } else {
            None
        },
        details: text.to_string(),
        language: session.language.clone(),
        media,
        urls,
        url_analyses,
        content_id: extract_content_id(text),
    };

    match state.reports.save(chat_id, draft).await {
        Ok(report) => {
            session.step = Step::Start;
            let thanks = state
                .localize(
                    &session.language,
                    "Thank you! Your report has been recorded. Verify it with:",
                )
                .await;
            let footer = state
                .localize(
                    &session.language,
                    "Use /start to report again or /stats to see your stats.",
                )
                .await;
            format!("{}\n/verify {}\n{}", thanks, report.verification_token, footer)
        }
        Err(e) => {
            error!("Report submission failed for {}: {}", chat_id, e);
            state
                .localize(
                    &session.language,
                    "Sorry, your report could not be saved. Please send the details again.",
                )
                .await
        }
    }
}

/// Analyze each distinct URL concurrently. A failed lookup becomes an
/// `Error` placeholder for that URL only.
async fn analyze_urls(state: &AppStateInner, urls: &[String]) -> BTreeMap<String, UrlAnalysis> {
    let mut unique: Vec<&String> = Vec::new();
    for url in urls {
        if !unique.contains(&url) {
            unique.push(url);
        }
    }

    let results = join_all(unique.iter().map(|url| state.analyzer.analyze(url))).await;

    unique
        .into_iter()
        .zip(results)
        .map(|(url, result)| {
            let analysis = result.unwrap_or_else(|e| {
                warn!("Error analyzing URL {}: {}", url, e);
                UrlAnalysis::error(e)
            });
            (url.clone(), analysis)
        })
        .collect()
}

/// Recovery for a session that reached a step without its platform.
async fn back_to_platforms(state: &AppStateInner, session: &mut Session) -> String {
    session.step = Step::ChoosePlatform;
    with_options(
        state.localize(&session.language, "Which platform do you want to report?").await,
        &platform_list(),
    )
}

fn with_options(header: String, options: &str) -> String {
    format!("{}\nOptions: {}", header, options)
}
