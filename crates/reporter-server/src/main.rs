mod config;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
};
use serde_json::{Value, json};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use reporter_api::reports::ReportService;
use reporter_api::router::ChatRouter;
use reporter_api::session::SessionStore;
use reporter_api::state::{AppState, AppStateInner};
use reporter_api::tokens::VerificationTokenService;
use reporter_db::Database;
use reporter_gateway::dispatcher::Dispatcher;
use reporter_gateway::rate_limit::RateLimiter;
use reporter_gateway::telegram::{TelegramClient, Update};
use reporter_gateway::translate::HttpTranslator;
use reporter_gateway::url_analyzer::HtmlUrlAnalyzer;
use reporter_types::capabilities::{IdentityTranslator, Translator, TrustedAuthenticator};

use crate::config::{Config, DEV_TOKEN_SECRET, TelegramMode};

const SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";
const POLL_TIMEOUT: Duration = Duration::from_secs(30);
const POLL_RETRY_DELAY: Duration = Duration::from_secs(5);

#[derive(Clone)]
struct ServerState {
    router: ChatRouter,
    webhook_secret: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "reporter=info,tower_http=info".into()),
        )
        .init();

    let config = Config::from_env()?;
    if config.token_secret == DEV_TOKEN_SECRET {
        warn!("REPORTER_TOKEN_SECRET not set, using the development secret");
    }

    let db = Arc::new(Database::open(&config.db_path)?);
    tokio::fs::create_dir_all(&config.report_dir).await?;

    let limiter = Arc::new(RateLimiter::new(
        config.rate_limit_calls,
        config.rate_limit_period,
    ));
    let dispatcher = Dispatcher::new(db.clone(), config.dispatch_timeout)?;
    let reports = ReportService::new(
        db.clone(),
        limiter,
        VerificationTokenService::new(&config.token_secret),
        dispatcher,
        &config.report_dir,
    );

    let telegram = Arc::new(TelegramClient::new(
        &config.telegram_api_base,
        &config.telegram_bot_token,
        &config.report_dir,
    )?);

    let translator: Arc<dyn Translator> = match &config.translate_url {
        Some(url) => {
            info!("Translating replies via {}", url);
            Arc::new(HttpTranslator::new(
                url,
                config.translate_api_key.clone(),
                config.url_analysis_timeout,
            )?)
        }
        None => Arc::new(IdentityTranslator),
    };

    let app_state: AppState = Arc::new(AppStateInner {
        db,
        reports,
        tokens: VerificationTokenService::new(&config.token_secret),
        sessions: SessionStore::new(),
        translator,
        media: telegram.clone(),
        analyzer: Arc::new(HtmlUrlAnalyzer::new(config.url_analysis_timeout)?),
        authenticator: Arc::new(TrustedAuthenticator),
    });

    let router = ChatRouter::new(app_state, telegram.clone());

    let poller = match config.telegram_mode {
        TelegramMode::Polling => {
            info!("Polling Telegram for updates");
            Some(tokio::spawn(poll_updates(telegram, router.clone())))
        }
        TelegramMode::Webhook => {
            info!("Receiving Telegram updates on /telegram/webhook");
            None
        }
    };

    let app = app(ServerState {
        router,
        webhook_secret: config.webhook_secret.clone(),
    });

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Reporter listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(poller) = poller {
        poller.abort();
    }
    info!("Reporter stopped");

    Ok(())
}

fn app(state: ServerState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/telegram/webhook", post(telegram_webhook))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn telegram_webhook(
    State(state): State<ServerState>,
    headers: HeaderMap,
    Json(update): Json<Update>,
) -> StatusCode {
    if let Some(secret) = &state.webhook_secret {
        let provided = headers.get(SECRET_HEADER).and_then(|v| v.to_str().ok());
        if provided != Some(secret.as_str()) {
            warn!("Rejected webhook call with a bad secret");
            return StatusCode::UNAUTHORIZED;
        }
    }

    if let Some(message) = update.into_inbound() {
        state.router.route(message).await;
    }
    StatusCode::OK
}

async fn poll_updates(telegram: Arc<TelegramClient>, router: ChatRouter) {
    let mut offset = 0;
    loop {
        match telegram.get_updates(offset, POLL_TIMEOUT).await {
            Ok(updates) => {
                for update in updates {
                    offset = offset.max(update.update_id + 1);
                    if let Some(message) = update.into_inbound() {
                        router.route(message).await;
                    }
                }
            }
            Err(e) => {
                warn!("Failed to fetch updates: {}", e);
                tokio::time::sleep(POLL_RETRY_DELAY).await;
            }
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}
