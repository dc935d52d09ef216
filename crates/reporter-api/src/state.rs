use std::sync::Arc;

use tracing::warn;

use reporter_db::Database;
use reporter_types::capabilities::{AccountAuthenticator, MediaFetcher, Translator, UrlAnalyzer};

use crate::reports::ReportService;
use crate::session::SessionStore;
use crate::tokens::VerificationTokenService;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub reports: ReportService,
    pub tokens: VerificationTokenService,
    pub sessions: SessionStore,
    pub translator: Arc<dyn Translator>,
    pub media: Arc<dyn MediaFetcher>,
    pub analyzer: Arc<dyn UrlAnalyzer>,
    pub authenticator: Arc<dyn AccountAuthenticator>,
}

impl AppStateInner {
    /// Translate an English prompt into the user's language, falling back to
    /// English if the translator fails.
    pub async fn localize(&self, language: &str, text: &str) -> String {
        if language.is_empty() || language == "en" {
            return text.to_string();
        }

        match self.translator.translate(text, language).await {
            Ok(translated) => translated,
            Err(e) => {
                warn!("Translation to '{}' failed: {}", language, e);
                text.to_string()
            }
        }
    }
}
