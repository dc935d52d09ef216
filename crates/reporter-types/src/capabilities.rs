//! Narrow interfaces to the slow, failure-prone collaborators the
//! conversation depends on. Callers treat every error as "degrade and
//! continue", never as a reason to abort a step.

use std::path::PathBuf;

use anyhow::Result;
use async_trait::async_trait;

use crate::events::Attachment;
use crate::models::UrlAnalysis;

#[async_trait]
pub trait Translator: Send + Sync {
    /// Translate `text` into `target_lang` (two-letter code).
    async fn translate(&self, text: &str, target_lang: &str) -> Result<String>;
}

/// Returns text unchanged. Used when no translation service is configured.
#[derive(Debug, Clone, Default)]
pub struct IdentityTranslator;

#[async_trait]
impl Translator for IdentityTranslator {
    async fn translate(&self, text: &str, _target_lang: &str) -> Result<String> {
        Ok(text.to_string())
    }
}

#[async_trait]
pub trait MediaFetcher: Send + Sync {
    /// Download an attachment and return where it was stored.
    async fn fetch(&self, chat_id: i64, attachment: &Attachment) -> Result<PathBuf>;
}

#[async_trait]
pub trait UrlAnalyzer: Send + Sync {
    async fn analyze(&self, url: &str) -> Result<UrlAnalysis>;
}

/// Messaging-network account details gathered during onboarding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountCredentials {
    pub phone_number: String,
    pub api_id: String,
    pub api_hash: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Authorized,
    /// A login code was sent to the user and must be entered next.
    CodeRequired,
}

#[async_trait]
pub trait AccountAuthenticator: Send + Sync {
    async fn begin(&self, chat_id: i64, credentials: &AccountCredentials) -> Result<AuthState>;

    async fn sign_in(
        &self,
        chat_id: i64,
        credentials: &AccountCredentials,
        code: &str,
    ) -> Result<()>;
}

/// Accepts every account as already authorized.
#[derive(Debug, Clone, Default)]
pub struct TrustedAuthenticator;

#[async_trait]
impl AccountAuthenticator for TrustedAuthenticator {
    async fn begin(&self, _chat_id: i64, _credentials: &AccountCredentials) -> Result<AuthState> {
        Ok(AuthState::Authorized)
    }

    async fn sign_in(
        &self,
        _chat_id: i64,
        _credentials: &AccountCredentials,
        _code: &str,
    ) -> Result<()> {
        Ok(())
    }
}

/// Outbound half of the chat transport.
#[async_trait]
pub trait ReplySink: Send + Sync {
    async fn send(&self, chat_id: i64, text: &str) -> Result<()>;
}
