pub mod commands;
pub mod conversation;
pub mod extract;
pub mod handler;
pub mod reports;
pub mod router;
pub mod session;
pub mod state;
pub mod tokens;

use anyhow::anyhow;
use tracing::error;

/// Run blocking database work off the async runtime.
pub(crate) async fn blocking<F, T>(f: F) -> anyhow::Result<T>
where
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        anyhow!("spawn_blocking join error: {}", e)
    })?
}
