use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, mpsc};
use tracing::{debug, warn};

use reporter_types::capabilities::ReplySink;
use reporter_types::events::InboundMessage;

use crate::handler::handle_message;
use crate::state::AppState;

const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(600);

/// Fans inbound messages out to one worker task per chat.
///
/// A chat's messages are handled strictly in arrival order by its worker;
/// different chats are handled in parallel. Workers exit after sitting idle
/// and are respawned on the next message; a chat whose report is already
/// filed loses its session at that point.
#[derive(Clone)]
pub struct ChatRouter {
    inner: Arc<RouterInner>,
}

struct RouterInner {
    state: AppState,
    sink: Arc<dyn ReplySink>,
    idle_timeout: Duration,
    /// chat_id -> queue of the chat's worker
    workers: Mutex<HashMap<i64, mpsc::UnboundedSender<InboundMessage>>>,
}

impl ChatRouter {
    pub fn new(state: AppState, sink: Arc<dyn ReplySink>) -> Self {
        Self::with_idle_timeout(state, sink, DEFAULT_IDLE_TIMEOUT)
    }

    pub fn with_idle_timeout(state: AppState, sink: Arc<dyn ReplySink>, idle_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(RouterInner {
                state,
                sink,
                idle_timeout,
                workers: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Queue a message on its chat's worker, starting the worker if needed.
    pub async fn route(&self, message: InboundMessage) {
        let chat_id = message.chat_id;
        let mut workers = self.inner.workers.lock().await;

        let message = match workers.get(&chat_id) {
            Some(tx) => match tx.send(message) {
                Ok(()) => return,
                // The worker died mid-message; start over with a fresh one.
                Err(mpsc::error::SendError(message)) => {
                    warn!("Worker for chat {} is gone, restarting", chat_id);
                    message
                }
            },
            None => message,
        };

        let (tx, rx) = mpsc::unbounded_channel();
        if tx.send(message).is_err() {
            return;
        }
        workers.insert(chat_id, tx);
        debug!("Started worker for chat {}", chat_id);

        tokio::spawn(run_worker(self.inner.clone(), chat_id, rx));
    }

    /// Number of chats with a live worker.
    pub async fn active_chats(&self) -> usize {
        self.inner.workers.lock().await.len()
    }
}

async fn run_worker(inner: Arc<RouterInner>, chat_id: i64, mut rx: mpsc::UnboundedReceiver<InboundMessage>) {
    loop {
        let message = match tokio::time::timeout(inner.idle_timeout, rx.recv()).await {
            Ok(Some(message)) => message,
            Ok(None) => break,
            Err(_) => {
                // Retire only while holding the map lock, so `route` can't
                // queue onto a receiver that is about to be dropped.
                let mut workers = inner.workers.lock().await;
                match rx.try_recv() {
                    Ok(message) => message,
                    Err(_) => {
                        workers.remove(&chat_id);
                        if inner.state.sessions.evict_finished(chat_id).await {
                            debug!("Dropped finished session for chat {}", chat_id);
                        }
                        debug!("Worker for chat {} idle, stopping", chat_id);
                        break;
                    }
                }
            }
        };

        if let Some(reply) = handle_message(&inner.state, &message).await {
            if let Err(e) = inner.sink.send(chat_id, &reply).await {
                warn!("Failed to send reply to {}: {}", chat_id, e);
            }
        }
    }
}
