//! Offline -> online sync trigger: drains the [`crate::queue::SendQueue`]
//! through a message sender once connectivity returns.
//!
//! `SyncManager` depends only on the small [`MessageSender`] trait below,
//! not on [`crate::chat::Chat`] directly, so the dependency points one
//! way (`chat` owns a `SyncManager`, not the reverse) even though at
//! runtime `Chat` is exactly what gets passed in as the sender.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::collaborators::TxId;
use crate::conversation::ReplyContext;
use crate::errors::ChatError;
use crate::queue::{PendingMessage, SendQueue};
use crate::types::Address;

/// Anything capable of actually sending a queued message. `Chat::send`
/// is the production implementation; tests can supply a fake.
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send_pending(
        &self,
        recipient: Address,
        content: &str,
        reply_context: Option<ReplyContext>,
        amount_micro_units: Option<u64>,
    ) -> Result<TxId, ChatError>;
}

/// Observes queue-drain outcomes. Both methods have no-op defaults so a
/// caller that only cares about one can skip the other.
#[async_trait]
pub trait SyncObserver: Send + Sync {
    async fn on_message_sent(&self, _message: &PendingMessage, _txid: &TxId) {}
    async fn on_message_failed(&self, _message: &PendingMessage, _error: &ChatError) {}
}

/// Tracks connectivity and drives the send queue once it returns.
/// `sync` is guarded so two overlapping calls can't both drain the
/// queue at once - the second returns immediately having done nothing.
pub struct SyncManager {
    online: Mutex<bool>,
    syncing: Mutex<bool>,
    observer: Option<Arc<dyn SyncObserver>>,
}

impl SyncManager {
    pub fn new() -> Self {
        Self {
            online: Mutex::new(false),
            syncing: Mutex::new(false),
            observer: None,
        }
    }

    pub fn with_observer(observer: Arc<dyn SyncObserver>) -> Self {
        Self {
            online: Mutex::new(false),
            syncing: Mutex::new(false),
            observer: Some(observer),
        }
    }

    pub async fn is_online(&self) -> bool {
        *self.online.lock().await
    }

    /// Set the connectivity flag. On a false -> true transition, kicks
    /// off `sync` against `queue`/`sender` - the spec's "offline->online
    /// sync trigger."
    pub async fn set_online(
        &self,
        online: bool,
        queue: &Mutex<SendQueue>,
        sender: &dyn MessageSender,
    ) {
        let was_online = {
            let mut flag = self.online.lock().await;
            let was = *flag;
            *flag = online;
            was
        };
        if online && !was_online {
            info!("connectivity restored, draining send queue");
            self.sync(queue, sender).await;
        }
    }

    /// Drain `queue` through `sender`, one message at a time: mark
    /// sending, attempt the send, then mark sent or failed. Mutually
    /// exclusive with itself via the `syncing` guard.
    pub async fn sync(&self, queue: &Mutex<SendQueue>, sender: &dyn MessageSender) {
        {
            let mut syncing = self.syncing.lock().await;
            if *syncing {
                return;
            }
            *syncing = true;
        }

        // Snapshot how many eligible messages exist right now and process
        // at most that many. A message that fails gets requeued eligible
        // again (for the *next* sync pass), so without this bound a single
        // stubbornly-failing message would spin in a tight retry loop
        // within one `sync()` call instead of across separate passes.
        let eligible_count = queue.lock().await.len();

        for _ in 0..eligible_count {
            let next = {
                let mut queue = queue.lock().await;
                queue.dequeue()
            };
            let Some(message) = next else { break };

            let now = chrono::Utc::now();
            {
                let mut queue = queue.lock().await;
                queue.requeue(message.clone());
                let _ = queue.mark_sending(message.id, now).await;
            }

            let result = sender
                .send_pending(
                    message.recipient,
                    &message.content,
                    message.reply_context.clone(),
                    message.amount_micro_units,
                )
                .await;

            match result {
                Ok(txid) => {
                    {
                        let mut queue = queue.lock().await;
                        let _ = queue.mark_sent(message.id).await;
                    }
                    if let Some(observer) = &self.observer {
                        observer.on_message_sent(&message, &txid).await;
                    }
                }
                Err(err) => {
                    {
                        let mut queue = queue.lock().await;
                        let _ = queue.mark_failed(message.id, err.to_string()).await;
                    }
                    warn!(id = %message.id, error = %err, "queued send failed");
                    if let Some(observer) = &self.observer {
                        observer.on_message_failed(&message, &err).await;
                    }
                }
            }
        }

        *self.syncing.lock().await = false;
    }
}

impl Default for SyncManager {
    fn default() -> Self {
        Self::new()
    }
}
