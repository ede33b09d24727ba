// token.rs — Cancellation tokens and the per-context active-generation registry.
//
// Only one generation may be in flight per context. Starting a new one
// cancels the previous token; streaming and the auto-continue countdown
// check the token at every suspension point.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;
use uuid::Uuid;

/// Shared cancellation flag for one generation. Clones observe the same flag.
#[derive(Debug, Clone)]
pub struct GenerationToken {
    id: Uuid,
    cancelled: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl GenerationToken {
    /// Create a new token in the "not cancelled" state.
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            cancelled: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Signal cancellation and wake any task waiting in [`Self::cancelled`].
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once the token is cancelled.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before checking the flag so a cancel in between is not lost.
            notified.as_mut().enable();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

impl Default for GenerationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Active generation per context id.
#[derive(Debug, Default)]
pub struct GenerationRegistry {
    active: HashMap<String, GenerationToken>,
}

impl GenerationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel whatever is running for `context_id` and hand out a fresh token.
    pub fn begin(&mut self, context_id: &str) -> GenerationToken {
        let token = GenerationToken::new();
        if let Some(previous) = self.active.insert(context_id.to_string(), token.clone()) {
            if !previous.is_cancelled() {
                tracing::info!(
                    context = context_id,
                    preempted = %previous.id(),
                    "new generation preempts the active one"
                );
            }
            previous.cancel();
        }
        token
    }

    /// Cancel the active generation for `context_id`, if any.
    pub fn cancel(&mut self, context_id: &str) -> bool {
        match self.active.remove(context_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Drop `token` from the registry if it is still the active one.
    /// A preempted token finishing late leaves its successor alone.
    pub fn finish(&mut self, context_id: &str, token: &GenerationToken) {
        if self
            .active
            .get(context_id)
            .is_some_and(|active| active.id() == token.id())
        {
            self.active.remove(context_id);
        }
    }

    pub fn active(&self, context_id: &str) -> Option<&GenerationToken> {
        self.active.get(context_id)
    }

    pub fn is_active(&self, context_id: &str) -> bool {
        self.active
            .get(context_id)
            .is_some_and(|token| !token.is_cancelled())
    }
}
