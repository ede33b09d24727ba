// auto_continue.rs — Countdown that fires the next batch of a continued job.
//
// After a batch lands with more files planned, the next prompt fires on its
// own once the countdown elapses, unless the user cancels it or starts a new
// generation for the same context (which cancels the token).

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::token::GenerationToken;

/// Sent on the channel when the countdown fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContinuationRequest {
    pub context_id: String,
    pub next_prompt: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CountdownResult {
    Fired,
    Cancelled,
    /// The countdown elapsed but nobody was listening.
    ReceiverClosed,
}

/// Handle to a running countdown task.
#[derive(Debug)]
pub struct AutoContinue {
    token: GenerationToken,
    countdown: Duration,
    handle: JoinHandle<CountdownResult>,
}

impl AutoContinue {
    /// Start the countdown on the current tokio runtime.
    pub fn spawn(
        countdown: Duration,
        token: GenerationToken,
        request: ContinuationRequest,
        sender: mpsc::Sender<ContinuationRequest>,
    ) -> Self {
        let task_token = token.clone();
        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(countdown) => {}
                _ = task_token.cancelled() => {
                    tracing::info!(context = %request.context_id, "auto-continue cancelled");
                    return CountdownResult::Cancelled;
                }
            }
            // Last check before firing.
            if task_token.is_cancelled() {
                return CountdownResult::Cancelled;
            }

            let context_id = request.context_id.clone();
            match sender.send(request).await {
                Ok(()) => {
                    tracing::info!(context = %context_id, "auto-continue fired");
                    CountdownResult::Fired
                }
                Err(_) => {
                    tracing::warn!(context = %context_id, "auto-continue receiver closed");
                    CountdownResult::ReceiverClosed
                }
            }
        });

        Self {
            token,
            countdown,
            handle,
        }
    }

    pub fn countdown(&self) -> Duration {
        self.countdown
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the countdown to fire or be cancelled.
    pub async fn wait(self) -> CountdownResult {
        match self.handle.await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!("auto-continue task failed: {}", e);
                CountdownResult::Cancelled
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::GenerationRegistry;

    fn request() -> ContinuationRequest {
        ContinuationRequest {
            context_id: "ctx".into(),
            next_prompt: "Continue with src/b.ts".into(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn fires_after_countdown() {
        let (tx, mut rx) = mpsc::channel(1);
        let task = AutoContinue::spawn(Duration::from_secs(10), GenerationToken::new(), request(), tx);

        assert_eq!(task.wait().await, CountdownResult::Fired);
        assert_eq!(rx.recv().await.unwrap().next_prompt, "Continue with src/b.ts");
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_prevents_firing() {
        let (tx, mut rx) = mpsc::channel(1);
        let task = AutoContinue::spawn(Duration::from_secs(10), GenerationToken::new(), request(), tx);

        tokio::time::sleep(Duration::from_secs(3)).await;
        task.cancel();
        assert_eq!(task.wait().await, CountdownResult::Cancelled);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn new_generation_preempts_countdown() {
        let mut registry = GenerationRegistry::new();
        let (tx, mut rx) = mpsc::channel(1);
        let task = AutoContinue::spawn(Duration::from_secs(10), registry.begin("ctx"), request(), tx);

        let _user_request = registry.begin("ctx");
        assert_eq!(task.wait().await, CountdownResult::Cancelled);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn closed_receiver_is_reported() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let task = AutoContinue::spawn(Duration::from_secs(1), GenerationToken::new(), request(), tx);
        assert_eq!(task.wait().await, CountdownResult::ReceiverClosed);
    }
}
