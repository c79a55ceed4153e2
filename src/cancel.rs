//! Run-wide cancellation.
//!
//! A single [`CancelToken`] is created per run and cloned into every stage.
//! Ctrl-C and the overall deadline both trip it; every network, model or
//! rate-limiter await is raced against [`CancelToken::cancelled`].

use crate::error::{Error, Result};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            rx,
        }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the token has been cancelled.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        // The sender lives as long as any clone of the token, so this only
        // returns once the flag flips.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }

    /// Cancel the token once `deadline` has elapsed.
    pub fn cancel_after(&self, deadline: Duration) -> tokio::task::JoinHandle<()> {
        let token = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(deadline).await;
            if !token.is_cancelled() {
                warn!(deadline_secs = deadline.as_secs(), "Run deadline reached; cancelling");
                token.cancel();
            }
        })
    }

    /// Drive `fut` to completion unless the token is cancelled first.
    pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output> {
        if self.is_cancelled() {
            return Err(Error::Cancelled);
        }
        tokio::select! {
            biased;
            _ = self.cancelled() => Err(Error::Cancelled),
            out = fut => Ok(out),
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}
