// src/core/counter.rs

use std::collections::HashMap;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::core::error::EnumError;

struct TimesRequest {
    sub: String,
    reply: oneshot::Sender<u64>,
}

/// Counts how many times each subdomain has been derived.
///
/// The table lives inside a single worker task; callers reach it only by
/// sending a request and waiting on a one-shot reply, so increments are
/// totally ordered per name and no two callers see the same count.
#[derive(Debug)]
pub struct CounterManager {
    tx: mpsc::Sender<TimesRequest>,
    done: CancellationToken,
}

impl CounterManager {
    /// Spawns the worker. Must be called from within a tokio runtime.
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let done = CancellationToken::new();

        tokio::spawn(times_manager(rx, done.clone()));
        Self { tx, done }
    }

    /// Increments the count for `sub` and returns the new value, starting at 1.
    pub async fn times_for(&self, sub: &str) -> Result<u64, EnumError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(TimesRequest {
                sub: sub.to_string(),
                reply,
            })
            .await
            .map_err(|_| EnumError::CounterStopped)?;

        rx.await.map_err(|_| EnumError::CounterStopped)
    }

    /// Terminates the worker. Requests made afterwards fail with
    /// [`EnumError::CounterStopped`].
    pub fn stop(&self) {
        self.done.cancel();
    }
}

impl std::fmt::Debug for TimesRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimesRequest").field("sub", &self.sub).finish()
    }
}

async fn times_manager(mut rx: mpsc::Receiver<TimesRequest>, done: CancellationToken) {
    let mut subdomains: HashMap<String, u64> = HashMap::new();

    loop {
        tokio::select! {
            biased;
            _ = done.cancelled() => break,
            req = rx.recv() => {
                let Some(req) = req else { break };
                let times = subdomains
                    .entry(req.sub)
                    .and_modify(|t| *t += 1)
                    .or_insert(1);
                trace!(times = *times, "Subdomain counted.");
                // The caller may have given up waiting.
                let _ = req.reply.send(*times);
            }
        }
    }

    debug!(subdomains = subdomains.len(), "Occurrence counter stopped.");
}
