use std::sync::Arc;
use std::time::Duration;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tokio::time::{Instant, timeout_at};
use tracing::debug;
use crate::error::FetchError;
use crate::fetch::{FetchRequest, Transport};

pub const DEFAULT_BATCH_DELAY: Duration = Duration::from_millis(50);

// Batched request - holds url + response channel
struct BatchedRequest {
    request: FetchRequest,
    response_tx: oneshot::Sender<Result<Value, FetchError>>,
}

/// Collects requests for a short delay window, then issues the whole
/// batch in parallel. Each request resolves or fails on its own.
#[derive(Clone)]
pub struct BatchProcessor {
    batch_tx: mpsc::Sender<BatchedRequest>,
}

impl BatchProcessor {
    /// Start the background worker on the current runtime. It stops once
    /// every handle has been dropped.
    pub fn spawn<T: Transport>(transport: T, delay: Duration) -> Self {
        let (batch_tx, batch_rx) = mpsc::channel(100);
        tokio::spawn(batch_worker(batch_rx, Arc::new(transport), delay));
        Self { batch_tx }
    }

    pub async fn add(&self, url: &str) -> Result<Value, FetchError> {
        let (response_tx, response_rx) = oneshot::channel();
        let batched = BatchedRequest {
            request: FetchRequest::get(url),
            response_tx,
        };
        self.batch_tx
            .send(batched)
            .await
            .map_err(|_| FetchError::Closed)?;

        response_rx
            .await
            .map_err(|_| FetchError::Abandoned(url.to_string()))?
    }
}

async fn batch_worker<T: Transport>(
    mut rx: mpsc::Receiver<BatchedRequest>,
    transport: Arc<T>,
    delay: Duration,
) {
    debug!(?delay, "batch worker started");

    // the first request opens a window, everything until the deadline joins it
    while let Some(first) = rx.recv().await {
        let deadline = Instant::now() + delay;
        let mut batch = vec![first];
        while let Ok(Some(next)) = timeout_at(deadline, rx.recv()).await {
            batch.push(next);
        }
        debug!(size = batch.len(), "flushing batch");

        let mut in_flight = JoinSet::new();
        for batched in batch {
            let transport = Arc::clone(&transport);
            in_flight.spawn(async move {
                let result = transport.fetch(&batched.request).await;
                let _ = batched.response_tx.send(result);
            });
        }
        // the next window opens right away; a slow batch drains on its own.
        // a panicking request drops its sender, so its caller sees Abandoned
        tokio::spawn(async move { while in_flight.join_next().await.is_some() {} });
    }

    debug!("batch worker stopped");
}
