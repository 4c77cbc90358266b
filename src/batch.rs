//! Time- and size-triggered request batching.
//!
//! A batch opens per (provider, request type) on first eligible arrival
//! and closes exactly once: when it reaches `max_batch_size`, or when
//! `batch_delay` elapses since it opened, whichever fires first. The
//! close is idempotent — whoever removes the batch from the open map
//! runs it; the loser (timer vs. size trigger) finds nothing and walks
//! away.
//!
//! On close the registered executor receives every payload in arrival
//! order and returns per-item outcomes in the same order. If the
//! executor itself fails, every item in the batch fails with that same
//! error. Per-caller completions are delivered in arrival order.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::debug;

use crate::config::BatchConfig;
use crate::telemetry;
use crate::types::{BatchPayload, Provider, ProviderResponse, RequestType};
use crate::{KvasirError, Result};

type BatchKind = (Provider, RequestType);

/// Close-time handler for one batch kind. Receives payloads in arrival
/// order; returns per-item outcomes in the same order (or one error for
/// the whole batch).
pub(crate) type BatchExecutor = Arc<
    dyn Fn(Vec<BatchPayload>) -> Pin<Box<dyn Future<Output = Result<Vec<Result<ProviderResponse>>>> + Send>>
        + Send
        + Sync,
>;

struct BatchSlot {
    seq: u64,
    payload: BatchPayload,
    tx: oneshot::Sender<Result<ProviderResponse>>,
}

struct OpenBatch {
    id: u64,
    opened_at: Instant,
    items: Vec<BatchSlot>,
}

/// Claim on one enqueued item: enough identity to withdraw it while
/// the batch is still open. The outcome arrives on the receiver
/// returned alongside it.
pub(crate) struct BatchTicket {
    kind: BatchKind,
    batch_id: u64,
    seq: u64,
}

/// The request batcher (component owning all open batches).
pub(crate) struct Batcher {
    open: Mutex<HashMap<BatchKind, OpenBatch>>,
    executors: Mutex<HashMap<BatchKind, BatchExecutor>>,
    next_batch_id: AtomicU64,
    next_seq: AtomicU64,
}

impl Batcher {
    pub(crate) fn new() -> Self {
        Self {
            open: Mutex::new(HashMap::new()),
            executors: Mutex::new(HashMap::new()),
            next_batch_id: AtomicU64::new(1),
            next_seq: AtomicU64::new(1),
        }
    }

    /// Register the close-time executor for one batch kind.
    pub(crate) fn register_executor(
        &self,
        provider: Provider,
        request_type: RequestType,
        executor: BatchExecutor,
    ) {
        self.executors
            .lock()
            .unwrap()
            .insert((provider, request_type), executor);
    }

    /// Add an item to the open batch for its kind (opening one if
    /// needed). Returns the withdrawal ticket and the receiver that
    /// resolves with this item's outcome.
    pub(crate) fn enqueue(
        self: &Arc<Self>,
        provider: Provider,
        request_type: RequestType,
        payload: BatchPayload,
        config: &BatchConfig,
    ) -> (BatchTicket, oneshot::Receiver<Result<ProviderResponse>>) {
        let kind = (provider, request_type);
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();

        let (batch_id, close_now, arm_timer) = {
            let mut open = self.open.lock().unwrap();
            let batch = open.entry(kind).or_insert_with(|| {
                let id = self.next_batch_id.fetch_add(1, Ordering::Relaxed);
                debug!(provider = provider.as_str(), batch_id = id, "batch opened");
                OpenBatch {
                    id,
                    opened_at: Instant::now(),
                    items: Vec::new(),
                }
            });
            let is_first = batch.items.is_empty();
            batch.items.push(BatchSlot { seq, payload, tx });
            let full = batch.items.len() >= config.max_batch_size.max(1);
            (batch.id, full, is_first && !full)
        };

        if close_now {
            self.trigger_close(kind, batch_id, "size");
        } else if arm_timer {
            let batcher = Arc::clone(self);
            let delay = config.batch_delay;
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                batcher.trigger_close(kind, batch_id, "deadline");
            });
        }

        (
            BatchTicket {
                kind,
                batch_id,
                seq,
            },
            rx,
        )
    }

    /// Withdraw an item whose caller cancelled. A no-op once the batch
    /// has closed — the executor result for it is simply discarded.
    pub(crate) fn cancel(&self, ticket: &BatchTicket) {
        let mut open = self.open.lock().unwrap();
        if let Some(batch) = open.get_mut(&ticket.kind) {
            if batch.id == ticket.batch_id {
                batch.items.retain(|slot| slot.seq != ticket.seq);
                if batch.items.is_empty() {
                    open.remove(&ticket.kind);
                }
            }
        }
    }

    /// Fail every item in every open batch (cleanup path). No executor
    /// runs for drained batches.
    pub(crate) fn drain_all(&self, error: KvasirError) -> usize {
        let drained: Vec<OpenBatch> = {
            let mut open = self.open.lock().unwrap();
            open.drain().map(|(_, batch)| batch).collect()
        };
        let mut failed = 0;
        for batch in drained {
            for slot in batch.items {
                failed += 1;
                let _ = slot.tx.send(Err(error.clone()));
            }
        }
        failed
    }

    /// Close the batch if it is still the one identified by `batch_id`,
    /// then run the executor and fan out outcomes.
    fn trigger_close(self: &Arc<Self>, kind: BatchKind, batch_id: u64, reason: &'static str) {
        let batch = {
            let mut open = self.open.lock().unwrap();
            match open.get(&kind) {
                Some(batch) if batch.id == batch_id => open.remove(&kind),
                _ => None,
            }
        };
        let Some(batch) = batch else {
            return; // already closed by the other trigger, or drained
        };

        let executor = self.executors.lock().unwrap().get(&kind).cloned();
        let endpoint_label = match kind.0 {
            Provider::Taste => "taste_entities",
            Provider::Llm => "llm_complete",
        };
        metrics::counter!(telemetry::BATCHES_CLOSED_TOTAL,
            "endpoint" => endpoint_label,
            "reason" => reason,
        )
        .increment(1);
        debug!(
            provider = kind.0.as_str(),
            batch_id,
            size = batch.items.len(),
            open_ms = batch.opened_at.elapsed().as_millis() as u64,
            reason,
            "batch closed"
        );

        tokio::spawn(async move {
            let (payloads, txs): (Vec<_>, Vec<_>) = batch
                .items
                .into_iter()
                .map(|slot| (slot.payload, slot.tx))
                .unzip();

            let outcomes = match executor {
                Some(executor) => executor(payloads).await,
                None => Err(KvasirError::Configuration(format!(
                    "no batch executor registered for {}/{:?}",
                    kind.0, kind.1
                ))),
            };

            match outcomes {
                Ok(results) => {
                    let mut results = results.into_iter();
                    for tx in txs {
                        let outcome = results.next().unwrap_or_else(|| {
                            Err(KvasirError::ParseInvalid(
                                "batch executor returned fewer results than requests".into(),
                            ))
                        });
                        let _ = tx.send(outcome);
                    }
                }
                Err(error) => {
                    for tx in txs {
                        let _ = tx.send(Err(error.clone()));
                    }
                }
            }
        });
    }

    /// Open batches right now.
    #[cfg(test)]
    pub(crate) fn open_len(&self) -> usize {
        self.open.lock().unwrap().len()
    }
}
