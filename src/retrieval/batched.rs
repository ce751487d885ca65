//! Batched, asynchronous data-index retrieval.
//!
//! Thin primary-index rows only carry `(data_id, adapter_id)`. Looking each one up on its own
//! would put a storage round trip in front of every decode, so lookups are buffered here and
//! resolved with one multi-key fetch per adapter per batch.
//!
//! # Lifecycle
//!
//! ```text
//! get_data_async(id, adapter) ──▶ pending[adapter] ── len == batch_size ──▶ dispatch
//!                                        │
//! notify_iterator_exhausted() ── counter reaches 0 ──▶ flush() ──────────────▶ dispatch
//!
//! dispatch: snapshot + clear under the adapter lock, then fetch_batch on the runtime
//!           and complete each request by position
//! ```
//!
//! Every request for a key that is already pending shares the first request's future, so a
//! key is fetched at most once per batch. Futures never fail: fetch errors, short results and
//! dropped requests all resolve to `None` after being logged.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use bytes::Bytes;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use indexmap::IndexMap;
use once_cell::sync::OnceCell;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use crate::error::{Result, RetrievalError};
use crate::retrieval::MultiKeyFetch;
use crate::retrieval::params::RetrievalParams;
use crate::row_model::{GeoWaveValue, GeoWaveValues};

/// Handle on one pending data-index lookup.
///
/// Cloneable; every clone resolves to the same values. `None` means the record is missing or
/// could not be fetched.
pub type DataIndexFuture = Shared<BoxFuture<'static, Option<GeoWaveValues>>>;

/// What the background fetch delivers to one request.
type FetchOutcome = Result<Option<GeoWaveValues>>;

struct PendingRequest {
    completion: oneshot::Sender<FetchOutcome>,
    future: DataIndexFuture,
}

/// Requests accumulated for one adapter, in submission order.
#[derive(Default)]
struct PendingBatch {
    requests: IndexMap<Bytes, PendingRequest>,
}

impl PendingBatch {
    /// Drain every request into parallel key/completion arrays.
    fn take_snapshot(&mut self) -> Option<BatchSnapshot> {
        if self.requests.is_empty() {
            return None;
        }
        let (data_ids, completions) = std::mem::take(&mut self.requests)
            .into_iter()
            .map(|(data_id, request)| (data_id, request.completion))
            .unzip();
        Some(BatchSnapshot { data_ids, completions })
    }
}

struct BatchSnapshot {
    data_ids: Vec<Bytes>,
    completions: Vec<oneshot::Sender<FetchOutcome>>,
}

/// Shared batching engine for one query execution.
///
/// Any number of scanning iterators, on any threads, may submit lookups to the same instance.
/// Per-adapter mutexes guard only the pending maps; they are never held across a fetch.
/// Fetches run as tasks on the runtime handed to [`BatchedRetrieval::new`], so neither
/// [`get_data_async`](Self::get_data_async) nor [`flush`](Self::flush) waits on storage.
///
/// Iterators participate in batching by calling
/// [`notify_iterator_initiated`](Self::notify_iterator_initiated) on their first pull and
/// [`notify_iterator_exhausted`](Self::notify_iterator_exhausted) once their row source runs
/// dry. When the last active iterator is exhausted nothing can add to a batch any more, so
/// every partial batch is flushed.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use bytes::Bytes;
/// use geowave_dataindex::{BatchedRetrieval, MemoryDataIndex, RetrievalParams};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
///     let backend = Arc::new(MemoryDataIndex::new());
///     let retrieval = BatchedRetrieval::new(backend, 100, tokio::runtime::Handle::current())?;
///     retrieval.set_params(RetrievalParams::default())?;
///
///     retrieval.notify_iterator_initiated();
///     let pending = retrieval.get_data_async(Bytes::from_static(b"feature-1"), 7);
///     // Fewer than 100 keys: nothing is fetched until the scan reports exhaustion
///     retrieval.notify_iterator_exhausted();
///
///     let values = pending.await;
///     println!("resolved: {}", values.is_some());
///     Ok(())
/// }
/// ```
pub struct BatchedRetrieval {
    fetcher: Arc<dyn MultiKeyFetch>,
    batch_size: usize,
    params: OnceCell<Arc<RetrievalParams>>,
    pending: DashMap<i16, Arc<Mutex<PendingBatch>>>,
    outstanding_iterators: AtomicUsize,
    runtime: Handle,
}

impl BatchedRetrieval {
    /// # Errors
    ///
    /// Returns [`RetrievalError::InvalidConfig`] if `batch_size` is zero.
    pub fn new(fetcher: Arc<dyn MultiKeyFetch>, batch_size: usize, runtime: Handle) -> Result<Self> {
        if batch_size == 0 {
            return Err(RetrievalError::invalid_config("batch_size must be at least 1"));
        }
        Ok(Self {
            fetcher,
            batch_size,
            params: OnceCell::new(),
            pending: DashMap::new(),
            outstanding_iterators: AtomicUsize::new(0),
            runtime,
        })
    }

    /// Bind params for the lifetime of this retrieval.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::ParamsAlreadyBound`] if params were already bound, or if a
    /// batch was already dispatched with the default params.
    pub fn set_params(&self, params: RetrievalParams) -> Result<()> {
        self.params
            .set(Arc::new(params))
            .map_err(|_| RetrievalError::ParamsAlreadyBound)
    }

    /// Bound params, or unprojected defaults if none were bound before first use.
    pub fn params(&self) -> Arc<RetrievalParams> {
        Arc::clone(self.params.get_or_init(|| Arc::new(RetrievalParams::default())))
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Runtime that fetches (and deferred decodes) run on.
    pub fn runtime(&self) -> &Handle {
        &self.runtime
    }

    /// Number of iterators that have started pulling and are not yet exhausted.
    pub fn outstanding_iterators(&self) -> usize {
        self.outstanding_iterators.load(Ordering::Acquire)
    }

    /// Requests waiting in the current, not yet dispatched, batch for an adapter.
    pub fn pending_count(&self, adapter_id: i16) -> usize {
        let Some(batch) = self.pending.get(&adapter_id) else {
            return 0;
        };
        lock_batch(batch.value()).requests.len()
    }

    /// Request the field values for one record.
    ///
    /// A request for a key that is already pending returns the existing future. When this
    /// request fills the adapter's batch, the batch is dispatched before returning; the fetch
    /// itself runs in the background.
    pub fn get_data_async(&self, data_id: Bytes, adapter_id: i16) -> DataIndexFuture {
        let batch = Arc::clone(self.pending.entry(adapter_id).or_default().value());

        let (future, full_batch) = {
            let mut pending = lock_batch(&batch);
            if let Some(existing) = pending.requests.get(&data_id) {
                return existing.future.clone();
            }

            let (completion, receiver) = oneshot::channel();
            let future = receiver
                .map(move |received| resolve_or_missing(adapter_id, received))
                .boxed()
                .shared();
            pending.requests.insert(
                data_id,
                PendingRequest {
                    completion,
                    future: future.clone(),
                },
            );

            // Snapshot in the same critical section so a dispatched batch never exceeds
            // batch_size, even with concurrent submitters.
            let full_batch = if pending.requests.len() >= self.batch_size {
                pending.take_snapshot()
            } else {
                None
            };
            (future, full_batch)
        };

        if let Some(snapshot) = full_batch {
            self.dispatch(adapter_id, snapshot);
        }
        future
    }

    /// Dispatch whatever is pending for one adapter, regardless of batch size.
    pub fn flush_adapter(&self, adapter_id: i16) {
        let batch = match self.pending.get(&adapter_id) {
            Some(batch) => Arc::clone(batch.value()),
            None => return,
        };
        let snapshot = lock_batch(&batch).take_snapshot();
        if let Some(snapshot) = snapshot {
            self.dispatch(adapter_id, snapshot);
        }
    }

    /// Dispatch every adapter's pending requests, regardless of batch size.
    pub fn flush(&self) {
        let adapter_ids: Vec<i16> = self.pending.iter().map(|entry| *entry.key()).collect();
        for adapter_id in adapter_ids {
            self.flush_adapter(adapter_id);
        }
    }

    pub fn notify_iterator_initiated(&self) {
        self.outstanding_iterators.fetch_add(1, Ordering::AcqRel);
    }

    /// Record that one iterator will submit no more requests; flushes everything once the
    /// last active iterator is done.
    pub fn notify_iterator_exhausted(&self) {
        let previous = self
            .outstanding_iterators
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| count.checked_sub(1));
        match previous {
            Ok(1) => self.flush(),
            Ok(_) => {}
            Err(_) => {
                tracing::warn!("iterator exhausted without being initiated, flushing pending batches");
                self.flush();
            }
        }
    }

    fn dispatch(&self, adapter_id: i16, snapshot: BatchSnapshot) {
        let fetcher = Arc::clone(&self.fetcher);
        let params = self.params();
        tracing::debug!(adapter_id, keys = snapshot.data_ids.len(), "dispatching data index batch");

        self.runtime.spawn(async move {
            let BatchSnapshot { data_ids, completions } = snapshot;
            match fetcher.fetch_batch(&data_ids, adapter_id, &params).await {
                Ok(results) => complete_by_position(adapter_id, results, completions),
                Err(e) => {
                    tracing::warn!(
                        adapter_id,
                        keys = data_ids.len(),
                        error = %e,
                        "data index batch fetch failed"
                    );
                    for completion in completions {
                        let _ = completion.send(Err(e.clone()));
                    }
                }
            }
        });
    }
}

/// Hand fetched records to requests in submission order.
///
/// A short result leaves the trailing requests resolved to `None`; surplus results are
/// dropped.
fn complete_by_position(
    adapter_id: i16,
    results: Vec<Option<Vec<GeoWaveValue>>>,
    completions: Vec<oneshot::Sender<FetchOutcome>>,
) {
    let expected = completions.len();
    let received = results.len();
    if received < expected {
        tracing::warn!(
            adapter_id,
            expected,
            received,
            "Retrieved less data index results than expected"
        );
    } else if received > expected {
        tracing::warn!(
            adapter_id,
            expected,
            received,
            "Retrieved more data index results than expected, ignoring the surplus"
        );
    }

    let mut results = results.into_iter();
    for completion in completions {
        let values = results.next().flatten().map(GeoWaveValues::from);
        // Err means every handle on this request was dropped
        let _ = completion.send(Ok(values));
    }
}

/// Collapse a request's outcome to the values, or `None` on any failure.
///
/// Batch-level failures are already logged once by the dispatching task, so they only show
/// up here at debug level.
pub(crate) fn resolve_or_missing(
    adapter_id: i16,
    received: std::result::Result<FetchOutcome, oneshot::error::RecvError>,
) -> Option<GeoWaveValues> {
    match received {
        Ok(Ok(values)) => values,
        Ok(Err(e)) => {
            tracing::debug!(adapter_id, error = %e, "data index lookup failed, treating record as missing");
            None
        }
        Err(_) => {
            tracing::warn!(adapter_id, "data index request abandoned before completion");
            None
        }
    }
}

fn lock_batch(batch: &Mutex<PendingBatch>) -> MutexGuard<'_, PendingBatch> {
    batch.lock().unwrap_or_else(PoisonError::into_inner)
}
