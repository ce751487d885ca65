//! Per-row filtering and decoding shared by both iterator flavors.

use std::sync::Arc;
use futures::future::{BoxFuture, FutureExt};
use crate::decoding::adapter_store::{AdapterStore, DataAdapter};
use crate::error::RetrievalError;
use crate::retrieval::batched::BatchedRetrieval;
use crate::retrieval::single_key::SingleKeyRetrieval;
use crate::row_model::{GeoWaveRow, GeoWaveValue};

/// Predicate applied to every scanned row before it is decoded.
pub trait QueryFilter: Send + Sync {
    fn accept(&self, row: &GeoWaveRow) -> bool;
}

impl<F> QueryFilter for F
where
    F: Fn(&GeoWaveRow) -> bool + Send + Sync,
{
    fn accept(&self, row: &GeoWaveRow) -> bool {
        self(row)
    }
}

/// Outcome of decoding one row against batched retrieval.
pub enum Decoded<T> {
    /// Decoded from the row's own field data.
    Ready(T),
    /// Waiting on a data-index lookup; resolves to `None` if the record is missing or fails
    /// to decode.
    Pending(BoxFuture<'static, Option<T>>),
    /// Filtered out, unknown adapter, or failed to decode.
    Skipped,
}

/// Filters plus adapter lookup for one scan.
pub struct RowDecoder<T> {
    adapter_store: Arc<AdapterStore<T>>,
    filters: Arc<[Arc<dyn QueryFilter>]>,
}

impl<T> Clone for RowDecoder<T> {
    fn clone(&self) -> Self {
        Self {
            adapter_store: Arc::clone(&self.adapter_store),
            filters: Arc::clone(&self.filters),
        }
    }
}

impl<T: Send + 'static> RowDecoder<T> {
    pub fn new(adapter_store: Arc<AdapterStore<T>>, filters: Vec<Arc<dyn QueryFilter>>) -> Self {
        Self {
            adapter_store,
            filters: filters.into(),
        }
    }

    pub fn adapter_store(&self) -> &Arc<AdapterStore<T>> {
        &self.adapter_store
    }

    fn accepts(&self, row: &GeoWaveRow) -> bool {
        self.filters.iter().all(|filter| filter.accept(row))
    }

    /// Filter and find the row's adapter; `None` means the row is dropped.
    fn admit(&self, row: &GeoWaveRow) -> Option<Arc<dyn DataAdapter<T>>> {
        if !self.accepts(row) {
            return None;
        }
        let adapter = self.adapter_store.get_adapter(row.adapter_id());
        if adapter.is_none() {
            tracing::warn!(
                data_id = ?row.data_id(),
                error = %RetrievalError::UnknownAdapter(row.adapter_id()),
                "no adapter registered for row, skipping"
            );
        }
        adapter
    }

    /// Decode a row on the calling thread, resolving thin rows through single-key retrieval.
    ///
    /// Without a retrieval a thin row is decoded from its (empty) field data as-is.
    pub fn decode_inline(&self, row: &GeoWaveRow, retrieval: Option<&SingleKeyRetrieval>) -> Option<T> {
        let adapter = self.admit(row)?;
        match retrieval {
            Some(retrieval) if row.needs_data_index_lookup() => {
                match retrieval.get_data(row.data_id(), row.adapter_id()) {
                    Some(values) => decode_logged(adapter.as_ref(), row, &values),
                    None => {
                        tracing::debug!(
                            adapter_id = row.adapter_id(),
                            data_id = ?row.data_id(),
                            "no data index record for row"
                        );
                        None
                    }
                }
            }
            _ => decode_logged(adapter.as_ref(), row, row.field_values()),
        }
    }

    /// Decode a row now if it carries its own field data, otherwise request its values from
    /// the batched retrieval and hand back a future for the decoded value.
    pub fn decode_or_defer(&self, row: GeoWaveRow, retrieval: &BatchedRetrieval) -> Decoded<T> {
        let Some(adapter) = self.admit(&row) else {
            return Decoded::Skipped;
        };
        if !row.needs_data_index_lookup() {
            return match decode_logged(adapter.as_ref(), &row, row.field_values()) {
                Some(value) => Decoded::Ready(value),
                None => Decoded::Skipped,
            };
        }

        let lookup = retrieval.get_data_async(row.data_id().clone(), row.adapter_id());
        Decoded::Pending(
            async move {
                let Some(values) = lookup.await else {
                    tracing::debug!(
                        adapter_id = row.adapter_id(),
                        data_id = ?row.data_id(),
                        "no data index record for row"
                    );
                    return None;
                };
                decode_logged(adapter.as_ref(), &row, &values)
            }
            .boxed(),
        )
    }
}

fn decode_logged<T>(adapter: &dyn DataAdapter<T>, row: &GeoWaveRow, values: &[GeoWaveValue]) -> Option<T> {
    match adapter.decode(row, values) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(
                adapter = adapter.type_name(),
                data_id = ?row.data_id(),
                error = %e,
                "failed to decode row, skipping"
            );
            None
        }
    }
}
