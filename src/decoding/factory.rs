//! Chooses the decoding iterator that matches a scan's retrieval.

use std::sync::Arc;
use crate::config::RetrievalConfig;
use crate::decoding::adapter_store::AdapterStore;
use crate::decoding::async_iterator::AsyncDecodingIterator;
use crate::decoding::row_decoder::{QueryFilter, RowDecoder};
use crate::decoding::sync_iterator::SyncDecodingIterator;
use crate::error::{Result, RetrievalError};
use crate::retrieval::DataIndexRetrieval;
use crate::row_model::GeoWaveRow;

/// Either decoding iterator behind one type. Callers see the same pull contract regardless of
/// which path is active.
pub enum DecodingIterator<T, I: Iterator<Item = GeoWaveRow>> {
    Sync(SyncDecodingIterator<T, I>),
    Async(AsyncDecodingIterator<T, I>),
}

impl<T, I> DecodingIterator<T, I>
where
    T: Send + 'static,
    I: Iterator<Item = GeoWaveRow>,
{
    pub fn has_next(&mut self) -> bool {
        match self {
            DecodingIterator::Sync(iter) => iter.has_next(),
            DecodingIterator::Async(iter) => iter.has_next(),
        }
    }

    pub fn is_async(&self) -> bool {
        matches!(self, DecodingIterator::Async(_))
    }
}

impl<T, I> Iterator for DecodingIterator<T, I>
where
    T: Send + 'static,
    I: Iterator<Item = GeoWaveRow>,
{
    type Item = T;

    fn next(&mut self) -> Option<T> {
        match self {
            DecodingIterator::Sync(iter) => iter.next(),
            DecodingIterator::Async(iter) => iter.next(),
        }
    }
}

/// Wrap a row source in the iterator its retrieval calls for.
///
/// Batched retrieval gets the asynchronous iterator; single-key or no retrieval gets the
/// inline one.
///
/// # Errors
///
/// Returns [`RetrievalError::InvalidConfig`] if a batched retrieval runs on a current-thread
/// runtime (see [`AsyncDecodingIterator::new`]).
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use geowave_dataindex::{
///     decoding_iterator, AdapterStore, DataAdapter, GeoWaveRow, GeoWaveValue, Result,
///     RetrievalConfig,
/// };
///
/// struct Payloads;
///
/// impl DataAdapter<Vec<u8>> for Payloads {
///     fn adapter_id(&self) -> i16 { 1 }
///     fn type_name(&self) -> &str { "payloads" }
///     fn decode(&self, _row: &GeoWaveRow, values: &[GeoWaveValue]) -> Result<Vec<u8>> {
///         Ok(values.iter().flat_map(|v| v.value().to_vec()).collect())
///     }
/// }
///
/// let store: Arc<AdapterStore<Vec<u8>>> = Arc::new(AdapterStore::new());
/// store.add_adapter(Arc::new(Payloads));
///
/// let rows = vec![GeoWaveRow::data_index_row(
///     b"a".to_vec(),
///     1,
///     vec![GeoWaveValue::new(vec![1u8], Vec::new(), b"xyz".to_vec())],
/// )];
///
/// let iter = decoding_iterator(rows, store, Vec::new(), None, &RetrievalConfig::default())?;
/// assert!(!iter.is_async());
/// assert_eq!(iter.collect::<Vec<_>>(), vec![b"xyz".to_vec()]);
/// # Ok::<(), geowave_dataindex::RetrievalError>(())
/// ```
pub fn decoding_iterator<T, S>(
    source: S,
    adapter_store: Arc<AdapterStore<T>>,
    filters: Vec<Arc<dyn QueryFilter>>,
    retrieval: Option<&DataIndexRetrieval>,
    config: &RetrievalConfig,
) -> Result<DecodingIterator<T, S::IntoIter>>
where
    T: Send + 'static,
    S: IntoIterator<Item = GeoWaveRow>,
{
    let decoder = RowDecoder::new(adapter_store, filters);
    Ok(match retrieval {
        Some(DataIndexRetrieval::Batched(batched)) => DecodingIterator::Async(AsyncDecodingIterator::new(
            source.into_iter(),
            decoder,
            Arc::clone(batched),
            config.completion_queue_capacity,
        )?),
        Some(DataIndexRetrieval::Single(single)) => DecodingIterator::Sync(SyncDecodingIterator::new(
            source.into_iter(),
            decoder,
            Some(Arc::clone(single)),
        )),
        None => DecodingIterator::Sync(SyncDecodingIterator::new(source.into_iter(), decoder, None)),
    })
}
