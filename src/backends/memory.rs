//! In-process data index.
//!
//! Records live in a hash map keyed by adapter, then data id. Useful as a stand-in backend for
//! tests and for small embedded stores; it implements both lookup styles and can simulate
//! fetch latency so batching behaves as it would against remote storage.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use async_trait::async_trait;
use bytes::Bytes;
use hashbrown::HashMap;
use crate::error::Result;
use crate::retrieval::params::RetrievalParams;
use crate::retrieval::{MultiKeyFetch, SingleKeyFetch};
use crate::row_model::{GeoWaveRow, GeoWaveValue};

type AdapterRecords = HashMap<Bytes, Vec<GeoWaveValue>>;

/// Hash-map backed data index.
///
/// # Examples
///
/// ```
/// use geowave_dataindex::{GeoWaveValue, MemoryDataIndex, RetrievalParams, SingleKeyFetch};
///
/// let index = MemoryDataIndex::new();
/// index.insert(7, b"feature-1".to_vec(), vec![GeoWaveValue::new(vec![1u8], Vec::new(), b"v".to_vec())]);
///
/// let found = index.fetch(b"feature-1", 7, &RetrievalParams::default()).unwrap();
/// assert_eq!(found.map(|values| values.len()), Some(1));
/// assert!(index.fetch(b"feature-1", 8, &RetrievalParams::default()).unwrap().is_none());
/// ```
#[derive(Default)]
pub struct MemoryDataIndex {
    records: RwLock<HashMap<i16, AdapterRecords>>,
    fetch_latency: Option<Duration>,
    batch_fetches: AtomicUsize,
}

impl MemoryDataIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every multi-key fetch by `latency`, as a remote store would.
    pub fn with_fetch_latency(mut self, latency: Duration) -> Self {
        self.fetch_latency = Some(latency);
        self
    }

    /// Store (or replace) a record, returning the previous values.
    pub fn insert(
        &self,
        adapter_id: i16,
        data_id: impl Into<Bytes>,
        values: Vec<GeoWaveValue>,
    ) -> Option<Vec<GeoWaveValue>> {
        write_records(&self.records)
            .entry(adapter_id)
            .or_default()
            .insert(data_id.into(), values)
    }

    /// Store a data-index row's payload under its data id.
    pub fn insert_row(&self, row: &GeoWaveRow) -> Option<Vec<GeoWaveValue>> {
        self.insert(row.adapter_id(), row.data_id().clone(), row.field_values().to_vec())
    }

    pub fn remove(&self, adapter_id: i16, data_id: &[u8]) -> Option<Vec<GeoWaveValue>> {
        write_records(&self.records)
            .get_mut(&adapter_id)
            .and_then(|records| records.remove(data_id))
    }

    /// Total records across all adapters.
    pub fn len(&self) -> usize {
        read_records(&self.records).values().map(|records| records.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of multi-key fetches served so far.
    pub fn batch_fetches(&self) -> usize {
        self.batch_fetches.load(Ordering::Acquire)
    }

    /// Full data-index rows for one adapter, ordered by data id.
    pub fn scan_adapter(&self, adapter_id: i16) -> Vec<GeoWaveRow> {
        let records = read_records(&self.records);
        let mut rows: Vec<GeoWaveRow> = records
            .get(&adapter_id)
            .map(|records| {
                records
                    .iter()
                    .map(|(data_id, values)| GeoWaveRow::data_index_row(data_id.clone(), adapter_id, values.clone()))
                    .collect()
            })
            .unwrap_or_default();
        rows.sort_by(|a, b| a.data_id().cmp(b.data_id()));
        rows
    }

    fn lookup(
        records: &HashMap<i16, AdapterRecords>,
        data_id: &[u8],
        adapter_id: i16,
        params: &RetrievalParams,
    ) -> Option<Vec<GeoWaveValue>> {
        records
            .get(&adapter_id)
            .and_then(|records| records.get(data_id))
            .map(|values| params.apply(adapter_id, values.clone()))
    }
}

impl SingleKeyFetch for MemoryDataIndex {
    fn fetch(
        &self,
        data_id: &[u8],
        adapter_id: i16,
        params: &RetrievalParams,
    ) -> Result<Option<Vec<GeoWaveValue>>> {
        Ok(Self::lookup(&read_records(&self.records), data_id, adapter_id, params))
    }
}

#[async_trait]
impl MultiKeyFetch for MemoryDataIndex {
    async fn fetch_batch(
        &self,
        data_ids: &[Bytes],
        adapter_id: i16,
        params: &RetrievalParams,
    ) -> Result<Vec<Option<Vec<GeoWaveValue>>>> {
        self.batch_fetches.fetch_add(1, Ordering::AcqRel);
        if let Some(latency) = self.fetch_latency {
            tokio::time::sleep(latency).await;
        }
        let records = read_records(&self.records);
        Ok(data_ids
            .iter()
            .map(|data_id| Self::lookup(&records, data_id, adapter_id, params))
            .collect())
    }
}

fn read_records(records: &RwLock<HashMap<i16, AdapterRecords>>) -> RwLockReadGuard<'_, HashMap<i16, AdapterRecords>> {
    records.read().unwrap_or_else(PoisonError::into_inner)
}

fn write_records(records: &RwLock<HashMap<i16, AdapterRecords>>) -> RwLockWriteGuard<'_, HashMap<i16, AdapterRecords>> {
    records.write().unwrap_or_else(PoisonError::into_inner)
}
