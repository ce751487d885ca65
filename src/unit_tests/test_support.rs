//! Fixtures shared by the unit tests: a feature adapter, row builders, an instrumented
//! multi-key fetcher and a tracing layer that captures log events for assertions.

use std::sync::{Arc, Mutex};
use std::time::Duration;
use async_trait::async_trait;
use bytes::Bytes;
use rand::Rng;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
use crate::backends::memory::MemoryDataIndex;
use crate::decoding::adapter_store::{AdapterStore, DataAdapter};
use crate::error::{Result, RetrievalError};
use crate::retrieval::MultiKeyFetch;
use crate::retrieval::params::RetrievalParams;
use crate::row_model::{GeoWaveRow, GeoWaveValue};

pub const FEATURE_ADAPTER: i16 = 7;
pub const OTHER_ADAPTER: i16 = 12;

pub const GEOMETRY_MASK: u8 = 0b01;
pub const NAME_MASK: u8 = 0b10;

// ============================================================================
// Adapter fixture
// ============================================================================

/// Decoded record: the row's data id plus the concatenated payload of its values.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TestFeature {
    pub id: String,
    pub payload: Vec<u8>,
}

/// Adapter with two fields, `geometry` (bit 0) and `name` (bit 1).
///
/// Rows with no values, or with a value whose payload is `corrupt`, fail to decode.
pub struct FeatureAdapter {
    pub adapter_id: i16,
}

impl DataAdapter<TestFeature> for FeatureAdapter {
    fn adapter_id(&self) -> i16 {
        self.adapter_id
    }

    fn type_name(&self) -> &str {
        "test-feature"
    }

    fn field_position(&self, field_name: &str) -> Option<usize> {
        match field_name {
            "geometry" => Some(0),
            "name" => Some(1),
            _ => None,
        }
    }

    fn decode(&self, row: &GeoWaveRow, field_values: &[GeoWaveValue]) -> Result<TestFeature> {
        if field_values.is_empty() {
            return Err(RetrievalError::decode("row has no field values"));
        }
        if field_values.iter().any(|value| value.value().as_ref() == b"corrupt") {
            return Err(RetrievalError::decode("corrupt field value"));
        }
        Ok(TestFeature {
            id: String::from_utf8_lossy(row.data_id()).into_owned(),
            payload: field_values.iter().flat_map(|value| value.value().to_vec()).collect(),
        })
    }
}

pub fn adapter_store(adapter_ids: &[i16]) -> Arc<AdapterStore<TestFeature>> {
    let store = AdapterStore::new();
    for &adapter_id in adapter_ids {
        store.add_adapter(Arc::new(FeatureAdapter { adapter_id }));
    }
    Arc::new(store)
}

/// Geometry value whose payload identifies the record.
pub fn feature_value(id: &str) -> GeoWaveValue {
    GeoWaveValue::new(vec![GEOMETRY_MASK], Bytes::new(), format!("geom-{}", id).into_bytes())
}

pub fn name_value(id: &str) -> GeoWaveValue {
    GeoWaveValue::new(vec![NAME_MASK], Bytes::new(), format!("name-{}", id).into_bytes())
}

/// The feature every fixture record decodes to when fetched without a projection.
pub fn expected_feature(id: &str) -> TestFeature {
    TestFeature {
        id: id.to_string(),
        payload: format!("geom-{}", id).into_bytes(),
    }
}

/// Primary-index row that must be resolved through the data index.
pub fn thin_row(id: &str, adapter_id: i16) -> GeoWaveRow {
    GeoWaveRow::primary_index_row(vec![0u8], id.as_bytes().to_vec(), id.as_bytes().to_vec(), adapter_id)
}

/// Row that carries its own geometry value.
pub fn full_row(id: &str, adapter_id: i16) -> GeoWaveRow {
    GeoWaveRow::data_index_row(id.as_bytes().to_vec(), adapter_id, vec![feature_value(id)])
}

pub fn key(id: &str) -> Bytes {
    Bytes::copy_from_slice(id.as_bytes())
}

pub fn ids(prefix: &str, count: usize) -> Vec<String> {
    (0..count).map(|i| format!("{}{}", prefix, i)).collect()
}

/// Memory index holding a geometry record for every id.
pub fn populated_index(adapter_id: i16, record_ids: &[String]) -> MemoryDataIndex {
    let index = MemoryDataIndex::new();
    for id in record_ids {
        index.insert(adapter_id, key(id), vec![feature_value(id)]);
    }
    index
}

/// Multi-threaded runtime for tests that drive blocking iterators from the test thread.
pub fn test_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .unwrap()
}

// ============================================================================
// Instrumented fetcher
// ============================================================================

/// How a [`RecordingFetcher`] answers a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchBehavior {
    /// One result per requested key, in order.
    Faithful,
    /// Drop this many trailing results.
    Truncate(usize),
    /// Append this many extra results.
    Surplus(usize),
    /// Fail the whole batch.
    Fail,
}

/// One recorded `fetch_batch` call.
#[derive(Debug, Clone)]
pub struct FetchCall {
    pub adapter_id: i16,
    pub data_ids: Vec<Bytes>,
    pub params: RetrievalParams,
}

/// Memory-backed [`MultiKeyFetch`] that records every batch it is asked for.
pub struct RecordingFetcher {
    records: MemoryDataIndex,
    behavior: FetchBehavior,
    max_latency: Option<Duration>,
    calls: Mutex<Vec<FetchCall>>,
}

impl RecordingFetcher {
    pub fn new(records: MemoryDataIndex, behavior: FetchBehavior) -> Self {
        Self {
            records,
            behavior,
            max_latency: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Sleep a random duration up to `max_latency` before answering each batch.
    pub fn with_random_latency(mut self, max_latency: Duration) -> Self {
        self.max_latency = Some(max_latency);
        self
    }

    pub fn calls(&self) -> Vec<FetchCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Keys of every call, as strings, in call order.
    pub fn batches(&self) -> Vec<Vec<String>> {
        self.calls()
            .iter()
            .map(|call| {
                call.data_ids
                    .iter()
                    .map(|data_id| String::from_utf8_lossy(data_id).into_owned())
                    .collect()
            })
            .collect()
    }
}

#[async_trait]
impl MultiKeyFetch for RecordingFetcher {
    async fn fetch_batch(
        &self,
        data_ids: &[Bytes],
        adapter_id: i16,
        params: &RetrievalParams,
    ) -> Result<Vec<Option<Vec<GeoWaveValue>>>> {
        self.calls.lock().unwrap().push(FetchCall {
            adapter_id,
            data_ids: data_ids.to_vec(),
            params: params.clone(),
        });

        if let Some(max_latency) = self.max_latency {
            let millis = rand::rng().random_range(0..=max_latency.as_millis() as u64);
            tokio::time::sleep(Duration::from_millis(millis)).await;
        }

        if self.behavior == FetchBehavior::Fail {
            return Err(RetrievalError::fetch("storage unavailable"));
        }

        let mut results = self.records.fetch_batch(data_ids, adapter_id, params).await?;
        match self.behavior {
            FetchBehavior::Truncate(n) => results.truncate(results.len().saturating_sub(n)),
            FetchBehavior::Surplus(n) => {
                results.extend((0..n).map(|i| Some(vec![feature_value(&format!("surplus{}", i))])))
            }
            FetchBehavior::Faithful | FetchBehavior::Fail => {}
        }
        Ok(results)
    }
}

// ============================================================================
// Log capture
// ============================================================================

/// A recorded log event.
#[derive(Debug, Clone)]
pub struct CapturedEvent {
    pub level: Level,
    pub message: String,
    pub fields: Vec<(String, String)>,
}

/// Shared storage for captured events.
#[derive(Debug, Clone, Default)]
pub struct EventStore(Arc<Mutex<Vec<CapturedEvent>>>);

impl EventStore {
    pub fn events(&self) -> Vec<CapturedEvent> {
        self.0.lock().unwrap().clone()
    }

    /// Events at `level` whose message contains `needle`.
    pub fn count(&self, level: Level, needle: &str) -> usize {
        self.0
            .lock()
            .unwrap()
            .iter()
            .filter(|event| event.level == level && event.message.contains(needle))
            .count()
    }

    /// Values recorded for field `name` on events at `level`.
    pub fn field_values(&self, level: Level, name: &str) -> Vec<String> {
        self.0
            .lock()
            .unwrap()
            .iter()
            .filter(|event| event.level == level)
            .flat_map(|event| event.fields.iter().filter(|(field, _)| field == name))
            .map(|(_, value)| value.clone())
            .collect()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.0
            .lock()
            .unwrap()
            .iter()
            .filter(|event| event.level == Level::WARN)
            .map(|event| event.message.clone())
            .collect()
    }
}

struct EventCaptureLayer {
    store: EventStore,
}

#[derive(Default)]
struct EventVisitor {
    message: String,
    fields: Vec<(String, String)>,
}

impl tracing::field::Visit for EventVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        let value = format!("{:?}", value);
        if field.name() == "message" {
            self.message = value;
        } else {
            self.fields.push((field.name().to_string(), value));
        }
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.fields.push((field.name().to_string(), value.to_string()));
        }
    }
}

impl<S: Subscriber> Layer<S> for EventCaptureLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = EventVisitor::default();
        event.record(&mut visitor);
        self.store.0.lock().unwrap().push(CapturedEvent {
            level: *event.metadata().level(),
            message: visitor.message,
            fields: visitor.fields,
        });
    }
}

/// Capture log events emitted on the current thread until the guard is dropped.
///
/// Only events from the calling thread are seen, so use it with current-thread runtimes.
pub fn capture_events() -> (EventStore, tracing::subscriber::DefaultGuard) {
    let store = EventStore::default();
    let subscriber = tracing_subscriber::registry().with(EventCaptureLayer { store: store.clone() });
    let guard = tracing::subscriber::set_default(subscriber);
    (store, guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_capture_records_level_and_message() {
        let (store, _guard) = capture_events();
        tracing::warn!(adapter_id = 3, "something went wrong");
        tracing::debug!("detail");

        assert_eq!(store.count(Level::WARN, "went wrong"), 1);
        assert_eq!(store.count(Level::DEBUG, "detail"), 1);
        assert_eq!(store.warnings(), vec!["something went wrong".to_string()]);
        assert_eq!(store.field_values(Level::WARN, "adapter_id"), vec!["3".to_string()]);
    }

    #[test]
    fn test_feature_adapter_rejects_empty_and_corrupt_rows() {
        let adapter = FeatureAdapter { adapter_id: FEATURE_ADAPTER };
        let row = thin_row("a", FEATURE_ADAPTER);
        assert!(adapter.decode(&row, &[]).is_err());

        let corrupt = GeoWaveValue::new(vec![GEOMETRY_MASK], Bytes::new(), b"corrupt".to_vec());
        assert!(adapter.decode(&row, &[corrupt]).is_err());
        assert_eq!(adapter.decode(&row, &[feature_value("a")]).unwrap(), expected_feature("a"));
    }
}
