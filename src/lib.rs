//! GeoWave Data Index - Batched Retrieval and Row Decoding
//!
//! Primary spatial/temporal indexes are kept thin: their rows carry only the keys that
//! identify a record, so range scans stay compact. The record's field values live in a
//! separate data index keyed by `(data_id, adapter_id)`. Turning a scanned index row into a
//! full record therefore needs a second lookup, and doing that lookup row by row would put a
//! storage round trip in front of every decode.
//!
//! # Overview
//!
//! This library provides:
//! - **Batched Retrieval**: lookups are buffered per adapter and resolved with one multi-key
//!   fetch per batch, on a background task
//! - **Async Row Decoding**: a pull iterator that emits self-contained rows immediately and
//!   merges deferred rows in as their batches resolve
//! - **Single-Key Fallback**: inline point lookups when batching is disabled
//! - **Reference Backends**: in-memory and object-store (S3, local, memory) data indexes
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use geowave_dataindex::{
//!     decoding_iterator, AdapterStore, DataAdapter, DataIndexRetrieval, GeoWaveRow,
//!     GeoWaveValue, MemoryDataIndex, Result, RetrievalConfig, RetrievalParams,
//! };
//!
//! struct Features;
//!
//! impl DataAdapter<String> for Features {
//!     fn adapter_id(&self) -> i16 { 7 }
//!     fn type_name(&self) -> &str { "features" }
//!     fn decode(&self, row: &GeoWaveRow, values: &[GeoWaveValue]) -> Result<String> {
//!         Ok(format!("{:?}: {} fields", row.data_id(), values.len()))
//!     }
//! }
//!
//! fn main() -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let runtime = tokio::runtime::Runtime::new()?;
//!     let backend = Arc::new(MemoryDataIndex::new());
//!     let config = RetrievalConfig::default();
//!
//!     let retrieval = DataIndexRetrieval::for_backend(backend, &config, runtime.handle().clone())?;
//!     retrieval.set_params(RetrievalParams::default())?;
//!
//!     let adapters: Arc<AdapterStore<String>> = Arc::new(AdapterStore::new());
//!     adapters.add_adapter(Arc::new(Features));
//!
//!     // Thin rows from a primary index scan
//!     let rows = (0..10u8).map(|i| GeoWaveRow::primary_index_row(vec![0u8], vec![i], vec![i], 7));
//!
//!     for feature in decoding_iterator(rows, adapters, Vec::new(), Some(&retrieval), &config)? {
//!         println!("{}", feature);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Threading
//!
//! Decoding iterators are blocking pull iterators. Fetches and deferred decodes run on the
//! tokio runtime handed to the retrieval, while the iterator itself should be driven from a
//! plain thread or `spawn_blocking`. That runtime must be multi-threaded: a current-thread
//! runtime is not driven while an iterator blocks, so the factory rejects it. Many iterators, on many threads, may share one
//! [`BatchedRetrieval`].
//!
//! # Failure Handling
//!
//! A failed fetch, a short fetch result, or a row that fails to decode never aborts a scan:
//! the affected rows are logged through `tracing` and left out of the results.

pub mod backends;
pub mod config;
pub mod decoding;
pub mod error;
pub mod retrieval;
pub mod row_model;
pub mod utils;

pub use crate::backends::memory::MemoryDataIndex;
pub use crate::backends::object_store_index::ObjectStoreDataIndex;
pub use crate::config::{
    RetrievalConfig, DEFAULT_COMPLETION_QUEUE_CAPACITY, DEFAULT_DATA_INDEX_BATCH_SIZE,
    DEFAULT_OBJECT_FETCH_CONCURRENCY,
};
pub use crate::decoding::adapter_store::{AdapterStore, DataAdapter};
pub use crate::decoding::async_iterator::AsyncDecodingIterator;
pub use crate::decoding::factory::{decoding_iterator, DecodingIterator};
pub use crate::decoding::row_decoder::{Decoded, QueryFilter, RowDecoder};
pub use crate::decoding::sync_iterator::SyncDecodingIterator;
pub use crate::error::{Result, RetrievalError};
pub use crate::retrieval::batched::{BatchedRetrieval, DataIndexFuture};
pub use crate::retrieval::params::{AggregationSpec, FieldAggregation, FieldProjection, RetrievalParams};
pub use crate::retrieval::single_key::SingleKeyRetrieval;
pub use crate::retrieval::{DataIndexRetrieval, MultiKeyFetch, SingleKeyFetch};
pub use crate::row_model::{GeoWaveRow, GeoWaveValue, GeoWaveValues};
pub use crate::utils::object_store_registry::ObjectStoreRegistry;
