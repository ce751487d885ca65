//! Data-index retrieval: resolving `(data_id, adapter_id)` keys into field values.
//!
//! Two implementations share the same parameter binding:
//!
//! - [`single_key::SingleKeyRetrieval`] calls a backend's point lookup inline, one key at a
//!   time.
//! - [`batched::BatchedRetrieval`] buffers keys per adapter and resolves them with one
//!   multi-key fetch per batch on a background task, handing callers futures.
//!
//! Backends plug in through [`SingleKeyFetch`] and [`MultiKeyFetch`].

pub mod batched;
pub mod params;
pub mod single_key;


use std::sync::Arc;
use async_trait::async_trait;
use bytes::Bytes;
use tokio::runtime::Handle;
use crate::config::RetrievalConfig;
use crate::error::Result;
use crate::retrieval::batched::BatchedRetrieval;
use crate::retrieval::params::RetrievalParams;
use crate::retrieval::single_key::SingleKeyRetrieval;
use crate::row_model::GeoWaveValue;

/// Synchronous point lookup against a data index.
///
/// Returns `Ok(None)` when the backend holds no record for the key.
pub trait SingleKeyFetch: Send + Sync {
    fn fetch(
        &self,
        data_id: &[u8],
        adapter_id: i16,
        params: &RetrievalParams,
    ) -> Result<Option<Vec<GeoWaveValue>>>;
}

impl<F> SingleKeyFetch for F
where
    F: Fn(&[u8], i16, &RetrievalParams) -> Result<Option<Vec<GeoWaveValue>>> + Send + Sync,
{
    fn fetch(
        &self,
        data_id: &[u8],
        adapter_id: i16,
        params: &RetrievalParams,
    ) -> Result<Option<Vec<GeoWaveValue>>> {
        self(data_id, adapter_id, params)
    }
}

/// Multi-key lookup against a data index.
///
/// The returned vector must line up with `data_ids`: element `i` is the record for
/// `data_ids[i]`, or `None` if that key has no record. Batched retrieval matches results to
/// requests purely by position.
#[async_trait]
pub trait MultiKeyFetch: Send + Sync {
    async fn fetch_batch(
        &self,
        data_ids: &[Bytes],
        adapter_id: i16,
        params: &RetrievalParams,
    ) -> Result<Vec<Option<Vec<GeoWaveValue>>>>;
}

/// The retrieval implementation a scan was configured with.
#[derive(Clone)]
pub enum DataIndexRetrieval {
    Single(Arc<SingleKeyRetrieval>),
    Batched(Arc<BatchedRetrieval>),
}

impl DataIndexRetrieval {
    pub fn single(fetcher: Arc<dyn SingleKeyFetch>) -> Self {
        DataIndexRetrieval::Single(Arc::new(SingleKeyRetrieval::new(fetcher)))
    }

    /// # Errors
    ///
    /// Returns [`crate::RetrievalError::InvalidConfig`] if `batch_size` is zero.
    pub fn batched(fetcher: Arc<dyn MultiKeyFetch>, batch_size: usize, runtime: Handle) -> Result<Self> {
        Ok(DataIndexRetrieval::Batched(Arc::new(BatchedRetrieval::new(
            fetcher, batch_size, runtime,
        )?)))
    }

    /// Pick an implementation for a backend that offers both lookup styles.
    ///
    /// Batching is used when the configured batch size is greater than one.
    pub fn for_backend<B>(backend: Arc<B>, config: &RetrievalConfig, runtime: Handle) -> Result<Self>
    where
        B: SingleKeyFetch + MultiKeyFetch + 'static,
    {
        config.validate()?;
        if config.batching_enabled() {
            Self::batched(backend, config.batch_size, runtime)
        } else {
            Ok(Self::single(backend))
        }
    }

    /// Bind the params every lookup of this scan uses. Must be called before the first lookup.
    pub fn set_params(&self, params: RetrievalParams) -> Result<()> {
        match self {
            DataIndexRetrieval::Single(retrieval) => retrieval.set_params(params),
            DataIndexRetrieval::Batched(retrieval) => retrieval.set_params(params),
        }
    }

    pub fn supports_batching(&self) -> bool {
        matches!(self, DataIndexRetrieval::Batched(_))
    }
}
