//! Inline, one-key-at-a-time data-index retrieval.

use std::sync::Arc;
use once_cell::sync::OnceCell;
use crate::error::{Result, RetrievalError};
use crate::retrieval::SingleKeyFetch;
use crate::retrieval::params::RetrievalParams;
use crate::row_model::GeoWaveValues;

/// Synchronous fallback used when batching is disabled.
///
/// Each call blocks on the backend's point lookup. There is no locking here; the injected
/// fetch owns its own thread safety.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use geowave_dataindex::{GeoWaveValue, Result, RetrievalParams, SingleKeyRetrieval};
///
/// let retrieval = SingleKeyRetrieval::new(Arc::new(
///     |data_id: &[u8], _adapter_id: i16, _params: &RetrievalParams| -> Result<Option<Vec<GeoWaveValue>>> {
///         Ok((data_id == b"known").then(|| vec![GeoWaveValue::new(vec![1u8], Vec::new(), b"v".to_vec())]))
///     },
/// ));
/// retrieval.set_params(RetrievalParams::default()).unwrap();
///
/// assert!(retrieval.get_data(b"known", 1).is_some());
/// assert!(retrieval.get_data(b"unknown", 1).is_none());
/// ```
pub struct SingleKeyRetrieval {
    fetcher: Arc<dyn SingleKeyFetch>,
    params: OnceCell<Arc<RetrievalParams>>,
}

impl SingleKeyRetrieval {
    pub fn new(fetcher: Arc<dyn SingleKeyFetch>) -> Self {
        Self {
            fetcher,
            params: OnceCell::new(),
        }
    }

    /// Bind params for the lifetime of this retrieval.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::ParamsAlreadyBound`] if params were already bound, or if a
    /// lookup already ran with the default params.
    pub fn set_params(&self, params: RetrievalParams) -> Result<()> {
        self.params
            .set(Arc::new(params))
            .map_err(|_| RetrievalError::ParamsAlreadyBound)
    }

    /// Bound params, or unprojected defaults if none were bound before first use.
    pub fn params(&self) -> Arc<RetrievalParams> {
        Arc::clone(self.params.get_or_init(|| Arc::new(RetrievalParams::default())))
    }

    /// Look up one record.
    ///
    /// Returns `None` when the backend has no record for the key. A failing fetch is logged
    /// and also reported as `None`.
    pub fn get_data(&self, data_id: &[u8], adapter_id: i16) -> Option<GeoWaveValues> {
        let params = self.params();
        match self.fetcher.fetch(data_id, adapter_id, &params) {
            Ok(values) => values.map(GeoWaveValues::from),
            Err(e) => {
                tracing::warn!(
                    adapter_id,
                    data_id = ?data_id,
                    error = %e,
                    "data index lookup failed, treating record as missing"
                );
                None
            }
        }
    }
}
