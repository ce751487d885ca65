//! Adapter registry used to decode rows.
//!
//! An adapter knows how one record type is laid out in [`GeoWaveValue`]s and turns a row plus
//! its field values into a domain value. The store is an explicitly constructed object that a
//! scan is handed, rather than a process-wide cache, so independent scans (and tests) never
//! see each other's registrations.

use std::sync::Arc;
use dashmap::DashMap;
use crate::error::Result;
use crate::row_model::{GeoWaveRow, GeoWaveValue};

/// Per-record-type decoder.
///
/// Implementations must be thread safe: deferred rows are decoded on the runtime thread that
/// resolved their data-index lookup, not on the scanning thread.
pub trait DataAdapter<T>: Send + Sync {
    /// Id stamped on every row of this type.
    fn adapter_id(&self) -> i16;

    /// Human readable type name, used in logs.
    fn type_name(&self) -> &str;

    /// Position of a named field in the field bitmask, if the adapter knows the field.
    fn field_position(&self, _field_name: &str) -> Option<usize> {
        None
    }

    /// Materialize a domain value.
    ///
    /// `field_values` is either the row's own field data or the values fetched from the data
    /// index for the row's data id.
    fn decode(&self, row: &GeoWaveRow, field_values: &[GeoWaveValue]) -> Result<T>;
}

/// Concurrent `adapter_id -> adapter` registry.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use geowave_dataindex::{AdapterStore, DataAdapter, GeoWaveRow, GeoWaveValue, Result};
///
/// struct Names;
///
/// impl DataAdapter<String> for Names {
///     fn adapter_id(&self) -> i16 { 3 }
///     fn type_name(&self) -> &str { "names" }
///     fn decode(&self, row: &GeoWaveRow, _values: &[GeoWaveValue]) -> Result<String> {
///         Ok(String::from_utf8_lossy(row.data_id()).into_owned())
///     }
/// }
///
/// let store: AdapterStore<String> = AdapterStore::new();
/// store.add_adapter(Arc::new(Names));
/// assert!(store.get_adapter(3).is_some());
/// assert!(store.get_adapter(4).is_none());
/// ```
pub struct AdapterStore<T> {
    adapters: DashMap<i16, Arc<dyn DataAdapter<T>>>,
}

impl<T> Default for AdapterStore<T> {
    fn default() -> Self {
        Self {
            adapters: DashMap::new(),
        }
    }
}

impl<T> AdapterStore<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter under its own id, returning the adapter it replaced.
    pub fn add_adapter(&self, adapter: Arc<dyn DataAdapter<T>>) -> Option<Arc<dyn DataAdapter<T>>> {
        self.adapters.insert(adapter.adapter_id(), adapter)
    }

    pub fn get_adapter(&self, adapter_id: i16) -> Option<Arc<dyn DataAdapter<T>>> {
        self.adapters.get(&adapter_id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn remove_adapter(&self, adapter_id: i16) -> Option<Arc<dyn DataAdapter<T>>> {
        self.adapters.remove(&adapter_id).map(|(_, adapter)| adapter)
    }

    /// Registered ids in ascending order.
    pub fn adapter_ids(&self) -> Vec<i16> {
        let mut ids: Vec<i16> = self.adapters.iter().map(|entry| *entry.key()).collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}
