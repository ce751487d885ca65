//! Pure data structures for scanned index rows and their field payloads.
//!
//! These types carry no retrieval logic. A [`GeoWaveRow`] is produced by a backend scan and
//! discarded once decoded; a [`GeoWaveValue`] is one field's stored payload, opaque to
//! everything except the adapter that wrote it.
//!
//! # Type Hierarchy
//!
//! ```text
//! GeoWaveRow
//! ├── partition_key: Bytes
//! ├── sort_key: Bytes
//! ├── data_id: Bytes          (unique within an adapter)
//! ├── adapter_id: i16         (record type)
//! ├── duplicate_count: i32
//! └── field_values: Vec<GeoWaveValue>
//!     ├── field_mask: Bytes   (which logical fields)
//!     ├── visibility: Bytes   (access-control label)
//!     └── value: Bytes        (encoded payload)
//! ```
//!
//! Rows read from a data index hold the complete payload. Rows read from a primary index
//! under secondary indexing are thin: `field_values` is empty and the payload has to be
//! fetched by `(data_id, adapter_id)`.

use bytes::Bytes;
use std::sync::Arc;

/// Resolved field values for one record, shared between every caller waiting on the same key.
pub type GeoWaveValues = Arc<[GeoWaveValue]>;

/// One field's stored payload.
///
/// # Examples
///
/// ```
/// use geowave_dataindex::GeoWaveValue;
///
/// let value = GeoWaveValue::new(vec![0b0000_0011], Vec::new(), b"POINT(1 2)".to_vec());
/// assert_eq!(value.value().as_ref(), b"POINT(1 2)");
/// assert!(value.visibility().is_empty());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GeoWaveValue {
    field_mask: Bytes,
    visibility: Bytes,
    value: Bytes,
}

impl GeoWaveValue {
    pub fn new(
        field_mask: impl Into<Bytes>,
        visibility: impl Into<Bytes>,
        value: impl Into<Bytes>,
    ) -> Self {
        Self {
            field_mask: field_mask.into(),
            visibility: visibility.into(),
            value: value.into(),
        }
    }

    /// Bitmask of the logical field positions this value covers.
    pub fn field_mask(&self) -> &Bytes {
        &self.field_mask
    }

    pub fn visibility(&self) -> &Bytes {
        &self.visibility
    }

    pub fn value(&self) -> &Bytes {
        &self.value
    }
}

/// A scanned index entry.
///
/// # Examples
///
/// ```
/// use geowave_dataindex::{GeoWaveRow, GeoWaveValue};
///
/// // Thin primary-index row: payload lives in the data index
/// let thin = GeoWaveRow::primary_index_row(vec![1u8], vec![2u8, 3], b"feature-1".to_vec(), 7);
/// assert!(thin.needs_data_index_lookup());
///
/// // Data-index row: payload travels with the row
/// let full = GeoWaveRow::data_index_row(
///     b"feature-1".to_vec(),
///     7,
///     vec![GeoWaveValue::new(vec![1u8], Vec::new(), b"payload".to_vec())],
/// );
/// assert!(!full.needs_data_index_lookup());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeoWaveRow {
    partition_key: Bytes,
    sort_key: Bytes,
    data_id: Bytes,
    adapter_id: i16,
    duplicate_count: i32,
    field_values: Vec<GeoWaveValue>,
}

impl GeoWaveRow {
    pub fn new(
        partition_key: impl Into<Bytes>,
        sort_key: impl Into<Bytes>,
        data_id: impl Into<Bytes>,
        adapter_id: i16,
        duplicate_count: i32,
        field_values: Vec<GeoWaveValue>,
    ) -> Self {
        Self {
            partition_key: partition_key.into(),
            sort_key: sort_key.into(),
            data_id: data_id.into(),
            adapter_id,
            duplicate_count,
            field_values,
        }
    }

    /// Row as produced by a primary index scan under secondary indexing: keys only.
    pub fn primary_index_row(
        partition_key: impl Into<Bytes>,
        sort_key: impl Into<Bytes>,
        data_id: impl Into<Bytes>,
        adapter_id: i16,
    ) -> Self {
        Self::new(partition_key, sort_key, data_id, adapter_id, 0, Vec::new())
    }

    /// Row as produced by a data index scan. The data id doubles as the sort key and there is
    /// no partitioning.
    pub fn data_index_row(
        data_id: impl Into<Bytes>,
        adapter_id: i16,
        field_values: Vec<GeoWaveValue>,
    ) -> Self {
        let data_id = data_id.into();
        Self::new(Bytes::new(), data_id.clone(), data_id, adapter_id, 0, field_values)
    }

    pub fn partition_key(&self) -> &Bytes {
        &self.partition_key
    }

    pub fn sort_key(&self) -> &Bytes {
        &self.sort_key
    }

    pub fn data_id(&self) -> &Bytes {
        &self.data_id
    }

    pub fn adapter_id(&self) -> i16 {
        self.adapter_id
    }

    pub fn duplicate_count(&self) -> i32 {
        self.duplicate_count
    }

    pub fn field_values(&self) -> &[GeoWaveValue] {
        &self.field_values
    }

    /// True when the row carries no field data and must be resolved through the data index.
    pub fn needs_data_index_lookup(&self) -> bool {
        self.field_values.is_empty()
    }
}
