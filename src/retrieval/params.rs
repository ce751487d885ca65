//! Parameters applied while resolving data-index values.
//!
//! A scan builds one [`RetrievalParams`] and binds it to its retrieval object before the first
//! lookup. Every fetch issued during that scan receives the same params; backends call
//! [`RetrievalParams::apply`] to honor them.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use bytes::Bytes;
use crate::decoding::adapter_store::DataAdapter;
use crate::row_model::GeoWaveValue;

/// Subset of fields to return for one adapter.
///
/// Field names are resolved to positions through the adapter once, at construction, and kept
/// as a bitmask that is compared against each value's `field_mask`. Names the adapter does
/// not know are dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldProjection {
    adapter_id: i16,
    field_names: BTreeSet<String>,
    mask: Bytes,
}

impl FieldProjection {
    pub fn new<T, S>(field_names: impl IntoIterator<Item = S>, adapter: &dyn DataAdapter<T>) -> Self
    where
        S: Into<String>,
    {
        let field_names: BTreeSet<String> = field_names.into_iter().map(Into::into).collect();
        let mut mask: Vec<u8> = Vec::new();
        for name in &field_names {
            match adapter.field_position(name) {
                Some(position) => {
                    let byte = position / 8;
                    if mask.len() <= byte {
                        mask.resize(byte + 1, 0);
                    }
                    mask[byte] |= 1 << (position % 8);
                }
                None => {
                    tracing::debug!(
                        adapter = adapter.type_name(),
                        field = %name,
                        "projected field is unknown to adapter, ignoring"
                    );
                }
            }
        }
        Self {
            adapter_id: adapter.adapter_id(),
            field_names,
            mask: Bytes::from(mask),
        }
    }

    pub fn adapter_id(&self) -> i16 {
        self.adapter_id
    }

    pub fn field_names(&self) -> &BTreeSet<String> {
        &self.field_names
    }

    pub fn mask(&self) -> &Bytes {
        &self.mask
    }

    /// True if the value covers at least one projected field.
    pub fn selects(&self, value: &GeoWaveValue) -> bool {
        masks_intersect(&self.mask, value.field_mask())
    }
}

fn masks_intersect(left: &[u8], right: &[u8]) -> bool {
    left.iter().zip(right.iter()).any(|(l, r)| l & r != 0)
}

/// Fold applied to one record's field values as they are fetched.
pub trait FieldAggregation: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    fn aggregate(&self, values: Vec<GeoWaveValue>) -> Vec<GeoWaveValue>;
}

/// Aggregation bound to the adapter whose records it folds.
#[derive(Clone)]
pub struct AggregationSpec {
    adapter_id: i16,
    function: Arc<dyn FieldAggregation>,
}

impl AggregationSpec {
    pub fn new(adapter_id: i16, function: Arc<dyn FieldAggregation>) -> Self {
        Self { adapter_id, function }
    }

    pub fn adapter_id(&self) -> i16 {
        self.adapter_id
    }

    pub fn function(&self) -> &Arc<dyn FieldAggregation> {
        &self.function
    }
}

impl fmt::Debug for AggregationSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AggregationSpec")
            .field("adapter_id", &self.adapter_id)
            .field("function", &self.function.name())
            .finish()
    }
}

/// Optional projection and optional aggregation for one scan.
///
/// The default value requests full, unaggregated records.
///
/// # Examples
///
/// ```
/// use geowave_dataindex::{GeoWaveValue, RetrievalParams};
///
/// let params = RetrievalParams::default();
/// let values = vec![GeoWaveValue::new(vec![1u8], Vec::new(), b"a".to_vec())];
/// assert_eq!(params.apply(7, values.clone()), values);
/// ```
#[derive(Debug, Clone, Default)]
pub struct RetrievalParams {
    projection: Option<FieldProjection>,
    aggregation: Option<AggregationSpec>,
}

impl RetrievalParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_projection(mut self, projection: FieldProjection) -> Self {
        self.projection = Some(projection);
        self
    }

    pub fn with_aggregation(mut self, aggregation: AggregationSpec) -> Self {
        self.aggregation = Some(aggregation);
        self
    }

    pub fn projection(&self) -> Option<&FieldProjection> {
        self.projection.as_ref()
    }

    pub fn aggregation(&self) -> Option<&AggregationSpec> {
        self.aggregation.as_ref()
    }

    /// Apply projection, then aggregation, to one record's values.
    ///
    /// Each step only applies when it was built for `adapter_id`; records of other adapters
    /// pass through untouched.
    pub fn apply(&self, adapter_id: i16, values: Vec<GeoWaveValue>) -> Vec<GeoWaveValue> {
        let values = match &self.projection {
            Some(projection) if projection.adapter_id == adapter_id => values
                .into_iter()
                .filter(|value| projection.selects(value))
                .collect(),
            _ => values,
        };
        match &self.aggregation {
            Some(aggregation) if aggregation.adapter_id == adapter_id => {
                aggregation.function.aggregate(values)
            }
            _ => values,
        }
    }
}
