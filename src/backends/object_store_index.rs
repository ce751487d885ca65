//! Data index stored as one object per record.
//!
//! # Layout
//!
//! ```text
//! <root>/
//! ├── 7/                       (adapter id)
//! │   ├── 66656174757265.bin   (hex-encoded data id)
//! │   └── ...
//! └── 12/
//!     └── ...
//! ```
//!
//! Each object is an rkyv-serialized `Vec` of field values. Works against anything the
//! [`ObjectStoreRegistry`] resolves: S3, local disk, or named in-memory stores.

use std::sync::Arc;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use object_store::ObjectStore;
use object_store::path::Path as ObjectPath;
use rkyv::rancor::Error as RkyvError;
use rkyv::util::AlignedVec;
use rkyv::{Archive, Archived, Deserialize as RkyvDeserialize, Serialize as RkyvSerialize, to_bytes};
use crate::config::RetrievalConfig;
use crate::error::{Result, RetrievalError};
use crate::retrieval::MultiKeyFetch;
use crate::retrieval::params::RetrievalParams;
use crate::row_model::{GeoWaveRow, GeoWaveValue};
use crate::utils::object_store_registry::ObjectStoreRegistry;

const RECORD_EXTENSION: &str = "bin";

#[derive(Archive, RkyvSerialize, RkyvDeserialize, Debug)]
struct StoredValue {
    field_mask: Vec<u8>,
    visibility: Vec<u8>,
    value: Vec<u8>,
}

/// Object-store backed data index.
///
/// # Examples
///
/// ```no_run
/// use geowave_dataindex::{GeoWaveValue, ObjectStoreDataIndex, ObjectStoreRegistry, RetrievalConfig};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
///     let registry = ObjectStoreRegistry::new();
///     let index = ObjectStoreDataIndex::open("s3://my-bucket/data-index", &registry, &RetrievalConfig::default())?;
///
///     index.put(7, b"feature-1", &[GeoWaveValue::new(vec![1u8], Vec::new(), b"payload".to_vec())]).await?;
///     let values = index.get(7, b"feature-1").await?;
///     println!("found: {}", values.is_some());
///     Ok(())
/// }
/// ```
pub struct ObjectStoreDataIndex {
    store: Arc<dyn ObjectStore>,
    root: ObjectPath,
    fetch_concurrency: usize,
}

impl ObjectStoreDataIndex {
    pub fn new(store: Arc<dyn ObjectStore>, root: ObjectPath, fetch_concurrency: usize) -> Self {
        Self {
            store,
            root,
            fetch_concurrency: fetch_concurrency.max(1),
        }
    }

    /// Open the data index rooted at `location` (see [`ObjectStoreRegistry::resolve`]).
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the location cannot be resolved.
    pub fn open(location: &str, registry: &ObjectStoreRegistry, config: &RetrievalConfig) -> Result<Self> {
        config.validate()?;
        let (store, root) = registry.resolve(location)?;
        Ok(Self::new(store, root, config.object_fetch_concurrency))
    }

    fn record_path(&self, adapter_id: i16, data_id: &[u8]) -> ObjectPath {
        self.root
            .child(adapter_id.to_string())
            .child(format!("{}.{}", hex_encode(data_id), RECORD_EXTENSION))
    }

    /// Write (or overwrite) one record.
    pub async fn put(&self, adapter_id: i16, data_id: &[u8], values: &[GeoWaveValue]) -> Result<()> {
        let payload = encode_values(values)?;
        self.store.put(&self.record_path(adapter_id, data_id), payload.into()).await?;
        Ok(())
    }

    /// Write a data-index row's payload under its data id.
    pub async fn put_row(&self, row: &GeoWaveRow) -> Result<()> {
        self.put(row.adapter_id(), row.data_id(), row.field_values()).await
    }

    /// Read one record; `None` if no object exists for the key.
    pub async fn get(&self, adapter_id: i16, data_id: &[u8]) -> Result<Option<Vec<GeoWaveValue>>> {
        match self.store.get(&self.record_path(adapter_id, data_id)).await {
            Ok(result) => {
                let bytes = result.bytes().await?;
                Ok(Some(decode_values(&bytes)?))
            }
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn delete(&self, adapter_id: i16, data_id: &[u8]) -> Result<()> {
        match self.store.delete(&self.record_path(adapter_id, data_id)).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl MultiKeyFetch for ObjectStoreDataIndex {
    /// Reads up to `fetch_concurrency` objects at a time. `buffered` yields in input order, so
    /// results line up with `data_ids`.
    ///
    /// A record that cannot be read or deserialized is logged and resolves to `None` on its
    /// own; the rest of the batch is unaffected.
    async fn fetch_batch(
        &self,
        data_ids: &[Bytes],
        adapter_id: i16,
        params: &RetrievalParams,
    ) -> Result<Vec<Option<Vec<GeoWaveValue>>>> {
        let records: Vec<Option<Vec<GeoWaveValue>>> = stream::iter(data_ids.iter().cloned())
            .map(|data_id| async move {
                match self.get(adapter_id, &data_id).await {
                    Ok(record) => record,
                    Err(e) => {
                        tracing::warn!(
                            adapter_id,
                            data_id = ?data_id,
                            error = %e,
                            "failed to read data index record"
                        );
                        None
                    }
                }
            })
            .buffered(self.fetch_concurrency)
            .collect()
            .await;
        Ok(records
            .into_iter()
            .map(|record| record.map(|values| params.apply(adapter_id, values)))
            .collect())
    }
}

fn encode_values(values: &[GeoWaveValue]) -> Result<Bytes> {
    let stored: Vec<StoredValue> = values
        .iter()
        .map(|value| StoredValue {
            field_mask: value.field_mask().to_vec(),
            visibility: value.visibility().to_vec(),
            value: value.value().to_vec(),
        })
        .collect();
    let encoded = to_bytes::<RkyvError>(&stored)?;
    Ok(Bytes::copy_from_slice(&encoded))
}

fn decode_values(bytes: &[u8]) -> Result<Vec<GeoWaveValue>> {
    // Object bodies carry no alignment guarantee
    let mut aligned = AlignedVec::<16>::new();
    aligned.extend_from_slice(bytes);

    let archived: &Archived<Vec<StoredValue>> = rkyv::access(&aligned)
        .map_err(|e: RkyvError| RetrievalError::Serialization(format!("Failed to access stored record: {}", e)))?;

    Ok(archived
        .iter()
        .map(|value| GeoWaveValue::new(value.field_mask.to_vec(), value.visibility.to_vec(), value.value.to_vec()))
        .collect())
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
