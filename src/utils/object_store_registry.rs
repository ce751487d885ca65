use std::sync::Arc;
use dashmap::DashMap;
use object_store::memory::InMemory;
use object_store::{ObjectStore, aws::AmazonS3Builder, local::LocalFileSystem, path::Path as ObjectPath};
use url::Url;
use crate::error::{Result, RetrievalError};

/// Cache key for S3 stores that distinguishes between authenticated and anonymous access
#[derive(Hash, Eq, PartialEq, Clone, Debug)]
struct S3CacheKey {
    bucket: String,
    anonymous: bool,
}

/// Owned cache of object store clients, one per backing location.
///
/// Creating an S3 store fetches credentials (possibly from the EC2 metadata service), so
/// stores are cached by `(bucket, anonymous)` and reused. In-memory stores are cached by name
/// so that every `memory://name/...` url resolved through the same registry sees the same
/// objects.
///
/// The registry is an ordinary value: a data store constructs one and threads it to whatever
/// opens object-store backed indexes. Two registries never share clients.
///
/// # Credential Management
///
/// S3 stores are built with `AmazonS3Builder::from_env()`, which uses the AWS credential
/// provider chain with automatic refresh for instance roles, ECS task roles, EKS service
/// accounts and SSO sessions. Short-lived STS credentials passed in explicitly are NOT
/// refreshed by a cached store; build a fresh registry when rotating them.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use geowave_dataindex::ObjectStoreRegistry;
///
/// let registry = ObjectStoreRegistry::new();
/// let (first, path) = registry.resolve("memory://scratch/index/7").unwrap();
/// let (second, _) = registry.resolve("memory://scratch/other").unwrap();
///
/// assert!(Arc::ptr_eq(&first, &second));
/// assert_eq!(path.as_ref(), "index/7");
/// ```
#[derive(Default)]
pub struct ObjectStoreRegistry {
    s3_stores: DashMap<S3CacheKey, Arc<dyn ObjectStore>>,
    memory_stores: DashMap<String, Arc<InMemory>>,
}

impl ObjectStoreRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Gets or creates a cached S3 store for the given bucket.
    ///
    /// # Arguments
    ///
    /// * `bucket` - S3 bucket name (without "s3://" prefix)
    /// * `anonymous` - If true, uses unsigned requests (for public buckets)
    ///
    /// # Errors
    ///
    /// Returns an error if the bucket name is invalid or credentials cannot be resolved
    /// (when `anonymous` is false).
    pub fn s3_store(&self, bucket: &str, anonymous: bool) -> Result<Arc<dyn ObjectStore>> {
        let cache_key = S3CacheKey {
            bucket: bucket.to_string(),
            anonymous,
        };
        let store = self
            .s3_stores
            .entry(cache_key)
            .or_try_insert_with(|| create_s3_store(bucket, anonymous))?;
        Ok(Arc::clone(store.value()))
    }

    /// Gets or creates the named in-memory store.
    pub fn memory_store(&self, name: &str) -> Arc<dyn ObjectStore> {
        let store: Arc<InMemory> = Arc::clone(
            self.memory_stores
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(InMemory::new()))
                .value(),
        );
        store
    }

    /// Resolves a location string to a store and a path within it.
    ///
    /// # Supported Formats
    ///
    /// * **S3**: `"s3://bucket/key"` or `"s3://bucket/key?anon=true"` (cached by bucket)
    /// * **Memory**: `"memory://name/key"` (cached by name)
    /// * **Local**: absolute or relative filesystem paths
    ///
    /// # Errors
    ///
    /// Returns an error if a url is malformed or missing its bucket/name, if S3 credentials
    /// cannot be resolved, or if the current directory cannot be determined for a relative
    /// path.
    pub fn resolve(&self, location: &str) -> Result<(Arc<dyn ObjectStore>, ObjectPath)> {
        if location.starts_with("s3://") {
            let url = Url::parse(location)?;
            let bucket = url
                .host_str()
                .ok_or_else(|| RetrievalError::invalid_config("Invalid S3 URL - no bucket specified"))?;
            let key = url.path().trim_start_matches('/');

            let anonymous = url
                .query_pairs()
                .any(|(k, v)| k == "anon" && (v == "true" || v == "1"));

            let store = self.s3_store(bucket, anonymous)?;
            Ok((store, ObjectPath::from(key)))
        } else if let Some(rest) = location.strip_prefix("memory://") {
            let (name, key) = rest.split_once('/').unwrap_or((rest, ""));
            if name.is_empty() {
                return Err(RetrievalError::invalid_config(
                    "Invalid memory URL - no store name specified",
                ));
            }
            Ok((self.memory_store(name), ObjectPath::from(key)))
        } else {
            resolve_local(location)
        }
    }
}

fn resolve_local(location: &str) -> Result<(Arc<dyn ObjectStore>, ObjectPath)> {
    let path = std::path::Path::new(location);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };

    let object_path = ObjectPath::from_absolute_path(&absolute).map_err(|e| {
        RetrievalError::invalid_config(format!("Invalid local path '{}': {}", location, e))
    })?;
    let store: Arc<dyn ObjectStore> = Arc::new(LocalFileSystem::new());
    Ok((store, object_path))
}

/// Creates an S3 `ObjectStore` for a bucket.
///
/// Credentials are resolved with `from_env()`: environment variables, the credentials file,
/// then instance/task/pod roles and SSO sessions.
fn create_s3_store(bucket: &str, anonymous: bool) -> Result<Arc<dyn ObjectStore>> {
    let mut builder = AmazonS3Builder::from_env().with_bucket_name(bucket);

    if anonymous {
        // Skip credential loading and request signing for public buckets
        builder = builder.with_skip_signature(true);
    }

    let s3_store = builder.build()?;
    Ok(Arc::new(s3_store))
}
