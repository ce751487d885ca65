//! Tuning knobs for data-index retrieval.
//!
//! Configuration is a plain value object built in code. Loading it from files or the
//! environment belongs to whatever embeds this crate.

use crate::error::{Result, RetrievalError};

/// Number of pending lookups per adapter that triggers a batch fetch.
pub const DEFAULT_DATA_INDEX_BATCH_SIZE: usize = 1000;

/// Capacity of each async iterator's completion queue.
///
/// This is a soft backpressure ceiling; a scan is not expected to reach it.
pub const DEFAULT_COMPLETION_QUEUE_CAPACITY: usize = 1 << 20;

/// Maximum concurrent object reads issued by one object-store batch fetch.
pub const DEFAULT_OBJECT_FETCH_CONCURRENCY: usize = 16;

/// Retrieval configuration shared by a scan.
///
/// # Examples
///
/// ```
/// use geowave_dataindex::RetrievalConfig;
///
/// let config = RetrievalConfig::default().with_batch_size(250);
/// assert!(config.validate().is_ok());
/// assert!(config.batching_enabled());
///
/// let invalid = RetrievalConfig::default().with_batch_size(0);
/// assert!(invalid.validate().is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievalConfig {
    /// Pending lookups per adapter before a size-triggered flush. A value of 1 disables
    /// batching: every lookup is issued inline through single-key retrieval.
    pub batch_size: usize,

    /// Bound of the completion queue owned by each async iterator.
    pub completion_queue_capacity: usize,

    /// Concurrent reads per batch for object-store backed data indexes.
    pub object_fetch_concurrency: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_DATA_INDEX_BATCH_SIZE,
            completion_queue_capacity: DEFAULT_COMPLETION_QUEUE_CAPACITY,
            object_fetch_concurrency: DEFAULT_OBJECT_FETCH_CONCURRENCY,
        }
    }
}

impl RetrievalConfig {
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_completion_queue_capacity(mut self, capacity: usize) -> Self {
        self.completion_queue_capacity = capacity;
        self
    }

    pub fn with_object_fetch_concurrency(mut self, concurrency: usize) -> Self {
        self.object_fetch_concurrency = concurrency;
        self
    }

    /// Whether lookups should go through batched retrieval.
    pub fn batching_enabled(&self) -> bool {
        self.batch_size > 1
    }

    /// Reject values that would stall or panic the pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::InvalidConfig`] if any size is zero.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(RetrievalError::invalid_config("batch_size must be at least 1"));
        }
        if self.completion_queue_capacity == 0 {
            return Err(RetrievalError::invalid_config(
                "completion_queue_capacity must be at least 1",
            ));
        }
        if self.object_fetch_concurrency == 0 {
            return Err(RetrievalError::invalid_config(
                "object_fetch_concurrency must be at least 1",
            ));
        }
        Ok(())
    }
}
