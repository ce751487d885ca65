//! Reference data-index backends.
//!
//! Production deployments supply their own [`crate::MultiKeyFetch`] /
//! [`crate::SingleKeyFetch`] implementations over their key-value engine; these two cover
//! in-process use and object storage.

pub mod memory;
pub mod object_store_index;
