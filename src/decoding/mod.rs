pub mod adapter_store;
pub mod async_iterator;
pub mod factory;
pub mod row_decoder;
pub mod sync_iterator;
