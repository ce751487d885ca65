pub mod object_store_registry;
