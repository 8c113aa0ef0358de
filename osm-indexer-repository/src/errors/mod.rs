//! Error types for index store operations.

mod index_store_error;

pub use index_store_error::IndexStoreError;
