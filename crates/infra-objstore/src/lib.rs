// Proctor Infrastructure - Object Store Adapters
// Implements: ObjectStore (S3-compatible, local spool decorator)

pub mod s3_store;
pub mod spool;

pub use s3_store::{S3ObjectStore, StoreConfig};
pub use spool::SpooledStore;
