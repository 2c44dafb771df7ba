//! MongoDB backend for doclink.
//!
//! [`MongoDbConnector`] opens a driver client per connection, checks the
//! deployment with a `ping`, and applies the configured collection policy before
//! handing back a [`MongoDbConnection`]. Driver errors are mapped onto the
//! doclink error taxonomy; duplicate key violations become
//! `WriteError::DuplicateId`.

pub mod store;

pub use store::{MongoDbConnection, MongoDbConnector};
