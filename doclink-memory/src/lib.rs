//! In-memory document store backend for doclink.
//!
//! This crate provides a thread-safe, in-memory implementation of the
//! `StoreConnector`/`StoreConnection` traits. It uses async-aware read-write locks
//! for concurrent access. It is meant for development and tests, where it stands
//! in for a real store.
//!
//! # Features
//!
//! - **Shared state** - Clones of one store see the same collections
//! - **Cursor-like scans** - Records are decoded one step at a time
//! - **Uniqueness** - `_id` values are unique per collection
//! - **Fault injection** - Take the store offline, require credentials, or plant corrupt records
//!
//! # Quick Start
//!
//! ```ignore
//! use doclink::{prelude::*, memory::InMemoryStore};
//! use bson::doc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::new("memory://local", "myDatabase", "myCollection");
//!     let mut client = DocumentStoreClient::connect(InMemoryStore::new(), config).await?;
//!
//!     client.insert_one(doc! { "Field1": "value1", "Field2": 42 }).await?;
//!     let documents = client.find_all().await?.try_collect_all().await?;
//!     assert_eq!(documents.len(), 1);
//!
//!     client.disconnect().await;
//!     Ok(())
//! }
//! ```

pub mod store;

pub use store::{InMemoryConnection, InMemoryStore, InMemoryStoreBuilder};
