//! A thin document store client facade with typed errors and scoped connections.
//!
//! This crate is the core of the doclink project and provides:
//!
//! - **Client** ([`client`]) - [`DocumentStoreClient`](client::DocumentStoreClient), which owns one connection and exposes insert/scan operations
//! - **Backend abstraction** ([`backend`]) - Traits for implementing store backends
//! - **Documents** ([`document`]) - Schema-less documents, ids and serde/JSON conversions
//! - **Scan results** ([`cursor`]) - The lazy [`QueryResult`](cursor::QueryResult) stream
//! - **Configuration** ([`config`]) - Connection URI, namespace and collection policy
//! - **Call context** ([`context`]) - Deadlines and cancellation for individual calls
//! - **Error handling** ([`error`]) - Connection, write and query error types
//!
//! # Example
//!
//! ```ignore
//! use doclink::prelude::*;
//! use bson::doc;
//!
//! let config = ClientConfig::new("memory://local", "myDatabase", "myCollection");
//!
//! with_client(InMemoryStore::new(), config, async |client| {
//!     let id = client.insert_one(doc! { "Field1": "value1", "Field2": 42 }).await?;
//!     println!("Inserted document with ID: {id}");
//!
//!     for document in client.find_all().await?.try_collect_all().await? {
//!         println!("{document}");
//!     }
//!
//!     Ok::<_, DocumentStoreError>(())
//! })
//! .await?;
//! ```

pub mod backend;
pub mod client;
pub mod config;
pub mod context;
pub mod cursor;
pub mod document;
pub mod error;
