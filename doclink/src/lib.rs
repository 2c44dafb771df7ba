//! Main doclink crate providing a thin client over document stores.
//!
//! This crate is the primary entry point for users of doclink. It re-exports the
//! core types from the sub-crates and wires up the available backends.
//!
//! # Features
//!
//! - **One connection per client** - Connect, work, disconnect, with typed errors at each step
//! - **Schema-less documents** - Insert BSON documents, serde values or JSON
//! - **Lazy scans** - `find_all` streams documents instead of loading them up front
//! - **Deadlines and cancellation** - Every operation has a `*_with(&CallContext)` variant
//! - **Multiple backends** - In-memory storage and MongoDB (behind the `mongodb` feature)
//!
//! # Quick Start
//!
//! ```ignore
//! use doclink::prelude::*;
//! use bson::doc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), DocumentStoreError> {
//!     let mut client = doclink::connect("memory://local", "myDatabase", "myCollection").await?;
//!
//!     let id = client.insert_one(doc! { "Field1": "value1", "Field2": 42 }).await?;
//!     println!("Inserted document with ID: {id}");
//!
//!     let mut results = client.find_all().await?;
//!     while let Some(document) = results.try_next().await? {
//!         println!("{document}");
//!     }
//!
//!     client.disconnect().await;
//!     Ok(())
//! }
//! ```
//!
//! # Scoped Connections
//!
//! [`with_client`](client::with_client) connects, runs a body and disconnects
//! whether or not the body succeeded:
//!
//! ```ignore
//! use doclink::{prelude::*, memory::InMemoryStore};
//!
//! let config = ClientConfig::from_env()?;
//! let count = with_client(InMemoryStore::new(), config, async |client| {
//!     client.insert_json(serde_json::json!([{ "a": 1 }, { "a": 2 }])).await?;
//!     Ok::<_, DocumentStoreError>(client.count().await?)
//! })
//! .await?;
//! ```
//!
//! # Backends
//!
//! - [`memory`] - In-memory storage for development and testing
//! - `mongodb` - MongoDB through the official driver (requires the `mongodb` feature)

mod any;
pub mod prelude;

pub use any::{AnyConnection, AnyConnector};
pub use doclink_core::{backend, client, config, context, cursor, document, error};

// Re-export BSON types for convenience
pub use bson;

use doclink_core::{client::DocumentStoreClient, config::ClientConfig, error::ConnectionError};

/// In-memory storage backend implementations.
pub mod memory {
    pub use doclink_memory::{InMemoryConnection, InMemoryStore, InMemoryStoreBuilder};
}

/// MongoDB storage backend implementations.
///
/// This module is only available when the `mongodb` feature is enabled.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use doclink_mongodb::{MongoDbConnection, MongoDbConnector};
}

/// A client whose backend was chosen from its URI.
pub type Client = DocumentStoreClient<AnyConnector>;

/// Connects to the store at `uri`, picking the backend from the URI scheme.
///
/// A `memory://` URI gets a new, empty in-memory store private to this client.
/// Share an [`InMemoryStore`](memory::InMemoryStore) between clients by passing
/// it to [`DocumentStoreClient::connect`] instead.
///
/// # Errors
///
/// Fails with [`ConnectionError::InvalidUri`] for schemes no enabled backend
/// handles, and with whatever the backend reports while connecting otherwise.
pub async fn connect(
    uri: impl Into<String>,
    database: impl Into<String>,
    collection: impl Into<String>,
) -> Result<Client, ConnectionError> {
    let config = ClientConfig::new(uri, database, collection);
    let connector = AnyConnector::for_uri(config.uri())?;

    DocumentStoreClient::connect(connector, config).await
}

/// Connects using [`ClientConfig::from_env`].
pub async fn connect_from_env() -> Result<Client, ConnectionError> {
    let config = ClientConfig::from_env()?;
    let connector = AnyConnector::for_uri(config.uri())?;

    DocumentStoreClient::connect(connector, config).await
}
