//! Backend abstraction behind the document store client.
//!
//! This module defines the two traits a storage backend implements so that a
//! [`DocumentStoreClient`](crate::client::DocumentStoreClient) can drive it:
//!
//! - [`StoreConnector`]: validates a [`ClientConfig`] and establishes a connection
//! - [`StoreConnection`]: a live session bound to one database/collection pair
//!
//! The client owns connection state, precondition checks, document validation,
//! deadlines and logging. Backends only translate each primitive into their store.
//!
//! # Examples
//!
//! ```ignore
//! use doclink::backend::{StoreConnector, StoreConnection};
//! use doclink::config::ClientConfig;
//! use bson::doc;
//!
//! let config = ClientConfig::new("memory://local", "myDatabase", "myCollection");
//! let connection = InMemoryStore::new().connect(&config).await?;
//! let id = connection.insert_one(doc! { "name": "Alice" }).await?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use async_trait::async_trait;
use futures::stream::BoxStream;
use std::{fmt::Debug, sync::Arc};

use crate::{
    config::ClientConfig,
    document::{Document, DocumentId},
    error::{ConnectionError, QueryError, WriteError},
};

/// A lazily produced sequence of scanned documents.
///
/// Each item is fetched or decoded when the stream is polled.
pub type DocumentStream = BoxStream<'static, Result<Document, QueryError>>;

/// Establishes connections to a particular kind of store.
///
/// A connector is cheap to keep around; the client holds on to it so that a
/// disconnected client can be reopened with the same settings.
#[async_trait]
pub trait StoreConnector: Send + Sync + Debug {
    /// The live session type produced by this connector.
    type Connection: StoreConnection;

    /// Connects to the store described by `config`.
    ///
    /// Implementations must, in this order:
    ///
    /// 1. reject URIs they cannot parse or whose scheme they do not serve
    /// 2. reach the store and verify any credentials
    /// 3. apply the config's [`CollectionPolicy`](crate::config::CollectionPolicy)
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::InvalidUri`], [`ConnectionError::Unreachable`],
    /// [`ConnectionError::Authentication`] or [`ConnectionError::CollectionNotFound`]
    /// for the corresponding failure.
    async fn connect(&self, config: &ClientConfig) -> Result<Self::Connection, ConnectionError>;
}

/// A live session with a store, bound to one collection.
///
/// # Resource Release
///
/// Dropping a connection must release everything it holds. [`StoreConnection::close`]
/// is the orderly path, but the client falls back to `Drop` when it is itself
/// dropped while still connected.
#[async_trait]
pub trait StoreConnection: Send + Sync + Debug {
    /// Inserts a single document.
    ///
    /// The document has already been validated by the client. If it carries an
    /// `_id` field the value is stored verbatim; otherwise the backend generates
    /// one.
    ///
    /// # Returns
    ///
    /// The id of the stored document.
    ///
    /// # Errors
    ///
    /// Returns [`WriteError::DuplicateId`] when the id is already taken and
    /// [`WriteError::Rejected`] for any other store-side refusal.
    async fn insert_one(&self, document: Document) -> Result<DocumentId, WriteError>;

    /// Starts a scan over every document in the collection.
    ///
    /// Only the start of the scan happens here. Documents are fetched as the
    /// returned stream is polled, and failures during iteration are yielded as
    /// stream items.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::ScanFailed`] if the scan cannot be started.
    async fn scan(&self) -> Result<DocumentStream, QueryError>;

    /// Counts the documents in the collection.
    async fn count(&self) -> Result<u64, QueryError>;

    /// Deletes every document in the collection, keeping the collection itself.
    ///
    /// # Returns
    ///
    /// The number of documents removed.
    async fn delete_all(&self) -> Result<u64, WriteError>;

    /// Drops the collection and all of its documents.
    ///
    /// Dropping a collection that does not exist succeeds.
    async fn drop_collection(&self) -> Result<(), WriteError>;

    /// Closes the session.
    ///
    /// The default implementation simply drops the connection. Backends with
    /// an orderly shutdown sequence should override it.
    async fn close(self) -> Result<(), ConnectionError>
    where
        Self: Sized,
    {
        Ok(())
    }
}

#[async_trait]
impl<C> StoreConnector for &C
where
    C: StoreConnector,
{
    type Connection = C::Connection;

    async fn connect(&self, config: &ClientConfig) -> Result<Self::Connection, ConnectionError> {
        (*self).connect(config).await
    }
}

#[async_trait]
impl<C> StoreConnector for Arc<C>
where
    C: StoreConnector,
{
    type Connection = C::Connection;

    async fn connect(&self, config: &ClientConfig) -> Result<Self::Connection, ConnectionError> {
        self.as_ref().connect(config).await
    }
}
