//! The document store client facade.
//!
//! [`DocumentStoreClient`] owns at most one connection to one database/collection
//! pair and moves between two states:
//!
//! ```text
//! Disconnected --connect/open--> Connected --disconnect--> Disconnected
//! ```
//!
//! Data operations are only valid while connected. On a disconnected client they
//! fail immediately with a precondition error and never reach the backend.
//!
//! # Example
//!
//! ```ignore
//! use doclink::prelude::*;
//! use bson::doc;
//! use futures::TryStreamExt;
//!
//! let config = ClientConfig::new("mongodb://localhost:27017", "myDatabase", "myCollection");
//! let mut client = DocumentStoreClient::connect(MongoDbConnector::default(), config).await?;
//!
//! let id = client.insert_one(doc! { "Field1": "value1", "Field2": 42 }).await?;
//! println!("Inserted document with ID: {id}");
//!
//! let mut results = client.find_all().await?;
//! while let Some(document) = results.try_next().await? {
//!     println!("{document}");
//! }
//!
//! client.disconnect().await;
//! ```

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::{
    backend::{StoreConnection, StoreConnector},
    config::ClientConfig,
    context::CallContext,
    cursor::QueryResult,
    document::{Document, DocumentExt, DocumentId, documents_from_json, validate_for_insert},
    error::{ConnectionError, QueryError, WriteError},
};

/// Connection state of a [`DocumentStoreClient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Disconnected,
    Connected,
}

#[derive(Debug)]
struct Session<T> {
    id: Uuid,
    connected_at: DateTime<Utc>,
    connection: T,
}

/// A client bound to one collection of one document store.
///
/// The client is the sole owner of its connection. The connection is released
/// by [`disconnect`](Self::disconnect), or by `Drop` if the client goes out of
/// scope while still connected, so it cannot leak on any exit path. Use
/// [`with_client`] to scope a connection to a block of work.
///
/// # Concurrency
///
/// Data operations take `&self`; state changes take `&mut self`. Sharing one
/// client between tasks requires external synchronization such as a mutex.
/// Alternatively, give each task its own client.
///
/// # Type Parameters
///
/// * `C` - The connector used to (re)establish the connection
#[derive(Debug)]
pub struct DocumentStoreClient<C: StoreConnector> {
    connector: C,
    config: ClientConfig,
    session: Option<Session<C::Connection>>,
}

impl<C: StoreConnector> DocumentStoreClient<C> {
    /// Creates a disconnected client. Call [`open`](Self::open) to connect it.
    pub fn new(connector: C, config: ClientConfig) -> Self {
        Self {
            connector,
            config,
            session: None,
        }
    }

    /// Creates a client and connects it.
    ///
    /// # Errors
    ///
    /// Returns a [`ConnectionError`] if the config is invalid, the store is
    /// unreachable, authentication fails, or the collection policy cannot be met.
    pub async fn connect(connector: C, config: ClientConfig) -> Result<Self, ConnectionError> {
        Self::connect_with(connector, config, &CallContext::background()).await
    }

    /// Like [`connect`](Self::connect), bounded by `ctx`.
    pub async fn connect_with(
        connector: C,
        config: ClientConfig,
        ctx: &CallContext,
    ) -> Result<Self, ConnectionError> {
        let mut client = Self::new(connector, config);
        client.open_with(ctx).await?;

        Ok(client)
    }

    /// Connects a disconnected client using its stored config.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::AlreadyConnected`] if a connection is held, or
    /// any error [`connect`](Self::connect) can return.
    pub async fn open(&mut self) -> Result<(), ConnectionError> {
        self.open_with(&CallContext::background()).await
    }

    /// Like [`open`](Self::open), bounded by `ctx`.
    pub async fn open_with(&mut self, ctx: &CallContext) -> Result<(), ConnectionError> {
        if self.session.is_some() {
            return Err(ConnectionError::AlreadyConnected);
        }
        self.config.validate()?;

        let connection = ctx.run(self.connector.connect(&self.config)).await??;
        let session = Session {
            id: Uuid::new_v4(),
            connected_at: Utc::now(),
            connection,
        };

        tracing::info!(
            session = %session.id,
            namespace = %self.config.namespace(),
            uri = %self.config.redacted_uri(),
            "connected to document store"
        );
        self.session = Some(session);

        Ok(())
    }

    /// Releases the connection.
    ///
    /// Calling this on a client that is already disconnected, or was never
    /// connected, does nothing. A failure while closing is logged and the client
    /// still ends up disconnected.
    pub async fn disconnect(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };

        match session.connection.close().await {
            Ok(()) => tracing::info!(
                session = %session.id,
                namespace = %self.config.namespace(),
                "disconnected from document store"
            ),
            Err(err) => tracing::warn!(
                session = %session.id,
                error = %err,
                "error while closing connection; session discarded"
            ),
        }
    }

    pub fn state(&self) -> ClientState {
        if self.session.is_some() {
            ClientState::Connected
        } else {
            ClientState::Disconnected
        }
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Identifier of the current session, if connected.
    pub fn session_id(&self) -> Option<Uuid> {
        self.session.as_ref().map(|session| session.id)
    }

    /// When the current session was established, if connected.
    pub fn connected_since(&self) -> Option<DateTime<Utc>> {
        self.session.as_ref().map(|session| session.connected_at)
    }

    fn write_session(&self) -> Result<&Session<C::Connection>, WriteError> {
        self.session.as_ref().ok_or(WriteError::NotConnected)
    }

    fn query_session(&self) -> Result<&Session<C::Connection>, QueryError> {
        self.session.as_ref().ok_or(QueryError::NotConnected)
    }

    /// Inserts a single document.
    ///
    /// If `document` has an `_id` it is stored verbatim; otherwise the store
    /// assigns one.
    ///
    /// # Returns
    ///
    /// The id of the inserted document.
    ///
    /// # Errors
    ///
    /// - [`WriteError::NotConnected`] if the client is disconnected
    /// - [`WriteError::EmptyDocument`], [`WriteError::InvalidId`] or
    ///   [`WriteError::InvalidDocument`] if the document is unacceptable
    /// - [`WriteError::DuplicateId`] if the `_id` is already taken
    /// - [`WriteError::Rejected`] if the store refuses the write
    pub async fn insert_one(&self, document: Document) -> Result<DocumentId, WriteError> {
        self.insert_one_with(document, &CallContext::background()).await
    }

    /// Like [`insert_one`](Self::insert_one), bounded by `ctx`.
    pub async fn insert_one_with(
        &self,
        document: Document,
        ctx: &CallContext,
    ) -> Result<DocumentId, WriteError> {
        let session = self.write_session()?;
        validate_for_insert(&document)?;

        let id = ctx.run(session.connection.insert_one(document)).await??;
        tracing::debug!(session = %session.id, id = %id, "inserted document");

        Ok(id)
    }

    /// Serializes `value` and inserts it as a single document.
    pub async fn insert<T: Serialize + Sync>(&self, value: &T) -> Result<DocumentId, WriteError> {
        self.write_session()?;
        self.insert_one(value.to_document()?).await
    }

    /// Inserts the documents described by a JSON object or array of objects.
    ///
    /// Documents are inserted one at a time, in order, and insertion stops at the
    /// first failure. Documents inserted before the failure remain stored.
    ///
    /// # Errors
    ///
    /// If the first document fails, its error is returned unchanged. If a later
    /// document fails, the error is [`WriteError::Partial`] carrying the number of
    /// documents already written.
    pub async fn insert_json(&self, value: Value) -> Result<Vec<DocumentId>, WriteError> {
        self.insert_json_with(value, &CallContext::background()).await
    }

    /// Like [`insert_json`](Self::insert_json), bounded by `ctx`.
    pub async fn insert_json_with(
        &self,
        value: Value,
        ctx: &CallContext,
    ) -> Result<Vec<DocumentId>, WriteError> {
        self.write_session()?;
        let documents = documents_from_json(value)?;
        let mut ids = Vec::with_capacity(documents.len());

        for document in documents {
            match self.insert_one_with(document, ctx).await {
                Ok(id) => ids.push(id),
                Err(source) if ids.is_empty() => return Err(source),
                Err(source) => {
                    return Err(WriteError::Partial {
                        written: ids.len(),
                        source: Box::new(source),
                    });
                }
            }
        }

        Ok(ids)
    }

    /// Starts a scan over the whole collection.
    ///
    /// The returned [`QueryResult`] fetches documents as it is advanced. Errors
    /// during iteration are yielded in place and end the scan.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::NotConnected`] if the client is disconnected, or
    /// [`QueryError::ScanFailed`] if the store refuses to start the scan.
    pub async fn find_all(&self) -> Result<QueryResult, QueryError> {
        self.find_all_with(&CallContext::background()).await
    }

    /// Like [`find_all`](Self::find_all). `ctx` bounds starting the scan and
    /// every subsequent step.
    pub async fn find_all_with(&self, ctx: &CallContext) -> Result<QueryResult, QueryError> {
        let session = self.query_session()?;
        let stream = ctx.run(session.connection.scan()).await??;

        tracing::debug!(
            session = %session.id,
            namespace = %self.config.namespace(),
            "scan started"
        );

        Ok(QueryResult::new(stream, ctx.clone()))
    }

    /// Counts the documents in the collection.
    pub async fn count(&self) -> Result<u64, QueryError> {
        self.count_with(&CallContext::background()).await
    }

    pub async fn count_with(&self, ctx: &CallContext) -> Result<u64, QueryError> {
        let session = self.query_session()?;
        Ok(ctx.run(session.connection.count()).await??)
    }

    /// Deletes every document in the collection.
    ///
    /// # Returns
    ///
    /// The number of documents removed.
    pub async fn clear(&self) -> Result<u64, WriteError> {
        self.clear_with(&CallContext::background()).await
    }

    pub async fn clear_with(&self, ctx: &CallContext) -> Result<u64, WriteError> {
        let session = self.write_session()?;
        let deleted = ctx.run(session.connection.delete_all()).await??;

        tracing::debug!(
            session = %session.id,
            namespace = %self.config.namespace(),
            deleted,
            "cleared collection"
        );

        Ok(deleted)
    }

    /// Drops the collection and everything in it.
    ///
    /// The client stays connected; a later insert recreates the collection.
    pub async fn drop_collection(&self) -> Result<(), WriteError> {
        self.drop_collection_with(&CallContext::background()).await
    }

    pub async fn drop_collection_with(&self, ctx: &CallContext) -> Result<(), WriteError> {
        let session = self.write_session()?;
        ctx.run(session.connection.drop_collection()).await??;

        tracing::debug!(
            session = %session.id,
            namespace = %self.config.namespace(),
            "dropped collection"
        );

        Ok(())
    }
}

impl<C: StoreConnector> Drop for DocumentStoreClient<C> {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            tracing::warn!(
                session = %session.id,
                namespace = %self.config.namespace(),
                "client dropped while connected; releasing connection"
            );
        }
    }
}

/// Connects a client, runs `body` with it, then disconnects.
///
/// The connection is released whether `body` succeeds or fails. If `body`
/// panics, the client's `Drop` releases it during unwinding.
///
/// # Example
///
/// ```ignore
/// let count = with_client(connector, config, async |client| {
///     client.insert_one(doc! { "name": "Alice" }).await?;
///     Ok::<_, DocumentStoreError>(client.count().await?)
/// })
/// .await?;
/// ```
pub async fn with_client<C, F, T, E>(connector: C, config: ClientConfig, body: F) -> Result<T, E>
where
    C: StoreConnector,
    F: AsyncFnOnce(&DocumentStoreClient<C>) -> Result<T, E>,
    E: From<ConnectionError>,
{
    let mut client = DocumentStoreClient::connect(connector, config).await?;
    let outcome = body(&client).await;
    client.disconnect().await;

    outcome
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
        time::Duration,
    };

    use async_trait::async_trait;
    use bson::doc;
    use futures::{StreamExt, future::pending, stream};
    use rstest::{fixture, rstest};

    use super::*;
    use crate::{
        backend::DocumentStream,
        context::CancelHandle,
        error::{DocumentStoreError, Interrupted},
    };

    #[derive(Debug, Default)]
    struct Counters {
        backend_calls: AtomicUsize,
        closes: AtomicUsize,
        drops: AtomicUsize,
    }

    #[derive(Debug, Clone, Default)]
    struct FakeConnector {
        counters: Arc<Counters>,
        fail_close: bool,
        stall_connect: bool,
    }

    #[derive(Debug)]
    struct FakeConnection {
        counters: Arc<Counters>,
        fail_close: bool,
    }

    impl Drop for FakeConnection {
        fn drop(&mut self) {
            self.counters.drops.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl StoreConnector for FakeConnector {
        type Connection = FakeConnection;

        async fn connect(&self, _config: &ClientConfig) -> Result<FakeConnection, ConnectionError> {
            self.counters.backend_calls.fetch_add(1, Ordering::SeqCst);
            if self.stall_connect {
                pending::<()>().await;
            }

            Ok(FakeConnection {
                counters: self.counters.clone(),
                fail_close: self.fail_close,
            })
        }
    }

    #[async_trait]
    impl StoreConnection for FakeConnection {
        async fn insert_one(&self, document: Document) -> Result<DocumentId, WriteError> {
            self.counters.backend_calls.fetch_add(1, Ordering::SeqCst);
            Ok(DocumentId::of(&document).unwrap_or_else(DocumentId::generate))
        }

        async fn scan(&self) -> Result<DocumentStream, QueryError> {
            self.counters.backend_calls.fetch_add(1, Ordering::SeqCst);
            Ok(stream::iter(vec![Ok(doc! { "n": 1 })]).boxed())
        }

        async fn count(&self) -> Result<u64, QueryError> {
            self.counters.backend_calls.fetch_add(1, Ordering::SeqCst);
            Ok(1)
        }

        async fn delete_all(&self) -> Result<u64, WriteError> {
            self.counters.backend_calls.fetch_add(1, Ordering::SeqCst);
            Ok(1)
        }

        async fn drop_collection(&self) -> Result<(), WriteError> {
            self.counters.backend_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn close(self) -> Result<(), ConnectionError> {
            self.counters.closes.fetch_add(1, Ordering::SeqCst);
            if self.fail_close {
                return Err(ConnectionError::Backend("socket already gone".into()));
            }
            Ok(())
        }
    }

    #[fixture]
    fn config() -> ClientConfig {
        ClientConfig::new("fake://local", "myDatabase", "myCollection")
    }

    #[rstest]
    #[tokio::test]
    async fn connect_then_disconnect_is_idempotent(config: ClientConfig) {
        let connector = FakeConnector::default();
        let counters = connector.counters.clone();
        let mut client = DocumentStoreClient::connect(connector, config).await.unwrap();

        assert_eq!(client.state(), ClientState::Connected);
        assert!(client.session_id().is_some());
        assert!(client.connected_since().is_some());

        client.disconnect().await;
        assert_eq!(client.state(), ClientState::Disconnected);
        client.disconnect().await;

        assert_eq!(counters.closes.load(Ordering::SeqCst), 1);
        assert_eq!(counters.drops.load(Ordering::SeqCst), 1);
        assert!(client.session_id().is_none());
    }

    #[rstest]
    #[tokio::test]
    async fn never_opened_client_rejects_operations_without_backend_calls(config: ClientConfig) {
        let connector = FakeConnector::default();
        let counters = connector.counters.clone();
        let mut client = DocumentStoreClient::new(connector, config);

        let err = client.insert_one(doc! {}).await.unwrap_err();
        assert!(err.is_precondition());
        assert!(client.find_all().await.unwrap_err().is_precondition());
        assert!(client.count().await.unwrap_err().is_precondition());
        assert!(client.clear().await.unwrap_err().is_precondition());
        assert!(client.drop_collection().await.unwrap_err().is_precondition());
        assert!(client
            .insert_json(serde_json::json!({ "a": 1 }))
            .await
            .unwrap_err()
            .is_precondition());

        client.disconnect().await;
        assert_eq!(counters.backend_calls.load(Ordering::SeqCst), 0);
        assert_eq!(counters.closes.load(Ordering::SeqCst), 0);
    }

    #[rstest]
    #[tokio::test]
    async fn operations_after_disconnect_are_preconditions(config: ClientConfig) {
        let connector = FakeConnector::default();
        let counters = connector.counters.clone();
        let mut client = DocumentStoreClient::connect(connector, config).await.unwrap();
        client.disconnect().await;

        assert!(matches!(
            client.insert_one(doc! { "a": 1 }).await,
            Err(WriteError::NotConnected)
        ));
        assert!(matches!(client.find_all().await, Err(QueryError::NotConnected)));
        assert_eq!(counters.backend_calls.load(Ordering::SeqCst), 1);
    }

    #[rstest]
    #[tokio::test]
    async fn open_is_rejected_while_connected_and_allowed_after(config: ClientConfig) {
        let mut client = DocumentStoreClient::connect(FakeConnector::default(), config)
            .await
            .unwrap();
        let first = client.session_id();

        assert!(matches!(
            client.open().await,
            Err(ConnectionError::AlreadyConnected)
        ));

        client.disconnect().await;
        client.open().await.unwrap();
        assert!(client.is_connected());
        assert_ne!(client.session_id(), first);
    }

    #[tokio::test]
    async fn invalid_config_never_reaches_the_connector() {
        let connector = FakeConnector::default();
        let counters = connector.counters.clone();

        let err = DocumentStoreClient::connect(connector, ClientConfig::new("", "db", "c"))
            .await
            .unwrap_err();

        assert!(matches!(err, ConnectionError::InvalidUri(_)));
        assert_eq!(counters.backend_calls.load(Ordering::SeqCst), 0);
    }

    #[rstest]
    #[tokio::test]
    async fn invalid_documents_are_rejected_before_the_backend(config: ClientConfig) {
        let connector = FakeConnector::default();
        let counters = connector.counters.clone();
        let client = DocumentStoreClient::connect(connector, config).await.unwrap();

        assert!(matches!(
            client.insert_one(Document::new()).await,
            Err(WriteError::EmptyDocument)
        ));
        assert!(matches!(
            client.insert_one(doc! { "_id": null, "a": 1 }).await,
            Err(WriteError::InvalidId(_))
        ));
        assert_eq!(counters.backend_calls.load(Ordering::SeqCst), 1);
    }

    #[rstest]
    #[tokio::test]
    async fn explicit_ids_are_returned_verbatim(config: ClientConfig) {
        let client = DocumentStoreClient::connect(FakeConnector::default(), config)
            .await
            .unwrap();

        let id = client.insert_one(doc! { "_id": "fixed", "a": 1 }).await.unwrap();
        assert_eq!(id, DocumentId::from(bson::Bson::String("fixed".into())));
    }

    #[rstest]
    #[tokio::test]
    async fn close_failures_are_swallowed(config: ClientConfig) {
        let connector = FakeConnector {
            fail_close: true,
            ..Default::default()
        };
        let counters = connector.counters.clone();
        let mut client = DocumentStoreClient::connect(connector, config).await.unwrap();

        client.disconnect().await;

        assert_eq!(client.state(), ClientState::Disconnected);
        assert_eq!(counters.closes.load(Ordering::SeqCst), 1);
    }

    #[rstest]
    #[tokio::test]
    async fn dropping_a_connected_client_releases_the_connection(config: ClientConfig) {
        let connector = FakeConnector::default();
        let counters = connector.counters.clone();
        let client = DocumentStoreClient::connect(connector, config).await.unwrap();

        drop(client);

        assert_eq!(counters.drops.load(Ordering::SeqCst), 1);
        assert_eq!(counters.closes.load(Ordering::SeqCst), 0);
    }

    #[rstest]
    #[tokio::test]
    async fn with_client_disconnects_when_the_body_fails(config: ClientConfig) {
        let connector = FakeConnector::default();
        let counters = connector.counters.clone();

        let outcome: Result<(), DocumentStoreError> =
            with_client(connector, config, async |client| {
                client.insert_one(doc! { "a": 1 }).await?;
                Err(WriteError::Rejected("simulated".into()).into())
            })
            .await;

        assert!(matches!(
            outcome,
            Err(DocumentStoreError::Write(WriteError::Rejected(_)))
        ));
        assert_eq!(counters.closes.load(Ordering::SeqCst), 1);
        assert_eq!(counters.drops.load(Ordering::SeqCst), 1);
    }

    #[rstest]
    #[tokio::test]
    async fn with_client_returns_the_body_value(config: ClientConfig) {
        let count = with_client(FakeConnector::default(), config, async |client| {
            Ok::<_, DocumentStoreError>(client.count().await?)
        })
        .await
        .unwrap();

        assert_eq!(count, 1);
    }

    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn stalled_connect_honours_the_deadline(config: ClientConfig) {
        let connector = FakeConnector {
            stall_connect: true,
            ..Default::default()
        };
        let ctx = CallContext::background().with_timeout(Duration::from_secs(1));

        let err = DocumentStoreClient::connect_with(connector, config, &ctx)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ConnectionError::Interrupted(Interrupted::DeadlineExceeded)
        ));
    }

    #[rstest]
    #[tokio::test]
    async fn cancelled_context_skips_the_backend(config: ClientConfig) {
        let connector = FakeConnector::default();
        let counters = connector.counters.clone();
        let client = DocumentStoreClient::connect(connector, config).await.unwrap();

        let handle = CancelHandle::new();
        handle.cancel();
        let ctx = CallContext::background().with_cancellation(handle.signal());

        assert!(matches!(
            client.insert_one_with(doc! { "a": 1 }, &ctx).await,
            Err(WriteError::Interrupted(Interrupted::Cancelled))
        ));
        assert!(matches!(
            client.find_all_with(&ctx).await,
            Err(QueryError::Interrupted(Interrupted::Cancelled))
        ));
        assert_eq!(counters.backend_calls.load(Ordering::SeqCst), 1);
    }

    #[rstest]
    #[tokio::test]
    async fn find_all_streams_backend_documents(config: ClientConfig) {
        let client = DocumentStoreClient::connect(FakeConnector::default(), config)
            .await
            .unwrap();

        let documents = client.find_all().await.unwrap().try_collect_all().await.unwrap();
        assert_eq!(documents, vec![doc! { "n": 1 }]);
    }
}
