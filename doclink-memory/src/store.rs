//! In-memory storage implementation for the document store client.
//!
//! Documents are kept as encoded BSON bytes in insertion order, grouped by
//! database and collection, behind an async-safe read-write lock. Scans decode
//! one record per step, so they behave like a driver cursor rather than a
//! pre-loaded vector.

use std::{
    collections::{HashMap, HashSet},
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use bson::Document;
use futures::{StreamExt, stream};
use mea::rwlock::RwLock;

use doclink_core::{
    backend::{DocumentStream, StoreConnection, StoreConnector},
    config::{ClientConfig, CollectionPolicy},
    document::{DocumentId, ID_FIELD},
    error::{ConnectionError, QueryError, WriteError},
};

const SCHEME: &str = "memory://";

/// Encoded records in insertion order, plus the `_id` keys they hold.
#[derive(Debug, Default)]
struct CollectionData {
    records: Vec<Vec<u8>>,
    keys: HashSet<String>,
}

type DatabaseMap = HashMap<String, CollectionData>;
type StoreMap = HashMap<String, DatabaseMap>;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Credentials {
    username: String,
    password: String,
}

#[derive(Debug)]
struct ServerState {
    reachable: AtomicBool,
    open_sessions: AtomicUsize,
    credentials: Option<Credentials>,
}

/// Thread-safe in-memory document store.
///
/// `InMemoryStore` is both the storage and its [`StoreConnector`]. Clones share
/// the same data, so every connection made from any clone sees the same
/// collections.
///
/// It accepts URIs of the form `memory://[user:password@]host[/...]`. The host is
/// informational; the data lives in this value.
///
/// # Fault Injection
///
/// For exercising error paths, the store can be taken offline with
/// [`set_reachable`](Self::set_reachable) and can hold undecodable records added
/// with [`inject_raw_record`](Self::inject_raw_record).
///
/// # Example
///
/// ```ignore
/// use doclink_memory::InMemoryStore;
/// use doclink::prelude::*;
///
/// let store = InMemoryStore::new();
/// let config = ClientConfig::new("memory://local", "myDatabase", "myCollection");
/// let client = DocumentStoreClient::connect(store.clone(), config).await?;
/// assert_eq!(store.open_sessions(), 1);
/// ```
#[derive(Clone, Debug)]
pub struct InMemoryStore {
    /// database name -> collection name -> records
    store: Arc<RwLock<StoreMap>>,
    state: Arc<ServerState>,
}

impl InMemoryStore {
    /// Creates an empty, reachable store that accepts any credentials.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> InMemoryStoreBuilder {
        InMemoryStoreBuilder::default()
    }

    /// Takes the store offline or brings it back.
    ///
    /// While offline, new connections fail with [`ConnectionError::Unreachable`],
    /// operations on open connections fail, and open scans fail at their next step.
    pub fn set_reachable(&self, reachable: bool) {
        self.state.reachable.store(reachable, Ordering::SeqCst);
    }

    pub fn is_reachable(&self) -> bool {
        self.state.reachable.load(Ordering::SeqCst)
    }

    /// Number of connections that have been opened and not yet released.
    pub fn open_sessions(&self) -> usize {
        self.state.open_sessions.load(Ordering::SeqCst)
    }

    /// Appends raw bytes as a record, bypassing encoding.
    ///
    /// Scans fail with [`QueryError::Decode`] when they reach a record that is not
    /// valid BSON. The record claims no `_id`. The collection is created if needed.
    pub async fn inject_raw_record(&self, database: &str, collection: &str, bytes: Vec<u8>) {
        let mut store = self.store.write().await;
        let data = store
            .entry(database.to_string())
            .or_default()
            .entry(collection.to_string())
            .or_default();

        data.records.push(bytes);
    }

    /// Lists the collections of a database, in no particular order.
    pub async fn list_collections(&self, database: &str) -> Vec<String> {
        self.store
            .read()
            .await
            .get(database)
            .map(|collections| collections.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn parse_credentials(config: &ClientConfig) -> Result<Option<Credentials>, ConnectionError> {
        let rest = config.uri().strip_prefix(SCHEME).ok_or_else(|| {
            ConnectionError::InvalidUri(format!(
                "'{}' is not a {SCHEME} URI",
                config.redacted_uri()
            ))
        })?;
        let authority = rest.split('/').next().unwrap_or_default();

        match authority.rsplit_once('@') {
            Some((userinfo, host)) => {
                if host.is_empty() {
                    return Err(ConnectionError::InvalidUri(format!(
                        "'{}' has no host",
                        config.redacted_uri()
                    )));
                }
                let (username, password) = userinfo.split_once(':').ok_or_else(|| {
                    ConnectionError::InvalidUri("credentials must be given as user:password".into())
                })?;

                Ok(Some(Credentials {
                    username: username.to_string(),
                    password: password.to_string(),
                }))
            }
            None if authority.is_empty() => Err(ConnectionError::InvalidUri(format!(
                "'{}' has no host",
                config.redacted_uri()
            ))),
            None => Ok(None),
        }
    }

    fn authenticate(&self, supplied: Option<Credentials>) -> Result<(), ConnectionError> {
        let Some(expected) = &self.state.credentials else {
            return Ok(());
        };

        match supplied {
            Some(credentials) if &credentials == expected => Ok(()),
            Some(credentials) => Err(ConnectionError::Authentication(format!(
                "bad credentials for user '{}'",
                credentials.username
            ))),
            None => Err(ConnectionError::Authentication(
                "this store requires credentials".into(),
            )),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StoreConnector for InMemoryStore {
    type Connection = InMemoryConnection;

    async fn connect(&self, config: &ClientConfig) -> Result<InMemoryConnection, ConnectionError> {
        let supplied = Self::parse_credentials(config)?;

        if !self.is_reachable() {
            return Err(ConnectionError::Unreachable(format!(
                "in-memory store at '{}' is offline",
                config.redacted_uri()
            )));
        }
        self.authenticate(supplied)?;

        {
            let mut store = self.store.write().await;
            let exists = store
                .get(config.database())
                .is_some_and(|collections| collections.contains_key(config.collection()));

            if !exists {
                match config.collection_policy() {
                    CollectionPolicy::CreateIfMissing => {
                        store
                            .entry(config.database().to_string())
                            .or_default()
                            .entry(config.collection().to_string())
                            .or_default();
                        tracing::debug!(namespace = %config.namespace(), "created collection");
                    }
                    CollectionPolicy::RequireExisting => {
                        return Err(ConnectionError::CollectionNotFound {
                            database: config.database().to_string(),
                            collection: config.collection().to_string(),
                        });
                    }
                }
            }
        }

        self.state.open_sessions.fetch_add(1, Ordering::SeqCst);

        Ok(InMemoryConnection {
            store: self.clone(),
            database: config.database().to_string(),
            collection: config.collection().to_string(),
            closed: Arc::new(AtomicBool::new(false)),
        })
    }
}

/// A session with an [`InMemoryStore`], bound to one collection.
///
/// Dropping the connection closes it. Scans started from it fail at their next
/// step with [`QueryError::ConnectionLost`] from then on.
#[derive(Debug)]
pub struct InMemoryConnection {
    store: InMemoryStore,
    database: String,
    collection: String,
    closed: Arc<AtomicBool>,
}

impl InMemoryConnection {
    fn check_online(&self) -> Result<(), String> {
        if !self.store.is_reachable() {
            return Err("in-memory store is offline".into());
        }

        Ok(())
    }
}

impl Drop for InMemoryConnection {
    fn drop(&mut self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.store.state.open_sessions.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl StoreConnection for InMemoryConnection {
    async fn insert_one(&self, document: Document) -> Result<DocumentId, WriteError> {
        self.check_online().map_err(WriteError::Rejected)?;

        let (id, document) = match DocumentId::of(&document) {
            Some(id) => (id, document),
            None => {
                let id = DocumentId::generate();
                let mut with_id = Document::new();
                with_id.insert(ID_FIELD, id.as_bson().clone());
                for (key, value) in document {
                    with_id.insert(key, value);
                }
                (id, with_id)
            }
        };

        let key = id.to_string();
        let mut bytes = Vec::new();
        document.to_writer(&mut bytes)?;

        let mut store = self.store.store.write().await;
        let data = store
            .entry(self.database.clone())
            .or_default()
            .entry(self.collection.clone())
            .or_default();

        if !data.keys.insert(key.clone()) {
            return Err(WriteError::DuplicateId {
                id: key,
                collection: self.collection.clone(),
            });
        }
        data.records.push(bytes);

        Ok(id)
    }

    async fn scan(&self) -> Result<DocumentStream, QueryError> {
        self.check_online().map_err(QueryError::ScanFailed)?;

        let cursor = ScanCursor {
            store: self.store.clone(),
            closed: self.closed.clone(),
            database: self.database.clone(),
            collection: self.collection.clone(),
            position: 0,
        };

        Ok(stream::unfold(cursor, |mut cursor| async move {
            let item = cursor.step().await?;
            Some((item, cursor))
        })
        .boxed())
    }

    async fn count(&self) -> Result<u64, QueryError> {
        self.check_online().map_err(QueryError::ConnectionLost)?;

        Ok(self
            .store
            .store
            .read()
            .await
            .get(&self.database)
            .and_then(|collections| collections.get(&self.collection))
            .map_or(0, |data| data.records.len() as u64))
    }

    async fn delete_all(&self) -> Result<u64, WriteError> {
        self.check_online().map_err(WriteError::Rejected)?;

        let mut store = self.store.store.write().await;
        let Some(data) = store
            .get_mut(&self.database)
            .and_then(|collections| collections.get_mut(&self.collection))
        else {
            return Ok(0);
        };

        let deleted = data.records.len() as u64;
        data.records.clear();
        data.keys.clear();

        Ok(deleted)
    }

    async fn drop_collection(&self) -> Result<(), WriteError> {
        self.check_online().map_err(WriteError::Rejected)?;

        if let Some(collections) = self.store.store.write().await.get_mut(&self.database) {
            collections.remove(&self.collection);
        }

        Ok(())
    }

    async fn close(self) -> Result<(), ConnectionError> {
        tracing::debug!(
            database = %self.database,
            collection = %self.collection,
            "closing in-memory session"
        );

        Ok(())
    }
}

/// Position of an in-progress scan.
struct ScanCursor {
    store: InMemoryStore,
    closed: Arc<AtomicBool>,
    database: String,
    collection: String,
    position: usize,
}

impl ScanCursor {
    async fn step(&mut self) -> Option<Result<Document, QueryError>> {
        if self.closed.load(Ordering::SeqCst) {
            return Some(Err(QueryError::ConnectionLost("session closed".into())));
        }
        if !self.store.is_reachable() {
            return Some(Err(QueryError::ConnectionLost(
                "in-memory store went offline".into(),
            )));
        }

        let bytes = {
            let store = self.store.store.read().await;
            store
                .get(&self.database)?
                .get(&self.collection)?
                .records
                .get(self.position)?
                .clone()
        };
        let position = self.position;
        self.position += 1;

        Some(Document::from_reader(bytes.as_slice()).map_err(|err| {
            QueryError::Decode(format!("record {position} in {}: {err}", self.collection))
        }))
    }
}

/// Builder for [`InMemoryStore`] instances.
///
/// # Example
///
/// ```ignore
/// use doclink_memory::InMemoryStore;
///
/// let store = InMemoryStore::builder()
///     .credentials("admin", "secret")
///     .build();
/// ```
#[derive(Debug, Default)]
pub struct InMemoryStoreBuilder {
    credentials: Option<Credentials>,
    offline: bool,
}

impl InMemoryStoreBuilder {
    /// Requires every connection to present these credentials in its URI.
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some(Credentials {
            username: username.into(),
            password: password.into(),
        });
        self
    }

    /// Starts the store unreachable.
    pub fn offline(mut self) -> Self {
        self.offline = true;
        self
    }

    pub fn build(self) -> InMemoryStore {
        InMemoryStore {
            store: Arc::new(RwLock::new(StoreMap::new())),
            state: Arc::new(ServerState {
                reachable: AtomicBool::new(!self.offline),
                open_sessions: AtomicUsize::new(0),
                credentials: self.credentials,
            }),
        }
    }
}
