//! Runtime backend selection by URI scheme.

use async_trait::async_trait;
use bson::Document;

use doclink_core::{
    backend::{DocumentStream, StoreConnection, StoreConnector},
    config::ClientConfig,
    document::DocumentId,
    error::{ConnectionError, QueryError, WriteError},
};
use doclink_memory::{InMemoryConnection, InMemoryStore};
#[cfg(feature = "mongodb")]
use doclink_mongodb::{MongoDbConnection, MongoDbConnector};

/// A connector chosen at runtime.
///
/// Use [`AnyConnector::for_uri`] to pick the backend that understands a URI, or
/// wrap a configured connector with one of the `From` impls.
#[derive(Debug, Clone)]
pub enum AnyConnector {
    Memory(InMemoryStore),
    #[cfg(feature = "mongodb")]
    MongoDb(MongoDbConnector),
}

impl AnyConnector {
    /// Selects a backend for `uri`.
    ///
    /// `memory://` URIs get a fresh, empty [`InMemoryStore`]. `mongodb://` and
    /// `mongodb+srv://` URIs get a default [`MongoDbConnector`] when the
    /// `mongodb` feature is enabled.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::InvalidUri`] for any other scheme.
    pub fn for_uri(uri: &str) -> Result<Self, ConnectionError> {
        let scheme = uri
            .split_once("://")
            .map(|(scheme, _)| scheme)
            .ok_or_else(|| ConnectionError::InvalidUri(format!("'{uri}' has no scheme")))?;
        tracing::debug!(scheme, "selecting backend");

        match scheme {
            "memory" => Ok(Self::Memory(InMemoryStore::new())),
            #[cfg(feature = "mongodb")]
            "mongodb" | "mongodb+srv" => Ok(Self::MongoDb(MongoDbConnector::new())),
            other => Err(ConnectionError::InvalidUri(format!(
                "no backend available for scheme '{other}'"
            ))),
        }
    }
}

impl From<InMemoryStore> for AnyConnector {
    fn from(store: InMemoryStore) -> Self {
        Self::Memory(store)
    }
}

#[cfg(feature = "mongodb")]
impl From<MongoDbConnector> for AnyConnector {
    fn from(connector: MongoDbConnector) -> Self {
        Self::MongoDb(connector)
    }
}

#[async_trait]
impl StoreConnector for AnyConnector {
    type Connection = AnyConnection;

    async fn connect(&self, config: &ClientConfig) -> Result<AnyConnection, ConnectionError> {
        match self {
            Self::Memory(store) => Ok(AnyConnection::Memory(store.connect(config).await?)),
            #[cfg(feature = "mongodb")]
            Self::MongoDb(connector) => Ok(AnyConnection::MongoDb(connector.connect(config).await?)),
        }
    }
}

/// The connection produced by an [`AnyConnector`].
#[derive(Debug)]
pub enum AnyConnection {
    Memory(InMemoryConnection),
    #[cfg(feature = "mongodb")]
    MongoDb(MongoDbConnection),
}

macro_rules! dispatch {
    ($self:expr, $conn:ident => $body:expr) => {
        match $self {
            AnyConnection::Memory($conn) => $body,
            #[cfg(feature = "mongodb")]
            AnyConnection::MongoDb($conn) => $body,
        }
    };
}

#[async_trait]
impl StoreConnection for AnyConnection {
    async fn insert_one(&self, document: Document) -> Result<DocumentId, WriteError> {
        dispatch!(self, conn => conn.insert_one(document).await)
    }

    async fn scan(&self) -> Result<DocumentStream, QueryError> {
        dispatch!(self, conn => conn.scan().await)
    }

    async fn count(&self) -> Result<u64, QueryError> {
        dispatch!(self, conn => conn.count().await)
    }

    async fn delete_all(&self) -> Result<u64, WriteError> {
        dispatch!(self, conn => conn.delete_all().await)
    }

    async fn drop_collection(&self) -> Result<(), WriteError> {
        dispatch!(self, conn => conn.drop_collection().await)
    }

    async fn close(self) -> Result<(), ConnectionError> {
        dispatch!(self, conn => conn.close().await)
    }
}
