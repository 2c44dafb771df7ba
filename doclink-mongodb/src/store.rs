use std::time::Duration;

use async_trait::async_trait;
use bson::{Document, doc};
use futures::{StreamExt, TryStreamExt};
use mongodb::{
    Client, Collection as MongoCollection, Database,
    error::{Error as MongoError, ErrorKind, WriteFailure},
    options::ClientOptions,
};
use doclink_core::{
    backend::{DocumentStream, StoreConnection, StoreConnector},
    config::{ClientConfig, CollectionPolicy},
    document::DocumentId,
    error::{ConnectionError, QueryError, WriteError},
};

const DUPLICATE_KEY: i32 = 11000;
const NAMESPACE_EXISTS: i32 = 48;

/// Connects to MongoDB deployments through the official driver.
///
/// Each connection owns its own driver [`Client`], which is shut down when the
/// connection is closed.
#[derive(Debug, Clone, Default)]
pub struct MongoDbConnector {
    server_selection_timeout: Option<Duration>,
    app_name: Option<String>,
}

impl MongoDbConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bounds how long the driver looks for a suitable server before failing.
    pub fn server_selection_timeout(mut self, timeout: Duration) -> Self {
        self.server_selection_timeout = Some(timeout);
        self
    }

    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = Some(name.into());
        self
    }

    async fn client_options(&self, config: &ClientConfig) -> Result<ClientOptions, ConnectionError> {
        let mut options = ClientOptions::parse(config.uri())
            .await
            .map_err(classify_connection_error)?;

        if let Some(timeout) = self.server_selection_timeout {
            options.server_selection_timeout = Some(timeout);
        }
        if let Some(name) = &self.app_name {
            options.app_name = Some(name.clone());
        }

        Ok(options)
    }

    async fn prepare(database: &Database, config: &ClientConfig) -> Result<(), ConnectionError> {
        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(classify_connection_error)?;

        let existing = database
            .list_collection_names()
            .filter(doc! { "name": config.collection() })
            .await
            .map_err(classify_connection_error)?;

        if !existing.is_empty() {
            return Ok(());
        }

        match config.collection_policy() {
            CollectionPolicy::RequireExisting => Err(ConnectionError::CollectionNotFound {
                database: config.database().to_string(),
                collection: config.collection().to_string(),
            }),
            CollectionPolicy::CreateIfMissing => match database.create_collection(config.collection()).await {
                Ok(()) => {
                    tracing::debug!(namespace = %config.namespace(), "created collection");
                    Ok(())
                }
                // Another client created it between the listing and now.
                Err(err) if command_code(&err) == Some(NAMESPACE_EXISTS) => Ok(()),
                Err(err) => Err(classify_connection_error(err)),
            },
        }
    }
}

#[async_trait]
impl StoreConnector for MongoDbConnector {
    type Connection = MongoDbConnection;

    async fn connect(&self, config: &ClientConfig) -> Result<MongoDbConnection, ConnectionError> {
        let options = self.client_options(config).await?;
        let client = Client::with_options(options).map_err(classify_connection_error)?;
        let database = client.database(config.database());

        if let Err(err) = Self::prepare(&database, config).await {
            client.shutdown().immediate(true).await;
            return Err(err);
        }

        Ok(MongoDbConnection {
            collection: database.collection(config.collection()),
            namespace: config.namespace(),
            client,
        })
    }
}

/// A driver client bound to one collection.
#[derive(Debug)]
pub struct MongoDbConnection {
    client: Client,
    collection: MongoCollection<Document>,
    namespace: String,
}

impl MongoDbConnection {
    pub fn namespace(&self) -> &str {
        &self.namespace
    }
}

#[async_trait]
impl StoreConnection for MongoDbConnection {
    async fn insert_one(&self, document: Document) -> Result<DocumentId, WriteError> {
        let supplied = DocumentId::of(&document);

        match self.collection.insert_one(document).await {
            Ok(result) => Ok(DocumentId::from(result.inserted_id)),
            Err(err) if write_code(&err) == Some(DUPLICATE_KEY) => Err(WriteError::DuplicateId {
                id: supplied.map(|id| id.to_string()).unwrap_or_default(),
                collection: self.collection.name().to_string(),
            }),
            Err(err) => Err(classify_write_error(err)),
        }
    }

    async fn scan(&self) -> Result<DocumentStream, QueryError> {
        let cursor = self
            .collection
            .find(doc! {})
            .await
            .map_err(|e| QueryError::ScanFailed(e.to_string()))?;

        Ok(cursor.map_err(classify_cursor_error).boxed())
    }

    async fn count(&self) -> Result<u64, QueryError> {
        self.collection
            .count_documents(doc! {})
            .await
            .map_err(|e| QueryError::ConnectionLost(e.to_string()))
    }

    async fn delete_all(&self) -> Result<u64, WriteError> {
        Ok(self
            .collection
            .delete_many(doc! {})
            .await
            .map_err(classify_write_error)?
            .deleted_count)
    }

    async fn drop_collection(&self) -> Result<(), WriteError> {
        self.collection.drop().await.map_err(classify_write_error)
    }

    async fn close(self) -> Result<(), ConnectionError> {
        tracing::debug!(namespace = %self.namespace, "shutting down mongodb client");
        self.client.shutdown().immediate(true).await;

        Ok(())
    }
}

fn command_code(err: &MongoError) -> Option<i32> {
    match err.kind.as_ref() {
        ErrorKind::Command(command) => Some(command.code),
        _ => None,
    }
}

fn write_code(err: &MongoError) -> Option<i32> {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write)) => Some(write.code),
        _ => None,
    }
}

fn classify_connection_error(err: MongoError) -> ConnectionError {
    match err.kind.as_ref() {
        ErrorKind::InvalidArgument { .. } => ConnectionError::InvalidUri(err.to_string()),
        ErrorKind::Authentication { .. } => ConnectionError::Authentication(err.to_string()),
        ErrorKind::ServerSelection { .. } | ErrorKind::DnsResolve { .. } | ErrorKind::Io(_) => {
            ConnectionError::Unreachable(err.to_string())
        }
        _ => ConnectionError::Backend(err.to_string()),
    }
}

fn classify_write_error(err: MongoError) -> WriteError {
    match err.kind.as_ref() {
        ErrorKind::BsonSerialization(_) => WriteError::Serialization(err.to_string()),
        _ => WriteError::Rejected(err.to_string()),
    }
}

fn classify_cursor_error(err: MongoError) -> QueryError {
    match err.kind.as_ref() {
        ErrorKind::BsonDeserialization(_) => QueryError::Decode(err.to_string()),
        _ => QueryError::ConnectionLost(err.to_string()),
    }
}
