//! Error types and result types for document store client operations.
//!
//! Every fallible operation on the client reports one of three error families:
//!
//! - [`ConnectionError`] - establishing a session failed
//! - [`WriteError`] - an insert or other mutation failed
//! - [`QueryError`] - starting or advancing a scan failed
//!
//! [`DocumentStoreError`] wraps all three for callers that want a single error type.
//! Use [`DocumentStoreResult<T>`] as the return type in that case.

use bson::error::Error as BsonError;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

/// Why an operation was abandoned by its [`CallContext`](crate::context::CallContext).
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupted {
    /// The context deadline passed before the operation completed.
    #[error("deadline exceeded")]
    DeadlineExceeded,
    /// The context's cancellation signal fired.
    #[error("cancelled")]
    Cancelled,
}

/// Errors raised while establishing a connection.
#[derive(Error, Debug)]
pub enum ConnectionError {
    /// The connection URI is empty, malformed or uses an unsupported scheme.
    #[error("Invalid connection URI: {0}")]
    InvalidUri(String),
    /// A configuration value is missing or not understood.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    /// The database or collection name is not acceptable to the store.
    #[error("Invalid namespace: {0}")]
    InvalidNamespace(String),
    /// The store could not be reached.
    #[error("Store unreachable: {0}")]
    Unreachable(String),
    /// The store refused the supplied credentials.
    #[error("Authentication failed: {0}")]
    Authentication(String),
    /// The collection does not exist and the policy forbids creating it.
    #[error("Collection {collection} not found in database {database}")]
    CollectionNotFound {
        database: String,
        collection: String,
    },
    /// `open` was called on a client that already holds a connection.
    #[error("Client is already connected")]
    AlreadyConnected,
    /// The call context interrupted the connect attempt.
    #[error("Connect interrupted: {0}")]
    Interrupted(#[from] Interrupted),
    /// Any other backend failure.
    #[error("Backend error: {0}")]
    Backend(String),
}

/// Errors raised by inserts and other writes.
#[derive(Error, Debug)]
pub enum WriteError {
    /// The client holds no connection.
    #[error("Client is not connected")]
    NotConnected,
    /// The document has no fields.
    #[error("Refusing to insert an empty document")]
    EmptyDocument,
    /// The document contains field names the store cannot hold.
    #[error("Invalid document: {0}")]
    InvalidDocument(String),
    /// The `_id` field holds a value that can never identify a document.
    #[error("Invalid document id: {0}")]
    InvalidId(String),
    /// A document with the same `_id` already exists.
    #[error("Document {id} already exists in collection {collection}")]
    DuplicateId { id: String, collection: String },
    /// The store rejected the write.
    #[error("Write rejected: {0}")]
    Rejected(String),
    /// A value could not be converted into a document.
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// A multi-document write stopped part way through.
    #[error("Write stopped after {written} document(s): {source}")]
    Partial {
        written: usize,
        #[source]
        source: Box<WriteError>,
    },
    /// The call context interrupted the write.
    #[error("Write interrupted: {0}")]
    Interrupted(#[from] Interrupted),
}

impl WriteError {
    /// Returns `true` when the write failed because the client was not connected.
    pub fn is_precondition(&self) -> bool {
        match self {
            WriteError::NotConnected => true,
            WriteError::Partial { source, .. } => source.is_precondition(),
            _ => false,
        }
    }
}

impl From<BsonError> for WriteError {
    fn from(err: BsonError) -> Self {
        WriteError::Serialization(err.to_string())
    }
}

impl From<SerdeJsonError> for WriteError {
    fn from(err: SerdeJsonError) -> Self {
        WriteError::Serialization(err.to_string())
    }
}

/// Errors raised while starting or advancing a scan.
#[derive(Error, Debug)]
pub enum QueryError {
    /// The client holds no connection.
    #[error("Client is not connected")]
    NotConnected,
    /// The store refused to start the scan.
    #[error("Scan failed: {0}")]
    ScanFailed(String),
    /// A record could not be decoded.
    #[error("Decode error: {0}")]
    Decode(String),
    /// The connection dropped while the scan was in progress.
    #[error("Connection lost: {0}")]
    ConnectionLost(String),
    /// The call context interrupted the scan.
    #[error("Query interrupted: {0}")]
    Interrupted(#[from] Interrupted),
}

impl QueryError {
    /// Returns `true` when the query failed because the client was not connected.
    pub fn is_precondition(&self) -> bool {
        matches!(self, QueryError::NotConnected)
    }
}

impl From<BsonError> for QueryError {
    fn from(err: BsonError) -> Self {
        QueryError::Decode(err.to_string())
    }
}

/// Represents any error the client can report.
#[derive(Error, Debug)]
pub enum DocumentStoreError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    #[error(transparent)]
    Write(#[from] WriteError),
    #[error(transparent)]
    Query(#[from] QueryError),
}

/// A specialized `Result` type for callers mixing connection, write and query failures.
pub type DocumentStoreResult<T> = Result<T, DocumentStoreError>;
