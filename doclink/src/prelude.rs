//! Convenient re-exports of commonly used types from doclink.
//!
//! ```ignore
//! use doclink::prelude::*;
//! ```

pub use doclink_core::{
    backend::{StoreConnection, StoreConnector},
    client::{ClientState, DocumentStoreClient, with_client},
    config::{ClientConfig, CollectionPolicy},
    context::{CallContext, CancelHandle},
    cursor::{QueryResult, TypedQueryResult},
    document::{Document, DocumentExt, DocumentId, from_document},
    error::{
        ConnectionError, DocumentStoreError, DocumentStoreResult, Interrupted, QueryError,
        WriteError,
    },
};

pub use futures::TryStreamExt;
