//! Lazy scan results.
//!
//! [`QueryResult`] is what [`find_all`](crate::client::DocumentStoreClient::find_all)
//! hands back: a stream of documents pulled from the backend one step at a time.
//! It is not restartable; issue a new query to scan again.

use std::{
    fmt,
    marker::PhantomData,
    pin::Pin,
    task::{Context, Poll},
};

use futures::{
    StreamExt, TryStreamExt,
    stream::{self, BoxStream, Stream},
};
use serde::de::DeserializeOwned;

use crate::{
    backend::DocumentStream,
    context::CallContext,
    document::{Document, from_document},
    error::QueryError,
};

/// A finite, lazily advanced sequence of scanned documents.
///
/// Every poll may perform I/O. The first error ends the sequence: after yielding
/// an `Err` the stream reports exhaustion, so a failed scan never continues past
/// the record that broke it.
///
/// # Example
///
/// ```ignore
/// use futures::TryStreamExt;
///
/// let mut results = client.find_all().await?;
/// while let Some(document) = results.try_next().await? {
///     println!("{document}");
/// }
/// ```
pub struct QueryResult {
    inner: BoxStream<'static, Result<Document, QueryError>>,
    yielded: usize,
    exhausted: bool,
}

impl QueryResult {
    /// Wraps a backend stream, applying `context` to every step.
    pub fn new(stream: DocumentStream, context: CallContext) -> Self {
        let inner = stream::unfold(
            (stream, context),
            |(mut stream, context)| async move {
                match context.run(stream.next()).await {
                    Ok(Some(item)) => Some((item, (stream, context))),
                    Ok(None) => None,
                    Err(interrupted) => Some((Err(interrupted.into()), (stream, context))),
                }
            },
        )
        .boxed();

        Self {
            inner,
            yielded: 0,
            exhausted: false,
        }
    }

    /// A result that yields nothing.
    pub fn empty() -> Self {
        Self::new(stream::empty().boxed(), CallContext::background())
    }

    /// Number of documents yielded so far.
    pub fn yielded(&self) -> usize {
        self.yielded
    }

    /// Returns `true` once the scan has ended, either normally or by error.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Drains the remaining documents into memory.
    ///
    /// # Errors
    ///
    /// Returns the first error encountered; documents read before it are discarded.
    pub async fn try_collect_all(self) -> Result<Vec<Document>, QueryError> {
        self.try_collect().await
    }

    /// Decodes each remaining document into `T`.
    ///
    /// A document that fails to decode is yielded as [`QueryError::Decode`] and
    /// ends the sequence, exactly like a backend failure.
    pub fn into_typed<T: DeserializeOwned>(self) -> TypedQueryResult<T> {
        TypedQueryResult {
            inner: self,
            _marker: PhantomData,
        }
    }
}

impl Stream for QueryResult {
    type Item = Result<Document, QueryError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.exhausted {
            return Poll::Ready(None);
        }

        match self.inner.poll_next_unpin(cx) {
            Poll::Ready(Some(Ok(document))) => {
                self.yielded += 1;
                tracing::trace!(yielded = self.yielded, "scan step");
                Poll::Ready(Some(Ok(document)))
            }
            Poll::Ready(Some(Err(err))) => {
                self.exhausted = true;
                tracing::debug!(yielded = self.yielded, error = %err, "scan aborted");
                Poll::Ready(Some(Err(err)))
            }
            Poll::Ready(None) => {
                self.exhausted = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.exhausted {
            (0, Some(0))
        } else {
            (0, None)
        }
    }
}

impl fmt::Debug for QueryResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryResult")
            .field("yielded", &self.yielded)
            .field("exhausted", &self.exhausted)
            .finish_non_exhaustive()
    }
}

/// A [`QueryResult`] decoding each document into `T`.
#[derive(Debug)]
pub struct TypedQueryResult<T> {
    inner: QueryResult,
    _marker: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> TypedQueryResult<T> {
    pub fn yielded(&self) -> usize {
        self.inner.yielded()
    }
}

impl<T: DeserializeOwned> Stream for TypedQueryResult<T> {
    type Item = Result<T, QueryError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let item = match self.inner.poll_next_unpin(cx) {
            Poll::Ready(Some(Ok(document))) => {
                let decoded = from_document(document);
                if decoded.is_err() {
                    self.inner.exhausted = true;
                }
                Some(decoded)
            }
            Poll::Ready(Some(Err(err))) => Some(Err(err)),
            Poll::Ready(None) => None,
            Poll::Pending => return Poll::Pending,
        };

        Poll::Ready(item)
    }
}
