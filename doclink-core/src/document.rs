//! Schema-less documents, document ids and conversions between formats.
//!
//! Documents are plain [`bson::Document`] maps. The core imposes no schema; the
//! only reserved field is [`ID_FIELD`], which holds the document's identity.
//! [`DocumentExt`] converts between documents and serde types or JSON values.

use std::fmt;

use bson::{Bson, de::deserialize_from_bson, oid::ObjectId, ser::serialize_to_bson};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::error::{QueryError, WriteError};

pub use bson::Document;

/// Name of the field holding a document's identity.
pub const ID_FIELD: &str = "_id";

/// Identity of a stored document, the value of its `_id` field.
///
/// Store-generated ids are [`ObjectId`]s, but any BSON value accepted by
/// [`validate_for_insert`] can be supplied by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(Bson);

impl DocumentId {
    /// Generates a fresh [`ObjectId`] based identifier.
    pub fn generate() -> Self {
        Self(Bson::ObjectId(ObjectId::new()))
    }

    pub fn as_bson(&self) -> &Bson {
        &self.0
    }

    pub fn into_bson(self) -> Bson {
        self.0
    }

    /// Returns the id as an [`ObjectId`] if it is one.
    pub fn as_object_id(&self) -> Option<ObjectId> {
        self.0.as_object_id()
    }

    /// Returns the `_id` of a document, if it has one.
    pub fn of(document: &Document) -> Option<Self> {
        document.get(ID_FIELD).cloned().map(Self)
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Bson> for DocumentId {
    fn from(value: Bson) -> Self {
        Self(value)
    }
}

impl From<ObjectId> for DocumentId {
    fn from(value: ObjectId) -> Self {
        Self(Bson::ObjectId(value))
    }
}

impl From<DocumentId> for Bson {
    fn from(value: DocumentId) -> Self {
        value.0
    }
}

/// Checks that a document can be handed to a backend for insertion.
///
/// A document is rejected when:
///
/// - it has no fields
/// - its `_id` is null, undefined, an array or a regular expression
/// - any field name, at any depth, is empty, starts with `$` or contains a NUL byte
///
/// # Errors
///
/// Returns [`WriteError::EmptyDocument`], [`WriteError::InvalidId`] or
/// [`WriteError::InvalidDocument`] respectively.
pub fn validate_for_insert(document: &Document) -> Result<(), WriteError> {
    if document.is_empty() {
        return Err(WriteError::EmptyDocument);
    }

    if let Some(id) = document.get(ID_FIELD) {
        match id {
            Bson::Null | Bson::Undefined | Bson::Array(_) | Bson::RegularExpression(_) => {
                return Err(WriteError::InvalidId(format!(
                    "{:?} cannot be used as a document id",
                    id.element_type()
                )));
            }
            _ => {}
        }
    }

    validate_field_names(document, "")
}

fn validate_field_names(document: &Document, path: &str) -> Result<(), WriteError> {
    for (key, value) in document {
        let full_path = if path.is_empty() {
            key.clone()
        } else {
            format!("{path}.{key}")
        };

        if key.is_empty() {
            return Err(WriteError::InvalidDocument(format!(
                "empty field name under '{path}'"
            )));
        }
        if key.starts_with('$') {
            return Err(WriteError::InvalidDocument(format!(
                "field '{full_path}' must not start with '$'"
            )));
        }
        if key.contains('\0') {
            return Err(WriteError::InvalidDocument(format!(
                "field '{full_path}' contains a NUL byte"
            )));
        }

        validate_nested(value, &full_path)?;
    }

    Ok(())
}

fn validate_nested(value: &Bson, path: &str) -> Result<(), WriteError> {
    match value {
        Bson::Document(inner) => validate_field_names(inner, path),
        Bson::Array(items) => items
            .iter()
            .enumerate()
            .try_for_each(|(index, item)| validate_nested(item, &format!("{path}.{index}"))),
        _ => Ok(()),
    }
}

/// Conversion helpers between serde types, JSON values and documents.
///
/// Implemented for every `Serialize` type for the `to_*` side, and as associated
/// functions for decoding.
pub trait DocumentExt {
    /// Converts this value into a document.
    ///
    /// # Errors
    ///
    /// Returns [`WriteError::Serialization`] if the value does not serialize to a map.
    fn to_document(&self) -> Result<Document, WriteError>;
}

impl<T: Serialize> DocumentExt for T {
    fn to_document(&self) -> Result<Document, WriteError> {
        match serialize_to_bson(self)? {
            Bson::Document(document) => Ok(document),
            other => Err(WriteError::Serialization(format!(
                "expected a map, got {:?}",
                other.element_type()
            ))),
        }
    }
}

/// Decodes a document into any deserializable type.
///
/// # Errors
///
/// Returns [`QueryError::Decode`] if the document does not match `T`.
pub fn from_document<T: DeserializeOwned>(document: Document) -> Result<T, QueryError> {
    Ok(deserialize_from_bson(Bson::Document(document))?)
}

/// Converts a JSON value into the documents it describes.
///
/// An object becomes one document; an array must contain only objects and
/// becomes one document per element.
///
/// # Errors
///
/// Returns [`WriteError::Serialization`] for any other JSON shape.
pub fn documents_from_json(value: Value) -> Result<Vec<Document>, WriteError> {
    match value {
        Value::Object(_) => Ok(vec![value.to_document()?]),
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(index, item)| match item {
                Value::Object(_) => item.to_document(),
                other => Err(WriteError::Serialization(format!(
                    "element {index} is not a JSON object: {other}"
                ))),
            })
            .collect(),
        other => Err(WriteError::Serialization(format!(
            "expected a JSON object or array of objects, got {other}"
        ))),
    }
}
