//! Document references
//!
//! A reference is stored as the conventional `{ "$ref": ..., "$id": ...,
//! "$db": ... }` sub-document. Extra fields follow the standard ones.

use bson::{Bson, Document as BsonDocument};
use minimongo_common::{MinimongoError, Result};

const REF_KEY: &str = "$ref";
const ID_KEY: &str = "$id";
const DB_KEY: &str = "$db";

#[derive(Debug, Clone, PartialEq)]
pub struct DbRef {
    pub collection: String,
    pub id: Bson,
    pub database: Option<String>,
    pub extra: BsonDocument,
}

impl DbRef {
    pub fn new(collection: impl Into<String>, id: impl Into<Bson>) -> Self {
        Self {
            collection: collection.into(),
            id: id.into(),
            database: None,
            extra: BsonDocument::new(),
        }
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Adds an extra field next to `$ref`/`$id`/`$db`
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Looks up an extra field
    pub fn field(&self, key: &str) -> Option<&Bson> {
        self.extra.get(key)
    }

    pub fn to_document(&self) -> BsonDocument {
        let mut doc = BsonDocument::new();
        doc.insert(REF_KEY, self.collection.clone());
        doc.insert(ID_KEY, self.id.clone());
        if let Some(database) = &self.database {
            doc.insert(DB_KEY, database.clone());
        }
        for (key, value) in &self.extra {
            doc.insert(key.clone(), value.clone());
        }
        doc
    }

    pub fn from_document(mut doc: BsonDocument) -> Result<Self> {
        let collection = match doc.remove(REF_KEY) {
            Some(Bson::String(collection)) => collection,
            _ => {
                return Err(MinimongoError::InvalidReference(
                    "Reference is missing a string '$ref'".to_string(),
                ))
            }
        };
        let id = doc.remove(ID_KEY).ok_or_else(|| {
            MinimongoError::InvalidReference("Reference is missing '$id'".to_string())
        })?;
        let database = match doc.remove(DB_KEY) {
            None | Some(Bson::Null) => None,
            Some(Bson::String(database)) => Some(database),
            Some(_) => {
                return Err(MinimongoError::InvalidReference(
                    "Reference '$db' must be a string".to_string(),
                ))
            }
        };

        Ok(Self {
            collection,
            id,
            database,
            extra: doc,
        })
    }
}

impl From<DbRef> for Bson {
    fn from(reference: DbRef) -> Self {
        Bson::Document(reference.to_document())
    }
}

impl TryFrom<&Bson> for DbRef {
    type Error = MinimongoError;

    fn try_from(value: &Bson) -> Result<Self> {
        match value {
            Bson::Document(doc) => DbRef::from_document(doc.clone()),
            other => Err(MinimongoError::InvalidReference(format!(
                "Expected a reference document, found {:?}",
                other.element_type()
            ))),
        }
    }
}
