//! Index declarations

use bson::{Bson, Document as BsonDocument};
use minimongo_common::Result;
use mongodb::{options::IndexOptions, Collection, IndexModel};
use std::time::Duration;
use tracing::info;

/// Arguments for creating one index.
///
/// Two indices are equal when they have equal arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct Index {
    keys: BsonDocument,
    name: Option<String>,
    unique: Option<bool>,
    sparse: Option<bool>,
    expire_after: Option<Duration>,
}

impl Index {
    /// Index over `keys`, e.g. `doc! { "x": 1, "y": -1 }`
    pub fn new(keys: BsonDocument) -> Self {
        Self {
            keys,
            name: None,
            unique: None,
            sparse: None,
            expire_after: None,
        }
    }

    /// Single-field ascending index
    pub fn ascending(field: &str) -> Self {
        let mut keys = BsonDocument::new();
        keys.insert(field, 1);
        Self::new(keys)
    }

    /// Single-field descending index
    pub fn descending(field: &str) -> Self {
        let mut keys = BsonDocument::new();
        keys.insert(field, -1);
        Self::new(keys)
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn unique(mut self, unique: bool) -> Self {
        self.unique = Some(unique);
        self
    }

    pub fn sparse(mut self, sparse: bool) -> Self {
        self.sparse = Some(sparse);
        self
    }

    pub fn expire_after(mut self, ttl: Duration) -> Self {
        self.expire_after = Some(ttl);
        self
    }

    pub fn keys(&self) -> &BsonDocument {
        &self.keys
    }

    /// Name the server gives this index when none is set: `x_1_y_-1`
    pub fn default_name(&self) -> String {
        self.keys
            .iter()
            .map(|(field, direction)| {
                let direction = match direction {
                    Bson::Int32(n) => n.to_string(),
                    Bson::Int64(n) => n.to_string(),
                    Bson::Double(n) => n.to_string(),
                    Bson::String(s) => s.clone(),
                    other => other.to_string(),
                };
                format!("{}_{}", field, direction)
            })
            .collect::<Vec<_>>()
            .join("_")
    }

    /// Converts to the driver's index model
    pub fn to_model(&self) -> IndexModel {
        let mut options = IndexOptions::default();
        options.name = self.name.clone();
        options.unique = self.unique;
        options.sparse = self.sparse;
        options.expire_after = self.expire_after;

        IndexModel::builder()
            .keys(self.keys.clone())
            .options(options)
            .build()
    }

    /// Creates the index on `collection` if it does not exist yet,
    /// returning its name
    pub async fn ensure(&self, collection: &Collection<BsonDocument>) -> Result<String> {
        let result = collection.create_index(self.to_model()).await?;
        info!(
            collection = collection.name(),
            index = %result.index_name,
            "Index ensured"
        );
        Ok(result.index_name)
    }
}
