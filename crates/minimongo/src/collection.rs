//! Typed collection handle
//!
//! [`Collection<M>`] wraps the driver collection bound to model `M` so that
//! lookups return `M` instead of raw documents. Collections of interface
//! models have no driver collection: dropping them does nothing and every
//! other operation fails with an interface error.
//!
//! Model-specific behavior is added with an extension trait:
//!
//! ```ignore
//! trait Custom {
//!     fn custom(&self) -> &'static str;
//! }
//!
//! impl Custom for Collection<TestModelCollection> {
//!     fn custom(&self) -> &'static str {
//!         "It works!"
//!     }
//! }
//! ```

use crate::attr_dict::AttrDict;
use crate::dbref::DbRef;
use crate::model::Model;
use crate::query::Find;
use crate::registry::ModelBinding;
use crate::validation::{ObjectIdParser, ValidatedFieldName};
use crate::Result;
use bson::{doc, oid::ObjectId, Bson, Document as BsonDocument};
use futures::TryStreamExt;
use minimongo_common::MinimongoError;
use mongodb::options::{FindOneOptions, ReplaceOptions};
use mongodb::IndexModel;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::debug;

/// What `find_one` looks for: a filter, or a document id
#[derive(Debug, Clone, PartialEq)]
pub enum Selector {
    Filter(BsonDocument),
    Id(Bson),
}

impl Selector {
    pub fn into_filter(self) -> BsonDocument {
        match self {
            Selector::Filter(filter) => filter,
            Selector::Id(id) => doc! { "_id": id },
        }
    }
}

impl From<BsonDocument> for Selector {
    fn from(filter: BsonDocument) -> Self {
        Selector::Filter(filter)
    }
}

impl From<ObjectId> for Selector {
    fn from(id: ObjectId) -> Self {
        Selector::Id(Bson::ObjectId(id))
    }
}

/// String ids that look like an ObjectId are converted to one
impl From<&str> for Selector {
    fn from(id: &str) -> Self {
        Selector::Id(ObjectIdParser::parse_id(id))
    }
}

impl From<String> for Selector {
    fn from(id: String) -> Self {
        Selector::from(id.as_str())
    }
}

impl From<Bson> for Selector {
    fn from(value: Bson) -> Self {
        match value {
            Bson::Document(filter) => Selector::Filter(filter),
            Bson::String(id) => Selector::from(id),
            other => Selector::Id(other),
        }
    }
}

impl From<&Bson> for Selector {
    fn from(value: &Bson) -> Self {
        Selector::from(value.clone())
    }
}

/// Collection bound to model `M`
pub struct Collection<M: Model> {
    binding: Arc<ModelBinding>,
    _model: PhantomData<fn() -> M>,
}

impl<M: Model> Clone for Collection<M> {
    fn clone(&self) -> Self {
        Self {
            binding: self.binding.clone(),
            _model: PhantomData,
        }
    }
}

impl<M: Model> std::fmt::Debug for Collection<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("model", &self.binding.model_name())
            .field("database", &self.binding.database_name())
            .field("name", &self.binding.collection_name())
            .finish()
    }
}

impl<M: Model> Collection<M> {
    pub(crate) fn new(binding: Arc<ModelBinding>) -> Self {
        Self {
            binding,
            _model: PhantomData,
        }
    }

    /// Collection name
    pub fn name(&self) -> &str {
        self.binding.collection_name()
    }

    /// Database name, when configured
    pub fn database_name(&self) -> Option<&str> {
        self.binding.database_name()
    }

    pub fn binding(&self) -> &Arc<ModelBinding> {
        &self.binding
    }

    pub fn is_interface(&self) -> bool {
        self.binding.is_interface()
    }

    /// Underlying driver collection
    pub fn inner(&self) -> Result<&mongodb::Collection<BsonDocument>> {
        self.binding.driver_collection("access the driver collection")
    }

    /// Wraps a stored document as a model instance, through the field map
    pub fn wrap(&self, doc: BsonDocument) -> M {
        let field_map = self.binding.options().field_map.clone();
        M::from_attr_dict(AttrDict::with_field_map(doc, field_map))
    }

    /// Starts a find query over documents matching `filter`
    pub fn find(&self, filter: BsonDocument) -> Find<M> {
        Find::new(self.clone(), filter)
    }

    /// Starts a find query over every document
    pub fn find_all(&self) -> Find<M> {
        self.find(BsonDocument::new())
    }

    /// Finds one document by filter or by id
    pub async fn find_one(&self, selector: impl Into<Selector> + Send) -> Result<Option<M>> {
        self.find_one_with(selector, None).await
    }

    /// Finds one document, only returning the projected fields
    pub async fn find_one_with(
        &self,
        selector: impl Into<Selector> + Send,
        projection: Option<BsonDocument>,
    ) -> Result<Option<M>> {
        let collection = self.binding.driver_collection("find_one")?;
        self.binding.prepare().await?;

        let mut options = FindOneOptions::default();
        options.projection = projection;

        let found = collection
            .find_one(selector.into().into_filter())
            .with_options(options)
            .await?;
        Ok(found.map(|doc| self.wrap(doc)))
    }

    /// Dereferences `reference`.
    ///
    /// # Errors
    /// Invalid reference when it names another collection, or another
    /// database when it names one at all.
    pub async fn from_dbref(&self, reference: &DbRef) -> Result<Option<M>> {
        if reference.collection != self.name() {
            return Err(MinimongoError::InvalidReference(
                "DBRef points to an invalid collection.".to_string(),
            ));
        }
        if let Some(database) = &reference.database {
            if Some(database.as_str()) != self.database_name() {
                return Err(MinimongoError::InvalidReference(
                    "DBRef points to an invalid database.".to_string(),
                ));
            }
        }
        self.find_one(&reference.id).await
    }

    /// Count documents matching the filter
    pub async fn count_documents(&self, filter: BsonDocument) -> Result<u64> {
        self.find(filter).count(false).await
    }

    /// Stores a document: inserted when it has no `_id`, replaced (or
    /// inserted) by `_id` otherwise. Returns the stored `_id`.
    pub async fn save_document(&self, doc: &BsonDocument) -> Result<Bson> {
        let collection = self.binding.driver_collection("save")?;
        self.binding.prepare().await?;

        match doc.get("_id") {
            Some(id) => {
                let mut options = ReplaceOptions::default();
                options.upsert = Some(true);
                collection
                    .replace_one(doc! { "_id": id.clone() }, doc)
                    .with_options(options)
                    .await?;
                debug!(collection = self.name(), "Replaced document");
                Ok(id.clone())
            }
            None => {
                let result = collection.insert_one(doc).await?;
                debug!(collection = self.name(), "Inserted document");
                Ok(result.inserted_id)
            }
        }
    }

    /// Applies an update spec to the document with `_id`.
    ///
    /// A spec made only of update operators (`$set`, `$inc`, ...) is sent
    /// as an update; anything else replaces the stored document.
    ///
    /// # Errors
    /// Validation error when a replacement has `$`-prefixed or otherwise
    /// invalid top-level keys.
    pub async fn update_by_id(&self, id: &Bson, spec: BsonDocument) -> Result<u64> {
        let collection = self.binding.driver_collection("update")?;

        let is_operator_spec = !spec.is_empty() && spec.keys().all(|key| key.starts_with('$'));
        for key in spec.keys() {
            ValidatedFieldName::new(key, is_operator_spec)?;
        }
        self.binding.prepare().await?;

        let filter = doc! { "_id": id.clone() };

        let modified = if is_operator_spec {
            collection.update_one(filter, spec).await?.modified_count
        } else {
            collection.replace_one(filter, spec).await?.modified_count
        };
        Ok(modified)
    }

    /// Deletes the document with `_id`; true when something was deleted
    pub async fn remove_by_id(&self, id: &Bson) -> Result<bool> {
        let collection = self.binding.driver_collection("remove")?;
        let result = collection.delete_one(doc! { "_id": id.clone() }).await?;
        Ok(result.deleted_count > 0)
    }

    /// Indices currently defined on the collection
    pub async fn index_information(&self) -> Result<Vec<IndexModel>> {
        let collection = self.binding.driver_collection("list indexes")?;
        let indexes: Vec<IndexModel> = collection.list_indexes().await?.try_collect().await?;
        Ok(indexes)
    }

    /// Names of the indices currently defined on the collection
    pub async fn index_names(&self) -> Result<Vec<String>> {
        let collection = self.binding.driver_collection("list indexes")?;
        Ok(collection.list_index_names().await?)
    }

    /// Creates every declared index
    pub async fn ensure_indices(&self) -> Result<()> {
        self.binding.auto_index().await
    }

    /// Drops the collection. A no-op for interface models.
    pub async fn drop(&self) -> Result<()> {
        if self.is_interface() {
            return Ok(());
        }
        self.binding.driver_collection("drop")?.drop().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attr_dict::FieldMap;
    use crate::model;
    use crate::options::Meta;

    model! {
        pub struct Widget {
            meta: Meta::new().database("minimongo_test").collection("widgets"),
        }
    }

    model! {
        pub struct MappedWidget {
            meta: Meta::new()
                .database("minimongo_test")
                .collection("mapped_widgets")
                .field_map(FieldMap::new().rule(
                    |key, value| key == "x" && matches!(value, Bson::Int32(_)),
                    |value| match value {
                        Bson::Int32(n) => Bson::Double(n as f64 * 4.0 / 3.0),
                        other => other,
                    },
                )),
        }
    }

    model! {
        pub struct WidgetInterface {
            meta: Meta::new().interface(),
        }
    }

    trait Custom {
        fn custom(&self) -> &'static str;
    }

    impl Custom for Collection<Widget> {
        fn custom(&self) -> &'static str {
            "It works!"
        }
    }

    #[test]
    fn test_selector_from_filter() {
        let selector = Selector::from(doc! { "x": 1 });
        assert_eq!(selector.into_filter(), doc! { "x": 1 });
    }

    #[test]
    fn test_selector_from_string_id() {
        let oid = ObjectId::new();
        let selector = Selector::from(oid.to_hex());
        assert_eq!(selector, Selector::Id(Bson::ObjectId(oid)));
        assert_eq!(selector.into_filter(), doc! { "_id": oid });

        let selector = Selector::from("plain-key");
        assert_eq!(selector.into_filter(), doc! { "_id": "plain-key" });
    }

    #[test]
    fn test_selector_from_bson() {
        assert_eq!(Selector::from(Bson::Int32(5)), Selector::Id(Bson::Int32(5)));
        assert_eq!(
            Selector::from(Bson::Document(doc! { "y": 2 })),
            Selector::Filter(doc! { "y": 2 })
        );
    }

    #[tokio::test]
    async fn test_collection_names() {
        let collection = Widget::collection().unwrap();
        assert_eq!(collection.name(), "widgets");
        assert_eq!(collection.database_name(), Some("minimongo_test"));
        assert!(!collection.is_interface());
        assert_eq!(collection.custom(), "It works!");
    }

    #[tokio::test]
    async fn test_wrap_returns_model() {
        let collection = Widget::collection().unwrap();
        let widget = collection.wrap(doc! { "x": 1 });
        assert_eq!(widget.attr("x").unwrap(), &Bson::Int32(1));
    }

    #[tokio::test]
    async fn test_wrap_applies_field_map() {
        let collection = MappedWidget::collection().unwrap();
        let widget = collection.wrap(doc! { "x": 12, "y": 1 });

        assert_eq!(widget.attr("x").unwrap(), &Bson::Double(16.0));
        assert_eq!(widget.attr("y").unwrap(), &Bson::Int32(1));
    }

    #[tokio::test]
    async fn test_update_rejects_mixed_spec() {
        let collection = Widget::collection().unwrap();
        let id = Bson::ObjectId(ObjectId::new());

        let err = collection
            .update_by_id(&id, doc! { "$set": { "x": 1 }, "y": 2 })
            .await
            .unwrap_err();
        assert!(matches!(err, MinimongoError::Validation(_)));
        assert!(err.to_string().contains("'$set'"));
    }

    #[tokio::test]
    async fn test_from_dbref_rejects_foreign_references() {
        let collection = Widget::collection().unwrap();
        let id = ObjectId::new();

        let err = collection
            .from_dbref(&DbRef::new("foo", id))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("invalid collection"));

        let err = collection
            .from_dbref(&DbRef::new("widgets", id).with_database("foo"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("invalid database"));
    }

    #[tokio::test]
    async fn test_interface_collection() {
        let collection = WidgetInterface::collection().unwrap();
        assert!(collection.is_interface());

        collection.drop().await.unwrap();

        let err = collection.find_one(doc! {}).await.unwrap_err();
        assert!(err.to_string().contains("Can't find_one on an interface collection"));

        let err = collection.save_document(&doc! { "x": 5 }).await.unwrap_err();
        assert!(err.to_string().contains("Can't save on an interface collection"));
    }
}
