//! Document models
//!
//! A model is a type wrapping an [`AttrDict`] plus a [`Meta`] declaration.
//! The [`model!`](crate::model!) macro writes the wrapper; everything else
//! (binding, collection access, persistence, references) comes from the
//! provided methods of [`Model`].
//!
//! # Example
//!
//! ```ignore
//! use minimongo::{model, Index, Meta, Model};
//!
//! model! {
//!     /// Blog posts
//!     pub struct BlogPost {
//!         meta: Meta::new().database("blog").index(Index::ascending("slug")),
//!     }
//! }
//!
//! let mut post = BlogPost::new();
//! post.set_attr("slug", "hello")?;
//! post.save().await?;
//!
//! assert_eq!(BlogPost::collection()?.name(), "blog_post");
//! ```

use crate::attr_dict::AttrDict;
use crate::collection::Collection;
use crate::connection::Connection;
use crate::dbref::DbRef;
use crate::options::{Meta, Options};
use crate::registry::{ModelBase, ModelBinding};
use crate::Result;
use async_trait::async_trait;
use bson::{doc, oid::ObjectId, Bson, Document as BsonDocument};
use minimongo_common::MinimongoError;
use mongodb::Database;
use std::sync::Arc;

/// Options for [`Model::save_with`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveOptions {
    /// Write the generated `_id` back into the local document
    pub manipulate: bool,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self { manipulate: true }
    }
}

/// Core trait for document models
///
/// Implementors only provide the name, the declaration and access to the
/// wrapped [`AttrDict`]; use [`model!`](crate::model!) to generate them.
#[async_trait]
pub trait Model: Sized + Send + Sync + 'static {
    /// Type name; the collection name is derived from it when the
    /// declaration does not set one
    fn model_name() -> &'static str;

    /// Metadata declaration
    fn meta() -> Meta {
        Meta::default()
    }

    fn from_attr_dict(data: AttrDict) -> Self;

    fn attrs(&self) -> &AttrDict;

    fn attrs_mut(&mut self) -> &mut AttrDict;

    /// Registers the model on first use and returns its binding
    fn binding() -> Result<Arc<ModelBinding>> {
        ModelBase::bind::<Self>()
    }

    /// Resolved options
    fn options() -> Result<Options> {
        Ok(Self::binding()?.options().clone())
    }

    fn collection() -> Result<Collection<Self>> {
        Ok(Collection::new(Self::binding()?))
    }

    fn database() -> Result<Database> {
        Ok(Self::binding()?.database()?.clone())
    }

    /// Pooled connection shared by every model on the same host and port
    fn connection() -> Result<Connection> {
        Ok(Self::binding()?.connection()?.clone())
    }

    /// Creates every declared index, whatever `auto_index` says
    async fn auto_index() -> Result<()> {
        Self::binding()?.auto_index().await
    }

    /// Wraps `doc`, running it through the model's field map
    fn from_document(doc: BsonDocument) -> Self {
        Self::from_attr_dict(AttrDict::with_field_map(doc, Self::meta().field_map))
    }

    /// Empty instance
    fn new() -> Self {
        Self::from_document(BsonDocument::new())
    }

    /// The `_id` field, if set
    fn id(&self) -> Option<&Bson> {
        self.attrs().get("_id")
    }

    /// Reference to this document, including its database
    fn dbref(&mut self) -> Result<DbRef> {
        self.dbref_with(true, BsonDocument::new())
    }

    /// Reference to this document.
    ///
    /// An `_id` is generated when missing. `extra` fields are carried next
    /// to `$ref`, `$id` and `$db`. The document is left untouched when the
    /// model cannot be bound.
    fn dbref_with(&mut self, with_database: bool, extra: BsonDocument) -> Result<DbRef> {
        let binding = Self::binding()?;
        let id = match self.attrs().get("_id").cloned() {
            Some(Bson::Null) => {
                return Err(MinimongoError::InvalidReference(
                    "ObjectId must be valid to create a DBRef.".to_string(),
                ))
            }
            Some(id) => id,
            None => {
                self.attrs_mut().set_item("_id", ObjectId::new());
                self.attrs().attr("_id")?.clone()
            }
        };

        let mut reference = DbRef::new(binding.collection_name(), id);
        if with_database {
            if let Some(database) = binding.database_name() {
                reference = reference.with_database(database);
            }
        }
        reference.extra = extra;
        Ok(reference)
    }

    /// Saves this document to its collection
    async fn save(&mut self) -> Result<()> {
        self.save_with(SaveOptions::default()).await
    }

    /// Saves this document: inserted when it has no `_id`, replaced by
    /// `_id` otherwise
    async fn save_with(&mut self, options: SaveOptions) -> Result<()> {
        let collection = Self::collection()?;
        let id = collection.save_document(self.attrs().as_document()).await?;

        if options.manipulate && self.id().is_none() {
            self.attrs_mut().set_item("_id", id);
        }
        Ok(())
    }

    /// Saves and hands the document back, for chaining on new instances
    async fn into_saved(mut self) -> Result<Self> {
        self.save().await?;
        Ok(self)
    }

    /// Deletes this document; true when something was deleted
    async fn remove(&self) -> Result<bool> {
        let id = self.attrs().attr("_id")?.clone();
        Self::collection()?.remove_by_id(&id).await
    }

    /// Writes the local fields with `$set`.
    ///
    /// Fields removed locally stay on the server.
    async fn update(&self) -> Result<()> {
        self.mongo_update(None).await
    }

    /// Sends `spec` as an update for this document, or `$set` of the local
    /// fields when `None`. The local copy is left unchanged.
    async fn mongo_update(&self, spec: Option<BsonDocument>) -> Result<()> {
        let id = self.attrs().attr("_id")?.clone();

        let spec = match spec {
            Some(spec) => spec,
            None => {
                let mut fields = self.attrs().as_document().clone();
                fields.remove("_id");
                if fields.is_empty() {
                    return Ok(());
                }
                doc! { "$set": fields }
            }
        };

        Self::collection()?.update_by_id(&id, spec).await?;
        Ok(())
    }

    /// Re-reads this document by `_id` and merges the stored fields in.
    ///
    /// `fields` restricts the read to a projection. Fields missing from
    /// the stored document are kept.
    async fn load(&mut self, fields: Option<BsonDocument>) -> Result<()> {
        let id = self.attrs().attr("_id")?.clone();
        let found = Self::collection()?
            .find_one_with(id.clone(), fields)
            .await?
            .ok_or_else(|| {
                MinimongoError::NotFound(format!("{} with _id {}", Self::model_name(), id))
            })?;

        self.attrs_mut().merge_mapped(found.attrs().as_document().clone());
        Ok(())
    }
}

/// Declares a model type.
///
/// ```ignore
/// model! {
///     pub struct TestModel {
///         meta: Meta::new().database("minimongo_test").index(Index::ascending("x")),
///     }
/// }
///
/// // No declaration: everything comes from the global defaults
/// model! {
///     pub struct SomeModel;
/// }
/// ```
///
/// The type wraps an [`AttrDict`], dereferences to it, compares equal to
/// plain documents and displays as `TestModel({ "x": 1 })`.
#[macro_export]
macro_rules! model {
    ($(#[$attr:meta])* $vis:vis struct $name:ident;) => {
        $crate::model! {
            $(#[$attr])*
            $vis struct $name {
                meta: $crate::Meta::default(),
            }
        }
    };
    ($(#[$attr:meta])* $vis:vis struct $name:ident { meta: $meta:expr $(,)? }) => {
        $(#[$attr])*
        #[derive(Clone, PartialEq)]
        $vis struct $name($crate::AttrDict);

        impl $crate::Model for $name {
            fn model_name() -> &'static str {
                stringify!($name)
            }

            fn meta() -> $crate::Meta {
                $meta
            }

            fn from_attr_dict(data: $crate::AttrDict) -> Self {
                Self(data)
            }

            fn attrs(&self) -> &$crate::AttrDict {
                &self.0
            }

            fn attrs_mut(&mut self) -> &mut $crate::AttrDict {
                &mut self.0
            }
        }

        impl ::std::default::Default for $name {
            fn default() -> Self {
                <Self as $crate::Model>::from_document($crate::bson::Document::new())
            }
        }

        impl ::std::convert::From<$crate::bson::Document> for $name {
            fn from(doc: $crate::bson::Document) -> Self {
                <Self as $crate::Model>::from_document(doc)
            }
        }

        impl ::std::ops::Deref for $name {
            type Target = $crate::AttrDict;

            fn deref(&self) -> &$crate::AttrDict {
                &self.0
            }
        }

        impl ::std::ops::DerefMut for $name {
            fn deref_mut(&mut self) -> &mut $crate::AttrDict {
                &mut self.0
            }
        }

        impl ::std::cmp::PartialEq<$crate::bson::Document> for $name {
            fn eq(&self, other: &$crate::bson::Document) -> bool {
                self.0 == *other
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl ::std::fmt::Debug for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                write!(f, "{}({:?})", stringify!($name), self.0.as_document())
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attr_dict::FieldMap;
    use crate::index::Index;
    use crate::model;

    model! {
        /// Model used by the unit tests
        pub struct TestModel {
            meta: Meta::new()
                .database("minimongo_test")
                .collection("minimongo_test")
                .index(Index::ascending("x")),
        }
    }

    model! {
        pub struct TestDerivedModel {
            meta: TestModel::meta().collection("minimongo_derived"),
        }
    }

    model! {
        pub struct AutoNamedModel {
            meta: Meta::new().database("minimongo_test"),
        }
    }

    model! {
        pub struct TestModelInterface {
            meta: Meta::new().interface(),
        }
    }

    model! {
        pub struct TestFieldMapper {
            meta: Meta::new()
                .database("minimongo_test")
                .collection("minimongo_mapper")
                .field_map(FieldMap::new().rule(
                    |key, value| key == "x" && matches!(value, Bson::Int32(_) | Bson::Int64(_)),
                    |value| match value {
                        Bson::Int32(n) => Bson::Double(n as f64 * 4.0 / 3.0),
                        Bson::Int64(n) => Bson::Double(n as f64 * 4.0 / 3.0),
                        other => other,
                    },
                )),
        }
    }

    #[tokio::test]
    async fn test_meta() {
        let options = TestModel::options().unwrap();
        assert_eq!(options.database.as_deref(), Some("minimongo_test"));
        assert_eq!(options.collection, "minimongo_test");
        assert_eq!(options.indices, vec![Index::ascending("x")]);
        assert!(!options.interface);
    }

    #[test]
    fn test_dictyness() {
        let mut item = TestModel::from(doc! { "x": 642 });
        assert_eq!(item.item("x").unwrap(), item.attr("x").unwrap());
        assert_eq!(item.attr("x").unwrap(), &Bson::Int32(642));

        item.set_attr("y", 426).unwrap();
        assert_eq!(item.item("y").unwrap(), &Bson::Int32(426));
        assert_eq!(item.keys().count(), 2);

        item.del_item("x").unwrap();
        assert_eq!(item, doc! { "y": 426 });
        item.set_attr("z", 3).unwrap();
        item.del_attr("y").unwrap();
        assert_eq!(item, doc! { "z": 3 });
    }

    #[test]
    fn test_display() {
        assert_eq!(TestModel::new().to_string(), "TestModel({})");
        assert_eq!(
            TestModel::from(doc! { "foo": "bar" }).to_string(),
            format!("TestModel({})", doc! { "foo": "bar" })
        );
    }

    #[tokio::test]
    async fn test_db_and_collection_names() {
        assert_eq!(TestModel::database().unwrap().name(), "minimongo_test");
        assert_eq!(TestModel::collection().unwrap().name(), "minimongo_test");
    }

    #[tokio::test]
    async fn test_derived_model() {
        let collection = TestDerivedModel::collection().unwrap();
        assert_eq!(collection.name(), "minimongo_derived");
        assert_eq!(collection.database_name(), Some("minimongo_test"));
        assert_eq!(TestDerivedModel::options().unwrap().indices, vec![Index::ascending("x")]);
    }

    #[tokio::test]
    async fn test_auto_collection_name() {
        assert_eq!(AutoNamedModel::collection().unwrap().name(), "auto_named_model");
    }

    #[tokio::test]
    async fn test_dbref_generates_id() {
        let mut model = TestModel::from(doc! { "x": 1 });
        assert!(model.id().is_none());

        let reference = model.dbref().unwrap();
        assert!(matches!(model.id(), Some(Bson::ObjectId(_))));
        assert_eq!(Some(&reference.id), model.id());
        assert_eq!(reference.collection, "minimongo_test");
        assert_eq!(reference.database.as_deref(), Some("minimongo_test"));
    }

    #[tokio::test]
    async fn test_dbref_options() {
        let mut model = TestModel::new();

        let reference = model.dbref_with(false, BsonDocument::new()).unwrap();
        assert!(reference.database.is_none());

        let reference = model.dbref_with(true, doc! { "name": "foo" }).unwrap();
        assert!(reference.database.is_some());
        assert_eq!(reference.field("name"), Some(&Bson::String("foo".to_string())));
    }

    #[tokio::test]
    async fn test_dbref_null_id() {
        let mut model = TestModel::from(doc! { "_id": Bson::Null });
        let err = model.dbref().unwrap_err();
        assert!(matches!(err, MinimongoError::InvalidReference(_)));
    }

    #[test]
    fn test_field_mapper() {
        let mut mapped = TestFieldMapper::new();
        mapped.set_attr("x", 6).unwrap();
        mapped.set_attr("y", 7).unwrap();
        mapped.set_attr("z", 6.0).unwrap();

        assert_eq!(mapped.attr("x").unwrap(), &Bson::Double(8.0));
        assert_eq!(mapped.attr("y").unwrap(), &Bson::Int32(7));
        assert_eq!(mapped.attr("z").unwrap(), &Bson::Double(6.0));
    }

    #[test]
    fn test_field_mapper_on_construction() {
        let mapped = TestFieldMapper::from(doc! { "x": 12, "y": 1 });
        assert_eq!(mapped.attr("x").unwrap(), &Bson::Double(16.0));
        assert_eq!(mapped.attr("y").unwrap(), &Bson::Int32(1));
    }

    #[tokio::test]
    async fn test_interface_save_fails() {
        let mut instance = TestModelInterface::new();
        instance.set_attr("x", 5).unwrap();

        let err = instance.save().await.unwrap_err();
        assert!(matches!(err, MinimongoError::Interface(_)));
        assert!(TestModelInterface::database().is_err());
    }

    #[tokio::test]
    async fn test_persistence_requires_id() {
        let model = TestModel::from(doc! { "x": 1 });
        assert!(matches!(model.remove().await, Err(MinimongoError::Attribute(_))));
        assert!(matches!(model.update().await, Err(MinimongoError::Attribute(_))));
    }

    model! {
        pub struct UnreachableModel {
            meta: Meta::new().host("no-runtime-model.invalid").port(27105).database("db"),
        }
    }

    #[test]
    fn test_binding_outside_runtime_is_an_error() {
        assert!(matches!(
            UnreachableModel::collection(),
            Err(MinimongoError::Configuration(_))
        ));

        let mut model = UnreachableModel::from(doc! { "x": 1 });
        let err = model.dbref().unwrap_err();
        assert!(matches!(err, MinimongoError::Configuration(_)));
        assert!(model.id().is_none());
    }

    #[test]
    fn test_save_options_default() {
        assert!(SaveOptions::default().manipulate);
    }
}
