//! Minimal MongoDB object-document mapper
//!
//! Models are thin wrappers around BSON documents: fields are read and
//! written as items or attributes, and each model type is bound to one
//! collection through a small declaration.
//!
//! # Features
//! - Dict and attribute access over the same document ([`AttrDict`])
//! - Collection names derived from type names (`FooBar` → `foo_bar`)
//! - Global defaults from code, environment or JSON ([`configure`])
//! - One pooled client per `(host, port)` ([`ConnectionPool`])
//! - Declared indices, created lazily when `auto_index` is on
//! - Database references ([`DbRef`])
//!
//! # Example
//!
//! ```ignore
//! use minimongo::{model, Index, Meta, Model};
//!
//! model! {
//!     pub struct Foo {
//!         meta: Meta::new()
//!             .database("database")
//!             .collection("collection")
//!             .index(Index::ascending("x")),
//!     }
//! }
//!
//! let mut foo = Foo::new();
//! foo.set_attr("x", 1)?;
//! foo.set_attr("y", 2)?;
//! foo.save().await?;
//!
//! let found = Foo::collection()?.find_one(doc! { "x": 1 }).await?;
//! ```

pub mod attr_dict;
pub mod collection;
pub mod connection;
pub mod dbref;
pub mod index;
pub mod model;
pub mod naming;
pub mod options;
pub mod query;
pub mod registry;
pub mod validation;

pub use attr_dict::{AttrDict, FieldMap};
pub use collection::{Collection, Selector};
pub use connection::{Connection, ConnectionPool, Credentials, PoolConfig};
pub use dbref::DbRef;
pub use index::Index;
pub use minimongo_common::{MinimongoError, Result};
pub use model::{Model, SaveOptions};
pub use naming::to_underscore;
pub use options::{
    configure, configure_from_env, configure_from_json, configure_from_pairs, defaults,
    reset_defaults, Defaults, Meta, Options,
};
pub use query::{Cursor, Find};
pub use registry::{ModelBase, ModelBinding};
pub use validation::{ObjectIdParser, ValidatedCollectionName, ValidatedFieldName};

// Used by `model!` expansions
#[doc(hidden)]
pub use bson;
