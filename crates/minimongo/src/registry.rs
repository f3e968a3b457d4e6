//! Model registration
//!
//! Registration turns a model declaration into a bound collection: it
//! resolves the model's [`Meta`] against the global defaults, derives the
//! collection name, picks a pooled connection for `(host, port)` and binds
//! the database and collection handles. Bindings are cached per model type
//! and created on first use.

use crate::connection::{Connection, ConnectionPool, Credentials};
use crate::model::Model;
use crate::options::{defaults, Meta, Options};
use crate::validation::ValidatedCollectionName;
use crate::Result;
use bson::Document as BsonDocument;
use minimongo_common::MinimongoError;
use mongodb::Database;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument};

static BINDINGS: Lazy<RwLock<HashMap<TypeId, Arc<ModelBinding>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// A registered model: resolved options plus driver handles.
///
/// Interface models carry options only.
pub struct ModelBinding {
    model_name: String,
    options: Options,
    connection: Option<Connection>,
    database: Option<Database>,
    collection: Option<mongodb::Collection<BsonDocument>>,
    indexed: OnceCell<()>,
}

impl ModelBinding {
    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn is_interface(&self) -> bool {
        self.options.interface
    }

    pub fn collection_name(&self) -> &str {
        &self.options.collection
    }

    pub fn database_name(&self) -> Option<&str> {
        self.options.database.as_deref()
    }

    pub fn connection(&self) -> Result<&Connection> {
        self.connection
            .as_ref()
            .ok_or_else(|| self.interface_error("connect"))
    }

    pub fn database(&self) -> Result<&Database> {
        self.database
            .as_ref()
            .ok_or_else(|| self.interface_error("use a database"))
    }

    /// The driver collection, or an interface error naming `operation`
    pub fn driver_collection(&self, operation: &str) -> Result<&mongodb::Collection<BsonDocument>> {
        self.collection
            .as_ref()
            .ok_or_else(|| self.interface_error(operation))
    }

    fn interface_error(&self, operation: &str) -> MinimongoError {
        MinimongoError::Interface(format!(
            "Can't {} on an interface collection ({})",
            operation, self.model_name
        ))
    }

    /// Creates every declared index, regardless of `auto_index`
    #[instrument(skip(self), fields(model = %self.model_name))]
    pub async fn auto_index(&self) -> Result<()> {
        let Some(collection) = self.collection.as_ref() else {
            return Ok(());
        };
        for index in &self.options.indices {
            index.ensure(collection).await?;
        }
        Ok(())
    }

    /// Runs before the first collection operation: creates the declared
    /// indices once when `auto_index` is set.
    pub(crate) async fn prepare(&self) -> Result<()> {
        if !self.options.auto_index || self.options.indices.is_empty() {
            return Ok(());
        }
        self.indexed
            .get_or_try_init(|| async { self.auto_index().await })
            .await?;
        Ok(())
    }
}

impl std::fmt::Debug for ModelBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelBinding")
            .field("model_name", &self.model_name)
            .field("database", &self.options.database)
            .field("collection", &self.options.collection)
            .field("interface", &self.options.interface)
            .finish()
    }
}

/// Entry point of model registration
pub struct ModelBase;

impl ModelBase {
    /// Registers a model declaration without caching it.
    ///
    /// # Errors
    /// - Configuration error when host, port or database is missing
    ///   (interface models are exempt)
    /// - Validation error for an unusable collection name
    #[instrument(skip(meta))]
    pub fn register(model_name: &str, meta: Meta) -> Result<ModelBinding> {
        let options = Options::resolve(meta, &defaults(), model_name);

        if options.interface {
            debug!("Registered interface model");
            return Ok(ModelBinding {
                model_name: model_name.to_string(),
                options,
                connection: None,
                database: None,
                collection: None,
                indexed: OnceCell::new(),
            });
        }

        let database_name = options.require_database(model_name)?.to_string();
        let collection_name = ValidatedCollectionName::new(&options.collection)?;

        let credentials = options.username.as_ref().map(|username| Credentials {
            username: username.clone(),
            password: options.password.clone().unwrap_or_default(),
            source: Some(database_name.clone()),
        });

        let connection = ConnectionPool::get_or_connect(
            &options.host,
            options.port,
            credentials.as_ref(),
            &options.pool,
        )?;
        let database = connection.database(&database_name);
        let collection = database.collection::<BsonDocument>(collection_name.as_str());

        info!(
            database = %database_name,
            collection = %collection_name,
            indices = options.indices.len(),
            "Registered model"
        );

        Ok(ModelBinding {
            model_name: model_name.to_string(),
            options,
            connection: Some(connection),
            database: Some(database),
            collection: Some(collection),
            indexed: OnceCell::new(),
        })
    }

    /// Returns the cached binding of `M`, registering it on first use
    pub fn bind<M: Model>() -> Result<Arc<ModelBinding>> {
        let type_id = TypeId::of::<M>();
        if let Some(binding) = BINDINGS.read().get(&type_id) {
            return Ok(binding.clone());
        }

        let binding = Arc::new(Self::register(M::model_name(), M::meta())?);
        let mut bindings = BINDINGS.write();
        Ok(bindings.entry(type_id).or_insert(binding).clone())
    }

    pub fn is_bound<M: Model>() -> bool {
        BINDINGS.read().contains_key(&TypeId::of::<M>())
    }

    /// Drops the cached binding of `M`; the next use registers it again
    /// with the current defaults.
    pub fn unbind<M: Model>() -> bool {
        BINDINGS.write().remove(&TypeId::of::<M>()).is_some()
    }
}
