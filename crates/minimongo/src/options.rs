//! Model metadata and global defaults
//!
//! A model declares a [`Meta`]. Anything it leaves unset falls back to the
//! process-wide [`Defaults`], which can be changed with [`configure`],
//! [`configure_from_pairs`], [`configure_from_env`] or
//! [`configure_from_json`]. Models resolve their options once, when they are
//! first bound, so later configuration does not affect them.

use crate::attr_dict::FieldMap;
use crate::connection::PoolConfig;
use crate::index::Index;
use crate::naming::to_underscore;
use crate::Result;
use minimongo_common::MinimongoError;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Prefix of configuration keys read from the environment
pub const DEFAULT_PREFIX: &str = "MONGODB_";

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 27017;

static DEFAULTS: Lazy<RwLock<Defaults>> = Lazy::new(|| RwLock::new(Defaults::default()));

/// Process-wide defaults every model falls back to
#[derive(Debug, Clone, PartialEq)]
pub struct Defaults {
    pub host: String,
    pub port: u16,
    pub database: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Should indices be created before the first collection operation?
    pub auto_index: bool,
    /// Driver pool settings for newly created connections
    pub pool: PoolConfig,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            database: None,
            username: None,
            password: None,
            auto_index: true,
            pool: PoolConfig::default(),
        }
    }
}

impl Defaults {
    /// Applies one configuration key (already stripped and lower-cased).
    ///
    /// Returns `Ok(false)` for keys that are not recognized.
    fn apply(&mut self, key: &str, value: &str) -> Result<bool> {
        match key {
            "host" => self.host = value.to_string(),
            "port" => self.port = parse_value(key, value)?,
            "database" => self.database = Some(value.to_string()),
            "username" => self.username = Some(value.to_string()),
            "password" => self.password = Some(value.to_string()),
            "auto_index" => self.auto_index = parse_bool(key, value)?,
            "min_pool_size" => self.pool.min_pool_size = Some(parse_value(key, value)?),
            "max_pool_size" => self.pool.max_pool_size = Some(parse_value(key, value)?),
            "max_idle_time_secs" => {
                self.pool.max_idle_time = Some(Duration::from_secs(parse_value(key, value)?))
            }
            "connect_timeout_secs" => {
                self.pool.connect_timeout = Some(Duration::from_secs(parse_value(key, value)?))
            }
            "server_selection_timeout_secs" => {
                self.pool.server_selection_timeout =
                    Some(Duration::from_secs(parse_value(key, value)?))
            }
            "app_name" => self.pool.app_name = Some(value.to_string()),
            _ => return Ok(false),
        }
        Ok(true)
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        MinimongoError::Configuration(format!("Invalid value for '{}': '{}'", key, value))
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(MinimongoError::Configuration(format!(
            "Invalid value for '{}': '{}'",
            key, value
        ))),
    }
}

/// Returns a snapshot of the current defaults
pub fn defaults() -> Defaults {
    DEFAULTS.read().clone()
}

/// Updates the global defaults in place.
///
/// ```
/// minimongo::configure(|defaults| defaults.database = Some("app".to_string()));
/// # minimongo::reset_defaults();
/// ```
pub fn configure<F>(f: F)
where
    F: FnOnce(&mut Defaults),
{
    let mut defaults = DEFAULTS.write();
    f(&mut defaults);
    debug!(
        host = %defaults.host,
        port = defaults.port,
        database = ?defaults.database,
        "Defaults configured"
    );
}

/// Updates the global defaults from `(KEY, value)` pairs.
///
/// Only keys starting with `prefix` are considered; the prefix is stripped
/// and the rest lower-cased, so `MONGODB_PORT` sets `port`. Unknown keys are
/// ignored. Nothing is applied if any value fails to parse.
pub fn configure_from_pairs<I, K, V>(pairs: I, prefix: &str) -> Result<()>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut current = DEFAULTS.write();
    let mut updated = current.clone();

    for (key, value) in pairs {
        let key = key.as_ref();
        let Some(stripped) = key.strip_prefix(prefix) else {
            continue;
        };
        let name = stripped.to_lowercase();
        if !updated.apply(&name, value.as_ref())? {
            warn!(key, "Ignoring unknown configuration key");
        }
    }

    *current = updated;
    Ok(())
}

/// Updates the global defaults from `MONGODB_*` environment variables
pub fn configure_from_env() -> Result<()> {
    configure_from_pairs(std::env::vars(), DEFAULT_PREFIX)
}

/// Defaults as they appear in a JSON settings object
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct DefaultsPatch {
    host: Option<String>,
    port: Option<u16>,
    database: Option<String>,
    username: Option<String>,
    password: Option<String>,
    auto_index: Option<bool>,
    min_pool_size: Option<u32>,
    max_pool_size: Option<u32>,
    max_idle_time_secs: Option<u64>,
    connect_timeout_secs: Option<u64>,
    server_selection_timeout_secs: Option<u64>,
    app_name: Option<String>,
}

/// Updates the global defaults from a JSON object such as
/// `{"host": "db", "port": 27018, "database": "app"}`
pub fn configure_from_json(text: &str) -> Result<()> {
    let patch: DefaultsPatch = serde_json::from_str(text)?;

    configure(|defaults| {
        if let Some(host) = patch.host {
            defaults.host = host;
        }
        if let Some(port) = patch.port {
            defaults.port = port;
        }
        if patch.database.is_some() {
            defaults.database = patch.database;
        }
        if patch.username.is_some() {
            defaults.username = patch.username;
        }
        if patch.password.is_some() {
            defaults.password = patch.password;
        }
        if let Some(auto_index) = patch.auto_index {
            defaults.auto_index = auto_index;
        }
        if patch.min_pool_size.is_some() {
            defaults.pool.min_pool_size = patch.min_pool_size;
        }
        if patch.max_pool_size.is_some() {
            defaults.pool.max_pool_size = patch.max_pool_size;
        }
        if let Some(secs) = patch.max_idle_time_secs {
            defaults.pool.max_idle_time = Some(Duration::from_secs(secs));
        }
        if let Some(secs) = patch.connect_timeout_secs {
            defaults.pool.connect_timeout = Some(Duration::from_secs(secs));
        }
        if let Some(secs) = patch.server_selection_timeout_secs {
            defaults.pool.server_selection_timeout = Some(Duration::from_secs(secs));
        }
        if patch.app_name.is_some() {
            defaults.pool.app_name = patch.app_name;
        }
    });
    Ok(())
}

/// Restores the built-in defaults
pub fn reset_defaults() {
    *DEFAULTS.write() = Defaults::default();
}

/// Per-model metadata declaration
///
/// Every field is optional; unset fields fall back to [`Defaults`].
#[derive(Debug, Clone, Default)]
pub struct Meta {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub database: Option<String>,
    pub collection: Option<String>,
    pub indices: Vec<Index>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub auto_index: Option<bool>,
    pub field_map: FieldMap,
    /// Interface models are never bound to a collection
    pub interface: bool,
}

impl Meta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into());
        self
    }

    pub fn index(mut self, index: Index) -> Self {
        self.indices.push(index);
        self
    }

    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn auto_index(mut self, auto_index: bool) -> Self {
        self.auto_index = Some(auto_index);
        self
    }

    pub fn field_map(mut self, field_map: FieldMap) -> Self {
        self.field_map = field_map;
        self
    }

    pub fn interface(mut self) -> Self {
        self.interface = true;
        self
    }
}

/// Resolved options of a bound model
#[derive(Debug, Clone)]
pub struct Options {
    pub host: String,
    pub port: u16,
    pub database: Option<String>,
    pub collection: String,
    pub indices: Vec<Index>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub auto_index: bool,
    pub field_map: FieldMap,
    pub interface: bool,
    pub pool: PoolConfig,
}

impl Options {
    /// Merges a declaration with the defaults.
    ///
    /// The collection name falls back to the snake_case model name.
    pub fn resolve(meta: Meta, defaults: &Defaults, model_name: &str) -> Self {
        Self {
            host: meta.host.unwrap_or_else(|| defaults.host.clone()),
            port: meta.port.unwrap_or(defaults.port),
            database: meta.database.or_else(|| defaults.database.clone()),
            collection: meta
                .collection
                .unwrap_or_else(|| to_underscore(model_name)),
            indices: meta.indices,
            username: meta.username.or_else(|| defaults.username.clone()),
            password: meta.password.or_else(|| defaults.password.clone()),
            auto_index: meta.auto_index.unwrap_or(defaults.auto_index),
            field_map: meta.field_map,
            interface: meta.interface,
            pool: defaults.pool.clone(),
        }
    }

    /// Returns the database name, or a configuration error naming the model
    pub fn require_database(&self, model_name: &str) -> Result<&str> {
        match self.database.as_deref() {
            Some(database) if !database.is_empty() && !self.host.is_empty() && self.port != 0 => {
                Ok(database)
            }
            _ => Err(MinimongoError::Configuration(format!(
                "Model '{}' improperly configured: {} {} {}",
                model_name,
                self.host,
                self.port,
                self.database.as_deref().unwrap_or("None")
            ))),
        }
    }
}

#[cfg(test)]
pub(crate) static TEST_LOCK: parking_lot::Mutex<()> = parking_lot::const_mutex(());

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_uses_defaults() {
        let defaults = Defaults {
            database: Some("test".to_string()),
            ..Defaults::default()
        };
        let options = Options::resolve(Meta::new(), &defaults, "SomeModel");

        assert_eq!(options.host, "localhost");
        assert_eq!(options.port, 27017);
        assert_eq!(options.database.as_deref(), Some("test"));
        assert_eq!(options.collection, "some_model");
        assert!(options.auto_index);
        assert!(!options.interface);
    }

    #[test]
    fn test_resolve_meta_wins() {
        let meta = Meta::new()
            .host("db.internal")
            .port(27018)
            .database("minimongo_test")
            .collection("minimongo_test")
            .index(Index::ascending("x"))
            .auto_index(false);
        let options = Options::resolve(meta, &Defaults::default(), "TestModel");

        assert_eq!(options.host, "db.internal");
        assert_eq!(options.port, 27018);
        assert_eq!(options.collection, "minimongo_test");
        assert_eq!(options.indices, vec![Index::ascending("x")]);
        assert!(!options.auto_index);
    }

    #[test]
    fn test_require_database() {
        let options = Options::resolve(Meta::new(), &Defaults::default(), "Orphan");
        let err = options.require_database("Orphan").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Configuration error: Model 'Orphan' improperly configured: localhost 27017 None"
        );

        let options = Options::resolve(Meta::new().database("db"), &Defaults::default(), "Ok");
        assert_eq!(options.require_database("Ok").unwrap(), "db");
    }

    #[test]
    fn test_configure_closure() {
        let _guard = TEST_LOCK.lock();
        assert!(defaults().database.is_none());

        configure(|d| d.database = Some("test".to_string()));
        assert_eq!(defaults().database.as_deref(), Some("test"));

        reset_defaults();
        assert!(defaults().database.is_none());
    }

    #[test]
    fn test_configure_from_pairs() {
        let _guard = TEST_LOCK.lock();
        let pairs = vec![
            ("MONGODB_HOST", "mongo.local"),
            ("MONGODB_PORT", "27018"),
            ("MONGODB_AUTO_INDEX", "false"),
            ("MONGODB_FOO", "bar"),
            ("NON_MONGO_ATTR", "bar"),
        ];
        configure_from_pairs(pairs, DEFAULT_PREFIX).unwrap();

        let current = defaults();
        assert_eq!(current.host, "mongo.local");
        assert_eq!(current.port, 27018);
        assert!(!current.auto_index);

        reset_defaults();
    }

    #[test]
    fn test_configure_from_pairs_custom_prefix() {
        let _guard = TEST_LOCK.lock();
        configure_from_pairs([("APP_DATABASE", "app")], "APP_").unwrap();
        assert_eq!(defaults().database.as_deref(), Some("app"));
        reset_defaults();
    }

    #[test]
    fn test_configure_from_pairs_invalid_value_is_atomic() {
        let _guard = TEST_LOCK.lock();
        let pairs = [("MONGODB_HOST", "elsewhere"), ("MONGODB_PORT", "not-a-port")];
        let err = configure_from_pairs(pairs, DEFAULT_PREFIX).unwrap_err();

        assert!(matches!(err, MinimongoError::Configuration(_)));
        assert_eq!(defaults().host, DEFAULT_HOST);
    }

    #[test]
    fn test_configure_from_json() {
        let _guard = TEST_LOCK.lock();
        configure_from_json(r#"{"database": "from_json", "max_pool_size": 4}"#).unwrap();

        let current = defaults();
        assert_eq!(current.database.as_deref(), Some("from_json"));
        assert_eq!(current.pool.max_pool_size, Some(4));

        assert!(configure_from_json(r#"{"unknown": 1}"#).is_err());
        reset_defaults();
    }

    #[test]
    fn test_json_and_pairs_accept_the_same_timeouts() {
        let _guard = TEST_LOCK.lock();
        configure_from_json(
            r#"{"max_idle_time_secs": 60, "connect_timeout_secs": 5,
                "server_selection_timeout_secs": 7}"#,
        )
        .unwrap();
        let from_json = defaults().pool;
        reset_defaults();

        let pairs = [
            ("MONGODB_MAX_IDLE_TIME_SECS", "60"),
            ("MONGODB_CONNECT_TIMEOUT_SECS", "5"),
            ("MONGODB_SERVER_SELECTION_TIMEOUT_SECS", "7"),
        ];
        configure_from_pairs(pairs, DEFAULT_PREFIX).unwrap();
        let from_pairs = defaults().pool;
        reset_defaults();

        assert_eq!(from_json, from_pairs);
        assert_eq!(from_json.max_idle_time, Some(Duration::from_secs(60)));
        assert_eq!(from_json.connect_timeout, Some(Duration::from_secs(5)));
        assert_eq!(from_json.server_selection_timeout, Some(Duration::from_secs(7)));
    }

    #[test]
    fn test_configure_from_pairs_keeps_concurrent_updates() {
        let _guard = TEST_LOCK.lock();
        let workers: Vec<_> = (0..8)
            .map(|i| {
                std::thread::spawn(move || {
                    if i % 2 == 0 {
                        configure(|d| d.database = Some("from_closure".to_string()));
                    } else {
                        configure_from_pairs([("MONGODB_HOST", "from_pairs")], DEFAULT_PREFIX)
                            .unwrap();
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        let current = defaults();
        assert_eq!(current.database.as_deref(), Some("from_closure"));
        assert_eq!(current.host, "from_pairs");
        reset_defaults();
    }
}
