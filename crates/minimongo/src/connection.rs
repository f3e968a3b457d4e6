//! Pooled MongoDB connections keyed by host and port
//!
//! Every model bound to the same `(host, port)` shares one driver client.
//! The driver keeps its own socket pool behind that client; [`PoolConfig`]
//! tunes it when the client is first created.

use bson::{doc, Document as BsonDocument};
use minimongo_common::{MinimongoError, Result};
use mongodb::{
    options::{ClientOptions, Credential, ServerAddress, ServerApi, ServerApiVersion},
    Client, Database,
};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Connection pool configuration
#[derive(Debug, Clone, PartialEq)]
pub struct PoolConfig {
    /// Minimum number of connections in the pool (default: 0)
    pub min_pool_size: Option<u32>,
    /// Maximum number of connections in the pool (default: 10)
    pub max_pool_size: Option<u32>,
    /// Maximum time a connection can remain idle before being closed (default: none)
    pub max_idle_time: Option<Duration>,
    /// Connection timeout (default: 10s)
    pub connect_timeout: Option<Duration>,
    /// Server selection timeout (default: 30s)
    pub server_selection_timeout: Option<Duration>,
    /// Application name for server logs
    pub app_name: Option<String>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_pool_size: None,
            max_pool_size: Some(10),
            max_idle_time: None,
            connect_timeout: Some(Duration::from_secs(10)),
            server_selection_timeout: Some(Duration::from_secs(30)),
            app_name: Some("minimongo".to_string()),
        }
    }
}

/// Username and password used when a client is first created
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    /// Database the user is defined in
    pub source: Option<String>,
}

struct ConnectionInner {
    client: Client,
    host: String,
    port: u16,
}

/// A driver client bound to one `(host, port)`
///
/// Cloning is cheap; clones share the same client.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

impl Connection {
    /// Create a client for `host:port`.
    ///
    /// No I/O happens here; the driver connects on first use. The driver
    /// spawns its monitoring tasks on the current tokio runtime, so this
    /// must be called from within one.
    ///
    /// # Errors
    /// Configuration error when no tokio runtime is running.
    pub fn open(
        host: &str,
        port: u16,
        credentials: Option<&Credentials>,
        config: &PoolConfig,
    ) -> Result<Self> {
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(MinimongoError::Configuration(format!(
                "Cannot connect to {}:{} outside of a tokio runtime",
                host, port
            )));
        }

        let mut client_options = ClientOptions::builder()
            .hosts(vec![ServerAddress::Tcp {
                host: host.to_string(),
                port: Some(port),
            }])
            .build();

        // Apply pool configuration
        if let Some(min) = config.min_pool_size {
            client_options.min_pool_size = Some(min);
        }
        if let Some(max) = config.max_pool_size {
            client_options.max_pool_size = Some(max);
        }
        if let Some(idle) = config.max_idle_time {
            client_options.max_idle_time = Some(idle);
        }
        if let Some(connect) = config.connect_timeout {
            client_options.connect_timeout = Some(connect);
        }
        if let Some(server_sel) = config.server_selection_timeout {
            client_options.server_selection_timeout = Some(server_sel);
        }
        if let Some(app) = &config.app_name {
            client_options.app_name = Some(app.clone());
        }

        if let Some(credentials) = credentials {
            let mut credential = Credential::default();
            credential.username = Some(credentials.username.clone());
            credential.password = Some(credentials.password.clone());
            credential.source = credentials.source.clone();
            client_options.credential = Some(credential);
        }

        // Set stable API version for compatibility
        let server_api = ServerApi::builder().version(ServerApiVersion::V1).build();
        client_options.server_api = Some(server_api);

        let client = Client::with_options(client_options)?;

        Ok(Self {
            inner: Arc::new(ConnectionInner {
                client,
                host: host.to_string(),
                port,
            }),
        })
    }

    pub fn host(&self) -> &str {
        &self.inner.host
    }

    pub fn port(&self) -> u16 {
        self.inner.port
    }

    /// Get a reference to the client
    pub fn client(&self) -> &Client {
        &self.inner.client
    }

    /// Get a database handle by name
    pub fn database(&self, name: &str) -> Database {
        self.inner.client.database(name)
    }

    /// True when both handles share the same pooled client
    pub fn same_as(&self, other: &Connection) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Check if the connection is healthy by pinging the server
    pub async fn ping(&self) -> Result<bool> {
        match self
            .database("admin")
            .run_command(doc! { "ping": 1 })
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => Err(MinimongoError::Connection(format!("Ping failed: {}", e))),
        }
    }

    /// Get server status information
    pub async fn server_status(&self) -> Result<BsonDocument> {
        let result = self
            .database("admin")
            .run_command(doc! { "serverStatus": 1 })
            .await?;
        Ok(result)
    }

    /// List all database names on the server
    pub async fn list_database_names(&self) -> Result<Vec<String>> {
        let names = self.inner.client.list_database_names().await?;
        Ok(names)
    }

    /// Drop a database (use with caution!)
    pub async fn drop_database(&self, name: &str) -> Result<()> {
        self.database(name).drop().await?;
        Ok(())
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("host", &self.inner.host)
            .field("port", &self.inner.port)
            .finish()
    }
}

type HostPort = (String, u16);

static CONNECTIONS: Lazy<Mutex<HashMap<HostPort, Connection>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Process-wide table of connections keyed by `(host, port)`.
///
/// A pooled client belongs to the tokio runtime it was created on and stops
/// working once that runtime shuts down. Programs that run several runtimes
/// one after another must [`clear`](Self::clear) the pool and unbind their
/// models (see [`ModelBase::unbind`](crate::ModelBase::unbind)) in between.
pub struct ConnectionPool;

impl ConnectionPool {
    /// Returns the pooled connection for `host:port`, creating it if needed.
    ///
    /// Credentials and pool settings only apply when the connection is
    /// created; later lookups return the existing client unchanged.
    #[instrument(skip(credentials, config))]
    pub fn get_or_connect(
        host: &str,
        port: u16,
        credentials: Option<&Credentials>,
        config: &PoolConfig,
    ) -> Result<Connection> {
        let mut connections = CONNECTIONS.lock();
        let key = (host.to_string(), port);

        if let Some(existing) = connections.get(&key) {
            debug!("Reusing pooled connection");
            return Ok(existing.clone());
        }

        let connection = Connection::open(host, port, credentials, config)?;
        info!(authenticated = credentials.is_some(), "Opened pooled connection");
        connections.insert(key, connection.clone());
        Ok(connection)
    }

    /// Returns the pooled connection for `host:port`, if any
    pub fn get(host: &str, port: u16) -> Option<Connection> {
        CONNECTIONS.lock().get(&(host.to_string(), port)).cloned()
    }

    pub fn contains(host: &str, port: u16) -> bool {
        CONNECTIONS.lock().contains_key(&(host.to_string(), port))
    }

    pub fn len() -> usize {
        CONNECTIONS.lock().len()
    }

    pub fn is_empty() -> bool {
        CONNECTIONS.lock().is_empty()
    }

    /// Forgets every pooled connection. Models already bound keep theirs.
    pub fn clear() {
        CONNECTIONS.lock().clear();
    }
}
