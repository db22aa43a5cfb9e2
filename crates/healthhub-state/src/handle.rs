//! SurrealDB Handle - Connection management
//!
//! Connects to SurrealDB (in-memory, URL, or cloud credentials from the
//! environment), selects the namespace/database and runs the schema
//! migrations. The handle is cheap to clone and safe to share across
//! concurrent requests; the stores in [`crate::surreal_store`] are built
//! from it.

use crate::error::StateError;
use crate::migrations;
use crate::Result;
use surrealdb::engine::any::Any;
use surrealdb::opt::auth::{Database, Root};
use surrealdb::Surreal;
use tracing::{info, instrument};

const DEFAULT_NAMESPACE: &str = "healthhub";
const DEFAULT_DATABASE: &str = "main";

/// Credentials for a remote (cloud or self-hosted) SurrealDB instance.
#[derive(Debug, Clone)]
pub struct CloudConfig {
    /// `wss://` or `ws://` endpoint
    pub endpoint: String,
    /// Database username
    pub username: String,
    /// Database password
    pub password: String,
    /// Namespace (default: "healthhub")
    pub namespace: String,
    /// Database name (default: "main")
    pub database: String,
    /// Sign in as root rather than as a database user
    pub is_root: bool,
}

impl CloudConfig {
    /// Database-user credentials in the default namespace and database.
    pub fn new(
        endpoint: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            username: username.into(),
            password: password.into(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            database: DEFAULT_DATABASE.to_string(),
            is_root: false,
        }
    }

    /// Credentials from `SURREALDB_ENDPOINT`, `SURREALDB_USERNAME` and
    /// `SURREALDB_PASSWORD`. `SURREALDB_NAMESPACE` and `SURREALDB_DATABASE`
    /// override the defaults; `SURREALDB_ROOT=true` signs in as root.
    pub fn from_env() -> std::result::Result<Self, String> {
        let endpoint =
            std::env::var("SURREALDB_ENDPOINT").map_err(|_| "SURREALDB_ENDPOINT not set")?;
        let username =
            std::env::var("SURREALDB_USERNAME").map_err(|_| "SURREALDB_USERNAME not set")?;
        let password =
            std::env::var("SURREALDB_PASSWORD").map_err(|_| "SURREALDB_PASSWORD not set")?;
        let namespace = std::env::var("SURREALDB_NAMESPACE")
            .unwrap_or_else(|_| DEFAULT_NAMESPACE.to_string());
        let database =
            std::env::var("SURREALDB_DATABASE").unwrap_or_else(|_| DEFAULT_DATABASE.to_string());
        let is_root = std::env::var("SURREALDB_ROOT")
            .map(|v| v.to_lowercase() == "true")
            .unwrap_or(false);

        Ok(Self {
            endpoint,
            username,
            password,
            namespace,
            database,
            is_root,
        })
    }
}

/// SurrealDB connection handle for HealthHub
#[derive(Clone)]
pub struct SurrealHandle {
    db: Surreal<Any>,
}

impl SurrealHandle {
    /// Fresh in-memory database with the schema applied.
    #[instrument(skip_all)]
    pub async fn in_memory() -> Result<Self> {
        info!("Connecting to SurrealDB (in-memory)");
        Self::connect("mem://").await
    }

    /// Connect to any engine URL (`mem://`, `surrealkv://path`, `ws://host`)
    /// using the default namespace and database.
    #[instrument(skip_all, fields(url = %url))]
    pub async fn connect(url: &str) -> Result<Self> {
        let db = surrealdb::engine::any::connect(url)
            .await
            .map_err(|e| StateError::Connection(format!("Failed to connect to {url}: {e}")))?;

        db.use_ns(DEFAULT_NAMESPACE)
            .use_db(DEFAULT_DATABASE)
            .await
            .map_err(|e| StateError::Connection(e.to_string()))?;

        migrations::init_schema(&db).await?;
        Ok(Self { db })
    }

    /// Connect with cloud credentials.
    #[instrument(skip_all, fields(endpoint = %config.endpoint))]
    pub async fn connect_cloud(config: &CloudConfig) -> Result<Self> {
        let db = surrealdb::engine::any::connect(&config.endpoint)
            .await
            .map_err(|e| StateError::Connection(e.to_string()))?;

        if config.is_root {
            db.signin(Root {
                username: &config.username,
                password: &config.password,
            })
            .await
            .map_err(|e| StateError::Connection(format!("Root auth failed: {e}")))?;
        } else {
            db.signin(Database {
                namespace: &config.namespace,
                database: &config.database,
                username: &config.username,
                password: &config.password,
            })
            .await
            .map_err(|e| StateError::Connection(format!("DB auth failed: {e}")))?;
        }

        db.use_ns(&config.namespace)
            .use_db(&config.database)
            .await
            .map_err(|e| StateError::Connection(e.to_string()))?;

        migrations::init_schema(&db).await?;
        info!("SurrealHandle connected (cloud)");
        Ok(Self { db })
    }

    /// Create from environment variables.
    ///
    /// Resolution order: cloud credentials ([`CloudConfig::from_env`]), then
    /// `SURREALDB_URL`, then an in-memory database.
    pub async fn from_env() -> Result<Self> {
        if let Ok(config) = CloudConfig::from_env() {
            return Self::connect_cloud(&config).await;
        }

        if let Ok(url) = std::env::var("SURREALDB_URL") {
            info!("SurrealHandle connecting to {}", url);
            return Self::connect(&url).await;
        }

        info!("No cloud config or SURREALDB_URL found, using in-memory database");
        Self::in_memory().await
    }

    /// Underlying client, for the stores in this crate.
    pub(crate) fn db(&self) -> &Surreal<Any> {
        &self.db
    }

    /// Round-trip a trivial query to confirm the backend answers.
    pub async fn health_check(&self) -> Result<()> {
        self.db
            .query("RETURN true")
            .await
            .map_err(|e| StateError::Connection(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cloud_config_defaults() {
        let cfg = CloudConfig::new("wss://db.example", "svc", "secret");
        assert_eq!(cfg.namespace, "healthhub");
        assert_eq!(cfg.database, "main");
        assert!(!cfg.is_root);
    }

    #[tokio::test]
    async fn test_in_memory_health_check() {
        let handle = SurrealHandle::in_memory().await.unwrap();
        handle.health_check().await.unwrap();
    }
}
