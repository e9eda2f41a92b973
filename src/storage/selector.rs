//! Backend selection.
//!
//! Exactly one storage backend is constructed per process, chosen from the
//! configured kind string, initialized, and shared as `Arc<dyn Storage>`
//! for the process lifetime. An unknown kind is a configuration error at
//! startup, never a runtime error on first use.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use log::info;

use crate::configuration::config::Config;
use crate::error_handling::types::{ConfigError, StorageError};
use crate::storage::file_storage::FileStorage;
use crate::storage::mysql_storage::MysqlStorage;
use crate::storage::postgres_storage::PostgresStorage;
use crate::storage::sqlite_storage::SqliteStorage;
use crate::storage::storage_trait::Storage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Local,
    Sqlite,
    Mysql,
    Postgres,
}

impl FromStr for BackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "local" => Ok(BackendKind::Local),
            "sqlite" => Ok(BackendKind::Sqlite),
            "mysql" => Ok(BackendKind::Mysql),
            "postgresql" | "postgres" => Ok(BackendKind::Postgres),
            other => Err(ConfigError::UnsupportedBackend(other.to_string())),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Local => write!(f, "local"),
            BackendKind::Sqlite => write!(f, "sqlite"),
            BackendKind::Mysql => write!(f, "mysql"),
            BackendKind::Postgres => write!(f, "postgresql"),
        }
    }
}

/// Construct and initialize the configured backend. Called once at
/// startup; the returned handle is the process-wide instance.
pub async fn connect(
    kind: BackendKind,
    tz: chrono_tz::Tz,
    config: &Config,
) -> Result<Arc<dyn Storage>, StorageError> {
    let storage: Arc<dyn Storage> = match kind {
        BackendKind::Local => Arc::new(FileStorage::new(&config.db_path, tz)),
        BackendKind::Sqlite => Arc::new(SqliteStorage::new_dir(&config.db_path, tz).await?),
        BackendKind::Mysql => Arc::new(
            MysqlStorage::connect(
                &config.db_host,
                config.db_port,
                &config.db_username,
                &config.db_password,
                &config.db_database,
                tz,
            )
            .await?,
        ),
        BackendKind::Postgres => Arc::new(
            PostgresStorage::connect(
                &config.db_host,
                config.db_port,
                &config.db_username,
                &config.db_password,
                &config.db_database,
                tz,
            )
            .await?,
        ),
    };

    storage.initialize().await?;
    info!("Storage backend initialized ({})", kind);

    Ok(storage)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_parsing() {
        assert_eq!("local".parse::<BackendKind>().unwrap(), BackendKind::Local);
        assert_eq!("SQLite".parse::<BackendKind>().unwrap(), BackendKind::Sqlite);
        assert_eq!("mysql".parse::<BackendKind>().unwrap(), BackendKind::Mysql);
        assert_eq!(
            "postgresql".parse::<BackendKind>().unwrap(),
            BackendKind::Postgres
        );
        assert_eq!(
            "postgres".parse::<BackendKind>().unwrap(),
            BackendKind::Postgres
        );
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let err = "mongodb".parse::<BackendKind>().unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedBackend(_)));
    }
}
