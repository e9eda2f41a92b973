use std::path::PathBuf;
use std::str::FromStr;

use chrono_tz::Tz;
use clap::Parser;

use crate::error_handling::types::ConfigError;
use crate::storage::selector::BackendKind;

/// Application configuration covering the HTTP listener, the storage
/// backend selection and the admission allow-list.
///
/// Every field can be set either as a command-line flag or through the
/// matching `RAPPEL_*` environment variable; flags win over the
/// environment. All values are consumed at startup only — there is no
/// runtime reconfiguration.
#[derive(Parser, Debug, Clone)]
#[command(name = "rappel")]
#[command(version)]
#[command(about = "Webhook callback receiver and manager")]
pub struct Config {
    /// Port the HTTP server listens on
    #[arg(long, env = "RAPPEL_PORT", default_value_t = 3000)]
    pub port: u16,

    /// IANA timezone name used to normalize callback timestamps
    /// (e.g. "Europe/Zurich")
    #[arg(long, env = "RAPPEL_TZ", default_value = "UTC")]
    pub timezone: String,

    /// Storage backend kind: local, sqlite, mysql or postgresql
    #[arg(long = "db-connection", env = "RAPPEL_DB_CONNECTION", default_value = "local")]
    pub db_connection: String,

    /// Data directory for the local and sqlite backends
    #[arg(long = "db-path", env = "RAPPEL_DB_PATH", default_value = ".db")]
    pub db_path: PathBuf,

    /// Database server hostname (mysql/postgresql)
    #[arg(long = "db-host", env = "RAPPEL_DB_HOST", default_value = "localhost")]
    pub db_host: String,

    /// Database server port; engine default when omitted
    #[arg(long = "db-port", env = "RAPPEL_DB_PORT")]
    pub db_port: Option<u16>,

    /// Database username (mysql/postgresql)
    #[arg(long = "db-username", env = "RAPPEL_DB_USERNAME", default_value = "")]
    pub db_username: String,

    /// Database password (mysql/postgresql)
    #[arg(long = "db-password", env = "RAPPEL_DB_PASSWORD", default_value = "")]
    pub db_password: String,

    /// Database name (mysql/postgresql)
    #[arg(long = "db-database", env = "RAPPEL_DB_DATABASE", default_value = "rappel")]
    pub db_database: String,

    /// Comma-separated list of IPs allowed to use the dashboard and API.
    /// The capture endpoint is never restricted.
    #[arg(
        long = "allowed-ips",
        env = "RAPPEL_ALLOWED_IPS",
        value_delimiter = ',',
        default_value = "127.0.0.1,::1,localhost"
    )]
    pub allowed_ips: Vec<String>,
}

impl Config {
    pub fn from_args() -> Self {
        Config::parse()
    }

    /// Resolve the configured timezone name against the IANA database.
    pub fn tz(&self) -> Result<Tz, ConfigError> {
        Tz::from_str(self.timezone.trim())
            .map_err(|_| ConfigError::BadTimezone(self.timezone.clone()))
    }

    /// Resolve the configured backend kind string.
    pub fn backend_kind(&self) -> Result<BackendKind, ConfigError> {
        self.db_connection.parse()
    }

    /// Validate everything that must be known-good before serving traffic.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.tz()?;
        self.backend_kind()?;
        for ip in &self.allowed_ips {
            if ip.trim().is_empty() {
                return Err(ConfigError::BadIpFormatting(
                    "empty entry in allow-list".into(),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn parse(args: &[&str]) -> Config {
        let mut argv = vec!["rappel"];
        argv.extend_from_slice(args);
        Config::try_parse_from(argv).unwrap_or_else(|e| panic!("{}", e))
    }

    #[test]
    #[serial]
    fn test_defaults() {
        let config = parse(&[]);
        assert_eq!(config.port, 3000);
        assert_eq!(config.timezone, "UTC");
        assert_eq!(config.db_connection, "local");
        assert_eq!(config.db_path, PathBuf::from(".db"));
        assert_eq!(config.allowed_ips, vec!["127.0.0.1", "::1", "localhost"]);
        config.validate().unwrap();
    }

    #[test]
    #[serial]
    fn test_flags_override() {
        let config = parse(&[
            "--port",
            "8080",
            "--timezone",
            "Europe/Zurich",
            "--db-connection",
            "sqlite",
            "--allowed-ips",
            "10.0.0.1,10.0.0.2",
        ]);
        assert_eq!(config.port, 8080);
        assert_eq!(config.tz().unwrap(), chrono_tz::Europe::Zurich);
        assert_eq!(config.allowed_ips, vec!["10.0.0.1", "10.0.0.2"]);
        config.validate().unwrap();
    }

    #[test]
    #[serial]
    fn test_env_fallback() {
        std::env::set_var("RAPPEL_DB_CONNECTION", "postgresql");
        std::env::set_var("RAPPEL_DB_PORT", "5433");
        let config = parse(&[]);
        std::env::remove_var("RAPPEL_DB_CONNECTION");
        std::env::remove_var("RAPPEL_DB_PORT");
        assert_eq!(config.db_connection, "postgresql");
        assert_eq!(config.db_port, Some(5433));
    }

    #[test]
    #[serial]
    fn test_bad_timezone_rejected() {
        let config = parse(&["--timezone", "Mars/Olympus"]);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::BadTimezone(_))
        ));
    }

    #[test]
    #[serial]
    fn test_bad_backend_rejected() {
        let config = parse(&["--db-connection", "mongodb"]);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::UnsupportedBackend(_))
        ));
    }
}
