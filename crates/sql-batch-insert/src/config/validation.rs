//! Configuration validation.

use super::Config;
use crate::drivers::mssql::MSSQL_MAX_PARAMS;
use crate::error::{InsertError, Result};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    if config.target.host.is_empty() {
        return Err(InsertError::Config("target.host is required".into()));
    }
    if config.target.database.is_empty() {
        return Err(InsertError::Config("target.database is required".into()));
    }
    if config.target.user.is_empty() {
        return Err(InsertError::Config("target.user is required".into()));
    }
    if config.target.port == 0 {
        return Err(InsertError::Config("target.port must be non-zero".into()));
    }

    if config.insert.pool_size == 0 {
        return Err(InsertError::Config(
            "insert.pool_size must be at least 1".into(),
        ));
    }
    if config.insert.max_params_per_batch == 0
        || config.insert.max_params_per_batch > MSSQL_MAX_PARAMS
    {
        return Err(InsertError::Config(format!(
            "insert.max_params_per_batch must be between 1 and {}, got {}",
            MSSQL_MAX_PARAMS, config.insert.max_params_per_batch
        )));
    }
    if config.insert.connection_timeout_secs == 0 {
        return Err(InsertError::Config(
            "insert.connection_timeout_secs must be at least 1".into(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{InsertConfig, TargetConfig};

    fn valid_config() -> Config {
        Config {
            target: TargetConfig {
                host: "localhost".to_string(),
                port: 1433,
                database: "app".to_string(),
                user: "sa".to_string(),
                password: "password".to_string(),
                encrypt: false,
                trust_server_cert: true,
            },
            insert: InsertConfig::default(),
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(validate(&valid_config()).is_ok());
    }

    #[test]
    fn test_missing_target_host() {
        let mut config = valid_config();
        config.target.host = "".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_missing_database_and_user() {
        let mut config = valid_config();
        config.target.database = "".to_string();
        assert!(validate(&config).is_err());

        let mut config = valid_config();
        config.target.user = "".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_zero_pool_size() {
        let mut config = valid_config();
        config.insert.pool_size = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_max_params_bounds() {
        let mut config = valid_config();
        config.insert.max_params_per_batch = 2100;
        assert!(validate(&config).is_ok());

        config.insert.max_params_per_batch = 2101;
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("max_params_per_batch"));

        config.insert.max_params_per_batch = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_target_config_debug_redacts_password() {
        let config = valid_config();
        let dbg = format!("{:?}", config.target);
        assert!(dbg.contains("[REDACTED]"));
        assert!(!dbg.contains("\"password\""));
    }
}
