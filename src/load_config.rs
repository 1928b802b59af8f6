use crate::config::ServiceConfig;
use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

pub const DEBUG_ENV: &str = "OPENREFEREE_DEBUG";
pub const DATABASE_ENV: &str = "OPENREFEREE_DATABASE";

/// Loads the static YAML config file and applies environment overrides.
///
/// `OPENREFEREE_DEBUG` (`1`, `true`, `yes`) forces debug mode on; any other
/// value forces it off. `OPENREFEREE_DATABASE` replaces `storage.database`.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<ServiceConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => {
            info!(config_path = ?path_ref, "Config file read successfully");
            content
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!("Failed to read config file {:?}: {}", path_ref, e));
        }
    };

    let mut config: ServiceConfig = match serde_yaml::from_str(&config_content) {
        Ok(conf) => {
            info!(config_path = ?path_ref, "Parsed config YAML successfully");
            conf
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            return Err(anyhow::anyhow!("Failed to parse config YAML: {e}"));
        }
    };

    if let Ok(value) = std::env::var(DEBUG_ENV) {
        config.debug = parse_flag(&value);
        info!(debug = config.debug, "{DEBUG_ENV} overrides debug flag");
    }

    if let Ok(database) = std::env::var(DATABASE_ENV) {
        if database.trim().is_empty() {
            warn!("{DATABASE_ENV} is set but empty, keeping configured database");
        } else {
            info!(database = %database, "{DATABASE_ENV} overrides storage.database");
            config.storage.database = PathBuf::from(database);
        }
    }

    config.trace_loaded();
    Ok(config)
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes")
}
