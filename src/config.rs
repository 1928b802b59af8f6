// openreferee-server/src/config.rs

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info};

pub const DEFAULT_BIND: &str = "127.0.0.1:12345";
pub const DEFAULT_WATERMARK_LABEL: &str = "OpenReferee";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub watermark: WatermarkConfig,
    /// Accept invalid TLS certificates on outbound calls.
    #[serde(default)]
    pub debug: bool,
}

impl ServiceConfig {
    pub fn trace_loaded(&self) {
        info!(
            bind = %self.server.bind,
            database = %self.storage.database.display(),
            template = %self.watermark.template.display(),
            debug = self.debug,
            "Loaded ServiceConfig"
        );
        debug!(?self, "Config loaded (full debug)");
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite file holding registered events.
    pub database: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatermarkConfig {
    /// Template PDF; rendered on startup if missing.
    pub template: PathBuf,
    #[serde(default = "default_label")]
    pub label: String,
}

fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}

fn default_label() -> String {
    DEFAULT_WATERMARK_LABEL.to_string()
}
