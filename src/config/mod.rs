// Configuration module entry point
// Loads the immutable server configuration and builds shared state

mod state;
mod types;

use std::net::SocketAddr;

pub use state::AppState;
pub use types::{Config, LoggingConfig, PerformanceConfig, RootConfig, ServerConfig};

/// Config file looked up in the working directory (extension optional)
pub const DEFAULT_CONFIG_PATH: &str = "config";

impl Config {
    /// Load configuration from the default file, falling back to built-in defaults
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from specified file path (without extension)
    ///
    /// A missing file is not an error: every field has a default matching the
    /// fixed values the server has always used (port 8000, root `/workspace`).
    pub fn load_from(config_path: &str) -> Result<Self, config::ConfigError> {
        let defaults = Self::default();
        let settings = config::Config::builder()
            .set_default("server.host", defaults.server.host)?
            .set_default("server.port", defaults.server.port)?
            .set_default("root.dir", defaults.root.dir)?
            .set_default("root.index_files", defaults.root.index_files)?
            .set_default("root.directory_listing", defaults.root.directory_listing)?
            .set_default("logging.level", defaults.logging.level)?
            .set_default("logging.access_log", defaults.logging.access_log)?
            .set_default("logging.access_log_format", defaults.logging.access_log_format)?
            .set_default("performance.read_timeout", defaults.performance.read_timeout)?
            .set_default(
                "performance.shutdown_timeout",
                defaults.performance.shutdown_timeout,
            )?
            .add_source(config::File::with_name(config_path).required(false))
            .build()?;

        settings.try_deserialize()
    }

    pub fn get_socket_addr(&self) -> Result<SocketAddr, String> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .map_err(|e| format!("Invalid address: {e}"))
    }
}
