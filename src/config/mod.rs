// Configuration module entry point
// Loads layered configuration and builds the shared application state

mod state;
mod types;

use std::net::SocketAddr;

use config::builder::DefaultState;
use config::{ConfigBuilder, ConfigError};

// Re-export public types
pub use state::AppState;
pub use types::{
    Config, HttpConfig, LogLevel, LoggingConfig, Overrides, PerformanceConfig, ServeConfig,
    ServerConfig,
};

/// Config file looked up in the working directory when `--config` is absent
pub const DEFAULT_CONFIG_FILE: &str = "nocache";

/// Port used when nothing else is configured
pub const DEFAULT_PORT: u16 = 3000;

const ENV_PREFIX: &str = "NOCACHE";

impl Config {
    /// Load configuration: defaults, then the config file, then `NOCACHE_*`
    /// environment variables, then command-line overrides.
    pub fn load(overrides: &Overrides) -> Result<Self, ConfigError> {
        Self::load_with_env(overrides, environment())
    }

    fn load_with_env(
        overrides: &Overrides,
        environment: config::Environment,
    ) -> Result<Self, ConfigError> {
        let file = overrides
            .config_file
            .as_deref()
            .unwrap_or(DEFAULT_CONFIG_FILE);

        let settings = defaults()?
            // An explicit --config must exist; the implicit one is optional
            .add_source(config::File::with_name(file).required(overrides.config_file.is_some()))
            .add_source(environment)
            .set_override_option("server.host", overrides.host.clone())?
            .set_override_option("server.port", overrides.port.map(i64::from))?
            .set_override_option("serve.root", overrides.root.clone())?
            .build()?;

        settings.try_deserialize()
    }

    /// Configuration built from defaults only, ignoring files and environment
    pub fn from_defaults() -> Result<Self, ConfigError> {
        defaults()?.build()?.try_deserialize()
    }

    pub fn get_socket_addr(&self) -> Result<SocketAddr, String> {
        let host = self.server.host.trim_start_matches('[').trim_end_matches(']');
        let addr = if host.contains(':') {
            format!("[{host}]:{}", self.server.port)
        } else {
            format!("{host}:{}", self.server.port)
        };
        addr.parse().map_err(|e| format!("Invalid address: {e}"))
    }
}

fn environment() -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    config::Config::builder()
        .set_default("server.host", "0.0.0.0")?
        .set_default("server.port", i64::from(DEFAULT_PORT))?
        .set_default("serve.root", ".")?
        .set_default("serve.index_files", vec!["index.html", "index.htm"])?
        .set_default("serve.directory_listing", true)?
        .set_default("logging.level", "info")?
        .set_default("logging.access_log", true)?
        .set_default("logging.access_log_format", "common")?
        .set_default("performance.keep_alive", true)?
        .set_default("performance.read_timeout", 30)?
        .set_default("performance.write_timeout", 30)?
        .set_default(
            "http.server_name",
            concat!("nocache-server/", env!("CARGO_PKG_VERSION")),
        )?
        .set_default("http.enable_cors", false)
}
