use std::path::PathBuf;

use clap::{Args, Parser, builder::BoolishValueParser};

/// Command-line arguments for the staleguard binary.
#[derive(Debug, Parser)]
#[command(
    name = "staleguard",
    version,
    about = "Stale-while-revalidate cache in front of an indexed SQL endpoint"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "STALEGUARD_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    /// Override the listener host.
    #[arg(long = "host", value_name = "HOST")]
    pub host: Option<String>,

    /// Override the listener port.
    #[arg(long = "port", value_name = "PORT")]
    pub port: Option<u16>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Enable or bypass every cache domain.
    #[arg(
        long = "cache-enabled",
        env = "CACHE_ENABLED",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub cache_enabled: Option<bool>,

    /// Default upstream SQL endpoint used when a request names none.
    #[arg(
        long = "upstream-sql-base-url",
        env = "TORII_SQL_BASE_URL",
        value_name = "URL"
    )]
    pub upstream_sql_base_url: Option<String>,
}
