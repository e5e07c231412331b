//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;
pub mod queries;

use std::{
    collections::BTreeMap,
    net::SocketAddr,
    num::{NonZeroU32, NonZeroU64},
    str::FromStr,
    time::Duration,
};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

pub use cli::{CliArgs, ServeOverrides};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "staleguard";
const ENV_PREFIX: &str = "STALEGUARD";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 4001;
const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 15;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 600;
const DEFAULT_COMPRESSION_THRESHOLD_BYTES: u64 = 1024;

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub upstream: UpstreamSettings,
    pub cache: CacheSettings,
    pub reports: Vec<ReportSettings>,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct UpstreamSettings {
    /// Normalized SQL endpoint used when a request does not name one.
    pub sql_base_url: Option<String>,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub enabled: bool,
    pub sweep_interval: Duration,
    pub compression_threshold_bytes: usize,
}

/// One cached report: its freshness policy and how to query the upstream.
#[derive(Debug, Clone)]
pub struct ReportSettings {
    pub name: String,
    pub ttl: Duration,
    pub stale: Duration,
    pub max_entries: usize,
    pub source: ReportSource,
    pub limit: Option<LimitSettings>,
    pub paginate: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportSource {
    Query(String),
    Parts(BTreeMap<String, PartSettings>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartSettings {
    pub query: String,
    /// Keep only the first row (or `null`) instead of the full array.
    pub single_row: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitSettings {
    pub default: NonZeroU32,
    pub max: NonZeroU32,
    pub on_zero: ZeroLimit,
}

/// What a request with `limit <= 0` receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZeroLimit {
    /// An empty array, without touching the cache or the upstream.
    Empty,
    /// The whole report, without a limit clause.
    Unbounded,
}

impl FromStr for ZeroLimit {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "empty" => Ok(Self::Empty),
            "unbounded" | "all" => Ok(Self::Unbounded),
            other => Err(format!("expected `empty` or `unbounded`, got `{other}`")),
        }
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: String, reason: String },
}

impl LoadError {
    fn invalid(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_serve_overrides(&cli.overrides);

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    upstream: RawUpstreamSettings,
    cache: RawCacheSettings,
    reports: BTreeMap<String, RawReportSettings>,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.port {
            self.server.port = Some(port);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(enabled) = overrides.cache_enabled {
            self.cache.enabled = Some(enabled);
        }
        if let Some(url) = overrides.upstream_sql_base_url.as_ref() {
            self.upstream.sql_base_url = Some(url.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            upstream,
            cache,
            reports,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            upstream: build_upstream_settings(upstream)?,
            cache: build_cache_settings(cache)?,
            reports: build_report_settings(reports)?,
        })
    }

    pub fn report(&self, name: &str) -> Option<&ReportSettings> {
        self.reports.iter().find(|report| report.name == name)
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());
    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    Ok(ServerSettings { addr })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_upstream_settings(upstream: RawUpstreamSettings) -> Result<UpstreamSettings, LoadError> {
    let sql_base_url = match upstream.sql_base_url {
        Some(value) if !value.trim().is_empty() => {
            let normalized = crate::infra::upstream::normalize_base_url(&value, false)
                .ok_or_else(|| {
                    LoadError::invalid(
                        "upstream.sql_base_url",
                        format!("`{value}` is not an absolute http(s) URL"),
                    )
                })?;
            Some(normalized)
        }
        _ => None,
    };

    let timeout_secs = upstream
        .timeout_seconds
        .unwrap_or(DEFAULT_UPSTREAM_TIMEOUT_SECS);
    let timeout_secs = non_zero_u64(timeout_secs, "upstream.timeout_seconds")?;

    Ok(UpstreamSettings {
        sql_base_url,
        timeout: Duration::from_secs(timeout_secs.get()),
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let sweep_secs = cache
        .sweep_interval_seconds
        .unwrap_or(DEFAULT_SWEEP_INTERVAL_SECS);
    let sweep_secs = non_zero_u64(sweep_secs, "cache.sweep_interval_seconds")?;

    let threshold = cache
        .compression_threshold_bytes
        .unwrap_or(DEFAULT_COMPRESSION_THRESHOLD_BYTES);
    let compression_threshold_bytes = usize::try_from(threshold).map_err(|_| {
        LoadError::invalid(
            "cache.compression_threshold_bytes",
            "value exceeds supported range for usize",
        )
    })?;

    Ok(CacheSettings {
        enabled: cache.enabled.unwrap_or(true),
        sweep_interval: Duration::from_secs(sweep_secs.get()),
        compression_threshold_bytes,
    })
}

/// Merge configured reports over the built-in catalogue, field by field.
fn build_report_settings(
    mut configured: BTreeMap<String, RawReportSettings>,
) -> Result<Vec<ReportSettings>, LoadError> {
    let mut reports = Vec::new();

    for (name, builtin) in builtin_reports() {
        let merged = match configured.remove(name) {
            Some(overrides) => overrides.over(builtin),
            None => builtin,
        };
        reports.push(build_report(name, merged)?);
    }

    for (name, raw) in configured {
        reports.push(build_report(&name, raw)?);
    }

    Ok(reports)
}

fn build_report(name: &str, raw: RawReportSettings) -> Result<ReportSettings, LoadError> {
    let key = |field: &str| format!("reports.{name}.{field}");

    if name.is_empty()
        || !name
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_')
    {
        return Err(LoadError::invalid(
            format!("reports.{name}"),
            "report names may only contain ASCII letters, digits, `-` and `_`",
        ));
    }

    let ttl_ms = raw
        .ttl_ms
        .ok_or_else(|| LoadError::invalid(key("ttl_ms"), "missing"))?;
    let stale_ms = raw.stale_ms.unwrap_or(ttl_ms);
    let max_entries = raw.max_entries.unwrap_or(1).max(1);

    let source = match (raw.query, raw.parts) {
        (Some(query), None) if !query.trim().is_empty() => ReportSource::Query(query),
        (None, Some(parts)) if !parts.is_empty() => ReportSource::Parts(
            parts
                .into_iter()
                .map(|(part, raw_part)| (part, raw_part.into()))
                .collect(),
        ),
        (Some(_), Some(_)) => {
            return Err(LoadError::invalid(
                format!("reports.{name}"),
                "set either `query` or `parts`, not both",
            ));
        }
        _ => {
            return Err(LoadError::invalid(
                format!("reports.{name}"),
                "a non-empty `query` or `parts` table is required",
            ));
        }
    };

    let limit = match (raw.limit_default, raw.limit_max) {
        (None, None) => None,
        (default, max) => {
            let max = non_zero_u32(max.unwrap_or(u64::from(u32::MAX)), key("limit_max"))?;
            let default = non_zero_u32(default.unwrap_or(max.get().into()), key("limit_default"))?;
            if default > max {
                return Err(LoadError::invalid(
                    key("limit_default"),
                    format!("must not exceed limit_max ({max})"),
                ));
            }
            let on_zero = match raw.zero_limit.as_deref() {
                Some(value) => ZeroLimit::from_str(value)
                    .map_err(|reason| LoadError::invalid(key("zero_limit"), reason))?,
                None => ZeroLimit::Empty,
            };
            Some(LimitSettings {
                default,
                max,
                on_zero,
            })
        }
    };

    let paginate = raw.paginate.unwrap_or(false);
    if paginate && limit.is_none() {
        return Err(LoadError::invalid(
            key("paginate"),
            "pagination requires limit_default or limit_max",
        ));
    }

    Ok(ReportSettings {
        name: name.to_string(),
        ttl: Duration::from_millis(ttl_ms),
        stale: Duration::from_millis(stale_ms),
        max_entries,
        source,
        limit,
        paginate,
    })
}

fn builtin_reports() -> Vec<(&'static str, RawReportSettings)> {
    let query = |text: &str| Some(text.to_string());
    let part = |text: &str| RawPartSettings::Query(text.to_string());

    vec![
        (
            "leaderboard",
            RawReportSettings {
                ttl_ms: Some(60_000),
                stale_ms: Some(300_000),
                max_entries: Some(5),
                parts: Some(BTreeMap::from([
                    ("registeredRows".to_string(), part(queries::LEADERBOARD_QUERY)),
                    (
                        "hyperstructureShareholderRows".to_string(),
                        part(queries::HYPERSTRUCTURE_SHAREHOLDERS_QUERY),
                    ),
                    (
                        "hyperstructureRows".to_string(),
                        part(queries::HYPERSTRUCTURES_WITH_MULTIPLIER_QUERY),
                    ),
                    (
                        "hyperstructureConfigRow".to_string(),
                        RawPartSettings::Detailed {
                            query: queries::HYPERSTRUCTURE_LEADERBOARD_CONFIG_QUERY.to_string(),
                            single_row: true,
                        },
                    ),
                ])),
                limit_default: Some(50),
                limit_max: Some(5000),
                zero_limit: Some("unbounded".to_string()),
                ..Default::default()
            },
        ),
        (
            "story-events",
            RawReportSettings {
                ttl_ms: Some(10_000),
                stale_ms: Some(120_000),
                max_entries: Some(25),
                query: query(queries::STORY_EVENTS_QUERY),
                limit_default: Some(50),
                limit_max: Some(2000),
                paginate: Some(true),
                ..Default::default()
            },
        ),
        (
            "tiles",
            RawReportSettings {
                ttl_ms: Some(5_000),
                stale_ms: Some(30_000),
                max_entries: Some(2),
                query: query(queries::ALL_TILES_QUERY),
                ..Default::default()
            },
        ),
        (
            "hyperstructures",
            RawReportSettings {
                ttl_ms: Some(5_000),
                stale_ms: Some(30_000),
                max_entries: Some(10),
                query: query(queries::HYPERSTRUCTURES_QUERY),
                ..Default::default()
            },
        ),
        (
            "structure-explorer-details",
            RawReportSettings {
                ttl_ms: Some(5_000),
                stale_ms: Some(30_000),
                max_entries: Some(5),
                query: query(queries::STRUCTURE_AND_EXPLORER_DETAILS_QUERY),
                ..Default::default()
            },
        ),
    ]
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawUpstreamSettings {
    sql_base_url: Option<String>,
    timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    enabled: Option<bool>,
    sweep_interval_seconds: Option<u64>,
    compression_threshold_bytes: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawReportSettings {
    ttl_ms: Option<u64>,
    stale_ms: Option<u64>,
    max_entries: Option<usize>,
    query: Option<String>,
    parts: Option<BTreeMap<String, RawPartSettings>>,
    limit_default: Option<u64>,
    limit_max: Option<u64>,
    zero_limit: Option<String>,
    paginate: Option<bool>,
}

impl RawReportSettings {
    fn over(self, base: Self) -> Self {
        // A configured source replaces the built-in one wholesale.
        let (query, parts) = if self.query.is_some() || self.parts.is_some() {
            (self.query, self.parts)
        } else {
            (base.query, base.parts)
        };

        Self {
            ttl_ms: self.ttl_ms.or(base.ttl_ms),
            stale_ms: self.stale_ms.or(base.stale_ms),
            max_entries: self.max_entries.or(base.max_entries),
            query,
            parts,
            limit_default: self.limit_default.or(base.limit_default),
            limit_max: self.limit_max.or(base.limit_max),
            zero_limit: self.zero_limit.or(base.zero_limit),
            paginate: self.paginate.or(base.paginate),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RawPartSettings {
    Query(String),
    Detailed {
        query: String,
        #[serde(default)]
        single_row: bool,
    },
}

impl From<RawPartSettings> for PartSettings {
    fn from(raw: RawPartSettings) -> Self {
        match raw {
            RawPartSettings::Query(query) => Self {
                query,
                single_row: false,
            },
            RawPartSettings::Detailed { query, single_row } => Self { query, single_row },
        }
    }
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn non_zero_u64(value: u64, key: impl Into<String>) -> Result<NonZeroU64, LoadError> {
    NonZeroU64::new(value).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

fn non_zero_u32(value: u64, key: impl Into<String>) -> Result<NonZeroU32, LoadError> {
    let key = key.into();
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key.clone(), "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}
