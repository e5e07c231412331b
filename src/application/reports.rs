//! Cached reports: request planning, cache keys and upstream fetchers.
//!
//! Every configured report is backed by its own cache domain. A request is
//! first resolved to an upstream address and a [`ReportPlan`], which fixes the
//! cache key and the SQL text, before the domain is consulted.

use std::{
    collections::BTreeMap,
    sync::{Arc, OnceLock},
    time::Duration,
};

use futures::{
    FutureExt,
    future::{BoxFuture, try_join_all},
};
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::time::Instant;
use tracing::info;

use crate::{
    cache::{CacheDomain, CacheDomainConfig, CacheEngine, CachePayload, CacheStatus, FetchError},
    config::{LimitSettings, PartSettings, ReportSettings, ReportSource, ZeroLimit},
    infra::upstream::{UpstreamClient, resolve_base_url},
};

const LIMIT_PLACEHOLDER: &str = "{limit}";
const OFFSET_PLACEHOLDER: &str = "{offset}";
const LIMIT_CLAUSE_PLACEHOLDER: &str = "{limit_clause}";
/// Renders as "no limit" for SQLite-backed endpoints.
const UNBOUNDED_LIMIT: &str = "-1";

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("unknown report `{0}`")]
    UnknownReport(String),
    #[error(
        "upstream SQL base URL missing. Provide toriiSqlBaseUrl or toriiBaseUrl, or set upstream.sql_base_url."
    )]
    MissingUpstream,
    #[error("failed to fetch {report} report")]
    Fetch { report: String, source: FetchError },
}

/// Query-string parameters accepted by every report endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ReportParams {
    pub limit: Option<String>,
    pub offset: Option<String>,
    #[serde(rename = "toriiSqlBaseUrl")]
    pub sql_base_url: Option<String>,
    #[serde(rename = "toriiBaseUrl")]
    pub base_url: Option<String>,
}

/// How one request maps onto the cache and the upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportPlan {
    /// Answer with an empty array without consulting cache or upstream.
    Empty,
    Fetch {
        key: String,
        limit: Option<u32>,
        offset: Option<u64>,
    },
}

impl ReportPlan {
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::Empty => None,
            Self::Fetch { key, .. } => Some(key),
        }
    }
}

/// Resolve cache key, limit and offset for `settings` given raw parameters.
pub fn plan(settings: &ReportSettings, base_url: &str, params: &ReportParams) -> ReportPlan {
    let Some(limits) = settings.limit else {
        return ReportPlan::Fetch {
            key: format!("{base_url}|all"),
            limit: None,
            offset: None,
        };
    };

    let limit = match resolve_limit(&limits, params.limit.as_deref()) {
        ResolvedLimit::Empty => return ReportPlan::Empty,
        ResolvedLimit::Unbounded => None,
        ResolvedLimit::Bounded(limit) => Some(limit),
    };

    let offset = settings
        .paginate
        .then(|| resolve_offset(params.offset.as_deref()));

    let key = match (limit, offset) {
        (None, _) => format!("{base_url}|all"),
        (Some(limit), None) => format!("{base_url}|limit:{limit}"),
        (Some(limit), Some(offset)) => format!("{base_url}|limit:{limit}|offset:{offset}"),
    };

    ReportPlan::Fetch { key, limit, offset }
}

enum ResolvedLimit {
    Empty,
    Unbounded,
    Bounded(u32),
}

fn resolve_limit(limits: &LimitSettings, raw: Option<&str>) -> ResolvedLimit {
    // Absent or empty takes the default; text without leading digits takes
    // the smallest limit.
    let requested = match raw.filter(|value| !value.is_empty()) {
        Some(value) => parse_leading_int(value).unwrap_or(1),
        None => i64::from(limits.default.get()),
    };

    if requested <= 0 {
        return match limits.on_zero {
            ZeroLimit::Empty => ResolvedLimit::Empty,
            ZeroLimit::Unbounded => ResolvedLimit::Unbounded,
        };
    }

    let max = i64::from(limits.max.get());
    // Clamped into 1..=max, which always fits a u32.
    ResolvedLimit::Bounded(u32::try_from(requested.clamp(1, max)).unwrap_or(limits.max.get()))
}

fn resolve_offset(raw: Option<&str>) -> u64 {
    raw.filter(|value| !value.is_empty())
        .and_then(parse_leading_int)
        .map(|offset| u64::try_from(offset.max(0)).unwrap_or(0))
        .unwrap_or(0)
}

/// Parse the leading decimal integer of `value`, ignoring trailing text
/// (`"25rows"` reads as 25). `None` when no digits lead the value.
fn parse_leading_int(value: &str) -> Option<i64> {
    let trimmed = value.trim_start();
    let (negative, rest) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };
    let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return None;
    }
    let magnitude = rest[..digits].parse::<i64>().unwrap_or(i64::MAX);
    Some(if negative { -magnitude } else { magnitude })
}

/// Substitute the limit and offset placeholders in `query`.
pub fn render_query(query: &str, limit: Option<u32>, offset: Option<u64>) -> String {
    let offset = offset.unwrap_or(0);
    let clause = match limit {
        Some(limit) => format!("LIMIT {limit} OFFSET {offset}"),
        None => String::new(),
    };
    let limit = limit.map_or_else(|| UNBOUNDED_LIMIT.to_string(), |limit| limit.to_string());

    query
        .replace(LIMIT_CLAUSE_PLACEHOLDER, &clause)
        .replace(LIMIT_PLACEHOLDER, &limit)
        .replace(OFFSET_PLACEHOLDER, &offset.to_string())
}

/// A served report: the shared payload plus the tier that produced it.
#[derive(Debug, Clone)]
pub struct ReportResponse {
    pub payload: Arc<CachePayload>,
    pub status: CacheStatus,
}

struct Report {
    settings: ReportSettings,
    domain: Arc<CacheDomain<CachePayload>>,
}

pub struct ReportService {
    upstream: UpstreamClient,
    default_base_url: Option<String>,
    reports: BTreeMap<String, Report>,
}

impl ReportService {
    /// Register one cache domain per report with `engine`.
    pub fn new(
        engine: &CacheEngine,
        reports: &[ReportSettings],
        upstream: UpstreamClient,
        default_base_url: Option<String>,
    ) -> Self {
        let reports = reports
            .iter()
            .map(|settings| {
                let config =
                    CacheDomainConfig::new(settings.ttl, settings.stale, settings.max_entries);
                let domain = engine.domain::<CachePayload>(settings.name.clone(), config);
                (
                    settings.name.clone(),
                    Report {
                        settings: settings.clone(),
                        domain,
                    },
                )
            })
            .collect();

        Self {
            upstream,
            default_base_url,
            reports,
        }
    }

    /// Serve `name` through its cache domain.
    pub async fn load(
        &self,
        name: &str,
        params: &ReportParams,
    ) -> Result<ReportResponse, ReportError> {
        let start = Instant::now();
        let report = self
            .reports
            .get(name)
            .ok_or_else(|| ReportError::UnknownReport(name.to_string()))?;

        let base_url = resolve_base_url(
            params.sql_base_url.as_deref(),
            params.base_url.as_deref(),
            self.default_base_url.as_deref(),
        )
        .ok_or(ReportError::MissingUpstream)?;

        let (key, limit, offset) = match plan(&report.settings, &base_url, params) {
            ReportPlan::Empty => {
                info!(
                    target: "staleguard::reports",
                    report = name,
                    status = %CacheStatus::Hit,
                    total_ms = elapsed_ms(start.elapsed()),
                    limit = 0,
                    "report served"
                );
                return Ok(ReportResponse {
                    payload: Arc::new(CachePayload::empty_array()),
                    status: CacheStatus::Hit,
                });
            }
            ReportPlan::Fetch { key, limit, offset } => (key, limit, offset),
        };

        let fetch_time = Arc::new(OnceLock::new());
        let fetcher = self.fetcher(
            &report.settings,
            base_url,
            limit,
            offset,
            Arc::clone(&fetch_time),
        );

        let read = report
            .domain
            .read(&key, fetcher)
            .await
            .map_err(|source| ReportError::Fetch {
                report: name.to_string(),
                source,
            })?;

        info!(
            target: "staleguard::reports",
            report = name,
            status = %read.status,
            total_ms = elapsed_ms(start.elapsed()),
            fetch_ms = ?fetch_time.get().copied().map(elapsed_ms),
            age_ms = elapsed_ms(read.age()),
            limit = ?limit,
            offset = ?offset,
            "report served"
        );

        Ok(ReportResponse {
            payload: read.value,
            status: read.status,
        })
    }

    fn fetcher(
        &self,
        settings: &ReportSettings,
        base_url: String,
        limit: Option<u32>,
        offset: Option<u64>,
        fetch_time: Arc<OnceLock<Duration>>,
    ) -> impl FnOnce() -> BoxFuture<'static, Result<CachePayload, FetchError>> + Send + 'static {
        let upstream = self.upstream.clone();
        let name = settings.name.clone();
        let source = match &settings.source {
            ReportSource::Query(query) => {
                RenderedSource::Query(render_query(query, limit, offset))
            }
            ReportSource::Parts(parts) => RenderedSource::Parts(
                parts
                    .iter()
                    .map(|(part, PartSettings { query, single_row })| {
                        (part.clone(), render_query(query, limit, offset), *single_row)
                    })
                    .collect(),
            ),
        };

        move || {
            async move {
                let started = Instant::now();
                let result = source.fetch(&upstream, &base_url, &name).await;
                let _ = fetch_time.set(started.elapsed());
                result
            }
            .boxed()
        }
    }
}

enum RenderedSource {
    Query(String),
    Parts(Vec<(String, String, bool)>),
}

impl RenderedSource {
    async fn fetch(
        &self,
        upstream: &UpstreamClient,
        base_url: &str,
        report: &str,
    ) -> Result<CachePayload, FetchError> {
        match self {
            Self::Query(query) => {
                let rows = upstream.fetch_rows(base_url, query, report).await?;
                CachePayload::from_value(&rows)
            }
            Self::Parts(parts) => {
                let fetches = parts.iter().map(|(part, query, single_row)| async move {
                    let rows = upstream.fetch_rows(base_url, query, part).await?;
                    let value = if *single_row {
                        rows.into_iter().next().unwrap_or(Value::Null)
                    } else {
                        Value::Array(rows)
                    };
                    Ok::<_, FetchError>((part.clone(), value))
                });
                let object: Map<String, Value> = try_join_all(fetches).await?.into_iter().collect();
                CachePayload::from_value(&object)
            }
        }
    }
}

fn elapsed_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
