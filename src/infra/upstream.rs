//! HTTP client for the indexed SQL endpoint that backs every report.

use std::time::Duration;

use reqwest::Client;
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::cache::FetchError;

use super::error::InfraError;

/// Query parameter naming the SQL endpoint directly.
pub const SQL_BASE_URL_PARAM: &str = "toriiSqlBaseUrl";
/// Query parameter naming the indexer root; `/sql` is appended.
pub const BASE_URL_PARAM: &str = "toriiBaseUrl";

#[derive(Debug, Clone)]
pub struct UpstreamClient {
    http: Client,
}

impl UpstreamClient {
    pub fn new(timeout: Duration) -> Result<Self, InfraError> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("staleguard/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| InfraError::upstream(format!("failed to build HTTP client: {err}")))?;
        Ok(Self { http })
    }

    /// Run `query` against `base_url` and return the rows of the JSON array
    /// the endpoint answers with. `context` prefixes every error message.
    pub async fn fetch_rows(
        &self,
        base_url: &str,
        query: &str,
        context: &str,
    ) -> Result<Vec<Value>, FetchError> {
        let url = build_sql_url(base_url, query)
            .map_err(|err| FetchError::transport(context, format!("invalid base URL: {err}")))?;

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|err| FetchError::transport(context, describe_transport_error(&err)))?;

        let status = response.status();
        if !status.is_success() {
            let reason = status.canonical_reason().unwrap_or_default();
            let rendered = format!("{} {reason}", status.as_u16());
            return Err(FetchError::upstream(context, rendered.trim_end()));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|err| FetchError::malformed(context, format!("invalid JSON body: {err}")))?;

        match body {
            Value::Array(rows) => {
                debug!(context, rows = rows.len(), "upstream rows received");
                Ok(rows)
            }
            _ => Err(FetchError::malformed(context, "expected array response")),
        }
    }
}

fn describe_transport_error(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        "request timed out".to_string()
    } else if err.is_connect() {
        format!("connection failed: {err}")
    } else {
        err.to_string()
    }
}

/// `base_url` with its `query` parameter set to the SQL text.
pub fn build_sql_url(base_url: &str, query: &str) -> Result<Url, url::ParseError> {
    let mut url = Url::parse(base_url)?;
    let retained: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(name, _)| name != "query")
        .map(|(name, value)| (name.into_owned(), value.into_owned()))
        .collect();
    url.query_pairs_mut()
        .clear()
        .extend_pairs(retained)
        .append_pair("query", query);
    Ok(url)
}

/// Canonical form of an upstream address, or `None` when it is unusable.
///
/// Query and fragment are dropped and trailing slashes trimmed. With
/// `append_sql`, the path gains a `/sql` suffix unless it already ends in one.
pub fn normalize_base_url(value: &str, append_sql: bool) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }

    let mut url = Url::parse(trimmed).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }

    url.set_query(None);
    url.set_fragment(None);

    let base_path = url.path().trim_end_matches('/').to_string();
    let path = if append_sql && !base_path.ends_with("/sql") {
        format!("{base_path}/sql")
    } else if base_path.is_empty() {
        "/".to_string()
    } else {
        base_path
    };
    url.set_path(&path);

    Some(url.to_string())
}

/// Pick the upstream for a request: the explicit SQL endpoint, then the
/// indexer root, then the configured default.
pub fn resolve_base_url(
    sql_base_url: Option<&str>,
    base_url: Option<&str>,
    fallback: Option<&str>,
) -> Option<String> {
    sql_base_url
        .and_then(|value| normalize_base_url(value, false))
        .or_else(|| base_url.and_then(|value| normalize_base_url(value, true)))
        .or_else(|| fallback.and_then(|value| normalize_base_url(value, false)))
}
