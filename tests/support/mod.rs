//! In-process stand-in for the indexed SQL endpoint.

#![allow(dead_code)]

use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde_json::{Value, json};
use tokio::net::TcpListener;

pub const ROW_COUNT: usize = 120;

#[derive(Clone, Default)]
pub struct UpstreamHits {
    count: Arc<AtomicUsize>,
    queries: Arc<Mutex<Vec<String>>>,
}

impl UpstreamHits {
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries
            .lock()
            .map(|queries| queries.clone())
            .unwrap_or_default()
    }

    fn record(&self, query: Option<&String>) {
        self.count.fetch_add(1, Ordering::SeqCst);
        if let (Some(query), Ok(mut queries)) = (query, self.queries.lock()) {
            queries.push(query.clone());
        }
    }
}

pub struct FakeUpstream {
    pub addr: SocketAddr,
    pub hits: UpstreamHits,
}

impl FakeUpstream {
    /// SQL endpoint answering with a large array of rows.
    pub fn sql_url(&self) -> String {
        format!("http://{}/sql", self.addr)
    }

    /// Indexer root whose `/sql` endpoint is [`Self::sql_url`].
    pub fn root_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn failing_url(&self) -> String {
        format!("http://{}/down/sql", self.addr)
    }

    pub fn object_url(&self) -> String {
        format!("http://{}/object/sql", self.addr)
    }
}

pub async fn spawn_upstream() -> FakeUpstream {
    let hits = UpstreamHits::default();
    let router = Router::new()
        .route("/sql", get(rows))
        .route("/down/sql", get(unavailable))
        .route("/object/sql", get(object))
        .with_state(hits.clone());

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind fake upstream");
    let addr = listener.local_addr().expect("fake upstream address");
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });

    FakeUpstream { addr, hits }
}

async fn rows(
    State(hits): State<UpstreamHits>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<Value> {
    let query = params.get("query");
    hits.record(query);

    if query.is_some_and(|q| q.contains("CONFIG")) {
        return Json(json!([{ "points_per_second": 3 }, { "points_per_second": 4 }]));
    }

    let rows: Vec<Value> = (0..ROW_COUNT)
        .map(|id| json!({ "id": id, "owner": format!("0x{id:040x}") }))
        .collect();
    Json(Value::Array(rows))
}

async fn unavailable(State(hits): State<UpstreamHits>) -> Response {
    hits.record(None);
    StatusCode::SERVICE_UNAVAILABLE.into_response()
}

async fn object(State(hits): State<UpstreamHits>) -> Json<Value> {
    hits.record(None);
    Json(json!({ "rows": [] }))
}
