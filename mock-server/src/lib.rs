//! Test service for exercising the REST client over real HTTP.
//!
//! Routes:
//! - `ANY /echo`: replies 200 with the request body and content type.
//! - `ANY /status/{code}`: replies with `code`; `?key=k` counts the hit.
//! - `ANY /flaky/{key}/{failures}`: 500 for the first `failures` hits, then 200.
//! - `GET /hits/{key}`: hit count for `key`.
//! - `GET /query`: query pairs in order, duplicates kept.
//! - `GET /headers`: request headers as a JSON object.
//! - `GET /text`, `GET /bad-json`, `GET /slow`, `GET /config.json`.
//! - `/resources`, `/resources/{id}`: in-memory JSON documents.

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
    time::Duration,
};

use axum::{
    extract::{Path, Query, State},
    http::{header::CONTENT_TYPE, HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{any, get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

#[derive(Clone, Default)]
pub struct AppState {
    resources: Arc<RwLock<HashMap<Uuid, Value>>>,
    hits: Arc<RwLock<HashMap<String, u64>>>,
}

impl AppState {
    async fn record_hit(&self, key: &str) -> u64 {
        let mut hits = self.hits.write().await;
        let count = hits.entry(key.to_string()).or_insert(0);
        *count += 1;
        *count
    }
}

pub fn app() -> Router {
    Router::new()
        .route("/echo", any(echo))
        .route("/status/{code}", any(status))
        .route("/flaky/{key}/{failures}", any(flaky))
        .route("/hits/{key}", get(hits))
        .route("/query", get(query))
        .route("/headers", get(headers))
        .route("/text", get(text))
        .route("/bad-json", get(bad_json))
        .route("/slow", get(slow))
        .route("/config.json", get(config))
        .route("/resources", post(create_resource))
        .route(
            "/resources/{id}",
            get(get_resource).put(replace_resource).delete(delete_resource),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(AppState::default())
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

async fn echo(method: Method, headers: HeaderMap, body: String) -> Response {
    let mut response = (StatusCode::OK, [("x-echo-method", method.to_string())], body).into_response();
    if let Some(content_type) = headers.get(CONTENT_TYPE) {
        response
            .headers_mut()
            .insert(CONTENT_TYPE, content_type.clone());
    }
    response
}

async fn status(
    State(state): State<AppState>,
    Path(code): Path<u16>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    if let Some(key) = query.get("key") {
        state.record_hit(key).await;
    }
    let status = StatusCode::from_u16(code).unwrap_or(StatusCode::BAD_REQUEST);
    (status, format!("status {code}")).into_response()
}

async fn flaky(
    State(state): State<AppState>,
    Path((key, failures)): Path<(String, u64)>,
) -> Response {
    let hits = state.record_hit(&key).await;
    if hits <= failures {
        tracing::debug!(%key, hits, "flaky failure");
        return (StatusCode::INTERNAL_SERVER_ERROR, format!("flaky failure {hits}")).into_response();
    }
    Json(json!({ "key": key, "hits": hits })).into_response()
}

async fn hits(State(state): State<AppState>, Path(key): Path<String>) -> Json<Value> {
    let hits = state.hits.read().await.get(&key).copied().unwrap_or(0);
    Json(json!({ "key": key, "hits": hits }))
}

async fn query(Query(pairs): Query<Vec<(String, String)>>) -> Json<Vec<(String, String)>> {
    Json(pairs)
}

async fn headers(headers: HeaderMap) -> Json<BTreeMap<String, String>> {
    Json(
        headers
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    value.to_str().unwrap_or_default().to_string(),
                )
            })
            .collect(),
    )
}

async fn text() -> &'static str {
    "plain text body"
}

async fn bad_json() -> impl IntoResponse {
    ([(CONTENT_TYPE, "application/json")], "not json")
}

async fn slow() -> &'static str {
    tokio::time::sleep(Duration::from_secs(2)).await;
    "finally"
}

async fn config() -> Json<Value> {
    Json(json!({
        "remote": { "url": "http://remote.example/api", "retryLimit": 1 },
        "local": { "host": "localhost", "port": 3000 }
    }))
}

async fn create_resource(
    State(state): State<AppState>,
    Json(mut doc): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let id = Uuid::new_v4();
    if let Value::Object(fields) = &mut doc {
        fields.insert("id".to_string(), json!(id));
    }
    state.resources.write().await.insert(id, doc.clone());
    (StatusCode::CREATED, Json(doc))
}

async fn get_resource(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, StatusCode> {
    let resources = state.resources.read().await;
    resources.get(&id).cloned().map(Json).ok_or(StatusCode::NOT_FOUND)
}

async fn replace_resource(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(mut doc): Json<Value>,
) -> Result<Json<Value>, StatusCode> {
    let mut resources = state.resources.write().await;
    let slot = resources.get_mut(&id).ok_or(StatusCode::NOT_FOUND)?;
    if let Value::Object(fields) = &mut doc {
        fields.insert("id".to_string(), json!(id));
    }
    *slot = doc.clone();
    Ok(Json(doc))
}

async fn delete_resource(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, StatusCode> {
    let mut resources = state.resources.write().await;
    resources
        .remove(&id)
        .map(|_| StatusCode::NO_CONTENT)
        .ok_or(StatusCode::NOT_FOUND)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hits_are_counted_per_key() {
        let state = AppState::default();
        assert_eq!(state.record_hit("a").await, 1);
        assert_eq!(state.record_hit("a").await, 2);
        assert_eq!(state.record_hit("b").await, 1);
    }
}
