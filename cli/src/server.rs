use std::sync::{Arc, Mutex};

use anyhow::Context;
use axum::{
    Json, Router,
    extract::{Path, Request, State},
    http::{HeaderValue, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{post, put},
};
use serde::{Deserialize, Serialize};
use tower_http::limit::RequestBodyLimitLayer;

use calgrid_core::db::Database;
use calgrid_core::models::RecordKind;
use calgrid_core::record::Fields;
use calgrid_core::remote::{DEFAULT_FETCH_LIMIT, Query, RemoteRecord};

const BODY_LIMIT: usize = 1024 * 1024; // 1 MB

/// Upper bound on `limit` in a query.
pub(crate) const MAX_QUERY_LIMIT: usize = DEFAULT_FETCH_LIMIT;

const MAX_NAME_LEN: usize = 255;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) db: Arc<Mutex<Database>>,
    pub(crate) api_key: Option<String>,
}

// --- Request / Response types ---

#[derive(Serialize, Deserialize)]
pub(crate) struct SaveRecordRequest {
    pub(crate) fields: Fields,
}

#[derive(Serialize, Deserialize)]
pub(crate) struct DeleteResponse {
    pub(crate) deleted: bool,
}

#[derive(Serialize, Deserialize)]
pub(crate) struct QueryResponse {
    pub(crate) records: Vec<RemoteRecord>,
}

#[derive(Serialize, Deserialize)]
pub(crate) struct ErrorResponse {
    pub(crate) error: String,
}

// --- Error handling ---

enum ApiError {
    BadRequest(String),
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Internal(err) => {
                tracing::error!(error = %format!("{err:#}"), "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
}

// --- Middleware ---

async fn require_auth(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if let Some(ref expected_key) = state.api_key {
        let authorized = request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .is_some_and(|token| token == expected_key);

        if !authorized {
            return (
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse {
                    error: "Invalid or missing API key".to_string(),
                }),
            )
                .into_response();
        }
    }
    next.run(request).await
}

async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        "x-content-type-options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert(
        "content-security-policy",
        HeaderValue::from_static("default-src 'none'"),
    );
    response
}

// --- Validation ---

fn validate_name(what: &str, value: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(ApiError::BadRequest(format!("{what} must not be empty")));
    }
    if value.len() > MAX_NAME_LEN {
        return Err(ApiError::BadRequest(format!(
            "{what} must be at most {MAX_NAME_LEN} characters"
        )));
    }
    Ok(())
}

fn validate_record_type(record_type: &str) -> Result<(), ApiError> {
    if RecordKind::parse(record_type).is_none() {
        return Err(ApiError::BadRequest(format!(
            "Unknown record type '{record_type}'"
        )));
    }
    Ok(())
}

fn lock(state: &AppState) -> std::sync::MutexGuard<'_, Database> {
    state
        .db
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

// --- Handlers ---

async fn save_record(
    State(state): State<AppState>,
    Path((container, record_type, record_name)): Path<(String, String, String)>,
    Json(req): Json<SaveRecordRequest>,
) -> Result<Json<RemoteRecord>, ApiError> {
    validate_name("container", &container)?;
    validate_record_type(&record_type)?;
    validate_name("record_name", &record_name)?;

    let record = RemoteRecord {
        record_type,
        record_name,
        fields: req.fields,
    };
    lock(&state)
        .put_remote_record(&container, &record)
        .context("database error")?;
    tracing::debug!(%container, record = %record.record_name, "saved record");
    Ok(Json(record))
}

async fn delete_record(
    State(state): State<AppState>,
    Path((container, record_type, record_name)): Path<(String, String, String)>,
) -> Result<Json<DeleteResponse>, ApiError> {
    validate_name("container", &container)?;
    validate_record_type(&record_type)?;
    validate_name("record_name", &record_name)?;

    let deleted = lock(&state)
        .delete_remote_record(&container, &record_type, &record_name)
        .context("database error")?;
    Ok(Json(DeleteResponse { deleted }))
}

async fn query_records(
    State(state): State<AppState>,
    Path(container): Path<String>,
    Json(mut query): Json<Query>,
) -> Result<Json<QueryResponse>, ApiError> {
    validate_name("container", &container)?;
    validate_record_type(&query.record_type)?;
    if let Some(ref sort) = query.sort {
        validate_name("sort field", &sort.field)?;
    }
    query.limit = query.limit.min(MAX_QUERY_LIMIT);

    let records = lock(&state)
        .query_remote_records(&container, &query)
        .context("database error")?;
    Ok(Json(QueryResponse { records }))
}

pub(crate) fn build_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/containers/{container}/records/{record_type}/{record_name}",
            put(save_record).delete(delete_record),
        )
        .route("/api/containers/{container}/query", post(query_records))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .layer(middleware::from_fn(security_headers))
        .with_state(state)
}

// --- Server startup ---

/// First and last four characters of the key. Short keys are hidden entirely.
fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() < 8 {
        return "****".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}

pub async fn start_server(
    db: Database,
    port: u16,
    bind: &str,
    api_key: Option<String>,
) -> anyhow::Result<()> {
    let state = AppState {
        db: Arc::new(Mutex::new(db)),
        api_key: api_key.clone(),
    };

    let app = build_router(state);

    if let Some(ref key) = api_key {
        eprintln!(
            "API key: {} (see api_key file in data directory)",
            mask_key(key)
        );
    } else {
        eprintln!("Warning: Authentication disabled (--no-auth). API is open to anyone.");
    }

    if bind != "127.0.0.1" && bind != "localhost" && api_key.is_none() {
        eprintln!(
            "Warning: Listening on {bind} with no authentication. Any device on your network can read and overwrite your records."
        );
    }

    let listener = tokio::net::TcpListener::bind(format!("{bind}:{port}"))
        .await
        .with_context(|| format!("Failed to bind {bind}:{port}"))?;
    eprintln!("Listening on http://{bind}:{port}");
    tracing::info!(%bind, port, "document store listening");
    axum::serve(listener, app).await?;

    Ok(())
}
