//! Remote-state protocol handlers.
//!
//! Everything is served from `/`.  The item reference comes in the
//! `item` query parameter, the verb decides the store operation.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Query, State},
    http::{header, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use serde_json::Map;
use tracing::{debug, warn};

use crate::errors::{BwStateError, Result};
use crate::store::{LockRecord, LockStore, Reference, StateDocument, StateStore};

/// Error half of every handler result.
type ApiError = (StatusCode, String);

/// The stores the handlers work on.
#[derive(Clone)]
pub struct BackendState {
    pub states: StateStore,
    pub locks: LockStore,
}

/// Build the router serving the remote-state protocol.
///
/// State documents have no size limit.
pub fn router(state: BackendState) -> Router {
    Router::new()
        .route("/", any(handle))
        .layer(DefaultBodyLimit::disable())
        .with_state(Arc::new(state))
}

/// Map a store error to a status code.
pub fn status_for(err: &BwStateError) -> StatusCode {
    match err {
        BwStateError::InvalidReference(_)
        | BwStateError::ValidationError(_)
        | BwStateError::UnsupportedEncryption
        | BwStateError::UnsupportedMetadata => StatusCode::BAD_REQUEST,
        BwStateError::SessionInvalid(_) | BwStateError::NotLoggedIn => StatusCode::UNAUTHORIZED,
        BwStateError::AmbiguousMatch(_) => StatusCode::CONFLICT,
        e if e.is_not_found() => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn api_error(err: BwStateError) -> ApiError {
    let status = status_for(&err);
    if status.is_server_error() {
        warn!(error = %err, "backend request failed");
    }
    (status, err.to_string())
}

/// Run a blocking store call off the async workers.
async fn blocking<T, F>(f: F) -> std::result::Result<T, ApiError>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("store task failed: {e}"),
            )
        })?
        .map_err(api_error)
}

fn json_response(status: StatusCode, body: Vec<u8>) -> Response {
    (status, [(header::CONTENT_TYPE, "application/json")], body).into_response()
}

fn lock_response(status: StatusCode, lock: &LockRecord) -> Response {
    match serde_json::to_vec(lock) {
        Ok(body) => json_response(status, body),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

async fn handle(
    State(state): State<Arc<BackendState>>,
    method: Method,
    Query(params): Query<HashMap<String, String>>,
    body: Bytes,
) -> Response {
    let raw = params.get("item").map(String::as_str).unwrap_or_default();
    debug!(%method, item = raw, "backend request");

    let reference: Reference = match raw.parse() {
        Ok(reference) => reference,
        Err(e) => return api_error(e).into_response(),
    };
    let lock_id = params.get("ID").cloned();

    let result = match method.as_str() {
        "GET" => get_state(&state, reference).await,
        "POST" => update_state(&state, reference, lock_id, body).await,
        "DELETE" => delete_state(&state, reference).await,
        "LOCK" => lock_state(&state, reference, body).await,
        "UNLOCK" => unlock_state(&state, reference, body).await,
        _ => Err((StatusCode::METHOD_NOT_ALLOWED, String::new())),
    };
    result.unwrap_or_else(IntoResponse::into_response)
}

/// `GET`: the latest state document.
async fn get_state(
    state: &BackendState,
    reference: Reference,
) -> std::result::Result<Response, ApiError> {
    let states = state.states.clone();
    let (document, _) = blocking(move || states.get(&reference)).await?;
    let body = serde_json::to_vec(&document)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    Ok(json_response(StatusCode::OK, body))
}

/// `POST`: store a new revision.  With an `ID` query parameter the
/// write is refused while somebody else holds the lock.
async fn update_state(
    state: &BackendState,
    reference: Reference,
    lock_id: Option<String>,
    body: Bytes,
) -> std::result::Result<Response, ApiError> {
    let document: StateDocument = serde_json::from_slice(&body).map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            format!("state is not a JSON object: {e}"),
        )
    })?;

    if let Some(id) = lock_id.filter(|id| !id.is_empty()) {
        if let Some(held) = current_lock(state, reference.clone()).await? {
            if held.id() != Some(id.as_str()) {
                return Ok(lock_response(StatusCode::CONFLICT, &held));
            }
        }
    }

    let states = state.states.clone();
    blocking(move || states.put(&reference, &document, &Map::new(), false)).await?;
    Ok(StatusCode::OK.into_response())
}

/// `DELETE`: remove every stored revision.
async fn delete_state(
    state: &BackendState,
    reference: Reference,
) -> std::result::Result<Response, ApiError> {
    let states = state.states.clone();
    blocking(move || states.delete(&reference)).await?;
    Ok(StatusCode::OK.into_response())
}

/// `LOCK`: take the lock unless somebody else holds it.
async fn lock_state(
    state: &BackendState,
    reference: Reference,
    body: Bytes,
) -> std::result::Result<Response, ApiError> {
    let requested = parse_lock(&body)?;

    if let Some(held) = current_lock(state, reference.clone()).await? {
        if held.id().is_some() && held.id() == requested.id() {
            return Ok(StatusCode::OK.into_response());
        }
        return Ok(lock_response(StatusCode::LOCKED, &held));
    }

    let locks = state.locks.clone();
    blocking(move || locks.put(&reference, &requested)).await?;
    Ok(StatusCode::OK.into_response())
}

/// `UNLOCK`: release the lock.  A body naming a different lock id is
/// refused; an empty body releases unconditionally.
async fn unlock_state(
    state: &BackendState,
    reference: Reference,
    body: Bytes,
) -> std::result::Result<Response, ApiError> {
    if !body.is_empty() {
        let requested = parse_lock(&body)?;
        if let Some(held) = current_lock(state, reference.clone()).await? {
            if let (Some(want), Some(have)) = (requested.id(), held.id()) {
                if want != have {
                    return Ok(lock_response(StatusCode::CONFLICT, &held));
                }
            }
        }
    }

    let locks = state.locks.clone();
    blocking(move || locks.delete(&reference)).await?;
    Ok(StatusCode::OK.into_response())
}

fn parse_lock(body: &[u8]) -> std::result::Result<LockRecord, ApiError> {
    let record = LockRecord::from_slice(body).map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;
    if !record.0.is_object() {
        return Err((
            StatusCode::BAD_REQUEST,
            "lock info is not a JSON object".into(),
        ));
    }
    Ok(record)
}

/// The held lock, or `None` when the item has no lock record.
async fn current_lock(
    state: &BackendState,
    reference: Reference,
) -> std::result::Result<Option<LockRecord>, ApiError> {
    let locks = state.locks.clone();
    blocking(move || match locks.get(&reference) {
        Ok(lock) => Ok(Some(lock)),
        Err(BwStateError::NotFound(_)) => Ok(None),
        Err(e) => Err(e),
    })
    .await
}
