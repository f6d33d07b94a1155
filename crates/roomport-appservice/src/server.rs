// SPDX-FileCopyrightText: 2026 Roomport Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Appservice webhook server built on axum.
//!
//! Routes the homeserver's transaction pushes (prefixed and legacy paths)
//! plus the appservice ping, all behind bearer auth against the homeserver
//! token. Bad or missing credentials answer 403 with no state mutated.

use axum::{
    Json, Router,
    extract::{Path, Request, State},
    http::StatusCode,
    middleware::{self as axum_middleware, Next},
    response::Response,
    routing::{post, put},
};
use roomport_core::RoomportError;
use roomport_matrix::types::Transaction;
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

use crate::dispatcher::{self, AppState};

/// Build the webhook router for the given state.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/_matrix/app/v1/transactions/{txn_id}",
            put(put_transaction),
        )
        .route("/transactions/{txn_id}", put(put_transaction))
        .route("/_matrix/app/v1/ping", post(post_ping))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until the process terminates.
pub async fn start_server(host: &str, port: u16, state: AppState) -> Result<(), RoomportError> {
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| RoomportError::Http {
            message: format!("failed to bind webhook server to {addr}: {e}"),
            source: Some(Box::new(e)),
        })?;

    tracing::info!("webhook server listening on {addr}");

    axum::serve(listener, router(state))
        .await
        .map_err(|e| RoomportError::Http {
            message: format!("webhook server error: {e}"),
            source: Some(Box::new(e)),
        })
}

/// Reject requests whose bearer credential does not match the homeserver
/// token. The appservice protocol mandates 403, not 401.
async fn auth_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, (StatusCode, Json<serde_json::Value>)> {
    let presented = request
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match presented {
        Some(token) if token == state.settings.hs_token => Ok(next.run(request).await),
        _ => {
            warn!("rejecting webhook request with bad credentials");
            Err((StatusCode::FORBIDDEN, Json(serde_json::json!({}))))
        }
    }
}

async fn put_transaction(
    State(state): State<AppState>,
    Path(txn_id): Path<String>,
    body: axum::body::Bytes,
) -> (StatusCode, Json<serde_json::Value>) {
    let txn: Transaction = match serde_json::from_slice(&body) {
        Ok(txn) => txn,
        Err(e) => {
            warn!(txn_id, error = %e, "undecodable transaction body");
            return (StatusCode::BAD_REQUEST, Json(serde_json::json!({})));
        }
    };

    match dispatcher::handle_transaction(&state, &txn_id, txn).await {
        Ok(()) => (StatusCode::OK, Json(serde_json::json!({}))),
        Err(e) => {
            // The transaction was not recorded; the homeserver will retry.
            error!(txn_id, error = %e, "transaction dispatch failed");
            (StatusCode::INTERNAL_SERVER_ERROR, Json(serde_json::json!({})))
        }
    }
}

async fn post_ping() -> (StatusCode, Json<serde_json::Value>) {
    (StatusCode::OK, Json(serde_json::json!({})))
}
