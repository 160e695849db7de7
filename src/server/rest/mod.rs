//! REST binding of the metric service.

pub mod handlers;
pub mod middleware;

use axum::{
    http::StatusCode,
    middleware::{from_fn, from_fn_with_state},
    response::{IntoResponse, Response},
    routing::{get, post, MethodRouter},
    Router,
};
use std::sync::Arc;
use thiserror::Error;
use tracing::error;

use super::origin::OriginGuard;
use super::service::{Service, ServiceError};
use crate::codec::{CodecError, Opener};
use crate::model::MetricError;

use handlers::{
    index_handler, ping_handler, update_json_handler, update_path_handler, updates_handler,
    value_handler, value_json_handler,
};
use middleware::{check_origin, compress_response, decompress_request, verify_signature};

/// State shared by all REST handlers.
pub struct RestState {
    pub service: Arc<Service>,
    pub opener: Arc<Opener>,
    pub origin: OriginGuard,
}

pub type SharedState = Arc<RestState>;

/// Handler errors and their status codes.
#[derive(Debug, Error)]
pub enum RestError {
    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("internal error")]
    Internal,
}

impl From<MetricError> for RestError {
    fn from(err: MetricError) -> Self {
        RestError::Service(ServiceError::Invalid(err))
    }
}

impl RestError {
    pub fn status(&self) -> StatusCode {
        match self {
            RestError::Service(ServiceError::Invalid(_)) | RestError::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            RestError::Service(ServiceError::NotFound(_)) => StatusCode::NOT_FOUND,
            RestError::Service(_) | RestError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            RestError::Codec(CodecError::BadSignature) => StatusCode::BAD_REQUEST,
            RestError::Codec(CodecError::TooLarge(_)) => StatusCode::PAYLOAD_TOO_LARGE,
            RestError::Codec(
                CodecError::Compression(_)
                | CodecError::Decryption(_)
                | CodecError::Serialization(_),
            ) => StatusCode::BAD_REQUEST,
            RestError::Codec(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for RestError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }
        (status, self.to_string()).into_response()
    }
}

/// Wraps a mutating route in the security chain. The last layer added runs
/// first: origin, then signature, then decompression.
fn guarded(route: MethodRouter<SharedState>, state: &SharedState) -> MethodRouter<SharedState> {
    route
        .layer(from_fn(decompress_request))
        .layer(from_fn_with_state(state.clone(), verify_signature))
        .layer(from_fn_with_state(state.clone(), check_origin))
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/ping", get(ping_handler))
        .route("/value/{kind}/{id}", get(value_handler))
        .route(
            "/value/",
            post(value_json_handler).layer(from_fn(decompress_request)),
        )
        .route(
            "/update/{kind}/{id}/{value}",
            guarded(post(update_path_handler), &state),
        )
        .route("/update/", guarded(post(update_json_handler), &state))
        .route("/updates/", guarded(post(updates_handler), &state))
        .layer(from_fn(compress_response))
        .with_state(state)
}
