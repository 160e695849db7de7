//! REST endpoint handlers.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse},
    Json,
};
use serde::Deserialize;
use tracing::{debug, instrument};

use super::{RestError, SharedState};
use crate::model::{Metric, MetricKind, MetricRecord, MetricUpdate, MetricValue};

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

/// Body of `POST /value/`.
#[derive(Debug, Deserialize)]
pub struct ValueQuery {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: MetricKind,
}

fn parse_json<T: serde::de::DeserializeOwned>(body: &[u8]) -> Result<T, RestError> {
    serde_json::from_slice(body).map_err(|e| RestError::BadRequest(e.to_string()))
}

#[instrument(skip(state))]
pub async fn index_handler(State(state): State<SharedState>) -> Result<Html<String>, RestError> {
    Ok(Html(state.service.render_all().await?))
}

#[instrument(skip(state))]
pub async fn ping_handler(State(state): State<SharedState>) -> Result<&'static str, RestError> {
    state.service.ping().await?;
    Ok("OK")
}

#[instrument(skip_all)]
pub async fn value_handler(
    State(state): State<SharedState>,
    Path((kind, id)): Path<(String, String)>,
) -> Result<impl IntoResponse, RestError> {
    let kind: MetricKind = kind.parse()?;
    let metric = state.service.get_one(&id, kind).await?;
    let text = match kind {
        MetricKind::Gauge => metric.value.map(|v| v.to_string()),
        MetricKind::Counter => metric.delta.map(|d| d.to_string()),
    }
    .unwrap_or_default();
    Ok(([(header::CONTENT_TYPE, TEXT_PLAIN)], text))
}

#[instrument(skip_all)]
pub async fn update_path_handler(
    State(state): State<SharedState>,
    Path((kind, id, raw)): Path<(String, String, String)>,
) -> Result<impl IntoResponse, RestError> {
    let kind: MetricKind = kind.parse()?;
    let update = MetricUpdate::new(id, MetricValue::parse(kind, &raw)?)?;
    state.service.update_one(update).await?;
    Ok(([(header::CONTENT_TYPE, TEXT_PLAIN)], raw))
}

#[instrument(skip_all)]
pub async fn value_json_handler(
    State(state): State<SharedState>,
    body: Bytes,
) -> Result<Json<Metric>, RestError> {
    let query: ValueQuery = parse_json(&body)?;
    Ok(Json(state.service.get_one(&query.id, query.kind).await?))
}

#[instrument(skip_all)]
pub async fn update_json_handler(
    State(state): State<SharedState>,
    body: Bytes,
) -> Result<Json<Metric>, RestError> {
    let metric: Metric = parse_json(&body)?;
    let kind = metric.kind;
    let record = state.service.update_one(MetricUpdate::try_from(metric)?).await?;
    Metric::from_record(&record, kind)
        .map(Json)
        .ok_or(RestError::Internal)
}

/// Batch endpoint used by agents: body is already verified and inflated,
/// and may still be RSA-sealed.
#[instrument(skip_all, fields(bytes = body.len()))]
pub async fn updates_handler(
    State(state): State<SharedState>,
    body: Bytes,
) -> Result<(StatusCode, Json<Vec<Metric>>), RestError> {
    let plain = state.opener.decrypt(body.to_vec())?;
    let batch: Vec<Metric> = parse_json(&plain)?;
    debug!("Received batch of {} metrics", batch.len());

    let records = state.service.update_batch(batch).await?;
    let metrics = records.iter().flat_map(MetricRecord::to_metrics).collect();
    Ok((StatusCode::OK, Json(metrics)))
}
