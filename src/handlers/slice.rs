use super::AppState;
use crate::{
    Error, Result,
    slicing::{Slicer, parse_regions},
    types::{BAM_CONTENT_TYPE, SliceQuery, SliceRequest},
};
use axum::{
    Json,
    body::Body,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::Response,
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Compressed chunks buffered between the slicing thread and the response body.
const CHANNEL_CAPACITY: usize = 4;

pub async fn get_slice(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<SliceQuery>,
) -> Result<Response> {
    stream_slice(&state, &id, SliceRequest::from(query)).await
}

pub async fn post_slice(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<SliceRequest>,
) -> Result<Response> {
    stream_slice(&state, &id, body).await
}

async fn stream_slice(state: &AppState, id: &str, request: SliceRequest) -> Result<Response> {
    let (mut regions, unmapped_token) = parse_regions(&request.regions)?;
    let include_unmapped = request.unmapped || unmapped_token;

    // Convert gencode gene names to regions.
    for gene in &request.gencode {
        regions.extend(state.gencode.regions(gene)?);
    }

    info!(
        id,
        regions = regions.len(),
        include_unmapped,
        "slice request"
    );

    let bam = state.storage.bam_source(id).await?;
    let bai = state.storage.index_source(id, request.bai.as_deref()).await?;
    let slicer = Slicer::new(bam, bai).with_block_size(state.block_size);

    // Header and index are parsed before the response starts so that their
    // errors become proper error responses.
    let stream = tokio::task::spawn_blocking(move || slicer.slice(&regions, include_unmapped))
        .await
        .map_err(|e| Error::Internal(format!("slicing task failed: {}", e)))??;

    let (tx, rx) = mpsc::channel::<Result<Bytes>>(CHANNEL_CAPACITY);
    tokio::task::spawn_blocking(move || {
        for chunk in stream {
            if tx.blocking_send(chunk).is_err() {
                debug!("client disconnected, stopping slice");
                break;
            }
        }
    });

    let body = futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|chunk| (chunk, rx))
    });

    let mut response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, BAM_CONTENT_TYPE);

    if request.attachment {
        response = response.header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", attachment_name(id, Utc::now())),
        );
    }

    response
        .body(Body::from_stream(body))
        .map_err(|e| Error::Internal(format!("failed to build response: {}", e)))
}

/// `<name>.<timestamp>.sliced.bam`, where `name` is the last segment of `id`.
fn attachment_name(id: &str, now: DateTime<Utc>) -> String {
    let base = id.rsplit('/').next().unwrap_or(id);
    format!("{}.{}.sliced.bam", base, now.format("%Y%m%dT%H%M%S"))
}
