//! Remote-write and remote-read handlers.
//!
//! Both endpoints speak the Prometheus remote-storage framing: a protobuf
//! payload compressed with raw Snappy, `Content-Type: application/x-protobuf`,
//! `Content-Encoding: snappy`. Malformed payloads are the client's fault and
//! map to 400; structural failures inside the adapter map to 500. Per-item
//! problems never surface here, so a partially-served request still returns
//! success.

use crate::api::AppState;
use crate::prompb::{self, METRIC_NAME_LABEL};
use crate::write::Sample;
use crate::Error;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use prost::Message;
use tracing::{error, warn};

/// Handle remote-write requests.
///
/// POST, snappy + protobuf `WriteRequest`; 204 on acceptance.
pub async fn handle_remote_write(State(state): State<AppState>, body: Bytes) -> Response {
    let decompressed = match snap::raw::Decoder::new().decompress_vec(&body) {
        Ok(data) => data,
        Err(e) => {
            warn!(error = %e, "write payload is not valid snappy");
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    let request = match prompb::WriteRequest::decode(decompressed.as_slice()) {
        Ok(request) => request,
        Err(e) => {
            warn!(error = %e, "write payload is not a valid WriteRequest");
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    match state.writer.write(flatten_write_request(request)).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => {
            if matches!(e, Error::PoolTimeout { .. }) {
                state.metrics.pool_timeouts_total.inc();
            }
            error!(error = %e, "write request failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Handle remote-read requests.
///
/// POST, snappy + protobuf `ReadRequest`; responds with a snappy-compressed
/// `ReadResponse`. An empty result is a well-formed frame, not an error.
pub async fn handle_remote_read(State(state): State<AppState>, body: Bytes) -> Response {
    let decompressed = match snap::raw::Decoder::new().decompress_vec(&body) {
        Ok(data) => data,
        Err(e) => {
            warn!(error = %e, "read payload is not valid snappy");
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    let request = match prompb::ReadRequest::decode(decompressed.as_slice()) {
        Ok(request) => request,
        Err(e) => {
            warn!(error = %e, "read payload is not a valid ReadRequest");
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    let timeseries = match state.reader.read(&request.queries).await {
        Ok(timeseries) => timeseries.unwrap_or_default(),
        Err(e @ Error::RangeTooLarge { .. }) => {
            warn!(error = %e, "read request rejected");
            return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
        }
        Err(e) => {
            if matches!(e, Error::PoolTimeout { .. }) {
                state.metrics.pool_timeouts_total.inc();
            }
            error!(error = %e, "read request failed");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let response = prompb::ReadResponse {
        results: vec![prompb::QueryResult { timeseries }],
    };
    let compressed = match snap::raw::Encoder::new().compress_vec(&response.encode_to_vec()) {
        Ok(compressed) => compressed,
        Err(e) => {
            error!(error = %e, "failed to compress read response");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    (
        [
            (header::CONTENT_TYPE, "application/x-protobuf"),
            (header::CONTENT_ENCODING, "snappy"),
        ],
        compressed,
    )
        .into_response()
}

/// Flatten a write request into per-sample records, pulling the reserved
/// metric-name label out of each series' label set.
fn flatten_write_request(request: prompb::WriteRequest) -> Vec<Sample> {
    let mut samples = Vec::new();
    for series in request.timeseries {
        let metric = series
            .labels
            .iter()
            .find(|label| label.name == METRIC_NAME_LABEL)
            .map(|label| label.value.clone())
            .unwrap_or_default();

        let labels: Vec<(String, String)> = series
            .labels
            .into_iter()
            .filter(|label| label.name != METRIC_NAME_LABEL)
            .map(|label| (label.name, label.value))
            .collect();

        for sample in series.samples {
            samples.push(Sample {
                metric: metric.clone(),
                labels: labels.clone(),
                value: sample.value,
                timestamp_ms: sample.timestamp,
            });
        }
    }
    samples
}
