//! Shared fixtures for the integration tests
#![allow(dead_code)]

use tsrelay::api::metrics::Metrics;
use tsrelay::config::TableConfig;
use tsrelay::engine::MemoryEngine;
use tsrelay::pool::{OperationClass, ResourcePool};
use tsrelay::prompb;
use tsrelay::read::{ReadLimits, Reader};
use tsrelay::schema::SchemaRegistry;
use tsrelay::write::{Sample, Writer};

use prost::Message;
use std::sync::Arc;
use std::time::Duration;

/// A fully wired adapter stack over the in-memory engine.
pub struct Harness {
    pub engine: MemoryEngine,
    pub write_pool: Arc<ResourcePool>,
    pub read_pool: Arc<ResourcePool>,
    pub registry: Arc<SchemaRegistry>,
    pub metrics: Arc<Metrics>,
    pub writer: Arc<Writer>,
    pub reader: Arc<Reader>,
}

/// Build a stack accepting the given metric names, with default ceilings.
pub async fn harness(accepted: &[&str]) -> Harness {
    let table = TableConfig {
        name: accepted.iter().map(|s| s.to_string()).collect(),
        ..TableConfig::default()
    };
    let limits = ReadLimits {
        max_window_ms: table.max_window_ms(),
        max_rows: table.max_count,
    };
    harness_with(table, limits).await
}

/// Build a stack from an explicit table configuration and read ceilings.
pub async fn harness_with(table: TableConfig, limits: ReadLimits) -> Harness {
    let engine = MemoryEngine::new();
    let write_pool = ResourcePool::new(
        &engine,
        OperationClass::Write,
        2,
        Duration::from_secs(5),
    )
    .expect("write pool");
    let read_pool = ResourcePool::new(
        &engine,
        OperationClass::Read,
        2,
        Duration::from_secs(5),
    )
    .expect("read pool");

    let registry = Arc::new(SchemaRegistry::new(&table));
    registry.bootstrap(&write_pool).await.expect("bootstrap");

    let metrics = Arc::new(Metrics::new());
    let writer = Arc::new(Writer::new(
        write_pool.clone(),
        registry.clone(),
        metrics.clone(),
    ));
    let reader = Arc::new(Reader::new(
        read_pool.clone(),
        registry.clone(),
        limits,
        metrics.clone(),
    ));

    Harness {
        engine,
        write_pool,
        read_pool,
        registry,
        metrics,
        writer,
        reader,
    }
}

/// A representable reference instant used as the base timestamp in tests.
pub const BASE_TS_MS: i64 = 1_700_000_000_000;

/// Helper: one flattened sample with a single `host` label
pub fn sample(metric: &str, host: &str, value: f64, timestamp_ms: i64) -> Sample {
    Sample {
        metric: metric.to_string(),
        labels: vec![("host".to_string(), host.to_string())],
        value,
        timestamp_ms,
    }
}

/// Helper: equality matcher
pub fn eq_matcher(name: &str, value: &str) -> prompb::LabelMatcher {
    prompb::LabelMatcher {
        r#type: prompb::MatcherType::Eq as i32,
        name: name.to_string(),
        value: value.to_string(),
    }
}

/// Helper: one read query over `[start, end]` for the given matchers
pub fn read_query(start: i64, end: i64, matchers: Vec<prompb::LabelMatcher>) -> prompb::Query {
    prompb::Query {
        start_timestamp_ms: start,
        end_timestamp_ms: end,
        matchers,
    }
}

/// Label value for `name` in a returned series, if present.
pub fn label_value(series: &prompb::TimeSeries, name: &str) -> Option<String> {
    series
        .labels
        .iter()
        .find(|label| label.name == name)
        .map(|label| label.value.clone())
}

/// Snappy-compressed protobuf encoding of a write request.
pub fn encode_write_request(request: &prompb::WriteRequest) -> Vec<u8> {
    snap::raw::Encoder::new()
        .compress_vec(&request.encode_to_vec())
        .expect("snappy compress")
}

/// Snappy-compressed protobuf encoding of a read request.
pub fn encode_read_request(request: &prompb::ReadRequest) -> Vec<u8> {
    snap::raw::Encoder::new()
        .compress_vec(&request.encode_to_vec())
        .expect("snappy compress")
}

/// Decode a snappy-compressed read response body.
pub fn decode_read_response(body: &[u8]) -> prompb::ReadResponse {
    let decompressed = snap::raw::Decoder::new()
        .decompress_vec(body)
        .expect("snappy decompress");
    prompb::ReadResponse::decode(decompressed.as_slice()).expect("protobuf decode")
}

/// A one-series write request carrying the given samples.
pub fn write_request_for(
    metric: &str,
    labels: &[(&str, &str)],
    samples: &[(f64, i64)],
) -> prompb::WriteRequest {
    let mut series_labels = vec![prompb::Label {
        name: prompb::METRIC_NAME_LABEL.to_string(),
        value: metric.to_string(),
    }];
    for (name, value) in labels {
        series_labels.push(prompb::Label {
            name: name.to_string(),
            value: value.to_string(),
        });
    }
    prompb::WriteRequest {
        timeseries: vec![prompb::TimeSeries {
            labels: series_labels,
            samples: samples
                .iter()
                .map(|&(value, timestamp)| prompb::Sample { value, timestamp })
                .collect(),
        }],
    }
}
