//! Write path: samples to per-metric INSERT statements.
//!
//! Inbound samples are filtered against the schema registry, turned into one
//! INSERT each, and executed sequentially through a single pool-acquired write
//! resource. Failures are isolated per item: a failed table creation drops
//! only that metric's samples, a rejected INSERT drops only that statement.
//!
//! Label values are interpolated directly into the SQL text, exactly as the
//! engine's table convention requires. This is a known injection and
//! correctness hazard (a label value containing a quote breaks the statement);
//! parameterized statements would change observable table behavior and are
//! deliberately not used here.

use crate::api::metrics::Metrics;
use crate::engine::format_timestamp;
use crate::pool::ResourcePool;
use crate::schema::{SchemaRegistry, QUERY_LABEL};
use crate::Result;

use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// One flattened sample from a remote-write request.
///
/// `labels` excludes the reserved metric-name label, which lives in `metric`.
#[derive(Debug, Clone)]
pub struct Sample {
    pub metric: String,
    pub labels: Vec<(String, String)>,
    pub value: f64,
    pub timestamp_ms: i64,
}

/// Write path over one pool of write resources.
pub struct Writer {
    pool: Arc<ResourcePool>,
    registry: Arc<SchemaRegistry>,
    metrics: Arc<Metrics>,
}

impl Writer {
    pub fn new(
        pool: Arc<ResourcePool>,
        registry: Arc<SchemaRegistry>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            pool,
            registry,
            metrics,
        }
    }

    /// Persist a batch of samples, best-effort per item.
    ///
    /// Returns an error only for structural failures (pool exhaustion);
    /// per-sample problems are logged and counted instead.
    pub async fn write(&self, samples: Vec<Sample>) -> Result<()> {
        let mut statements = Vec::with_capacity(samples.len());

        for mut sample in samples {
            if sample.metric.is_empty() {
                warn!("sample has an empty metric name, skipping");
                self.metrics.write_samples_dropped_total.inc();
                continue;
            }
            if !self.registry.accepts(&sample.metric) {
                self.metrics.write_samples_dropped_total.inc();
                continue;
            }

            if self.registry.clears_query_label(&sample.metric) {
                for (name, value) in &mut sample.labels {
                    if name == QUERY_LABEL {
                        value.clear();
                    }
                }
            }

            if !self.registry.has_table(&sample.metric) {
                let columns: Vec<String> =
                    sample.labels.iter().map(|(name, _)| name.clone()).collect();
                if let Err(e) = self
                    .registry
                    .ensure_table(&self.pool, &sample.metric, &columns)
                    .await
                {
                    error!(metric = %sample.metric, error = %e, "table creation failed, dropping sample");
                    self.metrics.write_samples_dropped_total.inc();
                    continue;
                }
            }

            match insert_sql(&sample) {
                Some(sql) => statements.push(sql),
                None => {
                    warn!(
                        metric = %sample.metric,
                        timestamp_ms = sample.timestamp_ms,
                        "sample timestamp is unrepresentable, skipping"
                    );
                    self.metrics.write_samples_dropped_total.inc();
                }
            }
        }

        if statements.is_empty() {
            debug!("write batch contained no persistable samples");
            return Ok(());
        }

        let mut resource = self.pool.acquire().await?;
        let mut failed = 0u64;
        for sql in &statements {
            if let Err(e) = resource.connection().execute(sql) {
                failed += 1;
                error!(error = %e, "insert statement failed");
            }
        }
        drop(resource);

        let inserted = statements.len() as u64 - failed;
        self.metrics.write_samples_total.inc_by(inserted);
        self.metrics.write_statement_failures_total.inc_by(failed);
        info!(inserted, failed, "write batch complete");
        Ok(())
    }
}

/// Build the INSERT for one sample.
///
/// NaN and infinite values are stored quoted as text: the column is typed
/// float but the engine accepts a string literal for these sentinels, and a
/// bare `NaN` would be rejected as a numeric literal.
fn insert_sql(sample: &Sample) -> Option<String> {
    let timestamp = format_timestamp(sample.timestamp_ms)?;

    let mut columns: Vec<&str> = Vec::with_capacity(sample.labels.len() + 2);
    let mut values: Vec<String> = Vec::with_capacity(sample.labels.len() + 2);
    for (name, value) in &sample.labels {
        columns.push(name);
        values.push(format!("'{}'", value));
    }

    columns.push("date");
    values.push(format!("'{}'", timestamp));
    columns.push("value");
    if sample.value.is_finite() {
        values.push(sample.value.to_string());
    } else {
        values.push(format!("'{}'", sample.value));
    }

    Some(format!(
        "insert into \"{}\"({}) values ({});",
        sample.metric,
        columns.join(","),
        values.join(",")
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(value: f64) -> Sample {
        Sample {
            metric: "cpu_seconds_total".to_string(),
            labels: vec![
                ("host".to_string(), "h1".to_string()),
                ("mode".to_string(), "user".to_string()),
            ],
            value,
            timestamp_ms: 1_700_000_000_000,
        }
    }

    #[test]
    fn finite_values_are_bare_literals() {
        let sql = insert_sql(&sample(0.5)).unwrap();
        assert!(sql.starts_with("insert into \"cpu_seconds_total\"(host,mode,date,value)"));
        assert!(sql.ends_with(",0.5);"));
    }

    #[test]
    fn nan_and_infinity_are_quoted_sentinels() {
        let nan = insert_sql(&sample(f64::NAN)).unwrap();
        assert!(nan.ends_with(",'NaN');"), "got: {}", nan);

        let inf = insert_sql(&sample(f64::INFINITY)).unwrap();
        assert!(inf.ends_with(",'inf');"), "got: {}", inf);

        let neg = insert_sql(&sample(f64::NEG_INFINITY)).unwrap();
        assert!(neg.ends_with(",'-inf');"), "got: {}", neg);
    }
}
