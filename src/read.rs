//! Read path: label matchers to SELECT statements and back to series.
//!
//! Each query targets one metric table. A `count(*)` probe runs first so an
//! oversized result can be skipped before it is materialized; the full SELECT
//! is then folded row by row into a request-scoped series accumulator. The
//! last two result columns are fixed to `date` and `value`; everything before
//! them is the label set, and rows with identical label values merge into one
//! series.

use crate::api::metrics::Metrics;
use crate::engine::{format_timestamp, parse_timestamp, RowSet};
use crate::pool::ResourcePool;
use crate::prompb::{self, MatcherType, METRIC_NAME_LABEL};
use crate::schema::SchemaRegistry;
use crate::{Error, Result};

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, warn};

/// Separator for series-key segments. Label names are restricted to
/// `[a-zA-Z0-9_:]`, so the separator can never appear in a name; a collision
/// would additionally require label values aligned around it.
const SERIES_KEY_SEPARATOR: char = '\u{00ff}';

/// Configured ceilings for one reader.
#[derive(Debug, Clone, Copy)]
pub struct ReadLimits {
    /// Maximum `end - start` span per query, in milliseconds.
    pub max_window_ms: i64,
    /// Maximum rows a single query may return.
    pub max_rows: u64,
}

/// Read path over one pool of read resources.
pub struct Reader {
    pool: Arc<ResourcePool>,
    registry: Arc<SchemaRegistry>,
    limits: ReadLimits,
    metrics: Arc<Metrics>,
}

impl Reader {
    pub fn new(
        pool: Arc<ResourcePool>,
        registry: Arc<SchemaRegistry>,
        limits: ReadLimits,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            pool,
            registry,
            limits,
            metrics,
        }
    }

    /// Execute every query of a read request and fold the results into
    /// per-series sample sequences.
    ///
    /// Policy rejections (unknown metric, empty result, row ceiling,
    /// malformed matcher) skip the affected query and leave its siblings
    /// untouched. An over-window query and pool exhaustion fail the whole
    /// request. `Ok(None)` means nothing matched any query.
    pub async fn read(
        &self,
        queries: &[prompb::Query],
    ) -> Result<Option<Vec<prompb::TimeSeries>>> {
        let mut resource = self.pool.acquire().await?;
        let mut series: HashMap<String, prompb::TimeSeries> = HashMap::new();

        for query in queries {
            self.metrics.read_queries_total.inc();

            // An inverted range counts as over-window, never as a tiny one.
            let window_ms = query.end_timestamp_ms - query.start_timestamp_ms;
            if window_ms < 0 || window_ms > self.limits.max_window_ms {
                return Err(Error::RangeTooLarge {
                    window_ms,
                    max_ms: self.limits.max_window_ms,
                });
            }

            let (sql, count_sql, table) = match build_sql(query) {
                Ok(parts) => parts,
                Err(e) => {
                    warn!(error = %e, "skipping unsupported query");
                    self.metrics.read_queries_skipped_total.inc();
                    continue;
                }
            };

            if !self.registry.accepts(&table) || !self.registry.has_table(&table) {
                self.metrics.read_queries_skipped_total.inc();
                continue;
            }

            let count = match resource.connection().query(&count_sql) {
                Ok(rows) => parse_count(rows.as_ref()),
                Err(e) => {
                    error!(table = %table, error = %e, "count query failed, skipping");
                    self.metrics.read_queries_skipped_total.inc();
                    continue;
                }
            };
            if count == 0 {
                warn!(table = %table, "query matched no rows, skipping");
                self.metrics.read_queries_skipped_total.inc();
                continue;
            }
            if count > self.limits.max_rows {
                warn!(
                    table = %table,
                    count,
                    max = self.limits.max_rows,
                    "query exceeds row ceiling, skipping"
                );
                self.metrics.read_queries_skipped_total.inc();
                continue;
            }

            match resource.connection().query(&sql) {
                Ok(rows) => merge_rows(&mut series, &table, rows.as_ref()),
                Err(e) => {
                    error!(table = %table, error = %e, "select failed, skipping");
                    self.metrics.read_queries_skipped_total.inc();
                }
            }
        }
        drop(resource);

        if series.is_empty() {
            return Ok(None);
        }

        let mut timeseries: Vec<prompb::TimeSeries> = series.into_values().collect();
        for ts in &mut timeseries {
            ensure_sample_order(ts);
        }
        Ok(Some(timeseries))
    }
}

/// Translate one query's matchers into SELECT and count statements.
///
/// The metric-name matcher picks the target table and must be an equality
/// match; every other matcher becomes an ANDed `=` / `!=` predicate, followed
/// by the date range (a single equality when start == end).
fn build_sql(query: &prompb::Query) -> Result<(String, String, String)> {
    let mut table = String::new();
    let mut predicates = Vec::with_capacity(query.matchers.len() + 2);

    for matcher in &query.matchers {
        if matcher.name == METRIC_NAME_LABEL {
            match MatcherType::try_from(matcher.r#type) {
                Ok(MatcherType::Eq) => table = matcher.value.clone(),
                _ => {
                    return Err(Error::MalformedMatcher(
                        "only equality matchers are supported on the metric name".to_string(),
                    ));
                }
            }
            continue;
        }

        match MatcherType::try_from(matcher.r#type) {
            Ok(MatcherType::Eq) => {
                predicates.push(format!("{} = '{}'", matcher.name, matcher.value));
            }
            Ok(MatcherType::Neq) => {
                predicates.push(format!("{} != '{}'", matcher.name, matcher.value));
            }
            _ => {
                return Err(Error::MalformedMatcher(format!(
                    "unsupported matcher type {} on label {}",
                    matcher.r#type, matcher.name
                )));
            }
        }
    }

    if table.is_empty() {
        return Err(Error::MalformedMatcher(
            "no metric name matcher found".to_string(),
        ));
    }

    let start = format_timestamp(query.start_timestamp_ms)
        .ok_or_else(|| Error::Query("start timestamp is unrepresentable".to_string()))?;
    if query.start_timestamp_ms == query.end_timestamp_ms {
        predicates.push(format!("date = '{}'", start));
    } else {
        let end = format_timestamp(query.end_timestamp_ms)
            .ok_or_else(|| Error::Query("end timestamp is unrepresentable".to_string()))?;
        predicates.push(format!("date >= '{}'", start));
        predicates.push(format!("date <= '{}'", end));
    }

    let clause = predicates.join(" AND ");
    let sql = format!("SELECT * FROM \"{}\" WHERE {}", table, clause);
    let count_sql = format!("SELECT count(*) FROM \"{}\" WHERE {}", table, clause);
    Ok((sql, count_sql, table))
}

/// Read the single `count(*)` cell; an unparseable cell counts as zero.
fn parse_count(rows: &dyn RowSet) -> u64 {
    let text = rows.cell_as_text(0, 0);
    match text.parse::<u64>() {
        Ok(count) => count,
        Err(e) => {
            error!(cell = %text, error = %e, "count cell did not parse");
            0
        }
    }
}

/// Fold a result set into the series accumulator.
///
/// Rows whose date or value fails to parse are dropped silently.
fn merge_rows(
    series: &mut HashMap<String, prompb::TimeSeries>,
    table: &str,
    rows: &dyn RowSet,
) {
    let column_count = rows.column_count();
    if column_count < 2 {
        error!(
            table,
            column_count, "result must have at least the date and value columns"
        );
        return;
    }
    let label_columns = column_count - 2;

    let names: Vec<String> = (0..label_columns)
        .map(|col| rows.column_name(col).to_string())
        .collect();

    for row in 0..rows.row_count() {
        let values: Vec<String> = (0..label_columns)
            .map(|col| rows.cell_as_text(row, col))
            .collect();

        let key = series_key(table, &names, &values);
        let entry = series.entry(key).or_insert_with(|| prompb::TimeSeries {
            labels: label_pairs(table, &names, &values),
            samples: Vec::new(),
        });

        let Some(timestamp) = parse_timestamp(&rows.cell_as_text(row, label_columns)) else {
            continue;
        };
        let Ok(value) = rows.cell_as_text(row, label_columns + 1).parse::<f64>() else {
            continue;
        };
        entry.samples.push(prompb::Sample { value, timestamp });
    }
}

fn series_key(table: &str, names: &[String], values: &[String]) -> String {
    let mut key = String::from(table);
    for (name, value) in names.iter().zip(values) {
        key.push(SERIES_KEY_SEPARATOR);
        key.push_str(name);
        key.push(SERIES_KEY_SEPARATOR);
        key.push_str(value);
    }
    key
}

fn label_pairs(table: &str, names: &[String], values: &[String]) -> Vec<prompb::Label> {
    let mut pairs = Vec::with_capacity(names.len() + 1);
    pairs.push(prompb::Label {
        name: METRIC_NAME_LABEL.to_string(),
        value: table.to_string(),
    });
    for (name, value) in names.iter().zip(values) {
        pairs.push(prompb::Label {
            name: name.clone(),
            value: value.clone(),
        });
    }
    pairs
}

/// Emit samples in non-decreasing timestamp order: scan for an adjacent
/// inversion and stably sort only when one is found.
fn ensure_sample_order(ts: &mut prompb::TimeSeries) {
    let out_of_order = ts
        .samples
        .windows(2)
        .any(|pair| pair[0].timestamp > pair[1].timestamp);
    if out_of_order {
        warn!("series samples arrived out of order, sorting");
        ts.samples.sort_by_key(|sample| sample.timestamp);
    }
}
