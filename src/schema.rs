//! Schema registry: accepted metrics and provisioned tables.
//!
//! The registry is an explicitly-owned object injected into the write and
//! read paths. It tracks three sets: metric names the adapter will persist,
//! the subset whose high-cardinality `query` label is blanked before storage,
//! and the tables confirmed to exist in the engine. The table set is seeded at
//! startup by introspecting the engine's partitioned tables and only grows
//! through the deduplicated creation path below.

use crate::config::TableConfig;
use crate::engine::PARTITIONED_TABLES_SQL;
use crate::pool::ResourcePool;
use crate::singleflight::SingleFlight;
use crate::{Error, Result};

use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

/// Label blanked before persistence for configured metrics.
pub const QUERY_LABEL: &str = "query";

pub struct SchemaRegistry {
    /// Tables confirmed to exist in the engine.
    tables: RwLock<HashSet<String>>,
    /// Metric names this adapter persists.
    scrape_names: HashSet<String>,
    /// Metrics whose `query` label is cleared to bound cardinality.
    scrape_names_with_query: HashSet<String>,
    interval: String,
    retention: String,
    creation: SingleFlight,
}

impl SchemaRegistry {
    pub fn new(config: &TableConfig) -> Self {
        let mut scrape_names: HashSet<String> = config.name.iter().cloned().collect();
        let scrape_names_with_query: HashSet<String> =
            config.name_with_query.iter().cloned().collect();
        // Metrics configured with query-label clearing are accepted too.
        scrape_names.extend(scrape_names_with_query.iter().cloned());

        Self {
            tables: RwLock::new(HashSet::new()),
            scrape_names,
            scrape_names_with_query,
            interval: config.interval.clone(),
            retention: config.retention.clone(),
            creation: SingleFlight::new(),
        }
    }

    /// Seed the known-table set from the engine's partitioned tables.
    pub async fn bootstrap(&self, pool: &Arc<ResourcePool>) -> Result<()> {
        let mut resource = pool.acquire().await?;
        let rows = resource.connection().query(PARTITIONED_TABLES_SQL)?;

        let mut tables = self.tables.write();
        for row in 0..rows.row_count() {
            tables.insert(rows.cell_as_text(row, 0));
        }
        info!(
            tables = tables.len(),
            accepted_metrics = self.scrape_names.len(),
            query_label_metrics = self.scrape_names_with_query.len(),
            "schema registry bootstrapped"
        );
        Ok(())
    }

    /// Whether this adapter persists the given metric at all.
    pub fn accepts(&self, metric: &str) -> bool {
        self.scrape_names.contains(metric)
    }

    /// Whether the metric's `query` label must be blanked before storage.
    pub fn clears_query_label(&self, metric: &str) -> bool {
        self.scrape_names_with_query.contains(metric)
    }

    pub fn has_table(&self, name: &str) -> bool {
        self.tables.read().contains(name)
    }

    /// Make sure the metric's backing table exists, creating it if needed.
    ///
    /// Concurrent callers for the same unseen metric coalesce onto a single
    /// `CREATE TABLE` attempt and all observe its outcome. The schema takes
    /// one text column per label in `label_columns` plus the fixed trailing
    /// `date timestamp, value float64` pair, range-partitioned on `date`.
    pub async fn ensure_table(
        &self,
        pool: &Arc<ResourcePool>,
        metric: &str,
        label_columns: &[String],
    ) -> Result<()> {
        if self.has_table(metric) {
            return Ok(());
        }

        let outcome = self
            .creation
            .run(metric, || async {
                // A racing creator may have finished while we queued for the
                // flight; skip the statement rather than collide with it.
                if self.has_table(metric) {
                    return Ok(());
                }

                let sql = self.create_table_sql(metric, label_columns);
                info!(table = metric, sql = %sql, "creating metric table");

                let mut resource = pool.acquire().await.map_err(|e| e.to_string())?;
                resource
                    .connection()
                    .execute(&sql)
                    .map_err(|e| e.to_string())?;

                self.tables.write().insert(metric.to_string());
                Ok(())
            })
            .await;

        outcome.map_err(|message| {
            debug!(table = metric, error = %message, "table creation failed");
            Error::TableCreation {
                table: metric.to_string(),
                message,
            }
        })
    }

    fn create_table_sql(&self, metric: &str, label_columns: &[String]) -> String {
        let mut sql = format!("CREATE TABLE \"{}\" (", metric);
        for column in label_columns {
            sql.push_str(column);
            sql.push_str(" string, ");
        }
        sql.push_str("date timestamp, value float64) PARTITION BY RANGE(date) ");
        sql.push_str(&format!(
            "timescale interval '{}' retention '{}' autopart;",
            self.interval, self.retention
        ));
        sql
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TableConfig;

    fn registry_with(names: &[&str], with_query: &[&str]) -> SchemaRegistry {
        let config = TableConfig {
            name: names.iter().map(|s| s.to_string()).collect(),
            name_with_query: with_query.iter().map(|s| s.to_string()).collect(),
            ..TableConfig::default()
        };
        SchemaRegistry::new(&config)
    }

    #[test]
    fn query_label_metrics_are_also_accepted() {
        let registry = registry_with(&["cpu"], &["http_requests"]);
        assert!(registry.accepts("cpu"));
        assert!(registry.accepts("http_requests"));
        assert!(!registry.accepts("unknown"));
        assert!(registry.clears_query_label("http_requests"));
        assert!(!registry.clears_query_label("cpu"));
    }

    #[test]
    fn create_table_sql_has_fixed_trailing_columns() {
        let registry = registry_with(&["cpu"], &[]);
        let sql = registry.create_table_sql(
            "cpu",
            &["host".to_string(), "mode".to_string()],
        );
        assert_eq!(
            sql,
            "CREATE TABLE \"cpu\" (host string, mode string, date timestamp, \
             value float64) PARTITION BY RANGE(date) timescale interval '1d' \
             retention '7d' autopart;"
        );
    }
}
