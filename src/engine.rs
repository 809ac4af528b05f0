//! Embedded storage engine contract.
//!
//! The adapter never talks to a database driver directly; everything goes
//! through the object-safe traits here, which mirror the embedded engine's
//! open/connect/query/result surface. Production deployments plug in the FFI
//! binding for the real engine; development mode and the integration tests use
//! [`MemoryEngine`], which understands exactly the SQL shapes this adapter
//! emits.

use crate::{Error, Result};

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Timestamp text format used in every statement sent to the engine.
///
/// Matches the engine's canonical `timestamp` rendering: local time with
/// microsecond precision. The fixed width keeps date strings lexicographically
/// ordered, which the in-memory engine relies on for range predicates.
pub const ENGINE_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Introspection query returning the names of all range-partitioned tables.
pub const PARTITIONED_TABLES_SQL: &str =
    "select NAME from 'SYS_TABLES' where PARTITIONED = 1;";

/// Render a millisecond epoch timestamp in the engine's text format.
///
/// Returns `None` for timestamps outside chrono's representable range.
pub fn format_timestamp(timestamp_ms: i64) -> Option<String> {
    use chrono::{Local, TimeZone};
    Local
        .timestamp_millis_opt(timestamp_ms)
        .single()
        .map(|dt| dt.format(ENGINE_TIMESTAMP_FORMAT).to_string())
}

/// Parse a timestamp in the engine's text format back to millisecond epoch.
pub fn parse_timestamp(text: &str) -> Option<i64> {
    use chrono::{Local, NaiveDateTime, TimeZone};
    let naive = NaiveDateTime::parse_from_str(text, ENGINE_TIMESTAMP_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S"))
        .ok()?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.timestamp_millis())
}

/// A query result in row/column form.
pub trait RowSet: Send {
    fn row_count(&self) -> usize;
    fn column_count(&self) -> usize;
    fn column_name(&self, col: usize) -> &str;
    /// Cell rendered as text. Out-of-range coordinates yield an empty string.
    fn cell_as_text(&self, row: usize, col: usize) -> String;
}

/// One exclusive engine connection. Not thread-safe; exactly one caller may
/// hold a connection at a time, which the resource pool enforces.
pub trait EngineConnection: Send {
    fn query(&mut self, sql: &str) -> Result<Box<dyn RowSet>>;

    /// Run a statement whose result rows are irrelevant.
    fn execute(&mut self, sql: &str) -> Result<()> {
        self.query(sql).map(|_| ())
    }
}

/// An opened engine handle from which connections are created.
pub trait StorageEngine: Send + Sync {
    fn connect(&self) -> Result<Box<dyn EngineConnection>>;
}

// ---------------------------------------------------------------------------
// In-memory engine (development mode and tests)
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MemTable {
    /// Column names in declaration order; the trailing two are always
    /// `date` and `value`.
    columns: Vec<String>,
    partitioned: bool,
    rows: Vec<HashMap<String, String>>,
}

#[derive(Default)]
struct MemState {
    tables: HashMap<String, MemTable>,
}

/// In-memory implementation of the engine contract.
///
/// Supports the statement shapes the adapter generates: partitioned
/// `CREATE TABLE`, single-row `INSERT`, `SELECT count(*)`, `SELECT *` with
/// `=` / `!=` / `>=` / `<=` predicates, and the partitioned-table
/// introspection query. Anything else is rejected.
#[derive(Clone, Default)]
pub struct MemoryEngine {
    state: Arc<Mutex<MemState>>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tables currently provisioned. Test hook.
    pub fn table_count(&self) -> usize {
        self.state.lock().tables.len()
    }
}

impl StorageEngine for MemoryEngine {
    fn connect(&self) -> Result<Box<dyn EngineConnection>> {
        Ok(Box::new(MemoryConnection {
            state: self.state.clone(),
        }))
    }
}

struct MemoryConnection {
    state: Arc<Mutex<MemState>>,
}

impl EngineConnection for MemoryConnection {
    fn query(&mut self, sql: &str) -> Result<Box<dyn RowSet>> {
        let sql = sql.trim().trim_end_matches(';').trim();
        let lower = sql.to_ascii_lowercase();

        if lower.starts_with("create table") {
            return self.create_table(sql);
        }
        if lower.starts_with("insert into") {
            return self.insert(sql);
        }
        if lower.starts_with("select name from 'sys_tables'") {
            return self.partitioned_tables();
        }
        if lower.starts_with("select count(*) from") {
            return self.select(sql, true);
        }
        if lower.starts_with("select * from") {
            return self.select(sql, false);
        }

        Err(Error::Query(format!("unsupported statement: {}", sql)))
    }
}

impl MemoryConnection {
    fn create_table(&self, sql: &str) -> Result<Box<dyn RowSet>> {
        let name = quoted_identifier(sql)?;
        let open = sql
            .find('(')
            .ok_or_else(|| Error::Query("CREATE TABLE without column list".to_string()))?;
        let close = sql[open..]
            .find(')')
            .map(|i| open + i)
            .ok_or_else(|| Error::Query("unterminated column list".to_string()))?;

        let columns: Vec<String> = sql[open + 1..close]
            .split(',')
            .filter_map(|decl| decl.split_whitespace().next())
            .map(|c| c.to_string())
            .collect();
        if columns.is_empty() {
            return Err(Error::Query("CREATE TABLE with no columns".to_string()));
        }

        let partitioned = sql.to_ascii_lowercase().contains("partition by range");

        let mut state = self.state.lock();
        if state.tables.contains_key(&name) {
            return Err(Error::Query(format!("table {} already exists", name)));
        }
        state.tables.insert(
            name,
            MemTable {
                columns,
                partitioned,
                rows: Vec::new(),
            },
        );
        Ok(empty_rows())
    }

    fn insert(&self, sql: &str) -> Result<Box<dyn RowSet>> {
        let name = quoted_identifier(sql)?;

        let cols_open = sql
            .find("\"(")
            .map(|i| i + 1)
            .ok_or_else(|| Error::Query("INSERT without column list".to_string()))?;
        let cols_close = sql[cols_open..]
            .find(')')
            .map(|i| cols_open + i)
            .ok_or_else(|| Error::Query("unterminated column list".to_string()))?;
        let columns: Vec<&str> = sql[cols_open + 1..cols_close]
            .split(',')
            .map(|c| c.trim())
            .collect();

        let lower = sql.to_ascii_lowercase();
        let values_kw = lower
            .find("values")
            .ok_or_else(|| Error::Query("INSERT without VALUES".to_string()))?;
        let vals_open = sql[values_kw..]
            .find('(')
            .map(|i| values_kw + i)
            .ok_or_else(|| Error::Query("INSERT without value list".to_string()))?;
        let vals_close = sql
            .rfind(')')
            .ok_or_else(|| Error::Query("unterminated value list".to_string()))?;
        let values = split_quoted_list(&sql[vals_open + 1..vals_close]);

        if columns.len() != values.len() {
            return Err(Error::Query(format!(
                "column/value arity mismatch: {} vs {}",
                columns.len(),
                values.len()
            )));
        }

        let mut state = self.state.lock();
        let table = state
            .tables
            .get_mut(&name)
            .ok_or_else(|| Error::Query(format!("table {} does not exist", name)))?;

        let mut row = HashMap::with_capacity(columns.len());
        for (col, val) in columns.iter().zip(values) {
            if !table.columns.iter().any(|c| c == col) {
                return Err(Error::Query(format!(
                    "column {} does not exist in table {}",
                    col, name
                )));
            }
            row.insert(col.to_string(), unquote(&val));
        }
        table.rows.push(row);
        Ok(empty_rows())
    }

    fn partitioned_tables(&self) -> Result<Box<dyn RowSet>> {
        let state = self.state.lock();
        let mut names: Vec<Vec<String>> = state
            .tables
            .iter()
            .filter(|(_, t)| t.partitioned)
            .map(|(name, _)| vec![name.clone()])
            .collect();
        names.sort();
        Ok(Box::new(MemRows {
            columns: vec!["NAME".to_string()],
            rows: names,
        }))
    }

    fn select(&self, sql: &str, count_only: bool) -> Result<Box<dyn RowSet>> {
        let name = quoted_identifier(sql)?;
        let lower = sql.to_ascii_lowercase();
        let predicates = match lower.find(" where ") {
            Some(idx) => parse_predicates(&sql[idx + " where ".len()..])?,
            None => Vec::new(),
        };

        let state = self.state.lock();
        let table = state
            .tables
            .get(&name)
            .ok_or_else(|| Error::Query(format!("table {} does not exist", name)))?;

        let matching: Vec<&HashMap<String, String>> = table
            .rows
            .iter()
            .filter(|row| predicates.iter().all(|p| p.matches(row)))
            .collect();

        if count_only {
            return Ok(Box::new(MemRows {
                columns: vec!["count(*)".to_string()],
                rows: vec![vec![matching.len().to_string()]],
            }));
        }

        let rows = matching
            .iter()
            .map(|row| {
                table
                    .columns
                    .iter()
                    .map(|col| row.get(col).cloned().unwrap_or_default())
                    .collect()
            })
            .collect();
        Ok(Box::new(MemRows {
            columns: table.columns.clone(),
            rows,
        }))
    }
}

enum PredicateOp {
    Eq,
    Neq,
    Gte,
    Lte,
}

struct Predicate {
    column: String,
    op: PredicateOp,
    value: String,
}

impl Predicate {
    fn matches(&self, row: &HashMap<String, String>) -> bool {
        let cell = row.get(&self.column).map(String::as_str).unwrap_or("");
        match self.op {
            PredicateOp::Eq => cell == self.value,
            PredicateOp::Neq => cell != self.value,
            PredicateOp::Gte => cell >= self.value.as_str(),
            PredicateOp::Lte => cell <= self.value.as_str(),
        }
    }
}

fn parse_predicates(clause: &str) -> Result<Vec<Predicate>> {
    clause
        .split(" AND ")
        .map(|pred| {
            let pred = pred.trim();
            for (token, op) in [
                (">=", PredicateOp::Gte),
                ("<=", PredicateOp::Lte),
                ("!=", PredicateOp::Neq),
                ("=", PredicateOp::Eq),
            ] {
                if let Some(idx) = pred.find(token) {
                    let column = pred[..idx].trim().to_string();
                    let value = unquote(pred[idx + token.len()..].trim());
                    return Ok(Predicate { column, op, value });
                }
            }
            Err(Error::Query(format!("unsupported predicate: {}", pred)))
        })
        .collect()
}

/// First double-quoted identifier in a statement.
fn quoted_identifier(sql: &str) -> Result<String> {
    let start = sql
        .find('"')
        .ok_or_else(|| Error::Query("missing quoted table name".to_string()))?;
    let end = sql[start + 1..]
        .find('"')
        .map(|i| start + 1 + i)
        .ok_or_else(|| Error::Query("unterminated table name".to_string()))?;
    Ok(sql[start + 1..end].to_string())
}

/// Split a comma-separated value list, honoring single-quoted strings.
fn split_quoted_list(raw: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut in_quote = false;
    for ch in raw.chars() {
        match ch {
            '\'' => {
                in_quote = !in_quote;
                current.push(ch);
            }
            ',' if !in_quote => {
                parts.push(current.trim().to_string());
                current = String::new();
            }
            _ => current.push(ch),
        }
    }
    if !current.trim().is_empty() {
        parts.push(current.trim().to_string());
    }
    parts
}

fn unquote(raw: &str) -> String {
    let raw = raw.trim();
    if raw.len() >= 2 && raw.starts_with('\'') && raw.ends_with('\'') {
        raw[1..raw.len() - 1].to_string()
    } else {
        raw.to_string()
    }
}

fn empty_rows() -> Box<dyn RowSet> {
    Box::new(MemRows {
        columns: Vec::new(),
        rows: Vec::new(),
    })
}

struct MemRows {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl RowSet for MemRows {
    fn row_count(&self) -> usize {
        self.rows.len()
    }

    fn column_count(&self) -> usize {
        self.columns.len()
    }

    fn column_name(&self, col: usize) -> &str {
        self.columns.get(col).map(String::as_str).unwrap_or("")
    }

    fn cell_as_text(&self, row: usize, col: usize) -> String {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .cloned()
            .unwrap_or_default()
    }
}
