//! DuckDB storage for the worklist and metrics tables.

use std::path::Path;

use arrow::array::{Array, LargeStringArray, StringArray};
use arrow::datatypes::DataType;
use arrow::record_batch::RecordBatch;
use duckdb::Connection;
use duckdb::types::Value;
use pagepulse_core::schema::{
    WORKLIST_MARCA, WORKLIST_STRATEGY, WORKLIST_TIPO, WORKLIST_URL, metrics_record_schema,
    worklist_schema,
};
use pagepulse_core::{CoreError, FlatMetricsRecord, Scalar, WorklistEntry};
use tracing::{info, warn};

use crate::StoreError;

/// How [`DuckStore::write_records`] treats existing rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Add rows after the existing ones; the header is left alone.
    Append,
    /// Recreate the table (header included), then write.
    Overwrite,
}

/// A worklist row that could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedRow {
    /// 1-based data row number (header excluded).
    pub row: usize,
    pub error: CoreError,
}

/// Parsed worklist rows plus the rows that were skipped.
#[derive(Debug, Default)]
pub struct Worklist {
    pub entries: Vec<WorklistEntry>,
    pub rejected: Vec<RejectedRow>,
}

/// DuckDB store holding the worklist (`Tipo`, `URL`, `Marca`, `Strategy`)
/// and the flat metrics table.
///
/// Supports both in-memory (ephemeral) and persistent (file-backed) modes.
pub struct DuckStore {
    conn: Connection,
}

impl DuckStore {
    /// Open an in-memory DuckDB database.
    pub fn open() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Ok(Self { conn })
    }

    /// Open or create a persistent DuckDB database at the given path.
    pub fn open_persistent(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Ok(Self { conn })
    }

    // ── Worklist ──

    /// Import a CSV or Parquet worklist file into `table`, replacing it.
    ///
    /// CSV cells are read as text. The file must carry the `Tipo`, `URL`,
    /// `Marca` and `Strategy` columns; otherwise the existing table is kept.
    pub fn load_worklist(&self, path: &Path, table: &str) -> Result<usize, StoreError> {
        if !path.exists() {
            return Err(StoreError::SourceNotFound(path.to_path_buf()));
        }
        let source = match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("csv") => format!(
                "read_csv_auto({}, header = true, all_varchar = true)",
                quote_literal(&path.display().to_string())
            ),
            Some(ext) if ext.eq_ignore_ascii_case("parquet") => {
                format!("read_parquet({})", quote_literal(&path.display().to_string()))
            }
            _ => return Err(StoreError::UnsupportedFormat(path.to_path_buf())),
        };
        let sql = format!(
            "CREATE OR REPLACE TABLE {} AS SELECT * FROM {source}",
            quote_ident(table)
        );
        let required = worklist_schema();

        self.in_transaction(|| {
            self.conn.execute_batch(&sql)?;
            let columns = self.table_columns(table)?;
            for field in required.fields() {
                if !columns.iter().any(|c| c == field.name()) {
                    return Err(StoreError::Schema {
                        table: table.to_string(),
                        detail: format!("missing column {:?} (found {columns:?})", field.name()),
                    });
                }
            }
            Ok(())
        })?;

        let count = self.count_rows(table)?;
        info!(table, count, path = %path.display(), "loaded worklist");
        Ok(count)
    }

    /// Read every row of a worklist table.
    ///
    /// Rows with an unknown `Tipo`/`Strategy` or a blank `URL` are collected
    /// in [`Worklist::rejected`] rather than failing the whole read.
    pub fn read_worklist(&self, table: &str) -> Result<Worklist, StoreError> {
        let sql = format!(
            "SELECT CAST({} AS VARCHAR), CAST({} AS VARCHAR), CAST({} AS VARCHAR), CAST({} AS VARCHAR) FROM {}",
            quote_ident(WORKLIST_TIPO),
            quote_ident(WORKLIST_URL),
            quote_ident(WORKLIST_MARCA),
            quote_ident(WORKLIST_STRATEGY),
            quote_ident(table),
        );
        let batches = self.query_arrow(&sql)?;

        let mut worklist = Worklist::default();
        let mut row_number = 0;
        for batch in &batches {
            let cols: Vec<&dyn Array> = batch.columns().iter().map(|c| c.as_ref()).collect();
            for row in 0..batch.num_rows() {
                row_number += 1;
                let tipo = get_string(cols[0], row);
                let url = get_string(cols[1], row).unwrap_or_default();
                let marca = get_string(cols[2], row);
                let strategy = get_string(cols[3], row);
                match WorklistEntry::from_cells(tipo, url, marca, strategy) {
                    Ok(entry) => worklist.entries.push(entry),
                    Err(error) => {
                        warn!(table, row = row_number, error = %error, "skipping worklist row");
                        worklist.rejected.push(RejectedRow {
                            row: row_number,
                            error,
                        });
                    }
                }
            }
        }

        info!(
            table,
            entries = worklist.entries.len(),
            rejected = worklist.rejected.len(),
            "read worklist"
        );
        Ok(worklist)
    }

    // ── Metrics ──

    /// Write records to `table` under the fixed metrics header.
    ///
    /// The table is created when absent. Columns a record does not carry are
    /// stored as NULL. All rows are written in one transaction.
    pub fn write_records(
        &self,
        table: &str,
        records: &[FlatMetricsRecord],
        mode: WriteMode,
    ) -> Result<usize, StoreError> {
        if records.is_empty() {
            return Err(StoreError::Other("no records to write".into()));
        }

        let schema = metrics_record_schema();
        let columns: Vec<&str> = schema.fields().iter().map(|f| f.name().as_str()).collect();

        // Table creation and inserts commit together, so an overwrite that
        // fails midway leaves the previous contents in place.
        self.in_transaction(|| self.write_in_transaction(table, &columns, records, mode))?;

        info!(table, rows = records.len(), mode = ?mode, "wrote metrics records");
        Ok(records.len())
    }

    /// Run `f` between `BEGIN` and `COMMIT`, rolling back when it fails.
    ///
    /// The error from `f` is returned even if the rollback itself fails.
    fn in_transaction<T>(
        &self,
        f: impl FnOnce() -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        self.conn.execute_batch("BEGIN TRANSACTION")?;
        match f() {
            Ok(value) => {
                self.conn.execute_batch("COMMIT")?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback) = self.conn.execute_batch("ROLLBACK") {
                    warn!(error = %rollback, "rollback failed");
                }
                Err(e)
            }
        }
    }

    fn write_in_transaction(
        &self,
        table: &str,
        columns: &[&str],
        records: &[FlatMetricsRecord],
        mode: WriteMode,
    ) -> Result<(), StoreError> {
        match mode {
            WriteMode::Overwrite => self.conn.execute_batch(&create_table_sql(table, true))?,
            WriteMode::Append => {
                self.conn.execute_batch(&create_table_sql(table, false))?;
                let existing = self.table_columns(table)?;
                if existing != columns {
                    return Err(StoreError::Schema {
                        table: table.to_string(),
                        detail: format!("expected {columns:?}, found {existing:?}"),
                    });
                }
            }
        }

        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(table),
            columns.iter().map(|c| quote_ident(c)).collect::<Vec<_>>().join(", "),
            vec!["?"; columns.len()].join(", "),
        );
        let mut stmt = self.conn.prepare(&sql)?;
        for record in records {
            let values = columns.iter().map(|c| to_sql_value(record.get(c)));
            stmt.execute(duckdb::params_from_iter(values))?;
        }
        Ok(())
    }

    // ── Inspection ──

    /// Whether `table` exists.
    pub fn has_table(&self, table: &str) -> Result<bool, StoreError> {
        Ok(!self.table_columns(table)?.is_empty())
    }

    /// Column names of `table` in declaration order; empty if it does not exist.
    pub fn table_columns(&self, table: &str) -> Result<Vec<String>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT column_name FROM information_schema.columns \
             WHERE table_name = ? ORDER BY ordinal_position",
        )?;
        let names = stmt
            .query_map([table], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }

    /// Number of rows in `table`.
    pub fn count_rows(&self, table: &str) -> Result<usize, StoreError> {
        let sql = format!("SELECT count(*)::BIGINT AS cnt FROM {}", quote_ident(table));
        let batches = self.query_arrow(&sql)?;
        let batch = batches.first().ok_or(StoreError::NoResults)?;
        let col = batch
            .column(0)
            .as_any()
            .downcast_ref::<arrow::array::Int64Array>()
            .ok_or_else(|| StoreError::Other("count column not i64".into()))?;
        Ok(col.value(0) as usize)
    }

    /// The most recent `limit` rows of `table`, oldest first.
    ///
    /// Rows are ordered by DuckDB's `rowid`, which grows with each insert.
    pub fn tail(&self, table: &str, limit: usize) -> Result<Vec<RecordBatch>, StoreError> {
        let total = self.count_rows(table)?;
        let offset = total.saturating_sub(limit);
        self.query_arrow(&format!(
            "SELECT * FROM {} ORDER BY rowid LIMIT {limit} OFFSET {offset}",
            quote_ident(table)
        ))
    }

    /// Copy `table` to a CSV (with header) or Parquet file.
    pub fn export(&self, table: &str, path: &Path) -> Result<usize, StoreError> {
        let format = match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("csv") => "FORMAT csv, HEADER true",
            Some(ext) if ext.eq_ignore_ascii_case("parquet") => "FORMAT parquet",
            _ => return Err(StoreError::UnsupportedFormat(path.to_path_buf())),
        };
        let sql = format!(
            "COPY {} TO {} ({format})",
            quote_ident(table),
            quote_literal(&path.display().to_string())
        );
        self.conn.execute_batch(&sql)?;
        let count = self.count_rows(table)?;
        info!(table, count, path = %path.display(), "exported table");
        Ok(count)
    }

    // ── Escape hatch ──

    /// Execute arbitrary SQL and return Arrow RecordBatches.
    pub fn query_arrow(&self, sql: &str) -> Result<Vec<RecordBatch>, StoreError> {
        let mut stmt = self.conn.prepare(sql)?;
        let batches: Vec<RecordBatch> = stmt.query_arrow([])?.collect();
        Ok(batches)
    }
}

fn create_table_sql(table: &str, replace: bool) -> String {
    let schema = metrics_record_schema();
    let columns: Vec<String> = schema
        .fields()
        .iter()
        .map(|f| {
            let sql_type = match f.data_type() {
                DataType::Float64 => "DOUBLE",
                _ => "VARCHAR",
            };
            let null = if f.is_nullable() { "" } else { " NOT NULL" };
            format!("{} {sql_type}{null}", quote_ident(f.name()))
        })
        .collect();
    let create = if replace {
        "CREATE OR REPLACE TABLE"
    } else {
        "CREATE TABLE IF NOT EXISTS"
    };
    format!("{create} {} ({})", quote_ident(table), columns.join(", "))
}

fn to_sql_value(cell: Option<&Scalar>) -> Value {
    match cell {
        Some(Scalar::Text(s)) => Value::Text(s.clone()),
        Some(Scalar::Number(n)) => Value::Double(*n),
        Some(Scalar::Null) | None => Value::Null,
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Read a string cell, handling both `Utf8` and `LargeUtf8` columns.
fn get_string(col: &dyn Array, row: usize) -> Option<&str> {
    if col.is_null(row) {
        return None;
    }
    if let Some(arr) = col.as_any().downcast_ref::<StringArray>() {
        Some(arr.value(row))
    } else if let Some(arr) = col.as_any().downcast_ref::<LargeStringArray>() {
        Some(arr.value(row))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pagepulse_core::schema::{DATE, DEVICE, MARCA, OVERALL_CATEGORY, SCORE, SITE};
    use pagepulse_core::{QueryType, StrategySelection};
    use std::io::Write;

    fn lab_only_record(label: &str) -> FlatMetricsRecord {
        let mut record = FlatMetricsRecord::default();
        record.push(DATE, Scalar::text("2024-03-15"));
        record.push(MARCA, Scalar::text(label));
        record.push(SITE, Scalar::text("https://example.com/"));
        record.push(DEVICE, Scalar::text("mobile"));
        record.push(SCORE, Scalar::Number(87.5));
        record.push("Lab_TTI", Scalar::Number(500.0));
        record
    }

    fn field_only_record(label: &str) -> FlatMetricsRecord {
        let mut record = FlatMetricsRecord::default();
        record.push(DATE, Scalar::Null);
        record.push(MARCA, Scalar::text(label));
        record.push(SITE, Scalar::text("https://example.com/"));
        record.push("Loading_CLS_Category", Scalar::text("FAST"));
        record.push("Loading_CLS", Scalar::Number(5.0));
        record.push(OVERALL_CATEGORY, Scalar::text("N/A"));
        record
    }

    fn write_csv(dir: &Path, name: &str, contents: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn open_in_memory() {
        let store = DuckStore::open().unwrap();
        let batches = store.query_arrow("SELECT 1 AS x").unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].num_rows(), 1);
    }

    #[test]
    fn append_creates_table_with_fixed_header() {
        let store = DuckStore::open().unwrap();
        assert!(!store.has_table("Base").unwrap());

        store
            .write_records("Base", &[lab_only_record("A")], WriteMode::Append)
            .unwrap();

        let columns = store.table_columns("Base").unwrap();
        let expected: Vec<String> = metrics_record_schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect();
        assert_eq!(columns, expected);
        assert_eq!(store.count_rows("Base").unwrap(), 1);
    }

    #[test]
    fn mixed_records_share_columns_with_nulls() {
        let store = DuckStore::open().unwrap();
        store
            .write_records(
                "Base",
                &[lab_only_record("A"), field_only_record("B")],
                WriteMode::Append,
            )
            .unwrap();

        let batches = store
            .query_arrow("SELECT \"Marca\", \"Lab_TTI\", \"Loading_CLS\" FROM \"Base\" ORDER BY \"Marca\"")
            .unwrap();
        let batch = &batches[0];
        assert_eq!(batch.num_rows(), 2);
        // A is lab-only, B is field-only.
        assert!(!batch.column(1).is_null(0));
        assert!(batch.column(2).is_null(0));
        assert!(batch.column(1).is_null(1));
        assert!(!batch.column(2).is_null(1));
    }

    #[test]
    fn append_keeps_existing_rows() {
        let store = DuckStore::open().unwrap();
        store
            .write_records("Base", &[lab_only_record("A")], WriteMode::Append)
            .unwrap();
        store
            .write_records("Base", &[lab_only_record("B"), lab_only_record("C")], WriteMode::Append)
            .unwrap();
        assert_eq!(store.count_rows("Base").unwrap(), 3);
    }

    #[test]
    fn overwrite_replaces_rows() {
        let store = DuckStore::open().unwrap();
        store
            .write_records("Base", &[lab_only_record("A"), lab_only_record("B")], WriteMode::Append)
            .unwrap();
        store
            .write_records("Base", &[lab_only_record("C")], WriteMode::Overwrite)
            .unwrap();
        assert_eq!(store.count_rows("Base").unwrap(), 1);
    }

    #[test]
    fn empty_write_rejected() {
        let store = DuckStore::open().unwrap();
        let result = store.write_records("Base", &[], WriteMode::Append);
        assert!(matches!(result, Err(StoreError::Other(_))));
    }

    #[test]
    fn load_missing_file_errors() {
        let store = DuckStore::open().unwrap();
        let result = store.load_worklist(Path::new("/nonexistent/worklist.csv"), "Options");
        assert!(matches!(result, Err(StoreError::SourceNotFound(_))));
    }

    #[test]
    fn load_and_read_worklist_csv() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = write_csv(
            tmp.path(),
            "options.csv",
            "Tipo,URL,Marca,Strategy\n\
             origin,https://web.dev,Web,ambos\n\
             url,https://example.com/page,Example,mobile\n\
             ,https://blank.dev,Blank,\n\
             domain,https://bad.dev,Bad,desktop\n",
        );

        let store = DuckStore::open().unwrap();
        assert_eq!(store.load_worklist(&path, "Options").unwrap(), 4);

        let worklist = store.read_worklist("Options").unwrap();
        assert_eq!(worklist.entries.len(), 3);
        assert_eq!(worklist.entries[0].strategy, StrategySelection::Both);
        assert_eq!(worklist.entries[1].query_type, QueryType::Url);
        assert_eq!(worklist.entries[1].label, "Example");
        assert_eq!(worklist.entries[2].query_type, QueryType::Origin);
        assert_eq!(worklist.entries[2].strategy, StrategySelection::Unset);

        assert_eq!(worklist.rejected.len(), 1);
        assert_eq!(worklist.rejected[0].row, 4);
        assert!(matches!(
            worklist.rejected[0].error,
            CoreError::InvalidOption { .. }
        ));
    }

    #[test]
    fn worklist_without_required_column_rejected() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = write_csv(tmp.path(), "bad.csv", "URL,Marca\nhttps://web.dev,Web\n");
        let store = DuckStore::open().unwrap();
        let result = store.load_worklist(&path, "Options");
        assert!(matches!(result, Err(StoreError::Schema { .. })));
    }

    #[test]
    fn failed_reimport_keeps_previous_worklist() {
        let tmp = tempfile::TempDir::new().unwrap();
        let good = write_csv(
            tmp.path(),
            "options.csv",
            "Tipo,URL,Marca,Strategy\nurl,https://web.dev/,Web,mobile\n",
        );
        let bad = write_csv(tmp.path(), "bad.csv", "URL,Marca\nhttps://other.dev,Other\n");

        let store = DuckStore::open().unwrap();
        store.load_worklist(&good, "Options").unwrap();
        let result = store.load_worklist(&bad, "Options");
        assert!(matches!(result, Err(StoreError::Schema { .. })));

        let worklist = store.read_worklist("Options").unwrap();
        assert_eq!(worklist.entries.len(), 1);
        assert_eq!(worklist.entries[0].url, "https://web.dev/");
        assert_eq!(worklist.entries[0].label, "Web");
    }

    #[test]
    fn append_to_foreign_table_rolls_back() {
        let store = DuckStore::open().unwrap();
        store
            .conn
            .execute_batch("CREATE TABLE \"Base\" (a INTEGER)")
            .unwrap();
        let result = store.write_records("Base", &[lab_only_record("A")], WriteMode::Append);
        assert!(matches!(result, Err(StoreError::Schema { .. })));

        // No transaction is left open after the rollback.
        store
            .write_records("Metrics", &[lab_only_record("B")], WriteMode::Append)
            .unwrap();
        assert_eq!(store.count_rows("Metrics").unwrap(), 1);
    }

    #[test]
    fn unsupported_extension_rejected() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = write_csv(tmp.path(), "options.xlsx", "");
        let store = DuckStore::open().unwrap();
        let result = store.load_worklist(&path, "Options");
        assert!(matches!(result, Err(StoreError::UnsupportedFormat(_))));
    }

    #[test]
    fn export_csv_writes_header_first() {
        let tmp = tempfile::TempDir::new().unwrap();
        let out = tmp.path().join("base.csv");
        let store = DuckStore::open().unwrap();
        store
            .write_records("Base", &[lab_only_record("A")], WriteMode::Overwrite)
            .unwrap();
        assert_eq!(store.export("Base", &out).unwrap(), 1);

        let text = std::fs::read_to_string(&out).unwrap();
        let header = text.lines().next().unwrap();
        assert!(header.starts_with("Date,Marca,Site,Device,Score,Lab_FCP"));
        assert!(header.ends_with("Loading_Overall_Category"));
    }

    #[test]
    fn tail_returns_latest_rows() {
        let store = DuckStore::open().unwrap();
        let records: Vec<_> = ["A", "B", "C"].iter().map(|l| lab_only_record(l)).collect();
        store.write_records("Base", &records, WriteMode::Append).unwrap();
        store
            .write_records("Base", &[lab_only_record("D")], WriteMode::Append)
            .unwrap();

        let batches = store.tail("Base", 2).unwrap();
        let labels: Vec<&str> = batches
            .iter()
            .flat_map(|b| {
                let col = b.column_by_name(MARCA).unwrap();
                (0..b.num_rows()).map(move |row| get_string(col.as_ref(), row).unwrap())
            })
            .collect();
        assert_eq!(labels, ["C", "D"]);
    }

    // ── Persistent storage tests ──

    #[test]
    fn persistent_records_survive_reopen() {
        let tmp = tempfile::TempDir::new().unwrap();
        let db_path = tmp.path().join("metrics.duckdb");

        let store = DuckStore::open_persistent(&db_path).unwrap();
        store
            .write_records("Base", &[lab_only_record("A")], WriteMode::Append)
            .unwrap();
        drop(store);

        let store = DuckStore::open_persistent(&db_path).unwrap();
        assert!(store.has_table("Base").unwrap());
        store
            .write_records("Base", &[field_only_record("B")], WriteMode::Append)
            .unwrap();
        assert_eq!(store.count_rows("Base").unwrap(), 2);
    }
}
