use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use super::{AuditError, AuditEvent, AuditFilter, AuditOrder, AuditPage, AuditRecord, AuditStore};

/// Columns of one `audit_events` row before decoding.
type RawRow = (i64, String, String, Option<String>, String);

/// SQLite-backed audit store
pub struct SqliteAuditStore {
    conn: Mutex<Connection>,
}

impl SqliteAuditStore {
    /// Create a new SQLite audit store, creating the database file and tables if needed
    pub fn new(path: &Path) -> Result<Self, AuditError> {
        let conn = Connection::open(path).map_err(|e| AuditError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory SQLite audit store (useful for testing)
    pub fn in_memory() -> Result<Self, AuditError> {
        let conn = Connection::open_in_memory().map_err(|e| AuditError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), AuditError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS audit_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                event_type TEXT NOT NULL,
                case_number TEXT,
                data TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_audit_events_timestamp ON audit_events(timestamp);
            CREATE INDEX IF NOT EXISTS idx_audit_events_case_number ON audit_events(case_number);
            CREATE INDEX IF NOT EXISTS idx_audit_events_event_type ON audit_events(event_type);
            "#,
        )
        .map_err(|e| AuditError::Database(e.to_string()))
    }

    /// Translate a filter into SQL conditions. Step and cause live inside the
    /// event JSON, so they are matched with `json_extract`.
    fn build_where_clause(filter: &AuditFilter) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions: Vec<String> = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(ref case_number) = filter.case_number {
            conditions.push("case_number = ?".to_string());
            params.push(Box::new(case_number.clone()));
        }

        if !filter.event_types.is_empty() {
            let slots = vec!["?"; filter.event_types.len()].join(", ");
            conditions.push(format!("event_type IN ({})", slots));
            for event_type in &filter.event_types {
                params.push(Box::new(event_type.clone()));
            }
        }

        if let Some(step) = filter.step {
            conditions.push("json_extract(data, '$.step') = ?".to_string());
            params.push(Box::new(step.as_str()));
        }

        if let Some(cause) = filter.cause {
            conditions.push("json_extract(data, '$.cause') = ?".to_string());
            params.push(Box::new(cause.as_str()));
        }

        if let Some(ref since) = filter.since {
            conditions.push("timestamp >= ?".to_string());
            params.push(Box::new(since.to_rfc3339()));
        }

        if let Some(ref until) = filter.until {
            conditions.push("timestamp <= ?".to_string());
            params.push(Box::new(until.to_rfc3339()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        (where_clause, params)
    }

    fn row_to_record(
        (id, timestamp_str, event_type, case_number, data_json): RawRow,
    ) -> Result<AuditRecord, AuditError> {
        let timestamp: DateTime<Utc> = DateTime::parse_from_rfc3339(&timestamp_str)
            .map_err(|e| AuditError::Database(format!("Invalid timestamp: {}", e)))?
            .into();

        let data: AuditEvent = serde_json::from_str(&data_json)
            .map_err(|e| AuditError::Serialization(e.to_string()))?;

        Ok(AuditRecord {
            id,
            timestamp,
            event_type,
            case_number,
            data,
        })
    }
}

impl AuditStore for SqliteAuditStore {
    fn insert(&self, record: &AuditRecord) -> Result<i64, AuditError> {
        let conn = self.conn.lock().unwrap();

        let data_json = serde_json::to_string(&record.data)
            .map_err(|e| AuditError::Serialization(e.to_string()))?;

        conn.execute(
            "INSERT INTO audit_events (timestamp, event_type, case_number, data) VALUES (?, ?, ?, ?)",
            params![
                record.timestamp.to_rfc3339(),
                record.event_type,
                record.case_number,
                data_json,
            ],
        )
        .map_err(|e| AuditError::Database(e.to_string()))?;

        Ok(conn.last_insert_rowid())
    }

    fn query(
        &self,
        filter: &AuditFilter,
        order: AuditOrder,
        page: AuditPage,
    ) -> Result<Vec<AuditRecord>, AuditError> {
        let conn = self.conn.lock().unwrap();

        let (where_clause, params) = Self::build_where_clause(filter);
        let order_by = match order {
            AuditOrder::NewestFirst => "timestamp DESC, id DESC",
            AuditOrder::Chronological => "timestamp ASC, id ASC",
        };

        let sql = format!(
            "SELECT id, timestamp, event_type, case_number, data FROM audit_events {} ORDER BY {} LIMIT ? OFFSET ?",
            where_clause, order_by
        );

        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| AuditError::Database(e.to_string()))?;

        let mut all_params: Vec<Box<dyn rusqlite::ToSql>> = params;
        all_params.push(Box::new(page.limit));
        all_params.push(Box::new(page.offset));

        let param_refs: Vec<&dyn rusqlite::ToSql> = all_params.iter().map(|p| p.as_ref()).collect();

        let rows = stmt
            .query_map(param_refs.as_slice(), |row| -> rusqlite::Result<RawRow> {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
            })
            .map_err(|e| AuditError::Database(e.to_string()))?;

        let mut records = Vec::new();
        for row_result in rows {
            let row = row_result.map_err(|e| AuditError::Database(e.to_string()))?;
            records.push(Self::row_to_record(row)?);
        }

        Ok(records)
    }

    fn count(&self, filter: &AuditFilter) -> Result<i64, AuditError> {
        let conn = self.conn.lock().unwrap();

        let (where_clause, params) = Self::build_where_clause(filter);

        let sql = format!("SELECT COUNT(*) FROM audit_events {}", where_clause);

        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        conn.query_row(&sql, param_refs.as_slice(), |row| row.get(0))
            .map_err(|e| AuditError::Database(e.to_string()))
    }
}
