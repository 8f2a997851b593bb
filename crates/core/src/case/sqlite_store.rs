//! SQLite-backed case record store.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode};

use super::{
    CaseRecord, CaseStore, CaseStoreError, NewCaseRecord, ProcessingStatus, RecordUpdate,
};

const SELECT_COLUMNS: &str = "case_number, file_name, download_date, processing_status, extracted_text, created_at, updated_at";

/// SQLite-backed case record store.
pub struct SqliteCaseStore {
    conn: Mutex<Connection>,
}

impl SqliteCaseStore {
    /// Create a new SQLite case store, creating the database file and tables if needed.
    pub fn new(path: &Path) -> Result<Self, CaseStoreError> {
        let conn = Connection::open(path).map_err(|e| CaseStoreError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory SQLite case store (useful for testing).
    pub fn in_memory() -> Result<Self, CaseStoreError> {
        let conn =
            Connection::open_in_memory().map_err(|e| CaseStoreError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), CaseStoreError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS cases (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                case_number TEXT NOT NULL UNIQUE,
                file_name TEXT NOT NULL,
                download_date TEXT,
                processing_status TEXT NOT NULL DEFAULT 'pending',
                extracted_text TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_cases_download_date ON cases(download_date);
            CREATE INDEX IF NOT EXISTS idx_cases_status ON cases(processing_status);
            "#,
        )
        .map_err(|e| CaseStoreError::Database(e.to_string()))
    }

    fn parse_timestamp(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now())
    }

    fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<CaseRecord> {
        let case_number: String = row.get(0)?;
        let file_name: String = row.get(1)?;
        let download_date: Option<String> = row.get(2)?;
        let status: String = row.get(3)?;
        let extracted_text: Option<String> = row.get(4)?;
        let created_at: String = row.get(5)?;
        let updated_at: String = row.get(6)?;

        Ok(CaseRecord {
            case_number,
            file_name,
            download_date: download_date.as_deref().map(Self::parse_timestamp),
            processing_status: status.parse().unwrap_or(ProcessingStatus::Pending),
            extracted_text,
            created_at: Self::parse_timestamp(&created_at),
            updated_at: Self::parse_timestamp(&updated_at),
        })
    }

    fn fetch(conn: &Connection, case_number: &str) -> Result<Option<CaseRecord>, CaseStoreError> {
        let result = conn.query_row(
            &format!("SELECT {} FROM cases WHERE case_number = ?", SELECT_COLUMNS),
            params![case_number],
            Self::row_to_record,
        );

        match result {
            Ok(record) => Ok(Some(record)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(CaseStoreError::Database(e.to_string())),
        }
    }

    fn is_unique_violation(err: &rusqlite::Error) -> bool {
        matches!(
            err,
            rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
        )
    }
}

impl CaseStore for SqliteCaseStore {
    fn exists(&self, case_number: &str) -> Result<bool, CaseStoreError> {
        let conn = self.conn.lock().unwrap();

        conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM cases WHERE case_number = ?)",
            params![case_number],
            |row| row.get(0),
        )
        .map_err(|e| CaseStoreError::Database(e.to_string()))
    }

    fn get(&self, case_number: &str) -> Result<Option<CaseRecord>, CaseStoreError> {
        let conn = self.conn.lock().unwrap();
        Self::fetch(&conn, case_number)
    }

    fn insert(&self, record: NewCaseRecord) -> Result<CaseRecord, CaseStoreError> {
        if record.case_number.trim().is_empty() {
            return Err(CaseStoreError::InvalidRecord(
                "case_number is empty".to_string(),
            ));
        }
        if record.file_name.trim().is_empty() {
            return Err(CaseStoreError::InvalidRecord(format!(
                "file_name is empty for case {}",
                record.case_number
            )));
        }

        let conn = self.conn.lock().unwrap();
        let now = Utc::now();

        conn.execute(
            "INSERT INTO cases (case_number, file_name, download_date, processing_status, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
            params![
                record.case_number,
                record.file_name,
                record.download_date.map(|d| d.to_rfc3339()),
                record.processing_status.as_str(),
                now.to_rfc3339(),
                now.to_rfc3339(),
            ],
        )
        .map_err(|e| {
            if Self::is_unique_violation(&e) {
                CaseStoreError::DuplicateKey(record.case_number.clone())
            } else {
                CaseStoreError::Database(e.to_string())
            }
        })?;

        Ok(CaseRecord {
            case_number: record.case_number,
            file_name: record.file_name,
            download_date: record.download_date,
            processing_status: record.processing_status,
            extracted_text: None,
            created_at: now,
            updated_at: now,
        })
    }

    fn update_status(
        &self,
        case_number: &str,
        update: RecordUpdate,
    ) -> Result<CaseRecord, CaseStoreError> {
        let conn = self.conn.lock().unwrap();

        let current = Self::fetch(&conn, case_number)?
            .ok_or_else(|| CaseStoreError::NotFound(case_number.to_string()))?;

        let now = Utc::now();
        let file_name = update.file_name.unwrap_or(current.file_name);
        let download_date = update.download_date.or(current.download_date);
        let extracted_text = update.extracted_text.or(current.extracted_text);

        conn.execute(
            "UPDATE cases SET file_name = ?, download_date = ?, processing_status = ?, extracted_text = ?, updated_at = ? WHERE case_number = ?",
            params![
                file_name,
                download_date.map(|d| d.to_rfc3339()),
                update.status.as_str(),
                extracted_text,
                now.to_rfc3339(),
                case_number,
            ],
        )
        .map_err(|e| CaseStoreError::Database(e.to_string()))?;

        Ok(CaseRecord {
            case_number: current.case_number,
            file_name,
            download_date,
            processing_status: update.status,
            extracted_text,
            created_at: current.created_at,
            updated_at: now,
        })
    }

    fn list(&self, limit: i64, offset: i64) -> Result<Vec<CaseRecord>, CaseStoreError> {
        let conn = self.conn.lock().unwrap();

        let sql = format!(
            "SELECT {} FROM cases ORDER BY download_date DESC, id DESC LIMIT ? OFFSET ?",
            SELECT_COLUMNS
        );

        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| CaseStoreError::Database(e.to_string()))?;

        let rows = stmt
            .query_map(params![limit, offset], Self::row_to_record)
            .map_err(|e| CaseStoreError::Database(e.to_string()))?;

        let mut records = Vec::new();
        for row_result in rows {
            records.push(row_result.map_err(|e| CaseStoreError::Database(e.to_string()))?);
        }

        Ok(records)
    }

    fn count(&self) -> Result<i64, CaseStoreError> {
        let conn = self.conn.lock().unwrap();

        conn.query_row("SELECT COUNT(*) FROM cases", [], |row| row.get(0))
            .map_err(|e| CaseStoreError::Database(e.to_string()))
    }
}
