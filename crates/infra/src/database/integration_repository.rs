//! SQLite implementation of the record store port.
//!
//! Records are upserted by id. A row that is already `DONE` is never
//! overwritten, so status stays monotonic even if two writers race.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hubrelay_core::RecordStore;
use hubrelay_domain::{
    HubRelayError, IntegrationRecord, IntegrationStatus, IntegrationType, Result as DomainResult,
};
use rusqlite::types::Type;
use rusqlite::{params, OptionalExtension, Row};
use tokio::task;
use tracing::debug;
use uuid::Uuid;

use super::manager::{map_sql_error, DbConnection, DbManager};

/// SQLite-backed store of integration records.
#[derive(Debug, Clone)]
pub struct SqliteIntegrationRepository {
    db: Arc<DbManager>,
}

impl SqliteIntegrationRepository {
    pub const fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }

    /// Fetch a single record by id.
    pub async fn find_by_id(&self, id: &str) -> DomainResult<Option<IntegrationRecord>> {
        let db = Arc::clone(&self.db);
        let id = id.to_string();

        task::spawn_blocking(move || -> DomainResult<Option<IntegrationRecord>> {
            let conn = db.get_connection()?;
            conn.query_row(SELECT_BY_ID_SQL, params![id], map_record_row)
                .optional()
                .map_err(map_sql_error)
        })
        .await
        .map_err(map_join_error)?
    }

    /// Count records per status for one type.
    pub async fn count_by_status(
        &self,
        status: IntegrationStatus,
        integration_type: IntegrationType,
    ) -> DomainResult<u64> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> DomainResult<u64> {
            let conn = db.get_connection()?;
            let count: i64 = conn
                .query_row(
                    COUNT_SQL,
                    params![status.to_string(), integration_type.to_string()],
                    |row| row.get(0),
                )
                .map_err(map_sql_error)?;
            Ok(u64::try_from(count).unwrap_or_default())
        })
        .await
        .map_err(map_join_error)?
    }

    fn upsert(conn: &DbConnection, record: &IntegrationRecord, id: &str) -> DomainResult<()> {
        conn.execute(
            UPSERT_SQL,
            params![
                id,
                record.partition_key,
                record.integration_type.to_string(),
                record.status.to_string(),
                record.payload,
                record.batch_id,
                record.error,
                record.created_at.timestamp_micros(),
                record.updated_at.map(|at| at.timestamp_micros()),
            ],
        )
        .map_err(map_sql_error)?;
        Ok(())
    }

    fn fetch(
        conn: &DbConnection,
        status: IntegrationStatus,
        integration_type: IntegrationType,
    ) -> DomainResult<Vec<IntegrationRecord>> {
        let mut stmt = conn.prepare(SELECT_BY_STATUS_AND_TYPE_SQL).map_err(map_sql_error)?;
        let rows = stmt
            .query_map(params![status.to_string(), integration_type.to_string()], map_record_row)
            .map_err(map_sql_error)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(map_sql_error)
    }
}

#[async_trait]
impl RecordStore for SqliteIntegrationRepository {
    async fn find_by_status_and_type(
        &self,
        status: IntegrationStatus,
        integration_type: IntegrationType,
    ) -> DomainResult<Vec<IntegrationRecord>> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> DomainResult<Vec<IntegrationRecord>> {
            let conn = db.get_connection()?;
            Self::fetch(&conn, status, integration_type)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn save(&self, record: IntegrationRecord) -> DomainResult<IntegrationRecord> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> DomainResult<IntegrationRecord> {
            let mut record = record;
            let id = record.id.get_or_insert_with(|| Uuid::now_v7().to_string()).clone();
            let conn = db.get_connection()?;
            Self::upsert(&conn, &record, &id)?;
            debug!(record_id = %id, status = %record.status, "integration record saved");
            Ok(record)
        })
        .await
        .map_err(map_join_error)?
    }
}

const UPSERT_SQL: &str = "INSERT INTO integration_records (
        id, partition_key, integration_type, status, payload, batch_id, error, created_at,
        updated_at
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
    ON CONFLICT(id) DO UPDATE SET
        partition_key = excluded.partition_key,
        integration_type = excluded.integration_type,
        status = excluded.status,
        payload = excluded.payload,
        batch_id = excluded.batch_id,
        error = excluded.error,
        updated_at = excluded.updated_at
    WHERE integration_records.status <> 'DONE'";

const SELECT_BY_STATUS_AND_TYPE_SQL: &str = "SELECT
        id, partition_key, integration_type, status, payload, batch_id, error, created_at,
        updated_at
    FROM integration_records
    WHERE status = ?1 AND integration_type = ?2
    ORDER BY created_at ASC, id ASC";

const SELECT_BY_ID_SQL: &str = "SELECT
        id, partition_key, integration_type, status, payload, batch_id, error, created_at,
        updated_at
    FROM integration_records
    WHERE id = ?1";

const COUNT_SQL: &str =
    "SELECT COUNT(*) FROM integration_records WHERE status = ?1 AND integration_type = ?2";

fn map_record_row(row: &Row<'_>) -> rusqlite::Result<IntegrationRecord> {
    let integration_type = parse_column::<IntegrationType>(row, 2)?;
    let status = parse_column::<IntegrationStatus>(row, 3)?;
    let created_at = micros_to_datetime(7, row.get(7)?)?;
    let updated_at = row
        .get::<_, Option<i64>>(8)?
        .map(|micros| micros_to_datetime(8, micros))
        .transpose()?;

    Ok(IntegrationRecord {
        id: Some(row.get(0)?),
        partition_key: row.get(1)?,
        integration_type,
        status,
        payload: row.get(4)?,
        batch_id: row.get(5)?,
        error: row.get(6)?,
        created_at,
        updated_at,
    })
}

fn parse_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: std::str::FromStr<Err = String>,
{
    let raw: String = row.get(idx)?;
    raw.parse::<T>()
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, err.into()))
}

fn micros_to_datetime(idx: usize, micros: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp_micros(micros).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Integer,
            format!("timestamp out of range: {micros}").into(),
        )
    })
}

fn map_join_error(err: task::JoinError) -> HubRelayError {
    if err.is_cancelled() {
        HubRelayError::Internal("blocking database task cancelled".into())
    } else {
        HubRelayError::Internal(format!("blocking database task failed: {err}"))
    }
}

