//! Execution Unit Repository
//!
//! Postgres storage for execution units. Every transition is a single
//! conditional `UPDATE`, so concurrent writers never need a lock.

use async_trait::async_trait;
use beacon_core::domain::execution::{
    ExecutionOutcome, ExecutionStatus, ExecutionUnit, RetryHistoryEntry, RetryOrigin, UnitKey,
};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{ExecutionRepository, StoreError, StoreResult};

const UNIT_COLUMNS: &str = r#"
    id, job_id, model_id, region, question_id, status, output, original_error,
    provider, retry_count, max_retries, last_retry_at, retry_history,
    created_at, updated_at, started_at, completed_at
"#;

#[derive(Debug, Clone)]
pub struct PgExecutionRepository {
    pool: PgPool,
}

impl PgExecutionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ExecutionRepository for PgExecutionRepository {
    async fn create_if_absent(&self, unit: &ExecutionUnit) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO execution_units (
                id, job_id, model_id, region, question_id, status,
                retry_count, max_retries, retry_history, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (job_id, model_id, region, question_id) DO NOTHING
            "#,
        )
        .bind(unit.id)
        .bind(&unit.job_id)
        .bind(&unit.model_id)
        .bind(&unit.region)
        .bind(&unit.question_id)
        .bind(unit.status.as_str())
        .bind(to_column("retry_count", unit.retry_count)?)
        .bind(to_column("max_retries", unit.max_retries)?)
        .bind(serde_json::to_value(&unit.retry_history)?)
        .bind(unit.created_at)
        .bind(unit.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<ExecutionUnit>> {
        let sql = format!("SELECT {UNIT_COLUMNS} FROM execution_units WHERE id = $1");
        let row = sqlx::query_as::<_, ExecutionRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(ExecutionUnit::try_from).transpose()
    }

    async fn find_by_key(&self, key: &UnitKey) -> StoreResult<Option<ExecutionUnit>> {
        let sql = format!(
            "SELECT {UNIT_COLUMNS} FROM execution_units
             WHERE job_id = $1 AND model_id = $2 AND region = $3 AND question_id = $4"
        );
        let row = sqlx::query_as::<_, ExecutionRow>(&sql)
            .bind(&key.job_id)
            .bind(&key.model_id)
            .bind(&key.region)
            .bind(&key.question_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(ExecutionUnit::try_from).transpose()
    }

    async fn list_by_job(&self, job_id: &str) -> StoreResult<Vec<ExecutionUnit>> {
        let sql = format!(
            "SELECT {UNIT_COLUMNS} FROM execution_units
             WHERE job_id = $1
             ORDER BY created_at ASC, id ASC"
        );
        let rows = sqlx::query_as::<_, ExecutionRow>(&sql)
            .bind(job_id)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(ExecutionUnit::try_from).collect()
    }

    async fn claim(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<Option<ExecutionUnit>> {
        let sql = format!(
            "UPDATE execution_units
             SET status = 'running', started_at = $2, updated_at = $2
             WHERE id = $1 AND status = 'pending'
             RETURNING {UNIT_COLUMNS}"
        );
        let row = sqlx::query_as::<_, ExecutionRow>(&sql)
            .bind(id)
            .bind(at)
            .fetch_optional(&self.pool)
            .await?;

        row.map(ExecutionUnit::try_from).transpose()
    }

    async fn complete(
        &self,
        id: Uuid,
        outcome: &ExecutionOutcome,
        at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let (output, provider) = match outcome {
            ExecutionOutcome::Completed { output, provider } => (Some(output), provider.as_deref()),
            _ => (None, None),
        };

        let result = sqlx::query(
            r#"
            UPDATE execution_units
            SET status = $2,
                output = COALESCE($3, output),
                provider = COALESCE($4, provider),
                original_error = COALESCE(original_error, $5),
                updated_at = $6,
                completed_at = $6
            WHERE id = $1 AND status = 'running'
            "#,
        )
        .bind(id)
        .bind(outcome.status().as_str())
        .bind(output)
        .bind(provider)
        .bind(outcome.error())
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn begin_retry(
        &self,
        id: Uuid,
        expected: ExecutionStatus,
        origin: RetryOrigin,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<ExecutionUnit>> {
        if !expected.is_retryable() {
            return Ok(None);
        }

        // SET expressions see the pre-update row, so `retry_count + 1` and
        // `status` describe this attempt and the state it came from.
        let sql = format!(
            "UPDATE execution_units
             SET retry_count = retry_count + 1,
                 last_retry_at = $3,
                 retry_history = retry_history || jsonb_build_array(jsonb_build_object(
                     'attempt', retry_count + 1,
                     'timestamp', to_jsonb($3::timestamptz),
                     'prior_status', status,
                     'origin', $4::text
                 )),
                 status = 'pending',
                 updated_at = $3,
                 started_at = NULL,
                 completed_at = NULL
             WHERE id = $1 AND status = $2 AND retry_count < max_retries
             RETURNING {UNIT_COLUMNS}"
        );
        let row = sqlx::query_as::<_, ExecutionRow>(&sql)
            .bind(id)
            .bind(expected.as_str())
            .bind(at)
            .bind(origin.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.map(ExecutionUnit::try_from).transpose()
    }

    async fn cancel_pending(&self, job_id: &str, at: DateTime<Utc>) -> StoreResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE execution_units
            SET status = 'cancelled', updated_at = $2, completed_at = $2
            WHERE job_id = $1 AND status = 'pending'
            "#,
        )
        .bind(job_id)
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn list_stale_pending(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> StoreResult<Vec<ExecutionUnit>> {
        let sql = format!(
            "SELECT {UNIT_COLUMNS} FROM execution_units
             WHERE status = 'pending' AND updated_at < $1
             ORDER BY updated_at ASC
             LIMIT $2"
        );
        let rows = sqlx::query_as::<_, ExecutionRow>(&sql)
            .bind(cutoff)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(ExecutionUnit::try_from).collect()
    }

    async fn touch_pending(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE execution_units SET updated_at = $2 WHERE id = $1 AND status = 'pending'",
        )
        .bind(id)
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn timeout_stale_running(
        &self,
        cutoff: DateTime<Utc>,
        error: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<Vec<ExecutionUnit>> {
        let sql = format!(
            "UPDATE execution_units
             SET status = 'timeout',
                 original_error = COALESCE(original_error, $2),
                 updated_at = $3,
                 completed_at = $3
             WHERE status = 'running' AND started_at < $1
             RETURNING {UNIT_COLUMNS}"
        );
        let rows = sqlx::query_as::<_, ExecutionRow>(&sql)
            .bind(cutoff)
            .bind(error)
            .bind(at)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(ExecutionUnit::try_from).collect()
    }

    async fn jobs_with_retryable_units(&self) -> StoreResult<Vec<String>> {
        let job_ids = sqlx::query_scalar::<_, String>(
            r#"
            SELECT DISTINCT job_id
            FROM execution_units
            WHERE status IN ('failed', 'timeout') AND retry_count < max_retries
            ORDER BY job_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(job_ids)
    }
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct ExecutionRow {
    id: Uuid,
    job_id: String,
    model_id: String,
    region: String,
    question_id: String,
    status: String,
    output: Option<serde_json::Value>,
    original_error: Option<String>,
    provider: Option<String>,
    retry_count: i32,
    max_retries: i32,
    last_retry_at: Option<DateTime<Utc>>,
    retry_history: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<ExecutionRow> for ExecutionUnit {
    type Error = StoreError;

    fn try_from(row: ExecutionRow) -> Result<Self, Self::Error> {
        let status = ExecutionStatus::parse(&row.status).ok_or_else(|| {
            StoreError::Corrupt(format!("execution {} has status '{}'", row.id, row.status))
        })?;
        let retry_history: Vec<RetryHistoryEntry> = serde_json::from_value(row.retry_history)?;

        Ok(ExecutionUnit {
            id: row.id,
            job_id: row.job_id,
            model_id: row.model_id,
            region: row.region,
            question_id: row.question_id,
            status,
            output: row.output,
            original_error: row.original_error,
            provider: row.provider,
            retry_count: non_negative(row.retry_count),
            max_retries: non_negative(row.max_retries),
            last_retry_at: row.last_retry_at,
            retry_history,
            created_at: row.created_at,
            updated_at: row.updated_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
        })
    }
}

fn non_negative(value: i32) -> u32 {
    u32::try_from(value).unwrap_or(0)
}

fn to_column(column: &str, value: u32) -> StoreResult<i32> {
    i32::try_from(value)
        .map_err(|_| StoreError::OutOfRange(format!("{column} = {value} does not fit INTEGER")))
}
