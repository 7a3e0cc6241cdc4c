//! Job Repository
//!
//! Postgres storage for job records.

use async_trait::async_trait;
use beacon_core::domain::job::{JobRecord, JobStatus, NormalizedJobSpec};
use sqlx::PgPool;

use super::{JobRepository, StoreError, StoreResult};

#[derive(Debug, Clone)]
pub struct PgJobRepository {
    pool: PgPool,
}

impl PgJobRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobRepository for PgJobRepository {
    async fn insert_if_absent(&self, record: &JobRecord) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO jobs (job_id, spec, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (job_id) DO NOTHING
            "#,
        )
        .bind(record.job_id())
        .bind(serde_json::to_value(&record.spec)?)
        .bind(record.status.as_str())
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn find_by_id(&self, job_id: &str) -> StoreResult<Option<JobRecord>> {
        let row = sqlx::query_as::<_, JobRow>(
            r#"
            SELECT spec, status, created_at, updated_at
            FROM jobs
            WHERE job_id = $1
            "#,
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(JobRecord::try_from).transpose()
    }

    async fn update_status(&self, job_id: &str, status: JobStatus) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = $2, updated_at = $3
            WHERE job_id = $1
            "#,
        )
        .bind(job_id)
        .bind(status.as_str())
        .bind(chrono::Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct JobRow {
    spec: serde_json::Value,
    status: String,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl TryFrom<JobRow> for JobRecord {
    type Error = StoreError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let spec: NormalizedJobSpec = serde_json::from_value(row.spec)?;
        let status = JobStatus::parse(&row.status)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown job status '{}'", row.status)))?;

        Ok(JobRecord {
            spec,
            status,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
