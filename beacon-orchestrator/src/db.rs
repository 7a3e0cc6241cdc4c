use sqlx::{PgPool, postgres::PgPoolOptions};
use std::time::Duration;

pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    // Create jobs table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS jobs (
            job_id TEXT PRIMARY KEY,
            spec JSONB NOT NULL,
            status VARCHAR(20) NOT NULL,
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create execution units table; the unique constraint is the dedup boundary
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS execution_units (
            id UUID PRIMARY KEY,
            job_id TEXT NOT NULL REFERENCES jobs(job_id),
            model_id TEXT NOT NULL,
            region TEXT NOT NULL,
            question_id TEXT NOT NULL,
            status VARCHAR(20) NOT NULL,
            output JSONB,
            original_error TEXT,
            provider TEXT,
            retry_count INTEGER NOT NULL DEFAULT 0 CHECK (retry_count >= 0),
            max_retries INTEGER NOT NULL DEFAULT 3 CHECK (max_retries >= 0),
            last_retry_at TIMESTAMPTZ,
            retry_history JSONB NOT NULL DEFAULT '[]',
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL,
            started_at TIMESTAMPTZ,
            completed_at TIMESTAMPTZ,
            UNIQUE (job_id, model_id, region, question_id),
            CHECK (retry_count <= max_retries)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create region queue table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS region_queue (
            seq BIGSERIAL PRIMARY KEY,
            execution_id UUID NOT NULL REFERENCES execution_units(id),
            region TEXT NOT NULL,
            priority SMALLINT NOT NULL,
            enqueued_at TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes for better query performance
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_region_queue_dispatch ON region_queue(region, priority, seq)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_region_queue_execution ON region_queue(execution_id)",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_execution_units_job ON execution_units(job_id)")
        .execute(pool)
        .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_execution_units_status ON execution_units(status, updated_at)",
    )
    .execute(pool)
    .await?;

    tracing::info!("Database migrations completed successfully");
    Ok(())
}
