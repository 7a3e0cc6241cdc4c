//! Region Queue Repository
//!
//! Durable per-region priority queue on a Postgres table. `seq` gives FIFO
//! order inside a priority class; dequeue locks with `SKIP LOCKED` so
//! concurrent workers never receive the same entry.

use async_trait::async_trait;
use beacon_core::domain::queue::{PriorityClass, QueueDepth, QueueEntry};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{RegionQueue, StoreError, StoreResult};

#[derive(Debug, Clone)]
pub struct PgRegionQueue {
    pool: PgPool,
}

impl PgRegionQueue {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RegionQueue for PgRegionQueue {
    async fn enqueue(
        &self,
        execution_id: Uuid,
        region: &str,
        priority: PriorityClass,
    ) -> StoreResult<QueueEntry> {
        let row = sqlx::query_as::<_, QueueRow>(
            r#"
            INSERT INTO region_queue (execution_id, region, priority, enqueued_at)
            VALUES ($1, $2, $3, $4)
            RETURNING seq, execution_id, region, priority, enqueued_at
            "#,
        )
        .bind(execution_id)
        .bind(region)
        .bind(priority.rank())
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        QueueEntry::try_from(row)
    }

    async fn dequeue(&self, region: &str) -> StoreResult<Option<QueueEntry>> {
        let row = sqlx::query_as::<_, QueueRow>(
            r#"
            DELETE FROM region_queue
            WHERE seq = (
                SELECT seq
                FROM region_queue
                WHERE region = $1
                ORDER BY priority ASC, seq ASC
                FOR UPDATE SKIP LOCKED
                LIMIT 1
            )
            RETURNING seq, execution_id, region, priority, enqueued_at
            "#,
        )
        .bind(region)
        .fetch_optional(&self.pool)
        .await?;

        row.map(QueueEntry::try_from).transpose()
    }

    async fn depth(&self, region: &str) -> StoreResult<QueueDepth> {
        let rows = sqlx::query_as::<_, (i16, i64)>(
            r#"
            SELECT priority, COUNT(*)
            FROM region_queue
            WHERE region = $1
            GROUP BY priority
            "#,
        )
        .bind(region)
        .fetch_all(&self.pool)
        .await?;

        let mut depth = QueueDepth::empty(region);
        for (rank, count) in rows {
            let priority = PriorityClass::from_rank(rank)
                .ok_or_else(|| StoreError::Corrupt(format!("unknown queue priority {rank}")))?;
            depth.add(priority, count.max(0) as u64);
        }
        Ok(depth)
    }

    async fn contains(&self, execution_id: Uuid) -> StoreResult<bool> {
        let (queued,) = sqlx::query_as::<_, (bool,)>(
            "SELECT EXISTS(SELECT 1 FROM region_queue WHERE execution_id = $1)",
        )
        .bind(execution_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(queued)
    }
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct QueueRow {
    seq: i64,
    execution_id: Uuid,
    region: String,
    priority: i16,
    enqueued_at: DateTime<Utc>,
}

impl TryFrom<QueueRow> for QueueEntry {
    type Error = StoreError;

    fn try_from(row: QueueRow) -> Result<Self, Self::Error> {
        let priority = PriorityClass::from_rank(row.priority).ok_or_else(|| {
            StoreError::Corrupt(format!("queue entry {} has priority {}", row.seq, row.priority))
        })?;

        Ok(QueueEntry {
            seq: row.seq,
            execution_id: row.execution_id,
            region: row.region,
            priority,
            enqueued_at: row.enqueued_at,
        })
    }
}
