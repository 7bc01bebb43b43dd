use async_trait::async_trait;
use orbitflow_application::{ExecutionQueueMessage, QueuePublisher};
use orbitflow_core::{AppError, AppResult};
use serde_json::Value;
use sqlx::{FromRow, PgPool};

/// Publishes executions into the `execution_queue` table for out-of-process
/// worker polling.
#[derive(Clone)]
pub struct PostgresQueuePublisher {
    pool: PgPool,
}

impl PostgresQueuePublisher {
    /// Creates a publisher with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Claims up to `limit` pending or lease-expired jobs for `worker_id`,
    /// holding each lease for `lease_seconds`.
    ///
    /// Mirrors the `FOR UPDATE SKIP LOCKED` claim pattern: candidates are
    /// selected and locked inside a CTE, then updated in the same statement
    /// so concurrent claimants never double-assign a row.
    pub async fn claim(&self, worker_id: &str, limit: i64, lease_seconds: i64) -> AppResult<Vec<ClaimedJob>> {
        let mut transaction = self
            .pool
            .begin()
            .await
            .map_err(|error| AppError::Internal(format!("failed to start queue claim transaction: {error}")))?;

        let rows = sqlx::query_as::<_, ClaimedJobRow>(
            r#"
            WITH candidate_jobs AS (
                SELECT id
                FROM execution_queue
                WHERE status = 'pending'
                   OR (status = 'leased' AND lease_expires_at < now())
                ORDER BY created_at ASC
                LIMIT $1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE execution_queue jobs
            SET
                status = 'leased',
                lease_token = gen_random_uuid()::TEXT,
                lease_expires_at = now() + make_interval(secs => $3::INT),
                updated_at = now()
            FROM candidate_jobs
            WHERE jobs.id = candidate_jobs.id
            RETURNING
                jobs.id, jobs.tenant_id, jobs.execution_id, jobs.workflow_id,
                jobs.workflow_version, jobs.trigger_type, jobs.trigger_data, jobs.lease_token
            "#,
        )
        .bind(limit)
        .bind(worker_id)
        .bind(lease_seconds)
        .fetch_all(&mut *transaction)
        .await
        .map_err(|error| AppError::Internal(format!("failed to claim execution queue jobs: {error}")))?;

        transaction
            .commit()
            .await
            .map_err(|error| AppError::Internal(format!("failed to commit queue claim transaction: {error}")))?;

        Ok(rows.into_iter().map(ClaimedJobRow::into_claimed_job).collect())
    }

    /// Marks a claimed job as completed, removing it from future claims.
    pub async fn complete(&self, job_id: uuid::Uuid) -> AppResult<()> {
        sqlx::query("UPDATE execution_queue SET status = 'completed', updated_at = now() WHERE id = $1")
            .bind(job_id)
            .execute(&self.pool)
            .await
            .map_err(|error| AppError::Internal(format!("failed to complete execution queue job {job_id}: {error}")))?;
        Ok(())
    }
}

#[async_trait]
impl QueuePublisher for PostgresQueuePublisher {
    async fn publish(&self, message: ExecutionQueueMessage) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO execution_queue (tenant_id, execution_id, workflow_id, workflow_version, trigger_type, trigger_data)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(message.tenant_id.as_uuid())
        .bind(message.execution_id.as_uuid())
        .bind(message.workflow_id.as_uuid())
        .bind(message.workflow_version)
        .bind(message.trigger_type)
        .bind(message.trigger_data)
        .execute(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to publish execution queue message: {error}")))?;
        Ok(())
    }
}

/// One claimed row of the execution queue, ready for a worker to run.
#[derive(Debug, Clone)]
pub struct ClaimedJob {
    /// Queue row id, used to acknowledge completion.
    pub job_id: uuid::Uuid,
    /// Owning tenant.
    pub tenant_id: uuid::Uuid,
    /// Execution to run.
    pub execution_id: uuid::Uuid,
    /// Workflow the execution runs.
    pub workflow_id: uuid::Uuid,
    /// Frozen workflow definition version.
    pub workflow_version: i32,
    /// Trigger type that started the execution.
    pub trigger_type: String,
    /// Trigger payload, when carried inline.
    pub trigger_data: Option<Value>,
    /// Fencing token proving ownership of the lease.
    pub lease_token: Option<String>,
}

#[derive(FromRow)]
struct ClaimedJobRow {
    id: uuid::Uuid,
    tenant_id: uuid::Uuid,
    execution_id: uuid::Uuid,
    workflow_id: uuid::Uuid,
    workflow_version: i32,
    trigger_type: String,
    trigger_data: Option<Value>,
    lease_token: Option<String>,
}

impl ClaimedJobRow {
    fn into_claimed_job(self) -> ClaimedJob {
        ClaimedJob {
            job_id: self.id,
            tenant_id: self.tenant_id,
            execution_id: self.execution_id,
            workflow_id: self.workflow_id,
            workflow_version: self.workflow_version,
            trigger_type: self.trigger_type,
            trigger_data: self.trigger_data,
            lease_token: self.lease_token,
        }
    }
}
