//! Orbitflow execution worker.
//!
//! Polls the Postgres execution queue for leased jobs and runs each one
//! through the shared [`Executor`]. Falls back to an in-memory store with no
//! queue polling when `DATABASE_URL` is unset, so the binary stays runnable
//! for local smoke-testing without a database.

#![forbid(unsafe_code)]

use std::env;
use std::sync::Arc;
use std::time::Duration;

use orbitflow_application::Executor;
use orbitflow_core::{AppError, AppResult, ExecutionId, TenantId};
use orbitflow_infrastructure::{InMemoryStore, PostgresQueuePublisher, PostgresStore};
use orbitflow_runtime::Cancellation;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone)]
struct WorkerConfig {
    database_url: Option<String>,
    worker_id: String,
    claim_limit: i64,
    max_concurrency: usize,
    lease_seconds: i64,
    poll_interval_ms: u64,
}

impl WorkerConfig {
    fn load() -> AppResult<Self> {
        let database_url = env::var("DATABASE_URL")
            .ok()
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty());
        let worker_id = env::var("WORKER_ID")
            .ok()
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| format!("worker-{}", std::process::id()));
        let claim_limit = parse_env_i64("WORKER_CLAIM_LIMIT", 10)?;
        let max_concurrency = parse_env_usize("WORKER_MAX_CONCURRENCY", 4)?;
        let lease_seconds = parse_env_i64("WORKER_LEASE_SECONDS", 30)?;
        let poll_interval_ms = parse_env_u64("WORKER_POLL_INTERVAL_MS", 1500)?;

        if claim_limit <= 0 {
            return Err(AppError::Validation(
                "WORKER_CLAIM_LIMIT must be greater than zero".to_owned(),
            ));
        }
        if max_concurrency == 0 {
            return Err(AppError::Validation(
                "WORKER_MAX_CONCURRENCY must be greater than zero".to_owned(),
            ));
        }
        if lease_seconds <= 0 {
            return Err(AppError::Validation(
                "WORKER_LEASE_SECONDS must be greater than zero".to_owned(),
            ));
        }
        if poll_interval_ms == 0 {
            return Err(AppError::Validation(
                "WORKER_POLL_INTERVAL_MS must be greater than zero".to_owned(),
            ));
        }

        Ok(Self {
            database_url,
            worker_id,
            claim_limit,
            max_concurrency,
            lease_seconds,
            poll_interval_ms,
        })
    }
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = WorkerConfig::load()?;

    match &config.database_url {
        Some(database_url) => run_postgres_backed(&config, database_url.as_str()).await,
        None => run_in_memory(&config).await,
    }
}

async fn run_postgres_backed(config: &WorkerConfig, database_url: &str) -> Result<(), AppError> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_concurrency.max(1) as u32 + 1)
        .connect(database_url)
        .await
        .map_err(|error| AppError::Internal(format!("failed to connect to database: {error}")))?;

    sqlx::migrate!("../../crates/infrastructure/migrations")
        .run(&pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to run migrations: {error}")))?;

    let store = Arc::new(PostgresStore::new(pool.clone()));
    let executor = Arc::new(Executor::new(store));
    let queue = Arc::new(PostgresQueuePublisher::new(pool));

    info!(
        worker_id = %config.worker_id,
        claim_limit = config.claim_limit,
        max_concurrency = config.max_concurrency,
        lease_seconds = config.lease_seconds,
        poll_interval_ms = config.poll_interval_ms,
        "orbitflow worker started"
    );

    let mut shutdown = std::pin::pin!(tokio::signal::ctrl_c());
    let mut in_flight = tokio::task::JoinSet::new();

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!(worker_id = %config.worker_id, "shutdown signal received, draining in-flight jobs");
                break;
            }
            () = tokio::time::sleep(Duration::from_millis(config.poll_interval_ms)) => {}
        }

        while in_flight.len() < config.max_concurrency {
            let capacity = (config.max_concurrency - in_flight.len()) as i64;
            let claimed = match queue
                .claim(config.worker_id.as_str(), config.claim_limit.min(capacity), config.lease_seconds)
                .await
            {
                Ok(jobs) => jobs,
                Err(error) => {
                    warn!(worker_id = %config.worker_id, error = %error, "failed to claim execution queue jobs");
                    break;
                }
            };
            if claimed.is_empty() {
                break;
            }

            for job in claimed {
                let executor = Arc::clone(&executor);
                let queue = Arc::clone(&queue);
                let worker_id = config.worker_id.clone();
                in_flight.spawn(async move {
                    let tenant_id = TenantId::from_uuid(job.tenant_id);
                    let execution_id = ExecutionId::from_uuid(job.execution_id);
                    match executor.run(tenant_id, execution_id, Cancellation::new()).await {
                        Ok(()) => {
                            if let Err(error) = queue.complete(job.job_id).await {
                                warn!(worker_id = %worker_id, job_id = %job.job_id, error = %error, "failed to mark queue job completed");
                            }
                        }
                        Err(error) => {
                            warn!(worker_id = %worker_id, job_id = %job.job_id, execution_id = %execution_id, error = %error, "execution failed");
                        }
                    }
                });
            }
        }

        while let Some(outcome) = in_flight.try_join_next() {
            if let Err(error) = outcome {
                warn!(worker_id = %config.worker_id, error = %error, "execution task panicked");
            }
        }
    }

    while in_flight.join_next().await.is_some() {}
    Ok(())
}

async fn run_in_memory(config: &WorkerConfig) -> Result<(), AppError> {
    let store = Arc::new(InMemoryStore::new());
    let _executor = Executor::new(store);

    info!(
        worker_id = %config.worker_id,
        "DATABASE_URL not set; running with an in-memory store and no queue to poll"
    );

    tokio::signal::ctrl_c()
        .await
        .map_err(|error| AppError::Internal(format!("failed to listen for shutdown signal: {error}")))?;
    info!(worker_id = %config.worker_id, "shutdown signal received");
    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

fn parse_env_usize(name: &str, default: usize) -> AppResult<usize> {
    match env::var(name) {
        Ok(value) => value
            .parse::<usize>()
            .map_err(|error| AppError::Validation(format!("invalid {name} value '{value}': {error}"))),
        Err(_) => Ok(default),
    }
}

fn parse_env_i64(name: &str, default: i64) -> AppResult<i64> {
    match env::var(name) {
        Ok(value) => value
            .parse::<i64>()
            .map_err(|error| AppError::Validation(format!("invalid {name} value '{value}': {error}"))),
        Err(_) => Ok(default),
    }
}

fn parse_env_u64(name: &str, default: u64) -> AppResult<u64> {
    match env::var(name) {
        Ok(value) => value
            .parse::<u64>()
            .map_err(|error| AppError::Validation(format!("invalid {name} value '{value}': {error}"))),
        Err(_) => Ok(default),
    }
}
