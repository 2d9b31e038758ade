//! PostgreSQL 方言实现，用于集群部署

mod postgres_app_run_repository;
mod postgres_job_store;

pub use postgres_app_run_repository::PostgresAppRunRepository;
pub use postgres_job_store::PostgresJobStore;

use sqlx::PgPool;

use app_scheduler_domain::SchedulerResult;

/// 建表语句随存储初始化执行，幂等
const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS app_jobs (
        job_name    VARCHAR NOT NULL,
        job_group   VARCHAR NOT NULL,
        run_type    VARCHAR NOT NULL,
        app_payload JSONB   NOT NULL,
        recoverable BOOLEAN NOT NULL,
        created_at  TIMESTAMPTZ NOT NULL,
        PRIMARY KEY (job_name, job_group)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS app_triggers (
        trigger_name    VARCHAR NOT NULL,
        trigger_group   VARCHAR NOT NULL,
        cron_expression VARCHAR,
        next_fire_time  TIMESTAMPTZ,
        prev_fire_time  TIMESTAMPTZ,
        state           VARCHAR NOT NULL,
        acquired_by     VARCHAR,
        acquired_at     TIMESTAMPTZ,
        PRIMARY KEY (trigger_name, trigger_group)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS app_fired_jobs (
        job_name    VARCHAR NOT NULL,
        job_group   VARCHAR NOT NULL,
        instance_id VARCHAR NOT NULL,
        fired_at    TIMESTAMPTZ NOT NULL,
        PRIMARY KEY (job_name, job_group)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS app_run_records (
        id            UUID PRIMARY KEY,
        app_name      VARCHAR NOT NULL,
        job_name      VARCHAR NOT NULL,
        job_group     VARCHAR NOT NULL,
        run_type      VARCHAR NOT NULL,
        status        VARCHAR NOT NULL,
        fire_time     TIMESTAMPTZ NOT NULL,
        started_at    TIMESTAMPTZ NOT NULL,
        finished_at   TIMESTAMPTZ,
        error_message TEXT
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_app_run_records_app_name
        ON app_run_records (app_name, started_at DESC)
    "#,
];

pub async fn ensure_schema(pool: &PgPool) -> SchedulerResult<()> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}
