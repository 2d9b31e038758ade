//! SQLite 方言实现，用于嵌入式单节点部署与测试

mod sqlite_app_run_repository;
mod sqlite_job_store;

pub use sqlite_app_run_repository::SqliteAppRunRepository;
pub use sqlite_job_store::SqliteJobStore;

use sqlx::SqlitePool;

use app_scheduler_domain::SchedulerResult;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS app_jobs (
        job_name    TEXT NOT NULL,
        job_group   TEXT NOT NULL,
        run_type    TEXT NOT NULL,
        app_payload TEXT NOT NULL,
        recoverable BOOLEAN NOT NULL,
        created_at  TEXT NOT NULL,
        PRIMARY KEY (job_name, job_group)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS app_triggers (
        trigger_name    TEXT NOT NULL,
        trigger_group   TEXT NOT NULL,
        cron_expression TEXT,
        next_fire_time  TEXT,
        prev_fire_time  TEXT,
        state           TEXT NOT NULL,
        acquired_by     TEXT,
        acquired_at     TEXT,
        PRIMARY KEY (trigger_name, trigger_group)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS app_fired_jobs (
        job_name    TEXT NOT NULL,
        job_group   TEXT NOT NULL,
        instance_id TEXT NOT NULL,
        fired_at    TEXT NOT NULL,
        PRIMARY KEY (job_name, job_group)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS app_run_records (
        id            TEXT PRIMARY KEY,
        app_name      TEXT NOT NULL,
        job_name      TEXT NOT NULL,
        job_group     TEXT NOT NULL,
        run_type      TEXT NOT NULL,
        status        TEXT NOT NULL,
        fire_time     TEXT NOT NULL,
        started_at    TEXT NOT NULL,
        finished_at   TEXT,
        error_message TEXT
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_app_run_records_app_name
        ON app_run_records (app_name, started_at DESC)
    "#,
];

pub async fn ensure_schema(pool: &SqlitePool) -> SchedulerResult<()> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}
