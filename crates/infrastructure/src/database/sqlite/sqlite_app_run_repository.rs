use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use tracing::instrument;
use uuid::Uuid;

use app_scheduler_domain::{
    AppRunRecord, AppRunRepository, AppRunStatus, AppRunType, JobKey, SchedulerError,
    SchedulerResult,
};

pub struct SqliteAppRunRepository {
    pool: SqlitePool,
}

impl SqliteAppRunRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> SchedulerResult<AppRunRecord> {
        let id: String = row.try_get("id")?;
        let run_type: String = row.try_get("run_type")?;
        let status: String = row.try_get("status")?;
        Ok(AppRunRecord {
            id: Uuid::parse_str(&id)
                .map_err(|e| SchedulerError::Internal(format!("运行记录ID无效: {e}")))?,
            app_name: row.try_get("app_name")?,
            job_key: JobKey {
                name: row.try_get("job_name")?,
                group: row.try_get("job_group")?,
            },
            run_type: AppRunType::parse(&run_type)?,
            status: AppRunStatus::parse(&status)?,
            fire_time: row.try_get("fire_time")?,
            started_at: row.try_get("started_at")?,
            finished_at: row.try_get("finished_at")?,
            error_message: row.try_get("error_message")?,
        })
    }
}

#[async_trait]
impl AppRunRepository for SqliteAppRunRepository {
    #[instrument(skip(self, record), fields(app_name = %record.app_name, run_id = %record.id))]
    async fn record_run_started(&self, record: &AppRunRecord) -> SchedulerResult<()> {
        sqlx::query(
            r#"
            INSERT INTO app_run_records
                (id, app_name, job_name, job_group, run_type, status,
                 fire_time, started_at, finished_at, error_message)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(record.id.to_string())
        .bind(&record.app_name)
        .bind(&record.job_key.name)
        .bind(&record.job_key.group)
        .bind(record.run_type.as_str())
        .bind(record.status.as_str())
        .bind(record.fire_time)
        .bind(record.started_at)
        .bind(record.finished_at)
        .bind(&record.error_message)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_run_finished(
        &self,
        id: Uuid,
        status: AppRunStatus,
        finished_at: DateTime<Utc>,
        error_message: Option<&str>,
    ) -> SchedulerResult<()> {
        sqlx::query(
            "UPDATE app_run_records SET status = $2, finished_at = $3, error_message = $4 \
             WHERE id = $1",
        )
        .bind(id.to_string())
        .bind(status.as_str())
        .bind(finished_at)
        .bind(error_message)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn recent_runs(&self, app_name: &str, limit: i64) -> SchedulerResult<Vec<AppRunRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, app_name, job_name, job_group, run_type, status,
                   fire_time, started_at, finished_at, error_message
            FROM app_run_records
            WHERE app_name = $1
            ORDER BY started_at DESC
            LIMIT $2
            "#,
        )
        .bind(app_name)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_record).collect()
    }
}
