use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::{PgPool, Row};
use tracing::{debug, instrument, warn};

use app_scheduler_domain::{
    AppRunType, JobKey, JobRecord, JobStore, SchedulerError, SchedulerResult, TriggerRecord,
    TriggerState,
};

pub struct PostgresJobStore {
    pool: PgPool,
}

impl PostgresJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_job(row: &sqlx::postgres::PgRow) -> SchedulerResult<JobRecord> {
        let run_type: String = row.try_get("run_type")?;
        Ok(JobRecord {
            key: JobKey {
                name: row.try_get("job_name")?,
                group: row.try_get("job_group")?,
            },
            run_type: AppRunType::parse(&run_type)?,
            app_payload: row.try_get("app_payload")?,
            recoverable: row.try_get("recoverable")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_trigger(row: &sqlx::postgres::PgRow) -> SchedulerResult<TriggerRecord> {
        let state: String = row.try_get("state")?;
        Ok(TriggerRecord {
            key: JobKey {
                name: row.try_get("trigger_name")?,
                group: row.try_get("trigger_group")?,
            },
            cron_expression: row.try_get("cron_expression")?,
            next_fire_time: row.try_get("next_fire_time")?,
            prev_fire_time: row.try_get("prev_fire_time")?,
            state: TriggerState::parse(&state)?,
            acquired_by: row.try_get("acquired_by")?,
        })
    }

    fn is_unique_violation(err: &sqlx::Error) -> bool {
        matches!(
            err,
            sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23505")
        )
    }
}

#[async_trait]
impl JobStore for PostgresJobStore {
    #[instrument(skip(self, job, trigger), fields(job_key = %job.key))]
    async fn store_job(&self, job: &JobRecord, trigger: &TriggerRecord) -> SchedulerResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO app_jobs (job_name, job_group, run_type, app_payload, recoverable, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (job_name, job_group) DO UPDATE
                SET run_type = EXCLUDED.run_type,
                    app_payload = EXCLUDED.app_payload,
                    recoverable = EXCLUDED.recoverable,
                    created_at = EXCLUDED.created_at
            "#,
        )
        .bind(&job.key.name)
        .bind(&job.key.group)
        .bind(job.run_type.as_str())
        .bind(&job.app_payload)
        .bind(job.recoverable)
        .bind(job.created_at)
        .execute(&mut *tx)
        .await?;

        // 触发器只插入不覆盖，冲突即说明同一任务/触发器对已存在
        let inserted = sqlx::query(
            r#"
            INSERT INTO app_triggers
                (trigger_name, trigger_group, cron_expression, next_fire_time, prev_fire_time, state, acquired_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(&trigger.key.name)
        .bind(&trigger.key.group)
        .bind(&trigger.cron_expression)
        .bind(trigger.next_fire_time)
        .bind(trigger.prev_fire_time)
        .bind(trigger.state.as_str())
        .bind(&trigger.acquired_by)
        .execute(&mut *tx)
        .await;

        match inserted {
            Ok(_) => {
                tx.commit().await?;
                debug!("任务 {} 已写入存储", job.key);
                Ok(())
            }
            Err(e) if Self::is_unique_violation(&e) => {
                tx.rollback().await?;
                Err(SchedulerError::JobAlreadyExists {
                    key: trigger.key.to_string(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get_job(&self, key: &JobKey) -> SchedulerResult<Option<JobRecord>> {
        let row = sqlx::query(
            "SELECT job_name, job_group, run_type, app_payload, recoverable, created_at \
             FROM app_jobs WHERE job_name = $1 AND job_group = $2",
        )
        .bind(&key.name)
        .bind(&key.group)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_job).transpose()
    }

    #[instrument(skip(self), fields(job_key = %key))]
    async fn remove_job(&self, key: &JobKey) -> SchedulerResult<bool> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM app_triggers WHERE trigger_name = $1 AND trigger_group = $2")
            .bind(&key.name)
            .bind(&key.group)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM app_fired_jobs WHERE job_name = $1 AND job_group = $2")
            .bind(&key.name)
            .bind(&key.group)
            .execute(&mut *tx)
            .await?;
        let deleted = sqlx::query("DELETE FROM app_jobs WHERE job_name = $1 AND job_group = $2")
            .bind(&key.name)
            .bind(&key.group)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(deleted.rows_affected() > 0)
    }

    async fn acquire_due_triggers(
        &self,
        group: &str,
        instance_id: &str,
        now: DateTime<Utc>,
        limit: u32,
    ) -> SchedulerResult<Vec<TriggerRecord>> {
        // SKIP LOCKED 保证多节点并发扫描时每个触发器只被一个节点取走
        let rows = sqlx::query(
            r#"
            UPDATE app_triggers
            SET state = 'ACQUIRED', acquired_by = $1, acquired_at = $2
            WHERE (trigger_name, trigger_group) IN (
                SELECT trigger_name, trigger_group FROM app_triggers
                WHERE trigger_group = $3
                  AND state = 'WAITING'
                  AND next_fire_time IS NOT NULL
                  AND next_fire_time <= $2
                ORDER BY next_fire_time ASC
                LIMIT $4
                FOR UPDATE SKIP LOCKED
            )
            RETURNING trigger_name, trigger_group, cron_expression,
                      next_fire_time, prev_fire_time, state, acquired_by
            "#,
        )
        .bind(instance_id)
        .bind(now)
        .bind(group)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_trigger).collect()
    }

    async fn mark_fired(
        &self,
        key: &JobKey,
        instance_id: &str,
        fire_time: DateTime<Utc>,
    ) -> SchedulerResult<()> {
        let result = sqlx::query(
            "INSERT INTO app_fired_jobs (job_name, job_group, instance_id, fired_at) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(&key.name)
        .bind(&key.group)
        .bind(instance_id)
        .bind(fire_time)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if Self::is_unique_violation(&e) => Err(SchedulerError::JobAlreadyExists {
                key: key.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn complete_trigger(
        &self,
        key: &JobKey,
        prev_fire_time: DateTime<Utc>,
        next_fire_time: Option<DateTime<Utc>>,
    ) -> SchedulerResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM app_fired_jobs WHERE job_name = $1 AND job_group = $2")
            .bind(&key.name)
            .bind(&key.group)
            .execute(&mut *tx)
            .await?;

        match next_fire_time {
            Some(next) => {
                sqlx::query(
                    r#"
                    UPDATE app_triggers
                    SET state = 'WAITING', acquired_by = NULL, acquired_at = NULL,
                        prev_fire_time = $3, next_fire_time = $4
                    WHERE trigger_name = $1 AND trigger_group = $2
                    "#,
                )
                .bind(&key.name)
                .bind(&key.group)
                .bind(prev_fire_time)
                .bind(next)
                .execute(&mut *tx)
                .await?;
            }
            None => {
                // 一次性触发器：执行结束即连同任务定义一并清除
                sqlx::query(
                    "DELETE FROM app_triggers WHERE trigger_name = $1 AND trigger_group = $2",
                )
                .bind(&key.name)
                .bind(&key.group)
                .execute(&mut *tx)
                .await?;
                sqlx::query("DELETE FROM app_jobs WHERE job_name = $1 AND job_group = $2")
                    .bind(&key.name)
                    .bind(&key.group)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        tx.commit().await?;
        Ok(())
    }

    async fn release_trigger(
        &self,
        key: &JobKey,
        next_fire_time: Option<DateTime<Utc>>,
    ) -> SchedulerResult<()> {
        match next_fire_time {
            Some(next) => {
                sqlx::query(
                    r#"
                    UPDATE app_triggers
                    SET state = 'WAITING', acquired_by = NULL, acquired_at = NULL,
                        next_fire_time = $3
                    WHERE trigger_name = $1 AND trigger_group = $2
                    "#,
                )
                .bind(&key.name)
                .bind(&key.group)
                .bind(next)
                .execute(&self.pool)
                .await?;
            }
            None => {
                let mut tx = self.pool.begin().await?;
                sqlx::query(
                    "DELETE FROM app_triggers WHERE trigger_name = $1 AND trigger_group = $2",
                )
                .bind(&key.name)
                .bind(&key.group)
                .execute(&mut *tx)
                .await?;
                sqlx::query("DELETE FROM app_jobs WHERE job_name = $1 AND job_group = $2")
                    .bind(&key.name)
                    .bind(&key.group)
                    .execute(&mut *tx)
                    .await?;
                tx.commit().await?;
            }
        }
        Ok(())
    }

    async fn currently_executing(&self, group: &str) -> SchedulerResult<Vec<JobKey>> {
        let rows =
            sqlx::query("SELECT job_name, job_group FROM app_fired_jobs WHERE job_group = $1")
                .bind(group)
                .fetch_all(&self.pool)
                .await?;

        rows.iter()
            .map(|row| {
                Ok(JobKey {
                    name: row.try_get("job_name")?,
                    group: row.try_get("job_group")?,
                })
            })
            .collect()
    }

    async fn recover_stalled(
        &self,
        group: &str,
        now: DateTime<Utc>,
        stall_threshold: Duration,
    ) -> SchedulerResult<u32> {
        let cutoff = now - stall_threshold;
        let mut tx = self.pool.begin().await?;

        // 不可恢复任务（如手动触发）不重放：连同任务定义一并清除
        let dropped = sqlx::query(
            r#"
            DELETE FROM app_triggers
            WHERE (trigger_name, trigger_group) IN (
                SELECT t.trigger_name, t.trigger_group
                FROM app_triggers t
                JOIN app_jobs j
                    ON j.job_name = t.trigger_name AND j.job_group = t.trigger_group
                WHERE t.trigger_group = $1
                  AND t.state = 'ACQUIRED'
                  AND t.acquired_at < $2
                  AND NOT j.recoverable
            )
            "#,
        )
        .bind(group)
        .bind(cutoff)
        .execute(&mut *tx)
        .await?;
        sqlx::query(
            r#"
            DELETE FROM app_jobs
            WHERE job_group = $1 AND NOT recoverable
              AND (job_name, job_group) NOT IN (
                  SELECT trigger_name, trigger_group FROM app_triggers
              )
            "#,
        )
        .bind(group)
        .execute(&mut *tx)
        .await?;

        let released = sqlx::query(
            r#"
            UPDATE app_triggers
            SET state = 'WAITING', acquired_by = NULL, acquired_at = NULL
            WHERE trigger_group = $1 AND state = 'ACQUIRED' AND acquired_at < $2
            "#,
        )
        .bind(group)
        .bind(cutoff)
        .execute(&mut *tx)
        .await?;

        let cleared = sqlx::query(
            "DELETE FROM app_fired_jobs WHERE job_group = $1 AND fired_at < $2",
        )
        .bind(group)
        .bind(cutoff)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        let recovered = released.rows_affected() as u32;
        if recovered > 0 || dropped.rows_affected() > 0 || cleared.rows_affected() > 0 {
            warn!(
                "回收了 {} 个滞留触发器，丢弃了 {} 个不可恢复触发器，清除了 {} 个执行中标记",
                recovered,
                dropped.rows_affected(),
                cleared.rows_affected()
            );
        }
        Ok(recovered)
    }
}
