//! 任务存储的数据库方言实现
//!
//! 方言作为可注入的配置点，新增数据库只需补一组仓储实现

pub mod postgres;
pub mod sqlite;

use std::str::FromStr;
use std::sync::Arc;

use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tracing::info;

use app_scheduler_domain::{AppRunRepository, JobStore, SchedulerError, SchedulerResult};

use crate::config::{JobStoreConfig, JobStoreKind};

/// 按方言构建出的存储句柄
pub struct JobStoreHandles {
    pub job_store: Arc<dyn JobStore>,
    pub run_repository: Arc<dyn AppRunRepository>,
}

/// 按配置的方言连接数据库并初始化表结构
///
/// 存储不可达视为致命的配置错误，直接让初始化失败
pub async fn build_job_store(config: &JobStoreConfig) -> SchedulerResult<JobStoreHandles> {
    match config.kind {
        JobStoreKind::Postgres => {
            let mut options = PgConnectOptions::from_str(&config.url)
                .map_err(|e| SchedulerError::configuration(format!("任务存储URL无效: {e}")))?;
            if let Some(user) = &config.user {
                options = options.username(user);
            }
            if let Some(password) = &config.password {
                options = options.password(password);
            }
            let pool = PgPoolOptions::new()
                .max_connections(config.max_connections)
                .connect_with(options)
                .await
                .map_err(|e| {
                    SchedulerError::configuration(format!("任务存储连接失败: {e}"))
                })?;
            postgres::ensure_schema(&pool).await?;
            info!("任务存储已就绪: postgres");
            Ok(JobStoreHandles {
                job_store: Arc::new(postgres::PostgresJobStore::new(pool.clone())),
                run_repository: Arc::new(postgres::PostgresAppRunRepository::new(pool)),
            })
        }
        JobStoreKind::Sqlite => {
            let options = SqliteConnectOptions::from_str(&config.url)
                .map_err(|e| SchedulerError::configuration(format!("任务存储URL无效: {e}")))?
                .create_if_missing(true);
            let pool = SqlitePoolOptions::new()
                .max_connections(config.max_connections)
                .connect_with(options)
                .await
                .map_err(|e| {
                    SchedulerError::configuration(format!("任务存储连接失败: {e}"))
                })?;
            sqlite::ensure_schema(&pool).await?;
            info!("任务存储已就绪: sqlite");
            Ok(JobStoreHandles {
                job_store: Arc::new(sqlite::SqliteJobStore::new(pool.clone())),
                run_repository: Arc::new(sqlite::SqliteAppRunRepository::new(pool)),
            })
        }
    }
}
