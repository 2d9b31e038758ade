//! 嵌入式调度器宿主
//!
//! 把配置加载、存储连接与调度器启动串成一次初始化，
//! 宿主进程拿到句柄后注册应用类型即可开始调度

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use app_scheduler_core::{AppDependencies, AppJobFactory, AppScheduler};
use app_scheduler_domain::{DataAccess, SearchClient};
use app_scheduler_infrastructure::{build_job_store, AppSchedulerConfig};

/// 初始化日志系统
pub fn init_logging(log_level: &str, log_format: &str) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    let registry = tracing_subscriber::registry().with(env_filter);

    match log_format {
        "json" => {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .try_init()
                .context("初始化JSON日志格式失败")?;
        }
        "pretty" => {
            registry
                .with(tracing_subscriber::fmt::layer().pretty())
                .try_init()
                .context("初始化Pretty日志格式失败")?;
        }
        _ => {
            return Err(anyhow::anyhow!("不支持的日志格式: {log_format}"));
        }
    }

    Ok(())
}

/// 嵌入式调度器应用
pub struct EmbeddedSchedulerApp {
    config: AppSchedulerConfig,
}

impl EmbeddedSchedulerApp {
    pub fn new(config: AppSchedulerConfig) -> Self {
        Self { config }
    }

    /// 从TOML配置文件创建，环境变量 `APP_SCHEDULER__*` 覆盖文件配置
    pub fn from_file(path: &str) -> Result<Self> {
        let config = AppSchedulerConfig::load(Some(path))
            .with_context(|| format!("加载配置文件失败: {path}"))?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &AppSchedulerConfig {
        &self.config
    }

    /// 连接任务存储并启动调度器
    ///
    /// 元数据访问与搜索客户端由宿主注入，调度器只在初始化时
    /// 做连通性检查，其余交给应用自身使用
    pub async fn start(
        self,
        data_access: Arc<dyn DataAccess>,
        search_client: Arc<dyn SearchClient>,
    ) -> Result<EmbeddedSchedulerHandle> {
        info!("初始化嵌入式应用调度器");

        let handles = build_job_store(&self.config.job_store)
            .await
            .context("任务存储初始化失败")?;
        let deps = AppDependencies {
            data_access,
            search_client,
        };
        let scheduler = AppScheduler::initialize(
            &self.config,
            handles.job_store,
            handles.run_repository,
            deps,
        )
        .await
        .context("调度器初始化失败")?;

        Ok(EmbeddedSchedulerHandle { scheduler })
    }
}

/// 运行中调度器的句柄
pub struct EmbeddedSchedulerHandle {
    scheduler: Arc<AppScheduler>,
}

impl EmbeddedSchedulerHandle {
    pub fn scheduler(&self) -> &Arc<AppScheduler> {
        &self.scheduler
    }

    /// 应用类型注册表
    pub fn job_factory(&self) -> &Arc<AppJobFactory> {
        self.scheduler.job_factory()
    }

    /// 优雅停止调度器并等待在途任务退场
    pub async fn shutdown(self) -> Result<()> {
        self.scheduler.shutdown().await.context("调度器停止失败")?;
        Ok(())
    }
}
