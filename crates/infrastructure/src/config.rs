//! 调度器配置
//!
//! 默认值沿用原平台调度器的默认调优：实例名 AppScheduler、
//! 10个工作线程、60秒misfire阈值、集群模式开启

use serde::{Deserialize, Serialize};

use app_scheduler_domain::{SchedulerError, SchedulerResult};

/// 任务存储的数据库方言
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStoreKind {
    Postgres,
    Sqlite,
}

/// 任务存储连接配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStoreConfig {
    pub kind: JobStoreKind,
    pub url: String,
    pub user: Option<String>,
    pub password: Option<String>,
    pub max_connections: u32,
    /// 超过该阈值的错过触发视为misfire，合并为一次补触发
    pub misfire_threshold_seconds: u64,
}

impl Default for JobStoreConfig {
    fn default() -> Self {
        Self {
            kind: JobStoreKind::Sqlite,
            url: "sqlite::memory:".to_string(),
            user: None,
            password: None,
            max_connections: 5,
            misfire_threshold_seconds: 60,
        }
    }
}

/// 调度器运行参数
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerTuning {
    pub instance_name: String,
    /// 工作线程池大小，所有应用共享
    pub thread_pool_size: usize,
    /// 触发循环的轮询间隔
    pub poll_interval_ms: u64,
    pub clustered: bool,
}

impl Default for SchedulerTuning {
    fn default() -> Self {
        Self {
            instance_name: "AppScheduler".to_string(),
            thread_pool_size: 10,
            poll_interval_ms: 1000,
            clustered: true,
        }
    }
}

/// 应用调度器完整配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppSchedulerConfig {
    #[serde(default)]
    pub job_store: JobStoreConfig,
    #[serde(default)]
    pub scheduler: SchedulerTuning,
}

impl AppSchedulerConfig {
    /// 从TOML文件加载，环境变量 `APP_SCHEDULER__*` 覆盖文件配置
    pub fn load(path: Option<&str>) -> SchedulerResult<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path));
        }
        let settings = builder
            .add_source(
                config::Environment::with_prefix("APP_SCHEDULER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| SchedulerError::configuration(format!("配置加载失败: {e}")))?;

        let config: Self = settings
            .try_deserialize()
            .map_err(|e| SchedulerError::configuration(format!("配置解析失败: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> SchedulerResult<()> {
        if self.job_store.url.trim().is_empty() {
            return Err(SchedulerError::configuration("任务存储URL不能为空"));
        }
        let url_matches_kind = match self.job_store.kind {
            JobStoreKind::Postgres => {
                self.job_store.url.starts_with("postgres://")
                    || self.job_store.url.starts_with("postgresql://")
            }
            JobStoreKind::Sqlite => self.job_store.url.starts_with("sqlite:"),
        };
        if !url_matches_kind {
            return Err(SchedulerError::configuration(format!(
                "任务存储URL与方言 {:?} 不匹配: {}",
                self.job_store.kind, self.job_store.url
            )));
        }
        if self.job_store.max_connections == 0 {
            return Err(SchedulerError::configuration("最大连接数必须大于0"));
        }
        if self.job_store.misfire_threshold_seconds == 0 {
            return Err(SchedulerError::configuration("misfire阈值必须大于0"));
        }
        if self.scheduler.thread_pool_size == 0 {
            return Err(SchedulerError::configuration("工作线程池大小必须大于0"));
        }
        if self.scheduler.poll_interval_ms == 0 {
            return Err(SchedulerError::configuration("轮询间隔必须大于0"));
        }
        Ok(())
    }

    /// 节点实例标识，集群内区分触发器的抢占者
    pub fn instance_id(&self) -> String {
        let host = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "unknown-host".to_string());
        format!(
            "{}-{}-{}",
            self.scheduler.instance_name,
            host,
            std::process::id()
        )
    }

    pub fn misfire_threshold(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.job_store.misfire_threshold_seconds as i64)
    }

    /// 故障节点状态的回收阈值，取misfire阈值的10倍
    pub fn recovery_threshold(&self) -> chrono::Duration {
        self.misfire_threshold() * 10
    }

    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.scheduler.poll_interval_ms)
    }
}
