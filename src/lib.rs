//! # 应用任务调度系统
//!
//! 元数据平台的后台应用调度器：把平台内注册的应用（搜索重建、
//! 数据质量巡检、用量统计等）按声明式的调度描述周期性运行，
//! 或者按需立即触发一次。多个服务节点共享同一个任务存储，
//! 同一应用在全集群内最多一个执行实例。
//!
//! 调度器以库的方式嵌入宿主进程，宿主负责提供元数据访问与
//! 搜索客户端句柄，并在启动时注册所有可运行的应用类型：
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use app_scheduler::{EmbeddedSchedulerApp, AppSchedulerConfig};
//!
//! # async fn example(
//! #     data_access: Arc<dyn app_scheduler::DataAccess>,
//! #     search_client: Arc<dyn app_scheduler::SearchClient>,
//! # ) -> anyhow::Result<()> {
//! let config = AppSchedulerConfig::default();
//! let handle = EmbeddedSchedulerApp::new(config)
//!     .start(data_access, search_client)
//!     .await?;
//!
//! // ... 注册应用类型、注册调度 ...
//!
//! handle.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod app;

pub use app::{init_logging, EmbeddedSchedulerApp, EmbeddedSchedulerHandle};

// 常用类型再导出，宿主通常只需要依赖本crate
pub use app_scheduler_core::{
    AppConstructor, AppDependencies, AppJobFactory, AppScheduler, NativeApp,
};
pub use app_scheduler_domain::{
    App, AppRunRecord, AppRunStatus, AppRunType, AppRuntime, AppSchedule, DataAccess, JobStore,
    RunContext, ScheduleType, SchedulerError, SchedulerResult, SearchClient,
};
pub use app_scheduler_infrastructure::{
    build_job_store, AppSchedulerConfig, JobStoreConfig, JobStoreHandles, JobStoreKind,
    SchedulerTuning,
};
