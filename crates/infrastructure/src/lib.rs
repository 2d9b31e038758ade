//! 应用调度基础设施层
//!
//! 提供配置加载与任务存储的数据库方言实现

pub mod config;
pub mod database;

pub use config::{AppSchedulerConfig, JobStoreConfig, JobStoreKind, SchedulerTuning};
pub use database::{build_job_store, JobStoreHandles};
