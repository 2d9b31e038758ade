//! 应用调度核心
//!
//! 持有调度器实例，负责注册、删除、手动触发与触发循环

pub mod cron_utils;
pub mod job_factory;
pub mod listener;
pub mod schedule_translator;
pub mod scheduler;

pub use job_factory::{AppConstructor, AppDependencies, AppJobFactory, NativeApp};
pub use listener::AppJobListener;
pub use scheduler::AppScheduler;
