//! 应用调度领域层
//!
//! 定义应用、任务标识、触发器、运行记录等核心实体，
//! 以及任务存储的仓储抽象接口

pub mod entities;
pub mod errors;
pub mod ports;
pub mod repositories;

pub use entities::*;
pub use errors::{SchedulerError, SchedulerResult};
pub use ports::{DataAccess, SearchClient};
pub use repositories::{AppRunRepository, JobStore};
