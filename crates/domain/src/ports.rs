//! 宿主协作方端口
//!
//! 元数据访问与搜索客户端由宿主进程实现并注入，
//! 调度器只在初始化时做连通性检查，其余交给应用自身使用

use async_trait::async_trait;

use crate::errors::SchedulerResult;

/// 元数据存储访问句柄
#[async_trait]
pub trait DataAccess: Send + Sync {
    /// 连通性检查，初始化时连接参数无效应返回错误
    async fn health_check(&self) -> SchedulerResult<()>;
}

/// 搜索服务客户端
#[async_trait]
pub trait SearchClient: Send + Sync {
    async fn health_check(&self) -> SchedulerResult<()>;
}
