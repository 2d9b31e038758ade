//! 任务存储仓储抽象
//!
//! 调度器通过这两个接口访问集群共享的持久化存储，
//! 节点间互斥不依赖选主，只依赖存储的原子抢占语义

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::entities::{AppRunRecord, AppRunStatus, JobKey, JobRecord, TriggerRecord};
use crate::errors::SchedulerResult;

/// 任务与触发器的集群共享存储
///
/// 实现方必须保证：
/// - `store_job` 对任务定义幂等覆盖，对触发器冲突返回 `JobAlreadyExists`
/// - `acquire_due_triggers` 是原子的，同一触发器同一时刻只会被一个节点取走
/// - `currently_executing` 反映全集群正在执行的任务标识
#[async_trait]
pub trait JobStore: Send + Sync {
    /// 存储任务与触发器
    ///
    /// 任务定义按主键覆盖写入；触发器只插入不覆盖，
    /// 主键冲突时整体回滚并返回 `SchedulerError::JobAlreadyExists`
    async fn store_job(&self, job: &JobRecord, trigger: &TriggerRecord) -> SchedulerResult<()>;

    async fn get_job(&self, key: &JobKey) -> SchedulerResult<Option<JobRecord>>;

    /// 删除任务及其触发器与执行中标记，不存在时返回 false
    async fn remove_job(&self, key: &JobKey) -> SchedulerResult<bool>;

    /// 原子抢占到期的触发器
    ///
    /// 把 `group` 分组内 `next_fire_time <= now` 且处于等待状态的
    /// 触发器置为已抢占并标记抢占节点，最多返回 `limit` 条
    async fn acquire_due_triggers(
        &self,
        group: &str,
        instance_id: &str,
        now: DateTime<Utc>,
        limit: u32,
    ) -> SchedulerResult<Vec<TriggerRecord>>;

    /// 登记任务进入执行，成为集群可见的执行中标记
    async fn mark_fired(
        &self,
        key: &JobKey,
        instance_id: &str,
        fire_time: DateTime<Utc>,
    ) -> SchedulerResult<()>;

    /// 执行结束后归还触发器
    ///
    /// `next_fire_time` 为 Some 时触发器回到等待状态；
    /// 为 None 时删除一次性任务及其触发器。两种情况都清除执行中标记
    async fn complete_trigger(
        &self,
        key: &JobKey,
        prev_fire_time: DateTime<Utc>,
        next_fire_time: Option<DateTime<Utc>>,
    ) -> SchedulerResult<()>;

    /// 归还未进入执行的触发器，不触碰执行中标记
    ///
    /// 用于抢到触发器之后、登记执行之前的回退路径。
    /// `next_fire_time` 为 Some 时触发器回到等待状态并顺延；
    /// 为 None 时删除触发器及其任务定义
    async fn release_trigger(
        &self,
        key: &JobKey,
        next_fire_time: Option<DateTime<Utc>>,
    ) -> SchedulerResult<()>;

    /// 枚举分组内全集群正在执行的任务标识
    async fn currently_executing(&self, group: &str) -> SchedulerResult<Vec<JobKey>>;

    /// 回收故障节点遗留的状态
    ///
    /// 抢占后超过 `stall_threshold` 仍未归还的触发器，任务可恢复时
    /// 回到等待状态，不可恢复时连同任务定义删除，不做重放；
    /// 同龄的执行中标记一并清除。返回重新排队的触发器数量
    async fn recover_stalled(
        &self,
        group: &str,
        now: DateTime<Utc>,
        stall_threshold: Duration,
    ) -> SchedulerResult<u32>;
}

/// 运行历史仓储
#[async_trait]
pub trait AppRunRepository: Send + Sync {
    async fn record_run_started(&self, record: &AppRunRecord) -> SchedulerResult<()>;

    async fn record_run_finished(
        &self,
        id: Uuid,
        status: AppRunStatus,
        finished_at: DateTime<Utc>,
        error_message: Option<&str>,
    ) -> SchedulerResult<()>;

    /// 按应用名倒序返回最近的运行记录
    async fn recent_runs(&self, app_name: &str, limit: i64) -> SchedulerResult<Vec<AppRunRecord>>;
}
