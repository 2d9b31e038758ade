//! 任务生命周期监听器
//!
//! 只观察调度器自有分组内的任务，把运行的开始与结束
//! （成功/失败/被否决）落盘为运行历史。
//! 监听器自身的失败只记日志，绝不中断任务执行

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use app_scheduler_domain::{
    AppRunRecord, AppRunRepository, AppRunStatus, RunContext, SchedulerResult, APPS_JOB_GROUP,
};

pub struct AppJobListener {
    run_repository: Arc<dyn AppRunRepository>,
    group: String,
}

impl AppJobListener {
    pub fn new(run_repository: Arc<dyn AppRunRepository>) -> Self {
        Self {
            run_repository,
            group: APPS_JOB_GROUP.to_string(),
        }
    }

    /// 是否归本监听器观察，其他分组的任务不受影响
    fn owns(&self, ctx: &RunContext) -> bool {
        ctx.job_key.group == self.group
    }

    /// 运行开始，返回本次运行的记录
    ///
    /// 落盘失败只告警，记录仍在内存中用于后续的结束更新
    pub async fn job_to_be_executed(&self, ctx: &RunContext) -> AppRunRecord {
        let record = AppRunRecord::started(ctx);
        if !self.owns(ctx) {
            return record;
        }

        if let Err(e) = self.run_repository.record_run_started(&record).await {
            warn!("记录应用 {} 的运行开始失败: {}", ctx.app.name, e);
        } else {
            debug!(
                "应用 {} 开始执行，触发方式: {}",
                ctx.app.name,
                ctx.run_type.as_str()
            );
        }
        record
    }

    /// 运行结束，按执行结果落盘成功或失败
    pub async fn job_was_executed(
        &self,
        ctx: &RunContext,
        record: &AppRunRecord,
        result: &SchedulerResult<()>,
    ) {
        if !self.owns(ctx) {
            return;
        }

        let (status, error_message) = match result {
            Ok(()) => (AppRunStatus::Success, None),
            Err(e) => (AppRunStatus::Failed, Some(e.to_string())),
        };
        if let Err(e) = self
            .run_repository
            .record_run_finished(record.id, status, Utc::now(), error_message.as_deref())
            .await
        {
            warn!("记录应用 {} 的运行结束失败: {}", ctx.app.name, e);
        }
    }

    /// 运行被否决，任务在触发时已不满足执行条件
    pub async fn job_execution_vetoed(&self, ctx: &RunContext) {
        if !self.owns(ctx) {
            return;
        }

        let record = AppRunRecord::vetoed(ctx);
        if let Err(e) = self.run_repository.record_run_started(&record).await {
            warn!("记录应用 {} 的否决运行失败: {}", ctx.app.name, e);
        }
    }
}
