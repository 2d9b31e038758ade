use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{SchedulerError, SchedulerResult};

/// 调度器专属的任务分组，与共享同一存储的其他任务隔离；
/// 触发器沿用同一分组
pub const APPS_JOB_GROUP: &str = "OMAppsJobGroup";
/// 手动触发任务标识的后缀
pub const ON_DEMAND_SUFFIX: &str = "OnDemand";

/// 任务触发方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AppRunType {
    Scheduled,
    OnDemand,
}

impl AppRunType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppRunType::Scheduled => "Scheduled",
            AppRunType::OnDemand => "OnDemand",
        }
    }

    pub fn parse(s: &str) -> SchedulerResult<Self> {
        match s {
            "Scheduled" => Ok(AppRunType::Scheduled),
            "OnDemand" => Ok(AppRunType::OnDemand),
            other => Err(SchedulerError::Internal(format!(
                "未知的触发方式: {other}"
            ))),
        }
    }
}

/// 调度类型
///
/// `Unknown` 兜底反序列化时遇到的损坏/未来新增的类型，
/// 在注册时会被显式拒绝而不是延迟到首次触发
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScheduleType {
    Hourly,
    Daily,
    Weekly,
    Monthly,
    Custom,
    #[serde(other)]
    Unknown,
}

/// 应用的调度描述
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppSchedule {
    pub schedule_type: ScheduleType,
    /// 仅 Custom 类型使用，UNIX 五段 cron 方言
    pub cron_expression: Option<String>,
}

impl AppSchedule {
    pub fn hourly() -> Self {
        Self {
            schedule_type: ScheduleType::Hourly,
            cron_expression: None,
        }
    }
    pub fn daily() -> Self {
        Self {
            schedule_type: ScheduleType::Daily,
            cron_expression: None,
        }
    }
    pub fn weekly() -> Self {
        Self {
            schedule_type: ScheduleType::Weekly,
            cron_expression: None,
        }
    }
    pub fn monthly() -> Self {
        Self {
            schedule_type: ScheduleType::Monthly,
            cron_expression: None,
        }
    }
    pub fn custom<S: Into<String>>(cron_expression: S) -> Self {
        Self {
            schedule_type: ScheduleType::Custom,
            cron_expression: Some(cron_expression.into()),
        }
    }
}

/// 应用运行时状态
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppRuntime {
    pub enabled: bool,
}

/// 应用描述
///
/// 一个可被调度运行的后台作业单元，`app_type` 对应
/// 任务工厂注册表中的可运行单元标识
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct App {
    pub name: String,
    pub app_type: String,
    pub schedule: AppSchedule,
    pub runtime: AppRuntime,
    /// 透传给可运行单元的配置负载
    pub app_configuration: serde_json::Value,
}

impl App {
    pub fn new<S: Into<String>>(name: S, app_type: S, schedule: AppSchedule) -> Self {
        Self {
            name: name.into(),
            app_type: app_type.into(),
            schedule,
            runtime: AppRuntime { enabled: true },
            app_configuration: serde_json::Value::Null,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.runtime.enabled
    }
}

/// 任务标识，(name, group) 二元组在存储中唯一
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobKey {
    pub name: String,
    pub group: String,
}

impl JobKey {
    /// 周期调度任务的标识
    pub fn scheduled(app_name: &str) -> Self {
        Self {
            name: app_name.to_string(),
            group: APPS_JOB_GROUP.to_string(),
        }
    }

    /// 手动触发任务的标识，与周期任务在存储中互不冲突
    pub fn on_demand(app_name: &str) -> Self {
        Self {
            name: format!("{}-{}", app_name, ON_DEMAND_SUFFIX),
            group: APPS_JOB_GROUP.to_string(),
        }
    }

    /// 同一应用的另一个任务标识
    ///
    /// 周期标识与手动触发标识互为对方的兄弟标识，
    /// 应用级互斥需要同时检查两者
    pub fn sibling(&self) -> Self {
        let suffix = format!("-{ON_DEMAND_SUFFIX}");
        match self.name.strip_suffix(&suffix) {
            Some(base) => Self {
                name: base.to_string(),
                group: self.group.clone(),
            },
            None => Self {
                name: format!("{}-{}", self.name, ON_DEMAND_SUFFIX),
                group: self.group.clone(),
            },
        }
    }
}

impl std::fmt::Display for JobKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.group, self.name)
    }
}

/// 持久化的任务定义
///
/// 负载中携带序列化后的应用描述与触发方式标记，
/// 触发时由此还原出完整的运行上下文
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub key: JobKey,
    pub run_type: AppRunType,
    pub app_payload: serde_json::Value,
    /// 节点故障后是否允许恢复重放
    pub recoverable: bool,
    pub created_at: DateTime<Utc>,
}

impl JobRecord {
    pub fn scheduled(app: &App) -> SchedulerResult<Self> {
        Ok(Self {
            key: JobKey::scheduled(&app.name),
            run_type: AppRunType::Scheduled,
            app_payload: serde_json::to_value(app)?,
            recoverable: true,
            created_at: Utc::now(),
        })
    }

    pub fn on_demand(app: &App) -> SchedulerResult<Self> {
        Ok(Self {
            key: JobKey::on_demand(&app.name),
            run_type: AppRunType::OnDemand,
            app_payload: serde_json::to_value(app)?,
            recoverable: false,
            created_at: Utc::now(),
        })
    }

    /// 从负载还原应用描述
    pub fn app(&self) -> SchedulerResult<App> {
        Ok(serde_json::from_value(self.app_payload.clone())?)
    }
}

/// 触发器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerState {
    /// 等待到期
    Waiting,
    /// 已被某个节点原子抢占，尚未进入执行
    Acquired,
}

impl TriggerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerState::Waiting => "WAITING",
            TriggerState::Acquired => "ACQUIRED",
        }
    }

    pub fn parse(s: &str) -> SchedulerResult<Self> {
        match s {
            "WAITING" => Ok(TriggerState::Waiting),
            "ACQUIRED" => Ok(TriggerState::Acquired),
            other => Err(SchedulerError::Internal(format!(
                "未知的触发器状态: {other}"
            ))),
        }
    }
}

/// 持久化的触发器定义
///
/// `cron_expression` 为空表示立即触发的一次性触发器，
/// 执行完成后与任务定义一并删除
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerRecord {
    pub key: JobKey,
    pub cron_expression: Option<String>,
    pub next_fire_time: Option<DateTime<Utc>>,
    pub prev_fire_time: Option<DateTime<Utc>>,
    pub state: TriggerState,
    pub acquired_by: Option<String>,
}

impl TriggerRecord {
    /// 周期cron触发器
    pub fn cron(key: JobKey, cron_expression: String, first_fire: DateTime<Utc>) -> Self {
        Self {
            key,
            cron_expression: Some(cron_expression),
            next_fire_time: Some(first_fire),
            prev_fire_time: None,
            state: TriggerState::Waiting,
            acquired_by: None,
        }
    }

    /// 立即触发的一次性触发器
    pub fn immediate(key: JobKey, now: DateTime<Utc>) -> Self {
        Self {
            key,
            cron_expression: None,
            next_fire_time: Some(now),
            prev_fire_time: None,
            state: TriggerState::Waiting,
            acquired_by: None,
        }
    }

    pub fn is_one_shot(&self) -> bool {
        self.cron_expression.is_none()
    }
}

/// 单次触发的瞬态运行上下文，随运行结束丢弃
#[derive(Debug, Clone)]
pub struct RunContext {
    pub job_key: JobKey,
    pub run_type: AppRunType,
    pub fire_time: DateTime<Utc>,
    pub app: App,
}

/// 运行记录状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AppRunStatus {
    Started,
    Success,
    Failed,
    Vetoed,
}

impl AppRunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppRunStatus::Started => "STARTED",
            AppRunStatus::Success => "SUCCESS",
            AppRunStatus::Failed => "FAILED",
            AppRunStatus::Vetoed => "VETOED",
        }
    }

    pub fn parse(s: &str) -> SchedulerResult<Self> {
        match s {
            "STARTED" => Ok(AppRunStatus::Started),
            "SUCCESS" => Ok(AppRunStatus::Success),
            "FAILED" => Ok(AppRunStatus::Failed),
            "VETOED" => Ok(AppRunStatus::Vetoed),
            other => Err(SchedulerError::Internal(format!(
                "未知的运行状态: {other}"
            ))),
        }
    }
}

/// 运行历史记录，按任务标识与触发时间定位一次执行
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppRunRecord {
    pub id: Uuid,
    pub app_name: String,
    pub job_key: JobKey,
    pub run_type: AppRunType,
    pub status: AppRunStatus,
    pub fire_time: DateTime<Utc>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

impl AppRunRecord {
    pub fn started(ctx: &RunContext) -> Self {
        Self {
            id: Uuid::new_v4(),
            app_name: ctx.app.name.clone(),
            job_key: ctx.job_key.clone(),
            run_type: ctx.run_type,
            status: AppRunStatus::Started,
            fire_time: ctx.fire_time,
            started_at: Utc::now(),
            finished_at: None,
            error_message: None,
        }
    }

    pub fn vetoed(ctx: &RunContext) -> Self {
        let mut record = Self::started(ctx);
        record.status = AppRunStatus::Vetoed;
        record.finished_at = Some(record.started_at);
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_on_demand_key_disjoint_from_scheduled() {
        let scheduled = JobKey::scheduled("reindex-app");
        let on_demand = JobKey::on_demand("reindex-app");
        assert_eq!(scheduled.name, "reindex-app");
        assert_eq!(on_demand.name, "reindex-app-OnDemand");
        assert_eq!(scheduled.group, APPS_JOB_GROUP);
        assert_eq!(on_demand.group, APPS_JOB_GROUP);
        assert_ne!(scheduled, on_demand);
    }

    #[test]
    fn test_sibling_maps_between_both_identities() {
        let scheduled = JobKey::scheduled("reindex-app");
        let on_demand = JobKey::on_demand("reindex-app");
        assert_eq!(scheduled.sibling(), on_demand);
        assert_eq!(on_demand.sibling(), scheduled);
    }

    #[test]
    fn test_job_record_round_trips_app_payload() {
        let app = App::new("reindex-app", "search-reindex", AppSchedule::hourly());
        let record = JobRecord::scheduled(&app).unwrap();
        assert_eq!(record.run_type, AppRunType::Scheduled);
        assert!(record.recoverable);
        assert_eq!(record.app().unwrap(), app);
    }

    #[test]
    fn test_schedule_type_tolerates_unknown_variant() {
        let schedule: AppSchedule =
            serde_json::from_str(r#"{"schedule_type":"Fortnightly","cron_expression":null}"#)
                .unwrap();
        assert_eq!(schedule.schedule_type, ScheduleType::Unknown);
    }

    #[test]
    fn test_immediate_trigger_is_one_shot() {
        let now = Utc::now();
        let trigger = TriggerRecord::immediate(JobKey::on_demand("reindex-app"), now);
        assert!(trigger.is_one_shot());
        assert_eq!(trigger.next_fire_time, Some(now));
        assert_eq!(trigger.state, TriggerState::Waiting);
    }
}
