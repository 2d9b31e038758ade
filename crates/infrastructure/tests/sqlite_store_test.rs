//! SQLite任务存储的契约测试
//!
//! 验证插入冲突、原子抢占、执行中标记与故障回收等
//! 存储层必须满足的语义，Postgres实现共享同一套SQL形状

use chrono::{Duration, Utc};
use uuid::Uuid;

use app_scheduler_domain::{
    App, AppRunRecord, AppRunRepository, AppRunStatus, AppRunType, AppSchedule, JobKey, JobRecord,
    JobStore, RunContext, SchedulerError, TriggerRecord, TriggerState, APPS_JOB_GROUP,
};
use app_scheduler_infrastructure::{build_job_store, JobStoreConfig, JobStoreHandles};

async fn temp_store() -> (JobStoreHandles, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let config = JobStoreConfig {
        url: format!("sqlite://{}/scheduler.db", dir.path().display()),
        ..JobStoreConfig::default()
    };
    let handles = build_job_store(&config).await.unwrap();
    (handles, dir)
}

fn sample_app(name: &str) -> App {
    App::new(name, "search-reindex", AppSchedule::hourly())
}

fn cron_pair(name: &str, due_in_seconds: i64) -> (JobRecord, TriggerRecord) {
    let app = sample_app(name);
    let job = JobRecord::scheduled(&app).unwrap();
    let trigger = TriggerRecord::cron(
        JobKey::scheduled(name),
        "0 0 * * * *".to_string(),
        Utc::now() + Duration::seconds(due_in_seconds),
    );
    (job, trigger)
}

#[tokio::test]
async fn test_store_get_remove_roundtrip() {
    let (handles, _dir) = temp_store().await;
    let store = &handles.job_store;

    let (job, trigger) = cron_pair("reindex", 3600);
    store.store_job(&job, &trigger).await.unwrap();

    let loaded = store.get_job(&job.key).await.unwrap().unwrap();
    assert_eq!(loaded.key, job.key);
    assert_eq!(loaded.run_type, AppRunType::Scheduled);
    assert_eq!(loaded.app().unwrap(), sample_app("reindex"));

    assert!(store.remove_job(&job.key).await.unwrap());
    assert!(!store.remove_job(&job.key).await.unwrap());
    assert!(store.get_job(&job.key).await.unwrap().is_none());
}

#[tokio::test]
async fn test_duplicate_trigger_rolls_back_whole_write() {
    let (handles, _dir) = temp_store().await;
    let store = &handles.job_store;

    let (job, trigger) = cron_pair("reindex", 3600);
    store.store_job(&job, &trigger).await.unwrap();

    let result = store.store_job(&job, &trigger).await;
    assert!(matches!(result, Err(SchedulerError::JobAlreadyExists { .. })));
}

#[tokio::test]
async fn test_acquire_only_returns_due_waiting_triggers() {
    let (handles, _dir) = temp_store().await;
    let store = &handles.job_store;

    let (due_job, due_trigger) = cron_pair("due-app", -5);
    let (future_job, future_trigger) = cron_pair("future-app", 3600);
    store.store_job(&due_job, &due_trigger).await.unwrap();
    store.store_job(&future_job, &future_trigger).await.unwrap();

    let acquired = store
        .acquire_due_triggers(APPS_JOB_GROUP, "node-a", Utc::now(), 10)
        .await
        .unwrap();
    assert_eq!(acquired.len(), 1);
    assert_eq!(acquired[0].key, due_job.key);
    assert_eq!(acquired[0].state, TriggerState::Acquired);
    assert_eq!(acquired[0].acquired_by.as_deref(), Some("node-a"));

    // 已被抢占的触发器不会被重复取走
    let again = store
        .acquire_due_triggers(APPS_JOB_GROUP, "node-b", Utc::now(), 10)
        .await
        .unwrap();
    assert!(again.is_empty());
}

#[tokio::test]
async fn test_acquire_respects_limit() {
    let (handles, _dir) = temp_store().await;
    let store = &handles.job_store;

    for i in 0..3 {
        let (job, trigger) = cron_pair(&format!("app-{i}"), -10);
        store.store_job(&job, &trigger).await.unwrap();
    }

    let acquired = store
        .acquire_due_triggers(APPS_JOB_GROUP, "node-a", Utc::now(), 2)
        .await
        .unwrap();
    assert_eq!(acquired.len(), 2);
}

#[tokio::test]
async fn test_mark_fired_enforces_single_execution() {
    let (handles, _dir) = temp_store().await;
    let store = &handles.job_store;

    let (job, trigger) = cron_pair("reindex", -5);
    store.store_job(&job, &trigger).await.unwrap();

    store
        .mark_fired(&job.key, "node-a", Utc::now())
        .await
        .unwrap();
    let executing = store.currently_executing(APPS_JOB_GROUP).await.unwrap();
    assert_eq!(executing, vec![job.key.clone()]);

    // 同一任务标识不可能出现第二个执行中标记
    let result = store.mark_fired(&job.key, "node-b", Utc::now()).await;
    assert!(matches!(result, Err(SchedulerError::JobAlreadyExists { .. })));
}

#[tokio::test]
async fn test_complete_trigger_requeues_cron_trigger() {
    let (handles, _dir) = temp_store().await;
    let store = &handles.job_store;

    let (job, trigger) = cron_pair("reindex", -5);
    store.store_job(&job, &trigger).await.unwrap();
    let acquired = store
        .acquire_due_triggers(APPS_JOB_GROUP, "node-a", Utc::now(), 1)
        .await
        .unwrap();
    let fire_time = acquired[0].next_fire_time.unwrap();
    store.mark_fired(&job.key, "node-a", fire_time).await.unwrap();

    let next = Utc::now() + Duration::hours(1);
    store
        .complete_trigger(&job.key, fire_time, Some(next))
        .await
        .unwrap();

    assert!(store
        .currently_executing(APPS_JOB_GROUP)
        .await
        .unwrap()
        .is_empty());
    let requeued = store
        .acquire_due_triggers(APPS_JOB_GROUP, "node-a", next + Duration::seconds(1), 1)
        .await
        .unwrap();
    assert_eq!(requeued.len(), 1);
    assert_eq!(requeued[0].prev_fire_time, Some(fire_time));
}

#[tokio::test]
async fn test_complete_trigger_deletes_one_shot_job() {
    let (handles, _dir) = temp_store().await;
    let store = &handles.job_store;

    let app = sample_app("reindex");
    let job = JobRecord::on_demand(&app).unwrap();
    let trigger = TriggerRecord::immediate(JobKey::on_demand("reindex"), Utc::now());
    store.store_job(&job, &trigger).await.unwrap();
    store
        .mark_fired(&job.key, "node-a", Utc::now())
        .await
        .unwrap();

    store
        .complete_trigger(&job.key, Utc::now(), None)
        .await
        .unwrap();

    assert!(store.get_job(&job.key).await.unwrap().is_none());
    assert!(store
        .currently_executing(APPS_JOB_GROUP)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_release_trigger_requeues_without_touching_fired_marker() {
    let (handles, _dir) = temp_store().await;
    let store = &handles.job_store;

    let (job, trigger) = cron_pair("reindex", -5);
    store.store_job(&job, &trigger).await.unwrap();
    store
        .acquire_due_triggers(APPS_JOB_GROUP, "node-a", Utc::now(), 1)
        .await
        .unwrap();
    // 另一个执行的标记仍在
    store
        .mark_fired(&job.key, "node-b", Utc::now())
        .await
        .unwrap();

    let next = Utc::now() + Duration::hours(1);
    store.release_trigger(&job.key, Some(next)).await.unwrap();

    assert_eq!(
        store.currently_executing(APPS_JOB_GROUP).await.unwrap(),
        vec![job.key.clone()]
    );
    let requeued = store
        .acquire_due_triggers(APPS_JOB_GROUP, "node-a", next + Duration::seconds(1), 1)
        .await
        .unwrap();
    assert_eq!(requeued.len(), 1);
}

#[tokio::test]
async fn test_recover_stalled_releases_dead_node_state() {
    let (handles, _dir) = temp_store().await;
    let store = &handles.job_store;

    let (job, trigger) = cron_pair("reindex", -5);
    store.store_job(&job, &trigger).await.unwrap();
    let now = Utc::now();
    store
        .acquire_due_triggers(APPS_JOB_GROUP, "dead-node", now, 1)
        .await
        .unwrap();
    store.mark_fired(&job.key, "dead-node", now).await.unwrap();

    // 抢占时间早于回收阈值，视为节点故障遗留
    let recovered = store
        .recover_stalled(APPS_JOB_GROUP, now + Duration::minutes(20), Duration::minutes(10))
        .await
        .unwrap();
    assert_eq!(recovered, 1);
    assert!(store
        .currently_executing(APPS_JOB_GROUP)
        .await
        .unwrap()
        .is_empty());

    let reacquired = store
        .acquire_due_triggers(APPS_JOB_GROUP, "node-b", now + Duration::minutes(21), 1)
        .await
        .unwrap();
    assert_eq!(reacquired.len(), 1);
}

#[tokio::test]
async fn test_recover_stalled_drops_non_recoverable_job() {
    let (handles, _dir) = temp_store().await;
    let store = &handles.job_store;

    // 同一故障节点遗留一个周期任务和一个手动触发任务
    let (cron_job, cron_trigger) = cron_pair("reindex", -5);
    store.store_job(&cron_job, &cron_trigger).await.unwrap();
    let app = sample_app("cleanup");
    let on_demand_job = JobRecord::on_demand(&app).unwrap();
    let on_demand_trigger = TriggerRecord::immediate(on_demand_job.key.clone(), Utc::now());
    store
        .store_job(&on_demand_job, &on_demand_trigger)
        .await
        .unwrap();

    let now = Utc::now();
    let acquired = store
        .acquire_due_triggers(APPS_JOB_GROUP, "dead-node", now, 10)
        .await
        .unwrap();
    assert_eq!(acquired.len(), 2);
    store
        .mark_fired(&on_demand_job.key, "dead-node", now)
        .await
        .unwrap();

    // 周期任务重新排队，手动触发任务不重放而是连同定义清除
    let recovered = store
        .recover_stalled(APPS_JOB_GROUP, now + Duration::minutes(20), Duration::minutes(10))
        .await
        .unwrap();
    assert_eq!(recovered, 1);
    assert!(store.get_job(&on_demand_job.key).await.unwrap().is_none());
    assert!(store
        .currently_executing(APPS_JOB_GROUP)
        .await
        .unwrap()
        .is_empty());

    let reacquired = store
        .acquire_due_triggers(APPS_JOB_GROUP, "node-b", now + Duration::minutes(21), 10)
        .await
        .unwrap();
    assert_eq!(reacquired.len(), 1);
    assert_eq!(reacquired[0].key, cron_job.key);
}

#[tokio::test]
async fn test_recover_stalled_leaves_recent_state_alone() {
    let (handles, _dir) = temp_store().await;
    let store = &handles.job_store;

    let (job, trigger) = cron_pair("reindex", -5);
    store.store_job(&job, &trigger).await.unwrap();
    let now = Utc::now();
    store
        .acquire_due_triggers(APPS_JOB_GROUP, "node-a", now, 1)
        .await
        .unwrap();
    store.mark_fired(&job.key, "node-a", now).await.unwrap();

    let recovered = store
        .recover_stalled(APPS_JOB_GROUP, now + Duration::seconds(30), Duration::minutes(10))
        .await
        .unwrap();
    assert_eq!(recovered, 0);
    assert_eq!(
        store.currently_executing(APPS_JOB_GROUP).await.unwrap(),
        vec![job.key]
    );
}

fn sample_run(app_name: &str) -> AppRunRecord {
    let app = sample_app(app_name);
    let ctx = RunContext {
        job_key: JobKey::scheduled(app_name),
        run_type: AppRunType::Scheduled,
        fire_time: Utc::now(),
        app,
    };
    AppRunRecord::started(&ctx)
}

#[tokio::test]
async fn test_run_record_lifecycle() {
    let (handles, _dir) = temp_store().await;
    let repo = &handles.run_repository;

    let record = sample_run("reindex");
    repo.record_run_started(&record).await.unwrap();

    let finished_at = Utc::now();
    repo.record_run_finished(record.id, AppRunStatus::Failed, finished_at, Some("超时"))
        .await
        .unwrap();

    let runs = repo.recent_runs("reindex", 10).await.unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].id, record.id);
    assert_eq!(runs[0].status, AppRunStatus::Failed);
    assert_eq!(runs[0].error_message.as_deref(), Some("超时"));
    assert!(runs[0].finished_at.is_some());
}

#[tokio::test]
async fn test_recent_runs_ordered_and_limited() {
    let (handles, _dir) = temp_store().await;
    let repo = &handles.run_repository;

    let mut ids = Vec::new();
    for i in 0..5 {
        let mut record = sample_run("reindex");
        record.id = Uuid::new_v4();
        record.started_at = Utc::now() + Duration::seconds(i);
        ids.push(record.id);
        repo.record_run_started(&record).await.unwrap();
    }
    // 其他应用的记录不混入
    repo.record_run_started(&sample_run("other-app")).await.unwrap();

    let runs = repo.recent_runs("reindex", 3).await.unwrap();
    assert_eq!(runs.len(), 3);
    assert_eq!(runs[0].id, ids[4]);
    assert_eq!(runs[1].id, ids[3]);
    assert_eq!(runs[2].id, ids[2]);
}
