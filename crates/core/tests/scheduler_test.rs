//! 调度器注册/删除/手动触发接口的行为测试
//!
//! 使用内存mock存储，轮询间隔拉长到测试期间不会触发

use std::sync::Arc;

use app_scheduler_core::{AppDependencies, AppScheduler};
use app_scheduler_domain::{AppSchedule, JobKey, SchedulerError, TriggerState};
use app_scheduler_infrastructure::AppSchedulerConfig;
use app_scheduler_testing_utils::builders::AppBuilder;
use app_scheduler_testing_utils::mocks::{
    MockAppRunRepository, MockDataAccess, MockJobStore, MockSearchClient,
};

fn quiet_config() -> AppSchedulerConfig {
    let mut config = AppSchedulerConfig::default();
    config.scheduler.poll_interval_ms = 3_600_000;
    config
}

async fn test_scheduler(
    store: &MockJobStore,
    runs: &MockAppRunRepository,
) -> Arc<AppScheduler> {
    let deps = AppDependencies {
        data_access: Arc::new(MockDataAccess::new()),
        search_client: Arc::new(MockSearchClient::new()),
    };
    AppScheduler::initialize(
        &quiet_config(),
        Arc::new(store.clone()),
        Arc::new(runs.clone()),
        deps,
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn test_initialize_fails_when_metadata_store_unreachable() {
    let deps = AppDependencies {
        data_access: Arc::new(MockDataAccess::unhealthy()),
        search_client: Arc::new(MockSearchClient::new()),
    };
    let result = AppScheduler::initialize(
        &quiet_config(),
        Arc::new(MockJobStore::new()),
        Arc::new(MockAppRunRepository::new()),
        deps,
    )
    .await;
    assert!(matches!(result, Err(SchedulerError::Configuration(_))));
}

#[tokio::test]
async fn test_start_is_idempotent() {
    let store = MockJobStore::new();
    let runs = MockAppRunRepository::new();
    let scheduler = test_scheduler(&store, &runs).await;
    scheduler.clone().start().await.unwrap();
    scheduler.clone().start().await.unwrap();
    scheduler.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_add_app_schedule_stores_cron_trigger() {
    let store = MockJobStore::new();
    let runs = MockAppRunRepository::new();
    let scheduler = test_scheduler(&store, &runs).await;

    let app = AppBuilder::new().with_name("reindex").build();
    scheduler.add_app_schedule(&app).await.unwrap();

    assert_eq!(store.job_count(), 1);
    let trigger = store.get_trigger(&JobKey::scheduled("reindex")).unwrap();
    assert_eq!(trigger.state, TriggerState::Waiting);
    assert!(!trigger.is_one_shot());
    assert!(trigger.next_fire_time.is_some());
}

#[tokio::test]
async fn test_add_app_schedule_is_idempotent() {
    let store = MockJobStore::new();
    let runs = MockAppRunRepository::new();
    let scheduler = test_scheduler(&store, &runs).await;

    let app = AppBuilder::new().with_name("reindex").build();
    scheduler.add_app_schedule(&app).await.unwrap();
    scheduler.add_app_schedule(&app).await.unwrap();
    assert_eq!(store.job_count(), 1);
}

#[tokio::test]
async fn test_add_disabled_app_is_skipped() {
    let store = MockJobStore::new();
    let runs = MockAppRunRepository::new();
    let scheduler = test_scheduler(&store, &runs).await;

    let app = AppBuilder::new().with_name("reindex").disabled().build();
    scheduler.add_app_schedule(&app).await.unwrap();
    assert_eq!(store.job_count(), 0);
}

#[tokio::test]
async fn test_add_app_with_invalid_schedule_rejected_synchronously() {
    let store = MockJobStore::new();
    let runs = MockAppRunRepository::new();
    let scheduler = test_scheduler(&store, &runs).await;

    let app = AppBuilder::new()
        .with_name("reindex")
        .with_schedule(AppSchedule::custom("not a cron"))
        .build();
    let result = scheduler.add_app_schedule(&app).await;
    assert!(matches!(result, Err(SchedulerError::InvalidSchedule(_))));
    assert_eq!(store.job_count(), 0);
}

#[tokio::test]
async fn test_delete_removes_both_job_identities() {
    let store = MockJobStore::new();
    let runs = MockAppRunRepository::new();
    let scheduler = test_scheduler(&store, &runs).await;

    let app = AppBuilder::new().with_name("reindex").build();
    scheduler.add_app_schedule(&app).await.unwrap();
    scheduler.trigger_on_demand_app(&app).await.unwrap();
    assert_eq!(store.job_count(), 2);

    scheduler.delete_scheduled_app("reindex").await.unwrap();
    assert_eq!(store.job_count(), 0);

    // 不存在时删除是静默成功
    scheduler.delete_scheduled_app("reindex").await.unwrap();
}

#[tokio::test]
async fn test_on_demand_trigger_stores_one_shot() {
    let store = MockJobStore::new();
    let runs = MockAppRunRepository::new();
    let scheduler = test_scheduler(&store, &runs).await;

    let app = AppBuilder::new().with_name("reindex").build();
    scheduler.trigger_on_demand_app(&app).await.unwrap();

    let trigger = store.get_trigger(&JobKey::on_demand("reindex")).unwrap();
    assert!(trigger.is_one_shot());
}

#[tokio::test]
async fn test_on_demand_rejected_while_pending() {
    let store = MockJobStore::new();
    let runs = MockAppRunRepository::new();
    let scheduler = test_scheduler(&store, &runs).await;

    let app = AppBuilder::new().with_name("reindex").build();
    scheduler.trigger_on_demand_app(&app).await.unwrap();
    // 上一次手动触发尚未执行完成，再次提交视为正在运行
    let result = scheduler.trigger_on_demand_app(&app).await;
    assert!(matches!(
        result,
        Err(SchedulerError::AlreadyRunning { app }) if app == "reindex"
    ));
}

#[tokio::test]
async fn test_on_demand_rejected_while_scheduled_run_executing() {
    let store = MockJobStore::new();
    let runs = MockAppRunRepository::new();
    let scheduler = test_scheduler(&store, &runs).await;

    let app = AppBuilder::new().with_name("reindex").build();
    scheduler.add_app_schedule(&app).await.unwrap();
    // 模拟另一节点上周期任务正在执行
    store.mark_executing(&JobKey::scheduled("reindex"), "other-node");

    let result = scheduler.trigger_on_demand_app(&app).await;
    assert!(matches!(result, Err(SchedulerError::AlreadyRunning { .. })));
}

#[tokio::test]
async fn test_on_demand_disabled_app_is_silent_noop() {
    let store = MockJobStore::new();
    let runs = MockAppRunRepository::new();
    let scheduler = test_scheduler(&store, &runs).await;

    let app = AppBuilder::new().with_name("reindex").disabled().build();
    scheduler.trigger_on_demand_app(&app).await.unwrap();
    assert_eq!(store.job_count(), 0);
}

#[tokio::test]
async fn test_shutdown_is_noop_when_repeated() {
    let store = MockJobStore::new();
    let runs = MockAppRunRepository::new();
    let scheduler = test_scheduler(&store, &runs).await;
    scheduler.shutdown().await.unwrap();
    scheduler.shutdown().await.unwrap();
}
