//! 应用调度器
//!
//! 每个节点持有一个调度器实例，通过集群共享的任务存储协调。
//! 实例由宿主进程启动时显式创建并以 `Arc` 传递，
//! 不依赖隐藏的全局单例；启动标记单向置位，不支持重复初始化

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{watch, Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use app_scheduler_domain::{
    App, AppRunRecord, AppRunRepository, JobKey, JobRecord, JobStore, RunContext, SchedulerError,
    SchedulerResult, TriggerRecord, APPS_JOB_GROUP,
};
use app_scheduler_infrastructure::AppSchedulerConfig;

use crate::cron_utils::CronScheduler;
use crate::job_factory::{AppDependencies, AppJobFactory};
use crate::listener::AppJobListener;
use crate::schedule_translator;

pub struct AppScheduler {
    job_store: Arc<dyn JobStore>,
    run_repository: Arc<dyn AppRunRepository>,
    factory: Arc<AppJobFactory>,
    listener: Arc<AppJobListener>,
    instance_id: String,
    misfire_threshold: chrono::Duration,
    recovery_threshold: chrono::Duration,
    poll_interval: std::time::Duration,
    thread_pool_size: usize,
    clustered: bool,
    started: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
    worker_permits: Arc<Semaphore>,
    fire_loop: Mutex<Option<JoinHandle<()>>>,
}

impl AppScheduler {
    /// 建立调度器实例并启动触发循环
    ///
    /// 连接参数缺失或元数据存储不可达时返回配置错误。
    /// 实例创建后再次调用 `start` 是无害的空操作
    pub async fn initialize(
        config: &AppSchedulerConfig,
        job_store: Arc<dyn JobStore>,
        run_repository: Arc<dyn AppRunRepository>,
        deps: AppDependencies,
    ) -> SchedulerResult<Arc<Self>> {
        config.validate()?;
        deps.data_access.health_check().await.map_err(|e| {
            SchedulerError::configuration(format!("元数据存储连接检查失败: {e}"))
        })?;

        let (shutdown_tx, _) = watch::channel(false);
        let listener = Arc::new(AppJobListener::new(run_repository.clone()));
        let factory = Arc::new(AppJobFactory::new(deps));
        let thread_pool_size = config.scheduler.thread_pool_size;

        let scheduler = Arc::new(Self {
            job_store,
            run_repository,
            factory,
            listener,
            instance_id: config.instance_id(),
            misfire_threshold: config.misfire_threshold(),
            recovery_threshold: config.recovery_threshold(),
            poll_interval: config.poll_interval(),
            thread_pool_size,
            clustered: config.scheduler.clustered,
            started: AtomicBool::new(false),
            shutdown_tx,
            worker_permits: Arc::new(Semaphore::new(thread_pool_size)),
            fire_loop: Mutex::new(None),
        });
        Arc::clone(&scheduler).start().await?;
        Ok(scheduler)
    }

    /// 启动触发循环，重复调用是记录日志的空操作
    pub async fn start(self: Arc<Self>) -> SchedulerResult<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            info!("应用调度器已初始化，跳过重复启动");
            return Ok(());
        }

        let shutdown_rx = self.shutdown_tx.subscribe();
        let scheduler = Arc::clone(&self);
        let handle = tokio::spawn(async move {
            scheduler.run_fire_loop(shutdown_rx).await;
        });
        *self.fire_loop.lock().await = Some(handle);
        info!(
            "应用调度器已启动: 实例 {}, 工作线程池 {}",
            self.instance_id, self.thread_pool_size
        );
        Ok(())
    }

    /// 应用类型注册表，进程启动时由宿主填充
    pub fn job_factory(&self) -> &Arc<AppJobFactory> {
        &self.factory
    }

    /// 注册应用的周期调度
    ///
    /// 任务已存在或应用被禁用时静默跳过；
    /// 调度描述非法时同步返回 `InvalidSchedule`
    pub async fn add_app_schedule(&self, app: &App) -> SchedulerResult<()> {
        let key = JobKey::scheduled(&app.name);
        if self.job_store.get_job(&key).await?.is_some() {
            info!("应用 {} 的任务已存在，跳过注册", app.name);
            return Ok(());
        }
        if !app.is_enabled() {
            info!("[Applications] 应用 {} 已禁用，不进行调度", app.name);
            return Ok(());
        }

        let trigger = schedule_translator::build_trigger(key, &app.schedule, Utc::now())?;
        let job = JobRecord::scheduled(app)?;
        match self.job_store.store_job(&job, &trigger).await {
            Ok(()) => {
                info!(
                    "应用 {} 已注册调度: {}",
                    app.name,
                    trigger.cron_expression.as_deref().unwrap_or("immediate")
                );
                Ok(())
            }
            // 其他节点并发注册了同一应用，视为幂等成功
            Err(SchedulerError::JobAlreadyExists { .. }) => {
                info!("应用 {} 的任务已由其他节点注册，跳过", app.name);
                Ok(())
            }
            Err(e) => {
                error!("为应用 {} 注册调度失败: {}", app.name, e);
                Err(e)
            }
        }
    }

    /// 删除应用的周期任务与手动触发任务，不存在时静默成功
    pub async fn delete_scheduled_app(&self, app_name: &str) -> SchedulerResult<()> {
        for key in [JobKey::scheduled(app_name), JobKey::on_demand(app_name)] {
            if self.job_store.remove_job(&key).await? {
                info!("已删除任务 {}", key);
            } else {
                debug!("任务 {} 不存在，跳过删除", key);
            }
        }
        Ok(())
    }

    /// 手动触发应用的一次立即执行
    ///
    /// 互斥契约：同一应用在全集群内最多一个执行实例，
    /// 无论来自周期触发还是此前的手动触发
    pub async fn trigger_on_demand_app(&self, app: &App) -> SchedulerResult<()> {
        let scheduled_key = JobKey::scheduled(&app.name);
        let on_demand_key = JobKey::on_demand(&app.name);
        let scheduled_job = self.job_store.get_job(&scheduled_key).await?;
        let on_demand_job = self.job_store.get_job(&on_demand_key).await?;

        let executing = self.job_store.currently_executing(APPS_JOB_GROUP).await?;
        for key in &executing {
            let matches_scheduled = scheduled_job
                .as_ref()
                .map(|job| job.key == *key)
                .unwrap_or(*key == scheduled_key);
            let matches_on_demand = on_demand_job
                .as_ref()
                .map(|job| job.key == *key)
                .unwrap_or(*key == on_demand_key);
            if matches_scheduled || matches_on_demand {
                return Err(SchedulerError::already_running(&app.name));
            }
        }

        if !app.is_enabled() {
            info!("[Applications] 应用 {} 已禁用，跳过手动触发", app.name);
            return Ok(());
        }

        let job = JobRecord::on_demand(app)?;
        let trigger = TriggerRecord::immediate(on_demand_key, Utc::now());
        match self.job_store.store_job(&job, &trigger).await {
            Ok(()) => {
                info!("应用 {} 的手动触发已提交", app.name);
                Ok(())
            }
            // 与到期触发竞争写入，同一任务/触发器对已存在等价于正在运行
            Err(SchedulerError::JobAlreadyExists { .. }) => {
                Err(SchedulerError::already_running(&app.name))
            }
            Err(e) => {
                error!("提交应用 {} 的手动触发失败: {}", app.name, e);
                Err(e)
            }
        }
    }

    /// 应用最近的运行历史
    pub async fn recent_runs(
        &self,
        app_name: &str,
        limit: i64,
    ) -> SchedulerResult<Vec<AppRunRecord>> {
        self.run_repository.recent_runs(app_name, limit).await
    }

    /// 优雅停止：停掉触发循环并等待在途任务退场
    ///
    /// 从未启动时是空操作
    pub async fn shutdown(&self) -> SchedulerResult<()> {
        if !self.started.load(Ordering::SeqCst) {
            info!("应用调度器未启动，无需停止");
            return Ok(());
        }

        let _ = self.shutdown_tx.send(true);
        if let Some(handle) = self.fire_loop.lock().await.take() {
            let _ = handle.await;
        }
        let _drain = self
            .worker_permits
            .acquire_many(self.thread_pool_size as u32)
            .await
            .map_err(|e| SchedulerError::Internal(format!("等待在途任务失败: {e}")))?;
        info!("应用调度器已停止");
        Ok(())
    }

    async fn run_fire_loop(self: Arc<Self>, mut shutdown_rx: watch::Receiver<bool>) {
        info!("触发循环已启动，轮询间隔 {:?}", self.poll_interval);
        // 首轮扫描推迟一个轮询间隔，避免与启动阶段的注册竞争
        let mut ticker = tokio::time::interval_at(
            tokio::time::Instant::now() + self.poll_interval,
            self.poll_interval,
        );
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    info!("触发循环收到停止信号");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = Arc::clone(&self).fire_due_triggers().await {
                        error!("触发扫描失败: {}", e);
                    }
                }
            }
        }
    }

    /// 单轮扫描：回收滞留状态、原子抢占到期触发器、派发执行
    async fn fire_due_triggers(self: Arc<Self>) -> SchedulerResult<()> {
        let now = Utc::now();

        if self.clustered {
            if let Err(e) = self
                .job_store
                .recover_stalled(APPS_JOB_GROUP, now, self.recovery_threshold)
                .await
            {
                warn!("回收滞留状态失败: {}", e);
            }
        }

        let available = self.worker_permits.available_permits();
        if available == 0 {
            debug!("工作线程池已满，本轮跳过触发");
            return Ok(());
        }

        let triggers = self
            .job_store
            .acquire_due_triggers(APPS_JOB_GROUP, &self.instance_id, now, available as u32)
            .await?;
        for trigger in triggers {
            let key = trigger.key.clone();
            if let Err(e) = Arc::clone(&self).fire_trigger(trigger, now).await {
                error!("触发任务 {} 失败: {}", key, e);
            }
        }
        Ok(())
    }

    async fn fire_trigger(
        self: Arc<Self>,
        trigger: TriggerRecord,
        now: DateTime<Utc>,
    ) -> SchedulerResult<()> {
        let key = trigger.key.clone();
        let Some(job) = self.job_store.get_job(&key).await? else {
            warn!("触发器 {} 没有对应的任务定义，予以清除", key);
            self.job_store.release_trigger(&key, None).await?;
            return Ok(());
        };

        let scheduled_fire = trigger.next_fire_time.unwrap_or(now);
        let misfired = CronScheduler::is_misfired(scheduled_fire, now, self.misfire_threshold);
        // misfire合并：错过的触发只补一次，下一次从当前时间推算
        let next_fire = match trigger.cron_expression.as_deref() {
            Some(expr) => {
                let base = if misfired { now } else { scheduled_fire };
                CronScheduler::new(expr)?.next_fire_after(base)
            }
            None => None,
        };
        if misfired {
            warn!(
                "任务 {} 错过触发时间 {}，合并为一次补触发",
                key, scheduled_fire
            );
        }

        // 应用级互斥横跨两个任务标识：兄弟标识仍在执行时
        // 归还触发器，保留原触发时间等待下一轮重试
        let executing = self.job_store.currently_executing(APPS_JOB_GROUP).await?;
        if executing.contains(&key.sibling()) {
            info!("任务 {} 的同应用执行尚未结束，顺延本次触发", key);
            self.job_store
                .release_trigger(&key, Some(scheduled_fire))
                .await?;
            return Ok(());
        }

        if let Err(e) = self
            .job_store
            .mark_fired(&key, &self.instance_id, now)
            .await
        {
            // 同一标识已有执行中标记，归还触发器等待下一轮
            warn!("任务 {} 登记执行失败: {}", key, e);
            self.job_store.release_trigger(&key, next_fire).await?;
            return Ok(());
        }

        let permit = self
            .worker_permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| SchedulerError::Internal(format!("获取工作线程失败: {e}")))?;
        let scheduler = Arc::clone(&self);
        tokio::spawn(async move {
            scheduler
                .execute_job(job, key, scheduled_fire, next_fire, permit)
                .await;
        });
        Ok(())
    }

    /// 执行一次任务并用监听器包裹运行状态
    ///
    /// 实例化失败（未注册的应用类型等）记录为失败运行，不影响调度进程
    async fn execute_job(
        self: Arc<Self>,
        job: JobRecord,
        key: JobKey,
        fire_time: DateTime<Utc>,
        next_fire: Option<DateTime<Utc>>,
        _permit: OwnedSemaphorePermit,
    ) {
        match job.app() {
            Ok(app) => {
                let ctx = RunContext {
                    job_key: key.clone(),
                    run_type: job.run_type,
                    fire_time,
                    app,
                };

                if !ctx.app.is_enabled() {
                    info!("应用 {} 在触发时已禁用，本次执行被否决", ctx.app.name);
                    self.listener.job_execution_vetoed(&ctx).await;
                } else {
                    let record = self.listener.job_to_be_executed(&ctx).await;
                    let result = match self.factory.instantiate(&ctx.app).await {
                        Ok(mut native) => native.run(&ctx).await,
                        Err(e) => Err(e),
                    };
                    match &result {
                        Ok(()) => info!("应用 {} 执行成功", ctx.app.name),
                        Err(e) => error!("应用 {} 执行失败: {}", ctx.app.name, e),
                    }
                    self.listener.job_was_executed(&ctx, &record, &result).await;
                }
            }
            Err(e) => {
                error!("任务 {} 的应用负载损坏，无法执行: {}", key, e);
            }
        }

        if let Err(e) = self
            .job_store
            .complete_trigger(&key, fire_time, next_fire)
            .await
        {
            error!("归还任务 {} 的触发器失败: {}", key, e);
        }
    }
}
