//! 任务工厂
//!
//! 应用类型标识到可运行单元的注册表，进程启动时由宿主填充。
//! 未知标识是一次查找失败，按配置错误处理并记录为失败运行，
//! 不会导致调度进程崩溃

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use app_scheduler_domain::{App, DataAccess, RunContext, SchedulerError, SchedulerResult, SearchClient};

/// 可运行单元的标准入口契约
///
/// 触发时先 `init` 注入配置与共享依赖，再 `run` 执行；
/// 返回错误即记录为失败运行
#[async_trait]
pub trait NativeApp: Send + Sync {
    async fn init(&mut self, app: &App, deps: AppDependencies) -> SchedulerResult<()>;

    async fn run(&mut self, ctx: &RunContext) -> SchedulerResult<()>;
}

/// 注入给可运行单元的共享依赖
#[derive(Clone)]
pub struct AppDependencies {
    pub data_access: Arc<dyn DataAccess>,
    pub search_client: Arc<dyn SearchClient>,
}

/// 可运行单元的构造函数
pub type AppConstructor = Arc<dyn Fn() -> Box<dyn NativeApp> + Send + Sync>;

pub struct AppJobFactory {
    deps: AppDependencies,
    constructors: RwLock<HashMap<String, AppConstructor>>,
}

impl AppJobFactory {
    pub fn new(deps: AppDependencies) -> Self {
        Self {
            deps,
            constructors: RwLock::new(HashMap::new()),
        }
    }

    /// 注册应用类型，重复注册时后注册者覆盖
    pub async fn register<F>(&self, app_type: &str, constructor: F)
    where
        F: Fn() -> Box<dyn NativeApp> + Send + Sync + 'static,
    {
        let mut constructors = self.constructors.write().await;
        constructors.insert(app_type.to_string(), Arc::new(constructor));
        debug!("已注册应用类型: {}", app_type);
    }

    pub async fn registered_types(&self) -> Vec<String> {
        let constructors = self.constructors.read().await;
        constructors.keys().cloned().collect()
    }

    /// 解析应用类型并实例化，注入共享依赖
    pub async fn instantiate(&self, app: &App) -> SchedulerResult<Box<dyn NativeApp>> {
        let constructor = {
            let constructors = self.constructors.read().await;
            constructors.get(&app.app_type).cloned()
        };
        let constructor = constructor.ok_or_else(|| {
            SchedulerError::configuration(format!(
                "应用 {} 引用了未注册的应用类型: {}",
                app.name, app.app_type
            ))
        })?;

        let mut native = constructor();
        native.init(app, self.deps.clone()).await?;
        Ok(native)
    }
}
