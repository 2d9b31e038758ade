use thiserror::Error;

/// 调度器统一错误类型
///
/// 存储层和cron解析层的错误在此统一收敛，
/// 调用方只需要处理一种错误类型
#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("配置错误: {0}")]
    Configuration(String),
    #[error("无效的调度描述: {0}")]
    InvalidSchedule(String),
    #[error("应用 {app} 已有执行中的任务，请等待其完成")]
    AlreadyRunning { app: String },
    #[error("任务已存在: {key}")]
    JobAlreadyExists { key: String },
    #[error("任务存储操作失败: {0}")]
    Store(String),
    #[error("数据序列化错误: {0}")]
    Serialization(String),
    #[error("系统内部错误: {0}")]
    Internal(String),
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;

impl SchedulerError {
    pub fn configuration<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }
    pub fn invalid_schedule<S: Into<String>>(msg: S) -> Self {
        Self::InvalidSchedule(msg.into())
    }
    pub fn already_running<S: Into<String>>(app: S) -> Self {
        Self::AlreadyRunning { app: app.into() }
    }
    pub fn store_error<S: Into<String>>(msg: S) -> Self {
        Self::Store(msg.into())
    }
    /// 是否为不可恢复的致命错误
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SchedulerError::Configuration(_) | SchedulerError::Internal(_)
        )
    }
    /// 是否为可由调用方稍后重试的错误
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SchedulerError::Store(_) | SchedulerError::AlreadyRunning { .. }
        )
    }
}

impl From<sqlx::Error> for SchedulerError {
    fn from(err: sqlx::Error) -> Self {
        SchedulerError::Store(err.to_string())
    }
}

impl From<serde_json::Error> for SchedulerError {
    fn from(err: serde_json::Error) -> Self {
        SchedulerError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_severity_classification() {
        assert!(SchedulerError::configuration("缺少连接参数").is_fatal());
        assert!(SchedulerError::Internal("状态损坏".to_string()).is_fatal());
        assert!(!SchedulerError::already_running("reindex").is_fatal());

        assert!(SchedulerError::store_error("连接超时").is_retryable());
        assert!(SchedulerError::already_running("reindex").is_retryable());
        assert!(!SchedulerError::invalid_schedule("表达式为空").is_retryable());
    }

    #[test]
    fn test_serde_errors_converted_to_serialization() {
        let err = serde_json::from_str::<serde_json::Value>("{broken").unwrap_err();
        assert!(matches!(
            SchedulerError::from(err),
            SchedulerError::Serialization(_)
        ));
    }
}
