use chrono::{DateTime, Duration, Utc};
use cron::Schedule;
use std::str::FromStr;

use app_scheduler_domain::{SchedulerError, SchedulerResult};

/// CRON表达式解析和触发时间计算工具
pub struct CronScheduler {
    schedule: Schedule,
}

impl CronScheduler {
    /// 创建新的CRON调度器，表达式使用调度器原生六段方言
    pub fn new(cron_expr: &str) -> SchedulerResult<Self> {
        let schedule = Schedule::from_str(cron_expr).map_err(|e| {
            SchedulerError::invalid_schedule(format!("表达式 {cron_expr} 解析失败: {e}"))
        })?;

        Ok(Self { schedule })
    }

    /// 获取指定时间之后的下一次触发时间
    pub fn next_fire_after(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&from).next()
    }

    /// 获取从指定时间开始的多个触发时间
    pub fn upcoming_times(&self, from: DateTime<Utc>, count: usize) -> Vec<DateTime<Utc>> {
        self.schedule.after(&from).take(count).collect()
    }

    /// 检查错过的触发是否超过misfire阈值
    ///
    /// 超过阈值的错过触发合并为一次补触发，而不是逐次补放
    pub fn is_misfired(
        fire_time: DateTime<Utc>,
        now: DateTime<Utc>,
        misfire_threshold: Duration,
    ) -> bool {
        now - fire_time > misfire_threshold
    }

    /// 验证CRON表达式是否有效
    pub fn validate_expression(cron_expr: &str) -> SchedulerResult<()> {
        Schedule::from_str(cron_expr).map_err(|e| {
            SchedulerError::invalid_schedule(format!("表达式 {cron_expr} 解析失败: {e}"))
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_next_fire_after() {
        let scheduler = CronScheduler::new("0 0 * * * *").unwrap();
        let from = Utc.with_ymd_and_hms(2024, 3, 1, 10, 30, 0).unwrap();
        let next = scheduler.next_fire_after(from).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 3, 1, 11, 0, 0).unwrap());
    }

    #[test]
    fn test_invalid_expression_rejected() {
        assert!(matches!(
            CronScheduler::new("not a cron"),
            Err(SchedulerError::InvalidSchedule(_))
        ));
    }

    #[test]
    fn test_misfire_threshold() {
        let now = Utc::now();
        let threshold = Duration::seconds(60);
        assert!(!CronScheduler::is_misfired(
            now - Duration::seconds(30),
            now,
            threshold
        ));
        assert!(CronScheduler::is_misfired(
            now - Duration::seconds(120),
            now,
            threshold
        ));
    }

    #[test]
    fn test_upcoming_times_are_spaced_by_period() {
        let scheduler = CronScheduler::new("0 0 * * * *").unwrap();
        let times = scheduler.upcoming_times(Utc::now(), 3);
        assert_eq!(times.len(), 3);
        assert_eq!(times[1] - times[0], Duration::hours(1));
        assert_eq!(times[2] - times[1], Duration::hours(1));
    }
}
