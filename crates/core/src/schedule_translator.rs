//! 调度描述翻译
//!
//! 把声明式的调度描述翻译为调度器原生的六段cron触发器。
//! 固定档位使用硬编码的触发模式；自定义表达式接受UNIX五段方言，
//! 翻译时补秒字段并重映射星期字段的编号语义

use chrono::{DateTime, Utc};

use app_scheduler_domain::{
    AppSchedule, JobKey, ScheduleType, SchedulerError, SchedulerResult, TriggerRecord,
};

use crate::cron_utils::CronScheduler;

/// 固定档位的触发模式
const HOURLY_PATTERN: &str = "0 0 * * * *";
const DAILY_PATTERN: &str = "0 0 0 * * *";
/// 每周触发沿用原平台的第7天语义，即周六零点
const WEEKLY_PATTERN: &str = "0 0 0 * * SAT";
const MONTHLY_PATTERN: &str = "0 0 0 1 * *";

/// 翻译调度描述为原生cron模式
///
/// 空白的自定义表达式与无法识别的调度类型在注册时即被拒绝，
/// 不会延迟到首次触发才暴露
pub fn cron_pattern(schedule: &AppSchedule) -> SchedulerResult<String> {
    match schedule.schedule_type {
        ScheduleType::Hourly => Ok(HOURLY_PATTERN.to_string()),
        ScheduleType::Daily => Ok(DAILY_PATTERN.to_string()),
        ScheduleType::Weekly => Ok(WEEKLY_PATTERN.to_string()),
        ScheduleType::Monthly => Ok(MONTHLY_PATTERN.to_string()),
        ScheduleType::Custom => match schedule.cron_expression.as_deref() {
            Some(expr) if !expr.trim().is_empty() => from_unix_cron(expr.trim()),
            _ => Err(SchedulerError::invalid_schedule(
                "自定义调度缺少cron表达式",
            )),
        },
        ScheduleType::Unknown => Err(SchedulerError::invalid_schedule(
            "无法识别的调度类型，调度描述可能已损坏",
        )),
    }
}

/// 构建周期触发器，首次触发时间取当前时间之后的第一个匹配点
pub fn build_trigger(
    key: JobKey,
    schedule: &AppSchedule,
    now: DateTime<Utc>,
) -> SchedulerResult<TriggerRecord> {
    let pattern = cron_pattern(schedule)?;
    let first_fire = CronScheduler::new(&pattern)?
        .next_fire_after(now)
        .ok_or_else(|| {
            SchedulerError::invalid_schedule(format!("表达式 {pattern} 没有未来的触发时间"))
        })?;
    Ok(TriggerRecord::cron(key, pattern, first_fire))
}

/// UNIX五段方言重映射为原生六段方言
///
/// 补上秒字段，并把星期字段的 0-7 编号（0和7都是周日）
/// 改写为无歧义的三字母名称
pub fn from_unix_cron(expr: &str) -> SchedulerResult<String> {
    let fields: Vec<&str> = expr.split_whitespace().collect();
    if fields.len() != 5 {
        return Err(SchedulerError::invalid_schedule(format!(
            "UNIX cron表达式应为5个字段，实际为{}个: {expr}",
            fields.len()
        )));
    }

    let dow = remap_dow_field(fields[4])?;
    let native = format!(
        "0 {} {} {} {} {}",
        fields[0], fields[1], fields[2], fields[3], dow
    );
    // 重映射后立即编译验证，语法错误在注册时暴露
    CronScheduler::validate_expression(&native)?;
    Ok(native)
}

fn remap_dow_field(field: &str) -> SchedulerResult<String> {
    if field == "*" || field == "?" {
        return Ok(field.to_string());
    }

    let mut parts = Vec::new();
    for part in field.split(',') {
        let (range, step) = match part.split_once('/') {
            Some((range, step)) => (range, Some(step)),
            None => (part, None),
        };
        let mapped = if range == "*" {
            "*".to_string()
        } else if let Some((start, end)) = range.split_once('-') {
            format!("{}-{}", map_dow_token(start)?, map_dow_token(end)?)
        } else {
            map_dow_token(range)?
        };
        match step {
            Some(step) => parts.push(format!("{mapped}/{step}")),
            None => parts.push(mapped),
        }
    }
    Ok(parts.join(","))
}

fn map_dow_token(token: &str) -> SchedulerResult<String> {
    const NAMES: [&str; 7] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"];

    if let Ok(n) = token.parse::<u8>() {
        // UNIX编号0-7，0和7都表示周日
        let index = match n {
            7 => 0,
            n if n <= 6 => n as usize,
            _ => {
                return Err(SchedulerError::invalid_schedule(format!(
                    "星期字段数值越界: {token}"
                )))
            }
        };
        return Ok(NAMES[index].to_string());
    }

    let upper = token.to_ascii_uppercase();
    if NAMES.contains(&upper.as_str()) {
        Ok(upper)
    } else {
        Err(SchedulerError::invalid_schedule(format!(
            "无法识别的星期字段: {token}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, TimeZone, Timelike, Weekday};

    fn next_fire(schedule: &AppSchedule, from: DateTime<Utc>) -> DateTime<Utc> {
        let pattern = cron_pattern(schedule).unwrap();
        CronScheduler::new(&pattern)
            .unwrap()
            .next_fire_after(from)
            .unwrap()
    }

    #[test]
    fn test_hourly_fires_at_minute_zero() {
        let from = Utc.with_ymd_and_hms(2024, 3, 1, 10, 30, 0).unwrap();
        let next = next_fire(&AppSchedule::hourly(), from);
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 3, 1, 11, 0, 0).unwrap());
    }

    #[test]
    fn test_daily_fires_at_midnight() {
        let from = Utc.with_ymd_and_hms(2024, 3, 1, 10, 30, 0).unwrap();
        let next = next_fire(&AppSchedule::daily(), from);
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 3, 2, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_weekly_fires_on_saturday_midnight() {
        let from = Utc.with_ymd_and_hms(2024, 3, 1, 10, 30, 0).unwrap();
        let next = next_fire(&AppSchedule::weekly(), from);
        assert_eq!(next.weekday(), Weekday::Sat);
        assert_eq!((next.hour(), next.minute(), next.second()), (0, 0, 0));
        // 每周恰好触发一次
        let pattern = cron_pattern(&AppSchedule::weekly()).unwrap();
        let times = CronScheduler::new(&pattern).unwrap().upcoming_times(from, 2);
        assert_eq!(times[1] - times[0], chrono::Duration::days(7));
    }

    #[test]
    fn test_monthly_fires_on_first_day() {
        let from = Utc.with_ymd_and_hms(2024, 3, 5, 10, 30, 0).unwrap();
        let next = next_fire(&AppSchedule::monthly(), from);
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_custom_unix_expression_remapped() {
        let pattern = cron_pattern(&AppSchedule::custom("30 2 * * *")).unwrap();
        assert_eq!(pattern, "0 30 2 * * *");
    }

    #[test]
    fn test_custom_dow_numbers_remapped_to_names() {
        assert_eq!(from_unix_cron("0 0 * * 0").unwrap(), "0 0 0 * * SUN");
        assert_eq!(from_unix_cron("0 0 * * 7").unwrap(), "0 0 0 * * SUN");
        assert_eq!(from_unix_cron("0 0 * * 1-5").unwrap(), "0 0 0 * * MON-FRI");
        assert_eq!(
            from_unix_cron("0 0 * * 1,3,5").unwrap(),
            "0 0 0 * * MON,WED,FRI"
        );
    }

    #[test]
    fn test_custom_empty_expression_rejected_at_translation() {
        for schedule in [
            AppSchedule::custom(""),
            AppSchedule::custom("   "),
            AppSchedule {
                schedule_type: ScheduleType::Custom,
                cron_expression: None,
            },
        ] {
            assert!(matches!(
                cron_pattern(&schedule),
                Err(SchedulerError::InvalidSchedule(_))
            ));
        }
    }

    #[test]
    fn test_unknown_schedule_type_rejected() {
        let schedule = AppSchedule {
            schedule_type: ScheduleType::Unknown,
            cron_expression: None,
        };
        assert!(matches!(
            cron_pattern(&schedule),
            Err(SchedulerError::InvalidSchedule(_))
        ));
    }

    #[test]
    fn test_wrong_field_count_rejected() {
        assert!(from_unix_cron("0 0 * *").is_err());
        assert!(from_unix_cron("0 0 0 * * *").is_err());
    }

    #[test]
    fn test_build_trigger_sets_first_fire_within_period() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 10, 30, 0).unwrap();
        let trigger =
            build_trigger(JobKey::scheduled("reindex-app"), &AppSchedule::hourly(), now).unwrap();
        // 首次触发落在当前小时边界内
        let first = trigger.next_fire_time.unwrap();
        assert!(first > now);
        assert!(first - now <= chrono::Duration::hours(1));
        assert!(!trigger.is_one_shot());
    }
}
