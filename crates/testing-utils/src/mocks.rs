//! Mock implementations of the storage and host-integration traits
//!
//! This module provides in-memory mock implementations that can be used
//! for unit testing without requiring actual database connections or
//! external services. The mock job store mirrors the transactional
//! semantics of the SQL-backed stores: insert-only triggers, atomic
//! acquisition, and a cluster-visible fired-marker set.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use app_scheduler_domain::{
    AppRunRecord, AppRunRepository, AppRunStatus, DataAccess, JobKey, JobRecord, JobStore,
    SchedulerError, SchedulerResult, SearchClient, TriggerRecord, TriggerState,
};

#[derive(Debug, Clone)]
struct StoredTrigger {
    record: TriggerRecord,
    acquired_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
struct FiredMarker {
    instance_id: String,
    fired_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct JobStoreState {
    jobs: HashMap<JobKey, JobRecord>,
    triggers: HashMap<JobKey, StoredTrigger>,
    fired: HashMap<JobKey, FiredMarker>,
}

/// Mock implementation of JobStore for testing
#[derive(Clone, Default)]
pub struct MockJobStore {
    state: Arc<Mutex<JobStoreState>>,
}

impl MockJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an execution started by another cluster node by inserting
    /// a fired marker directly.
    pub fn mark_executing(&self, key: &JobKey, instance_id: &str) {
        let mut state = self.state.lock().unwrap();
        state.fired.insert(
            key.clone(),
            FiredMarker {
                instance_id: instance_id.to_string(),
                fired_at: Utc::now(),
            },
        );
    }

    pub fn job_count(&self) -> usize {
        self.state.lock().unwrap().jobs.len()
    }

    pub fn fired_count(&self) -> usize {
        self.state.lock().unwrap().fired.len()
    }

    pub fn get_trigger(&self, key: &JobKey) -> Option<TriggerRecord> {
        let state = self.state.lock().unwrap();
        state.triggers.get(key).map(|t| t.record.clone())
    }

    /// Which cluster node holds the fired marker for this job, if any.
    pub fn fired_instance(&self, key: &JobKey) -> Option<String> {
        let state = self.state.lock().unwrap();
        state.fired.get(key).map(|m| m.instance_id.clone())
    }

    pub fn clear(&self) {
        let mut state = self.state.lock().unwrap();
        state.jobs.clear();
        state.triggers.clear();
        state.fired.clear();
    }
}

#[async_trait]
impl JobStore for MockJobStore {
    async fn store_job(&self, job: &JobRecord, trigger: &TriggerRecord) -> SchedulerResult<()> {
        let mut state = self.state.lock().unwrap();
        // Triggers are insert-only: a conflict rolls back the whole write
        if state.triggers.contains_key(&trigger.key) {
            return Err(SchedulerError::JobAlreadyExists {
                key: trigger.key.to_string(),
            });
        }
        state.jobs.insert(job.key.clone(), job.clone());
        state.triggers.insert(
            trigger.key.clone(),
            StoredTrigger {
                record: trigger.clone(),
                acquired_at: None,
            },
        );
        Ok(())
    }

    async fn get_job(&self, key: &JobKey) -> SchedulerResult<Option<JobRecord>> {
        let state = self.state.lock().unwrap();
        Ok(state.jobs.get(key).cloned())
    }

    async fn remove_job(&self, key: &JobKey) -> SchedulerResult<bool> {
        let mut state = self.state.lock().unwrap();
        state.triggers.remove(key);
        state.fired.remove(key);
        Ok(state.jobs.remove(key).is_some())
    }

    async fn acquire_due_triggers(
        &self,
        group: &str,
        instance_id: &str,
        now: DateTime<Utc>,
        limit: u32,
    ) -> SchedulerResult<Vec<TriggerRecord>> {
        let mut state = self.state.lock().unwrap();

        let mut due: Vec<JobKey> = state
            .triggers
            .iter()
            .filter(|(key, stored)| {
                key.group == group
                    && stored.record.state == TriggerState::Waiting
                    && stored
                        .record
                        .next_fire_time
                        .map(|t| t <= now)
                        .unwrap_or(false)
            })
            .map(|(key, _)| key.clone())
            .collect();
        due.sort_by_key(|key| {
            state
                .triggers
                .get(key)
                .and_then(|stored| stored.record.next_fire_time)
        });
        due.truncate(limit as usize);

        let mut acquired = Vec::with_capacity(due.len());
        for key in due {
            if let Some(stored) = state.triggers.get_mut(&key) {
                stored.record.state = TriggerState::Acquired;
                stored.record.acquired_by = Some(instance_id.to_string());
                stored.acquired_at = Some(now);
                acquired.push(stored.record.clone());
            }
        }
        Ok(acquired)
    }

    async fn mark_fired(
        &self,
        key: &JobKey,
        instance_id: &str,
        fire_time: DateTime<Utc>,
    ) -> SchedulerResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.fired.contains_key(key) {
            return Err(SchedulerError::JobAlreadyExists {
                key: key.to_string(),
            });
        }
        state.fired.insert(
            key.clone(),
            FiredMarker {
                instance_id: instance_id.to_string(),
                fired_at: fire_time,
            },
        );
        Ok(())
    }

    async fn complete_trigger(
        &self,
        key: &JobKey,
        prev_fire_time: DateTime<Utc>,
        next_fire_time: Option<DateTime<Utc>>,
    ) -> SchedulerResult<()> {
        let mut state = self.state.lock().unwrap();
        state.fired.remove(key);
        match next_fire_time {
            Some(next) => {
                if let Some(stored) = state.triggers.get_mut(key) {
                    stored.record.state = TriggerState::Waiting;
                    stored.record.acquired_by = None;
                    stored.acquired_at = None;
                    stored.record.prev_fire_time = Some(prev_fire_time);
                    stored.record.next_fire_time = Some(next);
                }
            }
            None => {
                state.triggers.remove(key);
                state.jobs.remove(key);
            }
        }
        Ok(())
    }

    async fn release_trigger(
        &self,
        key: &JobKey,
        next_fire_time: Option<DateTime<Utc>>,
    ) -> SchedulerResult<()> {
        let mut state = self.state.lock().unwrap();
        match next_fire_time {
            Some(next) => {
                if let Some(stored) = state.triggers.get_mut(key) {
                    stored.record.state = TriggerState::Waiting;
                    stored.record.acquired_by = None;
                    stored.acquired_at = None;
                    stored.record.next_fire_time = Some(next);
                }
            }
            None => {
                state.triggers.remove(key);
                state.jobs.remove(key);
            }
        }
        Ok(())
    }

    async fn currently_executing(&self, group: &str) -> SchedulerResult<Vec<JobKey>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .fired
            .keys()
            .filter(|key| key.group == group)
            .cloned()
            .collect())
    }

    async fn recover_stalled(
        &self,
        group: &str,
        now: DateTime<Utc>,
        stall_threshold: Duration,
    ) -> SchedulerResult<u32> {
        let cutoff = now - stall_threshold;
        let mut state = self.state.lock().unwrap();

        let stalled: Vec<JobKey> = state
            .triggers
            .iter()
            .filter(|(key, stored)| {
                key.group == group
                    && stored.record.state == TriggerState::Acquired
                    && stored.acquired_at.map(|t| t < cutoff).unwrap_or(false)
            })
            .map(|(key, _)| key.clone())
            .collect();

        let mut recovered = 0;
        for key in stalled {
            // Non-recoverable jobs are dropped instead of replayed, matching
            // the SQL stores.
            let recoverable = state.jobs.get(&key).map(|j| j.recoverable).unwrap_or(true);
            if recoverable {
                if let Some(stored) = state.triggers.get_mut(&key) {
                    stored.record.state = TriggerState::Waiting;
                    stored.record.acquired_by = None;
                    stored.acquired_at = None;
                    recovered += 1;
                }
            } else {
                state.triggers.remove(&key);
                state.jobs.remove(&key);
            }
        }
        state
            .fired
            .retain(|key, marker| key.group != group || marker.fired_at >= cutoff);
        Ok(recovered)
    }
}

/// Mock implementation of AppRunRepository for testing
#[derive(Clone, Default)]
pub struct MockAppRunRepository {
    records: Arc<Mutex<Vec<AppRunRecord>>>,
}

impl MockAppRunRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all_records(&self) -> Vec<AppRunRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn clear(&self) {
        self.records.lock().unwrap().clear();
    }
}

#[async_trait]
impl AppRunRepository for MockAppRunRepository {
    async fn record_run_started(&self, record: &AppRunRecord) -> SchedulerResult<()> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }

    async fn record_run_finished(
        &self,
        id: Uuid,
        status: AppRunStatus,
        finished_at: DateTime<Utc>,
        error_message: Option<&str>,
    ) -> SchedulerResult<()> {
        let mut records = self.records.lock().unwrap();
        if let Some(record) = records.iter_mut().find(|r| r.id == id) {
            record.status = status;
            record.finished_at = Some(finished_at);
            record.error_message = error_message.map(|s| s.to_string());
        }
        Ok(())
    }

    async fn recent_runs(&self, app_name: &str, limit: i64) -> SchedulerResult<Vec<AppRunRecord>> {
        let records = self.records.lock().unwrap();
        let mut runs: Vec<AppRunRecord> = records
            .iter()
            .filter(|r| r.app_name == app_name)
            .cloned()
            .collect();
        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        runs.truncate(limit as usize);
        Ok(runs)
    }
}

/// Mock metadata store handle, optionally failing its health check
#[derive(Clone, Default)]
pub struct MockDataAccess {
    unhealthy: bool,
}

impl MockDataAccess {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unhealthy() -> Self {
        Self { unhealthy: true }
    }
}

#[async_trait]
impl DataAccess for MockDataAccess {
    async fn health_check(&self) -> SchedulerResult<()> {
        if self.unhealthy {
            Err(SchedulerError::configuration(
                "mock metadata store is unreachable",
            ))
        } else {
            Ok(())
        }
    }
}

/// Mock search client
#[derive(Clone, Default)]
pub struct MockSearchClient;

impl MockSearchClient {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SearchClient for MockSearchClient {
    async fn health_check(&self) -> SchedulerResult<()> {
        Ok(())
    }
}
