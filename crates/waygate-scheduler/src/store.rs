// SPDX-License-Identifier: Apache-2.0
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::warn;
use uuid::Uuid;

use crate::job::{Job, JobKind, JobResult};

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("job '{0}' not found")]
    NotFound(String),
}

/// Owns `.scheduler/jobs.jsonl`. Reload prunes expired `at` jobs — "append-only"
/// describes the on-disk record shape (one job per line), not an unbounded
/// log: every mutation rewrites the file from the current in-memory set.
pub struct Scheduler {
    path: PathBuf,
    jobs: Mutex<Vec<Job>>,
}

impl Scheduler {
    pub fn open(workspace_dir: &Path) -> Result<Self, SchedulerError> {
        let dir = workspace_dir.join(".scheduler");
        std::fs::create_dir_all(&dir)?;
        let path = dir.join("jobs.jsonl");

        let mut jobs = Vec::new();
        if let Ok(text) = std::fs::read_to_string(&path) {
            for (lineno, line) in text.lines().enumerate() {
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<Job>(line) {
                    Ok(job) if !job.expired() => jobs.push(job),
                    Ok(_) => {}
                    Err(err) => warn!(line = lineno + 1, %err, "skipping unparseable job record"),
                }
            }
        }

        let store = Self { path, jobs: Mutex::new(jobs) };
        Ok(store)
    }

    fn persist(&self, jobs: &[Job]) -> Result<(), SchedulerError> {
        let mut text = String::new();
        for job in jobs {
            text.push_str(&serde_json::to_string(job)?);
            text.push('\n');
        }
        let tmp = self.path.with_extension("jsonl.tmp");
        std::fs::write(&tmp, text)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    async fn insert(&self, mut job: Job) -> Result<Job, SchedulerError> {
        job.next_run = job.calculate_next_run(job.created_at);
        let mut jobs = self.jobs.lock().await;
        jobs.push(job.clone());
        self.persist(&jobs)?;
        Ok(job)
    }

    fn new_job(agent_id: &str, name: &str, prompt: &str, kind: JobKind, schedule: String, max_runs: Option<u64>) -> Job {
        Job {
            id: Uuid::new_v4().to_string(),
            agent_id: agent_id.to_string(),
            name: name.to_string(),
            prompt: prompt.to_string(),
            kind,
            schedule,
            created_at: Utc::now(),
            next_run: None,
            last_run: None,
            run_count: 0,
            max_runs,
            enabled: true,
            last_result: None,
        }
    }

    pub async fn create_at(
        &self,
        agent_id: &str,
        name: &str,
        prompt: &str,
        at_utc: DateTime<Utc>,
    ) -> Result<Job, SchedulerError> {
        let job = Self::new_job(agent_id, name, prompt, JobKind::At, at_utc.to_rfc3339(), None);
        self.insert(job).await
    }

    pub async fn create_every(
        &self,
        agent_id: &str,
        name: &str,
        prompt: &str,
        interval: &str,
        max_runs: Option<u64>,
    ) -> Result<Job, SchedulerError> {
        let job = Self::new_job(agent_id, name, prompt, JobKind::Every, interval.to_string(), max_runs);
        self.insert(job).await
    }

    pub async fn create_cron(
        &self,
        agent_id: &str,
        name: &str,
        prompt: &str,
        cron_expr: &str,
        max_runs: Option<u64>,
    ) -> Result<Job, SchedulerError> {
        let job = Self::new_job(agent_id, name, prompt, JobKind::Cron, cron_expr.to_string(), max_runs);
        self.insert(job).await
    }

    pub async fn delete(&self, id: &str) -> Result<bool, SchedulerError> {
        let mut jobs = self.jobs.lock().await;
        let before = jobs.len();
        jobs.retain(|j| j.id != id);
        let removed = jobs.len() != before;
        if removed {
            self.persist(&jobs)?;
        }
        Ok(removed)
    }

    pub async fn set_enabled(&self, id: &str, enabled: bool) -> Result<bool, SchedulerError> {
        let mut jobs = self.jobs.lock().await;
        let Some(job) = jobs.iter_mut().find(|j| j.id == id) else {
            return Ok(false);
        };
        job.enabled = enabled;
        let from = job.last_run.unwrap_or(job.created_at);
        job.next_run = job.calculate_next_run(from);
        self.persist(&jobs)?;
        Ok(true)
    }

    /// Jobs due at or before `now`, ordered by `next_run` ascending (§5's
    /// within-tick ordering guarantee).
    pub async fn get_due(&self, now: DateTime<Utc>) -> Vec<Job> {
        let jobs = self.jobs.lock().await;
        let mut due: Vec<Job> = jobs.iter().filter(|j| j.is_due(now)).cloned().collect();
        due.sort_by_key(|j| j.next_run);
        due
    }

    /// Record the outcome of executing `job`, advance `run_count`/`last_run`,
    /// and recompute `next_run`.
    pub async fn mark_executed(&self, job_id: &str, result: JobResult) -> Result<Job, SchedulerError> {
        let mut jobs = self.jobs.lock().await;
        let job = jobs
            .iter_mut()
            .find(|j| j.id == job_id)
            .ok_or_else(|| SchedulerError::NotFound(job_id.to_string()))?;

        let now = Utc::now();
        job.last_run = Some(now);
        job.run_count += 1;
        job.last_result = Some(result);
        job.next_run = job.calculate_next_run(now);

        let updated = job.clone();
        self.persist(&jobs)?;
        Ok(updated)
    }

    pub async fn get_all(&self) -> Vec<Job> {
        self.jobs.lock().await.clone()
    }

    pub async fn get_last_result(&self, id: &str) -> Option<JobResult> {
        self.jobs.lock().await.iter().find(|j| j.id == id).and_then(|j| j.last_result.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    #[tokio::test]
    async fn at_job_due_exactly_once_then_expired() {
        let dir = tempdir().unwrap();
        let sched = Scheduler::open(dir.path()).unwrap();
        let at = Utc::now() - chrono::Duration::seconds(1);
        let job = sched.create_at("main", "once", "hi", at).await.unwrap();

        let due = sched.get_due(Utc::now()).await;
        assert_eq!(due.len(), 1);

        sched.mark_executed(&job.id, JobResult::Success { text: "ok".into() }).await.unwrap();
        let due_after = sched.get_due(Utc::now()).await;
        assert!(due_after.is_empty());

        let all = sched.get_all().await;
        assert!(all[0].expired());
    }

    #[tokio::test]
    async fn cron_scenario_s_e() {
        let dir = tempdir().unwrap();
        let sched = Scheduler::open(dir.path()).unwrap();
        let t0 = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();

        // Build the job directly to control created_at deterministically.
        let job = Job {
            id: "rep".into(),
            agent_id: "main".into(),
            name: "rep".into(),
            prompt: "status".into(),
            kind: JobKind::Cron,
            schedule: "*/5 * * * *".into(),
            created_at: t0,
            next_run: None,
            last_run: None,
            run_count: 0,
            max_runs: None,
            enabled: true,
            last_result: None,
        };
        let next_run = job.calculate_next_run(t0);
        assert_eq!(next_run, Some(Utc.with_ymd_and_hms(2026, 1, 1, 0, 5, 0).unwrap()));

        let mut job = job;
        job.next_run = next_run;

        let before = t0 + chrono::Duration::minutes(4) + chrono::Duration::seconds(59);
        assert!(!job.is_due(before));

        let at_due = t0 + chrono::Duration::minutes(5);
        assert!(job.is_due(at_due));

        let advanced = job.calculate_next_run(at_due);
        assert_eq!(advanced, Some(Utc.with_ymd_and_hms(2026, 1, 1, 0, 10, 0).unwrap()));
    }

    #[tokio::test]
    async fn mark_executed_unknown_job_errors() {
        let dir = tempdir().unwrap();
        let sched = Scheduler::open(dir.path()).unwrap();
        let err = sched.mark_executed("nope", JobResult::Success { text: "x".into() }).await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn scheduler_failure_does_not_disable_job() {
        let dir = tempdir().unwrap();
        let sched = Scheduler::open(dir.path()).unwrap();
        let job = sched.create_every("main", "rep", "status", "5m", None).await.unwrap();
        sched.mark_executed(&job.id, JobResult::Failure { error: "boom".into() }).await.unwrap();
        let all = sched.get_all().await;
        assert!(all[0].enabled);
        assert!(matches!(all[0].last_result, Some(JobResult::Failure { .. })));
    }

    #[tokio::test]
    async fn get_due_orders_by_next_run_ascending() {
        let dir = tempdir().unwrap();
        let sched = Scheduler::open(dir.path()).unwrap();
        let now = Utc::now();
        sched.create_at("main", "b", "b", now - chrono::Duration::seconds(1)).await.unwrap();
        sched.create_at("main", "a", "a", now - chrono::Duration::seconds(5)).await.unwrap();
        let due = sched.get_due(now).await;
        assert_eq!(due.len(), 2);
        assert_eq!(due[0].name, "a");
        assert_eq!(due[1].name, "b");
    }

    #[tokio::test]
    async fn reload_prunes_expired_at_jobs() {
        let dir = tempdir().unwrap();
        {
            let sched = Scheduler::open(dir.path()).unwrap();
            let job = sched.create_at("main", "once", "hi", Utc::now()).await.unwrap();
            sched.mark_executed(&job.id, JobResult::Success { text: "ok".into() }).await.unwrap();
        }
        let sched = Scheduler::open(dir.path()).unwrap();
        assert!(sched.get_all().await.is_empty());
    }

    #[tokio::test]
    async fn max_runs_excludes_job_from_due_once_hit() {
        let dir = tempdir().unwrap();
        let sched = Scheduler::open(dir.path()).unwrap();
        let job = sched.create_every("main", "rep", "status", "1s", Some(1)).await.unwrap();
        sched.mark_executed(&job.id, JobResult::Success { text: "ok".into() }).await.unwrap();
        let due = sched.get_due(Utc::now() + chrono::Duration::seconds(5)).await;
        assert!(due.is_empty());
    }

    #[tokio::test]
    async fn set_enabled_false_removes_from_due() {
        let dir = tempdir().unwrap();
        let sched = Scheduler::open(dir.path()).unwrap();
        let job = sched.create_every("main", "rep", "status", "1s", None).await.unwrap();
        sched.set_enabled(&job.id, false).await.unwrap();
        let due = sched.get_due(Utc::now() + chrono::Duration::seconds(5)).await;
        assert!(due.is_empty());
    }
}
