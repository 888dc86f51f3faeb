// SPDX-License-Identifier: Apache-2.0
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::interval::parse_interval;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    At,
    Every,
    Cron,
}

/// The outcome of a job's most recent execution, recorded by `mark_executed`
/// so it is observable through `get_last_result` / the gateway's `list_jobs`
/// without a separate log scrape.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum JobResult {
    Success { text: String },
    Failure { error: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub agent_id: String,
    pub name: String,
    pub prompt: String,
    pub kind: JobKind,
    /// Raw schedule text: an ISO-8601 timestamp for `at`, an interval string
    /// for `every`, a 5-field cron expression for `cron`.
    pub schedule: String,
    pub created_at: DateTime<Utc>,
    pub next_run: Option<DateTime<Utc>>,
    pub last_run: Option<DateTime<Utc>>,
    pub run_count: u64,
    pub max_runs: Option<u64>,
    pub enabled: bool,
    pub last_result: Option<JobResult>,
}

impl Job {
    /// `at` jobs expire the instant they have run once; this is computed,
    /// never stored, so it can never drift out of sync with `run_count`.
    pub fn expired(&self) -> bool {
        self.kind == JobKind::At && self.run_count > 0
    }

    fn max_runs_exhausted(&self) -> bool {
        self.max_runs.map(|m| self.run_count >= m).unwrap_or(false)
    }

    /// Recompute `next_run` from `from` (the last execution time, or
    /// `created_at` if the job has never run). Returns `None` — excluding
    /// the job from `get_due` — when disabled, expired, or out of runs.
    pub fn calculate_next_run(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if !self.enabled || self.expired() || self.max_runs_exhausted() {
            return None;
        }

        match self.kind {
            JobKind::At => {
                if self.run_count > 0 {
                    None
                } else {
                    DateTime::parse_from_rfc3339(&self.schedule).ok().map(|d| d.with_timezone(&Utc))
                }
            }
            JobKind::Every => {
                let interval = parse_interval(&self.schedule).ok()?;
                Some(from + interval)
            }
            JobKind::Cron => {
                let schedule = cron::Schedule::from_str(&with_seconds_field(&self.schedule)).ok()?;
                schedule.after(&from).next()
            }
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.enabled && !self.expired() && self.next_run.map(|t| t <= now).unwrap_or(false)
    }
}

/// The `cron` crate parses 6/7-field expressions with a leading seconds
/// field; this dialect's grammar is the standard 5-field
/// minute/hour/day/month/weekday form, so a bare `"0 "` is prepended before
/// handing the expression to the library.
fn with_seconds_field(expr: &str) -> String {
    format!("0 {expr}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn base_job(kind: JobKind, schedule: &str) -> Job {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        Job {
            id: "j1".into(),
            agent_id: "main".into(),
            name: "rep".into(),
            prompt: "status".into(),
            kind,
            schedule: schedule.into(),
            created_at: now,
            next_run: None,
            last_run: None,
            run_count: 0,
            max_runs: None,
            enabled: true,
            last_result: None,
        }
    }

    #[test]
    fn at_job_expires_after_first_run() {
        let mut job = base_job(JobKind::At, "2026-01-01T00:00:00Z");
        assert!(!job.expired());
        job.run_count = 1;
        assert!(job.expired());
    }

    #[test]
    fn at_job_next_run_is_none_once_expired() {
        let mut job = base_job(JobKind::At, "2026-01-01T00:00:00Z");
        job.run_count = 1;
        assert!(job.calculate_next_run(job.created_at).is_none());
    }

    #[test]
    fn every_job_next_run_adds_interval_to_from() {
        let job = base_job(JobKind::Every, "5m");
        let from = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let next = job.calculate_next_run(from).unwrap();
        assert_eq!(next, from + chrono::Duration::minutes(5));
    }

    #[test]
    fn cron_job_next_run_is_strictly_after_from() {
        let job = base_job(JobKind::Cron, "*/5 * * * *");
        let from = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let next = job.calculate_next_run(from).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 1, 1, 0, 5, 0).unwrap());
    }

    #[test]
    fn disabled_job_has_no_next_run() {
        let mut job = base_job(JobKind::Every, "5m");
        job.enabled = false;
        assert!(job.calculate_next_run(job.created_at).is_none());
    }

    #[test]
    fn max_runs_exhausted_has_no_next_run() {
        let mut job = base_job(JobKind::Every, "5m");
        job.max_runs = Some(2);
        job.run_count = 2;
        assert!(job.calculate_next_run(job.created_at).is_none());
    }

    #[test]
    fn is_due_requires_next_run_at_or_before_now() {
        let mut job = base_job(JobKind::Every, "5m");
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 5, 0).unwrap();
        job.next_run = Some(now);
        assert!(job.is_due(now));
        assert!(!job.is_due(now - chrono::Duration::seconds(1)));
    }
}
