//! Cron scheduler — persistent time-triggered job source.
//!
//! Jobs carry a typed schedule (`at HH:MM` daily, `every DURATION`
//! interval, or a raw 5-field cron expression), a message payload, and a
//! target session key. Each trigger publishes a synthetic inbound message
//! on the bus with `channel = "system"`, the session-key override set, and
//! `{source: "cron", job_id}` metadata. The agent loop handles it like any
//! other inbound.
//!
//! Every mutation is persisted immediately to a JSON file; on start the
//! store is rehydrated and every job re-registered.

use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::bus::{InboundMessage, MessageBus};
use crate::error::{NanobotError, Result};

/// How a job is scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleType {
    /// Daily at a wall-clock time ("14:30")
    At,
    /// Every fixed interval ("30m", "2h", "90s")
    Every,
    /// Raw 5-field cron expression
    Cron,
}

/// A typed schedule: the type tag plus its expression.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CronSchedule {
    #[serde(rename = "type")]
    pub schedule_type: ScheduleType,
    pub expression: String,
}

impl CronSchedule {
    pub fn at(expression: &str) -> Self {
        Self {
            schedule_type: ScheduleType::At,
            expression: expression.to_string(),
        }
    }

    pub fn every(expression: &str) -> Self {
        Self {
            schedule_type: ScheduleType::Every,
            expression: expression.to_string(),
        }
    }

    pub fn cron(expression: &str) -> Self {
        Self {
            schedule_type: ScheduleType::Cron,
            expression: expression.to_string(),
        }
    }

    /// Parse a user-facing schedule string: `at HH:MM`, `every DURATION`,
    /// or anything else as a raw cron expression.
    pub fn parse(input: &str) -> Self {
        let trimmed = input.trim();
        if let Some(rest) = trimmed.strip_prefix("at ") {
            Self::at(rest.trim())
        } else if let Some(rest) = trimmed.strip_prefix("every ") {
            Self::every(rest.trim())
        } else {
            Self::cron(trimmed)
        }
    }
}

/// A registered cron job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CronJob {
    pub id: String,
    pub schedule: CronSchedule,
    /// Message published when the job fires
    pub message: String,
    /// Target session key
    #[serde(rename = "sessionKey")]
    pub session_key: String,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

/// On-disk store shape.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct CronStore {
    jobs: Vec<CronJob>,
}

/// Convert a typed schedule to a canonical 5-field cron expression, or an
/// interval in seconds for `every` schedules.
///
/// `at H:M` with `H∈[0,23], M∈[0,59]` maps to `"M H * * *"`; out-of-range
/// times and unparseable durations are rejected at insertion time.
pub fn to_cron_expr(schedule: &CronSchedule) -> Result<CompiledSchedule> {
    match schedule.schedule_type {
        ScheduleType::Cron => {
            let expr = schedule.expression.trim();
            validate_cron_expr(expr)?;
            Ok(CompiledSchedule::Expr(expr.to_string()))
        }
        ScheduleType::Every => {
            let secs = parse_duration_secs(&schedule.expression)?;
            Ok(CompiledSchedule::IntervalSecs(secs))
        }
        ScheduleType::At => {
            let (h, m) = parse_wall_clock(&schedule.expression)?;
            Ok(CompiledSchedule::Expr(format!("{} {} * * *", m, h)))
        }
    }
}

/// A validated schedule ready for next-run computation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompiledSchedule {
    /// A 5-field cron expression
    Expr(String),
    /// A fixed interval in seconds
    IntervalSecs(u64),
}

impl CompiledSchedule {
    /// Next fire time strictly after `now`.
    fn next_after(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            CompiledSchedule::IntervalSecs(secs) => {
                Some(now + chrono::Duration::seconds(*secs as i64))
            }
            CompiledSchedule::Expr(expr) => {
                // The cron crate wants a seconds field; prepend one.
                let six_field = format!("0 {}", expr);
                let schedule = cron::Schedule::from_str(&six_field).ok()?;
                schedule.after(&now).next()
            }
        }
    }
}

fn validate_cron_expr(expr: &str) -> Result<()> {
    if expr.split_whitespace().count() != 5 {
        return Err(NanobotError::Tool(format!(
            "invalid cron expression {:?}: expected 5 fields",
            expr
        )));
    }
    let six_field = format!("0 {}", expr);
    cron::Schedule::from_str(&six_field)
        .map(|_| ())
        .map_err(|e| NanobotError::Tool(format!("invalid cron expression {:?}: {}", expr, e)))
}

/// Parse `HH:MM` with range validation.
fn parse_wall_clock(expression: &str) -> Result<(u32, u32)> {
    let parts: Vec<&str> = expression.trim().split(':').collect();
    let parse_err = || {
        NanobotError::Tool(format!(
            "invalid time {:?}, expected HH:MM",
            expression
        ))
    };
    if parts.len() != 2 {
        return Err(parse_err());
    }
    let h: u32 = parts[0].parse().map_err(|_| parse_err())?;
    let m: u32 = parts[1].parse().map_err(|_| parse_err())?;
    if h > 23 || m > 59 {
        return Err(NanobotError::Tool(format!(
            "time {:?} out of range",
            expression
        )));
    }
    Ok((h, m))
}

/// Parse a duration like `90s`, `10m`, `2h`, `1d`, or a bare number of
/// seconds.
fn parse_duration_secs(expression: &str) -> Result<u64> {
    let trimmed = expression.trim();
    let err = || NanobotError::Tool(format!("invalid duration {:?}", expression));

    if trimmed.is_empty() {
        return Err(err());
    }
    if let Ok(secs) = trimmed.parse::<u64>() {
        return if secs > 0 { Ok(secs) } else { Err(err()) };
    }

    let (number, unit) = trimmed.split_at(trimmed.len() - 1);
    let value: u64 = number.parse().map_err(|_| err())?;
    let secs = match unit {
        "s" => value,
        "m" => value * 60,
        "h" => value * 3600,
        "d" => value * 86_400,
        _ => return Err(err()),
    };
    if secs == 0 {
        return Err(err());
    }
    Ok(secs)
}

/// Runtime state for one job.
struct ScheduledJob {
    job: CronJob,
    compiled: CompiledSchedule,
    next_run: Option<DateTime<Utc>>,
}

/// Persistent cron scheduler publishing onto the bus.
pub struct CronService {
    store_path: PathBuf,
    bus: Arc<MessageBus>,
    jobs: Arc<RwLock<HashMap<String, ScheduledJob>>>,
    counter: Arc<Mutex<u64>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl CronService {
    /// Create a service persisting to `store_path`.
    pub fn new(store_path: PathBuf, bus: Arc<MessageBus>) -> Self {
        Self {
            store_path,
            bus,
            jobs: Arc::new(RwLock::new(HashMap::new())),
            counter: Arc::new(Mutex::new(0)),
            handle: Mutex::new(None),
        }
    }

    /// Start the 1-second tick loop. Idempotent.
    pub async fn start(&self, cancel: CancellationToken) {
        let mut handle = self.handle.lock().await;
        if handle.as_ref().map(|h| !h.is_finished()).unwrap_or(false) {
            return;
        }

        let jobs = Arc::clone(&self.jobs);
        let bus = Arc::clone(&self.bus);
        info!("Cron scheduler started");
        *handle = Some(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!("Cron scheduler stopped");
                        return;
                    }
                    _ = tokio::time::sleep(std::time::Duration::from_secs(1)) => {
                        tick(&jobs, &bus).await;
                    }
                }
            }
        }));
    }

    /// Stop the tick loop.
    pub async fn stop(&self) {
        if let Some(handle) = self.handle.lock().await.take() {
            handle.abort();
        }
    }

    /// Add a job. The schedule is validated and the store persisted before
    /// this returns.
    pub async fn add_job(
        &self,
        schedule: CronSchedule,
        message: &str,
        session_key: &str,
    ) -> Result<String> {
        let compiled = to_cron_expr(&schedule)?;

        let id = {
            let mut counter = self.counter.lock().await;
            let id = format!("cron_{}", *counter);
            *counter += 1;
            id
        };

        let job = CronJob {
            id: id.clone(),
            schedule,
            message: message.to_string(),
            session_key: session_key.to_string(),
            created_at: Utc::now(),
        };

        {
            let mut jobs = self.jobs.write().await;
            let next_run = compiled.next_after(Utc::now());
            jobs.insert(
                id.clone(),
                ScheduledJob {
                    job,
                    compiled,
                    next_run,
                },
            );
        }

        if let Err(e) = self.save_to_disk().await {
            warn!(error = %e, "Failed to persist cron jobs");
        }
        Ok(id)
    }

    /// Remove a job by id.
    pub async fn remove_job(&self, id: &str) -> Result<()> {
        let removed = {
            let mut jobs = self.jobs.write().await;
            jobs.remove(id).is_some()
        };
        if !removed {
            return Err(NanobotError::Tool(format!("job {:?} not found", id)));
        }
        if let Err(e) = self.save_to_disk().await {
            warn!(error = %e, "Failed to persist cron jobs after removal");
        }
        Ok(())
    }

    /// All registered jobs, sorted by id.
    pub async fn list_jobs(&self) -> Vec<CronJob> {
        let jobs = self.jobs.read().await;
        let mut out: Vec<CronJob> = jobs.values().map(|s| s.job.clone()).collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }

    /// Load persisted jobs and re-register them. Re-registration failures
    /// are logged and skipped.
    pub async fn load_from_disk(&self) -> Result<()> {
        let data = match tokio::fs::read_to_string(&self.store_path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        let store: CronStore = serde_json::from_str(&data)?;
        for job in store.jobs {
            if let Err(e) = self
                .add_job(job.schedule.clone(), &job.message, &job.session_key)
                .await
            {
                warn!(job_id = %job.id, error = %e, "Failed to restore cron job");
            }
        }
        Ok(())
    }

    async fn save_to_disk(&self) -> Result<()> {
        let store = CronStore {
            jobs: self.list_jobs().await,
        };
        if let Some(parent) = self.store_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(&store)?;
        tokio::fs::write(&self.store_path, json).await?;
        Ok(())
    }
}

/// One scheduler tick: fire all due jobs and re-arm them.
async fn tick(jobs: &RwLock<HashMap<String, ScheduledJob>>, bus: &MessageBus) {
    let now = Utc::now();
    let due: Vec<(String, String, String)> = {
        let jobs = jobs.read().await;
        jobs.values()
            .filter(|s| s.next_run.map(|t| t <= now).unwrap_or(false))
            .map(|s| {
                (
                    s.job.id.clone(),
                    s.job.message.clone(),
                    s.job.session_key.clone(),
                )
            })
            .collect()
    };

    for (id, message, session_key) in due {
        let inbound = InboundMessage::new("system", "cron", &session_key, &message)
            .with_session_key(&session_key)
            .with_metadata("source", "cron")
            .with_metadata("job_id", &id);
        if let Err(e) = bus.publish_inbound(inbound).await {
            error!(job_id = %id, error = %e, "Failed to publish cron trigger");
        }

        let mut jobs = jobs.write().await;
        if let Some(scheduled) = jobs.get_mut(&id) {
            scheduled.next_run = scheduled.compiled.next_after(now);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_to_cron_expr_at() {
        for (h, m) in [(0u32, 0u32), (9, 30), (23, 59)] {
            let schedule = CronSchedule::at(&format!("{}:{:02}", h, m));
            let compiled = to_cron_expr(&schedule).unwrap();
            assert_eq!(
                compiled,
                CompiledSchedule::Expr(format!("{} {} * * *", m, h))
            );
        }
    }

    #[test]
    fn test_to_cron_expr_at_out_of_range() {
        for expr in ["25:00", "12:75", "not-a-time", "1:2:3"] {
            assert!(to_cron_expr(&CronSchedule::at(expr)).is_err(), "{}", expr);
        }
    }

    #[test]
    fn test_to_cron_expr_every() {
        assert_eq!(
            to_cron_expr(&CronSchedule::every("90s")).unwrap(),
            CompiledSchedule::IntervalSecs(90)
        );
        assert_eq!(
            to_cron_expr(&CronSchedule::every("10m")).unwrap(),
            CompiledSchedule::IntervalSecs(600)
        );
        assert_eq!(
            to_cron_expr(&CronSchedule::every("2h")).unwrap(),
            CompiledSchedule::IntervalSecs(7200)
        );
        assert_eq!(
            to_cron_expr(&CronSchedule::every("45")).unwrap(),
            CompiledSchedule::IntervalSecs(45)
        );
    }

    #[test]
    fn test_to_cron_expr_every_invalid() {
        for expr in ["", "0s", "abc", "-5m", "5x"] {
            assert!(to_cron_expr(&CronSchedule::every(expr)).is_err(), "{}", expr);
        }
    }

    #[test]
    fn test_to_cron_expr_raw() {
        assert!(to_cron_expr(&CronSchedule::cron("*/5 * * * *")).is_ok());
        assert!(to_cron_expr(&CronSchedule::cron("0 12 * * 1")).is_ok());
        assert!(to_cron_expr(&CronSchedule::cron("bad expr")).is_err());
        assert!(to_cron_expr(&CronSchedule::cron("* * * *")).is_err());
    }

    #[test]
    fn test_schedule_parse() {
        assert_eq!(CronSchedule::parse("at 14:30").schedule_type, ScheduleType::At);
        assert_eq!(
            CronSchedule::parse("every 30m").schedule_type,
            ScheduleType::Every
        );
        assert_eq!(
            CronSchedule::parse("*/5 * * * *").schedule_type,
            ScheduleType::Cron
        );
        assert_eq!(CronSchedule::parse("at 14:30").expression, "14:30");
    }

    #[tokio::test]
    async fn test_add_list_remove_job() {
        let dir = tempdir().unwrap();
        let service = CronService::new(dir.path().join("cron.json"), Arc::new(MessageBus::new()));

        let id = service
            .add_job(CronSchedule::every("1h"), "hello", "test:1")
            .await
            .unwrap();
        assert_eq!(id, "cron_0");

        let jobs = service.list_jobs().await;
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].message, "hello");
        assert_eq!(jobs[0].session_key, "test:1");

        service.remove_job(&id).await.unwrap();
        assert!(service.list_jobs().await.is_empty());
    }

    #[tokio::test]
    async fn test_remove_unknown_job() {
        let dir = tempdir().unwrap();
        let service = CronService::new(dir.path().join("cron.json"), Arc::new(MessageBus::new()));
        assert!(service.remove_job("cron_99").await.is_err());
    }

    #[tokio::test]
    async fn test_add_job_rejects_invalid_schedule() {
        let dir = tempdir().unwrap();
        let service = CronService::new(dir.path().join("cron.json"), Arc::new(MessageBus::new()));
        assert!(service
            .add_job(CronSchedule::at("25:00"), "x", "k")
            .await
            .is_err());
        assert!(service.list_jobs().await.is_empty());
    }

    #[tokio::test]
    async fn test_persistence_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cron.json");
        let bus = Arc::new(MessageBus::new());

        {
            let service = CronService::new(path.clone(), Arc::clone(&bus));
            service
                .add_job(CronSchedule::at("09:00"), "morning", "telegram:1")
                .await
                .unwrap();
        }

        let service = CronService::new(path, bus);
        service.load_from_disk().await.unwrap();
        let jobs = service.list_jobs().await;
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].schedule.expression, "09:00");
        assert_eq!(jobs[0].message, "morning");
    }

    #[tokio::test]
    async fn test_trigger_publishes_inbound() {
        let dir = tempdir().unwrap();
        let bus = Arc::new(MessageBus::new());
        let service = CronService::new(dir.path().join("cron.json"), Arc::clone(&bus));

        service
            .add_job(CronSchedule::every("1s"), "ping", "test-session")
            .await
            .unwrap();

        let cancel = CancellationToken::new();
        service.start(cancel.clone()).await;

        // Within 3 s the bus must deliver the synthetic inbound message.
        let consume_cancel = CancellationToken::new();
        let msg = tokio::time::timeout(
            std::time::Duration::from_secs(3),
            bus.consume_inbound(&consume_cancel),
        )
        .await
        .expect("cron did not fire in time")
        .unwrap();

        assert_eq!(msg.channel, "system");
        assert_eq!(msg.content, "ping");
        assert_eq!(msg.session_key(), "test-session");
        assert_eq!(msg.metadata.get("source"), Some(&"cron".to_string()));
        assert!(msg.metadata.get("job_id").is_some());

        cancel.cancel();
        service.stop().await;
    }

    #[test]
    fn test_interval_next_after() {
        let now = Utc::now();
        let next = CompiledSchedule::IntervalSecs(60).next_after(now).unwrap();
        assert_eq!((next - now).num_seconds(), 60);
    }

    #[test]
    fn test_expr_next_after_daily() {
        let compiled = to_cron_expr(&CronSchedule::at("12:00")).unwrap();
        let next = compiled.next_after(Utc::now()).unwrap();
        assert_eq!(next.format("%H:%M").to_string(), "12:00");
    }
}
