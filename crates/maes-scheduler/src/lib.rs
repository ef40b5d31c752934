//! Recurring assessment scheduler
//!
//! One armed tokio timer per active schedule plus an hourly sweep that
//! fires overdue schedules exactly once per sweep, recovering missed runs
//! after downtime. All run times anchor at 02:00 UTC.

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use maes_common::job::JobSpec;
use maes_common::{Benchmark, CoreError, CoreResult, Frequency, Schedule, TriggeredBy};
use maes_queue::JobQueue;
use maes_store::Store;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Hour of day (UTC) scheduled runs anchor to.
pub const RUN_HOUR_UTC: u32 = 2;

/// Sweep cadence for overdue recovery.
pub const SWEEP_INTERVAL_SECS: u64 = 3600;

fn first_of_month_ahead(date: NaiveDate, months: u32) -> NaiveDate {
    let zero_based = date.year() * 12 + date.month0() as i32 + months as i32;
    let year = zero_based.div_euclid(12);
    let month = zero_based.rem_euclid(12) as u32 + 1;
    NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(date)
}

/// Next run instant for a frequency, measured from `from`:
/// daily → next calendar day, weekly → upcoming Sunday, monthly → 1st of
/// next month, quarterly → 1st of the month three months ahead; all at
/// 02:00 UTC.
pub fn next_occurrence(frequency: Frequency, from: DateTime<Utc>) -> DateTime<Utc> {
    let date = from.date_naive();
    let next_date = match frequency {
        Frequency::Daily => date + chrono::Days::new(1),
        Frequency::Weekly => {
            let ahead = 7 - date.weekday().num_days_from_sunday() as u64;
            date + chrono::Days::new(ahead)
        }
        Frequency::Monthly => first_of_month_ahead(date, 1),
        Frequency::Quarterly => first_of_month_ahead(date, 3),
    };
    let run_time = chrono::NaiveTime::from_hms_opt(RUN_HOUR_UTC, 0, 0).unwrap_or_default();
    Utc.from_utc_datetime(&next_date.and_time(run_time))
}

/// Request to create a schedule.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct CreateSchedule {
    pub tenant_id: Uuid,
    pub name: String,
    pub benchmark: Benchmark,
    pub frequency: Frequency,
    #[serde(default)]
    pub parameters: Value,
    pub created_by: String,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

/// Partial update of a schedule.
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct UpdateSchedule {
    pub name: Option<String>,
    pub frequency: Option<Frequency>,
    pub active: Option<bool>,
    pub parameters: Option<Value>,
}

/// Live counters for the stats endpoint.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct SchedulerStats {
    pub active_schedules: u64,
    pub armed_timers: u64,
    pub fired_total: u64,
    pub sweeps_total: u64,
    pub recovered_total: u64,
}

/// Materializes schedules into queue jobs.
pub struct Scheduler {
    store: Store,
    queue: Arc<JobQueue>,
    timers: Mutex<HashMap<Uuid, tokio::task::JoinHandle<()>>>,
    fired: AtomicU64,
    sweeps: AtomicU64,
    recovered: AtomicU64,
}

impl Scheduler {
    pub fn new(store: Store, queue: Arc<JobQueue>) -> Arc<Self> {
        Arc::new(Self {
            store,
            queue,
            timers: Mutex::new(HashMap::new()),
            fired: AtomicU64::new(0),
            sweeps: AtomicU64::new(0),
            recovered: AtomicU64::new(0),
        })
    }

    /// Create a schedule. Active schedules get a future `next_run_at`
    /// immediately; a duplicate (tenant, name) is a conflict.
    pub async fn create_schedule(&self, req: CreateSchedule) -> CoreResult<Schedule> {
        self.store
            .tenants
            .get(req.tenant_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("tenant {}", req.tenant_id)))?;

        let now = Utc::now();
        let schedule = Schedule {
            id: Uuid::new_v4(),
            tenant_id: req.tenant_id,
            name: req.name,
            benchmark: req.benchmark,
            frequency: req.frequency,
            active: req.active,
            next_run_at: req.active.then(|| next_occurrence(req.frequency, now)),
            last_run_at: None,
            last_assessment_id: None,
            parameters: req.parameters,
            created_by: req.created_by,
            created_at: now,
        };
        self.store.schedules.insert(&schedule).await?;
        tracing::info!(schedule = %schedule.id, tenant = %schedule.tenant_id,
            frequency = schedule.frequency.as_str(), "schedule created");
        Ok(schedule)
    }

    /// Apply a partial update. Deactivation disarms the timer before
    /// returning; activation or a frequency change recomputes
    /// `next_run_at`.
    pub async fn update_schedule(
        self: &Arc<Self>,
        id: Uuid,
        update: UpdateSchedule,
    ) -> CoreResult<Schedule> {
        let mut schedule = self
            .store
            .schedules
            .get(id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("schedule {id}")))?;

        let was_active = schedule.active;
        if let Some(name) = update.name {
            schedule.name = name;
        }
        if let Some(parameters) = update.parameters {
            schedule.parameters = parameters;
        }
        let frequency_changed = match update.frequency {
            Some(f) if f != schedule.frequency => {
                schedule.frequency = f;
                true
            }
            _ => false,
        };
        if let Some(active) = update.active {
            schedule.active = active;
        }

        if schedule.active && (!was_active || frequency_changed || schedule.next_run_at.is_none()) {
            schedule.next_run_at = Some(next_occurrence(schedule.frequency, Utc::now()));
        }
        if !schedule.active {
            self.disarm(id);
            schedule.next_run_at = None;
        }

        self.store.schedules.update(&schedule).await?;
        if schedule.active && (!was_active || frequency_changed) {
            self.arm(schedule.clone());
        }
        Ok(schedule)
    }

    /// Delete a schedule, disarming its timer synchronously first.
    pub async fn delete_schedule(&self, id: Uuid) -> CoreResult<()> {
        self.disarm(id);
        self.store.schedules.delete(id).await?;
        tracing::info!(schedule = %id, "schedule deleted");
        Ok(())
    }

    pub async fn get_schedule(&self, id: Uuid) -> CoreResult<Option<Schedule>> {
        Ok(self.store.schedules.get(id).await?)
    }

    pub async fn list_schedules(&self, tenant_id: Uuid) -> CoreResult<Vec<Schedule>> {
        Ok(self.store.schedules.list_for_tenant(tenant_id).await?)
    }

    pub async fn stats(&self) -> CoreResult<SchedulerStats> {
        let active = self.store.schedules.list_active().await?.len() as u64;
        Ok(SchedulerStats {
            active_schedules: active,
            armed_timers: self.armed_count() as u64,
            fired_total: self.fired.load(Ordering::Relaxed),
            sweeps_total: self.sweeps.load(Ordering::Relaxed),
            recovered_total: self.recovered.load(Ordering::Relaxed),
        })
    }

    /// Arm every active schedule and run the hourly recovery sweep until
    /// cancelled. This is the scheduler process's main loop.
    pub async fn start(self: Arc<Self>) -> CoreResult<()> {
        for schedule in self.store.schedules.list_active().await? {
            self.arm(schedule);
        }
        tracing::info!(armed = self.armed_count(), "scheduler started");

        let mut sweep = tokio::time::interval(std::time::Duration::from_secs(SWEEP_INTERVAL_SECS));
        sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        sweep.tick().await; // the interval's immediate first tick
        loop {
            sweep.tick().await;
            if let Err(e) = self.recover_overdue().await {
                tracing::error!(error = %e, "overdue sweep failed");
            }
        }
    }

    /// Fire every active schedule whose `next_run_at` lies in the past,
    /// exactly once per sweep.
    pub async fn recover_overdue(&self) -> CoreResult<u32> {
        self.sweeps.fetch_add(1, Ordering::Relaxed);
        let overdue = self.store.schedules.list_overdue(Utc::now()).await?;
        let mut recovered = 0u32;
        for schedule in overdue {
            if let Err(e) = self.fire(&schedule).await {
                tracing::error!(schedule = %schedule.id, error = %e, "recovery fire failed");
                continue;
            }
            recovered += 1;
        }
        if recovered > 0 {
            self.recovered.fetch_add(recovered as u64, Ordering::Relaxed);
            tracing::info!(recovered, "recovered missed schedule runs");
        }
        Ok(recovered)
    }

    /// Enqueue one run and advance the schedule's pointers. The timer
    /// advances only after the job is enqueued.
    async fn fire(&self, schedule: &Schedule) -> CoreResult<()> {
        let now = Utc::now();
        let name = format!("{} - {}", schedule.name, now.format("%Y-%m-%dT%H:%M:%SZ"));
        let spec = JobSpec::new(
            schedule.tenant_id,
            schedule.benchmark,
            name,
            TriggeredBy::Schedule(schedule.id),
        )
        .scheduled()
        .with_parameters(schedule.parameters.clone());
        let job_id = self.queue.enqueue(spec).await?;

        let next = next_occurrence(schedule.frequency, now);
        self.store.schedules.mark_fired(schedule.id, now, next).await?;
        self.fired.fetch_add(1, Ordering::Relaxed);
        tracing::info!(schedule = %schedule.id, job = %job_id, next_run = %next, "schedule fired");
        Ok(())
    }

    /// Arm (or re-arm) the timer for one schedule. At most one armed
    /// timer exists per schedule id.
    pub fn arm(self: &Arc<Self>, schedule: Schedule) {
        let id = schedule.id;
        let this = self.clone();
        let handle = tokio::spawn(async move {
            loop {
                let Ok(Some(current)) = this.store.schedules.get(id).await else {
                    break;
                };
                if !current.active {
                    break;
                }
                let Some(next) = current.next_run_at else {
                    break;
                };
                let wait = (next - Utc::now()).to_std().unwrap_or_default();
                tokio::time::sleep(wait).await;

                // Deactivation or deletion during the sleep wins.
                let Ok(Some(fresh)) = this.store.schedules.get(id).await else {
                    break;
                };
                if !fresh.active {
                    break;
                }
                if let Err(e) = this.fire(&fresh).await {
                    tracing::error!(schedule = %id, error = %e, "timer fire failed");
                    break;
                }
            }
        });

        let mut timers = self.timers.lock();
        if let Some(old) = timers.insert(id, handle) {
            old.abort();
        }
    }

    /// Cancel the armed timer for a schedule, synchronously.
    pub fn disarm(&self, id: Uuid) {
        if let Some(handle) = self.timers.lock().remove(&id) {
            handle.abort();
        }
    }

    pub fn armed_count(&self) -> usize {
        self.timers.lock().values().filter(|h| !h.is_finished()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use maes_common::job::JobStatus;
    use maes_common::Credentials;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn daily_advances_to_next_day_at_0200() {
        let created = utc(2025, 1, 5, 10, 0);
        assert_eq!(next_occurrence(Frequency::Daily, created), utc(2025, 1, 6, 2, 0));
        // After a fire at the armed instant the pointer moves one more day.
        let fired = utc(2025, 1, 6, 2, 0);
        assert_eq!(next_occurrence(Frequency::Daily, fired), utc(2025, 1, 7, 2, 0));
    }

    #[test]
    fn weekly_lands_on_the_upcoming_sunday() {
        // 2025-01-05 is a Sunday; the upcoming Sunday is a week out.
        assert_eq!(
            next_occurrence(Frequency::Weekly, utc(2025, 1, 5, 10, 0)),
            utc(2025, 1, 12, 2, 0)
        );
        // Midweek lands on the nearest Sunday ahead.
        assert_eq!(
            next_occurrence(Frequency::Weekly, utc(2025, 1, 8, 10, 0)),
            utc(2025, 1, 12, 2, 0)
        );
    }

    #[test]
    fn monthly_and_quarterly_land_on_the_first() {
        assert_eq!(
            next_occurrence(Frequency::Monthly, utc(2025, 1, 15, 10, 0)),
            utc(2025, 2, 1, 2, 0)
        );
        assert_eq!(
            next_occurrence(Frequency::Monthly, utc(2024, 12, 31, 23, 0)),
            utc(2025, 1, 1, 2, 0)
        );
        assert_eq!(
            next_occurrence(Frequency::Quarterly, utc(2025, 1, 5, 10, 0)),
            utc(2025, 4, 1, 2, 0)
        );
        assert_eq!(
            next_occurrence(Frequency::Quarterly, utc(2024, 11, 15, 10, 0)),
            utc(2025, 2, 1, 2, 0)
        );
    }

    async fn scheduler_fixture() -> (Arc<Scheduler>, Store, Arc<JobQueue>, Uuid) {
        let store = Store::in_memory();
        let queue = Arc::new(JobQueue::new(store.jobs.clone()));
        let scheduler = Scheduler::new(store.clone(), queue.clone());
        let tenant = maes_common::Tenant {
            id: Uuid::new_v4(),
            name: "Contoso".into(),
            directory_tenant_id: "dir-1".into(),
            domain: "contoso.onmicrosoft.com".into(),
            credentials: Credentials::Secret { client_id: "c".into(), client_secret: "s".into() },
            active: true,
            created_at: Utc::now(),
        };
        store.tenants.insert(&tenant).await.unwrap();
        (scheduler, store, queue, tenant.id)
    }

    fn request(tenant_id: Uuid, name: &str) -> CreateSchedule {
        CreateSchedule {
            tenant_id,
            name: name.into(),
            benchmark: Benchmark::CisV4,
            frequency: Frequency::Daily,
            parameters: Value::Null,
            created_by: "tests".into(),
            active: true,
        }
    }

    #[tokio::test]
    async fn active_creation_sets_future_next_run() {
        let (scheduler, _store, _queue, tenant) = scheduler_fixture().await;
        let schedule = scheduler.create_schedule(request(tenant, "daily")).await.unwrap();
        assert!(schedule.active);
        assert!(schedule.next_run_at.unwrap() > Utc::now());
    }

    #[tokio::test]
    async fn duplicate_name_is_a_conflict() {
        let (scheduler, _store, _queue, tenant) = scheduler_fixture().await;
        scheduler.create_schedule(request(tenant, "daily")).await.unwrap();
        match scheduler.create_schedule(request(tenant, "daily")).await {
            Err(CoreError::Conflict(_)) => {}
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_tenant_is_not_found() {
        let (scheduler, _store, _queue, _tenant) = scheduler_fixture().await;
        match scheduler.create_schedule(request(Uuid::new_v4(), "daily")).await {
            Err(CoreError::NotFound(_)) => {}
            other => panic!("expected not found, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn overdue_sweep_fires_and_advances_pointers() {
        let (scheduler, store, queue, tenant) = scheduler_fixture().await;
        let schedule = scheduler.create_schedule(request(tenant, "daily")).await.unwrap();

        // Force the pointer into the past, simulating downtime.
        let overdue_at = Utc::now() - chrono::Duration::hours(3);
        store
            .schedules
            .mark_fired(schedule.id, overdue_at, overdue_at)
            .await
            .unwrap();

        let recovered = scheduler.recover_overdue().await.unwrap();
        assert_eq!(recovered, 1);

        let fresh = store.schedules.get(schedule.id).await.unwrap().unwrap();
        assert!(fresh.last_run_at.unwrap() > overdue_at);
        assert!(fresh.next_run_at.unwrap() > Utc::now());
        assert!(fresh.next_run_at.unwrap() > fresh.last_run_at.unwrap());

        // The fired job carries scheduler priority and the timestamped name.
        let lease = queue.dequeue().await.unwrap().unwrap();
        assert_eq!(lease.record.priority, maes_common::job::SCHEDULED_PRIORITY);
        assert!(lease.record.assessment_name.starts_with("daily - "));
        assert!(matches!(lease.record.triggered_by, TriggeredBy::Schedule(id) if id == schedule.id));
        assert_eq!(lease.record.status, JobStatus::Running);

        // Exactly once per sweep: a second sweep finds nothing.
        assert_eq!(scheduler.recover_overdue().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn deactivation_disarms_and_clears_next_run() {
        let (scheduler, _store, _queue, tenant) = scheduler_fixture().await;
        let schedule = scheduler.create_schedule(request(tenant, "daily")).await.unwrap();
        scheduler.arm(schedule.clone());
        assert_eq!(scheduler.armed_count(), 1);

        let updated = scheduler
            .update_schedule(schedule.id, UpdateSchedule { active: Some(false), ..Default::default() })
            .await
            .unwrap();
        assert!(!updated.active);
        assert!(updated.next_run_at.is_none());
        assert_eq!(scheduler.armed_count(), 0);
    }

    #[tokio::test]
    async fn delete_disarms_synchronously() {
        let (scheduler, store, _queue, tenant) = scheduler_fixture().await;
        let schedule = scheduler.create_schedule(request(tenant, "daily")).await.unwrap();
        scheduler.arm(schedule.clone());
        scheduler.delete_schedule(schedule.id).await.unwrap();
        assert_eq!(scheduler.armed_count(), 0);
        assert!(store.schedules.get(schedule.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rearming_replaces_the_existing_timer() {
        let (scheduler, _store, _queue, tenant) = scheduler_fixture().await;
        let schedule = scheduler.create_schedule(request(tenant, "daily")).await.unwrap();
        scheduler.arm(schedule.clone());
        scheduler.arm(schedule.clone());
        assert_eq!(scheduler.armed_count(), 1);
    }
}
