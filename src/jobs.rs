// Job layer - the two scheduled entry points and the interval loop
//
// The orchestrator exposes plain `sync()` / `alert()` callables with no
// scheduling knowledge; the scheduler is an explicit tokio interval loop.
// Because both jobs run on the same loop, two invocations of the same job
// can never overlap.

use std::time::Duration;

use anyhow::Result;
use chrono::Local;
use rusqlite::Connection;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use crate::alert::AlertSender;
use crate::config::Settings;
use crate::entities::{FacilityStore, OccupantStore};
use crate::error::SyncError;
use crate::occupancy::OccupancyAggregator;
use crate::reconciliation::ReconciliationEngine;
use crate::report;
use crate::source::TabularSource;
use crate::store::EntityStore;

// ============================================================================
// ORCHESTRATOR
// ============================================================================

/// Wires the engine, aggregator, formatter and alert channel together.
/// All collaborators are constructor-passed; nothing is resolved globally.
pub struct SyncOrchestrator<S, A> {
    conn: Connection,
    source: S,
    sender: A,
    engine: ReconciliationEngine,
    aggregator: OccupancyAggregator,
    threshold: f64,
    alert_recipient: String,
}

impl<S: TabularSource, A: AlertSender> SyncOrchestrator<S, A> {
    pub fn new(
        conn: Connection,
        source: S,
        sender: A,
        batch_size: usize,
        threshold: f64,
        alert_recipient: String,
    ) -> Self {
        SyncOrchestrator {
            conn,
            source,
            sender,
            engine: ReconciliationEngine::new(batch_size),
            aggregator: OccupancyAggregator::new(threshold, batch_size),
            threshold,
            alert_recipient,
        }
    }

    /// One sync run: facilities first, then occupants. The order is a hard
    /// dependency - occupant rows resolve facility names against the store,
    /// so the facility set must be current before the occupant pass starts.
    pub fn sync(&self) -> Result<(), SyncError> {
        info!("sync run started");
        let facilities = FacilityStore::new(&self.conn);
        let occupants = OccupantStore::new(&self.conn);

        let report = self.engine.reconcile_facilities(&self.source, &facilities)?;
        info!(
            added = report.added,
            updated = report.updated,
            deleted = report.deleted,
            "facility reconciliation finished"
        );

        let report = self
            .engine
            .reconcile_occupants(&self.source, &facilities, &occupants)?;
        info!(
            added = report.added,
            updated = report.updated,
            deleted = report.deleted,
            skipped = report.skipped,
            "occupant reconciliation finished"
        );

        info!(
            facilities = facilities.count()?,
            occupants = occupants.count()?,
            "sync run finished"
        );
        Ok(())
    }

    /// One alert run: aggregate, and send a report only when at least one
    /// facility is over the threshold. Never triggers reconciliation.
    pub fn alert(&self) -> Result<()> {
        info!("alert run started");
        let facilities = FacilityStore::new(&self.conn);
        let occupants = OccupantStore::new(&self.conn);

        let rows = self
            .aggregator
            .rows_over_threshold(&facilities, &occupants)?;
        info!(eligible = rows.len(), "occupancy evaluated");

        if rows.is_empty() {
            return Ok(());
        }

        let as_of = Local::now().date_naive();
        let subject = report::subject(self.threshold, as_of);
        let body = report::render(&rows, self.threshold, as_of);
        self.sender.send(&self.alert_recipient, &subject, &body)?;
        Ok(())
    }
}

// ============================================================================
// SCHEDULER
// ============================================================================

/// Two independent cadences driving the orchestrator's entry points.
/// Replaces the original deployment's annotation-declared recurring jobs.
pub struct Scheduler {
    sync_every: Duration,
    alert_every: Duration,
}

impl Scheduler {
    pub fn new(sync_every: Duration, alert_every: Duration) -> Self {
        // A zero interval would make tokio's timer panic.
        let floor = Duration::from_secs(1);
        Scheduler {
            sync_every: sync_every.max(floor),
            alert_every: alert_every.max(floor),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Scheduler::new(
            Duration::from_secs(settings.sync_interval_secs),
            Duration::from_secs(settings.alert_interval_secs),
        )
    }

    /// Drive both jobs forever. Each fires once at startup, then on its own
    /// interval. A failed run is logged and retried implicitly by the next
    /// tick; there is no internal backoff or partial retry.
    pub async fn run<Fs, Fa>(&self, mut sync_job: Fs, mut alert_job: Fa)
    where
        Fs: FnMut() -> Result<(), SyncError>,
        Fa: FnMut() -> Result<()>,
    {
        let mut sync_tick = tokio::time::interval(self.sync_every);
        let mut alert_tick = tokio::time::interval(self.alert_every);
        sync_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        alert_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = sync_tick.tick() => {
                    if let Err(e) = sync_job() {
                        error!(error = %e, "sync run failed");
                    }
                }
                _ = alert_tick.tick() => {
                    if let Err(e) = alert_job() {
                        error!(error = %e, "alert run failed");
                    }
                }
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::alert::testing::RecordingSender;
    use crate::source::StaticSource;
    use crate::store::setup_database;

    fn orchestrator(
        source: StaticSource,
        sender: RecordingSender,
    ) -> SyncOrchestrator<StaticSource, RecordingSender> {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        SyncOrchestrator::new(conn, source, sender, 50, 0.9, "ops@example.com".to_string())
    }

    fn full_source(occupant_rows: Vec<Vec<&str>>) -> StaticSource {
        let mut source = StaticSource::new();
        source.set_sheet(
            "Facility",
            vec![
                vec!["Id", "Name", "Location", "General", "ICU"],
                vec!["F1", "General Hospital", "North", "2", "1"],
            ],
        );
        let mut occupants = vec![vec!["Id", "Name", "DateOfBirth", "Category", "UnitType", "Facility"]];
        occupants.extend(occupant_rows);
        source.set_sheet("Occupant", occupants);
        source
    }

    #[test]
    fn test_sync_resolves_occupants_against_same_run_facilities() {
        // The facility is new in this snapshot; the occupant row can only
        // resolve if facilities were reconciled first.
        let source = full_source(vec![vec![
            "P1", "Jordan Doe", "1987-03-14", "Cardiology", "General", "General Hospital",
        ]]);
        let orch = orchestrator(source, RecordingSender::default());

        orch.sync().unwrap();

        let occupants = OccupantStore::new(&orch.conn);
        let stored = occupants.find_by_ids(&["P1".to_string()]).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].facility_id, "F1");
    }

    #[test]
    fn test_alert_sends_nothing_below_threshold() {
        // 1 of 2 general units occupied: 0.5, not eligible.
        let source = full_source(vec![vec![
            "P1", "Jordan Doe", "1987-03-14", "Cardiology", "General", "General Hospital",
        ]]);
        let orch = orchestrator(source, RecordingSender::default());

        orch.sync().unwrap();
        orch.alert().unwrap();

        assert!(orch.sender.sent.lock().unwrap().is_empty());
    }

    #[test]
    fn test_alert_sends_one_report_when_over_threshold() {
        // 2 of 2 general units occupied: 1.0 > 0.9.
        let source = full_source(vec![
            vec!["P1", "Jordan Doe", "1987-03-14", "Cardiology", "General", "General Hospital"],
            vec!["P2", "Sam Park", "1990-01-02", "Oncology", "General", "General Hospital"],
        ]);
        let orch = orchestrator(source, RecordingSender::default());

        orch.sync().unwrap();
        orch.alert().unwrap();

        let sent = orch.sender.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        let (recipient, subject, body) = &sent[0];
        assert_eq!(recipient, "ops@example.com");
        assert!(subject.contains("90%"));
        assert!(body.contains("General Hospital"));
    }

    #[test]
    fn test_alert_does_not_resync() {
        // Store is empty and the alert flow must leave it that way.
        let source = full_source(vec![]);
        let orch = orchestrator(source, RecordingSender::default());

        orch.alert().unwrap();

        let facilities = FacilityStore::new(&orch.conn);
        assert_eq!(facilities.count().unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduler_drives_both_cadences() {
        let scheduler = Scheduler::new(Duration::from_secs(10), Duration::from_secs(30));
        let sync_runs = Cell::new(0u32);
        let alert_runs = Cell::new(0u32);

        let driver = scheduler.run(
            || {
                sync_runs.set(sync_runs.get() + 1);
                Ok(())
            },
            || {
                alert_runs.set(alert_runs.get() + 1);
                Ok(())
            },
        );

        // The loop never exits on its own; cut it off after 35 virtual
        // seconds.
        let _ = tokio::time::timeout(Duration::from_secs(35), driver).await;

        // Sync ticks at t = 0, 10, 20, 30; alert at t = 0, 30.
        assert_eq!(sync_runs.get(), 4);
        assert_eq!(alert_runs.get(), 2);
    }
}
