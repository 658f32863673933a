//! Discharge and the per-visit sync state machine.
//!
//! `pending` → `synced` on a successful merge, `pending`/`failed` → `failed`
//! on a captured merge failure. `synced` is terminal. A visit whose failure
//! count reached `max_sync_attempts` stays `failed` until reset.

use chrono::{NaiveDateTime, Utc};
use rusqlite::Connection;
use serde::Serialize;
use uuid::Uuid;

use crate::collaborators::{CaseSheetCollaborator, CoreEvent, TaskQueue};
use crate::config::EngineConfig;
use crate::db;
use crate::error::CoreError;
use crate::merge::{MergeEngine, SyncResult};
use crate::models::{SyncStatus, Visit, VisitStatus};

#[derive(Debug, Clone, Serialize)]
pub struct DischargeOutcome {
    pub visit: Visit,
    pub sync_result: SyncResult,
}

/// Read-only view of a visit's sync state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncStatusView {
    pub visit_id: Uuid,
    pub synced_to_global: bool,
    pub sync_status: SyncStatus,
    pub synced_at: Option<NaiveDateTime>,
    pub sync_error: Option<String>,
    pub sync_attempts: u32,
}

impl From<&Visit> for SyncStatusView {
    fn from(visit: &Visit) -> Self {
        Self {
            visit_id: visit.id,
            synced_to_global: visit.sync.synced_to_global,
            sync_status: visit.sync.sync_status,
            synced_at: visit.sync.synced_at,
            sync_error: visit.sync.sync_error.clone(),
            sync_attempts: visit.sync.sync_attempts,
        }
    }
}

pub struct DischargeTrigger<'a> {
    pub config: &'a EngineConfig,
    pub case_sheets: &'a dyn CaseSheetCollaborator,
    pub queue: &'a dyn TaskQueue,
}

impl<'a> DischargeTrigger<'a> {
    /// Discharge an active visit, then merge it into the global store.
    ///
    /// The discharge commits on its own; a failed merge, or one that could
    /// not start, is reported in `sync_result` and does not undo it.
    pub fn discharge_patient(
        &self,
        conn: &Connection,
        visit_id: &Uuid,
        summary: Option<&str>,
        diagnosis: Option<&str>,
    ) -> Result<DischargeOutcome, CoreError> {
        let now = Utc::now().naive_utc();
        let tx = conn.unchecked_transaction()?;
        let Some(admitted) = db::get_visit(&tx, visit_id)? else {
            return Err(CoreError::not_found("visit", visit_id));
        };
        if !db::mark_discharged(&tx, visit_id, &now, non_blank(summary), non_blank(diagnosis))? {
            return Err(CoreError::InvalidState(format!("visit {visit_id} is not active")));
        }
        tx.commit()?;
        tracing::info!(visit_id = %visit_id, "Patient discharged");

        let engine = MergeEngine {
            config: self.config,
            case_sheets: self.case_sheets,
        };
        let sync_result = match engine.sync_visit_to_global(conn, visit_id) {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(visit_id = %visit_id, error = %e, "Sync after discharge did not run");
                SyncResult::failed(admitted.id, admitted.patient_id, &e.to_string())
            }
        };

        self.queue.publish(CoreEvent::PatientDischarged {
            visit_id: admitted.id,
            patient_id: admitted.patient_id,
            hospital_id: admitted.hospital_id.clone(),
            sync_status: sync_result.status,
        });

        let visit = db::get_visit(conn, visit_id)?.ok_or_else(|| CoreError::not_found("visit", visit_id))?;
        Ok(DischargeOutcome { visit, sync_result })
    }
}

/// Pure read.
pub fn get_sync_status(conn: &Connection, visit_id: &Uuid) -> Result<SyncStatusView, CoreError> {
    let visit = db::get_visit(conn, visit_id)?.ok_or_else(|| CoreError::not_found("visit", visit_id))?;
    Ok(SyncStatusView::from(&visit))
}

/// Clear the failure counter of a discharged, unsynced visit so it can be
/// merged again.
pub fn reset_sync_state(conn: &Connection, visit_id: &Uuid) -> Result<SyncStatusView, CoreError> {
    let visit = db::get_visit(conn, visit_id)?.ok_or_else(|| CoreError::not_found("visit", visit_id))?;
    if visit.status != VisitStatus::Discharged {
        return Err(CoreError::InvalidState(format!("visit {visit_id} is not discharged")));
    }
    if visit.sync.synced_to_global {
        return Err(CoreError::InvalidState(format!("visit {visit_id} is already synced")));
    }
    db::reset_sync_state(conn, visit_id)?;
    tracing::info!(
        visit_id = %visit_id,
        previous_attempts = visit.sync.sync_attempts,
        "Sync state reset"
    );
    get_sync_status(conn, visit_id)
}

/// Visits whose latest merge failed, oldest discharge first.
pub fn list_failed_syncs(conn: &Connection, hospital_id: Option<&str>) -> Result<Vec<SyncStatusView>, CoreError> {
    let visits = db::list_failed_syncs(conn, hospital_id)?;
    Ok(visits.iter().map(SyncStatusView::from).collect())
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    use crate::collaborators::{ChannelTaskQueue, NullTaskQueue, SqliteCaseSheets};
    use crate::db::repository::fixtures::{now, seed_visit};
    use crate::db::sqlite::open_memory_database;
    use crate::models::VitalsReading;

    fn trigger<'a>(config: &'a EngineConfig, queue: &'a dyn TaskQueue) -> DischargeTrigger<'a> {
        DischargeTrigger {
            config,
            case_sheets: &SqliteCaseSheets,
            queue,
        }
    }

    #[test]
    fn discharge_merges_and_publishes() {
        let conn = open_memory_database().unwrap();
        let visit = seed_visit(&conn, "H1", "H1-001");
        db::insert_vitals(&conn, &VitalsReading::new(visit.id, now())).unwrap();

        let cfg = EngineConfig::default();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let queue = ChannelTaskQueue::new(tx);
        let out = trigger(&cfg, &queue)
            .discharge_patient(&conn, &visit.id, Some("Recovered"), Some("  "))
            .unwrap();

        assert_eq!(out.visit.status, VisitStatus::Discharged);
        assert!(out.visit.discharge_date.is_some());
        assert_eq!(out.visit.discharge_summary.as_deref(), Some("Recovered"));
        assert_eq!(out.visit.diagnosis, None);
        assert_eq!(out.sync_result.status, SyncStatus::Synced);
        assert_eq!(out.sync_result.records_created, 2);
        assert!(out.visit.sync.synced_to_global);

        match rx.try_recv().unwrap() {
            CoreEvent::PatientDischarged { visit_id, sync_status, .. } => {
                assert_eq!(visit_id, visit.id);
                assert_eq!(sync_status, SyncStatus::Synced);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn second_discharge_is_invalid_state() {
        let conn = open_memory_database().unwrap();
        let visit = seed_visit(&conn, "H1", "H1-001");
        let cfg = EngineConfig::default();
        trigger(&cfg, &NullTaskQueue).discharge_patient(&conn, &visit.id, None, None).unwrap();
        let err = trigger(&cfg, &NullTaskQueue)
            .discharge_patient(&conn, &visit.id, None, None)
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidState(_)));
    }

    #[test]
    fn unknown_visit_is_not_found() {
        let conn = open_memory_database().unwrap();
        let cfg = EngineConfig::default();
        let err = trigger(&cfg, &NullTaskQueue)
            .discharge_patient(&conn, &Uuid::new_v4(), None, None)
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound { .. }));
    }

    #[test]
    fn failed_merge_keeps_discharge() {
        let conn = open_memory_database().unwrap();
        let visit = seed_visit(&conn, "H1", "H1-001");
        conn.execute_batch(
            "CREATE TEMP TRIGGER block_global BEFORE INSERT ON global_records
             BEGIN SELECT RAISE(ABORT, 'global store unavailable'); END;",
        )
        .unwrap();

        let cfg = EngineConfig::default();
        let out = trigger(&cfg, &NullTaskQueue)
            .discharge_patient(&conn, &visit.id, None, None)
            .unwrap();
        assert_eq!(out.visit.status, VisitStatus::Discharged);
        assert_eq!(out.sync_result.status, SyncStatus::Failed);

        let status = get_sync_status(&conn, &visit.id).unwrap();
        assert_eq!(status.sync_status, SyncStatus::Failed);
        assert!(!status.synced_to_global);
        assert_eq!(status.sync_attempts, 1);

        let failed = list_failed_syncs(&conn, Some("H1")).unwrap();
        assert_eq!(failed.len(), 1);
        assert!(list_failed_syncs(&conn, Some("H2")).unwrap().is_empty());
    }

    #[test]
    fn refused_merge_after_discharge_is_reported_and_published() {
        let conn = open_memory_database().unwrap();
        let visit = seed_visit(&conn, "H1", "H1-001");
        assert!(db::mark_sync_failed(&conn, &visit.id, "earlier outage").unwrap());
        let cfg = EngineConfig {
            max_sync_attempts: 1,
            ..EngineConfig::default()
        };

        let (tx, mut rx) = mpsc::unbounded_channel();
        let queue = ChannelTaskQueue::new(tx);
        let out = trigger(&cfg, &queue)
            .discharge_patient(&conn, &visit.id, None, None)
            .unwrap();
        assert_eq!(out.visit.status, VisitStatus::Discharged);
        assert_eq!(out.sync_result.status, SyncStatus::Failed);
        assert!(out.sync_result.error.as_deref().unwrap().contains("remediation"));
        assert!(matches!(
            rx.try_recv().unwrap(),
            CoreEvent::PatientDischarged { sync_status: SyncStatus::Failed, .. }
        ));
    }

    #[test]
    fn sync_status_read_does_not_mutate() {
        let conn = open_memory_database().unwrap();
        let visit = seed_visit(&conn, "H1", "H1-001");
        let before = get_sync_status(&conn, &visit.id).unwrap();
        let again = get_sync_status(&conn, &visit.id).unwrap();
        assert_eq!(before, again);
        assert_eq!(before.sync_status, SyncStatus::Pending);
        assert_eq!(db::get_visit(&conn, &visit.id).unwrap().unwrap().sync, visit.sync);
    }

    #[test]
    fn reset_is_refused_for_active_and_synced_visits() {
        let conn = open_memory_database().unwrap();
        let visit = seed_visit(&conn, "H1", "H1-001");
        assert!(matches!(
            reset_sync_state(&conn, &visit.id),
            Err(CoreError::InvalidState(_))
        ));

        let cfg = EngineConfig::default();
        trigger(&cfg, &NullTaskQueue).discharge_patient(&conn, &visit.id, None, None).unwrap();
        assert!(matches!(
            reset_sync_state(&conn, &visit.id),
            Err(CoreError::InvalidState(_))
        ));
    }

    #[test]
    fn reset_clears_failure_counter() {
        let conn = open_memory_database().unwrap();
        let visit = seed_visit(&conn, "H1", "H1-001");
        db::mark_discharged(&conn, &visit.id, &now(), None, None).unwrap();
        assert!(db::mark_sync_failed(&conn, &visit.id, "timeout").unwrap());
        assert!(db::mark_sync_failed(&conn, &visit.id, "timeout").unwrap());

        let view = reset_sync_state(&conn, &visit.id).unwrap();
        assert_eq!(view.sync_attempts, 0);
        assert_eq!(view.sync_status, SyncStatus::Pending);
        assert!(view.sync_error.is_none());
    }
}
