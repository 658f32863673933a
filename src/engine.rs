//! `CarelinkCore`: the operations the outer API layer calls.
//!
//! The core owns configuration and collaborators only. Every call takes the
//! caller's connection, so transaction scope stays with the request.

use std::sync::Arc;

use chrono::Utc;
use rusqlite::Connection;
use uuid::Uuid;

use crate::admission::{AdmissionOrchestrator, AdmissionRequest, AdmissionResult, AdmissionSummary};
use crate::clinical;
use crate::collaborators::{CaseSheetCollaborator, NullTaskQueue, RoleAuthority, SqliteCaseSheets, TaskQueue};
use crate::config::EngineConfig;
use crate::db;
use crate::discharge::{self, DischargeOutcome, DischargeTrigger, SyncStatusView};
use crate::error::CoreError;
use crate::identity::IdentityResolver;
use crate::merge::{MergeEngine, SyncResult};
use crate::models::*;

pub struct CarelinkCore {
    config: EngineConfig,
    roles: Arc<dyn RoleAuthority>,
    case_sheets: Arc<dyn CaseSheetCollaborator>,
    queue: Arc<dyn TaskQueue>,
}

impl CarelinkCore {
    /// Core with SQLite-backed case sheets and a queue that drops events.
    pub fn new(config: EngineConfig, roles: Arc<dyn RoleAuthority>) -> Self {
        Self {
            config,
            roles,
            case_sheets: Arc::new(SqliteCaseSheets),
            queue: Arc::new(NullTaskQueue),
        }
    }

    pub fn with_case_sheets(mut self, case_sheets: Arc<dyn CaseSheetCollaborator>) -> Self {
        self.case_sheets = case_sheets;
        self
    }

    pub fn with_task_queue(mut self, queue: Arc<dyn TaskQueue>) -> Self {
        self.queue = queue;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn orchestrator(&self) -> AdmissionOrchestrator<'_> {
        AdmissionOrchestrator {
            config: &self.config,
            roles: self.roles.as_ref(),
            case_sheets: self.case_sheets.as_ref(),
            queue: self.queue.as_ref(),
        }
    }

    // ═══════════════════════════════════════════
    // Hospitals
    // ═══════════════════════════════════════════

    pub fn register_hospital(&self, conn: &Connection, id: &str, name: &str) -> Result<Hospital, CoreError> {
        let (id, name) = (id.trim(), name.trim());
        if id.is_empty() || name.is_empty() {
            return Err(CoreError::InvalidInput("hospital id and name are required".into()));
        }
        let hospital = Hospital {
            id: id.to_string(),
            name: name.to_string(),
            is_active: true,
            created_at: Utc::now().naive_utc(),
        };
        match db::insert_hospital(conn, &hospital) {
            Ok(()) => {}
            Err(db::DatabaseError::UniqueViolation(_)) => {
                return Err(CoreError::Conflict(format!("hospital {id} is already registered")));
            }
            Err(e) => return Err(e.into()),
        }
        tracing::info!(hospital_id = id, "Hospital registered");
        Ok(hospital)
    }

    // ═══════════════════════════════════════════
    // Admission / discharge
    // ═══════════════════════════════════════════

    pub fn admit_patient(&self, conn: &Connection, req: &AdmissionRequest) -> Result<AdmissionResult, CoreError> {
        self.orchestrator().admit_patient(conn, req)
    }

    pub fn get_admission_summary(&self, conn: &Connection, visit_id: &Uuid) -> Result<AdmissionSummary, CoreError> {
        self.orchestrator().get_admission_summary(conn, visit_id)
    }

    pub fn discharge_patient(
        &self,
        conn: &Connection,
        visit_id: &Uuid,
        summary: Option<&str>,
        diagnosis: Option<&str>,
    ) -> Result<DischargeOutcome, CoreError> {
        DischargeTrigger {
            config: &self.config,
            case_sheets: self.case_sheets.as_ref(),
            queue: self.queue.as_ref(),
        }
        .discharge_patient(conn, visit_id, summary, diagnosis)
    }

    // ═══════════════════════════════════════════
    // Sync
    // ═══════════════════════════════════════════

    pub fn get_sync_status(&self, conn: &Connection, visit_id: &Uuid) -> Result<SyncStatusView, CoreError> {
        discharge::get_sync_status(conn, visit_id)
    }

    /// Retry entry point. Idempotent once a visit is synced.
    pub fn sync_visit_to_global(&self, conn: &Connection, visit_id: &Uuid) -> Result<SyncResult, CoreError> {
        MergeEngine {
            config: &self.config,
            case_sheets: self.case_sheets.as_ref(),
        }
        .sync_visit_to_global(conn, visit_id)
    }

    pub fn reset_sync_state(&self, conn: &Connection, visit_id: &Uuid) -> Result<SyncStatusView, CoreError> {
        discharge::reset_sync_state(conn, visit_id)
    }

    pub fn list_failed_syncs(
        &self,
        conn: &Connection,
        hospital_id: Option<&str>,
    ) -> Result<Vec<SyncStatusView>, CoreError> {
        discharge::list_failed_syncs(conn, hospital_id)
    }

    pub fn get_visit_global_records(&self, conn: &Connection, visit_id: &Uuid) -> Result<Vec<GlobalRecord>, CoreError> {
        if db::get_visit(conn, visit_id)?.is_none() {
            return Err(CoreError::not_found("visit", visit_id));
        }
        Ok(db::get_global_records_for_visit(conn, visit_id)?)
    }

    // ═══════════════════════════════════════════
    // Identity
    // ═══════════════════════════════════════════

    pub fn search_global_patient(
        &self,
        conn: &Connection,
        query: &str,
        search_by: SearchBy,
    ) -> Result<Option<Patient>, CoreError> {
        IdentityResolver::new(&self.config).search_global_patient(conn, query, search_by)
    }

    pub fn check_duplicate_patient(
        &self,
        conn: &Connection,
        identifiers: &PatientIdentifiers,
    ) -> Result<Option<Patient>, CoreError> {
        IdentityResolver::new(&self.config).check_duplicate_patient(conn, identifiers)
    }

    /// Hide a patient from identity resolution. Nothing is deleted.
    pub fn deactivate_patient(&self, conn: &Connection, patient_id: &Uuid) -> Result<Patient, CoreError> {
        db::set_patient_active(conn, patient_id, false, &Utc::now().naive_utc())?;
        tracing::info!(patient_id = %patient_id, "Patient deactivated");
        db::get_patient(conn, patient_id)?.ok_or_else(|| CoreError::not_found("patient", patient_id))
    }

    /// Visits across every hospital, newest first.
    pub fn get_patient_visits(&self, conn: &Connection, patient_id: &Uuid) -> Result<Vec<Visit>, CoreError> {
        self.require_patient(conn, patient_id)?;
        Ok(db::get_visits_for_patient(conn, patient_id)?)
    }

    pub fn get_patient_links(
        &self,
        conn: &Connection,
        patient_id: &Uuid,
    ) -> Result<Vec<HospitalPatientLink>, CoreError> {
        self.require_patient(conn, patient_id)?;
        Ok(db::get_links_for_patient(conn, patient_id)?)
    }

    fn require_patient(&self, conn: &Connection, patient_id: &Uuid) -> Result<(), CoreError> {
        match db::get_patient(conn, patient_id)? {
            Some(_) => Ok(()),
            None => Err(CoreError::not_found("patient", patient_id)),
        }
    }

    // ═══════════════════════════════════════════
    // Clinical artifacts
    // ═══════════════════════════════════════════

    pub fn record_vitals(
        &self,
        conn: &Connection,
        visit_id: &Uuid,
        reading: &VitalsReading,
    ) -> Result<VitalsReading, CoreError> {
        clinical::record_vitals(conn, visit_id, reading)
    }

    pub fn record_lab_test(&self, conn: &Connection, visit_id: &Uuid, order: &LabOrder) -> Result<LabTest, CoreError> {
        clinical::record_lab_test(conn, visit_id, order)
    }

    pub fn complete_lab_test(
        &self,
        conn: &Connection,
        lab_test_id: &Uuid,
        entry: &LabResultEntry,
    ) -> Result<LabTest, CoreError> {
        clinical::complete_lab_test(conn, lab_test_id, entry)
    }

    pub fn record_prescription(
        &self,
        conn: &Connection,
        visit_id: &Uuid,
        order: &PrescriptionOrder,
    ) -> Result<Prescription, CoreError> {
        clinical::record_prescription(conn, visit_id, order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tokio::sync::mpsc;

    use crate::collaborators::{ChannelTaskQueue, CoreEvent, StaticRoleAuthority};
    use crate::db::sqlite::open_memory_database;

    fn core_with_events() -> (CarelinkCore, mpsc::UnboundedReceiver<CoreEvent>) {
        let roles = StaticRoleAuthority::new()
            .with_user("mgr", UserRole::Manager)
            .with_user("rcp", UserRole::Receptionist);
        let (tx, rx) = mpsc::unbounded_channel();
        let core = CarelinkCore::new(EngineConfig::default(), Arc::new(roles))
            .with_task_queue(Arc::new(ChannelTaskQueue::new(tx)));
        (core, rx)
    }

    fn network(core: &CarelinkCore) -> Connection {
        let conn = open_memory_database().unwrap();
        core.register_hospital(&conn, "H1", "St. Mary").unwrap();
        core.register_hospital(&conn, "H2", "Lakeside").unwrap();
        conn
    }

    fn admission(hospital: &str, mrn: &str, visit_type: &str, user: &str) -> AdmissionRequest {
        AdmissionRequest {
            identifiers: PatientIdentifiers {
                national_id: Some("N1".into()),
                phone: Some("555-0101".into()),
                email: Some("a@b.com".into()),
                ..Default::default()
            },
            demographics: Demographics {
                first_name: "Ada".into(),
                last_name: "Okafor".into(),
                date_of_birth: None,
                gender: Gender::Female,
                allergies: None,
                blood_group: None,
            },
            hospital_id: hospital.into(),
            local_mrn: mrn.into(),
            reason_for_visit: "Fever".into(),
            visit_type: visit_type.into(),
            attending_doctor_id: Some("dr-1".into()),
            admitted_by: user.into(),
        }
    }

    #[test]
    fn duplicate_hospital_is_conflict() {
        let (core, _rx) = core_with_events();
        let conn = network(&core);
        let err = core.register_hospital(&conn, "H1", "Again").unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));
        assert!(matches!(
            core.register_hospital(&conn, " ", "Blank"),
            Err(CoreError::InvalidInput(_))
        ));
    }

    #[test]
    fn same_patient_spans_two_hospitals() {
        let (core, mut rx) = core_with_events();
        let conn = network(&core);

        let first = core.admit_patient(&conn, &admission("H1", "H1-001", "emergency", "mgr")).unwrap();
        assert!(first.is_new_patient);
        assert_eq!(first.priority, 1);
        let today = first.visit.admission_date.format("%Y%m%d").to_string();
        assert_eq!(first.case_sheet.unwrap().case_number, format!("CS-{today}-H1-001"));

        // A receptionist may admit an existing identity; no minting involved.
        let second = core.admit_patient(&conn, &admission("H2", "H2-777", "inpatient", "rcp")).unwrap();
        assert!(!second.is_new_patient);
        assert_eq!(second.patient.id, first.patient.id);
        assert_ne!(second.hospital_link.id, first.hospital_link.id);
        assert_eq!(second.hospital_link.hospital_id, "H2");
        assert_eq!(second.hospital_link.total_visits, 1);

        let links = core.get_patient_links(&conn, &first.patient.id).unwrap();
        assert_eq!(links.len(), 2);
        let visits = core.get_patient_visits(&conn, &first.patient.id).unwrap();
        assert_eq!(visits.len(), 2);

        let found = core.search_global_patient(&conn, "H2-777", SearchBy::Mrn).unwrap().unwrap();
        assert_eq!(found.id, first.patient.id);

        let events: Vec<CoreEvent> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], CoreEvent::PatientAdmitted { is_new_patient: true, .. }));
        assert!(matches!(events[1], CoreEvent::PatientAdmitted { is_new_patient: false, .. }));
    }

    #[test]
    fn full_visit_lifecycle_merges_fourteen_records() {
        let (core, _rx) = core_with_events();
        let conn = network(&core);
        let admitted = core.admit_patient(&conn, &admission("H1", "H1-001", "inpatient", "mgr")).unwrap();
        let visit_id = admitted.visit.id;

        let base = Utc::now().naive_utc();
        for i in 0..15 {
            let mut reading = VitalsReading::new(visit_id, base - Duration::minutes(i));
            reading.temperature_c = Some(37.0);
            core.record_vitals(&conn, &visit_id, &reading).unwrap();
        }
        for name in ["CBC", "CRP"] {
            let lab = core
                .record_lab_test(
                    &conn,
                    &visit_id,
                    &LabOrder {
                        test_name: name.into(),
                        unit: None,
                        reference_range: None,
                    },
                )
                .unwrap();
            core.complete_lab_test(
                &conn,
                &lab.id,
                &LabResultEntry {
                    result_value: "normal".into(),
                    unit: None,
                    reference_range: None,
                },
            )
            .unwrap();
        }
        core.record_prescription(
            &conn,
            &visit_id,
            &PrescriptionOrder {
                medication: "Paracetamol".into(),
                dosage: "1g".into(),
                frequency: "qid".into(),
                duration_days: Some(3),
                instructions: None,
                prescribed_by: Some("dr-1".into()),
            },
        )
        .unwrap();

        let out = core.discharge_patient(&conn, &visit_id, Some("Afebrile"), Some("Viral fever")).unwrap();
        assert_eq!(out.sync_result.records_created, 14);
        assert_eq!(core.get_visit_global_records(&conn, &visit_id).unwrap().len(), 14);

        let again = core.sync_visit_to_global(&conn, &visit_id).unwrap();
        assert_eq!(again.records_created, 0);
        assert_eq!(again.message, crate::merge::ALREADY_SYNCED);

        let status = core.get_sync_status(&conn, &visit_id).unwrap();
        assert!(status.synced_to_global);
        assert_eq!(status.sync_status, SyncStatus::Synced);
        assert!(core.list_failed_syncs(&conn, None).unwrap().is_empty());
    }

    #[test]
    fn deactivated_patient_drops_out_of_search() {
        let (core, _rx) = core_with_events();
        let conn = network(&core);
        let admitted = core.admit_patient(&conn, &admission("H1", "H1-001", "outpatient", "mgr")).unwrap();

        let patient = core.deactivate_patient(&conn, &admitted.patient.id).unwrap();
        assert!(!patient.is_active);
        assert!(core.search_global_patient(&conn, "N1", SearchBy::Auto).unwrap().is_none());
        assert!(core
            .check_duplicate_patient(
                &conn,
                &PatientIdentifiers {
                    email: Some("a@b.com".into()),
                    ..Default::default()
                }
            )
            .unwrap()
            .is_none());
        // History stays readable.
        assert_eq!(core.get_patient_visits(&conn, &patient.id).unwrap().len(), 1);
    }

    #[test]
    fn unknown_ids_are_not_found() {
        let (core, _rx) = core_with_events();
        let conn = network(&core);
        let id = Uuid::new_v4();
        assert!(matches!(core.get_patient_links(&conn, &id), Err(CoreError::NotFound { .. })));
        assert!(matches!(core.get_visit_global_records(&conn, &id), Err(CoreError::NotFound { .. })));
        assert!(matches!(core.get_sync_status(&conn, &id), Err(CoreError::NotFound { .. })));
        let err = core.deactivate_patient(&conn, &id).unwrap_err();
        assert_eq!(err.kind().status_code(), 404);
    }
}
