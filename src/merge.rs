//! Local-to-global merge of a discharged visit's clinical artifacts.
//!
//! Every artifact becomes one append-only `global_records` row keyed by a
//! deterministic `dedup_key`. The existence check before each insert is only
//! a shortcut: the UNIQUE index on `dedup_key` is the authority, and a
//! violation there counts as a skipped duplicate rather than a failure.
//! Any other failure rolls the whole merge back and parks the visit as
//! `failed` so it can be retried.

use chrono::{NaiveDateTime, Utc};
use rusqlite::Connection;
use serde::Serialize;
use uuid::Uuid;

use crate::collaborators::CaseSheetCollaborator;
use crate::config::EngineConfig;
use crate::db;
use crate::error::CoreError;
use crate::models::*;

pub const ALREADY_SYNCED: &str = "Already synced";

/// `"{visit_id}:{record_type}:{natural_key}"`
pub fn dedup_key(visit_id: &Uuid, record_type: RecordType, natural_key: &str) -> String {
    format!("{visit_id}:{}:{natural_key}", record_type.as_str())
}

/// Records created per category in one merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RecordCounts {
    pub visit_summary: u32,
    pub vitals: u32,
    pub lab_tests: u32,
    pub prescriptions: u32,
}

impl RecordCounts {
    pub fn total(&self) -> u32 {
        self.visit_summary + self.vitals + self.lab_tests + self.prescriptions
    }

    fn bump(&mut self, record_type: RecordType) {
        match record_type {
            RecordType::VisitSummary => self.visit_summary += 1,
            RecordType::Vitals => self.vitals += 1,
            RecordType::LabTest => self.lab_tests += 1,
            RecordType::Prescription => self.prescriptions += 1,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncResult {
    pub visit_id: Uuid,
    pub patient_id: Uuid,
    pub status: SyncStatus,
    pub records_created: u32,
    pub created: RecordCounts,
    pub duplicates_skipped: u32,
    /// Allergy entries appended to the global patient by this merge.
    pub allergies_added: Vec<String>,
    pub message: String,
    /// Captured failure reason when `status` is `failed`.
    pub error: Option<String>,
}

impl SyncResult {
    fn already_synced(visit: &Visit) -> Self {
        Self {
            visit_id: visit.id,
            patient_id: visit.patient_id,
            status: SyncStatus::Synced,
            records_created: 0,
            created: RecordCounts::default(),
            duplicates_skipped: 0,
            allergies_added: Vec::new(),
            message: ALREADY_SYNCED.to_string(),
            error: None,
        }
    }

    pub(crate) fn failed(visit_id: Uuid, patient_id: Uuid, reason: &str) -> Self {
        Self {
            visit_id,
            patient_id,
            status: SyncStatus::Failed,
            records_created: 0,
            created: RecordCounts::default(),
            duplicates_skipped: 0,
            allergies_added: Vec::new(),
            message: "Sync failed; the visit can be synced again".to_string(),
            error: Some(reason.to_string()),
        }
    }
}

#[derive(Debug, Default)]
struct MergeTally {
    created: RecordCounts,
    duplicates_skipped: u32,
    allergies_added: Vec<String>,
}

enum Append {
    Created,
    Duplicate,
}

pub struct MergeEngine<'a> {
    pub config: &'a EngineConfig,
    pub case_sheets: &'a dyn CaseSheetCollaborator,
}

impl<'a> MergeEngine<'a> {
    /// Merge a discharged visit into the global store.
    ///
    /// Storage failures during the merge are captured on the visit
    /// (`sync_status = failed`, `sync_error`, `sync_attempts + 1`) and
    /// reported in the result, not returned as `Err`.
    pub fn sync_visit_to_global(&self, conn: &Connection, visit_id: &Uuid) -> Result<SyncResult, CoreError> {
        let visit = db::get_visit(conn, visit_id)?.ok_or_else(|| CoreError::not_found("visit", visit_id))?;

        if visit.status != VisitStatus::Discharged {
            return Err(CoreError::InvalidState(format!(
                "visit {visit_id} must be discharged before it is synced"
            )));
        }
        if visit.sync.synced_to_global {
            tracing::debug!(visit_id = %visit.id, "Visit already synced, nothing to merge");
            return Ok(SyncResult::already_synced(&visit));
        }
        if visit.sync.sync_attempts >= self.config.max_sync_attempts {
            return Err(CoreError::InvalidState(format!(
                "visit {visit_id} failed {} sync attempts and requires remediation",
                visit.sync.sync_attempts
            )));
        }

        match self.merge(conn, &visit) {
            Ok(tally) => {
                let records_created = tally.created.total();
                tracing::info!(
                    visit_id = %visit.id,
                    patient_id = %visit.patient_id,
                    records_created,
                    duplicates_skipped = tally.duplicates_skipped,
                    allergies_added = tally.allergies_added.len(),
                    "Visit synced to global record"
                );
                Ok(SyncResult {
                    visit_id: visit.id,
                    patient_id: visit.patient_id,
                    status: SyncStatus::Synced,
                    records_created,
                    created: tally.created,
                    duplicates_skipped: tally.duplicates_skipped,
                    allergies_added: tally.allergies_added,
                    message: format!("Synced {records_created} records to global store"),
                    error: None,
                })
            }
            Err(e) => self.record_failure(conn, &visit, &e.to_string()),
        }
    }

    /// Park the visit as `failed`. A visit found already synced here lost the
    /// race to a concurrent merge that committed first.
    fn record_failure(&self, conn: &Connection, visit: &Visit, reason: &str) -> Result<SyncResult, CoreError> {
        if !db::mark_sync_failed(conn, &visit.id, reason)? {
            let current = db::get_visit(conn, &visit.id)?.ok_or_else(|| CoreError::not_found("visit", visit.id))?;
            if current.sync.synced_to_global {
                tracing::info!(
                    visit_id = %visit.id,
                    error = %reason,
                    "Merge failed after a concurrent sync committed; visit already synced"
                );
                return Ok(SyncResult::already_synced(&current));
            }
            return Err(CoreError::not_found("visit", visit.id));
        }

        tracing::warn!(
            visit_id = %visit.id,
            attempt = visit.sync.sync_attempts + 1,
            error = %reason,
            "Global sync failed, visit left retryable"
        );
        Ok(SyncResult::failed(visit.id, visit.patient_id, reason))
    }

    /// One transaction; dropping `tx` on any `?` rolls everything back.
    fn merge(&self, conn: &Connection, visit: &Visit) -> Result<MergeTally, CoreError> {
        let tx = conn.unchecked_transaction()?;
        let now = Utc::now().naive_utc();
        let mut tally = MergeTally::default();

        let mut record = |payload: GlobalRecordPayload, natural_key: &str| -> Result<(), CoreError> {
            let record_type = payload.record_type();
            match append_record(&tx, visit, payload, natural_key, &now)? {
                Append::Created => tally.created.bump(record_type),
                Append::Duplicate => tally.duplicates_skipped += 1,
            }
            Ok(())
        };

        record(
            GlobalRecordPayload::VisitSummary(VisitSummary {
                visit_type: visit.visit_type,
                reason_for_visit: visit.reason_for_visit.clone(),
                admission_date: visit.admission_date,
                discharge_date: visit.discharge_date,
                diagnosis: visit.diagnosis.clone(),
                discharge_summary: visit.discharge_summary.clone(),
                attending_doctor_id: visit.attending_doctor_id.clone(),
            }),
            "summary",
        )?;

        // Keyed by reading id: readings taken at the same instant stay distinct.
        for v in db::get_recent_vitals(&tx, &visit.id, self.config.vitals_sync_limit)? {
            let key = v.id.to_string();
            record(
                GlobalRecordPayload::Vitals(VitalsSnapshot {
                    recorded_at: v.recorded_at,
                    temperature_c: v.temperature_c,
                    pulse_bpm: v.pulse_bpm,
                    systolic_mmhg: v.systolic_mmhg,
                    diastolic_mmhg: v.diastolic_mmhg,
                    respiratory_rate: v.respiratory_rate,
                    oxygen_saturation: v.oxygen_saturation,
                }),
                &key,
            )?;
        }

        for lab in db::get_completed_lab_tests(&tx, &visit.id)? {
            record(
                GlobalRecordPayload::LabTest(LabResultRecord {
                    lab_test_id: lab.id,
                    test_name: lab.test_name,
                    status: lab.status,
                    result_value: lab.result_value,
                    unit: lab.unit,
                    reference_range: lab.reference_range,
                    completed_at: lab.completed_at,
                }),
                &lab.id.to_string(),
            )?;
        }

        for rx in db::get_prescriptions_for_visit(&tx, &visit.id)? {
            record(
                GlobalRecordPayload::Prescription(PrescriptionRecord {
                    prescription_id: rx.id,
                    medication: rx.medication,
                    dosage: rx.dosage,
                    frequency: rx.frequency,
                    duration_days: rx.duration_days,
                    instructions: rx.instructions,
                }),
                &rx.id.to_string(),
            )?;
        }

        tally.allergies_added = self.accrete_patient_allergies(&tx, visit, &now)?;

        db::mark_patient_synced(&tx, &visit.patient_id, &now)?;
        db::mark_sync_succeeded(&tx, &visit.id, &now)?;
        tx.commit()?;
        Ok(tally)
    }

    fn accrete_patient_allergies(
        &self,
        conn: &Connection,
        visit: &Visit,
        now: &NaiveDateTime,
    ) -> Result<Vec<String>, CoreError> {
        let Some(sheet) = self.case_sheets.case_sheet_for_visit(conn, &visit.id)? else {
            return Ok(Vec::new());
        };
        let Some(discovered) = sheet.allergies.as_deref() else {
            return Ok(Vec::new());
        };
        let patient = db::get_patient(conn, &visit.patient_id)?
            .ok_or_else(|| CoreError::not_found("patient", visit.patient_id))?;

        let Some((merged, added)) = accrete_allergies(patient.allergies.as_deref(), discovered) else {
            return Ok(Vec::new());
        };
        db::update_patient_allergies(conn, &patient.id, &merged, now)?;
        tracing::info!(patient_id = %patient.id, added = added.len(), "Allergies accreted onto global patient");
        Ok(added)
    }
}

fn append_record(
    conn: &Connection,
    visit: &Visit,
    payload: GlobalRecordPayload,
    natural_key: &str,
    now: &NaiveDateTime,
) -> Result<Append, CoreError> {
    let key = dedup_key(&visit.id, payload.record_type(), natural_key);
    if db::global_record_exists(conn, &key)? {
        return Ok(Append::Duplicate);
    }
    let record = GlobalRecord {
        id: Uuid::new_v4(),
        dedup_key: key,
        patient_id: visit.patient_id,
        visit_id: visit.id,
        source_hospital_id: visit.hospital_id.clone(),
        payload,
        created_at: *now,
    };
    match db::insert_global_record(conn, &record) {
        Ok(()) => Ok(Append::Created),
        Err(e) if e.is_unique_violation_on("dedup_key") => {
            tracing::debug!(dedup_key = %record.dedup_key, "Record inserted concurrently, skipped");
            Ok(Append::Duplicate)
        }
        Err(e) => Err(e.into()),
    }
}

fn allergy_items(text: &str) -> impl Iterator<Item = &str> {
    text.split([',', ';']).map(str::trim).filter(|s| !s.is_empty())
}

/// Append allergies from `discovered` that `existing` does not already list,
/// compared case-insensitively. Returns the new text and the appended items,
/// or `None` when nothing is new. Existing text is never rewritten.
pub fn accrete_allergies(existing: Option<&str>, discovered: &str) -> Option<(String, Vec<String>)> {
    let mut known: Vec<String> = allergy_items(existing.unwrap_or_default())
        .map(str::to_lowercase)
        .collect();
    let mut added = Vec::new();
    for item in allergy_items(discovered) {
        let lower = item.to_lowercase();
        if !known.contains(&lower) {
            known.push(lower);
            added.push(item.to_string());
        }
    }
    if added.is_empty() {
        return None;
    }
    let merged = match existing.map(str::trim).filter(|s| !s.is_empty()) {
        Some(base) => format!("{base}, {}", added.join(", ")),
        None => added.join(", "),
    };
    Some((merged, added))
}
