//! Admission: resolve or mint the global identity, link it to the hospital's
//! MRN, open the visit and seed a case sheet, all in one transaction.

use std::str::FromStr;

use chrono::{NaiveDateTime, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::collaborators::{CaseSheetCollaborator, CoreEvent, RoleAuthority, TaskQueue};
use crate::config::EngineConfig;
use crate::db::{self, DatabaseError};
use crate::error::CoreError;
use crate::identity::IdentityResolver;
use crate::models::*;

/// Advice returned with outpatient admissions. Non-binding.
pub const OUTPATIENT_SUGGESTION: &str = "Outpatient visit: consider scheduling a follow-up appointment.";

/// Triage priority for a visit type. 1 is most urgent.
pub const fn priority_for(visit_type: VisitType) -> i32 {
    match visit_type {
        VisitType::Emergency => 1,
        VisitType::Inpatient => 2,
        VisitType::Outpatient => 3,
    }
}

/// Deterministic case number: `CS-<YYYYMMDD>-<local MRN>`.
pub fn case_number(admission_date: &NaiveDateTime, local_mrn: &str) -> String {
    format!("CS-{}-{}", admission_date.format("%Y%m%d"), local_mrn)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmissionRequest {
    pub identifiers: PatientIdentifiers,
    pub demographics: Demographics,
    pub hospital_id: String,
    pub local_mrn: String,
    pub reason_for_visit: String,
    /// Raw value from the caller; validated against `VisitType`.
    pub visit_type: String,
    pub attending_doctor_id: Option<String>,
    /// User performing the admission. Their role gates identity minting.
    pub admitted_by: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AdmissionResult {
    pub is_new_patient: bool,
    pub priority: i32,
    pub patient: Patient,
    pub hospital_link: HospitalPatientLink,
    pub visit: Visit,
    pub case_sheet: Option<CaseSheet>,
    pub suggestion: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AdmissionSummary {
    pub hospital_name: String,
    pub patient: Patient,
    pub hospital_link: HospitalPatientLink,
    pub visit: Visit,
    pub case_sheet: Option<CaseSheet>,
}

pub struct AdmissionOrchestrator<'a> {
    pub config: &'a EngineConfig,
    pub roles: &'a dyn RoleAuthority,
    pub case_sheets: &'a dyn CaseSheetCollaborator,
    pub queue: &'a dyn TaskQueue,
}

impl<'a> AdmissionOrchestrator<'a> {
    /// Admit a patient. Any error leaves no patient, link, visit or case sheet behind.
    pub fn admit_patient(
        &self,
        conn: &Connection,
        req: &AdmissionRequest,
    ) -> Result<AdmissionResult, CoreError> {
        let visit_type = VisitType::from_str(req.visit_type.trim()).map_err(|_| {
            CoreError::InvalidInput(format!(
                "visit type '{}' is not one of inpatient, outpatient, emergency",
                req.visit_type
            ))
        })?;
        let local_mrn = req.local_mrn.trim();
        if local_mrn.is_empty() {
            return Err(CoreError::InvalidInput("local MRN is required".into()));
        }
        if req.reason_for_visit.trim().is_empty() {
            return Err(CoreError::InvalidInput("reason for visit is required".into()));
        }

        match db::get_hospital(conn, &req.hospital_id)? {
            Some(h) if h.is_active => {}
            _ => return Err(CoreError::not_found("hospital", &req.hospital_id)),
        }

        let now = Utc::now().naive_utc();
        let tx = conn.unchecked_transaction()?;

        let (patient, is_new_patient) = self.resolve_or_mint(&tx, req, &now)?;
        let hospital_link = self.link_patient(&tx, &patient, &req.hospital_id, local_mrn, &now)?;

        let priority = priority_for(visit_type);
        let visit = Visit {
            id: Uuid::new_v4(),
            patient_id: patient.id,
            hospital_id: req.hospital_id.clone(),
            link_id: hospital_link.id,
            visit_type,
            priority,
            status: VisitStatus::Active,
            reason_for_visit: req.reason_for_visit.trim().to_string(),
            attending_doctor_id: req.attending_doctor_id.clone(),
            admitted_by: req.admitted_by.clone(),
            admission_date: now,
            discharge_date: None,
            discharge_summary: None,
            diagnosis: None,
            sync: SyncState::default(),
        };
        db::insert_visit(&tx, &visit)?;

        let (case_sheet, suggestion) = if visit_type.needs_case_sheet() {
            let seed = CaseSheetSeed {
                patient_id: patient.id,
                visit_id: visit.id,
                hospital_id: req.hospital_id.clone(),
                case_number: case_number(&now, local_mrn),
                chief_complaint: visit.reason_for_visit.clone(),
                seed_allergies: req.demographics.allergies.clone(),
            };
            (Some(self.case_sheets.create_seeded_case_sheet(&tx, &seed)?), None)
        } else {
            (None, Some(OUTPATIENT_SUGGESTION.to_string()))
        };

        tx.commit()?;

        tracing::info!(
            visit_id = %visit.id,
            patient_id = %patient.id,
            hospital_id = %visit.hospital_id,
            visit_type = %visit_type,
            priority,
            is_new_patient,
            "Patient admitted"
        );

        self.queue.publish(CoreEvent::PatientAdmitted {
            visit_id: visit.id,
            patient_id: patient.id,
            hospital_id: visit.hospital_id.clone(),
            priority,
            is_new_patient,
        });

        Ok(AdmissionResult {
            is_new_patient,
            priority,
            patient,
            hospital_link,
            visit,
            case_sheet,
            suggestion,
        })
    }

    /// Everything known about one admission.
    pub fn get_admission_summary(&self, conn: &Connection, visit_id: &Uuid) -> Result<AdmissionSummary, CoreError> {
        let visit = db::get_visit(conn, visit_id)?.ok_or_else(|| CoreError::not_found("visit", visit_id))?;
        let patient = db::get_patient(conn, &visit.patient_id)?
            .ok_or_else(|| CoreError::not_found("patient", visit.patient_id))?;
        let hospital_link = db::get_link_by_id(conn, &visit.link_id)?
            .ok_or_else(|| CoreError::not_found("hospital_patient_link", visit.link_id))?;
        let hospital_name = db::get_hospital(conn, &visit.hospital_id)?
            .map(|h| h.name)
            .ok_or_else(|| CoreError::not_found("hospital", &visit.hospital_id))?;
        let case_sheet = self.case_sheets.case_sheet_for_visit(conn, visit_id)?;
        Ok(AdmissionSummary {
            hospital_name,
            patient,
            hospital_link,
            visit,
            case_sheet,
        })
    }

    fn resolve_or_mint(
        &self,
        conn: &Connection,
        req: &AdmissionRequest,
        now: &NaiveDateTime,
    ) -> Result<(Patient, bool), CoreError> {
        if req.identifiers.has_duplicate_keys() {
            let resolver = IdentityResolver::new(self.config);
            if let Some(existing) = resolver.check_duplicate_patient(conn, &req.identifiers)? {
                return Ok((existing, false));
            }
        }

        let role = self.roles.role_of(&req.admitted_by);
        if !self.config.can_mint_identity(role) {
            tracing::warn!(
                user = %req.admitted_by,
                role = ?role,
                "Refused to mint global identity"
            );
            return Err(CoreError::PermissionDenied(
                "only privileged roles may mint a new global identity".into(),
            ));
        }

        let demo = &req.demographics;
        if demo.first_name.trim().is_empty() || demo.last_name.trim().is_empty() {
            return Err(CoreError::InvalidInput(
                "first and last name are required for a new patient".into(),
            ));
        }

        let patient = Patient {
            id: Uuid::new_v4(),
            first_name: demo.first_name.trim().to_string(),
            last_name: demo.last_name.trim().to_string(),
            date_of_birth: demo.date_of_birth,
            gender: demo.gender,
            national_id: trimmed(&req.identifiers.national_id),
            passport_number: trimmed(&req.identifiers.passport_number),
            phone: trimmed(&req.identifiers.phone),
            email: trimmed(&req.identifiers.email),
            allergies: trimmed(&demo.allergies),
            blood_group: trimmed(&demo.blood_group),
            is_global_record: true,
            is_active: true,
            created_by: Some(req.admitted_by.clone()),
            created_at: *now,
            updated_at: *now,
            last_synced_at: None,
        };
        db::insert_patient(conn, &patient)?;
        tracing::info!(patient_id = %patient.id, created_by = %req.admitted_by, "Global identity minted");
        Ok((patient, true))
    }

    fn link_patient(
        &self,
        conn: &Connection,
        patient: &Patient,
        hospital_id: &str,
        local_mrn: &str,
        now: &NaiveDateTime,
    ) -> Result<HospitalPatientLink, CoreError> {
        let visit_date = now.date();

        if let Some(link) = db::get_link(conn, &patient.id, hospital_id)? {
            if link.local_mrn != local_mrn {
                tracing::warn!(
                    patient_id = %patient.id,
                    hospital_id,
                    known_mrn = %link.local_mrn,
                    supplied_mrn = local_mrn,
                    "Supplied MRN differs from the linked one"
                );
                return Err(CoreError::Conflict(format!(
                    "patient {} is registered at hospital {hospital_id} under MRN '{}', not '{local_mrn}'",
                    patient.id, link.local_mrn
                )));
            }
            db::record_link_visit(conn, &link.id, &visit_date)?;
            return db::get_link_by_id(conn, &link.id)?
                .ok_or_else(|| CoreError::not_found("hospital_patient_link", link.id));
        }

        if db::get_link_by_mrn(conn, hospital_id, local_mrn)?.is_some() {
            return Err(mrn_conflict(hospital_id, local_mrn));
        }

        let link = HospitalPatientLink {
            id: Uuid::new_v4(),
            patient_id: patient.id,
            hospital_id: hospital_id.to_string(),
            local_mrn: local_mrn.to_string(),
            first_visit_date: visit_date,
            last_visit_date: visit_date,
            total_visits: 1,
            is_active: true,
            created_at: *now,
        };
        match db::insert_link(conn, &link) {
            Ok(()) => {}
            Err(e) if e.is_unique_violation_on("local_mrn") => {
                return Err(mrn_conflict(hospital_id, local_mrn));
            }
            Err(DatabaseError::UniqueViolation(_)) => {
                return Err(CoreError::Conflict(format!(
                    "patient {} was linked to hospital {hospital_id} concurrently",
                    patient.id
                )));
            }
            Err(e) => return Err(e.into()),
        }
        tracing::info!(
            patient_id = %patient.id,
            hospital_id,
            local_mrn,
            "Hospital link created"
        );
        Ok(link)
    }
}

fn mrn_conflict(hospital_id: &str, local_mrn: &str) -> CoreError {
    CoreError::Conflict(format!(
        "MRN '{local_mrn}' is already assigned to another patient at hospital {hospital_id}"
    ))
}

fn trimmed(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
