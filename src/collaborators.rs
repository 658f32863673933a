//! Seams to the systems around the core.
//!
//! Three traits define what the core consumes:
//! - RoleAuthority: who the acting user is allowed to be
//! - CaseSheetCollaborator: clinical case records seeded at admission
//! - TaskQueue: fire-and-forget hand-off for notifications

use std::collections::HashMap;

use chrono::Utc;
use rusqlite::Connection;
use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

use crate::db;
use crate::error::CoreError;
use crate::models::{CaseSheet, CaseSheetSeed, SyncStatus, UserRole};

/// Resolves the role of the user performing an operation.
pub trait RoleAuthority: Send + Sync {
    /// `None` for unknown users; they are treated as unprivileged.
    fn role_of(&self, user_id: &str) -> Option<UserRole>;
}

/// Creates and reads case sheets. Takes the caller's connection so seeding
/// joins the admission transaction.
pub trait CaseSheetCollaborator: Send + Sync {
    fn create_seeded_case_sheet(
        &self,
        conn: &Connection,
        seed: &CaseSheetSeed,
    ) -> Result<CaseSheet, CoreError>;

    fn case_sheet_for_visit(
        &self,
        conn: &Connection,
        visit_id: &Uuid,
    ) -> Result<Option<CaseSheet>, CoreError>;
}

/// Post-commit notifications.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CoreEvent {
    PatientAdmitted {
        visit_id: Uuid,
        patient_id: Uuid,
        hospital_id: String,
        priority: i32,
        is_new_patient: bool,
    },
    PatientDischarged {
        visit_id: Uuid,
        patient_id: Uuid,
        hospital_id: String,
        sync_status: SyncStatus,
    },
}

/// Fire-and-forget publisher. Implementations must not block and the core
/// never looks at the outcome.
pub trait TaskQueue: Send + Sync {
    fn publish(&self, event: CoreEvent);
}

// ═══════════════════════════════════════════════════════════
// Implementations
// ═══════════════════════════════════════════════════════════

/// Map-backed role lookup.
#[derive(Debug, Default, Clone)]
pub struct StaticRoleAuthority {
    roles: HashMap<String, UserRole>,
}

impl StaticRoleAuthority {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, user_id: impl Into<String>, role: UserRole) -> Self {
        self.roles.insert(user_id.into(), role);
        self
    }
}

impl RoleAuthority for StaticRoleAuthority {
    fn role_of(&self, user_id: &str) -> Option<UserRole> {
        self.roles.get(user_id).copied()
    }
}

/// Case sheets stored in the same SQLite database as the core.
#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteCaseSheets;

impl CaseSheetCollaborator for SqliteCaseSheets {
    fn create_seeded_case_sheet(
        &self,
        conn: &Connection,
        seed: &CaseSheetSeed,
    ) -> Result<CaseSheet, CoreError> {
        let sheet = CaseSheet {
            id: Uuid::new_v4(),
            patient_id: seed.patient_id,
            visit_id: seed.visit_id,
            hospital_id: seed.hospital_id.clone(),
            case_number: seed.case_number.clone(),
            chief_complaint: seed.chief_complaint.clone(),
            allergies: seed.seed_allergies.clone(),
            created_at: Utc::now().naive_utc(),
        };
        db::insert_case_sheet(conn, &sheet)?;
        Ok(sheet)
    }

    fn case_sheet_for_visit(
        &self,
        conn: &Connection,
        visit_id: &Uuid,
    ) -> Result<Option<CaseSheet>, CoreError> {
        Ok(db::get_case_sheet_for_visit(conn, visit_id)?)
    }
}

/// Publishes onto an unbounded tokio channel. `send` never blocks; a closed
/// receiver only costs a warning.
#[derive(Debug, Clone)]
pub struct ChannelTaskQueue {
    tx: UnboundedSender<CoreEvent>,
}

impl ChannelTaskQueue {
    pub fn new(tx: UnboundedSender<CoreEvent>) -> Self {
        Self { tx }
    }
}

impl TaskQueue for ChannelTaskQueue {
    fn publish(&self, event: CoreEvent) {
        if let Err(e) = self.tx.send(event) {
            tracing::warn!(event = ?e.0, "Task queue closed, notification dropped");
        }
    }
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullTaskQueue;

impl TaskQueue for NullTaskQueue {
    fn publish(&self, event: CoreEvent) {
        tracing::debug!(?event, "Notification discarded");
    }
}
