use std::sync::LazyLock;

use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::Gender;

static PHONE_NOISE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\s\-()]").unwrap());

/// Strip spaces, dashes and parentheses so "(555) 010-1" and "5550101" compare equal.
pub fn normalize_phone(raw: &str) -> String {
    PHONE_NOISE.replace_all(raw, "").into_owned()
}

/// Full Unicode lower-casing, so "ÉLODIE@Exemple.fr" and "élodie@exemple.fr" match.
pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// The global patient identity shared by every hospital in the network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patient {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Gender,
    pub national_id: Option<String>,
    pub passport_number: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    /// Free text, comma separated. Grows by accretion during merges.
    pub allergies: Option<String>,
    pub blood_group: Option<String>,
    pub is_global_record: bool,
    pub is_active: bool,
    pub created_by: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    pub last_synced_at: Option<NaiveDateTime>,
}

/// Strong and weak identifiers supplied with an admission.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatientIdentifiers {
    pub national_id: Option<String>,
    pub passport_number: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
}

impl PatientIdentifiers {
    /// Whether any identifier used by the duplicate check is present.
    pub fn has_duplicate_keys(&self) -> bool {
        [&self.national_id, &self.passport_number, &self.phone, &self.email]
            .iter()
            .any(|v| v.as_deref().is_some_and(|s| !s.trim().is_empty()))
    }
}

/// Demographics supplied with an admission, used only when minting a new identity
/// (allergies also seed the case sheet).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Demographics {
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Gender,
    pub allergies: Option<String>,
    pub blood_group: Option<String>,
}
