//! Global patient identity resolution.
//!
//! Search runs an ordered cascade of independent lookups and stops at the
//! first hit: national ID / passport, phone, email, MRN (any hospital), name.
//! The duplicate check used before minting an identity looks at every
//! supplied identifier and, under `IdentityMatchPolicy::FailClosed`, refuses
//! when they point at different patients.

use rusqlite::Connection;

use crate::config::{EngineConfig, IdentityMatchPolicy};
use crate::db;
use crate::error::CoreError;
use crate::models::{normalize_phone, Patient, PatientIdentifiers, SearchBy};

/// Cascade order used by `SearchBy::Auto`.
const CASCADE: [SearchBy; 5] = [
    SearchBy::NationalId,
    SearchBy::Phone,
    SearchBy::Email,
    SearchBy::Mrn,
    SearchBy::Name,
];

pub struct IdentityResolver<'a> {
    config: &'a EngineConfig,
}

impl<'a> IdentityResolver<'a> {
    pub fn new(config: &'a EngineConfig) -> Self {
        Self { config }
    }

    /// Find one active global patient. "Not found" is `Ok(None)`.
    pub fn search_global_patient(
        &self,
        conn: &Connection,
        query: &str,
        search_by: SearchBy,
    ) -> Result<Option<Patient>, CoreError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(None);
        }

        let tiers: &[SearchBy] = match search_by {
            SearchBy::Auto => &CASCADE,
            ref single => std::slice::from_ref(single),
        };

        for tier in tiers {
            if let Some(patient) = self.run_tier(conn, *tier, query)? {
                tracing::debug!(tier = %tier, patient_id = %patient.id, "Identity tier matched");
                return Ok(Some(patient));
            }
        }
        Ok(None)
    }

    /// Look for an existing identity behind any of the strong or contact
    /// identifiers. Phone is compared exactly (normalized) here; substring
    /// matching is reserved for interactive search.
    pub fn check_duplicate_patient(
        &self,
        conn: &Connection,
        ids: &PatientIdentifiers,
    ) -> Result<Option<Patient>, CoreError> {
        let mut hits: Vec<(&'static str, Patient)> = Vec::new();
        let fail_closed = self.config.identity_match_policy == IdentityMatchPolicy::FailClosed;

        let lookups: [(&'static str, Option<&str>); 4] = [
            ("national_id", non_blank(&ids.national_id)),
            ("passport_number", non_blank(&ids.passport_number)),
            ("phone", non_blank(&ids.phone)),
            ("email", non_blank(&ids.email)),
        ];

        for (field, value) in lookups {
            let Some(value) = value else { continue };
            let found = match field {
                "phone" => db::find_active_by_phone(conn, &normalize_phone(value), false)?,
                "email" => db::find_active_by_email(conn, value)?,
                _ => db::find_active_by_document_id(conn, value)?,
            };
            if let Some(patient) = found {
                if !fail_closed {
                    return Ok(Some(patient));
                }
                hits.push((field, patient));
            }
        }

        let Some((first_field, first)) = hits.first() else {
            return Ok(None);
        };
        if let Some((field, other)) = hits.iter().find(|(_, p)| p.id != first.id) {
            tracing::warn!(
                first_field = *first_field,
                first_patient = %first.id,
                conflicting_field = *field,
                conflicting_patient = %other.id,
                "Identifiers resolve to different patients"
            );
            return Err(CoreError::Conflict(format!(
                "identifiers resolve to different patients ({first_field} and {field})"
            )));
        }
        Ok(Some(first.clone()))
    }

    fn run_tier(&self, conn: &Connection, tier: SearchBy, query: &str) -> Result<Option<Patient>, CoreError> {
        let found = match tier {
            SearchBy::NationalId => db::find_active_by_document_id(conn, query)?,
            SearchBy::Phone => {
                let normalized = normalize_phone(query);
                let digits = normalized.chars().filter(|c| c.is_ascii_digit()).count();
                let allow_substring = digits >= self.config.min_phone_substring_digits;
                db::find_active_by_phone(conn, &normalized, allow_substring)?
            }
            SearchBy::Email => db::find_active_by_email(conn, query)?,
            SearchBy::Mrn => self.patient_by_mrn(conn, query)?,
            SearchBy::Name => {
                let mut tokens = query.split_whitespace();
                match (tokens.next(), tokens.collect::<Vec<_>>()) {
                    (Some(given), rest) if !rest.is_empty() => {
                        db::find_active_by_name(conn, given, &rest.join(" "))?
                    }
                    _ => None,
                }
            }
            SearchBy::Auto => None,
        };
        Ok(found)
    }

    /// MRNs are only unique per hospital; the oldest active link wins.
    fn patient_by_mrn(&self, conn: &Connection, mrn: &str) -> Result<Option<Patient>, CoreError> {
        let links = db::find_links_by_mrn(conn, mrn)?;
        let Some(first) = links.first() else {
            return Ok(None);
        };
        if links.iter().any(|l| l.patient_id != first.patient_id) {
            tracing::warn!(
                mrn,
                hospitals = links.len(),
                "MRN is used by different patients at different hospitals"
            );
        }
        let patient = db::get_patient(conn, &first.patient_id)?;
        Ok(patient.filter(|p| p.is_active))
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::fixtures::{make_patient, now, seed_hospital, seed_link};
    use crate::db::sqlite::open_memory_database;

    struct World {
        conn: Connection,
        ada: Patient,
        bola: Patient,
    }

    fn world() -> World {
        let conn = open_memory_database().unwrap();
        seed_hospital(&conn, "H1");
        seed_hospital(&conn, "H2");

        let mut ada = make_patient("Ada", "Okafor");
        ada.national_id = Some("N1".into());
        ada.phone = Some("555-0101".into());
        ada.email = Some("a@b.com".into());
        db::insert_patient(&conn, &ada).unwrap();
        seed_link(&conn, ada.id, "H1", "H1-001");

        let mut bola = make_patient("Bola", "Adeyemi");
        bola.passport_number = Some("P-900".into());
        bola.phone = Some("(555) 0199".into());
        bola.email = Some("bola@example.com".into());
        db::insert_patient(&conn, &bola).unwrap();
        seed_link(&conn, bola.id, "H2", "H2-777");

        World { conn, ada, bola }
    }

    fn search(w: &World, q: &str, by: SearchBy) -> Option<Patient> {
        let cfg = EngineConfig::default();
        IdentityResolver::new(&cfg).search_global_patient(&w.conn, q, by).unwrap()
    }

    #[test]
    fn auto_cascade_finds_each_tier() {
        let w = world();
        assert_eq!(search(&w, "N1", SearchBy::Auto).unwrap().id, w.ada.id);
        assert_eq!(search(&w, "P-900", SearchBy::Auto).unwrap().id, w.bola.id);
        assert_eq!(search(&w, "555 0101", SearchBy::Auto).unwrap().id, w.ada.id);
        assert_eq!(search(&w, "BOLA@example.com", SearchBy::Auto).unwrap().id, w.bola.id);
        assert_eq!(search(&w, "H2-777", SearchBy::Auto).unwrap().id, w.bola.id);
        assert_eq!(search(&w, "ad oka", SearchBy::Auto).unwrap().id, w.ada.id);
        assert!(search(&w, "nobody here", SearchBy::Auto).is_none());
    }

    #[test]
    fn specific_tier_does_not_fall_through() {
        let w = world();
        assert!(search(&w, "N1", SearchBy::Email).is_none());
        assert!(search(&w, "H1-001", SearchBy::Name).is_none());
        assert_eq!(search(&w, "H1-001", SearchBy::Mrn).unwrap().id, w.ada.id);
    }

    #[test]
    fn single_token_never_runs_name_tier() {
        let w = world();
        assert!(search(&w, "Ada", SearchBy::Name).is_none());
        assert!(search(&w, "Ada", SearchBy::Auto).is_none());
    }

    #[test]
    fn blank_query_is_not_found() {
        let w = world();
        assert!(search(&w, "   ", SearchBy::Auto).is_none());
    }

    #[test]
    fn short_phone_fragments_do_not_substring_match() {
        let w = world();
        assert!(search(&w, "0101", SearchBy::Phone).is_none());
        assert_eq!(search(&w, "5550101", SearchBy::Phone).unwrap().id, w.ada.id);
    }

    #[test]
    fn cascade_short_circuits_on_first_tier() {
        let w = world();
        // Carol's national ID equals Bola's email; tier 1 wins without looking further.
        let mut carol = make_patient("Carol", "Mensah");
        carol.national_id = Some("bola@example.com".into());
        db::insert_patient(&w.conn, &carol).unwrap();
        assert_eq!(search(&w, "bola@example.com", SearchBy::Auto).unwrap().id, carol.id);
    }

    #[test]
    fn duplicate_check_is_consistent_across_identifiers() {
        let w = world();
        let cfg = EngineConfig::default();
        let resolver = IdentityResolver::new(&cfg);
        for ids in [
            PatientIdentifiers { national_id: Some("N1".into()), ..Default::default() },
            PatientIdentifiers { phone: Some("555-0101".into()), ..Default::default() },
            PatientIdentifiers { email: Some("a@b.com".into()), ..Default::default() },
            PatientIdentifiers {
                national_id: Some("N1".into()),
                phone: Some("5550101".into()),
                email: Some("A@B.COM".into()),
                ..Default::default()
            },
        ] {
            let found = resolver.check_duplicate_patient(&w.conn, &ids).unwrap().unwrap();
            assert_eq!(found.id, w.ada.id);
        }
    }

    #[test]
    fn duplicate_check_fails_closed_on_disagreement() {
        let w = world();
        let cfg = EngineConfig::default();
        let ids = PatientIdentifiers {
            national_id: Some("N1".into()),
            phone: Some("(555) 0199".into()),
            ..Default::default()
        };
        let err = IdentityResolver::new(&cfg)
            .check_duplicate_patient(&w.conn, &ids)
            .unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));
    }

    #[test]
    fn duplicate_check_first_match_wins_when_configured() {
        let w = world();
        let cfg = EngineConfig {
            identity_match_policy: IdentityMatchPolicy::FirstMatchWins,
            ..EngineConfig::default()
        };
        let ids = PatientIdentifiers {
            national_id: Some("N1".into()),
            phone: Some("(555) 0199".into()),
            ..Default::default()
        };
        let found = IdentityResolver::new(&cfg)
            .check_duplicate_patient(&w.conn, &ids)
            .unwrap()
            .unwrap();
        assert_eq!(found.id, w.ada.id);
    }

    #[test]
    fn duplicate_check_ignores_deactivated_patients() {
        let w = world();
        db::set_patient_active(&w.conn, &w.ada.id, false, &now()).unwrap();
        let cfg = EngineConfig::default();
        let ids = PatientIdentifiers { national_id: Some("N1".into()), ..Default::default() };
        assert!(IdentityResolver::new(&cfg)
            .check_duplicate_patient(&w.conn, &ids)
            .unwrap()
            .is_none());
        assert!(search(&w, "H1-001", SearchBy::Mrn).is_none());
    }
}
