use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }
    };
}

str_enum!(VisitType {
    Inpatient => "inpatient",
    Outpatient => "outpatient",
    Emergency => "emergency",
});

str_enum!(VisitStatus {
    Active => "active",
    Discharged => "discharged",
});

str_enum!(SyncStatus {
    Pending => "pending",
    Synced => "synced",
    Failed => "failed",
});

str_enum!(RecordType {
    VisitSummary => "visit_summary",
    Vitals => "vitals",
    LabTest => "lab_test",
    Prescription => "prescription",
});

str_enum!(UserRole {
    SuperAdmin => "super_admin",
    Manager => "manager",
    Doctor => "doctor",
    Nurse => "nurse",
    Receptionist => "receptionist",
});

str_enum!(Gender {
    Male => "male",
    Female => "female",
    Other => "other",
    Unknown => "unknown",
});

str_enum!(LabStatus {
    Ordered => "ordered",
    Completed => "completed",
    Cancelled => "cancelled",
});

str_enum!(SearchBy {
    Auto => "auto",
    NationalId => "national_id",
    Phone => "phone",
    Email => "email",
    Mrn => "mrn",
    Name => "name",
});

impl VisitType {
    /// Visit types that get a seeded case sheet at admission.
    pub fn needs_case_sheet(&self) -> bool {
        matches!(self, VisitType::Inpatient | VisitType::Emergency)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn visit_type_round_trip() {
        for (variant, s) in [
            (VisitType::Inpatient, "inpatient"),
            (VisitType::Outpatient, "outpatient"),
            (VisitType::Emergency, "emergency"),
        ] {
            assert_eq!(variant.as_str(), s);
            assert_eq!(VisitType::from_str(s).unwrap(), variant);
        }
    }

    #[test]
    fn record_type_serializes_snake_case() {
        let json = serde_json::to_string(&RecordType::VisitSummary).unwrap();
        assert_eq!(json, "\"visit_summary\"");
        let role: UserRole = serde_json::from_str("\"super_admin\"").unwrap();
        assert_eq!(role, UserRole::SuperAdmin);
    }

    #[test]
    fn case_sheet_only_for_admitted_types() {
        assert!(VisitType::Inpatient.needs_case_sheet());
        assert!(VisitType::Emergency.needs_case_sheet());
        assert!(!VisitType::Outpatient.needs_case_sheet());
    }

    #[test]
    fn invalid_enum_returns_error() {
        assert!(VisitType::from_str("walk_in").is_err());
        assert!(SyncStatus::from_str("").is_err());
        assert!(matches!(
            SearchBy::from_str("ssn"),
            Err(DatabaseError::InvalidEnum { .. })
        ));
    }
}
