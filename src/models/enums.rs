use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $s)] $variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$(Self::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
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

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

str_enum!(DocumentType {
    Bordereau => "BORDEREAU",
    Facture => "FACTURE",
    Reclamation => "RECLAMATION",
    BulletinSoin => "BULLETIN_SOIN",
    DocumentGeneral => "DOCUMENT_GENERAL",
});

str_enum!(DocumentStatus {
    Indexed => "INDEXED",
    IndexedWithErrors => "INDEXED_WITH_ERRORS",
});

str_enum!(TriggerType {
    AutoAssignment => "AUTO_ASSIGNMENT",
    SlaMonitoring => "SLA_MONITORING",
    ComplaintProcessing => "COMPLAINT_PROCESSING",
});

str_enum!(TriggerStatus {
    Pending => "PENDING",
    Executed => "EXECUTED",
    Failed => "FAILED",
});

str_enum!(LogAction {
    Processed => "processed",
    ProcessedWithErrors => "processed_with_errors",
    Duplicate => "duplicate",
    PathConflict => "path_conflict",
    Error => "error",
    Abandoned => "abandoned",
});

str_enum!(LogStatus {
    Success => "success",
    Failed => "failed",
    Skipped => "skipped",
});

impl DocumentType {
    /// Workflow triggers emitted for a cleanly extracted document of this type.
    pub fn triggers(&self) -> &'static [TriggerType] {
        match self {
            Self::Bordereau => &[TriggerType::AutoAssignment, TriggerType::SlaMonitoring],
            Self::Facture => &[TriggerType::SlaMonitoring],
            Self::Reclamation => &[TriggerType::ComplaintProcessing],
            Self::BulletinSoin | Self::DocumentGeneral => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn document_type_round_trip() {
        for variant in DocumentType::ALL {
            assert_eq!(DocumentType::from_str(variant.as_str()).unwrap(), *variant);
        }
        assert_eq!(DocumentType::BulletinSoin.as_str(), "BULLETIN_SOIN");
    }

    #[test]
    fn serde_uses_wire_names() {
        let json = serde_json::to_string(&TriggerType::SlaMonitoring).unwrap();
        assert_eq!(json, "\"SLA_MONITORING\"");
        let back: LogStatus = serde_json::from_str("\"skipped\"").unwrap();
        assert_eq!(back, LogStatus::Skipped);
    }

    #[test]
    fn trigger_rule_table() {
        assert_eq!(
            DocumentType::Bordereau.triggers(),
            &[TriggerType::AutoAssignment, TriggerType::SlaMonitoring]
        );
        assert_eq!(DocumentType::Facture.triggers(), &[TriggerType::SlaMonitoring]);
        assert_eq!(
            DocumentType::Reclamation.triggers(),
            &[TriggerType::ComplaintProcessing]
        );
        assert!(DocumentType::BulletinSoin.triggers().is_empty());
        assert!(DocumentType::DocumentGeneral.triggers().is_empty());
    }

    #[test]
    fn invalid_enum_returns_error() {
        assert!(DocumentType::from_str("bordereau").is_err());
        assert!(TriggerStatus::from_str("").is_err());
        assert!(LogAction::from_str("deleted").is_err());
    }
}
