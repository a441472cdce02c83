use serde::{Deserialize, Serialize};

use crate::models::ModelError;

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

            pub fn all() -> &'static [$name] {
                &[$(Self::$variant),+]
            }
        }

        impl std::str::FromStr for $name {
            type Err = ModelError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(ModelError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.as_str())
            }
        }
    };
}

str_enum!(TemplateType {
    Purchase => "purchase",
    Sale => "sale",
    SpotPurchase => "spot_purchase",
    SpotSale => "spot_sale",
});

impl TemplateType {
    /// Which side of the book this contract sits on.
    pub fn direction(&self) -> Direction {
        match self {
            Self::Purchase | Self::SpotPurchase => Direction::Buy,
            Self::Sale | Self::SpotSale => Direction::Sell,
        }
    }

    pub fn term_type(&self) -> TermType {
        match self {
            Self::SpotPurchase | Self::SpotSale => TermType::Spot,
            Self::Purchase | Self::Sale => TermType::LongTerm,
        }
    }
}

str_enum!(Incoterm {
    Fob => "FOB",
    Cfr => "CFR",
    Cif => "CIF",
    Dap => "DAP",
    Ddp => "DDP",
    Fca => "FCA",
    Exw => "EXW",
});

str_enum!(TermType {
    Spot => "spot",
    LongTerm => "long_term",
});

str_enum!(Direction {
    Buy => "buy",
    Sell => "sell",
});

str_enum!(CounterpartyType {
    Supplier => "supplier",
    Customer => "customer",
});

str_enum!(ReviewStatus {
    Draft => "draft",
    PendingReview => "pending_review",
    Approved => "approved",
    Rejected => "rejected",
    Superseded => "superseded",
});

impl ReviewStatus {
    /// Legal transitions of the review state machine. `Rejected` is
    /// terminal; `Approved` may only move to `Superseded`.
    pub fn can_transition_to(&self, next: ReviewStatus) -> bool {
        matches!(
            (self, next),
            (Self::Draft, Self::PendingReview)
                | (Self::PendingReview, Self::Approved)
                | (Self::PendingReview, Self::Rejected)
                | (Self::Approved, Self::Superseded)
        )
    }
}

str_enum!(VerificationStatus {
    Verified => "verified",
    Stale => "stale",
    FileNotFound => "file_not_found",
    Unverified => "unverified",
});

str_enum!(Confidence {
    High => "high",
    Medium => "medium",
    Low => "low",
});

impl Confidence {
    /// Ordering for dedup tie-breaks: High > Medium > Low.
    pub fn rank(&self) -> u8 {
        match self {
            Self::High => 2,
            Self::Medium => 1,
            Self::Low => 0,
        }
    }
}

str_enum!(BoundOperator {
    Gte => "gte",
    Lte => "lte",
    Eq => "eq",
    Between => "between",
});

str_enum!(Period {
    Spot => "spot",
    Monthly => "monthly",
    Quarterly => "quarterly",
    Annual => "annual",
});

str_enum!(PenaltyType {
    VolumeShortfall => "volume_shortfall",
    LateDelivery => "late_delivery",
    Demurrage => "demurrage",
});

str_enum!(SourceFormat {
    Pdf => "pdf",
    Docx => "docx",
    Docm => "docm",
    Txt => "txt",
});

impl SourceFormat {
    /// Dispatch on a file name's extension, case-insensitive.
    pub fn from_file_name(name: &str) -> Option<Self> {
        let (stem, ext) = name.rsplit_once('.')?;
        if stem.is_empty() {
            return None;
        }
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "docx" => Some(Self::Docx),
            "docm" => Some(Self::Docm),
            "txt" => Some(Self::Txt),
            _ => None,
        }
    }
}

str_enum!(ReviewerRole {
    Trader => "trader",
    Legal => "legal",
    Operations => "operations",
});

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn status_roundtrip() {
        for status in ReviewStatus::all() {
            let parsed = ReviewStatus::from_str(status.as_str()).unwrap();
            assert_eq!(parsed, *status);
        }
    }

    #[test]
    fn status_from_invalid() {
        assert!(ReviewStatus::from_str("live").is_err());
        assert!(ReviewStatus::from_str("").is_err());
    }

    #[test]
    fn incoterm_uses_upper_case_wire_names() {
        assert_eq!(Incoterm::Fob.as_str(), "FOB");
        assert_eq!(Incoterm::from_str("DAP").unwrap(), Incoterm::Dap);
        assert!(Incoterm::from_str("fob").is_err());
    }

    #[test]
    fn template_type_direction() {
        assert_eq!(TemplateType::Purchase.direction(), Direction::Buy);
        assert_eq!(TemplateType::SpotPurchase.direction(), Direction::Buy);
        assert_eq!(TemplateType::Sale.direction(), Direction::Sell);
        assert_eq!(TemplateType::SpotSale.direction(), Direction::Sell);
    }

    #[test]
    fn template_type_term() {
        assert_eq!(TemplateType::SpotSale.term_type(), TermType::Spot);
        assert_eq!(TemplateType::Purchase.term_type(), TermType::LongTerm);
    }

    #[test]
    fn review_transitions_acyclic() {
        use ReviewStatus::*;
        assert!(Draft.can_transition_to(PendingReview));
        assert!(PendingReview.can_transition_to(Approved));
        assert!(PendingReview.can_transition_to(Rejected));
        assert!(Approved.can_transition_to(Superseded));

        // Terminal and backward moves are rejected.
        assert!(!Rejected.can_transition_to(Draft));
        assert!(!Rejected.can_transition_to(PendingReview));
        assert!(!Approved.can_transition_to(Draft));
        assert!(!Superseded.can_transition_to(Approved));
        assert!(!PendingReview.can_transition_to(Draft));
    }

    #[test]
    fn confidence_rank_ordering() {
        assert!(Confidence::High.rank() > Confidence::Medium.rank());
        assert!(Confidence::Medium.rank() > Confidence::Low.rank());
    }

    #[test]
    fn source_format_from_file_name() {
        assert_eq!(
            SourceFormat::from_file_name("Koch_FOB_2026.docx"),
            Some(SourceFormat::Docx)
        );
        assert_eq!(
            SourceFormat::from_file_name("TERMS.PDF"),
            Some(SourceFormat::Pdf)
        );
        assert_eq!(
            SourceFormat::from_file_name("notes.TxT"),
            Some(SourceFormat::Txt)
        );
        assert_eq!(
            SourceFormat::from_file_name("macro.docm"),
            Some(SourceFormat::Docm)
        );
        assert_eq!(SourceFormat::from_file_name("image.png"), None);
        assert_eq!(SourceFormat::from_file_name("no_extension"), None);
    }

    #[test]
    fn serde_snake_case() {
        let json = serde_json::to_string(&ReviewStatus::PendingReview).unwrap();
        assert_eq!(json, "\"pending_review\"");
        let parsed: ReviewStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, ReviewStatus::PendingReview);
    }

    #[test]
    fn penalty_type_serde() {
        let json = serde_json::to_string(&PenaltyType::VolumeShortfall).unwrap();
        assert_eq!(json, "\"volume_shortfall\"");
    }
}
