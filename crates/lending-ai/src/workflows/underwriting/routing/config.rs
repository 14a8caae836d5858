use serde::{Deserialize, Serialize};

/// Business thresholds backing the routing predicates. Stored once here;
/// nothing outside the routing table compares raw fields against these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Minimum KMP shareholding coverage required to proceed (inclusive).
    pub minimum_kmp_coverage: f64,
    /// Minimum consumer CIBIL score across key management personnel.
    pub minimum_consumer_cibil: i64,
    /// Maximum acceptable commercial CMR rank for the entity.
    pub maximum_commercial_cmr: i64,
    /// Legal constitutions eligible for this loan program.
    pub eligible_constitutions: Vec<String>,
    /// Minimum classifier confidence before extracted documents are trusted.
    pub minimum_document_confidence: f64,
    /// Route straight to final assembly when no bank statements were
    /// uploaded, instead of suspending for them.
    pub skip_banking_without_statements: bool,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            minimum_kmp_coverage: 0.5,
            minimum_consumer_cibil: 680,
            maximum_commercial_cmr: 8,
            eligible_constitutions: vec![
                "sole_proprietorship".to_string(),
                "partnership".to_string(),
                "llp".to_string(),
                "company".to_string(),
                "huf".to_string(),
            ],
            minimum_document_confidence: 0.7,
            skip_banking_without_statements: true,
        }
    }
}
