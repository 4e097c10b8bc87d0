//! DMA result types (spec.md §3 "DMA results").

use serde::{Deserialize, Serialize};

/// Result of the Ethical PDMA.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EthicalDmaResult {
    pub alignment_check: String,
    pub decision: String,
    pub rationale: String,
}

/// Result of the Common-Sense DMA.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CsdmaResult {
    pub plausibility_score: f64,
    pub flags: Vec<String>,
    pub reasoning: String,
}

/// Result of the optional Domain-Specific DMA.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DsdmaResult {
    pub domain: String,
    pub score: f64,
    pub flags: Vec<String>,
    pub reasoning: String,
    #[serde(default)]
    pub recommended_action: Option<String>,
}

/// The three (or two, if no DSDMA is configured) parallel DMA outputs,
/// aggregated for the critical-failure gate (spec.md §4.3 Step 3) and for
/// the action-selection DMA's triaged input bundle (Step 4).
#[derive(Debug, Clone, Default)]
pub struct DmaResults {
    pub ethical: Option<EthicalDmaResult>,
    pub common_sense: Option<CsdmaResult>,
    pub domain_specific: Option<DsdmaResult>,
    /// Names of DMAs that failed after retries; non-empty implies
    /// `critical_failure`.
    pub failed_dmas: Vec<String>,
}

impl DmaResults {
    pub fn critical_failure(&self) -> bool {
        !self.failed_dmas.is_empty()
    }
}
