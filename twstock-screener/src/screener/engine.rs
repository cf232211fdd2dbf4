//! Batch screening.

use serde::Serialize;
use tracing::debug;

use crate::data::StockId;
use crate::indicators::IndicatorSnapshot;

use super::rules::ScreeningRuleSet;

/// A stock offered to the screener with its latest snapshot.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub stock_id: StockId,
    pub name: Option<String>,
    pub snapshot: IndicatorSnapshot,
}

impl Candidate {
    pub fn new(stock_id: StockId, snapshot: IndicatorSnapshot) -> Self {
        Self {
            stock_id,
            name: None,
            snapshot,
        }
    }
}

/// Screening outcome for one stock.
#[derive(Debug, Clone, Serialize)]
pub struct ScreeningResult {
    pub stock_id: StockId,
    pub name: Option<String>,
    pub passed: bool,
    pub snapshot: IndicatorSnapshot,
    pub failed_conditions: Vec<String>,
}

/// Applies one rule set to many candidates independently.
#[derive(Debug, Clone)]
pub struct Screener {
    rule_set: ScreeningRuleSet,
}

impl Screener {
    pub fn new(rule_set: ScreeningRuleSet) -> Self {
        Self { rule_set }
    }

    pub fn rule_set(&self) -> &ScreeningRuleSet {
        &self.rule_set
    }

    /// Full result for every candidate, in input order.
    pub fn screen(&self, candidates: &[Candidate]) -> Vec<ScreeningResult> {
        candidates
            .iter()
            .map(|candidate| {
                let evaluation = self.rule_set.evaluate(&candidate.snapshot);
                debug!(
                    stock_id = %candidate.stock_id,
                    passed = evaluation.passed,
                    failed = ?evaluation.failed_conditions,
                    "Screened"
                );
                ScreeningResult {
                    stock_id: candidate.stock_id.clone(),
                    name: candidate.name.clone(),
                    passed: evaluation.passed,
                    snapshot: candidate.snapshot.clone(),
                    failed_conditions: evaluation.failed_conditions,
                }
            })
            .collect()
    }

    /// Ids of passing candidates, in input order.
    pub fn evaluate(&self, candidates: &[Candidate]) -> Vec<StockId> {
        candidates
            .iter()
            .filter(|c| self.rule_set.evaluate(&c.snapshot).passed)
            .map(|c| c.stock_id.clone())
            .collect()
    }
}
