//! Screening conditions and the built-in rule sets.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

use crate::indicators::{Indicator, IndicatorSnapshot};

// ============================================================================
// Errors
// ============================================================================

/// Errors raised while building or adjusting a rule set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleSetError {
    #[error("unknown rule set: {0} (expected default or momentum)")]
    UnknownRuleSet(String),

    #[error("rule set {rule_set} has no condition named {name}")]
    UnknownCondition { rule_set: String, name: String },

    #[error("condition {0} compares two indicators and has no threshold")]
    NotAThreshold(String),
}

// ============================================================================
// Condition
// ============================================================================

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparison {
    #[serde(rename = ">")]
    Greater,
    #[serde(rename = ">=")]
    GreaterOrEqual,
    #[serde(rename = "<")]
    Less,
    #[serde(rename = "<=")]
    LessOrEqual,
}

impl Comparison {
    pub fn holds(&self, left: f64, right: f64) -> bool {
        match self {
            Self::Greater => left > right,
            Self::GreaterOrEqual => left >= right,
            Self::Less => left < right,
            Self::LessOrEqual => left <= right,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Greater => ">",
            Self::GreaterOrEqual => ">=",
            Self::Less => "<",
            Self::LessOrEqual => "<=",
        }
    }
}

/// Right-hand side of a condition.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operand {
    Threshold(f64),
    Indicator(Indicator),
}

/// One named predicate, e.g. `volume >= 5000` or `ma5 > ma20`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreeningCondition {
    /// Stable name, used as the override key
    pub name: String,
    pub indicator: Indicator,
    pub comparison: Comparison,
    pub operand: Operand,
}

impl ScreeningCondition {
    /// `indicator <cmp> threshold`
    pub fn threshold(
        name: impl Into<String>,
        indicator: Indicator,
        comparison: Comparison,
        value: f64,
    ) -> Self {
        Self {
            name: name.into(),
            indicator,
            comparison,
            operand: Operand::Threshold(value),
        }
    }

    /// `indicator <cmp> other`
    pub fn relative(
        name: impl Into<String>,
        indicator: Indicator,
        comparison: Comparison,
        other: Indicator,
    ) -> Self {
        Self {
            name: name.into(),
            indicator,
            comparison,
            operand: Operand::Indicator(other),
        }
    }

    /// Whether the snapshot satisfies this condition.
    ///
    /// `false` when either side is undefined.
    pub fn is_met(&self, snapshot: &IndicatorSnapshot) -> bool {
        let Some(left) = snapshot.value(self.indicator) else {
            return false;
        };
        let right = match self.operand {
            Operand::Threshold(v) => Some(v),
            Operand::Indicator(other) => snapshot.value(other),
        };

        right.map_or(false, |right| self.comparison.holds(left, right))
    }
}

impl fmt::Display for ScreeningCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.operand {
            Operand::Threshold(v) => {
                write!(f, "{} {} {}", self.indicator, self.comparison.symbol(), v)
            }
            Operand::Indicator(other) => {
                write!(f, "{} {} {}", self.indicator, self.comparison.symbol(), other)
            }
        }
    }
}

// ============================================================================
// Rule Set
// ============================================================================

/// Outcome of evaluating a rule set against one snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub passed: bool,
    /// Names of failing conditions, in rule-set order
    pub failed_conditions: Vec<String>,
}

/// Ordered conditions combined with logical AND.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreeningRuleSet {
    pub name: String,
    pub conditions: Vec<ScreeningCondition>,
}

impl ScreeningRuleSet {
    pub fn new(name: impl Into<String>, conditions: Vec<ScreeningCondition>) -> Self {
        Self {
            name: name.into(),
            conditions,
        }
    }

    /// The daily screen: institutional buying, rising price, liquidity and
    /// stacked moving averages.
    pub fn default_rules() -> Self {
        use Comparison::*;
        Self::new(
            "default",
            vec![
                ScreeningCondition::threshold(
                    "institutional_net_total",
                    Indicator::InstitutionalNetTotal,
                    Greater,
                    0.0,
                ),
                ScreeningCondition::threshold(
                    "institutional_streak_days",
                    Indicator::InstitutionalStreakDays,
                    GreaterOrEqual,
                    1.0,
                ),
                ScreeningCondition::threshold(
                    "price_change_pct",
                    Indicator::PriceChangePct,
                    Greater,
                    0.0,
                ),
                ScreeningCondition::threshold("volume", Indicator::Volume, GreaterOrEqual, 5000.0),
                ScreeningCondition::relative(
                    "ma5_above_ma20",
                    Indicator::Ma5,
                    Greater,
                    Indicator::Ma20,
                ),
                ScreeningCondition::relative(
                    "ma20_above_ma60",
                    Indicator::Ma20,
                    Greater,
                    Indicator::Ma60,
                ),
            ],
        )
    }

    /// Short-term momentum: MA5 over MA20, MACD above its signal and zero,
    /// close over MA20.
    pub fn momentum() -> Self {
        use Comparison::*;
        Self::new(
            "momentum",
            vec![
                ScreeningCondition::relative(
                    "ma5_above_ma20",
                    Indicator::Ma5,
                    Greater,
                    Indicator::Ma20,
                ),
                ScreeningCondition::relative(
                    "dif_above_signal",
                    Indicator::MacdDif,
                    Greater,
                    Indicator::MacdSignal,
                ),
                ScreeningCondition::threshold(
                    "signal_positive",
                    Indicator::MacdSignal,
                    Greater,
                    0.0,
                ),
                ScreeningCondition::threshold("osc_positive", Indicator::MacdOsc, Greater, 0.0),
                ScreeningCondition::relative(
                    "close_above_ma20",
                    Indicator::Close,
                    Greater,
                    Indicator::Ma20,
                ),
            ],
        )
    }

    /// Look up a built-in rule set by name (case-insensitive).
    pub fn by_name(name: &str) -> Result<Self, RuleSetError> {
        match name.trim().to_lowercase().as_str() {
            "default" => Ok(Self::default_rules()),
            "momentum" => Ok(Self::momentum()),
            _ => Err(RuleSetError::UnknownRuleSet(name.to_string())),
        }
    }

    /// Replace the threshold of the named condition.
    pub fn set_threshold(&mut self, name: &str, value: f64) -> Result<(), RuleSetError> {
        let rule_set = self.name.clone();
        let condition = self
            .conditions
            .iter_mut()
            .find(|c| c.name == name)
            .ok_or_else(|| RuleSetError::UnknownCondition {
                rule_set,
                name: name.to_string(),
            })?;

        match condition.operand {
            Operand::Threshold(_) => {
                condition.operand = Operand::Threshold(value);
                Ok(())
            }
            Operand::Indicator(_) => Err(RuleSetError::NotAThreshold(name.to_string())),
        }
    }

    /// Apply a map of threshold overrides keyed by condition name.
    pub fn apply_overrides(
        &mut self,
        overrides: &BTreeMap<String, f64>,
    ) -> Result<(), RuleSetError> {
        for (name, value) in overrides {
            self.set_threshold(name, *value)?;
        }
        Ok(())
    }

    /// Remove the named conditions.
    pub fn disable(&mut self, names: &[String]) -> Result<(), RuleSetError> {
        for name in names {
            if !self.conditions.iter().any(|c| &c.name == name) {
                return Err(RuleSetError::UnknownCondition {
                    rule_set: self.name.clone(),
                    name: name.clone(),
                });
            }
        }
        self.conditions.retain(|c| !names.contains(&c.name));
        Ok(())
    }

    /// Evaluate every condition against `snapshot`.
    pub fn evaluate(&self, snapshot: &IndicatorSnapshot) -> Evaluation {
        let failed_conditions: Vec<String> = self
            .conditions
            .iter()
            .filter(|c| !c.is_met(snapshot))
            .map(|c| c.name.clone())
            .collect();

        Evaluation {
            passed: failed_conditions.is_empty(),
            failed_conditions,
        }
    }

    /// Human-readable list of conditions, e.g. for report headers.
    pub fn describe(&self) -> String {
        self.conditions
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    /// Snapshot that satisfies every default and momentum condition.
    fn passing_snapshot() -> IndicatorSnapshot {
        IndicatorSnapshot {
            date: NaiveDate::from_ymd_opt(2024, 5, 17).unwrap(),
            close: 105.0,
            volume: 8000,
            ma5: Some(104.0),
            ma20: Some(100.0),
            ma60: Some(95.0),
            macd_dif: Some(1.5),
            macd_signal: Some(1.0),
            macd_osc: Some(1.0),
            institutional_net_total: Some(1),
            institutional_streak_days: Some(2),
            price_change_pct: Some(1.2),
            latest_revenue: None,
            revenue_yoy_pct: None,
        }
    }

    #[test]
    fn test_default_passes() {
        let eval = ScreeningRuleSet::default_rules().evaluate(&passing_snapshot());
        assert!(eval.passed);
        assert!(eval.failed_conditions.is_empty());
    }

    #[test]
    fn test_net_total_boundary() {
        let rules = ScreeningRuleSet::default_rules();
        let mut snap = passing_snapshot();

        snap.institutional_net_total = Some(0);
        let eval = rules.evaluate(&snap);
        assert!(!eval.passed);
        assert_eq!(eval.failed_conditions, vec!["institutional_net_total"]);

        snap.institutional_net_total = Some(1);
        assert!(rules.evaluate(&snap).passed);
    }

    #[test]
    fn test_volume_boundary_inclusive() {
        let rules = ScreeningRuleSet::default_rules();
        let mut snap = passing_snapshot();
        snap.volume = 5000;
        assert!(rules.evaluate(&snap).passed);
        snap.volume = 4999;
        assert!(!rules.evaluate(&snap).passed);
    }

    #[test]
    fn test_selling_streak_fails() {
        let mut snap = passing_snapshot();
        snap.institutional_streak_days = Some(-3);
        let eval = ScreeningRuleSet::default_rules().evaluate(&snap);
        assert_eq!(eval.failed_conditions, vec!["institutional_streak_days"]);
    }

    #[test]
    fn test_undefined_fails_closed_for_all_rule_sets() {
        for rules in [ScreeningRuleSet::default_rules(), ScreeningRuleSet::momentum()] {
            let mut snap = passing_snapshot();
            snap.ma20 = None;
            let eval = rules.evaluate(&snap);
            assert!(!eval.passed, "{}", rules.name);
            assert!(eval.failed_conditions.contains(&"ma5_above_ma20".to_string()));
        }
    }

    #[test]
    fn test_missing_ma60_fails_only_that_condition() {
        let mut snap = passing_snapshot();
        snap.ma60 = None;
        let eval = ScreeningRuleSet::default_rules().evaluate(&snap);
        assert_eq!(eval.failed_conditions, vec!["ma20_above_ma60"]);
    }

    #[test]
    fn test_momentum_rules() {
        let rules = ScreeningRuleSet::momentum();
        assert!(rules.evaluate(&passing_snapshot()).passed);

        let mut snap = passing_snapshot();
        snap.macd_dif = Some(0.5);
        snap.macd_osc = Some(-1.0);
        let eval = rules.evaluate(&snap);
        assert_eq!(eval.failed_conditions, vec!["dif_above_signal", "osc_positive"]);
    }

    #[test]
    fn test_threshold_override() {
        let mut rules = ScreeningRuleSet::default_rules();
        let mut overrides = BTreeMap::new();
        overrides.insert("volume".to_string(), 10_000.0);
        rules.apply_overrides(&overrides).unwrap();

        let eval = rules.evaluate(&passing_snapshot());
        assert_eq!(eval.failed_conditions, vec!["volume"]);
    }

    #[test]
    fn test_override_errors() {
        let mut rules = ScreeningRuleSet::default_rules();
        assert!(matches!(
            rules.set_threshold("turnover", 1.0),
            Err(RuleSetError::UnknownCondition { .. })
        ));
        assert_eq!(
            rules.set_threshold("ma5_above_ma20", 1.0),
            Err(RuleSetError::NotAThreshold("ma5_above_ma20".into()))
        );
    }

    #[test]
    fn test_disable_conditions() {
        let mut rules = ScreeningRuleSet::default_rules();
        rules.disable(&["ma20_above_ma60".to_string()]).unwrap();
        assert_eq!(rules.conditions.len(), 5);

        let mut snap = passing_snapshot();
        snap.ma60 = None;
        assert!(rules.evaluate(&snap).passed);

        assert!(rules.disable(&["nope".to_string()]).is_err());
    }

    #[test]
    fn test_by_name_and_describe() {
        assert_eq!(ScreeningRuleSet::by_name("Momentum").unwrap().name, "momentum");
        assert!(matches!(
            ScreeningRuleSet::by_name("aggressive"),
            Err(RuleSetError::UnknownRuleSet(_))
        ));

        let described = ScreeningRuleSet::default_rules().describe();
        assert!(described.starts_with("institutional_net_total > 0, "));
        assert!(described.contains("volume >= 5000"));
        assert!(described.ends_with("ma20 > ma60"));
    }
}
