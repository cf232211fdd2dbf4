//! Screening module.
//!
//! A rule set is an ordered list of typed conditions over an
//! [`IndicatorSnapshot`](crate::indicators::IndicatorSnapshot). A stock passes
//! when every condition holds. An undefined indicator on either side of a
//! comparison fails the condition.

mod engine;
mod rules;

pub use engine::{Candidate, Screener, ScreeningResult};
pub use rules::{
    Comparison, Evaluation, Operand, RuleSetError, ScreeningCondition, ScreeningRuleSet,
};
