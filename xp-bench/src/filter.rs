// Copyright (c) Facebook, Inc. and its affiliates.
use anyhow::Result;
use serde_json::Value;

use super::params::Combination;
use xp_bench_intf::{param_eq, Condition, FilterAction, FilterRule, XpError};

#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    /// No rule matched; the input combination, untouched.
    Pass(Combination),
    /// A `change` rule matched.
    Changed(Combination),
    /// A `remove` rule matched.
    Removed,
}

fn lookup<'a>(comb: &'a Combination, key: &str) -> Result<&'a Value> {
    comb.get(key).ok_or_else(|| {
        XpError::filter(format!(
            "filter references {:?} which is not a parameter of {}",
            key, comb
        ))
        .into()
    })
}

pub fn eval_cond(cond: &Condition, comb: &Combination) -> Result<bool> {
    Ok(match cond {
        Condition::KeyIn { key, values } => {
            let val = lookup(comb, key)?;
            values.iter().any(|v| param_eq(v, val))
        }
        Condition::KeyNotIn { key, values } => {
            let val = lookup(comb, key)?;
            !values.iter().any(|v| param_eq(v, val))
        }
        Condition::And(conds) => {
            for cond in conds.iter() {
                if !eval_cond(cond, comb)? {
                    return Ok(false);
                }
            }
            true
        }
        Condition::Or(conds) => {
            for cond in conds.iter() {
                if eval_cond(cond, comb)? {
                    return Ok(true);
                }
            }
            false
        }
    })
}

/// Whether every condition of the rule's match list holds.
pub fn rule_matches(rule: &FilterRule, comb: &Combination) -> Result<bool> {
    for cond in rule.matches.iter() {
        if !eval_cond(cond, comb)? {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Apply the first matching rule. Later rules are never consulted once
/// one matches.
pub fn apply_filters(rules: &[FilterRule], comb: Combination) -> Result<Verdict> {
    for rule in rules.iter() {
        if rule_matches(rule, &comb)? {
            return Ok(match &rule.action {
                FilterAction::Change(args) => Verdict::Changed(comb.with_overrides(args)),
                FilterAction::Remove => Verdict::Removed,
            });
        }
    }
    Ok(Verdict::Pass(comb))
}
