//! Trigger predicate evaluation.
//!
//! Predicates are declarative condition trees ([`Predicate`]) evaluated
//! against the triggering message, the cluster's ledger, and the agent
//! roster. Evaluation is budgeted (each ledger lookup consumes one unit)
//! and strictly falsy-on-error: an exhausted budget, a ledger failure, or a
//! malformed condition never fires a task.

use std::collections::HashMap;

use serde_json::Value;
use tracing::debug;

use zeroshot_core::config::{LedgerCondition, Predicate};
use zeroshot_core::message::Message;
use zeroshot_core::normalize::normalize_boolean;
use zeroshot_events::ledger::{Ledger, MessageQuery};

/// Maximum ledger lookups a single predicate evaluation may perform.
pub const QUERY_BUDGET: u32 = 32;

/// Everything a predicate may observe.
pub struct PredicateContext<'a> {
    /// The cluster's ledger.
    pub ledger: &'a Ledger,
    /// Owning cluster.
    pub cluster_id: &'a str,
    /// The message that fired the trigger.
    pub message: &'a Message,
    /// Agent id → role, for role-count conditions.
    pub roles: &'a HashMap<String, String>,
}

/// Evaluate a predicate; any error is falsy.
#[must_use]
pub fn evaluate(predicate: &Predicate, ctx: &PredicateContext<'_>) -> bool {
    let mut budget = QUERY_BUDGET;
    match eval(predicate, ctx, &mut budget) {
        Ok(result) => result,
        Err(reason) => {
            debug!(%reason, "predicate evaluation failed; treating as false");
            false
        }
    }
}

fn eval(
    predicate: &Predicate,
    ctx: &PredicateContext<'_>,
    budget: &mut u32,
) -> Result<bool, String> {
    match predicate {
        Predicate::All { all } => {
            for p in all {
                if !eval(p, ctx, budget)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        Predicate::Any { any } => {
            for p in any {
                if eval(p, ctx, budget)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        Predicate::Not { not } => Ok(!eval(not, ctx, budget)?),
        Predicate::Const { value } => Ok(*value),
        Predicate::MessageEquals { message_equals } => Ok(values_equal(
            ctx.message.data_at(&message_equals.path),
            &message_equals.value,
        )),
        Predicate::MessageExists { message_exists } => {
            Ok(ctx.message.data_at(&message_exists.path).is_some())
        }
        Predicate::LedgerFindLast { ledger_find_last } => {
            eval_find_last(ledger_find_last, ctx, budget)
        }
        Predicate::LedgerCountAtLeast {
            ledger_count_at_least,
        } => {
            spend(budget)?;
            let mut query = MessageQuery::cluster(ctx.cluster_id)
                .topic(ledger_count_at_least.topic.clone())
                .limit(ledger_count_at_least.min);
            if let Some(sender) = &ledger_count_at_least.sender {
                query = query.sender(sender.clone());
            }
            let found = ctx
                .ledger
                .query(&query)
                .map_err(|e| format!("ledger query failed: {e}"))?;
            Ok(found.len() as u32 >= ledger_count_at_least.min)
        }
        Predicate::AgentsByRoleAtLeast {
            agents_by_role_at_least,
        } => {
            let count = ctx
                .roles
                .values()
                .filter(|role| *role == &agents_by_role_at_least.role)
                .count() as u32;
            Ok(count >= agents_by_role_at_least.min)
        }
    }
}

fn eval_find_last(
    cond: &LedgerCondition,
    ctx: &PredicateContext<'_>,
    budget: &mut u32,
) -> Result<bool, String> {
    spend(budget)?;
    let mut query = MessageQuery::cluster(ctx.cluster_id).topic(cond.topic.clone());
    if let Some(sender) = &cond.sender {
        query = query.sender(sender.clone());
    }
    let found = ctx
        .ledger
        .find_last(&query)
        .map_err(|e| format!("ledger find_last failed: {e}"))?;

    let Some(msg) = found else {
        // No matching message: `exists: false` is the only way this holds.
        return Ok(cond.exists == Some(false));
    };

    if cond.exists == Some(false) {
        return Ok(false);
    }

    match (&cond.path, &cond.equals) {
        (Some(path), Some(expected)) => Ok(values_equal(msg.data_at(path), expected)),
        (Some(path), None) => Ok(msg.data_at(path).is_some()),
        (None, Some(_)) => Err("ledgerFindLast has `equals` without `path`".into()),
        (None, None) => Ok(true),
    }
}

fn spend(budget: &mut u32) -> Result<(), String> {
    if *budget == 0 {
        return Err("predicate query budget exhausted".into());
    }
    *budget -= 1;
    Ok(())
}

/// Compare a found value to an expected one, lenient at the bool/string
/// boundary: `"true"` equals `true`.
fn values_equal(actual: Option<&Value>, expected: &Value) -> bool {
    let Some(actual) = actual else {
        return expected.is_null();
    };
    if actual == expected {
        return true;
    }
    match (actual, expected) {
        (Value::String(_), Value::Bool(b)) => normalize_boolean(actual) == *b,
        (Value::Bool(a), Value::String(_)) => *a == normalize_boolean(expected),
        _ => false,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
