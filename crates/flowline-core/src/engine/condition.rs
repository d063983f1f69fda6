//! Fixed-operator condition evaluator.
//!
//! Conditions compare a dot-path field from the execution context against a
//! literal operand. Comparisons are deliberately loose, matching how the
//! values arrive from webhooks and stored JSON:
//! - eq/neq coerce both sides to strings and compare case-insensitively
//! - gt/gte/lt/lte parse both sides as numbers; any parse failure is false
//! - `in` splits the operand on commas into an allow-list
//! - exists/not_exists treat null, empty string, and false as absent
//!
//! `in_category` is the one operator that needs a data source. It goes
//! through [`CategoryLookup`] and fails closed: missing identity keys or a
//! lookup error both evaluate to false.

use flowline_types::error::RepositoryError;
use flowline_types::workflow::{Condition, ConditionOperator};
use futures_util::future::BoxFuture;
use serde_json::Value;
use uuid::Uuid;

use super::context::{value_to_string, ExecutionContext};

/// Category membership lookup used by the `in_category` operator.
///
/// Implemented by flowline-infra against the contact store. Object safe so
/// executors can hold it behind `Arc<dyn CategoryLookup>`.
pub trait CategoryLookup: Send + Sync {
    /// Whether the contact belongs to the named category in the workspace.
    fn contact_in_category<'a>(
        &'a self,
        workspace_id: Uuid,
        contact_id: Uuid,
        category: &'a str,
    ) -> BoxFuture<'a, Result<bool, RepositoryError>>;
}

/// Evaluate a condition against the context.
///
/// Handles every pure operator. `in_category` always evaluates false here;
/// use [`evaluate_with_lookup`] when a lookup is available.
pub fn evaluate(condition: &Condition, ctx: &ExecutionContext) -> bool {
    let field = ctx.get(&condition.field);

    match condition.operator {
        ConditionOperator::Eq => loose_eq(field, &condition.value),
        ConditionOperator::Neq => !loose_eq(field, &condition.value),
        ConditionOperator::Gt => numeric_cmp(field, &condition.value, |a, b| a > b),
        ConditionOperator::Gte => numeric_cmp(field, &condition.value, |a, b| a >= b),
        ConditionOperator::Lt => numeric_cmp(field, &condition.value, |a, b| a < b),
        ConditionOperator::Lte => numeric_cmp(field, &condition.value, |a, b| a <= b),
        ConditionOperator::Contains => contains(field, &condition.value),
        ConditionOperator::Exists => is_present(field),
        ConditionOperator::NotExists => !is_present(field),
        ConditionOperator::In => in_list(field, &condition.value),
        ConditionOperator::InCategory => false,
    }
}

/// Evaluate a condition, resolving `in_category` through the lookup.
///
/// The lookup path fails closed: a missing `workspaceId` or `contactId` in
/// the context, or any lookup error, evaluates to false.
pub async fn evaluate_with_lookup(
    condition: &Condition,
    ctx: &ExecutionContext,
    lookup: &dyn CategoryLookup,
) -> bool {
    if condition.operator != ConditionOperator::InCategory {
        return evaluate(condition, ctx);
    }

    let (Some(workspace_id), Some(contact_id)) = (ctx.workspace_id(), ctx.contact_id()) else {
        tracing::debug!(
            field = %condition.field,
            "in_category condition without workspace/contact identity, evaluating false"
        );
        return false;
    };

    let category = value_to_string(&condition.value);
    match lookup
        .contact_in_category(workspace_id, contact_id, &category)
        .await
    {
        Ok(member) => member,
        Err(e) => {
            tracing::warn!(
                %workspace_id,
                %contact_id,
                category,
                error = %e,
                "category lookup failed, evaluating false"
            );
            false
        }
    }
}

// ---------------------------------------------------------------------------
// Operator helpers
// ---------------------------------------------------------------------------

/// Loose equality: both sides string-coerced, compared case-insensitively.
/// An absent field coerces to the empty string.
fn loose_eq(field: Option<&Value>, operand: &Value) -> bool {
    let left = field.map(value_to_string).unwrap_or_default();
    let right = value_to_string(operand);
    left.eq_ignore_ascii_case(&right)
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Numeric comparison; false whenever either side fails to parse.
fn numeric_cmp(field: Option<&Value>, operand: &Value, cmp: fn(f64, f64) -> bool) -> bool {
    match (field.and_then(as_number), as_number(operand)) {
        (Some(a), Some(b)) => cmp(a, b),
        _ => false,
    }
}

/// Substring match on strings, loose element membership on arrays.
fn contains(field: Option<&Value>, operand: &Value) -> bool {
    match field {
        Some(Value::String(s)) => {
            let needle = value_to_string(operand).to_ascii_lowercase();
            s.to_ascii_lowercase().contains(&needle)
        }
        Some(Value::Array(items)) => items.iter().any(|item| loose_eq(Some(item), operand)),
        _ => false,
    }
}

/// Null, the empty string, and false all count as absent.
fn is_present(field: Option<&Value>) -> bool {
    match field {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Bool(b)) => *b,
        Some(_) => true,
    }
}

/// Membership in a comma-separated allow-list, entries trimmed, compared
/// case-insensitively.
fn in_list(field: Option<&Value>, operand: &Value) -> bool {
    let Some(field) = field else {
        return false;
    };
    let left = value_to_string(field);
    value_to_string(operand)
        .split(',')
        .map(str::trim)
        .any(|entry| entry.eq_ignore_ascii_case(&left))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
