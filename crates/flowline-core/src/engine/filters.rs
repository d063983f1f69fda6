//! Per-trigger-type event filters.
//!
//! A trigger node may carry a filter under `data.filter` narrowing which
//! events of its type fire the workflow. Filters never error: an empty or
//! absent filter matches everything, unrecognized keys are ignored, and a
//! trigger type without filter semantics always matches.

use flowline_types::workflow::NodeType;
use serde_json::Value;

use super::context::value_to_string;

/// Whether an event payload passes a trigger node's filter.
pub fn matches(trigger_type: NodeType, filter: Option<&Value>, payload: &Value) -> bool {
    let Some(filter) = filter.and_then(Value::as_object) else {
        return true;
    };
    if filter.is_empty() {
        return true;
    }

    match trigger_type {
        NodeType::ContactCreated => {
            str_field_matches(filter.get("categoryName"), payload.get("categoryName"))
        }
        NodeType::ReviewReceived => {
            rating_in_range(filter.get("minRating"), filter.get("maxRating"), payload.get("rating"))
                && str_field_matches(filter.get("source"), payload.get("source"))
        }
        NodeType::MessageReceived => {
            str_field_matches(filter.get("channel"), payload.get("channel"))
                && str_field_matches(filter.get("source"), payload.get("source"))
        }
        NodeType::FormSubmitted => str_field_matches(filter.get("formId"), payload.get("formId")),
        NodeType::StageChanged => {
            str_field_matches(filter.get("fromStage"), payload.get("fromStage"))
                && str_field_matches(filter.get("toStage"), payload.get("toStage"))
        }
        // No filter semantics defined for this type: always match.
        _ => true,
    }
}

/// Case-insensitive equality when the filter sets the field; pass otherwise.
fn str_field_matches(wanted: Option<&Value>, actual: Option<&Value>) -> bool {
    let Some(wanted) = wanted.filter(|v| !v.is_null()) else {
        return true;
    };
    let wanted = value_to_string(wanted);
    if wanted.is_empty() {
        return true;
    }
    actual
        .map(value_to_string)
        .is_some_and(|actual| actual.eq_ignore_ascii_case(&wanted))
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Numeric range check. Bounds the filter does not set always pass; a bound
/// it does set fails when the payload rating is missing or unparseable.
fn rating_in_range(min: Option<&Value>, max: Option<&Value>, rating: Option<&Value>) -> bool {
    let min = min.and_then(as_number);
    let max = max.and_then(as_number);
    if min.is_none() && max.is_none() {
        return true;
    }

    let Some(rating) = rating.and_then(as_number) else {
        return false;
    };
    min.is_none_or(|m| rating >= m) && max.is_none_or(|m| rating <= m)
}
