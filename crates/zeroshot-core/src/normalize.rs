//! Lenient normalization at the wire boundary.
//!
//! Agent output crosses a JSON boundary where booleans sometimes arrive as
//! the strings `"true"`/`"false"`. The engine normalizes to strict booleans
//! at ingestion; everything downstream compares `bool`s.

use serde_json::Value;

/// Normalize a JSON value to a boolean.
///
/// `true` and `"true"` (any case) are true; `false`, `"false"`, and
/// everything else (numbers, nulls, objects, unrecognized strings) is
/// false.
#[must_use]
pub fn normalize_boolean(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => s.eq_ignore_ascii_case("true"),
        _ => false,
    }
}

/// Normalize an optional JSON value; `None` is false.
#[must_use]
pub fn normalize_boolean_opt(value: Option<&Value>) -> bool {
    value.is_some_and(normalize_boolean)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
