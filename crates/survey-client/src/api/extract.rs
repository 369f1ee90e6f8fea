//! Record-id lookup for backend responses.
//!
//! The backend has returned created ids under several names and sometimes
//! nested under a `data` wrapper. Every call site resolves ids through
//! [`extract_record_id`], which tries the candidates in this order:
//!
//! 1. top level: `id`, `ID`, `answer_id`, `answerId`
//! 2. under `data`: `id`, `ID`, `answer_id`

use serde_json::Value;

const TOP_LEVEL_ID_FIELDS: [&str; 4] = ["id", "ID", "answer_id", "answerId"];
const NESTED_ID_FIELDS: [&str; 3] = ["id", "ID", "answer_id"];
const DATA_WRAPPER: &str = "data";

/// Returns the first positive integer id found in `response`.
///
/// Ids may arrive as JSON numbers or numeric strings; zero, negative, empty,
/// and non-numeric values are skipped so the next candidate is tried.
pub fn extract_record_id(response: &Value) -> Option<i64> {
    first_id(response, &TOP_LEVEL_ID_FIELDS).or_else(|| {
        response
            .get(DATA_WRAPPER)
            .and_then(|nested| first_id(nested, &NESTED_ID_FIELDS))
    })
}

fn first_id(object: &Value, fields: &[&str]) -> Option<i64> {
    fields
        .iter()
        .filter_map(|field| object.get(*field))
        .find_map(coerce_id)
}

fn coerce_id(value: &Value) -> Option<i64> {
    let id = match value {
        Value::Number(number) => number.as_i64().or_else(|| {
            number
                .as_f64()
                .filter(|float| float.fract() == 0.0 && float.is_finite())
                .map(|float| float as i64)
        }),
        Value::String(text) => text.trim().parse::<i64>().ok(),
        _ => None,
    }?;
    (id > 0).then_some(id)
}
