//! Document query matching for caller-supplied filters
//!
//! Supports implicit equality, the comparison operators
//! `$eq $ne $gt $gte $lt $lte $in $nin $exists $regex`, and the logical
//! combinators `$and $or $nor`. Anything else is rejected as invalid.

use serde_json::{Map, Value};
use std::cmp::Ordering;

use super::StorageError;
use crate::data::{compare_values, get_path, values_equal, Document};

/// Check whether a document satisfies a filter object
pub fn matches(doc: &Document, filter: &Value) -> Result<bool, StorageError> {
    let conditions = filter
        .as_object()
        .ok_or_else(|| StorageError::InvalidFilter(format!("filter must be an object: {}", filter)))?;

    for (key, condition) in conditions {
        let passes = match key.as_str() {
            "$and" => all_of(doc, condition)?,
            "$or" => any_of(doc, condition)?,
            "$nor" => !any_of(doc, condition)?,
            op if op.starts_with('$') => {
                return Err(StorageError::InvalidFilter(format!(
                    "unsupported top-level operator {}",
                    op
                )))
            }
            path => field_matches(get_path(doc, path), condition)?,
        };

        if !passes {
            return Ok(false);
        }
    }

    Ok(true)
}

fn clauses(value: &Value) -> Result<&Vec<Value>, StorageError> {
    value
        .as_array()
        .ok_or_else(|| StorageError::InvalidFilter("logical operator expects an array".into()))
}

fn all_of(doc: &Document, value: &Value) -> Result<bool, StorageError> {
    for clause in clauses(value)? {
        if !matches(doc, clause)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn any_of(doc: &Document, value: &Value) -> Result<bool, StorageError> {
    for clause in clauses(value)? {
        if matches(doc, clause)? {
            return Ok(true);
        }
    }
    Ok(false)
}

fn is_operator_object(map: &Map<String, Value>) -> bool {
    !map.is_empty() && map.keys().all(|k| k.starts_with('$'))
}

fn field_matches(actual: Option<&Value>, condition: &Value) -> Result<bool, StorageError> {
    let Value::Object(ops) = condition else {
        return Ok(equals(actual, condition));
    };
    if !is_operator_object(ops) {
        return Ok(equals(actual, condition));
    }

    for (op, operand) in ops {
        let passes = match op.as_str() {
            "$eq" => equals(actual, operand),
            "$ne" => !equals(actual, operand),
            "$gt" => compares(actual, operand, |o| o == Ordering::Greater),
            "$gte" => compares(actual, operand, |o| o != Ordering::Less),
            "$lt" => compares(actual, operand, |o| o == Ordering::Less),
            "$lte" => compares(actual, operand, |o| o != Ordering::Greater),
            "$in" => one_of(actual, operand)?,
            "$nin" => !one_of(actual, operand)?,
            "$exists" => {
                let wanted = operand.as_bool().ok_or_else(|| {
                    StorageError::InvalidFilter("$exists expects a boolean".into())
                })?;
                actual.is_some() == wanted
            }
            "$regex" => regex_matches(actual, operand, ops.get("$options"))?,
            "$options" => true,
            other => {
                return Err(StorageError::InvalidFilter(format!(
                    "unsupported operator {}",
                    other
                )))
            }
        };

        if !passes {
            return Ok(false);
        }
    }

    Ok(true)
}

/// Equality; null matches a missing field and arrays match on any element
fn equals(actual: Option<&Value>, expected: &Value) -> bool {
    match actual {
        None => expected.is_null(),
        Some(Value::Array(items)) if !expected.is_array() => {
            items.iter().any(|item| values_equal(item, expected))
        }
        Some(value) => values_equal(value, expected),
    }
}

/// Range comparison, only between values of the same kind
fn compares(actual: Option<&Value>, operand: &Value, accept: impl Fn(Ordering) -> bool) -> bool {
    let Some(value) = actual else {
        return false;
    };
    let same_kind = matches!(
        (value, operand),
        (Value::Number(_), Value::Number(_))
            | (Value::String(_), Value::String(_))
            | (Value::Bool(_), Value::Bool(_))
    );
    same_kind && accept(compare_values(value, operand))
}

fn one_of(actual: Option<&Value>, operand: &Value) -> Result<bool, StorageError> {
    let candidates = operand
        .as_array()
        .ok_or_else(|| StorageError::InvalidFilter("$in/$nin expect an array".into()))?;
    Ok(candidates.iter().any(|c| equals(actual, c)))
}

fn regex_matches(
    actual: Option<&Value>,
    pattern: &Value,
    options: Option<&Value>,
) -> Result<bool, StorageError> {
    let pattern = pattern
        .as_str()
        .ok_or_else(|| StorageError::InvalidFilter("$regex expects a string".into()))?;
    let case_insensitive = options
        .and_then(Value::as_str)
        .map(|o| o.contains('i'))
        .unwrap_or(false);
    let source = if case_insensitive {
        format!("(?i){}", pattern)
    } else {
        pattern.to_string()
    };
    let re = regex::Regex::new(&source)
        .map_err(|e| StorageError::InvalidFilter(format!("bad $regex: {}", e)))?;

    Ok(matches!(actual, Some(Value::String(s)) if re.is_match(s)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc() -> Document {
        json!({
            "country": "NO",
            "units": 12,
            "price": 9.5,
            "tags": ["new", "sale"],
            "owner": {"name": "Kari"},
            "note": null
        })
        .as_object()
        .cloned()
        .unwrap()
    }

    #[test]
    fn test_implicit_equality() {
        assert!(matches(&doc(), &json!({"country": "NO"})).unwrap());
        assert!(matches(&doc(), &json!({"owner.name": "Kari"})).unwrap());
        assert!(matches(&doc(), &json!({"tags": "sale"})).unwrap());
        assert!(matches(&doc(), &json!({"missing": null})).unwrap());
        assert!(!matches(&doc(), &json!({"country": "SE"})).unwrap());
    }

    #[test]
    fn test_comparisons() {
        assert!(matches(&doc(), &json!({"units": {"$gt": 10, "$lte": 12}})).unwrap());
        assert!(!matches(&doc(), &json!({"units": {"$lt": 12}})).unwrap());
        assert!(!matches(&doc(), &json!({"country": {"$gt": 5}})).unwrap());
        assert!(matches(&doc(), &json!({"price": {"$in": [1, 9.5]}})).unwrap());
        assert!(matches(&doc(), &json!({"country": {"$nin": ["SE", "DK"]}})).unwrap());
    }

    #[test]
    fn test_exists_and_regex() {
        assert!(matches(&doc(), &json!({"note": {"$exists": true}})).unwrap());
        assert!(matches(&doc(), &json!({"missing": {"$exists": false}})).unwrap());
        assert!(matches(&doc(), &json!({"owner.name": {"$regex": "^ka", "$options": "i"}})).unwrap());
    }

    #[test]
    fn test_logical_operators() {
        let filter = json!({"$or": [{"country": "SE"}, {"units": {"$gte": 12}}]});
        assert!(matches(&doc(), &filter).unwrap());
        let filter = json!({"$and": [{"country": "NO"}, {"units": 3}]});
        assert!(!matches(&doc(), &filter).unwrap());
        let filter = json!({"$nor": [{"country": "SE"}]});
        assert!(matches(&doc(), &filter).unwrap());
    }

    #[test]
    fn test_invalid_filters() {
        assert!(matches!(
            matches(&doc(), &json!({"units": {"$near": 1}})),
            Err(StorageError::InvalidFilter(_))
        ));
        assert!(matches!(
            matches(&doc(), &json!({"$where": "1"})),
            Err(StorageError::InvalidFilter(_))
        ));
        assert!(matches!(matches(&doc(), &json!([1])), Err(StorageError::InvalidFilter(_))));
    }
}
