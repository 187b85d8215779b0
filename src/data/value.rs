use serde_json::{Map, Number, Value};
use std::cmp::Ordering;

/// A stored document or a result row. Rows have no fixed schema.
pub type Document = Map<String, Value>;

/// Result rows returned from pipeline execution
pub type ResultRow = Document;

/// How a stored string is turned into a number before parsing.
///
/// Both strategies drop thousands separators first. The heuristics are lossy
/// for locale-specific formats (e.g. `1.234,5`), which are simply rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coercion {
    /// Keep only the first whitespace-delimited token ("12 kg" -> 12)
    LeadingToken,
    /// Remove all whitespace ("1 200" -> 1200)
    Compact,
    /// Trim the ends only; inner whitespace fails ("1 200" -> none)
    Trimmed,
}

/// Resolve a dotted path ("user.address.city") inside a document
pub fn get_path<'a>(doc: &'a Document, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let first = parts.next()?;
    let mut current = doc.get(first)?;

    for part in parts {
        current = match current {
            Value::Object(map) => map.get(part)?,
            Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    Some(current)
}

/// Set a value at a dotted path, creating intermediate objects as needed
pub fn set_path(doc: &mut Document, path: &str, value: Value) {
    match path.split_once('.') {
        None => {
            doc.insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            let entry = doc
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            if let Value::Object(nested) = entry {
                set_path(nested, rest, value);
            }
        }
    }
}

/// Null and missing values are treated alike by the pipeline stages
pub fn is_present(value: Option<&Value>) -> bool {
    !matches!(value, None | Some(Value::Null))
}

/// Numeric view of a value, without any string parsing
pub fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

/// Coerce a stored value to a number.
///
/// Numbers pass through untouched. Strings have thousands separators
/// stripped and are parsed per `mode`; anything else (booleans, objects,
/// unparseable or non-finite text) yields `None`.
pub fn coerce_numeric(value: &Value, mode: Coercion) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let cleaned = s.replace(',', "");
            let candidate = match mode {
                Coercion::LeadingToken => cleaned.split_whitespace().next()?.to_string(),
                Coercion::Compact => cleaned.chars().filter(|c| !c.is_whitespace()).collect(),
                Coercion::Trimmed => cleaned.trim().to_string(),
            };
            candidate.parse::<f64>().ok().filter(|v| v.is_finite())
        }
        _ => None,
    }
}

/// Build a JSON number, preferring an integer representation when exact
pub fn number(value: f64) -> Value {
    if value.fract() == 0.0 && value.abs() < 9.0e15 {
        return Value::Number(Number::from(value as i64));
    }
    Number::from_f64(value).map(Value::Number).unwrap_or(Value::Null)
}

/// Round half away from zero to `digits` decimal places
pub fn round_to(value: f64, digits: u32) -> f64 {
    let factor = 10f64.powi(digits as i32);
    (value * factor).round() / factor
}

/// Render a number the way a bucket label shows it ("10", "2.5")
pub fn format_number(value: f64) -> String {
    format!("{}", value)
}

/// Total order across value types: null < numbers < strings < objects < arrays < booleans
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Number(x), Value::Number(y)) => {
            match (x.as_i64(), y.as_i64()) {
                (Some(i), Some(j)) => i.cmp(&j),
                _ => {
                    let x = x.as_f64().unwrap_or(f64::NAN);
                    let y = y.as_f64().unwrap_or(f64::NAN);
                    x.partial_cmp(&y).unwrap_or(Ordering::Equal)
                }
            }
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => {
            for (l, r) in x.iter().zip(y.iter()) {
                let cmp = compare_values(l, r);
                if cmp != Ordering::Equal {
                    return cmp;
                }
            }
            x.len().cmp(&y.len())
        }
        (Value::Object(x), Value::Object(y)) => {
            let left = serde_json::to_string(x).unwrap_or_default();
            let right = serde_json::to_string(y).unwrap_or_default();
            left.cmp(&right)
        }
        _ => type_order(a).cmp(&type_order(b)),
    }
}

/// Get a numeric order for type comparison
fn type_order(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Number(_) => 1,
        Value::String(_) => 2,
        Value::Object(_) => 3,
        Value::Array(_) => 4,
        Value::Bool(_) => 5,
    }
}

/// Equality with numeric normalization (1 == 1.0)
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) => compare_values(a, b) == Ordering::Equal,
        _ => a == b,
    }
}
