use serde_json::{json, Map, Value};

use super::expression::AggregateFunction;
use super::plan::Filter;
use crate::data::Coercion;

/// Row predicate of a `Match` stage
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Caller-supplied predicate, never interpreted by the compiler
    Filter(Filter),
    /// Every listed field exists and is non-null (and non-empty if `reject_empty`)
    Present {
        fields: Vec<String>,
        reject_empty: bool,
    },
}

impl Predicate {
    pub fn present(field: impl Into<String>) -> Self {
        Predicate::Present {
            fields: vec![field.into()],
            reject_empty: false,
        }
    }

    pub fn non_empty(fields: Vec<String>) -> Self {
        Predicate::Present {
            fields,
            reject_empty: true,
        }
    }
}

/// Writes a numeric copy of `source` into `target`, or null when not coercible
#[derive(Debug, Clone, PartialEq)]
pub struct NumericField {
    pub source: String,
    pub target: String,
    pub coercion: Coercion,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupSpec {
    /// Group key field; `None` groups every row together
    pub key: Option<String>,
    pub function: AggregateFunction,
    /// Field read by the accumulator, `None` for count
    pub source: Option<String>,
    /// Output field holding the accumulated value
    pub output: String,
    /// Coerce source values to numbers: thousands commas are dropped and the
    /// ends trimmed. Anything else that fails to parse, inner whitespace
    /// included, counts as 0.
    pub coerce: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProjectExpr {
    /// Copy a (possibly dotted) field
    Field(String),
    /// Copy a numeric field rounded to `digits` places
    Rounded { field: String, digits: u32 },
    /// "min - max" label from two numeric fields
    RangeLabel { min: String, max: String, digits: u32 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    pub name: String,
    pub expr: ProjectExpr,
}

impl Projection {
    pub fn field(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            expr: ProjectExpr::Field(source.into()),
        }
    }

    pub fn rounded(name: impl Into<String>, source: impl Into<String>, digits: u32) -> Self {
        Self {
            name: name.into(),
            expr: ProjectExpr::Rounded {
                field: source.into(),
                digits,
            },
        }
    }
}

/// One step of a compiled aggregation pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    Match(Predicate),
    AddNumericField(NumericField),
    Group(GroupSpec),
    /// Output only the listed fields
    Project(Vec<Projection>),
    Sort { key: String, descending: bool },
    /// Equal-frequency buckets; each yields `_id {min, max}`, `count`, `min`, `max`
    BucketAuto { field: String, buckets: usize },
    Limit(usize),
    /// Single row `{name: n}`; no row at all for empty input
    Count(String),
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Match(_) => "match",
            Stage::AddNumericField(_) => "add_numeric_field",
            Stage::Group(_) => "group",
            Stage::Project(_) => "project",
            Stage::Sort { .. } => "sort",
            Stage::BucketAuto { .. } => "bucket_auto",
            Stage::Limit(_) => "limit",
            Stage::Count(_) => "count",
        }
    }

    /// Document-store aggregation syntax for this stage
    pub fn to_json(&self) -> Value {
        match self {
            Stage::Match(Predicate::Filter(filter)) => json!({ "$match": filter.as_json() }),
            Stage::Match(Predicate::Present { fields, reject_empty }) => {
                let mut cond = Map::new();
                for field in fields {
                    let mut ops = Map::new();
                    ops.insert("$exists".into(), json!(true));
                    if *reject_empty {
                        ops.insert("$nin".into(), json!([null, ""]));
                    } else {
                        ops.insert("$ne".into(), Value::Null);
                    }
                    cond.insert(field.clone(), Value::Object(ops));
                }
                json!({ "$match": cond })
            }
            Stage::AddNumericField(nf) => {
                let source = format!("${}", nf.source);
                let text = json!({
                    "$replaceAll": {"input": {"$toString": source}, "find": ",", "replacement": ""}
                });
                let cleaned = match nf.coercion {
                    Coercion::LeadingToken => {
                        json!({"$trim": {"input": {"$arrayElemAt": [{"$split": [text, " "]}, 0]}}})
                    }
                    Coercion::Compact => json!({
                        "$trim": {"input": {"$replaceAll": {"input": text, "find": " ", "replacement": ""}}}
                    }),
                    Coercion::Trimmed => json!({"$trim": {"input": text}}),
                };
                json!({
                    "$addFields": {
                        nf.target.clone(): {
                            "$convert": {
                                "input": {
                                    "$cond": {
                                        "if": {"$in": [{"$type": source}, ["int", "double", "long", "decimal"]]},
                                        "then": source,
                                        "else": cleaned
                                    }
                                },
                                "to": "double",
                                "onError": null,
                                "onNull": null
                            }
                        }
                    }
                })
            }
            Stage::Group(spec) => {
                let id = spec
                    .key
                    .as_ref()
                    .map(|k| Value::String(format!("${}", k)))
                    .unwrap_or(Value::Null);
                let input = match (&spec.source, spec.function) {
                    (_, AggregateFunction::Count) | (None, _) => json!(1),
                    (Some(source), _) if spec.coerce => {
                        let source = format!("${}", source);
                        json!({
                            "$cond": {
                                "if": {"$in": [{"$type": source}, ["int", "double", "long", "decimal"]]},
                                "then": source,
                                "else": {
                                    "$convert": {
                                        "input": {"$trim": {"input": {"$replaceAll": {
                                            "input": {"$toString": source}, "find": ",", "replacement": ""
                                        }}}},
                                        "to": "double",
                                        "onError": 0,
                                        "onNull": 0
                                    }
                                }
                            }
                        })
                    }
                    (Some(source), _) => Value::String(format!("${}", source)),
                };
                let op = match spec.function {
                    AggregateFunction::Count | AggregateFunction::Sum => "$sum",
                    AggregateFunction::Avg => "$avg",
                    AggregateFunction::Min => "$min",
                    AggregateFunction::Max => "$max",
                };
                json!({ "$group": { "_id": id, spec.output.clone(): { op: input } } })
            }
            Stage::Project(projections) => {
                let mut spec = Map::new();
                spec.insert("_id".into(), json!(0));
                for p in projections {
                    let expr = match &p.expr {
                        ProjectExpr::Field(source) => Value::String(format!("${}", source)),
                        ProjectExpr::Rounded { field, digits } => {
                            json!({"$round": [format!("${}", field), digits]})
                        }
                        ProjectExpr::RangeLabel { min, max, digits } => json!({
                            "$concat": [
                                {"$toString": {"$round": [format!("${}", min), digits]}},
                                " - ",
                                {"$toString": {"$round": [format!("${}", max), digits]}}
                            ]
                        }),
                    };
                    spec.insert(p.name.clone(), expr);
                }
                json!({ "$project": spec })
            }
            Stage::Sort { key, descending } => {
                let direction = if *descending { -1 } else { 1 };
                json!({ "$sort": { key.clone(): direction } })
            }
            Stage::BucketAuto { field, buckets } => json!({
                "$bucketAuto": {
                    "groupBy": format!("${}", field),
                    "buckets": buckets,
                    "output": {
                        "count": {"$sum": 1},
                        "min": {"$min": format!("${}", field)},
                        "max": {"$max": format!("${}", field)}
                    }
                }
            }),
            Stage::Limit(n) => json!({ "$limit": n }),
            Stage::Count(name) => json!({ "$count": name }),
        }
    }
}

/// Document-store syntax for a whole pipeline
pub fn pipeline_json(stages: &[Stage]) -> Value {
    Value::Array(stages.iter().map(Stage::to_json).collect())
}
