use serde_json::Value;
use std::cmp::Ordering;

use crate::data::{as_number, compare_values};
use crate::query::AggregateFunction;

/// Accumulator trait for group and bucket outputs
pub trait Accumulator: Send + Sync {
    /// Add a value to the accumulator
    fn accumulate(&mut self, value: &Value);

    /// Get the final result
    fn result(&self) -> Value;
}

/// Counts every row it sees
#[derive(Debug, Clone, Default)]
pub struct CountAccumulator {
    count: i64,
}

impl Accumulator for CountAccumulator {
    fn accumulate(&mut self, _value: &Value) {
        self.count += 1;
    }

    fn result(&self) -> Value {
        Value::from(self.count)
    }
}

/// Sum of numeric values; non-numeric values are ignored and an empty sum is 0.
///
/// Stays integral while every input is an integer and the sum fits in i64.
#[derive(Debug, Clone)]
pub struct SumAccumulator {
    int_sum: Option<i64>,
    float_sum: f64,
}

impl Default for SumAccumulator {
    fn default() -> Self {
        Self {
            int_sum: Some(0),
            float_sum: 0.0,
        }
    }
}

impl Accumulator for SumAccumulator {
    fn accumulate(&mut self, value: &Value) {
        let Value::Number(n) = value else {
            return;
        };
        if let Some(v) = n.as_f64() {
            self.float_sum += v;
        }
        self.int_sum = match (self.int_sum, n.as_i64()) {
            (Some(acc), Some(i)) => acc.checked_add(i),
            _ => None,
        };
    }

    fn result(&self) -> Value {
        match self.int_sum {
            Some(i) => Value::from(i),
            None => number_or_null(self.float_sum),
        }
    }
}

/// Mean of numeric values, null when none were seen
#[derive(Debug, Clone, Default)]
pub struct AvgAccumulator {
    sum: f64,
    count: i64,
}

impl Accumulator for AvgAccumulator {
    fn accumulate(&mut self, value: &Value) {
        if let Some(v) = as_number(value) {
            self.sum += v;
            self.count += 1;
        }
    }

    fn result(&self) -> Value {
        if self.count > 0 {
            number_or_null(self.sum / self.count as f64)
        } else {
            Value::Null
        }
    }
}

/// Smallest or largest non-null value under the cross-type value order
#[derive(Debug, Clone)]
pub struct ExtremeAccumulator {
    best: Option<Value>,
    keep: Ordering,
}

impl ExtremeAccumulator {
    pub fn min() -> Self {
        Self {
            best: None,
            keep: Ordering::Less,
        }
    }

    pub fn max() -> Self {
        Self {
            best: None,
            keep: Ordering::Greater,
        }
    }
}

impl Accumulator for ExtremeAccumulator {
    fn accumulate(&mut self, value: &Value) {
        if value.is_null() {
            return;
        }
        let replace = match &self.best {
            None => true,
            Some(current) => compare_values(value, current) == self.keep,
        };
        if replace {
            self.best = Some(value.clone());
        }
    }

    fn result(&self) -> Value {
        self.best.clone().unwrap_or(Value::Null)
    }
}

fn number_or_null(v: f64) -> Value {
    serde_json::Number::from_f64(v)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

/// Create an accumulator for an aggregation function
pub fn create_accumulator(func: AggregateFunction) -> Box<dyn Accumulator> {
    match func {
        AggregateFunction::Count => Box::new(CountAccumulator::default()),
        AggregateFunction::Sum => Box::new(SumAccumulator::default()),
        AggregateFunction::Avg => Box::new(AvgAccumulator::default()),
        AggregateFunction::Min => Box::new(ExtremeAccumulator::min()),
        AggregateFunction::Max => Box::new(ExtremeAccumulator::max()),
    }
}
