use regex::Regex;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::OnceLock;

/// Aggregation functions usable in chart value expressions and plans
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateFunction {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateFunction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregateFunction::Count => "count",
            AggregateFunction::Sum => "sum",
            AggregateFunction::Avg => "avg",
            AggregateFunction::Min => "min",
            AggregateFunction::Max => "max",
        }
    }

    /// Whether the function reads a source field at all
    pub fn needs_source(&self) -> bool {
        !matches!(self, AggregateFunction::Count)
    }
}

impl std::fmt::Display for AggregateFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AggregateFunction {
    type Err = ExpressionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "count" => Ok(AggregateFunction::Count),
            "sum" => Ok(AggregateFunction::Sum),
            "avg" => Ok(AggregateFunction::Avg),
            "min" => Ok(AggregateFunction::Min),
            "max" => Ok(AggregateFunction::Max),
            _ => Err(ExpressionError::Invalid(s.to_string())),
        }
    }
}

/// A parsed `func(field)` expression.
///
/// Only [`parse_expression`] builds one. For `count` the field is kept but
/// never read: `count(*)` and `count(anything)` compile identically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateExpression {
    function: AggregateFunction,
    field: String,
}

impl AggregateExpression {
    pub fn function(&self) -> AggregateFunction {
        self.function
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    /// Source field, `None` for count
    pub fn source(&self) -> Option<&str> {
        self.function.needs_source().then_some(self.field.as_str())
    }
}

impl std::fmt::Display for AggregateExpression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.function, self.field)
    }
}

impl FromStr for AggregateExpression {
    type Err = ExpressionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_expression(s)
    }
}

fn expression_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^(count|sum|avg|min|max)\s*\(\s*([^()]*?)\s*\)$")
            .expect("expression pattern is valid")
    })
}

/// Parse an aggregation expression such as `avg(duration)` or `COUNT( * )`.
///
/// The function name is case-insensitive; the field keeps its case and is
/// passed through opaque, dots included.
pub fn parse_expression(expr: &str) -> Result<AggregateExpression, ExpressionError> {
    let trimmed = expr.trim();
    let caps = expression_regex()
        .captures(trimmed)
        .ok_or_else(|| ExpressionError::Invalid(expr.to_string()))?;

    let field = caps[2].trim();
    if field.is_empty() {
        return Err(ExpressionError::Invalid(expr.to_string()));
    }

    Ok(AggregateExpression {
        function: caps[1].parse()?,
        field: field.to_string(),
    })
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExpressionError {
    #[error("Invalid aggregation expression: '{0}'")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    const FUNCTIONS: [&str; 5] = ["count", "sum", "avg", "min", "max"];

    #[test]
    fn test_every_function_round_trips() {
        for name in FUNCTIONS {
            for field in ["type", "user.age", "Total Sales", "*", "x_1"] {
                let parsed = parse_expression(&format!("{}({})", name, field)).unwrap();
                assert_eq!(parsed.function().as_str(), name);
                assert_eq!(parsed.field(), field);
            }
        }
    }

    #[test]
    fn test_case_and_whitespace() {
        let parsed = parse_expression("  AVG ( Duration )  ").unwrap();
        assert_eq!(parsed.function(), AggregateFunction::Avg);
        assert_eq!(parsed.field(), "Duration");
    }

    #[test]
    fn test_count_ignores_field() {
        let star = parse_expression("count(*)").unwrap();
        let named = parse_expression("count(anything)").unwrap();
        assert_eq!(star.source(), None);
        assert_eq!(named.source(), None);
        assert_eq!(parse_expression("sum(value)").unwrap().source(), Some("value"));
    }

    #[test]
    fn test_rejects_malformed() {
        for bad in [
            "median(x)",
            "sum x",
            "sum()",
            "sum(   )",
            "sum(a(b))",
            "sum(x) + 1",
            "",
            "avg(x",
        ] {
            assert_eq!(
                parse_expression(bad),
                Err(ExpressionError::Invalid(bad.to_string())),
                "{bad}"
            );
        }
    }
}
