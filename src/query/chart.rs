//! Chart specifications
//!
//! Stored chart records carry a loose `config` map whose required keys depend
//! on the chart type. [`ChartSpec::from_config`] turns that map into a typed
//! specification or reports exactly which keys are missing.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::compiler::CompileError;
use super::expression::{parse_expression, AggregateExpression};

/// Default number of histogram buckets
pub const DEFAULT_HISTOGRAM_BINS: usize = 10;

/// Supported visualizations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartKind {
    BarChart,
    PieChart,
    LineChart,
    GeoMap,
    ScatterPlot,
    Histogram,
}

impl ChartKind {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "bar_chart" => Some(ChartKind::BarChart),
            "pie_chart" => Some(ChartKind::PieChart),
            "line_chart" => Some(ChartKind::LineChart),
            "geo_map" => Some(ChartKind::GeoMap),
            "scatter_plot" => Some(ChartKind::ScatterPlot),
            "histogram" => Some(ChartKind::Histogram),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChartKind::BarChart => "bar_chart",
            ChartKind::PieChart => "pie_chart",
            ChartKind::LineChart => "line_chart",
            ChartKind::GeoMap => "geo_map",
            ChartKind::ScatterPlot => "scatter_plot",
            ChartKind::Histogram => "histogram",
        }
    }

    /// Config keys that must be present: (group/axis key, value key)
    fn required_keys(&self) -> (&'static str, &'static str) {
        match self {
            ChartKind::BarChart | ChartKind::LineChart | ChartKind::ScatterPlot => {
                ("x_axis", "y_axis")
            }
            ChartKind::PieChart => ("category", "value"),
            ChartKind::GeoMap => ("location_field", "value_field"),
            ChartKind::Histogram => ("field", "bins"),
        }
    }
}

impl std::fmt::Display for ChartKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Typed chart specification
#[derive(Debug, Clone, PartialEq)]
pub enum ChartSpec {
    /// Bar, pie, line and geo charts: one aggregated value per group
    Grouped {
        kind: ChartKind,
        group_key: String,
        value: AggregateExpression,
    },
    Scatter { x_field: String, y_field: String },
    Histogram { field: String, bins: usize },
}

impl ChartSpec {
    pub fn kind(&self) -> ChartKind {
        match self {
            ChartSpec::Grouped { kind, .. } => *kind,
            ChartSpec::Scatter { .. } => ChartKind::ScatterPlot,
            ChartSpec::Histogram { .. } => ChartKind::Histogram,
        }
    }

    /// Build a specification from a chart type name and its config map
    pub fn from_config(chart_type: &str, config: &Map<String, Value>) -> Result<Self, CompileError> {
        let kind = ChartKind::parse(chart_type)
            .ok_or_else(|| CompileError::UnsupportedChart(chart_type.to_string()))?;
        let (first_key, second_key) = kind.required_keys();

        if kind == ChartKind::Histogram {
            let field = config_str(config, first_key)
                .ok_or_else(|| CompileError::incomplete(kind, vec![first_key]))?;
            let bins = parse_bins(config.get(second_key))?;
            return Ok(ChartSpec::Histogram { field, bins });
        }

        let first = config_str(config, first_key);
        let second = config_str(config, second_key);
        let (first, second) = match (first, second) {
            (Some(a), Some(b)) => (a, b),
            (a, b) => {
                let mut missing = Vec::new();
                if a.is_none() {
                    missing.push(first_key);
                }
                if b.is_none() {
                    missing.push(second_key);
                }
                return Err(CompileError::incomplete(kind, missing));
            }
        };

        if kind == ChartKind::ScatterPlot {
            return Ok(ChartSpec::Scatter {
                x_field: first,
                y_field: second,
            });
        }

        let value = parse_expression(&second)?;
        Ok(ChartSpec::Grouped {
            kind,
            group_key: first,
            value,
        })
    }
}

/// Non-empty string value of a config key
fn config_str(config: &Map<String, Value>, key: &str) -> Option<String> {
    match config.get(key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}

fn parse_bins(value: Option<&Value>) -> Result<usize, CompileError> {
    let raw = match value {
        None | Some(Value::Null) => return Ok(DEFAULT_HISTOGRAM_BINS),
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
        Some(_) => None,
    };

    match raw {
        Some(bins) if bins >= 1 => Ok(bins as usize),
        _ => Err(CompileError::InvalidBins(
            value.map(|v| v.to_string()).unwrap_or_default(),
        )),
    }
}

fn default_display_mode() -> String {
    "direct".to_string()
}

/// Chart specification as stored in the chart collection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartRecord {
    #[serde(rename = "_id")]
    pub id: String,
    pub chart_type: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub config: Map<String, Value>,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_display_mode")]
    pub display_mode: String,
}

impl ChartRecord {
    pub fn new(
        id: impl Into<String>,
        chart_type: impl Into<String>,
        title: impl Into<String>,
        config: Value,
    ) -> Self {
        Self {
            id: id.into(),
            chart_type: chart_type.into(),
            title: title.into(),
            config: match config {
                Value::Object(map) => map,
                _ => Map::new(),
            },
            description: String::new(),
            display_mode: default_display_mode(),
        }
    }

    pub fn spec(&self) -> Result<ChartSpec, CompileError> {
        ChartSpec::from_config(&self.chart_type, &self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::expression::AggregateFunction;
    use serde_json::json;

    fn config(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_grouped_charts() {
        let spec = ChartSpec::from_config(
            "bar_chart",
            &config(json!({"x_axis": "type", "y_axis": "count(type)"})),
        )
        .unwrap();
        match spec {
            ChartSpec::Grouped { kind, group_key, value } => {
                assert_eq!(kind, ChartKind::BarChart);
                assert_eq!(group_key, "type");
                assert_eq!(value.function(), AggregateFunction::Count);
            }
            other => panic!("unexpected spec {other:?}"),
        }

        let pie = ChartSpec::from_config(
            "PIE_CHART",
            &config(json!({"category": "region", "value": "sum(sales)"})),
        )
        .unwrap();
        assert_eq!(pie.kind(), ChartKind::PieChart);

        let geo = ChartSpec::from_config(
            "geo_map",
            &config(json!({"location_field": "country", "value_field": "avg(score)"})),
        )
        .unwrap();
        assert_eq!(geo.kind(), ChartKind::GeoMap);
    }

    #[test]
    fn test_missing_keys_reported() {
        let err = ChartSpec::from_config("pie_chart", &config(json!({"category": "region"})))
            .unwrap_err();
        match err {
            CompileError::IncompleteConfig { chart, missing } => {
                assert_eq!(chart, ChartKind::PieChart);
                assert_eq!(missing, vec!["value"]);
            }
            other => panic!("unexpected error {other:?}"),
        }

        let err = ChartSpec::from_config("scatter_plot", &config(json!({"x_axis": " "})))
            .unwrap_err();
        assert!(matches!(
            err,
            CompileError::IncompleteConfig { ref missing, .. } if missing == &vec!["x_axis", "y_axis"]
        ));
    }

    #[test]
    fn test_histogram_bins() {
        let spec = ChartSpec::from_config("histogram", &config(json!({"field": "price"}))).unwrap();
        assert_eq!(
            spec,
            ChartSpec::Histogram {
                field: "price".into(),
                bins: DEFAULT_HISTOGRAM_BINS
            }
        );

        let spec =
            ChartSpec::from_config("histogram", &config(json!({"field": "price", "bins": "5"})))
                .unwrap();
        assert!(matches!(spec, ChartSpec::Histogram { bins: 5, .. }));

        assert!(matches!(
            ChartSpec::from_config("histogram", &config(json!({"field": "price", "bins": 0}))),
            Err(CompileError::InvalidBins(_))
        ));
    }

    #[test]
    fn test_unsupported_and_invalid() {
        assert!(matches!(
            ChartSpec::from_config("radar", &Map::new()),
            Err(CompileError::UnsupportedChart(_))
        ));
        assert!(matches!(
            ChartSpec::from_config(
                "line_chart",
                &config(json!({"x_axis": "month", "y_axis": "median(sales)"}))
            ),
            Err(CompileError::InvalidExpression(_))
        ));
    }

    #[test]
    fn test_record_deserialize_defaults() {
        let record: ChartRecord = serde_json::from_value(json!({
            "_id": "c1",
            "chart_type": "histogram",
            "config": {"field": "age"}
        }))
        .unwrap();
        assert_eq!(record.display_mode, "direct");
        assert!(record.title.is_empty());
        assert!(record.spec().is_ok());
    }
}
