//! PulseQuery: Analytic Intent Compiler
//!
//! Turns analytic intent into document-store aggregation pipelines and runs
//! them. Two kinds of intent are supported: structured query plans (usually
//! extracted from a natural-language question by a language model) and
//! declarative chart specifications.
//!
//! # Features
//!
//! - **Expression Parsing**: `func(field)` aggregation expressions
//! - **Plan Validation**: operations and fields checked against a schema catalog
//! - **Pipeline Compilation**: group/count/aggregate plans and bar, pie, line,
//!   geo, scatter and histogram charts
//! - **Execution**: one aggregation call per pipeline, with empty charts pruned
//! - **Analyst Workflow**: question -> plan -> validate -> compile -> execute -> summary
//! - **In-Memory Datastore**: concurrent document store with JSON snapshots
//!
//! # Example
//!
//! ```no_run
//! use pulsequery::data::{SchemaCatalog, SchemaRecord};
//! use pulsequery::query::{run_plan, PlanRequest};
//! use pulsequery::storage::{Datastore, MemoryStore};
//! use serde_json::json;
//!
//! let store = MemoryStore::new();
//! let row = json!({"country": "NO", "revenue": 12.5});
//! store.insert("demo_data", row.as_object().cloned().unwrap()).unwrap();
//!
//! let catalog = SchemaCatalog::from_records(&[SchemaRecord {
//!     attribute: "revenue".to_string(),
//!     data_type: "float".to_string(),
//! }]);
//!
//! let request = PlanRequest::new("sum").with_field("revenue");
//! let rows = run_plan(&store, "demo_data", &catalog, &request).unwrap();
//! println!("Results: {:?}", rows);
//! ```

pub mod analyst;
pub mod charts;
pub mod config;
pub mod data;
pub mod gateway;
pub mod query;
pub mod storage;

// Re-export commonly used types
pub use analyst::{Analyst, AnalystState, Answer};
pub use charts::{materialize_charts, MaterializeReport};
pub use config::{AppConfig, ProjectCollections};
pub use data::{Document, ResultRow, SchemaCatalog};
pub use query::{run_plan, QueryError};
pub use storage::{Datastore, MemoryStore, StorageError};
