use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::storage::{Datastore, StorageError};

/// Declared type of a field, as recorded in the schema metadata collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeclaredType {
    String,
    Integer,
    Float,
    Boolean,
    Datetime,
    Date,
    Array,
    Object,
    Null,
    Unknown,
}

impl DeclaredType {
    /// Map a free-form metadata type name onto a declared type.
    ///
    /// `number` and `numeric` are accepted as float aliases, `text` and
    /// `category` as string aliases. Storage-level names such as `int` or
    /// `double` are not numeric declarations and map to `Unknown`.
    pub fn parse(raw: &str) -> Self {
        let lower = raw.trim().to_lowercase();
        match lower.as_str() {
            "string" | "str" | "text" | "category" => DeclaredType::String,
            "integer" => DeclaredType::Integer,
            "float" | "number" | "numeric" => DeclaredType::Float,
            "boolean" | "bool" => DeclaredType::Boolean,
            "date" => DeclaredType::Date,
            "datetime" | "timestamp" | "time" => DeclaredType::Datetime,
            "array" | "list" => DeclaredType::Array,
            "object" | "dict" => DeclaredType::Object,
            "null" | "none" => DeclaredType::Null,
            other if other.contains("date") || other.contains("time") => DeclaredType::Datetime,
            _ => DeclaredType::Unknown,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, DeclaredType::Integer | DeclaredType::Float)
    }

    pub fn is_categorical(&self) -> bool {
        matches!(self, DeclaredType::String)
    }

    pub fn is_temporal(&self) -> bool {
        matches!(self, DeclaredType::Date | DeclaredType::Datetime)
    }
}

impl std::fmt::Display for DeclaredType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DeclaredType::String => "string",
            DeclaredType::Integer => "integer",
            DeclaredType::Float => "float",
            DeclaredType::Boolean => "boolean",
            DeclaredType::Datetime => "datetime",
            DeclaredType::Date => "date",
            DeclaredType::Array => "array",
            DeclaredType::Object => "object",
            DeclaredType::Null => "null",
            DeclaredType::Unknown => "unknown",
        };
        write!(f, "{}", name)
    }
}

/// One record of the schema metadata collection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaRecord {
    pub attribute: String,
    pub data_type: String,
}

/// A field name with its declared type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: String,
    pub declared_type: DeclaredType,
    /// Type name exactly as it appeared in the metadata
    pub raw_type: String,
}

/// Read-only snapshot of field name -> declared type for one dataset.
///
/// Loaded once per analysis session and replaced wholesale on the next load.
#[derive(Debug, Clone, Default)]
pub struct SchemaCatalog {
    fields: Vec<FieldDescriptor>,
    index: HashMap<String, usize>,
}

impl SchemaCatalog {
    pub fn new(fields: Vec<FieldDescriptor>) -> Self {
        let mut catalog = Self::default();
        for field in fields {
            // Later records win, keeping the first position
            match catalog.index.get(&field.name) {
                Some(&idx) => catalog.fields[idx] = field,
                None => {
                    catalog.index.insert(field.name.clone(), catalog.fields.len());
                    catalog.fields.push(field);
                }
            }
        }
        catalog
    }

    pub fn from_records(records: &[SchemaRecord]) -> Self {
        Self::new(
            records
                .iter()
                .map(|r| FieldDescriptor {
                    name: r.attribute.clone(),
                    declared_type: DeclaredType::parse(&r.data_type),
                    raw_type: r.data_type.clone(),
                })
                .collect(),
        )
    }

    /// Load the catalog from a metadata collection of `{attribute, data_type}` records.
    ///
    /// Records missing either key are skipped with a warning.
    pub fn load(store: &dyn Datastore, collection: &str) -> Result<Self, StorageError> {
        let documents = store.find(collection)?;
        let mut records = Vec::with_capacity(documents.len());

        for doc in documents {
            match serde_json::from_value::<SchemaRecord>(serde_json::Value::Object(doc)) {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!(collection, "Skipping malformed schema record: {}", e),
            }
        }

        let catalog = Self::from_records(&records);
        tracing::info!(
            collection,
            fields = catalog.len(),
            "Loaded schema catalog"
        );
        Ok(catalog)
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.index.get(name).map(|&idx| &self.fields[idx])
    }

    pub fn declared_type(&self, name: &str) -> Option<DeclaredType> {
        self.field(name).map(|f| f.declared_type)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Field names in metadata order
    pub fn field_names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.clone()).collect()
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn numeric_fields(&self) -> Vec<String> {
        self.names_where(|t| t.is_numeric())
    }

    pub fn categorical_fields(&self) -> Vec<String> {
        self.names_where(|t| t.is_categorical())
    }

    pub fn date_fields(&self) -> Vec<String> {
        self.names_where(|t| t.is_temporal())
    }

    /// Fields whose name contains `needle`, case-insensitively
    pub fn similar_fields(&self, needle: &str) -> Vec<String> {
        let needle = needle.to_lowercase();
        self.fields
            .iter()
            .filter(|f| f.name.to_lowercase().contains(&needle))
            .map(|f| f.name.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    fn names_where(&self, pred: impl Fn(&DeclaredType) -> bool) -> Vec<String> {
        self.fields
            .iter()
            .filter(|f| pred(&f.declared_type))
            .map(|f| f.name.clone())
            .collect()
    }
}
