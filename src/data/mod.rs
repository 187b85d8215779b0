pub mod catalog;
pub mod value;

pub use catalog::{DeclaredType, FieldDescriptor, SchemaCatalog, SchemaRecord};
pub use value::{
    as_number, coerce_numeric, compare_values, format_number, get_path, is_present, number,
    round_to, set_path, values_equal, Coercion, Document, ResultRow,
};
