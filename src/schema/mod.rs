pub mod arrow;
pub mod descriptions;

pub use arrow::{build_arrow_schema, with_descriptions, ColumnType, DESCRIPTION_KEY};
pub use descriptions::{FieldDescriptions, SchemaCache};
