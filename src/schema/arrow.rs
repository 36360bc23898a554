// src/schema/arrow.rs

use arrow::datatypes::{DataType, Field as ArrowField, Schema as ArrowSchema, SchemaRef};
use std::{collections::HashMap, sync::Arc};

use super::descriptions::FieldDescriptions;

/// Field-metadata key carrying the column's documentation text.
pub const DESCRIPTION_KEY: &str = "description";

/// Physical type chosen for one column of one year's file.
///
/// - Int64   : every non-empty value parses as an integer
/// - Float64 : every non-empty value parses as a float
/// - Utf8    : anything else, and all-empty columns
/// - Date32  : the injected reporting date only
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Int64,
    Float64,
    Utf8,
    Date32,
}

impl ColumnType {
    pub fn to_arrow(self) -> DataType {
        match self {
            ColumnType::Int64 => DataType::Int64,
            ColumnType::Float64 => DataType::Float64,
            ColumnType::Utf8 => DataType::Utf8,
            ColumnType::Date32 => DataType::Date32,
        }
    }
}

/// Build an ArrowSchema (inside an Arc) from ordered `(name, type)` pairs.
pub fn build_arrow_schema(cols: &[(String, ColumnType)]) -> SchemaRef {
    let fields: Vec<ArrowField> = cols
        .iter()
        .map(|(name, ty)| ArrowField::new(name, ty.to_arrow(), /* nullable = */ true))
        .collect();

    Arc::new(ArrowSchema::new(fields))
}

/// Copy of `schema` where every documented field carries its description as metadata.
/// Undocumented fields are left untouched.
pub fn with_descriptions(schema: &ArrowSchema, descriptions: &FieldDescriptions) -> SchemaRef {
    let fields: Vec<ArrowField> = schema
        .fields()
        .iter()
        .map(|f| match descriptions.get(f.name()) {
            Some(desc) => {
                let mut md = f.metadata().clone();
                md.insert(DESCRIPTION_KEY.to_string(), desc.to_string());
                f.as_ref().clone().with_metadata(md)
            }
            None => f.as_ref().clone(),
        })
        .collect();

    Arc::new(ArrowSchema::new_with_metadata(fields, schema.metadata().clone()))
}

/// Read descriptions back out of a schema, keyed by field name.
pub fn descriptions_of(schema: &ArrowSchema) -> HashMap<String, String> {
    schema
        .fields()
        .iter()
        .filter_map(|f| {
            f.metadata()
                .get(DESCRIPTION_KEY)
                .map(|d| (f.name().clone(), d.clone()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn only_documented_fields_get_metadata() {
        let schema = build_arrow_schema(&[
            ("CERT".into(), ColumnType::Int64),
            ("REPORTING_PERIOD".into(), ColumnType::Date32),
            ("ODDITY".into(), ColumnType::Utf8),
        ]);
        let desc = FieldDescriptions::from_map(BTreeMap::from([
            ("CERT".to_string(), "Certificate".to_string()),
            ("ODDITY".to_string(), String::new()),
        ]));

        let out = with_descriptions(&schema, &desc);
        assert_eq!(out.field(0).data_type(), &DataType::Int64);
        assert_eq!(out.field(1).data_type(), &DataType::Date32);

        let found = descriptions_of(&out);
        assert_eq!(found.len(), 1);
        assert_eq!(found["CERT"], "Certificate");
    }
}
