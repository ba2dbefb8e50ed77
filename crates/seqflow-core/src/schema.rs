//! Payload schema descriptors.
//!
//! A channel carries records of one payload type. The type is described by a
//! [`PayloadSchema`]: an ontology tag plus an ordered list of typed fields,
//! composed explicitly with [`PayloadSchemaBuilder`] when the channel is
//! registered.
//!
//! ```
//! use seqflow_core::{FieldType, PayloadSchema};
//!
//! let imu = PayloadSchema::builder("imu")
//!     .field("acc_x", FieldType::Float64)
//!     .field("acc_y", FieldType::Float64)
//!     .nullable_field("frame_id", FieldType::Utf8)
//!     .build()
//!     .unwrap();
//! assert_eq!(imu.fields().len(), 3);
//! ```

use crate::error::{Error, Result};
use crate::message::Payload;
use crate::value::FieldType;
use serde::{Deserialize, Serialize};

/// Column names used by the record envelope. Payload fields may not reuse them.
pub const RESERVED_FIELD_NAMES: [&str; 2] = ["timestamp_ns", "recording_timestamp_ns"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaField {
    pub name: String,
    pub field_type: FieldType,
    pub nullable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadSchema {
    tag: String,
    fields: Vec<SchemaField>,
}

impl PayloadSchema {
    pub fn builder(tag: impl Into<String>) -> PayloadSchemaBuilder {
        PayloadSchemaBuilder {
            tag: tag.into(),
            fields: Vec::new(),
        }
    }

    /// Ontology tag identifying the payload type.
    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn fields(&self) -> &[SchemaField] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&SchemaField> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Checks that a payload fits this schema.
    ///
    /// Rejects unknown fields, missing non-nullable fields and values whose
    /// type differs from the declared column type.
    pub fn validate(&self, payload: &Payload) -> Result<()> {
        if let Some(unknown) = payload
            .fields()
            .keys()
            .find(|name| self.field(name).is_none())
        {
            return Err(Error::SchemaMismatch(format!(
                "field '{unknown}' is not declared by schema '{}'",
                self.tag
            )));
        }

        for field in &self.fields {
            match payload.get(&field.name) {
                None if !field.nullable => {
                    return Err(Error::SchemaMismatch(format!(
                        "missing non-nullable field '{}' of schema '{}'",
                        field.name, self.tag
                    )));
                }
                None => {}
                Some(value) => {
                    if value.field_type() != Some(field.field_type) {
                        return Err(Error::SchemaMismatch(format!(
                            "field '{}' expects {}, got {:?}",
                            field.name, field.field_type, value
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

pub struct PayloadSchemaBuilder {
    tag: String,
    fields: Vec<SchemaField>,
}

impl PayloadSchemaBuilder {
    pub fn field(self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.push(name.into(), field_type, false)
    }

    pub fn nullable_field(self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.push(name.into(), field_type, true)
    }

    fn push(mut self, name: String, field_type: FieldType, nullable: bool) -> Self {
        self.fields.push(SchemaField {
            name,
            field_type,
            nullable,
        });
        self
    }

    pub fn build(self) -> Result<PayloadSchema> {
        if self.tag.is_empty() {
            return Err(Error::SchemaMismatch("schema tag is empty".to_string()));
        }
        for (i, field) in self.fields.iter().enumerate() {
            if RESERVED_FIELD_NAMES.contains(&field.name.as_str()) {
                return Err(Error::ReservedField(field.name.clone()));
            }
            if field.name.is_empty() {
                return Err(Error::SchemaMismatch(format!(
                    "field #{i} of schema '{}' has an empty name",
                    self.tag
                )));
            }
            if self.fields[..i].iter().any(|f| f.name == field.name) {
                return Err(Error::SchemaMismatch(format!(
                    "field '{}' declared twice in schema '{}'",
                    field.name, self.tag
                )));
            }
        }
        Ok(PayloadSchema {
            tag: self.tag,
            fields: self.fields,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    fn imu() -> PayloadSchema {
        PayloadSchema::builder("imu")
            .field("acc_x", FieldType::Float64)
            .nullable_field("frame_id", FieldType::Utf8)
            .build()
            .unwrap()
    }

    #[test]
    fn test_reserved_field_rejected() {
        let err = PayloadSchema::builder("bad")
            .field("timestamp_ns", FieldType::Int64)
            .build()
            .unwrap_err();
        assert_eq!(err, Error::ReservedField("timestamp_ns".to_string()));
    }

    #[test]
    fn test_duplicate_field_rejected() {
        let err = PayloadSchema::builder("dup")
            .field("x", FieldType::Int64)
            .field("x", FieldType::Float64)
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::SchemaMismatch(_)));
    }

    #[test]
    fn test_validate_payload() {
        let schema = imu();
        assert!(schema.validate(&Payload::new().with("acc_x", 9.81)).is_ok());

        let missing = Payload::new().with("frame_id", "base");
        assert!(schema.validate(&missing).is_err());

        let wrong_type = Payload::new().with("acc_x", "fast");
        assert!(schema.validate(&wrong_type).is_err());

        let unknown = Payload::new().with("acc_x", 1.0).with("acc_z", 2.0);
        assert!(schema.validate(&unknown).is_err());

        let null_optional = Payload::new().with("acc_x", 1.0).with("frame_id", Value::Null);
        assert!(schema.validate(&null_optional).is_ok());
    }
}
