use super::{DataType, Table};
use crate::ast::Value;
use crate::error::DataModelError;
use ahash::AHashMap;
use chrono::DateTime;
use serde_json::Value as JsonValue;

/// The in-flight business object, with each field parsed to the type its table declares.
///
/// A JSON `null` and a missing key are both stored as absent.
#[derive(Debug, Clone, PartialEq)]
pub struct Payload {
    pub table_name: String,
    pub fields: AHashMap<String, Value>,
    pub raw: JsonValue,
}

impl Payload {
    pub fn from_json(table: &Table, raw: JsonValue) -> Result<Self, DataModelError> {
        let invalid = |message: String| DataModelError::InvalidPayload {
            table: table.name.clone(),
            message,
        };

        let object = raw
            .as_object()
            .ok_or_else(|| invalid("payload must be a JSON object".to_string()))?;

        let mut fields = AHashMap::new();
        for (name, field) in &table.fields {
            let value = match object.get(name) {
                None | Some(JsonValue::Null) if field.nullable => continue,
                None | Some(JsonValue::Null) => {
                    return Err(invalid(format!("field '{}' is required", name)));
                }
                Some(value) => value,
            };

            let parsed = match (field.data_type, value) {
                (DataType::Bool, JsonValue::Bool(b)) => Value::Bool(*b),
                (DataType::Float, JsonValue::Number(n)) => n.as_f64().map(Value::Float).ok_or_else(|| {
                    invalid(format!("field '{}' is not a representable number", name))
                })?,
                (DataType::Int, JsonValue::Number(n)) if n.is_i64() || n.is_u64() => {
                    n.as_f64().map(Value::Float).ok_or_else(|| {
                        invalid(format!("field '{}' is not a representable number", name))
                    })?
                }
                (DataType::String, JsonValue::String(s)) => Value::String(s.clone()),
                (DataType::Timestamp, JsonValue::String(s)) => {
                    DateTime::parse_from_rfc3339(s).map_err(|e| {
                        invalid(format!("field '{}' is not an RFC 3339 timestamp: {}", name, e))
                    })?;
                    Value::String(s.clone())
                }
                (data_type, other) => {
                    return Err(invalid(format!(
                        "field '{}' expects {:?}, got {}",
                        name, data_type, other
                    )));
                }
            };
            fields.insert(name.clone(), parsed);
        }

        Ok(Self {
            table_name: table.name.clone(),
            fields,
            raw,
        })
    }

    pub fn get(&self, field_name: &str) -> Option<&Value> {
        self.fields.get(field_name)
    }

    /// The `object_id` of the payload, when present and a string.
    pub fn object_id(&self) -> Option<&str> {
        self.get("object_id").and_then(Value::as_str)
    }
}
