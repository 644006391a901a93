use super::{Expression, FieldType};
use crate::error::SerializationError;
use ahash::AHashMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value as JsonValue};
use std::sync::LazyLock;

/// The wire form of an operator node: `{type, staticData?, children?}`.
///
/// Absent keys are omitted. An absent operand inside an existing `children` array is
/// written as `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatorRecord {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "staticData", default, skip_serializing_if = "Option::is_none")]
    pub static_data: Option<Map<String, JsonValue>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<Option<OperatorRecord>>>,
}

/// Defines the contract for turning one `type` discriminator back into an `Expression`.
pub trait OperatorParser: Send + Sync {
    fn operator_type(&self) -> &'static str;
    fn parse(
        &self,
        static_data: Option<&Map<String, JsonValue>>,
        children: Option<Vec<Option<Expression>>>,
    ) -> Result<Expression, SerializationError>;
}

fn malformed(operator: &str, message: impl Into<String>) -> SerializationError {
    SerializationError::MalformedExpression {
        operator: operator.to_string(),
        message: message.into(),
    }
}

/// Helper to check for the correct number of operand slots.
fn require_children(
    children: Option<Vec<Option<Expression>>>,
    count: usize,
    operator: &str,
) -> Result<Vec<Option<Expression>>, SerializationError> {
    match children {
        Some(children) if children.len() == count => Ok(children),
        Some(children) => Err(malformed(
            operator,
            format!("requires {} children, but received {}", count, children.len()),
        )),
        None => Err(malformed(operator, format!("requires {} children, but none were given", count))),
    }
}

fn require_leaf(
    children: &Option<Vec<Option<Expression>>>,
    operator: &str,
) -> Result<(), SerializationError> {
    match children {
        Some(children) if !children.is_empty() => Err(malformed(operator, "takes no children")),
        _ => Ok(()),
    }
}

fn static_value<'a>(
    static_data: Option<&'a Map<String, JsonValue>>,
    key: &str,
    operator: &str,
) -> Result<&'a JsonValue, SerializationError> {
    static_data
        .and_then(|data| data.get(key))
        .ok_or_else(|| malformed(operator, format!("staticData.{} is missing", key)))
}

fn static_string(
    static_data: Option<&Map<String, JsonValue>>,
    key: &str,
    operator: &str,
) -> Result<String, SerializationError> {
    static_value(static_data, key, operator)?
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| malformed(operator, format!("staticData.{} must be a string", key)))
}

fn static_string_list(
    static_data: Option<&Map<String, JsonValue>>,
    key: &str,
    operator: &str,
) -> Result<Vec<String>, SerializationError> {
    let not_a_list = || malformed(operator, format!("staticData.{} must be a list of strings", key));
    static_value(static_data, key, operator)?
        .as_array()
        .ok_or_else(not_a_list)?
        .iter()
        .map(|item| item.as_str().map(str::to_string).ok_or_else(not_a_list))
        .collect()
}

fn boxed_pair(mut children: Vec<Option<Expression>>) -> (Option<Box<Expression>>, Option<Box<Expression>>) {
    let right = children.pop().flatten().map(Box::new);
    let left = children.pop().flatten().map(Box::new);
    (left, right)
}

/// Defines the structural parsers, their registration, and the registry lookup.
macro_rules! define_operator_parsers {
    (
        nullary: [ $( ($n_struct:ident, $n_type:expr, $n_value:expr) ),* $(,)? ],
        unary: [ $( ($u_struct:ident, $u_type:expr, $u_variant:path) ),* $(,)? ],
        binary: [ $( ($b_struct:ident, $b_type:expr, $b_variant:path) ),* $(,)? ],
        variadic: [ $( ($v_struct:ident, $v_type:expr, $v_variant:path) ),* $(,)? ] $(,)?
    ) => {
        $(
            struct $n_struct;
            impl OperatorParser for $n_struct {
                fn operator_type(&self) -> &'static str { $n_type }
                fn parse(&self, _static_data: Option<&Map<String, JsonValue>>, children: Option<Vec<Option<Expression>>>) -> Result<Expression, SerializationError> {
                    require_leaf(&children, $n_type)?;
                    Ok($n_value)
                }
            }
        )*
        $(
            struct $u_struct;
            impl OperatorParser for $u_struct {
                fn operator_type(&self) -> &'static str { $u_type }
                fn parse(&self, _static_data: Option<&Map<String, JsonValue>>, children: Option<Vec<Option<Expression>>>) -> Result<Expression, SerializationError> {
                    let mut children = require_children(children, 1, $u_type)?;
                    Ok($u_variant(children.pop().flatten().map(Box::new)))
                }
            }
        )*
        $(
            struct $b_struct;
            impl OperatorParser for $b_struct {
                fn operator_type(&self) -> &'static str { $b_type }
                fn parse(&self, _static_data: Option<&Map<String, JsonValue>>, children: Option<Vec<Option<Expression>>>) -> Result<Expression, SerializationError> {
                    let (left, right) = boxed_pair(require_children(children, 2, $b_type)?);
                    Ok($b_variant(left, right))
                }
            }
        )*
        $(
            struct $v_struct;
            impl OperatorParser for $v_struct {
                fn operator_type(&self) -> &'static str { $v_type }
                fn parse(&self, _static_data: Option<&Map<String, JsonValue>>, children: Option<Vec<Option<Expression>>>) -> Result<Expression, SerializationError> {
                    let children = children.ok_or_else(|| malformed($v_type, "children are missing"))?;
                    Ok($v_variant(children))
                }
            }
        )*

        fn register_structural_parsers(registry: &mut AHashMap<&'static str, Box<dyn OperatorParser>>) {
            $( registry.insert($n_type, Box::new($n_struct)); )*
            $( registry.insert($u_type, Box::new($u_struct)); )*
            $( registry.insert($b_type, Box::new($b_struct)); )*
            $( registry.insert($v_type, Box::new($v_struct)); )*
        }
    };
}

define_operator_parsers! {
    nullary: [
        (TrueParser, "TRUE", Expression::True),
        (FalseParser, "FALSE", Expression::False),
    ],
    unary: [
        (NotParser, "NOT", Expression::Not),
    ],
    binary: [
        (EqualBoolParser, "EQUAL_BOOL", Expression::EqualBool),
        (EqualStringParser, "EQUAL_STRING", Expression::EqualString),
        (EqualFloatParser, "EQUAL_FLOAT", Expression::EqualFloat),
        (GreaterFloatParser, "GREATER_FLOAT", Expression::GreaterFloat),
        (GreaterOrEqualFloatParser, "GREATER_OR_EQUAL_FLOAT", Expression::GreaterOrEqualFloat),
        (LesserFloatParser, "LESSER_FLOAT", Expression::LesserFloat),
        (LesserOrEqualFloatParser, "LESSER_OR_EQUAL_FLOAT", Expression::LesserOrEqualFloat),
        (StringIsInListParser, "STRING_IS_IN_LIST", Expression::StringIsInList),
        (AddFloatParser, "ADD_FLOAT", Expression::AddFloat),
        (SubtractFloatParser, "SUBTRACT_FLOAT", Expression::SubtractFloat),
        (ProductFloatParser, "PRODUCT_FLOAT", Expression::ProductFloat),
        (DivideFloatParser, "DIVIDE_FLOAT", Expression::DivideFloat),
    ],
    variadic: [
        (AndParser, "AND", Expression::And),
        (OrParser, "OR", Expression::Or),
    ],
}

struct StringValueParser;
impl OperatorParser for StringValueParser {
    fn operator_type(&self) -> &'static str {
        "STRING_VALUE"
    }
    fn parse(
        &self,
        static_data: Option<&Map<String, JsonValue>>,
        children: Option<Vec<Option<Expression>>>,
    ) -> Result<Expression, SerializationError> {
        require_leaf(&children, self.operator_type())?;
        static_string(static_data, "value", self.operator_type()).map(Expression::StringValue)
    }
}

/// `FLOAT_VALUE` carries `{"value": <number>}`. Integral literals are written as `1000.0`
/// where some encoders write `1000`; both parse to the same literal. Non-finite literals
/// are written as `null` and do not parse back.
struct FloatValueParser;
impl OperatorParser for FloatValueParser {
    fn operator_type(&self) -> &'static str {
        "FLOAT_VALUE"
    }
    fn parse(
        &self,
        static_data: Option<&Map<String, JsonValue>>,
        children: Option<Vec<Option<Expression>>>,
    ) -> Result<Expression, SerializationError> {
        require_leaf(&children, self.operator_type())?;
        static_value(static_data, "value", self.operator_type())?
            .as_f64()
            .map(Expression::FloatValue)
            .ok_or_else(|| malformed(self.operator_type(), "staticData.value must be a number"))
    }
}

struct StringListValueParser;
impl OperatorParser for StringListValueParser {
    fn operator_type(&self) -> &'static str {
        "STRING_LIST_VALUE"
    }
    fn parse(
        &self,
        static_data: Option<&Map<String, JsonValue>>,
        children: Option<Vec<Option<Expression>>>,
    ) -> Result<Expression, SerializationError> {
        require_leaf(&children, self.operator_type())?;
        static_string_list(static_data, "value", self.operator_type()).map(Expression::StringListValue)
    }
}

struct PayloadFieldParser(FieldType);
impl OperatorParser for PayloadFieldParser {
    fn operator_type(&self) -> &'static str {
        match self.0 {
            FieldType::Bool => "PAYLOAD_FIELD_BOOL",
            FieldType::Float => "PAYLOAD_FIELD_FLOAT",
            FieldType::String => "PAYLOAD_FIELD_STRING",
        }
    }
    fn parse(
        &self,
        static_data: Option<&Map<String, JsonValue>>,
        children: Option<Vec<Option<Expression>>>,
    ) -> Result<Expression, SerializationError> {
        require_leaf(&children, self.operator_type())?;
        Ok(Expression::PayloadField {
            field_type: self.0,
            field_name: static_string(static_data, "fieldName", self.operator_type())?,
        })
    }
}

struct DbFieldParser(FieldType);
impl OperatorParser for DbFieldParser {
    fn operator_type(&self) -> &'static str {
        match self.0 {
            FieldType::Bool => "DB_FIELD_BOOL",
            FieldType::Float => "DB_FIELD_FLOAT",
            FieldType::String => "DB_FIELD_STRING",
        }
    }
    fn parse(
        &self,
        static_data: Option<&Map<String, JsonValue>>,
        children: Option<Vec<Option<Expression>>>,
    ) -> Result<Expression, SerializationError> {
        require_leaf(&children, self.operator_type())?;
        Ok(Expression::DbField {
            field_type: self.0,
            path: static_string_list(static_data, "path", self.operator_type())?,
            field_name: static_string(static_data, "fieldName", self.operator_type())?,
        })
    }
}

static PARSERS: LazyLock<AHashMap<&'static str, Box<dyn OperatorParser>>> = LazyLock::new(|| {
    let mut registry: AHashMap<&'static str, Box<dyn OperatorParser>> = AHashMap::new();
    register_structural_parsers(&mut registry);

    let static_data_parsers: Vec<Box<dyn OperatorParser>> = vec![
        Box::new(StringValueParser),
        Box::new(FloatValueParser),
        Box::new(StringListValueParser),
        Box::new(PayloadFieldParser(FieldType::Bool)),
        Box::new(PayloadFieldParser(FieldType::Float)),
        Box::new(PayloadFieldParser(FieldType::String)),
        Box::new(DbFieldParser(FieldType::Bool)),
        Box::new(DbFieldParser(FieldType::Float)),
        Box::new(DbFieldParser(FieldType::String)),
    ];
    for parser in static_data_parsers {
        registry.insert(parser.operator_type(), parser);
    }
    registry
});

/// Every discriminator the registry can parse.
pub fn known_operator_types() -> Vec<&'static str> {
    let mut types: Vec<&'static str> = PARSERS.keys().copied().collect();
    types.sort_unstable();
    types
}

impl Expression {
    pub fn to_record(&self) -> OperatorRecord {
        let mut static_data = Map::new();
        match self {
            Expression::StringValue(s) => {
                static_data.insert("value".to_string(), JsonValue::from(s.as_str()));
            }
            Expression::FloatValue(n) => {
                static_data.insert("value".to_string(), JsonValue::from(*n));
            }
            Expression::StringListValue(items) => {
                static_data.insert("value".to_string(), JsonValue::from(items.clone()));
            }
            Expression::PayloadField { field_name, .. } => {
                static_data.insert("fieldName".to_string(), JsonValue::from(field_name.as_str()));
            }
            Expression::DbField {
                path, field_name, ..
            } => {
                static_data.insert("path".to_string(), JsonValue::from(path.clone()));
                static_data.insert("fieldName".to_string(), JsonValue::from(field_name.as_str()));
            }
            _ => {}
        }

        let children = match self {
            Expression::True
            | Expression::False
            | Expression::StringValue(_)
            | Expression::FloatValue(_)
            | Expression::StringListValue(_)
            | Expression::PayloadField { .. }
            | Expression::DbField { .. } => None,
            _ => Some(
                self.operands()
                    .into_iter()
                    .map(|slot| slot.map(Expression::to_record))
                    .collect(),
            ),
        };

        OperatorRecord {
            kind: self.discriminator().to_string(),
            static_data: (!static_data.is_empty()).then_some(static_data),
            children,
        }
    }

    pub fn from_record(record: &OperatorRecord) -> Result<Expression, SerializationError> {
        let parser = PARSERS
            .get(record.kind.as_str())
            .ok_or_else(|| SerializationError::UnknownOperatorType(record.kind.clone()))?;

        let children = record
            .children
            .as_ref()
            .map(|children| {
                children
                    .iter()
                    .map(|slot| slot.as_ref().map(Expression::from_record).transpose())
                    .collect::<Result<Vec<_>, _>>()
            })
            .transpose()?;

        parser.parse(record.static_data.as_ref(), children)
    }

    pub fn to_json_string(&self) -> Result<String, SerializationError> {
        serde_json::to_string(&self.to_record()).map_err(|e| SerializationError::Json(e.to_string()))
    }

    pub fn from_json_str(json: &str) -> Result<Expression, SerializationError> {
        let record: OperatorRecord =
            serde_json::from_str(json).map_err(|e| SerializationError::Json(e.to_string()))?;
        Expression::from_record(&record)
    }
}

impl Serialize for Expression {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_record().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Expression {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let record = OperatorRecord::deserialize(deserializer)?;
        Expression::from_record(&record).map_err(serde::de::Error::custom)
    }
}
