use super::{Value, ValueType};
use crate::error::EvaluationError;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A fixed operand slot. `None` is an explicitly absent child: it survives serialization
/// but makes the owning node invalid.
pub type Operand = Option<Box<Expression>>;

/// Wraps an expression into a present operand slot.
pub fn operand(expr: Expression) -> Operand {
    Some(Box::new(expr))
}

/// The declared type of a field read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Bool,
    Float,
    String,
}

impl From<FieldType> for ValueType {
    fn from(value: FieldType) -> Self {
        match value {
            FieldType::Bool => ValueType::Bool,
            FieldType::Float => ValueType::Float,
            FieldType::String => ValueType::String,
        }
    }
}

/// The typed operator tree of a rule formula or trigger condition.
///
/// Every node has a single static output type (see [`Expression::return_type`]) and
/// exclusively owns its children.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    // Constants
    True,
    False,
    StringValue(String),
    FloatValue(f64),
    StringListValue(Vec<String>),

    // Field reads
    PayloadField {
        field_type: FieldType,
        field_name: String,
    },
    DbField {
        field_type: FieldType,
        path: Vec<String>,
        field_name: String,
    },

    // Comparison
    EqualBool(Operand, Operand),
    EqualString(Operand, Operand),
    EqualFloat(Operand, Operand),
    GreaterFloat(Operand, Operand),
    GreaterOrEqualFloat(Operand, Operand),
    LesserFloat(Operand, Operand),
    LesserOrEqualFloat(Operand, Operand),

    // Logical
    And(Vec<Option<Expression>>),
    Or(Vec<Option<Expression>>),
    Not(Operand),

    // Lists
    StringIsInList(Operand, Operand),

    // Arithmetic
    AddFloat(Operand, Operand),
    SubtractFloat(Operand, Operand),
    ProductFloat(Operand, Operand),
    DivideFloat(Operand, Operand),
}

/// A field read found while walking a tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldRead<'a> {
    Payload {
        field_type: FieldType,
        field_name: &'a str,
    },
    Db {
        field_type: FieldType,
        path: &'a [String],
        field_name: &'a str,
    },
}

impl Expression {
    pub fn payload_field(field_type: FieldType, field_name: &str) -> Self {
        Expression::PayloadField {
            field_type,
            field_name: field_name.to_string(),
        }
    }

    pub fn db_field(field_type: FieldType, path: &[&str], field_name: &str) -> Self {
        Expression::DbField {
            field_type,
            path: path.iter().map(|link| link.to_string()).collect(),
            field_name: field_name.to_string(),
        }
    }

    pub fn and(operands: Vec<Expression>) -> Self {
        Expression::And(operands.into_iter().map(Some).collect())
    }

    pub fn or(operands: Vec<Expression>) -> Self {
        Expression::Or(operands.into_iter().map(Some).collect())
    }

    pub fn not(child: Expression) -> Self {
        Expression::Not(operand(child))
    }

    /// The discriminator used as `type` in the serialized record.
    pub fn discriminator(&self) -> &'static str {
        match self {
            Expression::True => "TRUE",
            Expression::False => "FALSE",
            Expression::StringValue(_) => "STRING_VALUE",
            Expression::FloatValue(_) => "FLOAT_VALUE",
            Expression::StringListValue(_) => "STRING_LIST_VALUE",
            Expression::PayloadField { field_type, .. } => match field_type {
                FieldType::Bool => "PAYLOAD_FIELD_BOOL",
                FieldType::Float => "PAYLOAD_FIELD_FLOAT",
                FieldType::String => "PAYLOAD_FIELD_STRING",
            },
            Expression::DbField { field_type, .. } => match field_type {
                FieldType::Bool => "DB_FIELD_BOOL",
                FieldType::Float => "DB_FIELD_FLOAT",
                FieldType::String => "DB_FIELD_STRING",
            },
            Expression::EqualBool(..) => "EQUAL_BOOL",
            Expression::EqualString(..) => "EQUAL_STRING",
            Expression::EqualFloat(..) => "EQUAL_FLOAT",
            Expression::GreaterFloat(..) => "GREATER_FLOAT",
            Expression::GreaterOrEqualFloat(..) => "GREATER_OR_EQUAL_FLOAT",
            Expression::LesserFloat(..) => "LESSER_FLOAT",
            Expression::LesserOrEqualFloat(..) => "LESSER_OR_EQUAL_FLOAT",
            Expression::And(_) => "AND",
            Expression::Or(_) => "OR",
            Expression::Not(_) => "NOT",
            Expression::StringIsInList(..) => "STRING_IS_IN_LIST",
            Expression::AddFloat(..) => "ADD_FLOAT",
            Expression::SubtractFloat(..) => "SUBTRACT_FLOAT",
            Expression::ProductFloat(..) => "PRODUCT_FLOAT",
            Expression::DivideFloat(..) => "DIVIDE_FLOAT",
        }
    }

    /// The static output type of this node.
    pub fn return_type(&self) -> ValueType {
        match self {
            Expression::True
            | Expression::False
            | Expression::EqualBool(..)
            | Expression::EqualString(..)
            | Expression::EqualFloat(..)
            | Expression::GreaterFloat(..)
            | Expression::GreaterOrEqualFloat(..)
            | Expression::LesserFloat(..)
            | Expression::LesserOrEqualFloat(..)
            | Expression::And(_)
            | Expression::Or(_)
            | Expression::Not(_)
            | Expression::StringIsInList(..) => ValueType::Bool,
            Expression::StringValue(_) => ValueType::String,
            Expression::FloatValue(_)
            | Expression::AddFloat(..)
            | Expression::SubtractFloat(..)
            | Expression::ProductFloat(..)
            | Expression::DivideFloat(..) => ValueType::Float,
            Expression::StringListValue(_) => ValueType::StringList,
            Expression::PayloadField { field_type, .. } | Expression::DbField { field_type, .. } => {
                (*field_type).into()
            }
        }
    }

    /// The operand slots of this node in serialization order. Leaves have none.
    pub fn operands(&self) -> Vec<Option<&Expression>> {
        match self {
            Expression::True
            | Expression::False
            | Expression::StringValue(_)
            | Expression::FloatValue(_)
            | Expression::StringListValue(_)
            | Expression::PayloadField { .. }
            | Expression::DbField { .. } => Vec::new(),
            Expression::EqualBool(l, r)
            | Expression::EqualString(l, r)
            | Expression::EqualFloat(l, r)
            | Expression::GreaterFloat(l, r)
            | Expression::GreaterOrEqualFloat(l, r)
            | Expression::LesserFloat(l, r)
            | Expression::LesserOrEqualFloat(l, r)
            | Expression::StringIsInList(l, r)
            | Expression::AddFloat(l, r)
            | Expression::SubtractFloat(l, r)
            | Expression::ProductFloat(l, r)
            | Expression::DivideFloat(l, r) => vec![l.as_deref(), r.as_deref()],
            Expression::Not(v) => vec![v.as_deref()],
            Expression::And(ops) | Expression::Or(ops) => ops.iter().map(Option::as_ref).collect(),
        }
    }

    /// The type each operand slot must produce.
    pub fn expected_operand_type(&self, index: usize) -> ValueType {
        match self {
            Expression::EqualString(..) => ValueType::String,
            Expression::StringIsInList(..) if index == 0 => ValueType::String,
            Expression::StringIsInList(..) => ValueType::StringList,
            Expression::EqualFloat(..)
            | Expression::GreaterFloat(..)
            | Expression::GreaterOrEqualFloat(..)
            | Expression::LesserFloat(..)
            | Expression::LesserOrEqualFloat(..)
            | Expression::AddFloat(..)
            | Expression::SubtractFloat(..)
            | Expression::ProductFloat(..)
            | Expression::DivideFloat(..) => ValueType::Float,
            _ => ValueType::Bool,
        }
    }

    /// Checks the tree shape: no absent operand, no empty variadic operator, and every
    /// operand producing the type its parent expects.
    pub fn validate(&self) -> Result<(), EvaluationError> {
        let malformed = |message: String| {
            EvaluationError::MalformedExpression(format!("{}: {}", self.discriminator(), message))
        };

        match self {
            Expression::And(ops) | Expression::Or(ops) if ops.is_empty() => {
                return Err(malformed("requires at least one operand".to_string()));
            }
            Expression::PayloadField { field_name, .. } | Expression::DbField { field_name, .. }
                if field_name.is_empty() =>
            {
                return Err(malformed("field name is empty".to_string()));
            }
            _ => {}
        }

        for (index, slot) in self.operands().into_iter().enumerate() {
            let child = slot.ok_or_else(|| malformed(format!("operand {} is null", index)))?;
            let expected = self.expected_operand_type(index);
            if child.return_type() != expected {
                return Err(malformed(format!(
                    "operand {} ({}) returns {}, expected {}",
                    index,
                    child.discriminator(),
                    child.return_type(),
                    expected
                )));
            }
            child.validate()?;
        }
        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// Collects every field read of the tree, in depth-first order.
    pub fn collect_field_reads<'a>(&'a self, reads: &mut Vec<FieldRead<'a>>) {
        match self {
            Expression::PayloadField {
                field_type,
                field_name,
            } => reads.push(FieldRead::Payload {
                field_type: *field_type,
                field_name,
            }),
            Expression::DbField {
                field_type,
                path,
                field_name,
            } => reads.push(FieldRead::Db {
                field_type: *field_type,
                path,
                field_name,
            }),
            _ => {
                for child in self.operands().into_iter().flatten() {
                    child.collect_field_reads(reads);
                }
            }
        }
    }

    /// A one-line label for tree displays.
    fn label(&self) -> String {
        match self {
            Expression::StringValue(s) => format!("{} {}", self.discriminator(), Value::from(s.as_str())),
            Expression::FloatValue(n) => format!("{} {}", self.discriminator(), Value::Float(*n)),
            Expression::StringListValue(items) => {
                format!("{} {}", self.discriminator(), Value::StringList(items.clone()))
            }
            Expression::PayloadField { field_name, .. } => {
                format!("{} ${}", self.discriminator(), field_name)
            }
            Expression::DbField {
                path, field_name, ..
            } => format!("{} ${}.{}", self.discriminator(), path.join("."), field_name),
            _ => self.discriminator().to_string(),
        }
    }

    fn fmt_as_tree(
        expr: Option<&Expression>,
        f: &mut fmt::Formatter<'_>,
        prefix: &str,
        is_last: bool,
        is_root: bool,
    ) -> fmt::Result {
        let child_prefix = if is_root {
            String::new()
        } else {
            write!(f, "{}{}", prefix, if is_last { "└── " } else { "├── " })?;
            format!("{}{}", prefix, if is_last { "    " } else { "│   " })
        };

        let Some(expr) = expr else {
            return writeln!(f, "<null>");
        };
        writeln!(f, "{}", expr.label())?;

        let operands = expr.operands();
        let count = operands.len();
        for (index, child) in operands.into_iter().enumerate() {
            Self::fmt_as_tree(child, f, &child_prefix, index + 1 == count, false)?;
        }
        Ok(())
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Self::fmt_as_tree(Some(self), f, "", true, true)
    }
}

impl fmt::Display for FieldRead<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldRead::Payload { field_name, .. } => write!(f, "${}", field_name),
            FieldRead::Db {
                path, field_name, ..
            } => write!(f, "${}.{}", path.iter().join("."), field_name),
        }
    }
}
