use crate::accessor::DataAccessor;
use crate::ast::{EvaluationTrace, Expression, FieldType, Operand, Value, ValueType};
use crate::error::EvaluationError;

// This macro generates a match arm for a binary float operation.
macro_rules! eval_op {
    ($self:ident, $l:ident, $r:ident, $op_str:expr, $op_fn:expr, float) => {
        $self.eval_arithmetic($l, $r, $op_str, $op_fn)
    };
    ($self:ident, $l:ident, $r:ident, $op_str:expr, $op_fn:expr, bool) => {
        $self.eval_comparison($l, $r, $op_str, $op_fn)
    };
}

/// The core recursive engine for evaluating one expression against one accessor.
pub(super) struct AstEngine<'a> {
    accessor: &'a dyn DataAccessor,
}

impl<'a> AstEngine<'a> {
    pub(super) fn new(accessor: &'a dyn DataAccessor) -> Self {
        Self { accessor }
    }

    pub(super) fn evaluate(&self, expression: &Expression) -> Result<EvaluationTrace, EvaluationError> {
        self.evaluate_recursive(expression)
    }

    fn evaluate_recursive(&self, expr: &Expression) -> Result<EvaluationTrace, EvaluationError> {
        match expr {
            // --- Constants ---
            Expression::True => Ok(Self::literal(Value::Bool(true))),
            Expression::False => Ok(Self::literal(Value::Bool(false))),
            Expression::StringValue(s) => Ok(Self::literal(Value::String(s.clone()))),
            Expression::FloatValue(n) => Ok(Self::literal(Value::Float(*n))),
            Expression::StringListValue(items) => Ok(Self::literal(Value::StringList(items.clone()))),

            // --- Field reads ---
            Expression::PayloadField {
                field_type,
                field_name,
            } => {
                let value = self
                    .accessor
                    .payload_field(field_name)
                    .ok_or_else(|| EvaluationError::RequiredFieldMissing(field_name.clone()))?;
                Self::check_field_type(expr, *field_type, &value)?;
                Ok(EvaluationTrace::Leaf {
                    source: format!("${}", field_name),
                    value,
                })
            }
            Expression::DbField {
                field_type,
                path,
                field_name,
            } => {
                self.accessor
                    .validate_db_field_read(path, field_name, *field_type)?;
                let qualified_name = format!("{}.{}", path.join("."), field_name);
                let value = self
                    .accessor
                    .db_field(path, field_name)?
                    .ok_or_else(|| EvaluationError::RequiredFieldMissing(qualified_name.clone()))?;
                Self::check_field_type(expr, *field_type, &value)?;
                Ok(EvaluationTrace::Leaf {
                    source: format!("${}", qualified_name),
                    value,
                })
            }

            // --- Equality ---
            Expression::EqualBool(l, r) => self.eval_equality(l, r, ValueType::Bool),
            Expression::EqualString(l, r) => self.eval_equality(l, r, ValueType::String),
            Expression::EqualFloat(l, r) => self.eval_equality(l, r, ValueType::Float),

            // --- Comparison Operations ---
            Expression::GreaterFloat(l, r) => eval_op!(self, l, r, ">", |a, b| a > b, bool),
            Expression::GreaterOrEqualFloat(l, r) => eval_op!(self, l, r, ">=", |a, b| a >= b, bool),
            Expression::LesserFloat(l, r) => eval_op!(self, l, r, "<", |a, b| a < b, bool),
            Expression::LesserOrEqualFloat(l, r) => eval_op!(self, l, r, "<=", |a, b| a <= b, bool),

            // --- Arithmetic Operations ---
            Expression::AddFloat(l, r) => eval_op!(self, l, r, "+", |a, b| a + b, float),
            Expression::SubtractFloat(l, r) => eval_op!(self, l, r, "-", |a, b| a - b, float),
            Expression::ProductFloat(l, r) => eval_op!(self, l, r, "*", |a, b| a * b, float),
            Expression::DivideFloat(l, r) => {
                let left_trace = self.evaluate_recursive(Self::operand(l, "DIVIDE_FLOAT")?)?;
                let right_trace = self.evaluate_recursive(Self::operand(r, "DIVIDE_FLOAT")?)?;
                let numerator = Self::expect_float(&left_trace, "/")?;
                let denominator = Self::expect_float(&right_trace, "/")?;
                if denominator == 0.0 {
                    return Err(EvaluationError::DivisionByZero("DIVIDE_FLOAT".to_string()));
                }
                Ok(EvaluationTrace::BinaryOp {
                    op_symbol: "/",
                    left: Box::new(left_trace),
                    right: Box::new(right_trace),
                    outcome: Value::Float(numerator / denominator),
                })
            }

            // --- Logical Operations ---
            Expression::And(operands) => self.eval_variadic(operands, "AND", false),
            Expression::Or(operands) => self.eval_variadic(operands, "OR", true),
            Expression::Not(v) => {
                let child_trace = self.evaluate_recursive(Self::operand(v, "NOT")?)?;
                let outcome = Value::Bool(!Self::expect_bool(&child_trace, "NOT")?);
                Ok(EvaluationTrace::UnaryOp {
                    op_symbol: "NOT",
                    child: Box::new(child_trace),
                    outcome,
                })
            }

            // --- Lists ---
            Expression::StringIsInList(l, r) => {
                let left_trace = self.evaluate_recursive(Self::operand(l, "STRING_IS_IN_LIST")?)?;
                let right_trace = self.evaluate_recursive(Self::operand(r, "STRING_IS_IN_LIST")?)?;
                let needle = match left_trace.outcome() {
                    Some(Value::String(s)) => s,
                    other => return Err(Self::type_mismatch("IN", ValueType::String, other)),
                };
                let outcome = match right_trace.outcome() {
                    Some(Value::StringList(items)) => Value::Bool(items.iter().any(|item| item == needle)),
                    other => return Err(Self::type_mismatch("IN", ValueType::StringList, other)),
                };
                Ok(EvaluationTrace::BinaryOp {
                    op_symbol: "IN",
                    left: Box::new(left_trace),
                    right: Box::new(right_trace),
                    outcome,
                })
            }
        }
    }

    /// `AND` stops at the first `false`, `OR` at the first `true`; the skipped operands
    /// are recorded as not evaluated.
    fn eval_variadic(
        &self,
        operands: &[Option<Expression>],
        op: &'static str,
        short_circuit_on: bool,
    ) -> Result<EvaluationTrace, EvaluationError> {
        if operands.is_empty() {
            return Err(EvaluationError::MalformedExpression(format!(
                "{}: requires at least one operand",
                op
            )));
        }

        let mut traces = Vec::with_capacity(operands.len());
        let mut outcome = !short_circuit_on;
        for slot in operands {
            if outcome == short_circuit_on {
                traces.push(EvaluationTrace::NotEvaluated);
                continue;
            }
            let operand = slot
                .as_ref()
                .ok_or_else(|| EvaluationError::MalformedExpression(format!("{}: operand is null", op)))?;
            let trace = self.evaluate_recursive(operand)?;
            outcome = Self::expect_bool(&trace, op)?;
            traces.push(trace);
        }

        Ok(EvaluationTrace::Variadic {
            op_symbol: op,
            operands: traces,
            outcome: Value::Bool(outcome),
        })
    }

    /// Type-specific equality with no coercion across types. Floats compare with IEEE `==`.
    fn eval_equality(&self, l: &Operand, r: &Operand, operand_type: ValueType) -> Result<EvaluationTrace, EvaluationError> {
        let left_trace = self.evaluate_recursive(Self::operand(l, "==")?)?;
        let right_trace = self.evaluate_recursive(Self::operand(r, "==")?)?;
        let outcome = match (operand_type, left_trace.outcome(), right_trace.outcome()) {
            (ValueType::Bool, Some(Value::Bool(lv)), Some(Value::Bool(rv))) => lv == rv,
            (ValueType::String, Some(Value::String(lv)), Some(Value::String(rv))) => lv == rv,
            (ValueType::Float, Some(Value::Float(lv)), Some(Value::Float(rv))) => lv == rv,
            (expected, Some(lv), _) if lv.value_type() != expected => {
                return Err(Self::type_mismatch("==", expected, Some(lv)));
            }
            (expected, _, rv) => return Err(Self::type_mismatch("==", expected, rv)),
        };
        Ok(EvaluationTrace::BinaryOp {
            op_symbol: "==",
            left: Box::new(left_trace),
            right: Box::new(right_trace),
            outcome: Value::Bool(outcome),
        })
    }

    fn eval_arithmetic<F>(
        &self,
        l: &Operand,
        r: &Operand,
        op: &'static str,
        f: F,
    ) -> Result<EvaluationTrace, EvaluationError>
    where
        F: Fn(f64, f64) -> f64,
    {
        let left_trace = self.evaluate_recursive(Self::operand(l, op)?)?;
        let right_trace = self.evaluate_recursive(Self::operand(r, op)?)?;
        let outcome = Value::Float(f(
            Self::expect_float(&left_trace, op)?,
            Self::expect_float(&right_trace, op)?,
        ));
        Ok(EvaluationTrace::BinaryOp {
            op_symbol: op,
            left: Box::new(left_trace),
            right: Box::new(right_trace),
            outcome,
        })
    }

    fn eval_comparison<F>(
        &self,
        l: &Operand,
        r: &Operand,
        op: &'static str,
        f: F,
    ) -> Result<EvaluationTrace, EvaluationError>
    where
        F: Fn(f64, f64) -> bool,
    {
        let left_trace = self.evaluate_recursive(Self::operand(l, op)?)?;
        let right_trace = self.evaluate_recursive(Self::operand(r, op)?)?;
        let outcome = Value::Bool(f(
            Self::expect_float(&left_trace, op)?,
            Self::expect_float(&right_trace, op)?,
        ));
        Ok(EvaluationTrace::BinaryOp {
            op_symbol: op,
            left: Box::new(left_trace),
            right: Box::new(right_trace),
            outcome,
        })
    }

    fn literal(value: Value) -> EvaluationTrace {
        EvaluationTrace::Leaf {
            source: value.to_string(),
            value,
        }
    }

    fn operand<'e>(slot: &'e Operand, op: &str) -> Result<&'e Expression, EvaluationError> {
        slot.as_deref()
            .ok_or_else(|| EvaluationError::MalformedExpression(format!("{}: operand is null", op)))
    }

    fn check_field_type(expr: &Expression, field_type: FieldType, value: &Value) -> Result<(), EvaluationError> {
        let expected = ValueType::from(field_type);
        if value.value_type() == expected {
            Ok(())
        } else {
            Err(Self::type_mismatch(expr.discriminator(), expected, Some(value)))
        }
    }

    fn expect_bool(trace: &EvaluationTrace, op: &str) -> Result<bool, EvaluationError> {
        match trace.outcome() {
            Some(Value::Bool(b)) => Ok(*b),
            other => Err(Self::type_mismatch(op, ValueType::Bool, other)),
        }
    }

    fn expect_float(trace: &EvaluationTrace, op: &str) -> Result<f64, EvaluationError> {
        match trace.outcome() {
            Some(Value::Float(n)) => Ok(*n),
            other => Err(Self::type_mismatch(op, ValueType::Float, other)),
        }
    }

    fn type_mismatch(op: &str, expected: ValueType, found: Option<&Value>) -> EvaluationError {
        match found {
            Some(found) => EvaluationError::TypeMismatch {
                operation: op.to_string(),
                expected: expected.to_string(),
                found: found.clone(),
            },
            None => EvaluationError::MalformedExpression(format!("{}: operand was not evaluated", op)),
        }
    }
}
