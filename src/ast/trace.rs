use super::Value;

/// A record of how an expression was evaluated, including intermediate values.
#[derive(Debug, Clone, PartialEq)]
pub enum EvaluationTrace {
    /// `AND` / `OR` over any number of operands. Operands skipped by short-circuiting
    /// are recorded as `NotEvaluated`.
    Variadic {
        op_symbol: &'static str,
        operands: Vec<EvaluationTrace>,
        outcome: Value,
    },
    BinaryOp {
        op_symbol: &'static str,
        left: Box<EvaluationTrace>,
        right: Box<EvaluationTrace>,
        outcome: Value,
    },
    UnaryOp {
        op_symbol: &'static str,
        child: Box<EvaluationTrace>,
        outcome: Value,
    },
    Leaf {
        source: String,
        value: Value,
    },
    NotEvaluated,
}

impl EvaluationTrace {
    /// The value this node produced, `None` when it was skipped.
    pub fn outcome(&self) -> Option<&Value> {
        match self {
            EvaluationTrace::Variadic { outcome, .. }
            | EvaluationTrace::BinaryOp { outcome, .. }
            | EvaluationTrace::UnaryOp { outcome, .. } => Some(outcome),
            EvaluationTrace::Leaf { value, .. } => Some(value),
            EvaluationTrace::NotEvaluated => None,
        }
    }

    pub fn precedence(&self) -> u8 {
        match self {
            EvaluationTrace::Variadic { op_symbol, .. } | EvaluationTrace::BinaryOp { op_symbol, .. } => {
                match *op_symbol {
                    "OR" => 1,
                    "AND" => 2,
                    "==" | "IN" => 4,
                    ">" | ">=" | "<" | "<=" => 5,
                    "+" | "-" => 6,
                    "*" | "/" => 7,
                    _ => 0,
                }
            }
            EvaluationTrace::UnaryOp { .. } => 8,
            EvaluationTrace::Leaf { .. } | EvaluationTrace::NotEvaluated => 9,
        }
    }
}
