use crate::ast::EvaluationTrace;

/// Formats evaluation traces into human-readable strings
pub struct TraceFormatter;

impl TraceFormatter {
    /// Format an evaluation trace into a one-line explanation.
    pub fn format_trace(trace: &EvaluationTrace) -> String {
        Self::format_recursive(trace, 0)
    }

    /// Recursively formats the trace, adding parentheses only when necessary.
    fn format_recursive(trace: &EvaluationTrace, parent_precedence: u8) -> String {
        let current_precedence = trace.precedence();
        let needs_parens = current_precedence < parent_precedence;

        let body = match trace {
            EvaluationTrace::Variadic {
                op_symbol,
                operands,
                ..
            } => {
                // Short-circuited operands are left out; the last one shown decided the result.
                let visited: Vec<&EvaluationTrace> = operands
                    .iter()
                    .filter(|operand| !matches!(operand, EvaluationTrace::NotEvaluated))
                    .collect();
                if let [only] = visited.as_slice() {
                    return Self::format_recursive(only, parent_precedence);
                }
                visited
                    .iter()
                    .map(|operand| Self::format_recursive(operand, current_precedence))
                    .collect::<Vec<_>>()
                    .join(&format!(" {} ", op_symbol))
            }
            EvaluationTrace::BinaryOp {
                op_symbol,
                left,
                right,
                ..
            } => format!(
                "{} {} {}",
                Self::format_recursive(left, current_precedence),
                op_symbol,
                Self::format_recursive(right, current_precedence + 1)
            ),
            EvaluationTrace::UnaryOp {
                op_symbol, child, ..
            } => format!("{} {}", op_symbol, Self::format_recursive(child, current_precedence)),
            EvaluationTrace::Leaf { source, value } => {
                if source.starts_with('$') {
                    format!("{} (was {})", source, value)
                } else {
                    source.clone()
                }
            }
            EvaluationTrace::NotEvaluated => String::new(),
        };

        if needs_parens {
            format!("({})", body)
        } else {
            body
        }
    }
}
