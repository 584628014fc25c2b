use std::sync::LazyLock;

use regex::Regex;

use super::{Argument, Operand};
use crate::error::{EngineError, Result};
use crate::query::{BooleanOperator, ComparisonOperator, Expression};

static ATTRIBUTE_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z][A-Za-z0-9]*(\.[A-Za-z][A-Za-z0-9]*)*$").expect("attribute path pattern")
});

/// Positional arguments, consumed left to right by `?` placeholders
#[derive(Debug, Clone)]
pub struct ArgumentCursor<'a> {
    arguments: &'a [Argument],
    position: usize,
}

impl<'a> ArgumentCursor<'a> {
    pub fn new(arguments: &'a [Argument]) -> Self {
        Self {
            arguments,
            position: 0,
        }
    }

    /// Take the argument for the next placeholder
    pub fn next_argument(&mut self) -> Result<Argument> {
        let argument = self.arguments.get(self.position).cloned().ok_or_else(|| {
            EngineError::query_parsing(format!(
                "Missing argument for placeholder {}",
                self.position + 1
            ))
        })?;
        self.position += 1;
        Ok(argument)
    }

    /// Number of placeholders bound so far
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn remaining(&self) -> usize {
        self.arguments.len().saturating_sub(self.position)
    }
}

/// Turns the text of one expression into an [`Expression`]
///
/// `next_operator` is the boolean operator following the expression, if any.
pub trait ExpressionStatementHandler {
    fn handle(
        &self,
        text: &str,
        next_operator: Option<BooleanOperator>,
        arguments: &mut ArgumentCursor<'_>,
    ) -> Result<Expression<Operand>>;
}

/// `path <op> ?`, `? <op> path` or `path <op> path`
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultExpressionHandler;

impl DefaultExpressionHandler {
    fn split(text: &str) -> Option<(&str, ComparisonOperator, &str)> {
        for (index, _) in text.char_indices() {
            let rest = &text[index..];
            for (symbol, operator) in ComparisonOperator::SYMBOLS {
                if rest.starts_with(symbol) {
                    return Some((&text[..index], operator, &rest[symbol.len()..]));
                }
            }
        }
        None
    }

    fn operand(
        text: &str,
        operator: ComparisonOperator,
        arguments: &mut ArgumentCursor<'_>,
    ) -> Result<Operand> {
        if text == "?" {
            let argument = arguments.next_argument()?;
            let is_range = matches!(argument, Argument::Range(..));
            if is_range != (operator == ComparisonOperator::InRange) {
                return Err(EngineError::query_parsing(format!(
                    "Argument {} does not fit operator '{}'",
                    arguments.position(),
                    operator.symbol()
                )));
            }
            return Ok(Operand::Argument(argument));
        }
        if ATTRIBUTE_PATH.is_match(text) {
            return Ok(Operand::Path(text.to_string()));
        }
        Err(EngineError::query_parsing(format!(
            "Invalid operand '{}'",
            text
        )))
    }
}

impl ExpressionStatementHandler for DefaultExpressionHandler {
    fn handle(
        &self,
        text: &str,
        _next_operator: Option<BooleanOperator>,
        arguments: &mut ArgumentCursor<'_>,
    ) -> Result<Expression<Operand>> {
        let text = text.trim();
        let (left, operator, right) = Self::split(text).ok_or_else(|| {
            EngineError::query_parsing(format!("Malformed expression '{}'", text))
        })?;
        let (left, right) = (left.trim(), right.trim());
        if left.is_empty() || right.is_empty() {
            return Err(EngineError::query_parsing(format!(
                "Malformed expression '{}'",
                text
            )));
        }
        if left == "?" && right == "?" {
            return Err(EngineError::query_parsing(format!(
                "Expression '{}' compares two arguments",
                text
            )));
        }
        let left = Self::operand(left, operator, arguments)?;
        let right = Self::operand(right, operator, arguments)?;
        Ok(Expression::new(left, operator, right))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::AttributeValue;

    fn handle(text: &str, arguments: &[Argument]) -> Result<Expression<Operand>> {
        let mut cursor = ArgumentCursor::new(arguments);
        DefaultExpressionHandler.handle(text, None, &mut cursor)
    }

    #[test]
    fn test_longest_operator_wins() {
        let expression = handle("age >= ?", &[Argument::from(18)]).unwrap();
        assert_eq!(expression.operator, ComparisonOperator::GreaterEqual);
        assert_eq!(expression.left, Operand::Path("age".to_string()));

        let expression = handle("a><?", &[Argument::range(1, 5)]).unwrap();
        assert_eq!(expression.operator, ComparisonOperator::InRange);
    }

    #[test]
    fn test_path_against_path() {
        let expression = handle("o.total<o.limit", &[]).unwrap();
        assert_eq!(expression.left, Operand::Path("o.total".to_string()));
        assert_eq!(expression.right, Operand::Path("o.limit".to_string()));
    }

    #[test]
    fn test_argument_on_left() {
        let expression = handle("? = name", &[Argument::from("x")]).unwrap();
        assert_eq!(
            expression.left,
            Operand::Argument(Argument::Value(AttributeValue::String("x".to_string())))
        );
    }

    #[test]
    fn test_errors() {
        assert!(handle("name ?", &[Argument::from(1)]).unwrap_err().is_query_parsing());
        assert!(handle("= ?", &[Argument::from(1)]).unwrap_err().is_query_parsing());
        assert!(handle("name = ?", &[]).unwrap_err().is_query_parsing());
        assert!(handle("na-me = ?", &[Argument::from(1)]).unwrap_err().is_query_parsing());
        assert!(handle("a >< ?", &[Argument::from(1)]).unwrap_err().is_query_parsing());
        assert!(handle("a = ?", &[Argument::range(1, 2)]).unwrap_err().is_query_parsing());
    }
}
