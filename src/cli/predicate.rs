//! `--where` parsing
//!
//! Accepted forms:
//!
//! ```text
//! AMOUNT > 10
//! LOC = 'north'
//! NAME IS NULL
//! NAME IS NOT NULL
//! ```
//!
//! Operands are JSON literals (numbers, booleans) or single-quoted strings.
//! Anything else is taken as a bare string.

use regex::Regex;
use serde_json::Value;

use crate::qualifier::{CompareOp, Qualifier, Qualifiers};
use crate::schema::LogicalSchema;

use super::errors::{CliError, CliResult};

const PREDICATE_PATTERN: &str =
    r"(?i)^\s*([A-Za-z_][A-Za-z0-9_]*)\s*(IS\s+NOT\s+NULL|IS\s+NULL|<=|>=|<>|!=|==|=|<|>)\s*(.*?)\s*$";

/// Parses `--where` clauses against a resolved schema
pub struct PredicateParser {
    pattern: Regex,
}

impl PredicateParser {
    /// Compile the predicate pattern
    pub fn new() -> CliResult<Self> {
        let pattern = Regex::new(PREDICATE_PATTERN)
            .map_err(|e| CliError::invalid_predicate(PREDICATE_PATTERN, e.to_string()))?;
        Ok(Self { pattern })
    }

    /// Parse one predicate into a qualifier on `schema`
    pub fn parse(&self, text: &str, schema: &LogicalSchema) -> CliResult<Qualifier> {
        let captures = self
            .pattern
            .captures(text)
            .ok_or_else(|| CliError::invalid_predicate(text, "expected <column> <op> <value>"))?;

        let name = &captures[1];
        let column = schema
            .column_index(name)
            .ok_or_else(|| CliError::invalid_predicate(text, format!("unknown column {}", name)))?;

        let op_text = captures[2].split_whitespace().collect::<Vec<_>>().join(" ");
        let op = CompareOp::parse(&op_text)
            .ok_or_else(|| CliError::invalid_predicate(text, "unknown operator"))?;

        let operand = captures.get(3).map(|m| m.as_str()).unwrap_or("");
        match op {
            CompareOp::IsNull | CompareOp::IsNotNull => {
                if !operand.is_empty() {
                    return Err(CliError::invalid_predicate(text, "null test takes no operand"));
                }
                Ok(Qualifier::new(column, op, Value::Null))
            }
            _ => {
                if operand.is_empty() {
                    return Err(CliError::invalid_predicate(text, "missing operand"));
                }
                Ok(Qualifier::new(column, op, parse_operand(operand)))
            }
        }
    }

    /// Parse every predicate and AND them together
    pub fn parse_all(&self, predicates: &[String], schema: &LogicalSchema) -> CliResult<Qualifiers> {
        let leaves = predicates
            .iter()
            .map(|p| self.parse(p, schema))
            .collect::<CliResult<Vec<_>>>()?;
        Ok(Qualifiers::all(leaves))
    }
}

fn parse_operand(text: &str) -> Value {
    if text.len() >= 2 && text.starts_with('\'') && text.ends_with('\'') {
        return Value::String(text[1..text.len() - 1].replace("''", "'"));
    }
    match serde_json::from_str::<Value>(text) {
        Ok(v @ (Value::Number(_) | Value::Bool(_) | Value::String(_))) => v,
        _ => Value::String(text.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::parse_definition;
    use serde_json::json;

    fn schema() -> LogicalSchema {
        parse_definition("LT0", "AMOUNT INTEGER, LOC VARCHAR(20)").unwrap()
    }

    #[test]
    fn test_parse_comparison() {
        let parser = PredicateParser::new().unwrap();
        let q = parser.parse("AMOUNT >= 10", &schema()).unwrap();
        assert_eq!(q.column, 0);
        assert_eq!(q.op, CompareOp::Ge);
        assert_eq!(q.operand, json!(10));
    }

    #[test]
    fn test_parse_quoted_string() {
        let parser = PredicateParser::new().unwrap();
        let q = parser.parse("loc = 'o''hare'", &schema()).unwrap();
        assert_eq!(q.column, 1);
        assert_eq!(q.operand, json!("o'hare"));
    }

    #[test]
    fn test_parse_null_tests() {
        let parser = PredicateParser::new().unwrap();
        let q = parser.parse("LOC is not null", &schema()).unwrap();
        assert_eq!(q.op, CompareOp::IsNotNull);
        let q = parser.parse("LOC IS NULL", &schema()).unwrap();
        assert_eq!(q.op, CompareOp::IsNull);
    }

    #[test]
    fn test_rejects_unknown_column_and_missing_operand() {
        let parser = PredicateParser::new().unwrap();
        assert!(parser.parse("NOPE = 1", &schema()).is_err());
        assert!(parser.parse("AMOUNT >", &schema()).is_err());
        assert!(parser.parse("LOC IS NULL 3", &schema()).is_err());
    }

    #[test]
    fn test_parse_all_is_conjunction() {
        let parser = PredicateParser::new().unwrap();
        let preds = vec!["AMOUNT > 1".to_string(), "LOC = x".to_string()];
        let qualifiers = parser.parse_all(&preds, &schema()).unwrap();
        assert_eq!(qualifiers.groups().len(), 2);
        assert_eq!(qualifiers.leaf_count(), 2);
    }
}
