//! Table definition text parsing
//!
//! Definitions travel between nodes as text, e.g.
//! `LOC VARCHAR(20), AMOUNT INTEGER, PRICE DECIMAL(10,2)`.

use regex::Regex;
use std::sync::OnceLock;

use super::errors::{SchemaError, SchemaResult};
use super::types::{ColumnDef, ColumnType, LogicalSchema};

static COLUMN_DEF: OnceLock<Option<Regex>> = OnceLock::new();

fn column_def_regex() -> Option<&'static Regex> {
    COLUMN_DEF
        .get_or_init(|| {
            Regex::new(
                r"^\s*([A-Za-z_][A-Za-z0-9_]*)\s+([A-Za-z]+(?:\s+PRECISION)?)\s*(?:\(\s*(\d+)\s*(?:,\s*(\d+)\s*)?\))?\s*$",
            )
            .ok()
        })
        .as_ref()
}

/// Parse definition text into an all-physical schema
pub fn parse_definition(table: &str, definition: &str) -> SchemaResult<LogicalSchema> {
    let regex = column_def_regex()
        .ok_or_else(|| SchemaError::invalid_definition(definition, "column pattern unavailable"))?;

    let mut columns: Vec<ColumnDef> = Vec::new();
    for piece in split_top_level(definition) {
        if piece.trim().is_empty() {
            continue;
        }
        let caps = regex.captures(piece).ok_or_else(|| {
            SchemaError::invalid_definition(definition, format!("cannot parse column '{}'", piece.trim()))
        })?;

        let name = &caps[1];
        let type_name = caps[2].to_uppercase();
        let first = parse_number(definition, caps.get(3).map(|m| m.as_str()))?;
        let second = parse_number(definition, caps.get(4).map(|m| m.as_str()))?;
        let column_type = parse_type(definition, &type_name, first, second)?;

        if columns.iter().any(|c| c.name.eq_ignore_ascii_case(name)) {
            return Err(SchemaError::invalid_definition(
                definition,
                format!("duplicate column '{}'", name),
            ));
        }
        columns.push(ColumnDef::new(name, column_type));
    }

    if columns.is_empty() {
        return Err(SchemaError::invalid_definition(definition, "no columns"));
    }

    Ok(LogicalSchema::new(table, columns))
}

fn parse_number(definition: &str, text: Option<&str>) -> SchemaResult<Option<u32>> {
    text.map(|t| {
        t.parse::<u32>()
            .map_err(|e| SchemaError::invalid_definition(definition, e.to_string()))
    })
    .transpose()
}

fn parse_type(
    definition: &str,
    name: &str,
    first: Option<u32>,
    second: Option<u32>,
) -> SchemaResult<ColumnType> {
    let column_type = match name {
        "SMALLINT" => ColumnType::Smallint,
        "INT" | "INTEGER" => ColumnType::Integer,
        "BIGINT" => ColumnType::Bigint,
        "REAL" => ColumnType::Real,
        "DOUBLE" | "DOUBLE PRECISION" | "FLOAT" => ColumnType::Double,
        "DECIMAL" | "NUMERIC" => {
            let precision = first.unwrap_or(5);
            let scale = second.unwrap_or(0);
            if precision == 0 || precision > 31 || scale > precision {
                return Err(SchemaError::invalid_definition(
                    definition,
                    format!("bad DECIMAL({},{})", precision, scale),
                ));
            }
            ColumnType::Decimal {
                precision: precision as u8,
                scale: scale as u8,
            }
        }
        "CHAR" => ColumnType::Char {
            width: first.unwrap_or(1),
        },
        "VARCHAR" => match first {
            Some(width) => ColumnType::Varchar { width },
            None => {
                return Err(SchemaError::invalid_definition(
                    definition,
                    "VARCHAR requires a width",
                ))
            }
        },
        "BOOLEAN" => ColumnType::Boolean,
        "DATE" => ColumnType::Date,
        "TIMESTAMP" => ColumnType::Timestamp,
        other => {
            return Err(SchemaError::invalid_definition(
                definition,
                format!("unsupported type '{}'", other),
            ))
        }
    };
    Ok(column_type)
}

/// Split on commas that are not inside parentheses
fn split_top_level(text: &str) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in text.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                pieces.push(&text[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    pieces.push(&text[start..]);
    pieces
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_definition() {
        let schema = parse_definition("LT0", "loc VARCHAR(20), amount INT").unwrap();
        assert_eq!(schema.exposed_count(), 2);
        assert_eq!(schema.columns()[0].name, "LOC");
        assert_eq!(
            schema.columns()[0].column_type,
            ColumnType::Varchar { width: 20 }
        );
        assert_eq!(schema.columns()[1].column_type, ColumnType::Integer);
    }

    #[test]
    fn test_decimal_comma_not_split() {
        let schema = parse_definition("LT0", "PRICE DECIMAL(10,2), QTY BIGINT").unwrap();
        assert_eq!(schema.exposed_count(), 2);
        assert_eq!(
            schema.columns()[0].column_type,
            ColumnType::Decimal {
                precision: 10,
                scale: 2
            }
        );
    }

    #[test]
    fn test_round_trip_through_definition_text() {
        let text = "A INTEGER, B VARCHAR(8), C DECIMAL(7,3), D CHAR(1), E DOUBLE";
        let schema = parse_definition("T", text).unwrap();
        assert_eq!(schema.definition(), text);
    }

    #[test]
    fn test_rejects_unknown_type() {
        assert!(parse_definition("T", "A BLOBBY").is_err());
    }

    #[test]
    fn test_rejects_duplicate_column() {
        assert!(parse_definition("T", "A INT, a BIGINT").is_err());
    }

    #[test]
    fn test_rejects_empty_definition() {
        assert!(parse_definition("T", "  ").is_err());
    }
}
