use std::fmt;

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};

/// A single cell of a raw source table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Value {
    Text(String),
    Integer(i64),
    Float(f64),
}

impl Value {
    pub fn as_display(&self) -> String {
        match self {
            Value::Text(s) => s.clone(),
            Value::Integer(i) => i.to_string(),
            Value::Float(f) => {
                if f.is_finite() && f.fract() == 0.0 {
                    (*f as i64).to_string()
                } else {
                    f.to_string()
                }
            }
        }
    }

    /// Numeric view of the cell. Text is parsed leniently; unparsable text is `None`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Float(f) if f.is_nan() => None,
            Value::Float(f) => Some(*f),
            Value::Text(s) => parse_numeric(s),
        }
    }

    /// Integer view of the cell. Floats must be integral.
    pub fn as_i64(&self) -> Result<i64> {
        match self {
            Value::Integer(i) => Ok(*i),
            Value::Float(f) if f.is_finite() && f.fract() == 0.0 => Ok(*f as i64),
            Value::Float(f) => Err(anyhow!("Expected an integral value, found {f}")),
            Value::Text(s) => {
                let trimmed = s.trim();
                if let Ok(parsed) = trimmed.parse::<i64>() {
                    return Ok(parsed);
                }
                match parse_numeric(trimmed) {
                    Some(f) if f.fract() == 0.0 => Ok(f as i64),
                    _ => Err(anyhow!("Failed to parse '{s}' as integer")),
                }
            }
        }
    }

    pub fn as_text(&self) -> String {
        self.as_display()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_display())
    }
}

/// Parses a numeric observation the way the bulk extracts spell them.
///
/// Empty cells and `NaN`-style placeholders are missing; infinities are kept.
pub fn parse_numeric(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.parse::<f64>() {
        Ok(parsed) if parsed.is_nan() => None,
        Ok(parsed) => Some(parsed),
        Err(_) => None,
    }
}

/// Parses a CSV cell into a typed cell, preferring integers, then floats.
pub fn parse_cell(raw: &str) -> Option<Value> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(i) = trimmed.parse::<i64>() {
        return Some(Value::Integer(i));
    }
    match trimmed.parse::<f64>() {
        Ok(f) if f.is_nan() => None,
        Ok(f) => Some(Value::Float(f)),
        Err(_) => Some(Value::Text(raw.to_string())),
    }
}

/// Row-oriented table as read from a legacy extract (DTA or CSV).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Option<Value>>>,
}

impl RawTable {
    pub fn new(headers: Vec<String>) -> Self {
        Self {
            headers,
            rows: Vec::new(),
        }
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn cell(&self, row: usize, column: usize) -> Option<&Value> {
        self.rows.get(row).and_then(|r| r.get(column)).and_then(|c| c.as_ref())
    }
}
