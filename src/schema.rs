//! Column schema parsing and typed column values
//!
//! Columns are declared as `name:type[:format]`, for example `date:string`,
//! `impressions:long` or `created_at:timestamp:%Y-%m-%d %H:%M`. The format part
//! may itself contain colons; everything after the second colon is kept.

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt::{self, Write as _};
use std::str::FromStr;

/// Declared type of an output column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    /// Text
    String,
    /// 64-bit signed integer
    Long,
    /// Instant in UTC
    Timestamp,
    /// Arbitrary JSON, passed through verbatim
    Json,
    /// Boolean
    Boolean,
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ColumnType::String => "string",
            ColumnType::Long => "long",
            ColumnType::Timestamp => "timestamp",
            ColumnType::Json => "json",
            ColumnType::Boolean => "boolean",
        };
        write!(f, "{s}")
    }
}

impl FromStr for ColumnType {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "string" => Ok(ColumnType::String),
            "long" => Ok(ColumnType::Long),
            "timestamp" => Ok(ColumnType::Timestamp),
            "json" => Ok(ColumnType::Json),
            "boolean" => Ok(ColumnType::Boolean),
            other => Err(SchemaError::UnknownType(other.to_string())),
        }
    }
}

/// One column of the output schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    /// Position in the row
    pub index: usize,
    /// Column name, also the metric or field it is resolved from
    pub name: String,
    /// Declared type
    pub column_type: ColumnType,
    /// Optional chrono format for timestamp parsing and date rendering
    pub format: Option<String>,
}

impl ColumnSpec {
    /// Create a column without a format
    pub fn new(index: usize, name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            index,
            name: name.into(),
            column_type,
            format: None,
        }
    }

    /// Attach a chrono format string
    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    /// Parse a `name:type[:format]` declaration
    ///
    /// # Errors
    ///
    /// Returns an error if the name is empty, the type is unknown, or the
    /// format contains an invalid chrono specifier.
    pub fn parse(index: usize, declaration: &str) -> Result<Self, SchemaError> {
        let mut parts = declaration.splitn(3, ':');

        let name = parts.next().unwrap_or_default().trim();
        if name.is_empty() {
            return Err(SchemaError::InvalidFormat(format!(
                "column name cannot be empty in '{declaration}'"
            )));
        }

        let column_type = match parts.next() {
            Some(t) => t.parse::<ColumnType>()?,
            None => {
                return Err(SchemaError::InvalidFormat(format!(
                    "expected name:type[:format], got '{declaration}'"
                )))
            }
        };

        let mut spec = Self::new(index, name, column_type);
        if let Some(format) = parts.next().filter(|f| !f.is_empty()) {
            if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
                return Err(SchemaError::InvalidFormat(format!(
                    "invalid time format '{format}' for column '{name}'"
                )));
            }
            spec = spec.with_format(format);
        }
        Ok(spec)
    }
}

impl fmt::Display for ColumnSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.format {
            Some(format) => write!(f, "{}:{}:{}", self.name, self.column_type, format),
            None => write!(f, "{}:{}", self.name, self.column_type),
        }
    }
}

/// Parse an ordered list of column declarations, assigning indices in order
///
/// # Errors
///
/// Returns an error on the first malformed declaration or on a duplicate name.
pub fn parse_columns<I, S>(declarations: I) -> Result<Vec<ColumnSpec>, SchemaError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    let mut columns = Vec::new();

    for (index, declaration) in declarations.into_iter().enumerate() {
        let spec = ColumnSpec::parse(index, declaration.as_ref())?;
        if !seen.insert(spec.name.clone()) {
            return Err(SchemaError::DuplicateColumn(spec.name));
        }
        columns.push(spec);
    }

    if columns.is_empty() {
        return Err(SchemaError::Empty);
    }
    Ok(columns)
}

/// Typed value of one cell
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
    /// Missing value
    Null,
    /// Text
    String(String),
    /// Integer
    Long(i64),
    /// Boolean
    Boolean(bool),
    /// Instant
    Timestamp(DateTime<Utc>),
    /// JSON passed through
    Json(Value),
}

impl ColumnValue {
    /// Whether this cell is null
    pub fn is_null(&self) -> bool {
        matches!(self, ColumnValue::Null)
    }

    /// JSON representation, timestamps rendered per the column format
    pub fn to_json(&self, column: &ColumnSpec) -> Value {
        match self {
            ColumnValue::Null => Value::Null,
            ColumnValue::String(s) => Value::String(s.clone()),
            ColumnValue::Long(n) => Value::from(*n),
            ColumnValue::Boolean(b) => Value::Bool(*b),
            ColumnValue::Timestamp(ts) => Value::String(render_timestamp(ts, column)),
            ColumnValue::Json(v) => v.clone(),
        }
    }

    /// Flat text field; null is the empty string and JSON is compact
    pub fn to_field(&self, column: &ColumnSpec) -> String {
        match self {
            ColumnValue::Null => String::new(),
            ColumnValue::String(s) => s.clone(),
            ColumnValue::Long(n) => n.to_string(),
            ColumnValue::Boolean(b) => b.to_string(),
            ColumnValue::Timestamp(ts) => render_timestamp(ts, column),
            ColumnValue::Json(v) => v.to_string(),
        }
    }
}

fn render_timestamp(ts: &DateTime<Utc>, column: &ColumnSpec) -> String {
    if let Some(format) = &column.format {
        let mut rendered = String::new();
        if write!(rendered, "{}", ts.format(format)).is_ok() {
            return rendered;
        }
    }
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// One output row, aligned 1:1 with the column schema
pub type Row = Vec<ColumnValue>;

/// Errors that can occur during column schema parsing
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    /// Malformed declaration
    #[error("schema error: {0}")]
    InvalidFormat(String),

    /// Type name not in string/long/timestamp/json/boolean
    #[error("unknown column type: {0}")]
    UnknownType(String),

    /// Same column declared twice
    #[error("duplicate column: {0}")]
    DuplicateColumn(String),

    /// No columns declared
    #[error("column schema is empty")]
    Empty,
}
