//! In-memory columnar tables.
//!
//! A [`Table`] is an ordered set of equally long, nullable, typed columns.
//! It is deliberately small: tasks need rename, select, row sampling, type
//! coercion and numeric extraction, nothing more.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::TableError;

/// Date format used when dates are rendered as text.
pub const ISO_DATE: &str = "%Y-%m-%d";

/// Logical type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DType {
    Float,
    Int,
    Text,
    Bool,
    Date,
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DType::Float => write!(f, "float"),
            DType::Int => write!(f, "int"),
            DType::Text => write!(f, "text"),
            DType::Bool => write!(f, "bool"),
            DType::Date => write!(f, "date"),
        }
    }
}

/// Column values; `None` marks a null cell.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Float(Vec<Option<f64>>),
    Int(Vec<Option<i64>>),
    Text(Vec<Option<String>>),
    Bool(Vec<Option<bool>>),
    Date(Vec<Option<NaiveDate>>),
}

impl ColumnData {
    /// An all-null column of the given type.
    pub fn nulls(dtype: DType, len: usize) -> Self {
        match dtype {
            DType::Float => ColumnData::Float(vec![None; len]),
            DType::Int => ColumnData::Int(vec![None; len]),
            DType::Text => ColumnData::Text(vec![None; len]),
            DType::Bool => ColumnData::Bool(vec![None; len]),
            DType::Date => ColumnData::Date(vec![None; len]),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ColumnData::Float(v) => v.len(),
            ColumnData::Int(v) => v.len(),
            ColumnData::Text(v) => v.len(),
            ColumnData::Bool(v) => v.len(),
            ColumnData::Date(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dtype(&self) -> DType {
        match self {
            ColumnData::Float(_) => DType::Float,
            ColumnData::Int(_) => DType::Int,
            ColumnData::Text(_) => DType::Text,
            ColumnData::Bool(_) => DType::Bool,
            ColumnData::Date(_) => DType::Date,
        }
    }

    pub fn is_null(&self, row: usize) -> bool {
        match self {
            ColumnData::Float(v) => v[row].map_or(true, f64::is_nan),
            ColumnData::Int(v) => v[row].is_none(),
            ColumnData::Text(v) => v[row].is_none(),
            ColumnData::Bool(v) => v[row].is_none(),
            ColumnData::Date(v) => v[row].is_none(),
        }
    }

    /// Picks rows by index, in the given order.
    pub fn take(&self, rows: &[usize]) -> Self {
        fn pick<T: Clone>(values: &[T], rows: &[usize]) -> Vec<T> {
            rows.iter().map(|&i| values[i].clone()).collect()
        }
        match self {
            ColumnData::Float(v) => ColumnData::Float(pick(v, rows)),
            ColumnData::Int(v) => ColumnData::Int(pick(v, rows)),
            ColumnData::Text(v) => ColumnData::Text(pick(v, rows)),
            ColumnData::Bool(v) => ColumnData::Bool(pick(v, rows)),
            ColumnData::Date(v) => ColumnData::Date(pick(v, rows)),
        }
    }

    /// Converts to `dtype`, turning unconvertible cells into nulls.
    ///
    /// Float to int floors; text is trimmed and parsed; text to bool is a
    /// case-insensitive comparison with `"true"` where nulls become `false`.
    pub fn cast(&self, dtype: DType) -> Self {
        if self.dtype() == dtype {
            return self.clone();
        }
        match dtype {
            DType::Float => ColumnData::Float(self.map_cells(CellRef::to_f64)),
            DType::Int => ColumnData::Int(self.map_cells(CellRef::to_i64)),
            DType::Text => ColumnData::Text(self.map_cells(CellRef::to_text)),
            DType::Date => ColumnData::Date(self.map_cells(CellRef::to_date)),
            DType::Bool => match self {
                ColumnData::Text(v) => ColumnData::Bool(
                    v.iter()
                        .map(|s| Some(s.as_deref().is_some_and(|s| s.trim().eq_ignore_ascii_case("true"))))
                        .collect(),
                ),
                _ => ColumnData::Bool(self.map_cells(CellRef::to_bool)),
            },
        }
    }

    fn map_cells<'a, T>(&'a self, f: impl Fn(CellRef<'a>) -> Option<T>) -> Vec<Option<T>> {
        (0..self.len()).filter_map(|i| self.cell(i)).map(|c| c.and_then(&f)).collect()
    }

    fn cell<'a>(&'a self, row: usize) -> Option<Option<CellRef<'a>>> {
        Some(match self {
            ColumnData::Float(v) => v.get(row)?.map(CellRef::Float),
            ColumnData::Int(v) => v.get(row)?.map(CellRef::Int),
            ColumnData::Text(v) => v.get(row)?.as_deref().map(CellRef::Text),
            ColumnData::Bool(v) => v.get(row)?.map(CellRef::Bool),
            ColumnData::Date(v) => v.get(row)?.map(CellRef::Date),
        })
    }

    /// Renders a cell as JSON; nulls and NaN become `null`.
    pub fn json_value(&self, row: usize) -> serde_json::Value {
        use serde_json::Value;
        match self {
            ColumnData::Float(v) => v[row]
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            ColumnData::Int(v) => v[row].map(Value::from).unwrap_or(Value::Null),
            ColumnData::Text(v) => v[row].clone().map(Value::String).unwrap_or(Value::Null),
            ColumnData::Bool(v) => v[row].map(Value::Bool).unwrap_or(Value::Null),
            ColumnData::Date(v) => v[row]
                .map(|d| Value::String(d.format(ISO_DATE).to_string()))
                .unwrap_or(Value::Null),
        }
    }

    /// Infers a column from JSON cells.
    ///
    /// All integers gives `Int`, any mix of numbers gives `Float`, all
    /// booleans gives `Bool`, anything else is rendered as `Text`.
    pub fn from_json_values(values: &[serde_json::Value]) -> Self {
        use serde_json::Value;
        let present: Vec<&Value> = values.iter().filter(|v| !v.is_null()).collect();

        if !present.is_empty() && present.iter().all(|v| v.is_i64()) {
            return ColumnData::Int(values.iter().map(Value::as_i64).collect());
        }
        if !present.is_empty() && present.iter().all(|v| v.is_number()) {
            return ColumnData::Float(values.iter().map(Value::as_f64).collect());
        }
        if !present.is_empty() && present.iter().all(|v| v.is_boolean()) {
            return ColumnData::Bool(values.iter().map(Value::as_bool).collect());
        }
        ColumnData::Text(
            values
                .iter()
                .map(|v| match v {
                    Value::Null => None,
                    Value::String(s) => Some(s.clone()),
                    other => Some(other.to_string()),
                })
                .collect(),
        )
    }
}

#[derive(Clone, Copy)]
enum CellRef<'a> {
    Float(f64),
    Int(i64),
    Text(&'a str),
    Bool(bool),
    Date(NaiveDate),
}

impl CellRef<'_> {
    fn to_f64(self) -> Option<f64> {
        match self {
            CellRef::Float(v) => Some(v),
            CellRef::Int(v) => Some(v as f64),
            CellRef::Bool(v) => Some(if v { 1.0 } else { 0.0 }),
            CellRef::Text(s) => s.trim().parse().ok(),
            CellRef::Date(_) => None,
        }
    }

    fn to_i64(self) -> Option<i64> {
        match self {
            CellRef::Int(v) => Some(v),
            CellRef::Bool(v) => Some(i64::from(v)),
            CellRef::Text(s) => s
                .trim()
                .parse::<i64>()
                .ok()
                .or_else(|| CellRef::Float(s.trim().parse().ok()?).to_i64()),
            CellRef::Float(v) if v.is_finite() => Some(v.floor() as i64),
            CellRef::Float(_) | CellRef::Date(_) => None,
        }
    }

    fn to_text(self) -> Option<String> {
        Some(match self {
            CellRef::Float(v) => v.to_string(),
            CellRef::Int(v) => v.to_string(),
            CellRef::Text(s) => s.to_string(),
            CellRef::Bool(v) => v.to_string(),
            CellRef::Date(d) => d.format(ISO_DATE).to_string(),
        })
    }

    fn to_bool(self) -> Option<bool> {
        match self {
            CellRef::Bool(v) => Some(v),
            CellRef::Int(v) => Some(v != 0),
            CellRef::Float(v) => Some(v != 0.0),
            CellRef::Text(s) => Some(s.trim().eq_ignore_ascii_case("true")),
            CellRef::Date(_) => None,
        }
    }

    fn to_date(self) -> Option<NaiveDate> {
        match self {
            CellRef::Date(d) => Some(d),
            CellRef::Text(s) => NaiveDate::parse_from_str(s.trim(), ISO_DATE).ok(),
            _ => None,
        }
    }
}

/// A named column.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub data: ColumnData,
}

impl Column {
    pub fn new(name: impl Into<String>, data: ColumnData) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }

    pub fn float(name: impl Into<String>, values: Vec<Option<f64>>) -> Self {
        Self::new(name, ColumnData::Float(values))
    }

    pub fn int(name: impl Into<String>, values: Vec<Option<i64>>) -> Self {
        Self::new(name, ColumnData::Int(values))
    }

    pub fn text(name: impl Into<String>, values: Vec<Option<String>>) -> Self {
        Self::new(name, ColumnData::Text(values))
    }

    pub fn date(name: impl Into<String>, values: Vec<Option<NaiveDate>>) -> Self {
        Self::new(name, ColumnData::Date(values))
    }
}

/// An ordered collection of equally long columns with unique names.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<Column>,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_columns(columns: Vec<Column>) -> Result<Self, TableError> {
        let mut table = Self::new();
        for column in columns {
            table.push_column(column)?;
        }
        Ok(table)
    }

    pub fn n_rows(&self) -> usize {
        self.columns.first().map_or(0, |c| c.data.len())
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    pub fn column(&self, name: &str) -> Result<&Column, TableError> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| TableError::ColumnNotFound(name.to_string()))
    }

    /// Appends a column; its length must match the existing rows.
    pub fn push_column(&mut self, column: Column) -> Result<(), TableError> {
        if self.contains(&column.name) {
            return Err(TableError::DuplicateColumn(column.name));
        }
        self.check_length(&column)?;
        self.columns.push(column);
        Ok(())
    }

    /// Replaces a column of the same name, or appends it.
    pub fn set_column(&mut self, column: Column) -> Result<(), TableError> {
        self.check_length(&column)?;
        match self.columns.iter_mut().find(|c| c.name == column.name) {
            Some(existing) => *existing = column,
            None => self.columns.push(column),
        }
        Ok(())
    }

    fn check_length(&self, column: &Column) -> Result<(), TableError> {
        if !self.columns.is_empty() && column.data.len() != self.n_rows() {
            return Err(TableError::LengthMismatch {
                column: column.name.clone(),
                expected: self.n_rows(),
                actual: column.data.len(),
            });
        }
        Ok(())
    }

    /// Renames columns; every source name must exist.
    pub fn rename(&mut self, mapping: &BTreeMap<String, String>) -> Result<(), TableError> {
        for source in mapping.keys() {
            if !self.contains(source) {
                return Err(TableError::ColumnNotFound(source.clone()));
            }
        }
        self.rename_with(|name| mapping.get(name).cloned().unwrap_or_else(|| name.to_string()))
    }

    /// Renames every column through `f`; fails if two columns collide.
    pub fn rename_with(&mut self, f: impl Fn(&str) -> String) -> Result<(), TableError> {
        let renamed: Vec<String> = self.columns.iter().map(|c| f(&c.name)).collect();
        let mut seen = HashSet::new();
        for name in &renamed {
            if !seen.insert(name.as_str()) {
                return Err(TableError::DuplicateColumn(name.clone()));
            }
        }
        for (column, name) in self.columns.iter_mut().zip(renamed) {
            column.name = name;
        }
        Ok(())
    }

    /// Returns a new table with the named columns, in the given order.
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> Result<Table, TableError> {
        let columns = names
            .iter()
            .map(|name| self.column(name.as_ref()).cloned())
            .collect::<Result<Vec<_>, _>>()?;
        Table::from_columns(columns)
    }

    /// Returns a new table holding the given rows, in the given order.
    pub fn take(&self, rows: &[usize]) -> Table {
        Table {
            columns: self
                .columns
                .iter()
                .map(|c| Column::new(c.name.clone(), c.data.take(rows)))
                .collect(),
        }
    }

    /// Extracts a numeric column as floats.
    pub fn float_values(&self, name: &str) -> Result<Vec<Option<f64>>, TableError> {
        let column = self.column(name)?;
        match &column.data {
            ColumnData::Float(v) => Ok(v.iter().map(|x| x.filter(|x| !x.is_nan())).collect()),
            ColumnData::Int(v) => Ok(v.iter().map(|x| x.map(|x| x as f64)).collect()),
            other => Err(TableError::TypeMismatch {
                column: name.to_string(),
                expected: "numeric".to_string(),
                actual: other.dtype().to_string(),
            }),
        }
    }

    /// Parses a text column into dates, failing on the first bad value.
    pub fn parse_dates(&mut self, name: &str, format: &str) -> Result<(), TableError> {
        let column = self
            .columns
            .iter_mut()
            .find(|c| c.name == name)
            .ok_or_else(|| TableError::ColumnNotFound(name.to_string()))?;

        let parsed = match &column.data {
            ColumnData::Date(_) => return Ok(()),
            ColumnData::Text(values) => values
                .iter()
                .map(|value| match value {
                    None => Ok(None),
                    Some(s) => NaiveDate::parse_from_str(s.trim(), format)
                        .map(Some)
                        .map_err(|_| TableError::DateParse {
                            column: name.to_string(),
                            value: s.clone(),
                            format: format.to_string(),
                        }),
                })
                .collect::<Result<Vec<_>, _>>()?,
            other => {
                return Err(TableError::TypeMismatch {
                    column: name.to_string(),
                    expected: DType::Text.to_string(),
                    actual: other.dtype().to_string(),
                })
            }
        };
        column.data = ColumnData::Date(parsed);
        Ok(())
    }

    /// Renders the table as an array of JSON records.
    pub fn to_records(&self) -> Vec<serde_json::Value> {
        (0..self.n_rows())
            .map(|row| {
                let record: serde_json::Map<String, serde_json::Value> = self
                    .columns
                    .iter()
                    .map(|c| (c.name.clone(), c.data.json_value(row)))
                    .collect();
                serde_json::Value::Object(record)
            })
            .collect()
    }

    /// Builds a table from JSON records.
    ///
    /// Column order follows first appearance; keys missing from a record are
    /// nulls. Returns `None` if a record is not a JSON object.
    pub fn from_records(records: &[serde_json::Value]) -> Option<Table> {
        let mut names: Vec<String> = Vec::new();
        for record in records {
            for key in record.as_object()?.keys() {
                if !names.contains(key) {
                    names.push(key.clone());
                }
            }
        }

        let columns = names
            .into_iter()
            .map(|name| {
                let cells: Vec<serde_json::Value> = records
                    .iter()
                    .map(|r| r.get(&name).cloned().unwrap_or(serde_json::Value::Null))
                    .collect();
                Column::new(name, ColumnData::from_json_values(&cells))
            })
            .collect();

        Some(Table { columns })
    }
}
