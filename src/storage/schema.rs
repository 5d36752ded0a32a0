//! Declarative table schemas and the field names used across tasks.
//!
//! A [`TableSchema`] lists the expected columns with their types plus
//! optional primary-key and allowed-value constraints. Applying a schema
//! adds missing columns as nulls, reorders, coerces types and validates.

use std::collections::{BTreeSet, HashSet};

use crate::error::TableError;

use super::table::{Column, ColumnData, DType, Table};

pub const F_X1_TRANSACTION_DATE: &str = "x1_transaction_date";
pub const F_X2_HOUSE_AGE: &str = "x2_house_age";
pub const F_X3_DISTANCE_TO_NEAREST_STATION: &str = "x3_distance_to_nearest_mrt_station";
pub const F_X4_NUMBER_OF_CONVENIENCE_STORES: &str = "x4_number_of_convenience_stores";
pub const F_X5_LATITUDE: &str = "x5_latitude";
pub const F_X6_LONGITUDE: &str = "x6_longitude";
pub const F_Y_HOUSE_PRICE_OF_UNIT_AREA: &str = "y_house_price_of_unit_area";
pub const F_HAVERSINE_POINT: &str = "haversine_point";

/// A single expected column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub dtype: DType,
}

const fn field(name: &'static str, dtype: DType) -> FieldSpec {
    FieldSpec { name, dtype }
}

/// Expected layout and constraints of a table.
#[derive(Debug, Clone, Copy)]
pub struct TableSchema {
    pub label: &'static str,
    pub fields: &'static [FieldSpec],
    pub primary_key: &'static [&'static str],
    /// Allowed values per text column.
    pub enums: &'static [(&'static str, &'static [&'static str])],
}

/// Real-estate sales used by the template pipelines.
pub const DUMMY_DATA: TableSchema = TableSchema {
    label: "dummy_data_schema",
    fields: &[
        field(F_X1_TRANSACTION_DATE, DType::Date),
        field(F_X2_HOUSE_AGE, DType::Int),
        field(F_X3_DISTANCE_TO_NEAREST_STATION, DType::Int),
        field(F_X4_NUMBER_OF_CONVENIENCE_STORES, DType::Int),
        field(F_X5_LATITUDE, DType::Float),
        field(F_X6_LONGITUDE, DType::Float),
        field(F_Y_HOUSE_PRICE_OF_UNIT_AREA, DType::Float),
    ],
    primary_key: &[],
    enums: &[],
};

impl TableSchema {
    pub fn column_names(&self) -> Vec<&'static str> {
        self.fields.iter().map(|f| f.name).collect()
    }

    /// Adds every schema column absent from `table` as an all-null column.
    pub fn handle_missing_columns(&self, table: &mut Table) -> Result<(), TableError> {
        let rows = table.n_rows();
        for spec in self.fields {
            if !table.contains(spec.name) {
                table.push_column(Column::new(spec.name, ColumnData::nulls(spec.dtype, rows)))?;
            }
        }
        Ok(())
    }

    /// Coerces every schema column present in `table` to its declared type.
    pub fn cast(&self, table: &mut Table) -> Result<(), TableError> {
        for spec in self.fields {
            if let Ok(column) = table.column(spec.name) {
                let data = column.data.cast(spec.dtype);
                table.set_column(Column::new(spec.name, data))?;
            }
        }
        Ok(())
    }

    /// Checks types, primary key uniqueness and allowed values.
    pub fn validate(&self, table: &Table) -> Result<(), TableError> {
        for spec in self.fields {
            let actual = table.column(spec.name)?.data.dtype();
            if actual != spec.dtype {
                return Err(TableError::TypeMismatch {
                    column: spec.name.to_string(),
                    expected: spec.dtype.to_string(),
                    actual: actual.to_string(),
                });
            }
        }
        self.check_primary_key(table)?;
        self.check_enum_values(table)
    }

    fn check_primary_key(&self, table: &Table) -> Result<(), TableError> {
        if self.primary_key.is_empty() {
            return Ok(());
        }
        let key_columns = self
            .primary_key
            .iter()
            .map(|name| table.column(name))
            .collect::<Result<Vec<_>, _>>()?;

        let mut seen = HashSet::new();
        for row in 0..table.n_rows() {
            let key: Vec<String> = key_columns
                .iter()
                .map(|c| c.data.json_value(row).to_string())
                .collect();
            if !seen.insert(key) {
                return Err(TableError::PrimaryKeyViolation {
                    label: self.label.to_string(),
                    columns: self.primary_key.iter().map(|s| s.to_string()).collect(),
                });
            }
        }
        Ok(())
    }

    fn check_enum_values(&self, table: &Table) -> Result<(), TableError> {
        for (name, allowed) in self.enums {
            let ColumnData::Text(values) = &table.column(name)?.data else {
                continue;
            };
            let invalid: BTreeSet<&str> = values
                .iter()
                .flatten()
                .map(String::as_str)
                .filter(|v| *v != "None" && !allowed.contains(v))
                .collect();
            if !invalid.is_empty() {
                return Err(TableError::EnumViolation {
                    label: self.label.to_string(),
                    column: name.to_string(),
                    values: invalid.into_iter().map(str::to_string).collect(),
                });
            }
        }
        Ok(())
    }

    /// Adds missing columns, selects the schema columns in order, casts and
    /// validates.
    pub fn apply(&self, mut table: Table) -> Result<Table, TableError> {
        self.handle_missing_columns(&mut table)?;
        let mut table = table.select(&self.column_names())?;
        self.cast(&mut table)?;
        self.validate(&table)?;
        Ok(table)
    }
}

/// Normalizes a raw column header into snake case.
pub fn normalize_column_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for ch in name.trim().to_lowercase().chars() {
        match ch {
            '.' | ')' | '(' | '+' | ':' => {}
            '-' | ',' | '\n' | ' ' | '/' => out.push('_'),
            '#' => out.push_str("number"),
            c => out.push(c),
        }
    }
    out
}
