//! Tables and versioned file storage.
//!
//! # Overview
//!
//! - **Table**: an in-memory columnar frame with nullable typed columns
//! - **Schema**: declared column layouts with primary-key and enum checks
//! - **Arrow I/O**: Parquet (ZSTD) and CSV through `arrow`/`parquet`
//! - **Read/write**: `<base>/[<pipeline>/]<version>/<file>` access for
//!   tables, dictionaries, models, lists and figures
//!
//! # Usage
//!
//! ```rust,ignore
//! use forecast_forge::storage::{read_table, write_table, DataLocation};
//!
//! let location = DataLocation::new("data/raw", "dummy_data.csv")
//!     .with_time_connector("20240101_000000");
//! let table = read_table(&location)?;
//! write_table(&location.clone().with_time_connector("20240102_000000"), &table)?;
//! ```

pub mod arrow_io;
pub mod figure;
pub mod read_write;
pub mod schema;
pub mod table;

pub use figure::Figure;
pub use read_write::{
    read_dict, read_list, read_model, read_payload, read_table, read_table_with_schema,
    read_typed_dict, write_dict, write_figure, write_list, write_model, write_table, DataLocation,
    FileFormat, ReadType,
};
pub use schema::{normalize_column_name, FieldSpec, TableSchema, DUMMY_DATA};
pub use table::{Column, ColumnData, DType, Table};
