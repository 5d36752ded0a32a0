//! Versioned file access for every payload kind a task reads or writes.
//!
//! Paths are `<base>/[<pipeline>/]<time connector>/<file>`. The file
//! extension picks the format; asking for a kind the extension does not
//! support is an [`StorageError::UnsupportedFormat`].

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::StorageError;
use crate::model::FittedModel;
use crate::pipeline::Payload;

use super::arrow_io;
use super::figure::Figure;
use super::schema::{normalize_column_name, TableSchema};
use super::table::Table;

/// On-disk format, chosen by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Parquet,
    Csv,
    Json,
    Yaml,
    Svg,
}

impl FileFormat {
    pub fn from_file_name(file_name: &str) -> Option<Self> {
        let ext = Path::new(file_name).extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "parquet" => Some(Self::Parquet),
            "csv" | "txt" => Some(Self::Csv),
            "json" => Some(Self::Json),
            "yml" | "yaml" => Some(Self::Yaml),
            "svg" => Some(Self::Svg),
            _ => None,
        }
    }
}

/// Payload kind requested from a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadType {
    Table,
    Dict,
    Model,
    List,
    YamlConfig,
}

impl fmt::Display for ReadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadType::Table => write!(f, "table"),
            ReadType::Dict => write!(f, "dict"),
            ReadType::Model => write!(f, "model"),
            ReadType::List => write!(f, "list"),
            ReadType::YamlConfig => write!(f, "yaml config"),
        }
    }
}

/// Where a versioned file lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataLocation {
    pub base_directory: PathBuf,
    pub pipeline_name: Option<String>,
    pub time_connector: Option<String>,
    pub file_name: String,
}

impl DataLocation {
    pub fn new(base_directory: impl Into<PathBuf>, file_name: impl Into<String>) -> Self {
        Self {
            base_directory: base_directory.into(),
            pipeline_name: None,
            time_connector: None,
            file_name: file_name.into(),
        }
    }

    pub fn with_pipeline(mut self, pipeline_name: impl Into<String>) -> Self {
        self.pipeline_name = Some(pipeline_name.into());
        self
    }

    pub fn with_time_connector(mut self, version: impl Into<String>) -> Self {
        self.time_connector = Some(version.into());
        self
    }

    pub fn path(&self) -> PathBuf {
        let mut path = self.base_directory.clone();
        if let Some(pipeline) = &self.pipeline_name {
            path.push(pipeline);
        }
        if let Some(version) = &self.time_connector {
            path.push(version);
        }
        path.push(&self.file_name);
        path
    }

    fn format_for(&self, kind: &str, accepted: &[FileFormat]) -> Result<FileFormat, StorageError> {
        FileFormat::from_file_name(&self.file_name)
            .filter(|format| accepted.contains(format))
            .ok_or_else(|| StorageError::UnsupportedFormat {
                file: self.file_name.clone(),
                kind: kind.to_string(),
            })
    }
}

impl fmt::Display for DataLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path().display())
    }
}

fn read_to_string(path: &Path) -> Result<String, StorageError> {
    std::fs::read_to_string(path).map_err(|e| StorageError::io(path, e))
}

fn write_string(path: &Path, contents: &str) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| StorageError::io(parent, e))?;
    }
    std::fs::write(path, contents).map_err(|e| StorageError::io(path, e))
}

fn parse_json<T: DeserializeOwned>(path: &Path) -> Result<T, StorageError> {
    serde_json::from_str(&read_to_string(path)?).map_err(|source| StorageError::Json {
        path: path.to_path_buf(),
        source,
    })
}

fn dump_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StorageError> {
    let json = serde_json::to_string_pretty(value).map_err(|source| StorageError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    write_string(path, &json)
}

/// Reads a table and normalizes its column names.
pub fn read_table(location: &DataLocation) -> Result<Table, StorageError> {
    let path = location.path();
    let format = location.format_for(
        "tables",
        &[FileFormat::Parquet, FileFormat::Csv, FileFormat::Json],
    )?;

    let mut table = match format {
        FileFormat::Parquet => arrow_io::read_parquet(&path)?,
        FileFormat::Csv => arrow_io::read_csv(&path)?,
        _ => {
            let records: Vec<serde_json::Value> = parse_json(&path)?;
            Table::from_records(&records).ok_or_else(|| StorageError::InvalidData {
                path: path.clone(),
                reason: "expected an array of JSON objects".to_string(),
            })?
        }
    };
    table.rename_with(normalize_column_name)?;

    debug!(path = %path.display(), rows = table.n_rows(), cols = table.n_cols(), "Table loaded");
    Ok(table)
}

/// Reads a table, keeps the schema's columns and coerces their types.
pub fn read_table_with_schema(
    location: &DataLocation,
    schema: &TableSchema,
) -> Result<Table, StorageError> {
    let table = read_table(location)?;
    let mut table = table.select(&schema.column_names())?;
    schema.cast(&mut table)?;
    Ok(table)
}

pub fn write_table(location: &DataLocation, table: &Table) -> Result<(), StorageError> {
    let path = location.path();
    let format = location.format_for(
        "tables",
        &[FileFormat::Parquet, FileFormat::Csv, FileFormat::Json],
    )?;
    info!(
        file = %location.file_name,
        rows = table.n_rows(),
        cols = table.n_cols(),
        "Writing table"
    );

    match format {
        FileFormat::Parquet => arrow_io::write_parquet(table, &path),
        FileFormat::Csv => arrow_io::write_csv(table, &path),
        _ => dump_json(&path, &table.to_records()),
    }
}

pub fn read_dict(location: &DataLocation) -> Result<serde_json::Value, StorageError> {
    let path = location.path();
    match location.format_for("dictionaries", &[FileFormat::Json, FileFormat::Yaml])? {
        FileFormat::Json => parse_json(&path),
        _ => serde_yaml::from_str(&read_to_string(&path)?).map_err(|source| StorageError::Yaml {
            path: path.clone(),
            source,
        }),
    }
}

pub fn write_dict<T: Serialize + ?Sized>(
    location: &DataLocation,
    value: &T,
) -> Result<(), StorageError> {
    let path = location.path();
    match location.format_for("dictionaries", &[FileFormat::Json, FileFormat::Yaml])? {
        FileFormat::Json => dump_json(&path, value),
        _ => {
            let yaml = serde_yaml::to_string(value).map_err(|source| StorageError::Yaml {
                path: path.clone(),
                source,
            })?;
            write_string(&path, &yaml)
        }
    }
}

/// Reads a typed dictionary, such as a train/test split.
pub fn read_typed_dict<T: DeserializeOwned>(location: &DataLocation) -> Result<T, StorageError> {
    location.format_for("dictionaries", &[FileFormat::Json])?;
    parse_json(&location.path())
}

pub fn read_model<T: DeserializeOwned>(location: &DataLocation) -> Result<T, StorageError> {
    location.format_for("models", &[FileFormat::Json])?;
    parse_json(&location.path())
}

pub fn write_model<T: Serialize>(location: &DataLocation, model: &T) -> Result<(), StorageError> {
    location.format_for("models", &[FileFormat::Json])?;
    dump_json(&location.path(), model)
}

pub fn read_list(location: &DataLocation) -> Result<Vec<serde_json::Value>, StorageError> {
    location.format_for("lists", &[FileFormat::Json])?;
    parse_json(&location.path())
}

pub fn write_list(location: &DataLocation, values: &[serde_json::Value]) -> Result<(), StorageError> {
    location.format_for("lists", &[FileFormat::Json])?;
    dump_json(&location.path(), values)
}

pub fn write_figure(location: &DataLocation, figure: &Figure) -> Result<(), StorageError> {
    location.format_for("figures", &[FileFormat::Svg])?;
    write_string(&location.path(), figure.svg())
}

/// Reads a file as the requested payload kind.
pub fn read_payload(location: &DataLocation, read_type: ReadType) -> Result<Payload, StorageError> {
    debug!(location = %location, read_type = %read_type, "Reading payload");
    Ok(match read_type {
        ReadType::Table => Payload::Table(read_table(location)?),
        ReadType::Dict => Payload::Dict(read_dict(location)?),
        ReadType::Model => Payload::Model(read_model::<FittedModel>(location)?),
        ReadType::List => Payload::List(read_list(location)?),
        ReadType::YamlConfig => {
            location.format_for("yaml config", &[FileFormat::Yaml])?;
            let path = location.path();
            let config = Config::from_yaml_str(&read_to_string(&path)?).map_err(|e| {
                StorageError::InvalidData {
                    path: path.clone(),
                    reason: e.to_string(),
                }
            })?;
            Payload::Config(Arc::new(config))
        }
    })
}
