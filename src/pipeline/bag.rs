//! The parameter bag threaded through a pipeline run.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::Config;
use crate::error::TaskError;
use crate::model::{FittedModel, TrainData};
use crate::storage::{Figure, Table};

/// Key under which the run configuration is seeded.
pub const CONFIG_KEY: &str = "config";

/// Named results returned by a task.
pub type Outputs = BTreeMap<String, Payload>;

/// A value stored in the bag.
#[derive(Debug, Clone)]
pub enum Payload {
    Config(Arc<Config>),
    Table(Table),
    TrainData(TrainData),
    Dict(serde_json::Value),
    Model(FittedModel),
    List(Vec<serde_json::Value>),
    Figure(Figure),
}

impl Payload {
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Config(_) => "config",
            Payload::Table(_) => "table",
            Payload::TrainData(_) => "train data",
            Payload::Dict(_) => "dict",
            Payload::Model(_) => "model",
            Payload::List(_) => "list",
            Payload::Figure(_) => "figure",
        }
    }
}

impl From<Table> for Payload {
    fn from(table: Table) -> Self {
        Payload::Table(table)
    }
}

impl From<TrainData> for Payload {
    fn from(data: TrainData) -> Self {
        Payload::TrainData(data)
    }
}

impl From<FittedModel> for Payload {
    fn from(model: FittedModel) -> Self {
        Payload::Model(model)
    }
}

impl From<serde_json::Value> for Payload {
    fn from(value: serde_json::Value) -> Self {
        Payload::Dict(value)
    }
}

/// Accumulated task outputs, keyed by name.
///
/// Later writes to a key replace earlier ones. Nothing is removed during a
/// run.
#[derive(Debug, Clone, Default)]
pub struct ParameterBag {
    entries: BTreeMap<String, Payload>,
}

impl ParameterBag {
    pub fn new() -> Self {
        Self::default()
    }

    /// A bag holding only the run configuration.
    pub fn seeded(config: Arc<Config>) -> Self {
        let mut bag = Self::new();
        bag.insert(CONFIG_KEY, Payload::Config(config));
        bag
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Payload) -> Option<Payload> {
        self.entries.insert(key.into(), value)
    }

    /// Merges task outputs, overwriting existing keys.
    pub fn merge(&mut self, outputs: Outputs) {
        self.entries.extend(outputs);
    }

    pub fn get(&self, key: &str) -> Option<&Payload> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Payload)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    fn typed<T>(
        &self,
        key: &str,
        expected: &'static str,
        extract: impl FnOnce(&Payload) -> Option<T>,
    ) -> Result<Option<T>, TaskError> {
        match self.entries.get(key) {
            None => Ok(None),
            Some(payload) => extract(payload).map(Some).ok_or_else(|| TaskError::InputType {
                key: key.to_string(),
                expected,
                found: payload.kind(),
            }),
        }
    }

    fn required<T>(&self, key: &str, value: Option<T>) -> Result<T, TaskError> {
        value.ok_or_else(|| TaskError::MissingInput {
            key: key.to_string(),
        })
    }

    /// The seeded run configuration.
    pub fn config(&self) -> Result<Arc<Config>, TaskError> {
        let config = self.typed(CONFIG_KEY, "config", |p| match p {
            Payload::Config(c) => Some(Arc::clone(c)),
            _ => None,
        })?;
        self.required(CONFIG_KEY, config)
    }

    pub fn table(&self, key: &str) -> Result<Option<Table>, TaskError> {
        self.typed(key, "table", |p| match p {
            Payload::Table(t) => Some(t.clone()),
            _ => None,
        })
    }

    pub fn require_table(&self, key: &str) -> Result<Table, TaskError> {
        let table = self.table(key)?;
        self.required(key, table)
    }

    pub fn train_data(&self, key: &str) -> Result<Option<TrainData>, TaskError> {
        self.typed(key, "train data", |p| match p {
            Payload::TrainData(d) => Some(d.clone()),
            _ => None,
        })
    }

    pub fn model(&self, key: &str) -> Result<Option<FittedModel>, TaskError> {
        self.typed(key, "model", |p| match p {
            Payload::Model(m) => Some(m.clone()),
            _ => None,
        })
    }

    pub fn dict(&self, key: &str) -> Result<Option<serde_json::Value>, TaskError> {
        self.typed(key, "dict", |p| match p {
            Payload::Dict(d) => Some(d.clone()),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Column;
    use serde_json::json;

    fn table() -> Table {
        Table::from_columns(vec![Column::float("x", vec![Some(1.0)])]).unwrap()
    }

    #[test]
    fn test_seeded_bag_holds_config() {
        let bag = ParameterBag::seeded(Arc::new(Config::default()));
        assert_eq!(bag.keys().collect::<Vec<_>>(), vec![CONFIG_KEY]);
        assert!(bag.config().is_ok());
    }

    #[test]
    fn test_merge_overwrites() {
        let mut bag = ParameterBag::new();
        bag.insert("x", Payload::Dict(json!(1)));

        let mut outputs = Outputs::new();
        outputs.insert("x".to_string(), Payload::Dict(json!(2)));
        outputs.insert("y".to_string(), Payload::Table(table()));
        bag.merge(outputs);

        assert_eq!(bag.len(), 2);
        assert_eq!(bag.dict("x").unwrap(), Some(json!(2)));
    }

    #[test]
    fn test_missing_and_wrong_kind() {
        let mut bag = ParameterBag::new();
        assert!(matches!(
            bag.config().unwrap_err(),
            TaskError::MissingInput { ref key } if key == CONFIG_KEY
        ));
        assert_eq!(bag.table("absent").unwrap(), None);

        bag.insert("feature_data", Payload::Dict(json!({})));
        let err = bag.require_table("feature_data").unwrap_err();
        assert!(matches!(
            err,
            TaskError::InputType { expected: "table", found: "dict", .. }
        ));
    }

    #[test]
    fn test_table_is_returned_unchanged() {
        let mut bag = ParameterBag::new();
        bag.insert("table", table().into());
        assert_eq!(bag.require_table("table").unwrap(), table());
    }
}
