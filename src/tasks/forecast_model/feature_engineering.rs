use std::sync::Arc;

use tracing::info;

use crate::config::Config;
use crate::error::TaskError;
use crate::pipeline::{FromBag, Outputs, ParameterBag, Payload, Task};
use crate::storage::schema::{F_HAVERSINE_POINT, F_X5_LATITUDE, F_X6_LONGITUDE};
use crate::storage::{read_table_with_schema, write_table, Column, Table, DUMMY_DATA};
use crate::tasks::{output_location, processed_location};

pub(crate) const FEATURE_DATA_KEY: &str = "feature_data";

/// Earth's radius in kilometres.
const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance in km between `(lat, lng)` and `(0, 0)`.
pub fn single_point_haversine(lat: f64, lng: f64) -> f64 {
    let (lat, lng) = (lat.to_radians(), lng.to_radians());
    let a = (lat / 2.0).sin().powi(2) + lat.cos() * (lng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
}

/// Derives model features from the processed table.
#[derive(Debug)]
pub struct FeatureEngineering {
    config: Arc<Config>,
}

impl FeatureEngineering {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }
}

impl Task for FeatureEngineering {
    type Inputs = Table;
    type Output = Table;

    fn name(&self) -> &str {
        Self::NAME
    }

    fn load_inputs(&mut self) -> Result<Table, TaskError> {
        info!("Loading processed data table");
        let location = processed_location(
            &self.config,
            self.config.data.processed().table("dummy_data")?,
        )?;
        Ok(read_table_with_schema(&location, &DUMMY_DATA)?)
    }

    fn process(&mut self, mut table: Table) -> Result<Table, TaskError> {
        info!("Adding feature: haversine point combines lat and lng");
        let latitudes = table.float_values(F_X5_LATITUDE)?;
        let longitudes = table.float_values(F_X6_LONGITUDE)?;
        let distances = latitudes
            .iter()
            .zip(&longitudes)
            .map(|(lat, lng)| Some(single_point_haversine((*lat)?, (*lng)?)))
            .collect();
        table.set_column(Column::float(F_HAVERSINE_POINT, distances))?;
        Ok(table)
    }

    fn save_results(&mut self, table: &Table) -> Result<(), TaskError> {
        info!("Writing feature table to file");
        let location =
            output_location(&self.config, self.config.data.output().table(FEATURE_DATA_KEY)?)?;
        write_table(&location, table)?;
        Ok(())
    }

    fn into_outputs(self, table: Table) -> Outputs {
        let mut outputs = Outputs::new();
        outputs.insert(FEATURE_DATA_KEY.to_string(), Payload::Table(table));
        outputs
    }
}

impl FromBag for FeatureEngineering {
    const NAME: &'static str = "feature_engineering";

    fn from_bag(bag: &ParameterBag) -> Result<Self, TaskError> {
        Ok(Self::new(bag.config()?))
    }
}
