use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::info;

use crate::config::Config;
use crate::error::TaskError;
use crate::pipeline::{FromBag, Outputs, ParameterBag, Payload, Task};
use crate::storage::schema::{
    F_X1_TRANSACTION_DATE, F_X2_HOUSE_AGE, F_X3_DISTANCE_TO_NEAREST_STATION,
    F_X4_NUMBER_OF_CONVENIENCE_STORES, F_X5_LATITUDE, F_X6_LONGITUDE, F_Y_HOUSE_PRICE_OF_UNIT_AREA,
};
use crate::storage::table::ISO_DATE;
use crate::storage::{read_table, write_table, Table, DUMMY_DATA};
use crate::tasks::{processed_location, raw_location};

const DUMMY_DATA_KEY: &str = "dummy_data";

/// Normalized raw headers and the schema names they map to.
const COLUMN_MAPPING: &[(&str, &str)] = &[
    ("x1_transaction_date", F_X1_TRANSACTION_DATE),
    ("x2_house_age", F_X2_HOUSE_AGE),
    ("x3_distance_to_the_nearest_mrt_station", F_X3_DISTANCE_TO_NEAREST_STATION),
    ("x4_number_of_convenience_stores", F_X4_NUMBER_OF_CONVENIENCE_STORES),
    ("x5_latitude", F_X5_LATITUDE),
    ("x6_longitude", F_X6_LONGITUDE),
    ("y_house_price_of_unit_area", F_Y_HOUSE_PRICE_OF_UNIT_AREA),
];

/// Loads the raw real-estate table, conforms it to [`DUMMY_DATA`] and
/// writes it to the processed area.
#[derive(Debug)]
pub struct ProcessDummyData {
    config: Arc<Config>,
}

impl ProcessDummyData {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    fn rename_columns(table: &mut Table) -> Result<(), TaskError> {
        let mapping: BTreeMap<String, String> = COLUMN_MAPPING
            .iter()
            .map(|(from, to)| (from.to_string(), to.to_string()))
            .collect();
        table.rename(&mapping)?;
        Ok(())
    }
}

impl Task for ProcessDummyData {
    type Inputs = Table;
    type Output = Table;

    fn name(&self) -> &str {
        Self::NAME
    }

    fn load_inputs(&mut self) -> Result<Table, TaskError> {
        info!("Loading raw data table");
        let location = raw_location(&self.config, self.config.data.raw().table(DUMMY_DATA_KEY)?)?;
        Ok(read_table(&location)?)
    }

    fn process(&mut self, mut table: Table) -> Result<Table, TaskError> {
        info!("Renaming columns to match the designated schema");
        Self::rename_columns(&mut table)?;

        info!("Parsing transaction dates");
        table.parse_dates(F_X1_TRANSACTION_DATE, ISO_DATE)?;

        info!(schema = DUMMY_DATA.label, "Applying schema to processed data");
        Ok(DUMMY_DATA.apply(table)?)
    }

    fn save_results(&mut self, table: &Table) -> Result<(), TaskError> {
        info!("Writing dummy table to file");
        let location = processed_location(
            &self.config,
            self.config.data.processed().table(DUMMY_DATA_KEY)?,
        )?;
        write_table(&location, table)?;
        Ok(())
    }

    fn into_outputs(self, table: Table) -> Outputs {
        let mut outputs = Outputs::new();
        outputs.insert(DUMMY_DATA_KEY.to_string(), Payload::Table(table));
        outputs
    }
}

impl FromBag for ProcessDummyData {
    const NAME: &'static str = "process_dummy_data";

    fn from_bag(bag: &ParameterBag) -> Result<Self, TaskError> {
        Ok(Self::new(bag.config()?))
    }
}
