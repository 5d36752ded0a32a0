//! Tasks of the `data_processing` pipeline.

mod process_dummy_data;

pub use process_dummy_data::ProcessDummyData;
