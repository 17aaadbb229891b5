pub mod layout;
pub mod schema;
pub mod store;

pub use layout::{list_experiments, ExperimentDir, ExperimentSetup};
pub use store::Store;
