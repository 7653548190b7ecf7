pub mod loader;
pub mod schema;

pub use loader::{DataLoadError, FactoryData, load_factory_data};
