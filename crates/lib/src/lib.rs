pub mod config;
pub mod importer;
pub mod providers;
pub mod writer;

pub use config::ImporterConfig;
pub use importer::{ABORT_MARKER, EntityImporter};
pub use providers::{DataProvider, ProviderFactory, ProviderResources};
pub use writer::SqlFileWriter;
