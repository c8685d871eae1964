use std::path::PathBuf;

use clap::Parser;
use sqlseed_lib_core::dialects::{DialectKind, dialect_readout};
use sqlseed_lib_core::errors::{GenerateError, Result};

#[derive(Debug, Parser)]
#[command(name = "sqlseed")]
#[command(about = "sqlseed generates SQL data scripts from an entity model", long_about = None, version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Output file and/or data folder, in either order; the argument naming
    /// an existing directory is taken as the data folder.
    #[arg(value_name = "PATH")]
    pub paths: Vec<PathBuf>,
    /// Path to a configuration file.
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Override the dialect (e.g. h2, postgres, mysql, oracle).
    #[arg(long)]
    pub dialect: Option<String>,
}

impl Cli {
    /// Turns the command line into configuration overrides, disambiguating
    /// the positional arguments by whether they denote existing directories.
    pub fn config_overrides(&self) -> Result<Vec<(String, String)>> {
        let mut overrides = Vec::new();

        if let Some(dialect) = &self.dialect {
            dialect.parse::<DialectKind>().map_err(|_| {
                GenerateError::model(format!(
                    "unknown dialect {dialect}; available: {}",
                    dialect_readout().join(", ")
                ))
            })?;
            overrides.push(("dialect".to_owned(), dialect.clone()));
        }

        if self.paths.len() > 2 {
            return Err(GenerateError::model(
                "expected at most two positional arguments: [output-file] [data-folder]".to_owned(),
            ));
        }
        let mut output_file = None;
        let mut data_folder = None;
        for path in &self.paths {
            let slot = if path.is_dir() {
                &mut data_folder
            } else {
                &mut output_file
            };
            if slot.replace(path).is_some() {
                return Err(GenerateError::model(
                    "expected at most one output file and one data folder".to_owned(),
                ));
            }
        }
        if let Some(path) = output_file {
            overrides.push(("output-file".to_owned(), path.display().to_string()));
        }
        if let Some(path) = data_folder {
            overrides.push(("data-folder".to_owned(), path.display().to_string()));
        }

        Ok(overrides)
    }
}
