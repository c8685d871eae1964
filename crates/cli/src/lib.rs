use std::ffi::OsString;

use clap::Parser as _;
use sqlseed_lib::providers::ProviderFactory;
use sqlseed_lib::{EntityImporter, ImporterConfig};
use sqlseed_lib_core::errors::Result;
use sqlseed_lib_core::model::metadata::EntityModel;

use crate::commands::Cli;

pub mod commands;
mod logger;

/// Entry point of the shipped binary: an importer over an empty model, which
/// still exercises configuration, prefix/postfix and the output pipeline.
/// Applications embed this crate and call [`run_with_model`] with their
/// registered entity model and providers.
pub fn run_with_args<I, T>(args: I) -> i32
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    run_with_model(args, EntityModel::new(), Vec::new())
}

pub fn run_with_model<I, T>(args: I, model: EntityModel, providers: Vec<ProviderFactory>) -> i32
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let _ = logger::init();
    let cli = Cli::parse_from(args);

    match run(cli, model, providers) {
        Ok(()) => 0,
        Err(error) => {
            eprintln!("{error}");
            1
        }
    }
}

fn run(cli: Cli, model: EntityModel, providers: Vec<ProviderFactory>) -> Result<()> {
    let overrides = cli.config_overrides()?;
    let config = ImporterConfig::load(cli.config.as_deref(), overrides)?;

    let mut importer = EntityImporter::new(config, model);
    for provider in providers {
        importer.add_provider(provider);
    }
    importer.import_to_file()?;
    Ok(())
}
