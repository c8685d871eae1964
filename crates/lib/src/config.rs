use std::path::{Path, PathBuf};

use configparser::ini::Ini;
use sqlseed_lib_core::context::GeneratorSettings;
use sqlseed_lib_core::dialects::{DialectKind, dialect_readout};
use sqlseed_lib_core::errors::{GenerateError, Result};
use sqlseed_lib_core::model::descriptor::UniquePropertyQuality;

pub const DEFAULT_OUTPUT_FILE: &str = "data.sql";

/// Importer configuration, resolved in layers: built-in defaults, then the
/// optional ini file, then `SQLSEED_*` environment variables, then explicit
/// overrides (usually the command line). Unknown keys are ignored; malformed
/// values are errors.
#[derive(Debug, Clone)]
pub struct ImporterConfig {
    pub dialect: DialectKind,
    pub data_folder: Option<PathBuf>,
    pub output_file: PathBuf,
    pub output_encoding: String,
    pub prefix: Option<String>,
    pub postfix: Option<String>,
    pub provider_packages: Vec<String>,
    pub max_unique_properties: usize,
    pub unique_property_quality: UniquePropertyQuality,
    pub write_relative_ids: bool,
    pub prefer_sequence_current_value: bool,
}

impl Default for ImporterConfig {
    fn default() -> Self {
        ImporterConfig {
            dialect: DialectKind::default(),
            data_folder: None,
            output_file: PathBuf::from(DEFAULT_OUTPUT_FILE),
            output_encoding: "UTF-8".to_owned(),
            prefix: None,
            postfix: None,
            provider_packages: Vec::new(),
            max_unique_properties: 1,
            unique_property_quality: UniquePropertyQuality::OnlyRequiredPrimitives,
            write_relative_ids: false,
            prefer_sequence_current_value: true,
        }
    }
}

impl ImporterConfig {
    pub fn load(
        file: Option<&Path>,
        overrides: impl IntoIterator<Item = (String, String)>,
    ) -> Result<Self> {
        let mut config = Self::default();
        if let Some(file) = file {
            config.apply_file(file)?;
        }
        config.apply_environment()?;
        for (key, value) in overrides {
            config.set(&key, &value)?;
        }
        Ok(config)
    }

    fn apply_file(&mut self, file: &Path) -> Result<()> {
        let mut ini = Ini::new();
        let sections = ini
            .load(file)
            .map_err(|message| GenerateError::model(format!("{}: {message}", file.display())))?;
        for (section, pairs) in &sections {
            if section != "sqlseed" && section != "default" {
                continue;
            }
            for (key, value) in pairs {
                if let Some(value) = value {
                    self.set(key, value)?;
                }
            }
        }
        Ok(())
    }

    fn apply_environment(&mut self) -> Result<()> {
        for (key, value) in std::env::vars() {
            if let Some(rest) = key.strip_prefix("SQLSEED_") {
                let key = rest.to_lowercase().replace('_', "-");
                self.set(&key, &value)?;
            }
        }
        Ok(())
    }

    /// Applies one key/value pair. Keys accept both `kebab-case` and
    /// `snake_case` spellings.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key.replace('_', "-").as_str() {
            "dialect" => {
                self.dialect = value.parse().map_err(|_| {
                    GenerateError::model(format!(
                        "unknown dialect {value}; available: {}",
                        dialect_readout().join(", ")
                    ))
                })?;
            }
            "data-folder" => self.data_folder = Some(PathBuf::from(value)),
            "output-file" => self.output_file = PathBuf::from(value),
            "output-encoding" => {
                let accepted = ["utf-8", "utf8", "us-ascii", "ascii"];
                if !accepted.contains(&value.to_lowercase().as_str()) {
                    return Err(GenerateError::model(format!(
                        "unsupported output encoding {value}"
                    )));
                }
                self.output_encoding = value.to_owned();
            }
            "prefix" => self.prefix = Some(value.to_owned()),
            "postfix" => self.postfix = Some(value.to_owned()),
            "provider-packages" => {
                self.provider_packages = value
                    .split([';', ','])
                    .map(str::trim)
                    .filter(|root| !root.is_empty())
                    .map(str::to_owned)
                    .collect();
            }
            "max-unique-properties" => {
                self.max_unique_properties = value.parse().map_err(|_| {
                    GenerateError::model(format!("max-unique-properties: {value} is not a number"))
                })?;
            }
            "unique-property-quality" => {
                self.unique_property_quality = value.parse().map_err(|_| {
                    GenerateError::model(format!("unknown unique-property-quality {value}"))
                })?;
            }
            "write-relative-ids" => self.write_relative_ids = parse_bool(key, value)?,
            "prefer-sequence-current-value" => {
                self.prefer_sequence_current_value = parse_bool(key, value)?;
            }
            _ => {}
        }
        Ok(())
    }

    pub fn generator_settings(&self) -> GeneratorSettings {
        GeneratorSettings {
            max_unique_properties: self.max_unique_properties,
            unique_property_quality: self.unique_property_quality,
            relative_ids: self.write_relative_ids,
            prefer_sequence_current_value: self.prefer_sequence_current_value,
        }
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.to_lowercase().as_str() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(GenerateError::model(format!(
            "{key}: {value} is not a boolean"
        ))),
    }
}
