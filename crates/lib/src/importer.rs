use std::path::{Path, PathBuf};

use log::{debug, info};
use sqlseed_lib_core::context::GeneratorContext;
use sqlseed_lib_core::dialects::kind_to_dialect;
use sqlseed_lib_core::errors::{GenerateError, Result};
use sqlseed_lib_core::generator::EntitySqlGenerator;
use sqlseed_lib_core::model::metadata::EntityModel;
use sqlseed_lib_core::writer::StatementsWriter;

use crate::config::ImporterConfig;
use crate::providers::{ProviderFactory, instantiate_providers};
use crate::writer::SqlFileWriter;

/// Marker comment closing a script whose generation failed part-way; tools
/// downstream detect truncated output by looking for it.
pub const ABORT_MARKER: &str = "!!! GENERATION ABORTED !!!";

/// Binds configuration, entity model and providers into one run that writes
/// a complete SQL script (or streams statements to any writer).
pub struct EntityImporter {
    config: ImporterConfig,
    model: EntityModel,
    factories: Vec<ProviderFactory>,
}

impl EntityImporter {
    pub fn new(config: ImporterConfig, model: EntityModel) -> Self {
        EntityImporter {
            config,
            model,
            factories: Vec::new(),
        }
    }

    pub fn config(&self) -> &ImporterConfig {
        &self.config
    }

    pub fn add_provider(&mut self, factory: ProviderFactory) -> &mut Self {
        self.factories.push(factory);
        self
    }

    /// Runs the import into the configured output file.
    pub fn import_to_file(&mut self) -> Result<PathBuf> {
        let path = self.config.output_file.clone();
        let dialect = kind_to_dialect(self.config.dialect);
        let mut writer = SqlFileWriter::create(&path, dialect.as_ref())?;
        let result = self.import(&mut writer);
        writer.finish()?;
        result?;
        info!("wrote {}", path.display());
        Ok(path)
    }

    /// Runs the import against an arbitrary writer. On failure the abort
    /// marker and the error are appended (as far as the writer still accepts
    /// output) and the error is re-raised.
    pub fn import(&mut self, writer: &mut dyn StatementsWriter) -> Result<()> {
        match self.run(writer) {
            Ok(()) => Ok(()),
            Err(error) => {
                let _ = write_abort(writer, &error);
                Err(error)
            }
        }
    }

    fn run(&mut self, writer: &mut dyn StatementsWriter) -> Result<()> {
        let ctx = GeneratorContext::new(
            self.model.clone(),
            kind_to_dialect(self.config.dialect),
            self.config.generator_settings(),
        );

        writer.write_comment(&format!(
            "Generated by sqlseed {}",
            env!("CARGO_PKG_VERSION")
        ))?;
        writer.write_comment(&format!("Dialect: {}", self.config.dialect.name()))?;

        if let Some(prefix) = self.config.prefix.clone() {
            self.write_affix(writer, "prefix", &prefix)?;
        }

        let factories = std::mem::take(&mut self.factories);
        let providers =
            instantiate_providers(factories, self.config.data_folder.as_deref(), &self.config)?;

        for (name, provider) in &providers {
            debug!("building entities of provider {name}");
            provider.borrow_mut().build_entities()?;
        }

        let mut generator = EntitySqlGenerator::new(&ctx, &mut *writer);
        for (name, provider) in &providers {
            generator.writer().write_section_separator()?;
            generator
                .writer()
                .write_comment(&format!("Data for provider: {name}"))?;
            provider.borrow_mut().write_entities(&mut generator)?;
        }

        generator.flush()?;

        let alignment = ctx.alignment_statements()?;
        if !alignment.is_empty() {
            generator.writer().write_section_separator()?;
            generator
                .writer()
                .write_comment("Realign generated identifiers")?;
            generator.write_alignment_statements()?;
        }
        drop(generator);

        if let Some(postfix) = self.config.postfix.clone() {
            writer.write_section_separator()?;
            self.write_affix(writer, "postfix", &postfix)?;
        }

        Ok(())
    }

    /// A prefix/postfix value is either a `;`/newline separated list of
    /// `.sql` files (inlined, each preceded by a comment naming it) or a
    /// literal SQL fragment written verbatim.
    fn write_affix(
        &self,
        writer: &mut dyn StatementsWriter,
        label: &str,
        value: &str,
    ) -> Result<()> {
        let tokens: Vec<&str> = value
            .split([';', '\n'])
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .collect();
        let all_files = !tokens.is_empty() && tokens.iter().all(|token| token.ends_with(".sql"));

        if !all_files {
            writer.write_raw(value)?;
            if !value.ends_with('\n') {
                writer.write_raw("\n")?;
            }
            return Ok(());
        }

        for token in tokens {
            let path = self.resolve_affix_path(token);
            let contents = std::fs::read_to_string(&path).map_err(|error| {
                GenerateError::model(format!("{label} file {}: {error}", path.display()))
            })?;
            writer.write_comment(&format!("{label} from: {token}"))?;
            writer.write_raw(&contents)?;
            if !contents.ends_with('\n') {
                writer.write_raw("\n")?;
            }
        }
        Ok(())
    }

    /// Relative affix paths resolve against the data folder when one is set.
    fn resolve_affix_path(&self, token: &str) -> PathBuf {
        let path = Path::new(token);
        match &self.config.data_folder {
            Some(folder) if path.is_relative() => folder.join(path),
            _ => path.to_path_buf(),
        }
    }
}

/// Appends the abort block: separator, marker bracketed by empty comment
/// lines, the error chain, and a captured backtrace. Only this function
/// writes the marker.
fn write_abort(writer: &mut dyn StatementsWriter, error: &GenerateError) -> Result<()> {
    writer.write_section_separator()?;
    writer.write_comment("")?;
    writer.write_comment(ABORT_MARKER)?;
    writer.write_comment("")?;
    writer.write_comment(&format!("{error}"))?;
    let backtrace = std::backtrace::Backtrace::force_capture();
    writer.write_comment(&backtrace.to_string())?;
    Ok(())
}
