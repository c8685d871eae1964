use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use sqlseed_lib_core::dialects::SqlDialect;
use sqlseed_lib_core::errors::Result;
use sqlseed_lib_core::writer::{SECTION_BANNER, StatementsWriter};

/// Buffered text-file writer: one terminated statement per line, comments in
/// the dialect's comment syntax, separators as blank line plus banner.
pub struct SqlFileWriter {
    out: BufWriter<File>,
    terminator: &'static str,
    comment_prefix: &'static str,
}

impl SqlFileWriter {
    pub fn create(path: &Path, dialect: &dyn SqlDialect) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Ok(SqlFileWriter {
            out: BufWriter::new(File::create(path)?),
            terminator: dialect.terminator(),
            comment_prefix: dialect.comment_prefix(),
        })
    }

    /// Flushes and closes the file.
    pub fn finish(mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }
}

impl StatementsWriter for SqlFileWriter {
    fn write_statement(&mut self, sql: &str) -> Result<()> {
        writeln!(self.out, "{sql}{}", self.terminator)?;
        Ok(())
    }

    fn write_comment(&mut self, comment: &str) -> Result<()> {
        if comment.is_empty() {
            writeln!(self.out, "{}", self.comment_prefix.trim_end())?;
            return Ok(());
        }
        for line in comment.lines() {
            writeln!(self.out, "{}{line}", self.comment_prefix)?;
        }
        Ok(())
    }

    fn write_section_separator(&mut self) -> Result<()> {
        writeln!(self.out)?;
        self.write_comment(SECTION_BANNER)
    }

    fn write_raw(&mut self, text: &str) -> Result<()> {
        self.out.write_all(text.as_bytes())?;
        Ok(())
    }
}
