use crate::errors::Result;

/// Banner line used by section separators.
pub const SECTION_BANNER: &str =
    "------------------------------------------------------------";

/// Sink for generated statements.
///
/// Two shapes exist: the buffered text writer in `sqlseed-lib` and anything
/// the embedding application supplies (a connected executor is just an
/// implementation that hands each statement to a live connection). Failures
/// surface as I/O errors; there is no partial retry at this layer.
pub trait StatementsWriter {
    /// Appends one statement; the implementation adds the terminator.
    fn write_statement(&mut self, sql: &str) -> Result<()>;

    /// Appends comment text; multi-line input becomes one comment per line.
    fn write_comment(&mut self, comment: &str) -> Result<()>;

    /// A blank line followed by a banner comment.
    fn write_section_separator(&mut self) -> Result<()>;

    /// Appends raw text verbatim (prefix/postfix file contents).
    fn write_raw(&mut self, text: &str) -> Result<()>;
}

/// In-memory writer used by tests and embedders that post-process the
/// script themselves.
#[derive(Debug, Default)]
pub struct CollectingWriter {
    statements: Vec<String>,
    text: String,
}

impl CollectingWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// The statements in emission order, without terminators.
    pub fn statements(&self) -> &[String] {
        &self.statements
    }

    /// The rendered script, as the file writer would produce it.
    pub fn text(&self) -> &str {
        &self.text
    }
}

impl StatementsWriter for CollectingWriter {
    fn write_statement(&mut self, sql: &str) -> Result<()> {
        self.statements.push(sql.to_owned());
        self.text.push_str(sql);
        self.text.push_str(";\n");
        Ok(())
    }

    fn write_comment(&mut self, comment: &str) -> Result<()> {
        for line in comment.lines() {
            self.text.push_str("-- ");
            self.text.push_str(line);
            self.text.push('\n');
        }
        if comment.is_empty() {
            self.text.push_str("--\n");
        }
        Ok(())
    }

    fn write_section_separator(&mut self) -> Result<()> {
        self.text.push('\n');
        self.write_comment(SECTION_BANNER)
    }

    fn write_raw(&mut self, text: &str) -> Result<()> {
        self.text.push_str(text);
        Ok(())
    }
}
