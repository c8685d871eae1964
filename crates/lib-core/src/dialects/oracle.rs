use super::{DialectKind, SqlDialect};
use crate::errors::Result;
use crate::schema::IdentifierFolding;

#[derive(Debug, Clone, Copy)]
pub struct OracleDialect;

impl SqlDialect for OracleDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::Oracle
    }

    fn folding(&self) -> IdentifierFolding {
        IdentifierFolding::Upper
    }

    // No boolean column type; NUMBER(1) is the convention.
    fn format_boolean(&self, value: bool) -> String {
        (if value { "1" } else { "0" }).to_owned()
    }

    fn max_string_length(&self) -> usize {
        4000
    }

    fn supports_sequences(&self) -> bool {
        true
    }

    fn supports_identity(&self) -> bool {
        false
    }

    fn next_sequence_value(&self, sequence: &str) -> Result<String> {
        Ok(format!("{sequence}.NEXTVAL"))
    }

    fn current_sequence_value(&self, sequence: &str) -> Result<String> {
        Ok(format!("{sequence}.CURRVAL"))
    }

    fn restart_sequence(&self, sequence: &str, value: i64) -> Result<String> {
        Ok(format!("ALTER SEQUENCE {sequence} RESTART START WITH {value}"))
    }
}
