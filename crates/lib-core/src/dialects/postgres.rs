use super::{DialectKind, SqlDialect};
use crate::errors::Result;
use crate::schema::IdentifierFolding;

#[derive(Debug, Clone, Copy)]
pub struct PostgresDialect;

impl SqlDialect for PostgresDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::Postgres
    }

    fn folding(&self) -> IdentifierFolding {
        IdentifierFolding::Lower
    }

    fn format_binary(&self, value: &[u8]) -> String {
        let mut hex = String::with_capacity(value.len() * 2);
        for byte in value {
            hex.push_str(&format!("{byte:02x}"));
        }
        format!("'\\x{hex}'")
    }

    fn supports_sequences(&self) -> bool {
        true
    }

    fn next_sequence_value(&self, sequence: &str) -> Result<String> {
        Ok(format!("nextval('{sequence}')"))
    }

    fn current_sequence_value(&self, sequence: &str) -> Result<String> {
        Ok(format!("currval('{sequence}')"))
    }

    fn restart_sequence(&self, sequence: &str, value: i64) -> Result<String> {
        Ok(format!("ALTER SEQUENCE {sequence} RESTART WITH {value}"))
    }

    fn identity_current_value(&self, _table: &str) -> Result<String> {
        Ok("lastval()".to_owned())
    }
}
