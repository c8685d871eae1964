use super::{DialectKind, SqlDialect};
use crate::errors::Result;
use crate::schema::IdentifierFolding;

/// H2 in its default (regular) mode. The default dialect.
#[derive(Debug, Clone, Copy)]
pub struct H2Dialect;

impl SqlDialect for H2Dialect {
    fn kind(&self) -> DialectKind {
        DialectKind::H2
    }

    fn folding(&self) -> IdentifierFolding {
        IdentifierFolding::Upper
    }

    fn supports_sequences(&self) -> bool {
        true
    }

    fn next_sequence_value(&self, sequence: &str) -> Result<String> {
        Ok(format!("NEXT VALUE FOR {sequence}"))
    }

    fn current_sequence_value(&self, sequence: &str) -> Result<String> {
        Ok(format!("CURRENT VALUE FOR {sequence}"))
    }

    fn restart_sequence(&self, sequence: &str, value: i64) -> Result<String> {
        Ok(format!("ALTER SEQUENCE {sequence} RESTART WITH {value}"))
    }

    fn identity_current_value(&self, _table: &str) -> Result<String> {
        Ok("IDENTITY()".to_owned())
    }
}
