use super::{DialectKind, SqlDialect};
use crate::errors::Result;

#[derive(Debug, Clone, Copy)]
pub struct MysqlDialect;

impl SqlDialect for MysqlDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::Mysql
    }

    fn quote_identifier(&self, identifier: &str) -> String {
        format!("`{}`", identifier.replace('`', "``"))
    }

    // Backslash is an escape character unless NO_BACKSLASH_ESCAPES is set.
    fn format_string(&self, value: &str) -> String {
        format!(
            "'{}'",
            value.replace('\\', "\\\\").replace('\'', "''")
        )
    }

    fn format_date(&self, value: chrono::NaiveDate) -> String {
        format!("'{}'", value.format("%Y-%m-%d"))
    }

    fn format_timestamp(&self, value: chrono::NaiveDateTime) -> String {
        format!("'{}'", value.format("%Y-%m-%d %H:%M:%S%.f"))
    }

    fn supports_sequences(&self) -> bool {
        false
    }

    fn identity_current_value(&self, _table: &str) -> Result<String> {
        Ok("last_insert_id()".to_owned())
    }
}
