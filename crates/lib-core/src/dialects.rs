use chrono::{NaiveDate, NaiveDateTime};

use crate::errors::{GenerateError, Result};
use crate::schema::IdentifierFolding;
use crate::value::Value;

pub mod h2;
pub mod init;
pub mod mysql;
pub mod oracle;
pub mod postgres;

pub use init::{DialectKind, dialect_readout, kind_to_dialect};

/// Target-database adapter.
///
/// All literal and identifier text flows through this trait so that the rest
/// of the generator stays free of per-database conditionals.
pub trait SqlDialect {
    fn kind(&self) -> DialectKind;

    /// Folding rule used when identifiers are compared.
    fn folding(&self) -> IdentifierFolding {
        IdentifierFolding::Preserve
    }

    fn quote_identifier(&self, identifier: &str) -> String {
        format!("\"{}\"", identifier.replace('"', "\"\""))
    }

    fn format_boolean(&self, value: bool) -> String {
        (if value { "true" } else { "false" }).to_owned()
    }

    fn format_string(&self, value: &str) -> String {
        format!("'{}'", value.replace('\'', "''"))
    }

    fn format_date(&self, value: NaiveDate) -> String {
        format!("DATE '{}'", value.format("%Y-%m-%d"))
    }

    fn format_timestamp(&self, value: NaiveDateTime) -> String {
        format!("TIMESTAMP '{}'", value.format("%Y-%m-%d %H:%M:%S%.f"))
    }

    fn format_binary(&self, value: &[u8]) -> String {
        let mut hex = String::with_capacity(value.len() * 2);
        for byte in value {
            hex.push_str(&format!("{byte:02X}"));
        }
        format!("X'{hex}'")
    }

    /// Formats one attribute value as a literal. Association values are not
    /// literals; asking for one is a caller bug surfaced as a model error.
    fn format_value(&self, value: &Value) -> Result<String> {
        Ok(match value {
            Value::Null => "null".to_owned(),
            Value::Bool(v) => self.format_boolean(*v),
            Value::Int(v) => v.to_string(),
            Value::Float(v) => v.to_string(),
            Value::Decimal(v) => v.clone(),
            Value::Str(v) => self.format_string(v),
            Value::Bytes(v) => self.format_binary(v),
            Value::Date(v) => self.format_date(*v),
            Value::Timestamp(v) => self.format_timestamp(*v),
            Value::Entity(_) | Value::List(_) | Value::PairList(_) => {
                return Err(GenerateError::model(format!(
                    "{value:?} is not a column literal"
                )));
            }
        })
    }

    fn supports_sequences(&self) -> bool;

    fn supports_identity(&self) -> bool {
        true
    }

    /// Whether rows of JOINED hierarchies need an explicit discriminator.
    fn needs_joined_discriminator(&self) -> bool {
        false
    }

    fn max_string_length(&self) -> usize {
        255
    }

    /// Expression that advances the sequence and yields the new value.
    fn next_sequence_value(&self, sequence: &str) -> Result<String> {
        let _ = sequence;
        Err(GenerateError::dialect(format!(
            "{} does not support sequences",
            self.kind().as_ref()
        )))
    }

    /// Expression yielding the value most recently produced by the sequence.
    fn current_sequence_value(&self, sequence: &str) -> Result<String> {
        let _ = sequence;
        Err(GenerateError::dialect(format!(
            "{} does not support sequences",
            self.kind().as_ref()
        )))
    }

    /// Statement advancing the sequence past `value` (alignment).
    fn restart_sequence(&self, sequence: &str, value: i64) -> Result<String> {
        let _ = (sequence, value);
        Err(GenerateError::dialect(format!(
            "{} does not support sequences",
            self.kind().as_ref()
        )))
    }

    /// Expression yielding the identity value of the most recent insert.
    fn identity_current_value(&self, table: &str) -> Result<String> {
        let _ = table;
        Err(GenerateError::dialect(format!(
            "{} does not support identity columns",
            self.kind().as_ref()
        )))
    }

    fn terminator(&self) -> &'static str {
        ";"
    }

    fn comment_prefix(&self) -> &'static str {
        "-- "
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::{DialectKind, kind_to_dialect};
    use crate::value::Value;

    #[test]
    fn string_quotes_are_doubled() {
        let dialect = kind_to_dialect(DialectKind::H2);
        assert_eq!(dialect.format_string("it's"), "'it''s'");
    }

    #[test]
    fn association_values_are_not_literals() {
        let dialect = kind_to_dialect(DialectKind::H2);
        assert!(dialect.format_value(&Value::List(vec![])).is_err());
    }

    #[test]
    fn temporal_literals_follow_the_dialect() {
        let date = chrono::NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        let stamp = date.and_hms_opt(13, 30, 5).unwrap();

        let h2 = kind_to_dialect(DialectKind::H2);
        assert_eq!(h2.format_date(date), "DATE '2024-02-29'");
        assert_eq!(
            h2.format_timestamp(stamp),
            "TIMESTAMP '2024-02-29 13:30:05'"
        );

        let mysql = kind_to_dialect(DialectKind::Mysql);
        assert_eq!(mysql.format_date(date), "'2024-02-29'");
    }

    #[test]
    fn binary_renders_as_hex() {
        let dialect = kind_to_dialect(DialectKind::H2);
        assert_eq!(
            dialect
                .format_value(&Value::Bytes(vec![0xDE, 0xAD]))
                .unwrap(),
            "X'DEAD'"
        );
    }
}
