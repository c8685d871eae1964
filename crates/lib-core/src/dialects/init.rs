use strum::IntoEnumIterator;
use strum_macros::AsRefStr;

use super::SqlDialect;
use super::h2::H2Dialect;
use super::mysql::MysqlDialect;
use super::oracle::OracleDialect;
use super::postgres::PostgresDialect;

#[derive(
    strum_macros::EnumString,
    strum_macros::EnumIter,
    AsRefStr,
    Debug,
    Clone,
    Copy,
    Default,
    Ord,
    PartialOrd,
    Eq,
    PartialEq,
    Hash,
)]
#[strum(serialize_all = "snake_case")]
pub enum DialectKind {
    #[default]
    H2,
    Mysql,
    Oracle,
    Postgres,
}

impl DialectKind {
    /// Returns the human-readable name of the dialect.
    pub fn name(&self) -> &'static str {
        match self {
            DialectKind::H2 => "h2",
            DialectKind::Mysql => "mysql",
            DialectKind::Oracle => "oracle",
            DialectKind::Postgres => "postgres",
        }
    }
}

pub fn kind_to_dialect(kind: DialectKind) -> Box<dyn SqlDialect> {
    match kind {
        DialectKind::H2 => Box::new(H2Dialect),
        DialectKind::Mysql => Box::new(MysqlDialect),
        DialectKind::Oracle => Box::new(OracleDialect),
        DialectKind::Postgres => Box::new(PostgresDialect),
    }
}

/// Generate a readout of available dialects.
pub fn dialect_readout() -> Vec<String> {
    DialectKind::iter()
        .map(|x| x.as_ref().to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    #[test]
    fn dialect_readout_is_alphabetically_sorted() {
        let readout = super::dialect_readout();

        let mut sorted = readout.clone();
        sorted.sort();

        assert_eq!(readout, sorted);
    }
}
