use enum_dispatch::enum_dispatch;
use smol_str::SmolStr;

use crate::dialects::SqlDialect;
use crate::errors::{GenerateError, Result};
use crate::instance::EntityKey;

/// Value bookkeeping shared by the tracking generators.
#[derive(Debug, Clone, Default)]
struct ValueTracker {
    next: i64,
    current: Option<i64>,
    current_entity: Option<EntityKey>,
}

impl ValueTracker {
    fn new(initial_value: i64) -> Self {
        ValueTracker {
            next: initial_value,
            current: None,
            current_entity: None,
        }
    }

    fn advance(&mut self, step: i64) -> i64 {
        let value = self.next;
        self.current = Some(value);
        self.next += step;
        value
    }
}

/// Contract of one identifier generator.
///
/// A generator hands out tracked values, renders the id expression of the row
/// being inserted and of later references, and knows how to realign the
/// database counter past the highest value it used.
#[enum_dispatch]
pub trait IdGeneratorOps {
    fn name(&self) -> &SmolStr;

    /// Identity values exist only after the row is inserted.
    fn is_post_insert(&self) -> bool {
        false
    }

    /// Whether this generator produces values at all (everything except
    /// caller-assigned identifiers).
    fn assigns_values(&self) -> bool {
        true
    }

    /// Emitted id expressions are concrete literals that remain valid when
    /// the script runs against the database.
    fn writes_literal_ids(&self) -> bool;

    fn next_value(&mut self) -> i64;

    fn current_value(&self) -> Option<i64>;

    /// Expression for the id column of the row being inserted; `None` means
    /// the column is omitted.
    fn insert_expression(&self, dialect: &dyn SqlDialect) -> Result<Option<String>>;

    /// Expression referencing the value most recently produced, when the
    /// database can still resolve it (`currval`, identity-current).
    fn current_value_expression(&self, dialect: &dyn SqlDialect) -> Result<Option<String>>;

    fn pre_insert_statements(&self, dialect: &dyn SqlDialect) -> Result<Vec<String>> {
        let _ = dialect;
        Ok(Vec::new())
    }

    /// Trailing statements advancing the database counter past the highest
    /// value used during generation.
    fn alignment_statements(&self, dialect: &dyn SqlDialect) -> Result<Vec<String>>;

    fn set_current_entity(&mut self, key: EntityKey);

    /// Whether `key` identifies the entity whose id this generator produced
    /// most recently.
    fn is_current_entity(&self, key: &EntityKey) -> bool;
}

#[enum_dispatch(IdGeneratorOps)]
#[derive(Debug)]
pub enum IdGenerator {
    Sequence(SequenceGenerator),
    Table(TableGenerator),
    Identity(IdentityGenerator),
    Assigned(AssignedGenerator),
}

#[derive(Debug)]
pub struct SequenceGenerator {
    name: SmolStr,
    sequence: SmolStr,
    allocation_size: i64,
    relative: bool,
    tracker: ValueTracker,
}

impl SequenceGenerator {
    pub fn new(
        name: impl Into<SmolStr>,
        sequence: impl Into<SmolStr>,
        initial_value: i64,
        allocation_size: i64,
        relative: bool,
    ) -> Self {
        SequenceGenerator {
            name: name.into(),
            sequence: sequence.into(),
            allocation_size,
            relative,
            tracker: ValueTracker::new(initial_value),
        }
    }
}

impl IdGeneratorOps for SequenceGenerator {
    fn name(&self) -> &SmolStr {
        &self.name
    }

    fn writes_literal_ids(&self) -> bool {
        !self.relative
    }

    fn next_value(&mut self) -> i64 {
        self.tracker.advance(self.allocation_size)
    }

    fn current_value(&self) -> Option<i64> {
        self.tracker.current
    }

    fn insert_expression(&self, dialect: &dyn SqlDialect) -> Result<Option<String>> {
        if self.relative {
            return dialect.next_sequence_value(&self.sequence).map(Some);
        }
        let current = self.tracker.current.ok_or_else(|| {
            GenerateError::model(format!("generator {} has produced no value", self.name))
        })?;
        Ok(Some(current.to_string()))
    }

    fn current_value_expression(&self, dialect: &dyn SqlDialect) -> Result<Option<String>> {
        if self.relative {
            return dialect.current_sequence_value(&self.sequence).map(Some);
        }
        Ok(None)
    }

    fn alignment_statements(&self, dialect: &dyn SqlDialect) -> Result<Vec<String>> {
        if self.relative || self.tracker.current.is_none() {
            return Ok(Vec::new());
        }
        Ok(vec![dialect.restart_sequence(&self.sequence, self.tracker.next)?])
    }

    fn set_current_entity(&mut self, key: EntityKey) {
        self.tracker.current_entity = Some(key);
    }

    fn is_current_entity(&self, key: &EntityKey) -> bool {
        self.tracker.current_entity.as_ref() == Some(key)
    }
}

#[derive(Debug)]
pub struct TableGenerator {
    name: SmolStr,
    table: SmolStr,
    pk_column: SmolStr,
    value_column: SmolStr,
    pk_value: SmolStr,
    relative: bool,
    tracker: ValueTracker,
}

impl TableGenerator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<SmolStr>,
        table: impl Into<SmolStr>,
        pk_column: impl Into<SmolStr>,
        value_column: impl Into<SmolStr>,
        pk_value: impl Into<SmolStr>,
        initial_value: i64,
        relative: bool,
    ) -> Self {
        TableGenerator {
            name: name.into(),
            table: table.into(),
            pk_column: pk_column.into(),
            value_column: value_column.into(),
            pk_value: pk_value.into(),
            relative,
            tracker: ValueTracker::new(initial_value),
        }
    }

    fn value_select(&self) -> String {
        format!(
            "(SELECT {} FROM {} WHERE {} = '{}')",
            self.value_column, self.table, self.pk_column, self.pk_value
        )
    }
}

impl IdGeneratorOps for TableGenerator {
    fn name(&self) -> &SmolStr {
        &self.name
    }

    fn writes_literal_ids(&self) -> bool {
        !self.relative
    }

    fn next_value(&mut self) -> i64 {
        self.tracker.advance(1)
    }

    fn current_value(&self) -> Option<i64> {
        self.tracker.current
    }

    fn insert_expression(&self, _dialect: &dyn SqlDialect) -> Result<Option<String>> {
        if self.relative {
            return Ok(Some(self.value_select()));
        }
        let current = self.tracker.current.ok_or_else(|| {
            GenerateError::model(format!("generator {} has produced no value", self.name))
        })?;
        Ok(Some(current.to_string()))
    }

    fn current_value_expression(&self, _dialect: &dyn SqlDialect) -> Result<Option<String>> {
        if self.relative {
            return Ok(Some(self.value_select()));
        }
        Ok(None)
    }

    fn pre_insert_statements(&self, _dialect: &dyn SqlDialect) -> Result<Vec<String>> {
        if !self.relative {
            return Ok(Vec::new());
        }
        Ok(vec![format!(
            "UPDATE {} SET {} = {} + 1 WHERE {} = '{}'",
            self.table, self.value_column, self.value_column, self.pk_column, self.pk_value
        )])
    }

    fn alignment_statements(&self, _dialect: &dyn SqlDialect) -> Result<Vec<String>> {
        if self.relative || self.tracker.current.is_none() {
            return Ok(Vec::new());
        }
        Ok(vec![format!(
            "UPDATE {} SET {} = {} WHERE {} = '{}'",
            self.table, self.value_column, self.tracker.next, self.pk_column, self.pk_value
        )])
    }

    fn set_current_entity(&mut self, key: EntityKey) {
        self.tracker.current_entity = Some(key);
    }

    fn is_current_entity(&self, key: &EntityKey) -> bool {
        self.tracker.current_entity.as_ref() == Some(key)
    }
}

/// Identity columns: the database assigns the value during the insert, so the
/// id column is omitted and references read the identity-current expression.
#[derive(Debug)]
pub struct IdentityGenerator {
    name: SmolStr,
    table: SmolStr,
    tracker: ValueTracker,
}

impl IdentityGenerator {
    pub fn new(name: impl Into<SmolStr>, table: impl Into<SmolStr>) -> Self {
        IdentityGenerator {
            name: name.into(),
            table: table.into(),
            tracker: ValueTracker::new(1),
        }
    }
}

impl IdGeneratorOps for IdentityGenerator {
    fn name(&self) -> &SmolStr {
        &self.name
    }

    fn is_post_insert(&self) -> bool {
        true
    }

    fn writes_literal_ids(&self) -> bool {
        false
    }

    fn next_value(&mut self) -> i64 {
        self.tracker.advance(1)
    }

    fn current_value(&self) -> Option<i64> {
        self.tracker.current
    }

    fn insert_expression(&self, _dialect: &dyn SqlDialect) -> Result<Option<String>> {
        Ok(None)
    }

    fn current_value_expression(&self, dialect: &dyn SqlDialect) -> Result<Option<String>> {
        dialect.identity_current_value(&self.table).map(Some)
    }

    fn alignment_statements(&self, _dialect: &dyn SqlDialect) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    fn set_current_entity(&mut self, key: EntityKey) {
        self.tracker.current_entity = Some(key);
    }

    fn is_current_entity(&self, key: &EntityKey) -> bool {
        self.tracker.current_entity.as_ref() == Some(key)
    }
}

/// Caller-assigned identifiers: no tracking, literals straight through.
#[derive(Debug)]
pub struct AssignedGenerator {
    name: SmolStr,
}

impl AssignedGenerator {
    pub fn new(name: impl Into<SmolStr>) -> Self {
        AssignedGenerator { name: name.into() }
    }
}

impl IdGeneratorOps for AssignedGenerator {
    fn name(&self) -> &SmolStr {
        &self.name
    }

    fn assigns_values(&self) -> bool {
        false
    }

    fn writes_literal_ids(&self) -> bool {
        true
    }

    fn next_value(&mut self) -> i64 {
        unreachable!("assigned generators never produce values")
    }

    fn current_value(&self) -> Option<i64> {
        None
    }

    fn insert_expression(&self, _dialect: &dyn SqlDialect) -> Result<Option<String>> {
        Ok(None)
    }

    fn current_value_expression(&self, _dialect: &dyn SqlDialect) -> Result<Option<String>> {
        Ok(None)
    }

    fn alignment_statements(&self, _dialect: &dyn SqlDialect) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    fn set_current_entity(&mut self, _key: EntityKey) {}

    fn is_current_entity(&self, _key: &EntityKey) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::{IdGeneratorOps, SequenceGenerator};
    use crate::dialects::{DialectKind, kind_to_dialect};

    #[test]
    fn absolute_sequence_hands_out_literals_and_aligns() {
        let dialect = kind_to_dialect(DialectKind::Postgres);
        let mut generator = SequenceGenerator::new("gen", "person_seq", 10, 5, false);

        assert_eq!(generator.next_value(), 10);
        assert_eq!(generator.next_value(), 15);
        assert_eq!(
            generator.insert_expression(dialect.as_ref()).unwrap(),
            Some("15".to_owned())
        );
        assert_eq!(
            generator.alignment_statements(dialect.as_ref()).unwrap(),
            vec!["ALTER SEQUENCE person_seq RESTART WITH 20".to_owned()]
        );
    }

    #[test]
    fn relative_sequence_defers_to_the_database() {
        let dialect = kind_to_dialect(DialectKind::Postgres);
        let mut generator = SequenceGenerator::new("gen", "person_seq", 1, 1, true);

        generator.next_value();
        assert_eq!(
            generator.insert_expression(dialect.as_ref()).unwrap(),
            Some("nextval('person_seq')".to_owned())
        );
        assert_eq!(
            generator
                .current_value_expression(dialect.as_ref())
                .unwrap(),
            Some("currval('person_seq')".to_owned())
        );
        assert!(
            generator
                .alignment_statements(dialect.as_ref())
                .unwrap()
                .is_empty()
        );
    }
}
