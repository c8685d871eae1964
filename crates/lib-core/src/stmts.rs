use smol_str::SmolStr;

use crate::helpers::IndexMap;
use crate::schema::{ColumnRef, TableRef};

/// One INSERT under construction: an ordered map from column name to the SQL
/// expression that fills it. Insertion order is the column order of the
/// emitted statement, which keeps output deterministic.
#[derive(Debug)]
pub struct InsertStatement {
    table: TableRef,
    values: IndexMap<SmolStr, String>,
}

impl InsertStatement {
    pub fn new(table: TableRef) -> Self {
        InsertStatement {
            table,
            values: IndexMap::default(),
        }
    }

    pub fn table(&self) -> &TableRef {
        &self.table
    }

    pub fn set(&mut self, column: &ColumnRef, expression: impl Into<String>) {
        self.values
            .insert(SmolStr::new(column.name()), expression.into());
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn to_sql(&self) -> String {
        if self.values.is_empty() {
            return format!("INSERT INTO {} DEFAULT VALUES", self.table.name());
        }

        let columns = self.values.keys().map(SmolStr::as_str).collect::<Vec<_>>();
        let expressions = self.values.values().map(String::as_str).collect::<Vec<_>>();
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.table.name(),
            columns.join(", "),
            expressions.join(", ")
        )
    }
}

/// One UPDATE under construction; used for deferred reference resolution.
#[derive(Debug)]
pub struct UpdateStatement {
    table: TableRef,
    values: IndexMap<SmolStr, String>,
    conditions: Vec<String>,
}

impl UpdateStatement {
    pub fn new(table: TableRef) -> Self {
        UpdateStatement {
            table,
            values: IndexMap::default(),
            conditions: Vec::new(),
        }
    }

    pub fn set(&mut self, column: &ColumnRef, expression: impl Into<String>) {
        self.values
            .insert(SmolStr::new(column.name()), expression.into());
    }

    pub fn set_raw(&mut self, column: &str, expression: impl Into<String>) {
        self.values.insert(SmolStr::new(column), expression.into());
    }

    pub fn add_condition(&mut self, predicate: impl Into<String>) {
        self.conditions.push(predicate.into());
    }

    pub fn to_sql(&self) -> String {
        let assignments = self
            .values
            .iter()
            .map(|(column, expression)| format!("{column} = {expression}"))
            .collect::<Vec<_>>();
        format!(
            "UPDATE {} SET {} WHERE {}",
            self.table.name(),
            assignments.join(", "),
            self.conditions.join(" AND ")
        )
    }
}
