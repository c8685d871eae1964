use smol_str::SmolStr;

use crate::context::GeneratorContext;
use crate::errors::{GenerateError, Result};
use crate::instance::EntityHandle;
use crate::model::properties::PropertyOps;
use crate::schema::ColumnRef;
use crate::stmts::InsertStatement;
use crate::value::Value;

/// A plain column-backed attribute.
#[derive(Debug)]
pub struct PrimitiveProperty {
    name: SmolStr,
    column: ColumnRef,
    required: bool,
}

impl PrimitiveProperty {
    pub fn new(name: impl Into<SmolStr>, column: ColumnRef, required: bool) -> Self {
        PrimitiveProperty {
            name: name.into(),
            column,
            required,
        }
    }
}

impl PropertyOps for PrimitiveProperty {
    fn name(&self) -> &SmolStr {
        &self.name
    }

    fn is_required(&self) -> bool {
        self.required
    }

    fn is_table_column(&self) -> bool {
        true
    }

    fn column(&self) -> Option<&ColumnRef> {
        Some(&self.column)
    }

    fn add_insert_expression(
        &self,
        ctx: &GeneratorContext,
        insert: &mut InsertStatement,
        entity: &EntityHandle,
    ) -> Result<()> {
        let value = entity.get(&self.name);
        if value.is_null() && self.required {
            return Err(GenerateError::model(format!(
                "required attribute {}.{} is null",
                entity.class(),
                self.name
            )));
        }
        insert.set(&self.column, ctx.dialect().format_value(&value)?);
        Ok(())
    }

    fn expression(
        &self,
        ctx: &GeneratorContext,
        entity: &EntityHandle,
        _for_where: bool,
    ) -> Result<Option<String>> {
        let value = entity.get(&self.name);
        if value.is_null() {
            return Ok(None);
        }
        ctx.dialect().format_value(&value).map(Some)
    }

    fn predicate(&self, ctx: &GeneratorContext, entity: &EntityHandle) -> Result<Option<String>> {
        Ok(Some(match self.expression(ctx, entity, true)? {
            Some(expression) => format!("{} = {}", self.column.name(), expression),
            None => format!("{} IS NULL", self.column.name()),
        }))
    }
}

/// The optimistic-lock column: inserted like a primitive (defaulting to 0)
/// and advanced by one whenever a deferred update touches its row.
#[derive(Debug)]
pub struct VersionProperty {
    name: SmolStr,
    column: ColumnRef,
}

impl VersionProperty {
    pub fn new(name: impl Into<SmolStr>, column: ColumnRef) -> Self {
        VersionProperty {
            name: name.into(),
            column,
        }
    }

    fn value(&self, entity: &EntityHandle) -> Value {
        match entity.get(&self.name) {
            Value::Null => Value::Int(0),
            value => value,
        }
    }

    /// Assignment expression used by UPDATE statements on the owning row.
    pub fn bump_expression(&self) -> String {
        format!("{} + 1", self.column.name())
    }
}

impl PropertyOps for VersionProperty {
    fn name(&self) -> &SmolStr {
        &self.name
    }

    fn is_required(&self) -> bool {
        false
    }

    fn is_table_column(&self) -> bool {
        true
    }

    fn column(&self) -> Option<&ColumnRef> {
        Some(&self.column)
    }

    fn add_insert_expression(
        &self,
        ctx: &GeneratorContext,
        insert: &mut InsertStatement,
        entity: &EntityHandle,
    ) -> Result<()> {
        insert.set(&self.column, ctx.dialect().format_value(&self.value(entity))?);
        Ok(())
    }

    fn expression(
        &self,
        ctx: &GeneratorContext,
        entity: &EntityHandle,
        _for_where: bool,
    ) -> Result<Option<String>> {
        ctx.dialect().format_value(&self.value(entity)).map(Some)
    }

    fn predicate(&self, ctx: &GeneratorContext, entity: &EntityHandle) -> Result<Option<String>> {
        let expression = self.expression(ctx, entity, true)?.expect("version is never null");
        Ok(Some(format!("{} = {}", self.column.name(), expression)))
    }
}
