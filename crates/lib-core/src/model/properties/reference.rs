use smol_str::SmolStr;

use crate::context::GeneratorContext;
use crate::errors::{GenerateError, Result};
use crate::instance::EntityHandle;
use crate::model::properties::PropertyOps;
use crate::model::state::PendingUpdate;
use crate::schema::ColumnRef;
use crate::stmts::InsertStatement;
use crate::value::Value;

/// A singular association. The owning side carries the foreign-key column;
/// the inverse side of a one-to-one (`mapped_by`) contributes nothing to its
/// own row.
///
/// When the referenced entity has not been written yet, the row is inserted
/// with NULL in the foreign-key column and an UPDATE is queued on the target:
/// it runs as soon as the target's post-insert phase fires.
#[derive(Debug)]
pub struct ReferenceProperty {
    name: SmolStr,
    target: SmolStr,
    column: Option<ColumnRef>,
    required: bool,
    unique: bool,
}

impl ReferenceProperty {
    pub fn new(
        name: impl Into<SmolStr>,
        target: impl Into<SmolStr>,
        column: Option<ColumnRef>,
        required: bool,
        unique: bool,
    ) -> Self {
        ReferenceProperty {
            name: name.into(),
            target: target.into(),
            column,
            required,
            unique,
        }
    }

    pub fn target(&self) -> &SmolStr {
        &self.target
    }

    /// Owning one-to-one references qualify as unique-key alternates.
    pub fn is_unique(&self) -> bool {
        self.unique && self.column.is_some()
    }

    fn target_handle(&self, entity: &EntityHandle) -> Result<Option<EntityHandle>> {
        match entity.get(&self.name) {
            Value::Null => Ok(None),
            Value::Entity(target) => Ok(Some(target)),
            other => Err(GenerateError::model(format!(
                "association {}.{} holds {other:?} instead of a {} entity",
                entity.class(),
                self.name,
                self.target
            ))),
        }
    }
}

impl PropertyOps for ReferenceProperty {
    fn name(&self) -> &SmolStr {
        &self.name
    }

    fn is_required(&self) -> bool {
        self.required && self.column.is_some()
    }

    fn is_table_column(&self) -> bool {
        self.column.is_some()
    }

    fn column(&self) -> Option<&ColumnRef> {
        self.column.as_ref()
    }

    fn add_insert_expression(
        &self,
        ctx: &GeneratorContext,
        insert: &mut InsertStatement,
        entity: &EntityHandle,
    ) -> Result<()> {
        let Some(column) = &self.column else {
            return Ok(());
        };

        let Some(target) = self.target_handle(entity)? else {
            if self.required {
                return Err(GenerateError::model(format!(
                    "required association {}.{} is null",
                    entity.class(),
                    self.name
                )));
            }
            insert.set(column, "null");
            return Ok(());
        };

        let target_descriptor = ctx.descriptor_of(&target)?;
        if target_descriptor.is_new(&target) {
            if self.required {
                return Err(GenerateError::model(format!(
                    "required association {}.{} points at a {} that cannot be written first",
                    entity.class(),
                    self.name,
                    self.target
                )));
            }
            target_descriptor.mark_pending_update(
                target.key(),
                PendingUpdate {
                    entity: entity.clone(),
                    property: self.name.clone(),
                    args: Vec::new(),
                },
            )?;
            insert.set(column, "null");
            return Ok(());
        }

        insert.set(
            column,
            target_descriptor.get_entity_reference(ctx, &target, false)?,
        );
        Ok(())
    }

    fn create_pending_statements(
        &self,
        ctx: &GeneratorContext,
        entity: &EntityHandle,
        _args: &[Value],
    ) -> Result<Vec<String>> {
        let Some(column) = &self.column else {
            return Ok(Vec::new());
        };
        let Some(target) = self.target_handle(entity)? else {
            return Ok(Vec::new());
        };

        let target_descriptor = ctx.descriptor_of(&target)?;
        let expression = target_descriptor.get_entity_reference(ctx, &target, false)?;

        let descriptor = ctx.descriptor_of(entity)?;
        let table = ctx.resolve_table(column.table());
        let mut update = descriptor.create_update(ctx, entity, &table)?;
        update.set(column, expression);
        Ok(vec![update.to_sql()])
    }

    fn find_referenced_entities(&self, entity: &EntityHandle) -> Vec<EntityHandle> {
        match self.target_handle(entity) {
            Ok(Some(target)) => vec![target],
            _ => Vec::new(),
        }
    }

    fn expression(
        &self,
        ctx: &GeneratorContext,
        entity: &EntityHandle,
        for_where: bool,
    ) -> Result<Option<String>> {
        if self.column.is_none() {
            return Ok(None);
        }
        let Some(target) = self.target_handle(entity)? else {
            return Ok(None);
        };
        let target_descriptor = ctx.descriptor_of(&target)?;
        target_descriptor
            .get_entity_reference(ctx, &target, for_where)
            .map(Some)
    }

    fn predicate(&self, ctx: &GeneratorContext, entity: &EntityHandle) -> Result<Option<String>> {
        let Some(column) = &self.column else {
            return Ok(None);
        };
        Ok(Some(match self.expression(ctx, entity, true)? {
            Some(expression) => format!("{} = {}", column.name(), expression),
            None => format!("{} IS NULL", column.name()),
        }))
    }
}
