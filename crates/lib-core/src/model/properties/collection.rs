use smol_str::SmolStr;

use crate::context::GeneratorContext;
use crate::errors::{GenerateError, Result};
use crate::instance::EntityHandle;
use crate::model::metadata::ElementKind;
use crate::model::properties::{PropertyOps, element_expression};
use crate::model::state::PendingUpdate;
use crate::schema::{ColumnRef, TableRef};
use crate::stmts::InsertStatement;
use crate::value::Value;

/// Where a plural attribute stores its rows.
#[derive(Debug)]
pub enum CollectionMapping {
    /// Rows in a dedicated join table owned by this side.
    JoinTable {
        table: TableRef,
        owner_column: ColumnRef,
        element_column: ColumnRef,
        order_column: Option<ColumnRef>,
    },
    /// The foreign key lives on the element side (`mapped_by`).
    MappedBy { attribute: SmolStr },
}

/// A plural attribute. Contributes no column to the owning row; everything
/// happens post-insert, preserving the collection's insertion order.
#[derive(Debug)]
pub struct CollectionProperty {
    name: SmolStr,
    element: ElementKind,
    mapping: CollectionMapping,
}

impl CollectionProperty {
    pub fn new(name: impl Into<SmolStr>, element: ElementKind, mapping: CollectionMapping) -> Self {
        CollectionProperty {
            name: name.into(),
            element,
            mapping,
        }
    }

    fn elements(&self, entity: &EntityHandle) -> Result<Vec<Value>> {
        match entity.get(&self.name) {
            Value::Null => Ok(Vec::new()),
            Value::List(elements) => Ok(elements),
            other => Err(GenerateError::model(format!(
                "plural attribute {}.{} holds {other:?} instead of a list",
                entity.class(),
                self.name
            ))),
        }
    }

    /// Statements linking one element to the owning entity. Both sides must
    /// be persisted by the time this runs.
    fn element_statements(
        &self,
        ctx: &GeneratorContext,
        owner: &EntityHandle,
        index: usize,
        element: &Value,
    ) -> Result<Vec<String>> {
        match &self.mapping {
            CollectionMapping::JoinTable {
                table,
                owner_column,
                element_column,
                order_column,
            } => {
                let owner_descriptor = ctx.descriptor_of(owner)?;
                let mut insert = InsertStatement::new(table.clone());
                insert.set(
                    owner_column,
                    owner_descriptor.get_entity_reference(ctx, owner, false)?,
                );
                insert.set(element_column, element_expression(ctx, element)?);
                if let Some(order_column) = order_column {
                    insert.set(order_column, index.to_string());
                }
                Ok(vec![insert.to_sql()])
            }
            CollectionMapping::MappedBy { attribute } => {
                let Value::Entity(element) = element else {
                    return Err(GenerateError::model(format!(
                        "mapped-by collection {} requires entity elements",
                        self.name
                    )));
                };
                // The owning side already stores the foreign key when the
                // back-reference points here; a second write would be noise.
                if let Value::Entity(back) = element.get(attribute) {
                    if back.ptr_eq(owner) {
                        return Ok(Vec::new());
                    }
                }

                let element_descriptor = ctx.descriptor_of(element)?;
                let declaring = element_descriptor.declaring_class(ctx, attribute)?;
                let Some(column) = declaring
                    .property(attribute)
                    .and_then(|property| property.column().cloned())
                else {
                    return Err(GenerateError::model(format!(
                        "collection {}.{} is mapped by {}.{attribute}, which has no join column",
                        owner.class(),
                        self.name,
                        element.class()
                    )));
                };

                let owner_descriptor = ctx.descriptor_of(owner)?;
                let table = ctx.resolve_table(column.table());
                let mut update = element_descriptor.create_update(ctx, element, &table)?;
                update.set(
                    &column,
                    owner_descriptor.get_entity_reference(ctx, owner, false)?,
                );
                Ok(vec![update.to_sql()])
            }
        }
    }
}

impl PropertyOps for CollectionProperty {
    fn name(&self) -> &SmolStr {
        &self.name
    }

    fn is_required(&self) -> bool {
        false
    }

    fn is_table_column(&self) -> bool {
        false
    }

    fn add_insert_expression(
        &self,
        _ctx: &GeneratorContext,
        _insert: &mut InsertStatement,
        _entity: &EntityHandle,
    ) -> Result<()> {
        Ok(())
    }

    fn create_post_insert_statements(
        &self,
        ctx: &GeneratorContext,
        entity: &EntityHandle,
    ) -> Result<Vec<String>> {
        let mut statements = Vec::new();
        for (index, element) in self.elements(entity)?.iter().enumerate() {
            if let Value::Entity(target) = element {
                let target_descriptor = ctx.descriptor_of(target)?;
                if target_descriptor.is_new(target) {
                    target_descriptor.mark_pending_update(
                        target.key(),
                        PendingUpdate {
                            entity: entity.clone(),
                            property: self.name.clone(),
                            args: vec![Value::Int(index as i64), element.clone()],
                        },
                    )?;
                    continue;
                }
            }
            statements.extend(self.element_statements(ctx, entity, index, element)?);
        }
        Ok(statements)
    }

    fn create_pending_statements(
        &self,
        ctx: &GeneratorContext,
        entity: &EntityHandle,
        args: &[Value],
    ) -> Result<Vec<String>> {
        let (Some(Value::Int(index)), Some(element)) = (args.first(), args.get(1)) else {
            return Err(GenerateError::model(format!(
                "malformed deferred action for collection {}",
                self.name
            )));
        };
        self.element_statements(ctx, entity, *index as usize, element)
    }

    fn find_referenced_entities(&self, entity: &EntityHandle) -> Vec<EntityHandle> {
        if self.element == ElementKind::Basic {
            return Vec::new();
        }
        self.elements(entity)
            .map(|elements| {
                elements
                    .into_iter()
                    .filter_map(|element| match element {
                        Value::Entity(target) => Some(target),
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    fn expression(
        &self,
        _ctx: &GeneratorContext,
        _entity: &EntityHandle,
        _for_where: bool,
    ) -> Result<Option<String>> {
        Ok(None)
    }

    fn predicate(&self, _ctx: &GeneratorContext, _entity: &EntityHandle) -> Result<Option<String>> {
        Ok(None)
    }
}

/// A map attribute: one join-table row per entry, keyed by the declared map
/// key. Entries keep their insertion order.
#[derive(Debug)]
pub struct MapProperty {
    name: SmolStr,
    table: TableRef,
    owner_column: ColumnRef,
    key_column: ColumnRef,
    value_column: ColumnRef,
}

impl MapProperty {
    pub fn new(
        name: impl Into<SmolStr>,
        table: TableRef,
        owner_column: ColumnRef,
        key_column: ColumnRef,
        value_column: ColumnRef,
    ) -> Self {
        MapProperty {
            name: name.into(),
            table,
            owner_column,
            key_column,
            value_column,
        }
    }

    fn entries(&self, entity: &EntityHandle) -> Result<Vec<(Value, Value)>> {
        match entity.get(&self.name) {
            Value::Null => Ok(Vec::new()),
            Value::PairList(entries) => Ok(entries),
            other => Err(GenerateError::model(format!(
                "map attribute {}.{} holds {other:?} instead of key/value pairs",
                entity.class(),
                self.name
            ))),
        }
    }

    fn entry_statement(
        &self,
        ctx: &GeneratorContext,
        owner: &EntityHandle,
        key: &Value,
        value: &Value,
    ) -> Result<String> {
        let owner_descriptor = ctx.descriptor_of(owner)?;
        let mut insert = InsertStatement::new(self.table.clone());
        insert.set(
            &self.owner_column,
            owner_descriptor.get_entity_reference(ctx, owner, false)?,
        );
        insert.set(&self.key_column, element_expression(ctx, key)?);
        insert.set(&self.value_column, element_expression(ctx, value)?);
        Ok(insert.to_sql())
    }

    /// The first entry participant that is a not-yet-written entity.
    fn new_participant(ctx: &GeneratorContext, entry: &[&Value]) -> Result<Option<EntityHandle>> {
        for value in entry {
            if let Value::Entity(target) = value {
                if ctx.descriptor_of(target)?.is_new(target) {
                    return Ok(Some(target.clone()));
                }
            }
        }
        Ok(None)
    }
}

impl PropertyOps for MapProperty {
    fn name(&self) -> &SmolStr {
        &self.name
    }

    fn is_required(&self) -> bool {
        false
    }

    fn is_table_column(&self) -> bool {
        false
    }

    fn add_insert_expression(
        &self,
        _ctx: &GeneratorContext,
        _insert: &mut InsertStatement,
        _entity: &EntityHandle,
    ) -> Result<()> {
        Ok(())
    }

    fn create_post_insert_statements(
        &self,
        ctx: &GeneratorContext,
        entity: &EntityHandle,
    ) -> Result<Vec<String>> {
        let mut statements = Vec::new();
        for (key, value) in self.entries(entity)? {
            match Self::new_participant(ctx, &[&value, &key])? {
                Some(target) => {
                    let target_descriptor = ctx.descriptor_of(&target)?;
                    target_descriptor.mark_pending_update(
                        target.key(),
                        PendingUpdate {
                            entity: entity.clone(),
                            property: self.name.clone(),
                            args: vec![key.clone(), value.clone()],
                        },
                    )?;
                }
                None => statements.push(self.entry_statement(ctx, entity, &key, &value)?),
            }
        }
        Ok(statements)
    }

    fn create_pending_statements(
        &self,
        ctx: &GeneratorContext,
        entity: &EntityHandle,
        args: &[Value],
    ) -> Result<Vec<String>> {
        let (Some(key), Some(value)) = (args.first(), args.get(1)) else {
            return Err(GenerateError::model(format!(
                "malformed deferred action for map {}",
                self.name
            )));
        };
        Ok(vec![self.entry_statement(ctx, entity, key, value)?])
    }

    fn find_referenced_entities(&self, entity: &EntityHandle) -> Vec<EntityHandle> {
        self.entries(entity)
            .map(|entries| {
                entries
                    .into_iter()
                    .flat_map(|(key, value)| [key, value])
                    .filter_map(|value| match value {
                        Value::Entity(target) => Some(target),
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    fn expression(
        &self,
        _ctx: &GeneratorContext,
        _entity: &EntityHandle,
        _for_where: bool,
    ) -> Result<Option<String>> {
        Ok(None)
    }

    fn predicate(&self, _ctx: &GeneratorContext, _entity: &EntityHandle) -> Result<Option<String>> {
        Ok(None)
    }
}
