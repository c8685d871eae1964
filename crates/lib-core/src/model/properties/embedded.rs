use smol_str::SmolStr;

use crate::context::GeneratorContext;
use crate::errors::{GenerateError, Result};
use crate::helpers::IndexMap;
use crate::instance::EntityHandle;
use crate::model::properties::{Property, PropertyOps};
use crate::stmts::InsertStatement;
use crate::value::Value;

/// An embedded value type: owns the sub-properties built from the embeddable
/// declaration (with the embedding site's overrides applied) and delegates
/// every operation to them, passing the embedded value as the receiver.
#[derive(Debug)]
pub struct EmbeddedProperty {
    name: SmolStr,
    type_name: SmolStr,
    required: bool,
    properties: IndexMap<SmolStr, Property>,
}

impl EmbeddedProperty {
    pub fn new(
        name: impl Into<SmolStr>,
        type_name: impl Into<SmolStr>,
        id_role: bool,
        properties: IndexMap<SmolStr, Property>,
    ) -> Self {
        let required = id_role || properties.values().any(PropertyOps::is_required);
        EmbeddedProperty {
            name: name.into(),
            type_name: type_name.into(),
            required,
            properties,
        }
    }

    pub fn type_name(&self) -> &SmolStr {
        &self.type_name
    }

    pub fn properties(&self) -> impl Iterator<Item = &Property> {
        self.properties.values()
    }

    /// The embedded value, which must itself be an entity-shaped record.
    fn receiver(&self, entity: &EntityHandle) -> Result<Option<EntityHandle>> {
        match entity.get(&self.name) {
            Value::Null => Ok(None),
            Value::Entity(embedded) => Ok(Some(embedded)),
            other => Err(GenerateError::model(format!(
                "embedded attribute {}.{} holds {other:?} instead of a {} value",
                entity.class(),
                self.name,
                self.type_name
            ))),
        }
    }

    fn set_null_columns(insert: &mut InsertStatement, property: &Property) {
        match property {
            Property::Embedded(embedded) => {
                for sub in embedded.properties.values() {
                    Self::set_null_columns(insert, sub);
                }
            }
            other => {
                if let Some(column) = other.column() {
                    insert.set(column, "null");
                }
            }
        }
    }
}

impl PropertyOps for EmbeddedProperty {
    fn name(&self) -> &SmolStr {
        &self.name
    }

    fn is_required(&self) -> bool {
        self.required
    }

    fn is_table_column(&self) -> bool {
        true
    }

    fn add_insert_expression(
        &self,
        ctx: &GeneratorContext,
        insert: &mut InsertStatement,
        entity: &EntityHandle,
    ) -> Result<()> {
        match self.receiver(entity)? {
            Some(embedded) => {
                for property in self.properties.values() {
                    if property.is_table_column() {
                        property.add_insert_expression(ctx, insert, &embedded)?;
                    }
                }
                Ok(())
            }
            None if self.required => Err(GenerateError::model(format!(
                "required embedded attribute {}.{} is null",
                entity.class(),
                self.name
            ))),
            None => {
                for property in self.properties.values() {
                    Self::set_null_columns(insert, property);
                }
                Ok(())
            }
        }
    }

    fn create_pre_insert_statements(
        &self,
        ctx: &GeneratorContext,
        entity: &EntityHandle,
    ) -> Result<Vec<String>> {
        let Some(embedded) = self.receiver(entity)? else {
            return Ok(Vec::new());
        };
        let mut statements = Vec::new();
        for property in self.properties.values() {
            statements.extend(property.create_pre_insert_statements(ctx, &embedded)?);
        }
        Ok(statements)
    }

    fn create_post_insert_statements(
        &self,
        ctx: &GeneratorContext,
        entity: &EntityHandle,
    ) -> Result<Vec<String>> {
        let Some(embedded) = self.receiver(entity)? else {
            return Ok(Vec::new());
        };
        let mut statements = Vec::new();
        for property in self.properties.values() {
            statements.extend(property.create_post_insert_statements(ctx, &embedded)?);
        }
        Ok(statements)
    }

    fn find_referenced_entities(&self, entity: &EntityHandle) -> Vec<EntityHandle> {
        let Ok(Some(embedded)) = self.receiver(entity) else {
            return Vec::new();
        };
        self.properties
            .values()
            .flat_map(|property| property.find_referenced_entities(&embedded))
            .collect()
    }

    fn expression(
        &self,
        _ctx: &GeneratorContext,
        _entity: &EntityHandle,
        _for_where: bool,
    ) -> Result<Option<String>> {
        // A composite spans several columns; there is no single expression.
        Ok(None)
    }

    fn predicate(&self, ctx: &GeneratorContext, entity: &EntityHandle) -> Result<Option<String>> {
        let Some(embedded) = self.receiver(entity)? else {
            return Ok(None);
        };
        let mut predicates = Vec::new();
        for property in self.properties.values() {
            if let Some(predicate) = property.predicate(ctx, &embedded)? {
                predicates.push(predicate);
            }
        }
        if predicates.is_empty() {
            return Ok(None);
        }
        Ok(Some(predicates.join(" AND ")))
    }
}
