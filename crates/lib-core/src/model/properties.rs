use enum_dispatch::enum_dispatch;
use smol_str::SmolStr;

use crate::context::GeneratorContext;
use crate::errors::Result;
use crate::instance::EntityHandle;
use crate::schema::ColumnRef;
use crate::stmts::InsertStatement;
use crate::value::Value;

pub mod collection;
pub mod embedded;
pub mod primitive;
pub mod reference;

pub use collection::{CollectionMapping, CollectionProperty, MapProperty};
pub use embedded::EmbeddedProperty;
pub use primitive::{PrimitiveProperty, VersionProperty};
pub use reference::ReferenceProperty;

/// Contract shared by every attribute descriptor.
///
/// A property knows how to contribute to the INSERT of its owning row, which
/// statements must precede or follow that row, which other entities it reads
/// from the receiver, and how to render itself as a value expression or a
/// row predicate.
#[enum_dispatch]
pub trait PropertyOps {
    fn name(&self) -> &SmolStr;

    fn is_required(&self) -> bool;

    /// Whether this property contributes at least one column to the owning
    /// row. Plural attributes and inverse associations do not.
    fn is_table_column(&self) -> bool;

    /// The single column backing this property, when there is exactly one.
    fn column(&self) -> Option<&ColumnRef> {
        None
    }

    fn add_insert_expression(
        &self,
        ctx: &GeneratorContext,
        insert: &mut InsertStatement,
        entity: &EntityHandle,
    ) -> Result<()>;

    fn create_pre_insert_statements(
        &self,
        ctx: &GeneratorContext,
        entity: &EntityHandle,
    ) -> Result<Vec<String>> {
        let _ = (ctx, entity);
        Ok(Vec::new())
    }

    fn create_post_insert_statements(
        &self,
        ctx: &GeneratorContext,
        entity: &EntityHandle,
    ) -> Result<Vec<String>> {
        let _ = (ctx, entity);
        Ok(Vec::new())
    }

    /// Statements completing a reference that was deferred until the target
    /// entity was written. `args` is whatever the property queued alongside
    /// the deferred action.
    fn create_pending_statements(
        &self,
        ctx: &GeneratorContext,
        entity: &EntityHandle,
        args: &[Value],
    ) -> Result<Vec<String>> {
        let _ = (ctx, entity, args);
        Ok(Vec::new())
    }

    /// The entities this property reads from the receiver; used to order
    /// insertion and to decide pending-state registration.
    fn find_referenced_entities(&self, entity: &EntityHandle) -> Vec<EntityHandle> {
        let _ = entity;
        Vec::new()
    }

    /// Value expression of this property for the given receiver, or `None`
    /// when the attribute is null.
    fn expression(
        &self,
        ctx: &GeneratorContext,
        entity: &EntityHandle,
        for_where: bool,
    ) -> Result<Option<String>>;

    /// Predicate matching rows by this property (`col = …` / `col IS NULL`),
    /// or `None` when the property cannot appear in a WHERE clause.
    fn predicate(&self, ctx: &GeneratorContext, entity: &EntityHandle) -> Result<Option<String>>;
}

/// Attribute descriptors as a closed sum; dispatch is static per variant.
#[enum_dispatch(PropertyOps)]
#[derive(Debug)]
pub enum Property {
    Primitive(PrimitiveProperty),
    Version(VersionProperty),
    Embedded(EmbeddedProperty),
    Reference(ReferenceProperty),
    Collection(CollectionProperty),
    MapCollection(MapProperty),
}

impl Property {
    pub fn is_primitive(&self) -> bool {
        matches!(self, Property::Primitive(_) | Property::Version(_))
    }
}

/// Renders one element value: entity elements become reference expressions,
/// everything else a literal.
pub(crate) fn element_expression(ctx: &GeneratorContext, value: &Value) -> Result<String> {
    match value {
        Value::Entity(entity) => {
            let descriptor = ctx.descriptor_of(entity)?;
            descriptor.get_entity_reference(ctx, entity, false)
        }
        other => ctx.dialect().format_value(other),
    }
}
