use ahash::AHashSet;
use itertools::Itertools;
use log::debug;

use crate::context::GeneratorContext;
use crate::errors::{GenerateError, Result};
use crate::instance::{EntityHandle, EntityKey};
use crate::model::descriptor::IdProperty;
use crate::model::properties::PropertyOps;
use crate::model::state::PendingUpdate;
use crate::stmts::InsertStatement;
use crate::writer::StatementsWriter;

/// Emits the statements for one entity at a time: pre-inserts, the row (or
/// row chain for joined inheritance), post-inserts, then the deferred
/// updates freed by persisting it. The whole sequence runs without another
/// entity's statements interleaving.
pub struct EntitySqlGenerator<'a> {
    ctx: &'a GeneratorContext,
    writer: &'a mut dyn StatementsWriter,
}

impl<'a> EntitySqlGenerator<'a> {
    pub fn new(ctx: &'a GeneratorContext, writer: &'a mut dyn StatementsWriter) -> Self {
        EntitySqlGenerator { ctx, writer }
    }

    pub fn ctx(&self) -> &GeneratorContext {
        self.ctx
    }

    /// Direct access to the underlying writer, for comments and separators
    /// interleaved with entity output.
    pub fn writer(&mut self) -> &mut dyn StatementsWriter {
        self.writer
    }

    /// Writes `entity` and, first, every not-yet-written entity it requires
    /// through a non-nullable reference. Persisted entities are skipped.
    pub fn write_entity(&mut self, entity: &EntityHandle) -> Result<()> {
        let descriptor = self.ctx.descriptor_of(entity)?;
        if !descriptor.is_new(entity) {
            return Ok(());
        }
        let mut in_progress = AHashSet::new();
        self.write_new_entity(entity, &mut in_progress)
    }

    pub fn write_entities<'e>(
        &mut self,
        entities: impl IntoIterator<Item = &'e EntityHandle>,
    ) -> Result<()> {
        for entity in entities {
            self.write_entity(entity)?;
        }
        Ok(())
    }

    /// Marks a row that already exists in the target schema; statements that
    /// were waiting for it are emitted right away.
    pub fn mark_existing_entity(&mut self, entity: &EntityHandle) -> Result<()> {
        let descriptor = self.ctx.descriptor_of(entity)?;
        for pending in descriptor.mark_existing(entity) {
            self.apply_pending(&pending)?;
        }
        Ok(())
    }

    fn write_new_entity(
        &mut self,
        entity: &EntityHandle,
        in_progress: &mut AHashSet<EntityKey>,
    ) -> Result<()> {
        let key = entity.key();
        if !in_progress.insert(key.clone()) {
            return Err(GenerateError::model(format!(
                "cycle of required references involving {}",
                entity.class()
            )));
        }

        let descriptor = self.ctx.descriptor_of(entity)?;
        debug!("writing {} entity", descriptor.name());
        let chain = descriptor.table_chain(self.ctx)?;

        // Non-nullable references force their targets into the script first.
        for class in &chain {
            for property in class.properties() {
                if !property.is_required() {
                    continue;
                }
                for referenced in property.find_referenced_entities(entity) {
                    let referenced_descriptor = self.ctx.descriptor_of(&referenced)?;
                    if referenced_descriptor.is_new(&referenced) {
                        self.write_new_entity(&referenced, in_progress)?;
                    }
                }
            }
        }

        // Pre-inserts: the id generator's bump plus property preludes.
        if let Some(IdProperty::Singular(id)) = chain[0].id_property() {
            use crate::model::generators::IdGeneratorOps;
            let statements =
                self.ctx
                    .with_generator(id.generator(), |g, d| g.pre_insert_statements(d))??;
            for statement in statements {
                self.writer.write_statement(&statement)?;
            }
        }
        for class in &chain {
            for property in class.properties() {
                for statement in property.create_pre_insert_statements(self.ctx, entity)? {
                    self.writer.write_statement(&statement)?;
                }
            }
        }

        // One row per table in the chain, root first; children repeat the
        // root's id in their primary-key join column.
        let identity_id = match chain[0].id_property() {
            Some(IdProperty::Singular(id)) => {
                use crate::model::generators::IdGeneratorOps;
                self.ctx
                    .with_generator(id.generator(), |g, _| g.is_post_insert())?
            }
            _ => false,
        };
        for (index, class) in chain.iter().enumerate() {
            let mut insert = InsertStatement::new(class.table().clone());
            if index == 0 {
                match class.id_property() {
                    Some(IdProperty::Singular(id)) => {
                        id.add_insert_expression(self.ctx, &mut insert, entity)?;
                    }
                    Some(IdProperty::Embedded(embedded)) => {
                        embedded.add_insert_expression(self.ctx, &mut insert, entity)?;
                    }
                    None => {
                        return Err(GenerateError::model(format!(
                            "{} has no identifier",
                            class.name()
                        )));
                    }
                }
                if let Some(discriminator) = descriptor.discriminator() {
                    insert.set(&discriminator.column, discriminator.expression.clone());
                }
            } else {
                let join_column = class
                    .primary_key_join_column()
                    .expect("joined children repeat the parent id");
                let expression = chain[0].get_entity_reference(self.ctx, entity, false)?;
                insert.set(join_column, expression);
            }
            for property in class.properties() {
                if property.is_table_column() {
                    property.add_insert_expression(self.ctx, &mut insert, entity)?;
                }
            }
            self.writer.write_statement(&insert.to_sql())?;
            // Only identity inserts move the connection's last-insert
            // value, so rows of this chain keep the shortcut alive.
            if identity_id {
                self.ctx.set_identity_current(key.clone());
            }
        }

        // Post-inserts (join tables, inverse-side updates).
        for class in &chain {
            for property in class.properties() {
                for statement in property.create_post_insert_statements(self.ctx, entity)? {
                    self.writer.write_statement(&statement)?;
                }
            }
        }

        // Persist, then flush whatever was waiting on this entity, FIFO.
        for pending in descriptor.set_persisted(key.clone()) {
            self.apply_pending(&pending)?;
        }

        in_progress.remove(&key);
        Ok(())
    }

    fn apply_pending(&mut self, pending: &PendingUpdate) -> Result<()> {
        let descriptor = self.ctx.descriptor_of(&pending.entity)?;
        let declaring = descriptor.declaring_class(self.ctx, &pending.property)?;
        let property = declaring
            .property(&pending.property)
            .expect("declaring class owns the property");
        for statement in
            property.create_pending_statements(self.ctx, &pending.entity, &pending.args)?
        {
            self.writer.write_statement(&statement)?;
        }
        Ok(())
    }

    /// End-of-run check: every entity that was referenced must have been
    /// written (or marked pre-existing) by now.
    pub fn flush(&mut self) -> Result<()> {
        let mut unresolved = Vec::new();
        for descriptor in self.ctx.descriptors() {
            for (key, count) in descriptor.residual_pending() {
                unresolved.push(format!(
                    "{key:?} ({count} deferred update{})",
                    if count == 1 { "" } else { "s" }
                ));
            }
        }
        if unresolved.is_empty() {
            return Ok(());
        }
        Err(GenerateError::reference(format!(
            "entities were referenced but never written: {}",
            unresolved.iter().join(", ")
        )))
    }

    /// Trailing statements advancing sequences and identity counters past
    /// the highest values used during generation.
    pub fn write_alignment_statements(&mut self) -> Result<()> {
        for statement in self.ctx.alignment_statements()? {
            self.writer.write_statement(&statement)?;
        }
        Ok(())
    }
}
