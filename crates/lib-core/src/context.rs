use std::cell::RefCell;
use std::rc::Rc;

use ahash::{AHashMap, AHashSet};
use smol_str::SmolStr;

use crate::dialects::SqlDialect;
use crate::errors::{GenerateError, Result};
use crate::helpers::IndexMap;
use crate::instance::{EntityHandle, EntityKey};
use crate::model::descriptor::{EntityClass, UniquePropertyQuality};
use crate::model::generators::{
    AssignedGenerator, IdGenerator, IdGeneratorOps, IdentityGenerator, SequenceGenerator,
    TableGenerator,
};
use crate::model::metadata::{EntityModel, GeneratorDef};
use crate::schema::{TableRef, TableRegistry};

/// Core knobs consumed by descriptors and generators.
#[derive(Debug, Clone)]
pub struct GeneratorSettings {
    /// Maximum column count of a unique constraint considered as a
    /// unique-key alternate; 0 disables alternates entirely.
    pub max_unique_properties: usize,
    /// Worst quality rank a unique-key alternate may have to be used.
    pub unique_property_quality: UniquePropertyQuality,
    /// Emit `nextval`-style id expressions instead of concrete literals.
    pub relative_ids: bool,
    /// Allow the `currval` shortcut when referencing the most recent insert.
    pub prefer_sequence_current_value: bool,
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        GeneratorSettings {
            max_unique_properties: 1,
            unique_property_quality: UniquePropertyQuality::OnlyRequiredPrimitives,
            relative_ids: false,
            prefer_sequence_current_value: true,
        }
    }
}

/// Process-wide coordination for one generation pipeline: descriptor cache,
/// table registry, generator map, dialect handle and settings.
///
/// Explicitly constructed and passed by parameter; one context serves one
/// pipeline at a time and nothing here is reentrant.
pub struct GeneratorContext {
    settings: GeneratorSettings,
    dialect: Box<dyn SqlDialect>,
    model: EntityModel,
    tables: RefCell<TableRegistry>,
    descriptors: RefCell<AHashMap<SmolStr, Rc<EntityClass>>>,
    building: RefCell<AHashSet<SmolStr>>,
    generators: RefCell<IndexMap<SmolStr, IdGenerator>>,
    /// The entity whose rows produced the connection's most recent identity
    /// value. Only another identity insert moves that value, so this is
    /// simply overwritten by the next identity-generated entity.
    identity_current: RefCell<Option<EntityKey>>,
}

impl GeneratorContext {
    pub fn new(model: EntityModel, dialect: Box<dyn SqlDialect>, settings: GeneratorSettings) -> Self {
        let registry = TableRegistry::new(dialect.folding());
        GeneratorContext {
            settings,
            dialect,
            model,
            tables: RefCell::new(registry),
            descriptors: RefCell::new(AHashMap::new()),
            building: RefCell::new(AHashSet::new()),
            generators: RefCell::new(IndexMap::default()),
            identity_current: RefCell::new(None),
        }
    }

    pub fn settings(&self) -> &GeneratorSettings {
        &self.settings
    }

    pub fn dialect(&self) -> &dyn SqlDialect {
        self.dialect.as_ref()
    }

    pub fn model(&self) -> &EntityModel {
        &self.model
    }

    pub fn resolve_table(&self, name: &str) -> TableRef {
        self.tables.borrow_mut().resolve_table(name)
    }

    /// Returns the descriptor for `class`, building and caching it on first
    /// use. Construction is idempotent; re-entry through the inheritance
    /// graph is a model error.
    pub fn descriptor(&self, class: &str) -> Result<Rc<EntityClass>> {
        if let Some(descriptor) = self.descriptors.borrow().get(class) {
            return Ok(Rc::clone(descriptor));
        }

        if !self.building.borrow_mut().insert(class.into()) {
            return Err(GenerateError::model(format!(
                "inheritance cycle while resolving {class}"
            )));
        }

        let def = self.model.class(class).cloned().ok_or_else(|| {
            GenerateError::model(format!("{class} is not a registered entity class"))
        });
        let built = def.and_then(|def| EntityClass::build(self, &def));
        self.building.borrow_mut().remove(class);

        let descriptor = Rc::new(built?);
        self.descriptors
            .borrow_mut()
            .insert(class.into(), Rc::clone(&descriptor));
        Ok(descriptor)
    }

    pub fn descriptor_of(&self, entity: &EntityHandle) -> Result<Rc<EntityClass>> {
        self.descriptor(&entity.class())
    }

    /// Snapshot of every descriptor built so far (end-of-run scans).
    pub fn descriptors(&self) -> Vec<Rc<EntityClass>> {
        self.descriptors.borrow().values().map(Rc::clone).collect()
    }

    /// Registers a declared generator; names are process-wide and the first
    /// declaration wins.
    pub fn register_generator(&self, def: &GeneratorDef) {
        let mut generators = self.generators.borrow_mut();
        if generators.contains_key(def.name()) {
            return;
        }
        let relative = self.settings.relative_ids;
        let generator = match def {
            GeneratorDef::Sequence {
                name,
                sequence,
                initial_value,
                allocation_size,
            } => IdGenerator::Sequence(SequenceGenerator::new(
                name.clone(),
                sequence.clone(),
                *initial_value,
                *allocation_size,
                relative,
            )),
            GeneratorDef::Table {
                name,
                table,
                pk_column,
                value_column,
                pk_value,
                initial_value,
                allocation_size: _,
            } => IdGenerator::Table(TableGenerator::new(
                name.clone(),
                table.clone(),
                pk_column.clone(),
                value_column.clone(),
                pk_value.clone(),
                *initial_value,
                relative,
            )),
        };
        generators.insert(def.name().clone(), generator);
    }

    /// A default-configured sequence generator named after its sequence.
    pub fn ensure_sequence_generator(&self, name: &str) -> Result<SmolStr> {
        if !self.dialect.supports_sequences() {
            return Err(GenerateError::dialect(format!(
                "{} does not support sequences",
                self.dialect.kind().as_ref()
            )));
        }
        let name = SmolStr::new(name);
        let mut generators = self.generators.borrow_mut();
        if !generators.contains_key(&name) {
            generators.insert(
                name.clone(),
                IdGenerator::Sequence(SequenceGenerator::new(
                    name.clone(),
                    name.clone(),
                    1,
                    1,
                    self.settings.relative_ids,
                )),
            );
        }
        Ok(name)
    }

    pub fn ensure_table_generator(&self, name: &str) -> SmolStr {
        let name = SmolStr::new(name);
        let mut generators = self.generators.borrow_mut();
        if !generators.contains_key(&name) {
            generators.insert(
                name.clone(),
                IdGenerator::Table(TableGenerator::new(
                    name.clone(),
                    "id_generators",
                    "name",
                    "next_val",
                    name.clone(),
                    1,
                    self.settings.relative_ids,
                )),
            );
        }
        name
    }

    /// The per-table identity generator.
    pub fn ensure_identity_generator(&self, table: &str) -> Result<SmolStr> {
        if !self.dialect.supports_identity() {
            return Err(GenerateError::dialect(format!(
                "{} does not support identity columns",
                self.dialect.kind().as_ref()
            )));
        }
        let name = SmolStr::new(format!("identity({table})"));
        let mut generators = self.generators.borrow_mut();
        if !generators.contains_key(&name) {
            generators.insert(
                name.clone(),
                IdGenerator::Identity(IdentityGenerator::new(name.clone(), table)),
            );
        }
        Ok(name)
    }

    /// The shared no-op generator for caller-assigned identifiers.
    pub fn ensure_assigned_generator(&self) -> SmolStr {
        let name = SmolStr::new_static("assigned");
        let mut generators = self.generators.borrow_mut();
        if !generators.contains_key(&name) {
            generators.insert(
                name.clone(),
                IdGenerator::Assigned(AssignedGenerator::new(name.clone())),
            );
        }
        name
    }

    /// Runs `f` against one generator. Borrows are scoped to the call, so
    /// callers may not re-enter generator APIs from `f`.
    pub fn with_generator<R>(
        &self,
        name: &str,
        f: impl FnOnce(&mut IdGenerator, &dyn SqlDialect) -> R,
    ) -> Result<R> {
        let mut generators = self.generators.borrow_mut();
        let generator = generators
            .get_mut(name)
            .ok_or_else(|| GenerateError::model(format!("unknown id generator {name}")))?;
        Ok(f(generator, self.dialect.as_ref()))
    }

    pub fn set_identity_current(&self, key: EntityKey) {
        *self.identity_current.borrow_mut() = Some(key);
    }

    pub fn identity_current_matches(&self, key: &EntityKey) -> bool {
        self.identity_current.borrow().as_ref() == Some(key)
    }

    /// Trailing statements realigning every generator, in registration order.
    pub fn alignment_statements(&self) -> Result<Vec<String>> {
        let generators = self.generators.borrow();
        let mut statements = Vec::new();
        for generator in generators.values() {
            statements.extend(generator.alignment_statements(self.dialect.as_ref())?);
        }
        Ok(statements)
    }
}
