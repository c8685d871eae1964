use std::cell::RefCell;
use std::rc::Rc;

use ahash::AHashSet;
use smol_str::SmolStr;

use crate::context::GeneratorContext;
use crate::errors::{GenerateError, Result};
use crate::helpers::IndexMap;
use crate::instance::{EntityHandle, EntityKey};
use crate::model::metadata::{
    AccessStyle, AttributeDef, AttributeKind, ClassDef, ColumnDef, DiscriminatorColumnDef,
    DiscriminatorKind, ElementKind, GeneratedValueDef, GenerationStrategy, InheritanceType,
    JoinTableDef,
};
use crate::model::properties::{
    CollectionMapping, CollectionProperty, EmbeddedProperty, MapProperty, PrimitiveProperty,
    Property, PropertyOps, ReferenceProperty, VersionProperty,
};
use crate::model::state::{PendingUpdate, StateMap};
use crate::schema::{ColumnRef, TableRef};
use crate::stmts::{InsertStatement, UpdateStatement};

/// Rank of a unique-key alternate, best first. The configured threshold is
/// the worst rank the reference resolver may still use.
#[derive(
    strum_macros::EnumString,
    strum_macros::AsRefStr,
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
)]
#[strum(serialize_all = "snake_case")]
pub enum UniquePropertyQuality {
    #[default]
    OnlyRequiredPrimitives,
    OnlyRequired,
    OnlyPrimitives,
    AllowsNulls,
}

/// Discriminator column plus the literal expression distinguishing this
/// class, rendered once at build time so output is bit-stable.
#[derive(Debug)]
pub struct Discriminator {
    pub column: ColumnRef,
    pub expression: String,
}

/// The identifier of a hierarchy root: a singular generated/assigned column
/// or an embedded composite.
#[derive(Debug)]
pub enum IdProperty {
    Singular(SingularIdProperty),
    Embedded(EmbeddedProperty),
}

/// A single-column identifier backed by one of the id generators.
#[derive(Debug)]
pub struct SingularIdProperty {
    name: SmolStr,
    column: ColumnRef,
    generator: SmolStr,
}

impl SingularIdProperty {
    pub fn name(&self) -> &SmolStr {
        &self.name
    }

    pub fn column(&self) -> &ColumnRef {
        &self.column
    }

    pub fn generator(&self) -> &SmolStr {
        &self.generator
    }

    /// Produces the id value (when the generator assigns one) and the id
    /// column expression of the row being inserted. Identity columns are
    /// omitted; the database fills them during the insert.
    pub(crate) fn add_insert_expression(
        &self,
        ctx: &GeneratorContext,
        insert: &mut InsertStatement,
        entity: &EntityHandle,
    ) -> Result<()> {
        use crate::model::generators::IdGeneratorOps;

        let key = entity.key();
        let (post_insert, assigns) =
            ctx.with_generator(&self.generator, |g, _| (g.is_post_insert(), g.assigns_values()))?;

        if !assigns {
            let value = entity.get(&self.name);
            if value.is_null() {
                return Err(GenerateError::model(format!(
                    "{}.{} must be assigned before the entity is written",
                    entity.class(),
                    self.name
                )));
            }
            insert.set(&self.column, ctx.dialect().format_value(&value)?);
            return Ok(());
        }

        if post_insert {
            ctx.with_generator(&self.generator, |g, _| {
                g.next_value();
                g.set_current_entity(key);
            })?;
            return Ok(());
        }

        let (value, expression) = ctx.with_generator(&self.generator, |g, d| {
            let value = g.next_value();
            g.set_current_entity(key);
            (value, g.insert_expression(d))
        })?;
        entity.set(self.name.clone(), value);
        let expression = expression?.ok_or_else(|| {
            GenerateError::model(format!("generator {} produced no expression", self.generator))
        })?;
        insert.set(&self.column, expression);
        Ok(())
    }
}

/// The materialized metadata of one persistent class.
pub struct EntityClass {
    name: SmolStr,
    access: AccessStyle,
    table: TableRef,
    inheritance: Option<InheritanceType>,
    hierarchy_root: SmolStr,
    joined_parent: Option<SmolStr>,
    primary_key_join_column: Option<ColumnRef>,
    discriminator: Option<Discriminator>,
    /// `None` for joined children, which reuse the parent's identifier.
    id_property: Option<IdProperty>,
    id_attribute: SmolStr,
    properties: IndexMap<SmolStr, Property>,
    unique_properties: Vec<SmolStr>,
    unique_quality: Option<UniquePropertyQuality>,
    states: RefCell<StateMap>,
}

impl EntityClass {
    pub fn name(&self) -> &SmolStr {
        &self.name
    }

    pub fn access(&self) -> AccessStyle {
        self.access
    }

    pub fn table(&self) -> &TableRef {
        &self.table
    }

    pub fn inheritance(&self) -> Option<InheritanceType> {
        self.inheritance
    }

    pub fn hierarchy_root(&self) -> &SmolStr {
        &self.hierarchy_root
    }

    pub fn joined_parent(&self) -> Option<&SmolStr> {
        self.joined_parent.as_ref()
    }

    pub fn primary_key_join_column(&self) -> Option<&ColumnRef> {
        self.primary_key_join_column.as_ref()
    }

    pub fn discriminator(&self) -> Option<&Discriminator> {
        self.discriminator.as_ref()
    }

    pub fn id_property(&self) -> Option<&IdProperty> {
        self.id_property.as_ref()
    }

    pub fn id_attribute(&self) -> &SmolStr {
        &self.id_attribute
    }

    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.get(name)
    }

    pub fn properties(&self) -> impl Iterator<Item = &Property> {
        self.properties.values()
    }

    pub fn unique_properties(&self) -> &[SmolStr] {
        &self.unique_properties
    }

    pub fn unique_quality(&self) -> Option<UniquePropertyQuality> {
        self.unique_quality
    }

    // ---- write state ----

    /// An entity is new until its post-insert phase (or `mark_existing`)
    /// flips it to persisted. The id value is never consulted: the first
    /// generated id may be zero.
    pub fn is_new(&self, entity: &EntityHandle) -> bool {
        self.states.borrow().is_new(&entity.key())
    }

    /// Marks a row that already exists in the target schema. Its id value,
    /// if any, is a reference value, not a slot to be assigned. Returns any
    /// actions that were already waiting on it.
    pub fn mark_existing(&self, entity: &EntityHandle) -> Vec<PendingUpdate> {
        self.states.borrow_mut().set_persisted(entity.key())
    }

    pub fn mark_pending_update(&self, key: EntityKey, update: PendingUpdate) -> Result<()> {
        self.states.borrow_mut().mark_pending(key, update)
    }

    pub fn set_persisted(&self, key: EntityKey) -> Vec<PendingUpdate> {
        self.states.borrow_mut().set_persisted(key)
    }

    pub fn residual_pending(&self) -> Vec<(EntityKey, usize)> {
        self.states.borrow().residual_pending()
    }

    // ---- structure ----

    /// Descriptors whose tables hold a row of this class, root first.
    pub fn table_chain(&self, ctx: &GeneratorContext) -> Result<Vec<Rc<EntityClass>>> {
        let mut chain = vec![ctx.descriptor(&self.name)?];
        loop {
            let parent = chain.last().and_then(|d| d.joined_parent.clone());
            match parent {
                Some(parent) => chain.push(ctx.descriptor(&parent)?),
                None => break,
            }
        }
        chain.reverse();
        Ok(chain)
    }

    /// The descriptor in the chain that declares `property`.
    pub fn declaring_class(
        &self,
        ctx: &GeneratorContext,
        property: &str,
    ) -> Result<Rc<EntityClass>> {
        for descriptor in self.table_chain(ctx)?.into_iter().rev() {
            if descriptor.properties.contains_key(property) {
                return Ok(descriptor);
            }
        }
        Err(GenerateError::model(format!(
            "{} has no attribute named {property}",
            self.name
        )))
    }

    // ---- reference resolution ----

    /// The SQL expression referencing this entity's row, chosen in priority
    /// order: joined-parent delegation, the current-value shortcut, a
    /// unique-key sub-select, the literal id.
    pub fn get_entity_reference(
        &self,
        ctx: &GeneratorContext,
        entity: &EntityHandle,
        for_where: bool,
    ) -> Result<String> {
        use crate::model::generators::IdGeneratorOps;

        if let Some(parent) = &self.joined_parent {
            return ctx
                .descriptor(parent)?
                .get_entity_reference(ctx, entity, for_where);
        }

        let id = self.id_property.as_ref().ok_or_else(|| {
            GenerateError::model(format!("{} has no identifier", self.name))
        })?;
        let id = match id {
            IdProperty::Singular(id) => id,
            IdProperty::Embedded(_) => {
                return Err(GenerateError::model(format!(
                    "{} has a composite id and cannot be referenced through one column",
                    self.name
                )));
            }
        };

        let key = entity.key();
        let (is_current, post_insert) = ctx.with_generator(&id.generator, |g, _| {
            (g.is_current_entity(&key), g.is_post_insert())
        })?;
        // Identity-current expressions read the connection's last insert,
        // so they survive only until the next statement.
        let current_usable =
            is_current && (!post_insert || ctx.identity_current_matches(&key));
        if ctx.settings().prefer_sequence_current_value && current_usable {
            if let Some(expression) =
                ctx.with_generator(&id.generator, |g, d| g.current_value_expression(d))??
            {
                return Ok(expression);
            }
        }

        let id_value = entity.get(&id.name);
        let literal_ids =
            ctx.with_generator(&id.generator, |g, _| g.writes_literal_ids())?;
        if !self.unique_properties.is_empty() && (!literal_ids || id_value.is_null()) {
            if let Some(subselect) = self.unique_subselect(ctx, entity, id)? {
                return Ok(subselect);
            }
        }

        if !id_value.is_null() {
            return ctx.dialect().format_value(&id_value);
        }

        Err(GenerateError::reference(format!(
            "cannot reference this {} row: its id is unknown and no unique key applies",
            self.name
        )))
    }

    /// `(SELECT id FROM table WHERE unique-key [AND discriminator])`, or
    /// `None` when any unique-key component is null for this entity.
    fn unique_subselect(
        &self,
        ctx: &GeneratorContext,
        entity: &EntityHandle,
        id: &SingularIdProperty,
    ) -> Result<Option<String>> {
        let mut predicates = Vec::new();
        for name in &self.unique_properties {
            let property = &self.properties[name];
            if property.expression(ctx, entity, true)?.is_none() {
                return Ok(None);
            }
            let predicate = property
                .predicate(ctx, entity)?
                .expect("unique properties are column-backed");
            predicates.push(predicate);
        }
        if let Some(discriminator) = &self.discriminator {
            predicates.push(format!(
                "{} = {}",
                discriminator.column.name(),
                discriminator.expression
            ));
        }
        Ok(Some(format!(
            "(SELECT {} FROM {} WHERE {})",
            id.column.name(),
            self.table.name(),
            predicates.join(" AND ")
        )))
    }

    /// An UPDATE on one of this entity's rows: WHERE identifies the row and
    /// the version column, if that table has one, advances by one.
    pub fn create_update(
        &self,
        ctx: &GeneratorContext,
        entity: &EntityHandle,
        table: &TableRef,
    ) -> Result<UpdateStatement> {
        let mut update = UpdateStatement::new(table.clone());
        for descriptor in self.table_chain(ctx)? {
            for property in descriptor.properties.values() {
                if let Property::Version(version) = property {
                    let column = version.column().expect("version is column-backed");
                    if column.table() == table.name() {
                        update.set_raw(column.name(), version.bump_expression());
                    }
                }
            }
        }
        update.add_condition(self.row_predicate(ctx, entity, table)?);
        Ok(update)
    }

    /// Predicate identifying this entity's row in `table`.
    pub fn row_predicate(
        &self,
        ctx: &GeneratorContext,
        entity: &EntityHandle,
        table: &TableRef,
    ) -> Result<String> {
        let chain = self.table_chain(ctx)?;
        let owner = chain
            .iter()
            .find(|descriptor| Rc::ptr_eq(&descriptor.table, table))
            .ok_or_else(|| {
                GenerateError::model(format!(
                    "{} has no row in table {}",
                    self.name,
                    table.name()
                ))
            })?;

        if let Some(join_column) = &owner.primary_key_join_column {
            let expression = self.get_entity_reference(ctx, entity, true)?;
            return Ok(format!("{} = {}", join_column.name(), expression));
        }

        match owner.id_property.as_ref() {
            Some(IdProperty::Singular(id)) => {
                let expression = self.get_entity_reference(ctx, entity, true)?;
                Ok(format!("{} = {}", id.column.name(), expression))
            }
            Some(IdProperty::Embedded(embedded)) => {
                embedded.predicate(ctx, entity)?.ok_or_else(|| {
                    GenerateError::reference(format!("composite id of {} is unset", self.name))
                })
            }
            None => Err(GenerateError::model(format!(
                "{} has no identifier",
                owner.name
            ))),
        }
    }

    /// Name of the id column a joined child must repeat, rejecting composite
    /// ids (joined inheritance below them is unsupported).
    fn id_column_name(&self) -> Result<SmolStr> {
        if let Some(join_column) = &self.primary_key_join_column {
            return Ok(join_column.name().into());
        }
        match &self.id_property {
            Some(IdProperty::Singular(id)) => Ok(id.column.name().into()),
            Some(IdProperty::Embedded(_)) => Err(GenerateError::model(format!(
                "joined inheritance below the composite id of {} is unsupported",
                self.name
            ))),
            None => Err(GenerateError::model(format!(
                "{} has no identifier",
                self.name
            ))),
        }
    }
}

impl std::fmt::Debug for EntityClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityClass")
            .field("name", &self.name)
            .field("table", &self.table.name())
            .field("inheritance", &self.inheritance)
            .finish_non_exhaustive()
    }
}

// ---- build phase ----

impl EntityClass {
    /// Builds the descriptor for `def`. Staged so that cyclic references
    /// between classes survive: associations store target names and resolve
    /// their descriptors lazily through the context cache.
    pub(crate) fn build(ctx: &GeneratorContext, def: &ClassDef) -> Result<EntityClass> {
        if def.mapped_superclass {
            return Err(GenerateError::model(format!(
                "{} is a mapped superclass, not an entity",
                def.name
            )));
        }

        let chain = ancestor_chain(ctx, def)?;

        // Overrides merge root-first so that nearer classes win.
        let mut attribute_overrides: IndexMap<SmolStr, ColumnDef> = IndexMap::default();
        let mut association_overrides: IndexMap<SmolStr, SmolStr> = IndexMap::default();
        for class in chain.iter().rev() {
            for (path, column) in &class.attribute_overrides {
                attribute_overrides.insert(path.clone(), column.clone());
            }
            for (path, column) in &class.association_overrides {
                association_overrides.insert(path.clone(), column.clone());
            }
        }

        // Named generators, root-first; first declaration wins.
        for class in chain.iter().rev() {
            for generator in &class.generators {
                ctx.register_generator(generator);
            }
        }

        // Inheritance: the nearest entity ancestor decides everything.
        let parent_entity = chain[1..].iter().find(|class| !class.mapped_superclass);
        let mut inheritance = def.inheritance;
        let mut hierarchy_root = def.name.clone();
        let mut joined_parent = None;
        let mut table = ctx.resolve_table(def.table.as_deref().unwrap_or(&def.name));

        if let Some(parent) = parent_entity {
            let parent_descriptor = ctx.descriptor(&parent.name)?;
            hierarchy_root = parent_descriptor.hierarchy_root().clone();
            let root_def = ctx.model().class(&hierarchy_root).ok_or_else(|| {
                GenerateError::model(format!("{hierarchy_root} is not a registered entity class"))
            })?;
            let strategy = root_def.inheritance.unwrap_or(InheritanceType::SingleTable);
            inheritance = Some(strategy);
            match strategy {
                InheritanceType::SingleTable => {
                    table = Rc::clone(ctx.descriptor(&hierarchy_root)?.table());
                }
                InheritanceType::Joined => joined_parent = Some(parent.name.clone()),
                InheritanceType::TablePerClass => {}
            }
        }

        let primary_key_join_column = match &joined_parent {
            Some(parent) => {
                let parent_descriptor = ctx.descriptor(parent)?;
                let name = match &def.primary_key_join_column {
                    Some(name) => name.clone(),
                    None => parent_descriptor.id_column_name()?,
                };
                Some(table.resolve_column(&name))
            }
            None => None,
        };

        // Discriminator: single-table hierarchies always, joined ones only
        // when the dialect demands it.
        let needs_discriminator = match inheritance {
            Some(InheritanceType::SingleTable) => true,
            Some(InheritanceType::Joined) => ctx.dialect().needs_joined_discriminator(),
            _ => false,
        };
        let discriminator = if needs_discriminator {
            let root_def = ctx.model().class(&hierarchy_root).expect("root resolved above");
            let column_def = root_def.discriminator_column.clone().unwrap_or_default();
            let discriminator_table = if parent_entity.is_some() {
                Rc::clone(ctx.descriptor(&hierarchy_root)?.table())
            } else {
                Rc::clone(&table)
            };
            Some(Discriminator {
                column: discriminator_table.resolve_column(&column_def.name),
                expression: discriminator_expression(ctx, &column_def, def)?,
            })
        } else {
            None
        };

        // Which declarations contribute attributes: everything for plain and
        // single-table/table-per-class hierarchies, own classes (plus mapped
        // superclasses below the entity parent) for joined children.
        let walk: Vec<&ClassDef> = if joined_parent.is_some() {
            chain
                .iter()
                .take_while(|class| class.name == def.name || class.mapped_superclass)
                .collect()
        } else {
            chain.iter().collect()
        };

        let builder = PropertyBuilder {
            ctx,
            table: &table,
            owner: &def.name,
            attribute_overrides: &attribute_overrides,
            association_overrides: &association_overrides,
        };

        // Identifier: discovered here for roots, inherited for joined
        // children.
        let mut id_property = None;
        let mut id_attribute = None;
        if let Some(parent) = &joined_parent {
            id_attribute = Some(ctx.descriptor(parent)?.id_attribute().clone());
        } else {
            'search: for class in walk.iter().rev().copied() {
                for attribute in &class.attributes {
                    match &attribute.kind {
                        AttributeKind::Id { generated } => {
                            let column_def = attribute_overrides
                                .get(&attribute.name)
                                .or(attribute.column.as_ref());
                            let column_name = column_def
                                .and_then(|c| c.name.clone())
                                .unwrap_or_else(|| attribute.name.clone());
                            let generator =
                                register_id_generator(ctx, class, &table, generated)?;
                            id_property = Some(IdProperty::Singular(SingularIdProperty {
                                name: attribute.name.clone(),
                                column: table.resolve_column(&column_name),
                                generator,
                            }));
                            id_attribute = Some(attribute.name.clone());
                            break 'search;
                        }
                        AttributeKind::EmbeddedId { type_name } => {
                            let embedded =
                                builder.build_embedded(&attribute.name, type_name, "", true)?;
                            id_property = Some(IdProperty::Embedded(embedded));
                            id_attribute = Some(attribute.name.clone());
                            break 'search;
                        }
                        _ => {}
                    }
                }
            }
            if id_property.is_none() {
                return Err(GenerateError::model(format!(
                    "{} declares no identifier attribute",
                    def.name
                )));
            }
        }
        let id_attribute = id_attribute.expect("set in both branches");

        // Remaining properties, root-most class first for stable column
        // order.
        let mut properties: IndexMap<SmolStr, Property> = IndexMap::default();
        let mut single_unique: Vec<SmolStr> = Vec::new();
        for class in walk.iter().rev().copied() {
            for attribute in &class.attributes {
                if let Some(property) = builder.build_property(attribute)? {
                    if attribute_is_unique(attribute) {
                        single_unique.push(property.name().clone());
                    }
                    properties.insert(property.name().clone(), property);
                }
            }
        }

        // Unique-key alternates.
        let settings = ctx.settings();
        let mut unique_properties = Vec::new();
        let mut unique_quality = None;
        if settings.max_unique_properties > 0 {
            let mut candidates: Vec<Vec<SmolStr>> =
                single_unique.into_iter().map(|name| vec![name]).collect();
            for class in walk.iter().rev().copied() {
                for constraint in &class.unique_constraints {
                    if constraint.len() > settings.max_unique_properties {
                        continue;
                    }
                    if let Some(names) = match_constraint_columns(&properties, constraint) {
                        candidates.push(names);
                    }
                }
            }
            for candidate in candidates {
                let quality = candidate_quality(&properties, &candidate);
                if quality > settings.unique_property_quality {
                    continue;
                }
                let better = match unique_quality {
                    None => true,
                    Some(current) => quality < current,
                };
                if better {
                    unique_quality = Some(quality);
                    unique_properties = candidate;
                }
            }
        }

        Ok(EntityClass {
            name: def.name.clone(),
            access: def.access,
            table,
            inheritance,
            hierarchy_root,
            joined_parent,
            primary_key_join_column,
            discriminator,
            id_property,
            id_attribute,
            properties,
            unique_properties,
            unique_quality,
            states: RefCell::new(StateMap::default()),
        })
    }
}

/// `def` first, then its declared ancestors up to the root.
fn ancestor_chain(ctx: &GeneratorContext, def: &ClassDef) -> Result<Vec<ClassDef>> {
    let mut chain = vec![def.clone()];
    let mut seen: AHashSet<SmolStr> = AHashSet::from_iter([def.name.clone()]);
    let mut parent = def.parent.clone();
    while let Some(name) = parent {
        if !seen.insert(name.clone()) {
            return Err(GenerateError::model(format!(
                "inheritance cycle involving {name}"
            )));
        }
        let class = ctx.model().class(&name).ok_or_else(|| {
            GenerateError::model(format!(
                "{}: superclass {name} is not registered",
                def.name
            ))
        })?;
        parent = class.parent.clone();
        chain.push(class.clone());
    }
    Ok(chain)
}

/// Literal distinguishing `def`'s rows, derived from the declared value or
/// the entity name. Integer discriminators without a declared value use a
/// stable FNV-1a hash of the entity name.
fn discriminator_expression(
    ctx: &GeneratorContext,
    column: &DiscriminatorColumnDef,
    def: &ClassDef,
) -> Result<String> {
    let declared = def
        .discriminator_value
        .clone()
        .unwrap_or_else(|| def.name.clone());
    Ok(match column.kind {
        DiscriminatorKind::String => {
            let truncated: String = declared.chars().take(column.length).collect();
            ctx.dialect().format_string(&truncated)
        }
        DiscriminatorKind::Char => {
            let first: String = declared.chars().take(1).collect();
            ctx.dialect().format_string(&first)
        }
        DiscriminatorKind::Integer => match def.discriminator_value.as_ref() {
            Some(value) => value
                .parse::<i64>()
                .map_err(|_| {
                    GenerateError::model(format!(
                        "{}: integer discriminator value {value} is not a number",
                        def.name
                    ))
                })?
                .to_string(),
            None => stable_discriminator_hash(&def.name).to_string(),
        },
    })
}

/// 32-bit FNV-1a; the standard offset/prime make the value reproducible
/// across runs and platforms.
fn stable_discriminator_hash(name: &str) -> i64 {
    let mut hash: u32 = 0x811c_9dc5;
    for byte in name.as_bytes() {
        hash ^= u32::from(*byte);
        hash = hash.wrapping_mul(0x0100_0193);
    }
    i64::from(hash)
}

/// Resolves the generator an id attribute uses, registering defaults on
/// first use. Default generator names derive from the declaring class so
/// that every descriptor of a hierarchy shares one value stream.
fn register_id_generator(
    ctx: &GeneratorContext,
    declaring: &ClassDef,
    table: &TableRef,
    generated: &Option<GeneratedValueDef>,
) -> Result<SmolStr> {
    let Some(generated) = generated else {
        return Ok(ctx.ensure_assigned_generator());
    };

    let strategy = match generated.strategy {
        GenerationStrategy::Auto => {
            if ctx.dialect().supports_sequences() {
                GenerationStrategy::Sequence
            } else {
                GenerationStrategy::Identity
            }
        }
        other => other,
    };

    let declared_table = declaring.table.as_deref().unwrap_or(&declaring.name);
    match strategy {
        GenerationStrategy::Sequence => match &generated.generator {
            Some(name) => ctx.ensure_sequence_generator(name),
            None => ctx.ensure_sequence_generator(&format!("{declared_table}_seq")),
        },
        GenerationStrategy::Identity => ctx.ensure_identity_generator(table.name()),
        GenerationStrategy::Table => match &generated.generator {
            Some(name) => Ok(ctx.ensure_table_generator(name)),
            None => Ok(ctx.ensure_table_generator(&format!("{declared_table}_gen"))),
        },
        GenerationStrategy::Auto => unreachable!("resolved above"),
    }
}

fn attribute_is_unique(attribute: &AttributeDef) -> bool {
    match &attribute.kind {
        AttributeKind::Basic { .. } => {
            attribute.column.as_ref().is_some_and(|column| column.unique)
        }
        AttributeKind::Reference {
            unique,
            mapped_by,
            join_column,
            ..
        } => {
            mapped_by.is_none()
                && (*unique || join_column.as_ref().is_some_and(|column| column.unique))
        }
        _ => false,
    }
}

/// Maps a table-level unique constraint's columns onto property names;
/// `None` when any column belongs to no singular property.
fn match_constraint_columns(
    properties: &IndexMap<SmolStr, Property>,
    columns: &[SmolStr],
) -> Option<Vec<SmolStr>> {
    let mut names = Vec::with_capacity(columns.len());
    for column in columns {
        let property = properties.values().find(|property| {
            property
                .column()
                .is_some_and(|c| c.name().eq_ignore_ascii_case(column))
        })?;
        names.push(property.name().clone());
    }
    Some(names)
}

fn candidate_quality(
    properties: &IndexMap<SmolStr, Property>,
    names: &[SmolStr],
) -> UniquePropertyQuality {
    let all_required = names.iter().all(|name| properties[name].is_required());
    let all_primitive = names.iter().all(|name| properties[name].is_primitive());
    match (all_required, all_primitive) {
        (true, true) => UniquePropertyQuality::OnlyRequiredPrimitives,
        (true, false) => UniquePropertyQuality::OnlyRequired,
        (false, true) => UniquePropertyQuality::OnlyPrimitives,
        (false, false) => UniquePropertyQuality::AllowsNulls,
    }
}

/// Shared state for turning attribute declarations into properties.
struct PropertyBuilder<'a> {
    ctx: &'a GeneratorContext,
    table: &'a TableRef,
    owner: &'a SmolStr,
    attribute_overrides: &'a IndexMap<SmolStr, ColumnDef>,
    association_overrides: &'a IndexMap<SmolStr, SmolStr>,
}

impl PropertyBuilder<'_> {
    fn build_property(&self, attribute: &AttributeDef) -> Result<Option<Property>> {
        self.build_property_at(attribute, "")
    }

    /// `prefix` is the override path of the embedding site (`""` at the top,
    /// `"address."` inside an embedded attribute, and so on).
    fn build_property_at(&self, attribute: &AttributeDef, prefix: &str) -> Result<Option<Property>> {
        let path = format!("{prefix}{}", attribute.name);
        Ok(Some(match &attribute.kind {
            AttributeKind::Transient
            | AttributeKind::Id { .. }
            | AttributeKind::EmbeddedId { .. } => return Ok(None),

            AttributeKind::Basic { optional } => {
                let column_def = self
                    .attribute_overrides
                    .get(path.as_str())
                    .or(attribute.column.as_ref());
                let column_name = column_def
                    .and_then(|c| c.name.clone())
                    .unwrap_or_else(|| attribute.name.clone());
                let required =
                    !*optional || column_def.is_some_and(|column| !column.nullable);
                Property::Primitive(PrimitiveProperty::new(
                    attribute.name.clone(),
                    self.table.resolve_column(&column_name),
                    required,
                ))
            }

            AttributeKind::Version => {
                let column_def = self
                    .attribute_overrides
                    .get(path.as_str())
                    .or(attribute.column.as_ref());
                let column_name = column_def
                    .and_then(|c| c.name.clone())
                    .unwrap_or_else(|| attribute.name.clone());
                Property::Version(VersionProperty::new(
                    attribute.name.clone(),
                    self.table.resolve_column(&column_name),
                ))
            }

            AttributeKind::Embedded { type_name } => Property::Embedded(self.build_embedded(
                &attribute.name,
                type_name,
                prefix,
                false,
            )?),

            AttributeKind::Reference {
                target,
                optional,
                unique,
                mapped_by,
                join_column,
            } => {
                if mapped_by.is_some() {
                    Property::Reference(ReferenceProperty::new(
                        attribute.name.clone(),
                        target.clone(),
                        None,
                        false,
                        false,
                    ))
                } else {
                    let column_name = self
                        .association_overrides
                        .get(path.as_str())
                        .cloned()
                        .or_else(|| join_column.as_ref().and_then(|c| c.name.clone()))
                        .unwrap_or_else(|| SmolStr::new(format!("{}_id", attribute.name)));
                    let required = !*optional
                        || join_column.as_ref().is_some_and(|column| !column.nullable);
                    Property::Reference(ReferenceProperty::new(
                        attribute.name.clone(),
                        target.clone(),
                        Some(self.table.resolve_column(&column_name)),
                        required,
                        *unique || join_column.as_ref().is_some_and(|c| c.unique),
                    ))
                }
            }

            AttributeKind::Collection {
                element,
                mapped_by,
                join_table,
                order_column,
            } => {
                let mapping = match mapped_by {
                    Some(attribute) => CollectionMapping::MappedBy {
                        attribute: attribute.clone(),
                    },
                    None => {
                        let defaults = JoinTableDef::default();
                        let join_table = join_table.as_ref().unwrap_or(&defaults);
                        let table_name = join_table
                            .name
                            .clone()
                            .unwrap_or_else(|| SmolStr::new(format!("{}_{}", self.owner, attribute.name)));
                        let join = self.ctx.resolve_table(&table_name);
                        let owner_column = join_table
                            .owner_column
                            .clone()
                            .unwrap_or_else(|| SmolStr::new(format!("{}_id", self.owner)));
                        let element_column = join_table.element_column.clone().unwrap_or_else(
                            || match element {
                                ElementKind::Entity(target) => {
                                    SmolStr::new(format!("{target}_id"))
                                }
                                ElementKind::Basic => attribute.name.clone(),
                            },
                        );
                        CollectionMapping::JoinTable {
                            owner_column: join.resolve_column(&owner_column),
                            element_column: join.resolve_column(&element_column),
                            order_column: order_column
                                .as_ref()
                                .map(|name| join.resolve_column(name)),
                            table: join,
                        }
                    }
                };
                Property::Collection(CollectionProperty::new(
                    attribute.name.clone(),
                    element.clone(),
                    mapping,
                ))
            }

            AttributeKind::MapCollection { element, join_table } => {
                let defaults = JoinTableDef::default();
                let join_table = join_table.as_ref().unwrap_or(&defaults);
                let table_name = join_table
                    .name
                    .clone()
                    .unwrap_or_else(|| SmolStr::new(format!("{}_{}", self.owner, attribute.name)));
                let join = self.ctx.resolve_table(&table_name);
                let owner_column = join_table
                    .owner_column
                    .clone()
                    .unwrap_or_else(|| SmolStr::new(format!("{}_id", self.owner)));
                let key_column = join_table
                    .key_column
                    .clone()
                    .unwrap_or_else(|| SmolStr::new(format!("{}_KEY", attribute.name)));
                let element_column =
                    join_table
                        .element_column
                        .clone()
                        .unwrap_or_else(|| match element {
                            ElementKind::Entity(target) => SmolStr::new(format!("{target}_id")),
                            ElementKind::Basic => attribute.name.clone(),
                        });
                Property::MapCollection(MapProperty::new(
                    attribute.name.clone(),
                    Rc::clone(&join),
                    join.resolve_column(&owner_column),
                    join.resolve_column(&key_column),
                    join.resolve_column(&element_column),
                ))
            }
        }))
    }

    /// Builds the property map of an embedded value, applying the embedding
    /// site's overrides (`attr.sub` paths).
    fn build_embedded(
        &self,
        name: &SmolStr,
        type_name: &SmolStr,
        prefix: &str,
        id_role: bool,
    ) -> Result<EmbeddedProperty> {
        let embeddable = self.ctx.model().embeddable(type_name).ok_or_else(|| {
            GenerateError::model(format!(
                "{}.{name}: {type_name} is not a registered embeddable type",
                self.owner
            ))
        })?;
        let nested_prefix = format!("{prefix}{name}.");
        let mut properties: IndexMap<SmolStr, Property> = IndexMap::default();
        for attribute in &embeddable.attributes {
            if let Some(property) = self.build_property_at(attribute, &nested_prefix)? {
                properties.insert(property.name().clone(), property);
            }
        }
        Ok(EmbeddedProperty::new(
            name.clone(),
            type_name.clone(),
            id_role,
            properties,
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use crate::model::properties::PropertyOps;
    use pretty_assertions::assert_eq;
    use smol_str::SmolStr;

    use crate::context::{GeneratorContext, GeneratorSettings};
    use crate::dialects::{DialectKind, kind_to_dialect};
    use crate::helpers::Config;
    use crate::model::descriptor::{IdProperty, UniquePropertyQuality};
    use crate::model::metadata::{
        AttributeDef, ClassDef, ColumnDef, DiscriminatorColumnDef, DiscriminatorKind, EntityModel,
        GenerationStrategy, InheritanceType,
    };

    fn context(model: EntityModel) -> GeneratorContext {
        GeneratorContext::new(
            model,
            kind_to_dialect(DialectKind::H2),
            GeneratorSettings::default(),
        )
    }

    fn person_model() -> EntityModel {
        let mut model = EntityModel::new();
        model.add_class(
            ClassDef::new("Person")
                .attribute(AttributeDef::generated_id("id", GenerationStrategy::Auto))
                .attribute(AttributeDef::required("name"))
                .attribute(AttributeDef::basic("nickname")),
        );
        model
    }

    #[test]
    fn descriptor_construction_is_memoized() {
        let ctx = context(person_model());
        let first = ctx.descriptor("Person").unwrap();
        let again = ctx.descriptor("Person").unwrap();
        assert!(Rc::ptr_eq(&first, &again));
    }

    #[test]
    fn basic_class_resolves_table_id_and_properties() {
        let ctx = context(person_model());
        let person = ctx.descriptor("Person").unwrap();

        assert_eq!(person.table().name(), "Person");
        assert_eq!(person.id_attribute(), "id");
        let Some(IdProperty::Singular(id)) = person.id_property() else {
            panic!("expected a singular id");
        };
        assert_eq!(id.column().name(), "id");
        assert_eq!(id.generator(), "Person_seq");

        let names: Vec<_> = person.properties().map(|p| p.name().as_str()).collect();
        assert_eq!(names, ["name", "nickname"]);
    }

    #[test]
    fn unknown_classes_are_model_errors() {
        let ctx = context(person_model());
        assert!(ctx.descriptor("Stranger").is_err());
    }

    #[test]
    fn missing_identifier_is_a_model_error() {
        let mut model = EntityModel::new();
        model.add_class(ClassDef::new("Broken").attribute(AttributeDef::basic("name")));
        let ctx = context(model);
        assert!(ctx.descriptor("Broken").is_err());
    }

    fn animal_model(kind: DiscriminatorKind, length: usize) -> EntityModel {
        let mut model = EntityModel::new();
        model.add_class(
            ClassDef::new("Animal")
                .config(|class| {
                    class.inheritance = Some(InheritanceType::SingleTable);
                    class.discriminator_column = Some(DiscriminatorColumnDef {
                        name: "DTYPE".into(),
                        kind,
                        length,
                    });
                })
                .attribute(AttributeDef::generated_id("id", GenerationStrategy::Auto))
                .attribute(AttributeDef::basic("name")),
        );
        model.add_class(
            ClassDef::new("Wolfhound")
                .config(|class| class.parent = Some("Animal".into()))
                .attribute(AttributeDef::basic("bark_volume")),
        );
        model
    }

    #[test]
    fn single_table_children_share_the_root_table() {
        let ctx = context(animal_model(DiscriminatorKind::String, 31));
        let root = ctx.descriptor("Animal").unwrap();
        let child = ctx.descriptor("Wolfhound").unwrap();

        assert!(Rc::ptr_eq(root.table(), child.table()));
        assert_eq!(child.hierarchy_root(), "Animal");
        assert!(child.joined_parent().is_none());

        // The child walks the whole hierarchy, so it sees the root's
        // attributes as its own.
        let names: Vec<_> = child.properties().map(|p| p.name().as_str()).collect();
        assert_eq!(names, ["name", "bark_volume"]);

        // Both share one id generator.
        let Some(IdProperty::Singular(id)) = child.id_property() else {
            panic!("expected a singular id");
        };
        assert_eq!(id.generator(), "Animal_seq");
    }

    #[test]
    fn string_discriminators_truncate_to_the_declared_length() {
        let ctx = context(animal_model(DiscriminatorKind::String, 4));
        let child = ctx.descriptor("Wolfhound").unwrap();
        assert_eq!(child.discriminator().unwrap().expression, "'Wolf'");
    }

    #[test]
    fn char_discriminators_use_the_first_character() {
        let ctx = context(animal_model(DiscriminatorKind::Char, 1));
        let child = ctx.descriptor("Wolfhound").unwrap();
        assert_eq!(child.discriminator().unwrap().expression, "'W'");
    }

    #[test]
    fn integer_discriminators_are_stable_across_runs() {
        let first = context(animal_model(DiscriminatorKind::Integer, 31));
        let second = context(animal_model(DiscriminatorKind::Integer, 31));
        let expression = first
            .descriptor("Wolfhound")
            .unwrap()
            .discriminator()
            .unwrap()
            .expression
            .clone();
        assert_eq!(
            expression,
            second
                .descriptor("Wolfhound")
                .unwrap()
                .discriminator()
                .unwrap()
                .expression
        );
        expression.parse::<i64>().expect("an integer literal");
    }

    fn joined_model() -> EntityModel {
        let mut model = EntityModel::new();
        model.add_class(
            ClassDef::new("Animal")
                .config(|class| class.inheritance = Some(InheritanceType::Joined))
                .attribute(AttributeDef::generated_id("id", GenerationStrategy::Auto))
                .attribute(AttributeDef::basic("name")),
        );
        model.add_class(
            ClassDef::new("Dog")
                .config(|class| class.parent = Some("Animal".into()))
                .attribute(AttributeDef::basic("bark_volume")),
        );
        model
    }

    #[test]
    fn joined_children_reuse_the_parent_identifier() {
        let ctx = context(joined_model());
        let child = ctx.descriptor("Dog").unwrap();

        assert_eq!(child.table().name(), "Dog");
        assert_eq!(child.joined_parent().map(SmolStr::as_str), Some("Animal"));
        assert!(child.id_property().is_none());
        assert_eq!(child.id_attribute(), "id");
        assert_eq!(
            child.primary_key_join_column().unwrap().name(),
            "id"
        );

        // Own attributes only; the parent keeps its own.
        let names: Vec<_> = child.properties().map(|p| p.name().as_str()).collect();
        assert_eq!(names, ["bark_volume"]);

        // No discriminator unless the dialect demands one.
        assert!(child.discriminator().is_none());

        let chain = child.table_chain(&ctx).unwrap();
        let tables: Vec<_> = chain.iter().map(|d| d.table().name().to_owned()).collect();
        assert_eq!(tables, ["Animal", "Dog"]);
    }

    #[test]
    fn inheritance_cycles_are_model_errors() {
        let mut model = EntityModel::new();
        model.add_class(ClassDef::new("A").config(|class| class.parent = Some("B".into())));
        model.add_class(ClassDef::new("B").config(|class| class.parent = Some("A".into())));
        let ctx = context(model);
        assert!(ctx.descriptor("A").is_err());
    }

    fn country_class(code_nullable: bool) -> ClassDef {
        ClassDef::new("Country")
            .attribute(AttributeDef::generated_id("id", GenerationStrategy::Auto))
            .attribute(AttributeDef::basic("code").config(|attribute| {
                attribute.column = Some(ColumnDef {
                    name: None,
                    nullable: code_nullable,
                    unique: true,
                    length: None,
                });
            }))
    }

    #[test]
    fn required_unique_columns_become_alternates() {
        let mut model = EntityModel::new();
        model.add_class(country_class(false));
        let ctx = context(model);
        let country = ctx.descriptor("Country").unwrap();

        assert_eq!(country.unique_properties(), ["code"]);
        assert_eq!(
            country.unique_quality(),
            Some(UniquePropertyQuality::OnlyRequiredPrimitives)
        );
    }

    #[test]
    fn nullable_alternates_are_rejected_by_the_default_threshold() {
        let mut model = EntityModel::new();
        model.add_class(country_class(true));
        let ctx = context(model);
        let country = ctx.descriptor("Country").unwrap();
        assert!(country.unique_properties().is_empty());
    }

    #[test]
    fn loosening_the_threshold_admits_nullable_alternates() {
        let mut model = EntityModel::new();
        model.add_class(country_class(true));
        let ctx = GeneratorContext::new(
            model,
            kind_to_dialect(DialectKind::H2),
            GeneratorSettings::default().config(|settings| {
                settings.unique_property_quality = UniquePropertyQuality::AllowsNulls;
            }),
        );
        let country = ctx.descriptor("Country").unwrap();
        assert_eq!(country.unique_properties(), ["code"]);
        assert_eq!(
            country.unique_quality(),
            Some(UniquePropertyQuality::OnlyPrimitives)
        );
    }

    #[test]
    fn zero_max_unique_properties_disables_alternates() {
        let mut model = EntityModel::new();
        model.add_class(country_class(false));
        let ctx = GeneratorContext::new(
            model,
            kind_to_dialect(DialectKind::H2),
            GeneratorSettings::default()
                .config(|settings| settings.max_unique_properties = 0),
        );
        let country = ctx.descriptor("Country").unwrap();
        assert!(country.unique_properties().is_empty());
    }

    #[test]
    fn table_constraints_map_to_property_sets() {
        let mut model = EntityModel::new();
        model.add_class(
            ClassDef::new("City")
                .config(|class| {
                    class.unique_constraints =
                        vec![vec!["country_code".into(), "zip".into()]];
                })
                .attribute(AttributeDef::generated_id("id", GenerationStrategy::Auto))
                .attribute(AttributeDef::required("country_code"))
                .attribute(AttributeDef::required("zip")),
        );
        let ctx = GeneratorContext::new(
            model,
            kind_to_dialect(DialectKind::H2),
            GeneratorSettings::default()
                .config(|settings| settings.max_unique_properties = 2),
        );
        let city = ctx.descriptor("City").unwrap();
        assert_eq!(city.unique_properties(), ["country_code", "zip"]);
    }
}
