use smol_str::SmolStr;

use crate::helpers::IndexMap;

/// Declarative description of the application's persistent classes.
///
/// This is the registration API: the application (or a build-time generator)
/// describes its classes here, and the descriptor machinery normalizes the
/// description into [`EntityClass`](super::descriptor::EntityClass) values.
/// Everything is plain data; the `Config` helper keeps construction readable.
#[derive(Debug, Clone, Default)]
pub struct EntityModel {
    classes: IndexMap<SmolStr, ClassDef>,
    embeddables: IndexMap<SmolStr, EmbeddableDef>,
}

impl EntityModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_class(&mut self, class: ClassDef) -> &mut Self {
        self.classes.insert(class.name.clone(), class);
        self
    }

    pub fn add_embeddable(&mut self, embeddable: EmbeddableDef) -> &mut Self {
        self.embeddables
            .insert(embeddable.name.clone(), embeddable);
        self
    }

    pub fn class(&self, name: &str) -> Option<&ClassDef> {
        self.classes.get(name)
    }

    pub fn embeddable(&self, name: &str) -> Option<&EmbeddableDef> {
        self.embeddables.get(name)
    }

    pub fn classes(&self) -> impl Iterator<Item = &ClassDef> {
        self.classes.values()
    }
}

/// How attribute values are read from instances. Descriptive only at run
/// time; kept because access style is part of the declared model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccessStyle {
    #[default]
    Field,
    Method,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InheritanceType {
    SingleTable,
    Joined,
    TablePerClass,
}

/// One persistent class as declared.
#[derive(Debug, Clone)]
pub struct ClassDef {
    pub name: SmolStr,
    pub parent: Option<SmolStr>,
    /// Mapped superclasses contribute attributes but no table of their own.
    pub mapped_superclass: bool,
    pub access: AccessStyle,
    pub table: Option<SmolStr>,
    pub inheritance: Option<InheritanceType>,
    pub discriminator_column: Option<DiscriminatorColumnDef>,
    pub discriminator_value: Option<SmolStr>,
    pub primary_key_join_column: Option<SmolStr>,
    pub generators: Vec<GeneratorDef>,
    /// Attribute overrides keyed by attribute path (`attr` or `attr.sub`).
    pub attribute_overrides: IndexMap<SmolStr, ColumnDef>,
    pub association_overrides: IndexMap<SmolStr, SmolStr>,
    /// Table-level unique constraints as lists of column names.
    pub unique_constraints: Vec<Vec<SmolStr>>,
    pub attributes: Vec<AttributeDef>,
}

impl ClassDef {
    pub fn new(name: impl Into<SmolStr>) -> Self {
        ClassDef {
            name: name.into(),
            parent: None,
            mapped_superclass: false,
            access: AccessStyle::default(),
            table: None,
            inheritance: None,
            discriminator_column: None,
            discriminator_value: None,
            primary_key_join_column: None,
            generators: Vec::new(),
            attribute_overrides: IndexMap::default(),
            association_overrides: IndexMap::default(),
            unique_constraints: Vec::new(),
            attributes: Vec::new(),
        }
    }

    pub fn attribute(mut self, attribute: AttributeDef) -> Self {
        self.attributes.push(attribute);
        self
    }
}

/// An embeddable value type: attributes without identity or table.
#[derive(Debug, Clone)]
pub struct EmbeddableDef {
    pub name: SmolStr,
    pub attributes: Vec<AttributeDef>,
}

impl EmbeddableDef {
    pub fn new(name: impl Into<SmolStr>) -> Self {
        EmbeddableDef {
            name: name.into(),
            attributes: Vec::new(),
        }
    }

    pub fn attribute(mut self, attribute: AttributeDef) -> Self {
        self.attributes.push(attribute);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DiscriminatorKind {
    #[default]
    String,
    Char,
    Integer,
}

#[derive(Debug, Clone)]
pub struct DiscriminatorColumnDef {
    pub name: SmolStr,
    pub kind: DiscriminatorKind,
    pub length: usize,
}

impl Default for DiscriminatorColumnDef {
    fn default() -> Self {
        DiscriminatorColumnDef {
            name: "DTYPE".into(),
            kind: DiscriminatorKind::String,
            length: 31,
        }
    }
}

/// Column-level declaration shared by basic attributes and overrides.
#[derive(Debug, Clone, Default)]
pub struct ColumnDef {
    pub name: Option<SmolStr>,
    pub nullable: bool,
    pub unique: bool,
    pub length: Option<usize>,
}

impl ColumnDef {
    pub fn named(name: impl Into<SmolStr>) -> Self {
        ColumnDef {
            name: Some(name.into()),
            nullable: true,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GenerationStrategy {
    #[default]
    Auto,
    Identity,
    Sequence,
    Table,
}

#[derive(Debug, Clone, Default)]
pub struct GeneratedValueDef {
    pub strategy: GenerationStrategy,
    pub generator: Option<SmolStr>,
}

/// A named sequence or table generator declared on a class.
#[derive(Debug, Clone)]
pub enum GeneratorDef {
    Sequence {
        name: SmolStr,
        sequence: SmolStr,
        initial_value: i64,
        allocation_size: i64,
    },
    Table {
        name: SmolStr,
        table: SmolStr,
        pk_column: SmolStr,
        value_column: SmolStr,
        pk_value: SmolStr,
        initial_value: i64,
        allocation_size: i64,
    },
}

impl GeneratorDef {
    pub fn name(&self) -> &SmolStr {
        match self {
            GeneratorDef::Sequence { name, .. } | GeneratorDef::Table { name, .. } => name,
        }
    }

    pub fn sequence(name: impl Into<SmolStr>, sequence: impl Into<SmolStr>) -> Self {
        GeneratorDef::Sequence {
            name: name.into(),
            sequence: sequence.into(),
            initial_value: 1,
            allocation_size: 1,
        }
    }
}

/// Which kind of collection elements a plural attribute holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementKind {
    Entity(SmolStr),
    Basic,
}

/// Join-table declaration for plural attributes.
#[derive(Debug, Clone, Default)]
pub struct JoinTableDef {
    pub name: Option<SmolStr>,
    pub owner_column: Option<SmolStr>,
    pub element_column: Option<SmolStr>,
    pub key_column: Option<SmolStr>,
}

#[derive(Debug, Clone)]
pub enum AttributeKind {
    Basic {
        optional: bool,
    },
    Version,
    Id {
        generated: Option<GeneratedValueDef>,
    },
    EmbeddedId {
        type_name: SmolStr,
    },
    Embedded {
        type_name: SmolStr,
    },
    /// Singular association: many-to-one, or one-to-one from either side.
    Reference {
        target: SmolStr,
        optional: bool,
        unique: bool,
        mapped_by: Option<SmolStr>,
        join_column: Option<ColumnDef>,
    },
    Collection {
        element: ElementKind,
        mapped_by: Option<SmolStr>,
        join_table: Option<JoinTableDef>,
        order_column: Option<SmolStr>,
    },
    MapCollection {
        element: ElementKind,
        join_table: Option<JoinTableDef>,
    },
    Transient,
}

#[derive(Debug, Clone)]
pub struct AttributeDef {
    pub name: SmolStr,
    pub kind: AttributeKind,
    pub column: Option<ColumnDef>,
}

impl AttributeDef {
    pub fn basic(name: impl Into<SmolStr>) -> Self {
        AttributeDef {
            name: name.into(),
            kind: AttributeKind::Basic { optional: true },
            column: None,
        }
    }

    pub fn required(name: impl Into<SmolStr>) -> Self {
        AttributeDef {
            name: name.into(),
            kind: AttributeKind::Basic { optional: false },
            column: None,
        }
    }

    pub fn version(name: impl Into<SmolStr>) -> Self {
        AttributeDef {
            name: name.into(),
            kind: AttributeKind::Version,
            column: None,
        }
    }

    /// An identifier the application assigns itself.
    pub fn id(name: impl Into<SmolStr>) -> Self {
        AttributeDef {
            name: name.into(),
            kind: AttributeKind::Id { generated: None },
            column: None,
        }
    }

    pub fn generated_id(name: impl Into<SmolStr>, strategy: GenerationStrategy) -> Self {
        AttributeDef {
            name: name.into(),
            kind: AttributeKind::Id {
                generated: Some(GeneratedValueDef {
                    strategy,
                    generator: None,
                }),
            },
            column: None,
        }
    }

    pub fn embedded_id(name: impl Into<SmolStr>, type_name: impl Into<SmolStr>) -> Self {
        AttributeDef {
            name: name.into(),
            kind: AttributeKind::EmbeddedId {
                type_name: type_name.into(),
            },
            column: None,
        }
    }

    pub fn embedded(name: impl Into<SmolStr>, type_name: impl Into<SmolStr>) -> Self {
        AttributeDef {
            name: name.into(),
            kind: AttributeKind::Embedded {
                type_name: type_name.into(),
            },
            column: None,
        }
    }

    pub fn reference(name: impl Into<SmolStr>, target: impl Into<SmolStr>) -> Self {
        AttributeDef {
            name: name.into(),
            kind: AttributeKind::Reference {
                target: target.into(),
                optional: true,
                unique: false,
                mapped_by: None,
                join_column: None,
            },
            column: None,
        }
    }

    pub fn required_reference(name: impl Into<SmolStr>, target: impl Into<SmolStr>) -> Self {
        let mut attribute = Self::reference(name, target);
        if let AttributeKind::Reference { optional, .. } = &mut attribute.kind {
            *optional = false;
        }
        attribute
    }

    pub fn collection(name: impl Into<SmolStr>, target: impl Into<SmolStr>) -> Self {
        AttributeDef {
            name: name.into(),
            kind: AttributeKind::Collection {
                element: ElementKind::Entity(target.into()),
                mapped_by: None,
                join_table: None,
                order_column: None,
            },
            column: None,
        }
    }

    pub fn transient(name: impl Into<SmolStr>) -> Self {
        AttributeDef {
            name: name.into(),
            kind: AttributeKind::Transient,
            column: None,
        }
    }
}
