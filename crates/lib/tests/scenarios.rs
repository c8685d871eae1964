use std::cell::RefCell;
use std::rc::Rc;

use expect_test::expect;
use pretty_assertions::assert_eq;
use sqlseed_lib::providers::{DataProvider, ProviderFactory};
use sqlseed_lib::{ABORT_MARKER, EntityImporter, ImporterConfig};
use sqlseed_lib_core::context::{GeneratorContext, GeneratorSettings};
use sqlseed_lib_core::dialects::{DialectKind, SqlDialect, kind_to_dialect};
use sqlseed_lib_core::errors::{GenerateError, Result};
use sqlseed_lib_core::generator::EntitySqlGenerator;
use sqlseed_lib_core::helpers::Config;
use sqlseed_lib_core::instance::EntityHandle;
use sqlseed_lib_core::model::metadata::{
    AttributeDef, AttributeKind, ClassDef, ColumnDef, DiscriminatorColumnDef, DiscriminatorKind,
    ElementKind, EmbeddableDef, EntityModel, GenerationStrategy, InheritanceType,
};
use sqlseed_lib_core::value::Value;
use sqlseed_lib_core::writer::CollectingWriter;

fn generate(
    model: EntityModel,
    dialect: DialectKind,
    settings: GeneratorSettings,
    run: impl FnOnce(&mut EntitySqlGenerator<'_>) -> Result<()>,
) -> Vec<String> {
    generate_with(model, kind_to_dialect(dialect), settings, run)
}

fn generate_with(
    model: EntityModel,
    dialect: Box<dyn SqlDialect>,
    settings: GeneratorSettings,
    run: impl FnOnce(&mut EntitySqlGenerator<'_>) -> Result<()>,
) -> Vec<String> {
    let ctx = GeneratorContext::new(model, dialect, settings);
    let mut writer = CollectingWriter::new();
    {
        let mut generator = EntitySqlGenerator::new(&ctx, &mut writer);
        run(&mut generator).unwrap();
        generator.flush().unwrap();
    }
    writer.statements().to_vec()
}

fn person_model() -> EntityModel {
    let mut model = EntityModel::new();
    model.add_class(
        ClassDef::new("Person")
            .attribute(AttributeDef::generated_id("id", GenerationStrategy::Auto))
            .attribute(AttributeDef::basic("name")),
    );
    model
}

// Scenario: one freshly created entity with a sequence-backed id.
#[test]
fn single_entity_with_sequence_id() {
    let alice = EntityHandle::new("Person");
    alice.set("name", "alice");

    let statements = generate(
        person_model(),
        DialectKind::H2,
        GeneratorSettings::default(),
        |generator| generator.write_entity(&alice),
    );

    assert_eq!(
        statements,
        ["INSERT INTO Person (id, name) VALUES (1, 'alice')"]
    );
}

// Scenario: identity ids omit the column, and a reference right after the
// insert reads the connection's identity-current value.
#[test]
fn identity_id_with_current_value_reference() {
    let mut model = person_model();
    model.add_class(
        ClassDef::new("Pet")
            .attribute(AttributeDef::generated_id("id", GenerationStrategy::Auto))
            .attribute(AttributeDef::reference("owner", "Person")),
    );

    let alice = EntityHandle::new("Person");
    alice.set("name", "alice");
    let pet = EntityHandle::new("Pet");
    pet.set("owner", alice.clone());

    let statements = generate(
        model,
        DialectKind::Mysql,
        GeneratorSettings::default(),
        |generator| {
            generator.write_entity(&alice)?;
            generator.write_entity(&pet)
        },
    );

    assert_eq!(
        statements,
        [
            "INSERT INTO Person (name) VALUES ('alice')",
            "INSERT INTO Pet (owner_id) VALUES (last_insert_id())",
        ]
    );
}

// Scenario: a reference cycle resolves through NULL plus a deferred update.
#[test]
fn reference_cycle_defers_one_side() {
    let mut model = EntityModel::new();
    model.add_class(
        ClassDef::new("A")
            .attribute(AttributeDef::generated_id("id", GenerationStrategy::Auto))
            .attribute(AttributeDef::reference("b", "B")),
    );
    model.add_class(
        ClassDef::new("B")
            .attribute(AttributeDef::generated_id("id", GenerationStrategy::Auto))
            .attribute(AttributeDef::reference("a", "A")),
    );

    let a = EntityHandle::new("A");
    let b = EntityHandle::new("B");
    a.set("b", b.clone());
    b.set("a", a.clone());

    let statements = generate(
        model,
        DialectKind::H2,
        GeneratorSettings::default(),
        |generator| {
            generator.write_entity(&a)?;
            generator.write_entity(&b)
        },
    );

    assert_eq!(
        statements,
        [
            "INSERT INTO A (id, b_id) VALUES (1, null)",
            "INSERT INTO B (id, a_id) VALUES (1, 1)",
            "UPDATE A SET b_id = 1 WHERE id = 1",
        ]
    );
}

/// H2 shapes, but insisting on a discriminator for joined hierarchies.
struct DemandingDialect;

impl SqlDialect for DemandingDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::H2
    }

    fn supports_sequences(&self) -> bool {
        true
    }

    fn needs_joined_discriminator(&self) -> bool {
        true
    }
}

// Scenario: joined inheritance writes the root row (with the child's
// discriminator) before the child row, repeating the id.
#[test]
fn joined_inheritance_writes_the_chain_root_first() {
    let mut model = EntityModel::new();
    model.add_class(
        ClassDef::new("Animal")
            .config(|class| {
                class.inheritance = Some(InheritanceType::Joined);
                class.discriminator_column = Some(DiscriminatorColumnDef {
                    name: "type".into(),
                    kind: DiscriminatorKind::String,
                    length: 31,
                });
            })
            .attribute(AttributeDef::generated_id("id", GenerationStrategy::Auto))
            .attribute(AttributeDef::basic("name")),
    );
    model.add_class(
        ClassDef::new("Dog")
            .config(|class| class.parent = Some("Animal".into()))
            .attribute(AttributeDef::basic("bark_volume")),
    );

    let dog = EntityHandle::new("Dog");
    dog.set("name", "Rex");
    dog.set("bark_volume", 42i64);

    let statements = generate_with(
        model,
        Box::new(DemandingDialect),
        GeneratorSettings::default(),
        |generator| generator.write_entity(&dog),
    );

    assert_eq!(
        statements,
        [
            "INSERT INTO Animal (id, type, name) VALUES (1, 'Dog', 'Rex')",
            "INSERT INTO Dog (id, bark_volume) VALUES (1, 42)",
        ]
    );
}

// Scenario: a pre-existing row with a unique key is referenced through a
// sub-select because its id was never loaded.
#[test]
fn existing_entity_referenced_through_unique_key() {
    let mut model = EntityModel::new();
    model.add_class(
        ClassDef::new("Country")
            .attribute(AttributeDef::generated_id("id", GenerationStrategy::Auto))
            .attribute(AttributeDef::basic("code").config(|attribute| {
                attribute.column = Some(ColumnDef {
                    name: None,
                    nullable: false,
                    unique: true,
                    length: None,
                });
            })),
    );
    model.add_class(
        ClassDef::new("Person")
            .attribute(AttributeDef::generated_id("id", GenerationStrategy::Auto))
            .attribute(AttributeDef::reference("country", "Country")),
    );

    let germany = EntityHandle::new("Country");
    germany.set("code", "DE");
    let person = EntityHandle::new("Person");
    person.set("country", germany.clone());

    let statements = generate(
        model,
        DialectKind::H2,
        GeneratorSettings::default(),
        |generator| {
            generator.mark_existing_entity(&germany)?;
            generator.write_entity(&person)
        },
    );

    assert_eq!(
        statements,
        ["INSERT INTO Person (id, country_id) VALUES (1, (SELECT id FROM Country WHERE code = 'DE'))"]
    );
}

// Relative-id mode: the row's own id is the next-value expression; later
// references use the current value or a unique-key sub-select.
#[test]
fn relative_ids_prefer_database_side_expressions() {
    let mut model = EntityModel::new();
    model.add_class(
        ClassDef::new("Person")
            .attribute(AttributeDef::generated_id("id", GenerationStrategy::Auto))
            .attribute(AttributeDef::basic("name").config(|attribute| {
                attribute.column = Some(ColumnDef {
                    name: None,
                    nullable: false,
                    unique: true,
                    length: None,
                });
            })),
    );
    model.add_class(
        ClassDef::new("Order")
            .attribute(AttributeDef::generated_id("id", GenerationStrategy::Auto))
            .attribute(AttributeDef::reference("user", "Person")),
    );

    let alice = EntityHandle::new("Person");
    alice.set("name", "alice");
    let bob = EntityHandle::new("Person");
    bob.set("name", "bob");
    let for_alice = EntityHandle::new("Order");
    for_alice.set("user", alice.clone());
    let for_bob = EntityHandle::new("Order");
    for_bob.set("user", bob.clone());

    let statements = generate(
        model,
        DialectKind::H2,
        GeneratorSettings::default().config(|settings| settings.relative_ids = true),
        |generator| {
            generator.write_entity(&alice)?;
            generator.write_entity(&bob)?;
            generator.write_entity(&for_alice)?;
            generator.write_entity(&for_bob)
        },
    );

    assert_eq!(
        statements,
        [
            "INSERT INTO Person (id, name) VALUES (NEXT VALUE FOR Person_seq, 'alice')",
            "INSERT INTO Person (id, name) VALUES (NEXT VALUE FOR Person_seq, 'bob')",
            "INSERT INTO Order (id, user_id) VALUES (NEXT VALUE FOR Order_seq, (SELECT id FROM Person WHERE name = 'alice'))",
            "INSERT INTO Order (id, user_id) VALUES (NEXT VALUE FOR Order_seq, CURRENT VALUE FOR Person_seq)",
        ]
    );
}

// A deferred update also advances the row's version column.
#[test]
fn deferred_updates_bump_the_version_column() {
    let mut model = EntityModel::new();
    model.add_class(
        ClassDef::new("A")
            .attribute(AttributeDef::generated_id("id", GenerationStrategy::Auto))
            .attribute(AttributeDef::version("v"))
            .attribute(AttributeDef::reference("b", "B")),
    );
    model.add_class(
        ClassDef::new("B")
            .attribute(AttributeDef::generated_id("id", GenerationStrategy::Auto)),
    );

    let a = EntityHandle::new("A");
    let b = EntityHandle::new("B");
    a.set("b", b.clone());

    let statements = generate(
        model,
        DialectKind::H2,
        GeneratorSettings::default(),
        |generator| {
            generator.write_entity(&a)?;
            generator.write_entity(&b)
        },
    );

    assert_eq!(
        statements,
        [
            "INSERT INTO A (id, v, b_id) VALUES (1, 0, null)",
            "INSERT INTO B (id) VALUES (1)",
            "UPDATE A SET v = v + 1, b_id = 1 WHERE id = 1",
        ]
    );
}

// Collections write join-table rows post-insert, preserving declared order;
// elements that are not yet written are deferred until they are.
#[test]
fn collections_fill_their_join_table_in_order() {
    let mut model = EntityModel::new();
    model.add_class(
        ClassDef::new("Person")
            .attribute(AttributeDef::generated_id("id", GenerationStrategy::Auto))
            .attribute(AttributeDef::collection("pets", "Pet").config(|attribute| {
                if let AttributeKind::Collection { order_column, .. } = &mut attribute.kind
                {
                    *order_column = Some("idx".into());
                }
            })),
    );
    model.add_class(
        ClassDef::new("Pet")
            .attribute(AttributeDef::generated_id("id", GenerationStrategy::Auto)),
    );

    let pet1 = EntityHandle::new("Pet");
    let pet2 = EntityHandle::new("Pet");
    let person = EntityHandle::new("Person");
    person.set(
        "pets",
        Value::List(vec![pet1.clone().into(), pet2.clone().into()]),
    );

    let statements = generate(
        model,
        DialectKind::H2,
        GeneratorSettings::default(),
        |generator| {
            generator.write_entity(&person)?;
            generator.write_entity(&pet1)?;
            generator.write_entity(&pet2)
        },
    );

    assert_eq!(
        statements,
        [
            "INSERT INTO Person (id) VALUES (1)",
            "INSERT INTO Pet (id) VALUES (1)",
            "INSERT INTO Person_pets (Person_id, Pet_id, idx) VALUES (1, 1, 0)",
            "INSERT INTO Pet (id) VALUES (2)",
            "INSERT INTO Person_pets (Person_id, Pet_id, idx) VALUES (1, 2, 1)",
        ]
    );
}

// Inverse-side collections update the element's foreign key, except when the
// element's own reference already points back at the owner.
#[test]
fn mapped_by_collections_update_the_foreign_side() {
    let mut model = EntityModel::new();
    model.add_class(
        ClassDef::new("Team")
            .attribute(AttributeDef::generated_id("id", GenerationStrategy::Auto))
            .attribute(AttributeDef::collection("members", "Player").config(|attribute| {
                if let AttributeKind::Collection { mapped_by, .. } = &mut attribute.kind
                {
                    *mapped_by = Some("team".into());
                }
            })),
    );
    model.add_class(
        ClassDef::new("Player")
            .attribute(AttributeDef::generated_id("id", GenerationStrategy::Auto))
            .attribute(AttributeDef::reference("team", "Team")),
    );

    let team = EntityHandle::new("Team");
    let linked = EntityHandle::new("Player");
    linked.set("team", team.clone());
    let unlinked = EntityHandle::new("Player");
    team.set(
        "members",
        Value::List(vec![linked.clone().into(), unlinked.clone().into()]),
    );

    let statements = generate(
        model,
        DialectKind::H2,
        GeneratorSettings::default(),
        |generator| {
            generator.write_entity(&team)?;
            generator.write_entity(&linked)?;
            generator.write_entity(&unlinked)
        },
    );

    assert_eq!(
        statements,
        [
            "INSERT INTO Team (id) VALUES (1)",
            "INSERT INTO Player (id, team_id) VALUES (1, 1)",
            "INSERT INTO Player (id, team_id) VALUES (2, null)",
            "UPDATE Player SET team_id = 1 WHERE id = 2",
        ]
    );
}

// Embedded values flatten into the owning row, honoring the embedding
// site's attribute overrides.
#[test]
fn embedded_values_flatten_with_overrides() {
    let mut model = EntityModel::new();
    model.add_embeddable(
        EmbeddableDef::new("Address")
            .attribute(AttributeDef::basic("street"))
            .attribute(AttributeDef::basic("city")),
    );
    model.add_class(
        ClassDef::new("Person")
            .config(|class| {
                class
                    .attribute_overrides
                    .insert("address.city".into(), ColumnDef::named("town"));
            })
            .attribute(AttributeDef::generated_id("id", GenerationStrategy::Auto))
            .attribute(AttributeDef::embedded("address", "Address")),
    );

    let address = EntityHandle::new("Address");
    address.set("street", "Main");
    address.set("city", "Springfield");
    let person = EntityHandle::new("Person");
    person.set("address", address);

    let statements = generate(
        model,
        DialectKind::H2,
        GeneratorSettings::default(),
        |generator| generator.write_entity(&person),
    );

    assert_eq!(
        statements,
        ["INSERT INTO Person (id, street, town) VALUES (1, 'Main', 'Springfield')"]
    );
}

// Map attributes write one join-table row per entry.
#[test]
fn map_attributes_write_key_value_rows() {
    let mut model = EntityModel::new();
    model.add_class(
        ClassDef::new("Person")
            .attribute(AttributeDef::generated_id("id", GenerationStrategy::Auto))
            .attribute(AttributeDef {
                name: "nicknames".into(),
                kind: AttributeKind::MapCollection {
                    element: ElementKind::Basic,
                    join_table: None,
                },
                column: None,
            }),
    );

    let person = EntityHandle::new("Person");
    person.set(
        "nicknames",
        Value::PairList(vec![("a".into(), "Ace".into())]),
    );

    let statements = generate(
        model,
        DialectKind::H2,
        GeneratorSettings::default(),
        |generator| generator.write_entity(&person),
    );

    assert_eq!(
        statements,
        ["INSERT INTO Person_nicknames (Person_id, nicknames_KEY, nicknames) VALUES (1, 'a', 'Ace')"]
    );
}

// Required references pull their targets into the script first.
#[test]
fn required_references_write_targets_first() {
    let mut model = person_model();
    model.add_class(
        ClassDef::new("Order")
            .attribute(AttributeDef::generated_id("id", GenerationStrategy::Auto))
            .attribute(AttributeDef::required_reference("user", "Person")),
    );

    let alice = EntityHandle::new("Person");
    alice.set("name", "alice");
    let order = EntityHandle::new("Order");
    order.set("user", alice.clone());

    let statements = generate(
        model,
        DialectKind::H2,
        GeneratorSettings::default(),
        |generator| generator.write_entity(&order),
    );

    assert_eq!(
        statements,
        [
            "INSERT INTO Person (id, name) VALUES (1, 'alice')",
            "INSERT INTO Order (id, user_id) VALUES (1, 1)",
        ]
    );
}

// Entities that were referenced but never written surface at the end of the
// run.
#[test]
fn residual_pending_state_is_an_error() {
    let mut model = EntityModel::new();
    model.add_class(
        ClassDef::new("A")
            .attribute(AttributeDef::generated_id("id", GenerationStrategy::Auto))
            .attribute(AttributeDef::reference("b", "B")),
    );
    model.add_class(
        ClassDef::new("B")
            .attribute(AttributeDef::generated_id("id", GenerationStrategy::Auto)),
    );

    let a = EntityHandle::new("A");
    a.set("b", EntityHandle::new("B"));

    let ctx = GeneratorContext::new(
        model,
        kind_to_dialect(DialectKind::H2),
        GeneratorSettings::default(),
    );
    let mut writer = CollectingWriter::new();
    let mut generator = EntitySqlGenerator::new(&ctx, &mut writer);
    generator.write_entity(&a).unwrap();

    let error = generator.flush().unwrap_err();
    assert!(matches!(error, GenerateError::Reference(_)));
}

// After the post-insert phase an entity is no longer new.
#[test]
fn written_entities_are_not_new() {
    let alice = EntityHandle::new("Person");
    alice.set("name", "alice");

    let ctx = GeneratorContext::new(
        person_model(),
        kind_to_dialect(DialectKind::H2),
        GeneratorSettings::default(),
    );
    let mut writer = CollectingWriter::new();
    let mut generator = EntitySqlGenerator::new(&ctx, &mut writer);

    let descriptor = ctx.descriptor("Person").unwrap();
    assert!(descriptor.is_new(&alice));
    generator.write_entity(&alice).unwrap();
    assert!(!descriptor.is_new(&alice));

    // Writing again is a no-op.
    generator.write_entity(&alice).unwrap();
    assert_eq!(writer.statements().len(), 1);
}

// ---- importer-level scenarios ----

struct UsersProvider {
    users: Rc<RefCell<Vec<EntityHandle>>>,
}

impl DataProvider for UsersProvider {
    fn name(&self) -> &str {
        "users"
    }

    fn build_entities(&mut self) -> Result<()> {
        for name in ["alice", "bob"] {
            let user = EntityHandle::new("User");
            user.set("name", name);
            self.users.borrow_mut().push(user);
        }
        Ok(())
    }

    fn write_entities(&mut self, generator: &mut EntitySqlGenerator<'_>) -> Result<()> {
        let users = self.users.borrow();
        generator.write_entities(users.iter())
    }
}

struct OrdersProvider {
    users: Rc<RefCell<Vec<EntityHandle>>>,
    orders: Vec<EntityHandle>,
}

impl DataProvider for OrdersProvider {
    fn name(&self) -> &str {
        "orders"
    }

    fn build_entities(&mut self) -> Result<()> {
        let order = EntityHandle::new("Order");
        order.set("user", self.users.borrow()[1].clone());
        self.orders.push(order);
        Ok(())
    }

    fn write_entities(&mut self, generator: &mut EntitySqlGenerator<'_>) -> Result<()> {
        generator.write_entities(self.orders.iter())
    }
}

fn shop_model() -> EntityModel {
    let mut model = EntityModel::new();
    model.add_class(
        ClassDef::new("User")
            .attribute(AttributeDef::generated_id("id", GenerationStrategy::Auto))
            .attribute(AttributeDef::basic("name")),
    );
    model.add_class(
        ClassDef::new("Order")
            .attribute(AttributeDef::generated_id("id", GenerationStrategy::Auto))
            .attribute(AttributeDef::required_reference("user", "User")),
    );
    model
}

fn shop_importer() -> EntityImporter {
    let users = Rc::new(RefCell::new(Vec::new()));
    let mut importer = EntityImporter::new(ImporterConfig::default(), shop_model());
    // Registered out of order on purpose: instantiation sorts by effective
    // order, and the dependency forces users before orders.
    let orders_users = Rc::clone(&users);
    importer.add_provider(
        ProviderFactory::new("orders", move |_| {
            Ok(Box::new(OrdersProvider {
                users: orders_users,
                orders: Vec::new(),
            }))
        })
        .order(20)
        .depends_on("users"),
    );
    let users_handle = Rc::clone(&users);
    importer.add_provider(
        ProviderFactory::new("users", move |_| {
            Ok(Box::new(UsersProvider {
                users: users_handle,
            }))
        })
        .order(10),
    );
    importer
}

// Scenario: providers run in dependency-consistent order and the script
// carries section headers and trailing alignment statements.
#[test]
fn importer_emits_a_complete_script() {
    let mut writer = CollectingWriter::new();
    shop_importer().import(&mut writer).unwrap();

    expect![[r#"
        -- Generated by sqlseed 0.1.0
        -- Dialect: h2

        -- ------------------------------------------------------------
        -- Data for provider: users
        INSERT INTO User (id, name) VALUES (1, 'alice');
        INSERT INTO User (id, name) VALUES (2, 'bob');

        -- ------------------------------------------------------------
        -- Data for provider: orders
        INSERT INTO Order (id, user_id) VALUES (1, 2);

        -- ------------------------------------------------------------
        -- Realign generated identifiers
        ALTER SEQUENCE User_seq RESTART WITH 3;
        ALTER SEQUENCE Order_seq RESTART WITH 2;
    "#]]
    .assert_eq(writer.text());
}

// Equal inputs produce byte-identical scripts.
#[test]
fn output_is_deterministic() {
    let mut first = CollectingWriter::new();
    shop_importer().import(&mut first).unwrap();
    let mut second = CollectingWriter::new();
    shop_importer().import(&mut second).unwrap();
    assert_eq!(first.text(), second.text());
}

struct FailingProvider;

impl DataProvider for FailingProvider {
    fn name(&self) -> &str {
        "failing"
    }

    fn build_entities(&mut self) -> Result<()> {
        Ok(())
    }

    fn write_entities(&mut self, _generator: &mut EntitySqlGenerator<'_>) -> Result<()> {
        Err(GenerateError::model("boom".to_owned()))
    }
}

// Scenario: a write-phase failure truncates the script with the abort
// marker and re-raises the error.
#[test]
fn write_failures_append_the_abort_marker() {
    let mut importer = EntityImporter::new(ImporterConfig::default(), EntityModel::new());
    importer.add_provider(ProviderFactory::new("failing", |_| {
        Ok(Box::new(FailingProvider))
    }));

    let mut writer = CollectingWriter::new();
    let error = importer.import(&mut writer).unwrap_err();
    assert!(matches!(error, GenerateError::Model(_)));

    let text = writer.text();
    let marker_at = text.find(ABORT_MARKER).expect("marker present");
    let banner_at = text
        .rfind("-- ------------------------------------------------------------")
        .expect("separator present");
    assert!(banner_at < marker_at);
    assert!(text.contains("-- !!! GENERATION ABORTED !!!"));
    assert!(text.contains("model error: boom"));
}
