use crate::{
    config::ModelConfig,
    error::{ErrorClass, ModelError},
    model::{EntityTypeId, Model, ModelSnapshot, PropertyId},
    source::ConfigurationSource::{self, Convention, DataAnnotation, Explicit},
    types::{TypeCatalog, ValueKind},
};

fn model() -> Model {
    Model::new(TypeCatalog::new())
}

fn entity(model: &mut Model, name: &str) -> EntityTypeId {
    model.add_entity_type(name, None, Explicit).unwrap()
}

fn property(model: &mut Model, entity: EntityTypeId, name: &str, nullable: bool) -> PropertyId {
    model
        .add_property(entity, name, ValueKind::Int32, nullable, Explicit)
        .unwrap()
}

// Customer(Id) <- Order(CustomerId), keyed explicitly.
fn customer_order(model: &mut Model) -> (EntityTypeId, EntityTypeId, PropertyId, PropertyId) {
    let customer = entity(model, "Customer");
    let order = entity(model, "Order");
    let id = property(model, customer, "Id", false);
    model.set_primary_key(customer, Some(&[id]), Explicit).unwrap();
    let customer_id = property(model, order, "CustomerId", false);

    (customer, order, id, customer_id)
}

#[test]
fn add_entity_type_is_idempotent_and_upgrades_source() {
    let mut model = model();
    let first = model.add_entity_type("Blog", None, Convention).unwrap();
    let second = model.add_entity_type("Blog", None, DataAnnotation).unwrap();

    assert_eq!(first, second);
    assert_eq!(model.entity_type(first).unwrap().source(), DataAnnotation);
    assert_eq!(model.entity_types().count(), 1);
}

#[test]
fn names_are_validated_against_config() {
    let config = ModelConfig {
        max_name_len: 4,
        shadow_key_property: "Id".into(),
        ..ModelConfig::default()
    };
    let mut model = Model::with_config(TypeCatalog::new(), config).unwrap();

    let err = model.add_entity_type("Customer", None, Explicit).unwrap_err();
    assert!(matches!(err, ModelError::NameTooLong { max: 4, .. }));
    assert_eq!(err.class(), ErrorClass::InvariantViolation);

    let err = model.add_entity_type("", None, Explicit).unwrap_err();
    assert!(matches!(err, ModelError::EmptyName { .. }));
}

#[test]
fn inherited_property_with_same_kind_is_reused() {
    let mut model = model();
    let animal = entity(&mut model, "Animal");
    let dog = entity(&mut model, "Dog");
    assert!(model.set_base_type(dog, Some(animal), Explicit).unwrap());

    let name = model
        .add_property(animal, "Name", ValueKind::Text, true, Convention)
        .unwrap();
    let reused = model
        .add_property(dog, "Name", ValueKind::Text, true, Explicit)
        .unwrap();

    assert_eq!(name, reused);
    assert_eq!(model.property(name).unwrap().source(), Explicit);
    assert_eq!(model.find_property(dog, "Name"), Some(name));
}

#[test]
fn member_names_are_shared_across_the_hierarchy() {
    let mut model = model();
    let animal = entity(&mut model, "Animal");
    let dog = entity(&mut model, "Dog");
    model.set_base_type(dog, Some(animal), Explicit).unwrap();

    model
        .add_property(dog, "Owner", ValueKind::Text, true, Explicit)
        .unwrap();

    let err = model
        .add_service_property(animal, "Owner", Explicit)
        .unwrap_err();
    assert_eq!(
        err,
        ModelError::ConflictingMember {
            entity: "Animal".to_string(),
            member: "Owner".to_string(),
            declaring: "Dog".to_string(),
        }
    );

    let err = model
        .add_property(animal, "Owner", ValueKind::Int64, true, Explicit)
        .unwrap_err();
    assert!(matches!(err, ModelError::ConflictingMember { .. }));
}

#[test]
fn key_properties_become_required() {
    let mut model = model();
    let blog = entity(&mut model, "Blog");
    let id = model
        .add_property(blog, "Id", ValueKind::Guid, true, Convention)
        .unwrap();

    let key = model.add_key(blog, &[id], DataAnnotation).unwrap();

    assert!(key.is_some());
    assert!(!model.property(id).unwrap().is_nullable());
    assert!(!model.set_property_nullable(id, true, DataAnnotation).unwrap());

    let err = model.set_property_nullable(id, true, Explicit).unwrap_err();
    assert!(matches!(err, ModelError::NullableKeyProperty { .. }));
}

#[test]
fn key_on_explicitly_nullable_property_backs_off() {
    let mut model = model();
    let blog = entity(&mut model, "Blog");
    let id = property(&mut model, blog, "Id", true);

    assert_eq!(model.add_key(blog, &[id], DataAnnotation).unwrap(), None);
    assert!(model.keys_of(blog).is_empty());
    assert!(model.property(id).unwrap().is_nullable());
}

#[test]
fn derived_types_cannot_declare_keys() {
    let mut model = model();
    let animal = entity(&mut model, "Animal");
    let dog = entity(&mut model, "Dog");
    model.set_base_type(dog, Some(animal), Explicit).unwrap();
    let tag = property(&mut model, dog, "Tag", false);

    let err = model.add_key(dog, &[tag], Explicit).unwrap_err();
    assert_eq!(
        err,
        ModelError::DerivedTypeKey {
            entity: "Dog".to_string(),
            key: "{Tag}".to_string(),
            root: "Animal".to_string(),
        }
    );
}

#[test]
fn circular_inheritance_is_rejected() {
    let mut model = model();
    let a = entity(&mut model, "A");
    let b = entity(&mut model, "B");
    model.set_base_type(b, Some(a), Explicit).unwrap();

    let err = model.set_base_type(a, Some(b), Explicit).unwrap_err();
    assert!(matches!(err, ModelError::CircularInheritance { .. }));
    assert_eq!(model.entity_type(a).unwrap().base_type(), None);
}

#[test]
fn base_type_merge_drops_duplicate_convention_properties() {
    let mut model = model();
    let animal = entity(&mut model, "Animal");
    let dog = entity(&mut model, "Dog");
    model
        .add_property(animal, "Name", ValueKind::Text, true, Explicit)
        .unwrap();
    let duplicate = model
        .add_property(dog, "Name", ValueKind::Text, true, Convention)
        .unwrap();

    assert!(model.set_base_type(dog, Some(animal), DataAnnotation).unwrap());
    assert!(model.property(duplicate).is_err());
    assert_eq!(model.members_in_hierarchy(dog, "Name").len(), 1);
}

#[test]
fn removing_a_referenced_key_is_an_error() {
    let mut model = model();
    let (customer, order, id, customer_id) = customer_order(&mut model);
    let fk = model
        .has_foreign_key(order, customer, &[customer_id], Explicit)
        .unwrap()
        .unwrap();
    let key = model.find_key(customer, &[id]).unwrap();

    let err = model.remove_key(key, Explicit).unwrap_err();
    assert!(matches!(err, ModelError::KeyInUse { .. }));
    assert_eq!(model.referencing_foreign_keys_of_key(key), vec![fk]);
}

#[test]
fn keyless_types_keep_referenced_keys() {
    let mut model = model();
    let (customer, order, _, customer_id) = customer_order(&mut model);
    model
        .has_foreign_key(order, customer, &[customer_id], Explicit)
        .unwrap();

    assert!(!model.set_keyless(customer, true, Explicit).unwrap());
    assert!(!model.entity_type(customer).unwrap().is_keyless());
}

#[test]
fn removing_an_entity_type_cascades() {
    let mut model = model();
    let (customer, order, _, customer_id) = customer_order(&mut model);
    let vip = entity(&mut model, "VipCustomer");
    model.set_base_type(vip, Some(customer), Explicit).unwrap();
    model
        .has_foreign_key(order, customer, &[customer_id], Explicit)
        .unwrap();

    assert!(model.remove_entity_type(customer, Explicit).unwrap());

    assert!(!model.contains_entity_type(customer));
    assert_eq!(model.foreign_keys().count(), 0);
    assert_eq!(model.entity_type(vip).unwrap().base_type(), None);
    assert!(model.property(customer_id).is_ok());

    let err = model.entity_type(customer).unwrap_err();
    assert_eq!(err.class(), ErrorClass::Detached);
}

#[test]
fn entity_removal_needs_enough_authority() {
    let mut model = model();
    let blog = entity(&mut model, "Blog");

    assert!(!model.remove_entity_type(blog, DataAnnotation).unwrap());
    assert!(model.contains_entity_type(blog));
}

#[test]
fn checkpoint_restores_the_graph() {
    let mut model = model();
    let blog = entity(&mut model, "Blog");
    let before = model.snapshot();

    let checkpoint = model.checkpoint();
    property(&mut model, blog, "Title", true);
    entity(&mut model, "Post");
    assert_ne!(model.snapshot(), before);

    model.restore(checkpoint).unwrap();
    assert_eq!(model.snapshot(), before);
}

#[test]
fn index_names_are_unique_per_entity() {
    let mut model = model();
    let blog = entity(&mut model, "Blog");
    let title = property(&mut model, blog, "Title", true);
    let url = property(&mut model, blog, "Url", true);

    let index = model
        .add_index(blog, &[title], Some("IX_Blog"), Explicit)
        .unwrap();
    assert_eq!(
        model
            .add_index(blog, &[title], Some("IX_Blog"), Convention)
            .unwrap(),
        index
    );

    let err = model
        .add_index(blog, &[url], Some("IX_Blog"), Explicit)
        .unwrap_err();
    assert!(matches!(err, ModelError::DuplicateName { .. }));

    assert!(model.set_index_unique(index, true, Explicit).unwrap());
    assert!(!model.set_index_unique(index, false, Convention).unwrap());
    assert!(model.index(index).unwrap().is_unique());
}

#[test]
fn service_properties_and_triggers_respect_precedence() {
    let mut model = model();
    let blog = entity(&mut model, "Blog");

    assert!(model.add_service_property(blog, "Context", Explicit).unwrap());
    assert!(!model.remove_service_property(blog, "Context", Convention).unwrap());
    assert!(model.remove_service_property(blog, "Context", Explicit).unwrap());

    assert!(model.add_trigger(blog, "TR_Audit", DataAnnotation).unwrap());
    assert_eq!(
        model.entity_type(blog).unwrap().triggers().collect::<Vec<_>>(),
        vec!["TR_Audit"]
    );
    assert!(model.remove_trigger(blog, "TR_Audit", DataAnnotation).unwrap());
}

#[test]
fn snapshot_serializes() {
    let mut model = model();
    let (customer, order, _, customer_id) = customer_order(&mut model);
    model
        .has_foreign_key(order, customer, &[customer_id], Explicit)
        .unwrap();

    let snapshot = model.snapshot();
    let json = serde_json::to_string(&snapshot).unwrap();
    let decoded: ModelSnapshot = serde_json::from_str(&json).unwrap();
    assert_eq!(decoded, snapshot);

    let fk = snapshot.foreign_keys_of("Order").next().unwrap();
    assert_eq!(fk.principal, "Customer");
    assert_eq!(fk.properties, vec!["CustomerId".to_string()]);
    assert_eq!(fk.principal_key, vec!["Id".to_string()]);
    assert!(fk.required);
}

#[test]
fn implicit_primary_key_uses_configured_name() {
    let config = ModelConfig {
        shadow_key_property: "Surrogate".to_string(),
        ..ModelConfig::default()
    };
    let mut model = Model::with_config(TypeCatalog::new(), config).unwrap();
    let customer = entity(&mut model, "Customer");
    let order = entity(&mut model, "Order");

    model
        .has_relationship(order, customer, None, None, Convention)
        .unwrap()
        .unwrap();

    let snapshot = model.snapshot();
    let customer = snapshot.entity_type("Customer").unwrap();
    assert_eq!(customer.primary_key, Some(vec!["Surrogate".to_string()]));
    let surrogate = customer.property("Surrogate").unwrap();
    assert!(surrogate.is_shadow);
    assert_eq!(surrogate.source, ConfigurationSource::Convention);
    assert!(snapshot.entity_type("Order").unwrap().property("CustomerSurrogate").is_some());
}
