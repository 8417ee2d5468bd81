use ormgraph::{
    batch::{EventLog, ModelEvent, ModelObserver},
    config::{ModelConfig, PostCheckPolicy},
    error::ErrorClass,
    prelude::*,
    source::ConfigurationSource::{Convention, DataAnnotation, Explicit},
};
use std::collections::HashMap;

fn unmapped(names: &[&str]) -> (Model, Vec<EntityTypeId>) {
    let mut model = Model::new(TypeCatalog::new());
    let entities = names
        .iter()
        .map(|name| model.add_entity_type(name, None, Explicit).unwrap())
        .collect();

    (model, entities)
}

// Customer hosts `Orders` (collection) and Order hosts `Customer` (reference).
fn mapped() -> (Model, EntityTypeId, EntityTypeId) {
    let mut catalog = TypeCatalog::new();
    let customer_host = catalog.define("Customer");
    let order_host = catalog.define("Order");
    catalog
        .scalar(customer_host, "Id", ValueKind::Int32)
        .collection(customer_host, "Orders", order_host)
        .reference(order_host, "Customer", customer_host);

    let mut model = Model::new(catalog);
    let customer = model
        .add_entity_type("Customer", Some(customer_host), Explicit)
        .unwrap();
    let order = model
        .add_entity_type("Order", Some(order_host), Explicit)
        .unwrap();

    (model, customer, order)
}

///
/// Saboteur
/// Records every event, then drops the navigation `name` from any
/// relationship other than `keep` as soon as it shows up there.
///

struct Saboteur {
    keep: ForeignKeyId,
    name: &'static str,
    log: EventLog,
}

impl ModelObserver for Saboteur {
    fn on_event(
        &mut self,
        model: &mut Model,
        event: &ModelEvent,
    ) -> Result<Option<ForeignKeyId>, ModelError> {
        self.log.on_event(model, event)?;

        if let ModelEvent::NavigationAdded { fk, end, name } = event
            && *fk != self.keep
            && name == self.name
        {
            let (to_principal, to_dependent) = match end {
                NavigationEnd::ToPrincipal => (NavigationChange::Remove, NavigationChange::Keep),
                NavigationEnd::ToDependent => (NavigationChange::Keep, NavigationChange::Remove),
            };
            model.set_navigations(*fk, to_principal, to_dependent, Explicit)?;
        }

        Ok(None)
    }
}

// Navigation names per slot after replaying `events` from an empty state.
fn replayed_navigations(events: &[ModelEvent]) -> HashMap<(ForeignKeyId, NavigationEnd), String> {
    let mut navigations = HashMap::new();
    for event in events {
        match event {
            ModelEvent::NavigationAdded { fk, end, name } => {
                navigations.insert((*fk, *end), name.clone());
            }
            ModelEvent::NavigationRemoved { fk, end, .. } => {
                navigations.remove(&(*fk, *end));
            }
            ModelEvent::ForeignKeyRemoved { fk, .. } => {
                navigations.retain(|(id, _), _| id != fk);
            }
            _ => {}
        }
    }

    navigations
}

fn live_navigations(model: &Model) -> HashMap<(ForeignKeyId, NavigationEnd), String> {
    model
        .foreign_keys()
        .flat_map(|(fk, data)| {
            [NavigationEnd::ToPrincipal, NavigationEnd::ToDependent]
                .into_iter()
                .filter_map(move |end| {
                    data.navigation_name(end)
                        .map(|name| ((fk, end), name.to_string()))
                })
        })
        .collect()
}

#[test]
fn explicit_rename_reuses_convention_relationship() {
    let (mut model, entities) = unmapped(&["Customer", "Order"]);
    let log = EventLog::new();
    model.set_observer(log.clone());
    let (customer, order) = (entities[0], entities[1]);
    let id = model
        .add_property(customer, "Id", ValueKind::Int32, false, Explicit)
        .unwrap();
    model.set_primary_key(customer, Some(&[id]), Explicit).unwrap();
    let customer_id = model
        .add_property(order, "CustomerId", ValueKind::Int32, true, Convention)
        .unwrap();

    let fk = model
        .has_foreign_key(order, customer, &[customer_id], Convention)
        .unwrap()
        .unwrap();
    model
        .set_navigations(fk, NavigationChange::set("Customer"), NavigationChange::Keep, Convention)
        .unwrap()
        .unwrap();

    let renamed = model
        .set_navigations(fk, NavigationChange::set("Buyer"), NavigationChange::Keep, Explicit)
        .unwrap();
    assert_eq!(renamed, Some(fk));

    // Asking for the relationship by its new name finds the same one.
    let again = model
        .has_relationship(order, customer, Some("Buyer"), None, Explicit)
        .unwrap();
    assert_eq!(again, Some(fk));

    let data = model.foreign_key(fk).unwrap();
    assert_eq!(data.navigation_name(NavigationEnd::ToPrincipal), Some("Buyer"));
    assert_eq!(data.navigation_source(NavigationEnd::ToPrincipal), Some(Explicit));
    assert_eq!(data.source(), Explicit);
    assert_eq!(data.properties(), &[customer_id]);
    assert_eq!(model.foreign_keys().count(), 1);
    assert_eq!(model.find_navigation(order, "Customer"), None);
    assert_eq!(replayed_navigations(&log.events()), live_navigations(&model));
}

#[test]
fn equal_convention_proposals_do_not_steal_navigations() {
    let (mut model, entities) = unmapped(&["Customer", "Invoice", "Order"]);
    let (customer, invoice, order) = (entities[0], entities[1], entities[2]);

    let first = model
        .has_relationship(order, customer, Some("Customer"), None, Convention)
        .unwrap()
        .unwrap();
    let before = model.snapshot();

    let second = model
        .has_relationship(order, invoice, Some("Customer"), None, Convention)
        .unwrap();

    assert_eq!(second, None);
    assert_eq!(model.snapshot(), before);
    assert_eq!(model.find_relationship_by_navigation(order, "Customer"), Some(first));
}

#[test]
fn explicit_inversion_keeps_explicit_collection() {
    let (mut model, customer, order) = mapped();
    let fk = model
        .has_relationship(order, customer, Some("Customer"), Some("Orders"), Explicit)
        .unwrap()
        .unwrap();
    let before = model.snapshot();

    let err = model.invert_relationship(fk, Explicit).unwrap_err();

    assert!(matches!(err, ModelError::InvalidRelatedTypes { .. }));
    assert_eq!(err.class(), ErrorClass::Incompatible);
    assert_eq!(model.snapshot(), before);
    assert_eq!(model.invert_relationship(fk, DataAnnotation).unwrap(), None);
}

#[test]
fn explicit_inversion_drops_convention_collection() {
    let (mut model, customer, order) = mapped();
    let fk = model
        .has_relationship(order, customer, Some("Customer"), Some("Orders"), Convention)
        .unwrap()
        .unwrap();

    assert_eq!(model.invert_relationship(fk, Explicit).unwrap(), Some(fk));

    let data = model.foreign_key(fk).unwrap();
    assert_eq!(data.principal(), order);
    assert_eq!(data.dependent(), customer);
    assert!(data.to_principal().is_none());
    assert_eq!(data.navigation_name(NavigationEnd::ToDependent), Some("Customer"));
    assert!(data.is_unique());
}

#[test]
fn double_inversion_restores_the_shape() {
    let (mut model, entities) = unmapped(&["Customer", "Order"]);
    let (customer, order) = (entities[0], entities[1]);
    let fk = model
        .has_relationship(order, customer, Some("Customer"), Some("Orders"), Convention)
        .unwrap()
        .unwrap();
    let original = model.snapshot().foreign_keys_of("Order").next().cloned().unwrap();

    model
        .set_related_types(fk, order, customer, DataAnnotation)
        .unwrap()
        .unwrap();
    let inverted = model.snapshot().foreign_keys_of("Customer").next().cloned().unwrap();
    assert_eq!(inverted.to_principal.as_deref(), Some("Orders"));
    assert_eq!(inverted.to_dependent.as_deref(), Some("Customer"));

    model
        .set_related_types(fk, customer, order, Explicit)
        .unwrap()
        .unwrap();
    let restored = model.snapshot().foreign_keys_of("Order").next().cloned().unwrap();

    assert_eq!(restored.principal, original.principal);
    assert_eq!(restored.properties, original.properties);
    assert_eq!(restored.principal_key, original.principal_key);
    assert_eq!(restored.to_principal, original.to_principal);
    assert_eq!(restored.to_dependent, original.to_dependent);
    assert_eq!(restored.source, Explicit);
}

#[test]
fn removing_entity_types_leaves_no_dangling_relationships() {
    let (mut model, entities) = unmapped(&["Customer", "Order", "Invoice", "VipCustomer"]);
    let (customer, order, invoice, vip) = (entities[0], entities[1], entities[2], entities[3]);
    model.set_base_type(vip, Some(customer), Explicit).unwrap();
    model
        .has_relationship(order, customer, Some("Customer"), Some("Orders"), Convention)
        .unwrap()
        .unwrap();
    model
        .has_relationship(invoice, vip, Some("Vip"), None, Explicit)
        .unwrap()
        .unwrap();
    model
        .has_relationship(customer, invoice, Some("LastInvoice"), None, DataAnnotation)
        .unwrap()
        .unwrap();

    assert!(model.remove_entity_type(customer, Explicit).unwrap());

    for (_, fk) in model.foreign_keys() {
        assert!(model.contains_entity_type(fk.dependent()));
        assert!(model.contains_entity_type(fk.principal()));
    }
    assert!(model.find_navigation(order, "Customer").is_none());
    assert!(model.contains_entity_type(vip));
}

#[test]
fn strict_post_check_restores_resolved_conflicts() {
    let (mut model, entities) = unmapped(&["Customer", "Invoice", "Order"]);
    let (customer, invoice, order) = (entities[0], entities[1], entities[2]);
    let weak = model
        .has_relationship(order, invoice, Some("Customer"), None, Convention)
        .unwrap()
        .unwrap();
    let strong = model
        .has_relationship(order, customer, None, None, Explicit)
        .unwrap()
        .unwrap();
    let log = EventLog::new();
    model.set_observer(Saboteur {
        keep: weak,
        name: "Customer",
        log: log.clone(),
    });
    let before = model.snapshot();

    let outcome = model
        .set_navigations(strong, NavigationChange::set("Customer"), NavigationChange::Keep, DataAnnotation)
        .unwrap();

    assert_eq!(outcome, None);
    assert_eq!(model.snapshot(), before);
    assert!(model.contains_foreign_key(weak));
    assert_eq!(model.find_relationship_by_navigation(order, "Customer"), Some(weak));
}

#[test]
fn strict_post_check_reports_the_rollback() {
    let (mut model, entities) = unmapped(&["Customer", "Invoice", "Order"]);
    let (customer, invoice, order) = (entities[0], entities[1], entities[2]);
    let weak = model
        .has_relationship(order, invoice, Some("Customer"), None, Convention)
        .unwrap()
        .unwrap();
    let strong = model
        .has_relationship(order, customer, None, None, Explicit)
        .unwrap()
        .unwrap();
    let log = EventLog::new();
    model.set_observer(Saboteur {
        keep: weak,
        name: "Customer",
        log: log.clone(),
    });

    model
        .set_navigations(strong, NavigationChange::set("Customer"), NavigationChange::Keep, DataAnnotation)
        .unwrap();

    let events = log.events();
    let removed = events
        .iter()
        .position(|event| matches!(event, ModelEvent::ForeignKeyRemoved { fk, .. } if *fk == weak))
        .unwrap();
    let restored = events
        .iter()
        .rposition(|event| *event == ModelEvent::ForeignKeyAdded { fk: weak })
        .unwrap();
    assert!(removed < restored);
    assert!(events[restored..].contains(&ModelEvent::NavigationAdded {
        fk: weak,
        end: NavigationEnd::ToPrincipal,
        name: "Customer".to_string(),
    }));
    assert_eq!(replayed_navigations(&events), live_navigations(&model));
}

#[test]
fn strict_post_check_covers_new_relationships() {
    let (mut model, entities) = unmapped(&["Customer", "Invoice", "Order"]);
    let (customer, invoice, order) = (entities[0], entities[1], entities[2]);
    let weak = model
        .has_relationship(order, invoice, Some("Customer"), None, Convention)
        .unwrap()
        .unwrap();
    let log = EventLog::new();
    model.set_observer(Saboteur {
        keep: weak,
        name: "Customer",
        log: log.clone(),
    });
    let before = model.snapshot();

    let outcome = model
        .has_relationship(order, customer, Some("Customer"), None, DataAnnotation)
        .unwrap();

    assert_eq!(outcome, None);
    assert_eq!(model.snapshot(), before);
    assert_eq!(model.foreign_keys().count(), 1);
    assert_eq!(model.find_relationship_by_navigation(order, "Customer"), Some(weak));

    let events = log.events();
    let added = events
        .iter()
        .filter(|event| matches!(event, ModelEvent::ForeignKeyAdded { .. }))
        .count();
    let removed = events
        .iter()
        .filter(|event| matches!(event, ModelEvent::ForeignKeyRemoved { .. }))
        .count();
    assert_eq!(added, removed);
    assert_eq!(replayed_navigations(&events), live_navigations(&model));
}

#[test]
fn tolerant_post_check_keeps_resolved_conflicts() {
    let config = ModelConfig {
        post_check: PostCheckPolicy::Tolerant,
        ..ModelConfig::default()
    };
    let mut model = Model::with_config(TypeCatalog::new(), config).unwrap();
    let customer = model.add_entity_type("Customer", None, Explicit).unwrap();
    let invoice = model.add_entity_type("Invoice", None, Explicit).unwrap();
    let order = model.add_entity_type("Order", None, Explicit).unwrap();
    let weak = model
        .has_relationship(order, invoice, Some("Customer"), None, Convention)
        .unwrap()
        .unwrap();
    let strong = model
        .has_relationship(order, customer, None, None, Explicit)
        .unwrap()
        .unwrap();
    let log = EventLog::new();
    model.set_observer(Saboteur {
        keep: weak,
        name: "Customer",
        log: log.clone(),
    });

    let outcome = model
        .set_navigations(strong, NavigationChange::set("Customer"), NavigationChange::Keep, DataAnnotation)
        .unwrap();

    assert_eq!(outcome, None);
    assert!(!model.contains_foreign_key(weak));
    assert!(model.foreign_key(strong).unwrap().to_principal().is_none());
    assert_eq!(model.find_navigation(order, "Customer"), None);
    assert_eq!(replayed_navigations(&log.events()), live_navigations(&model));
}
