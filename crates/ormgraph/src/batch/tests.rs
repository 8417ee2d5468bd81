use crate::{
    batch::{EventLog, ModelEvent, ModelObserver},
    config::ModelConfig,
    error::ModelError,
    model::{EntityTypeId, ForeignKeyId, Model},
    source::ConfigurationSource::{Convention, Explicit},
    types::TypeCatalog,
};
use std::{cell::RefCell, rc::Rc};

fn kinds(log: &EventLog) -> Vec<&'static str> {
    log.events().iter().map(ModelEvent::kind).collect()
}

fn customer_order(model: &mut Model) -> (EntityTypeId, EntityTypeId) {
    let customer = model.add_entity_type("Customer", None, Explicit).unwrap();
    let order = model.add_entity_type("Order", None, Explicit).unwrap();

    (customer, order)
}

///
/// Cascade
/// Adds an `OrderLine` entity type whenever `Order` shows up.
///

struct Cascade {
    seen: Rc<RefCell<Vec<String>>>,
}

impl ModelObserver for Cascade {
    fn on_event(
        &mut self,
        model: &mut Model,
        event: &ModelEvent,
    ) -> Result<Option<ForeignKeyId>, ModelError> {
        if let ModelEvent::EntityTypeAdded { entity } = event {
            let name = model.entity_type(*entity)?.name().to_string();
            if name == "Order" {
                model.add_entity_type("OrderLine", None, Convention)?;
            }
            self.seen.borrow_mut().push(name);
        }

        Ok(None)
    }
}

///
/// Redirect
/// Reports every new relationship as living under `target`.
///

struct Redirect {
    target: ForeignKeyId,
}

impl ModelObserver for Redirect {
    fn on_event(
        &mut self,
        _: &mut Model,
        event: &ModelEvent,
    ) -> Result<Option<ForeignKeyId>, ModelError> {
        match event {
            ModelEvent::ForeignKeyAdded { .. } => Ok(Some(self.target)),
            _ => Ok(None),
        }
    }
}

///
/// Failing
///

struct Failing;

impl ModelObserver for Failing {
    fn on_event(
        &mut self,
        _: &mut Model,
        _: &ModelEvent,
    ) -> Result<Option<ForeignKeyId>, ModelError> {
        Err(ModelError::EmptyName { kind: "observer" })
    }
}

#[test]
fn events_wait_for_the_outermost_batch() {
    let mut model = Model::new(TypeCatalog::new());
    let log = EventLog::new();
    model.set_observer(log.clone());

    let outer = model.start_batch();
    let inner = model.start_batch();
    model.add_entity_type("Customer", None, Explicit).unwrap();
    assert_eq!(inner.run(&mut model, None).unwrap(), None);
    model.add_entity_type("Order", None, Explicit).unwrap();

    assert!(log.events().is_empty());
    assert_eq!(model.batch_depth(), 1);

    outer.run(&mut model, None).unwrap();
    assert_eq!(kinds(&log), vec!["entity_type_added", "entity_type_added"]);
    assert_eq!(model.batch_depth(), 0);
}

#[test]
fn unbatched_operations_notify_immediately() {
    let mut model = Model::new(TypeCatalog::new());
    let log = EventLog::new();
    model.set_observer(log.clone());

    let (customer, order) = customer_order(&mut model);
    log.clear();
    model
        .has_relationship(order, customer, Some("Customer"), None, Explicit)
        .unwrap()
        .unwrap();

    let kinds = kinds(&log);
    assert_eq!(kinds.first(), Some(&"property_added"));
    assert!(kinds.contains(&"foreign_key_added"));
    assert_eq!(kinds.last(), Some(&"navigation_added"));
}

#[test]
fn observer_changes_are_delivered_in_order() {
    let mut model = Model::new(TypeCatalog::new());
    let seen = Rc::new(RefCell::new(Vec::new()));
    model.set_observer(Cascade { seen: seen.clone() });

    model.add_entity_type("Order", None, Explicit).unwrap();
    model.add_entity_type("Customer", None, Explicit).unwrap();

    assert_eq!(
        *seen.borrow(),
        vec![
            "Order".to_string(),
            "OrderLine".to_string(),
            "Customer".to_string()
        ]
    );
    assert!(model.find_entity_type("OrderLine").is_some());
}

#[test]
fn disabled_dispatch_discards_events() {
    let config = ModelConfig {
        dispatch_notifications: false,
        ..ModelConfig::default()
    };
    let mut model = Model::with_config(TypeCatalog::new(), config).unwrap();
    let log = EventLog::new();
    model.set_observer(log.clone());

    customer_order(&mut model);

    assert!(log.events().is_empty());
}

#[test]
fn batch_handle_follows_observer_replacements() {
    let mut model = Model::new(TypeCatalog::new());
    let (customer, order) = customer_order(&mut model);
    let first = model
        .has_relationship(order, customer, Some("Customer"), None, Explicit)
        .unwrap()
        .unwrap();
    model.set_observer(Redirect { target: first });

    let batch = model.start_batch();
    let second = model
        .has_relationship(order, customer, Some("Buyer"), None, Explicit)
        .unwrap()
        .unwrap();
    assert_ne!(first, second);

    assert_eq!(batch.run(&mut model, Some(second)).unwrap(), Some(first));
    assert_eq!(model.resolve_replacement(second), first);
}

#[test]
fn batch_handle_drops_removed_relationships() {
    let mut model = Model::new(TypeCatalog::new());
    let (customer, order) = customer_order(&mut model);

    let batch = model.start_batch();
    let fk = model
        .has_relationship(order, customer, Some("Customer"), None, Explicit)
        .unwrap()
        .unwrap();
    assert!(model.remove_foreign_key(fk, Explicit).unwrap());

    assert_eq!(batch.run(&mut model, Some(fk)).unwrap(), None);
}

#[test]
fn observer_errors_surface_and_clear_the_queue() {
    let mut model = Model::new(TypeCatalog::new());
    model.set_observer(Failing);

    let err = model.add_entity_type("Customer", None, Explicit).unwrap_err();
    assert_eq!(err, ModelError::EmptyName { kind: "observer" });
    assert!(model.find_entity_type("Customer").is_some());

    model.take_observer();
    let log = EventLog::new();
    model.set_observer(log.clone());
    model.add_entity_type("Order", None, Explicit).unwrap();
    assert_eq!(kinds(&log), vec!["entity_type_added"]);
}
