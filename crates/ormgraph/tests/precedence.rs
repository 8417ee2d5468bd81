use ormgraph::{
    model::ModelSnapshot,
    prelude::*,
};
use proptest::prelude::*;
use std::collections::BTreeSet;

const ENTITIES: [&str; 3] = ["Customer", "Order", "Invoice"];
const PAIRS: [(usize, usize); 3] = [(1, 0), (1, 2), (2, 0)];

///
/// Proposal
/// One configuration request replayed against a small unmapped model.
///

#[derive(Clone, Debug)]
enum Proposal {
    Relate {
        pair: usize,
        navigation: Option<&'static str>,
        source: ConfigurationSource,
    },
    Property {
        entity: usize,
        name: &'static str,
        nullable: bool,
        source: ConfigurationSource,
    },
    DeleteBehavior {
        behavior: DeleteBehavior,
        source: ConfigurationSource,
    },
    Required {
        required: bool,
        source: ConfigurationSource,
    },
    Unique {
        unique: bool,
        source: ConfigurationSource,
    },
}

fn arb_source() -> impl Strategy<Value = ConfigurationSource> {
    prop_oneof![
        Just(ConfigurationSource::Convention),
        Just(ConfigurationSource::DataAnnotation),
        Just(ConfigurationSource::Explicit),
    ]
}

fn arb_behavior() -> impl Strategy<Value = DeleteBehavior> {
    prop_oneof![
        Just(DeleteBehavior::Cascade),
        Just(DeleteBehavior::ClientSetNull),
        Just(DeleteBehavior::NoAction),
        Just(DeleteBehavior::Restrict),
        Just(DeleteBehavior::SetNull),
    ]
}

fn arb_proposal() -> impl Strategy<Value = Proposal> {
    prop_oneof![
        (
            0..PAIRS.len(),
            prop_oneof![Just(None), Just(Some("Customer")), Just(Some("Owner"))],
            arb_source(),
        )
            .prop_map(|(pair, navigation, source)| Proposal::Relate {
                pair,
                navigation,
                source,
            }),
        (
            0..ENTITIES.len(),
            prop_oneof![Just("Note"), Just("Code")],
            any::<bool>(),
            arb_source(),
        )
            .prop_map(|(entity, name, nullable, source)| Proposal::Property {
                entity,
                name,
                nullable,
                source,
            }),
        (arb_behavior(), arb_source())
            .prop_map(|(behavior, source)| Proposal::DeleteBehavior { behavior, source }),
        (any::<bool>(), arb_source())
            .prop_map(|(required, source)| Proposal::Required { required, source }),
        (any::<bool>(), arb_source())
            .prop_map(|(unique, source)| Proposal::Unique { unique, source }),
    ]
}

fn seeded() -> (Model, Vec<EntityTypeId>) {
    let mut model = Model::new(TypeCatalog::new());
    let entities = ENTITIES
        .iter()
        .map(|name| {
            model
                .add_entity_type(name, None, ConfigurationSource::Explicit)
                .unwrap()
        })
        .collect::<Vec<_>>();

    (model, entities)
}

fn first_foreign_key(model: &Model) -> Option<ForeignKeyId> {
    model.foreign_keys().map(|(id, _)| id).next()
}

// Errors are part of the outcome; only the resulting graph is compared.
fn apply(model: &mut Model, entities: &[EntityTypeId], proposal: &Proposal) {
    match *proposal {
        Proposal::Relate {
            pair,
            navigation,
            source,
        } => {
            let (dependent, principal) = PAIRS[pair];
            let _ = model.has_relationship(
                entities[dependent],
                entities[principal],
                navigation,
                None,
                source,
            );
        }
        Proposal::Property {
            entity,
            name,
            nullable,
            source,
        } => {
            let _ = model.add_property(entities[entity], name, ValueKind::Text, nullable, source);
        }
        Proposal::DeleteBehavior { behavior, source } => {
            if let Some(fk) = first_foreign_key(model) {
                let _ = model.set_delete_behavior(fk, behavior, source);
            }
        }
        Proposal::Required { required, source } => {
            if let Some(fk) = first_foreign_key(model) {
                let _ = model.set_required(fk, required, source);
            }
        }
        Proposal::Unique { unique, source } => {
            if let Some(fk) = first_foreign_key(model) {
                let _ = model.set_unique(fk, unique, source);
            }
        }
    }
}

fn assert_unique_member_names(snapshot: &ModelSnapshot) {
    for entity in &snapshot.entity_types {
        let mut names = BTreeSet::new();
        let navigations = snapshot.foreign_keys.iter().flat_map(|fk| {
            let to_principal = (fk.dependent == entity.name)
                .then_some(fk.to_principal.clone())
                .flatten();
            let to_dependent = (fk.principal == entity.name)
                .then_some(fk.to_dependent.clone())
                .flatten();
            to_principal.into_iter().chain(to_dependent)
        });
        let members = entity
            .properties
            .iter()
            .map(|property| property.name.clone())
            .chain(entity.service_properties.iter().cloned())
            .chain(navigations);

        for name in members {
            assert!(
                names.insert(name.clone()),
                "member '{name}' declared twice on '{}'",
                entity.name
            );
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn repeated_proposals_change_nothing(
        proposals in prop::collection::vec(arb_proposal(), 1..12)
    ) {
        let (mut once, entities) = seeded();
        let (mut twice, _) = seeded();

        for proposal in &proposals {
            apply(&mut once, &entities, proposal);
            apply(&mut twice, &entities, proposal);
            apply(&mut twice, &entities, proposal);
        }

        prop_assert_eq!(once.snapshot(), twice.snapshot());
    }

    #[test]
    fn member_names_stay_unique(
        proposals in prop::collection::vec(arb_proposal(), 1..16)
    ) {
        let (mut model, entities) = seeded();
        for proposal in &proposals {
            apply(&mut model, &entities, proposal);
        }

        assert_unique_member_names(&model.snapshot());
    }

    #[test]
    fn delete_behavior_never_yields_to_lower_sources(
        proposals in prop::collection::vec((arb_behavior(), arb_source()), 1..16)
    ) {
        let (mut model, entities) = seeded();
        let fk = model
            .has_relationship(entities[1], entities[0], None, None, ConfigurationSource::Convention)
            .unwrap()
            .unwrap();

        let mut value = DeleteBehavior::default();
        let mut recorded: Option<ConfigurationSource> = None;
        for (behavior, source) in proposals {
            let accepted = behavior == value || source.overrides(recorded);
            let outcome = model.set_delete_behavior(fk, behavior, source).unwrap();

            prop_assert_eq!(outcome.is_some(), accepted);
            if accepted {
                value = behavior;
                recorded = Some(source.max(recorded));
            }
            prop_assert_eq!(model.foreign_key(fk).unwrap().delete_behavior(), value);
        }
    }

    #[test]
    fn uniqueness_never_yields_to_lower_sources(
        proposals in prop::collection::vec((any::<bool>(), arb_source()), 1..16)
    ) {
        let (mut model, entities) = seeded();
        let fk = model
            .has_relationship(
                entities[1],
                entities[0],
                Some("Customer"),
                Some("Orders"),
                ConfigurationSource::Convention,
            )
            .unwrap()
            .unwrap();

        let mut value = false;
        let mut recorded = model.foreign_key(fk).unwrap().unique_source();
        for (unique, source) in proposals {
            let accepted = unique == value || source.overrides(recorded);
            prop_assert_eq!(model.can_set_unique(fk, unique, source).unwrap(), accepted);
            let outcome = model.set_unique(fk, unique, source).unwrap();

            prop_assert_eq!(outcome.is_some(), accepted);
            if accepted {
                value = unique;
                recorded = Some(source.max(recorded));
            }
            prop_assert_eq!(model.foreign_key(fk).unwrap().is_unique(), value);
        }
    }
}
