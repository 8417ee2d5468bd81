use crate::{
    batch::ModelEvent,
    model::{EntityTypeId, ForeignKeyId, Graph, IndexId, KeyId, PropertyId},
    relationship::{ForeignKeyData, NavigationEnd},
};
use std::collections::BTreeMap;

const ENDS: [NavigationEnd; 2] = [NavigationEnd::ToPrincipal, NavigationEnd::ToDependent];

///
/// Reverting
/// Events taking an observer from one graph to another, removals first so
/// names are free again before anything reuses them.
///

#[derive(Default)]
struct Reverting {
    removals: Vec<ModelEvent>,
    additions: Vec<ModelEvent>,
    changes: Vec<ModelEvent>,
}

/// Events describing the move from `current` back to `target`.
///
/// Ids are stable across the move: an element live in one graph and not the
/// other was added or removed, an element live in both may have changed.
pub(crate) fn reverting_events(current: &Graph, target: &Graph) -> Vec<ModelEvent> {
    let mut out = Reverting::default();
    out.foreign_keys(current, target);
    out.members(current, target);
    out.entity_types(current, target);
    out.restored(current, target);

    let Reverting {
        mut removals,
        additions,
        changes,
    } = out;
    removals.extend(additions);
    removals.extend(changes);

    removals
}

impl Reverting {
    // Relationships go before the members they point at.
    fn foreign_keys(&mut self, current: &Graph, target: &Graph) {
        for (index, fk) in current.foreign_keys.iter() {
            let id = ForeignKeyId(index);
            match target.foreign_keys.get(index) {
                Some(before) => self.foreign_key_changes(id, fk, before),
                None => {
                    for end in ENDS {
                        if let Some(nav) = fk.navigation(end) {
                            self.removals.push(ModelEvent::NavigationRemoved {
                                fk: id,
                                end,
                                name: nav.name.clone(),
                            });
                        }
                    }
                    self.removals.push(ModelEvent::ForeignKeyRemoved {
                        fk: id,
                        dependent: fk.dependent,
                        principal: fk.principal,
                    });
                }
            }
        }
    }

    // Indexes, keys and properties.
    fn members(&mut self, current: &Graph, target: &Graph) {
        for (index, data) in current.indexes.iter() {
            match target.indexes.get(index) {
                Some(before) if before.unique.value() != data.unique.value() => {
                    self.changes.push(ModelEvent::IndexUniquenessChanged {
                        index: IndexId(index),
                    });
                }
                Some(_) => {}
                None => self.removals.push(ModelEvent::IndexRemoved {
                    index: IndexId(index),
                    entity: data.declaring,
                }),
            }
        }
        for (index, data) in current.keys.iter() {
            if target.keys.get(index).is_none() {
                self.removals.push(ModelEvent::KeyRemoved {
                    key: KeyId(index),
                    entity: data.declaring,
                });
            }
        }
        for (index, data) in current.properties.iter() {
            match target.properties.get(index) {
                Some(before) if before.nullable.value() != data.nullable.value() => {
                    self.changes.push(ModelEvent::PropertyNullabilityChanged {
                        property: PropertyId(index),
                    });
                }
                Some(_) => {}
                None => self.removals.push(ModelEvent::PropertyRemoved {
                    entity: data.declaring,
                    name: data.name.clone(),
                }),
            }
        }
    }

    // Entity types and their named members.
    fn entity_types(&mut self, current: &Graph, target: &Graph) {
        for (index, data) in current.entity_types.iter() {
            let entity = EntityTypeId(index);
            let Some(before) = target.entity_types.get(index) else {
                self.removals.push(ModelEvent::EntityTypeRemoved {
                    entity,
                    name: data.name.clone(),
                });
                continue;
            };

            if before.base_type != data.base_type {
                self.changes.push(ModelEvent::BaseTypeChanged {
                    entity,
                    previous: data.base_type,
                });
            }
            if before.primary_key != data.primary_key {
                self.changes.push(ModelEvent::PrimaryKeyChanged {
                    entity,
                    previous: data.primary_key,
                });
            }
            self.named_members(
                entity,
                &data.service_properties,
                &before.service_properties,
                |entity, name| ModelEvent::ServicePropertyRemoved { entity, name },
                |entity, name| ModelEvent::ServicePropertyAdded { entity, name },
            );
            self.named_members(
                entity,
                &data.triggers,
                &before.triggers,
                |entity, name| ModelEvent::TriggerRemoved { entity, name },
                |entity, name| ModelEvent::TriggerAdded { entity, name },
            );
        }
    }

    // Whatever comes back, in dependency order.
    fn restored(&mut self, current: &Graph, target: &Graph) {
        for (index, data) in target.entity_types.iter() {
            if current.entity_types.get(index).is_none() {
                let entity = EntityTypeId(index);
                self.additions.push(ModelEvent::EntityTypeAdded { entity });
                for name in data.service_properties.keys() {
                    self.additions.push(ModelEvent::ServicePropertyAdded {
                        entity,
                        name: name.clone(),
                    });
                }
                for name in data.triggers.keys() {
                    self.additions.push(ModelEvent::TriggerAdded {
                        entity,
                        name: name.clone(),
                    });
                }
            }
        }
        for (index, _) in target.properties.iter() {
            if current.properties.get(index).is_none() {
                self.additions.push(ModelEvent::PropertyAdded {
                    property: PropertyId(index),
                });
            }
        }
        for (index, _) in target.keys.iter() {
            if current.keys.get(index).is_none() {
                self.additions.push(ModelEvent::KeyAdded { key: KeyId(index) });
            }
        }
        for (index, _) in target.indexes.iter() {
            if current.indexes.get(index).is_none() {
                self.additions.push(ModelEvent::IndexAdded {
                    index: IndexId(index),
                });
            }
        }
        for (index, fk) in target.foreign_keys.iter() {
            if current.foreign_keys.get(index).is_none() {
                let id = ForeignKeyId(index);
                self.additions.push(ModelEvent::ForeignKeyAdded { fk: id });
                self.navigations_added(id, fk);
            }
        }
    }

    fn foreign_key_changes(
        &mut self,
        fk: ForeignKeyId,
        current: &ForeignKeyData,
        target: &ForeignKeyData,
    ) {
        let reoriented =
            current.principal != target.principal || current.dependent != target.dependent;

        for end in ENDS {
            let now = current.navigation(end).map(|nav| nav.name.as_str());
            let then = target.navigation(end).map(|nav| nav.name.as_str());
            if now == then && !reoriented {
                continue;
            }
            if let Some(name) = now {
                self.removals.push(ModelEvent::NavigationRemoved {
                    fk,
                    end,
                    name: name.to_string(),
                });
            }
            if let Some(name) = then {
                self.changes.push(ModelEvent::NavigationAdded {
                    fk,
                    end,
                    name: name.to_string(),
                });
            }
        }

        // Shape changes land before the navigations queued above.
        let mut shape = Vec::new();
        if reoriented {
            shape.push(ModelEvent::ForeignKeyPrincipalEndChanged {
                fk,
                previous_principal: current.principal,
                previous_dependent: current.dependent,
            });
        }
        if current.properties != target.properties
            || current.principal_key != target.principal_key
        {
            shape.push(ModelEvent::ForeignKeyPropertiesChanged {
                fk,
                previous_properties: current.properties.clone(),
                previous_principal_key: current.principal_key,
            });
        }
        if current.unique.value() != target.unique.value() {
            shape.push(ModelEvent::ForeignKeyUniquenessChanged { fk });
        }
        if current.required.value() != target.required.value() {
            shape.push(ModelEvent::ForeignKeyRequirednessChanged { fk });
        }
        if current.ownership.value() != target.ownership.value() {
            shape.push(ModelEvent::ForeignKeyOwnershipChanged { fk });
        }
        if current.delete_behavior.value() != target.delete_behavior.value() {
            shape.push(ModelEvent::ForeignKeyDeleteBehaviorChanged { fk });
        }
        self.additions.extend(shape);
    }

    fn navigations_added(&mut self, fk: ForeignKeyId, data: &ForeignKeyData) {
        for end in ENDS {
            if let Some(nav) = data.navigation(end) {
                self.additions.push(ModelEvent::NavigationAdded {
                    fk,
                    end,
                    name: nav.name.clone(),
                });
            }
        }
    }

    fn named_members<V>(
        &mut self,
        entity: EntityTypeId,
        current: &BTreeMap<String, V>,
        target: &BTreeMap<String, V>,
        removed: impl Fn(EntityTypeId, String) -> ModelEvent,
        added: impl Fn(EntityTypeId, String) -> ModelEvent,
    ) {
        for name in current.keys().filter(|name| !target.contains_key(*name)) {
            self.removals.push(removed(entity, name.clone()));
        }
        for name in target.keys().filter(|name| !current.contains_key(*name)) {
            self.additions.push(added(entity, name.clone()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        model::Model,
        source::ConfigurationSource::{Convention, Explicit},
        types::TypeCatalog,
    };

    #[test]
    fn identical_graphs_need_no_events() {
        let mut model = Model::new(TypeCatalog::new());
        model.add_entity_type("Blog", None, Explicit).unwrap();

        assert!(reverting_events(&model.graph, &model.graph.clone()).is_empty());
    }

    #[test]
    fn created_relationship_is_reported_removed() {
        let mut model = Model::new(TypeCatalog::new());
        let blog = model.add_entity_type("Blog", None, Explicit).unwrap();
        let post = model.add_entity_type("Post", None, Explicit).unwrap();
        let before = model.graph.clone();

        let fk = model
            .has_relationship(post, blog, Some("Blog"), None, Convention)
            .unwrap()
            .unwrap();
        let events = reverting_events(&model.graph, &before);

        let kinds = events.iter().map(ModelEvent::kind).collect::<Vec<_>>();
        assert_eq!(kinds[..2], ["navigation_removed", "foreign_key_removed"]);
        assert!(events.contains(&ModelEvent::ForeignKeyRemoved {
            fk,
            dependent: post,
            principal: blog,
        }));
        assert!(events.contains(&ModelEvent::PropertyRemoved {
            entity: post,
            name: "BlogTempId".to_string(),
        }));
        assert!(events.contains(&ModelEvent::PrimaryKeyChanged {
            entity: blog,
            previous: model.entity_type(blog).unwrap().primary_key(),
        }));
        assert!(!events.iter().any(|event| event.kind().ends_with("_added")));
    }
}
