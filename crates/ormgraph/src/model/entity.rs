use crate::{
    batch::ModelEvent,
    error::ModelError,
    model::{EntityTypeId, ForeignKeyId, IndexId, KeyId, MemberRef, Model, PropertyId},
    relationship::{Aspect, ForeignKeyData},
    source::ConfigurationSource,
    types::HostTypeId,
};
use std::collections::BTreeMap;
use tracing::{debug, trace};

///
/// EntityTypeData
///

#[derive(Clone, Debug)]
pub struct EntityTypeData {
    pub(crate) name: String,
    pub(crate) host_type: Option<HostTypeId>,
    pub(crate) source: ConfigurationSource,
    pub(crate) base_type: Option<EntityTypeId>,
    pub(crate) base_type_source: Option<ConfigurationSource>,
    pub(crate) properties: BTreeMap<String, PropertyId>,
    pub(crate) keys: Vec<KeyId>,
    pub(crate) primary_key: Option<KeyId>,
    pub(crate) primary_key_source: Option<ConfigurationSource>,
    pub(crate) keyless: Aspect<bool>,
    pub(crate) is_owned: bool,
    pub(crate) indexes: Vec<IndexId>,
    pub(crate) service_properties: BTreeMap<String, ConfigurationSource>,
    pub(crate) triggers: BTreeMap<String, ConfigurationSource>,
}

impl EntityTypeData {
    fn new(name: String, host_type: Option<HostTypeId>, source: ConfigurationSource) -> Self {
        Self {
            name,
            host_type,
            source,
            base_type: None,
            base_type_source: None,
            properties: BTreeMap::new(),
            keys: Vec::new(),
            primary_key: None,
            primary_key_source: None,
            keyless: Aspect::new(false),
            is_owned: false,
            indexes: Vec::new(),
            service_properties: BTreeMap::new(),
            triggers: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn host_type(&self) -> Option<HostTypeId> {
        self.host_type
    }

    #[must_use]
    pub const fn source(&self) -> ConfigurationSource {
        self.source
    }

    #[must_use]
    pub const fn base_type(&self) -> Option<EntityTypeId> {
        self.base_type
    }

    #[must_use]
    pub const fn base_type_source(&self) -> Option<ConfigurationSource> {
        self.base_type_source
    }

    #[must_use]
    pub const fn primary_key(&self) -> Option<KeyId> {
        self.primary_key
    }

    /// Keys declared on this type only; derived types never declare keys.
    #[must_use]
    pub fn declared_keys(&self) -> &[KeyId] {
        &self.keys
    }

    pub fn declared_properties(&self) -> impl Iterator<Item = (&str, PropertyId)> {
        self.properties
            .iter()
            .map(|(name, id)| (name.as_str(), *id))
    }

    #[must_use]
    pub fn declared_indexes(&self) -> &[IndexId] {
        &self.indexes
    }

    pub fn service_properties(&self) -> impl Iterator<Item = &str> {
        self.service_properties.keys().map(String::as_str)
    }

    pub fn triggers(&self) -> impl Iterator<Item = &str> {
        self.triggers.keys().map(String::as_str)
    }

    #[must_use]
    pub const fn is_keyless(&self) -> bool {
        *self.keyless.value()
    }

    #[must_use]
    pub const fn is_owned(&self) -> bool {
        self.is_owned
    }
}

impl Model {
    // ------------------------------------------------------------------
    // Entity types
    // ------------------------------------------------------------------

    /// Find or create the entity type called `name`.
    ///
    /// An existing entity type is returned with its source upgraded; asking
    /// for the same name with a different host type is a conflict.
    pub fn add_entity_type(
        &mut self,
        name: &str,
        host_type: Option<HostTypeId>,
        source: ConfigurationSource,
    ) -> Result<EntityTypeId, ModelError> {
        self.validate_name("entity type", name)?;

        if let Some(existing) = self.find_entity_type(name) {
            let data = self.entity_type_mut(existing)?;
            if host_type.is_some() && data.host_type != host_type {
                return Err(ModelError::DuplicateName {
                    kind: "entity type",
                    entity: name.to_string(),
                    name: name.to_string(),
                });
            }
            data.source = source.max(Some(data.source));

            return Ok(existing);
        }

        let id = EntityTypeId(self.graph.entity_types.insert(EntityTypeData::new(
            name.to_string(),
            host_type,
            source,
        )));
        debug!(entity = %id, name, ?source, "entity type added");
        self.run_batch(|model| {
            model.notify(ModelEvent::EntityTypeAdded { entity: id });
            Ok(id)
        })
    }

    #[must_use]
    pub fn find_entity_type(&self, name: &str) -> Option<EntityTypeId> {
        self.entity_types()
            .find(|(_, data)| data.name == name)
            .map(|(id, _)| id)
    }

    /// Remove an entity type and everything that depends on it.
    pub fn remove_entity_type(
        &mut self,
        entity: EntityTypeId,
        source: ConfigurationSource,
    ) -> Result<bool, ModelError> {
        let data = self.entity_type(entity)?;
        if !source.overrides(Some(data.source)) {
            trace!(entity = %entity, ?source, "entity type removal rejected");
            return Ok(false);
        }

        self.run_batch(|model| {
            model.remove_entity_type_unchecked(entity)?;
            Ok(true)
        })
    }

    fn remove_entity_type_unchecked(&mut self, entity: EntityTypeId) -> Result<(), ModelError> {
        // Phase 1: every relationship touching the type goes first so no
        // foreign key is left pointing at a removed type.
        let touching = self
            .foreign_keys()
            .filter(|(_, fk)| self.foreign_key_touches(fk, entity))
            .map(|(id, _)| id)
            .collect::<Vec<ForeignKeyId>>();
        for fk in touching {
            if self.contains_foreign_key(fk) {
                self.remove_foreign_key_unchecked(fk)?;
            }
        }

        // Phase 2: derived types move up to the removed type's base.
        let base = self.entity_type(entity)?.base_type;
        for derived in self.direct_derived_types(entity) {
            let data = self.entity_type_mut(derived)?;
            data.base_type = base;
            self.notify(ModelEvent::BaseTypeChanged {
                entity: derived,
                previous: Some(entity),
            });
        }

        // Phase 3: owned members.
        let indexes = self
            .indexes_iter()
            .filter(|(_, index)| {
                index.declaring == entity
                    || index
                        .properties
                        .iter()
                        .any(|p| self.property(*p).is_ok_and(|p| p.declaring == entity))
            })
            .map(|(id, _)| id)
            .collect::<Vec<_>>();
        for index in indexes {
            self.remove_index_unchecked(index)?;
        }
        for key in self.entity_type(entity)?.keys.clone() {
            self.remove_key_unchecked(key)?;
        }
        let properties = self
            .entity_type(entity)?
            .properties
            .values()
            .copied()
            .collect::<Vec<_>>();
        for property in properties {
            self.remove_property_unchecked(property)?;
        }

        let removed = self
            .graph
            .entity_types
            .remove(entity.0)
            .ok_or_else(|| ModelError::detached("entity type", entity))?;
        debug!(entity = %entity, name = removed.name, "entity type removed");
        self.notify(ModelEvent::EntityTypeRemoved {
            entity,
            name: removed.name,
        });

        Ok(())
    }

    fn foreign_key_touches(&self, fk: &ForeignKeyData, entity: EntityTypeId) -> bool {
        fk.dependent == entity
            || fk.principal == entity
            || self
                .key(fk.principal_key)
                .is_ok_and(|key| key.declaring == entity)
            || fk
                .properties
                .iter()
                .any(|p| self.property(*p).is_ok_and(|p| p.declaring == entity))
    }

    // ------------------------------------------------------------------
    // Hierarchy
    // ------------------------------------------------------------------

    /// The entity type followed by its ancestors, nearest first.
    #[must_use]
    pub fn base_chain(&self, entity: EntityTypeId) -> Vec<EntityTypeId> {
        let mut chain = Vec::new();
        let mut current = Some(entity);
        while let Some(id) = current {
            if chain.contains(&id) {
                break;
            }
            chain.push(id);
            current = self.entity_type(id).ok().and_then(|data| data.base_type);
        }

        chain
    }

    #[must_use]
    pub fn root_of(&self, entity: EntityTypeId) -> EntityTypeId {
        self.base_chain(entity).last().copied().unwrap_or(entity)
    }

    #[must_use]
    pub fn direct_derived_types(&self, entity: EntityTypeId) -> Vec<EntityTypeId> {
        self.entity_types()
            .filter(|(_, data)| data.base_type == Some(entity))
            .map(|(id, _)| id)
            .collect()
    }

    /// All transitive derived types, breadth first.
    #[must_use]
    pub fn descendants(&self, entity: EntityTypeId) -> Vec<EntityTypeId> {
        let mut found = Vec::new();
        let mut queue = self.direct_derived_types(entity);
        while let Some(next) = queue.pop() {
            if found.contains(&next) || next == entity {
                continue;
            }
            found.push(next);
            queue.extend(self.direct_derived_types(next));
        }

        found
    }

    #[must_use]
    pub fn in_same_hierarchy(&self, a: EntityTypeId, b: EntityTypeId) -> bool {
        self.root_of(a) == self.root_of(b)
    }

    /// Whether `base` is `derived` or one of its ancestors.
    #[must_use]
    pub fn is_assignable_from(&self, base: EntityTypeId, derived: EntityTypeId) -> bool {
        self.base_chain(derived).contains(&base)
    }

    /// Set or clear the base type of `entity`.
    pub fn set_base_type(
        &mut self,
        entity: EntityTypeId,
        base: Option<EntityTypeId>,
        source: ConfigurationSource,
    ) -> Result<bool, ModelError> {
        let data = self.entity_type(entity)?;
        if data.base_type == base {
            let upgraded = source.max(data.base_type_source);
            self.entity_type_mut(entity)?.base_type_source = Some(upgraded);
            return Ok(true);
        }
        if !source.overrides(data.base_type_source) {
            trace!(entity = %entity, ?source, "base type change rejected");
            return Ok(false);
        }

        let Some(base) = base else {
            let previous = data.base_type;
            let data = self.entity_type_mut(entity)?;
            data.base_type = None;
            data.base_type_source = Some(source);
            return self.run_batch(|model| {
                model.notify(ModelEvent::BaseTypeChanged { entity, previous });
                Ok(true)
            });
        };

        let plan = self.plan_base_type(entity, base, source)?;

        self.run_batch(|model| {
            for key in plan.dropped_keys {
                model.remove_key_unchecked(key)?;
            }
            for property in plan.merged_properties {
                model.remove_property_unchecked(property)?;
            }
            for (owner, name) in plan.merged_service_properties {
                model.entity_type_mut(owner)?.service_properties.remove(&name);
                model.notify(ModelEvent::ServicePropertyRemoved {
                    entity: owner,
                    name,
                });
            }

            let data = model.entity_type_mut(entity)?;
            let previous = data.base_type;
            data.base_type = Some(base);
            data.base_type_source = Some(source);
            data.primary_key = None;
            data.primary_key_source = None;
            debug!(entity = %entity, base = %base, ?source, "base type set");
            model.notify(ModelEvent::BaseTypeChanged { entity, previous });

            Ok(true)
        })
    }

    // Validate a base type assignment and collect what the merge removes.
    fn plan_base_type(
        &self,
        entity: EntityTypeId,
        base: EntityTypeId,
        source: ConfigurationSource,
    ) -> Result<BaseTypePlan, ModelError> {
        let data = self.entity_type(entity)?;
        let base_data = self.entity_type(base)?;

        // Phase 1: structural checks.
        if base == entity || self.base_chain(base).contains(&entity) {
            return Err(ModelError::CircularInheritance {
                entity: data.name.clone(),
                base: base_data.name.clone(),
            });
        }
        if let (Some(host), Some(base_host)) = (data.host_type, base_data.host_type)
            && !self.oracle.is_assignable_from(base_host, host)
        {
            return Err(ModelError::IncompatibleBaseType {
                entity: data.name.clone(),
                base: base_data.name.clone(),
            });
        }
        if data.is_owned != base_data.is_owned {
            return Err(ModelError::OwnershipMismatch {
                entity: data.name.clone(),
                base: base_data.name.clone(),
            });
        }
        if data.is_owned {
            return Err(ModelError::OwnedTypeInHierarchy {
                entity: data.name.clone(),
            });
        }
        let root = self.root_of(base);
        let root_data = self.entity_type(root)?;
        if data.is_keyless() && !root_data.keys.is_empty() {
            return Err(ModelError::DerivedTypeKeyless {
                entity: data.name.clone(),
                base: base_data.name.clone(),
            });
        }

        // Phase 2: keys declared on the future derived type must be droppable.
        for key in &data.keys {
            let key_data = self.key(*key)?;
            if !source.overrides(Some(key_data.source))
                || !self.referencing_foreign_keys_of_key(*key).is_empty()
            {
                return Err(ModelError::DerivedTypeKey {
                    entity: data.name.clone(),
                    key: self.property_list_label(&key_data.properties),
                    root: root_data.name.clone(),
                });
            }
        }

        // Phase 3: members of the subtree must not collide with inherited ones.
        let mut plan = BaseTypePlan {
            dropped_keys: data.keys.clone(),
            merged_properties: Vec::new(),
            merged_service_properties: Vec::new(),
        };
        let inherited = self.base_chain(base);
        let mut subtree = vec![entity];
        subtree.extend(self.descendants(entity));
        for owner in subtree {
            for (name, member) in self.declared_members(owner) {
                for ancestor in &inherited {
                    let Some(existing) = self.declared_member(*ancestor, &name) else {
                        continue;
                    };
                    match (member, existing) {
                        (MemberRef::Property(mine), MemberRef::Property(theirs))
                            if self.property_mergeable(mine, theirs, source, &plan.dropped_keys) =>
                        {
                            plan.merged_properties.push(mine);
                        }
                        (MemberRef::ServiceProperty(_), MemberRef::ServiceProperty(_))
                            if self
                                .entity_type(owner)?
                                .service_properties
                                .get(&name)
                                .is_some_and(|recorded| source.overrides(Some(*recorded))) =>
                        {
                            plan.merged_service_properties.push((owner, name.clone()));
                        }
                        _ => {
                            return Err(ModelError::ConflictingMember {
                                entity: self.entity_name(owner),
                                member: name,
                                declaring: self.entity_name(*ancestor),
                            });
                        }
                    }
                }
            }
        }

        Ok(plan)
    }

    fn property_mergeable(
        &self,
        mine: PropertyId,
        theirs: PropertyId,
        source: ConfigurationSource,
        dropped_keys: &[KeyId],
    ) -> bool {
        let (Ok(mine_data), Ok(theirs_data)) = (self.property(mine), self.property(theirs)) else {
            return false;
        };

        mine_data.kind == theirs_data.kind
            && source.overrides(Some(mine_data.source))
            && !self.property_in_use_ignoring(mine, dropped_keys)
    }

    /// Mark an entity type keyless (or not). Keyless types cannot be principals.
    pub fn set_keyless(
        &mut self,
        entity: EntityTypeId,
        keyless: bool,
        source: ConfigurationSource,
    ) -> Result<bool, ModelError> {
        let data = self.entity_type(entity)?;
        if !data.keyless.can_set(&keyless, source) {
            return Ok(false);
        }
        let keys = data.keys.clone();
        if keyless
            && keys.iter().any(|key| {
                self.key(*key).map_or(true, |k| !source.overrides(Some(k.source)))
                    || !self.referencing_foreign_keys_of_key(*key).is_empty()
            })
        {
            trace!(entity = %entity, "keyless rejected: keys still in use");
            return Ok(false);
        }

        self.run_batch(|model| {
            if keyless {
                for key in keys {
                    model.remove_key_unchecked(key)?;
                }
            }
            model.entity_type_mut(entity)?.keyless.try_set(keyless, source);
            Ok(true)
        })
    }

    // ------------------------------------------------------------------
    // Derived views
    // ------------------------------------------------------------------

    /// Declared and inherited properties, root first.
    #[must_use]
    pub fn properties_of(&self, entity: EntityTypeId) -> Vec<PropertyId> {
        let mut chain = self.base_chain(entity);
        chain.reverse();
        chain
            .into_iter()
            .filter_map(|id| self.entity_type(id).ok())
            .flat_map(|data| data.properties.values().copied())
            .collect()
    }

    /// Keys usable from `entity` (declared on its root).
    #[must_use]
    pub fn keys_of(&self, entity: EntityTypeId) -> Vec<KeyId> {
        self.base_chain(entity)
            .into_iter()
            .filter_map(|id| self.entity_type(id).ok())
            .flat_map(|data| data.keys.iter().copied())
            .collect()
    }

    /// Primary key in effect for `entity`, inherited from the root.
    #[must_use]
    pub fn find_primary_key(&self, entity: EntityTypeId) -> Option<KeyId> {
        self.entity_type(self.root_of(entity))
            .ok()
            .and_then(|data| data.primary_key)
    }

    /// Relationships where `entity` itself is the dependent.
    #[must_use]
    pub fn declared_foreign_keys(&self, entity: EntityTypeId) -> Vec<ForeignKeyId> {
        self.foreign_keys()
            .filter(|(_, fk)| fk.dependent == entity)
            .map(|(id, _)| id)
            .collect()
    }

    /// Relationships where `entity` or one of its ancestors is the dependent.
    #[must_use]
    pub fn foreign_keys_of(&self, entity: EntityTypeId) -> Vec<ForeignKeyId> {
        let chain = self.base_chain(entity);
        self.foreign_keys()
            .filter(|(_, fk)| chain.contains(&fk.dependent))
            .map(|(id, _)| id)
            .collect()
    }

    /// Relationships where `entity` or one of its ancestors is the principal.
    #[must_use]
    pub fn referencing_foreign_keys(&self, entity: EntityTypeId) -> Vec<ForeignKeyId> {
        let chain = self.base_chain(entity);
        self.foreign_keys()
            .filter(|(_, fk)| chain.contains(&fk.principal))
            .map(|(id, _)| id)
            .collect()
    }

    /// Declared and inherited indexes.
    #[must_use]
    pub fn indexes_of(&self, entity: EntityTypeId) -> Vec<IndexId> {
        self.base_chain(entity)
            .into_iter()
            .filter_map(|id| self.entity_type(id).ok())
            .flat_map(|data| data.indexes.iter().copied())
            .collect()
    }
}

///
/// BaseTypePlan
///

struct BaseTypePlan {
    dropped_keys: Vec<KeyId>,
    merged_properties: Vec<PropertyId>,
    merged_service_properties: Vec<(EntityTypeId, String)>,
}
