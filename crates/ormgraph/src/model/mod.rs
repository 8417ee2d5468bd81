//! Module: model
//! Responsibility: the mutable type graph (entity types, properties, keys,
//! indexes, service properties, triggers) stored in id-indexed arenas.
//! Does not own: relationship arbitration (see `relationship`).
//! Boundary: every element is addressed by a typed id; back-references are
//! derived lookups, never stored pointers.
//!
//! Invariants:
//! - Names are unique across properties, navigations and service properties
//!   within an entity type's inheritance-visible namespace.
//! - Only root entity types declare keys.
//! - Key properties are never nullable.
//! - A removed element keeps its tombstone; using its id yields `Detached`.

mod arena;
mod entity;
mod index;
mod key;
mod member;
mod property;
mod snapshot;

#[cfg(test)]
mod tests;

use crate::{
    batch::{BatchState, ModelObserver, reverting_events},
    config::{ConfigError, ModelConfig},
    error::ModelError,
    relationship::ForeignKeyData,
    types::TypeOracle,
};
use std::{
    collections::{BTreeMap, BTreeSet},
    rc::Rc,
};
use tracing::debug;

pub(crate) use arena::Arena;
pub use arena::{EntityTypeId, ForeignKeyId, IndexId, KeyId, PropertyId};
pub use entity::EntityTypeData;
pub use index::IndexData;
pub use key::KeyData;
pub use member::MemberRef;
pub use property::PropertyData;
pub use snapshot::{
    EntityTypeSnapshot, ForeignKeySnapshot, IndexSnapshot, KeySnapshot, ModelSnapshot,
    PropertySnapshot,
};

///
/// Graph
/// All arena-backed model state. Cloning it is the rollback checkpoint.
///

#[derive(Clone, Debug, Default)]
pub(crate) struct Graph {
    pub(crate) entity_types: Arena<EntityTypeData>,
    pub(crate) properties: Arena<PropertyData>,
    pub(crate) keys: Arena<KeyData>,
    pub(crate) foreign_keys: Arena<ForeignKeyData>,
    pub(crate) indexes: Arena<IndexData>,
    /// Relationship ids that were merged into (or replaced by) another one.
    pub(crate) replacements: BTreeMap<ForeignKeyId, ForeignKeyId>,
}

///
/// Checkpoint
///

pub(crate) struct Checkpoint {
    graph: Graph,
    pending: usize,
    delivered: u64,
}

///
/// Model
///
/// The mutable schema graph plus the collaborators it consults: the host
/// type oracle, the notification observer and the builder configuration.
///

pub struct Model {
    pub(crate) graph: Graph,
    pub(crate) config: ModelConfig,
    pub(crate) oracle: Rc<dyn TypeOracle>,
    pub(crate) batch: BatchState,
    pub(crate) observer: Option<Box<dyn ModelObserver>>,
}

impl Model {
    /// Build an empty model with the default configuration.
    pub fn new(oracle: impl TypeOracle + 'static) -> Self {
        Self {
            graph: Graph::default(),
            config: ModelConfig::default(),
            oracle: Rc::new(oracle),
            batch: BatchState::default(),
            observer: None,
        }
    }

    /// Build an empty model with a validated configuration.
    pub fn with_config(
        oracle: impl TypeOracle + 'static,
        config: ModelConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let mut model = Self::new(oracle);
        model.config = config;

        Ok(model)
    }

    /// Install the observer notified after each committed batch.
    pub fn set_observer(&mut self, observer: impl ModelObserver + 'static) {
        self.observer = Some(Box::new(observer));
    }

    /// Remove and return the installed observer.
    pub fn take_observer(&mut self) -> Option<Box<dyn ModelObserver>> {
        self.observer.take()
    }

    #[must_use]
    pub const fn config(&self) -> &ModelConfig {
        &self.config
    }

    #[must_use]
    pub fn oracle(&self) -> &dyn TypeOracle {
        self.oracle.as_ref()
    }

    // ------------------------------------------------------------------
    // Arena access
    // ------------------------------------------------------------------

    pub fn entity_type(&self, id: EntityTypeId) -> Result<&EntityTypeData, ModelError> {
        self.graph
            .entity_types
            .get(id.0)
            .ok_or_else(|| ModelError::detached("entity type", id))
    }

    pub(crate) fn entity_type_mut(
        &mut self,
        id: EntityTypeId,
    ) -> Result<&mut EntityTypeData, ModelError> {
        self.graph
            .entity_types
            .get_mut(id.0)
            .ok_or_else(|| ModelError::detached("entity type", id))
    }

    pub fn property(&self, id: PropertyId) -> Result<&PropertyData, ModelError> {
        self.graph
            .properties
            .get(id.0)
            .ok_or_else(|| ModelError::detached("property", id))
    }

    pub(crate) fn property_mut(&mut self, id: PropertyId) -> Result<&mut PropertyData, ModelError> {
        self.graph
            .properties
            .get_mut(id.0)
            .ok_or_else(|| ModelError::detached("property", id))
    }

    pub fn key(&self, id: KeyId) -> Result<&KeyData, ModelError> {
        self.graph
            .keys
            .get(id.0)
            .ok_or_else(|| ModelError::detached("key", id))
    }

    pub fn foreign_key(&self, id: ForeignKeyId) -> Result<&ForeignKeyData, ModelError> {
        self.graph
            .foreign_keys
            .get(id.0)
            .ok_or_else(|| ModelError::detached("foreign key", id))
    }

    pub(crate) fn foreign_key_mut(
        &mut self,
        id: ForeignKeyId,
    ) -> Result<&mut ForeignKeyData, ModelError> {
        self.graph
            .foreign_keys
            .get_mut(id.0)
            .ok_or_else(|| ModelError::detached("foreign key", id))
    }

    pub fn index(&self, id: IndexId) -> Result<&IndexData, ModelError> {
        self.graph
            .indexes
            .get(id.0)
            .ok_or_else(|| ModelError::detached("index", id))
    }

    #[must_use]
    pub fn contains_entity_type(&self, id: EntityTypeId) -> bool {
        self.graph.entity_types.get(id.0).is_some()
    }

    #[must_use]
    pub fn contains_foreign_key(&self, id: ForeignKeyId) -> bool {
        self.graph.foreign_keys.get(id.0).is_some()
    }

    pub fn entity_types(&self) -> impl Iterator<Item = (EntityTypeId, &EntityTypeData)> {
        self.graph
            .entity_types
            .iter()
            .map(|(index, data)| (EntityTypeId(index), data))
    }

    pub fn foreign_keys(&self) -> impl Iterator<Item = (ForeignKeyId, &ForeignKeyData)> {
        self.graph
            .foreign_keys
            .iter()
            .map(|(index, data)| (ForeignKeyId(index), data))
    }

    pub(crate) fn keys_iter(&self) -> impl Iterator<Item = (KeyId, &KeyData)> {
        self.graph
            .keys
            .iter()
            .map(|(index, data)| (KeyId(index), data))
    }

    pub(crate) fn indexes_iter(&self) -> impl Iterator<Item = (IndexId, &IndexData)> {
        self.graph
            .indexes
            .iter()
            .map(|(index, data)| (IndexId(index), data))
    }

    // ------------------------------------------------------------------
    // Diagnostics
    // ------------------------------------------------------------------

    pub(crate) fn entity_name(&self, id: EntityTypeId) -> String {
        self.entity_type(id)
            .map_or_else(|_| id.to_string(), |data| data.name.clone())
    }

    pub(crate) fn property_list_label(&self, properties: &[PropertyId]) -> String {
        let names = properties
            .iter()
            .map(|id| {
                self.property(*id)
                    .map_or_else(|_| id.to_string(), |data| data.name.clone())
            })
            .collect::<Vec<_>>();

        format!("{{{}}}", names.join(", "))
    }

    // ------------------------------------------------------------------
    // Validation helpers
    // ------------------------------------------------------------------

    pub(crate) fn validate_name(&self, kind: &'static str, name: &str) -> Result<(), ModelError> {
        if name.is_empty() {
            return Err(ModelError::EmptyName { kind });
        }
        if name.len() > self.config.max_name_len {
            return Err(ModelError::NameTooLong {
                kind,
                name: name.to_string(),
                max: self.config.max_name_len,
            });
        }

        Ok(())
    }

    /// Ensure `properties` is non-empty, duplicate-free and visible from `entity`.
    pub(crate) fn validate_property_list(
        &self,
        context: &'static str,
        entity: EntityTypeId,
        properties: &[PropertyId],
    ) -> Result<(), ModelError> {
        let entity_name = self.entity_name(entity);
        if properties.is_empty() {
            return Err(ModelError::EmptyPropertyList {
                context,
                entity: entity_name,
            });
        }

        let visible = self.base_chain(entity);
        let mut seen = BTreeSet::new();
        for id in properties {
            let property = self.property(*id)?;
            if !seen.insert(*id) {
                return Err(ModelError::DuplicateProperty {
                    context,
                    entity: entity_name,
                    property: property.name.clone(),
                });
            }
            if !visible.contains(&property.declaring) {
                return Err(ModelError::PropertyNotInHierarchy {
                    entity: entity_name,
                    property: property.name.clone(),
                });
            }
        }

        Ok(())
    }

    // ------------------------------------------------------------------
    // Checkpoints
    // ------------------------------------------------------------------

    pub(crate) fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            graph: self.graph.clone(),
            pending: self.batch.pending.len(),
            delivered: self.batch.delivered,
        }
    }

    /// Roll the graph back to `checkpoint`.
    ///
    /// Notifications still queued since the checkpoint are dropped. If the
    /// observer already received some of them, it is sent the events that
    /// undo the difference instead, so what it has seen keeps describing
    /// the graph.
    pub(crate) fn restore(&mut self, checkpoint: Checkpoint) -> Result<(), ModelError> {
        if self.batch.delivered == checkpoint.delivered {
            self.graph = checkpoint.graph;
            self.batch.pending.truncate(checkpoint.pending);
            return Ok(());
        }

        // Anything still queued was queued after the last delivery and is
        // part of the difference.
        let reverting = reverting_events(&self.graph, &checkpoint.graph);
        debug!(events = reverting.len(), "restoring checkpoint after delivery");
        self.graph = checkpoint.graph;
        self.batch.pending.clear();

        self.run_batch(|model| {
            for event in reverting {
                model.notify(event);
            }
            Ok(())
        })
    }

    /// Detached copy for dry runs: same graph, config and oracle, no
    /// observer and no pending notifications.
    pub(crate) fn probe(&self) -> Self {
        Self {
            graph: self.graph.clone(),
            config: self.config.clone(),
            oracle: Rc::clone(&self.oracle),
            batch: BatchState::default(),
            observer: None,
        }
    }
}
