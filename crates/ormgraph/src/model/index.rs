use crate::{
    batch::ModelEvent,
    error::ModelError,
    model::{EntityTypeId, IndexId, Model, PropertyId},
    relationship::{Aspect, SetOutcome},
    source::ConfigurationSource,
};
use tracing::{debug, trace};

///
/// IndexData
/// Unnamed indexes are identified by their property list, named ones by name.
///

#[derive(Clone, Debug)]
pub struct IndexData {
    pub(crate) declaring: EntityTypeId,
    pub(crate) properties: Vec<PropertyId>,
    pub(crate) name: Option<String>,
    pub(crate) unique: Aspect<bool>,
    pub(crate) source: ConfigurationSource,
}

impl IndexData {
    #[must_use]
    pub const fn declaring(&self) -> EntityTypeId {
        self.declaring
    }

    #[must_use]
    pub fn properties(&self) -> &[PropertyId] {
        &self.properties
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    #[must_use]
    pub const fn is_unique(&self) -> bool {
        *self.unique.value()
    }

    #[must_use]
    pub const fn source(&self) -> ConfigurationSource {
        self.source
    }
}

impl Model {
    /// Find or create an index over `properties`.
    pub fn add_index(
        &mut self,
        entity: EntityTypeId,
        properties: &[PropertyId],
        name: Option<&str>,
        source: ConfigurationSource,
    ) -> Result<IndexId, ModelError> {
        self.validate_property_list("an index", entity, properties)?;
        if let Some(name) = name {
            self.validate_name("index", name)?;
        }

        let mut owners = self.base_chain(entity);
        owners.extend(self.descendants(entity));
        let existing = self.indexes_iter().find(|(_, index)| {
            owners.contains(&index.declaring)
                && match name {
                    Some(name) => index.name.as_deref() == Some(name),
                    None => index.name.is_none() && index.properties == properties,
                }
        });
        if let Some((id, index)) = existing {
            if index.properties != properties {
                return Err(ModelError::DuplicateName {
                    kind: "index",
                    entity: self.entity_name(index.declaring),
                    name: name.unwrap_or_default().to_string(),
                });
            }
            if let Some(index) = self.graph.indexes.get_mut(id.0) {
                index.source = source.max(Some(index.source));
            }
            return Ok(id);
        }

        self.run_batch(|model| {
            let id = IndexId(model.graph.indexes.insert(IndexData {
                declaring: entity,
                properties: properties.to_vec(),
                name: name.map(ToString::to_string),
                unique: Aspect::new(false),
                source,
            }));
            model.entity_type_mut(entity)?.indexes.push(id);
            debug!(index = %id, entity = %entity, ?source, "index added");
            model.notify(ModelEvent::IndexAdded { index: id });

            Ok(id)
        })
    }

    pub fn set_index_unique(
        &mut self,
        index: IndexId,
        unique: bool,
        source: ConfigurationSource,
    ) -> Result<bool, ModelError> {
        let data = self
            .graph
            .indexes
            .get_mut(index.0)
            .ok_or_else(|| ModelError::detached("index", index))?;

        match data.unique.try_set(unique, source) {
            SetOutcome::Rejected => Ok(false),
            SetOutcome::Upgraded => Ok(true),
            SetOutcome::Changed { .. } => {
                data.source = source.max(Some(data.source));
                self.run_batch(|model| {
                    model.notify(ModelEvent::IndexUniquenessChanged { index });
                    Ok(true)
                })
            }
        }
    }

    pub fn remove_index(
        &mut self,
        index: IndexId,
        source: ConfigurationSource,
    ) -> Result<bool, ModelError> {
        let data = self.index(index)?;
        if !source.overrides(Some(data.source)) {
            trace!(index = %index, ?source, "index removal rejected");
            return Ok(false);
        }

        self.run_batch(|model| {
            model.remove_index_unchecked(index)?;
            Ok(true)
        })
    }

    pub(crate) fn remove_index_unchecked(&mut self, index: IndexId) -> Result<(), ModelError> {
        let data = self
            .graph
            .indexes
            .remove(index.0)
            .ok_or_else(|| ModelError::detached("index", index))?;
        if let Ok(owner) = self.entity_type_mut(data.declaring) {
            owner.indexes.retain(|id| *id != index);
        }
        debug!(index = %index, entity = %data.declaring, "index removed");
        self.notify(ModelEvent::IndexRemoved {
            index,
            entity: data.declaring,
        });

        Ok(())
    }
}
