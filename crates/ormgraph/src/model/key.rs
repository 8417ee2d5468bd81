use crate::{
    batch::ModelEvent,
    error::ModelError,
    model::{EntityTypeId, ForeignKeyId, KeyId, Model, PropertyId},
    source::ConfigurationSource,
    types::ValueKind,
};
use tracing::{debug, trace};

///
/// KeyData
/// Ordered, duplicate-free property list declared on a root entity type.
///

#[derive(Clone, Debug)]
pub struct KeyData {
    pub(crate) declaring: EntityTypeId,
    pub(crate) properties: Vec<PropertyId>,
    pub(crate) source: ConfigurationSource,
}

impl KeyData {
    #[must_use]
    pub const fn declaring(&self) -> EntityTypeId {
        self.declaring
    }

    #[must_use]
    pub fn properties(&self) -> &[PropertyId] {
        &self.properties
    }

    #[must_use]
    pub const fn source(&self) -> ConfigurationSource {
        self.source
    }
}

impl Model {
    /// Find or create a key over `properties` on `entity`.
    ///
    /// Returns `Ok(None)` when the key would need to override a keyless
    /// flag or a property nullability that `source` cannot override.
    pub fn add_key(
        &mut self,
        entity: EntityTypeId,
        properties: &[PropertyId],
        source: ConfigurationSource,
    ) -> Result<Option<KeyId>, ModelError> {
        if !self.can_add_key(entity, properties, source)? {
            return Ok(None);
        }

        if let Some(existing) = self.find_key(entity, properties) {
            let data = self.graph.keys.get_mut(existing.0);
            if let Some(data) = data {
                data.source = source.max(Some(data.source));
            }
            return Ok(Some(existing));
        }

        self.run_batch(|model| {
            if model.entity_type(entity)?.is_keyless() {
                model.entity_type_mut(entity)?.keyless.try_set(false, source);
            }
            for property in properties {
                if model.property(*property)?.is_nullable() {
                    model.apply_property_nullable(*property, false, source)?;
                }
            }

            let id = KeyId(model.graph.keys.insert(KeyData {
                declaring: entity,
                properties: properties.to_vec(),
                source,
            }));
            model.entity_type_mut(entity)?.keys.push(id);
            debug!(key = %id, entity = %entity, ?source, "key added");
            model.notify(ModelEvent::KeyAdded { key: id });

            Ok(Some(id))
        })
    }

    /// Pure twin of `add_key`.
    pub fn can_add_key(
        &self,
        entity: EntityTypeId,
        properties: &[PropertyId],
        source: ConfigurationSource,
    ) -> Result<bool, ModelError> {
        self.validate_property_list("a key", entity, properties)?;

        let data = self.entity_type(entity)?;
        if let Some(base) = data.base_type {
            let root = self.root_of(base);
            return Err(ModelError::DerivedTypeKey {
                entity: data.name.clone(),
                key: self.property_list_label(properties),
                root: self.entity_name(root),
            });
        }
        if self.find_key(entity, properties).is_some() {
            return Ok(true);
        }
        if data.is_keyless() && !data.keyless.can_set(&false, source) {
            trace!(entity = %entity, ?source, "key rejected: keyless");
            return Ok(false);
        }

        for property in properties {
            let property_data = self.property(*property)?;
            if !property_data.is_nullable() {
                continue;
            }
            if property_data.nullable.can_set(&false, source) {
                continue;
            }
            if source.is_explicit() {
                return Err(ModelError::NullableKeyProperty {
                    context: "a key",
                    entity: data.name.clone(),
                    property: property_data.name.clone(),
                });
            }
            return Ok(false);
        }

        Ok(true)
    }

    #[must_use]
    pub fn find_key(&self, entity: EntityTypeId, properties: &[PropertyId]) -> Option<KeyId> {
        self.keys_of(entity).into_iter().find(|key| {
            self.key(*key)
                .is_ok_and(|data| data.properties.as_slice() == properties)
        })
    }

    /// Set or clear the primary key of a root entity type.
    pub fn set_primary_key(
        &mut self,
        entity: EntityTypeId,
        properties: Option<&[PropertyId]>,
        source: ConfigurationSource,
    ) -> Result<Option<KeyId>, ModelError> {
        let data = self.entity_type(entity)?;
        let current = data.primary_key;
        let recorded = data.primary_key_source;

        if let (Some(properties), Some(current)) = (properties, current)
            && self.key(current)?.properties.as_slice() == properties
        {
            self.entity_type_mut(entity)?.primary_key_source = Some(source.max(recorded));
            return Ok(Some(current));
        }
        if !source.overrides(recorded) {
            trace!(entity = %entity, ?source, "primary key change rejected");
            return Ok(None);
        }

        self.run_batch(|model| {
            let key = match properties {
                Some(properties) => match model.add_key(entity, properties, source)? {
                    Some(key) => Some(key),
                    None => return Ok(None),
                },
                None => None,
            };

            let data = model.entity_type_mut(entity)?;
            let previous = data.primary_key;
            data.primary_key = key;
            data.primary_key_source = Some(source);
            model.notify(ModelEvent::PrimaryKeyChanged { entity, previous });

            if let Some(previous) = previous {
                model.remove_unused_convention_keys(&[previous])?;
            }

            Ok(key)
        })
    }

    /// Remove a key; a key still referenced by a foreign key is an error.
    pub fn remove_key(&mut self, key: KeyId, source: ConfigurationSource) -> Result<bool, ModelError> {
        let data = self.key(key)?;
        if !source.overrides(Some(data.source)) {
            trace!(key = %key, ?source, "key removal rejected");
            return Ok(false);
        }

        let referencing = self.referencing_foreign_keys_of_key(key);
        if !referencing.is_empty() {
            let labels = referencing
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>();
            return Err(ModelError::KeyInUse {
                entity: self.entity_name(data.declaring),
                key: self.property_list_label(&data.properties),
                referencing: labels.join(", "),
            });
        }

        self.run_batch(|model| {
            model.remove_key_unchecked(key)?;
            Ok(true)
        })
    }

    pub(crate) fn remove_key_unchecked(&mut self, key: KeyId) -> Result<(), ModelError> {
        let data = self
            .graph
            .keys
            .remove(key.0)
            .ok_or_else(|| ModelError::detached("key", key))?;

        if let Ok(owner) = self.entity_type_mut(data.declaring) {
            owner.keys.retain(|id| *id != key);
            if owner.primary_key == Some(key) {
                owner.primary_key = None;
                owner.primary_key_source = None;
                self.notify(ModelEvent::PrimaryKeyChanged {
                    entity: data.declaring,
                    previous: Some(key),
                });
            }
        }
        debug!(key = %key, entity = %data.declaring, "key removed");
        self.notify(ModelEvent::KeyRemoved {
            key,
            entity: data.declaring,
        });

        Ok(())
    }

    /// Backlink lookup: foreign keys whose principal key is `key`.
    #[must_use]
    pub fn referencing_foreign_keys_of_key(&self, key: KeyId) -> Vec<ForeignKeyId> {
        self.foreign_keys()
            .filter(|(_, fk)| fk.principal_key == key)
            .map(|(id, _)| id)
            .collect()
    }

    /// Primary key of the hierarchy root, creating an implicit one if needed.
    ///
    /// Returns `Ok(None)` for keyless hierarchies.
    pub(crate) fn get_or_create_primary_key(
        &mut self,
        entity: EntityTypeId,
    ) -> Result<Option<KeyId>, ModelError> {
        let root = self.root_of(entity);
        if let Some(key) = self.find_primary_key(root) {
            return Ok(Some(key));
        }
        if self.entity_type(root)?.is_keyless() {
            return Ok(None);
        }

        let name = self.config.shadow_key_property.clone();
        let property = self.create_shadow_property(root, &name, ValueKind::Int32, false)?;
        let Some(key) = self.add_key(root, &[property], ConfigurationSource::Convention)? else {
            return Ok(None);
        };

        let data = self.entity_type_mut(root)?;
        data.primary_key = Some(key);
        data.primary_key_source = Some(ConfigurationSource::Convention);
        debug!(entity = %root, key = %key, "implicit primary key created");
        self.notify(ModelEvent::PrimaryKeyChanged {
            entity: root,
            previous: None,
        });

        Ok(Some(key))
    }

    /// Whether a primary key exists or could be created for `entity`.
    pub(crate) fn can_provide_primary_key(&self, entity: EntityTypeId) -> bool {
        let root = self.root_of(entity);
        self.find_primary_key(root).is_some()
            || self.entity_type(root).is_ok_and(|data| !data.is_keyless())
    }

    /// Drop convention keys that are neither primary nor referenced, along
    /// with the shadow properties only they used.
    pub(crate) fn remove_unused_convention_keys(
        &mut self,
        candidates: &[KeyId],
    ) -> Result<(), ModelError> {
        for key in candidates {
            let Ok(data) = self.key(*key) else {
                continue;
            };
            let primary = self.find_primary_key(data.declaring) == Some(*key);
            if data.source != ConfigurationSource::Convention
                || primary
                || !self.referencing_foreign_keys_of_key(*key).is_empty()
            {
                continue;
            }

            let properties = data.properties.clone();
            self.remove_key_unchecked(*key)?;
            self.remove_unused_shadow_properties(&properties)?;
        }

        Ok(())
    }
}
