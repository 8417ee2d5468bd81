use crate::{
    batch::ModelEvent,
    error::ModelError,
    model::{EntityTypeId, KeyId, MemberRef, Model, PropertyId},
    relationship::{Aspect, SetOutcome},
    source::ConfigurationSource,
    types::{MemberKind, ValueKind},
};
use tracing::{debug, trace};

///
/// PropertyData
///

#[derive(Clone, Debug)]
pub struct PropertyData {
    pub(crate) name: String,
    pub(crate) declaring: EntityTypeId,
    pub(crate) kind: ValueKind,
    pub(crate) nullable: Aspect<bool>,
    pub(crate) is_shadow: bool,
    pub(crate) source: ConfigurationSource,
}

impl PropertyData {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn declaring(&self) -> EntityTypeId {
        self.declaring
    }

    #[must_use]
    pub const fn kind(&self) -> ValueKind {
        self.kind
    }

    #[must_use]
    pub const fn is_nullable(&self) -> bool {
        *self.nullable.value()
    }

    #[must_use]
    pub const fn nullable_source(&self) -> Option<ConfigurationSource> {
        self.nullable.source()
    }

    /// True when the host type has no member backing this property.
    #[must_use]
    pub const fn is_shadow(&self) -> bool {
        self.is_shadow
    }

    #[must_use]
    pub const fn source(&self) -> ConfigurationSource {
        self.source
    }
}

impl Model {
    /// Find or create a scalar property on `entity`.
    ///
    /// A property with the same name and value kind visible from `entity`
    /// is reused and its source upgraded. Any other member with that name
    /// in the hierarchy is a conflict.
    pub fn add_property(
        &mut self,
        entity: EntityTypeId,
        name: &str,
        kind: ValueKind,
        nullable: bool,
        source: ConfigurationSource,
    ) -> Result<PropertyId, ModelError> {
        self.validate_name("property", name)?;
        let host_type = self.entity_type(entity)?.host_type;

        let existing = self
            .base_chain(entity)
            .into_iter()
            .find_map(|owner| match self.declared_member(owner, name) {
                Some(MemberRef::Property(id)) => Some(id),
                _ => None,
            });
        if let Some(id) = existing
            && self.property(id)?.kind == kind
        {
            let data = self.property_mut(id)?;
            data.source = source.max(Some(data.source));
            trace!(property = %id, name, ?source, "property source upgraded");

            return Ok(id);
        }
        self.ensure_member_name_free(entity, name)?;

        let is_shadow = host_type.is_none_or(|host| {
            !matches!(
                self.oracle.find_member(host, name).map(|m| m.kind),
                Some(MemberKind::Scalar(_))
            )
        });
        let id = PropertyId(self.graph.properties.insert(PropertyData {
            name: name.to_string(),
            declaring: entity,
            kind,
            nullable: Aspect::with_source(nullable, source),
            is_shadow,
            source,
        }));
        self.entity_type_mut(entity)?
            .properties
            .insert(name.to_string(), id);
        debug!(property = %id, entity = %entity, name, ?kind, ?source, "property added");

        self.run_batch(|model| {
            model.notify(ModelEvent::PropertyAdded { property: id });
            Ok(id)
        })
    }

    #[must_use]
    pub fn find_property(&self, entity: EntityTypeId, name: &str) -> Option<PropertyId> {
        self.base_chain(entity).into_iter().find_map(|owner| {
            self.entity_type(owner)
                .ok()
                .and_then(|data| data.properties.get(name).copied())
        })
    }

    /// Remove a property that no key, foreign key or index uses.
    pub fn remove_property(
        &mut self,
        property: PropertyId,
        source: ConfigurationSource,
    ) -> Result<bool, ModelError> {
        let data = self.property(property)?;
        if !source.overrides(Some(data.source)) {
            trace!(property = %property, ?source, "property removal rejected");
            return Ok(false);
        }
        if self.property_in_use(property) {
            trace!(property = %property, "property removal rejected: in use");
            return Ok(false);
        }

        self.run_batch(|model| {
            model.remove_property_unchecked(property)?;
            Ok(true)
        })
    }

    pub(crate) fn remove_property_unchecked(
        &mut self,
        property: PropertyId,
    ) -> Result<(), ModelError> {
        let data = self
            .graph
            .properties
            .remove(property.0)
            .ok_or_else(|| ModelError::detached("property", property))?;
        if let Ok(owner) = self.entity_type_mut(data.declaring) {
            owner.properties.remove(&data.name);
        }
        debug!(property = %property, name = data.name, "property removed");
        self.notify(ModelEvent::PropertyRemoved {
            entity: data.declaring,
            name: data.name,
        });

        Ok(())
    }

    /// Change property nullability.
    ///
    /// Key properties never become nullable. A required relationship using
    /// the property is made optional when its requiredness can be overridden.
    pub fn set_property_nullable(
        &mut self,
        property: PropertyId,
        nullable: bool,
        source: ConfigurationSource,
    ) -> Result<bool, ModelError> {
        let data = self.property(property)?;
        if !data.nullable.can_set(&nullable, source) {
            return Ok(false);
        }

        let mut optional = Vec::new();
        if nullable && !data.is_nullable() {
            if self.property_in_key(property) {
                if source.is_explicit() {
                    return Err(ModelError::NullableKeyProperty {
                        context: "a key",
                        entity: self.entity_name(data.declaring),
                        property: data.name.clone(),
                    });
                }
                return Ok(false);
            }
            for (fk, fk_data) in self.foreign_keys() {
                if !fk_data.properties.contains(&property) || !fk_data.is_required() {
                    continue;
                }
                if !fk_data.required.can_set(&false, source) {
                    trace!(property = %property, fk = %fk, "nullability rejected: required relationship");
                    return Ok(false);
                }
                optional.push(fk);
            }
        }

        self.run_batch(|model| {
            for fk in optional {
                model.foreign_key_mut(fk)?.required.try_set(false, source);
                model.notify(ModelEvent::ForeignKeyRequirednessChanged { fk });
            }
            model.apply_property_nullable(property, nullable, source)?;
            Ok(true)
        })
    }

    pub(crate) fn apply_property_nullable(
        &mut self,
        property: PropertyId,
        nullable: bool,
        source: ConfigurationSource,
    ) -> Result<(), ModelError> {
        let outcome = self.property_mut(property)?.nullable.try_set(nullable, source);
        if matches!(outcome, SetOutcome::Changed { .. }) {
            self.notify(ModelEvent::PropertyNullabilityChanged { property });
        }

        Ok(())
    }

    #[must_use]
    pub fn property_in_key(&self, property: PropertyId) -> bool {
        self.keys_iter()
            .any(|(_, key)| key.properties.contains(&property))
    }

    /// Whether a key, foreign key or index refers to `property`.
    #[must_use]
    pub fn property_in_use(&self, property: PropertyId) -> bool {
        self.property_in_use_ignoring(property, &[])
    }

    pub(crate) fn property_in_use_ignoring(&self, property: PropertyId, keys: &[KeyId]) -> bool {
        self.keys_iter()
            .any(|(id, key)| !keys.contains(&id) && key.properties.contains(&property))
            || self
                .foreign_keys()
                .any(|(_, fk)| fk.properties.contains(&property))
            || self
                .indexes_iter()
                .any(|(_, index)| index.properties.contains(&property))
    }

    /// Create a convention shadow property, suffixing the name until it is free.
    pub(crate) fn create_shadow_property(
        &mut self,
        entity: EntityTypeId,
        base_name: &str,
        kind: ValueKind,
        nullable: bool,
    ) -> Result<PropertyId, ModelError> {
        let mut name = base_name.to_string();
        let mut suffix = 0_u32;
        while !self.members_in_hierarchy(entity, &name).is_empty() {
            suffix += 1;
            name = format!("{base_name}{suffix}");
        }

        let id = self.add_property(
            entity,
            &name,
            kind,
            nullable,
            ConfigurationSource::Convention,
        )?;
        self.property_mut(id)?.is_shadow = true;

        Ok(id)
    }

    /// Drop convention shadow properties left without any user.
    pub(crate) fn remove_unused_shadow_properties(
        &mut self,
        candidates: &[PropertyId],
    ) -> Result<(), ModelError> {
        for property in candidates {
            let Ok(data) = self.property(*property) else {
                continue;
            };
            if data.is_shadow
                && data.source == ConfigurationSource::Convention
                && !self.property_in_use(*property)
            {
                self.remove_property_unchecked(*property)?;
            }
        }

        Ok(())
    }
}
