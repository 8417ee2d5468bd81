use crate::{
    batch::ModelEvent,
    error::ModelError,
    model::{EntityTypeId, Model, PropertyId},
    relationship::{NavigationEnd, NavigationRef},
    source::ConfigurationSource,
};
use tracing::trace;

///
/// MemberRef
/// Anything that occupies a name in an entity type's member namespace.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MemberRef {
    Property(PropertyId),
    Navigation(NavigationRef),
    /// Service property declared on the given entity type.
    ServiceProperty(EntityTypeId),
}

impl Model {
    /// Member declared directly on `entity` under `name`.
    #[must_use]
    pub fn declared_member(&self, entity: EntityTypeId, name: &str) -> Option<MemberRef> {
        let data = self.entity_type(entity).ok()?;
        if let Some(property) = data.properties.get(name) {
            return Some(MemberRef::Property(*property));
        }
        if data.service_properties.contains_key(name) {
            return Some(MemberRef::ServiceProperty(entity));
        }

        self.declared_navigations(entity)
            .into_iter()
            .find(|(nav_name, _)| nav_name == name)
            .map(|(_, navigation)| MemberRef::Navigation(navigation))
    }

    pub(crate) fn declared_members(&self, entity: EntityTypeId) -> Vec<(String, MemberRef)> {
        let Ok(data) = self.entity_type(entity) else {
            return Vec::new();
        };

        let mut members = data
            .properties
            .iter()
            .map(|(name, id)| (name.clone(), MemberRef::Property(*id)))
            .collect::<Vec<_>>();
        members.extend(
            data.service_properties
                .keys()
                .map(|name| (name.clone(), MemberRef::ServiceProperty(entity))),
        );
        members.extend(
            self.declared_navigations(entity)
                .into_iter()
                .map(|(name, navigation)| (name, MemberRef::Navigation(navigation))),
        );

        members
    }

    /// Navigations declared on `entity` (not inherited).
    #[must_use]
    pub fn declared_navigations(&self, entity: EntityTypeId) -> Vec<(String, NavigationRef)> {
        let mut navigations = Vec::new();
        for (id, fk) in self.foreign_keys() {
            if fk.dependent == entity
                && let Some(nav) = &fk.to_principal
            {
                navigations.push((
                    nav.name.clone(),
                    NavigationRef::new(id, NavigationEnd::ToPrincipal),
                ));
            }
            if fk.principal == entity
                && let Some(nav) = &fk.to_dependent
            {
                navigations.push((
                    nav.name.clone(),
                    NavigationRef::new(id, NavigationEnd::ToDependent),
                ));
            }
        }

        navigations
    }

    /// Declared and inherited navigations.
    #[must_use]
    pub fn navigations_of(&self, entity: EntityTypeId) -> Vec<(String, NavigationRef)> {
        self.base_chain(entity)
            .into_iter()
            .flat_map(|id| self.declared_navigations(id))
            .collect()
    }

    /// Navigation visible from `entity` under `name`.
    #[must_use]
    pub fn find_navigation(&self, entity: EntityTypeId, name: &str) -> Option<NavigationRef> {
        self.navigations_of(entity)
            .into_iter()
            .find(|(nav_name, _)| nav_name == name)
            .map(|(_, navigation)| navigation)
    }

    /// Every member named `name` in the namespace shared by `entity`, its
    /// ancestors and its descendants, paired with the declaring type.
    #[must_use]
    pub fn members_in_hierarchy(
        &self,
        entity: EntityTypeId,
        name: &str,
    ) -> Vec<(EntityTypeId, MemberRef)> {
        let mut owners = self.base_chain(entity);
        owners.extend(self.descendants(entity));

        owners
            .into_iter()
            .filter_map(|owner| self.declared_member(owner, name).map(|m| (owner, m)))
            .collect()
    }

    pub(crate) fn ensure_member_name_free(
        &self,
        entity: EntityTypeId,
        name: &str,
    ) -> Result<(), ModelError> {
        match self.members_in_hierarchy(entity, name).first() {
            Some((declaring, _)) => Err(ModelError::ConflictingMember {
                entity: self.entity_name(entity),
                member: name.to_string(),
                declaring: self.entity_name(*declaring),
            }),
            None => Ok(()),
        }
    }

    // ------------------------------------------------------------------
    // Service properties
    // ------------------------------------------------------------------

    /// Declare an injected service member on `entity`.
    pub fn add_service_property(
        &mut self,
        entity: EntityTypeId,
        name: &str,
        source: ConfigurationSource,
    ) -> Result<bool, ModelError> {
        self.validate_name("service property", name)?;

        let data = self.entity_type(entity)?;
        if let Some(recorded) = data.service_properties.get(name).copied() {
            self.entity_type_mut(entity)?
                .service_properties
                .insert(name.to_string(), source.max(Some(recorded)));
            return Ok(true);
        }
        self.ensure_member_name_free(entity, name)?;

        self.run_batch(|model| {
            model
                .entity_type_mut(entity)?
                .service_properties
                .insert(name.to_string(), source);
            model.notify(ModelEvent::ServicePropertyAdded {
                entity,
                name: name.to_string(),
            });
            Ok(true)
        })
    }

    pub fn remove_service_property(
        &mut self,
        entity: EntityTypeId,
        name: &str,
        source: ConfigurationSource,
    ) -> Result<bool, ModelError> {
        let data = self.entity_type(entity)?;
        let Some(recorded) = data.service_properties.get(name).copied() else {
            return Ok(false);
        };
        if !source.overrides(Some(recorded)) {
            trace!(entity = %entity, name, ?source, "service property removal rejected");
            return Ok(false);
        }

        self.run_batch(|model| {
            model.entity_type_mut(entity)?.service_properties.remove(name);
            model.notify(ModelEvent::ServicePropertyRemoved {
                entity,
                name: name.to_string(),
            });
            Ok(true)
        })
    }

    // ------------------------------------------------------------------
    // Triggers
    // ------------------------------------------------------------------

    /// Declare a named trigger; names are unique per entity type.
    pub fn add_trigger(
        &mut self,
        entity: EntityTypeId,
        name: &str,
        source: ConfigurationSource,
    ) -> Result<bool, ModelError> {
        self.validate_name("trigger", name)?;

        let data = self.entity_type_mut(entity)?;
        if let Some(recorded) = data.triggers.get_mut(name) {
            *recorded = source.max(Some(*recorded));
            return Ok(true);
        }
        data.triggers.insert(name.to_string(), source);

        self.run_batch(|model| {
            model.notify(ModelEvent::TriggerAdded {
                entity,
                name: name.to_string(),
            });
            Ok(true)
        })
    }

    pub fn remove_trigger(
        &mut self,
        entity: EntityTypeId,
        name: &str,
        source: ConfigurationSource,
    ) -> Result<bool, ModelError> {
        let data = self.entity_type(entity)?;
        let Some(recorded) = data.triggers.get(name).copied() else {
            return Ok(false);
        };
        if !source.overrides(Some(recorded)) {
            return Ok(false);
        }

        self.run_batch(|model| {
            model.entity_type_mut(entity)?.triggers.remove(name);
            model.notify(ModelEvent::TriggerRemoved {
                entity,
                name: name.to_string(),
            });
            Ok(true)
        })
    }
}
