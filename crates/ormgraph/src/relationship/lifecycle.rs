use crate::{
    batch::ModelEvent,
    error::ModelError,
    model::{EntityTypeId, ForeignKeyId, Model, PropertyId},
    relationship::{
        Aspect, DeleteBehavior, ForeignKeyData, NavigationChange, NavigationEnd, SetOutcome,
    },
    source::{ConfigurationSource, max_source},
};
use tracing::{debug, trace};

impl Model {
    /// Find or create the relationship from `dependent` to `principal` that
    /// carries the requested navigations.
    ///
    /// A relationship between the two hierarchies already using one of the
    /// names is reconfigured in place. Otherwise a new relationship keyed on
    /// the principal's primary key and implicit shadow properties is created;
    /// if the navigations cannot be applied to it, it is removed again and
    /// the call is rejected.
    pub fn has_relationship(
        &mut self,
        dependent: EntityTypeId,
        principal: EntityTypeId,
        to_principal: Option<&str>,
        to_dependent: Option<&str>,
        source: ConfigurationSource,
    ) -> Result<Option<ForeignKeyId>, ModelError> {
        self.entity_type(dependent)?;
        self.entity_type(principal)?;
        let to_principal_change = NavigationChange::from_name(to_principal);
        let to_dependent_change = NavigationChange::from_name(to_dependent);

        // Phase 1: reuse.
        if let Some((fk, inverted)) =
            self.find_matching_relationship(dependent, principal, to_principal, to_dependent)
        {
            trace!(fk = %fk, inverted, ?source, "reconfiguring existing relationship");
            if !inverted {
                if to_principal.is_none() && to_dependent.is_none() {
                    self.foreign_key_mut(fk)?.upgrade_source(source);
                    return Ok(Some(fk));
                }
                return self.set_navigations(fk, to_principal_change, to_dependent_change, source);
            }

            // The inversion only sticks if the navigations follow.
            let checkpoint = self.checkpoint();
            let outcome = match self.set_related_types(fk, principal, dependent, source) {
                Ok(Some(fk)) if to_principal.is_none() && to_dependent.is_none() => Ok(Some(fk)),
                Ok(Some(fk)) => {
                    self.set_navigations(fk, to_principal_change, to_dependent_change, source)
                }
                other => other,
            };
            if !matches!(outcome, Ok(Some(_))) {
                self.restore(checkpoint)?;
            }

            return outcome;
        }

        // Phase 2: create, then configure; undo the creation on rejection.
        // Creation events stay queued so they reach the observer together
        // with the navigations.
        let checkpoint = self.checkpoint();
        let fk = match self.create_foreign_key(dependent, principal, None, to_principal, source) {
            Ok(Some(fk)) => fk,
            other => {
                self.restore(checkpoint)?;
                return other;
            }
        };
        let outcome = if to_principal.is_none() && to_dependent.is_none() {
            Ok(Some(fk))
        } else {
            self.set_navigations(fk, to_principal_change, to_dependent_change, source)
        };

        match outcome {
            Ok(Some(configured)) => {
                self.flush()?;
                Ok(Some(configured))
            }
            rejected => {
                trace!(fk = %fk, "new relationship rejected; rolling back");
                self.restore(checkpoint)?;
                rejected
            }
        }
    }

    /// Pure twin of `has_relationship`.
    pub fn can_have_relationship(
        &self,
        dependent: EntityTypeId,
        principal: EntityTypeId,
        to_principal: Option<&str>,
        to_dependent: Option<&str>,
        source: ConfigurationSource,
    ) -> Result<bool, ModelError> {
        self.entity_type(dependent)?;
        self.entity_type(principal)?;

        if let Some((fk, inverted)) =
            self.find_matching_relationship(dependent, principal, to_principal, to_dependent)
        {
            if inverted && !self.can_set_related_types(fk, principal, dependent, source)? {
                return Ok(false);
            }
            return self.can_set_navigations(
                fk,
                &NavigationChange::from_name(to_principal),
                &NavigationChange::from_name(to_dependent),
                source,
            );
        }
        if !self.can_provide_primary_key(principal) {
            return Ok(false);
        }

        let mut probe = self.probe();
        Ok(probe
            .has_relationship(dependent, principal, to_principal, to_dependent, source)?
            .is_some())
    }

    /// Find or create the relationship from `dependent` to `principal` over
    /// the given foreign key properties.
    pub fn has_foreign_key(
        &mut self,
        dependent: EntityTypeId,
        principal: EntityTypeId,
        properties: &[PropertyId],
        source: ConfigurationSource,
    ) -> Result<Option<ForeignKeyId>, ModelError> {
        self.entity_type(principal)?;
        self.validate_property_list("a foreign key", dependent, properties)?;

        let existing = self
            .foreign_keys()
            .find(|(_, fk)| {
                fk.dependent == dependent
                    && self.in_same_hierarchy(fk.principal, principal)
                    && fk.properties.as_slice() == properties
            })
            .map(|(id, _)| id);
        if let Some(fk) = existing {
            let data = self.foreign_key_mut(fk)?;
            data.properties_source = Some(source.max(data.properties_source));
            data.upgrade_source(source);
            return Ok(Some(fk));
        }

        if !self.can_provide_primary_key(principal) {
            return self.keyless_principal(dependent, principal, source);
        }
        let kinds = self.property_kinds(properties);
        let key = if self.find_primary_key(principal).is_none()
            && kinds == self.primary_key_kinds(principal)
        {
            None
        } else {
            match self.compatible_principal_key(principal, properties) {
                Some(key) => Some(key),
                None => {
                    trace!(dependent = %dependent, principal = %principal, "no principal key matches the foreign key properties");
                    if source.is_explicit() {
                        let key_properties = self
                            .find_primary_key(principal)
                            .and_then(|key| self.key(key).ok())
                            .map(|key| key.properties.clone())
                            .unwrap_or_default();
                        return Err(ModelError::IncompatibleForeignKey {
                            dependent: self.entity_name(dependent),
                            properties: self.property_list_label(properties),
                            principal: self.entity_name(principal),
                            key: self.property_list_label(&key_properties),
                        });
                    }
                    return Ok(None);
                }
            }
        };

        self.run_batch(|model| {
            let Some(fk) =
                model.create_foreign_key(dependent, principal, Some(properties.to_vec()), None, source)?
            else {
                return Ok(None);
            };
            if let Some(key) = key
                && model.foreign_key(fk)?.principal_key != key
            {
                let previous = model.foreign_key(fk)?.principal_key;
                let data = model.foreign_key_mut(fk)?;
                data.principal_key = key;
                model.remove_unused_convention_keys(&[previous])?;
            }

            Ok(Some(fk))
        })
    }

    // Existing relationship between the two hierarchies that already uses a
    // requested navigation, or has none when none are requested.
    fn find_matching_relationship(
        &self,
        dependent: EntityTypeId,
        principal: EntityTypeId,
        to_principal: Option<&str>,
        to_dependent: Option<&str>,
    ) -> Option<(ForeignKeyId, bool)> {
        let names_match = |fk: &ForeignKeyData, inverted: bool| {
            let (principal_end, dependent_end) = if inverted {
                (NavigationEnd::ToDependent, NavigationEnd::ToPrincipal)
            } else {
                (NavigationEnd::ToPrincipal, NavigationEnd::ToDependent)
            };
            if to_principal.is_none() && to_dependent.is_none() {
                return fk.to_principal.is_none()
                    && fk.to_dependent.is_none()
                    && fk.properties_source.is_none();
            }

            to_principal.is_some_and(|name| fk.navigation_name(principal_end) == Some(name))
                || to_dependent.is_some_and(|name| fk.navigation_name(dependent_end) == Some(name))
        };

        let straight = self.foreign_keys().find(|(_, fk)| {
            self.in_same_hierarchy(fk.dependent, dependent)
                && self.in_same_hierarchy(fk.principal, principal)
                && names_match(fk, false)
        });
        if let Some((fk, _)) = straight {
            return Some((fk, false));
        }

        self.foreign_keys()
            .find(|(_, fk)| {
                !fk.is_self_referencing()
                    && self.in_same_hierarchy(fk.dependent, principal)
                    && self.in_same_hierarchy(fk.principal, dependent)
                    && names_match(fk, true)
            })
            .map(|(fk, _)| (fk, true))
    }

    fn keyless_principal(
        &self,
        dependent: EntityTypeId,
        principal: EntityTypeId,
        source: ConfigurationSource,
    ) -> Result<Option<ForeignKeyId>, ModelError> {
        trace!(principal = %principal, "principal type is keyless");
        if source.is_explicit() {
            return Err(ModelError::InvalidRelatedTypes {
                entity: self.entity_name(dependent),
                other: self.entity_name(principal),
                reason: "the principal type is keyless".to_string(),
            });
        }

        Ok(None)
    }

    /// Allocate a relationship. Missing properties become shadow properties
    /// named after `navigation` (or the principal type).
    pub(crate) fn create_foreign_key(
        &mut self,
        dependent: EntityTypeId,
        principal: EntityTypeId,
        properties: Option<Vec<PropertyId>>,
        navigation: Option<&str>,
        source: ConfigurationSource,
    ) -> Result<Option<ForeignKeyId>, ModelError> {
        let Some(key) = self.get_or_create_primary_key(principal)? else {
            return self.keyless_principal(dependent, principal, source);
        };

        let (properties, properties_source) = match properties {
            Some(properties) => (properties, Some(source)),
            None => (
                self.create_implicit_properties(dependent, principal, key, navigation, true)?,
                None,
            ),
        };
        let required = properties.iter().all(|property| {
            self.property(*property)
                .is_ok_and(|data| !data.is_nullable())
        });

        let id = ForeignKeyId(self.graph.foreign_keys.insert(ForeignKeyData {
            dependent,
            principal,
            properties,
            properties_source,
            principal_key: key,
            principal_key_source: None,
            to_principal: None,
            to_principal_source: None,
            to_dependent: None,
            to_dependent_source: None,
            unique: Aspect::new(false),
            required: Aspect::new(required),
            ownership: Aspect::new(false),
            delete_behavior: Aspect::new(DeleteBehavior::default()),
            principal_end_source: None,
            source,
        }));
        debug!(fk = %id, dependent = %dependent, principal = %principal, ?source, "relationship added");
        self.notify(ModelEvent::ForeignKeyAdded { fk: id });

        Ok(Some(id))
    }

    /// Remove a relationship configured with no more authority than `source`.
    pub fn remove_foreign_key(
        &mut self,
        fk: ForeignKeyId,
        source: ConfigurationSource,
    ) -> Result<bool, ModelError> {
        if !self.can_remove_foreign_key(fk, source)? {
            trace!(fk = %fk, ?source, "relationship removal rejected");
            return Ok(false);
        }

        self.run_batch(|model| {
            model.remove_foreign_key_unchecked(fk)?;
            Ok(true)
        })
    }

    pub fn can_remove_foreign_key(
        &self,
        fk: ForeignKeyId,
        source: ConfigurationSource,
    ) -> Result<bool, ModelError> {
        Ok(source.overrides(Some(self.foreign_key(fk)?.source)))
    }

    pub(crate) fn remove_foreign_key_unchecked(
        &mut self,
        fk: ForeignKeyId,
    ) -> Result<(), ModelError> {
        let data = self
            .graph
            .foreign_keys
            .remove(fk.0)
            .ok_or_else(|| ModelError::detached("foreign key", fk))?;

        for (end, nav) in [
            (NavigationEnd::ToPrincipal, &data.to_principal),
            (NavigationEnd::ToDependent, &data.to_dependent),
        ] {
            if let Some(nav) = nav {
                self.notify(ModelEvent::NavigationRemoved {
                    fk,
                    end,
                    name: nav.name.clone(),
                });
            }
        }
        if data.is_ownership() {
            self.refresh_owned(data.dependent)?;
        }
        debug!(fk = %fk, dependent = %data.dependent, principal = %data.principal, "relationship removed");
        self.notify(ModelEvent::ForeignKeyRemoved {
            fk,
            dependent: data.dependent,
            principal: data.principal,
        });

        self.remove_unused_shadow_properties(&data.properties)?;
        self.remove_unused_convention_keys(&[data.principal_key])?;

        Ok(())
    }

    /// Another live relationship with exactly the same shape as `fk`.
    pub(crate) fn find_duplicate(&self, fk: ForeignKeyId) -> Option<ForeignKeyId> {
        let data = self.foreign_key(fk).ok()?;

        self.foreign_keys()
            .find(|(id, other)| {
                *id != fk
                    && other.dependent == data.dependent
                    && other.principal == data.principal
                    && other.principal_key == data.principal_key
                    && other.properties == data.properties
            })
            .map(|(id, _)| id)
    }

    /// Fold `from` into `into` and remove `from`. Aspects only move where
    /// `into` would accept them from their recorded source.
    pub(crate) fn merge_into(
        &mut self,
        from: ForeignKeyId,
        into: ForeignKeyId,
        source: ConfigurationSource,
    ) -> Result<(), ModelError> {
        let merged = self.foreign_key(from)?.clone();
        self.remove_foreign_key_unchecked(from)?;
        self.record_replacement(from, into);

        // Phase 1: navigations missing on `into`.
        for end in [NavigationEnd::ToPrincipal, NavigationEnd::ToDependent] {
            let Some(nav) = merged.navigation(end) else {
                continue;
            };
            let nav_source = merged.navigation_source(end).unwrap_or(source);
            let target = self.foreign_key(into)?;
            match target.navigation(end) {
                None => {
                    let owner = target.navigation_owner(end);
                    if self.navigation_name_free(owner, &nav.name, into) {
                        self.assign_navigation(into, end, nav.clone(), nav_source)?;
                    }
                }
                Some(existing) if existing.name == nav.name => {
                    let data = self.foreign_key_mut(into)?;
                    let slot = data.navigation_source_slot(end);
                    *slot = Some(nav_source.max(*slot));
                }
                Some(_) => {
                    trace!(from = %from, into = %into, navigation = nav.name, "merged navigation dropped");
                }
            }
        }

        // Phase 2: scalar aspects carry their recorded sources across.
        let data = self.foreign_key_mut(into)?;
        let mut events = Vec::new();
        if let Some(recorded) = merged.unique.source()
            && matches!(
                data.unique.try_set(merged.is_unique(), recorded),
                SetOutcome::Changed { .. }
            )
        {
            events.push(ModelEvent::ForeignKeyUniquenessChanged { fk: into });
        }
        if let Some(recorded) = merged.required.source()
            && matches!(
                data.required.try_set(merged.is_required(), recorded),
                SetOutcome::Changed { .. }
            )
        {
            events.push(ModelEvent::ForeignKeyRequirednessChanged { fk: into });
        }
        if let Some(recorded) = merged.delete_behavior.source()
            && matches!(
                data.delete_behavior.try_set(merged.delete_behavior(), recorded),
                SetOutcome::Changed { .. }
            )
        {
            events.push(ModelEvent::ForeignKeyDeleteBehaviorChanged { fk: into });
        }
        let mut owned = false;
        if let Some(recorded) = merged.ownership.source()
            && matches!(
                data.ownership.try_set(merged.is_ownership(), recorded),
                SetOutcome::Changed { .. }
            )
        {
            owned = true;
            events.push(ModelEvent::ForeignKeyOwnershipChanged { fk: into });
        }
        data.properties_source = max_source(data.properties_source, merged.properties_source);
        data.principal_key_source =
            max_source(data.principal_key_source, merged.principal_key_source);
        data.principal_end_source =
            max_source(data.principal_end_source, merged.principal_end_source);
        data.upgrade_source(merged.source.max(Some(source)));
        let dependent = data.dependent;

        if owned {
            self.refresh_owned(dependent)?;
        }
        for event in events {
            self.notify(event);
        }
        debug!(from = %from, into = %into, "relationships merged");

        Ok(())
    }

    /// Recompute the owned flag of `entity` from its ownership relationships.
    pub(crate) fn refresh_owned(&mut self, entity: EntityTypeId) -> Result<(), ModelError> {
        let owned = self
            .foreign_keys()
            .any(|(_, fk)| fk.dependent == entity && fk.is_ownership());
        if let Ok(data) = self.entity_type_mut(entity) {
            data.is_owned = owned;
        }

        Ok(())
    }
}
