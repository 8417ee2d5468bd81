use crate::{
    batch::ModelEvent,
    error::ModelError,
    model::{ForeignKeyId, Model, PropertyId},
    relationship::{
        DeleteBehavior, NavigationEnd, SetOutcome, can_reset_navigation, displaces,
    },
    source::ConfigurationSource,
};
use tracing::{debug, trace};

///
/// UniquePlan
///

struct UniquePlan {
    reset_to_dependent: bool,
}

///
/// RequiredPlan
/// Properties whose nullability flips along with the relationship.
///

struct RequiredPlan {
    nullability: Vec<PropertyId>,
}

///
/// OwnershipPlan
///

struct OwnershipPlan {
    competing: Vec<ForeignKeyId>,
}

impl Model {
    // ------------------------------------------------------------------
    // Uniqueness
    // ------------------------------------------------------------------

    /// Mark the relationship one-to-one (`true`) or one-to-many (`false`).
    ///
    /// A navigation to the dependent whose shape disagrees is dropped when
    /// `source` may reset it.
    pub fn set_unique(
        &mut self,
        fk: ForeignKeyId,
        unique: bool,
        source: ConfigurationSource,
    ) -> Result<Option<ForeignKeyId>, ModelError> {
        let Some(plan) = self.plan_unique(fk, unique, source)? else {
            return Ok(None);
        };

        self.run_batch(|model| {
            if plan.reset_to_dependent {
                model.clear_navigation(fk, NavigationEnd::ToDependent)?;
            }
            let data = model.foreign_key_mut(fk)?;
            let outcome = data.unique.try_set(unique, source);
            data.upgrade_source(source);
            if matches!(outcome, SetOutcome::Changed { .. }) {
                debug!(fk = %fk, unique, ?source, "relationship uniqueness changed");
                model.notify(ModelEvent::ForeignKeyUniquenessChanged { fk });
            }

            Ok(Some(fk))
        })
    }

    pub fn can_set_unique(
        &self,
        fk: ForeignKeyId,
        unique: bool,
        source: ConfigurationSource,
    ) -> Result<bool, ModelError> {
        Ok(self.plan_unique(fk, unique, source)?.is_some())
    }

    fn plan_unique(
        &self,
        fk: ForeignKeyId,
        unique: bool,
        source: ConfigurationSource,
    ) -> Result<Option<UniquePlan>, ModelError> {
        let data = self.foreign_key(fk)?;
        if !data.unique.can_set(&unique, source) {
            trace!(fk = %fk, unique, ?source, "uniqueness rejected by precedence");
            return Ok(None);
        }

        let Some(nav) = data.to_dependent() else {
            return Ok(Some(UniquePlan {
                reset_to_dependent: false,
            }));
        };
        let consistent = nav
            .member()
            .is_none_or(|member| member.is_collection() != unique);
        if consistent {
            return Ok(Some(UniquePlan {
                reset_to_dependent: false,
            }));
        }

        if can_reset_navigation(source, data.navigation_source(NavigationEnd::ToDependent)) {
            return Ok(Some(UniquePlan {
                reset_to_dependent: true,
            }));
        }
        trace!(fk = %fk, navigation = nav.name(), "uniqueness conflicts with navigation shape");
        if source.is_explicit() {
            return Err(ModelError::IncompatibleNavigations {
                navigations: format!("'{}'", nav.name()),
                dependent: self.entity_name(data.dependent),
                principal: self.entity_name(data.principal),
            });
        }

        Ok(None)
    }

    // ------------------------------------------------------------------
    // Required-ness
    // ------------------------------------------------------------------

    /// Mark the relationship required or optional. Required relationships
    /// force their foreign key properties non-nullable; optional ones make
    /// every overridable non-key property nullable.
    pub fn set_required(
        &mut self,
        fk: ForeignKeyId,
        required: bool,
        source: ConfigurationSource,
    ) -> Result<Option<ForeignKeyId>, ModelError> {
        let Some(plan) = self.plan_required(fk, required, source)? else {
            return Ok(None);
        };

        self.run_batch(|model| {
            for property in &plan.nullability {
                model.apply_property_nullable(*property, !required, source)?;
            }
            let data = model.foreign_key_mut(fk)?;
            let outcome = data.required.try_set(required, source);
            data.upgrade_source(source);
            if matches!(outcome, SetOutcome::Changed { .. }) {
                debug!(fk = %fk, required, ?source, "relationship requiredness changed");
                model.notify(ModelEvent::ForeignKeyRequirednessChanged { fk });
            }

            Ok(Some(fk))
        })
    }

    pub fn can_set_required(
        &self,
        fk: ForeignKeyId,
        required: bool,
        source: ConfigurationSource,
    ) -> Result<bool, ModelError> {
        Ok(self.plan_required(fk, required, source)?.is_some())
    }

    fn plan_required(
        &self,
        fk: ForeignKeyId,
        required: bool,
        source: ConfigurationSource,
    ) -> Result<Option<RequiredPlan>, ModelError> {
        let data = self.foreign_key(fk)?;
        if !data.required.can_set(&required, source) {
            trace!(fk = %fk, required, ?source, "requiredness rejected by precedence");
            return Ok(None);
        }

        let mut nullability = Vec::new();
        for property in &data.properties {
            let property_data = self.property(*property)?;
            if property_data.is_nullable() != required {
                continue;
            }
            if required {
                if !property_data.nullable.can_set(&false, source) {
                    trace!(fk = %fk, property = %property, "requiredness rejected by property nullability");
                    return Ok(None);
                }
                nullability.push(*property);
            } else if !self.property_in_key(*property)
                && property_data.nullable.can_set(&true, source)
            {
                nullability.push(*property);
            }
        }

        Ok(Some(RequiredPlan { nullability }))
    }

    // ------------------------------------------------------------------
    // Ownership
    // ------------------------------------------------------------------

    /// Mark the dependent type as owned by the principal through `fk`.
    ///
    /// A type has at most one ownership relationship; a competing one is
    /// removed when `source` displaces it.
    pub fn set_ownership(
        &mut self,
        fk: ForeignKeyId,
        ownership: bool,
        source: ConfigurationSource,
    ) -> Result<Option<ForeignKeyId>, ModelError> {
        let Some(plan) = self.plan_ownership(fk, ownership, source)? else {
            return Ok(None);
        };

        self.run_batch(|model| {
            for other in &plan.competing {
                debug!(fk = %other, by = %fk, "competing ownership removed");
                model.remove_foreign_key_unchecked(*other)?;
            }
            let data = model.foreign_key_mut(fk)?;
            let outcome = data.ownership.try_set(ownership, source);
            data.upgrade_source(source);
            let dependent = data.dependent;
            if matches!(outcome, SetOutcome::Changed { .. }) {
                debug!(fk = %fk, ownership, ?source, "relationship ownership changed");
                model.notify(ModelEvent::ForeignKeyOwnershipChanged { fk });
            }
            model.refresh_owned(dependent)?;

            Ok(Some(fk))
        })
    }

    pub fn can_set_ownership(
        &self,
        fk: ForeignKeyId,
        ownership: bool,
        source: ConfigurationSource,
    ) -> Result<bool, ModelError> {
        Ok(self.plan_ownership(fk, ownership, source)?.is_some())
    }

    fn plan_ownership(
        &self,
        fk: ForeignKeyId,
        ownership: bool,
        source: ConfigurationSource,
    ) -> Result<Option<OwnershipPlan>, ModelError> {
        let data = self.foreign_key(fk)?;
        if !data.ownership.can_set(&ownership, source) {
            trace!(fk = %fk, ownership, ?source, "ownership rejected by precedence");
            return Ok(None);
        }
        if !ownership || data.is_ownership() {
            return Ok(Some(OwnershipPlan {
                competing: Vec::new(),
            }));
        }

        let dependent = data.dependent;
        let entity = self.entity_type(dependent)?;
        if entity.base_type().is_some() || !self.direct_derived_types(dependent).is_empty() {
            return Err(ModelError::OwnedTypeInHierarchy {
                entity: entity.name().to_string(),
            });
        }

        let mut competing = Vec::new();
        for (other, other_data) in self.foreign_keys() {
            if other == fk || other_data.dependent != dependent || !other_data.is_ownership() {
                continue;
            }
            if !displaces(source, other_data.ownership.source()) {
                trace!(fk = %fk, competing = %other, "ownership rejected by competing ownership");
                return Ok(None);
            }
            competing.push(other);
        }

        Ok(Some(OwnershipPlan { competing }))
    }

    // ------------------------------------------------------------------
    // Delete behavior
    // ------------------------------------------------------------------

    pub fn set_delete_behavior(
        &mut self,
        fk: ForeignKeyId,
        behavior: DeleteBehavior,
        source: ConfigurationSource,
    ) -> Result<Option<ForeignKeyId>, ModelError> {
        if !self.can_set_delete_behavior(fk, behavior, source)? {
            trace!(fk = %fk, %behavior, ?source, "delete behavior rejected by precedence");
            return Ok(None);
        }

        let data = self.foreign_key_mut(fk)?;
        let outcome = data.delete_behavior.try_set(behavior, source);
        data.upgrade_source(source);
        if matches!(outcome, SetOutcome::Changed { .. }) {
            debug!(fk = %fk, %behavior, ?source, "delete behavior changed");
            self.run_batch(|model| {
                model.notify(ModelEvent::ForeignKeyDeleteBehaviorChanged { fk });
                Ok(())
            })?;
        }

        Ok(Some(fk))
    }

    pub fn can_set_delete_behavior(
        &self,
        fk: ForeignKeyId,
        behavior: DeleteBehavior,
        source: ConfigurationSource,
    ) -> Result<bool, ModelError> {
        Ok(self
            .foreign_key(fk)?
            .delete_behavior
            .can_set(&behavior, source))
    }
}
