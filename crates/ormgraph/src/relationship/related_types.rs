use crate::{
    batch::ModelEvent,
    error::ModelError,
    model::{EntityTypeId, ForeignKeyId, KeyId, MemberRef, Model, PropertyId},
    relationship::{NavigationEnd, SetOutcome, can_reset_navigation},
    source::ConfigurationSource,
    types::{MemberInfo, ValueKind},
};
use tracing::{debug, trace};

///
/// MemberLookup
/// Result of resolving a navigation name against an entity's host type.
///

#[derive(Clone, Debug)]
pub(crate) enum MemberLookup {
    /// The entity type has no host type; any name is accepted.
    Unmapped,
    Found(MemberInfo),
    Missing,
}

///
/// OrientationPlan
///
/// Everything that has to change for a relationship to connect
/// `principal` and `dependent`. Navigation slots are named in the
/// relationship's current orientation.
///

#[derive(Clone, Debug)]
pub(crate) struct OrientationPlan {
    pub(crate) principal: EntityTypeId,
    pub(crate) dependent: EntityTypeId,
    pub(crate) inverted: bool,
    pub(crate) reset_navigations: Vec<NavigationEnd>,
    pub(crate) reset_properties: bool,
    pub(crate) reset_principal_key: bool,
    pub(crate) unique: Option<bool>,
    pub(crate) reset_ownership: bool,
    // navigations dropped because the caller is replacing them
    replaced: usize,
}

impl OrientationPlan {
    /// Navigations lost as a side effect, not counting replaced ones.
    pub(crate) fn resets(&self) -> usize {
        self.reset_navigations.len() - self.replaced
    }
}

impl Model {
    /// Make `principal` and `dependent` the two ends of `fk`, inverting the
    /// relationship if needed.
    ///
    /// Returns the relationship id, or `None` when `source` cannot override
    /// what the change would have to discard.
    pub fn set_related_types(
        &mut self,
        fk: ForeignKeyId,
        principal: EntityTypeId,
        dependent: EntityTypeId,
        source: ConfigurationSource,
    ) -> Result<Option<ForeignKeyId>, ModelError> {
        let Some(plan) = self.plan_related_types(fk, principal, dependent, source)? else {
            return Ok(None);
        };

        self.run_batch(|model| {
            model.apply_orientation(fk, &plan, source)?;
            Ok(Some(fk))
        })
    }

    /// Pure twin of `set_related_types`.
    pub fn can_set_related_types(
        &self,
        fk: ForeignKeyId,
        principal: EntityTypeId,
        dependent: EntityTypeId,
        source: ConfigurationSource,
    ) -> Result<bool, ModelError> {
        Ok(self
            .plan_related_types(fk, principal, dependent, source)?
            .is_some())
    }

    /// Swap principal and dependent.
    pub fn invert_relationship(
        &mut self,
        fk: ForeignKeyId,
        source: ConfigurationSource,
    ) -> Result<Option<ForeignKeyId>, ModelError> {
        let data = self.foreign_key(fk)?;
        let (principal, dependent) = (data.dependent, data.principal);

        self.set_related_types(fk, principal, dependent, source)
    }

    pub fn can_invert_relationship(
        &self,
        fk: ForeignKeyId,
        source: ConfigurationSource,
    ) -> Result<bool, ModelError> {
        let data = self.foreign_key(fk)?;

        self.can_set_related_types(fk, data.dependent, data.principal, source)
    }

    fn plan_related_types(
        &self,
        fk: ForeignKeyId,
        principal: EntityTypeId,
        dependent: EntityTypeId,
        source: ConfigurationSource,
    ) -> Result<Option<OrientationPlan>, ModelError> {
        let data = self.foreign_key(fk)?;
        self.entity_type(principal)?;
        self.entity_type(dependent)?;

        if data.is_self_referencing() && principal == dependent && principal == data.principal {
            return Ok(Some(OrientationPlan::unchanged(principal, dependent)));
        }

        // Phase 1: try the current orientation, then the inverted one, and
        // keep whichever loses fewer navigations.
        let straight = self.plan_orientation(fk, principal, dependent, false, source, &[])?;
        if straight.as_ref().is_some_and(|plan| plan.resets() == 0) {
            return Ok(straight);
        }
        let inverted = self.plan_orientation(fk, principal, dependent, true, source, &[])?;

        let chosen = match (straight, inverted) {
            (Some(straight), Some(inverted)) if inverted.resets() < straight.resets() => {
                Some(inverted)
            }
            (Some(straight), _) => Some(straight),
            (None, inverted) => inverted,
        };
        if chosen.is_none() {
            trace!(fk = %fk, principal = %principal, dependent = %dependent, ?source, "related types rejected");
            if source.is_explicit() {
                return Err(ModelError::InvalidRelatedTypes {
                    entity: self.entity_name(dependent),
                    other: self.entity_name(principal),
                    reason: "no orientation keeps the configured navigations and keys valid"
                        .to_string(),
                });
            }
        }

        Ok(chosen)
    }

    /// Plan one orientation. `replaced` lists current slots the caller is
    /// about to overwrite; they are dropped without an override check.
    pub(crate) fn plan_orientation(
        &self,
        fk: ForeignKeyId,
        principal: EntityTypeId,
        dependent: EntityTypeId,
        inverted: bool,
        source: ConfigurationSource,
        replaced: &[NavigationEnd],
    ) -> Result<Option<OrientationPlan>, ModelError> {
        let data = self.foreign_key(fk)?;
        let (old_principal, old_dependent) = if inverted {
            (data.dependent, data.principal)
        } else {
            (data.principal, data.dependent)
        };
        if !self.in_same_hierarchy(principal, old_principal)
            || !self.in_same_hierarchy(dependent, old_dependent)
        {
            return Ok(None);
        }
        if inverted
            && (data.is_self_referencing() || !source.overrides(data.principal_end_source))
        {
            return Ok(None);
        }
        if !self.can_provide_primary_key(principal) {
            return Ok(None);
        }

        let mut plan = OrientationPlan {
            principal,
            dependent,
            inverted,
            reset_navigations: Vec::new(),
            reset_properties: false,
            reset_principal_key: false,
            unique: None,
            reset_ownership: false,
            replaced: 0,
        };

        // Phase 2: navigations must still fit their (possibly new) slot.
        for end in [NavigationEnd::ToPrincipal, NavigationEnd::ToDependent] {
            let Some(nav) = data.navigation(end) else {
                continue;
            };
            if replaced.contains(&end) {
                plan.reset_navigations.push(end);
                plan.replaced += 1;
                continue;
            }

            let new_end = if inverted { end.opposite() } else { end };
            let owner = if new_end == NavigationEnd::ToPrincipal {
                dependent
            } else {
                principal
            };
            let fits = self.navigation_fits(nav.member.as_ref(), new_end, dependent, principal)
                && self.navigation_name_free(owner, &nav.name, fk);
            if fits {
                continue;
            }
            if !can_reset_navigation(source, data.navigation_source(end)) {
                trace!(fk = %fk, navigation = nav.name, "orientation rejected: navigation cannot be reset");
                return Ok(None);
            }
            plan.reset_navigations.push(end);
        }

        // Phase 3: uniqueness follows the surviving navigation to the dependent.
        let to_dependent_slot = if inverted {
            NavigationEnd::ToPrincipal
        } else {
            NavigationEnd::ToDependent
        };
        if !plan.reset_navigations.contains(&to_dependent_slot)
            && let Some(member) = data
                .navigation(to_dependent_slot)
                .and_then(|nav| nav.member.as_ref())
        {
            let unique = !member.is_collection();
            if unique != data.is_unique() {
                if !data.unique.can_set(&unique, source) {
                    return Ok(None);
                }
                plan.unique = Some(unique);
            }
        }

        // Phase 4: keys. The principal key must live on the new principal's
        // root and the properties on the new dependent.
        let key_on_root = self
            .key(data.principal_key)
            .is_ok_and(|key| key.declaring == self.root_of(principal));
        if !key_on_root {
            if !source.overrides(data.principal_key_source) {
                return Ok(None);
            }
            plan.reset_principal_key = true;
        }
        let visible = self.base_chain(dependent);
        let properties_fit = !inverted
            && data.properties.iter().all(|property| {
                self.property(*property)
                    .is_ok_and(|p| visible.contains(&p.declaring))
            })
            && (!plan.reset_principal_key
                || self.property_kinds(&data.properties) == self.primary_key_kinds(principal));
        if !properties_fit {
            if !source.overrides(data.properties_source) {
                return Ok(None);
            }
            plan.reset_properties = true;
        }

        // Phase 5: an inverted ownership would own the former principal.
        if inverted && data.is_ownership() {
            if !data.ownership.can_set(&false, source) {
                return Ok(None);
            }
            plan.reset_ownership = true;
        }

        Ok(Some(plan))
    }

    pub(crate) fn apply_orientation(
        &mut self,
        fk: ForeignKeyId,
        plan: &OrientationPlan,
        source: ConfigurationSource,
    ) -> Result<(), ModelError> {
        let previous = self.foreign_key(fk)?.clone();

        for end in &plan.reset_navigations {
            self.clear_navigation(fk, *end)?;
        }

        let types_changed =
            previous.principal != plan.principal || previous.dependent != plan.dependent;
        let data = self.foreign_key_mut(fk)?;
        if plan.inverted {
            std::mem::swap(&mut data.to_principal, &mut data.to_dependent);
            std::mem::swap(&mut data.to_principal_source, &mut data.to_dependent_source);
            data.principal_end_source = Some(source);
        } else if !data.is_self_referencing() || types_changed {
            data.principal_end_source = Some(source.max(data.principal_end_source));
        }
        data.principal = plan.principal;
        data.dependent = plan.dependent;
        data.upgrade_source(source);

        if let Some(unique) = plan.unique
            && matches!(
                data.unique.try_set(unique, source),
                SetOutcome::Changed { .. }
            )
        {
            self.notify(ModelEvent::ForeignKeyUniquenessChanged { fk });
        }
        if plan.reset_ownership {
            self.foreign_key_mut(fk)?.ownership.try_set(false, source);
            self.refresh_owned(previous.dependent)?;
            self.notify(ModelEvent::ForeignKeyOwnershipChanged { fk });
        }

        if plan.reset_principal_key {
            let key = self.get_or_create_primary_key(plan.principal)?.ok_or_else(|| {
                ModelError::InvalidRelatedTypes {
                    entity: self.entity_name(plan.dependent),
                    other: self.entity_name(plan.principal),
                    reason: "the principal type is keyless".to_string(),
                }
            })?;
            let data = self.foreign_key_mut(fk)?;
            data.principal_key = key;
            data.principal_key_source = None;
        }
        if plan.reset_properties {
            self.reset_implicit_properties(fk)?;
        }
        if plan.reset_principal_key || plan.reset_properties {
            self.notify(ModelEvent::ForeignKeyPropertiesChanged {
                fk,
                previous_properties: previous.properties.clone(),
                previous_principal_key: previous.principal_key,
            });
        }
        if types_changed {
            debug!(fk = %fk, principal = %plan.principal, dependent = %plan.dependent, inverted = plan.inverted, ?source, "relationship reoriented");
            self.notify(ModelEvent::ForeignKeyPrincipalEndChanged {
                fk,
                previous_principal: previous.principal,
                previous_dependent: previous.dependent,
            });
        }

        self.remove_unused_shadow_properties(&previous.properties)?;
        self.remove_unused_convention_keys(&[previous.principal_key])?;

        Ok(())
    }

    // ------------------------------------------------------------------
    // Shape helpers
    // ------------------------------------------------------------------

    pub(crate) fn lookup_navigation_member(&self, owner: EntityTypeId, name: &str) -> MemberLookup {
        let Some(host) = self.entity_type(owner).ok().and_then(|data| data.host_type) else {
            return MemberLookup::Unmapped;
        };

        match self.oracle.find_member(host, name) {
            Some(member) if member.navigation_target().is_some() => {
                MemberLookup::Found(member.clone())
            }
            _ => MemberLookup::Missing,
        }
    }

    /// Whether a navigation backed by `member` can occupy slot `end` of a
    /// relationship from `dependent` to `principal`.
    pub(crate) fn navigation_fits(
        &self,
        member: Option<&MemberInfo>,
        end: NavigationEnd,
        dependent: EntityTypeId,
        principal: EntityTypeId,
    ) -> bool {
        let (owner, target) = match end {
            NavigationEnd::ToPrincipal => (dependent, principal),
            NavigationEnd::ToDependent => (principal, dependent),
        };
        let owner_host = self.entity_type(owner).ok().and_then(|data| data.host_type);
        let target_host = self.entity_type(target).ok().and_then(|data| data.host_type);

        let Some(member) = member else {
            return owner_host.is_none();
        };
        if end == NavigationEnd::ToPrincipal && member.is_collection() {
            return false;
        }
        let (Some(owner_host), Some(target_host)) = (owner_host, target_host) else {
            return false;
        };

        self.oracle.is_assignable_from(member.declaring, owner_host)
            && self.oracle.can_navigate_to(member, target_host)
    }

    /// True when only `fk`'s own navigations use `name` around `owner`.
    pub(crate) fn navigation_name_free(
        &self,
        owner: EntityTypeId,
        name: &str,
        fk: ForeignKeyId,
    ) -> bool {
        self.members_in_hierarchy(owner, name)
            .iter()
            .all(|(_, member)| matches!(member, MemberRef::Navigation(nav) if nav.fk == fk))
    }

    pub(crate) fn property_kinds(&self, properties: &[PropertyId]) -> Vec<ValueKind> {
        properties
            .iter()
            .filter_map(|property| self.property(*property).ok())
            .map(|property| property.kind)
            .collect()
    }

    /// Value kinds of the principal key `entity` would get.
    pub(crate) fn primary_key_kinds(&self, entity: EntityTypeId) -> Vec<ValueKind> {
        match self.find_primary_key(entity) {
            Some(key) => self.key_kinds(key),
            None => vec![ValueKind::Int32],
        }
    }

    pub(crate) fn key_kinds(&self, key: KeyId) -> Vec<ValueKind> {
        self.key(key)
            .map(|data| self.property_kinds(&data.properties))
            .unwrap_or_default()
    }

    pub(crate) fn properties_compatible(&self, properties: &[PropertyId], key: KeyId) -> bool {
        self.property_kinds(properties) == self.key_kinds(key)
    }
}

impl OrientationPlan {
    const fn unchanged(principal: EntityTypeId, dependent: EntityTypeId) -> Self {
        Self {
            principal,
            dependent,
            inverted: false,
            reset_navigations: Vec::new(),
            reset_properties: false,
            reset_principal_key: false,
            unique: None,
            reset_ownership: false,
            replaced: 0,
        }
    }
}
