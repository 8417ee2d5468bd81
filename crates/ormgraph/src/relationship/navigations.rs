use crate::{
    batch::ModelEvent,
    config::PostCheckPolicy,
    error::ModelError,
    model::{EntityTypeId, ForeignKeyId, MemberRef, Model, PropertyId},
    relationship::{
        NavigationData, NavigationEnd, NavigationRef, SetOutcome, displaces,
        related_types::{MemberLookup, OrientationPlan},
    },
    source::ConfigurationSource,
    types::MemberInfo,
};
use tracing::{debug, trace, warn};

///
/// NavigationChange
/// Requested change for one navigation slot.
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub enum NavigationChange {
    /// Leave the slot as it is.
    #[default]
    Keep,
    Remove,
    Set(String),
}

impl NavigationChange {
    pub fn set(name: impl Into<String>) -> Self {
        Self::Set(name.into())
    }

    /// `Set` for `Some`, `Keep` for `None`.
    pub fn from_name(name: Option<&str>) -> Self {
        name.map_or(Self::Keep, Self::set)
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Set(name) => Some(name),
            Self::Keep | Self::Remove => None,
        }
    }
}

///
/// ConflictResolution
/// Side effect needed to free a contested navigation name.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) enum ConflictResolution {
    ClearNavigation(NavigationRef),
    RemoveForeignKey(ForeignKeyId),
    RemoveProperty(PropertyId),
    RemoveServiceProperty(EntityTypeId, String),
}

///
/// NavigationsPlan
///

#[derive(Clone, Debug)]
struct NavigationsPlan {
    orientation: Option<OrientationPlan>,
    conflicts: Vec<ConflictResolution>,
    /// Slots, in the final orientation, that take a new value.
    assignments: Vec<(NavigationEnd, Option<NavigationData>)>,
    /// Slots whose name is unchanged and only get their source upgraded.
    upgrades: Vec<NavigationEnd>,
    clear_opposite: Option<NavigationEnd>,
    unique: Option<bool>,
}

impl NavigationsPlan {
    fn is_upgrade_only(&self) -> bool {
        self.orientation.is_none()
            && self.conflicts.is_empty()
            && self.assignments.is_empty()
            && self.clear_opposite.is_none()
    }
}

impl Model {
    /// Set, rename or remove the navigations of `fk`.
    ///
    /// Names are looked up on both ends; when they only fit with principal
    /// and dependent swapped the relationship is inverted first. Navigations
    /// of other relationships using the requested names are cleared, or
    /// their relationship removed, when `source` is allowed to displace them.
    ///
    /// Once the observer has seen the change the navigations are checked
    /// again; with `PostCheckPolicy::Strict` a mismatch rolls everything
    /// back and the observer is told about the rollback. Inside a batch the
    /// caller opened, delivery waits for that batch, so the check only sees
    /// the model's own changes.
    ///
    /// Returns the id of the configured relationship or `None` if the
    /// proposal was rejected.
    pub fn set_navigations(
        &mut self,
        fk: ForeignKeyId,
        to_principal: NavigationChange,
        to_dependent: NavigationChange,
        source: ConfigurationSource,
    ) -> Result<Option<ForeignKeyId>, ModelError> {
        let Some(plan) = self.plan_navigations(fk, &to_principal, &to_dependent, source)? else {
            return Ok(None);
        };

        if plan.is_upgrade_only() {
            self.apply_navigation_upgrades(fk, &plan, source)?;
            trace!(fk = %fk, ?source, "navigations upgraded");
            return Ok(Some(fk));
        }

        let checkpoint = self.checkpoint();
        self.run_batch(|model| model.apply_navigations(fk, &plan, source))?;

        // Observers may have replaced or reshaped the relationship meanwhile.
        let current = self.resolve_replacement(fk);
        if self.navigations_match(current, &to_principal, &to_dependent) {
            debug!(fk = %current, ?source, "navigations set");
            return Ok(Some(current));
        }

        match self.config.post_check {
            PostCheckPolicy::Strict => {
                debug!(fk = %fk, "navigation post-check failed; restoring checkpoint");
                self.restore(checkpoint)?;
            }
            PostCheckPolicy::Tolerant => {
                warn!(fk = %fk, ?source, "navigation post-check failed; keeping conflict resolution side effects");
            }
        }

        Ok(None)
    }

    /// Pure twin of `set_navigations`.
    pub fn can_set_navigations(
        &self,
        fk: ForeignKeyId,
        to_principal: &NavigationChange,
        to_dependent: &NavigationChange,
        source: ConfigurationSource,
    ) -> Result<bool, ModelError> {
        Ok(self
            .plan_navigations(fk, to_principal, to_dependent, source)?
            .is_some())
    }

    fn plan_navigations(
        &self,
        fk: ForeignKeyId,
        to_principal: &NavigationChange,
        to_dependent: &NavigationChange,
        source: ConfigurationSource,
    ) -> Result<Option<NavigationsPlan>, ModelError> {
        let data = self.foreign_key(fk)?;
        let requests = [
            (NavigationEnd::ToPrincipal, to_principal),
            (NavigationEnd::ToDependent, to_dependent),
        ];

        // Phase 1: resolve members in both orientations.
        let mut members: Vec<(NavigationEnd, &str, Option<MemberInfo>, Option<MemberInfo>)> =
            Vec::new();
        let mut fits_straight = true;
        let mut fits_inverted = !data.is_self_referencing();
        for (end, change) in requests {
            let Some(name) = change.name() else {
                continue;
            };
            self.validate_name("navigation", name)?;

            let owner = data.navigation_owner(end);
            let other = data.navigation_owner(end.opposite());
            let straight = self.lookup_navigation_member(owner, name);
            let inverted = self.lookup_navigation_member(other, name);

            let straight_member = match &straight {
                MemberLookup::Unmapped => None,
                MemberLookup::Found(member) => Some(member.clone()),
                MemberLookup::Missing => {
                    fits_straight = false;
                    None
                }
            };
            if let Some(member) = &straight_member {
                fits_straight &=
                    self.navigation_fits(Some(member), end, data.dependent, data.principal);
            }
            let inverted_member = match &inverted {
                MemberLookup::Found(member) => Some(member.clone()),
                MemberLookup::Unmapped | MemberLookup::Missing => None,
            };
            fits_inverted &= inverted_member.as_ref().is_some_and(|member| {
                self.navigation_fits(Some(member), end, data.principal, data.dependent)
            });

            if matches!(straight, MemberLookup::Missing) && matches!(inverted, MemberLookup::Missing)
            {
                trace!(fk = %fk, navigation = name, "navigation member not found");
                if source.is_explicit() {
                    return Err(ModelError::NavigationMemberNotFound {
                        entity: self.entity_name(owner),
                        navigation: name.to_string(),
                    });
                }
                return Ok(None);
            }
            members.push((end, name, straight_member, inverted_member));
        }

        // Phase 2: orientation.
        let should_invert = !fits_straight && fits_inverted;
        if !fits_straight && !fits_inverted {
            trace!(fk = %fk, "navigations fit neither orientation");
            if source.is_explicit()
                && let Some((end, name, ..)) = members.first()
            {
                return Err(ModelError::NavigationTargetMismatch {
                    entity: self.entity_name(data.navigation_owner(*end)),
                    navigation: (*name).to_string(),
                    target: self.entity_name(data.navigation_owner(end.opposite())),
                });
            }
            return Ok(None);
        }

        let (dependent, principal) = if should_invert {
            (data.principal, data.dependent)
        } else {
            (data.dependent, data.principal)
        };
        let owner_of = |end: NavigationEnd| match end {
            NavigationEnd::ToPrincipal => dependent,
            NavigationEnd::ToDependent => principal,
        };
        // Slot in the current orientation that holds what ends up in `end`.
        let current_slot = |end: NavigationEnd| if should_invert { end.opposite() } else { end };

        if let (Some(a), Some(b)) = (to_principal.name(), to_dependent.name())
            && a == b
            && self.in_same_hierarchy(dependent, principal)
        {
            if source.is_explicit() {
                return Err(ModelError::IncompatibleNavigations {
                    navigations: format!("{{{a}, {b}}}"),
                    dependent: self.entity_name(dependent),
                    principal: self.entity_name(principal),
                });
            }
            return Ok(None);
        }

        let orientation = if should_invert {
            let replaced = requests
                .iter()
                .filter(|(_, change)| **change != NavigationChange::Keep)
                .map(|(end, _)| end.opposite())
                .collect::<Vec<_>>();
            match self.plan_orientation(fk, principal, dependent, true, source, &replaced)? {
                Some(plan) => Some(plan),
                None => {
                    trace!(fk = %fk, ?source, "navigations need an inversion that is not allowed");
                    return Ok(None);
                }
            }
        } else {
            None
        };

        // Phase 3: per-slot precedence, swaps within one hierarchy.
        let mut plan = NavigationsPlan {
            orientation,
            conflicts: Vec::new(),
            assignments: Vec::new(),
            upgrades: Vec::new(),
            clear_opposite: None,
            unique: None,
        };
        for (end, change) in requests {
            let slot = current_slot(end);
            let current = data.navigation_name(slot);
            match change {
                NavigationChange::Keep => {}
                NavigationChange::Remove if current.is_none() => {}
                NavigationChange::Set(name) if !should_invert && current == Some(name.as_str()) => {
                    plan.upgrades.push(end);
                }
                _ => {
                    if !source.overrides(data.navigation_source(slot)) {
                        trace!(fk = %fk, %end, ?source, "navigation change rejected");
                        return Ok(None);
                    }
                }
            }

            if let NavigationChange::Set(name) = change
                && !should_invert
                && data.navigation_name(end.opposite()) == Some(name.as_str())
                && self.in_same_hierarchy(dependent, principal)
            {
                if !source.overrides(data.navigation_source(end.opposite())) {
                    return Ok(None);
                }
                let opposite_request = if end == NavigationEnd::ToPrincipal {
                    to_dependent
                } else {
                    to_principal
                };
                if *opposite_request == NavigationChange::Keep {
                    plan.clear_opposite = Some(end.opposite());
                }
            }
        }

        for (end, change) in requests {
            if plan.upgrades.contains(&end) {
                continue;
            }
            match change {
                NavigationChange::Keep => {}
                NavigationChange::Remove => {
                    if should_invert || data.navigation(end).is_some() {
                        plan.assignments.push((end, None));
                    }
                }
                NavigationChange::Set(name) => {
                    let member = members
                        .iter()
                        .find(|(e, ..)| *e == end)
                        .and_then(|(_, _, straight, inverted)| {
                            if should_invert {
                                inverted.clone()
                            } else {
                                straight.clone()
                            }
                        });
                    plan.assignments.push((
                        end,
                        Some(NavigationData {
                            name: name.clone(),
                            member,
                        }),
                    ));
                }
            }
        }

        // Phase 4: uniqueness implied by the final navigation to the dependent.
        let final_to_dependent = match to_dependent {
            NavigationChange::Set(_) => plan
                .assignments
                .iter()
                .find(|(end, _)| *end == NavigationEnd::ToDependent)
                .and_then(|(_, nav)| nav.as_ref())
                .and_then(|nav| nav.member.clone()),
            NavigationChange::Remove => None,
            NavigationChange::Keep => {
                let slot = current_slot(NavigationEnd::ToDependent);
                let dropped = plan
                    .orientation
                    .as_ref()
                    .is_some_and(|o| o.reset_navigations.contains(&slot));
                data.navigation(slot)
                    .filter(|_| !dropped)
                    .and_then(|nav| nav.member.clone())
            }
        };
        if let Some(member) = final_to_dependent {
            let unique = !member.is_collection();
            let recorded = plan
                .orientation
                .as_ref()
                .and_then(|o| o.unique)
                .unwrap_or_else(|| data.is_unique());
            if unique != recorded && !data.unique.can_set(&unique, source) {
                trace!(fk = %fk, unique, "navigation shape conflicts with uniqueness");
                return Ok(None);
            }
            plan.unique = Some(unique);
        }

        // Phase 5: other members already using the requested names.
        for (end, nav) in &plan.assignments {
            let Some(nav) = nav else {
                continue;
            };
            let owner = owner_of(*end);
            for (declaring, member) in self.members_in_hierarchy(owner, &nav.name) {
                let Some(resolution) =
                    self.plan_conflict(fk, owner, declaring, &nav.name, member, source)?
                else {
                    trace!(fk = %fk, navigation = nav.name, ?source, "navigation conflict is not resolvable");
                    return Ok(None);
                };
                if let Some(resolution) = resolution
                    && !plan.conflicts.contains(&resolution)
                {
                    plan.conflicts.push(resolution);
                }
            }
        }

        Ok(Some(plan))
    }

    // Outer `None`: unresolvable. Inner `None`: nothing to do. Only an
    // explicit request fails loudly on a member it cannot displace.
    fn plan_conflict(
        &self,
        fk: ForeignKeyId,
        owner: EntityTypeId,
        declaring: EntityTypeId,
        name: &str,
        member: MemberRef,
        source: ConfigurationSource,
    ) -> Result<Option<Option<ConflictResolution>>, ModelError> {
        let conflicting = || ModelError::ConflictingMember {
            entity: self.entity_name(owner),
            member: name.to_string(),
            declaring: self.entity_name(declaring),
        };

        match member {
            MemberRef::Navigation(nav) if nav.fk == fk => Ok(Some(None)),
            MemberRef::Navigation(nav) => {
                let other = self.foreign_key(nav.fk)?;
                if !displaces(source, other.navigation_source(nav.end)) {
                    return Ok(None);
                }
                let left_bare = other.navigation(nav.end.opposite()).is_none();
                if left_bare && !other.source.is_explicit() && displaces(source, Some(other.source))
                {
                    Ok(Some(Some(ConflictResolution::RemoveForeignKey(nav.fk))))
                } else {
                    Ok(Some(Some(ConflictResolution::ClearNavigation(nav))))
                }
            }
            MemberRef::Property(property) => {
                let data = self.property(property)?;
                if data.is_shadow
                    && data.source == ConfigurationSource::Convention
                    && !self.property_in_use(property)
                    && displaces(source, Some(data.source))
                {
                    Ok(Some(Some(ConflictResolution::RemoveProperty(property))))
                } else if source.is_explicit() {
                    Err(conflicting())
                } else {
                    Ok(None)
                }
            }
            MemberRef::ServiceProperty(entity) => {
                let recorded = self
                    .entity_type(entity)?
                    .service_properties
                    .get(name)
                    .copied();
                if displaces(source, recorded) {
                    Ok(Some(Some(ConflictResolution::RemoveServiceProperty(
                        entity,
                        name.to_string(),
                    ))))
                } else if source.is_explicit() {
                    Err(conflicting())
                } else {
                    Ok(None)
                }
            }
        }
    }

    fn apply_navigations(
        &mut self,
        fk: ForeignKeyId,
        plan: &NavigationsPlan,
        source: ConfigurationSource,
    ) -> Result<(), ModelError> {
        if let Some(orientation) = &plan.orientation {
            self.apply_orientation(fk, orientation, source)?;
        }

        for conflict in &plan.conflicts {
            match conflict {
                ConflictResolution::ClearNavigation(nav) => {
                    if self.contains_foreign_key(nav.fk) {
                        self.clear_navigation(nav.fk, nav.end)?;
                    }
                }
                ConflictResolution::RemoveForeignKey(other) => {
                    if self.contains_foreign_key(*other) {
                        debug!(fk = %other, by = %fk, "conflicting relationship removed");
                        self.remove_foreign_key_unchecked(*other)?;
                    }
                }
                ConflictResolution::RemoveProperty(property) => {
                    if self.property(*property).is_ok() {
                        self.remove_property_unchecked(*property)?;
                    }
                }
                ConflictResolution::RemoveServiceProperty(entity, name) => {
                    self.entity_type_mut(*entity)?.service_properties.remove(name);
                    self.notify(ModelEvent::ServicePropertyRemoved {
                        entity: *entity,
                        name: name.clone(),
                    });
                }
            }
        }

        if let Some(end) = plan.clear_opposite {
            self.clear_navigation(fk, end)?;
        }
        for (end, nav) in &plan.assignments {
            match nav {
                Some(nav) => self.assign_navigation(fk, *end, nav.clone(), source)?,
                None => self.clear_navigation(fk, *end)?,
            }
        }

        self.apply_navigation_upgrades(fk, plan, source)?;
        let data = self.foreign_key_mut(fk)?;
        if !plan.assignments.is_empty() && !data.is_self_referencing() {
            data.principal_end_source = Some(source.max(data.principal_end_source));
        }
        data.upgrade_source(source);

        Ok(())
    }

    fn apply_navigation_upgrades(
        &mut self,
        fk: ForeignKeyId,
        plan: &NavigationsPlan,
        source: ConfigurationSource,
    ) -> Result<(), ModelError> {
        let data = self.foreign_key_mut(fk)?;
        for end in &plan.upgrades {
            let slot = data.navigation_source_slot(*end);
            *slot = Some(source.max(*slot));
        }
        let changed = plan
            .unique
            .is_some_and(|unique| matches!(data.unique.try_set(unique, source), SetOutcome::Changed { .. }));
        if !plan.upgrades.is_empty() {
            data.upgrade_source(source);
        }
        if changed {
            self.notify(ModelEvent::ForeignKeyUniquenessChanged { fk });
        }

        Ok(())
    }

    pub(crate) fn assign_navigation(
        &mut self,
        fk: ForeignKeyId,
        end: NavigationEnd,
        nav: NavigationData,
        source: ConfigurationSource,
    ) -> Result<(), ModelError> {
        if self.foreign_key(fk)?.navigation_name(end) == Some(nav.name.as_str()) {
            let data = self.foreign_key_mut(fk)?;
            *data.navigation_slot(end) = Some(nav);
            let slot = data.navigation_source_slot(end);
            *slot = Some(source.max(*slot));
            return Ok(());
        }

        self.clear_navigation(fk, end)?;
        let name = nav.name.clone();
        let data = self.foreign_key_mut(fk)?;
        *data.navigation_slot(end) = Some(nav);
        *data.navigation_source_slot(end) = Some(source);
        debug!(fk = %fk, %end, navigation = name, ?source, "navigation assigned");
        self.notify(ModelEvent::NavigationAdded { fk, end, name });

        Ok(())
    }

    pub(crate) fn clear_navigation(
        &mut self,
        fk: ForeignKeyId,
        end: NavigationEnd,
    ) -> Result<(), ModelError> {
        let data = self.foreign_key_mut(fk)?;
        let Some(nav) = data.navigation_slot(end).take() else {
            return Ok(());
        };
        *data.navigation_source_slot(end) = None;
        trace!(fk = %fk, %end, navigation = nav.name, "navigation cleared");
        self.notify(ModelEvent::NavigationRemoved {
            fk,
            end,
            name: nav.name,
        });

        Ok(())
    }

    fn navigations_match(
        &self,
        fk: ForeignKeyId,
        to_principal: &NavigationChange,
        to_dependent: &NavigationChange,
    ) -> bool {
        let Ok(data) = self.foreign_key(fk) else {
            return false;
        };

        [
            (NavigationEnd::ToPrincipal, to_principal),
            (NavigationEnd::ToDependent, to_dependent),
        ]
        .into_iter()
        .all(|(end, change)| match change {
            NavigationChange::Keep => true,
            NavigationChange::Remove => data.navigation(end).is_none(),
            NavigationChange::Set(name) => data.navigation_name(end) == Some(name.as_str()),
        })
    }
}
