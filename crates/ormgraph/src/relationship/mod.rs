//! Module: relationship
//! Responsibility: foreign-key aspects and the resolution engine that
//! arbitrates competing proposals for them.
//! Does not own: entity-type bookkeeping (see `model`).
//! Boundary: every mutating operation has a pure `can_*` twin built on the
//! same plan; the mutating form only applies a plan the twin accepted.
//!
//! Invariants:
//! - Foreign key properties are visible from the dependent type and the
//!   principal key is declared on the principal's hierarchy root.
//! - At most one relationship per (dependent, properties, principal key,
//!   principal) shape.
//! - Uniqueness agrees with the shape of the navigation to the dependent.
//! - Self-referencing relationships are never inverted.

mod aspect;
mod builder;
mod facets;
mod lifecycle;
mod navigations;
mod properties;
mod related_types;


use crate::{
    error::ModelError,
    model::{EntityTypeId, ForeignKeyId, KeyId, Model, PropertyId},
    source::ConfigurationSource,
    types::MemberInfo,
};
use derive_more::Display;
use serde::{Deserialize, Serialize};

pub use aspect::{Aspect, SetOutcome};
pub use builder::RelationshipBuilder;
pub use navigations::NavigationChange;

///
/// DeleteBehavior
///

#[derive(
    Clone, Copy, Debug, Default, Deserialize, Display, Eq, Hash, PartialEq, Serialize,
)]
#[remain::sorted]
#[serde(rename_all = "snake_case")]
pub enum DeleteBehavior {
    Cascade,
    #[default]
    ClientSetNull,
    NoAction,
    Restrict,
    SetNull,
}

///
/// NavigationEnd
/// Which slot of a relationship a navigation occupies.
///

#[derive(Clone, Copy, Debug, Display, Eq, Hash, PartialEq)]
pub enum NavigationEnd {
    /// Declared on the dependent, points at the principal.
    ToPrincipal,
    /// Declared on the principal, points at the dependent(s).
    ToDependent,
}

impl NavigationEnd {
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::ToPrincipal => Self::ToDependent,
            Self::ToDependent => Self::ToPrincipal,
        }
    }
}

///
/// NavigationRef
///

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct NavigationRef {
    pub fk: ForeignKeyId,
    pub end: NavigationEnd,
}

impl NavigationRef {
    #[must_use]
    pub const fn new(fk: ForeignKeyId, end: NavigationEnd) -> Self {
        Self { fk, end }
    }
}

///
/// NavigationData
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NavigationData {
    pub(crate) name: String,
    /// Host member backing the navigation; `None` for types without a host type.
    pub(crate) member: Option<MemberInfo>,
}

impl NavigationData {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn member(&self) -> Option<&MemberInfo> {
        self.member.as_ref()
    }

    #[must_use]
    pub fn is_collection(&self) -> bool {
        self.member.as_ref().is_some_and(MemberInfo::is_collection)
    }
}

///
/// ForeignKeyData
///
/// One relationship. Every settable aspect records the source that last
/// configured it; `source` is the highest source ever applied to any aspect.
///

#[derive(Clone, Debug)]
pub struct ForeignKeyData {
    pub(crate) dependent: EntityTypeId,
    pub(crate) principal: EntityTypeId,
    pub(crate) properties: Vec<PropertyId>,
    pub(crate) properties_source: Option<ConfigurationSource>,
    pub(crate) principal_key: KeyId,
    pub(crate) principal_key_source: Option<ConfigurationSource>,
    pub(crate) to_principal: Option<NavigationData>,
    pub(crate) to_principal_source: Option<ConfigurationSource>,
    pub(crate) to_dependent: Option<NavigationData>,
    pub(crate) to_dependent_source: Option<ConfigurationSource>,
    pub(crate) unique: Aspect<bool>,
    pub(crate) required: Aspect<bool>,
    pub(crate) ownership: Aspect<bool>,
    pub(crate) delete_behavior: Aspect<DeleteBehavior>,
    pub(crate) principal_end_source: Option<ConfigurationSource>,
    pub(crate) source: ConfigurationSource,
}

impl ForeignKeyData {
    #[must_use]
    pub const fn dependent(&self) -> EntityTypeId {
        self.dependent
    }

    #[must_use]
    pub const fn principal(&self) -> EntityTypeId {
        self.principal
    }

    #[must_use]
    pub fn properties(&self) -> &[PropertyId] {
        &self.properties
    }

    #[must_use]
    pub const fn properties_source(&self) -> Option<ConfigurationSource> {
        self.properties_source
    }

    #[must_use]
    pub const fn principal_key(&self) -> KeyId {
        self.principal_key
    }

    #[must_use]
    pub const fn principal_key_source(&self) -> Option<ConfigurationSource> {
        self.principal_key_source
    }

    #[must_use]
    pub const fn to_principal(&self) -> Option<&NavigationData> {
        self.to_principal.as_ref()
    }

    #[must_use]
    pub const fn to_dependent(&self) -> Option<&NavigationData> {
        self.to_dependent.as_ref()
    }

    #[must_use]
    pub const fn navigation(&self, end: NavigationEnd) -> Option<&NavigationData> {
        match end {
            NavigationEnd::ToPrincipal => self.to_principal.as_ref(),
            NavigationEnd::ToDependent => self.to_dependent.as_ref(),
        }
    }

    #[must_use]
    pub fn navigation_name(&self, end: NavigationEnd) -> Option<&str> {
        self.navigation(end).map(NavigationData::name)
    }

    #[must_use]
    pub const fn navigation_source(&self, end: NavigationEnd) -> Option<ConfigurationSource> {
        match end {
            NavigationEnd::ToPrincipal => self.to_principal_source,
            NavigationEnd::ToDependent => self.to_dependent_source,
        }
    }

    /// Entity type that declares the navigation in slot `end`.
    #[must_use]
    pub const fn navigation_owner(&self, end: NavigationEnd) -> EntityTypeId {
        match end {
            NavigationEnd::ToPrincipal => self.dependent,
            NavigationEnd::ToDependent => self.principal,
        }
    }

    #[must_use]
    pub const fn is_unique(&self) -> bool {
        *self.unique.value()
    }

    #[must_use]
    pub const fn unique_source(&self) -> Option<ConfigurationSource> {
        self.unique.source()
    }

    #[must_use]
    pub const fn is_required(&self) -> bool {
        *self.required.value()
    }

    #[must_use]
    pub const fn required_source(&self) -> Option<ConfigurationSource> {
        self.required.source()
    }

    #[must_use]
    pub const fn is_ownership(&self) -> bool {
        *self.ownership.value()
    }

    #[must_use]
    pub const fn delete_behavior(&self) -> DeleteBehavior {
        *self.delete_behavior.value()
    }

    #[must_use]
    pub const fn principal_end_source(&self) -> Option<ConfigurationSource> {
        self.principal_end_source
    }

    #[must_use]
    pub const fn source(&self) -> ConfigurationSource {
        self.source
    }

    #[must_use]
    pub fn is_self_referencing(&self) -> bool {
        self.dependent == self.principal
    }

    pub(crate) fn navigation_slot(&mut self, end: NavigationEnd) -> &mut Option<NavigationData> {
        match end {
            NavigationEnd::ToPrincipal => &mut self.to_principal,
            NavigationEnd::ToDependent => &mut self.to_dependent,
        }
    }

    pub(crate) fn navigation_source_slot(
        &mut self,
        end: NavigationEnd,
    ) -> &mut Option<ConfigurationSource> {
        match end {
            NavigationEnd::ToPrincipal => &mut self.to_principal_source,
            NavigationEnd::ToDependent => &mut self.to_dependent_source,
        }
    }

    pub(crate) fn upgrade_source(&mut self, source: ConfigurationSource) {
        self.source = source.max(Some(self.source));
    }
}

/// Whether a change made by `source` may take a contested name or
/// relationship away from another relationship configured by `incumbent`.
pub(crate) const fn displaces(
    source: ConfigurationSource,
    incumbent: Option<ConfigurationSource>,
) -> bool {
    source.is_explicit() || source.overrides_strictly(incumbent)
}

/// Whether `source` may drop a navigation of the relationship it is
/// reshaping. Explicit navigations are only ever replaced, never dropped.
pub(crate) const fn can_reset_navigation(
    source: ConfigurationSource,
    recorded: Option<ConfigurationSource>,
) -> bool {
    source.overrides(recorded) && !matches!(recorded, Some(ConfigurationSource::Explicit))
}

impl Model {
    /// Builder handle for an existing relationship.
    pub fn relationship(&mut self, fk: ForeignKeyId) -> Result<RelationshipBuilder<'_>, ModelError> {
        let fk = self.resolve_replacement(fk);
        self.foreign_key(fk)?;

        Ok(RelationshipBuilder::new(self, fk))
    }

    /// Relationship declared on the dependent side under navigation `name`.
    #[must_use]
    pub fn find_relationship_by_navigation(
        &self,
        entity: EntityTypeId,
        name: &str,
    ) -> Option<ForeignKeyId> {
        self.find_navigation(entity, name).map(|nav| nav.fk)
    }
}
