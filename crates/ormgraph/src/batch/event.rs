use crate::{
    model::{EntityTypeId, ForeignKeyId, IndexId, KeyId, PropertyId},
    relationship::NavigationEnd,
};

///
/// ModelEvent
///
/// One committed structural change, carrying the previous value where the
/// observer cannot recover it from the model any more.
///

#[derive(Clone, Debug, Eq, PartialEq)]
#[remain::sorted]
pub enum ModelEvent {
    BaseTypeChanged {
        entity: EntityTypeId,
        previous: Option<EntityTypeId>,
    },
    EntityTypeAdded {
        entity: EntityTypeId,
    },
    EntityTypeRemoved {
        entity: EntityTypeId,
        name: String,
    },
    ForeignKeyAdded {
        fk: ForeignKeyId,
    },
    ForeignKeyDeleteBehaviorChanged {
        fk: ForeignKeyId,
    },
    ForeignKeyOwnershipChanged {
        fk: ForeignKeyId,
    },
    ForeignKeyPrincipalEndChanged {
        fk: ForeignKeyId,
        previous_principal: EntityTypeId,
        previous_dependent: EntityTypeId,
    },
    ForeignKeyPropertiesChanged {
        fk: ForeignKeyId,
        previous_properties: Vec<PropertyId>,
        previous_principal_key: KeyId,
    },
    ForeignKeyRemoved {
        fk: ForeignKeyId,
        dependent: EntityTypeId,
        principal: EntityTypeId,
    },
    ForeignKeyRequirednessChanged {
        fk: ForeignKeyId,
    },
    ForeignKeyUniquenessChanged {
        fk: ForeignKeyId,
    },
    IndexAdded {
        index: IndexId,
    },
    IndexRemoved {
        index: IndexId,
        entity: EntityTypeId,
    },
    IndexUniquenessChanged {
        index: IndexId,
    },
    KeyAdded {
        key: KeyId,
    },
    KeyRemoved {
        key: KeyId,
        entity: EntityTypeId,
    },
    NavigationAdded {
        fk: ForeignKeyId,
        end: NavigationEnd,
        name: String,
    },
    NavigationRemoved {
        fk: ForeignKeyId,
        end: NavigationEnd,
        name: String,
    },
    PrimaryKeyChanged {
        entity: EntityTypeId,
        previous: Option<KeyId>,
    },
    PropertyAdded {
        property: PropertyId,
    },
    PropertyNullabilityChanged {
        property: PropertyId,
    },
    PropertyRemoved {
        entity: EntityTypeId,
        name: String,
    },
    ServicePropertyAdded {
        entity: EntityTypeId,
        name: String,
    },
    ServicePropertyRemoved {
        entity: EntityTypeId,
        name: String,
    },
    TriggerAdded {
        entity: EntityTypeId,
        name: String,
    },
    TriggerRemoved {
        entity: EntityTypeId,
        name: String,
    },
}

impl ModelEvent {
    /// Relationship the event is about, if any.
    #[must_use]
    pub const fn foreign_key(&self) -> Option<ForeignKeyId> {
        match self {
            Self::ForeignKeyAdded { fk }
            | Self::ForeignKeyDeleteBehaviorChanged { fk }
            | Self::ForeignKeyOwnershipChanged { fk }
            | Self::ForeignKeyPrincipalEndChanged { fk, .. }
            | Self::ForeignKeyPropertiesChanged { fk, .. }
            | Self::ForeignKeyRemoved { fk, .. }
            | Self::ForeignKeyRequirednessChanged { fk }
            | Self::ForeignKeyUniquenessChanged { fk }
            | Self::NavigationAdded { fk, .. }
            | Self::NavigationRemoved { fk, .. } => Some(*fk),
            _ => None,
        }
    }

    /// Stable label for logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::BaseTypeChanged { .. } => "base_type_changed",
            Self::EntityTypeAdded { .. } => "entity_type_added",
            Self::EntityTypeRemoved { .. } => "entity_type_removed",
            Self::ForeignKeyAdded { .. } => "foreign_key_added",
            Self::ForeignKeyDeleteBehaviorChanged { .. } => "foreign_key_delete_behavior_changed",
            Self::ForeignKeyOwnershipChanged { .. } => "foreign_key_ownership_changed",
            Self::ForeignKeyPrincipalEndChanged { .. } => "foreign_key_principal_end_changed",
            Self::ForeignKeyPropertiesChanged { .. } => "foreign_key_properties_changed",
            Self::ForeignKeyRemoved { .. } => "foreign_key_removed",
            Self::ForeignKeyRequirednessChanged { .. } => "foreign_key_requiredness_changed",
            Self::ForeignKeyUniquenessChanged { .. } => "foreign_key_uniqueness_changed",
            Self::IndexAdded { .. } => "index_added",
            Self::IndexRemoved { .. } => "index_removed",
            Self::IndexUniquenessChanged { .. } => "index_uniqueness_changed",
            Self::KeyAdded { .. } => "key_added",
            Self::KeyRemoved { .. } => "key_removed",
            Self::NavigationAdded { .. } => "navigation_added",
            Self::NavigationRemoved { .. } => "navigation_removed",
            Self::PrimaryKeyChanged { .. } => "primary_key_changed",
            Self::PropertyAdded { .. } => "property_added",
            Self::PropertyNullabilityChanged { .. } => "property_nullability_changed",
            Self::PropertyRemoved { .. } => "property_removed",
            Self::ServicePropertyAdded { .. } => "service_property_added",
            Self::ServicePropertyRemoved { .. } => "service_property_removed",
            Self::TriggerAdded { .. } => "trigger_added",
            Self::TriggerRemoved { .. } => "trigger_removed",
        }
    }
}
