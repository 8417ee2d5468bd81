use std::fmt;
use thiserror::Error as ThisError;

///
/// ModelError
///
/// Failures that are not precedence disputes. Rejections caused by a
/// lower-authority source are reported as `Ok(None)` / `Ok(false)` by the
/// operation itself and never reach this type.
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
#[remain::sorted]
pub enum ModelError {
    #[error("the entity type '{entity}' cannot have base type '{base}' because it would create a cycle")]
    CircularInheritance { entity: String, base: String },

    #[error("the member '{member}' on '{entity}' conflicts with a member declared on '{declaring}'")]
    ConflictingMember {
        entity: String,
        member: String,
        declaring: String,
    },

    #[error("the derived type '{entity}' cannot declare key '{key}'; keys belong to the root '{root}'")]
    DerivedTypeKey {
        entity: String,
        key: String,
        root: String,
    },

    #[error("the derived type '{entity}' cannot be keyless while its base '{base}' has a key")]
    DerivedTypeKeyless { entity: String, base: String },

    #[error("{kind} {id} has been removed from the model")]
    Detached { kind: &'static str, id: String },

    #[error("a {kind} named '{name}' already exists on '{entity}'")]
    DuplicateName {
        kind: &'static str,
        entity: String,
        name: String,
    },

    #[error("the property list for {context} on '{entity}' contains '{property}' more than once")]
    DuplicateProperty {
        context: &'static str,
        entity: String,
        property: String,
    },

    #[error("{kind} names cannot be empty")]
    EmptyName { kind: &'static str },

    #[error("the property list for {context} on '{entity}' is empty")]
    EmptyPropertyList {
        context: &'static str,
        entity: String,
    },

    #[error("the host type of '{base}' is not assignable from the host type of '{entity}'")]
    IncompatibleBaseType { entity: String, base: String },

    #[error(
        "the foreign key properties {properties} on '{dependent}' are not compatible with the principal key {key} on '{principal}'"
    )]
    IncompatibleForeignKey {
        dependent: String,
        properties: String,
        principal: String,
        key: String,
    },

    #[error(
        "the navigations {navigations} cannot describe a relationship between '{dependent}' (dependent) and '{principal}' (principal)"
    )]
    IncompatibleNavigations {
        navigations: String,
        dependent: String,
        principal: String,
    },

    #[error("'{entity}' and '{other}' cannot be related: {reason}")]
    InvalidRelatedTypes {
        entity: String,
        other: String,
        reason: String,
    },

    #[error("the key {key} on '{entity}' cannot be removed because it is referenced by {referencing}")]
    KeyInUse {
        entity: String,
        key: String,
        referencing: String,
    },

    #[error("the {kind} name '{name}' exceeds the maximum length {max}")]
    NameTooLong {
        kind: &'static str,
        name: String,
        max: usize,
    },

    #[error("the navigation '{navigation}' was not found on the host type of '{entity}'")]
    NavigationMemberNotFound { entity: String, navigation: String },

    #[error(
        "the navigation '{navigation}' on '{entity}' cannot point to '{target}' because its member type is incompatible"
    )]
    NavigationTargetMismatch {
        entity: String,
        navigation: String,
        target: String,
    },

    #[error("the property '{property}' of '{entity}' cannot be part of {context} because it is nullable")]
    NullableKeyProperty {
        context: &'static str,
        entity: String,
        property: String,
    },

    #[error("the entity type '{entity}' is owned and cannot be part of an inheritance hierarchy")]
    OwnedTypeInHierarchy { entity: String },

    #[error("the entity type '{entity}' and its base '{base}' disagree on ownership")]
    OwnershipMismatch { entity: String, base: String },

    #[error("the property '{property}' is not declared in the hierarchy of '{entity}'")]
    PropertyNotInHierarchy { entity: String, property: String },
}

impl ModelError {
    /// Taxonomy bucket used by callers that only care about the error category.
    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::Detached { .. } => ErrorClass::Detached,
            Self::IncompatibleBaseType { .. }
            | Self::IncompatibleForeignKey { .. }
            | Self::IncompatibleNavigations { .. }
            | Self::InvalidRelatedTypes { .. }
            | Self::NavigationTargetMismatch { .. }
            | Self::NullableKeyProperty { .. } => ErrorClass::Incompatible,
            Self::NavigationMemberNotFound { .. } | Self::PropertyNotInHierarchy { .. } => {
                ErrorClass::NotFound
            }
            Self::CircularInheritance { .. }
            | Self::ConflictingMember { .. }
            | Self::DerivedTypeKey { .. }
            | Self::DerivedTypeKeyless { .. }
            | Self::DuplicateName { .. }
            | Self::DuplicateProperty { .. }
            | Self::EmptyName { .. }
            | Self::EmptyPropertyList { .. }
            | Self::KeyInUse { .. }
            | Self::NameTooLong { .. }
            | Self::OwnedTypeInHierarchy { .. }
            | Self::OwnershipMismatch { .. } => ErrorClass::InvariantViolation,
        }
    }

    pub(crate) fn detached(kind: &'static str, id: impl fmt::Display) -> Self {
        Self::Detached {
            kind,
            id: id.to_string(),
        }
    }
}

///
/// ErrorClass
/// Error taxonomy for model-building failures.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorClass {
    /// Shape mismatch that only surfaces for explicit requests.
    Incompatible,
    /// Model-definition error surfaced regardless of source.
    InvariantViolation,
    /// A named member could not be resolved.
    NotFound,
    /// A handle was used after its target left the model.
    Detached,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Incompatible => "incompatible",
            Self::InvariantViolation => "invariant_violation",
            Self::NotFound => "not_found",
            Self::Detached => "detached",
        };
        write!(f, "{label}")
    }
}
