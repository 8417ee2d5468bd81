//! Schema graph builder for an object-relational mapper: entity types,
//! properties, keys and the relationships between them, configured by
//! competing sources of differing authority.
#![warn(unreachable_pub)]

// public exports are one module level down
pub mod batch;
pub mod config;
pub mod error;
pub mod model;
pub mod relationship;
pub mod source;
pub mod types;

///
/// Prelude
///
/// Prelude contains the vocabulary needed to build a model.
/// Events, snapshots and observers are imported from their modules.
///

pub mod prelude {
    pub use crate::{
        error::ModelError,
        model::{EntityTypeId, ForeignKeyId, KeyId, Model, PropertyId},
        relationship::{DeleteBehavior, NavigationChange, NavigationEnd},
        source::ConfigurationSource,
        types::{TypeCatalog, ValueKind},
    };
}
