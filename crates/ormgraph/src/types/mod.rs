//! Module: types
//! Responsibility: the host type oracle consulted for navigation members.
//! Does not own: entity types or any model state.
//! Boundary: pure, side-effect-free queries about host types and their members.
//!
//! The engine never inspects host types directly; it asks a `TypeOracle`
//! whether a member exists and what it points at. `TypeCatalog` is the
//! in-memory oracle used by hosts that describe their types up front.

mod catalog;

#[cfg(test)]
mod tests;

use derive_more::Display;
use serde::{Deserialize, Serialize};

pub use catalog::TypeCatalog;

///
/// HostTypeId
///

#[derive(
    Clone, Copy, Debug, Deserialize, Display, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
#[display("host#{_0}")]
pub struct HostTypeId(pub(crate) u32);

///
/// ValueKind
/// Scalar shape of a property; nullability is tracked separately.
///

#[derive(
    Clone, Copy, Debug, Deserialize, Display, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
#[remain::sorted]
pub enum ValueKind {
    Bool,
    Bytes,
    DateTime,
    Decimal,
    Guid,
    Int32,
    Int64,
    Text,
}

///
/// MemberKind
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MemberKind {
    Scalar(ValueKind),
    /// Single-valued reference to another host type.
    Reference(HostTypeId),
    /// Collection whose element type is the given host type.
    Collection(HostTypeId),
}

///
/// MemberInfo
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MemberInfo {
    pub name: String,
    pub declaring: HostTypeId,
    pub kind: MemberKind,
}

impl MemberInfo {
    /// Target host type when the member can act as a navigation.
    #[must_use]
    pub const fn navigation_target(&self) -> Option<HostTypeId> {
        match self.kind {
            MemberKind::Reference(target) | MemberKind::Collection(target) => Some(target),
            MemberKind::Scalar(_) => None,
        }
    }

    #[must_use]
    pub const fn is_collection(&self) -> bool {
        matches!(self.kind, MemberKind::Collection(_))
    }
}

///
/// TypeOracle
///
/// Reflection boundary. Implementations must answer consistently for the
/// lifetime of a model.
///

pub trait TypeOracle {
    fn type_name(&self, ty: HostTypeId) -> Option<&str>;

    fn base_type(&self, ty: HostTypeId) -> Option<HostTypeId>;

    /// Find a member declared on `ty` or inherited from one of its bases.
    fn find_member(&self, ty: HostTypeId, name: &str) -> Option<&MemberInfo>;

    /// Whether a value of `source` can be stored in a slot of type `target`.
    fn is_assignable_from(&self, target: HostTypeId, source: HostTypeId) -> bool {
        let mut current = Some(source);
        while let Some(ty) = current {
            if ty == target {
                return true;
            }
            current = self.base_type(ty);
        }

        false
    }

    /// Whether `member` can navigate to an entity whose host type is `target`.
    fn can_navigate_to(&self, member: &MemberInfo, target: HostTypeId) -> bool {
        member
            .navigation_target()
            .is_some_and(|declared| self.is_assignable_from(declared, target))
    }
}
