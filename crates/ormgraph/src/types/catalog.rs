use crate::types::{HostTypeId, MemberInfo, MemberKind, TypeOracle, ValueKind};
use std::collections::BTreeMap;

///
/// HostTypeDef
///

#[derive(Clone, Debug)]
struct HostTypeDef {
    name: String,
    base: Option<HostTypeId>,
    members: BTreeMap<String, MemberInfo>,
}

///
/// TypeCatalog
/// Host types described up front by the embedding application.
///

#[derive(Clone, Debug, Default)]
pub struct TypeCatalog {
    types: Vec<HostTypeDef>,
}

impl TypeCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a root host type.
    pub fn define(&mut self, name: impl Into<String>) -> HostTypeId {
        self.push(name.into(), None)
    }

    /// Declare a host type deriving from `base`.
    pub fn define_derived(&mut self, name: impl Into<String>, base: HostTypeId) -> HostTypeId {
        self.push(name.into(), Some(base))
    }

    pub fn scalar(&mut self, ty: HostTypeId, name: &str, kind: ValueKind) -> &mut Self {
        self.member(ty, name, MemberKind::Scalar(kind))
    }

    pub fn reference(&mut self, ty: HostTypeId, name: &str, target: HostTypeId) -> &mut Self {
        self.member(ty, name, MemberKind::Reference(target))
    }

    pub fn collection(&mut self, ty: HostTypeId, name: &str, element: HostTypeId) -> &mut Self {
        self.member(ty, name, MemberKind::Collection(element))
    }

    #[must_use]
    pub fn find_type(&self, name: &str) -> Option<HostTypeId> {
        self.types
            .iter()
            .position(|def| def.name == name)
            .and_then(|index| u32::try_from(index).ok())
            .map(HostTypeId)
    }

    fn push(&mut self, name: String, base: Option<HostTypeId>) -> HostTypeId {
        let id = HostTypeId(u32::try_from(self.types.len()).unwrap_or(u32::MAX));
        self.types.push(HostTypeDef {
            name,
            base,
            members: BTreeMap::new(),
        });

        id
    }

    fn member(&mut self, ty: HostTypeId, name: &str, kind: MemberKind) -> &mut Self {
        if let Some(def) = self.def_mut(ty) {
            def.members.insert(
                name.to_string(),
                MemberInfo {
                    name: name.to_string(),
                    declaring: ty,
                    kind,
                },
            );
        }

        self
    }

    fn def(&self, ty: HostTypeId) -> Option<&HostTypeDef> {
        self.types.get(ty.0 as usize)
    }

    fn def_mut(&mut self, ty: HostTypeId) -> Option<&mut HostTypeDef> {
        self.types.get_mut(ty.0 as usize)
    }
}

impl TypeOracle for TypeCatalog {
    fn type_name(&self, ty: HostTypeId) -> Option<&str> {
        self.def(ty).map(|def| def.name.as_str())
    }

    fn base_type(&self, ty: HostTypeId) -> Option<HostTypeId> {
        self.def(ty).and_then(|def| def.base)
    }

    fn find_member(&self, ty: HostTypeId, name: &str) -> Option<&MemberInfo> {
        let mut current = Some(ty);
        while let Some(ty) = current {
            let def = self.def(ty)?;
            if let Some(member) = def.members.get(name) {
                return Some(member);
            }
            current = def.base;
        }

        None
    }
}
