use derive_more::Display;
use serde::Serialize;

///
/// Slot
/// Arena cell; removed elements leave a tombstone so ids are never reused.
///

#[derive(Clone, Debug)]
pub(crate) enum Slot<T> {
    Live(T),
    Removed,
}

///
/// Arena
///

#[derive(Clone, Debug)]
pub(crate) struct Arena<T> {
    slots: Vec<Slot<T>>,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self { slots: Vec::new() }
    }
}

impl<T> Arena<T> {
    pub(crate) fn insert(&mut self, value: T) -> u32 {
        let index = u32::try_from(self.slots.len()).unwrap_or(u32::MAX);
        self.slots.push(Slot::Live(value));

        index
    }

    pub(crate) fn get(&self, index: u32) -> Option<&T> {
        match self.slots.get(index as usize) {
            Some(Slot::Live(value)) => Some(value),
            _ => None,
        }
    }

    pub(crate) fn get_mut(&mut self, index: u32) -> Option<&mut T> {
        match self.slots.get_mut(index as usize) {
            Some(Slot::Live(value)) => Some(value),
            _ => None,
        }
    }

    pub(crate) fn remove(&mut self, index: u32) -> Option<T> {
        let slot = self.slots.get_mut(index as usize)?;
        match std::mem::replace(slot, Slot::Removed) {
            Slot::Live(value) => Some(value),
            Slot::Removed => None,
        }
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (u32, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| match slot {
                Slot::Live(value) => u32::try_from(index).ok().map(|index| (index, value)),
                Slot::Removed => None,
            })
    }
}

// Typed arena ids; `Display` doubles as the diagnostic label.
macro_rules! arena_id {
    ($name:ident, $label:literal) => {
        #[derive(
            Clone, Copy, Debug, Display, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
        )]
        #[display("{}#{}", $label, _0)]
        pub struct $name(pub(crate) u32);
    };
}

arena_id!(EntityTypeId, "entity");
arena_id!(PropertyId, "property");
arena_id!(KeyId, "key");
arena_id!(ForeignKeyId, "fk");
arena_id!(IndexId, "index");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removed_slots_are_tombstoned() {
        let mut arena = Arena::default();
        let a = arena.insert("a");
        let b = arena.insert("b");

        assert_eq!(arena.remove(a), Some("a"));
        assert_eq!(arena.remove(a), None);
        assert!(arena.get(a).is_none());
        assert_eq!(arena.get(b), Some(&"b"));

        let c = arena.insert("c");
        assert_ne!(c, a, "ids are never reused");
        assert_eq!(arena.iter().map(|(_, v)| *v).collect::<Vec<_>>(), vec!["b", "c"]);
    }

    #[test]
    fn ids_render_with_their_label() {
        assert_eq!(EntityTypeId(3).to_string(), "entity#3");
        assert_eq!(ForeignKeyId(0).to_string(), "fk#0");
    }
}
