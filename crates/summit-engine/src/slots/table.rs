use rustc_hash::FxHashMap;

use crate::error::{Result, SyncError};

/// Capacity of one slot namespace (one bind group).
pub const MAX_SLOTS_PER_GROUP: u32 = 900;

/// Namespace a binding lives in.
///
/// Render-target-shared bindings (camera, viewport) go to bind group 0,
/// object-local bindings to bind group 1.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub enum BindingScope {
    Target,
    Object,
}

impl BindingScope {
    pub const ALL: [BindingScope; 2] = [BindingScope::Target, BindingScope::Object];

    /// Bind group index used for this scope.
    #[inline]
    pub const fn group(self) -> u32 {
        match self {
            BindingScope::Target => 0,
            BindingScope::Object => 1,
        }
    }
}

/// Append-only `name -> slot` table with a high-water mark.
#[derive(Debug)]
pub struct SlotTable {
    scope: BindingScope,
    slots: FxHashMap<String, u32>,
    high_water: u32,
}

impl SlotTable {
    pub fn new(scope: BindingScope) -> Self {
        Self {
            scope,
            slots: FxHashMap::default(),
            high_water: 0,
        }
    }

    /// Returns the slot of `name`, assigning the next free one on first use.
    pub fn get_or_create_slot(&mut self, name: &str) -> Result<u32> {
        if let Some(&slot) = self.slots.get(name) {
            return Ok(slot);
        }

        let slot = self.high_water;
        if slot >= MAX_SLOTS_PER_GROUP {
            return Err(SyncError::SlotExhausted {
                scope: self.scope,
                name: name.to_owned(),
                requested: slot,
                max: MAX_SLOTS_PER_GROUP,
            });
        }

        self.high_water += 1;
        self.slots.insert(name.to_owned(), slot);
        log::trace!("slot {slot} -> `{name}` ({:?})", self.scope);
        Ok(slot)
    }

    /// Slot of an already-seen name.
    #[inline]
    pub fn get(&self, name: &str) -> Option<u32> {
        self.slots.get(name).copied()
    }

    #[inline]
    pub fn high_water_mark(&self) -> u32 {
        self.high_water
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// One [`SlotTable`] per [`BindingScope`].
#[derive(Debug)]
pub struct SlotAllocator {
    target: SlotTable,
    object: SlotTable,
}

impl SlotAllocator {
    pub fn new() -> Self {
        Self {
            target: SlotTable::new(BindingScope::Target),
            object: SlotTable::new(BindingScope::Object),
        }
    }

    #[inline]
    pub fn table(&self, scope: BindingScope) -> &SlotTable {
        match scope {
            BindingScope::Target => &self.target,
            BindingScope::Object => &self.object,
        }
    }

    #[inline]
    pub fn table_mut(&mut self, scope: BindingScope) -> &mut SlotTable {
        match scope {
            BindingScope::Target => &mut self.target,
            BindingScope::Object => &mut self.object,
        }
    }

    pub fn get_or_create_slot(&mut self, scope: BindingScope, name: &str) -> Result<u32> {
        self.table_mut(scope).get_or_create_slot(name)
    }
}

impl Default for SlotAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_seen_order_assigns_slots() {
        let mut table = SlotTable::new(BindingScope::Object);
        assert_eq!(table.get_or_create_slot("tint").unwrap(), 0);
        assert_eq!(table.get_or_create_slot("transform").unwrap(), 1);
        assert_eq!(table.get_or_create_slot("tint").unwrap(), 0);
        assert_eq!(table.high_water_mark(), 2);
    }

    #[test]
    fn same_sequence_gives_same_slots() {
        let names = ["atlas", "sampler", "transform", "atlas", "frame"];
        let run = || {
            let mut table = SlotTable::new(BindingScope::Object);
            names
                .iter()
                .map(|n| table.get_or_create_slot(n).unwrap())
                .collect::<Vec<_>>()
        };
        assert_eq!(run(), run());
        assert_eq!(run(), vec![0, 1, 2, 0, 3]);
    }

    #[test]
    fn the_901st_name_is_rejected() {
        let mut table = SlotTable::new(BindingScope::Target);
        for i in 0..MAX_SLOTS_PER_GROUP {
            assert_eq!(table.get_or_create_slot(&format!("u{i}")).unwrap(), i);
        }
        let err = table.get_or_create_slot("one-too-many").unwrap_err();
        assert!(matches!(err, SyncError::SlotExhausted { requested: 900, .. }));

        // Existing names still resolve after exhaustion.
        assert_eq!(table.get_or_create_slot("u899").unwrap(), 899);
        assert_eq!(table.len(), MAX_SLOTS_PER_GROUP as usize);
    }

    #[test]
    fn scopes_are_independent() {
        let mut slots = SlotAllocator::new();
        assert_eq!(slots.get_or_create_slot(BindingScope::Target, "viewport").unwrap(), 0);
        assert_eq!(slots.get_or_create_slot(BindingScope::Object, "tint").unwrap(), 0);
        assert_eq!(slots.get_or_create_slot(BindingScope::Object, "viewport").unwrap(), 1);
        assert_eq!(slots.table(BindingScope::Target).get("viewport"), Some(0));
    }
}
