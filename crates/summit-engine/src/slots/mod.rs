//! Stable binding-slot assignment.
//!
//! Slots are handed out per namespace in first-seen order and never reused,
//! so a name keeps its slot for the lifetime of the allocator.

mod table;

pub use table::{BindingScope, MAX_SLOTS_PER_GROUP, SlotAllocator, SlotTable};
