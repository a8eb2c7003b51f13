//! Specialized collection types

pub use slotmap::{new_key_type, SlotMap};

new_key_type! {
    /// Arena key of a region node inside a spatial tree
    pub struct RegionKey;
}

/// Arena of spatial tree regions with stable keys
pub type RegionArena<T> = SlotMap<RegionKey, T>;
