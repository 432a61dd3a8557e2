use bitflags::bitflags;
use space::WrapSlot;

pub type EntryId = u64;

const SLOT_BITS: u32 = 2;
const SLOT_MASK: u64 = (1 << SLOT_BITS) - 1;

/// Largest entry id whose fragment ids do not collide.
pub const MAX_ENTRY_ID: EntryId = u64::MAX >> SLOT_BITS;

/// Indexed id of one wrap piece of an entry.
///
/// | entry id (62) | slot (2) |
/// 63             2 1        0
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FragmentId(u64);

impl FragmentId {
    pub fn new(entry_id: EntryId, slot: WrapSlot) -> Self {
        debug_assert!(entry_id <= MAX_ENTRY_ID, "entry id {entry_id} out of range");
        Self((entry_id << SLOT_BITS) | slot as u64)
    }

    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }

    pub const fn entry_id(self) -> EntryId {
        self.0 >> SLOT_BITS
    }

    pub const fn slot(self) -> WrapSlot {
        match self.0 & SLOT_MASK {
            0 => WrapSlot::Base,
            1 => WrapSlot::RightWrap,
            2 => WrapSlot::BottomWrap,
            _ => WrapSlot::CornerWrap,
        }
    }
}

bitflags! {
    /// Fragment slots of an entry currently present in the index.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FragmentMask: u8 {
        const BASE = 1 << 0;
        const RIGHT_WRAP = 1 << 1;
        const BOTTOM_WRAP = 1 << 2;
        const CORNER_WRAP = 1 << 3;
    }
}

impl FragmentMask {
    pub const fn from_slot(slot: WrapSlot) -> Self {
        Self::from_bits_truncate(1 << slot as u8)
    }

    pub const fn has_slot(self, slot: WrapSlot) -> bool {
        self.contains(Self::from_slot(slot))
    }

    pub fn slots(self) -> impl Iterator<Item = WrapSlot> {
        WrapSlot::ALL
            .into_iter()
            .filter(move |slot| self.has_slot(*slot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fragment_id_packs_entry_and_slot() {
        let fragment = FragmentId::new(1, WrapSlot::CornerWrap);
        assert_eq!(fragment.raw(), 0b111);
        assert_eq!(fragment.entry_id(), 1);
        assert_eq!(fragment.slot(), WrapSlot::CornerWrap);

        let fragment = FragmentId::new(MAX_ENTRY_ID, WrapSlot::RightWrap);
        assert_eq!(fragment.entry_id(), MAX_ENTRY_ID);
        assert_eq!(fragment.slot(), WrapSlot::RightWrap);
    }

    #[test]
    fn mask_lists_present_slots_in_order() {
        let mask = FragmentMask::BASE | FragmentMask::BOTTOM_WRAP;
        assert!(mask.has_slot(WrapSlot::Base));
        assert!(!mask.has_slot(WrapSlot::RightWrap));
        assert_eq!(
            mask.slots().collect::<Vec<_>>(),
            vec![WrapSlot::Base, WrapSlot::BottomWrap]
        );
        assert_eq!(FragmentMask::empty().slots().count(), 0);
    }
}
