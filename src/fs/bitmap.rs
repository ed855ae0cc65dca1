use bitvec::prelude::*;

/// The usage bitmaps of one kind (blocks or inodes), one per block group.
///
/// Bits are MSB-first within each byte and `1` means allocated.
/// Bit `b` of group `g` stands for structure `g * per_group + b`, counted from
/// zero: callers shift their own numbering (1-based inodes, blocks starting at
/// `first_data_block`) before and after calling in.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct GroupBitmaps {
    groups: Vec<BitVec<u8, Msb0>>,
    per_group: u32,
}

/// where an allocation or a free changed a bitmap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitLocation {
    pub group: u32,
    /// byte index inside the group's bitmap
    pub byte: usize,
}

impl GroupBitmaps {
    /// wrap the raw bitmap blocks read from disk, one slice per group
    pub fn new<'a, I>(raw_groups: I, per_group: u32) -> Self
    where
        I: IntoIterator<Item = &'a [u8]>,
    {
        GroupBitmaps {
            groups: raw_groups
                .into_iter()
                .map(BitVec::<u8, Msb0>::from_slice)
                .collect(),
            per_group,
        }
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn per_group(&self) -> u32 {
        self.per_group
    }

    /// the raw bytes of one group's bitmap, as they go to disk
    pub fn raw_group(&self, group: u32) -> &[u8] {
        self.groups[group as usize].as_raw_slice()
    }

    fn candidates(&self, group: usize) -> &BitSlice<u8, Msb0> {
        let bits = &self.groups[group];
        &bits[..bits.len().min(self.per_group as usize)]
    }

    /// check if structure `index` (0-based) is allocated
    pub fn is_set(&self, index: u32) -> bool {
        let (group, bit) = self.split(index);
        self.groups
            .get(group as usize)
            .and_then(|bits| bits.get(bit).as_deref().copied())
            .unwrap_or(false)
    }

    /// calculate the number of free structures in a group
    pub fn free_in_group(&self, group: u32) -> u32 {
        self.candidates(group as usize).count_zeros() as u32
    }

    /// First-fit allocation: scan groups ascending, then bits MSB-first,
    /// set the first clear bit.
    /// # Params
    /// - `start_number`: the number the very first bit stands for
    /// # Returns
    /// the allocated number and where the bitmap changed,
    /// or [None] if every group is exhausted
    pub fn find_first(&mut self, start_number: u32) -> Option<(u32, BitLocation)> {
        let (group, bit) = (0..self.groups.len())
            .find_map(|group| self.candidates(group).first_zero().map(|bit| (group, bit)))?;
        self.groups[group].set(bit, true);
        let number = start_number + group as u32 * self.per_group + bit as u32;
        Some((
            number,
            BitLocation {
                group: group as u32,
                byte: bit / 8,
            },
        ))
    }

    /// clear the bit of structure `index` (0-based), no double-free detection
    /// # Returns
    /// where the bitmap changed, or [None] if `index` lies outside every group
    pub fn free(&mut self, index: u32) -> Option<BitLocation> {
        let (group, bit) = self.split(index);
        let bits = self.groups.get_mut(group as usize)?;
        if bit >= bits.len() {
            return None;
        }
        bits.set(bit, false);
        Some(BitLocation { group, byte: bit / 8 })
    }

    #[inline]
    fn split(&self, index: u32) -> (u32, usize) {
        (index / self.per_group, (index % self.per_group) as usize)
    }
}
