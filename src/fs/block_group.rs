use bincode::{Decode, Encode};

use crate::{device::BlockDevice, fs::error::Result, utils::traits::OnDisk};

use super::GROUP_DESCRIPTOR_SIZE;

/// One entry of the block group descriptor table
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct BlockGroupDescriptor {
    /// block number of this group's block bitmap
    pub block_bitmap: u32,
    /// block number of this group's inode bitmap
    pub inode_bitmap: u32,
    /// first block of this group's inode table
    pub inode_table: u32,
    /// informational, the bitmaps are authoritative
    pub free_blocks_count: u16,
    /// informational, the bitmaps are authoritative
    pub free_inodes_count: u16,
    pub used_dirs_count: u16,
    pub pad: u16,
    pub reserved: [u8; 12],
}

impl OnDisk for BlockGroupDescriptor {
    const SIZE: usize = GROUP_DESCRIPTOR_SIZE as usize;
}

/// byte offset of the descriptor table:
/// it starts in the block right after the one holding the superblock
#[inline]
pub fn descriptor_table_offset(block_size: u32, first_data_block: u32) -> u64 {
    (first_data_block as u64 + 1) * block_size as u64
}

/// for serialize and deserialize
impl BlockGroupDescriptor {
    /// read the whole table of `group_count` descriptors
    pub fn deserialize_table(
        device: &dyn BlockDevice,
        table_offset: u64,
        group_count: u32,
    ) -> Result<Vec<BlockGroupDescriptor>> {
        let mut raw = vec![0u8; group_count as usize * Self::SIZE];
        device.read_all(table_offset, &mut raw)?;
        raw.chunks_exact(Self::SIZE).map(Self::from_bytes).collect()
    }

    /// write the descriptor of group `index` back to its slot in the table
    pub fn serialize_into(
        &self,
        device: &dyn BlockDevice,
        table_offset: u64,
        index: u32,
    ) -> Result<()> {
        self.write_at(device, table_offset + index as u64 * Self::SIZE as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::MemDevice;

    #[test]
    fn test_descriptor_table_offset() {
        assert_eq!(descriptor_table_offset(1024, 1), 2048);
        assert_eq!(descriptor_table_offset(4096, 0), 4096);
    }

    #[test]
    fn test_descriptor_layout() {
        let descriptor = BlockGroupDescriptor {
            block_bitmap: 3,
            inode_bitmap: 4,
            inode_table: 5,
            free_blocks_count: 100,
            free_inodes_count: 20,
            used_dirs_count: 1,
            ..Default::default()
        };
        let bytes = descriptor.to_bytes().unwrap();
        assert_eq!(bytes.len(), 32);
        assert_eq!(&bytes[8..12], &5u32.to_le_bytes());
        assert_eq!(&bytes[12..14], &100u16.to_le_bytes());
        assert_eq!(&bytes[16..18], &1u16.to_le_bytes());
    }

    #[test]
    fn test_descriptor_table_round_trip() {
        let device = MemDevice::new(8192);
        let offset = descriptor_table_offset(1024, 1);
        for i in 0..3u32 {
            let descriptor = BlockGroupDescriptor {
                block_bitmap: 10 * i + 1,
                inode_bitmap: 10 * i + 2,
                inode_table: 10 * i + 3,
                ..Default::default()
            };
            descriptor.serialize_into(&device, offset, i).unwrap();
        }
        let table = BlockGroupDescriptor::deserialize_table(&device, offset, 3).unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table[2].inode_table, 23);
        assert_eq!(table[1].block_bitmap, 11);
    }
}
