use bincode::{Decode, Encode};

use crate::utils::traits::OnDisk;

use super::{EXT2_MAGIC, INODE_SIZE, SUPERBLOCK_SIZE};

/// bytes after `def_resgid` that this driver keeps but never interprets
const SUPERBLOCK_TAIL: usize = 940;

/// The superblock of this filesystem, stored at byte 1024 of the device
#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub struct SuperBlock {
    pub inodes_count: u32,
    pub blocks_count: u32,
    pub r_blocks_count: u32,
    /// informational, the bitmaps are authoritative
    pub free_blocks_count: u32,
    /// informational, the bitmaps are authoritative
    pub free_inodes_count: u32,
    /// block number of the block holding the superblock
    pub first_data_block: u32,
    /// block size is `1024 << log_block_size`
    pub log_block_size: u32,
    pub log_frag_size: u32,
    pub blocks_per_group: u32,
    pub frags_per_group: u32,
    pub inodes_per_group: u32,
    pub mtime: u32,
    pub wtime: u32,
    pub mnt_count: u16,
    pub max_mnt_count: u16,
    /// magic number
    pub magic: u16,
    pub state: u16,
    pub errors: u16,
    pub minor_rev_level: u16,
    pub lastcheck: u32,
    pub checkinterval: u32,
    pub creator_os: u32,
    pub rev_level: u32,
    pub def_resuid: u16,
    pub def_resgid: u16,
    pub tail: [u8; SUPERBLOCK_TAIL],
}

impl OnDisk for SuperBlock {
    const SIZE: usize = SUPERBLOCK_SIZE as usize;
}

impl SuperBlock {
    /// a revision 0 superblock for a freshly formatted volume
    pub fn new(
        blocks_count: u32,
        log_block_size: u32,
        blocks_per_group: u32,
        inodes_per_group: u32,
        groups: u32,
    ) -> Self {
        let now = crate::utils::time_util::now();
        SuperBlock {
            inodes_count: inodes_per_group * groups,
            blocks_count,
            r_blocks_count: 0,
            free_blocks_count: 0,
            free_inodes_count: 0,
            first_data_block: if log_block_size == 0 { 1 } else { 0 },
            log_block_size,
            log_frag_size: log_block_size,
            blocks_per_group,
            frags_per_group: blocks_per_group,
            inodes_per_group,
            mtime: 0,
            wtime: now,
            mnt_count: 0,
            max_mnt_count: u16::MAX,
            magic: EXT2_MAGIC,
            // cleanly unmounted
            state: 1,
            // continue on errors
            errors: 1,
            minor_rev_level: 0,
            lastcheck: now,
            checkinterval: 0,
            // linux
            creator_os: 0,
            rev_level: 0,
            def_resuid: 0,
            def_resgid: 0,
            tail: [0u8; SUPERBLOCK_TAIL],
        }
    }

    /// Returns the block size of the file system. Doesn't have
    /// to match that of the underlying device
    #[inline]
    pub fn block_size(&self) -> u32 {
        1024 << self.log_block_size
    }

    /// the number of block groups, `ceil(blocks_count / blocks_per_group)`
    #[inline]
    pub fn group_count(&self) -> u32 {
        crate::utils::fs_size_calculator::group_count(self.blocks_count, self.blocks_per_group)
    }

    pub fn has_valid_magic(&self) -> bool {
        self.magic == EXT2_MAGIC
    }

    /// stride of the inode table; revision 1 volumes record it after `def_resgid`
    pub fn inode_size(&self) -> u32 {
        match self.rev_level {
            0 => INODE_SIZE,
            _ => match u16::from_le_bytes([self.tail[4], self.tail[5]]) {
                0 => INODE_SIZE,
                size => size as u32,
            },
        }
    }

    /// `log_block_size` beyond 64 KiB blocks or an empty group means the geometry is unusable
    pub fn has_usable_geometry(&self) -> bool {
        self.log_block_size <= 6
            && self.blocks_per_group > 0
            && self.inodes_per_group > 0
            && self.blocks_count > self.first_data_block
    }
}
