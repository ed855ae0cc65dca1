//! This module contains functions to calculate the size of different fs components

use crate::fs::{GROUP_DESCRIPTOR_SIZE, INODE_SIZE};

/// calculate needed bitmap size in bytes
/// # Arguments
/// - `element_count`: the number of tracked blocks or inodes
/// # Example
/// ```
/// use ext2fs::utils::fs_size_calculator::bitmap_size;
/// assert_eq!(bitmap_size(100), 13);
/// ```
pub const fn bitmap_size(element_count: u32) -> u64 {
    element_count.div_ceil(8) as u64
}

/// calculate how many blocks one group's inode table occupies
/// # Example
/// ```
/// use ext2fs::utils::fs_size_calculator::inode_table_blocks;
/// assert_eq!(inode_table_blocks(1024, 2048), 256);
/// assert_eq!(inode_table_blocks(1024, 100), 13);
/// ```
pub const fn inode_table_blocks(block_size: u32, inodes_per_group: u32) -> u32 {
    (inodes_per_group * INODE_SIZE).div_ceil(block_size)
}

/// calculate how many blocks the group descriptor table occupies
/// # Example
/// ```
/// use ext2fs::utils::fs_size_calculator::descriptor_table_blocks;
/// assert_eq!(descriptor_table_blocks(1024, 1), 1);
/// assert_eq!(descriptor_table_blocks(1024, 33), 2);
/// ```
pub const fn descriptor_table_blocks(block_size: u32, groups: u32) -> u32 {
    (groups * GROUP_DESCRIPTOR_SIZE).div_ceil(block_size)
}

/// number of block groups needed to cover `blocks_count` blocks
/// # Example
/// ```
/// use ext2fs::utils::fs_size_calculator::group_count;
/// assert_eq!(group_count(8192, 8192), 1);
/// assert_eq!(group_count(8193, 8192), 2);
/// ```
pub const fn group_count(blocks_count: u32, blocks_per_group: u32) -> u32 {
    blocks_count.div_ceil(blocks_per_group)
}

/// the metadata blocks at the start of a group:
/// block bitmap, inode bitmap and inode table
pub const fn group_metadata_blocks(block_size: u32, inodes_per_group: u32) -> u32 {
    2 + inode_table_blocks(block_size, inodes_per_group)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inode_table_blocks() {
        assert_eq!(inode_table_blocks(1024, 2048), 256);
        assert_eq!(inode_table_blocks(4096, 2048), 64);
        assert_eq!(inode_table_blocks(1024, 100), 13);
        assert_eq!(group_metadata_blocks(1024, 2048), 258);
    }
}
