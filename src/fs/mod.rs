//! an ext2 filesystem living on a [BlockDevice](crate::device::BlockDevice)
pub mod bitmap;
pub mod block_group;
pub mod directory;
pub mod error;
pub mod filekind;
pub mod fs_layout;
pub mod inode;
pub mod node;
pub mod superblock;
pub use bitmap::*;
pub use block_group::*;
pub use directory::*;
pub use error::*;
pub use filekind::*;
pub use fs_layout::*;
pub use inode::*;
pub use node::*;
pub use superblock::*;

pub const EXT2_MAGIC: u16 = 0xef53;
/// byte offset of the superblock, whatever the block size
pub const SUPERBLOCK_OFFSET: u64 = 1024;
pub const SUPERBLOCK_SIZE: u32 = 1024;
pub const ROOT_INODE: u32 = 2;
/// first inode number handed out to users, the ones below are reserved
pub const FIRST_INODE: u32 = 11;
pub const INODE_SIZE: u32 = 128;
pub const GROUP_DESCRIPTOR_SIZE: u32 = 32;
pub const DIRECT_POINTERS: usize = 12;
/// index of the singly-indirect pointer in the block-pointer array
pub const INDIRECT_POINTER: usize = 12;
pub const BLOCK_POINTERS: usize = 15;
/// bytes of one entry in a pointer table
pub const POINTER_SIZE: usize = 4;
/// symlink targets up to this length are stored inside the block-pointer array
pub const FAST_SYMLINK_MAX_LEN: usize = BLOCK_POINTERS * 4;
pub const MAX_NAME_LEN: usize = 255;
