use bincode::{Decode, Encode};

use crate::utils::{self, traits::OnDisk};

use super::{
    filekind::{FileKind, MODE_TYPE_MASK},
    BLOCK_POINTERS, DIRECT_POINTERS, FAST_SYMLINK_MAX_LEN, INDIRECT_POINTER, INODE_SIZE,
    POINTER_SIZE,
};

/// The 128-byte inode record as stored in the inode table
#[derive(Debug, Clone, Default, PartialEq, Eq, Encode, Decode)]
pub struct Inode {
    /// type nibble and permission bits
    pub mode: u16,
    pub uid: u16,
    /// size in bytes
    pub size: u32,
    pub atime: u32,
    pub ctime: u32,
    pub mtime: u32,
    pub dtime: u32,
    pub gid: u16,
    pub links_count: u16,
    /// allocated space in 512-byte sectors
    pub blocks: u32,
    pub flags: u32,
    pub osd1: u32,
    /// 12 direct pointers, then single, double and triple indirect
    pub block: [u32; BLOCK_POINTERS],
    pub generation: u32,
    pub file_acl: u32,
    pub dir_acl: u32,
    pub faddr: u32,
    pub osd2: [u8; 12],
}

impl OnDisk for Inode {
    const SIZE: usize = INODE_SIZE as usize;
}

impl Inode {
    /// a fresh record: type tag, default permissions, one link, no blocks
    pub fn new(file_kind: FileKind) -> Self {
        let now = utils::time_util::now();
        Inode {
            mode: file_kind.mode_tag() | file_kind.default_permissions(),
            links_count: 1,
            atime: now,
            ctime: now,
            mtime: now,
            ..Inode::default()
        }
    }
}

/// This block is about file metadata operations
impl Inode {
    /// the type nibble of the mode field
    #[inline]
    pub fn type_tag(&self) -> u16 {
        self.mode & MODE_TYPE_MASK
    }

    #[inline]
    pub fn file_kind(&self) -> FileKind {
        FileKind::from_mode(self.mode)
    }

    /// symlinks short enough keep their target inside the block-pointer array
    #[inline]
    pub fn is_fast_symlink(&self) -> bool {
        self.file_kind() == FileKind::SymbolicLink && self.size as usize <= FAST_SYMLINK_MAX_LEN
    }

    pub fn update_modified_at(&mut self) {
        let now = utils::time_util::now();
        self.ctime = now;
        self.mtime = now;
    }

    /// mark the record as deleted
    pub fn mark_deleted(&mut self) {
        self.links_count = 0;
        self.dtime = utils::time_util::now();
    }
}

/// This block is about the block-pointer array
impl Inode {
    /// the nonzero direct pointers
    pub fn direct_blocks(&self) -> impl Iterator<Item = u32> + '_ {
        self.block[..DIRECT_POINTERS].iter().copied().filter(|b| *b != 0)
    }

    #[inline]
    pub fn indirect_block(&self) -> u32 {
        self.block[INDIRECT_POINTER]
    }

    /// whether the double or triple indirect pointers are in use
    pub fn uses_deep_indirection(&self) -> bool {
        self.block[INDIRECT_POINTER + 1..].iter().any(|b| *b != 0)
    }

    /// the block-pointer array viewed as the raw bytes a fast symlink lives in
    pub fn inline_data(&self) -> [u8; FAST_SYMLINK_MAX_LEN] {
        let mut raw = [0u8; FAST_SYMLINK_MAX_LEN];
        for (chunk, pointer) in raw.chunks_exact_mut(4).zip(self.block.iter()) {
            chunk.copy_from_slice(&pointer.to_le_bytes());
        }
        raw
    }

    /// store up to [FAST_SYMLINK_MAX_LEN] bytes inside the block-pointer array
    pub fn set_inline_data(&mut self, data: &[u8]) {
        let mut raw = [0u8; FAST_SYMLINK_MAX_LEN];
        let len = data.len().min(FAST_SYMLINK_MAX_LEN);
        raw[..len].copy_from_slice(&data[..len]);
        for (pointer, chunk) in self.block.iter_mut().zip(raw.chunks_exact(4)) {
            *pointer = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
    }

    /// account one more block of `block_size` bytes in the sector count
    pub fn add_allocated_block(&mut self, block_size: u32) {
        self.blocks += block_size / 512;
    }
}

/// Represents how a logical block of a node is located through
/// its block-pointer array
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockLocation {
    /// straight through `block[index]`
    Direct(usize),
    /// entry `index` of the pointer table at `block[12]`
    Indirect(usize),
    /// needs double or triple indirection, which this driver does not follow
    Unsupported(u64),
}

impl BlockLocation {
    /// locate logical block `index` of a node on a volume with `block_size` blocks
    pub fn of(index: u64, block_size: u32) -> Self {
        let pointers_per_block = (block_size as usize / POINTER_SIZE) as u64;
        if index < DIRECT_POINTERS as u64 {
            BlockLocation::Direct(index as usize)
        } else if index < DIRECT_POINTERS as u64 + pointers_per_block {
            BlockLocation::Indirect((index - DIRECT_POINTERS as u64) as usize)
        } else {
            BlockLocation::Unsupported(index)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inode_layout() {
        let mut inode = Inode::new(FileKind::RegularFile);
        inode.size = 11;
        inode.links_count = 3;
        inode.block[0] = 0x1234;
        inode.block[12] = 99;
        let bytes = inode.to_bytes().unwrap();
        assert_eq!(bytes.len(), 128);
        assert_eq!(&bytes[0..2], &0x81a4u16.to_le_bytes());
        assert_eq!(&bytes[4..8], &11u32.to_le_bytes());
        assert_eq!(&bytes[26..28], &3u16.to_le_bytes());
        assert_eq!(&bytes[40..44], &0x1234u32.to_le_bytes());
        assert_eq!(&bytes[88..92], &99u32.to_le_bytes());
        assert_eq!(Inode::from_bytes(&bytes).unwrap(), inode);
    }

    #[test]
    fn test_new_inode() {
        let inode = Inode::new(FileKind::Directory);
        assert_eq!(inode.type_tag(), 0x4000);
        assert_eq!(inode.file_kind(), FileKind::Directory);
        assert_eq!(inode.links_count, 1);
        assert_eq!(inode.size, 0);
        assert!(inode.block.iter().all(|b| *b == 0));
    }

    #[test]
    fn test_block_location() {
        assert_eq!(BlockLocation::of(0, 1024), BlockLocation::Direct(0));
        assert_eq!(BlockLocation::of(11, 1024), BlockLocation::Direct(11));
        assert_eq!(BlockLocation::of(12, 1024), BlockLocation::Indirect(0));
        assert_eq!(BlockLocation::of(12 + 255, 1024), BlockLocation::Indirect(255));
        assert_eq!(BlockLocation::of(12 + 256, 1024), BlockLocation::Unsupported(268));
        assert_eq!(BlockLocation::of(12 + 1023, 4096), BlockLocation::Indirect(1023));
    }

    #[test]
    fn test_inline_data() {
        let mut inode = Inode::new(FileKind::SymbolicLink);
        let target = b"/usr/lib/some/where/far/away";
        inode.set_inline_data(target);
        inode.size = target.len() as u32;
        assert!(inode.is_fast_symlink());
        assert_eq!(&inode.inline_data()[..target.len()], &target[..]);
        assert_eq!(inode.block[0], u32::from_le_bytes(*b"/usr"));

        inode.size = 61;
        assert!(!inode.is_fast_symlink());
    }

    #[test]
    fn test_deep_indirection() {
        let mut inode = Inode::new(FileKind::RegularFile);
        inode.block[12] = 7;
        assert!(!inode.uses_deep_indirection());
        inode.block[13] = 8;
        assert!(inode.uses_deep_indirection());
    }
}
