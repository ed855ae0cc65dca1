//! what does our filesystem look like in the memory
use std::{
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use log::{debug, info, warn};

use crate::{
    device::BlockDevice,
    utils::traits::{codec_config, OnDisk},
};

use super::{
    bitmap::{BitLocation, GroupBitmaps},
    block_group::{descriptor_table_offset, BlockGroupDescriptor},
    directory,
    error::{Ext2Error, Result},
    superblock::SuperBlock,
    FileKind, Inode, Node, POINTER_SIZE, ROOT_INODE, SUPERBLOCK_OFFSET,
};

/// it has the following layout:
/// - superblock at byte 1024
/// - block group descriptor table right after the superblock's block
/// - per group: block bitmap, inode bitmap, inode table, data blocks
///
/// The geometry is fixed at mount. Everything the allocators touch lives
/// behind one mutex and is written back as soon as it changes.
pub struct Ext2 {
    device: Arc<dyn BlockDevice>,
    block_size: u32,
    /// stride of the inode table, the record itself is always 128 bytes
    inode_size: u32,
    blocks_count: u32,
    inodes_count: u32,
    blocks_per_group: u32,
    inodes_per_group: u32,
    first_data_block: u32,
    descriptor_table: u64,
    /// first block of every group's inode table
    inode_tables: Vec<u32>,
    allocation: Mutex<Allocation>,
}

/// the mutable state of both allocators
struct Allocation {
    superblock: SuperBlock,
    descriptors: Vec<BlockGroupDescriptor>,
    block_bitmaps: GroupBitmaps,
    inode_bitmaps: GroupBitmaps,
}

/// which of a group's two bitmaps changed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BitmapKind {
    Block,
    Inode,
}

impl fmt::Debug for Ext2 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ext2")
            .field("block_size", &self.block_size)
            .field("blocks_count", &self.blocks_count)
            .field("inodes_count", &self.inodes_count)
            .field("groups", &self.inode_tables.len())
            .finish_non_exhaustive()
    }
}

impl Ext2 {
    /// mount the volume found on `device`
    /// # Params
    /// - `device`: the device holding an ext2 volume
    /// # Return
    /// the shared filesystem handle every [Node] keeps a reference to
    /// # Note
    /// a wrong magic number is only reported, the volume is mounted anyway
    pub fn mount(device: Arc<dyn BlockDevice>) -> Result<Arc<Self>> {
        let mut superblock = SuperBlock::read_at(device.as_ref(), SUPERBLOCK_OFFSET)?;
        if !superblock.has_valid_magic() {
            warn!(
                "superblock magic is {:#06x}, expected an ext2 volume",
                superblock.magic
            );
        }
        if !superblock.has_usable_geometry() {
            return Err(Ext2Error::BadGeometry(format!(
                "{} blocks, {} blocks and {} inodes per group, log block size {}",
                superblock.blocks_count,
                superblock.blocks_per_group,
                superblock.inodes_per_group,
                superblock.log_block_size
            )));
        }

        let block_size = superblock.block_size();
        let group_count = superblock.group_count();
        let descriptor_table = descriptor_table_offset(block_size, superblock.first_data_block);
        let descriptors =
            BlockGroupDescriptor::deserialize_table(device.as_ref(), descriptor_table, group_count)?;

        // both bitmaps of every group stay resident
        let mut raw_block_bitmaps = Vec::with_capacity(descriptors.len());
        let mut raw_inode_bitmaps = Vec::with_capacity(descriptors.len());
        for descriptor in descriptors.iter() {
            let mut raw = vec![0u8; block_size as usize];
            device.read_all(descriptor.block_bitmap as u64 * block_size as u64, &mut raw)?;
            raw_block_bitmaps.push(raw);
            let mut raw = vec![0u8; block_size as usize];
            device.read_all(descriptor.inode_bitmap as u64 * block_size as u64, &mut raw)?;
            raw_inode_bitmaps.push(raw);
        }
        let block_bitmaps = GroupBitmaps::new(
            raw_block_bitmaps.iter().map(Vec::as_slice),
            superblock.blocks_per_group,
        );
        let inode_bitmaps = GroupBitmaps::new(
            raw_inode_bitmaps.iter().map(Vec::as_slice),
            superblock.inodes_per_group,
        );

        superblock.mnt_count = superblock.mnt_count.wrapping_add(1);
        superblock.mtime = crate::utils::time_util::now();
        superblock.write_at(device.as_ref(), SUPERBLOCK_OFFSET)?;

        let fs = Arc::new(Ext2 {
            block_size,
            inode_size: superblock.inode_size(),
            blocks_count: superblock.blocks_count,
            inodes_count: superblock.inodes_count,
            blocks_per_group: superblock.blocks_per_group,
            inodes_per_group: superblock.inodes_per_group,
            first_data_block: superblock.first_data_block,
            descriptor_table,
            inode_tables: descriptors.iter().map(|d| d.inode_table).collect(),
            allocation: Mutex::new(Allocation {
                superblock,
                descriptors,
                block_bitmaps,
                inode_bitmaps,
            }),
            device,
        });

        let root = fs.root()?;
        if !root.is_dir() {
            warn!("root inode has type {:#06x}, not a directory", root.get_type());
        }
        info!(
            "mounted ext2 volume: {} blocks of {} bytes, {} inodes in {} groups",
            fs.blocks_count,
            fs.block_size,
            fs.inodes_count,
            fs.inode_tables.len()
        );
        Ok(fs)
    }

    /// write everything the device buffers back to its storage
    pub fn sync(&self) -> Result<()> {
        Ok(self.device.flush()?)
    }

    fn allocation(&self) -> MutexGuard<'_, Allocation> {
        self.allocation
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// geometry of this filesystem
impl Ext2 {
    #[inline]
    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    #[inline]
    pub fn inode_size(&self) -> u32 {
        self.inode_size
    }

    #[inline]
    pub fn blocks_count(&self) -> u32 {
        self.blocks_count
    }

    #[inline]
    pub fn inodes_count(&self) -> u32 {
        self.inodes_count
    }

    #[inline]
    pub fn blocks_per_group(&self) -> u32 {
        self.blocks_per_group
    }

    #[inline]
    pub fn inodes_per_group(&self) -> u32 {
        self.inodes_per_group
    }

    #[inline]
    pub fn group_count(&self) -> u32 {
        self.inode_tables.len() as u32
    }

    #[inline]
    pub fn device(&self) -> &Arc<dyn BlockDevice> {
        &self.device
    }

    /// a copy of the superblock as last written
    pub fn superblock(&self) -> SuperBlock {
        self.allocation().superblock.clone()
    }

    /// a copy of the group descriptor table as last written
    pub fn descriptors(&self) -> Vec<BlockGroupDescriptor> {
        self.allocation().descriptors.clone()
    }

    /// free blocks according to the bitmaps
    pub fn free_blocks(&self) -> u32 {
        let allocation = self.allocation();
        (0..self.group_count())
            .map(|g| allocation.block_bitmaps.free_in_group(g))
            .sum()
    }

    /// free inodes according to the bitmaps
    pub fn free_inodes(&self) -> u32 {
        let allocation = self.allocation();
        (0..self.group_count())
            .map(|g| allocation.inode_bitmaps.free_in_group(g))
            .sum()
    }
}

/// [Inode] table operations
impl Ext2 {
    /// byte offset of inode `number` in its group's inode table
    pub fn inode_offset(&self, number: u32) -> Result<u64> {
        if number == 0 || number > self.inodes_count {
            return Err(Ext2Error::InvalidInode(number));
        }
        let group = (number - 1) / self.inodes_per_group;
        let index = (number - 1) % self.inodes_per_group;
        let table = self
            .inode_tables
            .get(group as usize)
            .ok_or(Ext2Error::InvalidInode(number))?;
        Ok(*table as u64 * self.block_size as u64 + index as u64 * self.inode_size as u64)
    }

    pub fn read_inode(&self, number: u32) -> Result<Inode> {
        Inode::read_at(self.device.as_ref(), self.inode_offset(number)?)
    }

    pub fn write_inode(&self, number: u32, inode: &Inode) -> Result<()> {
        inode.write_at(self.device.as_ref(), self.inode_offset(number)?)
    }

    /// write a fresh record of `kind` over inode `number`
    pub fn create_inode(&self, kind: FileKind, number: u32) -> Result<Inode> {
        let inode = Inode::new(kind);
        self.write_inode(number, &inode)?;
        Ok(inode)
    }
}

/// data block access
impl Ext2 {
    fn block_offset(&self, block: u32, within: usize, len: usize) -> Result<u64> {
        if block == 0 || block >= self.blocks_count || within + len > self.block_size as usize {
            return Err(Ext2Error::InvalidBlock(block));
        }
        Ok(block as u64 * self.block_size as u64 + within as u64)
    }

    /// read `buf.len()` bytes of `block`, starting `within` bytes into it
    pub fn read_block(&self, block: u32, within: usize, buf: &mut [u8]) -> Result<()> {
        let offset = self.block_offset(block, within, buf.len())?;
        Ok(self.device.read_all(offset, buf)?)
    }

    pub fn write_block(&self, block: u32, within: usize, data: &[u8]) -> Result<()> {
        let offset = self.block_offset(block, within, data.len())?;
        Ok(self.device.write_all(offset, data)?)
    }

    pub fn zero_block(&self, block: u32) -> Result<()> {
        self.write_block(block, 0, &vec![0u8; self.block_size as usize])
    }

    /// entry `index` of the pointer table in `table`
    pub fn read_pointer(&self, table: u32, index: usize) -> Result<u32> {
        let mut raw = [0u8; POINTER_SIZE];
        self.read_block(table, index * POINTER_SIZE, &mut raw)?;
        let (pointer, _) = bincode::decode_from_slice(&raw, codec_config())?;
        Ok(pointer)
    }

    pub fn write_pointer(&self, table: u32, index: usize, block: u32) -> Result<()> {
        let mut raw = [0u8; POINTER_SIZE];
        bincode::encode_into_slice(block, &mut raw, codec_config())?;
        self.write_block(table, index * POINTER_SIZE, &raw)
    }

    /// every nonzero entry of the pointer table in `table`
    pub fn read_pointers(&self, table: u32) -> Result<Vec<u32>> {
        let mut raw = vec![0u8; self.block_size as usize];
        self.read_block(table, 0, &mut raw)?;
        let mut pointers = Vec::new();
        for entry in raw.chunks_exact(POINTER_SIZE) {
            let (pointer, _): (u32, usize) = bincode::decode_from_slice(entry, codec_config())?;
            if pointer != 0 {
                pointers.push(pointer);
            }
        }
        Ok(pointers)
    }
}

/// allocators
impl Ext2 {
    /// allocate the first free block
    /// # Return
    /// the block number, or [None] if the volume is full
    pub fn find_available_block(&self) -> Result<Option<u32>> {
        let mut allocation = self.allocation();
        let Some((block, location)) = allocation.block_bitmaps.find_first(self.first_data_block)
        else {
            return Ok(None);
        };
        if block >= self.blocks_count {
            return Ok(None);
        }
        let descriptor = &mut allocation.descriptors[location.group as usize];
        descriptor.free_blocks_count = descriptor.free_blocks_count.saturating_sub(1);
        allocation.superblock.free_blocks_count =
            allocation.superblock.free_blocks_count.saturating_sub(1);
        self.persist(&allocation, BitmapKind::Block, location)?;
        debug!("allocated block {block}");
        Ok(Some(block))
    }

    /// allocate the first free inode number
    /// # Return
    /// the inode number, or [None] if every inode is in use
    pub fn find_available_inode(&self) -> Result<Option<u32>> {
        let mut allocation = self.allocation();
        let Some((number, location)) = allocation.inode_bitmaps.find_first(1) else {
            return Ok(None);
        };
        if number > self.inodes_count {
            return Ok(None);
        }
        let descriptor = &mut allocation.descriptors[location.group as usize];
        descriptor.free_inodes_count = descriptor.free_inodes_count.saturating_sub(1);
        allocation.superblock.free_inodes_count =
            allocation.superblock.free_inodes_count.saturating_sub(1);
        self.persist(&allocation, BitmapKind::Inode, location)?;
        debug!("allocated inode {number}");
        Ok(Some(number))
    }

    /// give `block` back, freeing an already free block goes unnoticed
    pub fn free_block(&self, block: u32) -> Result<()> {
        if block < self.first_data_block || block >= self.blocks_count {
            return Err(Ext2Error::InvalidBlock(block));
        }
        let mut allocation = self.allocation();
        let location = allocation
            .block_bitmaps
            .free(block - self.first_data_block)
            .ok_or(Ext2Error::InvalidBlock(block))?;
        let descriptor = &mut allocation.descriptors[location.group as usize];
        descriptor.free_blocks_count = descriptor.free_blocks_count.saturating_add(1);
        allocation.superblock.free_blocks_count += 1;
        self.persist(&allocation, BitmapKind::Block, location)?;
        debug!("freed block {block}");
        Ok(())
    }

    /// give inode `number` back
    pub fn free_inode(&self, number: u32) -> Result<()> {
        if number == 0 || number > self.inodes_count {
            return Err(Ext2Error::InvalidInode(number));
        }
        let mut allocation = self.allocation();
        let location = allocation
            .inode_bitmaps
            .free(number - 1)
            .ok_or(Ext2Error::InvalidInode(number))?;
        let descriptor = &mut allocation.descriptors[location.group as usize];
        descriptor.free_inodes_count = descriptor.free_inodes_count.saturating_add(1);
        allocation.superblock.free_inodes_count += 1;
        self.persist(&allocation, BitmapKind::Inode, location)?;
        debug!("freed inode {number}");
        Ok(())
    }

    /// account a directory created (`delta > 0`) or removed in the group of inode `number`
    pub(crate) fn count_directory(&self, number: u32, delta: i16) -> Result<()> {
        let group = (number - 1) / self.inodes_per_group;
        let mut allocation = self.allocation();
        let descriptor = allocation
            .descriptors
            .get_mut(group as usize)
            .ok_or(Ext2Error::InvalidInode(number))?;
        descriptor.used_dirs_count = descriptor.used_dirs_count.saturating_add_signed(delta);
        descriptor.serialize_into(self.device.as_ref(), self.descriptor_table, group)
    }

    /// write back the changed bitmap byte, its group descriptor and the superblock
    fn persist(&self, allocation: &Allocation, kind: BitmapKind, location: BitLocation) -> Result<()> {
        let BitLocation { group, byte } = location;
        let descriptor = &allocation.descriptors[group as usize];
        let (bitmaps, bitmap_block) = match kind {
            BitmapKind::Block => (&allocation.block_bitmaps, descriptor.block_bitmap),
            BitmapKind::Inode => (&allocation.inode_bitmaps, descriptor.inode_bitmap),
        };
        let value = bitmaps.raw_group(group)[byte];
        self.device.write_all(
            bitmap_block as u64 * self.block_size as u64 + byte as u64,
            &[value],
        )?;
        descriptor.serialize_into(self.device.as_ref(), self.descriptor_table, group)?;
        allocation
            .superblock
            .write_at(self.device.as_ref(), SUPERBLOCK_OFFSET)
    }
}

/// [Node] operations
impl Ext2 {
    /// a fresh handle on inode `number`, read from the inode table.
    /// Two handles on the same inode are independent snapshots
    pub fn get_node(self: &Arc<Self>, number: u32) -> Result<Node> {
        let inode = self.read_inode(number)?;
        Ok(Node::new(number, inode, Arc::clone(self)))
    }

    pub fn root(self: &Arc<Self>) -> Result<Node> {
        self.get_node(ROOT_INODE)
    }

    /// create `name` of `kind` inside `dir`
    /// # Return
    /// `false` if no inode or no block is left for it
    pub fn create_node(self: &Arc<Self>, dir: &mut Node, name: &str, kind: FileKind) -> Result<bool> {
        Ok(self.create_child(dir, name, kind)?.is_some())
    }

    /// create a symbolic link `name` inside `dir` pointing at `target`
    pub fn create_symlink(self: &Arc<Self>, dir: &mut Node, name: &str, target: &str) -> Result<bool> {
        let Some(mut link) = self.create_child(dir, name, FileKind::SymbolicLink)? else {
            return Ok(false);
        };
        if !link.set_symbol(target.as_bytes())? {
            warn!("no space left for the target of symlink {name:?}");
            link.delete_node(dir)?;
            return Ok(false);
        }
        Ok(true)
    }

    /// create `name` and hand back the new node
    pub fn create_child(
        self: &Arc<Self>,
        dir: &mut Node,
        name: &str,
        kind: FileKind,
    ) -> Result<Option<Node>> {
        if kind == FileKind::Unknown {
            return Err(Ext2Error::UnknownKind);
        }
        directory::validate_name(name)?;
        if dir.find(name)?.is_some() {
            return Err(Ext2Error::AlreadyExists);
        }
        let Some(number) = self.find_available_inode()? else {
            warn!("no free inode left for {name:?}");
            return Ok(None);
        };
        let mut node = Node::new(number, self.create_inode(kind, number)?, Arc::clone(self));
        let ready = kind != FileKind::Directory || node.init_directory(dir.number())?;
        if !ready || !dir.append_entry(name, number, kind)? {
            warn!("no free block left to link {name:?} into directory {}", dir.number());
            node.discard()?;
            return Ok(None);
        }
        if kind == FileKind::Directory {
            dir.inode_mut().links_count += 1;
            dir.flush()?;
            self.count_directory(number, 1)?;
        }
        debug!("created {kind:?} {name:?} as inode {number} in {}", dir.number());
        Ok(Some(node))
    }

    /// Resolve `path` starting at `start`, one component at a time.
    /// Empty components are skipped, so an empty path resolves to `start`
    /// # Return
    /// [None] if some component does not exist
    pub fn find(self: &Arc<Self>, start: &Node, path: &str) -> Result<Option<Node>> {
        let mut current = start.clone();
        for component in path.split('/').filter(|c| !c.is_empty()) {
            match current.find(component)? {
                Some(number) => current = self.get_node(number)?,
                None => return Ok(None),
            }
        }
        Ok(Some(current))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        device::MemDevice,
        fs::{FIRST_INODE, INODE_SIZE},
        mkfs::{mkfs, MkfsOptions},
        utils::init_test_environment::{init_test_environment, init_test_logger},
    };

    #[test]
    fn test_mount_geometry() {
        let fs = init_test_environment(1024, 8192);
        assert_eq!(fs.block_size(), 1024);
        assert_eq!(fs.group_count(), 1);
        assert_eq!(fs.blocks_per_group(), 8192);
        assert_eq!(fs.inode_size(), INODE_SIZE);
        let superblock = fs.superblock();
        assert_eq!(superblock.first_data_block, 1);
        assert_eq!(superblock.mnt_count, 1);
        let root = fs.root().unwrap();
        assert!(root.is_dir());
        assert_eq!(root.n_links(), 2);
    }

    #[test]
    fn test_inode_offset() {
        let fs = init_test_environment(1024, 8192 * 2);
        let descriptors = fs.descriptors();
        let per_group = fs.inodes_per_group;
        let table_0 = descriptors[0].inode_table as u64 * 1024;
        let table_1 = descriptors[1].inode_table as u64 * 1024;
        assert_eq!(fs.inode_offset(1).unwrap(), table_0);
        assert_eq!(fs.inode_offset(2).unwrap(), table_0 + 128);
        assert_eq!(
            fs.inode_offset(per_group).unwrap(),
            table_0 + (per_group as u64 - 1) * 128
        );
        assert_eq!(fs.inode_offset(per_group + 1).unwrap(), table_1);
        assert!(matches!(fs.inode_offset(0), Err(Ext2Error::InvalidInode(0))));
        let past_end = fs.inodes_count() + 1;
        assert!(fs.inode_offset(past_end).is_err());
    }

    #[test]
    fn test_allocation_is_persisted() {
        let fs = init_test_environment(1024, 8192);
        let free_before = fs.superblock().free_blocks_count;
        let block = fs.find_available_block().unwrap().unwrap();
        let inode = fs.find_available_inode().unwrap().unwrap();
        assert_eq!(inode, FIRST_INODE);
        assert_eq!(fs.superblock().free_blocks_count, free_before - 1);

        let remounted = Ext2::mount(Arc::clone(fs.device())).unwrap();
        assert_eq!(remounted.superblock().free_blocks_count, free_before - 1);
        assert_eq!(
            remounted.descriptors()[0].free_blocks_count,
            fs.descriptors()[0].free_blocks_count
        );
        // the bitmaps came back from disk, so the next numbers move on
        assert!(remounted.find_available_block().unwrap().unwrap() > block);
        assert!(remounted.find_available_inode().unwrap().unwrap() > inode);
    }

    #[test]
    fn test_free_then_allocate_is_reused() {
        let fs = init_test_environment(1024, 8192);
        let first = fs.find_available_block().unwrap().unwrap();
        let second = fs.find_available_block().unwrap().unwrap();
        assert_ne!(first, second);
        fs.free_block(first).unwrap();
        assert_eq!(fs.find_available_block().unwrap(), Some(first));

        let inode = fs.find_available_inode().unwrap().unwrap();
        fs.free_inode(inode).unwrap();
        assert_eq!(fs.find_available_inode().unwrap(), Some(inode));

        assert!(matches!(fs.free_block(0), Err(Ext2Error::InvalidBlock(0))));
        assert!(fs.free_inode(0).is_err());
    }

    #[test]
    fn test_block_exhaustion_returns_none() {
        let fs = init_test_environment(1024, 300);
        let mut seen = std::collections::HashSet::new();
        while let Some(block) = fs.find_available_block().unwrap() {
            assert!(block < 300);
            assert!(seen.insert(block));
        }
        assert_eq!(fs.free_blocks(), 0);
        assert_eq!(fs.find_available_block().unwrap(), None);
    }

    #[test]
    fn test_create_node_and_find() {
        let fs = init_test_environment(1024, 8192);
        let mut root = fs.root().unwrap();
        let count = root.entry_count().unwrap();
        assert!(fs.create_node(&mut root, "a", FileKind::RegularFile).unwrap());
        assert_eq!(root.entry_count().unwrap(), count + 1);
        let number = root.find("a").unwrap().unwrap();
        let node = fs.find(&root, "a").unwrap().unwrap();
        assert_eq!(node.number(), number);
        assert!(node.is_file());
        assert_eq!(node.n_links(), 1);

        assert!(matches!(
            fs.create_node(&mut root, "a", FileKind::Directory),
            Err(Ext2Error::AlreadyExists)
        ));
        assert!(matches!(
            fs.create_node(&mut root, "a/b", FileKind::RegularFile),
            Err(Ext2Error::InvalidName)
        ));
    }

    #[test]
    fn test_unknown_kind_is_refused() {
        let fs = init_test_environment(1024, 8192);
        let mut root = fs.root().unwrap();
        let free_inodes = fs.free_inodes();
        let count = root.entry_count().unwrap();
        assert!(matches!(
            fs.create_node(&mut root, "odd", FileKind::Unknown),
            Err(Ext2Error::UnknownKind)
        ));
        assert_eq!(fs.free_inodes(), free_inodes);
        assert_eq!(root.entry_count().unwrap(), count);
    }

    #[test]
    fn test_pointer_table() {
        let fs = init_test_environment(1024, 8192);
        let table = fs.find_available_block().unwrap().unwrap();
        fs.zero_block(table).unwrap();
        fs.write_pointer(table, 0, 0x0102_0304).unwrap();
        fs.write_pointer(table, 255, 77).unwrap();
        assert_eq!(fs.read_pointer(table, 0).unwrap(), 0x0102_0304);
        assert_eq!(fs.read_pointer(table, 1).unwrap(), 0);
        assert_eq!(fs.read_pointers(table).unwrap(), vec![0x0102_0304, 77]);

        let mut raw = [0u8; 4];
        fs.read_block(table, 0, &mut raw).unwrap();
        assert_eq!(raw, [4, 3, 2, 1]);
    }

    // a new directory holds exactly "." and ".."
    #[test]
    fn test_new_directory_entries() {
        let fs = init_test_environment(1024, 8192);
        let mut root = fs.root().unwrap();
        assert!(fs.create_node(&mut root, "dir", FileKind::Directory).unwrap());
        let dir = fs.find(&root, "/dir").unwrap().unwrap();
        assert!(dir.is_dir());
        assert_eq!(dir.n_links(), 2);
        assert_eq!(dir.get_entry_names().unwrap(), vec![".", ".."]);
        assert_eq!(dir.find(".").unwrap(), Some(dir.number()));
        assert_eq!(dir.find("..").unwrap(), Some(root.number()));
        assert_eq!(root.n_links(), 3);
        assert_eq!(fs.descriptors()[0].used_dirs_count, 2);
    }

    #[test]
    fn test_find_paths() {
        let fs = init_test_environment(1024, 8192);
        let mut root = fs.root().unwrap();
        fs.create_node(&mut root, "usr", FileKind::Directory).unwrap();
        let mut usr = fs.find(&root, "usr").unwrap().unwrap();
        fs.create_node(&mut usr, "lib", FileKind::Directory).unwrap();
        let mut lib = fs.find(&usr, "lib").unwrap().unwrap();
        fs.create_node(&mut lib, "libc.so", FileKind::RegularFile).unwrap();

        let file = fs.find(&root, "/usr//lib/libc.so").unwrap().unwrap();
        assert!(file.is_file());
        let back = fs.find(&root, "usr/lib/../..").unwrap().unwrap();
        assert_eq!(back.number(), ROOT_INODE);
        assert_eq!(fs.find(&usr, "").unwrap().unwrap().number(), usr.number());
        assert!(fs.find(&root, "usr/missing/x").unwrap().is_none());
        assert!(matches!(
            fs.find(&root, "usr/lib/libc.so/x"),
            Err(Ext2Error::NotADirectory(_))
        ));
    }

    #[test]
    fn test_inode_exhaustion() {
        init_test_logger();
        let device = Arc::new(MemDevice::new(1024 * 1024));
        let options = MkfsOptions {
            block_size: 1024,
            blocks_count: 1024,
            inodes_per_group: 16,
        };
        mkfs(&*device, &options).unwrap();
        let fs = Ext2::mount(device).unwrap();
        let mut root = fs.root().unwrap();
        // inodes 11..=16 are free
        for i in 0..6 {
            assert!(fs
                .create_node(&mut root, &format!("f{i}"), FileKind::RegularFile)
                .unwrap());
        }
        assert!(!fs.create_node(&mut root, "one-too-many", FileKind::RegularFile).unwrap());
        assert!(root.find("one-too-many").unwrap().is_none());
    }

    #[test]
    fn test_bad_magic_still_mounts() {
        init_test_logger();
        let device = Arc::new(MemDevice::new(1024 * 1024));
        mkfs(&*device, &MkfsOptions::default_for(1024, 1024)).unwrap();
        device.write_all(SUPERBLOCK_OFFSET + 56, &[0, 0]).unwrap();
        let fs = Ext2::mount(device).unwrap();
        assert!(!fs.superblock().has_valid_magic());
        assert!(fs.root().unwrap().is_dir());
    }

    #[test]
    fn test_zeroed_device_is_rejected() {
        init_test_logger();
        let device = Arc::new(MemDevice::new(64 * 1024));
        assert!(matches!(Ext2::mount(device), Err(Ext2Error::BadGeometry(_))));
    }

    #[test]
    fn test_four_kib_blocks() {
        let fs = init_test_environment(4096, 2048);
        assert_eq!(fs.superblock().first_data_block, 0);
        let mut root = fs.root().unwrap();
        assert!(fs.create_node(&mut root, "big", FileKind::RegularFile).unwrap());
        let mut big = fs.find(&root, "big").unwrap().unwrap();
        let data = vec![0x5a; 4096 * 3 + 17];
        assert_eq!(big.write_all(0, &data).unwrap(), data.len());
        let big = fs.get_node(big.number()).unwrap();
        let mut read_back = vec![0u8; data.len()];
        assert_eq!(big.read_all(0, &mut read_back).unwrap(), data.len());
        assert_eq!(read_back, data);
    }
}
