//! create our filesystem
use std::{fs::OpenOptions, path::Path};

use anyhow::anyhow;
use bitvec::prelude::*;
use byte_unit::Byte;
use log::info;

use crate::{
    device::{BlockDevice, MmapDevice},
    fs::{
        directory, BlockGroupDescriptor, Ext2Error, FileKind, Inode, Result, SuperBlock,
        FIRST_INODE, INODE_SIZE, ROOT_INODE, SUPERBLOCK_OFFSET,
    },
    utils::{fs_size_calculator, traits::OnDisk},
};

/// parameters of a new volume
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MkfsOptions {
    /// 1024, 2048 or 4096
    pub block_size: u32,
    /// total blocks of the volume, a trailing group too small to be useful is dropped
    pub blocks_count: u32,
    /// a multiple of 8, at most `8 * block_size`
    pub inodes_per_group: u32,
}

impl MkfsOptions {
    /// one inode for every four blocks of a group
    pub fn default_for(block_size: u32, blocks_count: u32) -> Self {
        let group_blocks = blocks_count.min(8 * block_size);
        MkfsOptions {
            block_size,
            blocks_count,
            inodes_per_group: (group_blocks / 4).div_ceil(8).max(2) * 8,
        }
    }
}

impl Default for MkfsOptions {
    fn default() -> Self {
        MkfsOptions::default_for(1024, 8192)
    }
}

/// where everything of one group goes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct GroupLayout {
    /// first block covered by the group's bitmap
    start: u32,
    /// blocks covered, only the last group may have fewer than `blocks_per_group`
    blocks: u32,
    block_bitmap: u32,
    inode_bitmap: u32,
    inode_table: u32,
    /// first block after the group's metadata
    first_free: u32,
}

/// the geometry derived from [MkfsOptions]
#[derive(Debug, Clone, PartialEq, Eq)]
struct VolumeLayout {
    log_block_size: u32,
    blocks_count: u32,
    first_data_block: u32,
    groups: Vec<GroupLayout>,
}

fn bad_geometry(reason: impl Into<String>) -> Ext2Error {
    Ext2Error::BadGeometry(reason.into())
}

impl MkfsOptions {
    fn layout(&self) -> Result<VolumeLayout> {
        let block_size = self.block_size;
        if !matches!(block_size, 1024 | 2048 | 4096) {
            return Err(bad_geometry(format!("block size {block_size} is not 1024, 2048 or 4096")));
        }
        let blocks_per_group = 8 * block_size;
        let ipg = self.inodes_per_group;
        if ipg == 0 || ipg % 8 != 0 || ipg > blocks_per_group {
            return Err(bad_geometry(format!(
                "{ipg} inodes per group is not a multiple of 8 between 8 and {blocks_per_group}"
            )));
        }
        let log_block_size = (block_size / 1024).trailing_zeros();
        let first_data_block = u32::from(block_size == 1024);
        let metadata = fs_size_calculator::group_metadata_blocks(block_size, ipg);

        let mut blocks_count = self.blocks_count;
        let mut group_count = fs_size_calculator::group_count(blocks_count, blocks_per_group);
        if group_count == 0 {
            return Err(bad_geometry("the volume has no blocks"));
        }
        let last_start = first_data_block + (group_count - 1) * blocks_per_group;
        if group_count > 1 && blocks_count <= last_start + metadata {
            // not even one data block would be left in the trailing group
            group_count -= 1;
            blocks_count = group_count * blocks_per_group;
        }

        let descriptor_blocks = fs_size_calculator::descriptor_table_blocks(block_size, group_count);
        let groups: Vec<GroupLayout> = (0..group_count)
            .map(|g| {
                let start = first_data_block + g * blocks_per_group;
                // group 0 starts with the superblock and the descriptor table
                let block_bitmap = match g {
                    0 => start + 1 + descriptor_blocks,
                    _ => start,
                };
                GroupLayout {
                    start,
                    blocks: (blocks_count - start).min(blocks_per_group),
                    block_bitmap,
                    inode_bitmap: block_bitmap + 1,
                    inode_table: block_bitmap + 2,
                    first_free: block_bitmap + metadata,
                }
            })
            .collect();

        // the first group also holds the root directory's block
        if groups[0].first_free >= groups[0].start + groups[0].blocks {
            return Err(bad_geometry(format!(
                "{blocks_count} blocks cannot hold the metadata of the first group"
            )));
        }
        Ok(VolumeLayout {
            log_block_size,
            blocks_count,
            first_data_block,
            groups,
        })
    }
}

/// create a new filesystem on `device`
/// # Params
/// - `device`: the device to format, its old content is lost
/// - `options`: block size, volume size and inode density
///
/// # Return
/// [Ext2Error::BadGeometry] if the options describe no usable volume
pub fn mkfs(device: &dyn BlockDevice, options: &MkfsOptions) -> Result<()> {
    let layout = options.layout()?;
    let block_size = options.block_size;
    let ipg = options.inodes_per_group;
    let needed = layout.blocks_count as u64 * block_size as u64;
    if device.len() < needed {
        return Err(bad_geometry(format!(
            "device holds {} bytes, the volume needs {needed}",
            device.len()
        )));
    }
    let group_count = layout.groups.len() as u32;
    let mut superblock = SuperBlock::new(
        layout.blocks_count,
        layout.log_block_size,
        8 * block_size,
        ipg,
        group_count,
    );
    let descriptor_table =
        crate::fs::descriptor_table_offset(block_size, layout.first_data_block);
    let root_block = layout.groups[0].first_free;
    let zero_block = vec![0u8; block_size as usize];

    for (g, group) in layout.groups.iter().enumerate() {
        // metadata and the bits past the end of the volume are in use
        let mut block_bits = BitVec::<u8, Msb0>::repeat(true, 8 * block_size as usize);
        block_bits[(group.first_free - group.start) as usize..group.blocks as usize].fill(false);
        let mut inode_bits = BitVec::<u8, Msb0>::repeat(true, 8 * block_size as usize);
        inode_bits[..ipg as usize].fill(false);
        if g == 0 {
            block_bits.set((root_block - group.start) as usize, true);
            // reserved inodes, the root directory among them
            inode_bits[..(FIRST_INODE - 1) as usize].fill(true);
        }

        let free_blocks = block_bits[..group.blocks as usize].count_zeros() as u32;
        let free_inodes = inode_bits[..ipg as usize].count_zeros() as u32;
        superblock.free_blocks_count += free_blocks;
        superblock.free_inodes_count += free_inodes;

        let descriptor = BlockGroupDescriptor {
            block_bitmap: group.block_bitmap,
            inode_bitmap: group.inode_bitmap,
            inode_table: group.inode_table,
            free_blocks_count: free_blocks as u16,
            free_inodes_count: free_inodes as u16,
            used_dirs_count: u16::from(g == 0),
            ..Default::default()
        };
        descriptor.serialize_into(device, descriptor_table, g as u32)?;

        let block_offset = |block: u32| block as u64 * block_size as u64;
        device.write_all(block_offset(group.block_bitmap), block_bits.as_raw_slice())?;
        device.write_all(block_offset(group.inode_bitmap), inode_bits.as_raw_slice())?;
        for block in group.inode_table..group.first_free {
            device.write_all(block_offset(block), &zero_block)?;
        }
    }
    superblock.write_at(device, SUPERBLOCK_OFFSET)?;

    // the root directory: "." and ".." both point at itself
    let mut data = directory::encode(".", ROOT_INODE, FileKind::Directory)?;
    data.extend(directory::encode("..", ROOT_INODE, FileKind::Directory)?);
    let mut block = zero_block;
    block[..data.len()].copy_from_slice(&data);
    device.write_all(root_block as u64 * block_size as u64, &block)?;

    let mut root = Inode::new(FileKind::Directory);
    root.uid = users::get_effective_uid() as u16;
    root.gid = users::get_effective_gid() as u16;
    root.links_count = 2;
    root.size = data.len() as u32;
    root.block[0] = root_block;
    root.add_allocated_block(block_size);
    let root_offset = layout.groups[0].inode_table as u64 * block_size as u64
        + (ROOT_INODE - 1) as u64 * INODE_SIZE as u64;
    root.write_at(device, root_offset)?;
    device.flush()?;

    info!(
        "formatted ext2 volume: {} blocks of {block_size} bytes in {group_count} groups, \
         {} inodes, {} blocks free",
        layout.blocks_count, superblock.inodes_count, superblock.free_blocks_count
    );
    Ok(())
}

/// create a new image file of `size` bytes and format it
/// # Params
/// - `image_file_path`: the image file, it must not exist yet
/// - `size`: the size of the image file in bytes
/// - `options`: its `blocks_count` must fit into `size`
pub fn mkfs_image<P>(image_file_path: P, size: u64, options: &MkfsOptions) -> anyhow::Result<()>
where
    P: AsRef<Path>,
{
    let needed = options.blocks_count as u64 * options.block_size as u64;
    if size < needed {
        return Err(anyhow!(
            "image size {} is too small for {} blocks of {}, need {}",
            Byte::from_bytes(size as _).get_appropriate_unit(true),
            options.blocks_count,
            options.block_size,
            Byte::from_bytes(needed as _).get_appropriate_unit(true)
        ));
    }
    let image_file_path = image_file_path.as_ref();
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create_new(true)
        .open(image_file_path)?;
    // all regions start out as zeros
    file.set_len(size)?;
    drop(file);

    let device = MmapDevice::open(image_file_path)?;
    mkfs(&device, options)
        .map_err(|e| anyhow!("format {} failed: {e}", image_file_path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        device::MemDevice,
        fs::{Ext2, EXT2_MAGIC},
        utils::init_test_environment::init_test_logger,
    };
    use std::sync::Arc;

    #[test]
    fn test_default_options() {
        let options = MkfsOptions::default();
        assert_eq!(options.block_size, 1024);
        assert_eq!(options.inodes_per_group, 2048);
        assert_eq!(MkfsOptions::default_for(1024, 128).inodes_per_group, 32);
        assert_eq!(MkfsOptions::default_for(4096, 16).inodes_per_group, 16);
    }

    #[test]
    fn test_layout_with_small_blocks() {
        let layout = MkfsOptions {
            block_size: 1024,
            blocks_count: 20000,
            inodes_per_group: 512,
        }
        .layout()
        .unwrap();
        assert_eq!(layout.first_data_block, 1);
        assert_eq!(layout.groups.len(), 3);
        let first = layout.groups[0];
        // boot block, superblock, one descriptor block
        assert_eq!(first.block_bitmap, 3);
        assert_eq!(first.inode_bitmap, 4);
        assert_eq!(first.inode_table, 5);
        assert_eq!(first.first_free, 5 + 64);
        assert_eq!(layout.groups[1].start, 8193);
        assert_eq!(layout.groups[1].block_bitmap, 8193);
        assert_eq!(layout.groups[2].blocks, 20000 - 16385);
    }

    #[test]
    fn test_layout_with_large_blocks() {
        let layout = MkfsOptions {
            block_size: 4096,
            blocks_count: 1000,
            inodes_per_group: 64,
        }
        .layout()
        .unwrap();
        assert_eq!(layout.first_data_block, 0);
        assert_eq!(layout.log_block_size, 2);
        assert_eq!(layout.groups.len(), 1);
        assert_eq!(layout.groups[0].block_bitmap, 2);
        assert_eq!(layout.groups[0].blocks, 1000);
    }

    #[test]
    fn test_trailing_group_is_dropped() {
        let layout = MkfsOptions {
            block_size: 1024,
            blocks_count: 8192 + 10,
            inodes_per_group: 256,
        }
        .layout()
        .unwrap();
        assert_eq!(layout.groups.len(), 1);
        assert_eq!(layout.blocks_count, 8192);
        assert_eq!(layout.groups[0].blocks, 8191);
    }

    #[test]
    fn test_invalid_options() {
        let bad = [
            MkfsOptions { block_size: 512, blocks_count: 1024, inodes_per_group: 64 },
            MkfsOptions { block_size: 1024, blocks_count: 1024, inodes_per_group: 12 },
            MkfsOptions { block_size: 1024, blocks_count: 1024, inodes_per_group: 0 },
            MkfsOptions { block_size: 1024, blocks_count: 0, inodes_per_group: 64 },
            MkfsOptions { block_size: 1024, blocks_count: 20, inodes_per_group: 256 },
        ];
        for options in bad {
            assert!(
                matches!(options.layout(), Err(Ext2Error::BadGeometry(_))),
                "{options:?} accepted"
            );
        }
        let device = MemDevice::new(1024);
        assert!(mkfs(&device, &MkfsOptions::default()).is_err());
    }

    #[test]
    fn test_mkfs_on_disk_format() {
        init_test_logger();
        let device = MemDevice::new(1024 * 1024);
        let options = MkfsOptions {
            block_size: 1024,
            blocks_count: 1024,
            inodes_per_group: 64,
        };
        mkfs(&device, &options).unwrap();
        let image = device.snapshot();

        assert_eq!(&image[1024 + 56..1024 + 58], &EXT2_MAGIC.to_le_bytes());
        let superblock = SuperBlock::read_at(&device, SUPERBLOCK_OFFSET).unwrap();
        assert_eq!(superblock.blocks_count, 1024);
        assert_eq!(superblock.inodes_count, 64);
        assert_eq!(superblock.first_data_block, 1);
        assert_eq!(superblock.free_inodes_count, 64 - 10);
        // superblock, descriptors, 2 bitmaps, 8 inode table blocks, the root block
        assert_eq!(superblock.free_blocks_count, 1023 - 13);

        // block bitmap in block 3: 13 used bits, MSB first
        assert_eq!(&image[3072..3074], &[0xff, 0xf8]);
        // 1023 real blocks, the last bit of the bitmap is padding
        assert_eq!(image[3072 + 127], 0x01);
        // inode bitmap in block 4: 10 reserved inodes, padding after 64
        assert_eq!(&image[4096..4098], &[0xff, 0xc0]);
        assert_eq!(image[4096 + 8], 0xff);

        let descriptor = BlockGroupDescriptor::from_bytes(&image[2048..2080]).unwrap();
        assert_eq!(descriptor.inode_table, 5);
        assert_eq!(descriptor.used_dirs_count, 1);
        assert_eq!(descriptor.free_inodes_count, 54);
    }

    #[test]
    fn test_mkfs_then_mount() {
        init_test_logger();
        let device = Arc::new(MemDevice::new(4096 * 512));
        mkfs(&*device, &MkfsOptions::default_for(4096, 512)).unwrap();
        let fs = Ext2::mount(device).unwrap();
        assert_eq!(fs.free_blocks(), fs.superblock().free_blocks_count);
        assert_eq!(fs.free_inodes(), fs.superblock().free_inodes_count);
        let root = fs.root().unwrap();
        assert!(root.is_dir());
        assert_eq!(root.inode().mode, 0o40755);
        assert_eq!(root.get_entry_names().unwrap(), vec![".", ".."]);
        assert_eq!(root.find("..").unwrap(), Some(ROOT_INODE));
        assert_eq!(root.inode().uid, users::get_effective_uid() as u16);
    }

    #[test]
    fn test_mkfs_image() {
        init_test_logger();
        let image = std::env::temp_dir().join(format!("ext2fs-mkfs-{}.img", std::process::id()));
        if image.exists() {
            std::fs::remove_file(&image).unwrap();
        }
        let options = MkfsOptions::default_for(1024, 2048);
        assert!(mkfs_image(&image, 1024, &options).is_err());
        assert!(!image.exists());

        mkfs_image(&image, 2048 * 1024, &options).unwrap();
        // refuses to overwrite an existing image
        assert!(mkfs_image(&image, 2048 * 1024, &options).is_err());
        let fs = crate::mount::mount_image(&image).unwrap();
        assert_eq!(fs.blocks_count(), 2048);
        drop(fs);
        std::fs::remove_file(&image).unwrap();
    }
}
