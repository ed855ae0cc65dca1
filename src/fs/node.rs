use std::{fmt, sync::Arc};

use log::debug;

use crate::utils::traits::OnDisk;

use super::{
    directory::{self, DirEntry, DirEntryHeader, DIR_ENTRY_HEADER},
    error::{Ext2Error, Result},
    BlockLocation, Ext2, FileKind, Inode, BLOCK_POINTERS, FAST_SYMLINK_MAX_LEN, INDIRECT_POINTER,
    ROOT_INODE,
};

/// A file, directory or symbolic link of a mounted volume.
///
/// A node owns a copy of its inode record, taken when it was looked up.
/// Another handle on the same inode does not see changes made through this
/// one until it is fetched again with [Ext2::get_node].
#[derive(Clone)]
pub struct Node {
    number: u32,
    inode: Inode,
    fs: Arc<Ext2>,
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("number", &self.number)
            .field("inode", &self.inode)
            .finish()
    }
}

impl Node {
    pub(crate) fn new(number: u32, inode: Inode, fs: Arc<Ext2>) -> Self {
        Node { number, inode, fs }
    }

    #[inline]
    pub fn number(&self) -> u32 {
        self.number
    }

    #[inline]
    pub fn inode(&self) -> &Inode {
        &self.inode
    }

    #[inline]
    pub(crate) fn inode_mut(&mut self) -> &mut Inode {
        &mut self.inode
    }

    #[inline]
    pub fn fs(&self) -> &Arc<Ext2> {
        &self.fs
    }

    #[inline]
    pub fn size_in_bytes(&self) -> u64 {
        self.inode.size as u64
    }

    #[inline]
    pub fn n_links(&self) -> u16 {
        self.inode.links_count
    }

    /// the type nibble of the mode, `mode & 0xF000`
    #[inline]
    pub fn get_type(&self) -> u16 {
        self.inode.type_tag()
    }

    #[inline]
    pub fn kind(&self) -> FileKind {
        self.inode.file_kind()
    }

    pub fn is_dir(&self) -> bool {
        self.kind() == FileKind::Directory
    }

    pub fn is_file(&self) -> bool {
        self.kind() == FileKind::RegularFile
    }

    pub fn is_symlink(&self) -> bool {
        self.kind() == FileKind::SymbolicLink
    }

    #[inline]
    pub fn block_size(&self) -> u32 {
        self.fs.block_size()
    }

    /// write the inode record back to the inode table
    pub fn flush(&self) -> Result<()> {
        self.fs.write_inode(self.number, &self.inode)
    }
}

/// block-level data access
impl Node {
    /// the physical block behind logical block `index`, 0 if unmapped
    fn locate(&self, index: u64) -> Result<u32> {
        match BlockLocation::of(index, self.block_size()) {
            BlockLocation::Direct(i) => Ok(self.inode.block[i]),
            BlockLocation::Indirect(i) => match self.inode.indirect_block() {
                0 => Ok(0),
                table => self.fs.read_pointer(table, i),
            },
            BlockLocation::Unsupported(index) => Err(Ext2Error::UnsupportedBlockIndex(index)),
        }
    }

    /// read logical block `index` into the front of `buf`, unmapped blocks read as zeros
    pub fn read_block(&self, index: u64, buf: &mut [u8]) -> Result<()> {
        let len = buf.len().min(self.block_size() as usize);
        match self.locate(index)? {
            0 => buf[..len].fill(0),
            block => self.fs.read_block(block, 0, &mut buf[..len])?,
        }
        Ok(())
    }

    /// read from `offset` into `buf`, never past the end of the node
    /// # Return
    /// the number of bytes copied, short only at the end of the node
    pub fn read_all(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let size = self.size_in_bytes();
        if offset >= size {
            return Ok(0);
        }
        let len = (buf.len() as u64).min(size - offset) as usize;
        if self.inode.is_fast_symlink() {
            let inline = self.inode.inline_data();
            let start = offset as usize;
            buf[..len].copy_from_slice(&inline[start..start + len]);
            return Ok(len);
        }

        let block_size = self.block_size() as u64;
        let mut done = 0;
        while done < len {
            let position = offset + done as u64;
            let within = (position % block_size) as usize;
            let chunk = (block_size as usize - within).min(len - done);
            match self.locate(position / block_size)? {
                0 => buf[done..done + chunk].fill(0),
                block => self.fs.read_block(block, within, &mut buf[done..done + chunk])?,
            }
            done += chunk;
        }
        Ok(done)
    }

    /// Write `data` at `offset`, mapping fresh zeroed blocks where needed.
    /// The inode record is flushed before returning, even on error.
    /// # Return
    /// the number of bytes written, short if the volume ran out of blocks
    pub fn write_all(&mut self, offset: u64, data: &[u8]) -> Result<usize> {
        let size = self.size_in_bytes();
        if offset > size {
            return Err(Ext2Error::WriteBeyondEnd { offset, size });
        }
        if self.inode.is_fast_symlink() && size > 0 {
            return Err(Ext2Error::InlineSymlink(self.number));
        }

        let mut written = 0;
        let outcome = self.write_blocks(offset, data, &mut written);

        let end = offset + written as u64;
        if end > size {
            self.inode.size = end as u32;
        }
        if written > 0 {
            self.inode.update_modified_at();
        }
        self.flush()?;
        outcome.map(|_| written)
    }

    fn write_blocks(&mut self, offset: u64, data: &[u8], written: &mut usize) -> Result<()> {
        let block_size = self.block_size() as u64;
        while *written < data.len() {
            let position = offset + *written as u64;
            let within = (position % block_size) as usize;
            let chunk = (block_size as usize - within).min(data.len() - *written);
            let Some(block) = self.map_block(position / block_size)? else {
                debug!("inode {} stopped writing after {} bytes: volume full", self.number, written);
                return Ok(());
            };
            self.fs
                .write_block(block, within, &data[*written..*written + chunk])?;
            *written += chunk;
        }
        Ok(())
    }

    /// the physical block behind logical block `index`, allocated if unmapped
    fn map_block(&mut self, index: u64) -> Result<Option<u32>> {
        match BlockLocation::of(index, self.block_size()) {
            BlockLocation::Direct(i) => {
                if self.inode.block[i] != 0 {
                    return Ok(Some(self.inode.block[i]));
                }
                let block = self.allocate_zeroed()?;
                if let Some(block) = block {
                    self.inode.block[i] = block;
                }
                Ok(block)
            }
            BlockLocation::Indirect(i) => {
                if self.inode.indirect_block() == 0 {
                    let Some(table) = self.allocate_zeroed()? else {
                        return Ok(None);
                    };
                    self.inode.block[INDIRECT_POINTER] = table;
                }
                let table = self.inode.indirect_block();
                match self.fs.read_pointer(table, i)? {
                    0 => {
                        let block = self.allocate_zeroed()?;
                        if let Some(block) = block {
                            self.fs.write_pointer(table, i, block)?;
                        }
                        Ok(block)
                    }
                    block => Ok(Some(block)),
                }
            }
            BlockLocation::Unsupported(index) => Err(Ext2Error::UnsupportedBlockIndex(index)),
        }
    }

    fn allocate_zeroed(&mut self) -> Result<Option<u32>> {
        let Some(block) = self.fs.find_available_block()? else {
            return Ok(None);
        };
        self.fs.zero_block(block)?;
        self.inode.add_allocated_block(self.block_size());
        Ok(Some(block))
    }

    /// free every data block, the indirect table and the blocks it lists.
    /// The size is left for the caller to set
    pub(crate) fn release_data(&mut self) -> Result<()> {
        if self.inode.uses_deep_indirection() {
            return Err(Ext2Error::UnsupportedIndirection(self.number));
        }
        if !self.inode.is_fast_symlink() {
            let direct: Vec<u32> = self.inode.direct_blocks().collect();
            for block in direct {
                self.fs.free_block(block)?;
            }
            let table = self.inode.indirect_block();
            if table != 0 {
                for block in self.fs.read_pointers(table)? {
                    self.fs.free_block(block)?;
                }
                self.fs.free_block(table)?;
            }
        }
        self.inode.block = [0; BLOCK_POINTERS];
        self.inode.blocks = 0;
        Ok(())
    }

    /// drop all contents of the node
    pub fn truncate(&mut self) -> Result<()> {
        self.release_data()?;
        self.inode.size = 0;
        self.inode.update_modified_at();
        self.flush()
    }
}

/// symbolic links
impl Node {
    /// the target of this symbolic link
    pub fn get_symbol(&self) -> Result<Vec<u8>> {
        if !self.is_symlink() {
            return Err(Ext2Error::NotASymlink(self.number));
        }
        let mut target = vec![0u8; self.size_in_bytes() as usize];
        let len = self.read_all(0, &mut target)?;
        target.truncate(len);
        Ok(target)
    }

    /// point this symbolic link at `target`, inline when it fits in the inode
    /// # Return
    /// `false` if the volume ran out of blocks for a long target
    pub fn set_symbol(&mut self, target: &[u8]) -> Result<bool> {
        if !self.is_symlink() {
            return Err(Ext2Error::NotASymlink(self.number));
        }
        self.release_data()?;
        self.inode.size = 0;
        if target.len() <= FAST_SYMLINK_MAX_LEN {
            self.inode.set_inline_data(target);
            self.inode.size = target.len() as u32;
            self.inode.update_modified_at();
            self.flush()?;
            return Ok(true);
        }
        Ok(self.write_all(0, target)? == target.len())
    }
}

/// directories
impl Node {
    /// the raw directory data
    fn directory_data(&self) -> Result<Vec<u8>> {
        if !self.is_dir() {
            return Err(Ext2Error::NotADirectory(self.number));
        }
        let mut data = vec![0u8; self.size_in_bytes() as usize];
        let len = self.read_all(0, &mut data)?;
        data.truncate(len);
        Ok(data)
    }

    /// call `visit` with the inode number and name of every live entry
    pub fn entries<F>(&self, mut visit: F) -> Result<()>
    where
        F: FnMut(u32, &[u8]),
    {
        let data = self.directory_data()?;
        for entry in directory::decode(&data) {
            if let (_, DirEntry::Live { inode, name, .. }) = entry? {
                visit(inode, name);
            }
        }
        Ok(())
    }

    pub fn entry_count(&self) -> Result<usize> {
        let mut count = 0;
        self.entries(|_, _| count += 1)?;
        Ok(count)
    }

    pub fn get_entry_names(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        self.entries(|_, name| names.push(String::from_utf8_lossy(name).into_owned()))?;
        Ok(names)
    }

    /// look `name` up in this directory
    pub fn find(&self, name: &str) -> Result<Option<u32>> {
        let mut found = None;
        self.entries(|inode, entry_name| {
            if found.is_none() && entry_name == name.as_bytes() {
                found = Some(inode);
            }
        })?;
        Ok(found)
    }

    /// Append an entry at the end of the directory. A record never straddles
    /// a block: the tail of a block too short for it is padded first.
    /// # Return
    /// `false` if the directory could not grow
    pub fn append_entry(&mut self, name: &str, inode: u32, kind: FileKind) -> Result<bool> {
        let record = directory::encode(name, inode, kind)?;
        if !self.is_dir() {
            return Err(Ext2Error::NotADirectory(self.number));
        }
        let block_size = self.block_size() as u64;
        let used = (self.size_in_bytes() % block_size) as usize;
        if used != 0 && used + record.len() > block_size as usize {
            self.pad_block_tail(block_size as usize - used)?;
        }

        let offset = self.size_in_bytes();
        let written = self.write_all(offset, &record)?;
        if written < record.len() {
            // a fresh block was needed and none was left
            self.inode.size = offset as u32;
            self.flush()?;
            return Ok(false);
        }
        debug!("directory {}: {name:?} -> inode {inode} at offset {offset}", self.number);
        Ok(true)
    }

    /// fill the last `gap` bytes of the current block
    fn pad_block_tail(&mut self, gap: usize) -> Result<()> {
        let size = self.size_in_bytes();
        if gap >= DIR_ENTRY_HEADER {
            self.write_all(size, &directory::encode_dead(gap)?)?;
            return Ok(());
        }
        // too short for a record of its own: the last record absorbs it
        let data = self.directory_data()?;
        let mut last = None;
        for entry in directory::decode(&data) {
            last = Some(entry?);
        }
        let Some((last_offset, entry)) = last else {
            return Err(Ext2Error::MalformedDirEntry { offset: size as usize });
        };
        let mut header = DirEntryHeader::from_bytes(&data[last_offset..])?;
        header.rec_len = (entry.span() + gap) as u16;
        self.write_all(size, &vec![0u8; gap])?;
        self.write_all(last_offset as u64, &header.to_bytes()?)?;
        Ok(())
    }

    /// Turn the first live entry naming `inode` into a tombstone of the same
    /// span. "." and ".." are never matched
    /// # Return
    /// whether such an entry was found
    pub fn tombstone(&mut self, inode: u32) -> Result<bool> {
        let Some((offset, span)) = self.named_entry(inode)? else {
            return Ok(false);
        };
        self.write_all(offset as u64, &directory::encode_dead(span)?)?;
        Ok(true)
    }

    /// offset and span of the first live entry other than "." and ".." naming `inode`
    fn named_entry(&self, inode: u32) -> Result<Option<(usize, usize)>> {
        let data = self.directory_data()?;
        for entry in directory::decode(&data) {
            if let (offset, DirEntry::Live { inode: found, name, span, .. }) = entry? {
                if found == inode && name != b"." && name != b".." {
                    return Ok(Some((offset, span)));
                }
            }
        }
        Ok(None)
    }

    /// write "." and ".." into a freshly created directory
    pub(crate) fn init_directory(&mut self, parent: u32) -> Result<bool> {
        self.inode.links_count = 2;
        let number = self.number;
        Ok(self.append_entry(".", number, FileKind::Directory)?
            && self.append_entry("..", parent, FileKind::Directory)?)
    }

    /// inode numbers of every entry but "." and ".."
    fn child_numbers(&self) -> Result<Vec<u32>> {
        let mut children = Vec::new();
        self.entries(|inode, name| {
            if name != b"." && name != b".." {
                children.push(inode);
            }
        })?;
        Ok(children)
    }
}

/// removal
impl Node {
    /// Delete this node and unlink it from `parent`. Directories are emptied
    /// recursively first. Nodes using double or triple indirection are
    /// refused before anything is changed
    pub fn delete_node(mut self, parent: &mut Node) -> Result<()> {
        if self.number == ROOT_INODE {
            return Err(Ext2Error::RootBusy);
        }
        let not_linked = Ext2Error::NotLinked {
            inode: self.number,
            parent: parent.number,
        };
        if parent.number == self.number || parent.named_entry(self.number)?.is_none() {
            return Err(not_linked);
        }
        if self.inode.uses_deep_indirection() {
            return Err(Ext2Error::UnsupportedIndirection(self.number));
        }
        let is_dir = self.is_dir();
        if is_dir {
            for child in self.child_numbers()? {
                let child = self.fs.get_node(child)?;
                child.delete_node(&mut self)?;
            }
        }

        if !parent.tombstone(self.number)? {
            return Err(not_linked);
        }
        if is_dir {
            parent.inode.links_count = parent.inode.links_count.saturating_sub(1);
            parent.flush()?;
            self.fs.count_directory(self.number, -1)?;
        }
        debug!("deleting inode {}", self.number);
        self.discard()
    }

    /// free the blocks and the inode number of a node no directory refers to
    pub(crate) fn discard(mut self) -> Result<()> {
        self.release_data()?;
        self.inode.size = 0;
        self.inode.mark_deleted();
        self.flush()?;
        self.fs.free_inode(self.number)
    }
}
