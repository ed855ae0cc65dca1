use std::fmt;

use bincode::error::{DecodeError, EncodeError};

pub type Result<T> = core::result::Result<T, self::Ext2Error>;

/// Errors
///
/// Running out of inodes or blocks is not an error: those paths report
/// `false`, `None` or a short byte count so the caller can recover.
#[derive(Debug)]
pub enum Ext2Error {
    /// the underlying device failed
    Io(std::io::Error),
    /// a fixed record could not be decoded
    Decode(DecodeError),
    /// a fixed record could not be encoded
    Encode(EncodeError),
    /// a write started past the current end of the node, which would leave a gap
    WriteBeyondEnd { offset: u64, size: u64 },
    /// the logical block index needs double or triple indirection
    UnsupportedBlockIndex(u64),
    /// the node uses double or triple indirect pointers
    UnsupportedIndirection(u32),
    /// a directory record is inconsistent with the directory data
    MalformedDirEntry { offset: usize },
    NotADirectory(u32),
    NotASymlink(u32),
    /// the symlink keeps its target in the inode, only `set_symbol` may change it
    InlineSymlink(u32),
    /// empty name or a name containing `/` or NUL
    InvalidName,
    NameTooLong(usize),
    AlreadyExists,
    /// inode number outside `1..=inodes_count`
    InvalidInode(u32),
    /// block number outside the volume
    InvalidBlock(u32),
    /// the root directory cannot be deleted
    RootBusy,
    /// `parent` holds no named entry for `inode`
    NotLinked { inode: u32, parent: u32 },
    /// a node must be a regular file, a directory or a symbolic link
    UnknownKind,
    /// the superblock or the format options describe a volume that cannot be laid out
    BadGeometry(String),
}

impl fmt::Display for Ext2Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ext2Error::Io(e) => write!(f, "device error: {e}"),
            Ext2Error::Decode(e) => write!(f, "decode on-disk record failed: {e}"),
            Ext2Error::Encode(e) => write!(f, "encode on-disk record failed: {e}"),
            Ext2Error::WriteBeyondEnd { offset, size } => {
                write!(f, "write at offset {offset} is beyond file size {size}")
            }
            Ext2Error::UnsupportedBlockIndex(index) => {
                write!(f, "logical block {index} needs double or triple indirection")
            }
            Ext2Error::UnsupportedIndirection(ino) => {
                write!(f, "inode {ino} uses double or triple indirect blocks")
            }
            Ext2Error::MalformedDirEntry { offset } => {
                write!(f, "malformed directory entry at offset {offset}")
            }
            Ext2Error::NotADirectory(ino) => write!(f, "inode {ino} is not a directory"),
            Ext2Error::NotASymlink(ino) => write!(f, "inode {ino} is not a symbolic link"),
            Ext2Error::InlineSymlink(ino) => {
                write!(f, "symbolic link {ino} stores its target inline")
            }
            Ext2Error::InvalidName => write!(f, "invalid entry name"),
            Ext2Error::NameTooLong(len) => write!(f, "entry name of {len} bytes is too long"),
            Ext2Error::AlreadyExists => write!(f, "entry already exists"),
            Ext2Error::InvalidInode(ino) => write!(f, "invalid inode number {ino}"),
            Ext2Error::InvalidBlock(block) => write!(f, "invalid block number {block}"),
            Ext2Error::RootBusy => write!(f, "the root directory cannot be deleted"),
            Ext2Error::NotLinked { inode, parent } => {
                write!(f, "inode {inode} has no entry in directory {parent}")
            }
            Ext2Error::UnknownKind => write!(f, "cannot create a node of unknown type"),
            Ext2Error::BadGeometry(reason) => write!(f, "unusable volume geometry: {reason}"),
        }
    }
}

impl std::error::Error for Ext2Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Ext2Error::Io(e) => Some(e),
            Ext2Error::Decode(e) => Some(e),
            Ext2Error::Encode(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Ext2Error {
    fn from(e: std::io::Error) -> Self {
        Ext2Error::Io(e)
    }
}

impl From<DecodeError> for Ext2Error {
    fn from(e: DecodeError) -> Self {
        Ext2Error::Decode(e)
    }
}

impl From<EncodeError> for Ext2Error {
    fn from(e: EncodeError) -> Self {
        Ext2Error::Encode(e)
    }
}
