/// mask of the type nibble in an inode's mode field
pub const MODE_TYPE_MASK: u16 = libc::S_IFMT as u16;
/// mask of the permission bits in an inode's mode field
pub const MODE_PERMISSION_MASK: u16 = 0o7777;

/// an enum to describe the type of a file
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum FileKind {
    /// an regular file
    RegularFile,
    /// a directory
    Directory,
    /// a symbolic link
    SymbolicLink,
    /// any other type tag found on disk
    #[default]
    Unknown,
}

impl FileKind {
    /// the type nibble stored in an inode's mode field
    pub fn mode_tag(self) -> u16 {
        match self {
            FileKind::RegularFile => libc::S_IFREG as u16,
            FileKind::Directory => libc::S_IFDIR as u16,
            FileKind::SymbolicLink => libc::S_IFLNK as u16,
            FileKind::Unknown => 0,
        }
    }

    /// the type byte stored in a directory entry
    pub fn dir_entry_tag(self) -> u8 {
        match self {
            FileKind::RegularFile => 1,
            FileKind::Directory => 2,
            FileKind::SymbolicLink => 7,
            FileKind::Unknown => 0,
        }
    }

    /// permissions given to freshly created nodes
    pub fn default_permissions(self) -> u16 {
        match self {
            FileKind::Directory => 0o755,
            FileKind::SymbolicLink => 0o777,
            _ => 0o644,
        }
    }

    pub fn from_mode(mode: u16) -> Self {
        match (mode & MODE_TYPE_MASK) as libc::mode_t {
            libc::S_IFREG => FileKind::RegularFile,
            libc::S_IFDIR => FileKind::Directory,
            libc::S_IFLNK => FileKind::SymbolicLink,
            _ => FileKind::Unknown,
        }
    }

    pub fn from_dir_entry_tag(tag: u8) -> Self {
        match tag {
            1 => FileKind::RegularFile,
            2 => FileKind::Directory,
            7 => FileKind::SymbolicLink,
            _ => FileKind::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_tags_match_ext2() {
        assert_eq!(FileKind::Directory.mode_tag(), 0x4000);
        assert_eq!(FileKind::RegularFile.mode_tag(), 0x8000);
        assert_eq!(FileKind::SymbolicLink.mode_tag(), 0xA000);
        assert_eq!(FileKind::from_mode(0x41ed), FileKind::Directory);
        assert_eq!(FileKind::from_mode(0x81a4), FileKind::RegularFile);
        assert_eq!(FileKind::from_mode(0xa1ff), FileKind::SymbolicLink);
        assert_eq!(FileKind::from_mode(0x2000), FileKind::Unknown);
    }

    #[test]
    fn test_dir_entry_tags() {
        for kind in [FileKind::RegularFile, FileKind::Directory, FileKind::SymbolicLink] {
            assert_eq!(FileKind::from_dir_entry_tag(kind.dir_entry_tag()), kind);
        }
        assert_eq!(FileKind::from_dir_entry_tag(3), FileKind::Unknown);
    }
}
