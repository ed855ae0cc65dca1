//! variable-length directory records
//!
//! A directory's data is a run of records, each
//! `inode u32 | rec_len u16 | name_len u8 | type u8 | name`,
//! padded to a multiple of 4 bytes. A record with inode 0 is a tombstone
//! whose span stays allocated.
use bincode::{Decode, Encode};

use crate::utils::traits::OnDisk;

use super::{
    error::{Ext2Error, Result},
    FileKind, MAX_NAME_LEN,
};

/// size of the fixed part of a record
pub const DIR_ENTRY_HEADER: usize = 8;

/// The fixed part of a record, the name follows it
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct DirEntryHeader {
    /// 0 marks a tombstone
    pub inode: u32,
    pub rec_len: u16,
    pub name_len: u8,
    pub file_type: u8,
}

impl OnDisk for DirEntryHeader {
    const SIZE: usize = DIR_ENTRY_HEADER;
}

/// the span a record for a `name_len`-byte name occupies
#[inline]
pub const fn record_len(name_len: usize) -> usize {
    (DIR_ENTRY_HEADER + name_len + 3) & !3
}

/// names are 1..=255 bytes without `/` or NUL
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name.bytes().any(|b| b == b'/' || b == 0) {
        return Err(Ext2Error::InvalidName);
    }
    if name.len() > MAX_NAME_LEN {
        return Err(Ext2Error::NameTooLong(name.len()));
    }
    Ok(())
}

/// encode a live record pointing at `inode`
pub fn encode(name: &str, inode: u32, kind: FileKind) -> Result<Vec<u8>> {
    validate_name(name)?;
    let span = record_len(name.len());
    let header = DirEntryHeader {
        inode,
        rec_len: span as u16,
        name_len: name.len() as u8,
        file_type: kind.dir_entry_tag(),
    };
    let mut record = header.to_bytes()?;
    record.extend_from_slice(name.as_bytes());
    record.resize(span, 0);
    Ok(record)
}

/// a tombstone covering `span` bytes, everything but rec_len zeroed
pub fn encode_dead(span: usize) -> Result<Vec<u8>> {
    debug_assert!(span >= DIR_ENTRY_HEADER && span % 4 == 0);
    let header = DirEntryHeader {
        rec_len: span as u16,
        ..Default::default()
    };
    let mut record = header.to_bytes()?;
    record.resize(span, 0);
    Ok(record)
}

/// A decoded directory record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirEntry<'a> {
    /// a tombstone or padding record
    Dead { span: usize },
    Live {
        inode: u32,
        name: &'a [u8],
        kind: FileKind,
        span: usize,
    },
}

impl<'a> DirEntry<'a> {
    /// number of bytes this record covers, padding included
    pub fn span(&self) -> usize {
        match self {
            DirEntry::Dead { span } | DirEntry::Live { span, .. } => *span,
        }
    }
}

/// Iterator over the records of a directory's data, yielding each record with
/// its byte offset. A malformed record is reported once and ends the iteration.
#[derive(Debug, Clone)]
pub struct DirEntries<'a> {
    data: &'a [u8],
    offset: usize,
    failed: bool,
}

/// decode the records in `data`, lazily
pub fn decode(data: &[u8]) -> DirEntries<'_> {
    DirEntries {
        data,
        offset: 0,
        failed: false,
    }
}

impl<'a> DirEntries<'a> {
    fn parse(&self) -> Option<DirEntry<'a>> {
        let rest = &self.data[self.offset..];
        if rest.len() < DIR_ENTRY_HEADER {
            return None;
        }
        let header = DirEntryHeader::from_bytes(rest).ok()?;
        let (inode, span, name_len) = (header.inode, header.rec_len as usize, header.name_len as usize);
        if span < DIR_ENTRY_HEADER || span > rest.len() || DIR_ENTRY_HEADER + name_len > span {
            return None;
        }
        if inode == 0 {
            return Some(DirEntry::Dead { span });
        }
        Some(DirEntry::Live {
            inode,
            name: &rest[DIR_ENTRY_HEADER..DIR_ENTRY_HEADER + name_len],
            kind: FileKind::from_dir_entry_tag(header.file_type),
            span,
        })
    }
}

impl<'a> Iterator for DirEntries<'a> {
    type Item = Result<(usize, DirEntry<'a>)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.offset >= self.data.len() {
            return None;
        }
        let offset = self.offset;
        match self.parse() {
            Some(entry) => {
                self.offset += entry.span();
                Some(Ok((offset, entry)))
            }
            None => {
                self.failed = true;
                Some(Err(Ext2Error::MalformedDirEntry { offset }))
            }
        }
    }
}
