//! a cursor that reads and writes a [BlockDevice] through
//! the [std::io] traits, so fixed records can be streamed in and out of it.
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};

use crate::device::BlockDevice;

/// cursor struct
pub struct DeviceCursor<'a> {
    inner: &'a dyn BlockDevice,
    pos: u64,
}

impl<'a> DeviceCursor<'a> {
    /// creates a new cursor at the start of the device
    pub fn new(inner: &'a dyn BlockDevice) -> Self {
        Self::at(inner, 0)
    }

    /// creates a new cursor positioned at byte `pos`
    pub fn at(inner: &'a dyn BlockDevice, pos: u64) -> Self {
        Self { inner, pos }
    }

    /// get the current position of the cursor
    pub const fn position(&self) -> u64 {
        self.pos
    }

    /// set the current position of the cursor
    pub fn set_position(&mut self, pos: u64) {
        self.pos = pos;
    }

    /// Returns `true` if the cursor is at or past the end of the device.
    pub fn is_empty(&self) -> bool {
        self.pos >= self.inner.len()
    }
}

impl Seek for DeviceCursor<'_> {
    fn seek(&mut self, style: SeekFrom) -> std::io::Result<u64> {
        let (base_pos, offset) = match style {
            SeekFrom::Start(n) => {
                self.pos = n;
                return Ok(n);
            }
            SeekFrom::End(n) => (self.inner.len(), n),
            SeekFrom::Current(n) => (self.pos, n),
        };
        match base_pos.checked_add_signed(offset) {
            Some(n) => {
                self.pos = n;
                Ok(self.pos)
            }
            None => Err(ErrorKind::InvalidInput.into()),
        }
    }

    fn stream_position(&mut self) -> std::io::Result<u64> {
        Ok(self.pos)
    }
}

impl Read for DeviceCursor<'_> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(self.pos, buf)?;
        self.pos += n as u64;
        Ok(n)
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> std::io::Result<()> {
        self.inner.read_all(self.pos, buf)?;
        self.pos += buf.len() as u64;
        Ok(())
    }
}

impl Write for DeviceCursor<'_> {
    #[inline]
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let n = self.inner.write(self.pos, buf)?;
        self.pos += n as u64;
        Ok(n)
    }

    #[inline]
    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}
