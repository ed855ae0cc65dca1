//! the byte-addressable devices a volume can live on
use std::{
    fs::OpenOptions,
    io::{self, ErrorKind},
    path::Path,
    sync::{Mutex, MutexGuard},
};

use memmap2::MmapMut;

/// A flat byte address space with no block notion of its own.
///
/// A single `read`/`write` call may transfer fewer bytes than requested,
/// callers that need the whole range use [read_all](BlockDevice::read_all)
/// and [write_all](BlockDevice::write_all).
pub trait BlockDevice: Send + Sync {
    /// read up to `buf.len()` bytes starting at byte `offset`
    /// # Returns
    /// the number of bytes actually read, `0` means end of device
    fn read(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize>;

    /// write up to `buf.len()` bytes starting at byte `offset`
    /// # Returns
    /// the number of bytes actually written
    fn write(&self, offset: u64, buf: &[u8]) -> io::Result<usize>;

    /// total size of the device in bytes
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// push written data down to the backing store
    fn flush(&self) -> io::Result<()> {
        Ok(())
    }

    /// read exactly `buf.len()` bytes, looping over short reads
    fn read_all(&self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        let mut done = 0;
        while done < buf.len() {
            match self.read(offset + done as u64, &mut buf[done..])? {
                0 => {
                    return Err(io::Error::new(
                        ErrorKind::UnexpectedEof,
                        format!("device ended at byte {}", offset + done as u64),
                    ))
                }
                n => done += n,
            }
        }
        Ok(())
    }

    /// write exactly `buf.len()` bytes, looping over short writes
    fn write_all(&self, offset: u64, buf: &[u8]) -> io::Result<()> {
        let mut done = 0;
        while done < buf.len() {
            match self.write(offset + done as u64, &buf[done..])? {
                0 => {
                    return Err(io::Error::new(
                        ErrorKind::WriteZero,
                        format!("device refused write at byte {}", offset + done as u64),
                    ))
                }
                n => done += n,
            }
        }
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn transfer_range(device_len: usize, offset: u64, want: usize, cap: usize) -> Option<(usize, usize)> {
    let start = usize::try_from(offset).ok()?;
    if start >= device_len {
        return None;
    }
    let len = want.min(device_len - start).min(cap);
    Some((start, start + len))
}

/// A device backed by an owned buffer in memory
#[derive(Debug)]
pub struct MemDevice {
    data: Mutex<Vec<u8>>,
    /// upper bound of bytes moved by one `read`/`write` call
    max_transfer: usize,
}

impl MemDevice {
    /// create a zero-filled device of `size` bytes
    pub fn new(size: usize) -> Self {
        Self::from_bytes(vec![0u8; size])
    }

    pub fn from_bytes(data: Vec<u8>) -> Self {
        MemDevice {
            data: Mutex::new(data),
            max_transfer: usize::MAX,
        }
    }

    /// limit every single transfer to `max_transfer` bytes,
    /// like a disk controller that moves one sector at a time
    pub fn with_max_transfer(mut self, max_transfer: usize) -> Self {
        self.max_transfer = max_transfer.max(1);
        self
    }

    /// copy out the whole device content
    pub fn snapshot(&self) -> Vec<u8> {
        lock(&self.data).clone()
    }
}

impl BlockDevice for MemDevice {
    fn read(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        let data = lock(&self.data);
        let Some((start, end)) = transfer_range(data.len(), offset, buf.len(), self.max_transfer) else {
            return Ok(0);
        };
        buf[..end - start].copy_from_slice(&data[start..end]);
        Ok(end - start)
    }

    fn write(&self, offset: u64, buf: &[u8]) -> io::Result<usize> {
        let mut data = lock(&self.data);
        let Some((start, end)) = transfer_range(data.len(), offset, buf.len(), self.max_transfer) else {
            return Ok(0);
        };
        data[start..end].copy_from_slice(&buf[..end - start]);
        Ok(end - start)
    }

    fn len(&self) -> u64 {
        lock(&self.data).len() as u64
    }
}

/// A device backed by a memory-mapped image file,
/// something like a **/dev/sda1** living in a regular file
#[derive(Debug)]
pub struct MmapDevice {
    map: Mutex<MmapMut>,
}

impl MmapDevice {
    /// open an existing image file for read and write
    pub fn open<P>(image_path: P) -> io::Result<Self>
    where
        P: AsRef<Path>,
    {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(image_path.as_ref())?;
        // Safety
        // the mapping is only reachable through this device, and the file is
        // opened read-write so every access through the map is permitted.
        // A concurrent external truncation of the image is not supported.
        let map = unsafe { MmapMut::map_mut(&file)? };
        Ok(MmapDevice {
            map: Mutex::new(map),
        })
    }
}

impl BlockDevice for MmapDevice {
    fn read(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        let map = lock(&self.map);
        let Some((start, end)) = transfer_range(map.len(), offset, buf.len(), usize::MAX) else {
            return Ok(0);
        };
        buf[..end - start].copy_from_slice(&map[start..end]);
        Ok(end - start)
    }

    fn write(&self, offset: u64, buf: &[u8]) -> io::Result<usize> {
        let mut map = lock(&self.map);
        let Some((start, end)) = transfer_range(map.len(), offset, buf.len(), usize::MAX) else {
            return Ok(0);
        };
        map[start..end].copy_from_slice(&buf[..end - start]);
        Ok(end - start)
    }

    fn len(&self) -> u64 {
        lock(&self.map).len() as u64
    }

    fn flush(&self) -> io::Result<()> {
        lock(&self.map).flush()
    }
}
