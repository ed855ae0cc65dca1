use bincode::{config::Config, Decode, Encode};

use crate::{
    cursor::DeviceCursor,
    device::BlockDevice,
    fs::error::Result,
};

/// the byte layout of every fixed ext2 record:
/// little endian, fixed-size integers, arrays without a length prefix
pub fn codec_config() -> impl Config {
    bincode::config::legacy().skip_fixed_array_length()
}

/// Trait for records that live at a fixed place on the device and
/// always occupy exactly [SIZE](OnDisk::SIZE) bytes there
pub trait OnDisk: Encode + Decode + Sized {
    /// size of the encoded record in bytes
    const SIZE: usize;

    /// deserialize from the device at byte `offset`
    fn read_at(device: &dyn BlockDevice, offset: u64) -> Result<Self> {
        let mut cursor = DeviceCursor::at(device, offset);
        Ok(bincode::decode_from_std_read(&mut cursor, codec_config())?)
    }

    /// deserialize from the front of a slice
    fn from_bytes(buf: &[u8]) -> Result<Self> {
        let (record, _) = bincode::decode_from_slice(buf, codec_config())?;
        Ok(record)
    }

    /// serialize into a [Vec] of exactly [SIZE](OnDisk::SIZE) bytes
    fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; Self::SIZE];
        let written = bincode::encode_into_slice(self, &mut buf, codec_config())?;
        debug_assert_eq!(written, Self::SIZE, "record layout does not match its size");
        Ok(buf)
    }

    /// serialize onto the device at byte `offset`, in one transfer
    fn write_at(&self, device: &dyn BlockDevice, offset: u64) -> Result<()> {
        let buf = self.to_bytes()?;
        device.write_all(offset, &buf)?;
        Ok(())
    }
}
