use std::time::{self, SystemTime};

/// calculate how many seconds passed since `1970-1-1 00:00:00`,named as [UNIX_EPOCH](time::UNIX_EPOCH),
/// truncated to the 32 bits an inode or superblock timestamp can hold
pub fn now() -> u32 {
    SystemTime::now()
        .duration_since(time::UNIX_EPOCH)
        .map(|duration| duration.as_secs() as u32)
        .unwrap_or(0)
}

/// convert an on-disk timestamp back to [SystemTime]
pub fn to_system_time(secs: u32) -> SystemTime {
    time::UNIX_EPOCH + time::Duration::from_secs(secs as u64)
}
