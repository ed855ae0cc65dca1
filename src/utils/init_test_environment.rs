use std::sync::Arc;

use crate::{
    device::MemDevice,
    fs::Ext2,
    mkfs::{mkfs, MkfsOptions},
};

/// route `log` output through the test harness, safe to call from every test
pub fn init_test_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// a freshly formatted in-memory volume of `blocks_count` blocks, mounted
pub fn init_test_environment(block_size: u32, blocks_count: u32) -> Arc<Ext2> {
    init_test_logger();
    let device = MemDevice::new(blocks_count as usize * block_size as usize);
    mkfs(&device, &MkfsOptions::default_for(block_size, blocks_count))
        .expect("format test volume failed");
    Ext2::mount(Arc::new(device)).expect("mount test volume failed")
}
