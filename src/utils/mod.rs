//! helpers shared by the filesystem, `mkfs` and the command line
pub mod fs_size_calculator;
#[cfg(test)]
pub mod init_test_environment;
pub mod time_util;
pub mod traits;
