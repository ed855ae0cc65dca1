pub mod cli_interface;
pub mod cursor;
pub mod device;
mod fs;
pub mod mkfs;
pub mod mount;
pub mod utils;
pub use fs::*;
