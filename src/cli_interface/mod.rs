//! the command line of the `ext2fs` binary
pub mod cli_struct;
pub use cli_struct::*;
