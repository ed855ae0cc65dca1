use clap::Parser;

#[derive(Parser, Debug, PartialEq)]
#[command(author, version, about, long_about)]
pub enum Ext2Cli {
    /// create a new ext2 image file
    Mkfs(MkfsArgs),
    /// list a directory
    Ls(PathArgs),
    /// print a file, or the target of a symbolic link
    Cat(PathArgs),
    /// show the inode of a path
    Stat(PathArgs),
    /// create a directory
    Mkdir(PathArgs),
    /// create an empty regular file
    Touch(PathArgs),
    /// write text into a regular file
    Write(WriteArgs),
    /// create a symbolic link
    Ln(LinkArgs),
    /// remove a file, a symbolic link or a whole directory tree
    Rm(PathArgs),
}

///make a new fs subcommand
#[derive(clap::Args, Debug, PartialEq)]
#[command(author, version, about = "make a new ext2 image file")]
pub struct MkfsArgs {
    /// the path of the file system image file
    #[clap(short = 'p', long)]
    pub image_file_path: String,
    /// the size of the image file in bytes
    #[clap(short, long)]
    pub size: u64,
    /// the block size of the file system
    #[clap(short, long, default_value_t = 1024)]
    pub block_size: u32,
    /// inodes in every block group, one per four blocks if omitted
    #[clap(short, long)]
    pub inodes_per_group: Option<u32>,
}

/// subcommands working on one path inside the image
#[derive(clap::Args, Debug, PartialEq)]
pub struct PathArgs {
    /// the path of the file system image file
    #[clap(short = 'p', long)]
    pub image_file_path: String,
    /// absolute path inside the image
    #[clap(default_value = "/")]
    pub path: String,
}

#[derive(clap::Args, Debug, PartialEq)]
pub struct WriteArgs {
    /// the path of the file system image file
    #[clap(short = 'p', long)]
    pub image_file_path: String,
    /// the file to write, created if missing
    pub path: String,
    /// the text to write
    pub text: String,
    /// where to start writing, the end of the file if omitted
    #[clap(short, long)]
    pub offset: Option<u64>,
    /// drop the old content first
    #[clap(short, long)]
    pub truncate: bool,
}

#[derive(clap::Args, Debug, PartialEq)]
pub struct LinkArgs {
    /// the path of the file system image file
    #[clap(short = 'p', long)]
    pub image_file_path: String,
    /// what the link points at, stored as given
    pub target: String,
    /// the path of the new link
    pub path: String,
}
