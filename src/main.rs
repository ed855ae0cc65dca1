use std::{io::Write, sync::Arc};

use anyhow::{anyhow, Context};
use byte_unit::Byte;
use clap::Parser;
use ext2fs::{
    cli_interface::{Ext2Cli, LinkArgs, MkfsArgs, PathArgs, WriteArgs},
    mkfs::{mkfs_image, MkfsOptions},
    mount::mount_image,
    utils::time_util,
    Ext2, FileKind, Node, MODE_PERMISSION_MASK,
};

/// a CLI interface to create an ext2 image file and to
/// look at or change the files inside it
fn main() -> anyhow::Result<()> {
    env_logger::builder().format_timestamp_nanos().init();
    match Ext2Cli::parse() {
        Ext2Cli::Mkfs(args) => make_image(args),
        Ext2Cli::Ls(args) => list(args),
        Ext2Cli::Cat(args) => cat(args),
        Ext2Cli::Stat(args) => stat(args),
        Ext2Cli::Mkdir(args) => create(args, FileKind::Directory),
        Ext2Cli::Touch(args) => create(args, FileKind::RegularFile),
        Ext2Cli::Write(args) => write(args),
        Ext2Cli::Ln(args) => link(args),
        Ext2Cli::Rm(args) => remove(args),
    }
}

fn make_image(args: MkfsArgs) -> anyhow::Result<()> {
    let blocks_count = u32::try_from(args.size / args.block_size as u64)
        .context("the image holds too many blocks")?;
    let mut options = MkfsOptions::default_for(args.block_size, blocks_count);
    if let Some(inodes_per_group) = args.inodes_per_group {
        options.inodes_per_group = inodes_per_group;
    }
    mkfs_image(&args.image_file_path, args.size, &options)?;
    println!(
        "created {} ({}) with {} blocks of {} bytes",
        args.image_file_path,
        Byte::from_bytes(args.size as _).get_appropriate_unit(true),
        blocks_count,
        args.block_size
    );
    Ok(())
}

/// split `path` into its parent directory and its last component,
/// which must name an entry of that parent rather than "." or ".."
fn split_parent(path: &str) -> anyhow::Result<(&str, &str)> {
    let path = path.trim_end_matches('/');
    let (parent, name) = path.rsplit_once('/').unwrap_or(("", path));
    match name {
        "" => Err(anyhow!("{path:?} has no file name")),
        "." | ".." => Err(anyhow!("{path:?} does not end in a file name")),
        _ => Ok((parent, name)),
    }
}

fn lookup(fs: &Arc<Ext2>, path: &str) -> anyhow::Result<Node> {
    fs.find(&fs.root()?, path)?
        .ok_or_else(|| anyhow!("{path}: no such file or directory"))
}

fn kind_letter(kind: FileKind) -> char {
    match kind {
        FileKind::Directory => 'd',
        FileKind::SymbolicLink => 'l',
        FileKind::RegularFile => '-',
        FileKind::Unknown => '?',
    }
}

fn list(args: PathArgs) -> anyhow::Result<()> {
    let fs = mount_image(&args.image_file_path)?;
    let dir = lookup(&fs, &args.path)?;
    let mut entries = Vec::new();
    dir.entries(|inode, name| entries.push((inode, String::from_utf8_lossy(name).into_owned())))?;
    for (inode, name) in entries {
        let node = fs.get_node(inode)?;
        println!(
            "{}{:o} {:>3} {:>8} {:>10} {}",
            kind_letter(node.kind()),
            node.inode().mode & MODE_PERMISSION_MASK,
            node.n_links(),
            inode,
            node.size_in_bytes(),
            name
        );
    }
    Ok(())
}

fn cat(args: PathArgs) -> anyhow::Result<()> {
    let fs = mount_image(&args.image_file_path)?;
    let node = lookup(&fs, &args.path)?;
    let content = if node.is_symlink() {
        node.get_symbol()?
    } else {
        let mut content = vec![0u8; node.size_in_bytes() as usize];
        let len = node.read_all(0, &mut content)?;
        content.truncate(len);
        content
    };
    std::io::stdout().write_all(&content)?;
    Ok(())
}

fn stat(args: PathArgs) -> anyhow::Result<()> {
    let fs = mount_image(&args.image_file_path)?;
    let node = lookup(&fs, &args.path)?;
    let inode = node.inode();
    println!("  File: {}", args.path);
    println!(
        "  Size: {} ({})  Blocks: {}  Type: {:?}",
        node.size_in_bytes(),
        Byte::from_bytes(node.size_in_bytes() as _).get_appropriate_unit(true),
        inode.blocks,
        node.kind()
    );
    println!(
        " Inode: {}  Links: {}  Mode: {:#o}  Uid: {}  Gid: {}",
        node.number(),
        node.n_links(),
        inode.mode,
        inode.uid,
        inode.gid
    );
    println!("Access: {:?}", time_util::to_system_time(inode.atime));
    println!("Modify: {:?}", time_util::to_system_time(inode.mtime));
    println!("Change: {:?}", time_util::to_system_time(inode.ctime));
    if node.is_symlink() {
        println!("  Link: {}", String::from_utf8_lossy(&node.get_symbol()?));
    }
    Ok(())
}

fn create(args: PathArgs, kind: FileKind) -> anyhow::Result<()> {
    let fs = mount_image(&args.image_file_path)?;
    let (parent, name) = split_parent(&args.path)?;
    let mut dir = lookup(&fs, parent)?;
    if !fs.create_node(&mut dir, name, kind)? {
        return Err(anyhow!("{}: no space left on the volume", args.path));
    }
    fs.sync()?;
    Ok(())
}

fn write(args: WriteArgs) -> anyhow::Result<()> {
    let fs = mount_image(&args.image_file_path)?;
    let mut file = match fs.find(&fs.root()?, &args.path)? {
        Some(file) => file,
        None => {
            let (parent, name) = split_parent(&args.path)?;
            let mut dir = lookup(&fs, parent)?;
            fs.create_child(&mut dir, name, FileKind::RegularFile)?
                .ok_or_else(|| anyhow!("{}: no space left on the volume", args.path))?
        }
    };
    if !file.is_file() {
        return Err(anyhow!("{}: not a regular file", args.path));
    }
    if args.truncate {
        file.truncate()?;
    }
    let offset = args.offset.unwrap_or_else(|| file.size_in_bytes());
    let written = file.write_all(offset, args.text.as_bytes())?;
    fs.sync()?;
    if written < args.text.len() {
        return Err(anyhow!(
            "{}: only {written} of {} bytes written, the volume is full",
            args.path,
            args.text.len()
        ));
    }
    Ok(())
}

fn link(args: LinkArgs) -> anyhow::Result<()> {
    let fs = mount_image(&args.image_file_path)?;
    let (parent, name) = split_parent(&args.path)?;
    let mut dir = lookup(&fs, parent)?;
    if !fs.create_symlink(&mut dir, name, &args.target)? {
        return Err(anyhow!("{}: no space left on the volume", args.path));
    }
    fs.sync()?;
    Ok(())
}

fn remove(args: PathArgs) -> anyhow::Result<()> {
    let fs = mount_image(&args.image_file_path)?;
    let (parent, _) = split_parent(&args.path)?;
    let node = lookup(&fs, &args.path)?;
    let mut dir = lookup(&fs, parent)?;
    node.delete_node(&mut dir)?;
    fs.sync()?;
    Ok(())
}
