//! open an image file and mount the volume inside it
use std::{path::Path, sync::Arc};

use anyhow::Context;

use crate::{device::MmapDevice, fs::Ext2};

/// map `image_path` into memory and mount the ext2 volume it holds
pub fn mount_image<P>(image_path: P) -> anyhow::Result<Arc<Ext2>>
where
    P: AsRef<Path>,
{
    let image_path = image_path.as_ref();
    let device = MmapDevice::open(image_path)
        .with_context(|| format!("open image file {}", image_path.display()))?;
    let fs = Ext2::mount(Arc::new(device))
        .with_context(|| format!("mount {}", image_path.display()))?;
    Ok(fs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        fs::FileKind,
        mkfs::{mkfs_image, MkfsOptions},
        utils::init_test_environment::init_test_logger,
    };

    #[test]
    fn test_changes_survive_remount() {
        init_test_logger();
        let image = std::env::temp_dir().join(format!("ext2fs-mount-{}.img", std::process::id()));
        if image.exists() {
            std::fs::remove_file(&image).unwrap();
        }
        mkfs_image(&image, 1024 * 1024, &MkfsOptions::default_for(1024, 1024)).unwrap();
        {
            let fs = mount_image(&image).unwrap();
            let mut root = fs.root().unwrap();
            assert!(fs.create_node(&mut root, "kept", FileKind::RegularFile).unwrap());
            let mut kept = fs.find(&root, "kept").unwrap().unwrap();
            kept.write_all(0, b"still here").unwrap();
            fs.sync().unwrap();
        }
        let fs = mount_image(&image).unwrap();
        let kept = fs.find(&fs.root().unwrap(), "/kept").unwrap().unwrap();
        let mut buf = [0u8; 10];
        assert_eq!(kept.read_all(0, &mut buf).unwrap(), 10);
        assert_eq!(&buf, b"still here");
        assert_eq!(fs.superblock().mnt_count, 2);
        drop(fs);
        std::fs::remove_file(&image).unwrap();
    }

    #[test]
    fn test_missing_image() {
        let image = std::env::temp_dir().join("ext2fs-no-such-image.img");
        let error = mount_image(&image).unwrap_err();
        assert!(error.to_string().contains("open image file"));
    }
}
